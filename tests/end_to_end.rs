//! Seeded end-to-end scenarios (§8) driven over real loopback TCP
//! against a live name server and storage server.

mod common;

use common::Harness;
use distrifs::client::ss_helpers::{self, WriteEdit};
use distrifs::client::NsReply;

#[tokio::test]
async fn create_persists_metadata_visible_to_a_later_info() {
    let harness = Harness::start().await;
    let mut alice = harness.connect("alice").await;

    let reply = alice.request("CREATE;notes.txt").await.unwrap();
    match reply {
        NsReply::Payload(text) => assert!(text.contains("created"), "unexpected payload: {text}"),
        other => panic!("unexpected reply: {other:?}"),
    }

    let reply = alice.request("INFO;notes.txt").await.unwrap();
    match reply {
        NsReply::Payload(text) => {
            assert!(text.contains("owner=alice"));
            assert!(text.contains("filename=notes.txt"));
        }
        other => panic!("unexpected reply: {other:?}"),
    }
}

#[tokio::test]
async fn write_lock_data_commit_then_read_round_trips_content() {
    let harness = Harness::start().await;
    let mut alice = harness.connect("alice").await;
    alice.request("CREATE;notes.txt").await.unwrap();

    let reply = alice.request("WRITE;notes.txt;0").await.unwrap();
    let (endpoint, filename, sentence) = match reply {
        NsReply::RedirectWrite { endpoint, filename, sentence } => (endpoint, filename, sentence),
        other => panic!("expected a write redirect, got {other:?}"),
    };
    assert_eq!(sentence, 0);

    let edits =
        vec![WriteEdit { idx: 0, content: "Hello".to_string() }, WriteEdit { idx: 1, content: "world.".to_string() }];
    ss_helpers::write_sentence(endpoint, &filename, sentence, &edits).await.unwrap();
    alice.request("UPDATE_META;notes.txt").await.unwrap();

    let reply = alice.request("READ;notes.txt").await.unwrap();
    let (endpoint, filename) = match reply {
        NsReply::RedirectRead { endpoint, filename } => (endpoint, filename),
        other => panic!("expected a read redirect, got {other:?}"),
    };
    let bytes = ss_helpers::read_file(endpoint, &filename).await.unwrap();
    assert_eq!(String::from_utf8(bytes).unwrap(), "Hello world.");
}

#[tokio::test]
async fn write_then_update_meta_refreshes_word_and_char_counts() {
    let harness = Harness::start().await;
    let mut alice = harness.connect("alice").await;
    alice.request("CREATE;notes.txt").await.unwrap();

    let reply = alice.request("WRITE;notes.txt;0").await.unwrap();
    let (endpoint, filename, sentence) = match reply {
        NsReply::RedirectWrite { endpoint, filename, sentence } => (endpoint, filename, sentence),
        other => panic!("expected a write redirect, got {other:?}"),
    };

    let edits =
        vec![WriteEdit { idx: 0, content: "Hello".to_string() }, WriteEdit { idx: 1, content: "world.".to_string() }];
    let reply = alice.write_then_update_meta(endpoint, &filename, sentence, &edits).await.unwrap();
    match reply {
        NsReply::Payload(text) => assert!(text.contains("2 words"), "unexpected payload: {text}"),
        other => panic!("expected UPDATE_META's payload reply, got {other:?}"),
    }

    let reply = alice.request("INFO;notes.txt").await.unwrap();
    match reply {
        NsReply::Payload(text) => assert!(text.contains("words=2"), "counts not refreshed: {text}"),
        other => panic!("unexpected reply: {other:?}"),
    }
}

#[tokio::test]
async fn undo_restores_the_previous_commit() {
    let harness = Harness::start().await;
    let mut alice = harness.connect("alice").await;
    alice.request("CREATE;notes.txt").await.unwrap();

    let first_write = alice.request("WRITE;notes.txt;0").await.unwrap();
    let (endpoint, filename, sentence) = match first_write {
        NsReply::RedirectWrite { endpoint, filename, sentence } => (endpoint, filename, sentence),
        other => panic!("expected a write redirect, got {other:?}"),
    };
    ss_helpers::write_sentence(endpoint, &filename, sentence, &[WriteEdit { idx: 0, content: "First.".to_string() }])
        .await
        .unwrap();

    let second_write = alice.request("WRITE;notes.txt;0").await.unwrap();
    let (endpoint, filename, sentence) = match second_write {
        NsReply::RedirectWrite { endpoint, filename, sentence } => (endpoint, filename, sentence),
        other => panic!("expected a write redirect, got {other:?}"),
    };
    ss_helpers::write_sentence(endpoint, &filename, sentence, &[WriteEdit { idx: 0, content: "Second.".to_string() }])
        .await
        .unwrap();

    let reply = alice.request("UNDO;notes.txt").await.unwrap();
    match reply {
        NsReply::Payload(text) => assert!(text.contains("reverted")),
        other => panic!("unexpected reply: {other:?}"),
    }

    let reply = alice.request("READ;notes.txt").await.unwrap();
    let (endpoint, filename) = match reply {
        NsReply::RedirectRead { endpoint, filename } => (endpoint, filename),
        other => panic!("expected a read redirect, got {other:?}"),
    };
    let bytes = ss_helpers::read_file(endpoint, &filename).await.unwrap();
    assert_eq!(String::from_utf8(bytes).unwrap(), "First.");
}

#[tokio::test]
async fn permission_denied_then_addaccess_unlocks_the_redirect() {
    let harness = Harness::start().await;
    let mut alice = harness.connect("alice").await;
    let mut bob = harness.connect("bob").await;
    alice.request("CREATE;notes.txt").await.unwrap();

    let reply = bob.request("READ;notes.txt").await.unwrap();
    match reply {
        NsReply::Error { code, .. } => assert_eq!(code, "403"),
        other => panic!("expected a permission error, got {other:?}"),
    }

    alice.request("ADDACCESS;notes.txt;bob;R").await.unwrap();

    let reply = bob.request("READ;notes.txt").await.unwrap();
    assert!(matches!(reply, NsReply::RedirectRead { .. }));
}

#[tokio::test]
async fn delete_then_info_reports_not_found() {
    let harness = Harness::start().await;
    let mut alice = harness.connect("alice").await;
    alice.request("CREATE;notes.txt").await.unwrap();

    let reply = alice.request("DELETE;notes.txt").await.unwrap();
    match reply {
        NsReply::Payload(text) => assert!(text.contains("deleted")),
        other => panic!("unexpected reply: {other:?}"),
    }

    let reply = alice.request("INFO;notes.txt").await.unwrap();
    match reply {
        NsReply::Error { code, .. } => assert_eq!(code, "404"),
        other => panic!("expected a not-found error, got {other:?}"),
    }
}

#[tokio::test]
async fn racing_creates_for_the_same_name_leave_exactly_one_winner() {
    let harness = Harness::start().await;
    let mut alice = harness.connect("alice").await;
    let mut also_alice = harness.connect("alice").await;

    let (first, second) =
        tokio::join!(alice.request("CREATE;race.txt"), also_alice.request("CREATE;race.txt"));
    let results = [first.unwrap(), second.unwrap()];

    let successes = results.iter().filter(|r| matches!(r, NsReply::Payload(_))).count();
    let conflicts = results
        .iter()
        .filter(|r| matches!(r, NsReply::Error { code, .. } if code == "409"))
        .count();
    assert_eq!(successes, 1, "expected exactly one CREATE to win: {results:?}");
    assert_eq!(conflicts, 1, "expected exactly one CREATE to lose with 409: {results:?}");
}
