//! NS client/session-loop and verb router (§4.1). The first frame on a
//! connection must be `REGISTER_CLIENT;<name>` or
//! `REGISTER_SS;<ip>;<port>;<file_csv>`; anything else closes the
//! session. A storage-server registration is short-lived: one frame, one
//! reply, then the connection closes. A client registration starts a
//! long-lived, one-request-at-a-time loop.

use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use crate::catalog::types::{FileMetadata, Permission, SS_OWNER_SENTINEL};
use crate::catalog::CatalogService;
use crate::error::{NsError, NsResult};
use crate::protocol::{self, Frame, NS_END};

use super::transaction;

pub async fn handle_connection(
    socket: TcpStream,
    catalog: Arc<CatalogService>,
    peer: SocketAddr,
) -> std::io::Result<()> {
    let (read_half, mut write_half) = socket.into_split();
    let mut reader = BufReader::new(read_half);

    let Some(first_line) = protocol::read_line(&mut reader).await? else {
        return Ok(());
    };
    let Some(frame) = Frame::parse(&first_line) else {
        return Ok(());
    };

    let username = match frame.verb.as_str() {
        "REGISTER_CLIENT" => {
            let Some(name) = frame.arg(0) else {
                write_response(&mut write_half, "ERROR;422;missing username").await?;
                return Ok(());
            };
            catalog.register_user(name, peer).await;
            write_response(&mut write_half, "ACK_CLIENT_REG").await?;
            name.to_string()
        }
        "REGISTER_SS" => {
            handle_register_ss(&frame, &catalog, &mut write_half).await?;
            return Ok(());
        }
        _ => {
            tracing::warn!(%peer, "first frame was neither REGISTER_CLIENT nor REGISTER_SS, closing");
            return Ok(());
        }
    };

    tracing::info!(%peer, %username, "client session started");

    loop {
        let Some(line) = protocol::read_line(&mut reader).await? else {
            return Ok(());
        };
        let Some(frame) = Frame::parse(&line) else {
            continue;
        };
        tracing::debug!(%peer, %username, verb = %frame.verb, "client command");

        let reply = dispatch(&frame, &catalog, &username).await;
        match reply {
            Ok(payload) => write_response(&mut write_half, &payload).await?,
            Err(e) => write_response(&mut write_half, e.to_wire().trim_end()).await?,
        }
    }
}

async fn handle_register_ss<W: tokio::io::AsyncWrite + Unpin>(
    frame: &Frame,
    catalog: &CatalogService,
    write_half: &mut W,
) -> std::io::Result<()> {
    let (Some(ip), Some(port_str)) = (frame.arg(0), frame.arg(1)) else {
        write_half.write_all(b"ERROR;422;missing ip/port\n").await?;
        return Ok(());
    };
    let Ok(port) = port_str.parse::<u16>() else {
        write_half.write_all(b"ERROR;422;bad port\n").await?;
        return Ok(());
    };
    let Ok(endpoint) = format!("{ip}:{port}").parse::<SocketAddr>() else {
        write_half.write_all(b"ERROR;422;bad endpoint\n").await?;
        return Ok(());
    };
    let files: BTreeSet<String> = frame
        .arg(2)
        .map(|csv| csv.split(',').filter(|s| !s.is_empty()).map(str::to_string).collect())
        .unwrap_or_default();

    catalog.register_storage_server(endpoint, files).await;
    tracing::info!(%endpoint, "storage server registered");
    write_half.write_all(format!("ACK_SS_REG{NS_END}").as_bytes()).await?;
    write_half.flush().await
}

async fn write_response<W: tokio::io::AsyncWrite + Unpin>(writer: &mut W, payload: &str) -> std::io::Result<()> {
    protocol::write_response(writer, payload, NS_END).await
}

/// Route one frame to its handler. Never returns an `Err` for things
/// that are not protocol errors — filesystem/availability failures are
/// folded into [`NsError`] and rendered the same way.
async fn dispatch(frame: &Frame, catalog: &CatalogService, username: &str) -> NsResult<String> {
    match frame.verb.as_str() {
        "LIST_USERS" => list_users(catalog).await,
        "VIEW" => view(frame, catalog, username).await,
        "INFO" => info(frame, catalog, username).await,
        "ADDACCESS" => add_access(frame, catalog, username).await,
        "REMACCESS" => rem_access(frame, catalog, username).await,
        "ANNOTATE" => annotate(frame, catalog, username).await,
        "SHOW_ANNOTATION" => show_annotation(frame, catalog, username).await,
        "CREATEFOLDER" => create_folder(frame, catalog, username).await,
        "VIEWFOLDER" => view_folder(frame, catalog).await,
        "REQUESTACCESS" => request_access(frame, catalog, username).await,
        "VIEWREQUESTS" => view_requests(frame, catalog, username).await,
        "APPROVE" => approve(frame, catalog, username).await,
        "REJECT" => reject(frame, catalog, username).await,
        "CREATE" => create(frame, catalog, username).await,
        "DELETE" => delete(frame, catalog, username).await,
        "UNDO" => undo(frame, catalog, username).await,
        "UPDATE_META" => update_meta(frame, catalog, username).await,
        "EXEC" => exec(frame, catalog, username).await,
        "CHECKPOINT" => checkpoint(frame, catalog, username).await,
        "REVERT" => revert(frame, catalog, username).await,
        "VIEWCHECKPOINT" => view_checkpoint(frame, catalog, username).await,
        "READ" => read_redirect(frame, catalog, username).await,
        "WRITE" => write_redirect(frame, catalog, username).await,
        "STREAM" => stream_redirect(frame, catalog, username).await,
        _ => Err(NsError::UnknownCommand),
    }
}

fn arg<'a>(frame: &'a Frame, idx: usize, what: &str) -> NsResult<&'a str> {
    frame.arg(idx).ok_or_else(|| NsError::InvalidArgs(format!("missing {what}")))
}

fn validate(field: &str) -> NsResult<()> {
    protocol::validate_field(field).map_err(NsError::InvalidInput)
}

async fn must_get(catalog: &CatalogService, filename: &str) -> NsResult<FileMetadata> {
    catalog.get(filename).await.ok_or_else(|| NsError::FileNotFound(filename.to_string()))
}

fn require_owner(meta: &FileMetadata, username: &str) -> NsResult<()> {
    if meta.owner == username {
        Ok(())
    } else {
        Err(NsError::NotOwner(meta.filename.clone()))
    }
}

fn require_perm(meta: &FileMetadata, username: &str, perm: Permission) -> NsResult<()> {
    if meta.permits(username, perm) {
        Ok(())
    } else {
        Err(NsError::PermissionDenied(meta.filename.clone()))
    }
}

async fn list_users(catalog: &CatalogService) -> NsResult<String> {
    let names = catalog.list_usernames().await;
    if names.is_empty() {
        return Ok("No users registered.".to_string());
    }
    Ok(names.join("\n"))
}

/// `VIEW[;flags]` — `l` = long (owner/counts/last access), `a` = include
/// files the requester cannot read (§4.1).
async fn view(frame: &Frame, catalog: &CatalogService, username: &str) -> NsResult<String> {
    let flags = frame.arg(0).unwrap_or("");
    let long = flags.contains('l');
    let all = flags.contains('a');

    let files = catalog.list_files().await;
    let mut lines = Vec::new();
    for meta in &files {
        if !all && !meta.permits(username, Permission::Read) {
            continue;
        }
        if long {
            lines.push(format!(
                "{}\towner={}\twords={}\tchars={}\tlast_access={}{}",
                meta.filename,
                meta.owner,
                meta.word_count,
                meta.char_count,
                meta.last_access_unix(),
                if meta.is_directory { "\tdir" } else { "" },
            ));
        } else {
            lines.push(meta.filename.clone());
        }
    }
    if lines.is_empty() {
        return Ok("No files visible.".to_string());
    }
    Ok(lines.join("\n"))
}

async fn info(frame: &Frame, catalog: &CatalogService, username: &str) -> NsResult<String> {
    let filename = arg(frame, 0, "filename")?;
    let meta = must_get(catalog, filename).await?;
    require_perm(&meta, username, Permission::Read)?;
    catalog.touch_and_get(filename).await;
    Ok(format!(
        "filename={}\nowner={}\nstorage_server={}\nwords={}\nchars={}\nlast_access={}\nannotation={}\npending_requests={}",
        meta.filename,
        meta.owner,
        meta.ss,
        meta.word_count,
        meta.char_count,
        meta.last_access_unix(),
        meta.annotation,
        meta.pending_requests.len(),
    ))
}

async fn add_access(frame: &Frame, catalog: &CatalogService, username: &str) -> NsResult<String> {
    let filename = arg(frame, 0, "filename")?;
    let target = arg(frame, 1, "user")?;
    let perm_str = arg(frame, 2, "permission")?;
    let perm = Permission::parse(perm_str).ok_or_else(|| NsError::InvalidArgs(format!("bad permission '{perm_str}'")))?;
    validate(target)?;

    let meta = must_get(catalog, filename).await?;
    require_owner(&meta, username)?;
    if !catalog.user_exists(target).await {
        return Err(NsError::UserNotFound(target.to_string()));
    }

    catalog
        .with_file_mut(filename, |m| {
            if let Some(entry) = m.access_list.iter_mut().find(|(u, _)| u == target) {
                entry.1 = perm;
            } else {
                m.access_list.push((target.to_string(), perm));
            }
        })
        .await;
    Ok(format!("Access for '{target}' on '{filename}' set to {perm_str}."))
}

async fn rem_access(frame: &Frame, catalog: &CatalogService, username: &str) -> NsResult<String> {
    let filename = arg(frame, 0, "filename")?;
    let target = arg(frame, 1, "user")?;

    let meta = must_get(catalog, filename).await?;
    require_owner(&meta, username)?;

    catalog
        .with_file_mut(filename, |m| {
            m.access_list.retain(|(u, _)| u != target);
        })
        .await;
    Ok(format!("Access for '{target}' on '{filename}' removed."))
}

async fn annotate(frame: &Frame, catalog: &CatalogService, username: &str) -> NsResult<String> {
    let filename = arg(frame, 0, "filename")?;
    let text = frame.args.get(1..).map(|r| r.join(";")).unwrap_or_default();
    validate(&text)?;

    let meta = must_get(catalog, filename).await?;
    require_owner(&meta, username)?;

    catalog.with_file_mut(filename, |m| m.annotation = text.clone()).await;
    Ok(format!("Annotation for '{filename}' updated."))
}

async fn show_annotation(frame: &Frame, catalog: &CatalogService, username: &str) -> NsResult<String> {
    let filename = arg(frame, 0, "filename")?;
    let meta = must_get(catalog, filename).await?;
    require_perm(&meta, username, Permission::Read)?;
    Ok(meta.annotation)
}

async fn create_folder(frame: &Frame, catalog: &CatalogService, username: &str) -> NsResult<String> {
    let name = arg(frame, 0, "name")?;
    validate(name)?;
    // CREATEFOLDER is catalog-only (no SS to ACK), so the atomic
    // check-and-insert is enough by itself to close the race: two
    // concurrent CREATEFOLDERs for the same name can't both see the slot
    // free, unlike the separate exists()-then-insert_file this used to do.
    let placeholder: SocketAddr = "0.0.0.0:0".parse().unwrap();
    if !catalog.try_reserve_file(FileMetadata::directory(name.to_string(), username.to_string(), placeholder)).await {
        return Err(NsError::FileExists(name.to_string()));
    }
    Ok(format!("Folder '{name}' created."))
}

async fn view_folder(frame: &Frame, catalog: &CatalogService) -> NsResult<String> {
    let name = arg(frame, 0, "name")?;
    let prefix = format!("{name}/");
    let files = catalog.list_files().await;
    let matches: Vec<String> =
        files.iter().filter(|m| m.filename.starts_with(&prefix)).map(|m| m.filename.clone()).collect();
    if matches.is_empty() {
        return Ok(format!("Folder '{name}' is empty or does not exist."));
    }
    Ok(matches.join("\n"))
}

async fn request_access(frame: &Frame, catalog: &CatalogService, username: &str) -> NsResult<String> {
    let filename = arg(frame, 0, "filename")?;
    let meta = must_get(catalog, filename).await?;
    if meta.owner == username {
        return Err(NsError::InvalidArgs("owner already has full access".to_string()));
    }
    catalog
        .with_file_mut(filename, |m| {
            if !m.pending_requests.iter().any(|u| u == username) {
                m.pending_requests.push(username.to_string());
            }
        })
        .await;
    Ok(format!("Access to '{filename}' requested."))
}

async fn view_requests(frame: &Frame, catalog: &CatalogService, username: &str) -> NsResult<String> {
    let filename = arg(frame, 0, "filename")?;
    let meta = must_get(catalog, filename).await?;
    require_owner(&meta, username)?;
    if meta.pending_requests.is_empty() {
        return Ok(format!("No pending requests for '{filename}'."));
    }
    Ok(meta.pending_requests.join("\n"))
}

async fn approve(frame: &Frame, catalog: &CatalogService, username: &str) -> NsResult<String> {
    let filename = arg(frame, 0, "filename")?;
    let target = arg(frame, 1, "user")?;
    let meta = must_get(catalog, filename).await?;
    require_owner(&meta, username)?;

    let had_request = catalog
        .with_file_mut(filename, |m| {
            let had = m.pending_requests.iter().any(|u| u == target);
            m.pending_requests.retain(|u| u != target);
            if !m.access_list.iter().any(|(u, _)| u == target) {
                m.access_list.push((target.to_string(), Permission::Read));
            }
            had
        })
        .await
        .unwrap_or(false);

    if !had_request {
        return Err(NsError::InvalidArgs(format!("no pending request from '{target}' on '{filename}'")));
    }
    Ok(format!("Approved '{target}' for read access to '{filename}'."))
}

async fn reject(frame: &Frame, catalog: &CatalogService, username: &str) -> NsResult<String> {
    let filename = arg(frame, 0, "filename")?;
    let target = arg(frame, 1, "user")?;
    let meta = must_get(catalog, filename).await?;
    require_owner(&meta, username)?;

    let had_request = catalog
        .with_file_mut(filename, |m| {
            let had = m.pending_requests.iter().any(|u| u == target);
            m.pending_requests.retain(|u| u != target);
            had
        })
        .await
        .unwrap_or(false);

    if !had_request {
        return Err(NsError::InvalidArgs(format!("no pending request from '{target}' on '{filename}'")));
    }
    Ok(format!("Rejected '{target}'s request for '{filename}'."))
}

/// Send `command` to `endpoint` and require the reply's leading token to
/// equal `ack`; any other outcome becomes the appropriate [`NsError`]
/// without having touched the catalog (§4.3, §7).
async fn call_ss(endpoint: SocketAddr, command: &str, ack: &str) -> NsResult<transaction::SsReply> {
    let reply = transaction::call(endpoint, command)
        .await
        .map_err(NsError::StorageServerUnreachable)?;
    if reply.has_ack(ack) {
        Ok(reply)
    } else {
        Err(NsError::StorageServerFailure(reply.as_text().trim().to_string()))
    }
}

async fn create(frame: &Frame, catalog: &CatalogService, username: &str) -> NsResult<String> {
    let filename = arg(frame, 0, "filename")?;
    validate(filename)?;
    let endpoint = catalog.any_storage_server().await.ok_or(NsError::NoStorageServer)?;

    // Reserve the name in `pending_creates`, not in the real catalog, so
    // a losing concurrent CREATE sees FileExists right here instead of
    // racing the SS, while every read path (`get`/`touch_and_get`/
    // `exists`) stays blind to this file until the SS actually ACKs
    // (§4.3, §5: SS-ACK-happens-before-catalog-mutation). The real row is
    // only installed below, after that ACK, identical in shape to DELETE.
    if !catalog.try_begin_create(filename).await {
        return Err(NsError::FileExists(filename.to_string()));
    }

    if let Err(e) = call_ss(endpoint, &format!("SS_CREATE;{filename}"), "ACK_CREATE").await {
        catalog.cancel_create(filename).await;
        return Err(e);
    }
    catalog.note_known_file(endpoint, filename).await;
    catalog.finish_create(FileMetadata::new(filename.to_string(), username.to_string(), endpoint)).await;

    if let Err(e) = catalog.save().await {
        tracing::error!(error = %e, "failed to persist catalog after CREATE");
        return Err(NsError::ServerMisc(e.to_string()));
    }
    Ok(format!("File '{filename}' created successfully."))
}

async fn delete(frame: &Frame, catalog: &CatalogService, username: &str) -> NsResult<String> {
    let filename = arg(frame, 0, "filename")?;
    let meta = must_get(catalog, filename).await?;
    require_owner(&meta, username)?;

    call_ss(meta.ss, &format!("SS_DELETE;{filename}"), "ACK_DELETE").await?;

    catalog.remove_file(filename).await;
    if let Err(e) = catalog.save().await {
        tracing::error!(error = %e, "failed to persist catalog after DELETE");
        return Err(NsError::ServerMisc(e.to_string()));
    }
    Ok(format!("File '{filename}' deleted successfully."))
}

async fn undo(frame: &Frame, catalog: &CatalogService, username: &str) -> NsResult<String> {
    let filename = arg(frame, 0, "filename")?;
    let meta = must_get(catalog, filename).await?;
    require_perm(&meta, username, Permission::Write)?;

    call_ss(meta.ss, &format!("SS_UNDO;{filename}"), "ACK_UNDO").await?;
    catalog.touch_and_get(filename).await;
    Ok(format!("File '{filename}' reverted to its previous commit."))
}

async fn update_meta(frame: &Frame, catalog: &CatalogService, username: &str) -> NsResult<String> {
    let filename = arg(frame, 0, "filename")?;
    let meta = must_get(catalog, filename).await?;
    require_perm(&meta, username, Permission::Write)?;

    let reply = transaction::call(meta.ss, &format!("SS_READ;{filename}"))
        .await
        .map_err(NsError::StorageServerUnreachable)?;
    if reply.is_error() {
        return Err(NsError::StorageServerFailure(reply.as_text().trim().to_string()));
    }
    let text = String::from_utf8_lossy(&reply.body);
    let word_count = text.split_whitespace().count();
    let char_count = text.chars().count();

    catalog
        .with_file_mut(filename, |m| {
            m.word_count = word_count;
            m.char_count = char_count;
            m.touch();
        })
        .await;
    if let Err(e) = catalog.save().await {
        tracing::error!(error = %e, "failed to persist catalog after UPDATE_META");
        return Err(NsError::ServerMisc(e.to_string()));
    }
    Ok(format!("Metadata for '{filename}' refreshed: {word_count} words, {char_count} chars."))
}

async fn exec(frame: &Frame, catalog: &CatalogService, username: &str) -> NsResult<String> {
    let filename = arg(frame, 0, "filename")?;
    let meta = must_get(catalog, filename).await?;
    require_perm(&meta, username, Permission::Read)?;

    let reply = transaction::call(meta.ss, &format!("SS_EXEC;{filename}"))
        .await
        .map_err(NsError::StorageServerUnreachable)?;
    if reply.is_error() {
        return Err(NsError::StorageServerFailure(reply.as_text().trim().to_string()));
    }
    catalog.touch_and_get(filename).await;
    Ok(reply.as_text())
}

async fn checkpoint(frame: &Frame, catalog: &CatalogService, username: &str) -> NsResult<String> {
    let filename = arg(frame, 0, "filename")?;
    let tag = arg(frame, 1, "tag")?;
    validate(tag)?;
    let meta = must_get(catalog, filename).await?;
    require_owner(&meta, username)?;

    call_ss(meta.ss, &format!("SS_CHECKPOINT;{filename};{tag}"), "ACK_CHECKPOINT").await?;
    Ok(format!("Checkpoint '{tag}' of '{filename}' created."))
}

async fn revert(frame: &Frame, catalog: &CatalogService, username: &str) -> NsResult<String> {
    let filename = arg(frame, 0, "filename")?;
    let tag = arg(frame, 1, "tag")?;
    let meta = must_get(catalog, filename).await?;
    require_owner(&meta, username)?;

    call_ss(meta.ss, &format!("SS_REVERT;{filename};{tag}"), "ACK_REVERT").await?;
    Ok(format!("File '{filename}' reverted to checkpoint '{tag}'."))
}

async fn view_checkpoint(frame: &Frame, catalog: &CatalogService, username: &str) -> NsResult<String> {
    let filename = arg(frame, 0, "filename")?;
    let tag = arg(frame, 1, "tag")?;
    let meta = must_get(catalog, filename).await?;
    require_perm(&meta, username, Permission::Read)?;

    let reply = transaction::call(meta.ss, &format!("SS_VIEWCHECKPOINT;{filename};{tag}"))
        .await
        .map_err(NsError::StorageServerUnreachable)?;
    if reply.is_error() {
        return Err(NsError::StorageServerFailure(reply.as_text().trim().to_string()));
    }
    catalog.touch_and_get(filename).await;
    Ok(reply.as_text())
}

async fn read_redirect(frame: &Frame, catalog: &CatalogService, username: &str) -> NsResult<String> {
    let filename = arg(frame, 0, "filename")?;
    let meta = must_get(catalog, filename).await?;
    require_perm(&meta, username, Permission::Read)?;
    catalog.touch_and_get(filename).await;
    Ok(format!("REDIRECT_READ;{};{};{}", meta.ss.ip(), meta.ss.port(), filename))
}

async fn write_redirect(frame: &Frame, catalog: &CatalogService, username: &str) -> NsResult<String> {
    let filename = arg(frame, 0, "filename")?;
    let sentence = arg(frame, 1, "sentence")?;
    let meta = must_get(catalog, filename).await?;
    require_perm(&meta, username, Permission::Write)?;
    catalog.touch_and_get(filename).await;
    Ok(format!("REDIRECT_WRITE;{};{};{};{}", meta.ss.ip(), meta.ss.port(), filename, sentence))
}

async fn stream_redirect(frame: &Frame, catalog: &CatalogService, username: &str) -> NsResult<String> {
    let filename = arg(frame, 0, "filename")?;
    let meta = must_get(catalog, filename).await?;
    require_perm(&meta, username, Permission::Read)?;
    catalog.touch_and_get(filename).await;
    Ok(format!("REDIRECT_STREAM;{};{};{}", meta.ss.ip(), meta.ss.port(), filename))
}

/// Synthesize the `ss_owner` owner string used when a storage server
/// advertises a file the catalog never created (§3). Exposed for callers
/// that want to recognize it without importing `catalog::types`.
pub fn is_ss_owned(owner: &str) -> bool {
    owner == SS_OWNER_SENTINEL
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CatalogService;
    use std::net::SocketAddr;

    fn addr() -> SocketAddr {
        "127.0.0.1:9001".parse().unwrap()
    }

    async fn catalog_with_alice_owned_file() -> (CatalogService, &'static str) {
        let dir = tempfile::tempdir().unwrap();
        let catalog = CatalogService::new(dir.path().to_path_buf());
        catalog.register_user("alice", addr()).await;
        catalog.register_user("bob", addr()).await;
        catalog
            .insert_file(FileMetadata::new("notes.txt".to_string(), "alice".to_string(), addr()))
            .await;
        (catalog, "notes.txt")
    }

    #[tokio::test]
    async fn bob_cannot_read_a_file_with_no_grant() {
        let (catalog, file) = catalog_with_alice_owned_file().await;
        let frame = Frame::parse(&format!("READ;{file}")).unwrap();
        let err = read_redirect(&frame, &catalog, "bob").await.unwrap_err();
        assert!(matches!(err, NsError::PermissionDenied(_)));
    }

    #[tokio::test]
    async fn addaccess_then_read_redirects() {
        let (catalog, file) = catalog_with_alice_owned_file().await;
        let add = Frame::parse(&format!("ADDACCESS;{file};bob;R")).unwrap();
        add_access(&add, &catalog, "alice").await.unwrap();

        let frame = Frame::parse(&format!("READ;{file}")).unwrap();
        let reply = read_redirect(&frame, &catalog, "bob").await.unwrap();
        assert!(reply.starts_with("REDIRECT_READ;127.0.0.1;9001;notes.txt"));
    }

    #[tokio::test]
    async fn only_owner_can_delete() {
        let (catalog, file) = catalog_with_alice_owned_file().await;
        let frame = Frame::parse(&format!("DELETE;{file}")).unwrap();
        // bob isn't the owner; he should be rejected before any SS call happens.
        let err = delete(&frame, &catalog, "bob").await.unwrap_err();
        assert!(matches!(err, NsError::NotOwner(_)));
    }

    #[tokio::test]
    async fn request_approve_grants_read_access() {
        let (catalog, file) = catalog_with_alice_owned_file().await;
        let req = Frame::parse(&format!("REQUESTACCESS;{file}")).unwrap();
        request_access(&req, &catalog, "bob").await.unwrap();

        let views = Frame::parse(&format!("VIEWREQUESTS;{file}")).unwrap();
        let listing = view_requests(&views, &catalog, "alice").await.unwrap();
        assert_eq!(listing, "bob");

        let app = Frame::parse(&format!("APPROVE;{file};bob")).unwrap();
        approve(&app, &catalog, "alice").await.unwrap();

        let meta = catalog.get(file).await.unwrap();
        assert!(meta.permits("bob", Permission::Read));
        assert!(meta.pending_requests.is_empty());
    }

    #[tokio::test]
    async fn create_folder_then_view_folder_lists_members() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = CatalogService::new(dir.path().to_path_buf());
        catalog.register_user("alice", addr()).await;

        let cf = Frame::parse("CREATEFOLDER;proj").unwrap();
        create_folder(&cf, &catalog, "alice").await.unwrap();
        catalog.insert_file(FileMetadata::new("proj/a.txt".to_string(), "alice".to_string(), addr())).await;

        let vf = Frame::parse("VIEWFOLDER;proj").unwrap();
        let listing = view_folder(&vf, &catalog).await.unwrap();
        assert_eq!(listing, "proj/a.txt");
    }

    #[tokio::test]
    async fn second_createfolder_for_the_same_name_loses_with_file_exists() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = CatalogService::new(dir.path().to_path_buf());
        catalog.register_user("alice", addr()).await;

        let cf = Frame::parse("CREATEFOLDER;proj").unwrap();
        create_folder(&cf, &catalog, "alice").await.unwrap();
        let err = create_folder(&cf, &catalog, "alice").await.unwrap_err();
        assert!(matches!(err, NsError::FileExists(_)));
        assert_eq!(catalog.list_files().await.len(), 1);
    }

    #[tokio::test]
    async fn a_pending_create_is_invisible_to_concurrent_reads_until_finished() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = CatalogService::new(dir.path().to_path_buf());
        catalog.register_user("alice", addr()).await;

        // Simulate the reservation window CREATE holds open while it
        // waits on the storage server's ACK_CREATE: reserved, but not
        // yet installed as a real row.
        assert!(catalog.try_begin_create("notes.txt").await);

        let info_frame = Frame::parse("INFO;notes.txt").unwrap();
        let err = info(&info_frame, &catalog, "alice").await.unwrap_err();
        assert!(matches!(err, NsError::FileNotFound(_)));

        let read_frame = Frame::parse("READ;notes.txt").unwrap();
        let err = read_redirect(&read_frame, &catalog, "alice").await.unwrap_err();
        assert!(matches!(err, NsError::FileNotFound(_)));

        // Another concurrent CREATE for the same name must still lose.
        assert!(!catalog.try_begin_create("notes.txt").await);

        catalog
            .finish_create(FileMetadata::new("notes.txt".to_string(), "alice".to_string(), addr()))
            .await;
        let reply = read_redirect(&read_frame, &catalog, "alice").await.unwrap();
        assert!(reply.starts_with("REDIRECT_READ;"));
    }
}
