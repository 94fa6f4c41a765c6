//! File-system engine behind the storage server's wire commands (§4.4):
//! create/delete/undo, the sentence-addressed commit algorithm, and
//! checkpoint/revert snapshots. A single process-wide mutex serializes
//! every mutating operation, matching the spec's "one process-wide SS
//! mutex serializes all commits" — widened here to cover create/delete/
//! undo/revert too, since `.bak` is shared between a committing writer
//! and a concurrent undoer (§5).

use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::error::{SsError, SsResult};

const TERMINATORS: [char; 3] = ['.', '?', '!'];

pub struct FileEngine {
    root: PathBuf,
    lock: Mutex<()>,
}

/// One buffered edit from `WRITE_DATA;idx;content`, applied in FIFO order
/// at `COMMIT_WRITE` time (§4.4).
#[derive(Debug, Clone)]
pub struct WordEdit {
    pub idx: usize,
    pub content: String,
}

impl FileEngine {
    pub fn new(root: PathBuf) -> Self {
        FileEngine { root, lock: Mutex::new(()) }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Reject `..` path traversal and absolute paths (§4.4: "filenames are
    /// restricted to disallow `..`"); everything else is taken as a
    /// single path component under the root.
    pub fn resolve(&self, filename: &str) -> SsResult<PathBuf> {
        if filename.is_empty()
            || filename.contains("..")
            || filename.starts_with('/')
            || filename.contains('\\')
        {
            return Err(SsError::InvalidFilename);
        }
        Ok(self.root.join(filename))
    }

    fn bak_path(path: &Path) -> PathBuf {
        let mut s = path.as_os_str().to_owned();
        s.push(".bak");
        PathBuf::from(s)
    }

    fn tmp_path(path: &Path) -> PathBuf {
        let mut s = path.as_os_str().to_owned();
        s.push(".tmp");
        PathBuf::from(s)
    }

    fn checkpoint_path(path: &Path, tag: &str) -> PathBuf {
        let mut s = path.as_os_str().to_owned();
        s.push(".ckpt.");
        s.push(tag);
        PathBuf::from(s)
    }

    pub async fn create(&self, filename: &str) -> SsResult<()> {
        let path = self.resolve(filename)?;
        let _guard = self.lock.lock().await;
        match fs::OpenOptions::new().write(true).create_new(true).open(&path).await {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Err(SsError::Exists),
            Err(e) => Err(SsError::Io(e)),
        }
    }

    pub async fn delete(&self, filename: &str) -> SsResult<()> {
        let path = self.resolve(filename)?;
        let _guard = self.lock.lock().await;
        fs::remove_file(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                SsError::NotFound
            } else {
                SsError::Io(e)
            }
        })
    }

    pub async fn read_bytes(&self, filename: &str) -> SsResult<Vec<u8>> {
        let path = self.resolve(filename)?;
        fs::read(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                SsError::NotFound
            } else {
                SsError::Io(e)
            }
        })
    }

    pub async fn undo(&self, filename: &str) -> SsResult<()> {
        let path = self.resolve(filename)?;
        let bak = Self::bak_path(&path);
        let _guard = self.lock.lock().await;
        if fs::metadata(&bak).await.is_err() {
            return Err(SsError::NoBackup);
        }
        fs::rename(&bak, &path).await?;
        Ok(())
    }

    pub async fn checkpoint(&self, filename: &str, tag: &str) -> SsResult<()> {
        let path = self.resolve(filename)?;
        let ckpt = Self::checkpoint_path(&path, tag);
        let _guard = self.lock.lock().await;
        fs::copy(&path, &ckpt).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                SsError::NotFound
            } else {
                SsError::Io(e)
            }
        })?;
        Ok(())
    }

    /// Atomic rename of a named checkpoint back over the live file,
    /// after backing the live file up to `.bak` with the same machinery
    /// as [`Self::undo`] (SPEC_FULL §E.2). The checkpoint is consumed by
    /// this rename; re-reverting to the same tag requires a fresh
    /// `CHECKPOINT` first.
    pub async fn revert(&self, filename: &str, tag: &str) -> SsResult<()> {
        let path = self.resolve(filename)?;
        let ckpt = Self::checkpoint_path(&path, tag);
        let bak = Self::bak_path(&path);
        let _guard = self.lock.lock().await;
        if fs::metadata(&ckpt).await.is_err() {
            return Err(SsError::CheckpointNotFound(tag.to_string()));
        }
        if fs::metadata(&path).await.is_ok() {
            fs::rename(&path, &bak).await?;
        }
        fs::rename(&ckpt, &path).await?;
        Ok(())
    }

    pub async fn view_checkpoint(&self, filename: &str, tag: &str) -> SsResult<Vec<u8>> {
        let path = self.resolve(filename)?;
        let ckpt = Self::checkpoint_path(&path, tag);
        fs::read(&ckpt).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                SsError::CheckpointNotFound(tag.to_string())
            } else {
                SsError::Io(e)
            }
        })
    }

    /// Apply the buffered `WRITE_DATA` edits to sentence `sentence_n` of
    /// `filename` and commit atomically (§4.4 commit algorithm).
    pub async fn commit(
        &self,
        filename: &str,
        sentence_n: usize,
        edits: &[WordEdit],
    ) -> SsResult<()> {
        let path = self.resolve(filename)?;
        let _guard = self.lock.lock().await;

        let existed = fs::metadata(&path).await.is_ok();
        let content = if existed {
            fs::read_to_string(&path).await?
        } else {
            String::new()
        };

        let (prefix, sentence, suffix) = locate_sentence(&content, sentence_n)?;
        let mut words: Vec<String> = sentence.split_whitespace().map(String::from).collect();
        for edit in edits {
            if edit.idx < words.len() {
                words[edit.idx] = edit.content.clone();
            } else if edit.idx == words.len() {
                words.push(edit.content.clone());
            } else {
                tracing::warn!(
                    filename,
                    idx = edit.idx,
                    word_count = words.len(),
                    "WRITE_DATA index beyond sentence length, skipping"
                );
            }
        }
        let new_sentence = rejoin_words(&words);
        let new_content = format!("{prefix}{new_sentence}{suffix}");

        let tmp = Self::tmp_path(&path);
        let bak = Self::bak_path(&path);

        let mut f = fs::File::create(&tmp).await?;
        f.write_all(new_content.as_bytes()).await?;
        f.flush().await?;
        drop(f);

        if existed {
            fs::rename(&path, &bak).await?;
        }
        if let Err(e) = fs::rename(&tmp, &path).await {
            if existed {
                // best-effort rollback: restore the pre-commit file.
                let _ = fs::rename(&bak, &path).await;
            }
            return Err(SsError::Io(e));
        }
        Ok(())
    }
}

/// Join words with single spaces, except a trailing token that is pure
/// punctuation (`.`, `?`, `!`), which attaches directly to the previous
/// word with no separating space (§4.4).
fn rejoin_words(words: &[String]) -> String {
    let mut out = String::new();
    for (i, word) in words.iter().enumerate() {
        let is_bare_punctuation = !word.is_empty() && word.chars().all(|c| TERMINATORS.contains(&c));
        if i > 0 && !is_bare_punctuation {
            out.push(' ');
        }
        out.push_str(word);
    }
    out
}

/// Locate sentence `n` in `content`: the span between the nth and
/// (n+1)th terminator occurrence, with leading whitespace folded into
/// the prefix rather than the extracted sentence (§4.4, glossary
/// "Sentence"). Returns `(prefix, sentence, suffix)` such that
/// `prefix + sentence + suffix == content` exactly, so a no-op edit
/// round-trips byte for byte.
fn locate_sentence(content: &str, n: usize) -> SsResult<(String, String, String)> {
    if content.is_empty() && n == 0 {
        return Ok((String::new(), String::new(), String::new()));
    }
    let boundaries: Vec<usize> =
        content.char_indices().filter(|(_, c)| TERMINATORS.contains(c)).map(|(i, _)| i).collect();
    if n >= boundaries.len() {
        return Err(SsError::SentenceNotFound(n));
    }
    let raw_start = if n == 0 { 0 } else { boundaries[n - 1] + 1 };
    let terminator_pos = boundaries[n];
    let raw_sentence = &content[raw_start..terminator_pos];
    let leading_ws = raw_sentence.len() - raw_sentence.trim_start().len();
    let start = raw_start + leading_ws;

    let prefix = content[..start].to_string();
    let sentence = content[start..terminator_pos].to_string();
    let suffix = content[terminator_pos..].to_string();
    Ok((prefix, sentence, suffix))
}
