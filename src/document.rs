//! Document and clipboard bridge
//!
//! The pane never touches a document directly. It queues an insertion at the
//! start of the current selection and then syncs, the same two-step contract a
//! scripting host offers. [`FileDocument`] implements it over a plain text file
//! with a caret.

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("Failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Clipboard unavailable: {0}")]
    Clipboard(String),
}

/// Editing primitives of the active document
#[async_trait]
pub trait DocumentEditor: Send + Sync {
    /// Queue `text` for insertion at the start of the current selection
    async fn insert_text_at_start(&self, text: &str) -> Result<(), BridgeError>;

    /// Commit queued edits; returns once the document has them
    async fn sync(&self) -> Result<(), BridgeError>;
}

/// System clipboard, write-only
pub trait ClipboardWriter: Send + Sync {
    fn write_text(&self, text: &str) -> Result<(), BridgeError>;
}

/// Insert `text` at the selection and wait for the edit to land
pub async fn insert_at_selection(editor: &dyn DocumentEditor, text: &str) -> Result<(), BridgeError> {
    editor.insert_text_at_start(text).await?;
    editor.sync().await?;
    debug!(chars = text.chars().count(), "inserted text at selection");
    Ok(())
}

/// Copy `text` to the clipboard. Failures are logged and handed back for
/// display; they never change pane state.
pub fn copy_to_clipboard(clipboard: &dyn ClipboardWriter, text: &str) -> Result<(), BridgeError> {
    match clipboard.write_text(text) {
        Ok(()) => {
            debug!(chars = text.chars().count(), "copied text to clipboard");
            Ok(())
        }
        Err(e) => {
            warn!(error = %e, "clipboard write failed");
            Err(e)
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

// ═══════════════════════════════════════════════════════════════
// FILE DOCUMENT
// ═══════════════════════════════════════════════════════════════

/// A UTF-8 text file plus a caret measured in characters
#[derive(Debug)]
pub struct FileDocument {
    path: PathBuf,
    /// None means "end of document"
    caret: Mutex<Option<usize>>,
    pending: Mutex<Vec<String>>,
}

impl FileDocument {
    /// Caret at the end of the document
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            caret: Mutex::new(None),
            pending: Mutex::new(Vec::new()),
        }
    }

    /// Caret at character offset `caret` (clamped to the end)
    pub fn with_caret(path: impl Into<PathBuf>, caret: usize) -> Self {
        let doc = Self::new(path);
        *lock(&doc.caret) = Some(caret);
        doc
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current caret, None while it sits at the end
    pub fn caret(&self) -> Option<usize> {
        *lock(&self.caret)
    }

    async fn read_contents(&self) -> Result<String, BridgeError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(String::new()),
            Err(source) => Err(BridgeError::Read {
                path: self.path.clone(),
                source,
            }),
        }
    }
}

/// Byte index of the `chars`-th character, clamped to the end
fn byte_index(content: &str, chars: usize) -> usize {
    content
        .char_indices()
        .nth(chars)
        .map(|(idx, _)| idx)
        .unwrap_or(content.len())
}

#[async_trait]
impl DocumentEditor for FileDocument {
    async fn insert_text_at_start(&self, text: &str) -> Result<(), BridgeError> {
        lock(&self.pending).push(text.to_string());
        Ok(())
    }

    async fn sync(&self) -> Result<(), BridgeError> {
        let edits: Vec<String> = std::mem::take(&mut *lock(&self.pending));
        if edits.is_empty() {
            return Ok(());
        }

        let mut content = self.read_contents().await?;
        let total_chars = content.chars().count();
        let caret = self.caret().unwrap_or(total_chars).min(total_chars);

        let inserted: String = edits.concat();
        content.insert_str(byte_index(&content, caret), &inserted);

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| BridgeError::Write {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }
        tokio::fs::write(&self.path, content)
            .await
            .map_err(|source| BridgeError::Write {
                path: self.path.clone(),
                source,
            })?;

        *lock(&self.caret) = Some(caret + inserted.chars().count());
        debug!(
            path = %self.path.display(),
            edits = edits.len(),
            caret,
            "document synced"
        );
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════
// SYSTEM CLIPBOARD
// ═══════════════════════════════════════════════════════════════

/// arboard-backed clipboard
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClipboard;

impl ClipboardWriter for SystemClipboard {
    fn write_text(&self, text: &str) -> Result<(), BridgeError> {
        let mut clipboard =
            arboard::Clipboard::new().map_err(|e| BridgeError::Clipboard(e.to_string()))?;
        clipboard
            .set_text(text)
            .map_err(|e| BridgeError::Clipboard(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[derive(Default)]
    struct RecordingEditor {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl DocumentEditor for RecordingEditor {
        async fn insert_text_at_start(&self, text: &str) -> Result<(), BridgeError> {
            lock(&self.calls).push(format!("insert:{}", text));
            Ok(())
        }

        async fn sync(&self) -> Result<(), BridgeError> {
            lock(&self.calls).push("sync".into());
            Ok(())
        }
    }

    struct BrokenClipboard;

    impl ClipboardWriter for BrokenClipboard {
        fn write_text(&self, _text: &str) -> Result<(), BridgeError> {
            Err(BridgeError::Clipboard("no display".into()))
        }
    }

    #[tokio::test]
    async fn test_insert_then_sync() {
        let editor = RecordingEditor::default();
        insert_at_selection(&editor, "hello").await.unwrap();
        assert_eq!(*lock(&editor.calls), vec!["insert:hello", "sync"]);
    }

    #[tokio::test]
    async fn test_file_document_appends_by_default() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("doc.txt");
        std::fs::write(&path, "Dear team,\n").unwrap();

        let doc = FileDocument::new(&path);
        assert_eq!(doc.path(), path.as_path());
        insert_at_selection(&doc, "hello").await.unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "Dear team,\nhello");
        assert_eq!(doc.caret(), Some(16));
    }

    #[tokio::test]
    async fn test_file_document_inserts_at_caret() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("doc.txt");
        std::fs::write(&path, "héllo world").unwrap();

        let doc = FileDocument::with_caret(&path, 6);
        insert_at_selection(&doc, "big ").await.unwrap();
        insert_at_selection(&doc, "wide ").await.unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "héllo big wide world");
    }

    #[tokio::test]
    async fn test_file_document_edit_waits_for_sync() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("doc.txt");

        let doc = FileDocument::with_caret(&path, 99);
        doc.insert_text_at_start("draft").await.unwrap();
        assert!(!path.exists());

        doc.sync().await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "draft");
        assert_eq!(doc.caret(), Some(5));
    }

    #[test]
    fn test_clipboard_failure_is_reported() {
        let err = copy_to_clipboard(&BrokenClipboard, "text").unwrap_err();
        assert_eq!(err.to_string(), "Clipboard unavailable: no display");
    }
}
