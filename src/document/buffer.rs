use crate::document::snapshot::Snapshot;
use arc_swap::ArcSwap;
use ropey::Rope;
use std::{
    path::{Path, PathBuf},
    sync::{Arc, Mutex, PoisonError},
};
use tokio::sync::broadcast;

const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// Stream of snapshots published after each edit, in version order.
pub type ChangeStream = broadcast::Receiver<Snapshot>;

/// Host text buffer observed by a document controller.
pub trait TextBuffer: Send + Sync + 'static {
    /// The buffer's live snapshot.
    fn current_snapshot(&self) -> Snapshot;

    /// Subscribe to change notifications. Only edits made after this call are delivered.
    fn subscribe(&self) -> ChangeStream;

    /// Optional metadata; a missing path never blocks attachment.
    fn file_path(&self) -> Option<&Path> {
        None
    }
}

/// In-process [`TextBuffer`] backed by a rope.
#[derive(Debug)]
pub struct EditorBuffer {
    current: ArcSwap<Snapshot>,
    changes: broadcast::Sender<Snapshot>,
    edit_lock: Mutex<()>,
    file_path: Option<PathBuf>,
}

impl EditorBuffer {
    pub fn new(text: &str) -> Self {
        Self::with_version(0, text)
    }

    pub fn with_version(version: u64, text: &str) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            current: ArcSwap::from_pointee(Snapshot::from_text(version, text)),
            changes,
            edit_lock: Mutex::new(()),
            file_path: None,
        }
    }

    pub fn with_file_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.file_path = Some(path.into());
        self
    }

    /// Replace the whole text, returning the new live snapshot.
    pub fn replace(&self, text: &str) -> Snapshot {
        self.edit(|_| Rope::from_str(text))
    }

    /// Replace the characters in `start..end` with `text`. Offsets are clamped to the document.
    pub fn apply_edit(&self, start: usize, end: usize, text: &str) -> Snapshot {
        self.edit(|rope| {
            let mut rope = rope.clone();
            let doc_len = rope.len_chars();
            let start = start.min(doc_len);
            let end = end.min(doc_len).max(start);
            rope.remove(start..end);
            rope.insert(start, text);
            rope
        })
    }

    /// Apply an arbitrary change to a copy of the text, published as a single new version.
    pub fn update(&self, f: impl FnOnce(&mut Rope)) -> Snapshot {
        self.edit(|rope| {
            let mut rope = rope.clone();
            f(&mut rope);
            rope
        })
    }

    fn edit(&self, f: impl FnOnce(&Rope) -> Rope) -> Snapshot {
        let _guard = self
            .edit_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let previous = self.current.load_full();
        let snapshot = Snapshot::new(previous.version() + 1, f(previous.rope()));
        self.current.store(Arc::new(snapshot.clone()));
        // No receivers is not an error: nobody is attached yet.
        let _ = self.changes.send(snapshot.clone());
        snapshot
    }
}

impl TextBuffer for EditorBuffer {
    fn current_snapshot(&self) -> Snapshot {
        self.current.load().as_ref().clone()
    }

    fn subscribe(&self) -> ChangeStream {
        self.changes.subscribe()
    }

    fn file_path(&self) -> Option<&Path> {
        self.file_path.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edits_bump_version_and_notify() {
        let buffer = EditorBuffer::new("$a: 1;");
        let mut changes = buffer.subscribe();

        let v1 = buffer.apply_edit(4, 5, "2");
        let v2 = buffer.replace("$b: 3;");

        assert_eq!(v1.version(), 1);
        assert_eq!(v1.text(0, v1.len()), "$a: 2;");
        assert_eq!(v2.version(), 2);
        assert_eq!(changes.try_recv().expect("first change"), v1);
        assert_eq!(changes.try_recv().expect("second change"), v2);
        assert_eq!(buffer.current_snapshot(), v2);
    }

    #[test]
    fn out_of_range_edit_is_clamped() {
        let buffer = EditorBuffer::new("abc");
        let snapshot = buffer.apply_edit(10, 2, "d");
        assert_eq!(snapshot.text(0, 10), "abcd");
    }

    #[test]
    fn update_produces_one_version() {
        let buffer = EditorBuffer::new("a b");
        let snapshot = buffer.update(|rope| {
            rope.remove(0..1);
            rope.insert(0, "x");
            rope.remove(2..3);
            rope.insert(2, "y");
        });
        assert_eq!(snapshot.version(), 1);
        assert_eq!(snapshot.text(0, 3), "x y");
    }

    #[test]
    fn file_path_is_optional_metadata() {
        let buffer = EditorBuffer::new("");
        assert!(buffer.file_path().is_none());
        let buffer = EditorBuffer::new("").with_file_path("/tmp/site.scss");
        assert_eq!(buffer.file_path(), Some(Path::new("/tmp/site.scss")));
    }
}
