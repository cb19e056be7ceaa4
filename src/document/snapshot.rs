use ropey::Rope;
use std::{fmt, sync::Arc};

/// Immutable, versioned view of a document's text.
///
/// Cloning is cheap. Two snapshots are the same snapshot only when they carry the same version
/// *and* share the same text allocation; contents are never diffed.
#[derive(Clone)]
pub struct Snapshot {
    version: u64,
    text: Arc<Rope>,
}

impl Snapshot {
    pub fn new(version: u64, text: Rope) -> Self {
        Self {
            version,
            text: Arc::new(text),
        }
    }

    pub fn from_text(version: u64, text: &str) -> Self {
        Self::new(version, Rope::from_str(text))
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Length in characters.
    pub fn len(&self) -> usize {
        self.text.len_chars()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn rope(&self) -> &Rope {
        &self.text
    }

    /// Text of `length` characters starting at `start`, clamped to the snapshot bounds.
    pub fn text(&self, start: usize, length: usize) -> String {
        let doc_len = self.len();
        let start = start.min(doc_len);
        let end = start.saturating_add(length).min(doc_len);
        self.text.slice(start..end).to_string()
    }

    pub fn char_at(&self, offset: usize) -> Option<char> {
        self.text.get_char(offset)
    }

    pub fn is_same(&self, other: &Snapshot) -> bool {
        self.version == other.version && Arc::ptr_eq(&self.text, &other.text)
    }
}

impl PartialEq for Snapshot {
    fn eq(&self, other: &Self) -> bool {
        self.is_same(other)
    }
}

impl Eq for Snapshot {}

impl fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Snapshot")
            .field("version", &self.version)
            .field("len", &self.len())
            .finish()
    }
}

/// Read-only character access handed to a parser.
pub trait TextProvider: Send + Sync {
    fn len(&self) -> usize;

    fn text(&self, start: usize, length: usize) -> String;

    fn char_at(&self, offset: usize) -> Option<char>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn full_text(&self) -> String {
        self.text(0, self.len())
    }
}

/// [`TextProvider`] bound to exactly one [`Snapshot`].
#[derive(Clone, Debug)]
pub struct SnapshotTextProvider {
    snapshot: Snapshot,
}

impl SnapshotTextProvider {
    pub fn new(snapshot: Snapshot) -> Self {
        Self { snapshot }
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }
}

impl TextProvider for SnapshotTextProvider {
    fn len(&self) -> usize {
        self.snapshot.len()
    }

    fn text(&self, start: usize, length: usize) -> String {
        self.snapshot.text(start, length)
    }

    fn char_at(&self, offset: usize) -> Option<char> {
        self.snapshot.char_at(offset)
    }

    fn full_text(&self) -> String {
        self.snapshot.rope().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_requires_shared_text() {
        let a = Snapshot::from_text(1, "$x: 1;");
        let b = Snapshot::from_text(1, "$x: 1;");
        assert_eq!(a, a.clone());
        assert_ne!(a, b, "same version and contents but distinct snapshots");
    }

    #[test]
    fn text_extraction_clamps_to_bounds() {
        let snapshot = Snapshot::from_text(3, "a{b:c}");
        let provider = SnapshotTextProvider::new(snapshot);
        assert_eq!(provider.text(2, 3), "b:c");
        assert_eq!(provider.text(4, 100), "c}");
        assert_eq!(provider.text(100, 1), "");
        assert_eq!(provider.char_at(1), Some('{'));
        assert_eq!(provider.char_at(6), None);
    }
}
