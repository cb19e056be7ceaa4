use crate::document::{
    completion::DeclarationIndex,
    item::{ParseItem, ParseItemList},
    snapshot::{Snapshot, SnapshotTextProvider},
};
use once_cell::sync::OnceCell;
use std::fmt;

/// A snapshot paired with the items parsed from it.
///
/// Trees are replaced, never edited; holders of an older tree keep a consistent view for as long
/// as they hold it.
#[derive(Default)]
pub struct DocumentTree {
    snapshot: Option<Snapshot>,
    items: ParseItemList,
    declarations: OnceCell<DeclarationIndex>,
}

impl DocumentTree {
    pub fn new(snapshot: Snapshot, items: ParseItemList) -> Self {
        Self {
            snapshot: Some(snapshot),
            items,
            declarations: OnceCell::new(),
        }
    }

    /// The tree a controller reports before its first accepted parse.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot.is_none()
    }

    pub fn snapshot(&self) -> Option<&Snapshot> {
        self.snapshot.as_ref()
    }

    pub fn version(&self) -> Option<u64> {
        self.snapshot.as_ref().map(Snapshot::version)
    }

    pub fn items(&self) -> &ParseItemList {
        &self.items
    }

    /// Source accessor bound to the snapshot this tree was parsed from.
    pub fn source_text(&self) -> Option<SnapshotTextProvider> {
        self.snapshot.clone().map(SnapshotTextProvider::new)
    }

    /// Items covering `offset`, outermost first.
    pub fn item_path_at(&self, offset: usize) -> Vec<&ParseItem> {
        self.items.path_at(offset)
    }

    pub fn dump(&self) -> Vec<String> {
        match self.source_text() {
            Some(source) => self.items.dump(&source),
            None => Vec::new(),
        }
    }

    pub(crate) fn declarations(&self) -> &DeclarationIndex {
        self.declarations
            .get_or_init(|| DeclarationIndex::build(self))
    }
}

impl fmt::Debug for DocumentTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentTree")
            .field("version", &self.version())
            .field("items", &self.items.len())
            .finish()
    }
}
