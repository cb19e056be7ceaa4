//! Live syntax tree for an edited document.
//!
//! A [`DocumentController`] watches a [`TextBuffer`], parses each new [`Snapshot`] in the
//! background and swaps in the resulting [`DocumentTree`] only if that snapshot is still live when
//! the parse finishes. Completion candidates are derived from accepted trees.

pub mod buffer;
pub mod cancellation;
pub mod completion;
pub mod context;
pub mod controller;
pub mod item;
pub mod parser;
pub mod registry;
pub mod report;
pub mod snapshot;
pub mod span;
pub mod tree;

pub use buffer::{EditorBuffer, TextBuffer};
pub use completion::{
    CompletionSet, CompletionValue, CompletionValueKind, derive_completions, derive_completions_in,
};
pub use controller::{ControllerOptions, DocumentController, ParseOutcome, TreeChanged};
pub use item::{ItemKind, ParseItem, ParseItemList};
pub use parser::{ParseError, Parser};
pub use registry::{DocumentId, DocumentRegistry};
pub use snapshot::{Snapshot, TextProvider};
pub use span::Span;
pub use tree::DocumentTree;

#[cfg(feature = "tracing")]
pub(crate) struct PhaseTimer {
    version: u64,
    phase: &'static str,
    start: std::time::Instant,
}

#[cfg(feature = "tracing")]
impl PhaseTimer {
    pub(crate) fn new(version: u64, phase: &'static str) -> Self {
        tracing::trace!(target = "document", version, phase, "start");
        Self {
            version,
            phase,
            start: std::time::Instant::now(),
        }
    }
}

#[cfg(feature = "tracing")]
impl Drop for PhaseTimer {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed();
        tracing::debug!(
            target = "document",
            version = self.version,
            phase = self.phase,
            elapsed_us = elapsed.as_micros()
        );
    }
}
