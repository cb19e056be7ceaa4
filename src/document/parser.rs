use crate::document::{
    context::ParsingExecutionContext, item::ParseItemList, snapshot::TextProvider,
};
use std::future::Future;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The parse noticed its snapshot is no longer live and gave up.
    #[error("parse of version {version} cancelled")]
    Cancelled { version: u64 },
    #[error("syntax error at {offset}: {message}")]
    Syntax { message: String, offset: usize },
    #[error("parser failure: {0}")]
    Internal(String),
}

impl ParseError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ParseError::Cancelled { .. })
    }
}

/// Turns a text provider into a parse item list.
///
/// Implementations must be reentrant: the controller starts a parse for a newer snapshot while
/// older ones may still be running. Anything mutable belongs in the per-call
/// [`ParsingExecutionContext`], which also carries the cancellation token. Polling that token is
/// optional; stale results are discarded at commit time either way.
pub trait Parser: Send + Sync + 'static {
    fn parse<'a>(
        &'a self,
        text: &'a dyn TextProvider,
        context: &'a ParsingExecutionContext,
    ) -> impl Future<Output = Result<ParseItemList, ParseError>> + Send + 'a;
}
