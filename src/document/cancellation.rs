use crate::document::{buffer::TextBuffer, parser::ParseError, snapshot::Snapshot};
use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

/// Shared switch that cancels every token issued under it, used when a controller is closed.
#[derive(Debug, Default)]
pub struct CancelScope {
    closed: AtomicBool,
}

impl CancelScope {
    pub fn cancel(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Advisory cancellation for one parse.
///
/// Requested as soon as the live snapshot of the bound buffer is no longer the snapshot being
/// parsed. Snapshot versions only move forward, so once requested it stays requested.
#[derive(Clone)]
pub struct SnapshotCancellationToken {
    target: Snapshot,
    live: Option<Arc<dyn TextBuffer>>,
    scope: Arc<CancelScope>,
}

impl SnapshotCancellationToken {
    pub fn new(target: Snapshot, live: Arc<dyn TextBuffer>, scope: Arc<CancelScope>) -> Self {
        Self {
            target,
            live: Some(live),
            scope,
        }
    }

    /// A token with no live buffer behind it; only an explicit scope cancel requests it.
    pub fn detached(target: Snapshot) -> Self {
        Self {
            target,
            live: None,
            scope: Arc::new(CancelScope::default()),
        }
    }

    pub fn target(&self) -> &Snapshot {
        &self.target
    }

    pub fn is_cancellation_requested(&self) -> bool {
        if self.scope.is_cancelled() {
            return true;
        }
        match &self.live {
            Some(buffer) => !buffer.current_snapshot().is_same(&self.target),
            None => false,
        }
    }

    pub fn ensure_active(&self) -> Result<(), ParseError> {
        if self.is_cancellation_requested() {
            Err(ParseError::Cancelled {
                version: self.target.version(),
            })
        } else {
            Ok(())
        }
    }

    /// Let other tasks run, then check whether this parse is still wanted.
    pub async fn yield_and_check(&self) -> Result<(), ParseError> {
        tokio::task::yield_now().await;
        self.ensure_active()
    }

    pub fn cancel(&self) {
        self.scope.cancel();
    }
}

impl fmt::Debug for SnapshotCancellationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnapshotCancellationToken")
            .field("target", &self.target.version())
            .field("requested", &self.is_cancellation_requested())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::buffer::EditorBuffer;

    #[test]
    fn requested_once_buffer_moves_on() {
        let buffer = Arc::new(EditorBuffer::new("$a: 1;"));
        let target = buffer.current_snapshot();
        let token = SnapshotCancellationToken::new(
            target,
            buffer.clone(),
            Arc::new(CancelScope::default()),
        );
        assert!(!token.is_cancellation_requested());
        assert!(token.ensure_active().is_ok());

        buffer.replace("$a: 2;");
        assert!(token.is_cancellation_requested());
        assert!(matches!(
            token.ensure_active(),
            Err(ParseError::Cancelled { version: 0 })
        ));
    }

    #[test]
    fn scope_cancel_applies_to_clones() {
        let token = SnapshotCancellationToken::detached(Snapshot::from_text(1, ""));
        let clone = token.clone();
        assert!(!clone.is_cancellation_requested());
        token.cancel();
        assert!(clone.is_cancellation_requested());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn yield_and_check_observes_concurrent_edit() {
        let buffer = Arc::new(EditorBuffer::new("a {}"));
        let token = SnapshotCancellationToken::new(
            buffer.current_snapshot(),
            buffer.clone(),
            Arc::new(CancelScope::default()),
        );

        let editor = {
            let buffer = Arc::clone(&buffer);
            tokio::spawn(async move {
                buffer.replace("b {}");
            })
        };

        let outcome = token.yield_and_check().await;
        editor.await.unwrap();
        assert!(outcome.is_err());
    }
}
