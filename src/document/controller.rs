use crate::document::{
    buffer::{ChangeStream, TextBuffer},
    cancellation::{CancelScope, SnapshotCancellationToken},
    context::{ParseTimings, ParsingExecutionContext, TimingCell},
    item::ParseItemList,
    parser::{ParseError, Parser},
    report::{ErrorReporter, LogReporter, ParseFailure},
    snapshot::{Snapshot, SnapshotTextProvider},
    tree::DocumentTree,
};
use arc_swap::ArcSwap;
use log::{debug, trace};
use std::{
    path::{Path, PathBuf},
    sync::{Arc, Mutex, PoisonError, Weak},
};
use tokio::{
    runtime::Handle,
    sync::broadcast::{self, error::RecvError},
    task::JoinHandle,
};

const TREE_CHANGED_CAPACITY: usize = 16;

/// Published once per accepted tree replacement.
#[derive(Clone, Debug)]
pub struct TreeChanged {
    pub previous: Arc<DocumentTree>,
    pub current: Arc<DocumentTree>,
}

/// What became of one scheduled parse.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParseOutcome {
    /// The tree for this version is now current.
    Applied { version: u64 },
    /// The buffer moved on before the result could be committed.
    Stale,
    /// The parser reported an error; the previous tree was kept.
    Failed,
    /// A tree for this or a newer version had already been accepted.
    Superseded,
}

#[derive(Clone)]
pub struct ControllerOptions {
    pub reporter: Arc<dyn ErrorReporter>,
    /// Dump every accepted tree at debug level.
    pub dump_tree: bool,
    /// Log the tokenization and parse durations of each successful parse.
    pub log_timings: bool,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            reporter: Arc::new(LogReporter),
            dump_tree: false,
            log_timings: true,
        }
    }
}

/// Owns the current [`DocumentTree`] of one document and keeps it in step with its buffer.
pub struct DocumentController<P: Parser> {
    inner: Arc<ControllerInner<P>>,
}

impl<P: Parser> Clone for DocumentController<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct ControllerInner<P: Parser> {
    buffer: Arc<dyn TextBuffer>,
    parser: Arc<P>,
    options: ControllerOptions,
    file_path: Option<PathBuf>,
    tree: ArcSwap<DocumentTree>,
    tree_changed: broadcast::Sender<TreeChanged>,
    commit_lock: Mutex<()>,
    timings: TimingCell,
    scope: Arc<CancelScope>,
    runtime: Handle,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl<P: Parser> DocumentController<P> {
    /// Start observing `buffer` and schedule a parse of its current snapshot.
    ///
    /// # Panics
    ///
    /// Must be called from within a Tokio runtime; parses are spawned onto it.
    pub fn attach(buffer: Arc<dyn TextBuffer>, parser: Arc<P>, options: ControllerOptions) -> Self {
        let runtime = Handle::current();
        // Subscribe before reading the snapshot so no edit falls in between.
        let changes = buffer.subscribe();
        let initial = buffer.current_snapshot();
        let file_path = buffer.file_path().map(Path::to_path_buf);
        let (tree_changed, _) = broadcast::channel(TREE_CHANGED_CAPACITY);

        let controller = Self {
            inner: Arc::new(ControllerInner {
                buffer,
                parser,
                options,
                file_path,
                tree: ArcSwap::from_pointee(DocumentTree::empty()),
                tree_changed,
                commit_lock: Mutex::new(()),
                timings: TimingCell::default(),
                scope: Arc::new(CancelScope::default()),
                runtime: runtime.clone(),
                listener: Mutex::new(None),
            }),
        };

        let listener = runtime.spawn(listen(Arc::downgrade(&controller.inner), changes));
        *controller.inner.lock_listener() = Some(listener);

        controller.schedule(initial);
        controller
    }

    /// Handle a change notification. Notifications for snapshots that are already superseded are
    /// dropped without scheduling anything.
    pub fn on_change(&self, snapshot: Snapshot) -> Option<JoinHandle<ParseOutcome>> {
        if self.inner.scope.is_cancelled() {
            return None;
        }
        if !self.inner.buffer.current_snapshot().is_same(&snapshot) {
            trace!("ignoring stale change notification for version {}", snapshot.version());
            return None;
        }
        Some(self.schedule(snapshot))
    }

    /// Parse `snapshot` in the background. Never blocks on the parse.
    pub fn schedule(&self, snapshot: Snapshot) -> JoinHandle<ParseOutcome> {
        debug!("scheduling parse of version {}", snapshot.version());
        let inner = Arc::clone(&self.inner);
        self.inner
            .runtime
            .spawn(async move { inner.reparse(snapshot).await })
    }

    /// The most recently accepted tree, or the empty tree before the first one.
    pub fn current_tree(&self) -> Arc<DocumentTree> {
        self.inner.tree.load_full()
    }

    /// Receive [`TreeChanged`] events. Events are delivered on whichever task polls the receiver.
    pub fn subscribe(&self) -> broadcast::Receiver<TreeChanged> {
        self.inner.tree_changed.subscribe()
    }

    /// Durations of the parse that produced the current tree.
    pub fn last_timings(&self) -> ParseTimings {
        self.inner.timings.load()
    }

    pub fn buffer(&self) -> &Arc<dyn TextBuffer> {
        &self.inner.buffer
    }

    pub fn file_path(&self) -> Option<&Path> {
        self.inner.file_path.as_deref()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.scope.is_cancelled()
    }

    /// Stop observing the buffer. Parses still in flight are cancelled and never committed.
    pub fn close(&self) {
        self.inner.scope.cancel();
        if let Some(listener) = self.inner.lock_listener().take() {
            listener.abort();
        }
    }
}

impl<P: Parser> ControllerInner<P> {
    fn lock_listener(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        self.listener.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn reparse(self: Arc<Self>, snapshot: Snapshot) -> ParseOutcome {
        #[cfg(feature = "tracing")]
        let _timer = crate::document::PhaseTimer::new(snapshot.version(), "parse");

        let token = SnapshotCancellationToken::new(
            snapshot.clone(),
            Arc::clone(&self.buffer),
            Arc::clone(&self.scope),
        );
        let context = Arc::new(ParsingExecutionContext::new(token));

        // A panicking parser must not take the controller down with it.
        let parse = {
            let parser = Arc::clone(&self.parser);
            let context = Arc::clone(&context);
            let provider = SnapshotTextProvider::new(snapshot.clone());
            self.runtime
                .spawn(async move { parser.parse(&provider, &context).await })
        };
        let result = match parse.await {
            Ok(result) => result,
            Err(err) => Err(ParseError::Internal(format!("parse task failed: {err}"))),
        };

        self.finish(snapshot, result, &context)
    }

    fn finish(
        &self,
        snapshot: Snapshot,
        result: Result<ParseItemList, ParseError>,
        context: &ParsingExecutionContext,
    ) -> ParseOutcome {
        let version = snapshot.version();
        let items = match result {
            Ok(items) => items,
            Err(error) if error.is_cancelled() => {
                trace!("parse of version {version} abandoned");
                return ParseOutcome::Stale;
            }
            Err(error) => {
                if !self.scope.is_cancelled() {
                    self.options.reporter.report(&ParseFailure {
                        version,
                        file_path: self.file_path.clone(),
                        error,
                    });
                }
                return ParseOutcome::Failed;
            }
        };

        let current = {
            let _guard = self
                .commit_lock
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if self.scope.is_cancelled() || !self.buffer.current_snapshot().is_same(&snapshot) {
                trace!("discarding stale parse of version {version}");
                return ParseOutcome::Stale;
            }
            let previous = self.tree.load_full();
            if previous
                .version()
                .is_some_and(|accepted| accepted >= version)
            {
                return ParseOutcome::Superseded;
            }

            let current = Arc::new(DocumentTree::new(snapshot, items));
            self.tree.store(Arc::clone(&current));
            // Timings follow the tree they produced.
            self.timings.store(context.timings());
            // Nobody listening is fine.
            let _ = self.tree_changed.send(TreeChanged {
                previous,
                current: Arc::clone(&current),
            });
            current
        };

        debug!("applied tree for version {version}");
        if self.options.log_timings {
            let timings = context.timings();
            debug!(
                "Last Token {:.2}",
                timings.last_tokenization_duration.as_secs_f64() * 1000.0
            );
            debug!(
                "Last Parse {:.2}",
                timings.last_parsing_duration.as_secs_f64() * 1000.0
            );
        }
        if self.options.dump_tree {
            for line in current.dump() {
                debug!("{line}");
            }
        }
        ParseOutcome::Applied { version }
    }
}

impl<P: Parser> Drop for ControllerInner<P> {
    fn drop(&mut self) {
        self.scope.cancel();
        if let Some(listener) = self.lock_listener().take() {
            listener.abort();
        }
    }
}

async fn listen<P: Parser>(inner: Weak<ControllerInner<P>>, mut changes: ChangeStream) {
    loop {
        let received = changes.recv().await;
        let Some(inner) = inner.upgrade() else {
            break;
        };
        let snapshot = match received {
            Ok(snapshot) => snapshot,
            Err(RecvError::Lagged(skipped)) => {
                debug!("missed {skipped} change notifications; reparsing live snapshot");
                inner.buffer.current_snapshot()
            }
            Err(RecvError::Closed) => break,
        };
        DocumentController { inner }.on_change(snapshot);
    }
}
