use crate::document::{
    buffer::TextBuffer,
    controller::{ControllerOptions, DocumentController},
    parser::Parser,
};
use arc_swap::ArcSwap;
use dashmap::DashMap;
use log::debug;
use rapidhash::fast::RandomState;
use std::sync::Arc;

/// Identity of a logical document, e.g. its URI.
pub type DocumentId = String;

/// One [`DocumentController`] per open document.
///
/// Controllers are created on first use and torn down by [`close`](Self::close) or
/// [`shutdown`](Self::shutdown). A registry lives as long as the editing session that owns it.
pub struct DocumentRegistry<P: Parser> {
    parser: Arc<P>,
    options: ArcSwap<ControllerOptions>,
    controllers: DashMap<DocumentId, DocumentController<P>, RandomState>,
}

impl<P: Parser> DocumentRegistry<P> {
    pub fn new(parser: Arc<P>, options: ControllerOptions) -> Self {
        Self {
            parser,
            options: ArcSwap::from_pointee(options),
            controllers: DashMap::with_hasher(RandomState::new()),
        }
    }

    /// The controller for `id`, attaching one to `buffer` if the document has none yet.
    ///
    /// `buffer` is only used on first attachment.
    pub fn get_or_attach(
        &self,
        id: &str,
        buffer: impl FnOnce() -> Arc<dyn TextBuffer>,
    ) -> DocumentController<P> {
        self.controllers
            .entry(id.to_string())
            .or_insert_with(|| {
                debug!("attaching controller for {id}");
                DocumentController::attach(
                    buffer(),
                    Arc::clone(&self.parser),
                    self.options.load().as_ref().clone(),
                )
            })
            .clone()
    }

    pub fn get(&self, id: &str) -> Option<DocumentController<P>> {
        self.controllers.get(id).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.controllers.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.controllers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.controllers.is_empty()
    }

    /// Tear down the controller for `id`. Returns whether one was registered.
    pub fn close(&self, id: &str) -> bool {
        match self.controllers.remove(id) {
            Some((_, controller)) => {
                debug!("closing controller for {id}");
                controller.close();
                true
            }
            None => false,
        }
    }

    /// Tear down every controller.
    pub fn shutdown(&self) {
        let ids: Vec<DocumentId> = self
            .controllers
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        for id in ids {
            self.close(&id);
        }
    }

    /// Replace the options used for controllers attached from now on.
    pub fn set_options(&self, options: ControllerOptions) {
        self.options.store(Arc::new(options));
    }
}

impl<P: Parser> Drop for DocumentRegistry<P> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{document::buffer::EditorBuffer, scss_lang::ScssParser};

    fn registry() -> DocumentRegistry<ScssParser> {
        DocumentRegistry::new(Arc::new(ScssParser::default()), ControllerOptions::default())
    }

    #[tokio::test]
    async fn attaches_once_per_document() {
        let registry = registry();
        let buffer: Arc<dyn TextBuffer> = Arc::new(EditorBuffer::new("$a: 1;"));

        let first = registry.get_or_attach("file:///a.scss", || Arc::clone(&buffer));
        let second = registry.get_or_attach("file:///a.scss", || {
            panic!("second attach must reuse the existing controller")
        });

        assert!(Arc::ptr_eq(first.buffer(), second.buffer()));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn close_tears_down_controller() {
        let registry = registry();
        let controller = registry.get_or_attach("file:///a.scss", || {
            Arc::new(EditorBuffer::new("$a: 1;"))
        });

        assert!(registry.close("file:///a.scss"));
        assert!(controller.is_closed());
        assert!(!registry.contains("file:///a.scss"));
        assert!(!registry.close("file:///a.scss"));
    }

    #[tokio::test]
    async fn shutdown_closes_everything() {
        let registry = registry();
        let a = registry.get_or_attach("a", || Arc::new(EditorBuffer::new("")));
        let b = registry.get_or_attach("b", || Arc::new(EditorBuffer::new("")));

        registry.shutdown();

        assert!(registry.is_empty());
        assert!(a.is_closed() && b.is_closed());
    }
}
