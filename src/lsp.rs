use crate::{
    document::{DocumentRegistry, DocumentTree, EditorBuffer, Snapshot, TextBuffer},
    lsp::{
        config::{CompletionConfig, ServerConfig},
        position::position_to_offset,
        reporter::ClientReporter,
    },
    scss_lang::ScssParser,
};
use dashmap::DashMap;
use log::debug;
use rapidhash::fast::RandomState;
use std::sync::{Arc, PoisonError, RwLock};
use tower_lsp_server::{Client, LanguageServer, jsonrpc::Result, ls_types::*};

pub mod completion;
pub mod config;
pub mod hover;
pub mod position;
pub mod reporter;
pub mod symbols;

pub struct SassyLanguageServer {
    pub client: Client,
    buffers: DashMap<String, Arc<EditorBuffer>, RandomState>,
    documents: DocumentRegistry<ScssParser>,
    config: RwLock<ServerConfig>,
}

impl SassyLanguageServer {
    pub fn new(client: Client) -> Self {
        Self::with_config(client, ServerConfig::default())
    }

    pub fn with_config(client: Client, config: ServerConfig) -> Self {
        let reporter = Arc::new(ClientReporter::new(client.clone()));
        let documents =
            DocumentRegistry::new(Arc::new(ScssParser::default()), config.controller_options(reporter));
        Self {
            client,
            buffers: DashMap::with_hasher(RandomState::new()),
            documents,
            config: RwLock::new(config),
        }
    }

    /// The last accepted tree for `uri`.
    pub fn tree_for(&self, uri: &Uri) -> Option<Arc<DocumentTree>> {
        self.documents
            .get(&uri.to_string())
            .map(|controller| controller.current_tree())
    }

    /// What the editor currently shows for `uri`, possibly ahead of [`tree_for`](Self::tree_for).
    pub fn live_snapshot(&self, uri: &Uri) -> Option<Snapshot> {
        self.buffers
            .get(&uri.to_string())
            .map(|buffer| buffer.current_snapshot())
    }

    pub fn completion_config(&self) -> CompletionConfig {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .completion()
            .clone()
    }

    fn apply_settings(&self, settings: serde_json::Value) {
        let mut config = self.config.write().unwrap_or_else(PoisonError::into_inner);
        config.apply_settings(settings);
        let reporter = Arc::new(ClientReporter::new(self.client.clone()));
        self.documents
            .set_options(config.controller_options(reporter));
    }
}

impl LanguageServer for SassyLanguageServer {
    async fn initialize(&self, params: InitializeParams) -> Result<InitializeResult> {
        if let Some(options) = params.initialization_options {
            self.apply_settings(options);
        }

        Ok(InitializeResult {
            server_info: Some(ServerInfo {
                name: env!("CARGO_PKG_NAME").to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
            capabilities: ServerCapabilities {
                text_document_sync: Some(TextDocumentSyncCapability::Kind(
                    TextDocumentSyncKind::INCREMENTAL,
                )),
                completion_provider: Some(CompletionOptions {
                    resolve_provider: Some(false),
                    trigger_characters: Some(vec!["$".to_string(), "@".to_string()]),
                    ..Default::default()
                }),
                hover_provider: Some(HoverProviderCapability::Simple(true)),
                document_symbol_provider: Some(OneOf::Left(true)),
                ..ServerCapabilities::default()
            },
            #[cfg(feature = "proposed")]
            offset_encoding: None,
        })
    }

    async fn initialized(&self, _: InitializedParams) {
        self.client
            .log_message(MessageType::INFO, "initialized!")
            .await;
    }

    async fn shutdown(&self) -> Result<()> {
        self.documents.shutdown();
        self.buffers.clear();
        Ok(())
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        let uri_key = params.text_document.uri.to_string();
        let text = params.text_document.text;
        debug!("file opened: {uri_key}");

        if let Some(buffer) = self.buffers.get(&uri_key) {
            buffer.replace(&text);
            return;
        }

        let mut buffer = EditorBuffer::new(&text);
        if let Some(path) = uri_key.strip_prefix("file://") {
            buffer = buffer.with_file_path(path);
        }
        let buffer = Arc::new(buffer);
        self.buffers.insert(uri_key.clone(), Arc::clone(&buffer));
        self.documents.get_or_attach(&uri_key, || buffer as Arc<dyn TextBuffer>);
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        let DidChangeTextDocumentParams {
            text_document,
            content_changes,
        } = params;

        let uri_key = text_document.uri.to_string();
        let Some(buffer) = self.buffers.get(&uri_key).map(|entry| Arc::clone(entry.value())) else {
            debug!("change for unopened document {uri_key}");
            return;
        };

        buffer.update(|rope| {
            for change in content_changes {
                let Some(range) = change.range else {
                    *rope = ropey::Rope::from_str(&change.text);
                    continue;
                };

                let doc_len = rope.len_chars();
                let start_offset = position_to_offset(range.start, rope)
                    .unwrap_or(doc_len)
                    .min(doc_len);
                let end_offset = position_to_offset(range.end, rope)
                    .unwrap_or(start_offset)
                    .min(doc_len);

                if end_offset < start_offset {
                    continue;
                }

                rope.remove(start_offset..end_offset);
                rope.insert(start_offset, &change.text);
            }
        });
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        let uri_key = params.text_document.uri.to_string();
        debug!("file closed: {uri_key}");
        self.documents.close(&uri_key);
        self.buffers.remove(&uri_key);
    }

    async fn did_change_configuration(&self, params: DidChangeConfigurationParams) {
        self.apply_settings(params.settings);
    }

    async fn completion(&self, params: CompletionParams) -> Result<Option<CompletionResponse>> {
        completion::completion(self, params)
    }

    async fn hover(&self, params: HoverParams) -> Result<Option<Hover>> {
        hover::hover(self, params)
    }

    async fn document_symbol(
        &self,
        params: DocumentSymbolParams,
    ) -> Result<Option<DocumentSymbolResponse>> {
        symbols::document_symbol(self, params)
    }
}
