pub mod document;
pub mod lsp;
pub mod scss_lang;

pub use lsp::SassyLanguageServer;
