use crate::{
    document::{
        CompletionValue, CompletionValueKind, DocumentTree, Snapshot, derive_completions_in,
        snapshot::SnapshotTextProvider,
    },
    lsp::{
        SassyLanguageServer,
        config::CompletionConfig,
        position::{position_to_offset, span_to_range},
    },
};
use ropey::Rope;
use tower_lsp_server::{
    jsonrpc::Result,
    ls_types::{
        CompletionItem, CompletionItemKind, CompletionParams, CompletionResponse,
        CompletionTextEdit, Position, TextEdit,
    },
};

pub fn completion(
    server: &SassyLanguageServer,
    params: CompletionParams,
) -> Result<Option<CompletionResponse>> {
    let config = server.completion_config();
    if !config.enabled {
        return Ok(None);
    }

    let uri = params.text_document_position.text_document.uri;
    let (Some(tree), Some(live)) = (server.tree_for(&uri), server.live_snapshot(&uri)) else {
        return Ok(None);
    };
    let position = params.text_document_position.position;
    let items = completion_items(&tree, &live, position, &config);

    #[cfg(feature = "tracing")]
    tracing::debug!(target = "completion", version = tree.version(), items = items.len());

    Ok(Some(CompletionResponse::Array(items)))
}

/// Completion items at an LSP position in `live`, the text the editor shows. The tree may lag
/// behind it; edits are still expressed in `live` coordinates.
pub fn completion_items(
    tree: &DocumentTree,
    live: &Snapshot,
    position: Position,
    config: &CompletionConfig,
) -> Vec<CompletionItem> {
    let rope = live.rope();
    let offset = position_to_offset(position, rope).unwrap_or_else(|| rope.len_chars());
    let text = SnapshotTextProvider::new(live.clone());

    derive_completions_in(tree, &text, offset)
        .iter()
        .map(|value| completion_item(value, rope, config))
        .collect()
}

fn completion_item(value: &CompletionValue, rope: &Rope, config: &CompletionConfig) -> CompletionItem {
    let text_edit = span_to_range(value.span(), rope).map(|range| {
        CompletionTextEdit::Edit(TextEdit::new(range, value.completion_text().to_string()))
    });
    CompletionItem {
        label: value.display_text().to_string(),
        kind: Some(completion_kind(value.kind())),
        detail: config
            .include_descriptions
            .then(|| value.description().map(str::to_string))
            .flatten(),
        filter_text: Some(value.completion_text().to_string()),
        insert_text: text_edit
            .is_none()
            .then(|| value.completion_text().to_string()),
        text_edit,
        ..Default::default()
    }
}

fn completion_kind(kind: CompletionValueKind) -> CompletionItemKind {
    match kind {
        CompletionValueKind::Variable => CompletionItemKind::VARIABLE,
        CompletionValueKind::Mixin => CompletionItemKind::MODULE,
        CompletionValueKind::Function => CompletionItemKind::FUNCTION,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{document::Snapshot, scss_lang};
    use tower_lsp_server::ls_types::Range;

    fn tree(text: &str) -> DocumentTree {
        let items = scss_lang::parse(text).expect("valid scss");
        DocumentTree::new(Snapshot::from_text(1, text), items)
    }

    fn items_at(
        tree: &DocumentTree,
        position: Position,
        config: &CompletionConfig,
    ) -> Vec<CompletionItem> {
        let live = tree.snapshot().expect("parsed tree").clone();
        completion_items(tree, &live, position, config)
    }

    #[test]
    fn items_replace_the_word_under_the_cursor() {
        let tree = tree("$primary: red;\n.a { color: $pr }");
        let items = items_at(&tree, Position::new(1, 15), &CompletionConfig::default());

        let item = items
            .iter()
            .find(|item| item.label == "$primary")
            .expect("variable offered");
        assert_eq!(item.kind, Some(CompletionItemKind::VARIABLE));
        assert_eq!(item.detail.as_deref(), Some("red"));
        let Some(CompletionTextEdit::Edit(edit)) = &item.text_edit else {
            panic!("expected a text edit");
        };
        assert_eq!(edit.new_text, "primary");
        assert_eq!(
            edit.range,
            Range::new(Position::new(1, 13), Position::new(1, 15))
        );
    }

    #[test]
    fn descriptions_can_be_disabled() {
        let tree = tree("$primary: red;\n.a { color: $ }");
        let config = CompletionConfig {
            include_descriptions: false,
            ..CompletionConfig::default()
        };
        let items = items_at(&tree, Position::new(1, 13), &config);
        assert!(!items.is_empty());
        assert!(items.iter().all(|item| item.detail.is_none()));
    }

    #[test]
    fn sigil_typed_after_last_parse_is_not_repeated() {
        let tree = tree("$primary: red;\n.a { color:  }");
        let live = Snapshot::from_text(2, "$primary: red;\n.a { color: $ }");
        let config = CompletionConfig::default();
        let items = completion_items(&tree, &live, Position::new(1, 13), &config);

        let item = items
            .iter()
            .find(|item| item.label == "$primary")
            .expect("variable offered");
        let Some(CompletionTextEdit::Edit(edit)) = &item.text_edit else {
            panic!("expected a text edit");
        };
        assert_eq!(edit.new_text, "primary");
        assert_eq!(
            edit.range,
            Range::new(Position::new(1, 13), Position::new(1, 13))
        );
    }
}
