use crate::{
    document::{
        CompletionValue, CompletionValueKind, DocumentTree, TextProvider, derive_completions_in,
        snapshot::SnapshotTextProvider,
    },
    lsp::{
        SassyLanguageServer,
        position::{position_to_offset, span_to_range},
    },
};
use tower_lsp_server::{jsonrpc::Result, ls_types::*};

pub fn hover(server: &SassyLanguageServer, params: HoverParams) -> Result<Option<Hover>> {
    let response = (|| {
        let uri = params.text_document_position_params.text_document.uri;
        let tree = server.tree_for(&uri)?;
        let live = server.live_snapshot(&uri)?;
        let rope = live.rope();
        let offset = position_to_offset(params.text_document_position_params.position, rope)?;

        let value = declaration_at(&tree, &SnapshotTextProvider::new(live.clone()), offset)?;
        Some(Hover {
            contents: hover_contents(&value),
            range: span_to_range(value.span(), rope),
        })
    })();

    Ok(response)
}

/// The visible declaration named by the word under `offset` in `text`, if any.
pub fn declaration_at(
    tree: &DocumentTree,
    text: &dyn TextProvider,
    offset: usize,
) -> Option<CompletionValue> {
    let completions = derive_completions_in(tree, text, offset);
    let span = completions.first()?.span();
    if span.is_empty() {
        return None;
    }
    let word = text.text(span.start(), span.len());
    completions
        .iter()
        .find(|value| value.completion_text() == word)
        .cloned()
}

pub fn hover_contents(value: &CompletionValue) -> HoverContents {
    let signature = match (value.kind(), value.description()) {
        (CompletionValueKind::Variable, Some(detail)) => {
            format!("{}: {detail}", value.display_text())
        }
        (CompletionValueKind::Mixin, detail) => {
            format!("@mixin {}", detail.unwrap_or(value.display_text()))
        }
        (CompletionValueKind::Function, detail) => {
            format!("@function {}", detail.unwrap_or(value.display_text()))
        }
        _ => value.display_text().to_string(),
    };

    HoverContents::Markup(MarkupContent {
        kind: MarkupKind::Markdown,
        value: format!("```scss\n{signature}\n```"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{document::Snapshot, scss_lang};

    fn tree(text: &str) -> DocumentTree {
        let items = scss_lang::parse(text).expect("valid scss");
        DocumentTree::new(Snapshot::from_text(1, text), items)
    }

    fn declaration_in_tree(tree: &DocumentTree, offset: usize) -> Option<CompletionValue> {
        let source = tree.source_text().expect("parsed tree");
        declaration_at(tree, &source, offset)
    }

    #[test]
    fn variable_reference_shows_its_value() {
        let text = "$gutter: 12px;\n.a { margin: $gutter; }";
        let tree = tree(text);
        let offset = text.rfind("gutter").expect("reference") + 2;

        let value = declaration_in_tree(&tree, offset).expect("declaration found");
        let HoverContents::Markup(markup) = hover_contents(&value) else {
            panic!("expected markup");
        };
        assert_eq!(markup.value, "```scss\n$gutter: 12px\n```");
    }

    #[test]
    fn include_shows_mixin_signature() {
        let text = "@mixin pad($size) { padding: $size; }\n.a { @include pad(2px); }";
        let tree = tree(text);
        let offset = text.rfind("pad").expect("include") + 1;

        let value = declaration_in_tree(&tree, offset).expect("mixin found");
        let HoverContents::Markup(markup) = hover_contents(&value) else {
            panic!("expected markup");
        };
        assert_eq!(markup.value, "```scss\n@mixin pad($size)\n```");
    }

    #[test]
    fn word_is_read_from_text_newer_than_tree() {
        let tree = tree("$gutter: 12px;\n.a { margin: 0; }");
        let live = "$gutter: 12px;\n.a { margin: $gutter; }";
        let text = SnapshotTextProvider::new(Snapshot::from_text(2, live));

        let value = declaration_at(&tree, &text, live.rfind("gutter").expect("reference") + 1)
            .expect("declaration found");
        assert_eq!(value.display_text(), "$gutter");
    }

    #[test]
    fn unknown_word_has_no_hover() {
        let text = ".a { color: red; }";
        let tree = tree(text);
        assert!(declaration_in_tree(&tree, text.find("red").expect("word")).is_none());
    }
}
