use crate::{
    document::{DocumentTree, ItemKind, ParseItem, TextProvider, snapshot::SnapshotTextProvider},
    lsp::{SassyLanguageServer, position::span_to_range},
};
use ropey::Rope;
use tower_lsp_server::{
    jsonrpc::Result,
    ls_types::{DocumentSymbol, DocumentSymbolParams, DocumentSymbolResponse, SymbolKind},
};

pub fn document_symbol(
    server: &SassyLanguageServer,
    params: DocumentSymbolParams,
) -> Result<Option<DocumentSymbolResponse>> {
    let Some(tree) = server.tree_for(&params.text_document.uri) else {
        return Ok(None);
    };
    Ok(Some(DocumentSymbolResponse::Nested(document_symbols(&tree))))
}

/// Outline of declarations, rule blocks and at-rules, nested the way the source nests them.
pub fn document_symbols(tree: &DocumentTree) -> Vec<DocumentSymbol> {
    let (Some(snapshot), Some(source)) = (tree.snapshot(), tree.source_text()) else {
        return Vec::new();
    };
    symbols(tree.items(), &source, snapshot.rope())
}

fn symbols(items: &[ParseItem], source: &SnapshotTextProvider, rope: &Rope) -> Vec<DocumentSymbol> {
    items
        .iter()
        .filter_map(|item| symbol(item, source, rope))
        .collect()
}

#[allow(deprecated)]
fn symbol(item: &ParseItem, source: &SnapshotTextProvider, rope: &Rope) -> Option<DocumentSymbol> {
    let (name_item, kind) = match item.kind()? {
        ItemKind::VariableDeclaration => (item.child(ItemKind::VariableName)?, SymbolKind::VARIABLE),
        ItemKind::PropertyDeclaration => (item.child(ItemKind::PropertyName)?, SymbolKind::PROPERTY),
        ItemKind::RuleBlock => (item.child(ItemKind::Selector)?, SymbolKind::CLASS),
        ItemKind::AtRule => {
            let keyword = item.child(ItemKind::AtKeyword)?;
            let kind = match text(keyword, source).as_str() {
                "@mixin" => SymbolKind::METHOD,
                "@function" => SymbolKind::FUNCTION,
                _ => SymbolKind::NAMESPACE,
            };
            (item.child(ItemKind::Identifier).unwrap_or(keyword), kind)
        }
        _ => return None,
    };

    let children = item
        .child(ItemKind::Block)
        .map(|block| symbols(block.children(), source, rope))
        .filter(|children| !children.is_empty());

    Some(DocumentSymbol {
        name: text(name_item, source),
        detail: item
            .child(ItemKind::Value)
            .map(|value| text(value, source))
            .filter(|_| kind == SymbolKind::VARIABLE),
        kind,
        tags: None,
        deprecated: None,
        range: span_to_range(item.span(), rope)?,
        selection_range: span_to_range(name_item.span(), rope)?,
        children,
    })
}

fn text(item: &ParseItem, source: &SnapshotTextProvider) -> String {
    source.text(item.start(), item.length()).trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{document::Snapshot, scss_lang};

    #[test]
    fn outline_follows_nesting() {
        let text = "$a: 1;\n@mixin m { color: red; }\n.x { .y { $b: 2; } }";
        let items = scss_lang::parse(text).expect("valid scss");
        let tree = DocumentTree::new(Snapshot::from_text(1, text), items);

        let outline = document_symbols(&tree);
        let names: Vec<&str> = outline.iter().map(|symbol| symbol.name.as_str()).collect();
        assert_eq!(names, ["$a", "m", ".x"]);
        assert_eq!(outline[0].detail.as_deref(), Some("1"));
        assert_eq!(outline[1].kind, SymbolKind::METHOD);

        let nested = outline[2].children.as_ref().expect("nested rule");
        assert_eq!(nested[0].name, ".y");
        let innermost = nested[0].children.as_ref().expect("nested variable");
        assert_eq!(innermost[0].name, "$b");
    }
}
