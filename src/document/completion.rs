use crate::document::{
    item::{CommentStyle, ItemKind, ParseItem},
    snapshot::{SnapshotTextProvider, TextProvider},
    span::Span,
    tree::DocumentTree,
};
use rapidhash::fast::RandomState;
use std::{collections::HashSet, ops::Deref, sync::Arc};

const VARIABLE_SIGIL: char = '$';
const INCLUDE_KEYWORD: &str = "@include";

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[non_exhaustive]
pub enum CompletionValueKind {
    Variable,
    Mixin,
    Function,
}

/// One completion candidate. A plain value: it keeps no link to the tree it came from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompletionValue {
    kind: CompletionValueKind,
    display_text: String,
    completion_text: String,
    description: Option<String>,
    span: Span,
}

impl CompletionValue {
    pub fn new(
        kind: CompletionValueKind,
        display_text: impl Into<String>,
        completion_text: impl Into<String>,
        description: Option<String>,
        span: Span,
    ) -> Self {
        Self {
            kind,
            display_text: display_text.into(),
            completion_text: completion_text.into(),
            description,
            span,
        }
    }

    pub fn kind(&self) -> CompletionValueKind {
        self.kind
    }

    /// Label shown to the user.
    pub fn display_text(&self) -> &str {
        &self.display_text
    }

    /// Text inserted over [`span`](Self::span) when the completion is committed.
    pub fn completion_text(&self) -> &str {
        &self.completion_text
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Source region replaced on commit.
    pub fn span(&self) -> Span {
        self.span
    }

    pub fn start(&self) -> usize {
        self.span.start()
    }

    pub fn end(&self) -> usize {
        self.span.end()
    }

    pub fn length(&self) -> usize {
        self.span.len()
    }
}

/// Finite, ordered result of [`derive_completions`]. Cloning shares the values and every
/// iteration starts from the beginning.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CompletionSet(Arc<[CompletionValue]>);

impl Deref for CompletionSet {
    type Target = [CompletionValue];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<'a> IntoIterator for &'a CompletionSet {
    type Item = &'a CompletionValue;
    type IntoIter = std::slice::Iter<'a, CompletionValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[derive(Clone, Debug)]
struct Declaration {
    kind: CompletionValueKind,
    name: String,
    detail: Option<String>,
    /// Where the declaration ends; nested declarations are visible only after this point.
    visible_from: usize,
    /// Enclosing block, `None` at top level.
    scope: Option<Span>,
}

impl Declaration {
    fn visible_at(&self, position: usize) -> bool {
        match self.scope {
            None => true,
            Some(scope) => scope.contains(position) && position >= self.visible_from,
        }
    }

    fn scope_len(&self) -> usize {
        self.scope.map_or(usize::MAX, |scope| scope.len())
    }
}

/// Declarations found in a tree, built once per tree on first use.
#[derive(Debug, Default)]
pub(crate) struct DeclarationIndex {
    declarations: Vec<Declaration>,
}

impl DeclarationIndex {
    pub(crate) fn build(tree: &DocumentTree) -> Self {
        let mut declarations = Vec::new();
        if let Some(source) = tree.source_text() {
            collect_declarations(tree.items(), None, &source, &mut declarations);
        }
        Self { declarations }
    }
}

fn collect_declarations(
    items: &[ParseItem],
    scope: Option<Span>,
    source: &SnapshotTextProvider,
    out: &mut Vec<Declaration>,
) {
    for item in items {
        match item.kind() {
            Some(ItemKind::VariableDeclaration) => {
                if let Some(name) = item
                    .child(ItemKind::VariableName)
                    .map(|name| item_text(source, name))
                {
                    out.push(Declaration {
                        kind: CompletionValueKind::Variable,
                        name: name.trim_start_matches(VARIABLE_SIGIL).to_string(),
                        detail: item
                            .child(ItemKind::Value)
                            .map(|value| item_text(source, value))
                            .filter(|value| !value.is_empty()),
                        visible_from: item.end(),
                        scope,
                    });
                }
            }
            Some(ItemKind::AtRule) => collect_at_rule(item, scope, source, out),
            _ => {}
        }

        let inner_scope = if item.is_kind(ItemKind::Block) {
            Some(item.span())
        } else {
            scope
        };
        collect_declarations(item.children(), inner_scope, source, out);
    }
}

fn collect_at_rule(
    item: &ParseItem,
    scope: Option<Span>,
    source: &SnapshotTextProvider,
    out: &mut Vec<Declaration>,
) {
    let kind = match item
        .child(ItemKind::AtKeyword)
        .map(|keyword| item_text(source, keyword))
        .as_deref()
    {
        Some("@mixin") => CompletionValueKind::Mixin,
        Some("@function") => CompletionValueKind::Function,
        _ => return,
    };
    let Some(name) = item
        .child(ItemKind::Identifier)
        .map(|name| item_text(source, name))
    else {
        return;
    };
    let arguments = item.child(ItemKind::Arguments);
    let parameters = arguments
        .map(|arguments| item_text(source, arguments))
        .unwrap_or_default();

    if let (Some(arguments), Some(block)) = (arguments, item.child(ItemKind::Block)) {
        for parameter in parameter_names(&parameters) {
            out.push(Declaration {
                kind: CompletionValueKind::Variable,
                name: parameter.to_string(),
                detail: Some(format!("parameter of {name}")),
                visible_from: arguments.end(),
                scope: Some(block.span()),
            });
        }
    }

    out.push(Declaration {
        kind,
        detail: (!parameters.is_empty()).then(|| format!("{name}{parameters}")),
        name,
        visible_from: item.end(),
        scope,
    });
}

/// `($a, $b: 2px)` -> `["a", "b"]`
fn parameter_names(arguments: &str) -> impl Iterator<Item = &str> {
    arguments
        .trim()
        .trim_start_matches('(')
        .trim_end_matches(')')
        .split(',')
        .filter_map(|parameter| {
            let name = parameter.split(':').next()?.trim();
            let name = name.strip_prefix(VARIABLE_SIGIL)?.trim_end_matches("...");
            (!name.is_empty()).then_some(name)
        })
}

fn item_text(source: &SnapshotTextProvider, item: &ParseItem) -> String {
    source.text(item.start(), item.length()).trim().to_string()
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum CursorContext {
    /// `$` already typed: only variables, inserted without the sigil.
    Variable,
    /// After `@include`: only mixins.
    Include,
    /// Anything else that is not a comment.
    Value,
}

/// Completion candidates at `position` (a character offset into the tree's snapshot).
///
/// Pure: the same tree and position always give the same set, in the same order.
pub fn derive_completions(tree: &DocumentTree, position: usize) -> CompletionSet {
    let Some(source) = tree.source_text() else {
        return CompletionSet::default();
    };
    derive_completions_in(tree, &source, position)
}

/// Like [`derive_completions`], but the word under the cursor and its context are read from
/// `text`, which may be newer than the tree. `position` and the returned spans are offsets into
/// `text`. Declarations and their scopes still come from the tree.
pub fn derive_completions_in(
    tree: &DocumentTree,
    text: &dyn TextProvider,
    position: usize,
) -> CompletionSet {
    let Some(source) = tree.source_text() else {
        return CompletionSet::default();
    };
    let position = position.min(text.len());
    let (span, context) = cursor_word(text, position);

    let position = position.min(source.len());
    if inside_comment(tree, position) {
        return CompletionSet::default();
    }

    let mut visible: Vec<&Declaration> = tree
        .declarations()
        .declarations
        .iter()
        .filter(|declaration| declaration.visible_at(position))
        .filter(|declaration| match context {
            CursorContext::Variable => declaration.kind == CompletionValueKind::Variable,
            CursorContext::Include => declaration.kind == CompletionValueKind::Mixin,
            CursorContext::Value => declaration.kind != CompletionValueKind::Mixin,
        })
        .collect();
    // Innermost declaration of a name shadows outer ones.
    visible.sort_by_key(|declaration| declaration.scope_len());

    let mut seen: HashSet<(CompletionValueKind, &str), RandomState> =
        HashSet::with_hasher(RandomState::new());
    let mut values: Vec<CompletionValue> = visible
        .into_iter()
        .filter(|declaration| seen.insert((declaration.kind, declaration.name.as_str())))
        .map(|declaration| completion_value(declaration, span, context))
        .collect();
    values.sort_by(|a, b| {
        a.display_text
            .cmp(&b.display_text)
            .then(a.kind.cmp(&b.kind))
    });

    CompletionSet(values.into())
}

fn completion_value(
    declaration: &Declaration,
    span: Span,
    context: CursorContext,
) -> CompletionValue {
    let name = &declaration.name;
    let (display_text, completion_text) = match declaration.kind {
        CompletionValueKind::Variable if context == CursorContext::Variable => {
            (format!("{VARIABLE_SIGIL}{name}"), name.clone())
        }
        CompletionValueKind::Variable => (
            format!("{VARIABLE_SIGIL}{name}"),
            format!("{VARIABLE_SIGIL}{name}"),
        ),
        CompletionValueKind::Mixin | CompletionValueKind::Function => (name.clone(), name.clone()),
    };
    CompletionValue::new(
        declaration.kind,
        display_text,
        completion_text,
        declaration.detail.clone(),
        span,
    )
}

fn inside_comment(tree: &DocumentTree, position: usize) -> bool {
    tree.item_path_at(position).into_iter().any(|item| match item {
        ParseItem::Comment(comment) => {
            comment.span.start() < position
                && (position < comment.span.end()
                    || (comment.style == CommentStyle::Line && position == comment.span.end()))
        }
        _ => false,
    })
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '-' || c == '_'
}

/// The word under the cursor and what precedes it.
fn cursor_word(source: &dyn TextProvider, position: usize) -> (Span, CursorContext) {
    let mut start = position;
    while start > 0 && source.char_at(start - 1).is_some_and(is_word_char) {
        start -= 1;
    }
    let mut end = position;
    while source.char_at(end).is_some_and(is_word_char) {
        end += 1;
    }
    let span = Span::new(start, end);

    if start > 0 && source.char_at(start - 1) == Some(VARIABLE_SIGIL) {
        return (span, CursorContext::Variable);
    }

    let from = start.saturating_sub(INCLUDE_KEYWORD.len() + 16);
    let before = source.text(from, start - from);
    let trimmed = before.trim_end();
    if trimmed.len() < before.len() && trimmed.ends_with(INCLUDE_KEYWORD) {
        return (span, CursorContext::Include);
    }

    (span, CursorContext::Value)
}
