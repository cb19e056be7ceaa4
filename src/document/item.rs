use crate::document::{snapshot::TextProvider, span::Span};
use std::{fmt, ops::Deref, sync::Arc};

/// Grammar tag attached to simple and complex items.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ItemKind {
    VariableName,
    Value,
    Flag,
    PropertyName,
    Selector,
    AtKeyword,
    Identifier,
    Arguments,
    Punctuation,
    VariableDeclaration,
    PropertyDeclaration,
    RuleBlock,
    AtRule,
    Block,
    Unknown,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CommentStyle {
    /// `// ...`
    Line,
    /// `/* ... */`
    Block,
}

/// Leaf item.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SimpleItem {
    pub kind: ItemKind,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Comment {
    pub style: CommentStyle,
    pub span: Span,
}

/// Item with ordered children.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ComplexItem {
    pub kind: ItemKind,
    pub span: Span,
    pub children: ParseItemList,
}

/// Node of a parsed document. Never edited after construction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParseItem {
    Simple(SimpleItem),
    Comment(Comment),
    Complex(ComplexItem),
}

impl ParseItem {
    pub fn simple(kind: ItemKind, span: Span) -> Self {
        ParseItem::Simple(SimpleItem { kind, span })
    }

    pub fn comment(style: CommentStyle, span: Span) -> Self {
        ParseItem::Comment(Comment { style, span })
    }

    pub fn complex(kind: ItemKind, span: Span, children: impl Into<ParseItemList>) -> Self {
        ParseItem::Complex(ComplexItem {
            kind,
            span,
            children: children.into(),
        })
    }

    pub fn span(&self) -> Span {
        match self {
            ParseItem::Simple(item) => item.span,
            ParseItem::Comment(item) => item.span,
            ParseItem::Complex(item) => item.span,
        }
    }

    pub fn start(&self) -> usize {
        self.span().start()
    }

    pub fn end(&self) -> usize {
        self.span().end()
    }

    pub fn length(&self) -> usize {
        self.span().len()
    }

    /// `None` for comments, which carry no grammar tag.
    pub fn kind(&self) -> Option<ItemKind> {
        match self {
            ParseItem::Simple(item) => Some(item.kind),
            ParseItem::Comment(_) => None,
            ParseItem::Complex(item) => Some(item.kind),
        }
    }

    pub fn is_kind(&self, kind: ItemKind) -> bool {
        self.kind() == Some(kind)
    }

    pub fn children(&self) -> &[ParseItem] {
        match self {
            ParseItem::Complex(item) => &item.children,
            ParseItem::Simple(_) | ParseItem::Comment(_) => &[],
        }
    }

    pub fn child(&self, kind: ItemKind) -> Option<&ParseItem> {
        self.children().iter().find(|child| child.is_kind(kind))
    }

    fn label(&self) -> String {
        match self {
            ParseItem::Simple(item) => format!("{:?}", item.kind),
            ParseItem::Comment(item) => format!("Comment({:?})", item.style),
            ParseItem::Complex(item) => format!("{:?}", item.kind),
        }
    }
}

/// Sibling items in document order.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ParseItemList(Arc<[ParseItem]>);

impl ParseItemList {
    pub fn new(items: Vec<ParseItem>) -> Self {
        Self(items.into())
    }

    pub fn as_slice(&self) -> &[ParseItem] {
        &self.0
    }

    /// Pre-order walk, passing each item's nesting depth.
    pub fn walk<'a>(&'a self, f: &mut impl FnMut(&'a ParseItem, usize)) {
        walk_items(&self.0, 0, f);
    }

    /// Chain of items covering `offset`, outermost first.
    pub fn path_at(&self, offset: usize) -> Vec<&ParseItem> {
        let mut path = Vec::new();
        let mut level: &[ParseItem] = &self.0;
        while let Some(item) = level.iter().find(|item| item.span().touches(offset)) {
            path.push(item);
            level = item.children();
        }
        path
    }

    /// Diagnostic listing: one `[start,end] - Kind` line per item, indented by depth, with the
    /// source text of comments on the following line.
    pub fn dump(&self, source: &dyn TextProvider) -> Vec<String> {
        let mut lines = Vec::new();
        self.walk(&mut |item, depth| {
            let indent = "  ".repeat(depth);
            lines.push(format!("{indent}{} - {}", item.span(), item.label()));
            if let ParseItem::Comment(comment) = item {
                lines.push(format!(
                    "{indent}{}",
                    source.text(comment.span.start(), comment.span.len())
                ));
            }
        });
        lines
    }
}

fn walk_items<'a>(
    items: &'a [ParseItem],
    depth: usize,
    f: &mut impl FnMut(&'a ParseItem, usize),
) {
    for item in items {
        f(item, depth);
        walk_items(item.children(), depth + 1, f);
    }
}

impl Deref for ParseItemList {
    type Target = [ParseItem];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<Vec<ParseItem>> for ParseItemList {
    fn from(items: Vec<ParseItem>) -> Self {
        Self::new(items)
    }
}

impl<'a> IntoIterator for &'a ParseItemList {
    type Item = &'a ParseItem;
    type IntoIter = std::slice::Iter<'a, ParseItem>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Debug for ParseItemList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.0.iter()).finish()
    }
}
