use crate::document::{
    cancellation::SnapshotCancellationToken,
    context::ParsingExecutionContext,
    item::{CommentStyle, ItemKind, ParseItem, ParseItemList},
    parser::{ParseError, Parser},
    snapshot::{Snapshot, TextProvider},
    span::Span,
};
use std::{future::Future, time::Instant};

const DEFAULT_POLL_INTERVAL: usize = 64;
/// Deepest block nesting accepted. Blocks are parsed recursively, so this bounds stack use of the
/// parse task and of every later walk over the tree.
pub const MAX_NESTING: usize = 128;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TokenKind {
    LineComment,
    BlockComment,
    Variable,
    AtKeyword,
    Ident,
    Number,
    Str,
    Flag,
    Interpolation,
    LBrace,
    RBrace,
    LParen,
    RParen,
    Colon,
    Semicolon,
    Comma,
    Other,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Token {
    kind: TokenKind,
    span: Span,
}

/// Reference SCSS grammar: comments, variables, rule blocks, properties and at-rules.
///
/// Holds no state between calls, so one instance serves any number of concurrent parses.
#[derive(Debug, Clone)]
pub struct ScssParser {
    poll_interval: usize,
}

impl Default for ScssParser {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl ScssParser {
    /// Check for cancellation every `tokens` tokens. Zero is treated as one.
    pub fn with_poll_interval(tokens: usize) -> Self {
        Self {
            poll_interval: tokens.max(1),
        }
    }
}

impl Parser for ScssParser {
    fn parse<'a>(
        &'a self,
        text: &'a dyn TextProvider,
        context: &'a ParsingExecutionContext,
    ) -> impl Future<Output = Result<ParseItemList, ParseError>> + Send + 'a {
        async move {
            let chars: Vec<char> = text.full_text().chars().collect();

            let started = Instant::now();
            let tokens = tokenize(&chars, context, self.poll_interval)?;
            context.record_tokenization(started.elapsed());

            let started = Instant::now();
            let mut parser = ItemParser::new(&chars, &tokens, context, self.poll_interval);
            let mut items = Vec::new();
            let mut last_yield = 0;
            while let Some(item) = parser.next_item(false)? {
                items.push(item);
                if parser.pos - last_yield >= self.poll_interval {
                    last_yield = parser.pos;
                    context.yield_and_check().await?;
                }
            }
            context.record_parsing(started.elapsed());

            Ok(ParseItemList::new(items))
        }
    }
}

/// Parse `src` on the calling thread, without cancellation.
pub fn parse(src: &str) -> Result<ParseItemList, ParseError> {
    let context = ParsingExecutionContext::new(SnapshotCancellationToken::detached(
        Snapshot::from_text(0, src),
    ));
    let chars: Vec<char> = src.chars().collect();
    let tokens = tokenize(&chars, &context, DEFAULT_POLL_INTERVAL)?;
    let mut parser = ItemParser::new(&chars, &tokens, &context, DEFAULT_POLL_INTERVAL);
    let mut items = Vec::new();
    while let Some(item) = parser.next_item(false)? {
        items.push(item);
    }
    Ok(ParseItemList::new(items))
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '-' || c == '_'
}

fn tokenize(
    chars: &[char],
    context: &ParsingExecutionContext,
    poll_interval: usize,
) -> Result<Vec<Token>, ParseError> {
    let mut tokens = Vec::new();
    let mut i = 0;
    let at = |index: usize| chars.get(index).copied();

    while i < chars.len() {
        if tokens.len() % poll_interval == poll_interval - 1 {
            context.ensure_active()?;
        }

        let start = i;
        let c = chars[i];
        let kind = match c {
            c if c.is_whitespace() => {
                i += 1;
                continue;
            }
            '/' if at(i + 1) == Some('/') => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
                TokenKind::LineComment
            }
            '/' if at(i + 1) == Some('*') => {
                i += 2;
                loop {
                    match at(i) {
                        Some('*') if at(i + 1) == Some('/') => {
                            i += 2;
                            break;
                        }
                        Some(_) => i += 1,
                        None => {
                            return Err(ParseError::Syntax {
                                message: "unterminated comment".into(),
                                offset: start,
                            });
                        }
                    }
                }
                TokenKind::BlockComment
            }
            '$' | '@' | '!' => {
                i += 1;
                while at(i).is_some_and(is_word_char) {
                    i += 1;
                }
                match (c, i - start) {
                    (_, 1) => TokenKind::Other,
                    ('$', _) => TokenKind::Variable,
                    ('@', _) => TokenKind::AtKeyword,
                    _ => TokenKind::Flag,
                }
            }
            '"' | '\'' => {
                i += 1;
                loop {
                    match at(i) {
                        Some('\\') => i += 2,
                        Some(q) if q == c => {
                            i += 1;
                            break;
                        }
                        Some('\n') | None => {
                            return Err(ParseError::Syntax {
                                message: "unterminated string".into(),
                                offset: start,
                            });
                        }
                        Some(_) => i += 1,
                    }
                }
                TokenKind::Str
            }
            '#' if at(i + 1) == Some('{') => {
                i += 2;
                let mut depth = 1;
                while depth > 0 {
                    match at(i) {
                        Some('{') => depth += 1,
                        Some('}') => depth -= 1,
                        Some(_) => {}
                        None => {
                            return Err(ParseError::Syntax {
                                message: "unterminated interpolation".into(),
                                offset: start,
                            });
                        }
                    }
                    i += 1;
                }
                TokenKind::Interpolation
            }
            '{' | '}' | '(' | ')' | ':' | ';' | ',' => {
                i += 1;
                match c {
                    '{' => TokenKind::LBrace,
                    '}' => TokenKind::RBrace,
                    '(' => TokenKind::LParen,
                    ')' => TokenKind::RParen,
                    ':' => TokenKind::Colon,
                    ';' => TokenKind::Semicolon,
                    _ => TokenKind::Comma,
                }
            }
            c if c.is_ascii_digit()
                || (c == '.' && at(i + 1).is_some_and(|next| next.is_ascii_digit())) =>
            {
                i += 1;
                while at(i).is_some_and(|c| c.is_ascii_alphanumeric() || c == '.' || c == '%') {
                    i += 1;
                }
                TokenKind::Number
            }
            c if is_word_char(c) => {
                while at(i).is_some_and(is_word_char) {
                    i += 1;
                }
                TokenKind::Ident
            }
            _ => {
                i += 1;
                TokenKind::Other
            }
        };
        tokens.push(Token {
            kind,
            span: Span::new(start, i.min(chars.len())),
        });
    }

    Ok(tokens)
}

fn is_comment(token: &Token) -> bool {
    matches!(token.kind, TokenKind::LineComment | TokenKind::BlockComment)
}

fn comment_item(token: &Token) -> ParseItem {
    let style = if token.kind == TokenKind::LineComment {
        CommentStyle::Line
    } else {
        CommentStyle::Block
    };
    ParseItem::comment(style, token.span)
}

/// Where a run of prelude tokens stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Terminator {
    Block,
    Semicolon,
    CloseBrace,
    End,
}

struct ItemParser<'a> {
    chars: &'a [char],
    tokens: &'a [Token],
    pos: usize,
    context: &'a ParsingExecutionContext,
    poll_interval: usize,
    next_poll: usize,
    nesting: usize,
}

impl<'a> ItemParser<'a> {
    fn new(
        chars: &'a [char],
        tokens: &'a [Token],
        context: &'a ParsingExecutionContext,
        poll_interval: usize,
    ) -> Self {
        Self {
            chars,
            tokens,
            pos: 0,
            context,
            poll_interval,
            next_poll: poll_interval,
            nesting: 0,
        }
    }

    fn peek(&self) -> Option<Token> {
        self.tokens.get(self.pos).copied()
    }

    fn peek_kind(&self) -> Option<TokenKind> {
        self.peek().map(|token| token.kind)
    }

    fn bump(&mut self) -> Option<Token> {
        let token = self.peek()?;
        self.pos += 1;
        Some(token)
    }

    fn text(&self, span: Span) -> String {
        self.chars[span.as_range()].iter().collect()
    }

    fn tick(&mut self) -> Result<(), ParseError> {
        if self.pos >= self.next_poll {
            self.next_poll = self.pos + self.poll_interval;
            self.context.ensure_active()?;
        }
        Ok(())
    }

    /// Next sibling item, or `None` at end of input (or at `}` when `nested`).
    fn next_item(&mut self, nested: bool) -> Result<Option<ParseItem>, ParseError> {
        self.tick()?;
        let Some(token) = self.peek() else {
            return Ok(None);
        };
        let item = match token.kind {
            TokenKind::LineComment | TokenKind::BlockComment => {
                self.pos += 1;
                comment_item(&token)
            }
            TokenKind::RBrace if nested => return Ok(None),
            TokenKind::RBrace => {
                return Err(ParseError::Syntax {
                    message: "unexpected `}`".into(),
                    offset: token.span.start(),
                });
            }
            TokenKind::Semicolon => {
                self.pos += 1;
                ParseItem::simple(ItemKind::Punctuation, token.span)
            }
            TokenKind::Variable
                if self.tokens.get(self.pos + 1).map(|next| next.kind)
                    == Some(TokenKind::Colon) =>
            {
                self.variable_declaration()?
            }
            TokenKind::AtKeyword => self.at_rule()?,
            _ => self.rule_or_declaration()?,
        };
        Ok(Some(item))
    }

    fn variable_declaration(&mut self) -> Result<ParseItem, ParseError> {
        let mut children = Vec::new();
        if let Some(name) = self.bump() {
            children.push(ParseItem::simple(ItemKind::VariableName, name.span));
        }
        if let Some(colon) = self.bump() {
            children.push(ParseItem::simple(ItemKind::Punctuation, colon.span));
        }
        self.value(&mut children)?;
        Ok(complex(ItemKind::VariableDeclaration, children))
    }

    /// Value tokens up to `;` (consumed), `{`, `}` or end of input. Flags and comments become
    /// their own children.
    fn value(&mut self, children: &mut Vec<ParseItem>) -> Result<(), ParseError> {
        let mut value: Option<Span> = None;
        let mut depth = 0usize;
        while let Some(token) = self.peek() {
            match token.kind {
                TokenKind::Semicolon | TokenKind::LBrace if depth == 0 => break,
                TokenKind::RBrace => break,
                TokenKind::LineComment | TokenKind::BlockComment => {
                    children.push(comment_item(&token));
                }
                TokenKind::Flag if depth == 0 => {
                    children.push(ParseItem::simple(ItemKind::Flag, token.span));
                }
                kind => {
                    match kind {
                        TokenKind::LParen => depth += 1,
                        TokenKind::RParen => depth = depth.saturating_sub(1),
                        _ => {}
                    }
                    value = Some(value.map_or(token.span, |value| value.cover(token.span)));
                }
            }
            self.pos += 1;
        }
        if depth > 0 && self.peek().is_none() {
            return Err(ParseError::Syntax {
                message: "unclosed parenthesis".into(),
                offset: value.map_or(0, |value| value.start()),
            });
        }
        if let Some(value) = value {
            children.push(ParseItem::simple(ItemKind::Value, value));
        }
        if self.peek_kind() == Some(TokenKind::Semicolon)
            && let Some(semicolon) = self.bump()
        {
            children.push(ParseItem::simple(ItemKind::Punctuation, semicolon.span));
        }
        Ok(())
    }

    fn at_rule(&mut self) -> Result<ParseItem, ParseError> {
        let mut children = Vec::new();
        let Some(keyword) = self.bump() else {
            return Err(ParseError::Internal("at-rule without keyword".into()));
        };
        children.push(ParseItem::simple(ItemKind::AtKeyword, keyword.span));

        let named = matches!(
            self.text(keyword.span).as_str(),
            "@mixin" | "@function" | "@include"
        );
        if named && self.peek_kind() == Some(TokenKind::Ident) {
            if let Some(name) = self.bump() {
                children.push(ParseItem::simple(ItemKind::Identifier, name.span));
            }
            if self.peek_kind() == Some(TokenKind::LParen) {
                let arguments = self.parenthesized()?;
                children.push(ParseItem::simple(ItemKind::Arguments, arguments));
            }
        }

        let (prelude, terminator) = self.prelude(&mut children);
        if let Some(prelude) = prelude {
            children.push(ParseItem::simple(ItemKind::Value, prelude));
        }
        match terminator {
            Terminator::Block => children.push(self.block()?),
            Terminator::Semicolon => {
                if let Some(semicolon) = self.bump() {
                    children.push(ParseItem::simple(ItemKind::Punctuation, semicolon.span));
                }
            }
            Terminator::CloseBrace | Terminator::End => {}
        }
        Ok(complex(ItemKind::AtRule, children))
    }

    fn rule_or_declaration(&mut self) -> Result<ParseItem, ParseError> {
        let (terminator, colon) = self.scan_prelude();
        if terminator != Terminator::Block
            && let Some(colon) = colon
            && colon > self.pos
        {
            return self.property_declaration(colon);
        }

        let mut children = Vec::new();
        let (prelude, terminator) = self.prelude(&mut children);
        match terminator {
            Terminator::Block => {
                if let Some(selector) = prelude {
                    children.push(ParseItem::simple(ItemKind::Selector, selector));
                }
                children.push(self.block()?);
                Ok(complex(ItemKind::RuleBlock, children))
            }
            _ => {
                let mut span = prelude.unwrap_or_default();
                if terminator == Terminator::Semicolon
                    && let Some(semicolon) = self.bump()
                {
                    span = if prelude.is_some() {
                        span.cover(semicolon.span)
                    } else {
                        semicolon.span
                    };
                }
                if children.is_empty() {
                    Ok(ParseItem::simple(ItemKind::Unknown, span))
                } else {
                    children.push(ParseItem::simple(ItemKind::Unknown, span));
                    Ok(complex(ItemKind::Unknown, children))
                }
            }
        }
    }

    fn property_declaration(&mut self, colon: usize) -> Result<ParseItem, ParseError> {
        let mut children = Vec::new();
        let mut name: Option<Span> = None;
        while self.pos < colon {
            let Some(token) = self.bump() else { break };
            if is_comment(&token) {
                children.push(comment_item(&token));
            } else {
                name = Some(name.map_or(token.span, |name| name.cover(token.span)));
            }
        }
        if let Some(name) = name {
            children.push(ParseItem::simple(ItemKind::PropertyName, name));
        }
        if let Some(colon) = self.bump() {
            children.push(ParseItem::simple(ItemKind::Punctuation, colon.span));
        }
        self.value(&mut children)?;
        Ok(complex(ItemKind::PropertyDeclaration, children))
    }

    /// Look ahead (without consuming) for the terminator of the current prelude and the index
    /// of its first top-level `:`.
    fn scan_prelude(&self) -> (Terminator, Option<usize>) {
        let mut depth = 0usize;
        let mut colon = None;
        for (index, token) in self.tokens.iter().enumerate().skip(self.pos) {
            match token.kind {
                TokenKind::LParen => depth += 1,
                TokenKind::RParen => depth = depth.saturating_sub(1),
                TokenKind::Colon if depth == 0 && colon.is_none() => colon = Some(index),
                TokenKind::LBrace if depth == 0 => return (Terminator::Block, colon),
                TokenKind::Semicolon if depth == 0 => return (Terminator::Semicolon, colon),
                TokenKind::RBrace => return (Terminator::CloseBrace, colon),
                _ => {}
            }
        }
        (Terminator::End, colon)
    }

    /// Consume prelude tokens up to (not including) the terminator. Comments are pushed to
    /// `children`; the span of everything else is returned.
    fn prelude(&mut self, children: &mut Vec<ParseItem>) -> (Option<Span>, Terminator) {
        let mut span: Option<Span> = None;
        let mut depth = 0usize;
        while let Some(token) = self.peek() {
            match token.kind {
                TokenKind::LBrace if depth == 0 => return (span, Terminator::Block),
                TokenKind::Semicolon if depth == 0 => return (span, Terminator::Semicolon),
                TokenKind::RBrace => return (span, Terminator::CloseBrace),
                TokenKind::LineComment | TokenKind::BlockComment => {
                    children.push(comment_item(&token));
                }
                kind => {
                    match kind {
                        TokenKind::LParen => depth += 1,
                        TokenKind::RParen => depth = depth.saturating_sub(1),
                        _ => {}
                    }
                    span = Some(span.map_or(token.span, |span| span.cover(token.span)));
                }
            }
            self.pos += 1;
        }
        (span, Terminator::End)
    }

    fn parenthesized(&mut self) -> Result<Span, ParseError> {
        let Some(open) = self.bump() else {
            return Err(ParseError::Internal("expected `(`".into()));
        };
        let mut depth = 1usize;
        let mut span = open.span;
        while depth > 0 {
            let Some(token) = self.bump() else {
                return Err(ParseError::Syntax {
                    message: "unclosed parenthesis".into(),
                    offset: open.span.start(),
                });
            };
            match token.kind {
                TokenKind::LParen => depth += 1,
                TokenKind::RParen => depth -= 1,
                _ => {}
            }
            span = span.cover(token.span);
        }
        Ok(span)
    }

    fn block(&mut self) -> Result<ParseItem, ParseError> {
        let Some(open) = self.bump() else {
            return Err(ParseError::Internal("expected `{`".into()));
        };
        if self.nesting >= MAX_NESTING {
            return Err(ParseError::Syntax {
                message: "nesting too deep".into(),
                offset: open.span.start(),
            });
        }
        self.nesting += 1;
        let mut children = Vec::new();
        while let Some(item) = self.next_item(true)? {
            children.push(item);
        }
        self.nesting -= 1;
        match self.bump() {
            Some(close) if close.kind == TokenKind::RBrace => Ok(ParseItem::complex(
                ItemKind::Block,
                open.span.cover(close.span),
                children,
            )),
            _ => Err(ParseError::Syntax {
                message: "unclosed block".into(),
                offset: open.span.start(),
            }),
        }
    }
}

/// Complex item spanning its children, which are put in document order.
fn complex(kind: ItemKind, mut children: Vec<ParseItem>) -> ParseItem {
    children.sort_by_key(ParseItem::start);
    let span = children
        .iter()
        .map(ParseItem::span)
        .reduce(Span::cover)
        .unwrap_or_default();
    ParseItem::complex(kind, span, children)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(items: &[ParseItem]) -> Vec<Option<ItemKind>> {
        items.iter().map(ParseItem::kind).collect()
    }

    #[test]
    fn variable_declaration_spans_whole_text() {
        let items = parse("$x: 1;").expect("parsed");
        assert_eq!(items.len(), 1);
        let declaration = &items[0];
        assert!(declaration.is_kind(ItemKind::VariableDeclaration));
        assert_eq!(declaration.span(), Span::new(0, 6));
        assert_eq!(
            kinds(declaration.children()),
            vec![
                Some(ItemKind::VariableName),
                Some(ItemKind::Punctuation),
                Some(ItemKind::Value),
                Some(ItemKind::Punctuation),
            ]
        );
    }

    #[test]
    fn flags_are_separate_from_value() {
        let items = parse("$x: 1px solid !default;").expect("parsed");
        let declaration = &items[0];
        let value = declaration.child(ItemKind::Value).expect("value");
        assert_eq!(value.span(), Span::new(4, 13));
        assert!(declaration.child(ItemKind::Flag).is_some());
    }

    #[test]
    fn rule_block_contains_properties_and_nested_rules() {
        let text = ".a { color: red; .b:hover { margin: 0 } }";
        let items = parse(text).expect("parsed");
        assert_eq!(kinds(&items), vec![Some(ItemKind::RuleBlock)]);

        let rule = &items[0];
        let block = rule.child(ItemKind::Block).expect("block");
        assert_eq!(block.span(), Span::new(3, text.len()));
        assert_eq!(
            kinds(block.children()),
            vec![Some(ItemKind::PropertyDeclaration), Some(ItemKind::RuleBlock)]
        );

        let nested = &block.children()[1];
        let selector = nested.child(ItemKind::Selector).expect("selector");
        assert_eq!(&text[selector.start()..selector.end()], ".b:hover");
    }

    #[test]
    fn mixin_records_name_arguments_and_body() {
        let text = "@mixin pad($a, $b: 2px) { padding: $a $b; }";
        let items = parse(text).expect("parsed");
        let rule = &items[0];
        assert!(rule.is_kind(ItemKind::AtRule));
        let name = rule.child(ItemKind::Identifier).expect("name");
        assert_eq!(&text[name.start()..name.end()], "pad");
        let arguments = rule.child(ItemKind::Arguments).expect("arguments");
        assert_eq!(&text[arguments.start()..arguments.end()], "($a, $b: 2px)");
        assert!(rule.child(ItemKind::Block).is_some());
    }

    #[test]
    fn include_without_block_ends_at_semicolon() {
        let items = parse("a { @include pad(1px); }").expect("parsed");
        let block = items[0].child(ItemKind::Block).expect("block");
        let include = &block.children()[0];
        assert!(include.is_kind(ItemKind::AtRule));
        assert_eq!(include.span(), Span::new(4, 22));
    }

    #[test]
    fn comments_are_kept_in_order() {
        let text = "// head\n$a: 1; /* mid */ $b: 2;";
        let items = parse(text).expect("parsed");
        assert_eq!(
            kinds(&items),
            vec![
                None,
                Some(ItemKind::VariableDeclaration),
                None,
                Some(ItemKind::VariableDeclaration),
            ]
        );
        let starts: Vec<_> = items.iter().map(ParseItem::start).collect();
        let mut sorted = starts.clone();
        sorted.sort_unstable();
        assert_eq!(starts, sorted);
    }

    #[test]
    fn interpolation_braces_do_not_open_blocks() {
        let items = parse(".icon-#{$name} { width: 1px; }").expect("parsed");
        assert_eq!(kinds(&items), vec![Some(ItemKind::RuleBlock)]);
    }

    #[test]
    fn syntax_errors_are_reported() {
        assert!(matches!(
            parse("a { color: red;"),
            Err(ParseError::Syntax { offset: 2, .. })
        ));
        assert!(matches!(
            parse("a {} }"),
            Err(ParseError::Syntax { offset: 5, .. })
        ));
        assert!(matches!(
            parse("/* never closed"),
            Err(ParseError::Syntax { offset: 0, .. })
        ));
    }

    #[test]
    fn nesting_is_capped() {
        let nested = |depth: usize| format!("{}{}", "a{".repeat(depth), "}".repeat(depth));

        let items = parse(&nested(MAX_NESTING)).expect("deepest accepted nesting");
        let mut deepest = 0;
        items.walk(&mut |_, depth| deepest = deepest.max(depth));
        assert_eq!(deepest, 2 * MAX_NESTING - 1);

        let error = parse(&nested(10_000)).expect_err("too deep");
        assert_eq!(
            error,
            ParseError::Syntax {
                message: "nesting too deep".into(),
                offset: 2 * MAX_NESTING + 1,
            }
        );
        assert!(matches!(
            parse(&"a{".repeat(10_000)),
            Err(ParseError::Syntax { .. })
        ));
    }

    #[test]
    fn offsets_are_in_characters() {
        let text = "$é: \"ü\";";
        let items = parse(text).expect("parsed");
        assert_eq!(items[0].span(), Span::new(0, text.chars().count()));
    }
}
