use sassy_language_server::{
    document::{
        ControllerOptions, DocumentController, EditorBuffer, ItemKind, ParseError, ParseItem,
        ParseOutcome, Parser, TextBuffer,
        cancellation::{CancelScope, SnapshotCancellationToken},
        context::ParsingExecutionContext,
        report::{ErrorReporter, ParseFailure},
        snapshot::SnapshotTextProvider,
    },
    scss_lang::{self, ScssParser},
};
use std::{sync::Arc, time::Duration};
use tokio::sync::mpsc;

const SAMPLE: &str = include_str!("data/sample.scss");

/// Children lie inside their parent and siblings are in order without overlap.
fn assert_well_formed(items: &[ParseItem], parent: Option<&ParseItem>, len: usize) {
    let mut previous_end = parent.map_or(0, ParseItem::start);
    for item in items {
        assert!(item.start() <= item.end(), "inverted span {:?}", item.span());
        assert!(item.end() <= len, "span past end {:?}", item.span());
        assert!(item.start() >= previous_end, "overlap at {:?}", item.span());
        if let Some(parent) = parent {
            assert!(parent.span().contains(item.start()) || parent.start() == item.start());
            assert!(item.end() <= parent.end());
        }
        previous_end = item.end();
        assert_well_formed(item.children(), Some(item), len);
    }
}

#[test]
fn fixture_tree_is_well_formed() {
    let items = scss_lang::parse(SAMPLE).expect("fixture parses");
    assert_well_formed(&items, None, SAMPLE.chars().count());

    let top: Vec<_> = items.iter().map(ParseItem::kind).collect();
    assert_eq!(
        top,
        [
            None,
            Some(ItemKind::VariableDeclaration),
            Some(ItemKind::VariableDeclaration),
            None,
            Some(ItemKind::AtRule),
            Some(ItemKind::AtRule),
            Some(ItemKind::RuleBlock),
            Some(ItemKind::RuleBlock),
        ]
    );
}

#[test]
fn walk_visits_in_document_order() {
    let items = scss_lang::parse(SAMPLE).expect("fixture parses");
    let mut starts = Vec::new();
    items.walk(&mut |item, _depth| starts.push(item.start()));
    let mut sorted = starts.clone();
    sorted.sort_unstable();
    assert_eq!(starts, sorted);
}

#[test]
fn path_at_descends_to_innermost_item() {
    let items = scss_lang::parse(SAMPLE).expect("fixture parses");
    let offset = SAMPLE.find("double($spacing)").expect("call");
    let kinds: Vec<_> = items
        .path_at(offset)
        .into_iter()
        .filter_map(ParseItem::kind)
        .collect();
    assert_eq!(
        kinds,
        [
            ItemKind::RuleBlock,
            ItemKind::Block,
            ItemKind::RuleBlock,
            ItemKind::Block,
            ItemKind::PropertyDeclaration,
            ItemKind::Value,
        ]
    );
}

#[tokio::test]
async fn async_parse_matches_synchronous_parse() {
    let buffer = EditorBuffer::new(SAMPLE);
    let snapshot = buffer.current_snapshot();
    let context = ParsingExecutionContext::new(SnapshotCancellationToken::detached(snapshot.clone()));
    let provider = SnapshotTextProvider::new(snapshot);

    let items = ScssParser::with_poll_interval(4)
        .parse(&provider, &context)
        .await
        .expect("parsed");
    assert_eq!(
        format!("{items:?}"),
        format!("{:?}", scss_lang::parse(SAMPLE).expect("parsed"))
    );
}

#[tokio::test]
async fn parse_stops_once_buffer_moves_on() {
    let buffer = Arc::new(EditorBuffer::new(SAMPLE));
    let snapshot = buffer.current_snapshot();
    let token = SnapshotCancellationToken::new(
        snapshot.clone(),
        buffer.clone(),
        Arc::new(CancelScope::default()),
    );
    let context = ParsingExecutionContext::new(token);
    buffer.replace("");

    let result = ScssParser::with_poll_interval(1)
        .parse(&SnapshotTextProvider::new(snapshot), &context)
        .await;
    assert_eq!(result.map(|_| ()), Err(ParseError::Cancelled { version: 0 }));
}

#[tokio::test]
async fn parse_stops_when_scope_is_cancelled() {
    let buffer = Arc::new(EditorBuffer::new(SAMPLE));
    let snapshot = buffer.current_snapshot();
    let scope = Arc::new(CancelScope::default());
    let token = SnapshotCancellationToken::new(snapshot.clone(), buffer, Arc::clone(&scope));
    let context = ParsingExecutionContext::new(token);
    scope.cancel();

    let result = ScssParser::default()
        .parse(&SnapshotTextProvider::new(snapshot), &context)
        .await;
    assert!(result.is_err_and(|error| error.is_cancelled()));
}

struct ChannelReporter(mpsc::UnboundedSender<ParseFailure>);

impl ErrorReporter for ChannelReporter {
    fn report(&self, failure: &ParseFailure) {
        let _ = self.0.send(failure.clone());
    }
}

#[tokio::test]
async fn deeply_nested_edit_fails_and_keeps_tree() {
    let (sender, mut failures) = mpsc::unbounded_channel();
    let buffer = Arc::new(EditorBuffer::new("a {}"));
    let controller = DocumentController::attach(
        Arc::clone(&buffer) as Arc<dyn TextBuffer>,
        Arc::new(ScssParser::default()),
        ControllerOptions {
            reporter: Arc::new(ChannelReporter(sender)),
            ..ControllerOptions::default()
        },
    );
    let mut trees = controller.subscribe();
    tokio::time::timeout(Duration::from_secs(5), trees.recv())
        .await
        .expect("first tree within timeout")
        .expect("tree channel open");

    let depth = 10_000;
    let deep = buffer.replace(&format!("{}{}", "a{".repeat(depth), "}".repeat(depth)));
    assert_eq!(controller.schedule(deep).await.unwrap(), ParseOutcome::Failed);

    let failure = tokio::time::timeout(Duration::from_secs(5), failures.recv())
        .await
        .expect("failure within timeout")
        .expect("reporter channel open");
    assert_eq!(failure.version, 1);
    assert!(matches!(
        failure.error,
        ParseError::Syntax { ref message, .. } if message == "nesting too deep"
    ));
    let tree = controller.current_tree();
    assert_eq!(tree.version(), Some(0));
    assert_eq!(tree.items().len(), 1);
}
