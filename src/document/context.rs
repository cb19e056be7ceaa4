use crate::document::{cancellation::SnapshotCancellationToken, parser::ParseError};
use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

/// Durations reported by the most recent parse. Advisory only.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ParseTimings {
    pub last_tokenization_duration: Duration,
    pub last_parsing_duration: Duration,
}

#[derive(Debug, Default)]
pub(crate) struct TimingCell {
    tokenization_nanos: AtomicU64,
    parsing_nanos: AtomicU64,
}

impl TimingCell {
    pub(crate) fn store(&self, timings: ParseTimings) {
        self.tokenization_nanos
            .store(nanos(timings.last_tokenization_duration), Ordering::Relaxed);
        self.parsing_nanos
            .store(nanos(timings.last_parsing_duration), Ordering::Relaxed);
    }

    pub(crate) fn load(&self) -> ParseTimings {
        ParseTimings {
            last_tokenization_duration: Duration::from_nanos(
                self.tokenization_nanos.load(Ordering::Relaxed),
            ),
            last_parsing_duration: Duration::from_nanos(self.parsing_nanos.load(Ordering::Relaxed)),
        }
    }
}

fn nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

/// Per-invocation state handed to a [`Parser`](crate::document::parser::Parser).
///
/// One context is created for every scheduled parse, so concurrent parses never share it.
#[derive(Debug)]
pub struct ParsingExecutionContext {
    token: SnapshotCancellationToken,
    timings: TimingCell,
}

impl ParsingExecutionContext {
    pub fn new(token: SnapshotCancellationToken) -> Self {
        Self {
            token,
            timings: TimingCell::default(),
        }
    }

    pub fn token(&self) -> &SnapshotCancellationToken {
        &self.token
    }

    pub fn is_cancellation_requested(&self) -> bool {
        self.token.is_cancellation_requested()
    }

    pub fn ensure_active(&self) -> Result<(), ParseError> {
        self.token.ensure_active()
    }

    pub async fn yield_and_check(&self) -> Result<(), ParseError> {
        self.token.yield_and_check().await
    }

    pub fn record_tokenization(&self, duration: Duration) {
        self.timings
            .tokenization_nanos
            .store(nanos(duration), Ordering::Relaxed);
    }

    pub fn record_parsing(&self, duration: Duration) {
        self.timings
            .parsing_nanos
            .store(nanos(duration), Ordering::Relaxed);
    }

    pub fn timings(&self) -> ParseTimings {
        self.timings.load()
    }

    pub fn last_tokenization_duration(&self) -> Duration {
        self.timings().last_tokenization_duration
    }

    pub fn last_parsing_duration(&self) -> Duration {
        self.timings().last_parsing_duration
    }
}
