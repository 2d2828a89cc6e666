//! In-process span collectors.

use parking_lot::Mutex;

use crate::domain::span::FinishedSpan;
use crate::ports::SpanCollector;

/// Keeps finished spans in finish order.
#[derive(Debug, Default)]
pub struct InMemoryCollector {
    spans: Mutex<Vec<FinishedSpan>>,
}

impl InMemoryCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn finished_spans(&self) -> Vec<FinishedSpan> {
        self.spans.lock().clone()
    }

    pub fn reset(&self) {
        self.spans.lock().clear();
    }
}

impl SpanCollector for InMemoryCollector {
    fn collect(&self, span: FinishedSpan) {
        self.spans.lock().push(span);
    }
}

/// Discards every span.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCollector;

impl SpanCollector for NoopCollector {
    fn collect(&self, _span: FinishedSpan) {}
}
