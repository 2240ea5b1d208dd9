//! Merging of independently-paced event streams.
//!
//! Each pipeline stage that produces events concurrently with its upstream
//! (today only the TTS stage, with its synthesis-audio generator running next
//! to the upstream-processing generator) needs its sources folded into one
//! ordered output. [`StreamMerger`] does that: whichever source has an item
//! ready is emitted first, each source's internal order is preserved, and no
//! priority is imposed between sources beyond arrival order.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::stream::{BoxStream, SelectAll, Stream};

use crate::core::events::VoiceAgentEvent;
use crate::errors::PipelineError;

/// Item type flowing between pipeline stages.
pub type EventResult = Result<VoiceAgentEvent, PipelineError>;

/// Boxed stage output, the currency of the pipeline.
pub type EventStream = BoxStream<'static, EventResult>;

/// Merges two or more event streams into one.
///
/// Waits on every source without busy-polling and terminates once all sources
/// have terminated. The first `Err` emitted by any source is forwarded and
/// then the merger terminates, dropping (and thereby cancelling) the
/// remaining sources. Dropping the merger itself drops all sources, so a
/// consumer that stops iterating releases every producer.
pub struct StreamMerger {
    sources: SelectAll<EventStream>,
    failed: bool,
}

impl StreamMerger {
    pub fn new() -> Self {
        Self {
            sources: SelectAll::new(),
            failed: false,
        }
    }

    /// Add another source to the merge.
    pub fn push(&mut self, source: EventStream) {
        self.sources.push(source);
    }

    /// Build a merger over the given sources.
    pub fn merge(sources: impl IntoIterator<Item = EventStream>) -> Self {
        let mut merger = Self::new();
        for source in sources {
            merger.push(source);
        }
        merger
    }
}

impl Default for StreamMerger {
    fn default() -> Self {
        Self::new()
    }
}

impl Stream for StreamMerger {
    type Item = EventResult;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.failed {
            return Poll::Ready(None);
        }
        match Pin::new(&mut this.sources).poll_next(cx) {
            Poll::Ready(Some(Err(error))) => {
                // Fatal: emit the failure, then cancel the surviving sources.
                this.failed = true;
                this.sources.clear();
                Poll::Ready(Some(Err(error)))
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use tokio::sync::mpsc;

    fn chunk(text: &str) -> VoiceAgentEvent {
        VoiceAgentEvent::SttChunk {
            text: text.to_string(),
        }
    }

    fn channel_source(mut rx: mpsc::UnboundedReceiver<EventResult>) -> EventStream {
        async_stream::stream! {
            while let Some(item) = rx.recv().await {
                yield item;
            }
        }
        .boxed()
    }

    #[tokio::test]
    async fn test_emits_whichever_source_is_ready_first() {
        let (tx_a, rx_a) = mpsc::unbounded_channel();
        let (tx_b, rx_b) = mpsc::unbounded_channel();
        let mut merged = StreamMerger::merge([channel_source(rx_a), channel_source(rx_b)]);

        // A1 ready, B1 becomes ready between A1 and A2.
        tx_a.send(Ok(chunk("A1"))).unwrap();
        assert_eq!(merged.next().await.unwrap().unwrap(), chunk("A1"));

        tx_b.send(Ok(chunk("B1"))).unwrap();
        assert_eq!(merged.next().await.unwrap().unwrap(), chunk("B1"));

        tx_a.send(Ok(chunk("A2"))).unwrap();
        assert_eq!(merged.next().await.unwrap().unwrap(), chunk("A2"));

        drop(tx_a);
        drop(tx_b);
        assert!(merged.next().await.is_none());
    }

    #[tokio::test]
    async fn test_per_source_order_is_preserved() {
        let source_a = futures::stream::iter(["A1", "A2", "A3"].map(|t| Ok(chunk(t)))).boxed();
        let source_b = futures::stream::iter(["B1", "B2"].map(|t| Ok(chunk(t)))).boxed();

        let merged: Vec<_> = StreamMerger::merge([source_a, source_b])
            .map(|item| match item.unwrap() {
                VoiceAgentEvent::SttChunk { text } => text,
                other => panic!("unexpected event: {other:?}"),
            })
            .collect()
            .await;

        assert_eq!(merged.len(), 5);
        let positions = |prefix: char| -> Vec<usize> {
            merged
                .iter()
                .enumerate()
                .filter(|(_, t)| t.starts_with(prefix))
                .map(|(i, _)| i)
                .collect()
        };
        assert!(positions('A').is_sorted());
        assert!(positions('B').is_sorted());
    }

    #[tokio::test]
    async fn test_source_failure_terminates_the_merge() {
        let failing = futures::stream::iter(vec![
            Ok(chunk("A1")),
            Err(PipelineError::Upstream("boom".to_string())),
            Ok(chunk("A2")),
        ])
        .boxed();
        // This source never yields; the merger must still terminate.
        let stuck = futures::stream::pending().boxed();

        let mut merged = StreamMerger::merge([failing, stuck]);
        assert_eq!(merged.next().await.unwrap().unwrap(), chunk("A1"));
        assert!(merged.next().await.unwrap().is_err());
        assert!(merged.next().await.is_none());
    }

    #[tokio::test]
    async fn test_empty_merge_terminates_immediately() {
        let mut merged = StreamMerger::new();
        assert!(merged.next().await.is_none());
    }
}
