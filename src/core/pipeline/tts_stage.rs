//! Synthesis stage: voices agent replies and handles barge-in.
//!
//! Two generators run side by side and are folded by [`StreamMerger`]: the
//! processing generator passes upstream events through and drives the
//! provider (speak on `agent_end`, discard on barge-in), while the audio
//! generator relays synthesized frames as `tts_chunk` events. Their relative
//! interleaving is arrival order; each generator's own order is preserved.

use std::pin::pin;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tracing::warn;

use crate::core::events::VoiceAgentEvent;
use crate::core::merge::{EventStream, StreamMerger};
use crate::core::tts::TextToSpeech;

/// How long to let in-flight synthesized audio drain after upstream ends.
const SYNTHESIS_DRAIN_GRACE: Duration = Duration::from_millis(200);

/// Decides when a new utterance interrupts a reply being voiced.
///
/// A reply is "in flight" from the moment it is handed to synthesis until the
/// next utterance arrives. Only an utterance that lands during that window is
/// a barge-in; the first utterance of a conversation never is.
#[derive(Debug, Default)]
pub struct BargeInController {
    reply_in_flight: bool,
}

impl BargeInController {
    pub fn new() -> Self {
        Self::default()
    }

    /// A reply has been handed to synthesis.
    pub fn reply_started(&mut self) {
        self.reply_in_flight = true;
    }

    /// A new utterance arrived; returns whether it barges in on a reply.
    /// Consumes the in-flight state, so one reply is interrupted at most once.
    pub fn notice_utterance(&mut self) -> bool {
        std::mem::take(&mut self.reply_in_flight)
    }
}

enum Directive {
    Speak(String),
    Interrupt,
    Pass,
}

fn directive(controller: &mut BargeInController, event: &VoiceAgentEvent) -> Directive {
    match event {
        VoiceAgentEvent::SttOutput { .. } => {
            if controller.notice_utterance() {
                Directive::Interrupt
            } else {
                Directive::Pass
            }
        }
        VoiceAgentEvent::AgentEnd { text } => Directive::Speak(text.clone()),
        _ => Directive::Pass,
    }
}

pub(crate) fn run(tts: Arc<dyn TextToSpeech>, upstream: EventStream) -> EventStream {
    let audio = tts
        .audio_events()
        .map(|frame| {
            Ok(VoiceAgentEvent::TtsChunk {
                audio: frame.data,
                is_final: frame.is_final,
            })
        })
        .boxed();

    let processing = {
        let tts = tts.clone();
        async_stream::stream! {
            let mut controller = BargeInController::new();
            let mut upstream = pin!(upstream);
            let mut failed = false;
            'stage: while let Some(result) = upstream.next().await {
                let event = match result {
                    Ok(event) => event,
                    Err(e) => {
                        yield Err(e);
                        failed = true;
                        break 'stage;
                    }
                };
                // The directive is decided before the event is re-emitted so
                // the provider call cannot reorder the passthrough.
                let directive = directive(&mut controller, &event);
                yield Ok(event);
                match directive {
                    Directive::Speak(text) => {
                        let spoken = async {
                            tts.send_text(&text).await?;
                            tts.flush().await
                        }
                        .await;
                        match spoken {
                            Ok(()) => controller.reply_started(),
                            Err(e) => {
                                yield Err(e.into());
                                failed = true;
                                break 'stage;
                            }
                        }
                    }
                    Directive::Interrupt => {
                        yield Ok(VoiceAgentEvent::Interrupt);
                        if let Err(e) = tts.clear().await {
                            warn!(error = %e, "failed to discard queued synthesis");
                        }
                    }
                    Directive::Pass => {}
                }
            }
            if !failed {
                tokio::time::sleep(SYNTHESIS_DRAIN_GRACE).await;
            }
            // Ends the audio generator, and with it the merged stream.
            tts.close().await;
        }
        .boxed()
    };

    let merged = StreamMerger::merge([processing, audio]);
    async_stream::stream! {
        let mut merged = pin!(merged);
        while let Some(item) = merged.next().await {
            let failed = item.is_err();
            yield item;
            if failed {
                break;
            }
        }
        // The failure path drops the processing generator before its own
        // close runs; close here is idempotent.
        tts.close().await;
    }
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_utterance_never_interrupts() {
        let mut controller = BargeInController::new();
        assert!(!controller.notice_utterance());
    }

    #[test]
    fn test_utterance_during_reply_interrupts_once() {
        let mut controller = BargeInController::new();
        controller.reply_started();
        assert!(controller.notice_utterance());
        // The in-flight state was consumed.
        assert!(!controller.notice_utterance());
    }

    #[test]
    fn test_each_reply_rearms_the_controller() {
        let mut controller = BargeInController::new();
        controller.reply_started();
        assert!(controller.notice_utterance());
        controller.reply_started();
        assert!(controller.notice_utterance());
    }
}
