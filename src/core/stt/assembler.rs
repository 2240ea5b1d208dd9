//! Assembly of recognition fragments into pipeline events.

use crate::core::events::VoiceAgentEvent;
use crate::core::stt::messages::RecognitionEvent;

/// Separator used when joining finalized fragments into one utterance.
const FRAGMENT_SEPARATOR: &str = "  ";

/// Turns the provider's partial/final recognition fragments into `stt_chunk`
/// and `stt_output` events.
///
/// The buffer holds finalized-but-not-turn-final fragments. It is non-empty
/// only strictly between such a fragment and the next turn-final one, and it
/// is always flushed (emptied and concatenated) before an utterance event is
/// produced.
#[derive(Debug, Default)]
pub struct TranscriptAssembler {
    buffer: Vec<String>,
}

impl TranscriptAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one recognition result; returns the event to emit, if any.
    ///
    /// - Turn-final: flush the buffer joined with the new fragment as one
    ///   `stt_output`; nothing if both are empty.
    /// - Final but not turn-final: append to the buffer, emit nothing yet.
    /// - Interim: emit `stt_chunk`, buffer untouched; empty interims are
    ///   ignored.
    pub fn push(&mut self, recognition: RecognitionEvent) -> Option<VoiceAgentEvent> {
        let RecognitionEvent {
            transcript,
            is_final,
            speech_final,
        } = recognition;

        if speech_final {
            let mut fragments = std::mem::take(&mut self.buffer);
            if !transcript.is_empty() {
                fragments.push(transcript);
            }
            if fragments.is_empty() {
                return None;
            }
            return Some(VoiceAgentEvent::SttOutput {
                text: fragments.join(FRAGMENT_SEPARATOR),
            });
        }

        if is_final {
            if !transcript.is_empty() {
                self.buffer.push(transcript);
            }
            return None;
        }

        if transcript.is_empty() {
            return None;
        }
        Some(VoiceAgentEvent::SttChunk { text: transcript })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(text: &str) -> VoiceAgentEvent {
        VoiceAgentEvent::SttChunk {
            text: text.to_string(),
        }
    }

    fn output(text: &str) -> VoiceAgentEvent {
        VoiceAgentEvent::SttOutput {
            text: text.to_string(),
        }
    }

    #[test]
    fn test_interims_then_turn_final() {
        let mut assembler = TranscriptAssembler::new();
        assert_eq!(
            assembler.push(RecognitionEvent::interim("I think")),
            Some(chunk("I think"))
        );
        assert_eq!(
            assembler.push(RecognitionEvent::interim("I think I")),
            Some(chunk("I think I"))
        );
        assert_eq!(
            assembler.push(RecognitionEvent::final_fragment("I think I")),
            None
        );
        assert_eq!(
            assembler.push(RecognitionEvent::turn_final("saw a cat")),
            Some(output("I think I  saw a cat"))
        );
        // Buffer was flushed.
        assert_eq!(
            assembler.push(RecognitionEvent::turn_final("again")),
            Some(output("again"))
        );
    }

    #[test]
    fn test_turn_final_with_empty_buffer_emits_fragment_alone() {
        let mut assembler = TranscriptAssembler::new();
        assert_eq!(
            assembler.push(RecognitionEvent::turn_final("hello there")),
            Some(output("hello there"))
        );
    }

    #[test]
    fn test_empty_turn_final_with_empty_buffer_emits_nothing() {
        let mut assembler = TranscriptAssembler::new();
        assert_eq!(assembler.push(RecognitionEvent::turn_final("")), None);
    }

    #[test]
    fn test_empty_turn_final_flushes_buffered_fragments() {
        let mut assembler = TranscriptAssembler::new();
        assert_eq!(assembler.push(RecognitionEvent::final_fragment("one")), None);
        assert_eq!(assembler.push(RecognitionEvent::final_fragment("two")), None);
        assert_eq!(
            assembler.push(RecognitionEvent::turn_final("")),
            Some(output("one  two"))
        );
    }

    #[test]
    fn test_empty_interim_is_ignored() {
        let mut assembler = TranscriptAssembler::new();
        assert_eq!(assembler.push(RecognitionEvent::interim("")), None);
    }

    #[test]
    fn test_utterance_equals_accumulated_fragments_in_arrival_order() {
        let mut assembler = TranscriptAssembler::new();
        let fragments = ["first", "second", "third"];
        for fragment in &fragments[..2] {
            assert_eq!(
                assembler.push(RecognitionEvent::final_fragment(*fragment)),
                None
            );
        }
        assert_eq!(
            assembler.push(RecognitionEvent::turn_final(fragments[2])),
            Some(output(&fragments.join(FRAGMENT_SEPARATOR)))
        );
    }
}
