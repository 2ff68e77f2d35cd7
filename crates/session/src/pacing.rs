//! Barge-in and TTS pacing: ordered chunks carry a monotonic
//! `partial_response_index`; the provider's completion `mark` releases the
//! next queued chunk. A detected user utterance during playback cancels all
//! pending chunks and any queued reprompt.
//!
//! Grounded on the interrupt state machine in the sibling pipeline
//! orchestrator's barge-in handling, adapted from frame filtering to an
//! explicit enqueue/mark/cancel protocol since this runtime drives the
//! provider directly rather than through a processor chain.

use std::collections::VecDeque;

use parking_lot::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TtsChunk {
    pub index: u64,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PacerState {
    Idle,
    Playing,
    Interrupted,
}

pub struct TtsPacer {
    state: Mutex<PacerState>,
    queue: Mutex<VecDeque<TtsChunk>>,
    in_flight: Mutex<Option<u64>>,
}

impl Default for TtsPacer {
    fn default() -> Self {
        Self::new()
    }
}

impl TtsPacer {
    pub fn new() -> Self {
        Self { state: Mutex::new(PacerState::Idle), queue: Mutex::new(VecDeque::new()), in_flight: Mutex::new(None) }
    }

    /// Enqueue a new chunk. If nothing is currently playing, returns it
    /// immediately for the caller to send to the provider; otherwise it
    /// waits in the queue for the in-flight chunk's mark.
    pub fn enqueue(&self, chunk: TtsChunk) -> Option<TtsChunk> {
        if *self.state.lock() == PacerState::Interrupted {
            return None;
        }
        let mut in_flight = self.in_flight.lock();
        if in_flight.is_none() {
            *in_flight = Some(chunk.index);
            *self.state.lock() = PacerState::Playing;
            Some(chunk)
        } else {
            self.queue.lock().push_back(chunk);
            None
        }
    }

    /// The provider confirmed playback of `completed_index`; release the
    /// next queued chunk, if any.
    pub fn on_mark(&self, completed_index: u64) -> Option<TtsChunk> {
        let mut in_flight = self.in_flight.lock();
        if *in_flight != Some(completed_index) {
            return None;
        }
        let next = self.queue.lock().pop_front();
        *in_flight = next.as_ref().map(|c| c.index);
        if next.is_none() {
            *self.state.lock() = PacerState::Idle;
        }
        next
    }

    /// Barge-in: drop everything queued and in flight. Returns the indices
    /// that were canceled, for logging/telemetry.
    pub fn barge_in(&self) -> Vec<u64> {
        let mut canceled: Vec<u64> = self.queue.lock().drain(..).map(|c| c.index).collect();
        if let Some(idx) = self.in_flight.lock().take() {
            canceled.push(idx);
        }
        *self.state.lock() = PacerState::Interrupted;
        canceled
    }

    /// Reset to idle ahead of the next turn, clearing any interrupted latch.
    pub fn reset(&self) {
        *self.state.lock() = PacerState::Idle;
        *self.in_flight.lock() = None;
        self.queue.lock().clear();
    }

    pub fn is_interrupted(&self) -> bool {
        *self.state.lock() == PacerState::Interrupted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(index: u64) -> TtsChunk {
        TtsChunk { index, text: format!("chunk {index}") }
    }

    #[test]
    fn first_chunk_sends_immediately_rest_queue() {
        let pacer = TtsPacer::new();
        assert_eq!(pacer.enqueue(chunk(0)), Some(chunk(0)));
        assert_eq!(pacer.enqueue(chunk(1)), None);
    }

    #[test]
    fn mark_releases_next_chunk() {
        let pacer = TtsPacer::new();
        pacer.enqueue(chunk(0));
        pacer.enqueue(chunk(1));
        assert_eq!(pacer.on_mark(0), Some(chunk(1)));
        assert_eq!(pacer.on_mark(1), None);
    }

    #[test]
    fn barge_in_cancels_queue_and_in_flight() {
        let pacer = TtsPacer::new();
        pacer.enqueue(chunk(0));
        pacer.enqueue(chunk(1));
        pacer.enqueue(chunk(2));
        let canceled = pacer.barge_in();
        assert_eq!(canceled.len(), 3);
        assert!(pacer.is_interrupted());
        assert_eq!(pacer.enqueue(chunk(3)), None);
    }

    #[test]
    fn reset_clears_interrupted_latch() {
        let pacer = TtsPacer::new();
        pacer.enqueue(chunk(0));
        pacer.barge_in();
        pacer.reset();
        assert_eq!(pacer.enqueue(chunk(1)), Some(chunk(1)));
    }
}
