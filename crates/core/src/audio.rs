//! Provider-native audio framing
//!
//! The core never transcodes: frames carry whatever encoding the telephony
//! provider uses natively (Twilio base64 mu-law/8k, Vonage L16/16k).

use serde::{Deserialize, Serialize};

/// Provider-native audio encoding. The core passes these through unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioEncoding {
    /// 8kHz mu-law, base64-framed (Twilio Media Streams)
    MuLaw8k,
    /// 16-bit linear PCM at 16kHz (Vonage `audio/l16;rate=16000`)
    L16Hz16k,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Channels {
    Mono,
    Stereo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SampleRate {
    Hz8000,
    Hz16000,
}

/// A single inbound or outbound media frame, as received from (or destined
/// for) the telephony provider. `sequence` is the provider's own frame
/// sequence number, used by the session runtime to reorder out-of-order
/// frames before forwarding to STT.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioFrame {
    /// Raw payload in the provider's native wire format (e.g. base64 for Twilio).
    pub payload: Vec<u8>,
    pub encoding: AudioEncoding,
    pub sample_rate: SampleRate,
    pub channels: Channels,
    /// Provider-assigned monotonic sequence number for this stream.
    pub sequence: u64,
}

impl AudioFrame {
    pub fn new(
        payload: Vec<u8>,
        encoding: AudioEncoding,
        sample_rate: SampleRate,
        channels: Channels,
        sequence: u64,
    ) -> Self {
        Self {
            payload,
            encoding,
            sample_rate,
            channels,
            sequence,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_roundtrip_fields() {
        let frame = AudioFrame::new(
            vec![1, 2, 3],
            AudioEncoding::MuLaw8k,

            SampleRate::Hz8000,
            Channels::Mono,
            42,
        );
        assert_eq!(frame.sequence, 42);
        assert_eq!(frame.encoding, AudioEncoding::MuLaw8k);
    }
}
