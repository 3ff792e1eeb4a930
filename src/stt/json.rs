//! Parsing of Kaldi/Vosk-style recognizer result payloads.
//!
//! Streaming recognizers in that family report results as small JSON
//! objects: `{"partial": "..."}` while an utterance is in flight and
//! `{"text": "..."}` once it is finalized. Engine implementations that
//! speak this wire format can delegate payload decoding here.

use crate::error::{Result, VoicegateError};
use crate::stt::engine::EngineOutput;
use serde::Deserialize;

/// Wire shape of a recognizer result payload.
#[derive(Debug, Deserialize)]
struct TranscriptPayload {
    /// Finalized utterance text. Present on utterance boundaries.
    text: Option<String>,
    /// In-flight partial hypothesis.
    partial: Option<String>,
}

/// Parses a recognizer result payload into an [`EngineOutput`].
///
/// A `text` field means the utterance is finalized (even when empty, which
/// callers drop later); a `partial` field or an empty object is pending.
/// Malformed JSON is a decode error.
pub fn parse_transcript(raw: &str) -> Result<EngineOutput> {
    let payload: TranscriptPayload =
        serde_json::from_str(raw).map_err(|e| VoicegateError::Decode {
            message: format!("invalid recognizer payload: {}", e),
        })?;

    match payload.text {
        Some(text) => Ok(EngineOutput::Finalized(text)),
        None => {
            let _ = payload.partial;
            Ok(EngineOutput::Pending)
        }
    }
}
