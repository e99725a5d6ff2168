//! Transport decoding: strips the wire encoding off payloads and chunks.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;

use recall_core::{AudioPayload, EncodedChunk, PlaybackError, TransportEncoding};

fn decode(data: Bytes, encoding: TransportEncoding) -> Result<Bytes, PlaybackError> {
    match encoding {
        TransportEncoding::Identity => Ok(data),
        TransportEncoding::Base64 => {
            // Tolerate line breaks inserted by some encoders.
            let compact: Vec<u8> = data
                .iter()
                .copied()
                .filter(|b| !b.is_ascii_whitespace())
                .collect();
            STANDARD
                .decode(compact)
                .map(Bytes::from)
                .map_err(|e| PlaybackError::Decode(format!("invalid base64 audio data: {e}")))
        }
    }
}

/// Decode a complete payload into the binary blob handed to the sink.
pub fn decode_payload(payload: &AudioPayload) -> Result<Bytes, PlaybackError> {
    decode(payload.data.clone(), payload.encoding)
}

/// Decode one streaming chunk.
pub fn decode_chunk(chunk: EncodedChunk) -> Result<Bytes, PlaybackError> {
    decode(chunk.data, chunk.encoding)
}
