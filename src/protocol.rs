//! Binary wire protocol shared with the deployment.
//!
//! Every message is one tag byte followed by the payload. The transport
//! (WebSocket) preserves message boundaries, so the codec never has to
//! reassemble a byte stream — one buffer in, one message out.

use crate::error::{Result, VoxlinkError};

/// Tag byte for the post-connect handshake (empty payload).
pub const TAG_HANDSHAKE: u8 = 0;

/// Tag byte for a slice of a compressed audio stream.
pub const TAG_AUDIO: u8 = 1;

/// Tag byte for a UTF-8 text chunk.
pub const TAG_TEXT: u8 = 2;

/// A single message exchanged over the transport.
///
/// Audio payloads are contiguous slices of an externally compressed stream,
/// not self-contained decodable units; they are fed to the decoder in arrival
/// order as one continuous byte stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireMessage {
    /// Sent by the server once the remote session is live.
    Handshake,
    /// Compressed audio stream bytes, in either direction.
    Audio(Vec<u8>),
    /// Server-generated text, each chunk independently printable.
    Text(String),
}

impl WireMessage {
    /// Serialize the message to its wire form: tag byte + payload.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            WireMessage::Handshake => vec![TAG_HANDSHAKE],
            WireMessage::Audio(bytes) => {
                let mut buf = Vec::with_capacity(1 + bytes.len());
                buf.push(TAG_AUDIO);
                buf.extend_from_slice(bytes);
                buf
            }
            WireMessage::Text(text) => {
                let mut buf = Vec::with_capacity(1 + text.len());
                buf.push(TAG_TEXT);
                buf.extend_from_slice(text.as_bytes());
                buf
            }
        }
    }

    /// Parse a complete wire buffer into a message.
    ///
    /// Fails with `MalformedMessage` on an empty buffer (no tag byte), an
    /// unrecognized tag, or a text payload that is not valid UTF-8.
    pub fn decode(buffer: &[u8]) -> Result<Self> {
        let Some((&tag, payload)) = buffer.split_first() else {
            return Err(VoxlinkError::MalformedMessage {
                message: "empty buffer".to_string(),
            });
        };

        match tag {
            TAG_HANDSHAKE => Ok(WireMessage::Handshake),
            TAG_AUDIO => Ok(WireMessage::Audio(payload.to_vec())),
            TAG_TEXT => match String::from_utf8(payload.to_vec()) {
                Ok(text) => Ok(WireMessage::Text(text)),
                Err(e) => Err(VoxlinkError::MalformedMessage {
                    message: format!("text payload is not valid UTF-8: {}", e),
                }),
            },
            other => Err(VoxlinkError::MalformedMessage {
                message: format!("unknown tag {}", other),
            }),
        }
    }

    /// Short name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            WireMessage::Handshake => "handshake",
            WireMessage::Audio(_) => "audio",
            WireMessage::Text(_) => "text",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handshake_roundtrip() {
        let msg = WireMessage::Handshake;
        let decoded = WireMessage::decode(&msg.encode()).expect("should decode");
        assert_eq!(msg, decoded);
    }

    #[test]
    fn test_audio_roundtrip() {
        let msg = WireMessage::Audio(vec![0x4f, 0x67, 0x67, 0x53, 0x00]);
        let decoded = WireMessage::decode(&msg.encode()).expect("should decode");
        assert_eq!(msg, decoded);
    }

    #[test]
    fn test_text_roundtrip() {
        let msg = WireMessage::Text("Bonjour ! Comment ça va ?".to_string());
        let decoded = WireMessage::decode(&msg.encode()).expect("should decode");
        assert_eq!(msg, decoded);
    }

    #[test]
    fn test_all_variants_roundtrip() {
        let messages = vec![
            WireMessage::Handshake,
            WireMessage::Audio(vec![]),
            WireMessage::Audio(vec![1, 2, 3]),
            WireMessage::Text(String::new()),
            WireMessage::Text("hello".to_string()),
        ];
        for msg in messages {
            let decoded = WireMessage::decode(&msg.encode()).expect("should decode");
            assert_eq!(msg, decoded, "roundtrip failed for {:?}", msg);
        }
    }

    #[test]
    fn test_encode_prepends_tag_byte() {
        assert_eq!(WireMessage::Handshake.encode(), vec![0u8]);
        assert_eq!(WireMessage::Audio(vec![9, 9]).encode(), vec![1u8, 9, 9]);
        assert_eq!(
            WireMessage::Text("hi".to_string()).encode(),
            vec![2u8, b'h', b'i']
        );
    }

    #[test]
    fn test_decode_empty_buffer_is_malformed() {
        let err = WireMessage::decode(&[]).unwrap_err();
        assert!(matches!(err, VoxlinkError::MalformedMessage { .. }));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_decode_unknown_tag_is_malformed() {
        for tag in [3u8, 4, 5, 0xff] {
            let err = WireMessage::decode(&[tag, 1, 2, 3]).unwrap_err();
            assert!(
                matches!(err, VoxlinkError::MalformedMessage { .. }),
                "tag {} should be malformed",
                tag
            );
        }
    }

    #[test]
    fn test_decode_invalid_utf8_text_is_malformed() {
        let err = WireMessage::decode(&[TAG_TEXT, 0xff, 0xfe]).unwrap_err();
        assert!(matches!(err, VoxlinkError::MalformedMessage { .. }));
    }

    #[test]
    fn test_handshake_payload_is_ignored() {
        // The handshake is defined by its tag; an empty payload is valid and
        // any payload bytes carry no meaning.
        let decoded = WireMessage::decode(&[TAG_HANDSHAKE]).expect("should decode");
        assert_eq!(decoded, WireMessage::Handshake);
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(WireMessage::Handshake.kind(), "handshake");
        assert_eq!(WireMessage::Audio(vec![]).kind(), "audio");
        assert_eq!(WireMessage::Text(String::new()).kind(), "text");
    }
}
