//! Wire protocol: the datagram kinds and their text encoding.
//!
//! Every message travels as UTF-8, `;`-delimited text:
//!
//! ```text
//! HEARTBEAT;<senderId>;<timestampMs>;<ip>;<port>
//! MSG;<fromId>;<toId>;<text>
//! CHAT;<fromId>;<text>
//! ```
//!
//! Free text is always the last field, so it may itself contain `;`. The
//! encoding sits behind [`WireCodec`] so that the node never touches the
//! textual form directly.

use std::fmt;
use std::str::FromStr;

use crate::error::{DecodeError, EncodeError};
use crate::identity::{Contact, PeerId};

/// Largest datagram we send or accept on either socket.
pub const MAX_DATAGRAM_SIZE: usize = 2048;

/// Receive buffer size: the largest UDP payload, so an oversized datagram
/// is seen whole and can be refused instead of being silently cut short.
pub const RECV_BUFFER_SIZE: usize = 65_507;

const DELIMITER: char = ';';
const HEARTBEAT_TAG: &str = "HEARTBEAT";
const MSG_TAG: &str = "MSG";
const CHAT_TAG: &str = "CHAT";

/// Whether a received datagram of `len` bytes is within [`MAX_DATAGRAM_SIZE`].
pub fn within_datagram_limit(len: usize) -> bool {
    len <= MAX_DATAGRAM_SIZE
}

/// Periodic presence announcement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeartbeatMessage {
    pub sender: PeerId,
    /// Sender's wall clock in ms; informational only.
    pub timestamp_ms: u64,
    pub ip: String,
    pub port: u16,
}

impl HeartbeatMessage {
    /// The unicast contact carried by this heartbeat.
    pub fn contact(&self) -> Contact {
        Contact::new(self.ip.clone(), self.port)
    }
}

/// A point-to-point text message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectMessage {
    pub from: PeerId,
    pub to: PeerId,
    pub text: String,
}

/// A text line sent to every peer on the discovery group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub from: PeerId,
    pub text: String,
}

/// Every message that can appear on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireMessage {
    Heartbeat(HeartbeatMessage),
    Direct(DirectMessage),
    Chat(ChatMessage),
}

impl WireMessage {
    /// The leading tag used on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Heartbeat(_) => HEARTBEAT_TAG,
            Self::Direct(_) => MSG_TAG,
            Self::Chat(_) => CHAT_TAG,
        }
    }
}

/// Refuse a field that would shift the fields after it: a delimiter or
/// whitespace inside it, or nothing at all.
pub fn check_field(field: &'static str, value: &str) -> Result<(), EncodeError> {
    if value.is_empty() || value.contains(DELIMITER) || value.contains(char::is_whitespace) {
        return Err(EncodeError::UnsafeField {
            field,
            value: value.to_string(),
        });
    }
    Ok(())
}

impl fmt::Display for WireMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Heartbeat(hb) => write!(
                f,
                "{HEARTBEAT_TAG};{};{};{};{}",
                hb.sender, hb.timestamp_ms, hb.ip, hb.port
            ),
            Self::Direct(msg) => write!(f, "{MSG_TAG};{};{};{}", msg.from, msg.to, msg.text),
            Self::Chat(chat) => write!(f, "{CHAT_TAG};{};{}", chat.from, chat.text),
        }
    }
}

impl FromStr for WireMessage {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(DecodeError::Empty);
        }

        let tag = s.split(DELIMITER).next().unwrap_or_default();
        match tag {
            HEARTBEAT_TAG => parse_heartbeat(s).map(Self::Heartbeat),
            MSG_TAG => parse_direct(s).map(Self::Direct),
            CHAT_TAG => parse_chat(s).map(Self::Chat),
            other => Err(DecodeError::UnknownKind(other.to_string())),
        }
    }
}

fn parse_heartbeat(s: &str) -> Result<HeartbeatMessage, DecodeError> {
    // Trailing fields beyond the fifth are tolerated and ignored.
    let parts: Vec<&str> = s.split(DELIMITER).collect();
    if parts.len() < 5 {
        return Err(DecodeError::MissingFields {
            kind: HEARTBEAT_TAG,
            expected: 5,
            found: parts.len(),
        });
    }

    Ok(HeartbeatMessage {
        sender: parse_number(parts[1], "senderId").map(PeerId)?,
        timestamp_ms: parse_number(parts[2], "timestamp")?,
        ip: parts[3].to_string(),
        port: parse_number(parts[4], "port")?,
    })
}

fn parse_direct(s: &str) -> Result<DirectMessage, DecodeError> {
    let parts: Vec<&str> = s.splitn(4, DELIMITER).collect();
    if parts.len() < 4 {
        return Err(DecodeError::MissingFields {
            kind: MSG_TAG,
            expected: 4,
            found: parts.len(),
        });
    }

    Ok(DirectMessage {
        from: parse_number(parts[1], "fromId").map(PeerId)?,
        to: parse_number(parts[2], "toId").map(PeerId)?,
        text: parts[3].to_string(),
    })
}

fn parse_chat(s: &str) -> Result<ChatMessage, DecodeError> {
    let parts: Vec<&str> = s.splitn(3, DELIMITER).collect();
    if parts.len() < 3 {
        return Err(DecodeError::MissingFields {
            kind: CHAT_TAG,
            expected: 3,
            found: parts.len(),
        });
    }

    Ok(ChatMessage {
        from: parse_number(parts[1], "fromId").map(PeerId)?,
        text: parts[2].to_string(),
    })
}

fn parse_number<T: FromStr>(value: &str, field: &'static str) -> Result<T, DecodeError> {
    value.parse().map_err(|_| DecodeError::InvalidNumber {
        field,
        value: value.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Codec
// ---------------------------------------------------------------------------

/// Converts wire messages to and from datagram payloads.
pub trait WireCodec: Send + Sync {
    fn encode(&self, message: &WireMessage) -> Result<Vec<u8>, EncodeError>;
    fn decode(&self, data: &[u8]) -> Result<WireMessage, DecodeError>;
}

/// The `;`-delimited UTF-8 encoding.
///
/// Encoding refuses a heartbeat whose IP would not survive the trip, since
/// a `;` in it would move the port field. Decoding trims surrounding whitespace from the datagram first, so text
/// with leading or trailing whitespace does not survive a round trip.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextCodec;

impl WireCodec for TextCodec {
    fn encode(&self, message: &WireMessage) -> Result<Vec<u8>, EncodeError> {
        if let WireMessage::Heartbeat(hb) = message {
            check_field("ip", &hb.ip)?;
        }
        Ok(message.to_string().into_bytes())
    }

    fn decode(&self, data: &[u8]) -> Result<WireMessage, DecodeError> {
        std::str::from_utf8(data)
            .map_err(|_| DecodeError::NotUtf8)?
            .parse()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn heartbeat() -> WireMessage {
        WireMessage::Heartbeat(HeartbeatMessage {
            sender: PeerId(1),
            timestamp_ms: 1_700_000_000_123,
            ip: "192.168.1.10".to_string(),
            port: 6001,
        })
    }

    #[test]
    fn test_heartbeat_encoding() {
        let bytes = TextCodec.encode(&heartbeat()).unwrap();
        assert_eq!(bytes, b"HEARTBEAT;1;1700000000123;192.168.1.10;6001");
    }

    #[test]
    fn test_heartbeat_roundtrip() {
        let original = heartbeat();
        let decoded = TextCodec.decode(&TextCodec.encode(&original).unwrap()).unwrap();
        assert_eq!(decoded, original);
        assert_eq!(decoded.kind(), "HEARTBEAT");
    }

    #[test]
    fn test_direct_message_keeps_delimiters_in_text() {
        let original = WireMessage::Direct(DirectMessage {
            from: PeerId(1),
            to: PeerId(2),
            text: "a;b;;c ; d".to_string(),
        });

        let bytes = TextCodec.encode(&original).unwrap();
        assert_eq!(bytes, b"MSG;1;2;a;b;;c ; d");
        assert_eq!(TextCodec.decode(&bytes).unwrap(), original);
    }

    #[test]
    fn test_direct_message_empty_text() {
        let decoded = TextCodec.decode(b"MSG;3;4;").unwrap();
        assert_eq!(
            decoded,
            WireMessage::Direct(DirectMessage {
                from: PeerId(3),
                to: PeerId(4),
                text: String::new(),
            })
        );
    }

    #[test]
    fn test_decode_trims_surrounding_whitespace() {
        let decoded = TextCodec.decode(b"  MSG;1;2;hello\r\n").unwrap();
        match decoded {
            WireMessage::Direct(msg) => assert_eq!(msg.text, "hello"),
            other => panic!("Expected direct message, got {other:?}"),
        }
    }

    #[test]
    fn test_heartbeat_extra_fields_ignored() {
        let decoded = TextCodec
            .decode(b"HEARTBEAT;9;100;10.0.0.9;7000;future-field")
            .unwrap();
        match decoded {
            WireMessage::Heartbeat(hb) => {
                assert_eq!(hb.sender, PeerId(9));
                assert_eq!(hb.contact(), Contact::new("10.0.0.9", 7000));
            }
            other => panic!("Expected heartbeat, got {other:?}"),
        }
    }

    #[test]
    fn test_malformed_inputs() {
        assert_eq!(TextCodec.decode(b""), Err(DecodeError::Empty));
        assert_eq!(TextCodec.decode(b"   \n"), Err(DecodeError::Empty));
        assert_eq!(
            TextCodec.decode(b"HEARTBEAT;abc"),
            Err(DecodeError::MissingFields {
                kind: "HEARTBEAT",
                expected: 5,
                found: 2,
            })
        );
        assert_eq!(
            TextCodec.decode(b"GARBAGE;1;2;3;4"),
            Err(DecodeError::UnknownKind("GARBAGE".to_string()))
        );
        assert_eq!(
            TextCodec.decode(b"MSG;1;2"),
            Err(DecodeError::MissingFields {
                kind: "MSG",
                expected: 4,
                found: 3,
            })
        );
        assert_eq!(TextCodec.decode(&[0xff, 0xfe, 0x00]), Err(DecodeError::NotUtf8));
    }

    #[test]
    fn test_bad_numbers_are_rejected() {
        assert_eq!(
            TextCodec.decode(b"HEARTBEAT;abc;1;10.0.0.1;6000"),
            Err(DecodeError::InvalidNumber {
                field: "senderId",
                value: "abc".to_string(),
            })
        );
        assert_eq!(
            TextCodec.decode(b"HEARTBEAT;1;1;10.0.0.1;70000"),
            Err(DecodeError::InvalidNumber {
                field: "port",
                value: "70000".to_string(),
            })
        );
        assert_eq!(
            TextCodec.decode(b"MSG;1;two;hi"),
            Err(DecodeError::InvalidNumber {
                field: "toId",
                value: "two".to_string(),
            })
        );
    }

    #[test]
    fn test_heartbeat_with_unsafe_ip_is_not_encoded() {
        for ip in ["10.0.0.1;7000", "10.0.0.1 ", "", "host name"] {
            let message = WireMessage::Heartbeat(HeartbeatMessage {
                sender: PeerId(1),
                timestamp_ms: 1,
                ip: ip.to_string(),
                port: 6001,
            });
            assert_eq!(
                TextCodec.encode(&message),
                Err(EncodeError::UnsafeField {
                    field: "ip",
                    value: ip.to_string(),
                }),
                "{ip:?}"
            );
        }
    }

    #[test]
    fn test_check_field() {
        assert!(check_field("ip", "192.168.1.10").is_ok());
        assert!(check_field("ip", "peer-host.lan").is_ok());
        assert!(check_field("ip", "a;b").is_err());
        assert!(check_field("ip", "a\tb").is_err());
    }

    #[test]
    fn test_chat_message_keeps_delimiters_in_text() {
        let original = WireMessage::Chat(ChatMessage {
            from: PeerId(4),
            text: "hello; everyone".to_string(),
        });

        let bytes = TextCodec.encode(&original).unwrap();
        assert_eq!(bytes, b"CHAT;4;hello; everyone");
        assert_eq!(TextCodec.decode(&bytes).unwrap(), original);
        assert_eq!(original.kind(), "CHAT");
        assert_eq!(
            TextCodec.decode(b"CHAT;4"),
            Err(DecodeError::MissingFields {
                kind: "CHAT",
                expected: 3,
                found: 2,
            })
        );
    }

    #[test]
    fn test_datagram_limit() {
        assert!(within_datagram_limit(0));
        assert!(within_datagram_limit(MAX_DATAGRAM_SIZE));
        assert!(!within_datagram_limit(MAX_DATAGRAM_SIZE + 1));
        assert!(RECV_BUFFER_SIZE > MAX_DATAGRAM_SIZE);
    }

    #[test]
    fn test_kind_is_case_sensitive() {
        assert!(matches!(
            TextCodec.decode(b"heartbeat;1;1;10.0.0.1;6000"),
            Err(DecodeError::UnknownKind(_))
        ));
    }
}
