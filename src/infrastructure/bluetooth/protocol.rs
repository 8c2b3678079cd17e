//! Skateboard Control Protocol
//!
//! Service identity and the command/telemetry codec shared by both ends of
//! the link. The same command vocabulary travels over the wireless
//! characteristic (bare tokens) and over the local actuation socket (tokens
//! framed with a trailing newline), so `decode` tolerates one trailing
//! delimiter.

use crate::domain::models::{Command, TelemetrySnapshot};
use thiserror::Error;

/// Skateboard Control Service UUID
pub const SERVICE_UUID: &str = "12345678-1234-5678-1234-56789abcdef0";

/// Control Characteristic UUID - commands in, telemetry out (read/write/notify)
pub const CONTROL_CHAR_UUID: &str = "abcdef01-1234-5678-1234-56789abcdef0";

/// Advertised local name. Clients match on exact equality, so this is the
/// discovery filter for the whole system.
pub const LOCAL_NAME: &str = "mypi";

/// Manufacturer data carried in the advertisement.
pub const MANUFACTURER_DATA: &[u8] = b"SKB1";

/// Advertised TX power level.
pub const TX_POWER_LEVEL: i8 = 127;

/// User description attached to the control characteristic.
pub const CONTROL_CHAR_DESCRIPTION: &str = "Skateboard Control";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// The payload decoded as text but is not in the command vocabulary.
    #[error("unknown command token: {0:?}")]
    Unknown(String),
    /// The payload is not valid UTF-8 or is otherwise unparseable.
    #[error("malformed payload")]
    Malformed,
}

/// Encode a command as its wire token. Infallible; the vocabulary is fixed.
pub fn encode(command: &Command) -> &'static [u8] {
    match command {
        Command::Accelerate => b"accelerate",
        Command::Decelerate => b"decelerate",
        Command::Stop => b"stop",
        Command::ReverseSet(true) => b"reverse_on",
        Command::ReverseSet(false) => b"reverse_off",
    }
}

/// Decode a wire token, tolerating one trailing newline from the
/// actuation-socket framing. Tokens are case-sensitive.
pub fn decode(bytes: &[u8]) -> Result<Command, DecodeError> {
    let text = std::str::from_utf8(bytes).map_err(|_| DecodeError::Malformed)?;
    let token = text.strip_suffix('\n').unwrap_or(text);
    match token {
        "accelerate" => Ok(Command::Accelerate),
        "decelerate" => Ok(Command::Decelerate),
        "stop" => Ok(Command::Stop),
        "reverse_on" => Ok(Command::ReverseSet(true)),
        "reverse_off" => Ok(Command::ReverseSet(false)),
        other => Err(DecodeError::Unknown(other.to_string())),
    }
}

/// Serialize the read-response payload, e.g. `{"speed":9,"reverse":false}`.
pub fn encode_telemetry(snapshot: &TelemetrySnapshot) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(snapshot)
}

/// Parse a read-response payload.
pub fn decode_telemetry(bytes: &[u8]) -> Result<TelemetrySnapshot, DecodeError> {
    serde_json::from_slice(bytes).map_err(|_| DecodeError::Malformed)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_COMMANDS: [Command; 5] = [
        Command::Accelerate,
        Command::Decelerate,
        Command::Stop,
        Command::ReverseSet(true),
        Command::ReverseSet(false),
    ];

    #[test]
    fn commands_round_trip() {
        for command in ALL_COMMANDS {
            assert_eq!(decode(encode(&command)), Ok(command));
        }
    }

    #[test]
    fn newline_framed_commands_decode() {
        for command in ALL_COMMANDS {
            let mut frame = encode(&command).to_vec();
            frame.push(b'\n');
            assert_eq!(decode(&frame), Ok(command));
        }
    }

    #[test]
    fn tokens_are_case_sensitive() {
        assert_eq!(
            decode(b"Accelerate"),
            Err(DecodeError::Unknown("Accelerate".to_string()))
        );
    }

    #[test]
    fn unknown_token_is_reported_verbatim() {
        assert_eq!(
            decode(b"warp_speed"),
            Err(DecodeError::Unknown("warp_speed".to_string()))
        );
    }

    #[test]
    fn non_utf8_payload_is_malformed() {
        assert_eq!(decode(&[0xff, 0xfe, 0x00]), Err(DecodeError::Malformed));
    }

    #[test]
    fn telemetry_matches_the_board_payload_shape() {
        let snapshot = TelemetrySnapshot {
            speed: 7,
            reverse: true,
        };
        let payload = encode_telemetry(&snapshot).unwrap();
        assert_eq!(payload, br#"{"speed":7,"reverse":true}"#);
        assert_eq!(decode_telemetry(&payload), Ok(snapshot));
    }

    #[test]
    fn garbage_telemetry_is_malformed() {
        assert_eq!(decode_telemetry(b"speed=7"), Err(DecodeError::Malformed));
    }
}
