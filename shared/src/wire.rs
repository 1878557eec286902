//! Fixed-layout message codec.
//!
//! Payloads carry no length prefix. A UDP datagram boundary or a single TCP
//! read delimits each message, so decoding first checks that the byte count
//! matches the layout exactly and only then decodes the fields. `bincode`'s
//! default configuration writes fixed-width little-endian integers and one
//! byte per `bool`, which is exactly the layout below:
//!
//! | Message           | Bytes | Fields                                   |
//! |-------------------|-------|------------------------------------------|
//! | `InitialSettings` | 16    | delay i32, jitter i32, spawn x, spawn y  |
//! | `LatencySettings` | 8     | delay i32, jitter i32                    |
//! | `PortAssignment`  | 4     | port i32                                 |
//! | `InputFrame`      | 4     | up, down, left, right (one byte each)    |
//! | `Position`        | 8     | x i32, y i32                             |

use crate::{InitialSettings, InputFrame, LatencySettings, PortAssignment, Position};
use bincode::{deserialize, serialize};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WireError {
    #[error("framing error: {message} expects {expected} bytes, got {actual}")]
    Framing {
        message: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("malformed {message}: {source}")]
    Malformed {
        message: &'static str,
        #[source]
        source: bincode::Error,
    },
    #[error("port {0} is outside the valid UDP port range")]
    InvalidPort(i32),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl WireError {
    pub fn is_framing(&self) -> bool {
        matches!(self, WireError::Framing { .. })
    }
}

/// A message with a single exact on-wire width.
pub trait FixedLayout: Serialize + DeserializeOwned {
    /// Exact encoded size in bytes.
    const LEN: usize;
    /// Name used in diagnostics.
    const NAME: &'static str;

    fn encode(&self) -> Result<Vec<u8>, WireError> {
        let bytes = serialize(self).map_err(|source| WireError::Malformed {
            message: Self::NAME,
            source,
        })?;
        debug_assert_eq!(bytes.len(), Self::LEN);
        Ok(bytes)
    }

    fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        if bytes.len() != Self::LEN {
            return Err(WireError::Framing {
                message: Self::NAME,
                expected: Self::LEN,
                actual: bytes.len(),
            });
        }

        deserialize(bytes).map_err(|source| WireError::Malformed {
            message: Self::NAME,
            source,
        })
    }
}

impl FixedLayout for InitialSettings {
    const LEN: usize = 16;
    const NAME: &'static str = "initial settings";
}

impl FixedLayout for LatencySettings {
    const LEN: usize = 8;
    const NAME: &'static str = "settings update";
}

impl FixedLayout for PortAssignment {
    const LEN: usize = 4;
    const NAME: &'static str = "port assignment";
}

impl FixedLayout for InputFrame {
    const LEN: usize = 4;
    const NAME: &'static str = "input frame";
}

impl FixedLayout for Position {
    const LEN: usize = 8;
    const NAME: &'static str = "state update";
}

impl PortAssignment {
    /// Validates the announced port as a usable UDP port.
    pub fn udp_port(&self) -> Result<u16, WireError> {
        match u16::try_from(self.port) {
            Ok(port) if port != 0 => Ok(port),
            _ => Err(WireError::InvalidPort(self.port)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_framing<T: FixedLayout + std::fmt::Debug>(len: usize) {
        let bytes = vec![0u8; len];
        match T::decode(&bytes) {
            Err(WireError::Framing {
                expected, actual, ..
            }) => {
                assert_eq!(expected, T::LEN);
                assert_eq!(actual, len);
            }
            other => panic!("{} bytes should be a framing error, got {:?}", len, other),
        }
    }

    #[test]
    fn test_encoded_widths_match_layouts() {
        let initial = InitialSettings {
            latency: LatencySettings::new(200, 25),
            spawn: Position::spawn(),
        };
        assert_eq!(initial.encode().unwrap().len(), 16);
        assert_eq!(LatencySettings::new(1, 2).encode().unwrap().len(), 8);
        assert_eq!(PortAssignment::new(50123).encode().unwrap().len(), 4);
        assert_eq!(InputFrame::default().encode().unwrap().len(), 4);
        assert_eq!(Position::new(-1, 1).encode().unwrap().len(), 8);
    }

    #[test]
    fn test_wrong_lengths_are_framing_errors() {
        for len in [0, 1, 3, 5, 7, 9, 15, 17, 32] {
            if len != InitialSettings::LEN {
                assert_framing::<InitialSettings>(len);
            }
            if len != LatencySettings::LEN {
                assert_framing::<LatencySettings>(len);
            }
            if len != PortAssignment::LEN {
                assert_framing::<PortAssignment>(len);
            }
            if len != InputFrame::LEN {
                assert_framing::<InputFrame>(len);
            }
            if len != Position::LEN {
                assert_framing::<Position>(len);
            }
        }
        assert_framing::<LatencySettings>(6);
        assert_framing::<Position>(4);
        assert_framing::<InputFrame>(8);
    }

    #[test]
    fn test_little_endian_field_layout() {
        let state = Position::new(379, 200).encode().unwrap();
        assert_eq!(state, [0x7b, 0x01, 0, 0, 0xc8, 0, 0, 0]);

        let negative = Position::new(-1, -4).encode().unwrap();
        assert_eq!(negative, [0xff, 0xff, 0xff, 0xff, 0xfc, 0xff, 0xff, 0xff]);

        let frame = InputFrame::new(true, false, false, true).encode().unwrap();
        assert_eq!(frame, [1, 0, 0, 1]);

        let initial = InitialSettings {
            latency: LatencySettings::new(200, 25),
            spawn: Position::new(375, 200),
        }
        .encode()
        .unwrap();
        assert_eq!(&initial[0..4], &200i32.to_le_bytes());
        assert_eq!(&initial[4..8], &25i32.to_le_bytes());
        assert_eq!(&initial[8..12], &375i32.to_le_bytes());
        assert_eq!(&initial[12..16], &200i32.to_le_bytes());
    }

    #[test]
    fn test_decode_reproduces_fields() {
        let mut raw = Vec::new();
        raw.extend_from_slice(&150i32.to_le_bytes());
        raw.extend_from_slice(&30i32.to_le_bytes());
        raw.extend_from_slice(&(-20i32).to_le_bytes());
        raw.extend_from_slice(&640i32.to_le_bytes());

        let initial = InitialSettings::decode(&raw).unwrap();
        assert_eq!(initial.latency, LatencySettings::new(150, 30));
        assert_eq!(initial.spawn, Position::new(-20, 640));

        let settings = LatencySettings::decode(&raw[0..8]).unwrap();
        assert_eq!(settings, LatencySettings::new(150, 30));

        let state = Position::decode(&raw[8..16]).unwrap();
        assert_eq!(state, Position::new(-20, 640));

        let port = PortAssignment::decode(&50123i32.to_le_bytes()).unwrap();
        assert_eq!(port.udp_port().unwrap(), 50123);
    }

    #[test]
    fn test_input_frame_all_combinations() {
        for bits in 0u8..16 {
            let frame = InputFrame::new(
                bits & 0b0001 != 0,
                bits & 0b0010 != 0,
                bits & 0b0100 != 0,
                bits & 0b1000 != 0,
            );

            let encoded = frame.encode().unwrap();
            let decoded = InputFrame::decode(&encoded).unwrap();
            assert_eq!(decoded, frame, "combination {:04b}", bits);
        }
    }

    #[test]
    fn test_invalid_bool_byte_is_malformed() {
        let result = InputFrame::decode(&[0, 2, 0, 0]);
        assert!(matches!(result, Err(WireError::Malformed { .. })));
        assert!(!result.unwrap_err().is_framing());
    }

    #[test]
    fn test_invalid_port_assignment() {
        assert!(matches!(
            PortAssignment { port: 0 }.udp_port(),
            Err(WireError::InvalidPort(0))
        ));
        assert!(matches!(
            PortAssignment { port: 70_000 }.udp_port(),
            Err(WireError::InvalidPort(70_000))
        ));
        assert!(matches!(
            PortAssignment { port: -5 }.udp_port(),
            Err(WireError::InvalidPort(-5))
        ));
    }
}
