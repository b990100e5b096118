//! Simulator error types.

use onusim_wire::WireError;

/// An OMCI simulator error.
///
/// Database-level failures are never surfaced here: they travel as reason
/// codes inside normal response messages. This type covers the framing,
/// dispatch and transport layers.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Error {
    /// An error occurred encoding or decoding an attribute value.
    Wire(WireError),
    /// A low level error occurred in the OMCI frame itself.
    Frame(FrameError),
    /// A message key does not map to a known message class.
    UnknownMessageType {
        /// The acknowledge-request flag.
        ar: bool,
        /// The acknowledgement flag.
        ak: bool,
        /// The five-bit message type code.
        mt: u8,
    },
    /// A managed entity class is not part of the loaded MIB schema.
    UnknownMib(u16),
    /// An attribute number is not declared by its managed entity class, so
    /// the remainder of the payload cannot be sized.
    UnknownAttribute {
        /// The managed entity class.
        me_class: u16,
        /// The undeclared attribute number.
        number: u8,
    },
    /// A string was too long to fit in a fixed size wire field.
    StringTooLong {
        /// The length of the fixed size field.
        max_length: usize,
        /// The length of the input string.
        string_length: usize,
    },
    /// A message payload does not fit the frame's contents area.
    ContentsTooLong {
        /// Payload length in bytes.
        length: usize,
        /// Maximum contents length for this framing.
        max_length: usize,
    },
    /// No OLT-side peer address has been observed yet, so an autonomous
    /// message has nowhere to go.
    NoPeer,
    /// Something timed out.
    Timeout,
    /// A socket operation failed.
    Io(std::io::ErrorKind),
}

impl std::error::Error for Error {}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::Wire(e) => write!(f, "wire encode/decode error: {}", e),
            Error::Frame(e) => write!(f, "frame: {}", e),
            Error::UnknownMessageType { ar, ak, mt } => write!(
                f,
                "unknown message type (ar={}, ak={}, mt={})",
                ar, ak, mt
            ),
            Error::UnknownMib(me_class) => write!(f, "ME class {} is not implemented", me_class),
            Error::UnknownAttribute { me_class, number } => write!(
                f,
                "ME class {} does not declare attribute {}",
                me_class, number
            ),
            Error::StringTooLong {
                max_length,
                string_length,
            } => write!(
                f,
                "string of {} bytes is too long to fit in max storage of {} bytes",
                string_length, max_length
            ),
            Error::ContentsTooLong { length, max_length } => write!(
                f,
                "contents of {} bytes exceed the {} byte frame limit",
                length, max_length
            ),
            Error::NoPeer => f.write_str("no peer address observed yet"),
            Error::Timeout => f.write_str("timeout"),
            Error::Io(kind) => write!(f, "socket: {}", kind),
        }
    }
}

/// Low-level OMCI framing error.
///
/// Most of these are logged and recovered from: a datagram is decoded best
/// effort as long as its header fields are readable.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// The buffer ends before the fixed header.
    Truncated {
        /// Bytes required.
        needed: usize,
        /// Bytes available.
        available: usize,
    },
    /// The device identifier is neither 0x0a (baseline) nor 0x0b (extended).
    DeviceId(u8),
    /// The reserved MSB of the message type byte is set.
    ReservedTypeBit(u8),
    /// The baseline CPCS-SDU trailer is not 0x0028.
    Trailer(u16),
    /// The buffer length does not match the decoded frame length.
    LengthMismatch {
        /// Length implied by the frame.
        expected: usize,
        /// Actual buffer length.
        actual: usize,
    },
}

impl core::fmt::Display for FrameError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            FrameError::Truncated { needed, available } => {
                write!(f, "truncated: have {} bytes, need {}", available, needed)
            }
            FrameError::DeviceId(dev_id) => {
                write!(f, "device identifier {:#04x} is invalid", dev_id)
            }
            FrameError::ReservedTypeBit(type_byte) => {
                write!(f, "message type {:#04x} has the reserved MSB set", type_byte)
            }
            FrameError::Trailer(cpcs_sdu) => write!(
                f,
                "CPCS-SDU trailer {:#06x} is invalid; should be 0x0028",
                cpcs_sdu
            ),
            FrameError::LengthMismatch { expected, actual } => write!(
                f,
                "buffer length ({}) doesn't match expected length ({})",
                actual, expected
            ),
        }
    }
}

impl From<WireError> for Error {
    fn from(e: WireError) -> Self {
        Self::Wire(e)
    }
}

impl From<FrameError> for Error {
    fn from(e: FrameError) -> Self {
        Self::Frame(e)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.kind())
    }
}
