//! Encode/decode error.

/// Wire encode/decode errors.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum WireError {
    /// A raw enumeration code has no label in the schema.
    EnumOutOfRange {
        /// The received raw code.
        value: u64,
        /// The number of labels the schema declares.
        count: usize,
    },
    /// A label is not part of an enumeration or bit field.
    UnknownLabel(&'static str),
    /// A value does not match the kind of the field it is encoded into.
    TypeMismatch {
        /// The kind the schema expects.
        expected: &'static str,
        /// The kind of the supplied value.
        actual: &'static str,
    },
    /// A value is too large to fit in the field's encoded size.
    TooLong {
        /// Maximum encoded length in bytes.
        max_length: usize,
        /// Actual length in bytes.
        actual_length: usize,
    },
    /// An integer value does not fit in the field's encoded size.
    ValueOutOfRange {
        /// The supplied value.
        value: u64,
        /// Encoded field size in bytes.
        size: usize,
    },
    /// A table row does not match the declared row size.
    RowSizeMismatch {
        /// Declared row size in bytes.
        expected: usize,
        /// Actual row length in bytes.
        actual: usize,
    },
    /// A decoded string is not valid UTF-8.
    Utf8,
}

impl std::error::Error for WireError {}

impl core::fmt::Display for WireError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            WireError::EnumOutOfRange { value, count } => {
                write!(f, "enum code {} out of range (have {} labels)", value, count)
            }
            WireError::UnknownLabel(label) => write!(f, "unknown label {:?}", label),
            WireError::TypeMismatch { expected, actual } => {
                write!(f, "expected a {} value, got {}", expected, actual)
            }
            WireError::TooLong {
                max_length,
                actual_length,
            } => write!(
                f,
                "value of {} bytes is too long for a {} byte field",
                actual_length, max_length
            ),
            WireError::ValueOutOfRange { value, size } => {
                write!(f, "value {} does not fit in {} bytes", value, size)
            }
            WireError::RowSizeMismatch { expected, actual } => write!(
                f,
                "table row of {} bytes should be {} bytes",
                actual, expected
            ),
            WireError::Utf8 => f.write_str("string is not valid UTF-8"),
        }
    }
}
