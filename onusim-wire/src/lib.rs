//! Typed attribute field codecs for OMCI (ITU-T G.988) messages.
//!
//! A [`Datum`] describes a single field of a managed entity attribute: its
//! encoded size, its kind (unsigned integer, boolean, enumeration, bit
//! field, string, raw bytes or table row) and optional default and fixed
//! values. Datums encode and decode [`Value`]s big-endian, per G.988 clause
//! 11.1: multi-byte integers are network order, strings are zero-padded on
//! the right.
//!
//! This crate is used internally by [`onusim`](https://crates.io/crates/onusim);
//! the schema (which datums make up which attribute) lives there.

#![deny(missing_docs)]
#![deny(trivial_casts)]
#![deny(trivial_numeric_casts)]
#![deny(unused_import_braces)]
#![deny(rustdoc::broken_intra_doc_links)]

mod error;

pub use error::WireError;

use log::warn;

/// The kind of a [`Datum`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Kind {
    /// Big-endian unsigned integer.
    Unsigned,
    /// Boolean, encoded as an unsigned integer with 0 = false.
    Bool,
    /// Enumeration; the encoded value is the label's index.
    Enum(&'static [&'static str]),
    /// Bit field; bit `n` (MSB first) corresponds to label `n`.
    Bits(&'static [&'static str]),
    /// UTF-8 string, zero-padded on the right to the field size.
    Str,
    /// Raw bytes, zero-padded on the right to the field size.
    Bytes,
    /// Table attribute with fixed-size rows.
    ///
    /// Tables are written one row per message (G.988 clause 11.2.1.2), so a
    /// table datum decodes exactly one row. Whole tables are read back in
    /// 29-byte chunks by the get-next action, which operates on raw row
    /// bytes rather than on this codec.
    Table {
        /// Size of one row in bytes.
        row_size: usize,
    },
}

impl Kind {
    fn name(&self) -> &'static str {
        match self {
            Kind::Unsigned => "unsigned",
            Kind::Bool => "bool",
            Kind::Enum(_) => "enum",
            Kind::Bits(_) => "bits",
            Kind::Str => "string",
            Kind::Bytes => "bytes",
            Kind::Table { .. } => "table",
        }
    }
}

/// A single decoded field value.
///
/// One variant per [`Kind`]; encoding and decoding dispatch on the tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// Unsigned integer.
    Unsigned(u64),
    /// Boolean.
    Bool(bool),
    /// Enumeration label.
    Enum(&'static str),
    /// Set of bit field labels.
    Bits(Vec<&'static str>),
    /// String.
    Str(String),
    /// Raw bytes.
    Bytes(Vec<u8>),
    /// Table rows.
    Table(Vec<Vec<u8>>),
}

impl Value {
    fn kind_name(&self) -> &'static str {
        match self {
            Value::Unsigned(_) => "unsigned",
            Value::Bool(_) => "bool",
            Value::Enum(_) => "enum",
            Value::Bits(_) => "bits",
            Value::Str(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::Table(_) => "table",
        }
    }

    /// Returns the value as an unsigned integer, if it is one.
    pub fn as_unsigned(&self) -> Option<u64> {
        match self {
            Value::Unsigned(value) => Some(*value),
            Value::Bool(value) => Some(u64::from(*value)),
            _ => None,
        }
    }
}

impl core::fmt::Display for Value {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Value::Unsigned(value) => write!(f, "{}", value),
            Value::Bool(value) => write!(f, "{}", value),
            Value::Enum(label) => f.write_str(label),
            Value::Bits(labels) => write!(f, "{}", labels.join("|")),
            Value::Str(value) => write!(f, "{:?}", value),
            Value::Bytes(bytes) => {
                for byte in bytes {
                    write!(f, "{:02x}", byte)?;
                }
                Ok(())
            }
            Value::Table(rows) => write!(f, "table[{} rows]", rows.len()),
        }
    }
}

/// A single typed data item within a managed entity attribute.
///
/// An attribute's data is one or more datums in fixed order; the attribute's
/// encoded size is the sum of its datum sizes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datum {
    size: usize,
    kind: Kind,
    default: Option<Value>,
    fixed: Option<Value>,
    units: Option<&'static str>,
}

impl Datum {
    fn new(size: usize, kind: Kind) -> Self {
        if matches!(kind, Kind::Unsigned | Kind::Bool | Kind::Enum(_) | Kind::Bits(_)) {
            assert!(
                matches!(size, 1 | 2 | 4 | 8),
                "integer datum size must be 1, 2, 4 or 8, not {}",
                size
            );
        }

        if let Kind::Enum(labels) | Kind::Bits(labels) = kind {
            // Label count must be representable in `size` bytes (as an index
            // for enums, as bit positions for bit fields).
            if size < 8 {
                let max = match kind {
                    Kind::Enum(_) => 1usize << (8 * size),
                    _ => 8 * size,
                };
                assert!(
                    labels.len() <= max,
                    "{} labels do not fit in {} bytes",
                    labels.len(),
                    size
                );
            }
        }

        Self {
            size,
            kind,
            default: None,
            fixed: None,
            units: None,
        }
    }

    /// A big-endian unsigned integer of 1, 2, 4 or 8 bytes.
    pub fn unsigned(size: usize) -> Self {
        Self::new(size, Kind::Unsigned)
    }

    /// A boolean of 1, 2, 4 or 8 bytes.
    pub fn boolean(size: usize) -> Self {
        Self::new(size, Kind::Bool)
    }

    /// An enumeration; the encoded value is the index into `labels`.
    pub fn enumeration(size: usize, labels: &'static [&'static str]) -> Self {
        Self::new(size, Kind::Enum(labels))
    }

    /// A bit field; bit `n` (MSB of the first byte first) is label `n`.
    pub fn bits(size: usize, labels: &'static [&'static str]) -> Self {
        Self::new(size, Kind::Bits(labels))
    }

    /// A UTF-8 string of at most `size` bytes, zero-padded on the right.
    pub fn string(size: usize) -> Self {
        Self::new(size, Kind::Str)
    }

    /// Raw bytes, zero-padded on the right to `size`.
    pub fn bytes(size: usize) -> Self {
        Self::new(size, Kind::Bytes)
    }

    /// A table of fixed-size rows.
    pub fn table(row_size: usize) -> Self {
        assert!(row_size > 0, "table row size must be non-zero");

        Self::new(row_size, Kind::Table { row_size })
    }

    /// Overrides the kind's natural default value.
    pub fn with_default(mut self, default: Value) -> Self {
        assert_eq!(
            default.kind_name(),
            self.kind.name(),
            "default value kind mismatch"
        );
        self.default = Some(default);
        self
    }

    /// Pins the datum to a fixed value.
    ///
    /// A fixed value is the only permissible encoded value; it takes
    /// precedence over the default. Decoding a different value logs a
    /// warning but returns the received value unchanged.
    pub fn with_fixed(mut self, fixed: Value) -> Self {
        assert_eq!(
            fixed.kind_name(),
            self.kind.name(),
            "fixed value kind mismatch"
        );
        self.fixed = Some(fixed);
        self
    }

    /// Attaches a unit label, for documentation only.
    pub fn with_units(mut self, units: &'static str) -> Self {
        self.units = Some(units);
        self
    }

    /// Encoded size in bytes (for tables, the size of one row).
    pub fn size(&self) -> usize {
        self.size
    }

    /// The datum's kind.
    pub fn kind(&self) -> Kind {
        self.kind
    }

    /// The fixed value, if any.
    pub fn fixed(&self) -> Option<&Value> {
        self.fixed.as_ref()
    }

    /// The unit label, if any.
    pub fn units(&self) -> Option<&'static str> {
        self.units
    }

    /// The value encoded when none is supplied: the fixed value, the
    /// configured default, or the kind's natural default, in that order.
    pub fn default_value(&self) -> Value {
        if let Some(fixed) = &self.fixed {
            return fixed.clone();
        }

        if let Some(default) = &self.default {
            return default.clone();
        }

        match self.kind {
            Kind::Unsigned => Value::Unsigned(0),
            Kind::Bool => Value::Bool(false),
            Kind::Enum(labels) => Value::Enum(labels.first().copied().unwrap_or("")),
            Kind::Bits(_) => Value::Bits(Vec::new()),
            Kind::Str => Value::Str(String::new()),
            Kind::Bytes => Value::Bytes(Vec::new()),
            Kind::Table { .. } => Value::Table(Vec::new()),
        }
    }

    /// The number of bytes [`Datum::encode_into`] will produce for `value`.
    ///
    /// This is `size` for everything but tables, whose encoded length
    /// depends on the number of rows.
    pub fn encoded_len(&self, value: Option<&Value>) -> usize {
        match (self.kind, value) {
            (Kind::Table { row_size }, Some(Value::Table(rows))) => row_size * rows.len(),
            _ => self.size,
        }
    }

    /// Encodes `value` (or the default, when `None`) onto the end of `buf`.
    pub fn encode_into(&self, value: Option<&Value>, buf: &mut Vec<u8>) -> Result<(), WireError> {
        let default;
        let value = match value {
            Some(value) => value,
            None => {
                default = self.default_value();
                &default
            }
        };

        match (self.kind, value) {
            (Kind::Unsigned, Value::Unsigned(raw)) => self.encode_unsigned(*raw, buf),
            (Kind::Bool, Value::Bool(flag)) => self.encode_unsigned(u64::from(*flag), buf),
            (Kind::Enum(labels), Value::Enum(label)) => {
                let index = labels
                    .iter()
                    .position(|candidate| candidate == label)
                    .ok_or(WireError::UnknownLabel(*label))?;

                self.encode_unsigned(index as u64, buf)
            }
            (Kind::Bits(labels), Value::Bits(set)) => {
                let mut raw = 0u64;

                for label in set {
                    let index = labels
                        .iter()
                        .position(|candidate| candidate == label)
                        .ok_or(WireError::UnknownLabel(*label))?;

                    raw |= 1u64 << (8 * self.size - 1 - index);
                }

                self.encode_unsigned(raw, buf)
            }
            (Kind::Str, Value::Str(text)) => self.encode_padded(text.as_bytes(), buf),
            (Kind::Bytes, Value::Bytes(bytes)) => self.encode_padded(bytes, buf),
            (Kind::Table { row_size }, Value::Table(rows)) => {
                for row in rows {
                    if row.len() != row_size {
                        return Err(WireError::RowSizeMismatch {
                            expected: row_size,
                            actual: row.len(),
                        });
                    }

                    buf.extend_from_slice(row);
                }

                Ok(())
            }
            (kind, value) => Err(WireError::TypeMismatch {
                expected: kind.name(),
                actual: value.kind_name(),
            }),
        }
    }

    /// Decodes one value from `buf` at `offset`, returning it and the offset
    /// of the next field.
    ///
    /// A buffer shorter than `offset + size` yields the default value, with
    /// the offset still advanced: baseline message payloads are zero-padded
    /// to a fixed length and absent trailing attributes must decode cleanly.
    pub fn decode(&self, buf: &[u8], offset: usize) -> Result<(Value, usize), WireError> {
        let next = offset + self.size;

        if next > buf.len() {
            return Ok((self.default_value(), next));
        }

        let raw = &buf[offset..next];

        let value = match self.kind {
            Kind::Unsigned => Value::Unsigned(be_to_u64(raw)),
            Kind::Bool => Value::Bool(be_to_u64(raw) != 0),
            Kind::Enum(labels) => {
                let index = be_to_u64(raw);

                let label = labels
                    .get(usize::try_from(index).unwrap_or(usize::MAX))
                    .copied()
                    .ok_or(WireError::EnumOutOfRange {
                        value: index,
                        count: labels.len(),
                    })?;

                Value::Enum(label)
            }
            Kind::Bits(labels) => {
                let raw = be_to_u64(raw);

                let set = labels
                    .iter()
                    .enumerate()
                    .filter(|(index, _)| raw & (1 << (8 * self.size - 1 - index)) != 0)
                    .map(|(_, label)| *label)
                    .collect();

                Value::Bits(set)
            }
            Kind::Str => {
                let trimmed = trim_trailing_nuls(raw);

                Value::Str(
                    core::str::from_utf8(trimmed)
                        .map_err(|_| WireError::Utf8)?
                        .to_string(),
                )
            }
            Kind::Bytes => Value::Bytes(raw.to_vec()),
            Kind::Table { .. } => Value::Table(vec![raw.to_vec()]),
        };

        if let Some(fixed) = &self.fixed {
            if *fixed != value {
                warn!(
                    "decoded value {} differs from the fixed value {}",
                    value, fixed
                );
            }
        }

        Ok((value, next))
    }

    fn encode_unsigned(&self, raw: u64, buf: &mut Vec<u8>) -> Result<(), WireError> {
        if self.size < 8 && raw >= 1 << (8 * self.size) {
            return Err(WireError::ValueOutOfRange {
                value: raw,
                size: self.size,
            });
        }

        buf.extend_from_slice(&raw.to_be_bytes()[8 - self.size..]);

        Ok(())
    }

    fn encode_padded(&self, bytes: &[u8], buf: &mut Vec<u8>) -> Result<(), WireError> {
        if bytes.len() > self.size {
            return Err(WireError::TooLong {
                max_length: self.size,
                actual_length: bytes.len(),
            });
        }

        buf.extend_from_slice(bytes);
        buf.extend(core::iter::repeat_n(0, self.size - bytes.len()));

        Ok(())
    }
}

impl core::fmt::Display for Datum {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}({})", self.kind.name(), self.size)?;

        if let Some(fixed) = &self.fixed {
            write!(f, "=={}", fixed)?;
        } else if let Some(default) = &self.default {
            write!(f, "={}", default)?;
        }

        Ok(())
    }
}

fn be_to_u64(raw: &[u8]) -> u64 {
    raw.iter().fold(0u64, |acc, byte| (acc << 8) | u64::from(*byte))
}

fn trim_trailing_nuls(raw: &[u8]) -> &[u8] {
    let end = raw
        .iter()
        .rposition(|byte| *byte != 0)
        .map_or(0, |position| position + 1);

    &raw[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn unsigned_round_trip() {
        let datum = Datum::unsigned(2);

        let mut buf = Vec::new();
        datum
            .encode_into(Some(&Value::Unsigned(0x1234)), &mut buf)
            .unwrap();

        assert_eq!(buf, [0x12, 0x34]);
        assert_eq!(
            datum.decode(&buf, 0).unwrap(),
            (Value::Unsigned(0x1234), 2)
        );
    }

    #[test]
    fn unsigned_too_large() {
        let mut buf = Vec::new();

        assert_eq!(
            Datum::unsigned(1).encode_into(Some(&Value::Unsigned(256)), &mut buf),
            Err(WireError::ValueOutOfRange {
                value: 256,
                size: 1
            })
        );
    }

    #[test]
    fn short_buffer_decodes_default() {
        let datum = Datum::unsigned(4).with_default(Value::Unsigned(7));

        // Offset advances past the end so the next field still lines up.
        assert_eq!(datum.decode(&[0xff], 0).unwrap(), (Value::Unsigned(7), 4));
    }

    #[test]
    fn string_is_zero_padded_and_trimmed() {
        let datum = Datum::string(6);

        let mut buf = Vec::new();
        datum
            .encode_into(Some(&Value::Str("abc".into())), &mut buf)
            .unwrap();

        assert_eq!(buf, b"abc\0\0\0");
        assert_eq!(
            datum.decode(&buf, 0).unwrap(),
            (Value::Str("abc".into()), 6)
        );
    }

    #[test]
    fn string_too_long() {
        let mut buf = Vec::new();

        assert_eq!(
            Datum::string(2).encode_into(Some(&Value::Str("abc".into())), &mut buf),
            Err(WireError::TooLong {
                max_length: 2,
                actual_length: 3
            })
        );
    }

    #[test]
    fn enum_encodes_label_index() {
        let datum = Datum::enumeration(1, &["unlock", "lock"]);

        let mut buf = Vec::new();
        datum
            .encode_into(Some(&Value::Enum("lock")), &mut buf)
            .unwrap();

        assert_eq!(buf, [1]);
        assert_eq!(datum.decode(&buf, 0).unwrap(), (Value::Enum("lock"), 1));
    }

    #[test]
    fn enum_out_of_range() {
        let datum = Datum::enumeration(1, &["a", "b"]);

        assert_eq!(
            datum.decode(&[9], 0),
            Err(WireError::EnumOutOfRange { value: 9, count: 2 })
        );
    }

    #[test]
    fn bits_round_trip_msb_first() {
        let datum = Datum::bits(1, &["annex-c", "annex-d"]);

        let mut buf = Vec::new();
        datum
            .encode_into(Some(&Value::Bits(vec!["annex-d"])), &mut buf)
            .unwrap();

        // Bit 1 is the second-most-significant bit.
        assert_eq!(buf, [0b0100_0000]);
        assert_eq!(
            datum.decode(&buf, 0).unwrap(),
            (Value::Bits(vec!["annex-d"]), 1)
        );
    }

    #[test]
    fn none_encodes_fixed_over_default() {
        let datum = Datum::unsigned(2)
            .with_default(Value::Unsigned(1))
            .with_fixed(Value::Unsigned(2));

        let mut buf = Vec::new();
        datum.encode_into(None, &mut buf).unwrap();

        assert_eq!(buf, [0, 2]);
    }

    #[test]
    fn fixed_mismatch_returns_received_value() {
        let datum = Datum::unsigned(1).with_fixed(Value::Unsigned(0));

        // Warned about, but not silently corrected.
        assert_eq!(datum.decode(&[5], 0).unwrap(), (Value::Unsigned(5), 1));
    }

    #[test]
    fn table_decodes_one_row() {
        let datum = Datum::table(4);

        let buf = [1, 2, 3, 4, 5, 6, 7, 8];

        assert_eq!(
            datum.decode(&buf, 0).unwrap(),
            (Value::Table(vec![vec![1, 2, 3, 4]]), 4)
        );
    }

    #[test]
    fn table_encodes_all_rows() {
        let datum = Datum::table(2);

        let mut buf = Vec::new();
        datum
            .encode_into(
                Some(&Value::Table(vec![vec![1, 2], vec![3, 4]])),
                &mut buf,
            )
            .unwrap();

        assert_eq!(buf, [1, 2, 3, 4]);
        assert_eq!(
            datum.encoded_len(Some(&Value::Table(vec![vec![1, 2], vec![3, 4]]))),
            4
        );
    }

    #[test]
    fn type_mismatch() {
        let mut buf = Vec::new();

        assert_eq!(
            Datum::boolean(1).encode_into(Some(&Value::Str("no".into())), &mut buf),
            Err(WireError::TypeMismatch {
                expected: "bool",
                actual: "string"
            })
        );
    }
}
