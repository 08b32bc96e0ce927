//! Field tables: self-describing key/value structures
//!
//! ```text
//! table  = long-uint byte-length *entry
//! entry  = short-string key, octet tag, value
//! tag    = 'S' long string | 'I' signed long | 'D' decimal | 'T' timestamp | 'F' table
//! ```

use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::wire::{Reader, Writer};
use crate::WireError;

/// Fixed-point decimal: `value / 10^scale`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Decimal {
    /// Number of decimal digits after the point
    pub scale: u8,
    /// Unscaled value
    pub value: i32,
}

impl Decimal {
    /// Create a decimal from an unscaled value and a scale
    pub fn new(value: i32, scale: u8) -> Self {
        Self { scale, value }
    }

    /// Approximate value as a float
    pub fn to_f64(self) -> f64 {
        f64::from(self.value) / 10f64.powi(i32::from(self.scale))
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.scale == 0 {
            return write!(f, "{}", self.value);
        }
        let sign = if self.value < 0 { "-" } else { "" };
        let digits = i64::from(self.value).unsigned_abs().to_string();
        let scale = usize::from(self.scale);
        let digits = format!("{:0>width$}", digits, width = scale + 1);
        let (int, frac) = digits.split_at(digits.len() - scale);
        write!(f, "{}{}.{}", sign, int, frac)
    }
}

/// A typed table value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    /// `S`: opaque byte string
    LongString(Bytes),
    /// `I`: signed 32-bit integer
    SignedInt(i32),
    /// `D`: fixed-point decimal
    Decimal(Decimal),
    /// `T`: seconds since the Unix epoch
    Timestamp(u64),
    /// `F`: nested table
    Table(FieldTable),
    /// Value carried under a tag this codec does not know
    Void,
}

impl FieldValue {
    /// Wire tag for this value, `None` for `Void`
    pub fn tag(&self) -> Option<u8> {
        match self {
            Self::LongString(_) => Some(b'S'),
            Self::SignedInt(_) => Some(b'I'),
            Self::Decimal(_) => Some(b'D'),
            Self::Timestamp(_) => Some(b'T'),
            Self::Table(_) => Some(b'F'),
            Self::Void => None,
        }
    }

    /// Borrow the bytes of a long-string value
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::LongString(b) => Some(b.as_ref()),
            _ => None,
        }
    }

    /// Borrow a long-string value as UTF-8 text
    pub fn as_str(&self) -> Option<&str> {
        self.as_bytes().and_then(|b| std::str::from_utf8(b).ok())
    }

    /// Get a signed-int value
    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Self::SignedInt(n) => Some(*n),
            _ => None,
        }
    }

    /// Borrow a nested table
    pub fn as_table(&self) -> Option<&FieldTable> {
        match self {
            Self::Table(t) => Some(t),
            _ => None,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        Self::LongString(Bytes::copy_from_slice(s.as_bytes()))
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        Self::LongString(Bytes::from(s))
    }
}

impl From<Bytes> for FieldValue {
    fn from(b: Bytes) -> Self {
        Self::LongString(b)
    }
}

impl From<i32> for FieldValue {
    fn from(n: i32) -> Self {
        Self::SignedInt(n)
    }
}

impl From<Decimal> for FieldValue {
    fn from(d: Decimal) -> Self {
        Self::Decimal(d)
    }
}

impl From<FieldTable> for FieldValue {
    fn from(t: FieldTable) -> Self {
        Self::Table(t)
    }
}

/// Ordered table of named values, kept in insertion (or arrival) order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldTable {
    entries: Vec<(String, FieldValue)>,
}

impl FieldTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value, replacing any previous value under the same key in place
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<FieldValue>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Builder-style insert
    pub fn with(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.insert(key, value);
        self
    }

    /// Look up a value by key
    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate entries in order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl<K: Into<String>, V: Into<FieldValue>> FromIterator<(K, V)> for FieldTable {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut table = Self::new();
        for (k, v) in iter {
            table.insert(k, v);
        }
        table
    }
}

/// Decode the entries of a table whose length prefix was already consumed
pub(crate) fn decode_entries(mut body: Reader) -> Result<FieldTable, WireError> {
    let mut table = FieldTable::new();

    while !body.is_empty() {
        let key = body.read_short_str()?;
        let tag = body.read_octet()?;
        let value = match tag {
            b'S' => FieldValue::LongString(body.read_long_str()?),
            b'I' => FieldValue::SignedInt(body.read_signed_long()?),
            b'D' => {
                let scale = body.read_octet()?;
                let value = body.read_signed_long()?;
                FieldValue::Decimal(Decimal { scale, value })
            }
            b'T' => FieldValue::Timestamp(body.read_timestamp()?),
            b'F' => FieldValue::Table(body.read_table()?),
            other => {
                // Without a known width the rest of this table is unreadable
                trace!(key = %key, tag = other, skipped = body.remaining(), "Unknown table tag");
                table.entries.push((key, FieldValue::Void));
                break;
            }
        };
        table.entries.push((key, value));
    }

    Ok(table)
}

/// Encode the entries of a table without its length prefix
pub(crate) fn encode_entries(table: &FieldTable) -> Result<Bytes, WireError> {
    let mut out = Writer::new();

    for (key, value) in &table.entries {
        let Some(tag) = value.tag() else {
            continue;
        };
        out.write_short_str(key)?;
        out.write_octet(tag);
        match value {
            FieldValue::LongString(b) => out.write_long_str(b)?,
            FieldValue::SignedInt(n) => out.write_signed_long(*n),
            FieldValue::Decimal(d) => {
                out.write_octet(d.scale);
                out.write_signed_long(d.value);
            }
            FieldValue::Timestamp(t) => out.write_timestamp(*t),
            FieldValue::Table(t) => out.write_table(t)?,
            FieldValue::Void => {}
        }
    }

    Ok(out.finish())
}
