//! Content properties and content header payloads
//!
//! Property presence is carried by 16-bit flag words. Bits 15 down to 1 of
//! each word map to schema fields in order; bit 0 says another word follows.
//! Values of present fields come after the last flag word, except `Bit`
//! fields whose flag is the value.

use std::collections::BTreeMap;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::table::FieldTable;
use crate::wire::{Reader, Writer};
use crate::WireError;

/// Schema fields described by one flag word
const FIELDS_PER_WORD: usize = 15;

/// Low bit of a flag word: another flag word follows
const CONTINUATION: u16 = 1;

/// Fixed prefix of a content header: class, weight, body size
pub const CONTENT_HEADER_PREFIX: usize = 12;

/// Wire type of a property field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyType {
    /// Short string
    ShortStr,
    /// Field table
    Table,
    /// Unsigned 8-bit integer
    Octet,
    /// Unsigned 16-bit integer
    Short,
    /// Unsigned 64-bit integer
    LongLong,
    /// Seconds since the Unix epoch
    Timestamp,
    /// Boolean carried by the presence flag alone
    Bit,
}

/// Ordered property fields of a content class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertySchema {
    fields: &'static [(&'static str, PropertyType)],
}

impl PropertySchema {
    /// Create a schema from ordered `(name, type)` pairs
    pub const fn new(fields: &'static [(&'static str, PropertyType)]) -> Self {
        Self { fields }
    }

    /// Ordered fields
    pub fn fields(&self) -> &'static [(&'static str, PropertyType)] {
        self.fields
    }

    /// Type of the named field
    pub fn field_type(&self, name: &str) -> Option<PropertyType> {
        self.fields
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, ty)| *ty)
    }

    /// Decode a property block (flag words followed by values)
    pub fn decode(&self, raw: Bytes) -> Result<Properties, WireError> {
        let mut reader = Reader::new(raw);

        let mut words = Vec::new();
        loop {
            let word = reader.read_short()?;
            words.push(word);
            if word & CONTINUATION == 0 {
                break;
            }
        }

        let mut properties = Properties::new();
        for (index, (name, ty)) in self.fields.iter().enumerate() {
            let Some(word) = words.get(index / FIELDS_PER_WORD) else {
                break;
            };
            if word & flag_bit(index) == 0 {
                continue;
            }
            let value = match ty {
                PropertyType::ShortStr => PropertyValue::ShortStr(reader.read_short_str()?),
                PropertyType::Table => PropertyValue::Table(reader.read_table()?),
                PropertyType::Octet => PropertyValue::Octet(reader.read_octet()?),
                PropertyType::Short => PropertyValue::Short(reader.read_short()?),
                PropertyType::LongLong => PropertyValue::LongLong(reader.read_long_long()?),
                PropertyType::Timestamp => PropertyValue::Timestamp(reader.read_timestamp()?),
                PropertyType::Bit => PropertyValue::Bit(true),
            };
            properties.insert(*name, value);
        }

        Ok(properties)
    }

    /// Encode present properties as flag words followed by values
    pub fn encode(&self, properties: &Properties) -> Result<Bytes, WireError> {
        if let Some(unknown) = properties.names().find(|n| self.field_type(n).is_none()) {
            return Err(WireError::encoding(format!("unknown property '{}'", unknown)));
        }

        let mut words = vec![0u16];
        let mut values = Writer::new();

        for (index, (name, ty)) in self.fields.iter().enumerate() {
            let Some(value) = properties.get(name) else {
                continue;
            };
            match (ty, value) {
                (PropertyType::Bit, PropertyValue::Bit(false)) => continue,
                (PropertyType::Bit, PropertyValue::Bit(true)) => {}
                (PropertyType::ShortStr, PropertyValue::ShortStr(s)) => values.write_short_str(s)?,
                (PropertyType::Table, PropertyValue::Table(t)) => values.write_table(t)?,
                (PropertyType::Octet, PropertyValue::Octet(n)) => values.write_octet(*n),
                (PropertyType::Short, PropertyValue::Short(n)) => values.write_short(*n),
                (PropertyType::LongLong, PropertyValue::LongLong(n)) => values.write_long_long(*n),
                (PropertyType::Timestamp, PropertyValue::Timestamp(t)) => values.write_timestamp(*t),
                (ty, value) => {
                    return Err(WireError::encoding(format!(
                        "property '{}' expects {:?}, got {:?}",
                        name, ty, value
                    )));
                }
            }

            let word = index / FIELDS_PER_WORD;
            if word >= words.len() {
                words.resize(word + 1, 0);
            }
            words[word] |= flag_bit(index);
        }

        let last = words.len() - 1;
        let mut out = Writer::with_capacity(words.len() * 2 + values.len());
        for (i, word) in words.iter().enumerate() {
            out.write_short(if i < last { word | CONTINUATION } else { *word });
        }
        out.write(&values.finish());
        Ok(out.finish())
    }
}

fn flag_bit(index: usize) -> u16 {
    1 << (FIELDS_PER_WORD - index % FIELDS_PER_WORD)
}

/// Property schema of the basic content class
pub const BASIC_PROPERTIES: PropertySchema = PropertySchema::new(&[
    ("content_type", PropertyType::ShortStr),
    ("content_encoding", PropertyType::ShortStr),
    ("application_headers", PropertyType::Table),
    ("delivery_mode", PropertyType::Octet),
    ("priority", PropertyType::Octet),
    ("correlation_id", PropertyType::ShortStr),
    ("reply_to", PropertyType::ShortStr),
    ("expiration", PropertyType::ShortStr),
    ("message_id", PropertyType::ShortStr),
    ("timestamp", PropertyType::Timestamp),
    ("type", PropertyType::ShortStr),
    ("user_id", PropertyType::ShortStr),
    ("app_id", PropertyType::ShortStr),
    ("cluster_id", PropertyType::ShortStr),
]);

/// A property value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PropertyValue {
    /// Short string
    ShortStr(String),
    /// Field table
    Table(FieldTable),
    /// Unsigned 8-bit integer
    Octet(u8),
    /// Unsigned 16-bit integer
    Short(u16),
    /// Unsigned 64-bit integer
    LongLong(u64),
    /// Seconds since the Unix epoch
    Timestamp(u64),
    /// Boolean
    Bit(bool),
}

impl From<&str> for PropertyValue {
    fn from(s: &str) -> Self {
        Self::ShortStr(s.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(s: String) -> Self {
        Self::ShortStr(s)
    }
}

impl From<FieldTable> for PropertyValue {
    fn from(t: FieldTable) -> Self {
        Self::Table(t)
    }
}

/// Present properties of one piece of content
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Properties {
    values: BTreeMap<String, PropertyValue>,
}

impl Properties {
    /// No properties
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a property
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<PropertyValue>) {
        self.values.insert(name.into(), value.into());
    }

    /// Builder-style insert
    pub fn with(mut self, name: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.insert(name, value);
        self
    }

    /// Remove a property
    pub fn remove(&mut self, name: &str) -> Option<PropertyValue> {
        self.values.remove(name)
    }

    /// Look up a property
    pub fn get(&self, name: &str) -> Option<&PropertyValue> {
        self.values.get(name)
    }

    /// Look up a short-string property
    pub fn get_str(&self, name: &str) -> Option<&str> {
        match self.values.get(name) {
            Some(PropertyValue::ShortStr(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Whether the property is present
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Number of present properties
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether no property is present
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Names of present properties
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// `content_type` of basic content
    pub fn content_type(&self) -> Option<&str> {
        self.get_str("content_type")
    }

    /// `content_encoding` of basic content
    pub fn content_encoding(&self) -> Option<&str> {
        self.get_str("content_encoding")
    }

    /// `application_headers` of basic content
    pub fn headers(&self) -> Option<&FieldTable> {
        match self.values.get("application_headers") {
            Some(PropertyValue::Table(t)) => Some(t),
            _ => None,
        }
    }
}

/// Payload of a content header frame
#[derive(Debug, Clone, PartialEq)]
pub struct ContentHeader {
    /// Content class (60 for basic)
    pub class_id: u16,
    /// Unused by 0-8 brokers, always zero in practice
    pub weight: u16,
    /// Total size of the body frames that follow
    pub body_size: u64,
    /// Present properties
    pub properties: Properties,
}

impl ContentHeader {
    /// Read the class id of a header payload without decoding the rest
    pub fn peek_class(payload: &[u8]) -> Result<u16, WireError> {
        match payload {
            [hi, lo, ..] => Ok(u16::from_be_bytes([*hi, *lo])),
            _ => Err(WireError::Truncated {
                needed: 2,
                available: payload.len(),
            }),
        }
    }

    /// Decode a header payload against the schema of its class
    pub fn decode(payload: Bytes, schema: &PropertySchema) -> Result<Self, WireError> {
        let mut reader = Reader::new(payload);
        let class_id = reader.read_short()?;
        let weight = reader.read_short()?;
        let body_size = reader.read_long_long()?;
        let properties = schema.decode(reader.into_remaining())?;
        Ok(Self {
            class_id,
            weight,
            body_size,
            properties,
        })
    }

    /// Encode a header payload against the schema of its class
    pub fn encode(&self, schema: &PropertySchema) -> Result<Bytes, WireError> {
        let block = schema.encode(&self.properties)?;
        let mut out = Writer::with_capacity(CONTENT_HEADER_PREFIX + block.len());
        out.write_short(self.class_id);
        out.write_short(self.weight);
        out.write_long_long(self.body_size);
        out.write(&block);
        Ok(out.finish())
    }
}
