//! Received content: properties, body and delivery details

use std::io::Read;

use burrow_proto::method::{self, MethodSignature, CLASS_BASIC};
use burrow_proto::{Properties, PropertySchema, Reader, WireError, BASIC_PROPERTIES};
use bytes::Bytes;
use flate2::read::{GzDecoder, ZlibDecoder};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{BurrowError, Result};

/// Content that followed a method
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Message {
    /// Present properties
    pub properties: Properties,
    /// Body, decoded when auto-decode applied
    pub body: Bytes,
    /// Delivery details for `basic.deliver` and `basic.get-ok`
    pub delivery: Option<DeliveryInfo>,
}

impl Message {
    /// Create a message
    pub fn new(properties: Properties, body: impl Into<Bytes>) -> Self {
        Self {
            properties,
            body: body.into(),
            delivery: None,
        }
    }

    /// Body as UTF-8 text
    pub fn body_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }
}

/// Delivery details carried in the arguments of a content-bearing method
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryInfo {
    /// Consumer the message was delivered to, `basic.deliver` only
    pub consumer_tag: Option<String>,
    /// Tag to acknowledge the delivery with
    pub delivery_tag: u64,
    /// Whether the message was delivered before
    pub redelivered: bool,
    /// Exchange the message was published to
    pub exchange: String,
    /// Routing key the message was published with
    pub routing_key: String,
    /// Messages left in the queue, `basic.get-ok` only
    pub message_count: Option<u32>,
}

impl DeliveryInfo {
    /// Parse the delivery details of a content-bearing method
    ///
    /// Returns `None` for methods that carry no delivery details.
    pub fn parse(signature: MethodSignature, args: &Bytes) -> Result<Option<Self>> {
        let mut reader = Reader::new(args.clone());
        let info = match signature {
            method::BASIC_DELIVER => Self {
                consumer_tag: Some(reader.read_short_str()?),
                delivery_tag: reader.read_long_long()?,
                redelivered: reader.read_bit()?,
                exchange: reader.read_short_str()?,
                routing_key: reader.read_short_str()?,
                message_count: None,
            },
            method::BASIC_GET_OK => Self {
                consumer_tag: None,
                delivery_tag: reader.read_long_long()?,
                redelivered: reader.read_bit()?,
                exchange: reader.read_short_str()?,
                routing_key: reader.read_short_str()?,
                message_count: Some(reader.read_long()?),
            },
            _ => return Ok(None),
        };
        Ok(Some(info))
    }
}

/// Property schema of a content class
pub fn schema_for(class_id: u16) -> Result<&'static PropertySchema> {
    match class_id {
        CLASS_BASIC => Ok(&BASIC_PROPERTIES),
        other => Err(BurrowError::Protocol(format!(
            "no property schema for content class {}",
            other
        ))),
    }
}

/// Undo the body's `content_encoding`
///
/// Failures are not reported: the raw body comes back unchanged.
pub fn decode_body(properties: &Properties, body: Bytes) -> Bytes {
    let Some(encoding) = properties.content_encoding() else {
        return body;
    };
    match inflate(encoding, &body) {
        Ok(Some(decoded)) => Bytes::from(decoded),
        Ok(None) => body,
        Err(e) => {
            debug!(encoding, error = %e, "Returning body undecoded");
            body
        }
    }
}

fn inflate(encoding: &str, body: &[u8]) -> std::result::Result<Option<Vec<u8>>, WireError> {
    let mut decoded = Vec::new();
    match encoding {
        "identity" => return Ok(None),
        "deflate" => {
            ZlibDecoder::new(body).read_to_end(&mut decoded)?;
        }
        "gzip" | "x-gzip" => {
            GzDecoder::new(body).read_to_end(&mut decoded)?;
        }
        other => {
            return Err(WireError::encoding(format!(
                "unsupported content encoding {}",
                other
            )))
        }
    }
    Ok(Some(decoded))
}

#[cfg(test)]
mod tests {
    use super::*;
    use burrow_proto::Writer;
    use flate2::write::{GzEncoder, ZlibEncoder};
    use flate2::Compression;
    use std::io::Write;

    fn encoded(encoding: &str) -> Properties {
        Properties::new().with("content_encoding", encoding)
    }

    #[test]
    fn test_deflate_body_is_inflated() {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"hello hello hello").unwrap();
        let body = Bytes::from(encoder.finish().unwrap());

        let decoded = decode_body(&encoded("deflate"), body);
        assert_eq!(&decoded[..], b"hello hello hello");
    }

    #[test]
    fn test_gzip_body_is_inflated() {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::fast());
        encoder.write_all(b"payload").unwrap();
        let body = Bytes::from(encoder.finish().unwrap());

        let decoded = decode_body(&encoded("gzip"), body);
        assert_eq!(&decoded[..], b"payload");
    }

    #[test]
    fn test_decode_failure_returns_raw_body() {
        let body = Bytes::from_static(b"not compressed");
        assert_eq!(decode_body(&encoded("deflate"), body.clone()), body);
        assert_eq!(decode_body(&encoded("brotli"), body.clone()), body);
        assert_eq!(decode_body(&encoded("identity"), body.clone()), body);
        assert_eq!(decode_body(&Properties::new(), body.clone()), body);
    }

    #[test]
    fn test_parse_deliver() {
        let mut args = Writer::new();
        args.write_short_str("ctag").unwrap();
        args.write_long_long(u64::MAX - 1);
        args.write_bit(true);
        args.write_short_str("amq.direct").unwrap();
        args.write_short_str("jobs").unwrap();

        let info = DeliveryInfo::parse(method::BASIC_DELIVER, &args.finish())
            .unwrap()
            .unwrap();
        assert_eq!(info.consumer_tag.as_deref(), Some("ctag"));
        assert_eq!(info.delivery_tag, u64::MAX - 1);
        assert!(info.redelivered);
        assert_eq!(info.exchange, "amq.direct");
        assert_eq!(info.routing_key, "jobs");
        assert_eq!(info.message_count, None);
    }

    #[test]
    fn test_parse_get_ok() {
        let mut args = Writer::new();
        args.write_long_long(7);
        args.write_bit(false);
        args.write_short_str("").unwrap();
        args.write_short_str("q").unwrap();
        args.write_long(41);

        let info = DeliveryInfo::parse(method::BASIC_GET_OK, &args.finish())
            .unwrap()
            .unwrap();
        assert_eq!(info.consumer_tag, None);
        assert_eq!(info.delivery_tag, 7);
        assert!(!info.redelivered);
        assert_eq!(info.routing_key, "q");
        assert_eq!(info.message_count, Some(41));
    }

    #[test]
    fn test_parse_other_method() {
        let info = DeliveryInfo::parse(method::BASIC_QOS_OK, &Bytes::new()).unwrap();
        assert!(info.is_none());
    }

    #[test]
    fn test_schema_for_unknown_class() {
        assert!(schema_for(CLASS_BASIC).is_ok());
        assert!(matches!(schema_for(70), Err(BurrowError::Protocol(_))));
    }
}
