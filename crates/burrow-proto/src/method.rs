//! Method signatures and method frame payloads
//!
//! Constants are named `CLASS_METHOD` after the 0-8 method they identify.

#![allow(missing_docs)]

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

use crate::WireError;

/// `(class, method)` pair identifying a wire operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodSignature {
    /// Class identifier
    pub class_id: u16,
    /// Method identifier within the class
    pub method_id: u16,
}

impl MethodSignature {
    /// Create a signature
    pub const fn new(class_id: u16, method_id: u16) -> Self {
        Self {
            class_id,
            method_id,
        }
    }

    /// Dotted protocol name, if this is a known 0-8 method
    pub fn name(self) -> Option<&'static str> {
        NAMES
            .iter()
            .find(|(sig, _)| *sig == self)
            .map(|(_, name)| *name)
    }

    /// Whether a content header and body follow this method
    pub fn carries_content(self) -> bool {
        CONTENT_METHODS.contains(&self)
    }

    /// Whether this is a connection or channel close request
    pub fn is_close(self) -> bool {
        CLOSE_METHODS.contains(&self)
    }
}

impl fmt::Display for MethodSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.class_id, self.method_id)?;
        if let Some(name) = self.name() {
            write!(f, " ({})", name)?;
        }
        Ok(())
    }
}

/// Class id of the connection class
pub const CLASS_CONNECTION: u16 = 10;
/// Class id of the channel class
pub const CLASS_CHANNEL: u16 = 20;
/// Class id of the basic content class
pub const CLASS_BASIC: u16 = 60;

pub const CONNECTION_START: MethodSignature = MethodSignature::new(10, 10);
pub const CONNECTION_START_OK: MethodSignature = MethodSignature::new(10, 11);
pub const CONNECTION_SECURE: MethodSignature = MethodSignature::new(10, 20);
pub const CONNECTION_SECURE_OK: MethodSignature = MethodSignature::new(10, 21);
pub const CONNECTION_TUNE: MethodSignature = MethodSignature::new(10, 30);
pub const CONNECTION_TUNE_OK: MethodSignature = MethodSignature::new(10, 31);
pub const CONNECTION_OPEN: MethodSignature = MethodSignature::new(10, 40);
pub const CONNECTION_OPEN_OK: MethodSignature = MethodSignature::new(10, 41);
pub const CONNECTION_REDIRECT: MethodSignature = MethodSignature::new(10, 50);
pub const CONNECTION_CLOSE: MethodSignature = MethodSignature::new(10, 60);
pub const CONNECTION_CLOSE_OK: MethodSignature = MethodSignature::new(10, 61);

pub const CHANNEL_OPEN: MethodSignature = MethodSignature::new(20, 10);
pub const CHANNEL_OPEN_OK: MethodSignature = MethodSignature::new(20, 11);
pub const CHANNEL_FLOW: MethodSignature = MethodSignature::new(20, 20);
pub const CHANNEL_FLOW_OK: MethodSignature = MethodSignature::new(20, 21);
pub const CHANNEL_ALERT: MethodSignature = MethodSignature::new(20, 30);
pub const CHANNEL_CLOSE: MethodSignature = MethodSignature::new(20, 40);
pub const CHANNEL_CLOSE_OK: MethodSignature = MethodSignature::new(20, 41);

pub const ACCESS_REQUEST: MethodSignature = MethodSignature::new(30, 10);
pub const ACCESS_REQUEST_OK: MethodSignature = MethodSignature::new(30, 11);

pub const EXCHANGE_DECLARE: MethodSignature = MethodSignature::new(40, 10);
pub const EXCHANGE_DECLARE_OK: MethodSignature = MethodSignature::new(40, 11);
pub const EXCHANGE_DELETE: MethodSignature = MethodSignature::new(40, 20);
pub const EXCHANGE_DELETE_OK: MethodSignature = MethodSignature::new(40, 21);

pub const QUEUE_DECLARE: MethodSignature = MethodSignature::new(50, 10);
pub const QUEUE_DECLARE_OK: MethodSignature = MethodSignature::new(50, 11);
pub const QUEUE_BIND: MethodSignature = MethodSignature::new(50, 20);
pub const QUEUE_BIND_OK: MethodSignature = MethodSignature::new(50, 21);
pub const QUEUE_PURGE: MethodSignature = MethodSignature::new(50, 30);
pub const QUEUE_PURGE_OK: MethodSignature = MethodSignature::new(50, 31);
pub const QUEUE_DELETE: MethodSignature = MethodSignature::new(50, 40);
pub const QUEUE_DELETE_OK: MethodSignature = MethodSignature::new(50, 41);

pub const BASIC_QOS: MethodSignature = MethodSignature::new(60, 10);
pub const BASIC_QOS_OK: MethodSignature = MethodSignature::new(60, 11);
pub const BASIC_CONSUME: MethodSignature = MethodSignature::new(60, 20);
pub const BASIC_CONSUME_OK: MethodSignature = MethodSignature::new(60, 21);
pub const BASIC_CANCEL: MethodSignature = MethodSignature::new(60, 30);
pub const BASIC_CANCEL_OK: MethodSignature = MethodSignature::new(60, 31);
pub const BASIC_PUBLISH: MethodSignature = MethodSignature::new(60, 40);
pub const BASIC_RETURN: MethodSignature = MethodSignature::new(60, 50);
pub const BASIC_DELIVER: MethodSignature = MethodSignature::new(60, 60);
pub const BASIC_GET: MethodSignature = MethodSignature::new(60, 70);
pub const BASIC_GET_OK: MethodSignature = MethodSignature::new(60, 71);
pub const BASIC_GET_EMPTY: MethodSignature = MethodSignature::new(60, 72);
pub const BASIC_ACK: MethodSignature = MethodSignature::new(60, 80);
pub const BASIC_REJECT: MethodSignature = MethodSignature::new(60, 90);
pub const BASIC_RECOVER: MethodSignature = MethodSignature::new(60, 100);

pub const TX_SELECT: MethodSignature = MethodSignature::new(90, 10);
pub const TX_SELECT_OK: MethodSignature = MethodSignature::new(90, 11);
pub const TX_COMMIT: MethodSignature = MethodSignature::new(90, 20);
pub const TX_COMMIT_OK: MethodSignature = MethodSignature::new(90, 21);
pub const TX_ROLLBACK: MethodSignature = MethodSignature::new(90, 30);
pub const TX_ROLLBACK_OK: MethodSignature = MethodSignature::new(90, 31);

/// Methods followed by a content header and body
pub const CONTENT_METHODS: &[MethodSignature] = &[BASIC_DELIVER, BASIC_GET_OK];

/// Close requests, honored by every wait regardless of its filter
pub const CLOSE_METHODS: &[MethodSignature] = &[CONNECTION_CLOSE, CHANNEL_CLOSE];

/// Server-to-client methods an ordinary channel hands back to its caller
pub const CHANNEL_REPLIES: &[MethodSignature] = &[
    CHANNEL_FLOW_OK,
    ACCESS_REQUEST_OK,
    EXCHANGE_DECLARE_OK,
    EXCHANGE_DELETE_OK,
    QUEUE_DECLARE_OK,
    QUEUE_BIND_OK,
    QUEUE_PURGE_OK,
    QUEUE_DELETE_OK,
    BASIC_QOS_OK,
    BASIC_CONSUME_OK,
    BASIC_CANCEL_OK,
    BASIC_RETURN,
    BASIC_DELIVER,
    BASIC_GET_OK,
    BASIC_GET_EMPTY,
    TX_SELECT_OK,
    TX_COMMIT_OK,
    TX_ROLLBACK_OK,
];

const NAMES: &[(MethodSignature, &str)] = &[
    (CONNECTION_START, "connection.start"),
    (CONNECTION_START_OK, "connection.start-ok"),
    (CONNECTION_SECURE, "connection.secure"),
    (CONNECTION_SECURE_OK, "connection.secure-ok"),
    (CONNECTION_TUNE, "connection.tune"),
    (CONNECTION_TUNE_OK, "connection.tune-ok"),
    (CONNECTION_OPEN, "connection.open"),
    (CONNECTION_OPEN_OK, "connection.open-ok"),
    (CONNECTION_REDIRECT, "connection.redirect"),
    (CONNECTION_CLOSE, "connection.close"),
    (CONNECTION_CLOSE_OK, "connection.close-ok"),
    (CHANNEL_OPEN, "channel.open"),
    (CHANNEL_OPEN_OK, "channel.open-ok"),
    (CHANNEL_FLOW, "channel.flow"),
    (CHANNEL_FLOW_OK, "channel.flow-ok"),
    (CHANNEL_ALERT, "channel.alert"),
    (CHANNEL_CLOSE, "channel.close"),
    (CHANNEL_CLOSE_OK, "channel.close-ok"),
    (ACCESS_REQUEST, "access.request"),
    (ACCESS_REQUEST_OK, "access.request-ok"),
    (EXCHANGE_DECLARE, "exchange.declare"),
    (EXCHANGE_DECLARE_OK, "exchange.declare-ok"),
    (EXCHANGE_DELETE, "exchange.delete"),
    (EXCHANGE_DELETE_OK, "exchange.delete-ok"),
    (QUEUE_DECLARE, "queue.declare"),
    (QUEUE_DECLARE_OK, "queue.declare-ok"),
    (QUEUE_BIND, "queue.bind"),
    (QUEUE_BIND_OK, "queue.bind-ok"),
    (QUEUE_PURGE, "queue.purge"),
    (QUEUE_PURGE_OK, "queue.purge-ok"),
    (QUEUE_DELETE, "queue.delete"),
    (QUEUE_DELETE_OK, "queue.delete-ok"),
    (BASIC_QOS, "basic.qos"),
    (BASIC_QOS_OK, "basic.qos-ok"),
    (BASIC_CONSUME, "basic.consume"),
    (BASIC_CONSUME_OK, "basic.consume-ok"),
    (BASIC_CANCEL, "basic.cancel"),
    (BASIC_CANCEL_OK, "basic.cancel-ok"),
    (BASIC_PUBLISH, "basic.publish"),
    (BASIC_RETURN, "basic.return"),
    (BASIC_DELIVER, "basic.deliver"),
    (BASIC_GET, "basic.get"),
    (BASIC_GET_OK, "basic.get-ok"),
    (BASIC_GET_EMPTY, "basic.get-empty"),
    (BASIC_ACK, "basic.ack"),
    (BASIC_REJECT, "basic.reject"),
    (BASIC_RECOVER, "basic.recover"),
    (TX_SELECT, "tx.select"),
    (TX_SELECT_OK, "tx.select-ok"),
    (TX_COMMIT, "tx.commit"),
    (TX_COMMIT_OK, "tx.commit-ok"),
    (TX_ROLLBACK, "tx.rollback"),
    (TX_ROLLBACK_OK, "tx.rollback-ok"),
];

/// Build a method frame payload: class, method, then the encoded arguments
pub fn encode_payload(signature: MethodSignature, args: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(4 + args.len());
    buf.put_u16(signature.class_id);
    buf.put_u16(signature.method_id);
    buf.put_slice(args);
    buf.freeze()
}

/// Split a method frame payload into its signature and argument bytes
pub fn decode_payload(mut payload: Bytes) -> Result<(MethodSignature, Bytes), WireError> {
    if payload.len() < 4 {
        return Err(WireError::Truncated {
            needed: 4,
            available: payload.len(),
        });
    }
    let head = payload.split_to(4);
    let signature = MethodSignature::new(
        u16::from_be_bytes([head[0], head[1]]),
        u16::from_be_bytes([head[2], head[3]]),
    );
    Ok((signature, payload))
}
