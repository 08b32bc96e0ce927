//! # Burrow
//!
//! A client core for AMQP 0-8 brokers.
//!
//! Burrow multiplexes channels over one stream and runs a request/reply
//! engine on each of them: replies the caller waits for are returned,
//! unsolicited methods are deferred until someone asks for them, and
//! connection-level closes are handled as soon as they arrive.

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub use burrow_proto as proto;

/// Error types for the Burrow library
pub mod error;

/// Connection configuration
pub mod config;

/// Per-channel backlogs and handler tables
pub mod exchange;

/// Built-in method handlers
pub mod dispatch;

/// Received content
pub mod content;

/// Connection, multiplexing and handshake
pub mod connection;

/// Channel handles
pub mod channel;

pub use channel::Channel;
pub use config::{ConnectionBuilder, ConnectionConfig, Login};
pub use connection::{connect, Connection, Handshake, ServerInfo};
pub use content::{DeliveryInfo, Message};
pub use error::{BurrowError, CloseReason};
pub use exchange::{Alert, ChannelContext, FrameExchange, Method, Outcome};

/// Result type alias for Burrow operations
pub type Result<T> = std::result::Result<T, BurrowError>;
