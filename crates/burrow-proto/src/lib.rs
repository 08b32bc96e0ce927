//! # Burrow Protocol
//!
//! Wire codec for AMQP 0-8: primitive types, field tables, frames,
//! method signatures and content-header properties.

#![warn(missing_docs)]

/// Error types for wire operations
pub mod error;

/// Primitive readers and writers
pub mod wire;

/// Field tables
pub mod table;

/// Frame structure
pub mod frame;

/// Frame codec for async streams
pub mod codec;

/// Method signatures and payloads
pub mod method;

/// Content headers and property lists
pub mod properties;

pub use codec::{FrameCodec, PROTOCOL_HEADER};
pub use error::WireError;
pub use frame::{Frame, FrameType, CONTROL_CHANNEL};
pub use method::MethodSignature;
pub use properties::{ContentHeader, Properties, PropertySchema, PropertyValue, BASIC_PROPERTIES};
pub use table::{Decimal, FieldTable, FieldValue};
pub use wire::{Reader, Writer};
