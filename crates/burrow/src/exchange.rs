//! Per-channel frame and method exchange
//!
//! A [`FrameExchange`] holds everything one channel needs to wait for replies
//! without owning the stream: its frame backlog, its method backlog, its
//! handler table and the [`ChannelContext`] handlers act on. Channel 0 and
//! ordinary channels differ only in the handler table they are built with.

use std::collections::{HashMap, VecDeque};

use burrow_proto::method::MethodSignature;
use burrow_proto::{FieldTable, Frame, Reader};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::content::Message;
use crate::{BurrowError, CloseReason, Result};

/// A decoded method with its arguments and any content that followed it
#[derive(Debug, Clone, PartialEq)]
pub struct Method {
    /// Method signature
    pub signature: MethodSignature,
    /// Encoded arguments
    pub args: Bytes,
    /// Reassembled content for content-bearing methods
    pub content: Option<Message>,
}

impl Method {
    /// Create a method without content
    pub fn new(signature: MethodSignature, args: Bytes) -> Self {
        Self {
            signature,
            args,
            content: None,
        }
    }

    /// Reader over the arguments
    pub fn reader(&self) -> Reader {
        Reader::new(self.args.clone())
    }
}

/// Result of dispatching one method
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The method is handed back to the waiting caller
    Reply(Method),
    /// A handler consumed the method
    Handled,
    /// The connection or channel is closed
    Closed(CloseReason),
}

impl Outcome {
    /// The replied method, if any
    pub fn into_reply(self) -> Option<Method> {
        match self {
            Self::Reply(method) => Some(method),
            _ => None,
        }
    }

    /// Whether this outcome closed the channel
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed(_))
    }
}

/// Non-fatal notice delivered with `channel.alert`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    /// Reply code
    pub reply_code: u16,
    /// Reply text
    pub reply_text: String,
    /// Extra details
    pub details: FieldTable,
}

/// Channel state handlers read and update
#[derive(Debug)]
pub struct ChannelContext {
    id: u16,
    open: bool,
    active: bool,
    alerts: Vec<Alert>,
    closing: Option<CloseReason>,
    closed: Option<CloseReason>,
    outbox: Vec<(MethodSignature, Bytes)>,
}

impl ChannelContext {
    /// Create the context of a channel
    pub fn new(id: u16) -> Self {
        Self {
            id,
            open: false,
            active: true,
            alerts: Vec::new(),
            closing: None,
            closed: None,
            outbox: Vec::new(),
        }
    }

    /// Channel id
    pub fn id(&self) -> u16 {
        self.id
    }

    /// Whether the broker confirmed the open
    pub fn is_open(&self) -> bool {
        self.open && self.closed.is_none()
    }

    /// Record the broker's open confirmation
    pub fn set_open(&mut self, open: bool) {
        self.open = open;
    }

    /// Whether the broker allows content to flow
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Record a flow change
    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    /// Record an alert
    pub fn record_alert(&mut self, alert: Alert) {
        self.alerts.push(alert);
    }

    /// Alerts received so far
    pub fn alerts(&self) -> &[Alert] {
        &self.alerts
    }

    /// Take the alerts received so far
    pub fn take_alerts(&mut self) -> Vec<Alert> {
        std::mem::take(&mut self.alerts)
    }

    /// Reason of a close this side requested, if one is in flight
    pub fn closing(&self) -> Option<&CloseReason> {
        self.closing.as_ref()
    }

    pub(crate) fn set_closing(&mut self, reason: CloseReason) {
        self.closing = Some(reason);
    }

    /// Record that the channel is closed
    pub fn mark_closed(&mut self, reason: CloseReason) {
        self.closed = Some(reason);
    }

    /// Close reason, once closed
    pub fn closed(&self) -> Option<&CloseReason> {
        self.closed.as_ref()
    }

    /// Queue a method to send on this channel once the handler returns
    pub fn queue_method(&mut self, signature: MethodSignature, args: Bytes) {
        self.outbox.push((signature, args));
    }

    pub(crate) fn take_outbox(&mut self) -> Vec<(MethodSignature, Bytes)> {
        std::mem::take(&mut self.outbox)
    }
}

/// Method handler
pub type Handler = Box<dyn FnMut(&mut ChannelContext, Method) -> Result<Outcome> + Send>;

/// Handlers keyed by signature
pub type HandlerTable = HashMap<MethodSignature, Handler>;

/// Backlogs, handlers and context of one channel
pub struct FrameExchange {
    context: ChannelContext,
    frames: VecDeque<Frame>,
    methods: VecDeque<Method>,
    handlers: HandlerTable,
}

impl FrameExchange {
    /// Create an exchange for a channel with its handler table
    pub fn new(id: u16, handlers: HandlerTable) -> Self {
        Self {
            context: ChannelContext::new(id),
            frames: VecDeque::new(),
            methods: VecDeque::new(),
            handlers,
        }
    }

    /// Channel id
    pub fn id(&self) -> u16 {
        self.context.id
    }

    /// Channel context
    pub fn context(&self) -> &ChannelContext {
        &self.context
    }

    /// Mutable channel context
    pub fn context_mut(&mut self) -> &mut ChannelContext {
        &mut self.context
    }

    /// Queue a frame read while another channel was waiting
    pub fn push_frame(&mut self, frame: Frame) {
        self.frames.push_back(frame);
    }

    /// Oldest queued frame
    pub fn pop_frame(&mut self) -> Option<Frame> {
        self.frames.pop_front()
    }

    /// Number of queued frames
    pub fn frame_backlog_len(&self) -> usize {
        self.frames.len()
    }

    /// Defer a method nobody was waiting for
    pub fn push_method(&mut self, method: Method) {
        self.methods.push_back(method);
    }

    /// Remove and return the oldest deferred method matching `allowed`
    ///
    /// `None` matches any method.
    pub fn take_method(&mut self, allowed: Option<&[MethodSignature]>) -> Option<Method> {
        let index = self
            .methods
            .iter()
            .position(|m| allowed.map_or(true, |a| a.contains(&m.signature)))?;
        self.methods.remove(index)
    }

    /// Number of deferred methods
    pub fn method_backlog_len(&self) -> usize {
        self.methods.len()
    }

    /// Install or replace the handler for a signature
    pub fn register_handler(&mut self, signature: MethodSignature, handler: Handler) {
        self.handlers.insert(signature, handler);
    }

    /// Whether a handler exists for a signature
    pub fn handles(&self, signature: MethodSignature) -> bool {
        self.handlers.contains_key(&signature)
    }

    /// Run the handler for a method
    ///
    /// Replies the handler queues stay in the context outbox for the caller
    /// to send.
    pub fn dispatch(&mut self, method: Method) -> Result<Outcome> {
        let signature = method.signature;
        let handler = self
            .handlers
            .get_mut(&signature)
            .ok_or(BurrowError::UnknownMethod {
                channel: self.context.id,
                signature,
            })?;
        debug!(channel = self.context.id, %signature, "Dispatching method");
        handler(&mut self.context, method)
    }
}

/// Whether a wait filter lets a method through
///
/// Close requests always pass so they are never missed.
pub fn accepts(allowed: Option<&[MethodSignature]>, signature: MethodSignature) -> bool {
    signature.is_close() || allowed.map_or(true, |a| a.contains(&signature))
}
