//! Built-in handler tables for channel 0 and ordinary channels

use burrow_proto::method::{self, CHANNEL_REPLIES};
use burrow_proto::{Writer, CONTROL_CHANNEL};
use bytes::Bytes;
use tracing::{debug, info, warn};

use crate::exchange::{Alert, ChannelContext, HandlerTable, Method, Outcome};
use crate::{CloseReason, Result};

/// Handlers for connection-level methods on channel 0
pub fn connection_handlers() -> HandlerTable {
    let mut table = HandlerTable::new();
    for signature in [
        method::CONNECTION_START,
        method::CONNECTION_SECURE,
        method::CONNECTION_TUNE,
        method::CONNECTION_OPEN_OK,
        method::CONNECTION_REDIRECT,
    ] {
        table.insert(signature, Box::new(reply));
    }
    table.insert(method::CONNECTION_CLOSE, Box::new(close_requested));
    table.insert(method::CONNECTION_CLOSE_OK, Box::new(close_confirmed));
    table
}

/// Handlers for an ordinary channel
pub fn channel_handlers() -> HandlerTable {
    let mut table = HandlerTable::new();
    for &signature in CHANNEL_REPLIES {
        table.insert(signature, Box::new(reply));
    }
    table.insert(method::CHANNEL_OPEN_OK, Box::new(opened));
    table.insert(method::CHANNEL_FLOW, Box::new(flow));
    table.insert(method::CHANNEL_ALERT, Box::new(alert));
    table.insert(method::CHANNEL_CLOSE, Box::new(close_requested));
    table.insert(method::CHANNEL_CLOSE_OK, Box::new(close_confirmed));
    table
}

fn reply(_ctx: &mut ChannelContext, method: Method) -> Result<Outcome> {
    Ok(Outcome::Reply(method))
}

fn opened(ctx: &mut ChannelContext, method: Method) -> Result<Outcome> {
    debug!(channel = ctx.id(), "Channel opened");
    ctx.set_open(true);
    Ok(Outcome::Reply(method))
}

fn flow(ctx: &mut ChannelContext, method: Method) -> Result<Outcome> {
    let active = method.reader().read_bit()?;
    info!(channel = ctx.id(), active, "Flow changed by broker");
    ctx.set_active(active);

    let mut args = Writer::new();
    args.write_bit(active);
    ctx.queue_method(method::CHANNEL_FLOW_OK, args.finish());
    Ok(Outcome::Handled)
}

fn alert(ctx: &mut ChannelContext, method: Method) -> Result<Outcome> {
    let mut args = method.reader();
    let alert = Alert {
        reply_code: args.read_short()?,
        reply_text: args.read_short_str()?,
        details: args.read_table()?,
    };
    warn!(channel = ctx.id(), code = alert.reply_code, text = %alert.reply_text, "Alert from broker");
    ctx.record_alert(alert);
    Ok(Outcome::Handled)
}

fn close_requested(ctx: &mut ChannelContext, method: Method) -> Result<Outcome> {
    let reason = CloseReason::parse(&method.args)?;
    info!(channel = ctx.id(), %reason, "Closed by broker");

    let close_ok = if ctx.id() == CONTROL_CHANNEL {
        method::CONNECTION_CLOSE_OK
    } else {
        method::CHANNEL_CLOSE_OK
    };
    ctx.queue_method(close_ok, Bytes::new());
    ctx.mark_closed(reason.clone());
    Ok(Outcome::Closed(reason))
}

fn close_confirmed(ctx: &mut ChannelContext, _method: Method) -> Result<Outcome> {
    let reason = ctx.closing().cloned().unwrap_or_default();
    debug!(channel = ctx.id(), %reason, "Close confirmed");
    ctx.mark_closed(reason.clone());
    Ok(Outcome::Closed(reason))
}
