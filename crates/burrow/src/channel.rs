//! Channel handles

use burrow_proto::method::MethodSignature;
use burrow_proto::Properties;
use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::exchange::{Alert, ChannelContext, Method, Outcome};
use crate::{BurrowError, CloseReason, Connection, Result};

/// Handle to one open channel
///
/// The handle borrows the connection mutably, so one channel is driven at
/// a time. Get another handle with [`Connection::channel`].
pub struct Channel<'a, S> {
    connection: &'a mut Connection<S>,
    id: u16,
}

impl<'a, S> Channel<'a, S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub(crate) fn new(connection: &'a mut Connection<S>, id: u16) -> Self {
        Self { connection, id }
    }

    /// Channel id
    pub fn id(&self) -> u16 {
        self.id
    }

    /// The connection the channel runs on
    pub fn connection(&mut self) -> &mut Connection<S> {
        self.connection
    }

    fn context(&self) -> Option<&ChannelContext> {
        self.connection.exchange(self.id).map(|e| e.context())
    }

    /// Whether the channel is still open
    pub fn is_open(&self) -> bool {
        self.context().map_or(false, ChannelContext::is_open)
    }

    /// Whether the broker allows content to flow
    pub fn is_active(&self) -> bool {
        self.context().map_or(false, ChannelContext::is_active)
    }

    /// Alerts the broker sent on this channel
    pub fn alerts(&self) -> Vec<Alert> {
        self.context()
            .map(|c| c.alerts().to_vec())
            .unwrap_or_default()
    }

    /// Send a method with encoded arguments
    pub async fn send_method(&mut self, signature: MethodSignature, args: &[u8]) -> Result<()> {
        self.connection.send_method(self.id, signature, args).await
    }

    /// Send content after a content method such as `basic.publish`
    pub async fn send_content(
        &mut self,
        class_id: u16,
        properties: &Properties,
        body: impl Into<Bytes>,
    ) -> Result<()> {
        self.connection
            .send_content(self.id, class_id, properties, body.into())
            .await
    }

    /// Wait for a method that passes `allowed` and dispatch it
    pub async fn wait_reply(&mut self, allowed: Option<&[MethodSignature]>) -> Result<Outcome> {
        self.connection.wait_on(self.id, allowed).await
    }

    /// Send a method and wait for one of the replies it expects
    pub async fn call(
        &mut self,
        signature: MethodSignature,
        args: &[u8],
        replies: &[MethodSignature],
    ) -> Result<Method> {
        self.send_method(signature, args).await?;
        self.connection.expect(self.id, replies).await
    }

    /// Install or replace the handler for a signature
    pub fn register_handler<F>(&mut self, signature: MethodSignature, handler: F) -> Result<()>
    where
        F: FnMut(&mut ChannelContext, Method) -> Result<Outcome> + Send + 'static,
    {
        self.connection
            .register_handler(self.id, signature, Box::new(handler))
    }

    /// Close the channel and wait for the broker to confirm
    pub async fn close(self, reply_code: u16, reply_text: &str) -> Result<CloseReason> {
        if self.connection.exchange(self.id).is_none() {
            return Err(BurrowError::Channel(format!("channel {} is not open", self.id)));
        }
        self.connection
            .close_channel(self.id, reply_code, reply_text)
            .await
    }
}
