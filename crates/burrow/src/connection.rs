//! Connection: frame multiplexing, method waits and the handshake
//!
//! One `Connection` owns the stream. Every channel, including channel 0,
//! is a [`FrameExchange`] in `exchanges`; waiting on a channel reads frames
//! off the stream and queues the ones that belong to other channels.

use std::collections::HashMap;
use std::time::Duration;

use burrow_proto::codec::FrameCodec;
use burrow_proto::frame::{FrameType, FRAME_OVERHEAD};
use burrow_proto::method::{self, MethodSignature};
use burrow_proto::{ContentHeader, FieldTable, Frame, Properties, Writer, CONTROL_CHANNEL};
use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::time::{timeout, Instant};
use tracing::{debug, info, trace, warn};

use crate::content::{self, DeliveryInfo, Message};
use crate::exchange::{accepts, FrameExchange, Handler, Method, Outcome};
use crate::{dispatch, BurrowError, Channel, CloseReason, ConnectionConfig, Result};

/// Server details announced in `connection.start`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServerInfo {
    /// Protocol major version
    pub version_major: u8,
    /// Protocol minor version
    pub version_minor: u8,
    /// Server properties table
    pub properties: FieldTable,
    /// Offered security mechanisms
    pub mechanisms: Vec<String>,
    /// Offered locales
    pub locales: Vec<String>,
}

impl ServerInfo {
    fn parse(method: &Method) -> Result<Self> {
        let mut args = method.reader();
        let version_major = args.read_octet()?;
        let version_minor = args.read_octet()?;
        let properties = args.read_table()?;
        let mechanisms = split_words(&args.read_long_str()?);
        let locales = split_words(&args.read_long_str()?);
        Ok(Self {
            version_major,
            version_minor,
            properties,
            mechanisms,
            locales,
        })
    }
}

fn split_words(raw: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(raw)
        .split(' ')
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

/// How `connection.open` was answered
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Handshake {
    /// The virtual host is open
    Opened {
        /// Known hosts reported by the broker
        known_hosts: String,
    },
    /// The broker wants the client on another host
    Redirect {
        /// Suggested host
        host: String,
        /// Known hosts reported by the broker
        known_hosts: String,
    },
}

/// Open a TCP connection and run the handshake
pub async fn connect<A: ToSocketAddrs>(addr: A, config: ConnectionConfig) -> Result<Connection<TcpStream>> {
    let duration = config.connect_timeout;
    let stream = timeout(duration, TcpStream::connect(addr))
        .await
        .map_err(|_| BurrowError::TimedOut { duration })??;
    stream.set_nodelay(true)?;
    Connection::open(stream, config).await
}

/// A connection to a broker over one exclusively owned stream
pub struct Connection<S> {
    stream: S,
    codec: FrameCodec,
    config: ConnectionConfig,
    exchanges: HashMap<u16, FrameExchange>,
    channel_max: u16,
    frame_max: u32,
    heartbeat: u16,
    server: Option<ServerInfo>,
    known_hosts: String,
    closed: Option<CloseReason>,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap a stream without running the handshake
    pub fn new(stream: S, config: ConnectionConfig) -> Self {
        let mut exchanges = HashMap::new();
        exchanges.insert(
            CONTROL_CHANNEL,
            FrameExchange::new(CONTROL_CHANNEL, dispatch::connection_handlers()),
        );
        Self {
            stream,
            codec: FrameCodec::with_max_frame_size(config.frame_max as usize),
            channel_max: config.channel_max,
            frame_max: config.frame_max,
            config,
            exchanges,
            heartbeat: 0,
            server: None,
            known_hosts: String::new(),
            closed: None,
        }
    }

    /// Wrap a stream and run the handshake
    ///
    /// A redirect is reported as [`BurrowError::Redirected`].
    pub async fn open(stream: S, config: ConnectionConfig) -> Result<Self> {
        let mut connection = Self::new(stream, config);
        match connection.handshake().await? {
            Handshake::Opened { .. } => Ok(connection),
            Handshake::Redirect { host, known_hosts } => {
                Err(BurrowError::Redirected { host, known_hosts })
            }
        }
    }

    /// Negotiate the connection and open the configured virtual host
    pub async fn handshake(&mut self) -> Result<Handshake> {
        self.ensure_open()?;
        self.codec.write_protocol_header(&mut self.stream).await?;

        let start = self.expect(CONTROL_CHANNEL, &[method::CONNECTION_START]).await?;
        let server = ServerInfo::parse(&start)?;
        info!(
            version = %format!("{}-{}", server.version_major, server.version_minor),
            mechanisms = ?server.mechanisms,
            "Broker started negotiation"
        );
        self.server = Some(server);

        let response = self.config.login_response()?;
        let mut args = Writer::new();
        args.write_table(&self.config.client_properties)?;
        args.write_short_str(&self.config.login_method)?;
        args.write_long_str(&response)?;
        args.write_short_str(&self.config.locale)?;
        self.write_method(CONTROL_CHANNEL, method::CONNECTION_START_OK, &args.finish())
            .await?;

        loop {
            let reply = self
                .expect(
                    CONTROL_CHANNEL,
                    &[method::CONNECTION_SECURE, method::CONNECTION_TUNE],
                )
                .await?;
            if reply.signature == method::CONNECTION_SECURE {
                debug!("Answering security challenge");
                let mut args = Writer::new();
                args.write_long_str(&response)?;
                self.write_method(CONTROL_CHANNEL, method::CONNECTION_SECURE_OK, &args.finish())
                    .await?;
                continue;
            }
            self.tune(&reply)?;
            break;
        }

        let mut args = Writer::new();
        args.write_short(self.channel_max);
        args.write_long(self.frame_max);
        args.write_short(0);
        self.write_method(CONTROL_CHANNEL, method::CONNECTION_TUNE_OK, &args.finish())
            .await?;

        let mut args = Writer::new();
        args.write_short_str(&self.config.virtual_host)?;
        args.write_short_str("")?;
        args.write_bit(self.config.insist);
        self.write_method(CONTROL_CHANNEL, method::CONNECTION_OPEN, &args.finish())
            .await?;

        let reply = self
            .expect(
                CONTROL_CHANNEL,
                &[method::CONNECTION_OPEN_OK, method::CONNECTION_REDIRECT],
            )
            .await?;
        let mut args = reply.reader();
        if reply.signature == method::CONNECTION_REDIRECT {
            let host = args.read_short_str()?;
            let known_hosts = args.read_short_str()?;
            info!(%host, "Broker redirected the connection");
            return Ok(Handshake::Redirect { host, known_hosts });
        }

        self.known_hosts = args.read_short_str()?;
        info!(
            vhost = %self.config.virtual_host,
            channel_max = self.channel_max,
            frame_max = self.frame_max,
            "Connection open"
        );
        Ok(Handshake::Opened {
            known_hosts: self.known_hosts.clone(),
        })
    }

    fn tune(&mut self, method: &Method) -> Result<()> {
        let mut args = method.reader();
        let channel_max = args.read_short()?;
        let frame_max = args.read_long()?;
        self.heartbeat = args.read_short()?;

        if channel_max > 0 {
            self.channel_max = channel_max;
        }
        if frame_max > 0 {
            self.frame_max = frame_max;
            self.codec.set_max_frame_size(frame_max as usize);
        }
        debug!(
            channel_max = self.channel_max,
            frame_max = self.frame_max,
            heartbeat = self.heartbeat,
            "Tuned"
        );
        Ok(())
    }

    /// Connection configuration
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Negotiated highest channel id
    pub fn channel_max(&self) -> u16 {
        self.channel_max
    }

    /// Negotiated largest frame, header and terminator included
    pub fn frame_max(&self) -> u32 {
        self.frame_max
    }

    /// Heartbeat interval the broker proposed, in seconds
    pub fn heartbeat(&self) -> u16 {
        self.heartbeat
    }

    /// Server details, once the handshake started
    pub fn server(&self) -> Option<&ServerInfo> {
        self.server.as_ref()
    }

    /// Known hosts reported by `open-ok`
    pub fn known_hosts(&self) -> &str {
        &self.known_hosts
    }

    /// Whether the connection can still be used
    pub fn is_open(&self) -> bool {
        self.closed.is_none()
    }

    /// Close reason, once closed
    pub fn close_reason(&self) -> Option<&CloseReason> {
        self.closed.as_ref()
    }

    /// Ids of the open channels, channel 0 excluded
    pub fn channel_ids(&self) -> Vec<u16> {
        let mut ids: Vec<u16> = self
            .exchanges
            .keys()
            .copied()
            .filter(|&id| id != CONTROL_CHANNEL)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Get the exchange of a channel
    pub fn exchange(&self, id: u16) -> Option<&FrameExchange> {
        self.exchanges.get(&id)
    }

    fn exchange_mut(&mut self, id: u16) -> Result<&mut FrameExchange> {
        self.exchanges
            .get_mut(&id)
            .ok_or_else(|| BurrowError::Channel(format!("channel {} is not open", id)))
    }

    fn ensure_open(&self) -> Result<()> {
        match &self.closed {
            Some(reason) => Err(BurrowError::ConnectionClosed(reason.clone())),
            None => Ok(()),
        }
    }

    fn ensure_channel(&self, id: u16) -> Result<()> {
        self.ensure_open()?;
        if self.exchanges.contains_key(&id) {
            Ok(())
        } else {
            Err(BurrowError::Channel(format!("channel {} is not open", id)))
        }
    }

    /// Mark the connection unusable after a fatal error
    fn fail(&mut self, err: BurrowError) -> BurrowError {
        if self.closed.is_none() && err.is_fatal() {
            self.abandon(&err);
        }
        err
    }

    /// Tear down what a failed wait on `id` left out of step
    ///
    /// Unknown methods and channel errors end the channel, or the whole
    /// connection when they happen on channel 0.
    fn fail_on(&mut self, id: u16, err: BurrowError) -> BurrowError {
        let channel_fatal = matches!(err, BurrowError::UnknownMethod { .. } | BurrowError::Channel(_));
        if !channel_fatal || self.closed.is_some() {
            return self.fail(err);
        }
        if id == CONTROL_CHANNEL {
            self.abandon(&err);
        } else if self.exchanges.contains_key(&id) {
            warn!(channel = id, error = %err, "Channel failed");
            self.release(id, CloseReason::new(0, err.to_string()));
        }
        err
    }

    fn abandon(&mut self, err: &BurrowError) {
        warn!(error = %err, "Connection failed");
        self.closed = Some(CloseReason::new(0, err.to_string()));
        self.exchanges.retain(|&id, _| id == CONTROL_CHANNEL);
    }

    /// Open a channel, picking the lowest free id when `id` is `None`
    pub async fn open_channel(&mut self, id: Option<u16>) -> Result<Channel<'_, S>> {
        self.ensure_open()?;
        let id = match id {
            Some(CONTROL_CHANNEL) => {
                return Err(BurrowError::Channel("channel 0 is reserved".to_string()))
            }
            Some(id) if self.exchanges.contains_key(&id) => {
                return Err(BurrowError::Channel(format!("channel {} is already open", id)))
            }
            Some(id) if id > self.channel_max => {
                return Err(BurrowError::Channel(format!(
                    "channel {} is above the channel limit of {}",
                    id, self.channel_max
                )))
            }
            Some(id) => id,
            None => self.free_channel_id()?,
        };

        self.exchanges
            .insert(id, FrameExchange::new(id, dispatch::channel_handlers()));

        let mut args = Writer::new();
        args.write_short_str("")?;
        let opened = match self.write_method(id, method::CHANNEL_OPEN, &args.finish()).await {
            Ok(()) => self.expect(id, &[method::CHANNEL_OPEN_OK]).await,
            Err(e) => Err(e),
        };
        if let Err(e) = opened {
            self.exchanges.remove(&id);
            return Err(e);
        }

        debug!(channel = id, "Channel ready");
        Ok(Channel::new(self, id))
    }

    /// Handle to an already open channel
    pub fn channel(&mut self, id: u16) -> Result<Channel<'_, S>> {
        self.ensure_open()?;
        if id == CONTROL_CHANNEL || !self.exchanges.contains_key(&id) {
            return Err(BurrowError::Channel(format!("channel {} is not open", id)));
        }
        Ok(Channel::new(self, id))
    }

    fn free_channel_id(&self) -> Result<u16> {
        (1..=self.channel_max)
            .find(|id| !self.exchanges.contains_key(id))
            .ok_or(BurrowError::NoFreeChannel)
    }

    /// Install or replace a handler on a channel
    pub fn register_handler(
        &mut self,
        id: u16,
        signature: MethodSignature,
        handler: Handler,
    ) -> Result<()> {
        self.exchange_mut(id)?.register_handler(signature, handler);
        Ok(())
    }

    /// Send a method frame
    pub async fn send_method(&mut self, id: u16, signature: MethodSignature, args: &[u8]) -> Result<()> {
        self.ensure_channel(id)?;
        self.write_method(id, signature, args).await
    }

    /// Send a content header and the body frames that follow a content method
    pub async fn send_content(
        &mut self,
        id: u16,
        class_id: u16,
        properties: &Properties,
        body: Bytes,
    ) -> Result<()> {
        self.ensure_channel(id)?;
        let schema = content::schema_for(class_id)?;
        let header = ContentHeader {
            class_id,
            weight: 0,
            body_size: body.len() as u64,
            properties: properties.clone(),
        };
        let payload = header.encode(schema)?;
        self.write_frame(&Frame::header(id, payload)).await?;

        let chunk = (self.frame_max as usize).saturating_sub(FRAME_OVERHEAD).max(1);
        let mut offset = 0;
        while offset < body.len() {
            let end = (offset + chunk).min(body.len());
            self.write_frame(&Frame::body(id, body.slice(offset..end))).await?;
            offset = end;
        }
        trace!(channel = id, size = body.len(), "Content sent");
        Ok(())
    }

    /// Send a heartbeat frame
    pub async fn send_heartbeat(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.write_frame(&Frame::heartbeat()).await
    }

    async fn write_method(&mut self, id: u16, signature: MethodSignature, args: &[u8]) -> Result<()> {
        trace!(channel = id, %signature, "Sending method");
        self.write_frame(&Frame::method(id, signature, args)).await
    }

    async fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        let written = self.codec.write_frame(&mut self.stream, frame).await;
        written.map_err(|e| self.fail(e.into()))
    }

    async fn read_frame(&mut self) -> Result<Frame> {
        let duration = self.config.read_timeout;
        let read = timeout(duration, self.codec.read_frame(&mut self.stream)).await;
        match read {
            Err(_) => Err(BurrowError::TimedOut { duration }),
            Ok(Ok(Some(frame))) => Ok(frame),
            Ok(Ok(None)) => Err(BurrowError::Framing(
                "connection reset by peer".to_string(),
            )),
            Ok(Err(e)) => Err(e.into()),
        }
    }

    /// Wait on channel 0
    pub async fn wait(&mut self, allowed: Option<&[MethodSignature]>) -> Result<Outcome> {
        self.wait_on(CONTROL_CHANNEL, allowed).await
    }

    /// Wait until a method on `id` passes `allowed` and dispatch it
    ///
    /// Deferred methods are replayed first. Methods that do not pass are
    /// deferred; close requests always pass.
    pub async fn wait_on(&mut self, id: u16, allowed: Option<&[MethodSignature]>) -> Result<Outcome> {
        self.ensure_open()?;
        match self.wait_inner(id, allowed).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => Err(self.fail_on(id, e)),
        }
    }

    async fn wait_inner(&mut self, id: u16, allowed: Option<&[MethodSignature]>) -> Result<Outcome> {
        if let Some(method) = self.exchange_mut(id)?.take_method(allowed) {
            debug!(channel = id, signature = %method.signature, "Replaying deferred method");
            return self.dispatch(id, method).await;
        }

        let started = Instant::now();
        loop {
            let Some(frame) = self.next_frame(id).await? else {
                return Ok(self.closed_outcome());
            };
            if frame.kind != FrameType::Method {
                return Err(BurrowError::Channel(format!(
                    "expected method frame on channel {}, got {} frame",
                    id, frame.kind
                )));
            }
            if frame.payload.len() < 4 {
                return Err(BurrowError::Channel(format!(
                    "method frame on channel {} is too short",
                    id
                )));
            }

            let (signature, args) = method::decode_payload(frame.payload)?;
            let mut method = Method::new(signature, args);
            if signature.carries_content() {
                let Some(mut message) = self.wait_content(id).await? else {
                    return Ok(self.closed_outcome());
                };
                message.delivery = DeliveryInfo::parse(signature, &method.args)?;
                method.content = Some(message);
            }

            if accepts(allowed, signature) {
                return self.dispatch(id, method).await;
            }

            debug!(channel = id, %signature, "Deferring method");
            self.exchange_mut(id)?.push_method(method);
            if let Some(limit) = self.config.wait_timeout {
                if started.elapsed() >= limit {
                    return Err(BurrowError::TimedOut { duration: limit });
                }
            }
        }
    }

    fn closed_outcome(&self) -> Outcome {
        Outcome::Closed(self.closed.clone().unwrap_or_default())
    }

    /// Wait for a method on `id`, turning closes into errors
    pub(crate) async fn expect(&mut self, id: u16, allowed: &[MethodSignature]) -> Result<Method> {
        loop {
            match self.wait_on(id, Some(allowed)).await? {
                Outcome::Reply(method) => return Ok(method),
                Outcome::Handled => continue,
                Outcome::Closed(reason) => {
                    return Err(if id == CONTROL_CHANNEL || self.closed.is_some() {
                        BurrowError::ConnectionClosed(reason)
                    } else {
                        BurrowError::ChannelClosed { channel: id, reason }
                    })
                }
            }
        }
    }

    /// Run a method's handler, send what it queued and release closed channels
    async fn dispatch(&mut self, id: u16, method: Method) -> Result<Outcome> {
        let exchange = self.exchange_mut(id)?;
        let outcome = exchange.dispatch(method)?;
        let outbox = exchange.context_mut().take_outbox();

        for (signature, args) in outbox {
            self.write_method(id, signature, &args).await?;
        }

        if let Outcome::Closed(reason) = &outcome {
            self.release(id, reason.clone());
        }
        Ok(outcome)
    }

    fn release(&mut self, id: u16, reason: CloseReason) {
        if id == CONTROL_CHANNEL {
            info!(%reason, "Connection closed");
            self.closed = Some(reason);
            self.exchanges.retain(|&id, _| id == CONTROL_CHANNEL);
        } else {
            debug!(channel = id, %reason, "Channel released");
            self.exchanges.remove(&id);
        }
    }

    /// Next frame for `id`, from its backlog first
    ///
    /// `None` means a connection close was handled while waiting.
    async fn next_frame(&mut self, id: u16) -> Result<Option<Frame>> {
        if let Some(frame) = self.exchange_mut(id)?.pop_frame() {
            return Ok(Some(frame));
        }
        self.wait_channel(id).await
    }

    /// Read frames until one arrives for `id`, queueing the rest
    ///
    /// Method frames for channel 0 are dispatched as soon as they arrive.
    async fn wait_channel(&mut self, id: u16) -> Result<Option<Frame>> {
        loop {
            let frame = self.read_frame().await?;
            if frame.is_heartbeat() {
                trace!("Heartbeat received");
                continue;
            }
            if frame.channel == id {
                return Ok(Some(frame));
            }

            if frame.channel == CONTROL_CHANNEL && frame.is_method() {
                if self.preempt(frame).await? {
                    return Ok(None);
                }
                continue;
            }

            match self.exchanges.get_mut(&frame.channel) {
                Some(exchange) => {
                    trace!(channel = frame.channel, kind = %frame.kind, "Queueing frame");
                    exchange.push_frame(frame);
                }
                None => {
                    warn!(channel = frame.channel, kind = %frame.kind, "Dropping frame for unknown channel");
                }
            }
        }
    }

    /// Dispatch a channel 0 method read during another channel's wait
    ///
    /// Returns `true` when it closed the connection. A control method that
    /// cannot be handled fails the connection.
    async fn preempt(&mut self, frame: Frame) -> Result<bool> {
        if frame.payload.len() < 4 {
            let err = BurrowError::Channel("method frame on channel 0 is too short".to_string());
            return Err(self.fail_on(CONTROL_CHANNEL, err));
        }
        let (signature, args) = match method::decode_payload(frame.payload) {
            Ok(decoded) => decoded,
            Err(e) => return Err(self.fail(BurrowError::Protocol(e.to_string()))),
        };
        debug!(%signature, "Dispatching control method ahead of channel wait");
        let method = Method::new(signature, args);
        let outcome = match self.dispatch(CONTROL_CHANNEL, method).await {
            Ok(outcome) => outcome,
            Err(e) if e.is_fatal() => return Err(self.fail(e)),
            Err(e) => {
                let err = BurrowError::Protocol(format!(
                    "control method {} could not be handled: {}",
                    signature, e
                ));
                return Err(self.fail(err));
            }
        };
        match outcome {
            Outcome::Closed(_) => Ok(true),
            Outcome::Handled => Ok(false),
            Outcome::Reply(method) => {
                self.exchange_mut(CONTROL_CHANNEL)?.push_method(method);
                Ok(false)
            }
        }
    }

    /// Read the header and body frames that follow a content method
    async fn wait_content(&mut self, id: u16) -> Result<Option<Message>> {
        let Some(frame) = self.next_frame(id).await? else {
            return Ok(None);
        };
        if frame.kind != FrameType::Header {
            return Err(BurrowError::Protocol(format!(
                "expected content header on channel {}, got {} frame",
                id, frame.kind
            )));
        }

        let class_id = ContentHeader::peek_class(&frame.payload)?;
        let header = ContentHeader::decode(frame.payload, content::schema_for(class_id)?)?;
        let body_size = usize::try_from(header.body_size).map_err(|_| {
            BurrowError::Protocol(format!("body of {} bytes is too large", header.body_size))
        })?;

        let mut body = BytesMut::new();
        while body.len() < body_size {
            let Some(frame) = self.next_frame(id).await? else {
                return Ok(None);
            };
            if frame.kind != FrameType::Body {
                return Err(BurrowError::Protocol(format!(
                    "expected content body on channel {}, got {} frame",
                    id, frame.kind
                )));
            }
            if body.len() + frame.payload.len() > body_size {
                return Err(BurrowError::Protocol(format!(
                    "content body exceeds declared size of {} bytes",
                    body_size
                )));
            }
            body.extend_from_slice(&frame.payload);
        }
        trace!(channel = id, size = body_size, "Content reassembled");

        let body = body.freeze();
        let body = if self.config.auto_decode {
            content::decode_body(&header.properties, body)
        } else {
            body
        };
        Ok(Some(Message {
            properties: header.properties,
            body,
            delivery: None,
        }))
    }

    /// Close a channel and wait for the broker to confirm
    pub async fn close_channel(&mut self, id: u16, reply_code: u16, reply_text: &str) -> Result<CloseReason> {
        self.ensure_open()?;
        let reason = CloseReason::new(reply_code, reply_text);
        self.exchange_mut(id)?.context_mut().set_closing(reason.clone());
        self.write_method(id, method::CHANNEL_CLOSE, &reason.encode()?)
            .await?;

        loop {
            match self.wait_on(id, Some(&[method::CHANNEL_CLOSE_OK][..])).await? {
                Outcome::Closed(reason) => return Ok(reason),
                Outcome::Handled | Outcome::Reply(_) => continue,
            }
        }
    }

    /// Close the connection and wait for the broker to confirm
    ///
    /// Closing a closed connection returns its close reason.
    pub async fn close(&mut self, reply_code: u16, reply_text: &str) -> Result<CloseReason> {
        if let Some(reason) = &self.closed {
            return Ok(reason.clone());
        }
        let reason = CloseReason::new(reply_code, reply_text);
        self.exchange_mut(CONTROL_CHANNEL)?
            .context_mut()
            .set_closing(reason.clone());
        self.write_method(CONTROL_CHANNEL, method::CONNECTION_CLOSE, &reason.encode()?)
            .await?;

        let reason = loop {
            match self.wait(Some(&[method::CONNECTION_CLOSE_OK][..])).await? {
                Outcome::Closed(reason) => break reason,
                Outcome::Handled | Outcome::Reply(_) => continue,
            }
        };
        if let Err(e) = self.stream.shutdown().await {
            debug!(error = %e, "Stream shutdown failed");
        }
        Ok(reason)
    }

    /// Give back the stream
    pub fn into_inner(self) -> S {
        self.stream
    }

    /// Read timeout in effect
    pub fn read_timeout(&self) -> Duration {
        self.config.read_timeout
    }
}
