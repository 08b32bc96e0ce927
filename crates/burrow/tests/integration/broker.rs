//! Scripted broker over an in-memory stream

use anyhow::{ensure, Context, Result};
use burrow::proto::codec::{FrameCodec, PROTOCOL_HEADER};
use burrow::proto::method::{self, MethodSignature};
use burrow::proto::{Frame, FrameType, Reader, Writer, CONTROL_CHANNEL};
use burrow::{Connection, ConnectionConfig};
use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

/// Tuning the broker proposes
pub struct Tuning {
    pub channel_max: u16,
    pub frame_max: u32,
    pub heartbeat: u16,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            channel_max: 0,
            frame_max: 131_072,
            heartbeat: 0,
        }
    }
}

/// What the client sent during the handshake
#[derive(Debug, Default)]
pub struct ClientHello {
    pub mechanism: String,
    pub response: Bytes,
    pub locale: String,
    pub library: Option<String>,
    pub tune_ok: (u16, u32, u16),
    pub virtual_host: String,
    pub insist: bool,
}

pub struct Broker {
    stream: DuplexStream,
    codec: FrameCodec,
}

/// Route client logs to the test output, filtered by `RUST_LOG`
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Client connection and the broker end of its stream
pub fn pair() -> (DuplexStream, Broker) {
    init_tracing();
    let (client, server) = tokio::io::duplex(256 * 1024);
    let broker = Broker {
        stream: server,
        codec: FrameCodec::with_max_frame_size(1 << 20),
    };
    (client, broker)
}

impl Broker {
    pub async fn read_protocol_header(&mut self) -> Result<()> {
        let mut header = [0u8; 8];
        self.stream.read_exact(&mut header).await?;
        ensure!(&header == PROTOCOL_HEADER, "bad protocol header {:?}", header);
        Ok(())
    }

    pub async fn raw_write(&mut self, bytes: &[u8]) -> Result<()> {
        self.stream.write_all(bytes).await?;
        Ok(())
    }

    pub async fn send(&mut self, frame: Frame) -> Result<()> {
        self.codec.write_frame(&mut self.stream, &frame).await?;
        Ok(())
    }

    pub async fn method(&mut self, channel: u16, signature: MethodSignature, args: Bytes) -> Result<()> {
        self.send(Frame::method(channel, signature, &args)).await
    }

    pub async fn recv(&mut self) -> Result<Frame> {
        self.codec
            .read_frame(&mut self.stream)
            .await?
            .context("client closed the stream")
    }

    pub async fn expect(&mut self, channel: u16, signature: MethodSignature) -> Result<Reader> {
        let frame = self.recv().await?;
        ensure!(frame.kind == FrameType::Method, "expected method, got {}", frame.kind);
        ensure!(frame.channel == channel, "expected channel {}, got {}", channel, frame.channel);
        let (received, args) = method::decode_payload(frame.payload)?;
        ensure!(received == signature, "expected {}, got {}", signature, received);
        Ok(Reader::new(args))
    }

    pub async fn start(&mut self) -> Result<()> {
        self.read_protocol_header().await?;
        let mut args = Writer::new();
        args.write_octet(8);
        args.write_octet(0);
        args.write_table(&burrow::proto::FieldTable::new().with("product", "scripted"))?;
        args.write_long_str(b"AMQPLAIN PLAIN")?;
        args.write_long_str(b"en_US")?;
        self.method(CONTROL_CHANNEL, method::CONNECTION_START, args.finish())
            .await
    }

    pub async fn expect_start_ok(&mut self, hello: &mut ClientHello) -> Result<()> {
        let mut args = self.expect(CONTROL_CHANNEL, method::CONNECTION_START_OK).await?;
        let properties = args.read_table()?;
        hello.library = properties
            .get("library")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        hello.mechanism = args.read_short_str()?;
        hello.response = args.read_long_str()?;
        hello.locale = args.read_short_str()?;
        Ok(())
    }

    pub async fn tune(&mut self, tuning: &Tuning, hello: &mut ClientHello) -> Result<()> {
        let mut args = Writer::new();
        args.write_short(tuning.channel_max);
        args.write_long(tuning.frame_max);
        args.write_short(tuning.heartbeat);
        self.method(CONTROL_CHANNEL, method::CONNECTION_TUNE, args.finish())
            .await?;

        let mut args = self.expect(CONTROL_CHANNEL, method::CONNECTION_TUNE_OK).await?;
        hello.tune_ok = (args.read_short()?, args.read_long()?, args.read_short()?);
        Ok(())
    }

    pub async fn expect_open(&mut self, hello: &mut ClientHello) -> Result<()> {
        let mut args = self.expect(CONTROL_CHANNEL, method::CONNECTION_OPEN).await?;
        hello.virtual_host = args.read_short_str()?;
        let capabilities = args.read_short_str()?;
        ensure!(capabilities.is_empty(), "unexpected capabilities {}", capabilities);
        hello.insist = args.read_bit()?;
        Ok(())
    }

    pub async fn open_ok(&mut self) -> Result<()> {
        let mut args = Writer::new();
        args.write_short_str("scripted:5672")?;
        self.method(CONTROL_CHANNEL, method::CONNECTION_OPEN_OK, args.finish())
            .await
    }

    /// Play a full handshake
    pub async fn accept(&mut self, tuning: Tuning) -> Result<ClientHello> {
        let mut hello = ClientHello::default();
        self.start().await?;
        self.expect_start_ok(&mut hello).await?;
        self.tune(&tuning, &mut hello).await?;
        self.expect_open(&mut hello).await?;
        self.open_ok().await?;
        Ok(hello)
    }

    /// Answer a `channel.open` on `channel`
    pub async fn accept_channel(&mut self, channel: u16) -> Result<()> {
        let mut args = self.expect(channel, method::CHANNEL_OPEN).await?;
        ensure!(args.read_short_str()?.is_empty(), "unexpected out-of-band value");
        self.method(channel, method::CHANNEL_OPEN_OK, Bytes::new()).await
    }
}

/// Connect a client to a broker that plays a default handshake first
pub async fn connected<F, Fut, T>(config: ConnectionConfig, script: F) -> Result<(Connection<DuplexStream>, tokio::task::JoinHandle<Result<T>>)>
where
    F: FnOnce(Broker) -> Fut + Send + 'static,
    Fut: std::future::Future<Output = Result<T>> + Send + 'static,
    T: Send + 'static,
{
    let (client, mut broker) = pair();
    let handle = tokio::spawn(async move {
        broker.accept(Tuning::default()).await?;
        script(broker).await
    });
    let connection = Connection::open(client, config).await?;
    Ok((connection, handle))
}
