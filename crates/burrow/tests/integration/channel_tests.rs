//! Channel lifecycle, request/reply and content tests

use std::sync::{Arc, Mutex};

use anyhow::Result;
use burrow::proto::method;
use burrow::proto::properties::BASIC_PROPERTIES;
use burrow::proto::{ContentHeader, FrameType, Properties, Writer, CONTROL_CHANNEL};
use burrow::{BurrowError, CloseReason, ConnectionConfig, Outcome};
use bytes::Bytes;

use crate::broker::connected;

fn declare_args(queue: &str) -> Result<Bytes> {
    let mut args = Writer::new();
    args.write_short(0);
    args.write_short_str(queue)?;
    for flag in [false, true, false, false, false] {
        args.write_bit(flag);
    }
    args.write_table(&Default::default())?;
    Ok(args.finish())
}

#[tokio::test]
async fn test_open_call_and_close_channel() -> Result<()> {
    let (mut connection, script) = connected(ConnectionConfig::default(), |mut broker| async move {
        broker.accept_channel(1).await?;

        let mut args = broker.expect(1, method::QUEUE_DECLARE).await?;
        args.read_short()?;
        let queue = args.read_short_str()?;
        let mut reply = Writer::new();
        reply.write_short_str(&queue)?;
        reply.write_long(3);
        reply.write_long(1);
        broker
            .method(1, method::QUEUE_DECLARE_OK, reply.finish())
            .await?;

        let mut close = broker.expect(1, method::CHANNEL_CLOSE).await?;
        let code = close.read_short()?;
        broker
            .method(1, method::CHANNEL_CLOSE_OK, Bytes::new())
            .await?;
        anyhow::Ok(code)
    })
    .await?;

    let mut channel = connection.open_channel(None).await?;
    assert_eq!(channel.id(), 1);
    assert!(channel.is_open());

    let reply = channel
        .call(
            method::QUEUE_DECLARE,
            &declare_args("jobs")?,
            &[method::QUEUE_DECLARE_OK],
        )
        .await?;
    let mut args = reply.reader();
    assert_eq!(args.read_short_str()?, "jobs");
    assert_eq!(args.read_long()?, 3);

    let reason = channel.close(200, "bye").await?;
    assert_eq!(reason, CloseReason::new(200, "bye"));
    assert!(connection.channel_ids().is_empty());
    assert_eq!(script.await??, 200);
    Ok(())
}

#[tokio::test]
async fn test_consumer_handler_acks_deliveries() -> Result<()> {
    let (mut connection, script) = connected(ConnectionConfig::default(), |mut broker| async move {
        broker.accept_channel(1).await?;

        let mut args = Writer::new();
        args.write_short_str("ctag")?;
        args.write_long_long(42);
        args.write_bit(false);
        args.write_short_str("amq.direct")?;
        args.write_short_str("jobs")?;
        broker.method(1, method::BASIC_DELIVER, args.finish()).await?;

        let header = ContentHeader {
            class_id: method::CLASS_BASIC,
            weight: 0,
            body_size: 5,
            properties: Properties::new().with("content_type", "text/plain"),
        };
        broker
            .send(burrow::proto::Frame::header(1, header.encode(&BASIC_PROPERTIES)?))
            .await?;
        broker
            .send(burrow::proto::Frame::body(1, Bytes::from_static(b"hello")))
            .await?;

        let mut ack = broker.expect(1, method::BASIC_ACK).await?;
        anyhow::Ok(ack.read_long_long()?)
    })
    .await?;

    let received = Arc::new(Mutex::new(Vec::new()));
    let sink = received.clone();

    let mut channel = connection.open_channel(None).await?;
    channel.register_handler(method::BASIC_DELIVER, move |ctx, delivery| {
        let message = delivery.content.unwrap_or_default();
        let tag = message.delivery.as_ref().map_or(0, |d| d.delivery_tag);

        let mut args = Writer::new();
        args.write_long_long(tag);
        args.write_bit(false);
        ctx.queue_method(method::BASIC_ACK, args.finish());

        sink.lock().unwrap().push(message);
        Ok(Outcome::Handled)
    })?;

    let outcome = channel.wait_reply(None).await?;
    assert_eq!(outcome, Outcome::Handled);
    assert_eq!(script.await??, 42);

    let received = received.lock().unwrap();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].body_str(), Some("hello"));
    assert_eq!(received[0].properties.content_type(), Some("text/plain"));
    Ok(())
}

#[tokio::test]
async fn test_publish_sends_method_header_and_body() -> Result<()> {
    let (mut connection, script) = connected(ConnectionConfig::default(), |mut broker| async move {
        broker.accept_channel(1).await?;

        let mut args = broker.expect(1, method::BASIC_PUBLISH).await?;
        args.read_short()?;
        let exchange = args.read_short_str()?;

        let header = broker.recv().await?;
        anyhow::ensure!(header.kind == FrameType::Header, "expected header");
        let header = ContentHeader::decode(header.payload, &BASIC_PROPERTIES)?;

        let body = broker.recv().await?;
        anyhow::ensure!(body.kind == FrameType::Body, "expected body");
        anyhow::Ok((exchange, header, body.payload))
    })
    .await?;

    let mut channel = connection.open_channel(None).await?;
    let mut args = Writer::new();
    args.write_short(0);
    args.write_short_str("logs")?;
    args.write_short_str("info")?;
    args.write_bit(false);
    args.write_bit(false);
    channel.send_method(method::BASIC_PUBLISH, &args.finish()).await?;

    let properties = Properties::new()
        .with("content_type", "text/plain")
        .with("message_id", "m-1");
    channel
        .send_content(method::CLASS_BASIC, &properties, "log line")
        .await?;

    let (exchange, header, body) = script.await??;
    assert_eq!(exchange, "logs");
    assert_eq!(header.body_size, 8);
    assert_eq!(header.properties, properties);
    assert_eq!(&body[..], b"log line");
    Ok(())
}

#[tokio::test]
async fn test_rejected_channel_open() -> Result<()> {
    let reason = CloseReason::new(504, "CHANNEL_ERROR");
    let sent = reason.clone();
    let (mut connection, script) = connected(ConnectionConfig::default(), |mut broker| async move {
        broker.expect(1, method::CHANNEL_OPEN).await?;
        broker.method(1, method::CHANNEL_CLOSE, sent.encode()?).await?;
        broker.expect(1, method::CHANNEL_CLOSE_OK).await?;
        anyhow::Ok(())
    })
    .await?;

    let result = connection.open_channel(None).await.map(|c| c.id());
    match result {
        Err(BurrowError::ChannelClosed { channel, reason: received }) => {
            assert_eq!(channel, 1);
            assert_eq!(received, reason);
        }
        other => panic!("expected channel close, got {:?}", other),
    }
    script.await??;

    assert!(connection.is_open());
    assert!(connection.channel_ids().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_channel_ids() -> Result<()> {
    let (mut connection, script) = connected(ConnectionConfig::default(), |mut broker| async move {
        broker.accept_channel(7).await?;
        broker.accept_channel(1).await?;
        anyhow::Ok(())
    })
    .await?;

    assert!(matches!(
        connection.open_channel(Some(0)).await.map(|c| c.id()),
        Err(BurrowError::Channel(_))
    ));
    assert_eq!(connection.open_channel(Some(7)).await?.id(), 7);
    assert!(matches!(
        connection.open_channel(Some(7)).await.map(|c| c.id()),
        Err(BurrowError::Channel(_))
    ));
    assert_eq!(connection.open_channel(None).await?.id(), 1);
    assert_eq!(connection.channel_ids(), vec![1, 7]);
    assert_eq!(connection.channel(7)?.id(), 7);
    assert!(connection.channel(3).is_err());
    script.await??;
    Ok(())
}

#[tokio::test]
async fn test_connection_close() -> Result<()> {
    let (mut connection, script) = connected(ConnectionConfig::default(), |mut broker| async move {
        broker.accept_channel(1).await?;
        let mut close = broker.expect(CONTROL_CHANNEL, method::CONNECTION_CLOSE).await?;
        let code = close.read_short()?;
        let text = close.read_short_str()?;
        broker
            .method(CONTROL_CHANNEL, method::CONNECTION_CLOSE_OK, Bytes::new())
            .await?;
        anyhow::Ok((code, text))
    })
    .await?;

    connection.open_channel(None).await?;
    let reason = connection.close(200, "Goodbye").await?;
    assert_eq!(reason, CloseReason::new(200, "Goodbye"));
    assert_eq!(script.await??, (200, "Goodbye".to_string()));

    assert!(!connection.is_open());
    assert!(connection.channel_ids().is_empty());
    assert!(matches!(
        connection.open_channel(None).await.map(|c| c.id()),
        Err(BurrowError::ConnectionClosed(_))
    ));
    // Closing again reports the first reason
    assert_eq!(connection.close(320, "again").await?, reason);
    Ok(())
}

#[tokio::test]
async fn test_flow_and_alert_on_open_channel() -> Result<()> {
    let (mut connection, script) = connected(ConnectionConfig::default(), |mut broker| async move {
        broker.accept_channel(1).await?;
        broker.method(1, method::CHANNEL_FLOW, Bytes::from_static(&[0])).await?;
        let mut flow_ok = broker.expect(1, method::CHANNEL_FLOW_OK).await?;
        let active = flow_ok.read_bit()?;

        let mut args = Writer::new();
        args.write_short(312);
        args.write_short_str("NO_ROUTE")?;
        args.write_table(&Default::default())?;
        broker.method(1, method::CHANNEL_ALERT, args.finish()).await?;
        anyhow::Ok(active)
    })
    .await?;

    let mut channel = connection.open_channel(None).await?;
    assert!(channel.is_active());
    assert_eq!(channel.wait_reply(None).await?, Outcome::Handled);
    assert!(!channel.is_active());
    assert!(!script.await??);

    assert_eq!(channel.wait_reply(None).await?, Outcome::Handled);
    let alerts = channel.alerts();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].reply_code, 312);
    Ok(())
}
