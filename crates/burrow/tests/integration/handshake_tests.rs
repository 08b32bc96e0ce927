//! Handshake tests

use anyhow::Result;
use burrow::proto::method;
use burrow::proto::{Reader, Writer, CONTROL_CHANNEL};
use burrow::{BurrowError, CloseReason, Connection, ConnectionBuilder, Handshake};

use crate::broker::{pair, Tuning};

#[tokio::test]
async fn test_handshake_negotiates_tuning() -> Result<()> {
    let (client, mut broker) = pair();
    let script = tokio::spawn(async move {
        broker
            .accept(Tuning {
                channel_max: 10,
                frame_max: 4096,
                heartbeat: 30,
            })
            .await
    });

    let config = ConnectionBuilder::new("guest:secret@localhost/test")
        .with_insist(true)
        .build_config();
    let connection = Connection::open(client, config).await?;
    let hello = script.await??;

    assert_eq!(hello.mechanism, "AMQPLAIN");
    assert_eq!(hello.locale, "en_US");
    assert_eq!(hello.library.as_deref(), Some("burrow"));
    assert_eq!(hello.tune_ok, (10, 4096, 0));
    assert_eq!(hello.virtual_host, "test");
    assert!(hello.insist);

    let mut response = Reader::new(hello.response);
    assert_eq!(response.read_short_str()?, "LOGIN");
    assert_eq!(response.read_octet()?, b'S');
    assert_eq!(&response.read_long_str()?[..], b"guest");

    assert_eq!(connection.channel_max(), 10);
    assert_eq!(connection.frame_max(), 4096);
    assert_eq!(connection.heartbeat(), 30);
    assert_eq!(connection.known_hosts(), "scripted:5672");
    let server = connection.server().expect("server info");
    assert_eq!((server.version_major, server.version_minor), (8, 0));
    assert_eq!(server.mechanisms, vec!["AMQPLAIN", "PLAIN"]);
    assert!(connection.is_open());
    Ok(())
}

#[tokio::test]
async fn test_zero_tuning_keeps_client_limits() -> Result<()> {
    let (client, mut broker) = pair();
    let script = tokio::spawn(async move {
        broker
            .accept(Tuning {
                channel_max: 0,
                frame_max: 0,
                heartbeat: 0,
            })
            .await
    });

    let config = ConnectionBuilder::new("localhost")
        .with_channel_max(64)
        .with_frame_max(8192)
        .build_config();
    let connection = Connection::open(client, config).await?;
    let hello = script.await??;

    assert_eq!(hello.tune_ok, (64, 8192, 0));
    assert_eq!(connection.channel_max(), 64);
    assert_eq!(connection.frame_max(), 8192);
    assert!(hello.response.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_secure_challenge_is_answered() -> Result<()> {
    let (client, mut broker) = pair();
    let script = tokio::spawn(async move {
        let mut hello = Default::default();
        broker.start().await?;
        broker.expect_start_ok(&mut hello).await?;

        let mut args = Writer::new();
        args.write_long_str(b"challenge")?;
        broker
            .method(CONTROL_CHANNEL, method::CONNECTION_SECURE, args.finish())
            .await?;
        let mut secure_ok = broker
            .expect(CONTROL_CHANNEL, method::CONNECTION_SECURE_OK)
            .await?;
        let response = secure_ok.read_long_str()?;

        broker.tune(&Tuning::default(), &mut hello).await?;
        broker.expect_open(&mut hello).await?;
        broker.open_ok().await?;
        anyhow::Ok((hello, response))
    });

    let config = ConnectionBuilder::new("guest:guest@localhost").build_config();
    let expected = config.login_response()?;
    let connection = Connection::open(client, config).await?;
    let (hello, response) = script.await??;

    assert_eq!(response, expected);
    assert_eq!(hello.response, expected);
    assert!(connection.is_open());
    Ok(())
}

#[tokio::test]
async fn test_redirect_is_reported() -> Result<()> {
    let (client, mut broker) = pair();
    let script = tokio::spawn(async move {
        let mut hello = Default::default();
        broker.start().await?;
        broker.expect_start_ok(&mut hello).await?;
        broker.tune(&Tuning::default(), &mut hello).await?;
        broker.expect_open(&mut hello).await?;

        let mut args = Writer::new();
        args.write_short_str("other:5672")?;
        args.write_short_str("other:5672,third:5672")?;
        broker
            .method(CONTROL_CHANNEL, method::CONNECTION_REDIRECT, args.finish())
            .await
    });

    let mut connection = Connection::new(client, Default::default());
    let handshake = connection.handshake().await?;
    script.await??;

    assert_eq!(
        handshake,
        Handshake::Redirect {
            host: "other:5672".to_string(),
            known_hosts: "other:5672,third:5672".to_string(),
        }
    );
    Ok(())
}

#[tokio::test]
async fn test_open_reports_redirect_as_error() -> Result<()> {
    let (client, mut broker) = pair();
    let script = tokio::spawn(async move {
        let mut hello = Default::default();
        broker.start().await?;
        broker.expect_start_ok(&mut hello).await?;
        broker.tune(&Tuning::default(), &mut hello).await?;
        broker.expect_open(&mut hello).await?;

        let mut args = Writer::new();
        args.write_short_str("other:5672")?;
        args.write_short_str("")?;
        broker
            .method(CONTROL_CHANNEL, method::CONNECTION_REDIRECT, args.finish())
            .await
    });

    let result = Connection::open(client, Default::default()).await;
    script.await??;

    match result {
        Err(BurrowError::Redirected { host, .. }) => assert_eq!(host, "other:5672"),
        other => panic!("expected redirect, got {:?}", other.map(|_| ())),
    }
    Ok(())
}

#[tokio::test]
async fn test_close_during_handshake() -> Result<()> {
    let (client, mut broker) = pair();
    let reason = CloseReason {
        reply_code: 403,
        reply_text: "ACCESS_REFUSED".to_string(),
        class_id: 10,
        method_id: 11,
    };
    let sent = reason.clone();
    let script = tokio::spawn(async move {
        let mut hello = Default::default();
        broker.start().await?;
        broker.expect_start_ok(&mut hello).await?;
        broker
            .method(CONTROL_CHANNEL, method::CONNECTION_CLOSE, sent.encode()?)
            .await?;
        broker
            .expect(CONTROL_CHANNEL, method::CONNECTION_CLOSE_OK)
            .await?;
        anyhow::Ok(())
    });

    let result = Connection::open(client, Default::default()).await;
    script.await??;

    match result {
        Err(BurrowError::ConnectionClosed(received)) => {
            assert_eq!(received, reason);
            assert_eq!(received.offending_method(), Some(method::CONNECTION_START_OK));
        }
        other => panic!("expected close, got {:?}", other.map(|_| ())),
    }
    Ok(())
}

#[tokio::test]
async fn test_bad_frame_terminator_fails_handshake() -> Result<()> {
    let (client, mut broker) = pair();
    let script = tokio::spawn(async move {
        broker.read_protocol_header().await?;
        let mut raw = vec![1u8, 0, 0, 0, 0, 0, 4, 0, 10, 0, 10];
        raw.push(0x00);
        broker.raw_write(&raw).await
    });

    let result = Connection::open(client, Default::default()).await;
    script.await??;

    assert!(matches!(result, Err(BurrowError::Framing(_))));
    Ok(())
}
