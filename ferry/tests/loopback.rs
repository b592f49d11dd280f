//! End-to-end round trips over loopback brokers.

mod common;

use common::{Note, fast_config, next, settled, within};
use ferry::{
    Factory, Kernel, Mode,
    broker::Embedded,
    emit, listen,
    testing::{Record, Recorder, RecordingBroker},
};
use std::sync::Arc;

/// A loopback endpoint sharing one recording broker between both cores.
fn endpoint() -> (Kernel<Arc<RecordingBroker>, Arc<RecordingBroker>>, Recorder) {
    let broker = Arc::new(RecordingBroker::loopback());
    let recorder = broker.recorder();
    let factory = Factory::new(Mode::Polling);
    let kernel = Kernel::new(
        Some(factory.emitter(broker.clone(), fast_config())),
        Some(factory.listener(broker, fast_config())),
    );
    (kernel, recorder)
}

#[tokio::test]
async fn test_send_receive_ack() {
    let (kernel, recorder) = endpoint();
    let (Some(emitter), Some(listener)) = (kernel.emitter(), kernel.listener()) else {
        panic!("two-sided endpoint");
    };

    let (snd, _dlq) = emit::typed_as::<String, _>(emitter, "string");
    let (mut rcv, ack) = listen::typed_as::<String, _>(listener, "string");
    kernel.start();

    snd.send("hello world".to_string()).await.unwrap();
    let msg = next(&mut rcv).await;
    assert_eq!(msg.object, "hello world");
    assert_eq!(msg.category, "string");

    let digest = msg.digest.clone();
    ack.send(msg).await.unwrap();
    settled(&recorder, 2).await;
    kernel.close().await;

    assert_eq!(recorder.enqueued().len(), 1);
    assert_eq!(recorder.acked(), vec![digest]);
    assert!(recorder.failed().is_empty());
}

#[tokio::test]
async fn test_fail_then_ack() {
    let (kernel, recorder) = endpoint();
    let (Some(emitter), Some(listener)) = (kernel.emitter(), kernel.listener()) else {
        panic!("two-sided endpoint");
    };

    let (snd, _dlq) = emit::typed_as::<String, _>(emitter, "string");
    let (mut rcv, ack) = listen::typed_as::<String, _>(listener, "string");
    kernel.start();

    snd.send("hello world".to_string()).await.unwrap();
    let first = next(&mut rcv).await;
    let failed_digest = first.digest.clone();
    ack.send(first.fail("fail")).await.unwrap();

    snd.send("hello world".to_string()).await.unwrap();
    let second = next(&mut rcv).await;
    let acked_digest = second.digest.clone();
    ack.send(second).await.unwrap();

    // two enqueues, one err, one ack
    let records = settled(&recorder, 4).await;
    kernel.close().await;

    let settles: Vec<_> = records
        .into_iter()
        .filter(|r| !matches!(r, Record::Enq(_)))
        .collect();
    assert!(matches!(&settles[0], Record::Err(d, reason) if *d == failed_digest && reason == "fail"));
    assert!(matches!(&settles[1], Record::Ack(d) if *d == acked_digest));
}

#[tokio::test]
async fn test_embedded_round_trip() {
    let kernel = Embedded::endpoint_with(&Factory::new(Mode::Polling), fast_config());
    let (Some(emitter), Some(listener)) = (kernel.emitter(), kernel.listener()) else {
        panic!("two-sided endpoint");
    };

    let (snd, _dlq) = emit::typed::<Note, _>(emitter);
    let (mut rcv, ack) = listen::typed::<Note, _>(listener);
    kernel.start();

    snd.send(Note::new("one")).await.unwrap();
    let msg = next(&mut rcv).await;
    assert_eq!(msg.category, "Note");
    assert_eq!(msg.object, Note::new("one"));

    ack.send(msg.fail("again")).await.unwrap();
    let again = next(&mut rcv).await;
    assert_eq!(again.object, Note::new("one"));
    ack.send(again).await.unwrap();

    within(kernel.close()).await;
}
