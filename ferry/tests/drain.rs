//! Close semantics: outbound drain, acknowledgement drain, dead letters.

mod common;

use common::{Note, fast_config, within};
use ferry::{
    EmitterCore, Error, Factory, ListenerCore, Mode, Msg, emit, listen,
    testing::RecordingBroker,
};
use std::sync::Arc;
use tokio::sync::mpsc;

#[tokio::test]
async fn test_close_drains_outbound() {
    let broker = Arc::new(RecordingBroker::new());
    let core = EmitterCore::new(broker.clone(), fast_config().with_policy_at_most_once(64));
    let (snd, _dlq) = emit::typed::<Note, _>(&core);

    for i in 0..50 {
        snd.send(Note::new(&i.to_string())).await.unwrap();
    }
    within(core.close()).await;

    assert_eq!(broker.recorder().enqueued().len(), 50);
    assert!(broker.is_closed());
}

#[tokio::test]
async fn test_rejected_values_return_on_dead_letter() {
    let broker = Arc::new(RecordingBroker::new());
    broker.fail_enq(usize::MAX);

    let (stderr, mut errors) = mpsc::channel(8);
    let core = EmitterCore::new(
        broker.clone(),
        fast_config().with_policy_at_least_once(4).with_stderr(stderr),
    );
    let (snd, mut dlq) = emit::typed::<Note, _>(&core);

    snd.send(Note::new("a")).await.unwrap();
    snd.send(Note::new("b")).await.unwrap();

    assert_eq!(within(dlq.recv()).await, Some(Note::new("a")));
    assert_eq!(within(dlq.recv()).await, Some(Note::new("b")));
    assert!(matches!(within(errors.recv()).await, Some(Error::Enqueue(_))));

    within(core.close()).await;
    assert!(broker.recorder().enqueued().is_empty());
}

#[tokio::test]
async fn test_writer_reports_to_caller() {
    let broker = Arc::new(RecordingBroker::new());
    let core = EmitterCore::new(broker.clone(), fast_config());
    let writer = emit::writer::<Note, _>(&core);

    writer.enq(&Note::new("direct")).await.unwrap();
    writer.enq_to(&Note::new("routed"), "elsewhere").await.unwrap();

    let enqueued = broker.recorder().enqueued();
    assert_eq!(enqueued[0].category, "Note");
    assert_eq!(enqueued[1].category, "elsewhere");

    broker.fail_enq(usize::MAX);
    assert!(matches!(
        writer.enq(&Note::new("lost")).await,
        Err(Error::Enqueue(_))
    ));

    core.close().await;
    assert!(matches!(
        writer.enq(&Note::new("late")).await,
        Err(Error::Closed)
    ));
}

#[tokio::test]
async fn test_close_drains_acknowledgements() {
    let broker = Arc::new(RecordingBroker::new());
    let core = ListenerCore::new(broker.clone(), fast_config().with_policy_at_least_once(8));
    let (_rcv, ack) = listen::typed::<Note, _>(&core);

    for d in ["1", "2", "3", "4"] {
        ack.send(Msg::new(Note::new(d), "Note", d)).await.unwrap();
    }
    within(core.close()).await;

    assert_eq!(broker.recorder().acked().len(), 4);
    assert!(ack.send(Msg::new(Note::new("late"), "Note", "5")).await.is_err());
}

#[tokio::test]
async fn test_idle_endpoint_closes_promptly() {
    let kernel = Factory::new(Mode::Polling).endpoint(RecordingBroker::new(), fast_config());
    let (Some(emitter), Some(listener)) = (kernel.emitter(), kernel.listener()) else {
        panic!("two-sided endpoint");
    };
    let _out = emit::bytes(emitter, "blob");
    let _in = listen::bytes(listener, "blob");
    kernel.start();

    within(kernel.close()).await;
    within(kernel.serve()).await;
}
