//! Event stamping on the way out and decoding on the way in.

mod common;

use common::{Note, fast_config, next, settled};
use ferry::{
    Encoder, Event, Factory, Mode,
    codec::EventCodec,
    emit, listen,
    testing::RecordingBroker,
};
use serde_json::Value;

#[test]
fn test_unstamped_event_is_stamped() {
    let codec = EventCodec::<String>::with_category("note")
        .with_realm("r")
        .with_agent("a");

    let bytes = codec.encode(&Event::new("x".to_string())).unwrap();
    let json: Value = serde_json::from_slice(&bytes).unwrap();

    assert_eq!(json["meta"]["type"], "note");
    assert_eq!(json["meta"]["realm"], "r");
    assert_eq!(json["meta"]["agent"], "a");
    assert!(!json["meta"]["id"].as_str().unwrap_or_default().is_empty());
    assert!(!json["meta"]["created"].as_str().unwrap_or_default().starts_with("1970"));
    assert_eq!(json["data"], "x");
}

#[tokio::test]
async fn test_events_through_endpoint() {
    let config = fast_config().with_realm("test").with_agent("notes");
    let broker = RecordingBroker::loopback();
    let recorder = broker.recorder();
    let kernel = Factory::new(Mode::Polling).endpoint(broker, config);
    let (Some(emitter), Some(listener)) = (kernel.emitter(), kernel.listener()) else {
        panic!("two-sided endpoint");
    };

    let (snd, _dlq) = emit::event::<Note, _>(emitter);
    let (mut rcv, ack) = listen::event::<Note, _>(listener);
    kernel.start();

    let event = Event::new(Note::new("hi")).with_target("inbox");
    snd.send(event).await.unwrap();

    let msg = next(&mut rcv).await;
    assert_eq!(msg.category, "Note");
    assert_eq!(msg.object.data, Note::new("hi"));
    assert_eq!(msg.object.meta.kind, "Note");
    assert_eq!(msg.object.meta.realm, "test");
    assert_eq!(msg.object.meta.agent, "notes");
    assert_eq!(msg.object.meta.target.as_deref(), Some("inbox"));
    assert!(!msg.object.meta.is_unstamped());

    ack.send(msg).await.unwrap();
    settled(&recorder, 2).await;
    kernel.close().await;
}
