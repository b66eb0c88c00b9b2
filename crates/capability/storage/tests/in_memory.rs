use domain::{Quality, Reading};
use mbus_storage::{InMemoryReadingSink, NoopSink, ReadingSink};
use std::sync::Arc;

fn sample(register: &str, ts_ms: i64) -> Arc<Reading> {
    Arc::new(Reading {
        port: "p1".to_string(),
        device: "meter".to_string(),
        unit_address: 1,
        register: register.to_string(),
        ts_ms,
        value: Some(1.5),
        raw: vec![15],
        unit: "A".to_string(),
        quality: Quality::Good,
        error: None,
    })
}

#[tokio::test]
async fn batch_write_keeps_order() {
    let sink = InMemoryReadingSink::new();
    let batch = vec![sample("a", 1), sample("b", 2), sample("c", 3)];

    let written = sink.write_batch(&batch).await.expect("write");
    assert_eq!(written, 3);
    let registers: Vec<String> = sink
        .readings()
        .into_iter()
        .map(|reading| reading.register)
        .collect();
    assert_eq!(registers, vec!["a", "b", "c"]);
}

#[tokio::test]
async fn noop_sink_accepts_everything() {
    let sink = NoopSink;
    assert_eq!(sink.write_batch(&[sample("a", 1)]).await.unwrap(), 1);
    assert_eq!(sink.name(), "noop");
}
