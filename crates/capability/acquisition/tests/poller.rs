mod common;

use common::{Script, device, holding, port, register};
use domain::{DataType, Quality, RegisterRegion};
use mbus_acquisition::DevicePoller;
use mbus_protocol::TransportError;
use std::sync::Arc;
use std::time::Duration;

const INTERVAL: Duration = Duration::from_secs(1);

#[tokio::test]
async fn single_register_failure_is_isolated() {
    let script = Script::new();
    script.set_word(1, 0, 10);
    script.set_word(1, 2, 30);
    script.push(1, 1, Err(TransportError::Exception("IllegalDataAddress".to_string())));

    let meter = device(
        "meter",
        1,
        INTERVAL,
        vec![holding("a", 0), holding("b", 1), holding("c", 2)],
    );
    let poller = DevicePoller::new(Arc::new(port("p1", vec![meter.clone()])));
    let mut transport = script.transport();

    let outcome = poller.poll(&mut transport, &meter).await;
    let qualities: Vec<Quality> = outcome.readings.iter().map(|r| r.quality).collect();
    assert_eq!(qualities, vec![Quality::Good, Quality::Error, Quality::Good]);
    assert_eq!(outcome.readings[0].value, Some(10.0));
    assert_eq!(outcome.readings[1].value, None);
    assert_eq!(outcome.readings[2].value, Some(30.0));
    assert!(!outcome.link_down);
    assert!(outcome.responded);
    // 异常应答不重试
    assert_eq!(script.calls().len(), 3);
}

#[tokio::test]
async fn timeouts_are_retried_up_to_limit() {
    let script = Script::new();
    script.set_word(1, 0, 5);
    script.push(1, 0, Err(TransportError::Timeout(Duration::from_millis(200))));
    script.push(1, 0, Err(TransportError::Timeout(Duration::from_millis(200))));

    let meter = device("meter", 1, INTERVAL, vec![holding("a", 0)]);
    let mut config = port("p1", vec![meter.clone()]);
    config.max_retries = 2;
    let poller = DevicePoller::new(Arc::new(config));

    let outcome = poller.poll(&mut script.transport(), &meter).await;
    assert_eq!(outcome.readings[0].quality, Quality::Good);
    assert_eq!(outcome.readings[0].value, Some(5.0));
    assert_eq!(script.calls().len(), 3);
}

#[tokio::test]
async fn exhausted_retries_produce_one_error_reading() {
    let script = Script::new();
    for _ in 0..3 {
        script.push(1, 0, Err(TransportError::Protocol("crc mismatch".to_string())));
    }

    let meter = device("meter", 1, INTERVAL, vec![holding("a", 0), holding("b", 1)]);
    let mut config = port("p1", vec![meter.clone()]);
    config.max_retries = 1;
    let poller = DevicePoller::new(Arc::new(config));

    let outcome = poller.poll(&mut script.transport(), &meter).await;
    assert_eq!(outcome.readings.len(), 2);
    assert_eq!(outcome.readings[0].quality, Quality::Error);
    assert!(
        outcome.readings[0]
            .error
            .as_deref()
            .is_some_and(|error| error.contains("crc"))
    );
    assert_eq!(outcome.readings[1].quality, Quality::Good);
    // 两次尝试 + 下一个寄存器一次
    assert_eq!(script.calls().len(), 3);
    assert!(!outcome.link_down);
}

#[tokio::test]
async fn link_down_fails_remaining_registers_without_requests() {
    let script = Script::new();
    script.push(1, 1, Err(TransportError::LinkDown("connection reset".to_string())));

    let meter = device(
        "meter",
        1,
        INTERVAL,
        vec![holding("a", 0), holding("b", 1), holding("c", 2)],
    );
    let mut config = port("p1", vec![meter.clone()]);
    config.max_retries = 3;
    let poller = DevicePoller::new(Arc::new(config));

    let outcome = poller.poll(&mut script.transport(), &meter).await;
    let qualities: Vec<Quality> = outcome.readings.iter().map(|r| r.quality).collect();
    assert_eq!(qualities, vec![Quality::Good, Quality::Error, Quality::Error]);
    assert!(outcome.link_down);
    assert_eq!(script.calls().len(), 2);
}

#[tokio::test]
async fn decode_error_keeps_raw_words() {
    let script = Script::new();
    script.push(1, 0, Ok(vec![0x0001]));

    let meter = device(
        "meter",
        1,
        INTERVAL,
        vec![register("energy", RegisterRegion::Input, 0, DataType::Uint32)],
    );
    let poller = DevicePoller::new(Arc::new(port("p1", vec![meter.clone()])));

    let outcome = poller.poll(&mut script.transport(), &meter).await;
    let reading = &outcome.readings[0];
    assert_eq!(reading.quality, Quality::Error);
    assert_eq!(reading.raw, vec![0x0001]);
    assert!(outcome.responded);
}

#[tokio::test]
async fn coalesced_block_is_split_per_register() {
    let script = Script::new();
    script.set_word(1, 0, 250);
    script.set_word(1, 1, 0x0000);
    script.set_word(1, 2, 0x03E8);

    let mut voltage = holding("voltage", 0);
    voltage.scale = 0.1;
    let mut energy = register("energy", RegisterRegion::Holding, 1, DataType::Int32);
    energy.scale = 0.01;
    let meter = device("meter", 1, INTERVAL, vec![voltage, energy]);
    let mut config = port("p1", vec![meter.clone()]);
    config.coalesce_reads = true;
    let poller = DevicePoller::new(Arc::new(config));

    let outcome = poller.poll(&mut script.transport(), &meter).await;
    let calls = script.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!((calls[0].start, calls[0].count), (0, 3));
    assert_eq!(outcome.readings[0].value, Some(25.0));
    assert_eq!(outcome.readings[1].value, Some(10.0));
    assert_eq!(outcome.readings[1].raw, vec![0x0000, 0x03E8]);
}

#[tokio::test]
async fn failed_block_falls_back_to_single_reads() {
    let script = Script::new();
    script.set_word(1, 0, 1);
    script.set_word(1, 1, 2);
    script.push(1, 0, Err(TransportError::Exception("IllegalDataAddress".to_string())));

    let meter = device("meter", 1, INTERVAL, vec![holding("a", 0), holding("b", 1)]);
    let mut config = port("p1", vec![meter.clone()]);
    config.coalesce_reads = true;
    let poller = DevicePoller::new(Arc::new(config));

    let outcome = poller.poll(&mut script.transport(), &meter).await;
    let spans: Vec<(u16, u16)> = script
        .calls()
        .iter()
        .map(|call| (call.start, call.count))
        .collect();
    assert_eq!(spans, vec![(0, 2), (0, 1), (1, 1)]);
    assert!(outcome.readings.iter().all(|reading| reading.is_good()));
}

#[tokio::test]
async fn coils_decode_as_bool() {
    let script = Script::new();
    script.set_word(4, 7, 1);

    let meter = device(
        "relay",
        4,
        INTERVAL,
        vec![register("run", RegisterRegion::Coil, 7, DataType::Bool)],
    );
    let poller = DevicePoller::new(Arc::new(port("p1", vec![meter.clone()])));

    let outcome = poller.poll(&mut script.transport(), &meter).await;
    assert_eq!(outcome.readings[0].value, Some(1.0));
    assert_eq!(outcome.readings[0].unit_address, 4);
    assert_eq!(script.calls()[0].region, RegisterRegion::Coil);
}
