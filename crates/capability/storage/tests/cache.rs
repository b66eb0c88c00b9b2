use domain::{Quality, Reading};
use mbus_storage::{CacheConfig, ReadingCache};
use std::sync::Arc;
use std::time::Duration;

fn sample(device: &str, register: &str, ts_ms: i64, value: f64) -> Arc<Reading> {
    Arc::new(Reading {
        port: "p1".to_string(),
        device: device.to_string(),
        unit_address: 1,
        register: register.to_string(),
        ts_ms,
        value: Some(value),
        raw: vec![value as u16],
        unit: "V".to_string(),
        quality: Quality::Good,
        error: None,
    })
}

fn cache(max_entries: usize) -> ReadingCache {
    ReadingCache::new(CacheConfig {
        max_entries,
        stale_after: Some(Duration::from_secs(10)),
    })
}

#[test]
fn newer_reading_overwrites_same_key() {
    let cache = cache(10);
    cache.update(sample("meter", "voltage", 1_000, 230.0));
    cache.update(sample("meter", "voltage", 2_000, 231.0));

    let reading = cache.get_at("meter", "voltage", 2_500).expect("reading");
    assert_eq!(reading.value, Some(231.0));
    assert_eq!(reading.quality, Quality::Good);
    assert_eq!(cache.len(), 1);
}

#[test]
fn old_readings_are_reported_stale() {
    let cache = cache(10);
    cache.update(sample("meter", "voltage", 1_000, 230.0));

    assert_eq!(
        cache.get_at("meter", "voltage", 11_000).unwrap().quality,
        Quality::Good
    );
    assert_eq!(
        cache.get_at("meter", "voltage", 11_001).unwrap().quality,
        Quality::Stale
    );
}

#[test]
fn error_readings_stay_error_when_old() {
    let cache = cache(10);
    let mut failed = sample("meter", "voltage", 1_000, 0.0).as_ref().clone();
    failed.value = None;
    failed.quality = Quality::Error;
    cache.update(Arc::new(failed));

    let reading = cache.get_at("meter", "voltage", 100_000).unwrap();
    assert_eq!(reading.quality, Quality::Error);
}

#[test]
fn capacity_evicts_oldest_timestamp() {
    let cache = cache(2);
    cache.update(sample("meter", "a", 3_000, 1.0));
    cache.update(sample("meter", "b", 1_000, 2.0));
    assert!(cache.update(sample("meter", "c", 4_000, 3.0)));

    assert_eq!(cache.len(), 2);
    assert!(cache.get_at("meter", "b", 4_000).is_none());
    assert!(cache.get_at("meter", "a", 4_000).is_some());
}

#[test]
fn list_is_sorted_by_device_and_register() {
    let cache = cache(10);
    cache.update(sample("pump", "speed", 1_000, 1.0));
    cache.update(sample("meter", "voltage", 1_000, 2.0));
    cache.update(sample("meter", "current", 1_000, 3.0));

    let keys: Vec<(String, String)> = cache
        .list_at(1_000)
        .into_iter()
        .map(|reading| (reading.device, reading.register))
        .collect();
    assert_eq!(
        keys,
        vec![
            ("meter".to_string(), "current".to_string()),
            ("meter".to_string(), "voltage".to_string()),
            ("pump".to_string(), "speed".to_string()),
        ]
    );
    assert_eq!(cache.list_device("meter").len(), 2);
}
