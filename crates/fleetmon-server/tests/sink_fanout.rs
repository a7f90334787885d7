//! Fan-out semantics: every sink runs, failures never fail the payload.

use async_trait::async_trait;
use fleetmon_common::proto::metric as pb;
use fleetmon_server::sink::{MetricSink, SinkError, SinkManager};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

struct RecordingSink {
    name: &'static str,
    stores: Arc<AtomicUsize>,
    fail: bool,
    delay: Duration,
}

#[async_trait]
impl MetricSink for RecordingSink {
    fn name(&self) -> &'static str {
        self.name
    }

    fn format(&self, _payload: &pb::MetricsPayload, timestamp_ms: i64) -> Vec<String> {
        vec![format!("{}_metric{{}} 1 {timestamp_ms}\n", self.name)]
    }

    async fn store(&self, _lines: Vec<String>) -> Result<(), SinkError> {
        tokio::time::sleep(self.delay).await;
        self.stores.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            Err(SinkError::RetriesExhausted {
                family: self.name,
                attempts: 3,
                last_error: "stub failure".to_string(),
            })
        } else {
            Ok(())
        }
    }
}

fn payload() -> pb::MetricsPayload {
    pb::MetricsPayload {
        timestamp: Some(prost_types::Timestamp {
            seconds: 1_700_000_000,
            nanos: 0,
        }),
        ..Default::default()
    }
}

#[tokio::test]
async fn fanout_returns_success_even_when_a_sink_fails() {
    let healthy = Arc::new(AtomicUsize::new(0));
    let broken = Arc::new(AtomicUsize::new(0));

    let manager = SinkManager::with_sinks(vec![
        Arc::new(RecordingSink {
            name: "healthy",
            stores: healthy.clone(),
            fail: false,
            delay: Duration::ZERO,
        }),
        Arc::new(RecordingSink {
            name: "broken",
            stores: broken.clone(),
            fail: true,
            delay: Duration::ZERO,
        }),
    ]);

    manager
        .store_all(&payload())
        .await
        .expect("per-sink failures must not surface");

    assert_eq!(healthy.load(Ordering::SeqCst), 1);
    assert_eq!(broken.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn fanout_waits_for_slow_siblings() {
    let fast = Arc::new(AtomicUsize::new(0));
    let slow = Arc::new(AtomicUsize::new(0));

    let manager = SinkManager::with_sinks(vec![
        Arc::new(RecordingSink {
            name: "fast",
            stores: fast.clone(),
            fail: true,
            delay: Duration::ZERO,
        }),
        Arc::new(RecordingSink {
            name: "slow",
            stores: slow.clone(),
            fail: false,
            delay: Duration::from_millis(150),
        }),
    ]);

    manager.store_all(&payload()).await.unwrap();

    // A sibling's failure must not cancel the slower sink.
    assert_eq!(fast.load(Ordering::SeqCst), 1);
    assert_eq!(slow.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn fanout_runs_sinks_concurrently() {
    let stores = Arc::new(AtomicUsize::new(0));
    let sinks: Vec<Arc<dyn MetricSink>> = (0..4)
        .map(|_| {
            Arc::new(RecordingSink {
                name: "timed",
                stores: stores.clone(),
                fail: false,
                delay: Duration::from_millis(100),
            }) as Arc<dyn MetricSink>
        })
        .collect();
    let manager = SinkManager::with_sinks(sinks);

    let started = tokio::time::Instant::now();
    manager.store_all(&payload()).await.unwrap();

    assert_eq!(stores.load(Ordering::SeqCst), 4);
    // Four 100ms sinks in parallel should finish well under the serial sum.
    assert!(started.elapsed() < Duration::from_millis(350));
}
