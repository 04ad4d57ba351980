use std::sync::Arc;
use std::time::{Duration, UNIX_EPOCH};

use assert2::check;
use rollup_aggregation::test_util::{TestAccumulator, test_accumulator};
use rollup_aggregation::{AggregationEngine, BucketingPolicy, FlushWorker, Measurement};

fn engine() -> Arc<AggregationEngine> {
    Arc::new(AggregationEngine::new(
        100.0,
        vec![BucketingPolicy::new("service").with_atom_replacement("host")],
    ))
}

fn latency(service: &str, value: f64) -> Measurement {
    Measurement::new("http", UNIX_EPOCH + Duration::from_secs(600))
        .with_tag("rollup", "timer:*")
        .with_tag("service", service)
        .with_tag("host", "web-1")
        .with_field("latency", value)
}

#[tokio::test]
async fn flush_resets_the_engine() {
    let TestAccumulator {
        inspector,
        accumulator,
    } = test_accumulator();
    let engine = engine();
    let worker = FlushWorker::new(engine.clone(), accumulator, Duration::from_secs(3600));

    for value in [1.0, 2.0, 3.0] {
        worker.add(latency("checkout", value));
    }
    worker.add(latency("search", 4.0));
    worker.flush().await;

    check!(inspector.points().len() == 2);
    check!(engine.is_empty());

    worker.flush().await;
    check!(inspector.points().len() == 2);
}

#[tokio::test]
async fn handles_share_one_engine() {
    let TestAccumulator {
        inspector,
        accumulator,
    } = test_accumulator();
    let worker = FlushWorker::new(engine(), accumulator, Duration::from_secs(3600));

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let worker = worker.clone();
            tokio::task::spawn_blocking(move || {
                for _ in 0..25 {
                    worker.add(latency("checkout", i as f64));
                }
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap();
    }
    worker.flush().await;

    let points = inspector.points();
    check!(points.len() == 1);
    let bytes = points[0].fields["centroids"].as_bytes().unwrap();
    check!(rollup_tdigest::TDigest::decode(bytes).unwrap().count() == 100.0);
}

#[tokio::test]
async fn flushes_on_interval() {
    let TestAccumulator {
        inspector,
        accumulator,
    } = test_accumulator();
    let worker = FlushWorker::new(engine(), accumulator, Duration::from_millis(20));

    worker.add(latency("checkout", 1.0));
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while inspector.points().is_empty() && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check!(inspector.points().len() == 1);
}

#[tokio::test]
async fn zero_interval_only_flushes_on_request() {
    let TestAccumulator {
        inspector,
        accumulator,
    } = test_accumulator();
    let engine = engine();
    let worker = FlushWorker::new(engine.clone(), accumulator, Duration::ZERO);

    worker.add(latency("checkout", 1.0));
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while engine.is_empty() && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    tokio::time::sleep(Duration::from_millis(50)).await;
    check!(inspector.points().is_empty());
    check!(!engine.is_empty());

    worker.flush().await;
    check!(inspector.points().len() == 1);
    check!(engine.is_empty());
}

#[test]
fn dropping_every_handle_flushes() {
    let TestAccumulator {
        inspector,
        accumulator,
    } = test_accumulator();
    let worker = FlushWorker::new(engine(), accumulator, Duration::from_secs(3600));
    worker.add(latency("checkout", 1.0));
    drop(worker);

    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while inspector.points().is_empty() && std::time::Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(10));
    }
    check!(inspector.points().len() == 1);
}
