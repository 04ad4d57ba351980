//! Background thread that feeds an engine and flushes it periodically.

use std::sync::Arc;
use std::sync::mpsc::{RecvTimeoutError, Sender, channel};
use std::thread;
use std::time::{Duration, Instant};

use tokio::sync::oneshot;
use tracing::debug;

use crate::{Accumulator, AggregationEngine, Measurement};

enum QueueMessage {
    Measurement(Measurement),
    Flush(oneshot::Sender<()>),
}

/// Runs an [`AggregationEngine`] on a background thread.
///
/// Measurements sent to the worker are added on the thread. Every
/// `flush_interval` the engine is pushed into the accumulator and reset. A zero
/// `flush_interval` turns periodic flushing off, leaving only
/// [`FlushWorker::flush`]. The thread exits, after a final flush, once every
/// handle has been dropped.
///
/// ```
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// use rollup_aggregation::test_util::{TestAccumulator, test_accumulator};
/// use rollup_aggregation::{AggregationEngine, BucketingPolicy, FlushWorker, Measurement};
/// use std::sync::Arc;
/// use std::time::{Duration, SystemTime};
///
/// let TestAccumulator { inspector, accumulator } = test_accumulator();
/// let engine = Arc::new(AggregationEngine::new(100.0, vec![BucketingPolicy::new("service")]));
/// let worker = FlushWorker::new(engine, accumulator, Duration::from_secs(60));
///
/// worker.add(
///     Measurement::new("queue", SystemTime::now())
///         .with_tag("rollup", "gauge:*")
///         .with_tag("service", "billing")
///         .with_field("depth", 3u64),
/// );
/// worker.flush().await;
/// assert_eq!(inspector.points().len(), 1);
/// # }
/// ```
#[derive(Clone)]
pub struct FlushWorker {
    sender: Sender<QueueMessage>,
    _handle: Arc<thread::JoinHandle<()>>,
}

impl FlushWorker {
    /// Spawn the worker thread.
    pub fn new<A>(engine: Arc<AggregationEngine>, mut accumulator: A, flush_interval: Duration) -> Self
    where
        A: Accumulator + Send + 'static,
    {
        let (sender, receiver) = channel();

        let handle = thread::spawn(move || {
            let flush = |accumulator: &mut A| {
                engine.push(accumulator);
                engine.reset();
            };
            let mut next_flush =
                (!flush_interval.is_zero()).then(|| Instant::now() + flush_interval);
            loop {
                let message = match next_flush {
                    Some(deadline) => {
                        receiver.recv_timeout(deadline.saturating_duration_since(Instant::now()))
                    }
                    None => receiver.recv().map_err(|_| RecvTimeoutError::Disconnected),
                };
                match message {
                    Ok(QueueMessage::Measurement(measurement)) => {
                        engine.add(&measurement);
                    }
                    Ok(QueueMessage::Flush(sender)) => {
                        flush(&mut accumulator);
                        let _ = sender.send(());
                    }
                    Err(RecvTimeoutError::Timeout) => {
                        flush(&mut accumulator);
                        next_flush = Some(Instant::now() + flush_interval);
                    }
                    Err(RecvTimeoutError::Disconnected) => {
                        debug!("all worker handles dropped, flushing and exiting");
                        flush(&mut accumulator);
                        break;
                    }
                }
            }
        });

        Self {
            sender,
            _handle: Arc::new(handle),
        }
    }

    /// Queue a measurement to be aggregated.
    pub fn add(&self, measurement: Measurement) {
        let _ = self.sender.send(QueueMessage::Measurement(measurement));
    }

    /// Push and reset the engine now, after every measurement queued before
    /// this call has been added.
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        let _ = self.sender.send(QueueMessage::Flush(tx));
        // the worker only goes away when every handle, including this one, is dropped
        let _ = rx.await;
    }
}
