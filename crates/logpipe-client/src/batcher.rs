//! Background batching task.
//!
//! Exactly one batcher runs per client. It drains the event queue, flushes a
//! batch when it reaches the size threshold or when the flush interval
//! elapses, and hands each batch to every transport in order.

use std::sync::Arc;
use std::time::Duration;

use logpipe_events::LogEvent;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::DeliveryError;
use crate::stats::StatsCounters;
use crate::transport::Transport;

/// Tracing target for the local fallback sink.
pub const FALLBACK_TARGET: &str = "logpipe_client::fallback";

/// Requests sent to the batcher out of band.
#[derive(Debug)]
pub(crate) enum Control {
    /// Deliver everything queued so far, then acknowledge.
    Flush(oneshot::Sender<()>),
}

/// Outcome of closing a client.
#[derive(Debug, Default)]
pub struct CloseReport {
    /// Events delivered by the final draining flush.
    pub drained_events: usize,
    /// Transports that failed to close, with the error each reported.
    pub transport_errors: Vec<(String, DeliveryError)>,
}

impl CloseReport {
    /// Returns true if every transport closed cleanly.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.transport_errors.is_empty()
    }
}

pub(crate) struct Batcher {
    pub(crate) events: mpsc::Receiver<LogEvent>,
    pub(crate) control: mpsc::UnboundedReceiver<Control>,
    pub(crate) transports: Vec<Transport>,
    pub(crate) batch_size: usize,
    pub(crate) flush_interval: Duration,
    pub(crate) stats: Arc<StatsCounters>,
    pub(crate) cancel: CancellationToken,
}

impl Batcher {
    pub(crate) async fn run(mut self) -> CloseReport {
        let mut batch: Vec<LogEvent> = Vec::with_capacity(self.batch_size);
        let mut ticker = interval_at(Instant::now() + self.flush_interval, self.flush_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        debug!(
            batch_size = self.batch_size,
            flush_interval_ms = self.flush_interval.as_millis() as u64,
            transports = self.transports.len(),
            "batcher started"
        );

        loop {
            tokio::select! {
                biased;

                () = self.cancel.cancelled() => break,

                Some(control) = self.control.recv() => match control {
                    Control::Flush(ack) => {
                        while let Ok(event) = self.events.try_recv() {
                            batch.push(event);
                            if batch.len() >= self.batch_size {
                                self.flush(&mut batch).await;
                            }
                        }
                        self.flush(&mut batch).await;
                        ticker.reset();
                        // The caller may have stopped waiting.
                        let _ = ack.send(());
                    }
                },

                received = self.events.recv() => match received {
                    Some(event) => {
                        batch.push(event);
                        if batch.len() >= self.batch_size {
                            self.flush(&mut batch).await;
                            ticker.reset();
                        }
                    }
                    None => break,
                },

                _ = ticker.tick() => self.flush(&mut batch).await,
            }
        }

        self.shutdown(batch).await
    }

    /// Stops intake, drains whatever is queued, flushes once more, then
    /// closes every transport.
    async fn shutdown(mut self, mut batch: Vec<LogEvent>) -> CloseReport {
        self.events.close();
        while let Some(event) = self.events.recv().await {
            batch.push(event);
        }
        while let Ok(Control::Flush(ack)) = self.control.try_recv() {
            let _ = ack.send(());
        }

        let drained_events = batch.len();
        for chunk in batch.chunks(self.batch_size.max(1)) {
            self.deliver(chunk).await;
        }

        let mut transport_errors = Vec::new();
        for transport in &mut self.transports {
            if let Err(e) = transport.close().await {
                error!(
                    target: FALLBACK_TARGET,
                    transport = transport.name(),
                    error = %e,
                    "transport failed to close"
                );
                transport_errors.push((transport.name().to_string(), e));
            }
        }

        info!(drained_events, "log client closed");
        CloseReport {
            drained_events,
            transport_errors,
        }
    }

    async fn flush(&mut self, batch: &mut Vec<LogEvent>) {
        if batch.is_empty() {
            return;
        }
        let events = std::mem::replace(batch, Vec::with_capacity(self.batch_size));
        self.deliver(&events).await;
    }

    /// Hands one batch to every transport in turn.
    ///
    /// Failures are reported to the fallback sink and never retried here.
    async fn deliver(&mut self, batch: &[LogEvent]) {
        if batch.is_empty() {
            return;
        }
        let mut delivered = false;
        for transport in &mut self.transports {
            match transport.send(batch).await {
                Ok(()) => delivered = true,
                Err(e) => {
                    self.stats.record_failed_send();
                    warn!(
                        target: FALLBACK_TARGET,
                        transport = transport.name(),
                        batch_size = batch.len(),
                        first_event = %batch[0].id,
                        error = %e,
                        "batch delivery failed"
                    );
                }
            }
        }
        if delivered {
            self.stats.record_delivered(batch.len());
        }
    }
}
