//! Status reporting: one event per terminal outcome.

use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use boot_core::{StatusEvent, StatusSink};

use crate::observe::{Decision, Observer};

/// Appends status events. Sink failures are reported to the observer and
/// never reach the client.
#[derive(Clone)]
pub struct Reporter {
    sink: Arc<dyn StatusSink>,
    observer: Arc<dyn Observer>,
}

impl Reporter {
    pub fn new(sink: Arc<dyn StatusSink>, observer: Arc<dyn Observer>) -> Self {
        Self { sink, observer }
    }

    pub fn record(&self, node_id: &str, stage: &str, sent: &str, remote: IpAddr) {
        self.append(StatusEvent {
            node_id: node_id.to_string(),
            stage: stage.to_string(),
            sent: sent.to_string(),
            ipaddr: remote.to_string(),
            timestamp: 0,
        });
    }

    /// A pending success event, recorded when the receipt is committed.
    pub fn receipt(&self, node_id: &str, stage: &str, artifact: &str, remote: IpAddr) -> Receipt {
        Receipt {
            reporter: self.clone(),
            remote,
            event: Some(StatusEvent {
                node_id: node_id.to_string(),
                stage: stage.to_string(),
                sent: artifact.to_string(),
                ipaddr: remote.to_string(),
                timestamp: 0,
            }),
        }
    }

    fn append(&self, mut event: StatusEvent) {
        event.timestamp = now();
        if let Err(error) = self.sink.append(&event) {
            self.observer.observe(&Decision::StatusFailed {
                event: &event,
                error: &error,
            });
        }
    }
}

/// Success report for an in-flight delivery.
///
/// [`Receipt::commit`] records the event once the last byte has been handed
/// to the transport. Dropping an uncommitted receipt reports the abort and
/// records nothing.
pub struct Receipt {
    reporter: Reporter,
    remote: IpAddr,
    event: Option<StatusEvent>,
}

impl Receipt {
    pub fn commit(mut self) {
        if let Some(event) = self.event.take() {
            self.reporter.observer.observe(&Decision::Delivered {
                node: &event.node_id,
                stage: &event.stage,
                artifact: &event.sent,
                remote: self.remote,
            });
            self.reporter.append(event);
        }
    }
}

impl Drop for Receipt {
    fn drop(&mut self) {
        if let Some(event) = self.event.take() {
            self.reporter.observer.observe(&Decision::Aborted {
                node: &event.node_id,
                stage: &event.stage,
                artifact: &event.sent,
                remote: self.remote,
            });
        }
    }
}

impl fmt::Debug for Receipt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Receipt")
            .field("event", &self.event)
            .finish_non_exhaustive()
    }
}

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
