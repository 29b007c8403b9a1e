//! Completion-driven telemetry loop.
//!
//! Sends a fixed number of messages, one per iteration, then keeps pumping
//! the client until every message has been confirmed. Each iteration calls
//! [`DeviceClient::do_work`] and then sleeps for the poll interval. The loop
//! is bounded by a timeout and stops early when its cancellation token fires;
//! both also interrupt a `do_work` call that is stuck in the transport.

use std::fmt;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::device_client::DeviceClient;
use crate::client::message::{Confirmation, Message};
use crate::utils::error::{ClientError, ClientResult};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1);
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Sending,
    WaitingForConfirmations,
    Done,
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Sending => "sending",
            Self::WaitingForConfirmations => "waiting_for_confirmations",
            Self::Done => "done",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TelemetryReport {
    pub sent: usize,
    /// Every confirmation received, successful or not.
    pub confirmed: usize,
    /// Confirmations that carried a failure result.
    pub failures: Vec<Confirmation>,
    pub iterations: usize,
}

impl TelemetryReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty() && self.confirmed >= self.sent
    }
}

#[derive(Debug, Clone)]
pub struct TelemetryLoop {
    pub message_count: usize,
    pub poll_interval: Duration,
    pub timeout: Duration,
}

impl TelemetryLoop {
    pub fn new(message_count: usize) -> Self {
        Self {
            message_count,
            poll_interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run the loop to completion. `make_message` is called with the
    /// zero-based index of each message right before it is sent.
    pub async fn run<F>(
        &self,
        client: &mut DeviceClient,
        mut make_message: F,
        cancel: &CancellationToken,
    ) -> ClientResult<TelemetryReport>
    where
        F: FnMut(usize) -> Message,
    {
        let started = Instant::now();
        let deadline = started + self.timeout;
        let total = self.message_count;
        let mut report = TelemetryReport::default();
        let mut state = if total == 0 {
            LoopState::Done
        } else {
            LoopState::Sending
        };

        while state != LoopState::Done {
            if cancel.is_cancelled() {
                return Err(ClientError::Cancelled);
            }
            if Instant::now() >= deadline {
                return Err(timed_out(started, &report, state));
            }

            if state == LoopState::Sending {
                let message = make_message(report.sent);
                info!("Sending message {} of {}", report.sent + 1, total);
                client.send_event_async(&message)?;
                report.sent += 1;
                if report.sent == total {
                    state = transition(state, LoopState::WaitingForConfirmations);
                }
            }

            let confirmations = tokio::select! {
                _ = cancel.cancelled() => return Err(ClientError::Cancelled),
                _ = tokio::time::sleep_until(deadline) => {
                    return Err(timed_out(started, &report, state));
                }
                work = client.do_work() => work?,
            };

            for confirmation in confirmations {
                report.confirmed += 1;
                if confirmation.result.is_ok() {
                    info!(
                        "Confirmation received for message {} with result {}",
                        confirmation.tracking_id, confirmation.result
                    );
                } else {
                    warn!(
                        "Message {} failed with result {}",
                        confirmation.tracking_id, confirmation.result
                    );
                    report.failures.push(confirmation);
                }
            }
            report.iterations += 1;

            if state == LoopState::WaitingForConfirmations && report.confirmed >= total {
                state = transition(state, LoopState::Done);
                continue;
            }

            tokio::select! {
                _ = cancel.cancelled() => return Err(ClientError::Cancelled),
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }

        Ok(report)
    }
}

fn timed_out(started: Instant, report: &TelemetryReport, state: LoopState) -> ClientError {
    warn!(
        sent = report.sent,
        confirmed = report.confirmed,
        %state,
        "telemetry loop timed out"
    );
    ClientError::Timeout {
        elapsed: started.elapsed(),
        sent: report.sent,
        confirmed: report.confirmed,
    }
}

fn transition(from: LoopState, to: LoopState) -> LoopState {
    debug!(%from, %to, "telemetry loop transition");
    to
}
