//! Progress bus: per-job fan-out of pipeline events to subscribers.
//!
//! Producers publish through a per-job broadcast channel and never block; a
//! subscriber that cannot keep up loses the oldest buffered events and
//! observes a [`JobEvent::Dropped`] sentinel in their place, while other
//! subscribers are unaffected. Terminal events are retained so a subscriber
//! arriving within the grace window still sees the outcome.

use std::time::Duration;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;
use utoipa::ToSchema;

use crate::job::{JobError, JobLogEntry, JobProgress};

/// Minimum per-subscriber buffer depth.
pub const MIN_BUS_CAPACITY: usize = 64;

/// Default grace window during which terminal events stay available.
pub const DEFAULT_GRACE_WINDOW: Duration = Duration::from_secs(5);

/// An event on a job's progress stream.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum JobEvent {
    Progress(JobProgress),
    Log(JobLogEntry),
    Error(JobError),
    Complete { output_file: String, elapsed_ms: u64 },
    /// Bus sentinel: `count` events were dropped for this subscriber.
    Dropped { count: u64 },
}

impl JobEvent {
    /// SSE event name for this variant.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Progress(_) => "progress",
            Self::Log(_) => "log",
            Self::Error(_) => "error",
            Self::Complete { .. } => "complete",
            Self::Dropped { .. } => "dropped",
        }
    }

    /// Terminal events end the stream (after the grace window).
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Error(_) | Self::Complete { .. })
    }
}

struct JobChannel {
    tx: broadcast::Sender<JobEvent>,
    /// Retained terminal event for late subscribers.
    terminal: Option<JobEvent>,
}

/// Per-job event fan-out.
pub struct ProgressBus {
    channels: DashMap<String, JobChannel>,
    capacity: usize,
}

impl Default for ProgressBus {
    fn default() -> Self {
        Self::new(MIN_BUS_CAPACITY)
    }
}

impl ProgressBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: DashMap::new(),
            capacity: capacity.max(MIN_BUS_CAPACITY),
        }
    }

    /// Publish an event. Never blocks; events go to current subscribers only
    /// (plus terminal-event retention for late arrivals).
    pub fn publish(&self, job_id: &str, event: JobEvent) {
        let mut channel = self
            .channels
            .entry(job_id.to_string())
            .or_insert_with(|| JobChannel {
                tx: broadcast::Sender::new(self.capacity),
                terminal: None,
            });
        if event.is_terminal() {
            channel.terminal = Some(event.clone());
        }
        // Send errors only mean there is no subscriber right now.
        let _ = channel.tx.send(event);
    }

    /// Open a new delivery stream for a job.
    ///
    /// The stream yields every event published after this call, plus the
    /// retained terminal event when the job already finished.
    pub fn subscribe(&self, job_id: &str) -> EventStream {
        let channel = self
            .channels
            .entry(job_id.to_string())
            .or_insert_with(|| JobChannel {
                tx: broadcast::Sender::new(self.capacity),
                terminal: None,
            });
        EventStream {
            rx: channel.tx.subscribe(),
            pending_terminal: channel.terminal.clone(),
            seen_terminal: false,
        }
    }

    /// Number of live subscribers for a job.
    pub fn subscriber_count(&self, job_id: &str) -> usize {
        self.channels
            .get(job_id)
            .map(|c| c.tx.receiver_count())
            .unwrap_or(0)
    }

    /// Drop the job's channel, ending every subscriber's stream once their
    /// buffered events are drained.
    pub fn close_job(&self, job_id: &str) {
        if self.channels.remove(job_id).is_some() {
            debug!(job_id, "Closed event channel");
        }
    }

    /// Close the job's channel after `grace` has elapsed.
    pub fn schedule_close(self: &std::sync::Arc<Self>, job_id: &str, grace: Duration) {
        let bus = self.clone();
        let job_id = job_id.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            bus.close_job(&job_id);
        });
    }
}

/// A subscriber's view of one job's event stream.
pub struct EventStream {
    rx: broadcast::Receiver<JobEvent>,
    pending_terminal: Option<JobEvent>,
    seen_terminal: bool,
}

impl EventStream {
    /// Receive the next event; `None` once the channel is closed and drained.
    ///
    /// Buffer overruns surface as [`JobEvent::Dropped`] carrying the number
    /// of events this subscriber missed.
    pub async fn recv(&mut self) -> Option<JobEvent> {
        if let Some(event) = self.pending_terminal.take() {
            self.seen_terminal = true;
            return Some(event);
        }
        loop {
            match self.rx.recv().await {
                Ok(event) => {
                    if event.is_terminal() {
                        if self.seen_terminal {
                            // Already delivered via the retained copy.
                            continue;
                        }
                        self.seen_terminal = true;
                    }
                    return Some(event);
                }
                Err(broadcast::error::RecvError::Lagged(count)) => {
                    return Some(JobEvent::Dropped { count });
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking receive for polling contexts.
    pub fn try_recv(&mut self) -> Option<JobEvent> {
        if let Some(event) = self.pending_terminal.take() {
            self.seen_terminal = true;
            return Some(event);
        }
        match self.rx.try_recv() {
            Ok(event) => {
                if event.is_terminal() && self.seen_terminal {
                    return self.try_recv();
                }
                if event.is_terminal() {
                    self.seen_terminal = true;
                }
                Some(event)
            }
            Err(broadcast::error::TryRecvError::Lagged(count)) => {
                Some(JobEvent::Dropped { count })
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{ErrorCode, Stage};
    use std::sync::Arc;

    fn progress_event(percent: f32) -> JobEvent {
        let mut progress = JobProgress::initial();
        progress.overall_percent = percent;
        JobEvent::Progress(progress)
    }

    #[tokio::test]
    async fn subscribers_see_events_in_publish_order() {
        let bus = ProgressBus::default();
        let mut a = bus.subscribe("job-1");
        let mut b = bus.subscribe("job-1");

        for i in 0..5 {
            bus.publish("job-1", progress_event(i as f32));
        }

        for sub in [&mut a, &mut b] {
            for i in 0..5 {
                match sub.recv().await.unwrap() {
                    JobEvent::Progress(p) => assert_eq!(p.overall_percent, i as f32),
                    other => panic!("unexpected event {other:?}"),
                }
            }
        }
    }

    #[tokio::test]
    async fn events_published_before_subscription_are_not_delivered() {
        let bus = ProgressBus::default();
        bus.publish("job-1", progress_event(1.0));
        let mut sub = bus.subscribe("job-1");
        bus.publish("job-1", progress_event(2.0));

        match sub.recv().await.unwrap() {
            JobEvent::Progress(p) => assert_eq!(p.overall_percent, 2.0),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn slow_subscriber_gets_dropped_sentinel_and_fast_one_everything() {
        let bus = ProgressBus::new(MIN_BUS_CAPACITY);
        let mut slow = bus.subscribe("job-1");
        let mut fast = bus.subscribe("job-1");

        let published = MIN_BUS_CAPACITY + 10;
        for i in 0..published {
            bus.publish("job-1", progress_event(i as f32));
            // The fast subscriber keeps up.
            assert!(matches!(fast.recv().await, Some(JobEvent::Progress(_))));
        }

        // The slow subscriber lost the oldest events, and learns how many.
        match slow.recv().await.unwrap() {
            JobEvent::Dropped { count } => assert_eq!(count as usize, published - MIN_BUS_CAPACITY),
            other => panic!("expected Dropped, got {other:?}"),
        }
        let mut received = 0;
        while let Some(event) = slow.try_recv() {
            assert!(matches!(event, JobEvent::Progress(_)));
            received += 1;
        }
        assert_eq!(received, MIN_BUS_CAPACITY);
    }

    #[tokio::test]
    async fn late_subscriber_receives_retained_terminal_event() {
        let bus = ProgressBus::default();
        bus.publish(
            "job-1",
            JobEvent::Complete { output_file: "/out.mp4".into(), elapsed_ms: 1234 },
        );

        let mut late = bus.subscribe("job-1");
        match late.recv().await.unwrap() {
            JobEvent::Complete { output_file, .. } => assert_eq!(output_file, "/out.mp4"),
            other => panic!("expected Complete, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn close_ends_streams_after_draining() {
        let bus = ProgressBus::default();
        let mut sub = bus.subscribe("job-1");
        bus.publish("job-1", progress_event(1.0));
        bus.close_job("job-1");

        assert!(matches!(sub.recv().await, Some(JobEvent::Progress(_))));
        assert!(sub.recv().await.is_none());
    }

    #[tokio::test]
    async fn scheduled_close_fires_after_grace() {
        let bus = Arc::new(ProgressBus::default());
        let mut sub = bus.subscribe("job-1");
        bus.schedule_close("job-1", Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(sub.recv().await.is_none());
    }

    #[test]
    fn event_names_match_wire_contract() {
        assert_eq!(progress_event(0.0).name(), "progress");
        assert_eq!(
            JobEvent::Log(JobLogEntry::info(Stage::Dubbing, "x")).name(),
            "log"
        );
        assert_eq!(
            JobEvent::Error(crate::job::JobError::new(
                ErrorCode::DubbingFailed,
                Stage::Dubbing,
                "x"
            ))
            .name(),
            "error"
        );
        assert_eq!(
            JobEvent::Complete { output_file: String::new(), elapsed_ms: 0 }.name(),
            "complete"
        );
        assert_eq!(JobEvent::Dropped { count: 3 }.name(), "dropped");
    }

    #[test]
    fn events_serialize_tagged() {
        let json = serde_json::to_value(JobEvent::Dropped { count: 2 }).unwrap();
        assert_eq!(json["type"], "dropped");
        assert_eq!(json["count"], 2);
    }
}
