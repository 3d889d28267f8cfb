//! Origin/destination correlation for heading computation
//!
//! Correlates two position captures triggered by Microbit event codes:
//! the origin trigger captures a starting point, the destination trigger
//! captures the end point and produces a `HeadingResult`.
//!
//! State machine:
//! - `AwaitingOrigin` + origin trigger -> capture, `AwaitingDestination`
//! - `AwaitingDestination` + origin trigger -> recapture (overwrite origin)
//! - `AwaitingDestination` + destination trigger -> capture, emit, `AwaitingOrigin`
//! - `AwaitingOrigin` + destination trigger -> out of sequence, ignored
//!
//! A failed position request abandons that capture only; the state is kept.

use crate::domain::heading::HeadingResult;
use crate::domain::types::{EventCode, GeoPoint, Notification, TriggerKind, Triggers};
use crate::infra::metrics::Metrics;
use crate::io::position::{PositionError, PositionSource};
use crate::io::sink::ResultSink;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// Correlation cycle state
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CorrelationState {
    AwaitingOrigin,
    AwaitingDestination { origin: GeoPoint },
}

impl CorrelationState {
    pub fn as_str(&self) -> &str {
        match self {
            CorrelationState::AwaitingOrigin => "awaiting_origin",
            CorrelationState::AwaitingDestination { .. } => "awaiting_destination",
        }
    }

    pub fn origin(&self) -> Option<GeoPoint> {
        match self {
            CorrelationState::AwaitingOrigin => None,
            CorrelationState::AwaitingDestination { origin } => Some(*origin),
        }
    }
}

/// What handling a single event did
#[derive(Debug, Clone)]
pub enum EventOutcome {
    /// Origin stored, now awaiting destination
    OriginCaptured(GeoPoint),
    /// Origin trigger while awaiting destination replaced the stored origin
    OriginRecaptured { previous: GeoPoint, origin: GeoPoint },
    /// Destination captured and result delivered to the sink
    ResultEmitted(HeadingResult),
    /// Position request failed; state unchanged
    PositionUnavailable { trigger: TriggerKind, error: PositionError },
    /// Destination trigger with no origin captured
    OutOfSequence,
    /// Not a trigger code
    Ignored(EventCode),
    /// Notification too short to carry an event code
    Malformed,
}

impl EventOutcome {
    pub fn as_str(&self) -> &str {
        match self {
            EventOutcome::OriginCaptured(_) => "origin_captured",
            EventOutcome::OriginRecaptured { .. } => "origin_recaptured",
            EventOutcome::ResultEmitted(_) => "result_emitted",
            EventOutcome::PositionUnavailable { .. } => "position_unavailable",
            EventOutcome::OutOfSequence => "out_of_sequence",
            EventOutcome::Ignored(_) => "ignored",
            EventOutcome::Malformed => "malformed",
        }
    }
}

/// Owns the correlation state and drives the position source and result sink
pub struct EventCorrelator<P, S> {
    triggers: Triggers,
    state: CorrelationState,
    position_source: P,
    sink: S,
    metrics: Arc<Metrics>,
}

impl<P: PositionSource, S: ResultSink> EventCorrelator<P, S> {
    pub fn new(triggers: Triggers, position_source: P, sink: S, metrics: Arc<Metrics>) -> Self {
        Self { triggers, state: CorrelationState::AwaitingOrigin, position_source, sink, metrics }
    }

    pub fn state(&self) -> &CorrelationState {
        &self.state
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Consume notifications until the channel closes or shutdown is signalled.
    ///
    /// Each notification is handled to completion, including its position
    /// request, before the next one is received. Notifications arriving in the
    /// meantime wait in the channel and are handled in order.
    pub async fn run(
        &mut self,
        mut notification_rx: mpsc::Receiver<Notification>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!(state = %self.state.as_str(), "correlator_started");

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("correlator_shutdown");
                        break;
                    }
                }
                notification = notification_rx.recv() => {
                    match notification {
                        Some(n) => {
                            self.handle_notification(&n).await;
                        }
                        None => break,
                    }
                }
            }
        }

        info!(state = %self.state.as_str(), "correlator_stopped");
    }

    /// Extract the event code from a notification and handle it
    pub async fn handle_notification(&mut self, notification: &Notification) -> EventOutcome {
        let Some(code) = notification.event_code() else {
            self.metrics.record_malformed();
            debug!(len = notification.payload.len(), "notification_malformed");
            return EventOutcome::Malformed;
        };

        debug!(
            event_code = %code,
            queued_us = notification.received_at.elapsed().as_micros() as u64,
            "notification_received"
        );
        self.handle_event(code).await
    }

    /// Dispatch a single event code against the current state
    pub async fn handle_event(&mut self, code: EventCode) -> EventOutcome {
        self.metrics.record_event();

        match self.triggers.classify(code) {
            TriggerKind::Origin => self.on_origin_trigger().await,
            TriggerKind::Destination => self.on_destination_trigger().await,
            TriggerKind::Unrecognized => {
                self.metrics.record_ignored();
                debug!(event_code = %code, "event_ignored");
                EventOutcome::Ignored(code)
            }
        }
    }

    async fn on_origin_trigger(&mut self) -> EventOutcome {
        let point = match self.fetch_position(TriggerKind::Origin).await {
            Ok(point) => point,
            Err(outcome) => return outcome,
        };

        match self.state {
            CorrelationState::AwaitingOrigin => {
                self.state = CorrelationState::AwaitingDestination { origin: point };
                self.metrics.record_origin_captured();
                info!(lat = %point.latitude, lon = %point.longitude, "origin_captured");
                EventOutcome::OriginCaptured(point)
            }
            CorrelationState::AwaitingDestination { origin: previous } => {
                self.state = CorrelationState::AwaitingDestination { origin: point };
                self.metrics.record_origin_recaptured();
                info!(
                    lat = %point.latitude,
                    lon = %point.longitude,
                    previous = %previous,
                    "origin_recaptured"
                );
                EventOutcome::OriginRecaptured { previous, origin: point }
            }
        }
    }

    async fn on_destination_trigger(&mut self) -> EventOutcome {
        let CorrelationState::AwaitingDestination { origin } = self.state else {
            self.metrics.record_out_of_sequence();
            warn!("destination_out_of_sequence: no origin captured");
            return EventOutcome::OutOfSequence;
        };

        let destination = match self.fetch_position(TriggerKind::Destination).await {
            Ok(point) => point,
            Err(outcome) => return outcome,
        };

        let result = HeadingResult::compute(origin, destination);
        self.state = CorrelationState::AwaitingOrigin;

        info!(
            cycle_id = %result.cycle_id,
            origin = %origin,
            destination = %destination,
            distance_m = %format!("{:.2}", result.distance_m),
            bearing_deg = ?result.bearing_deg,
            heading = %result.heading_text(),
            "heading_result"
        );

        self.sink.emit(&result);
        self.metrics.record_result();
        EventOutcome::ResultEmitted(result)
    }

    /// Request a position, converting failure into the outcome to report
    async fn fetch_position(&self, trigger: TriggerKind) -> Result<GeoPoint, EventOutcome> {
        let start = Instant::now();
        let result = self.position_source.request_position().await;
        self.metrics.record_fetch_latency(start.elapsed().as_micros() as u64);

        result.map_err(|error| {
            self.metrics.record_position_failure();
            warn!(
                trigger = ?trigger,
                error = %error,
                state = %self.state.as_str(),
                "position_unavailable"
            );
            EventOutcome::PositionUnavailable { trigger, error }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::compass::CompassPoint;
    use crate::domain::types::{DESTINATION_TRIGGER, ORIGIN_TRIGGER};
    use crate::io::position::ScriptedPositionSource;
    use crate::io::sink::{create_result_channel, ChannelSink};
    use tokio::time::{timeout, Duration};

    const ORIGIN: EventCode = EventCode(ORIGIN_TRIGGER);
    const DESTINATION: EventCode = EventCode(DESTINATION_TRIGGER);

    type TestCorrelator = EventCorrelator<Arc<ScriptedPositionSource>, ChannelSink>;

    /// Test harness that keeps the result receiver alive
    struct Harness {
        correlator: TestCorrelator,
        source: Arc<ScriptedPositionSource>,
        results: mpsc::Receiver<HeadingResult>,
        metrics: Arc<Metrics>,
    }

    fn harness(script: Vec<Result<GeoPoint, PositionError>>) -> Harness {
        let source = Arc::new(ScriptedPositionSource::new(script));
        let (sink, results) = create_result_channel(16);
        let metrics = Arc::new(Metrics::new());
        let correlator =
            EventCorrelator::new(Triggers::default(), source.clone(), sink, metrics.clone());
        Harness { correlator, source, results, metrics }
    }

    fn notification(code: u16) -> Notification {
        let c = code.to_le_bytes();
        Notification::new(vec![0xB8, 0x22, c[0], c[1]])
    }

    #[tokio::test]
    async fn test_same_point_heads_nowhere() {
        let p = GeoPoint::new(10.0, 20.0);
        let mut h = harness(vec![Ok(p), Ok(p)]);

        assert!(matches!(h.correlator.handle_event(ORIGIN).await, EventOutcome::OriginCaptured(_)));
        let EventOutcome::ResultEmitted(result) = h.correlator.handle_event(DESTINATION).await else {
            panic!("expected result");
        };

        assert_eq!(result.distance_text(), "0.00 m");
        assert_eq!(result.heading_text(), "Heading to: nowhere");
        assert_eq!(h.correlator.state(), &CorrelationState::AwaitingOrigin);
        assert_eq!(h.results.try_recv().unwrap().cycle_id, result.cycle_id);
    }

    #[tokio::test]
    async fn test_one_degree_east() {
        let mut h = harness(vec![Ok(GeoPoint::new(0.0, 0.0)), Ok(GeoPoint::new(0.0, 1.0))]);

        h.correlator.handle_event(ORIGIN).await;
        let EventOutcome::ResultEmitted(result) = h.correlator.handle_event(DESTINATION).await else {
            panic!("expected result");
        };

        // Haversine with R = 6 371 000 m gives 111194.93 m for one degree
        assert!((result.distance_m - 111_195.08).abs() < 0.5);
        assert_eq!(result.distance_text(), "111194.93 m");
        assert_eq!(result.compass, Some(CompassPoint::E));
        assert_eq!(result.heading_text(), "Heading to: E east");
        assert_eq!(h.metrics.results_total(), 1);
    }

    #[tokio::test]
    async fn test_destination_without_origin_is_ignored() {
        let mut h = harness(vec![Ok(GeoPoint::new(1.0, 1.0))]);

        let outcome = h.correlator.handle_event(DESTINATION).await;

        assert!(matches!(outcome, EventOutcome::OutOfSequence));
        assert_eq!(h.correlator.state(), &CorrelationState::AwaitingOrigin);
        // Position source never consulted
        assert_eq!(h.source.requests(), 0);
        assert_eq!(h.metrics.out_of_sequence_total(), 1);
        assert!(h.results.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_destination_fix_failure_keeps_origin() {
        let origin = GeoPoint::new(5.0, 5.0);
        let mut h = harness(vec![Ok(origin), Err(PositionError::PositionUnavailable)]);

        h.correlator.handle_event(ORIGIN).await;
        let outcome = h.correlator.handle_event(DESTINATION).await;

        assert!(matches!(
            outcome,
            EventOutcome::PositionUnavailable {
                trigger: TriggerKind::Destination,
                error: PositionError::PositionUnavailable
            }
        ));
        assert_eq!(h.correlator.state(), &CorrelationState::AwaitingDestination { origin });
        assert_eq!(h.metrics.position_failures(), 1);
        assert!(h.results.try_recv().is_err());

        // A later destination fix completes the cycle with the preserved origin
        h.source.push(Ok(GeoPoint::new(6.0, 5.0)));
        let EventOutcome::ResultEmitted(result) = h.correlator.handle_event(DESTINATION).await else {
            panic!("expected result");
        };
        assert_eq!(result.origin, origin);
        assert_eq!(result.compass, Some(CompassPoint::N));
    }

    #[tokio::test]
    async fn test_origin_fix_failure_stays_awaiting_origin() {
        let mut h = harness(vec![Err(PositionError::PermissionDenied)]);

        let outcome = h.correlator.handle_event(ORIGIN).await;

        assert!(matches!(
            outcome,
            EventOutcome::PositionUnavailable { trigger: TriggerKind::Origin, .. }
        ));
        assert_eq!(h.correlator.state(), &CorrelationState::AwaitingOrigin);
    }

    #[tokio::test]
    async fn test_cycles_are_independent() {
        let mut h = harness(vec![
            Ok(GeoPoint::new(0.0, 0.0)),
            Ok(GeoPoint::new(0.0, 1.0)),
            Ok(GeoPoint::new(40.0, 40.0)),
            Ok(GeoPoint::new(39.0, 40.0)),
        ]);

        h.correlator.handle_event(ORIGIN).await;
        h.correlator.handle_event(DESTINATION).await;

        // Destination right after a completed cycle has no origin to pair with
        assert!(matches!(h.correlator.handle_event(DESTINATION).await, EventOutcome::OutOfSequence));

        h.correlator.handle_event(ORIGIN).await;
        let EventOutcome::ResultEmitted(second) = h.correlator.handle_event(DESTINATION).await else {
            panic!("expected result");
        };

        assert_eq!(second.origin, GeoPoint::new(40.0, 40.0));
        assert_eq!(second.compass, Some(CompassPoint::S));
        assert_eq!(h.results.try_recv().unwrap().compass, Some(CompassPoint::E));
        assert_eq!(h.results.try_recv().unwrap().compass, Some(CompassPoint::S));
    }

    #[tokio::test]
    async fn test_origin_recapture_overwrites_origin() {
        let first = GeoPoint::new(0.0, 0.0);
        let second = GeoPoint::new(0.0, 2.0);
        let mut h = harness(vec![Ok(first), Ok(second), Ok(GeoPoint::new(0.0, 1.0))]);

        h.correlator.handle_event(ORIGIN).await;
        let outcome = h.correlator.handle_event(ORIGIN).await;
        let EventOutcome::OriginRecaptured { previous, origin } = outcome else {
            panic!("expected recapture, got {}", outcome.as_str());
        };
        assert_eq!(previous, first);
        assert_eq!(origin, second);

        let EventOutcome::ResultEmitted(result) = h.correlator.handle_event(DESTINATION).await else {
            panic!("expected result");
        };
        assert_eq!(result.origin, second);
        assert_eq!(result.compass, Some(CompassPoint::W));
    }

    #[tokio::test]
    async fn test_failed_recapture_keeps_previous_origin() {
        let first = GeoPoint::new(1.0, 1.0);
        let mut h = harness(vec![Ok(first), Err(PositionError::Timeout)]);

        h.correlator.handle_event(ORIGIN).await;
        h.correlator.handle_event(ORIGIN).await;

        assert_eq!(h.correlator.state().origin(), Some(first));
    }

    #[tokio::test]
    async fn test_unrecognized_code_ignored() {
        let mut h = harness(vec![Ok(GeoPoint::new(1.0, 1.0))]);
        h.correlator.handle_event(ORIGIN).await;

        let outcome = h.correlator.handle_event(EventCode(1)).await;

        assert!(matches!(outcome, EventOutcome::Ignored(EventCode(1))));
        assert_eq!(h.correlator.state().origin(), Some(GeoPoint::new(1.0, 1.0)));
        assert_eq!(h.source.requests(), 1);
        assert_eq!(h.metrics.ignored_total(), 1);
    }

    #[tokio::test]
    async fn test_malformed_notification() {
        let mut h = harness(vec![]);
        let outcome = h.correlator.handle_notification(&Notification::new(vec![0xB8, 0x22])).await;
        assert!(matches!(outcome, EventOutcome::Malformed));
        assert_eq!(h.metrics.events_total(), 0);
    }

    #[tokio::test]
    async fn test_custom_triggers() {
        let source = Arc::new(ScriptedPositionSource::new([
            Ok(GeoPoint::new(0.0, 0.0)),
            Ok(GeoPoint::new(-1.0, 0.0)),
        ]));
        let (sink, _results) = create_result_channel(4);
        let triggers = Triggers { origin: EventCode(1), destination: EventCode(2) };
        let mut correlator =
            EventCorrelator::new(triggers, source, sink, Arc::new(Metrics::new()));

        assert!(matches!(correlator.handle_event(ORIGIN).await, EventOutcome::Ignored(_)));
        correlator.handle_event(EventCode(1)).await;
        let EventOutcome::ResultEmitted(result) = correlator.handle_event(EventCode(2)).await else {
            panic!("expected result");
        };
        assert_eq!(result.compass, Some(CompassPoint::S));
    }

    #[tokio::test]
    async fn test_run_processes_queued_notifications_in_order() {
        let mut h = harness(vec![Ok(GeoPoint::new(0.0, 0.0)), Ok(GeoPoint::new(0.0, 1.0))]);
        let (tx, rx) = mpsc::channel(8);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        // Destination first is out of sequence, then a full cycle
        tx.send(notification(DESTINATION_TRIGGER)).await.unwrap();
        tx.send(notification(ORIGIN_TRIGGER)).await.unwrap();
        tx.send(notification(7)).await.unwrap();
        tx.send(notification(DESTINATION_TRIGGER)).await.unwrap();
        drop(tx);

        timeout(Duration::from_secs(1), h.correlator.run(rx, shutdown_rx)).await.unwrap();

        let result = h.results.try_recv().unwrap();
        assert_eq!(result.heading_text(), "Heading to: E east");
        assert!(h.results.try_recv().is_err());
        assert_eq!(h.metrics.events_total(), 4);
        assert_eq!(h.metrics.out_of_sequence_total(), 1);
        assert_eq!(h.correlator.state(), &CorrelationState::AwaitingOrigin);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let mut h = harness(vec![]);
        let (_tx, rx) = mpsc::channel::<Notification>(8);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            h.correlator.run(rx, shutdown_rx).await;
        });
        shutdown_tx.send(true).unwrap();

        timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
    }
}
