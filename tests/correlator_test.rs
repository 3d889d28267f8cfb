//! End-to-end tests: feed listener -> correlator -> sinks

use microbit_heading::domain::types::{GeoPoint, Notification, Triggers};
use microbit_heading::domain::{CompassPoint, HeadingResult};
use microbit_heading::infra::Metrics;
use microbit_heading::io::gatt::{encode_client_event, CLIENT_EVENT_TYPE};
use microbit_heading::io::listener::serve;
use microbit_heading::io::{
    create_position_feed, create_result_channel, JsonlSink, PositionError, ResultSink,
};
use microbit_heading::services::{CorrelationState, EventCorrelator, EventOutcome};
use std::fs;
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep, timeout};

/// Microbit event notification carrying `code`
fn notification(code: u16) -> Notification {
    Notification::new(encode_client_event(CLIENT_EVENT_TYPE, code).to_vec())
}

#[tokio::test]
async fn test_latest_fix_source_full_cycle() {
    let (feed, source) = create_position_feed(Duration::ZERO);
    let (sink, mut results) = create_result_channel(4);
    let mut correlator =
        EventCorrelator::new(Triggers::default(), source, sink, Arc::new(Metrics::new()));

    // No fix yet: origin capture fails and the state is unchanged
    let outcome = correlator.handle_notification(&notification(88)).await;
    assert!(matches!(
        outcome,
        EventOutcome::PositionUnavailable { error: PositionError::NoFix, .. }
    ));
    assert_eq!(correlator.state(), &CorrelationState::AwaitingOrigin);

    feed.publish_fix(GeoPoint::new(0.0, 0.0));
    correlator.handle_notification(&notification(88)).await;

    // Fix lost before the destination press
    feed.publish_loss(PositionError::PermissionDenied);
    correlator.handle_notification(&notification(89)).await;
    assert_eq!(correlator.state().origin(), Some(GeoPoint::new(0.0, 0.0)));

    feed.publish_fix(GeoPoint::new(0.0, 1.0));
    correlator.handle_notification(&notification(89)).await;

    let result = results.try_recv().unwrap();
    assert_eq!(result.distance_text(), "111194.93 m");
    assert_eq!(result.heading_text(), "Heading to: E east");
    assert_eq!(correlator.state(), &CorrelationState::AwaitingOrigin);
}

#[tokio::test]
async fn test_results_written_to_every_sink() {
    let dir = tempdir().unwrap();
    let file_path = dir.path().join("headings.jsonl");
    let (channel_sink, mut results) = create_result_channel(4);
    let sinks: Vec<Box<dyn ResultSink>> =
        vec![Box::new(channel_sink), Box::new(JsonlSink::new(file_path.to_str().unwrap()))];

    let (feed, source) = create_position_feed(Duration::ZERO);
    let mut correlator =
        EventCorrelator::new(Triggers::default(), source, sinks, Arc::new(Metrics::new()));

    feed.publish_fix(GeoPoint::new(10.0, 20.0));
    correlator.handle_notification(&notification(88)).await;
    correlator.handle_notification(&notification(89)).await;

    let result: HeadingResult = results.try_recv().unwrap();
    assert_eq!(result.distance_text(), "0.00 m");
    assert_eq!(result.heading_text(), "Heading to: nowhere");

    let content = fs::read_to_string(&file_path).unwrap();
    let record: serde_json::Value = serde_json::from_str(content.trim()).unwrap();
    assert_eq!(record["cycle_id"], result.cycle_id);
    assert_eq!(record["distance"], "0.00 m");
    assert_eq!(record["heading"], "Heading to: nowhere");
}

#[tokio::test]
async fn test_feed_listener_drives_correlator() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let metrics = Arc::new(Metrics::new());
    let (notification_tx, notification_rx) = mpsc::channel(16);
    let (feed, source) = create_position_feed(Duration::ZERO);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (sink, mut results) = create_result_channel(4);

    let mut listener_shutdown = shutdown_rx.clone();
    let listener_metrics = metrics.clone();
    let server = tokio::spawn(async move {
        serve(listener, notification_tx, Arc::new(feed), listener_metrics, &mut listener_shutdown)
            .await;
    });

    let mut correlator = EventCorrelator::new(Triggers::default(), source, sink, metrics.clone());
    let correlator_task = tokio::spawn(async move {
        correlator.run(notification_rx, shutdown_rx).await;
        correlator
    });

    let mut client = TcpStream::connect(addr).await.unwrap();

    // Destination before any origin is ignored
    client.write_all(b"FIX 51.5000 -0.1200\nNOTIFY b8225900\nNOTIFY b8225800\n").await.unwrap();

    // Wait for the origin to be captured before moving the fix
    timeout(Duration::from_secs(2), async {
        while metrics.origins_captured() == 0 {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    client.write_all(b"FIX 51.5100 -0.1200\nNOTIFY b8225900\n").await.unwrap();

    let result = timeout(Duration::from_secs(2), results.recv()).await.unwrap().unwrap();
    assert_eq!(result.origin, GeoPoint::new(51.5, -0.12));
    assert_eq!(result.destination, GeoPoint::new(51.51, -0.12));
    assert_eq!(result.compass, Some(CompassPoint::N));
    assert_eq!(result.heading_text(), "Heading to: N north");
    assert!((result.distance_m - 1111.95).abs() < 0.01, "got {}", result.distance_m);
    assert_eq!(metrics.out_of_sequence_total(), 1);

    shutdown_tx.send(true).unwrap();
    let correlator = timeout(Duration::from_secs(1), correlator_task).await.unwrap().unwrap();
    assert_eq!(correlator.state(), &CorrelationState::AwaitingOrigin);
    timeout(Duration::from_secs(1), server).await.unwrap().unwrap();
}
