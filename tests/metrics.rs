#![cfg(feature = "metrics")]
//! Tests for `streamwire` metrics helpers and [`MetricsProbe`].
//!
//! Counters and gauges are observed through
//! `metrics_util::debugging::DebuggingRecorder`.
use metrics::{SharedString, Unit};
use metrics_util::{
    CompositeKey,
    debugging::{DebugValue, DebuggingRecorder, Snapshotter},
};
use rstest::rstest;
use streamwire::{
    MetricsProbe,
    Probe,
    TransportError,
    metrics::{self as wire_metrics, Direction, ErrorKind},
};

fn debugging_recorder_setup() -> (Snapshotter, DebuggingRecorder) {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    (snapshotter, recorder)
}

type Recorded = Vec<(CompositeKey, Option<Unit>, Option<SharedString>, DebugValue)>;

fn counter_with_label(metrics: &Recorded, name: &str, label: (&str, &str)) -> u64 {
    metrics
        .iter()
        .filter(|(key, _, _, _)| {
            key.key().name() == name
                && key
                    .key()
                    .labels()
                    .any(|l| l.key() == label.0 && l.value() == label.1)
        })
        .map(|(_, _, _, value)| match value {
            DebugValue::Counter(c) => *c,
            _ => 0,
        })
        .sum()
}

#[rstest]
#[case(Direction::Outbound, "outbound")]
#[case(Direction::Inbound, "inbound")]
fn frame_metric_is_labelled_by_direction(#[case] direction: Direction, #[case] label: &str) {
    let (snapshotter, recorder) = debugging_recorder_setup();
    metrics::with_local_recorder(&recorder, || wire_metrics::inc_frames(direction));

    let metrics = snapshotter.snapshot().into_vec();
    assert_eq!(
        counter_with_label(&metrics, wire_metrics::FRAMES_PROCESSED, ("direction", label)),
        1
    );
}

#[test]
fn probe_publishes_byte_counts() {
    let (snapshotter, recorder) = debugging_recorder_setup();
    metrics::with_local_recorder(&recorder, || {
        let probe = MetricsProbe;
        probe.add_bytes_sent(16);
        probe.add_bytes_sent(4);
        probe.add_bytes_received(15);
    });

    let metrics = snapshotter.snapshot().into_vec();
    assert_eq!(
        counter_with_label(
            &metrics,
            wire_metrics::BYTES_TRANSFERRED,
            ("direction", "outbound")
        ),
        20
    );
    assert_eq!(
        counter_with_label(
            &metrics,
            wire_metrics::BYTES_TRANSFERRED,
            ("direction", "inbound")
        ),
        15
    );
}

#[test]
fn probe_errors_carry_their_kind() {
    let (snapshotter, recorder) = debugging_recorder_setup();
    metrics::with_local_recorder(&recorder, || {
        let probe = MetricsProbe;
        probe.header_corrupted();
        probe.server_correlation_error();
        probe.server_correlation_error();
        probe.read_dispatch_error(&TransportError::PeerClosed);
    });

    let metrics = snapshotter.snapshot().into_vec();
    let count = |kind: &str| counter_with_label(&metrics, wire_metrics::ERRORS_TOTAL, ("kind", kind));
    assert_eq!(count("header"), 1);
    assert_eq!(count("server_correlation"), 2);
    assert_eq!(count("read_dispatch"), 1);
    assert_eq!(count("connect"), 0);
}

#[test]
fn connection_gauge_tracks_open_sessions() {
    let (snapshotter, recorder) = debugging_recorder_setup();
    metrics::with_local_recorder(&recorder, || {
        let probe = MetricsProbe;
        probe.connection_established();
        probe.connection_established();
        probe.connection_closed();
    });

    let metrics = snapshotter.snapshot().into_vec();
    let gauge = metrics.iter().find_map(|(key, _, _, value)| {
        (key.key().name() == wire_metrics::CONNECTIONS_ACTIVE).then_some(value)
    });
    assert!(
        matches!(gauge, Some(DebugValue::Gauge(g)) if g.into_inner() == 1.0),
        "expected one open session, got {gauge:?}"
    );
}

#[test]
fn memory_waits_are_counted() {
    let (snapshotter, recorder) = debugging_recorder_setup();
    metrics::with_local_recorder(&recorder, || {
        MetricsProbe.waiting_for_available_memory();
        wire_metrics::inc_errors(ErrorKind::Connect);
    });

    let metrics = snapshotter.snapshot().into_vec();
    assert!(metrics.iter().any(|(key, _, _, value)| {
        key.key().name() == wire_metrics::MEMORY_WAITS
            && matches!(value, DebugValue::Counter(1))
    }));
    assert_eq!(
        counter_with_label(&metrics, wire_metrics::ERRORS_TOTAL, ("kind", "connect")),
        1
    );
}
