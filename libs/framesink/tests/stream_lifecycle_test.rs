// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Stream lifecycle integration tests
//!
//! Drives a `VideoSink` through its public surface: the operation legality
//! matrix, event ordering, and marker completion under flush.

use std::sync::Arc;
use std::time::{Duration, Instant};

use framesink::serde_json::json;
use framesink::{
    FrameRate, GpuDevice, InputSample, MarkerStatus, MarkerType, MediaType, SinkConfig, SoftwareDevice,
    StartPosition, StateMachine, StreamController, StreamError, StreamEvent, StreamOperation,
    StreamState, TextureDescriptor, TextureFormat, TypeNegotiator, VideoSink, VideoSubtype,
};

const FRAME_NS: i64 = 33_333_333;

fn new_sink() -> (VideoSink, Arc<SoftwareDevice>) {
    let device = Arc::new(SoftwareDevice::new());
    let sink = VideoSink::new(device.clone(), SinkConfig::default()).unwrap();
    (sink, device)
}

fn nv12() -> MediaType {
    MediaType::video(VideoSubtype::Nv12, 64, 32).with_frame_rate(FrameRate::new(30, 1))
}

fn input(device: &SoftwareDevice, time: i64) -> InputSample {
    let texture = device
        .create_texture(&TextureDescriptor::new(64, 32, TextureFormat::Nv12))
        .unwrap();
    InputSample::new(texture).with_time(time).with_duration(FRAME_NS)
}

fn next_event(stream: &StreamController) -> StreamEvent {
    stream
        .get_event_timeout(Duration::from_secs(2))
        .unwrap()
        .expect("timed out waiting for event")
}

fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    condition()
}

/// Bring a fresh stream into `state` and drain the events that took it there.
fn stream_in_state(stream: &StreamController, state: StreamState) {
    if state == StreamState::NotSet {
        return;
    }
    stream.set_current_media_type(nv12()).unwrap();
    match state {
        StreamState::Ready => {}
        StreamState::Started => {
            stream.start(StartPosition::At(0), None).unwrap();
            assert_eq!(next_event(stream), StreamEvent::Started);
            assert_eq!(next_event(stream), StreamEvent::RequestSample);
        }
        StreamState::Paused => {
            stream.pause().unwrap();
            assert_eq!(next_event(stream), StreamEvent::Paused);
        }
        StreamState::Stopped => {
            stream.stop().unwrap();
            assert_eq!(next_event(stream), StreamEvent::Stopped);
        }
        StreamState::NotSet => unreachable!(),
    }
    assert_eq!(stream.state(), state);
}

fn attempt(stream: &StreamController, operation: StreamOperation) -> framesink::Result<()> {
    match operation {
        StreamOperation::SetType => stream.set_current_media_type(nv12()),
        StreamOperation::Start => stream.start(StartPosition::At(0), None),
        StreamOperation::Restart => stream.restart(),
        StreamOperation::Pause => stream.pause(),
        StreamOperation::Stop => stream.stop(),
        StreamOperation::PlaceMarker => {
            stream.place_marker(MarkerType::Default, json!(null), json!(0))
        }
        StreamOperation::ProcessSample => unreachable!("needs an outstanding request"),
    }
}

// =============================================================================
// Legality matrix
// =============================================================================

#[test]
fn test_operation_legality_matrix() {
    use StreamOperation::*;
    let table: [(StreamState, [(StreamOperation, bool); 6]); 5] = [
        (
            StreamState::NotSet,
            [(SetType, true), (Start, false), (Restart, false), (Pause, false), (Stop, false), (PlaceMarker, false)],
        ),
        (
            StreamState::Ready,
            [(SetType, true), (Start, true), (Restart, true), (Pause, true), (Stop, true), (PlaceMarker, true)],
        ),
        (
            StreamState::Started,
            [(SetType, true), (Start, true), (Restart, false), (Pause, true), (Stop, true), (PlaceMarker, true)],
        ),
        (
            StreamState::Paused,
            [(SetType, true), (Start, true), (Restart, true), (Pause, true), (Stop, true), (PlaceMarker, true)],
        ),
        (
            StreamState::Stopped,
            [(SetType, true), (Start, true), (Restart, false), (Pause, false), (Stop, true), (PlaceMarker, true)],
        ),
    ];

    for (state, row) in table {
        for (operation, allowed) in row {
            let (sink, _device) = new_sink();
            let stream = sink.stream_by_index(0).unwrap();
            stream_in_state(stream, state);

            let result = attempt(stream, operation);
            if allowed {
                assert!(result.is_ok(), "{} should be legal in {}: {:?}", operation, state, result);
            } else {
                assert!(result.as_ref().is_err_and(StreamError::is_protocol_error));
                match result {
                    Err(StreamError::InvalidRequest { state: s, operation: o }) => {
                        assert_eq!((s, o), (state, operation));
                    }
                    other => panic!("{} in {} returned {:?}", operation, state, other),
                }
                assert_eq!(stream.state(), state, "rejected {} changed state", operation);
            }
        }
    }
}

/// The `ProcessSample` column. Only Started and Paused can hold an
/// outstanding request; elsewhere the unrequested sample is refused first.
#[test]
fn test_process_sample_column() {
    let cases = [
        (StreamState::NotSet, false),
        (StreamState::Ready, false),
        (StreamState::Started, true),
        (StreamState::Paused, true),
        (StreamState::Stopped, false),
    ];

    for (state, allowed) in cases {
        let (sink, device) = new_sink();
        let stream = sink.stream_by_index(0).unwrap();
        if state == StreamState::Paused {
            stream_in_state(stream, StreamState::Started);
            stream.pause().unwrap();
            assert_eq!(next_event(stream), StreamEvent::Paused);
        } else {
            stream_in_state(stream, state);
        }

        let result = stream.process_sample(input(&device, 0));
        if allowed {
            assert!(result.is_ok(), "sample should be accepted in {}: {:?}", state, result);
        } else {
            match result {
                Err(err @ StreamError::NoSampleRequested) => assert!(err.is_protocol_error()),
                other => panic!("sample in {} returned {:?}", state, other),
            }
        }
        assert_eq!(stream.state(), state);
    }
}

#[test]
fn test_samples_rejected_outside_started_and_paused() {
    let (sink, device) = new_sink();
    let stream = sink.stream_by_index(0).unwrap();
    stream_in_state(stream, StreamState::Started);
    stream.stop().unwrap();
    assert_eq!(next_event(stream), StreamEvent::Stopped);

    // Requests were zeroed by stop
    assert!(matches!(
        stream.process_sample(input(&device, 0)),
        Err(StreamError::NoSampleRequested)
    ));
}

// =============================================================================
// Markers
// =============================================================================

#[test]
fn test_marker_completes_after_preceding_sample() {
    let (sink, device) = new_sink();
    let stream = sink.stream_by_index(0).unwrap();
    stream_in_state(stream, StreamState::Started);

    stream.process_sample(input(&device, 0)).unwrap();
    stream
        .place_marker(MarkerType::EndOfSegment, json!("eos"), json!("segment-1"))
        .unwrap();

    loop {
        match next_event(stream) {
            StreamEvent::RequestSample => continue,
            StreamEvent::Marker { context, status } => {
                assert_eq!(context, json!("segment-1"));
                assert_eq!(status, MarkerStatus::Ok);
                break;
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    // No clock attached, so the sample was presented before the marker completed
    let sample = stream.lock_presented_sample().unwrap().unwrap();
    assert_eq!(sample.sample_time, Some(0));
}

#[test]
fn test_flush_aborts_markers_and_discards_samples() {
    let (sink, device) = new_sink();
    let stream = sink.stream_by_index(0).unwrap();
    stream_in_state(stream, StreamState::Started);
    stream.pause().unwrap();
    assert_eq!(next_event(stream), StreamEvent::Paused);

    stream.process_sample(input(&device, 0)).unwrap();
    stream
        .place_marker(MarkerType::Tick, json!(1), json!("first"))
        .unwrap();
    stream
        .place_marker(MarkerType::Tick, json!(2), json!("second"))
        .unwrap();
    assert_eq!(stream.pending_len(), 3);

    stream.flush().unwrap();

    for context in ["first", "second"] {
        assert_eq!(
            next_event(stream),
            StreamEvent::Marker {
                context: json!(context),
                status: MarkerStatus::Aborted
            }
        );
    }
    assert_eq!(stream.pending_len(), 0);
    assert_eq!(device.blit_count(), 0);
    assert!(stream.lock_presented_sample().unwrap().is_none());
}

// =============================================================================
// Media type changes
// =============================================================================

#[test]
fn test_type_change_while_running_flushes() {
    let (sink, device) = new_sink();
    let stream = sink.stream_by_index(0).unwrap();
    stream_in_state(stream, StreamState::Started);
    stream.pause().unwrap();
    assert_eq!(next_event(stream), StreamEvent::Paused);

    stream.process_sample(input(&device, 0)).unwrap();
    stream
        .place_marker(MarkerType::Default, json!(null), json!(9))
        .unwrap();

    let bigger = MediaType::video(VideoSubtype::Nv12, 128, 64);
    stream.set_current_media_type(bigger.clone()).unwrap();

    assert_eq!(stream.state(), StreamState::Paused);
    assert_eq!(stream.current_media_type().unwrap(), bigger);
    assert_eq!(
        next_event(stream),
        StreamEvent::Marker {
            context: json!(9),
            status: MarkerStatus::Aborted
        }
    );
    assert_eq!(sink.presenter().pool().dimensions(), Some((128, 64)));
}

#[test]
fn test_device_change_is_reported() {
    let (sink, device) = new_sink();
    let stream = sink.stream_by_index(0).unwrap();
    stream_in_state(stream, StreamState::Started);

    device.bump_generation();
    stream.process_sample(input(&device, 0)).unwrap();

    let mut saw_device_changed = false;
    while let Some(event) = stream.get_event_timeout(Duration::from_millis(200)).unwrap() {
        if event == StreamEvent::DeviceChanged {
            saw_device_changed = true;
        }
    }
    assert!(saw_device_changed);
    assert!(wait_for(|| stream.lock_presented_sample().unwrap().is_some()));
}

// =============================================================================
// Presented sample
// =============================================================================

#[test]
fn test_held_presented_sample_does_not_block_controller() {
    let (sink, device) = new_sink();
    let stream = sink.stream_by_index(0).unwrap();
    stream_in_state(stream, StreamState::Started);

    stream.process_sample(input(&device, 0)).unwrap();
    assert!(wait_for(|| stream.lock_presented_sample().unwrap().is_some()));

    let held = stream.lock_presented_sample().unwrap().unwrap();
    assert_eq!(held.sample_time, Some(0));

    // No clock, so this one is presented immediately and waits on `held`
    stream.process_sample(input(&device, FRAME_NS)).unwrap();
    std::thread::sleep(Duration::from_millis(100));

    let elapsed = std::thread::scope(|scope| {
        scope
            .spawn(|| {
                let begin = Instant::now();
                assert_eq!(stream.state(), StreamState::Started);
                assert!(stream.is_active());
                stream.pause().unwrap();
                assert_eq!(stream.state(), StreamState::Paused);
                stream.restart().unwrap();
                begin.elapsed()
            })
            .join()
            .unwrap()
    });
    assert!(
        elapsed < Duration::from_millis(500),
        "controller blocked for {:?} while the presented sample was held",
        elapsed
    );

    drop(held);
    assert!(wait_for(|| {
        stream
            .lock_presented_sample()
            .unwrap()
            .is_some_and(|sample| sample.sample_time == Some(FRAME_NS))
    }));
}

// =============================================================================
// Shutdown
// =============================================================================

#[test]
fn test_shutdown_releases_everything() {
    let (sink, device) = new_sink();
    let stream = sink.stream_by_index(0).unwrap();
    stream_in_state(stream, StreamState::Started);
    stream.process_sample(input(&device, 0)).unwrap();
    assert!(wait_for(|| stream.lock_presented_sample().unwrap().is_some()));

    assert!(sink.shutdown().unwrap());
    assert!(!sink.shutdown().unwrap());
    assert!(!sink.presenter().pool().is_initialized());
    assert!(matches!(
        sink.lock_presented_sample(),
        Err(StreamError::Shutdown)
    ));
}
