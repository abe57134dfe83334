//! Integration tests for stream mode.

use std::time::Duration;

use framelabel::dataset::{DatasetLayout, Split};
use framelabel::detect::SidecarDetector;
use framelabel::ir::TrackId;
use framelabel::pipeline::{
    CancelToken, IngestionPipeline, Mode, PipelineOptions, SharedPipeline, TickOutcome,
};
use framelabel::source::ImageSequenceSource;
use framelabel::FramelabelError;

mod common;
use common::{write_frames, write_sidecar};

/// Three frames with a car (track 7) drifting right and a bus (untracked)
/// on the last frame only.
fn stream_fixture(root: &std::path::Path) -> (std::path::PathBuf, std::path::PathBuf) {
    let frames_dir = root.join("frames");
    let preds_dir = root.join("preds");
    write_frames(&frames_dir, &["s0.bmp", "s1.bmp", "s2.bmp"], 100, 100);
    write_sidecar(
        &preds_dir,
        "s0",
        r#"[{"label": "car", "cx": 0.20, "cy": 0.5, "w": 0.1, "h": 0.1, "confidence": 0.9, "track_id": 7}]"#,
    );
    write_sidecar(
        &preds_dir,
        "s1",
        r#"[{"label": "car", "cx": 0.30, "cy": 0.5, "w": 0.1, "h": 0.1, "confidence": 0.9, "track_id": 7}]"#,
    );
    write_sidecar(
        &preds_dir,
        "s2",
        r#"[{"label": "car", "cx": 0.40, "cy": 0.5, "w": 0.1, "h": 0.1, "confidence": 0.9, "track_id": 7},
            {"label": "bus", "cx": 0.8, "cy": 0.2, "w": 0.2, "h": 0.2, "confidence": 0.7}]"#,
    );
    (frames_dir, preds_dir)
}

fn stream_pipeline(root: &std::path::Path, options: PipelineOptions) -> IngestionPipeline {
    let (frames_dir, preds_dir) = stream_fixture(root);
    let layout = DatasetLayout::open(root.join("dataset")).expect("open layout");
    let mut pipeline =
        IngestionPipeline::new(layout, Box::new(SidecarDetector::new(preds_dir)), options)
            .expect("pipeline");
    pipeline.open_stream(Box::new(
        ImageSequenceSource::from_dir(&frames_dir).expect("frame source"),
    ));
    pipeline
}

#[test]
fn track_id_follows_object_across_ticks() {
    let temp = tempfile::tempdir().expect("create temp dir");
    let mut pipeline = stream_pipeline(temp.path(), PipelineOptions::default());
    assert_eq!(pipeline.mode(), Mode::Stream);

    let mut xs = Vec::new();
    for expected_position in 0..3u64 {
        match pipeline.tick().expect("tick") {
            TickOutcome::Frame {
                position,
                detections,
            } => {
                assert_eq!(position, expected_position);
                let car = detections
                    .iter()
                    .find(|a| a.label == "car")
                    .expect("car detected");
                assert_eq!(car.track_id, Some(TrackId(7)));
                assert_eq!(car.display_label(), "car #7");
                xs.push(car.region().x);
            }
            other => panic!("expected a frame, got {other:?}"),
        }
    }
    assert!(xs.windows(2).all(|w| w[0] < w[1]), "car should move right: {xs:?}");

    let last = pipeline.store().annotations();
    let bus = last.iter().find(|a| a.label == "bus").expect("bus detected");
    assert_eq!(bus.track_id, None);
    assert_eq!(bus.display_label(), "bus");

    assert_eq!(pipeline.tick().expect("tick"), TickOutcome::Ended);
    assert_eq!(pipeline.tick().expect("tick"), TickOutcome::Ended);
}

#[test]
fn store_is_replaced_each_tick_without_history() {
    let temp = tempfile::tempdir().expect("create temp dir");
    let mut pipeline = stream_pipeline(temp.path(), PipelineOptions::default());

    pipeline.tick().expect("first tick");
    pipeline.tick().expect("second tick");
    assert_eq!(pipeline.store().len(), 1);
    assert!(!pipeline.store().can_undo());
}

#[test]
fn paused_stream_pulls_nothing() {
    let temp = tempfile::tempdir().expect("create temp dir");
    let mut pipeline = stream_pipeline(temp.path(), PipelineOptions::default());

    pipeline.pause().expect("pause");
    assert_eq!(pipeline.tick().expect("tick"), TickOutcome::Paused);
    pipeline.resume().expect("resume");
    match pipeline.tick().expect("tick") {
        TickOutcome::Frame { position, .. } => assert_eq!(position, 0),
        other => panic!("expected first frame, got {other:?}"),
    }

    pipeline.stop();
    assert_eq!(pipeline.tick().expect("tick"), TickOutcome::Ended);
}

#[test]
fn batch_operations_are_refused_in_stream_mode() {
    let temp = tempfile::tempdir().expect("create temp dir");
    let mut pipeline = stream_pipeline(temp.path(), PipelineOptions::default());
    assert!(matches!(
        pipeline.select_frame(0),
        Err(FramelabelError::WrongMode { mode: "stream", .. })
    ));
    assert!(matches!(
        pipeline.annotate_all(Split::Val, &CancelToken::new()),
        Err(FramelabelError::WrongMode { .. })
    ));
}

#[test]
fn tick_is_dropped_while_pipeline_is_busy() {
    let temp = tempfile::tempdir().expect("create temp dir");
    let shared = SharedPipeline::new(stream_pipeline(temp.path(), PipelineOptions::default()));

    let guard = shared.lock();
    assert_eq!(shared.try_tick().expect("try tick"), TickOutcome::Dropped);
    drop(guard);

    match shared.try_tick().expect("try tick") {
        TickOutcome::Frame { position, .. } => assert_eq!(position, 0),
        other => panic!("expected first frame, got {other:?}"),
    }
}

#[test]
fn run_stream_plays_to_the_end() {
    let temp = tempfile::tempdir().expect("create temp dir");
    let shared = SharedPipeline::new(stream_pipeline(temp.path(), PipelineOptions::default()));

    let stats = shared.run_stream(Duration::ZERO, &CancelToken::new());
    assert_eq!(stats.frames, 3);
    assert_eq!(stats.detections, 4);
    assert_eq!(stats.errors, 0);
    assert!(!stats.cancelled);
}

#[test]
fn run_stream_stops_when_cancelled() {
    let temp = tempfile::tempdir().expect("create temp dir");
    let shared = SharedPipeline::new(stream_pipeline(temp.path(), PipelineOptions::default()));
    let cancel = CancelToken::new();
    cancel.cancel();

    let stats = shared.run_stream(Duration::ZERO, &cancel);
    assert!(stats.cancelled);
    assert_eq!(stats.frames, 0);
}

#[test]
fn snapshots_and_recording_write_per_frame_files() {
    let temp = tempfile::tempdir().expect("create temp dir");
    let snapshots = temp.path().join("snapshots");
    let options = PipelineOptions {
        snapshot_dir: Some(snapshots.clone()),
        record_stream: true,
        stream_split: Split::Val,
        ..PipelineOptions::default()
    };
    let mut pipeline = stream_pipeline(temp.path(), options);
    while let TickOutcome::Frame { .. } = pipeline.tick().expect("tick") {}

    for position in 0..3 {
        assert!(snapshots
            .join("car")
            .join(format!("frame_{position:06}.bmp"))
            .is_file());
    }
    assert!(snapshots.join("bus/frame_000002.bmp").is_file());
    assert!(!snapshots.join("bus/frame_000000.bmp").exists());

    let layout = pipeline.layout();
    for stem in ["s0", "s1", "s2"] {
        assert!(layout.label_path(Split::Val, stem).is_file());
        assert!(layout.images_dir(Split::Val).join(format!("{stem}.bmp")).is_file());
    }
    assert_eq!(pipeline.registry().names(), ["car", "bus"]);
    assert!(layout.manifest_path().is_file());
}
