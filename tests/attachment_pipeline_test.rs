//! Attachment ingest: per-file validation, the attachment cap, image
//! compression bounds, staged uploads and their cancellation.

mod common;

use bytes::Bytes;
use common::*;
use image::{DynamicImage, ImageOutputFormat, RgbImage};
use messaging_core::config::Config;
use messaging_core::models::{AttachmentKind, PendingStatus};
use messaging_core::services::attachment_service::{
    compress_image, AttachmentIngestPipeline, MediaProbe, NullProbe, StagedFile,
};
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

/// Probe reporting a fixed duration for every clip.
struct FixedProbe(Duration);

#[async_trait::async_trait]
impl MediaProbe for FixedProbe {
    async fn video_duration(&self, _mime_type: &str, _data: &Bytes) -> Option<Duration> {
        Some(self.0)
    }
}

fn pipeline_with_probe(probe: Arc<dyn MediaProbe>) -> AttachmentIngestPipeline {
    AttachmentIngestPipeline::new(Arc::new(Config::from_env()), probe)
}

fn pipeline() -> AttachmentIngestPipeline {
    pipeline_with_probe(Arc::new(NullProbe))
}

fn document(name: &str, size: usize) -> StagedFile {
    StagedFile {
        name: name.into(),
        mime_type: "application/pdf".into(),
        data: Bytes::from(vec![0u8; size]),
        kind_hint: None,
    }
}

fn video(name: &str, size: usize) -> StagedFile {
    StagedFile {
        name: name.into(),
        mime_type: "video/mp4".into(),
        data: Bytes::from(vec![0u8; size]),
        kind_hint: None,
    }
}

/// A noisy JPEG that does not compress to nothing.
fn noisy_jpeg(width: u32, height: u32) -> Bytes {
    let img = RgbImage::from_fn(width, height, |x, y| {
        let v = (x.wrapping_mul(31) ^ y.wrapping_mul(17)) as u8;
        image::Rgb([v, v.wrapping_add(85), v.wrapping_add(170)])
    });
    let mut buf = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut buf), ImageOutputFormat::Jpeg(95))
        .expect("encode fixture");
    Bytes::from(buf)
}

#[tokio::test]
async fn scenario_c_eleventh_file_is_count_limited() {
    let pipeline = pipeline();
    let files: Vec<StagedFile> = (0..11).map(|i| document(&format!("doc-{i}.pdf"), 64)).collect();

    let report = pipeline.add_files(files).await;

    assert_eq!(report.accepted.len(), 10);
    assert_eq!(report.rejected.len(), 1);
    assert!(report.rejected[0].name.is_none());
    assert!(report.rejected[0].reason.contains("first 10"));
    assert_eq!(pipeline.pending_count().await, 10);

    // The composer is full; another batch is refused outright.
    let report = pipeline.add_files(vec![document("straggler.pdf", 64)]).await;
    assert!(report.accepted.is_empty());
    assert_eq!(report.rejected.len(), 1);
    assert!(pipeline.pending_count().await <= 10);
}

#[tokio::test]
async fn image_is_compressed_and_ready_immediately() {
    let pipeline = pipeline();
    let report = pipeline
        .add_files(vec![StagedFile {
            name: "garden.jpg".into(),
            mime_type: "image/png".into(),
            data: noisy_jpeg(2400, 1600),
            kind_hint: None,
        }])
        .await;

    assert_eq!(report.accepted.len(), 1);
    let staged = pipeline.snapshot().await;
    assert_eq!(staged.len(), 1);
    assert_eq!(staged[0].status, PendingStatus::Ready);
    assert_eq!(staged[0].progress, 100);
    assert_eq!(staged[0].mime_type, "image/jpeg");
    assert_eq!(staged[0].kind, AttachmentKind::Image);
}

#[test]
fn compression_respects_byte_target_or_quality_floor() {
    let mut config = Config::from_env();
    // A target small enough to force the quality walk.
    config.max_image_bytes = 40 * 1024;

    let result = compress_image(&noisy_jpeg(2400, 1600), &config).expect("compress");
    assert!(result.width <= config.max_image_dimension);
    assert!(result.height <= config.max_image_dimension);
    assert!(
        result.data.len() <= config.max_image_bytes
            || result.quality == config.image_quality_floor,
        "payload {} over target with quality {}",
        result.data.len(),
        result.quality
    );
}

#[test]
fn compression_returns_best_effort_at_the_floor() {
    let mut config = Config::from_env();
    // Impossible target: the floor must be reached and reported.
    config.max_image_bytes = 16;

    let result = compress_image(&noisy_jpeg(800, 600), &config).expect("compress");
    assert_eq!(result.quality, config.image_quality_floor);
}

#[tokio::test]
async fn mixed_batch_is_partially_accepted() {
    let pipeline = pipeline();
    let report = pipeline
        .add_files(vec![
            document("notes.pdf", 64),
            StagedFile {
                name: "broken.jpg".into(),
                mime_type: "image/jpeg".into(),
                data: Bytes::from_static(b"not an image"),
                kind_hint: None,
            },
        ])
        .await;

    assert_eq!(report.accepted.len(), 1);
    assert_eq!(report.rejected.len(), 1);
    assert_eq!(report.rejected[0].name.as_deref(), Some("broken.jpg"));
    assert_eq!(pipeline.pending_count().await, 1);
}

#[tokio::test]
async fn oversized_and_overlong_videos_are_rejected_per_file() {
    let pipeline = pipeline_with_probe(Arc::new(FixedProbe(Duration::from_secs(6 * 60))));
    let report = pipeline.add_files(vec![video("epic.mp4", 1024)]).await;
    assert!(report.accepted.is_empty());
    assert!(report.rejected[0].reason.contains("5 minutes"));

    let mut config = Config::from_env();
    config.max_video_bytes = 1024;
    let pipeline = AttachmentIngestPipeline::new(Arc::new(config), Arc::new(NullProbe));
    let report = pipeline.add_files(vec![video("huge.mp4", 4096)]).await;
    assert!(report.accepted.is_empty());
    assert!(report.rejected[0].reason.contains("video limit"));
}

#[tokio::test(start_paused = true)]
async fn staged_upload_progresses_to_ready() {
    let pipeline = pipeline_with_probe(Arc::new(FixedProbe(Duration::from_secs(30))));
    let report = pipeline.add_files(vec![video("walk.mp4", 2048)]).await;
    assert_eq!(report.accepted.len(), 1);

    let staged = pipeline.snapshot().await;
    assert_eq!(staged[0].status, PendingStatus::Uploading);
    assert_eq!(staged[0].progress, 0);

    // 8%/tick at 120ms per tick: 13 ticks to reach 100.
    settle(13 * 120 + 60).await;
    let staged = pipeline.snapshot().await;
    assert_eq!(staged[0].status, PendingStatus::Ready);
    assert_eq!(staged[0].progress, 100);
    assert!(!pipeline.has_uploading().await);
}

#[tokio::test(start_paused = true)]
async fn documents_upload_faster_than_videos() {
    let pipeline = pipeline();
    pipeline.add_files(vec![document("spec.pdf", 2048)]).await;

    // 12%/tick: nine ticks suffice.
    settle(9 * 120 + 60).await;
    let staged = pipeline.snapshot().await;
    assert_eq!(staged[0].status, PendingStatus::Ready);
}

#[tokio::test(start_paused = true)]
async fn cancellation_stops_one_upload_without_touching_siblings() {
    let pipeline = pipeline();
    let report = pipeline
        .add_files(vec![document("keep.pdf", 2048), document("drop.pdf", 2048)])
        .await;
    let dropped = report.accepted[1];

    settle(240).await;
    assert!(pipeline.remove(dropped).await);
    // Second removal of the same id is a no-op.
    assert!(!pipeline.remove(dropped).await);

    settle(9 * 120 + 60).await;
    let staged = pipeline.snapshot().await;
    assert_eq!(staged.len(), 1);
    assert_eq!(staged[0].name, "keep.pdf");
    assert_eq!(staged[0].status, PendingStatus::Ready);
}

#[tokio::test(start_paused = true)]
async fn clear_drops_everything() {
    let pipeline = pipeline();
    pipeline
        .add_files(vec![document("a.pdf", 128), document("b.pdf", 128)])
        .await;

    pipeline.clear().await;
    assert_eq!(pipeline.pending_count().await, 0);
    assert!(!pipeline.has_uploading().await);

    // Nothing resurfaces after the would-be upload window.
    settle(2_000).await;
    assert_eq!(pipeline.pending_count().await, 0);
}
