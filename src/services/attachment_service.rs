//! Attachment Ingest Pipeline
//!
//! Validates and transforms files staged in the composer before a message
//! may be sent. Images are compressed synchronously on the blocking pool
//! and become ready at once; videos and documents pass size/duration
//! checks and then run a simulated staged upload that ticks progress
//! until ready. Every staged upload is cancellable; cancellation aborts
//! the upload task and drops the payload without touching siblings.

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::models::{AttachmentKind, MessageAttachment, PendingAttachment, PendingStatus};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bytes::Bytes;
use chrono::Utc;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageOutputFormat};
use std::collections::HashMap;
use std::io::Cursor;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::debug;
use uuid::Uuid;

/// A file handed to the pipeline by the composer.
#[derive(Debug, Clone)]
pub struct StagedFile {
    pub name: String,
    pub mime_type: String,
    pub data: Bytes,
    /// Forces a kind regardless of mime type (location shares, contact
    /// cards and the like arrive as generic payloads).
    pub kind_hint: Option<AttachmentKind>,
}

#[derive(Debug, Clone)]
pub struct IngestRejection {
    /// File the rejection refers to; `None` for the batch-level
    /// count-limited rejection.
    pub name: Option<String>,
    pub reason: String,
}

/// Outcome of one `add_files` batch: partial acceptance, never
/// wholesale rejection of a mixed batch.
#[derive(Debug, Clone, Default)]
pub struct IngestReport {
    pub accepted: Vec<Uuid>,
    pub rejected: Vec<IngestRejection>,
}

/// Container-metadata decode for video duration. No payload decoding
/// happens elsewhere in the pipeline, so this is the one async seam a
/// real media stack plugs into.
#[async_trait]
pub trait MediaProbe: Send + Sync {
    /// The clip duration, or `None` when the payload is unrecognized.
    async fn video_duration(&self, mime_type: &str, data: &Bytes) -> Option<Duration>;
}

/// Probe that recognizes nothing. Unknown duration is treated as zero,
/// so unprobeable clips pass the duration check (size still applies).
pub struct NullProbe;

#[async_trait]
impl MediaProbe for NullProbe {
    async fn video_duration(&self, _mime_type: &str, _data: &Bytes) -> Option<Duration> {
        None
    }
}

pub struct AttachmentIngestPipeline {
    config: Arc<Config>,
    probe: Arc<dyn MediaProbe>,
    pending: Arc<RwLock<Vec<PendingAttachment>>>,
    uploads: Arc<Mutex<HashMap<Uuid, JoinHandle<()>>>>,
}

impl AttachmentIngestPipeline {
    pub fn new(config: Arc<Config>, probe: Arc<dyn MediaProbe>) -> Self {
        Self {
            config,
            probe,
            pending: Arc::new(RwLock::new(Vec::new())),
            uploads: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Stage a batch of files. Files beyond the per-message cap produce a
    /// single count-limited rejection; files within the cap are processed
    /// independently, so a mixed batch yields partial acceptance.
    pub async fn add_files(&self, files: Vec<StagedFile>) -> IngestReport {
        let mut report = IngestReport::default();
        if files.is_empty() {
            return report;
        }

        let existing = self.pending.read().await.len();
        let slots = self.config.max_attachments.saturating_sub(existing);
        if slots == 0 {
            report.rejected.push(IngestRejection {
                name: None,
                reason: format!("you can attach up to {} items", self.config.max_attachments),
            });
            return report;
        }

        let total = files.len();
        let mut files = files;
        files.truncate(slots);
        let overflow = total - files.len();

        for file in files {
            let kind = file
                .kind_hint
                .unwrap_or_else(|| infer_kind(&file.mime_type));
            match kind {
                AttachmentKind::Image => self.ingest_image(file, &mut report).await,
                AttachmentKind::Video => self.ingest_video(file, &mut report).await,
                AttachmentKind::Document => self.ingest_document(file, kind, &mut report).await,
                // Links, locations and contact cards carry no payload to
                // validate or upload.
                other => {
                    let id = self.push_ready(file, other).await;
                    report.accepted.push(id);
                }
            }
        }

        if overflow > 0 {
            report.rejected.push(IngestRejection {
                name: None,
                reason: format!("only the first {slots} items were attached"),
            });
        }

        report
    }

    async fn ingest_image(&self, file: StagedFile, report: &mut IngestReport) {
        let config = Arc::clone(&self.config);
        let data = file.data.clone();
        let compressed =
            tokio::task::spawn_blocking(move || compress_image(&data, &config)).await;

        match compressed {
            Ok(Ok(image)) => {
                let size = image.data.len() as u64;
                let attachment = PendingAttachment {
                    id: Uuid::new_v4(),
                    name: file.name,
                    size,
                    mime_type: "image/jpeg".into(),
                    kind: AttachmentKind::Image,
                    data: image.data,
                    status: PendingStatus::Ready,
                    progress: 100,
                    error: None,
                    staged_at: Utc::now(),
                };
                debug!(
                    name = %attachment.name,
                    size,
                    width = image.width,
                    height = image.height,
                    quality = image.quality,
                    "image attachment compressed"
                );
                report.accepted.push(attachment.id);
                self.pending.write().await.push(attachment);
            }
            Ok(Err(e)) => report.rejected.push(IngestRejection {
                name: Some(file.name.clone()),
                reason: format!("could not attach \"{}\": {e}", file.name),
            }),
            Err(e) => report.rejected.push(IngestRejection {
                name: Some(file.name.clone()),
                reason: format!("could not attach \"{}\": {e}", file.name),
            }),
        }
    }

    async fn ingest_video(&self, file: StagedFile, report: &mut IngestReport) {
        if file.data.len() as u64 > self.config.max_video_bytes {
            report.rejected.push(IngestRejection {
                name: Some(file.name.clone()),
                reason: format!(
                    "\"{}\" exceeds the {}MB video limit",
                    file.name,
                    self.config.max_video_bytes / (1024 * 1024)
                ),
            });
            return;
        }

        let duration = self
            .probe
            .video_duration(&file.mime_type, &file.data)
            .await
            .unwrap_or(Duration::ZERO);
        if duration.as_secs() > self.config.max_video_duration_secs {
            report.rejected.push(IngestRejection {
                name: Some(file.name.clone()),
                reason: format!(
                    "\"{}\" is longer than {} minutes",
                    file.name,
                    self.config.max_video_duration_secs / 60
                ),
            });
            return;
        }

        let id = self
            .push_uploading(file, AttachmentKind::Video, self.config.video_progress_step)
            .await;
        report.accepted.push(id);
    }

    async fn ingest_document(
        &self,
        file: StagedFile,
        kind: AttachmentKind,
        report: &mut IngestReport,
    ) {
        if file.data.len() as u64 > self.config.max_document_bytes {
            report.rejected.push(IngestRejection {
                name: Some(file.name.clone()),
                reason: format!(
                    "\"{}\" exceeds the {}MB limit",
                    file.name,
                    self.config.max_document_bytes / (1024 * 1024)
                ),
            });
            return;
        }

        let id = self
            .push_uploading(file, kind, self.config.document_progress_step)
            .await;
        report.accepted.push(id);
    }

    async fn push_ready(&self, file: StagedFile, kind: AttachmentKind) -> Uuid {
        let attachment = PendingAttachment {
            id: Uuid::new_v4(),
            name: file.name,
            size: file.data.len() as u64,
            mime_type: file.mime_type,
            kind,
            data: file.data,
            status: PendingStatus::Ready,
            progress: 100,
            error: None,
            staged_at: Utc::now(),
        };
        let id = attachment.id;
        self.pending.write().await.push(attachment);
        id
    }

    async fn push_uploading(&self, file: StagedFile, kind: AttachmentKind, step: u8) -> Uuid {
        let attachment = PendingAttachment {
            id: Uuid::new_v4(),
            name: file.name,
            size: file.data.len() as u64,
            mime_type: file.mime_type,
            kind,
            data: file.data,
            status: PendingStatus::Uploading,
            progress: 0,
            error: None,
            staged_at: Utc::now(),
        };
        let id = attachment.id;
        self.pending.write().await.push(attachment);
        self.spawn_upload(id, step).await;
        id
    }

    /// Simulated staged upload: progress advances one step per tick until
    /// 100, then the attachment flips to ready. The task stops on its own
    /// if the attachment disappeared or left the uploading state.
    async fn spawn_upload(&self, id: Uuid, step: u8) {
        let pending = Arc::clone(&self.pending);
        let uploads = Arc::clone(&self.uploads);
        let tick = self.config.upload_tick();

        let handle = tokio::spawn(async move {
            loop {
                tokio::time::sleep(tick).await;
                let mut guard = pending.write().await;
                let Some(attachment) = guard.iter_mut().find(|a| a.id == id) else {
                    break;
                };
                if attachment.status != PendingStatus::Uploading {
                    break;
                }
                attachment.progress = attachment.progress.saturating_add(step).min(100);
                if attachment.progress >= 100 {
                    attachment.status = PendingStatus::Ready;
                    break;
                }
            }
            uploads.lock().await.remove(&id);
        });

        self.uploads.lock().await.insert(id, handle);
    }

    /// Cancel/remove one staged attachment: aborts its upload task and
    /// drops the entry with its payload. Siblings are untouched.
    /// Idempotent; returns whether an entry was removed.
    pub async fn remove(&self, id: Uuid) -> bool {
        if let Some(handle) = self.uploads.lock().await.remove(&id) {
            handle.abort();
        }
        let mut guard = self.pending.write().await;
        let before = guard.len();
        guard.retain(|a| a.id != id);
        before != guard.len()
    }

    pub async fn snapshot(&self) -> Vec<PendingAttachment> {
        self.pending.read().await.clone()
    }

    pub async fn pending_count(&self) -> usize {
        self.pending.read().await.len()
    }

    pub async fn has_uploading(&self) -> bool {
        self.pending.read().await.iter().any(|a| a.is_uploading())
    }

    /// Drop every staged attachment and abort their upload tasks. Called
    /// after a successful send or when the composer is abandoned.
    pub async fn clear(&self) {
        let mut uploads = self.uploads.lock().await;
        for (_, handle) in uploads.drain() {
            handle.abort();
        }
        drop(uploads);
        self.pending.write().await.clear();
    }
}

/// Convert a ready staged attachment into its persisted form: fresh id,
/// image payloads inlined as data URLs, everything else referenced by an
/// object handle.
pub(crate) fn finalize_attachment(pending: &PendingAttachment) -> MessageAttachment {
    let id = Uuid::new_v4();
    let url = match pending.kind {
        AttachmentKind::Image => format!(
            "data:{};base64,{}",
            pending.mime_type,
            STANDARD.encode(&pending.data)
        ),
        _ => format!("mem://attachments/{id}"),
    };
    let thumbnail_url = (pending.kind == AttachmentKind::Image).then(|| url.clone());

    MessageAttachment {
        id,
        kind: pending.kind,
        name: pending.name.clone(),
        size: pending.size,
        mime_type: pending.mime_type.clone(),
        url,
        thumbnail_url,
        caption: None,
    }
}

fn infer_kind(mime_type: &str) -> AttachmentKind {
    match mime::Mime::from_str(mime_type) {
        Ok(parsed) if parsed.type_() == mime::IMAGE => AttachmentKind::Image,
        Ok(parsed) if parsed.type_() == mime::VIDEO => AttachmentKind::Video,
        _ => AttachmentKind::Document,
    }
}

pub struct CompressedImage {
    pub data: Bytes,
    pub width: u32,
    pub height: u32,
    /// JPEG quality the walk settled on.
    pub quality: u8,
}

/// Resize to fit within the configured square, then walk JPEG quality
/// down from the start value until the payload fits the byte target or
/// the floor is reached, whichever comes first.
pub fn compress_image(data: &[u8], config: &Config) -> AppResult<CompressedImage> {
    let img = image::load_from_memory(data)
        .map_err(|e| AppError::BadRequest(format!("failed to decode image: {e}")))?;

    let (orig_w, orig_h) = img.dimensions();
    let (new_w, new_h) = fit_within(orig_w, orig_h, config.max_image_dimension);

    let resized = if (new_w, new_h) == (orig_w, orig_h) {
        img
    } else {
        img.resize_exact(new_w.max(1), new_h.max(1), FilterType::Triangle)
    };

    let mut quality = config.image_quality_start;
    let mut encoded = encode_jpeg(&resized, quality)?;
    while encoded.len() > config.max_image_bytes && quality > config.image_quality_floor {
        quality = quality
            .saturating_sub(config.image_quality_step)
            .max(config.image_quality_floor);
        encoded = encode_jpeg(&resized, quality)?;
    }

    Ok(CompressedImage {
        data: Bytes::from(encoded),
        width: new_w,
        height: new_h,
        quality,
    })
}

/// Dimensions scaled to fit a `max_dim` square, aspect ratio preserved.
/// Images already within bounds keep their size.
fn fit_within(width: u32, height: u32, max_dim: u32) -> (u32, u32) {
    if width <= max_dim && height <= max_dim {
        return (width, height);
    }
    let ratio = (max_dim as f32 / width as f32).min(max_dim as f32 / height as f32);
    (
        ((width as f32) * ratio).round() as u32,
        ((height as f32) * ratio).round() as u32,
    )
}

fn encode_jpeg(img: &DynamicImage, quality: u8) -> AppResult<Vec<u8>> {
    let mut buf = Vec::new();
    let mut cursor = Cursor::new(&mut buf);
    img.write_to(&mut cursor, ImageOutputFormat::Jpeg(quality))
        .map_err(|e| AppError::BadRequest(format!("failed to encode JPEG: {e}")))?;
    Ok(buf)
}
