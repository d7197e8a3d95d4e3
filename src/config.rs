use dotenvy::dotenv;
use std::env;
use std::time::Duration;

/// All tunables for the messaging core. Values come from the environment
/// with defaults matching the shipped product behavior; tests override
/// fields directly.
#[derive(Debug, Clone)]
pub struct Config {
    /// Typing indicator TTL since last renewal.
    pub typing_ttl_ms: u64,
    /// Window after creation during which the sender may edit.
    pub max_edit_minutes: i64,
    /// Window after creation during which the sender may delete for everyone.
    pub max_delete_minutes: i64,
    /// Edits beyond this length delta notify recipients.
    pub major_edit_delta: usize,

    /// Maximum pending attachments per message.
    pub max_attachments: usize,
    /// Target upper bound for compressed image payloads.
    pub max_image_bytes: usize,
    /// Longest edge after image resize.
    pub max_image_dimension: u32,
    /// JPEG quality walk: start, floor, step (percent points).
    pub image_quality_start: u8,
    pub image_quality_floor: u8,
    pub image_quality_step: u8,
    pub max_video_bytes: u64,
    pub max_video_duration_secs: u64,
    pub max_document_bytes: u64,
    /// Simulated staged-upload tick interval.
    pub upload_tick_ms: u64,
    /// Progress added per tick for videos / documents.
    pub video_progress_step: u8,
    pub document_progress_step: u8,

    /// Lifetime forwards of one message by one user.
    pub forward_limit: u32,

    /// A recipient counts as online if last seen within this window.
    pub presence_online_window_secs: i64,
    /// Delay before the first resolution phase (sending -> sent/failed).
    pub resolution_delay_ms: u64,
    /// Delay before the second phase (sent -> delivered).
    pub delivered_delay_ms: u64,
}

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key).ok().and_then(|s| s.parse().ok()).unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    env::var(key).ok().and_then(|s| s.parse().ok()).unwrap_or(default)
}

fn env_i64(key: &str, default: i64) -> i64 {
    env::var(key).ok().and_then(|s| s.parse().ok()).unwrap_or(default)
}

fn env_u8(key: &str, default: u8) -> u8 {
    env::var(key).ok().and_then(|s| s.parse().ok()).unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    env::var(key).ok().and_then(|s| s.parse().ok()).unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        Self {
            typing_ttl_ms: env_u64("TYPING_TTL_MS", 4_000),
            max_edit_minutes: env_i64("MAX_EDIT_MINUTES", 15),
            max_delete_minutes: env_i64("MAX_DELETE_MINUTES", 60),
            major_edit_delta: env_usize("MAJOR_EDIT_DELTA", 20),

            max_attachments: env_usize("MAX_ATTACHMENTS", 10),
            max_image_bytes: env_usize("MAX_IMAGE_BYTES", 2 * 1024 * 1024),
            max_image_dimension: env_u32("MAX_IMAGE_DIMENSION", 1920),
            image_quality_start: env_u8("IMAGE_QUALITY_START", 92),
            image_quality_floor: env_u8("IMAGE_QUALITY_FLOOR", 50),
            image_quality_step: env_u8("IMAGE_QUALITY_STEP", 7),
            max_video_bytes: env_u64("MAX_VIDEO_BYTES", 100 * 1024 * 1024),
            max_video_duration_secs: env_u64("MAX_VIDEO_DURATION_SECS", 5 * 60),
            max_document_bytes: env_u64("MAX_DOCUMENT_BYTES", 50 * 1024 * 1024),
            upload_tick_ms: env_u64("UPLOAD_TICK_MS", 120),
            video_progress_step: env_u8("VIDEO_PROGRESS_STEP", 8),
            document_progress_step: env_u8("DOCUMENT_PROGRESS_STEP", 12),

            forward_limit: env_u32("FORWARD_LIMIT", 5),

            presence_online_window_secs: env_i64("PRESENCE_ONLINE_WINDOW_SECS", 120),
            resolution_delay_ms: env_u64("RESOLUTION_DELAY_MS", 400),
            delivered_delay_ms: env_u64("DELIVERED_DELAY_MS", 500),
        }
    }

    pub fn typing_ttl(&self) -> Duration {
        Duration::from_millis(self.typing_ttl_ms)
    }

    pub fn edit_window(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.max_edit_minutes)
    }

    pub fn delete_window(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.max_delete_minutes)
    }

    pub fn online_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.presence_online_window_secs)
    }

    pub fn resolution_delay(&self) -> Duration {
        Duration::from_millis(self.resolution_delay_ms)
    }

    pub fn delivered_delay(&self) -> Duration {
        Duration::from_millis(self.delivered_delay_ms)
    }

    pub fn upload_tick(&self) -> Duration {
        Duration::from_millis(self.upload_tick_ms)
    }
}
