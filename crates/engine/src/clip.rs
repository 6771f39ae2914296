use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CompileError;

pub const MIN_AUDIO_GAIN: f64 = 0.0;
pub const MAX_AUDIO_GAIN: f64 = 2.0;
pub const DEFAULT_AUDIO_GAIN: f64 = 1.0;

/// One slot in the edit, as submitted by the caller. Trim points are in
/// seconds into the source media. Audio trim points are independent of the
/// video trim points so a clip's audio can lead (J-cut) or lag (L-cut) its
/// picture.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineClip {
    pub id: String,
    pub video_source: String,
    /// Separate audio track. Absent means the clip's audio comes from
    /// `video_source` itself.
    #[serde(default)]
    pub audio_source: Option<String>,
    pub trim_start: f64,
    pub trim_end: f64,
    pub audio_trim_start: f64,
    pub audio_trim_end: f64,
    /// Volume multiplier in [0, 2]. Out-of-range values are clamped during
    /// normalization; missing means 1.0.
    #[serde(default)]
    pub audio_gain: Option<f64>,
    /// Whether the user intentionally decoupled audio from video boundaries.
    /// Informational only; the compiler always honors the explicit trim
    /// fields regardless.
    #[serde(default = "default_av_linked")]
    pub av_linked: bool,
}

fn default_av_linked() -> bool {
    true
}

impl TimelineClip {
    /// A clip whose audio boundaries track its video boundaries.
    pub fn new(video_source: impl Into<String>, trim_start: f64, trim_end: f64) -> Self {
        TimelineClip {
            id: Uuid::new_v4().to_string(),
            video_source: video_source.into(),
            audio_source: None,
            trim_start,
            trim_end,
            audio_trim_start: trim_start,
            audio_trim_end: trim_end,
            audio_gain: None,
            av_linked: true,
        }
    }
}

/// A validated clip plus the quantities derived from it. Produced once by
/// `normalize_clips` and treated as immutable from then on.
#[derive(Debug, Clone)]
pub struct NormalizedClip {
    pub clip: TimelineClip,
    /// `trim_end - trim_start`; always > 0.
    pub video_duration: f64,
    /// `audio_trim_start - trim_start`. Positive: audio lags video (L-cut).
    /// Negative: audio leads video (J-cut).
    pub audio_offset: f64,
    /// Clamped into [0, 2], defaulted to 1.0.
    pub audio_gain: f64,
}

/// Validate every clip and attach derived values. Fail-fast: the first bad
/// clip aborts the whole list, because dropping or truncating one clip would
/// corrupt the global offsets of every clip after it.
pub fn normalize_clips(clips: &[TimelineClip]) -> Result<Vec<NormalizedClip>, CompileError> {
    if clips.is_empty() {
        return Err(CompileError::EmptyTimeline);
    }

    let mut normalized = Vec::with_capacity(clips.len());
    for (index, clip) in clips.iter().enumerate() {
        if clip.trim_end <= clip.trim_start {
            return Err(CompileError::InvalidClip {
                index,
                reason: format!(
                    "non-positive video duration (trim {}..{})",
                    clip.trim_start, clip.trim_end
                ),
            });
        }
        if clip.audio_trim_end <= clip.audio_trim_start {
            return Err(CompileError::InvalidClip {
                index,
                reason: format!(
                    "non-positive audio duration (trim {}..{})",
                    clip.audio_trim_start, clip.audio_trim_end
                ),
            });
        }

        let audio_gain = clip
            .audio_gain
            .unwrap_or(DEFAULT_AUDIO_GAIN)
            .clamp(MIN_AUDIO_GAIN, MAX_AUDIO_GAIN);

        normalized.push(NormalizedClip {
            video_duration: clip.trim_end - clip.trim_start,
            audio_offset: clip.audio_trim_start - clip.trim_start,
            audio_gain,
            clip: clip.clone(),
        });
    }

    Ok(normalized)
}
