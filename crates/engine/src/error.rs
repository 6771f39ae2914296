use thiserror::Error;

#[derive(Debug, Error)]
pub enum CompileError {
    /// A clip failed validation. The index identifies the offending clip in
    /// submission order so the failure can be reported against one slot.
    #[error("clip {index}: {reason}")]
    InvalidClip { index: usize, reason: String },

    #[error("timeline contains no clips")]
    EmptyTimeline,

    /// A cross-fade must be strictly shorter than every clip it touches,
    /// otherwise the xfade offset goes to zero or negative and the overlap
    /// timing is undefined.
    #[error(
        "transition duration {duration}s must be shorter than clip {index} ({clip_duration}s)"
    )]
    TransitionTooLong {
        index: usize,
        duration: f64,
        clip_duration: f64,
    },

    /// A chain of two or more clips needs a positive overlap to fade over.
    #[error("transition duration {duration}s must be positive")]
    InvalidTransitionDuration { duration: f64 },

    /// Graph construction hit a state that validated input cannot produce.
    #[error("internal compiler invariant violated: {0}")]
    Internal(String),
}
