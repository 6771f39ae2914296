//! Pure timeline-to-filter-graph compilation.
//!
//! Everything in this crate is synchronous and deterministic: given the same
//! clip list and output settings it produces a structurally identical graph,
//! holds no state across calls, and performs no I/O. Execution of the
//! compiled graph belongs to the daemon.

pub mod clip;
pub mod compiler;
pub mod cursor;
pub mod error;
pub mod graph;
pub mod render;
pub mod transitions;

pub use clip::{normalize_clips, NormalizedClip, TimelineClip};
pub use compiler::{compile_timeline, AUDIO_OUT, VIDEO_OUT};
pub use error::CompileError;
pub use graph::{ConcatMode, FilterGraph, FilterNode, StreamRef, TransitionStyle};
pub use render::{render_ffmpeg_command, Codec, OutputSpec, RenderCommand};
pub use transitions::{compile_transition_chain, TransitionSpec};
