use crate::clip::{normalize_clips, TimelineClip};
use crate::cursor::{place_clips, PlacedClip};
use crate::error::CompileError;
use crate::graph::{ConcatMode, FilterGraph, FilterNode, StreamRef};
use crate::render::OutputSpec;

/// Terminal label for the composited video stream.
pub const VIDEO_OUT: &str = "vout";
/// Terminal label for the composited audio stream.
pub const AUDIO_OUT: &str = "aout";

/// Compile an ordered clip list into a processing graph with one video
/// output and, when the job requests audio, one audio output.
///
/// The pass is pure and deterministic: the same clips and settings always
/// produce a structurally identical graph. All timing state lives in the
/// placement computed up front; nothing here re-derives or advances it.
pub fn compile_timeline(
    clips: &[TimelineClip],
    output: &OutputSpec,
) -> Result<FilterGraph, CompileError> {
    let placement = place_clips(normalize_clips(clips)?);

    let mut inputs: Vec<String> = Vec::new();
    let mut nodes: Vec<FilterNode> = Vec::new();

    for (i, placed) in placement.clips.iter().enumerate() {
        let video_input = inputs.len();
        inputs.push(placed.clip.clip.video_source.clone());

        emit_video_chain(&mut nodes, placed, i, video_input, output.frame_rate);

        if output.include_audio {
            // A clip without a separate audio track takes audio from its
            // video file, so the same input index serves both chains.
            let audio_input = match &placed.clip.clip.audio_source {
                Some(source) => {
                    inputs.push(source.clone());
                    inputs.len() - 1
                }
                None => video_input,
            };
            emit_audio_chain(&mut nodes, placed, i, audio_input);
        }
    }

    let n = placement.clips.len();

    // Merge stage. A single clip aliases its chain output straight to the
    // terminal label; a one-input concat or mix would be a degenerate merge.
    let video_out = if n == 1 {
        video_label(0)
    } else {
        nodes.push(FilterNode::Concat {
            inputs: (0..n).map(|i| StreamRef::label(video_label(i))).collect(),
            mode: ConcatMode::Video,
            output: VIDEO_OUT.into(),
        });
        VIDEO_OUT.into()
    };

    // Audio merges with a "longest" policy so delayed L-cut tails survive,
    // then pads to the cursor's total. The pad comes after the mix: it is
    // the one place the audio duration is forced to equal the picture's.
    let audio_out = if output.include_audio {
        let mix_out = if n == 1 {
            StreamRef::label(audio_label(0))
        } else {
            nodes.push(FilterNode::Mix {
                inputs: (0..n).map(|i| StreamRef::label(audio_label(i))).collect(),
                output: "amixed".into(),
            });
            StreamRef::label("amixed")
        };
        nodes.push(FilterNode::Pad {
            input: mix_out,
            target_duration: placement.total_duration,
            output: AUDIO_OUT.into(),
        });
        Some(AUDIO_OUT.to_string())
    } else {
        None
    };

    Ok(FilterGraph {
        inputs,
        nodes,
        video_out,
        audio_out,
    })
}

fn video_label(i: usize) -> String {
    format!("v{i}")
}

fn audio_label(i: usize) -> String {
    format!("a{i}")
}

fn emit_video_chain(
    nodes: &mut Vec<FilterNode>,
    placed: &PlacedClip,
    i: usize,
    input: usize,
    fps: f64,
) {
    let clip = &placed.clip.clip;
    nodes.push(FilterNode::Trim {
        input: StreamRef::Video { input },
        start: clip.trim_start,
        end: clip.trim_end,
        output: format!("v{i}t"),
    });
    nodes.push(FilterNode::Retime {
        input: StreamRef::label(format!("v{i}t")),
        output: format!("v{i}p"),
    });
    nodes.push(FilterNode::RateConvert {
        input: StreamRef::label(format!("v{i}p")),
        fps,
        output: video_label(i),
    });
}

fn emit_audio_chain(nodes: &mut Vec<FilterNode>, placed: &PlacedClip, i: usize, input: usize) {
    let clip = &placed.clip.clip;
    let raw_delay_ms = ((placed.global_start + placed.clip.audio_offset) * 1000.0).round() as i64;

    // J-cut clamp: audio cannot be scheduled before the timeline origin.
    // The overrun is trimmed off the front of the audio instead of shifting
    // the whole timeline, so every other clip keeps its placement and only
    // the impossible lead-in is discarded.
    let (audio_trim_start, delay_ms) = if raw_delay_ms < 0 {
        (clip.audio_trim_start + (-raw_delay_ms) as f64 / 1000.0, 0)
    } else {
        (clip.audio_trim_start, raw_delay_ms)
    };

    nodes.push(FilterNode::AudioTrim {
        input: StreamRef::Audio { input },
        start: audio_trim_start,
        end: clip.audio_trim_end,
        output: format!("a{i}t"),
    });
    nodes.push(FilterNode::AudioRetime {
        input: StreamRef::label(format!("a{i}t")),
        output: format!("a{i}p"),
    });
    nodes.push(FilterNode::AudioGain {
        input: StreamRef::label(format!("a{i}p")),
        gain: placed.clip.audio_gain,
        output: format!("a{i}g"),
    });
    nodes.push(FilterNode::AudioDelay {
        input: StreamRef::label(format!("a{i}g")),
        delay_ms,
        output: audio_label(i),
    });
}
