use serde::{Deserialize, Serialize};

use crate::error::CompileError;
use crate::graph::{FilterGraph, FilterNode, StreamRef, TransitionStyle};

/// Alternate compilation mode: clips merged with cross-fades instead of
/// independently trimmed A/V. Audio gets no special handling in this mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionSpec {
    /// Duration of each clip in seconds, in timeline order.
    pub clip_durations: Vec<f64>,
    pub style: TransitionStyle,
    /// Length of each cross-fade in seconds.
    pub duration: f64,
}

/// Compile an N-clip cross-fade chain into a video-only graph.
///
/// Each merge overlaps the tail of the running output with the head of the
/// next clip, so every completed fade shortens the running total by the fade
/// duration. The offset for merge i must therefore be recomputed from that
/// shrinking cumulative total, not from a flat sum of clip durations —
/// a flat sum drifts further off with every clip past the second.
pub fn compile_transition_chain(
    spec: &TransitionSpec,
    sources: &[String],
) -> Result<FilterGraph, CompileError> {
    let d = &spec.clip_durations;
    let td = spec.duration;

    if d.is_empty() {
        return Err(CompileError::EmptyTimeline);
    }
    if sources.len() != d.len() {
        return Err(CompileError::Internal(format!(
            "{} sources for {} clip durations",
            sources.len(),
            d.len()
        )));
    }
    if d.len() >= 2 && td <= 0.0 {
        return Err(CompileError::InvalidTransitionDuration { duration: td });
    }
    for (index, &clip_duration) in d.iter().enumerate() {
        if clip_duration <= 0.0 {
            return Err(CompileError::InvalidClip {
                index,
                reason: format!("non-positive duration {clip_duration}"),
            });
        }
        // Every clip in a chain of >= 2 borders at least one fade.
        if d.len() >= 2 && td >= clip_duration {
            return Err(CompileError::TransitionTooLong {
                index,
                duration: td,
                clip_duration,
            });
        }
    }
    let inputs = sources.to_vec();
    let mut nodes = Vec::new();

    let video_out = match d.len() {
        // Nothing to merge; the lone input stream is the output.
        1 => {
            nodes.push(FilterNode::Retime {
                input: StreamRef::Video { input: 0 },
                output: "v0".into(),
            });
            "v0".to_string()
        }
        n => {
            // First merge consumes the two raw clips. With exactly two clips
            // it writes the terminal label directly; an intermediate would
            // be an unused indirection.
            let mut cumulative = d[0];
            let first_out = if n == 2 { "vout" } else { "m1" };
            nodes.push(FilterNode::Xfade {
                first: StreamRef::Video { input: 0 },
                second: StreamRef::Video { input: 1 },
                style: spec.style,
                duration: td,
                offset: d[0] - td,
                output: first_out.into(),
            });

            for i in 2..n {
                cumulative += d[i - 1] - td;
                let output = if i == n - 1 {
                    "vout".to_string()
                } else {
                    format!("m{i}")
                };
                nodes.push(FilterNode::Xfade {
                    first: StreamRef::label(format!("m{}", i - 1)),
                    second: StreamRef::Video { input: i },
                    style: spec.style,
                    duration: td,
                    offset: cumulative - td,
                    output,
                });
            }
            "vout".to_string()
        }
    };

    Ok(FilterGraph {
        inputs,
        nodes,
        video_out,
        audio_out: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(durations: &[f64], td: f64) -> (TransitionSpec, Vec<String>) {
        let sources = (0..durations.len()).map(|i| format!("clip{i}.mp4")).collect();
        (
            TransitionSpec {
                clip_durations: durations.to_vec(),
                style: TransitionStyle::Fade,
                duration: td,
            },
            sources,
        )
    }

    fn xfade_offsets(graph: &FilterGraph) -> Vec<f64> {
        graph
            .nodes
            .iter()
            .filter_map(|n| match n {
                FilterNode::Xfade { offset, .. } => Some(*offset),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn two_clips_merge_directly_to_the_output() {
        let (spec, sources) = spec(&[6.0, 4.0], 1.0);
        let graph = compile_transition_chain(&spec, &sources).unwrap();

        assert_eq!(graph.nodes.len(), 1);
        assert_eq!(graph.video_out, "vout");
        assert_eq!(graph.audio_out, None);
        assert_eq!(xfade_offsets(&graph), vec![5.0]);
    }

    #[test]
    fn three_clip_offset_counts_the_first_fade_once() {
        let (spec, sources) = spec(&[5.0, 4.0, 3.0], 1.0);
        let graph = compile_transition_chain(&spec, &sources).unwrap();

        // Second offset is (d0 + (d1 - td)) - td, not d0 + d1 - td.
        assert_eq!(xfade_offsets(&graph), vec![4.0, 7.0]);
    }

    #[test]
    fn four_clip_chain_cascades_the_shortening() {
        let (spec, sources) = spec(&[5.0, 5.0, 5.0, 5.0], 1.0);
        let graph = compile_transition_chain(&spec, &sources).unwrap();

        // cumulative: 5, 9, 13 -> offsets 4, 8, 12
        assert_eq!(xfade_offsets(&graph), vec![4.0, 8.0, 12.0]);

        // Intermediates chain m1 -> m2 -> vout.
        let outputs: Vec<&str> = graph.nodes.iter().map(|n| n.output()).collect();
        assert_eq!(outputs, vec!["m1", "m2", "vout"]);
        match &graph.nodes[1] {
            FilterNode::Xfade { first, .. } => assert_eq!(*first, StreamRef::label("m1")),
            other => panic!("expected Xfade, got {other:?}"),
        }
    }

    #[test]
    fn single_clip_needs_no_fade() {
        let (spec, sources) = spec(&[5.0], 1.0);
        let graph = compile_transition_chain(&spec, &sources).unwrap();
        assert!(xfade_offsets(&graph).is_empty());
        assert_eq!(graph.video_out, "v0");
    }

    #[test]
    fn oversized_transition_is_rejected() {
        let (spec, sources) = spec(&[5.0, 2.0, 5.0], 2.0);
        let err = compile_transition_chain(&spec, &sources).unwrap_err();
        assert!(matches!(
            err,
            CompileError::TransitionTooLong { index: 1, .. }
        ));
    }

    #[test]
    fn non_positive_transition_duration_is_a_validation_error() {
        let (spec, sources) = spec(&[5.0, 4.0], 0.0);
        let err = compile_transition_chain(&spec, &sources).unwrap_err();
        assert!(matches!(
            err,
            CompileError::InvalidTransitionDuration { duration } if duration == 0.0
        ));

        // A lone clip never fades, so its duration field is not validated.
        let (spec, sources) = self::spec(&[5.0], 0.0);
        assert!(compile_transition_chain(&spec, &sources).is_ok());
    }

    #[test]
    fn chain_compilation_is_deterministic() {
        let (spec, sources) = spec(&[5.0, 4.0, 3.0, 6.0], 0.5);
        let a = compile_transition_chain(&spec, &sources).unwrap();
        let b = compile_transition_chain(&spec, &sources).unwrap();
        assert_eq!(a, b);
    }
}
