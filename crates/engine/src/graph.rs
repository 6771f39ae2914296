use serde::{Deserialize, Serialize};

/// Reference to a stream consumed by a filter node: either a demuxed stream
/// of one of the graph's input files, or the labeled output of an earlier
/// node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum StreamRef {
    /// Video stream of input file `input` (ffmpeg `[N:v]`).
    Video { input: usize },
    /// Audio stream of input file `input` (ffmpeg `[N:a]`).
    Audio { input: usize },
    /// Labeled output of an earlier node.
    Label { name: String },
}

impl StreamRef {
    pub fn label(name: impl Into<String>) -> Self {
        StreamRef::Label { name: name.into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConcatMode {
    Video,
    Audio,
}

/// Visual style of a cross-fade merge, matching ffmpeg's xfade transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionStyle {
    Fade,
    Dissolve,
    WipeLeft,
    WipeRight,
    SlideUp,
    SlideDown,
}

impl TransitionStyle {
    pub fn as_ffmpeg(&self) -> &'static str {
        match self {
            TransitionStyle::Fade => "fade",
            TransitionStyle::Dissolve => "dissolve",
            TransitionStyle::WipeLeft => "wipeleft",
            TransitionStyle::WipeRight => "wiperight",
            TransitionStyle::SlideUp => "slideup",
            TransitionStyle::SlideDown => "slidedown",
        }
    }
}

/// One operation in the processing graph. Each node consumes the streams it
/// names and produces exactly one labeled output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum FilterNode {
    /// Cut a video stream to [start, end) seconds of its source.
    Trim {
        input: StreamRef,
        start: f64,
        end: f64,
        output: String,
    },
    /// Reset video presentation timestamps to start at zero after a trim.
    Retime { input: StreamRef, output: String },
    /// Resample a video stream to a constant frame rate.
    RateConvert {
        input: StreamRef,
        fps: f64,
        output: String,
    },
    /// Cut an audio stream to [start, end) seconds of its source.
    AudioTrim {
        input: StreamRef,
        start: f64,
        end: f64,
        output: String,
    },
    /// Reset audio presentation timestamps to start at zero after a trim.
    AudioRetime { input: StreamRef, output: String },
    /// Scale audio amplitude by a multiplier.
    AudioGain {
        input: StreamRef,
        gain: f64,
        output: String,
    },
    /// Shift an audio stream later on the timeline by a whole number of
    /// milliseconds. Zero is legal and means "already in place".
    AudioDelay {
        input: StreamRef,
        delay_ms: i64,
        output: String,
    },
    /// Join streams end to end.
    Concat {
        inputs: Vec<StreamRef>,
        mode: ConcatMode,
        output: String,
    },
    /// Overlay audio streams; the result lasts as long as the longest input
    /// so L/J-cut tails that extend past their clip boundary survive.
    Mix {
        inputs: Vec<StreamRef>,
        output: String,
    },
    /// Extend audio with silence up to exactly `target_duration` seconds.
    Pad {
        input: StreamRef,
        target_duration: f64,
        output: String,
    },
    /// Cross-fade from `first` into `second`, starting `offset` seconds into
    /// `first` and blending over `duration` seconds.
    Xfade {
        first: StreamRef,
        second: StreamRef,
        style: TransitionStyle,
        duration: f64,
        offset: f64,
        output: String,
    },
}

impl FilterNode {
    pub fn output(&self) -> &str {
        match self {
            FilterNode::Trim { output, .. }
            | FilterNode::Retime { output, .. }
            | FilterNode::RateConvert { output, .. }
            | FilterNode::AudioTrim { output, .. }
            | FilterNode::AudioRetime { output, .. }
            | FilterNode::AudioGain { output, .. }
            | FilterNode::AudioDelay { output, .. }
            | FilterNode::Concat { output, .. }
            | FilterNode::Mix { output, .. }
            | FilterNode::Pad { output, .. }
            | FilterNode::Xfade { output, .. } => output,
        }
    }
}

/// The compiled processing graph: input files in `-i` order, nodes in
/// emission order (every node appears after the nodes producing its inputs),
/// and the two terminal labels. `audio_out` is `None` when the job excludes
/// audio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterGraph {
    pub inputs: Vec<String>,
    pub nodes: Vec<FilterNode>,
    pub video_out: String,
    pub audio_out: Option<String>,
}

impl FilterGraph {
    /// Find the node producing a given label, if any. The terminal labels may
    /// instead alias a per-clip chain output directly.
    pub fn producer(&self, label: &str) -> Option<&FilterNode> {
        self.nodes.iter().find(|n| n.output() == label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nodes_serialize_with_type_tag() {
        let node = FilterNode::AudioDelay {
            input: StreamRef::label("a0g"),
            delay_ms: 5000,
            output: "a0".into(),
        };
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(json["type"], "AudioDelay");
        assert_eq!(json["delay_ms"], 5000);
    }

    #[test]
    fn producer_lookup_finds_emitting_node() {
        let graph = FilterGraph {
            inputs: vec!["a.mp4".into()],
            nodes: vec![FilterNode::Retime {
                input: StreamRef::Video { input: 0 },
                output: "v0".into(),
            }],
            video_out: "v0".into(),
            audio_out: None,
        };
        assert!(graph.producer("v0").is_some());
        assert!(graph.producer("missing").is_none());
    }
}
