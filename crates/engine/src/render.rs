use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::graph::{ConcatMode, FilterGraph, FilterNode, StreamRef};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Codec {
    /// Wide-compatibility delivery: 8-bit 4:2:0 H.264 with AAC audio.
    H264,
    /// Mezzanine: 10-bit 4:2:2 ProRes 422 HQ with PCM audio.
    ProRes422,
}

/// What the encoder is asked to produce from a compiled graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputSpec {
    pub codec: Codec,
    /// Output frame rate; the encoder is forced to constant frame rate.
    pub frame_rate: f64,
    pub include_audio: bool,
}

/// A fully rendered encoder invocation. The argument vector is everything
/// between `ffmpeg` and nothing: inputs, filter_complex, maps, codec tail,
/// output path.
#[derive(Debug, Clone)]
pub struct RenderCommand {
    pub ffmpeg_args: Vec<String>,
    pub output_path: PathBuf,
}

/// Spell a compiled graph in ffmpeg's filter_complex syntax and assemble the
/// full argument vector. This is the only place encoder syntax exists; the
/// graph itself stays a structural IR so tests can assert on meaning rather
/// than on strings.
pub fn render_ffmpeg_command(
    graph: &FilterGraph,
    spec: &OutputSpec,
    output_path: &Path,
) -> RenderCommand {
    let mut args: Vec<String> = Vec::new();

    for input in &graph.inputs {
        args.push("-i".into());
        args.push(input.clone());
    }

    if !graph.nodes.is_empty() {
        let filter_complex = graph
            .nodes
            .iter()
            .map(render_node)
            .collect::<Vec<_>>()
            .join(";");
        args.push("-filter_complex".into());
        args.push(filter_complex);
    }

    args.push("-map".into());
    args.push(format!("[{}]", graph.video_out));
    match (&graph.audio_out, spec.include_audio) {
        (Some(label), true) => {
            args.push("-map".into());
            args.push(format!("[{label}]"));
        }
        _ => args.push("-an".into()),
    }

    // Constant frame rate is required for deterministic A/V sync.
    args.push("-r".into());
    args.push(fmt_f64(spec.frame_rate));
    args.push("-fps_mode".into());
    args.push("cfr".into());

    match spec.codec {
        Codec::H264 => {
            args.extend(
                [
                    "-c:v",
                    "libx264",
                    "-preset",
                    "medium",
                    "-crf",
                    "23",
                    "-pix_fmt",
                    "yuv420p",
                ]
                .map(String::from),
            );
            if spec.include_audio {
                args.extend(["-c:a", "aac", "-b:a", "192k"].map(String::from));
            }
        }
        Codec::ProRes422 => {
            args.extend(
                [
                    "-c:v",
                    "prores_ks",
                    "-profile:v",
                    "3",
                    "-pix_fmt",
                    "yuv422p10le",
                ]
                .map(String::from),
            );
            if spec.include_audio {
                args.extend(["-c:a", "pcm_s16le"].map(String::from));
            }
        }
    }

    args.push("-y".into());
    args.push(output_path.to_string_lossy().to_string());

    RenderCommand {
        ffmpeg_args: args,
        output_path: output_path.to_path_buf(),
    }
}

fn render_stream_ref(stream: &StreamRef) -> String {
    match stream {
        StreamRef::Video { input } => format!("[{input}:v]"),
        StreamRef::Audio { input } => format!("[{input}:a]"),
        StreamRef::Label { name } => format!("[{name}]"),
    }
}

fn render_node(node: &FilterNode) -> String {
    match node {
        FilterNode::Trim {
            input,
            start,
            end,
            output,
        } => format!(
            "{}trim=start={}:end={}[{output}]",
            render_stream_ref(input),
            fmt_f64(*start),
            fmt_f64(*end)
        ),
        FilterNode::Retime { input, output } => {
            format!("{}setpts=PTS-STARTPTS[{output}]", render_stream_ref(input))
        }
        FilterNode::RateConvert { input, fps, output } => {
            format!("{}fps=fps={}[{output}]", render_stream_ref(input), fmt_f64(*fps))
        }
        FilterNode::AudioTrim {
            input,
            start,
            end,
            output,
        } => format!(
            "{}atrim=start={}:end={}[{output}]",
            render_stream_ref(input),
            fmt_f64(*start),
            fmt_f64(*end)
        ),
        FilterNode::AudioRetime { input, output } => {
            format!("{}asetpts=PTS-STARTPTS[{output}]", render_stream_ref(input))
        }
        FilterNode::AudioGain {
            input,
            gain,
            output,
        } => format!(
            "{}volume={}[{output}]",
            render_stream_ref(input),
            fmt_f64(*gain)
        ),
        FilterNode::AudioDelay {
            input,
            delay_ms,
            output,
        } => format!(
            "{}adelay=delays={delay_ms}:all=1[{output}]",
            render_stream_ref(input)
        ),
        FilterNode::Concat {
            inputs,
            mode,
            output,
        } => {
            let refs: String = inputs.iter().map(render_stream_ref).collect();
            let (v, a) = match mode {
                ConcatMode::Video => (1, 0),
                ConcatMode::Audio => (0, 1),
            };
            format!("{refs}concat=n={}:v={v}:a={a}[{output}]", inputs.len())
        }
        FilterNode::Mix { inputs, output } => {
            let refs: String = inputs.iter().map(render_stream_ref).collect();
            format!(
                "{refs}amix=inputs={}:duration=longest:normalize=0[{output}]",
                inputs.len()
            )
        }
        FilterNode::Pad {
            input,
            target_duration,
            output,
        } => format!(
            "{}apad=whole_dur={}[{output}]",
            render_stream_ref(input),
            fmt_f64(*target_duration)
        ),
        FilterNode::Xfade {
            first,
            second,
            style,
            duration,
            offset,
            output,
        } => format!(
            "{}{}xfade=transition={}:duration={}:offset={}[{output}]",
            render_stream_ref(first),
            render_stream_ref(second),
            style.as_ffmpeg(),
            fmt_f64(*duration),
            fmt_f64(*offset)
        ),
    }
}

// ffmpeg accepts "5" and "2.5"; Rust's default Display for f64 gives exactly
// that without trailing zeros.
fn fmt_f64(value: f64) -> String {
    format!("{value}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clip::TimelineClip;
    use crate::compiler::compile_timeline;

    fn find_arg<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
        args.iter()
            .position(|a| a == flag)
            .and_then(|i| args.get(i + 1))
            .map(String::as_str)
    }

    #[test]
    fn renders_trim_chain_in_ffmpeg_syntax() {
        let spec = OutputSpec {
            codec: Codec::H264,
            frame_rate: 30.0,
            include_audio: false,
        };
        let graph = compile_timeline(&[TimelineClip::new("in.mp4", 2.0, 7.0)], &spec).unwrap();
        let cmd = render_ffmpeg_command(&graph, &spec, Path::new("out.mp4"));

        let filter = find_arg(&cmd.ffmpeg_args, "-filter_complex").unwrap();
        assert_eq!(
            filter,
            "[0:v]trim=start=2:end=7[v0t];[v0t]setpts=PTS-STARTPTS[v0p];[v0p]fps=fps=30[v0]"
        );
        assert_eq!(find_arg(&cmd.ffmpeg_args, "-map"), Some("[v0]"));
        assert!(cmd.ffmpeg_args.contains(&"-an".to_string()));
        assert_eq!(find_arg(&cmd.ffmpeg_args, "-r"), Some("30"));
        assert_eq!(cmd.ffmpeg_args.last().unwrap(), "out.mp4");
    }

    #[test]
    fn audio_nodes_render_delay_mix_and_pad() {
        let spec = OutputSpec {
            codec: Codec::H264,
            frame_rate: 24.0,
            include_audio: true,
        };
        let clips = vec![
            TimelineClip::new("a.mp4", 0.0, 4.0),
            TimelineClip::new("b.mp4", 0.0, 3.0),
        ];
        let graph = compile_timeline(&clips, &spec).unwrap();
        let cmd = render_ffmpeg_command(&graph, &spec, Path::new("out.mp4"));

        let filter = find_arg(&cmd.ffmpeg_args, "-filter_complex").unwrap();
        assert!(filter.contains("adelay=delays=0:all=1[a0]"));
        assert!(filter.contains("adelay=delays=4000:all=1[a1]"));
        assert!(filter.contains("amix=inputs=2:duration=longest:normalize=0[amixed]"));
        assert!(filter.contains("[amixed]apad=whole_dur=7[aout]"));
        assert!(filter.contains("concat=n=2:v=1:a=0[vout]"));

        let maps: Vec<&str> = cmd
            .ffmpeg_args
            .iter()
            .zip(cmd.ffmpeg_args.iter().skip(1))
            .filter(|(flag, _)| *flag == "-map")
            .map(|(_, value)| value.as_str())
            .collect();
        assert_eq!(maps, vec!["[vout]", "[aout]"]);
    }

    #[test]
    fn prores_profile_is_the_mezzanine_arg_set() {
        let spec = OutputSpec {
            codec: Codec::ProRes422,
            frame_rate: 25.0,
            include_audio: true,
        };
        let graph = compile_timeline(&[TimelineClip::new("in.mov", 0.0, 2.0)], &spec).unwrap();
        let cmd = render_ffmpeg_command(&graph, &spec, Path::new("out.mov"));

        assert_eq!(find_arg(&cmd.ffmpeg_args, "-c:v"), Some("prores_ks"));
        assert_eq!(find_arg(&cmd.ffmpeg_args, "-pix_fmt"), Some("yuv422p10le"));
        assert_eq!(find_arg(&cmd.ffmpeg_args, "-c:a"), Some("pcm_s16le"));
    }
}
