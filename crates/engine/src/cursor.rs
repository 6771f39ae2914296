use crate::clip::NormalizedClip;

/// A clip bound to its position on the output timeline.
#[derive(Debug, Clone)]
pub struct PlacedClip {
    pub clip: NormalizedClip,
    /// Seconds from the start of the output at which this clip's video begins.
    pub global_start: f64,
}

/// Result of one placement pass. `total_duration` is the final cursor
/// position and is the authoritative output duration: the audio pad stage
/// later stretches or truncates nothing else to match it.
#[derive(Debug, Clone)]
pub struct Placement {
    pub clips: Vec<PlacedClip>,
    pub total_duration: f64,
}

/// Assign each clip its global start offset by folding over the list in
/// order. A fold (rather than a mutable cursor shared across the compiler)
/// keeps the accumulator local to this one pass; nothing downstream can
/// advance or re-derive it.
pub fn place_clips(clips: Vec<NormalizedClip>) -> Placement {
    let (clips, total_duration) =
        clips
            .into_iter()
            .fold((Vec::new(), 0.0_f64), |(mut placed, position), clip| {
                let duration = clip.video_duration;
                placed.push(PlacedClip {
                    clip,
                    global_start: position,
                });
                (placed, position + duration)
            });

    Placement {
        clips,
        total_duration,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clip::{normalize_clips, TimelineClip};

    fn clips(durations: &[f64]) -> Vec<NormalizedClip> {
        let raw: Vec<TimelineClip> = durations
            .iter()
            .map(|d| TimelineClip::new("a.mp4", 0.0, *d))
            .collect();
        normalize_clips(&raw).unwrap()
    }

    #[test]
    fn starts_are_contiguous_and_total_is_the_sum() {
        let placement = place_clips(clips(&[4.0, 2.5, 3.0]));
        let starts: Vec<f64> = placement.clips.iter().map(|p| p.global_start).collect();
        assert_eq!(starts, vec![0.0, 4.0, 6.5]);
        assert_eq!(placement.total_duration, 9.5);

        for pair in placement.clips.windows(2) {
            assert_eq!(
                pair[0].global_start + pair[0].clip.video_duration,
                pair[1].global_start
            );
        }
    }

    #[test]
    fn single_clip_starts_at_zero() {
        let placement = place_clips(clips(&[5.0]));
        assert_eq!(placement.clips[0].global_start, 0.0);
        assert_eq!(placement.total_duration, 5.0);
    }
}
