use anyhow::{Context, Result};
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use engine::{
    compile_timeline, compile_transition_chain, normalize_clips, render_ffmpeg_command, Codec,
    OutputSpec, TimelineClip, TransitionSpec, TransitionStyle,
};

use crate::executor::RenderExecutor;
use crate::jobs::workdir::JobDir;
use crate::jobs::JobManager;
use crate::media::fetch::SourceFetcher;
use crate::media::probe;

/// Payload of a RenderTimeline job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineRenderRequest {
    pub clips: Vec<TimelineClip>,
    pub output: OutputSpec,
    /// Where the finished file is delivered. Uploading it further is the
    /// output sink's business, not ours.
    pub destination: PathBuf,
}

/// Payload of a RenderTransition job: clips merged with cross-fades, no
/// independent audio control.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionRenderRequest {
    pub sources: Vec<String>,
    pub style: TransitionStyle,
    pub transition_duration: f64,
    pub frame_rate: f64,
    pub codec: Codec,
    pub destination: PathBuf,
}

/// Everything a render job needs besides its payload.
pub struct RenderContext {
    pub job_manager: Arc<JobManager>,
    pub fetcher: Arc<dyn SourceFetcher>,
    pub executor: Arc<dyn RenderExecutor>,
    pub jobs_dir: PathBuf,
    pub fetch_concurrency: usize,
}

pub async fn run_timeline_job(
    ctx: &RenderContext,
    job_id: i64,
    req: TimelineRenderRequest,
    cancel: CancellationToken,
) -> Result<PathBuf> {
    let dir = JobDir::create(&ctx.jobs_dir, job_id).await?;
    let result = timeline_job_inner(ctx, job_id, &req, cancel, dir.path()).await;
    dir.cleanup().await;
    result
}

async fn timeline_job_inner(
    ctx: &RenderContext,
    job_id: i64,
    req: &TimelineRenderRequest,
    cancel: CancellationToken,
    workdir: &Path,
) -> Result<PathBuf> {
    // Total output duration is fixed by the clip list alone; compute it
    // before any I/O so progress fractions have a denominator.
    let total_duration: f64 = normalize_clips(&req.clips)?
        .iter()
        .map(|c| c.video_duration)
        .sum();

    let mut sources: Vec<String> = Vec::new();
    for clip in &req.clips {
        sources.push(clip.video_source.clone());
        if let Some(audio) = &clip.audio_source {
            sources.push(audio.clone());
        }
    }
    let resolved = fetch_sources(ctx, &sources, workdir).await?;

    let local_clips: Vec<TimelineClip> = req
        .clips
        .iter()
        .map(|clip| {
            let mut local = clip.clone();
            local.video_source = resolved[&clip.video_source].clone();
            local.audio_source = clip.audio_source.as_ref().map(|a| resolved[a].clone());
            local
        })
        .collect();

    if req.output.include_audio {
        ensure_audio_streams(&local_clips).await?;
    }

    // Compilation must complete before the encoder is invoked: the graph is
    // the encoder's input.
    let graph = compile_timeline(&local_clips, &req.output)?;
    let staging = workdir.join(format!("render.{}", container_ext(req.output.codec)));
    let cmd = render_ffmpeg_command(&graph, &req.output, &staging);

    info!(
        "job {job_id}: encoding {} clips, {total_duration:.3}s total",
        req.clips.len()
    );
    let job_manager = ctx.job_manager.clone();
    ctx.executor
        .execute(&cmd, total_duration, cancel, &move |fraction| {
            let _ = job_manager.set_progress(job_id, fraction);
        })
        .await?;

    deliver(&staging, &req.destination).await?;
    Ok(req.destination.clone())
}

/// Every clip in an audio render must have an audio stream to trim and
/// delay, or ffmpeg dies mid-encode with an opaque stream-mapping error.
/// Probe each audio-bearing source up front and fail with the clip index.
async fn ensure_audio_streams(clips: &[TimelineClip]) -> Result<()> {
    for (index, clip) in clips.iter().enumerate() {
        let source = clip.audio_source.as_ref().unwrap_or(&clip.video_source);
        let info = probe::probe(Path::new(source)).await?;
        if !info.has_audio {
            anyhow::bail!("clip {index}: source {source} has no audio stream");
        }
    }
    Ok(())
}

pub async fn run_transition_job(
    ctx: &RenderContext,
    job_id: i64,
    req: TransitionRenderRequest,
    cancel: CancellationToken,
) -> Result<PathBuf> {
    let dir = JobDir::create(&ctx.jobs_dir, job_id).await?;
    let result = transition_job_inner(ctx, job_id, &req, cancel, dir.path()).await;
    dir.cleanup().await;
    result
}

async fn transition_job_inner(
    ctx: &RenderContext,
    job_id: i64,
    req: &TransitionRenderRequest,
    cancel: CancellationToken,
    workdir: &Path,
) -> Result<PathBuf> {
    let resolved = fetch_sources(ctx, &req.sources, workdir).await?;
    let local_sources: Vec<String> = req.sources.iter().map(|s| resolved[s].clone()).collect();

    // Transition mode trims nothing, so clip durations come from the media
    // itself.
    let mut clip_durations = Vec::with_capacity(local_sources.len());
    for source in &local_sources {
        let info = probe::probe(Path::new(source)).await?;
        clip_durations.push(info.duration_seconds);
    }

    let spec = TransitionSpec {
        clip_durations: clip_durations.clone(),
        style: req.style,
        duration: req.transition_duration,
    };
    let graph = compile_transition_chain(&spec, &local_sources)?;

    // Each completed fade overlaps two clips, shortening the output.
    let merges = clip_durations.len().saturating_sub(1) as f64;
    let total_duration = clip_durations.iter().sum::<f64>() - merges * req.transition_duration;

    let output = OutputSpec {
        codec: req.codec,
        frame_rate: req.frame_rate,
        include_audio: false,
    };
    let staging = workdir.join(format!("render.{}", container_ext(req.codec)));
    let cmd = render_ffmpeg_command(&graph, &output, &staging);

    info!(
        "job {job_id}: cross-fade chain of {} clips, {total_duration:.3}s total",
        local_sources.len()
    );
    let job_manager = ctx.job_manager.clone();
    ctx.executor
        .execute(&cmd, total_duration, cancel, &move |fraction| {
            let _ = job_manager.set_progress(job_id, fraction);
        })
        .await?;

    deliver(&staging, &req.destination).await?;
    Ok(req.destination.clone())
}

/// Resolve every distinct source once, with a bounded number of fetches in
/// flight. Any single failure aborts the whole job; compiling against a
/// partial source set would silently drop clips.
async fn fetch_sources(
    ctx: &RenderContext,
    sources: &[String],
    workdir: &Path,
) -> Result<HashMap<String, String>> {
    let mut distinct: Vec<String> = Vec::new();
    for source in sources {
        if !distinct.contains(source) {
            distinct.push(source.clone());
        }
    }

    stream::iter(distinct)
        .map(|source| {
            let fetcher = ctx.fetcher.clone();
            let workdir = workdir.to_path_buf();
            async move {
                let local = fetcher
                    .fetch(&source, &workdir)
                    .await
                    .with_context(|| format!("fetching source {source}"))?;
                Ok::<_, anyhow::Error>((source, local.to_string_lossy().into_owned()))
            }
        })
        .buffer_unordered(ctx.fetch_concurrency.max(1))
        .try_collect()
        .await
}

fn container_ext(codec: Codec) -> &'static str {
    match codec {
        Codec::H264 => "mp4",
        Codec::ProRes422 => "mov",
    }
}

/// Move the staged render to its destination. Rename first; fall back to
/// copy-and-remove when the destination sits on another filesystem.
async fn deliver(staging: &Path, destination: &Path) -> Result<()> {
    if let Some(parent) = destination.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    if tokio::fs::rename(staging, destination).await.is_err() {
        tokio::fs::copy(staging, destination)
            .await
            .with_context(|| format!("copying render to {}", destination.display()))?;
        let _ = tokio::fs::remove_file(staging).await;
    }
    Ok(())
}
