use std::net::SocketAddr;
use std::path::PathBuf;

/// Runtime configuration, read once from the environment at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    /// Root for the job store and per-job scratch directories.
    pub data_dir: PathBuf,
    /// Renders running at once across all jobs.
    pub job_concurrency: usize,
    /// Source fetches in flight within one job.
    pub fetch_concurrency: usize,
    pub ffmpeg_path: String,
}

impl Config {
    pub fn from_env() -> Self {
        let port: u16 = env_parsed("RENDERD_PORT", 7878);
        Config {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], port)),
            data_dir: std::env::var("RENDERD_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(".cache/renderd")),
            job_concurrency: env_parsed("RENDERD_JOB_CONCURRENCY", 2),
            fetch_concurrency: env_parsed("RENDERD_FETCH_CONCURRENCY", 4),
            ffmpeg_path: std::env::var("RENDERD_FFMPEG").unwrap_or_else(|_| "ffmpeg".to_string()),
        }
    }
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
