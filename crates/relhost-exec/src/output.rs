use serde::Deserialize;
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, BufReader},
    sync::oneshot,
};
use tracing::{debug, info, warn};

/// Logging of worker stdout/stderr.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Lines longer than this are truncated in the log.
    pub max_line_length: usize,
    /// Log stdout at INFO (otherwise DEBUG).
    pub stdout_info: bool,
    /// Log stderr at WARN (otherwise DEBUG).
    pub stderr_warn: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            max_line_length: 4096,
            stdout_info: true,
            stderr_warn: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Stream {
    Stdout,
    Stderr,
}

impl Stream {
    fn as_str(self) -> &'static str {
        match self {
            Stream::Stdout => "stdout",
            Stream::Stderr => "stderr",
        }
    }
}

/// Log every line of `reader`; fire `ready` on the first line equal to `marker`.
pub(crate) async fn pump<R>(
    reader: R,
    stream: Stream,
    worker: String,
    cfg: OutputConfig,
    marker: Option<String>,
    mut ready: Option<oneshot::Sender<()>>,
) where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                debug!(worker = %worker, stream = stream.as_str(), error = %e, "output stream failed");
                break;
            }
        };

        if let (Some(marker), Some(_)) = (&marker, &ready) {
            if line.trim() == marker {
                if let Some(tx) = ready.take() {
                    let _ = tx.send(());
                }
                debug!(worker = %worker, "readiness marker seen");
                continue;
            }
        }

        let text = truncate(&line, cfg.max_line_length);
        match stream {
            Stream::Stdout if cfg.stdout_info => info!(worker = %worker, stream = "stdout", "{text}"),
            Stream::Stderr if cfg.stderr_warn => warn!(worker = %worker, stream = "stderr", "{text}"),
            _ => debug!(worker = %worker, stream = stream.as_str(), "{text}"),
        }
    }
}

/// Cut `line` to at most `max` bytes on a char boundary.
fn truncate(line: &str, max: usize) -> &str {
    if line.len() <= max {
        return line;
    }
    let mut cut = max;
    while !line.is_char_boundary(cut) {
        cut -= 1;
    }
    &line[..cut]
}
