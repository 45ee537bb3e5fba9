//! Line forwarder -- feeds `<tag> <payload>` lines into the engine.
//!
//! Each input line is split at the first whitespace run: the left side is
//! the record tag, the remainder is the raw payload handed to
//! [`EngineHandle::ingest`]. Blank lines and lines without a payload are
//! skipped.

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::broadcast;

use logroute_engine::{EngineHandle, IngestOutcome};

/// Counters for one forwarding session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ForwardStats {
    /// Lines read from the input.
    pub lines: u64,
    /// Lines skipped because they had no tag or payload.
    pub skipped: u64,
    /// Records routed to an output buffer.
    pub delivered: u64,
    /// Records dropped by the router.
    pub dropped: u64,
    /// Records rejected by an output intake.
    pub rejected: u64,
}

/// Split a line into `(tag, payload)`.
pub fn parse_line(line: &str) -> Option<(&str, &str)> {
    let line = line.trim_end_matches(['\r', '\n']);
    let (tag, payload) = line.trim_start().split_once(char::is_whitespace)?;
    let payload = payload.trim_start();
    if tag.is_empty() || payload.is_empty() {
        return None;
    }
    Some((tag, payload))
}

/// Forward lines from `reader` until EOF or a shutdown signal.
///
/// A read error ends the session early and is logged.
pub async fn forward_lines<R>(
    reader: R,
    handle: EngineHandle,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> ForwardStats
where
    R: AsyncBufRead + Unpin,
{
    let mut stats = ForwardStats::default();
    let mut lines = reader.lines();

    loop {
        let line = tokio::select! {
            _ = shutdown_rx.recv() => {
                tracing::debug!("forwarder shutting down");
                break;
            }
            next = lines.next_line() => match next {
                Ok(Some(line)) => line,
                Ok(None) => {
                    tracing::info!(lines = stats.lines, "input reached EOF");
                    break;
                }
                Err(e) => {
                    tracing::error!(error = %e, "failed to read input line");
                    break;
                }
            },
        };

        stats.lines += 1;
        let Some((tag, payload)) = parse_line(&line) else {
            stats.skipped += 1;
            continue;
        };

        match handle.ingest(tag, payload.as_bytes()).await {
            IngestOutcome::Delivered { .. } => stats.delivered += 1,
            IngestOutcome::Dropped { .. } => stats.dropped += 1,
            IngestOutcome::Rejected { output, reason } => {
                stats.rejected += 1;
                tracing::warn!(tag = %tag, output = %output, reason = %reason, "record rejected");
            }
        }
    }

    stats
}
