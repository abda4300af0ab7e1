//! Machine-readable report lines on stdout.
//!
//! # Important
//!
//! - **stdout**: one JSON object per line, nothing else
//! - **stderr**: logs (the binaries point `tracing` there)
//! - Lines end in a bare `\n`, never `\r\n`

use std::io::Write;

use serde::Serialize;

use crate::dispatch::{RenderStats, SessionStats};
use crate::error::Result;

/// Events the binaries report.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ReportLine {
    /// The server is bound and accepting.
    Listening {
        /// Bound port (useful when 0 was requested).
        port: u16,
    },
    /// The client finished and wrote the image.
    Rendered {
        /// Canvas width.
        width: u32,
        /// Canvas height.
        height: u32,
        /// Number of work items.
        items: usize,
        /// Per-session completions.
        sessions: Vec<SessionStats>,
        /// Items recovered from lost sessions.
        requeued: usize,
        /// Render time in milliseconds.
        elapsed_ms: u64,
        /// Image path.
        output: String,
    },
}

impl ReportLine {
    /// Report line for a finished render.
    pub fn rendered(width: u32, height: u32, stats: &RenderStats, output: impl Into<String>) -> Self {
        ReportLine::Rendered {
            width,
            height,
            items: stats.items,
            sessions: stats.sessions.clone(),
            requeued: stats.requeued,
            elapsed_ms: stats.elapsed.as_millis() as u64,
            output: output.into(),
        }
    }
}

/// Write `line` followed by a single `\n` to `out` and flush.
pub fn write_line<W: Write>(out: &mut W, line: &str) -> std::io::Result<()> {
    out.write_all(line.as_bytes())?;
    out.write_all(b"\n")?;
    out.flush()
}

/// Serialize `value` as one JSON line to `out`.
pub fn write_json<W: Write, T: Serialize>(out: &mut W, value: &T) -> Result<()> {
    let json = serde_json::to_string(value)?;
    write_line(out, &json)?;
    Ok(())
}

/// Serialize `value` as one JSON line to stdout.
pub fn write_stdout_json<T: Serialize>(value: &T) -> Result<()> {
    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    write_json(&mut handle, value)
}
