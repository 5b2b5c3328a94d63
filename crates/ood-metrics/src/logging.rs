//! Tracing subscriber setup
//!
//! Stdout output goes through the regular `fmt` layer. Syslog output is a
//! second `fmt` layer whose writer frames each record as an RFC 3164
//! datagram on `/dev/log`.

use crate::cli::LogTarget;
use anyhow::{bail, Context, Result};
use std::io::{self, Write};
use std::os::unix::net::UnixDatagram;
use std::sync::Arc;
use tracing::{Level, Metadata};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const SYSLOG_SOCKET: &str = "/dev/log";
const SYSLOG_IDENT: &str = "ood_metrics";

/// Resolve a syslog facility name to its numeric code
pub fn facility_code(name: &str) -> Result<u8> {
    let code = match name.to_ascii_lowercase().as_str() {
        "kern" => 0,
        "user" => 1,
        "mail" => 2,
        "daemon" => 3,
        "auth" => 4,
        "syslog" => 5,
        "lpr" => 6,
        "news" => 7,
        "uucp" => 8,
        "cron" => 9,
        "authpriv" => 10,
        "ftp" => 11,
        "local0" => 16,
        "local1" => 17,
        "local2" => 18,
        "local3" => 19,
        "local4" => 20,
        "local5" => 21,
        "local6" => 22,
        "local7" => 23,
        other => bail!("unknown syslog facility: {}", other),
    };
    Ok(code)
}

fn severity(level: &Level) -> u8 {
    match *level {
        Level::ERROR => 3,
        Level::WARN => 4,
        Level::INFO => 6,
        Level::DEBUG | Level::TRACE => 7,
    }
}

/// Writes formatted records to the local syslog socket
#[derive(Clone)]
pub struct SyslogWriter {
    socket: Arc<UnixDatagram>,
    facility: u8,
}

impl SyslogWriter {
    pub fn connect(facility: u8) -> Result<Self> {
        let socket = UnixDatagram::unbound().context("Failed to create syslog socket")?;
        socket
            .connect(SYSLOG_SOCKET)
            .with_context(|| format!("Failed to connect to {}", SYSLOG_SOCKET))?;
        Ok(Self {
            socket: Arc::new(socket),
            facility,
        })
    }

    fn line(&self, severity: u8) -> SyslogLine {
        SyslogLine {
            socket: self.socket.clone(),
            priority: self.facility * 8 + severity,
            buf: Vec::new(),
        }
    }
}

impl<'a> MakeWriter<'a> for SyslogWriter {
    type Writer = SyslogLine;

    fn make_writer(&'a self) -> Self::Writer {
        self.line(6)
    }

    fn make_writer_for(&'a self, meta: &Metadata<'_>) -> Self::Writer {
        self.line(severity(meta.level()))
    }
}

/// One record; sent as a single datagram when dropped
pub struct SyslogLine {
    socket: Arc<UnixDatagram>,
    priority: u8,
    buf: Vec<u8>,
}

impl SyslogLine {
    fn frame(&self) -> Vec<u8> {
        let message = String::from_utf8_lossy(&self.buf);
        format!("<{}>{}: {}", self.priority, SYSLOG_IDENT, message.trim_end()).into_bytes()
    }
}

impl Write for SyslogLine {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for SyslogLine {
    fn drop(&mut self) {
        if self.buf.is_empty() {
            return;
        }
        // Nothing sensible to do if syslog is gone
        let _ = self.socket.send(&self.frame());
    }
}

/// Install the global subscriber
///
/// `RUST_LOG`, when set, takes precedence over `level`.
pub fn init(target: LogTarget, level: LevelFilter, facility: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()));

    let stdout_json = (target.stdout() && json).then(|| fmt::layer().json());
    let stdout_text = (target.stdout() && !json).then(|| fmt::layer().with_target(false));
    let syslog = if target.syslog() {
        let writer = SyslogWriter::connect(facility_code(facility)?)?;
        Some(
            fmt::layer()
                .with_ansi(false)
                .without_time()
                .with_target(false)
                .with_writer(writer),
        )
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_json)
        .with(stdout_text)
        .with(syslog)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(())
}
