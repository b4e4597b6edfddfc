// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::shared::constants::{
    MINIDUMP_LOG_ABORT, MINIDUMP_LOG_BEGIN, MINIDUMP_LOG_END, MINIDUMP_LOG_LINE_LENGTH,
    MINIDUMP_LOG_OUTPUT_CAP,
};
use std::io::{self, Write};

/// Receives the lines of an encoded minidump log stream.
pub trait LogSink: Send + Sync {
    fn log_line(&self, line: &str);
}

/// Emits every line as an `info` event on the `minidump` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogSink;

impl LogSink for TracingLogSink {
    fn log_line(&self, line: &str) {
        tracing::info!(target: "minidump", "{line}");
    }
}

/// Splits printable text into fixed-width lines framed by begin and end markers.
///
/// The begin marker is emitted on the first write. A stream that is dropped before
/// [`LogOutputStream::finish`] ends with the abort marker instead of the end marker.
pub struct LogOutputStream<'a> {
    sink: &'a dyn LogSink,
    line: String,
    written: usize,
    cap: usize,
    started: bool,
    closed: bool,
}

impl<'a> LogOutputStream<'a> {
    pub fn new(sink: &'a dyn LogSink) -> Self {
        Self::with_cap(sink, MINIDUMP_LOG_OUTPUT_CAP)
    }

    pub fn with_cap(sink: &'a dyn LogSink, cap: usize) -> Self {
        Self {
            sink,
            line: String::with_capacity(MINIDUMP_LOG_LINE_LENGTH),
            written: 0,
            cap,
            started: false,
            closed: false,
        }
    }

    fn start(&mut self) {
        if !self.started {
            self.started = true;
            self.sink.log_line(MINIDUMP_LOG_BEGIN);
        }
    }

    fn abort(&mut self) {
        self.closed = true;
        self.line.clear();
        self.sink.log_line(MINIDUMP_LOG_ABORT);
    }

    /// Emits the partial last line and the end marker.
    pub fn finish(mut self) -> io::Result<()> {
        if self.closed {
            return Err(io::Error::other("log stream was aborted"));
        }
        self.start();
        if !self.line.is_empty() {
            self.sink.log_line(&self.line);
        }
        self.closed = true;
        self.sink.log_line(MINIDUMP_LOG_END);
        Ok(())
    }
}

impl Write for LogOutputStream<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.closed {
            return Err(io::Error::other("log stream was aborted"));
        }
        self.start();
        if self.written + buf.len() > self.cap {
            self.abort();
            return Err(io::Error::other(format!(
                "log stream exceeds {} bytes",
                self.cap
            )));
        }
        let text = std::str::from_utf8(buf)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        self.written += buf.len();
        for c in text.chars() {
            self.line.push(c);
            if self.line.len() >= MINIDUMP_LOG_LINE_LENGTH {
                self.sink.log_line(&self.line);
                self.line.clear();
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for LogOutputStream<'_> {
    fn drop(&mut self) {
        if self.started && !self.closed {
            self.abort();
        }
    }
}
