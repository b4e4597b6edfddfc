// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The diagnostic log path: report bytes are zlib-compressed, base-94 encoded and handed to a
//! [`LogSink`] as framed lines of text.

pub mod base94;
mod log_output;

pub use log_output::*;

use base94::Base94Encoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::io::{self, Read, Write};

/// A write-then-finish sink that turns raw report bytes into log lines.
pub struct MinidumpLogStream<'a> {
    encoder: ZlibEncoder<Base94Encoder<LogOutputStream<'a>>>,
}

impl<'a> MinidumpLogStream<'a> {
    pub fn new(sink: &'a dyn LogSink) -> Self {
        Self {
            encoder: ZlibEncoder::new(
                Base94Encoder::new(LogOutputStream::new(sink)),
                Compression::default(),
            ),
        }
    }

    /// Flushes every stage and emits the end marker. Nothing but the abort marker reaches the
    /// sink after a failed write.
    pub fn finish(self) -> io::Result<()> {
        self.encoder.finish()?.finish()?.finish()
    }
}

impl Write for MinidumpLogStream<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.encoder.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.encoder.flush()
    }
}

/// Pushes everything `reader` yields through a [`MinidumpLogStream`].
pub fn write_minidump_log_from_reader(reader: &mut dyn Read, sink: &dyn LogSink) -> io::Result<()> {
    let mut stream = MinidumpLogStream::new(sink);
    io::copy(reader, &mut stream)?;
    stream.finish()
}

/// Reassembles the report bytes from the lines a [`MinidumpLogStream`] emitted.
///
/// Lines before the begin marker are ignored. Fails when the stream was aborted or is
/// incomplete.
pub fn decode_minidump_log<'l>(lines: impl IntoIterator<Item = &'l str>) -> anyhow::Result<Vec<u8>> {
    use crate::shared::constants::{MINIDUMP_LOG_ABORT, MINIDUMP_LOG_BEGIN, MINIDUMP_LOG_END};

    let mut lines = lines
        .into_iter()
        .skip_while(|line| *line != MINIDUMP_LOG_BEGIN)
        .skip(1);
    let mut text = String::new();
    loop {
        match lines.next() {
            Some(MINIDUMP_LOG_END) => break,
            Some(MINIDUMP_LOG_ABORT) => anyhow::bail!("minidump log stream was aborted"),
            Some(line) => text.push_str(line),
            None => anyhow::bail!("minidump log stream is incomplete"),
        }
    }
    let compressed = base94::decode(&text)?;
    let mut report = vec![];
    flate2::read::ZlibDecoder::new(compressed.as_slice()).read_to_end(&mut report)?;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::constants::{MINIDUMP_LOG_ABORT, MINIDUMP_LOG_BEGIN, MINIDUMP_LOG_END};
    use crate::test_utils::CollectingLogSink;

    #[test]
    fn test_pipeline_is_reversible() {
        let report: Vec<u8> = (0..20_000u32).map(|i| (i * 7 % 251) as u8).collect();
        let sink = CollectingLogSink::default();
        write_minidump_log_from_reader(&mut report.as_slice(), &sink).unwrap();

        let lines = sink.lines();
        assert_eq!(lines.first().map(String::as_str), Some(MINIDUMP_LOG_BEGIN));
        assert_eq!(lines.last().map(String::as_str), Some(MINIDUMP_LOG_END));
        assert!(lines.len() >= 3);
        assert_eq!(
            decode_minidump_log(lines.iter().map(String::as_str)).unwrap(),
            report
        );
    }

    #[test]
    fn test_decode_ignores_preamble() {
        let sink = CollectingLogSink::default();
        let mut stream = MinidumpLogStream::new(&sink);
        stream.write_all(b"MDMP").unwrap();
        stream.finish().unwrap();

        let mut lines = vec!["unrelated".to_string()];
        lines.extend(sink.lines());
        assert_eq!(
            decode_minidump_log(lines.iter().map(String::as_str)).unwrap(),
            b"MDMP"
        );
    }

    #[test]
    fn test_decode_rejects_aborted_stream() {
        let lines = [MINIDUMP_LOG_BEGIN, "abc", MINIDUMP_LOG_ABORT];
        assert!(decode_minidump_log(lines).is_err());
        assert!(decode_minidump_log([MINIDUMP_LOG_BEGIN, "abc"]).is_err());
    }
}
