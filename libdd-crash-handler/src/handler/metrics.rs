// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Outcome of one exception-handling call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CaptureResult {
    Success,
    DirectPtraceFailed,
    BrokeredPtraceFailed,
    SnapshotFailed,
    PrepareNewCrashReportFailed,
    MinidumpWriteFailed,
    FinishedWritingCrashReportFailed,
    MinidumpLogFailed,
}

impl CaptureResult {
    pub const ALL: [CaptureResult; 8] = [
        CaptureResult::Success,
        CaptureResult::DirectPtraceFailed,
        CaptureResult::BrokeredPtraceFailed,
        CaptureResult::SnapshotFailed,
        CaptureResult::PrepareNewCrashReportFailed,
        CaptureResult::MinidumpWriteFailed,
        CaptureResult::FinishedWritingCrashReportFailed,
        CaptureResult::MinidumpLogFailed,
    ];

    pub fn tag(&self) -> &'static str {
        match self {
            CaptureResult::Success => "capture_result:success",
            CaptureResult::DirectPtraceFailed => "capture_result:direct_ptrace_failed",
            CaptureResult::BrokeredPtraceFailed => "capture_result:brokered_ptrace_failed",
            CaptureResult::SnapshotFailed => "capture_result:snapshot_failed",
            CaptureResult::PrepareNewCrashReportFailed => {
                "capture_result:prepare_new_crash_report_failed"
            }
            CaptureResult::MinidumpWriteFailed => "capture_result:minidump_write_failed",
            CaptureResult::FinishedWritingCrashReportFailed => {
                "capture_result:finished_writing_crash_report_failed"
            }
            CaptureResult::MinidumpLogFailed => "capture_result:minidump_log_failed",
        }
    }

    fn index(&self) -> usize {
        *self as usize
    }
}

/// Outcome of the additional tracer stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TracerResult {
    Success,
    Skipped,
    ReportLookupFailed,
    ArgumentsRejected,
    SpawnFailed,
    AbnormalExit,
    UploadFailed,
}

impl TracerResult {
    pub const ALL: [TracerResult; 7] = [
        TracerResult::Success,
        TracerResult::Skipped,
        TracerResult::ReportLookupFailed,
        TracerResult::ArgumentsRejected,
        TracerResult::SpawnFailed,
        TracerResult::AbnormalExit,
        TracerResult::UploadFailed,
    ];

    pub fn tag(&self) -> &'static str {
        match self {
            TracerResult::Success => "tracer_result:success",
            TracerResult::Skipped => "tracer_result:skipped",
            TracerResult::ReportLookupFailed => "tracer_result:report_lookup_failed",
            TracerResult::ArgumentsRejected => "tracer_result:arguments_rejected",
            TracerResult::SpawnFailed => "tracer_result:spawn_failed",
            TracerResult::AbnormalExit => "tracer_result:abnormal_exit",
            TracerResult::UploadFailed => "tracer_result:upload_failed",
        }
    }

    fn index(&self) -> usize {
        *self as usize
    }
}

/// Receives the outcome classification of every handler call.
pub trait CaptureMetrics: Send + Sync {
    fn exception_encountered(&self);
    /// A capture took longer than the configured budget. Called whatever the capture's outcome.
    fn capture_over_budget(&self, _elapsed: Duration) {}
    fn capture_result(&self, result: CaptureResult);
    fn tracer_result(&self, result: TracerResult);
}

/// Counts outcomes in memory.
#[derive(Debug, Default)]
pub struct CaptureCounters {
    exceptions: AtomicU64,
    slow_captures: AtomicU64,
    captures: [AtomicU64; CaptureResult::ALL.len()],
    tracers: [AtomicU64; TracerResult::ALL.len()],
}

impl CaptureCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn exceptions_encountered(&self) -> u64 {
        self.exceptions.load(Ordering::Relaxed)
    }

    pub fn slow_captures(&self) -> u64 {
        self.slow_captures.load(Ordering::Relaxed)
    }

    pub fn capture_count(&self, result: CaptureResult) -> u64 {
        self.captures[result.index()].load(Ordering::Relaxed)
    }

    pub fn tracer_count(&self, result: TracerResult) -> u64 {
        self.tracers[result.index()].load(Ordering::Relaxed)
    }

    /// Non-zero counters as `(tag, count)`, for forwarding to a metrics backend.
    pub fn snapshot(&self) -> Vec<(&'static str, u64)> {
        let mut counts = vec![
            ("exception_encountered", self.exceptions_encountered()),
            ("capture_over_budget", self.slow_captures()),
        ];
        counts.extend(
            CaptureResult::ALL
                .iter()
                .map(|r| (r.tag(), self.capture_count(*r))),
        );
        counts.extend(TracerResult::ALL.iter().map(|r| (r.tag(), self.tracer_count(*r))));
        counts.retain(|(_, count)| *count > 0);
        counts
    }
}

impl CaptureMetrics for CaptureCounters {
    fn exception_encountered(&self) {
        self.exceptions.fetch_add(1, Ordering::Relaxed);
    }

    fn capture_over_budget(&self, _elapsed: Duration) {
        self.slow_captures.fetch_add(1, Ordering::Relaxed);
    }

    fn capture_result(&self, result: CaptureResult) {
        tracing::debug!(result = result.tag(), "Exception capture finished");
        self.captures[result.index()].fetch_add(1, Ordering::Relaxed);
    }

    fn tracer_result(&self, result: TracerResult) {
        tracing::debug!(result = result.tag(), "Additional tracer finished");
        self.tracers[result.index()].fetch_add(1, Ordering::Relaxed);
    }
}
