// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The exception handler: attach, capture, stamp, write, register for upload.

pub mod hooks;
pub mod metrics;
mod tracer;

pub use tracer::TracedException;

use crate::annotations::tracer_args::TracerArgvError;
use crate::annotations::AnnotationDictionary;
use crate::connection::{ConnectionError, ConnectionFactory, PtraceConnection, PtraceConnectionFactory};
use crate::process::{ForkExecRunner, SpawnError, ToolExit, ToolRunner};
use crate::report::{
    read_last_part_of_file, user_extension_streams, DatabaseError, ReportDatabase,
    ReportSerializer, ReportTransaction, UploadCoordinator, UserStreamDataSource,
};
use crate::shared::configuration::HandlerConfiguration;
use crate::snapshot::{
    CaptureRequest, CapturedProcess, ClientInformation, ProcessSnapshot, SanitizedSnapshot,
    SnapshotBuilder,
};
use crate::stream::{write_minidump_log_from_reader, LogSink, MinidumpLogStream, TracingLogSink};
use hooks::{DumpObserver, RegisteredCallbacks};
use metrics::{CaptureCounters, CaptureMetrics, CaptureResult, TracerResult};
use nix::unistd::Pid;
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("Failed to attach to {pid}: {source}")]
    DirectPtrace { pid: i32, source: ConnectionError },
    #[error("Broker failed to attach to {pid}: {source}")]
    BrokeredPtrace { pid: i32, source: ConnectionError },
    #[error("Failed to capture the crashed process: {0}")]
    Snapshot(#[source] anyhow::Error),
    #[error("PrepareNewCrashReport failed: {0}")]
    PrepareNewCrashReport(#[source] DatabaseError),
    #[error("WriteEverything failed: {0}")]
    MinidumpWrite(#[source] anyhow::Error),
    #[error("FinishedWritingCrashReport failed: {0}")]
    FinishedWritingCrashReport(#[source] DatabaseError),
    /// Writing the report to the log failed. When the report was also written to the
    /// database, `report_id` is the id it was committed under.
    #[error("Writing the minidump to the log failed: {source}")]
    MinidumpLog {
        report_id: Option<Uuid>,
        source: anyhow::Error,
    },
    #[error("No report was written to the database")]
    MissingReport,
    #[error("Failed to find report {report_id}: {source}")]
    ReportLookup {
        report_id: Uuid,
        source: DatabaseError,
    },
    #[error("Invalid tracer arguments: {0}")]
    TracerArguments(#[from] TracerArgvError),
    #[error("Failed to run {}: {source}", .tracer.display())]
    TracerSpawn { tracer: PathBuf, source: SpawnError },
    #[error("{} should have exited, but did not: {exit:?}", .tracer.display())]
    TracerAbnormalExit { tracer: PathBuf, exit: ToolExit },
    #[error("Upload of report {0} did not complete in time")]
    UploadTimeout(Uuid),
}

impl HandlerError {
    /// The capture outcome this error is recorded as, if it happened while capturing.
    pub fn capture_result(&self) -> Option<CaptureResult> {
        match self {
            HandlerError::DirectPtrace { .. } => Some(CaptureResult::DirectPtraceFailed),
            HandlerError::BrokeredPtrace { .. } => Some(CaptureResult::BrokeredPtraceFailed),
            HandlerError::Snapshot(_) => Some(CaptureResult::SnapshotFailed),
            HandlerError::PrepareNewCrashReport(_) => {
                Some(CaptureResult::PrepareNewCrashReportFailed)
            }
            HandlerError::MinidumpWrite(_) => Some(CaptureResult::MinidumpWriteFailed),
            HandlerError::FinishedWritingCrashReport(_) => {
                Some(CaptureResult::FinishedWritingCrashReportFailed)
            }
            HandlerError::MinidumpLog { .. } => Some(CaptureResult::MinidumpLogFailed),
            _ => None,
        }
    }

    /// The tracer outcome this error is recorded as, if it happened in the tracer stage.
    pub fn tracer_result(&self) -> Option<TracerResult> {
        match self {
            HandlerError::MissingReport | HandlerError::ReportLookup { .. } => {
                Some(TracerResult::ReportLookupFailed)
            }
            HandlerError::TracerArguments(_) => Some(TracerResult::ArgumentsRejected),
            HandlerError::TracerSpawn { .. } => Some(TracerResult::SpawnFailed),
            HandlerError::TracerAbnormalExit { .. } => Some(TracerResult::AbnormalExit),
            HandlerError::UploadTimeout(_) => Some(TracerResult::UploadFailed),
            _ => None,
        }
    }
}

/// The result of a successful exception-handling call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandledException {
    /// Set iff the report was committed to the database.
    pub report_id: Option<Uuid>,
    /// The thread whose stack held the requested address, when the snapshot builder found it.
    pub requesting_thread_id: Option<i32>,
}

/// Captures crashed processes and turns them into reports.
///
/// Every operation handles one crash synchronously on the calling thread. The handler holds
/// no per-crash state, so a single instance serves any number of sequential crashes.
pub struct CrashReportExceptionHandler {
    config: HandlerConfiguration,
    database: Arc<dyn ReportDatabase>,
    snapshots: Box<dyn SnapshotBuilder>,
    serializer: Box<dyn ReportSerializer>,
    upload: Option<Arc<dyn UploadCoordinator>>,
    annotations: Arc<AnnotationDictionary>,
    connections: Box<dyn ConnectionFactory>,
    user_streams: Vec<Box<dyn UserStreamDataSource>>,
    observer: Arc<dyn DumpObserver>,
    metrics: Arc<dyn CaptureMetrics>,
    log_sink: Arc<dyn LogSink>,
    tool_runner: Box<dyn ToolRunner>,
}

impl CrashReportExceptionHandler {
    /// Creates a handler that attaches with ptrace, reports to the process-wide callbacks,
    /// counts outcomes in memory and writes log streams through `tracing`.
    pub fn new(
        config: HandlerConfiguration,
        database: Arc<dyn ReportDatabase>,
        snapshots: Box<dyn SnapshotBuilder>,
        serializer: Box<dyn ReportSerializer>,
    ) -> Self {
        Self {
            config,
            database,
            snapshots,
            serializer,
            upload: None,
            annotations: Arc::new(AnnotationDictionary::new()),
            connections: Box::new(PtraceConnectionFactory),
            user_streams: vec![],
            observer: Arc::new(RegisteredCallbacks),
            metrics: Arc::new(CaptureCounters::new()),
            log_sink: Arc::new(TracingLogSink),
            tool_runner: Box::new(ForkExecRunner),
        }
    }

    pub fn with_upload_coordinator(mut self, upload: Arc<dyn UploadCoordinator>) -> Self {
        self.upload = Some(upload);
        self
    }

    /// The process-wide annotation dictionary, read for upload policy and tracer arguments.
    pub fn with_annotations(mut self, annotations: Arc<AnnotationDictionary>) -> Self {
        self.annotations = annotations;
        self
    }

    pub fn with_connection_factory(mut self, connections: Box<dyn ConnectionFactory>) -> Self {
        self.connections = connections;
        self
    }

    pub fn with_user_stream_data_source(mut self, source: Box<dyn UserStreamDataSource>) -> Self {
        self.user_streams.push(source);
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn DumpObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn CaptureMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_log_sink(mut self, log_sink: Arc<dyn LogSink>) -> Self {
        self.log_sink = log_sink;
        self
    }

    pub fn with_tool_runner(mut self, tool_runner: Box<dyn ToolRunner>) -> Self {
        self.tool_runner = tool_runner;
        self
    }

    pub fn config(&self) -> &HandlerConfiguration {
        &self.config
    }

    /// Handles the crash of `pid` by attaching to it directly.
    ///
    /// `stack_hint` is an address on the stack of the thread that requested the dump, or zero.
    pub fn handle_exception(
        &self,
        pid: i32,
        uid: u32,
        info: &ClientInformation,
        stack_hint: u64,
    ) -> Result<HandledException, HandlerError> {
        self.metrics.exception_encountered();

        let mut connection = self
            .connections
            .direct(Pid::from_raw(pid))
            .map_err(|source| self.capture_failed(HandlerError::DirectPtrace { pid, source }))?;
        self.handle_exception_with_connection(connection.as_mut(), uid, info, stack_hint)
    }

    /// Handles the crash of `pid` through a ptrace broker listening on `broker`.
    pub fn handle_exception_with_broker(
        &self,
        pid: i32,
        uid: u32,
        info: &ClientInformation,
        broker: &UnixStream,
    ) -> Result<HandledException, HandlerError> {
        self.metrics.exception_encountered();

        let mut connection = self
            .connections
            .brokered(broker, Pid::from_raw(pid))
            .map_err(|source| self.capture_failed(HandlerError::BrokeredPtrace { pid, source }))?;
        let handled = self.handle_exception_with_connection(connection.as_mut(), uid, info, 0)?;
        Ok(HandledException {
            requesting_thread_id: None,
            ..handled
        })
    }

    fn handle_exception_with_connection(
        &self,
        connection: &mut dyn PtraceConnection,
        uid: u32,
        info: &ClientInformation,
        stack_hint: u64,
    ) -> Result<HandledException, HandlerError> {
        let start = Instant::now();
        let request = CaptureRequest {
            client_info: info,
            process_annotations: self.config.process_annotations(),
            client_uid: uid,
            requesting_thread_stack_address: stack_hint,
        };
        let captured = self.snapshots.capture(connection, &request);
        self.check_capture_time(start.elapsed());
        let mut captured = captured.map_err(|e| self.capture_failed(HandlerError::Snapshot(e)))?;

        hooks::notify("on_dump_event", || self.observer.on_dump_event());

        captured.snapshot.set_client_id(self.client_id());

        let start = Instant::now();
        let report_id = if self.config.write_minidump_to_database() {
            Some(
                self.write_minidump_to_database(&mut captured)
                    .map_err(|e| self.capture_failed(e))?,
            )
        } else {
            self.write_minidump_to_log(&captured)
                .map_err(|e| self.capture_failed(e))?;
            None
        };
        tracing::debug!(elapsed_ms = start.elapsed().as_millis() as u64, "Wrote report");

        self.metrics.capture_result(CaptureResult::Success);
        hooks::notify("after_dump", || self.observer.after_dump(report_id));

        Ok(HandledException {
            report_id,
            requesting_thread_id: captured.requesting_thread_id,
        })
    }

    fn check_capture_time(&self, elapsed: Duration) {
        let budget = self.config.capture_time_budget();
        if elapsed > budget {
            tracing::warn!(
                elapsed_ms = elapsed.as_millis() as u64,
                budget_ms = budget.as_millis() as u64,
                "Capture exceeded its time budget"
            );
            self.metrics.capture_over_budget(elapsed);
        } else {
            tracing::debug!(elapsed_ms = elapsed.as_millis() as u64, "Captured process");
        }
    }

    fn client_id(&self) -> Uuid {
        let Some(settings) = self.database.settings() else {
            return Uuid::nil();
        };
        settings.client_id().unwrap_or_else(|e| {
            tracing::warn!("Failed to read the client id: {e}");
            Uuid::nil()
        })
    }

    fn write_minidump_to_database(
        &self,
        captured: &mut CapturedProcess,
    ) -> Result<Uuid, HandlerError> {
        let mut transaction = ReportTransaction::prepare(self.database.as_ref())
            .map_err(HandlerError::PrepareNewCrashReport)?;

        captured.snapshot.set_report_id(transaction.report_id());

        with_snapshot_view(captured, |snapshot| {
            let streams = user_extension_streams(&self.user_streams, snapshot);
            self.serializer
                .write_everything(snapshot, &streams, transaction.writer())
        })
        .map_err(HandlerError::MinidumpWrite)?;

        self.write_attachments(&mut transaction);

        let log_copy = self
            .config
            .write_minidump_to_log()
            .then(|| self.write_log_copy(&mut transaction));

        let uuid = transaction
            .finish()
            .map_err(HandlerError::FinishedWritingCrashReport)?;

        if let Some(upload) = &self.upload {
            if self.annotations.upload_minidump() {
                upload.report_pending(uuid);
            }
        }

        match log_copy {
            Some(Err(source)) => Err(HandlerError::MinidumpLog {
                report_id: Some(uuid),
                source,
            }),
            _ => Ok(uuid),
        }
    }

    /// Copies the tail of every configured attachment into the report. A source that cannot
    /// be read is left out of the report.
    fn write_attachments(&self, transaction: &mut ReportTransaction<'_>) {
        let limit = self
            .annotations
            .upload_attachment_file_size_limit(self.config.attachment_kilobyte_limit());
        for (name, path) in self.config.process_attachments() {
            let contents = match read_last_part_of_file(path, limit) {
                Ok(contents) => contents,
                Err(e) => {
                    tracing::warn!(attachment = name.as_str(), "Failed to read {}: {e}", path.display());
                    continue;
                }
            };
            let Some(writer) = transaction.add_attachment(name) else {
                tracing::warn!(attachment = name.as_str(), "Report rejected attachment");
                continue;
            };
            if let Err(e) = writer.write_all(&contents) {
                tracing::warn!(attachment = name.as_str(), "Failed to write attachment: {e}");
            }
        }
    }

    fn write_log_copy(&self, transaction: &mut ReportTransaction<'_>) -> anyhow::Result<()> {
        let Some(mut reader) = transaction.reader() else {
            anyhow::bail!("the report cannot be read back");
        };
        Ok(write_minidump_log_from_reader(
            reader.as_mut(),
            self.log_sink.as_ref(),
        )?)
    }

    fn write_minidump_to_log(&self, captured: &CapturedProcess) -> Result<(), HandlerError> {
        let mut stream = MinidumpLogStream::new(self.log_sink.as_ref());
        with_snapshot_view(captured, |snapshot| {
            let streams = user_extension_streams(&self.user_streams, snapshot);
            self.serializer
                .write_compact(snapshot, &streams, &mut stream, false)
        })
        .and_then(|()| Ok(stream.finish()?))
        .map_err(|source| HandlerError::MinidumpLog {
            report_id: None,
            source,
        })
    }

    fn capture_failed(&self, error: HandlerError) -> HandlerError {
        tracing::error!("{error}");
        if let Some(result) = error.capture_result() {
            self.metrics.capture_result(result);
        }
        error
    }

    fn tracer_failed(&self, error: HandlerError) -> HandlerError {
        tracing::error!("{error}");
        if let Some(result) = error.tracer_result() {
            self.metrics.tracer_result(result);
        }
        error
    }
}

/// Calls `f` with the sanitized view of the capture when the client asked for one, and with
/// the raw capture otherwise.
fn with_snapshot_view<R>(
    captured: &CapturedProcess,
    f: impl FnOnce(&dyn ProcessSnapshot) -> R,
) -> R {
    let snapshot = captured.snapshot.as_process_snapshot();
    match &captured.sanitization {
        Some(info) => f(&SanitizedSnapshot::new(snapshot, info)),
        None => f(snapshot),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::ProcessSnapshotData;
    use crate::test_utils::*;
    use std::collections::BTreeMap;

    fn handler(
        config: HandlerConfiguration,
        database: Arc<InMemoryDatabase>,
        serializer: RecordingSerializer,
    ) -> CrashReportExceptionHandler {
        CrashReportExceptionHandler::new(
            config,
            database,
            Box::new(StaticSnapshotBuilder::new(ProcessSnapshotData::new(42))),
            Box::new(serializer),
        )
        .with_connection_factory(Box::new(FakeConnectionFactory::default()))
        .with_observer(Arc::new(RecordingObserver::default()))
        .with_log_sink(Arc::new(CollectingLogSink::default()))
    }

    fn store_only() -> HandlerConfiguration {
        HandlerConfiguration::new(true, false, BTreeMap::new(), BTreeMap::new()).unwrap()
    }

    #[test]
    fn test_errors_have_one_classification() {
        let errors = [
            HandlerError::Snapshot(anyhow::anyhow!("x")),
            HandlerError::MinidumpLog {
                report_id: None,
                source: anyhow::anyhow!("x"),
            },
            HandlerError::MissingReport,
            HandlerError::UploadTimeout(Uuid::nil()),
            HandlerError::TracerArguments(TracerArgvError::NoGenericAnnotations),
        ];
        for error in errors {
            assert!(
                error.capture_result().is_some() != error.tracer_result().is_some(),
                "{error}"
            );
        }
    }

    #[test]
    fn test_report_id_is_stamped_before_serialization() {
        let database = Arc::new(InMemoryDatabase::new().with_client_id(Uuid::from_u128(5)));
        let handler = handler(store_only(), database.clone(), RecordingSerializer::new());

        let handled = handler
            .handle_exception(42, 0, &ClientInformation::default(), 0)
            .unwrap();
        let report_id = handled.report_id.unwrap();
        let written = SerializedReport::parse(&database.report_contents(report_id).unwrap());
        assert_eq!(written.report_id, report_id);
        assert_eq!(written.client_id, Uuid::from_u128(5));
        assert_eq!(written.process_id, 42);
    }

    #[test]
    fn test_missing_settings_leave_nil_client_id() {
        let database = Arc::new(InMemoryDatabase::new().with_failing_settings());
        let handler = handler(store_only(), database.clone(), RecordingSerializer::new());

        let report_id = handler
            .handle_exception(42, 0, &ClientInformation::default(), 0)
            .unwrap()
            .report_id
            .unwrap();
        let written = SerializedReport::parse(&database.report_contents(report_id).unwrap());
        assert_eq!(written.client_id, Uuid::nil());
    }
}
