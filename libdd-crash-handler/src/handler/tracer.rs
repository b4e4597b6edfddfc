// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use super::metrics::TracerResult;
use super::{CrashReportExceptionHandler, HandlerError};
use crate::annotations::tracer_args::TracerArgv;
use crate::process::ToolExit;
use crate::snapshot::ClientInformation;
use std::path::Path;
use uuid::Uuid;

/// The result of a successful [`CrashReportExceptionHandler::handle_exception_with_additional_tracer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TracedException {
    pub report_id: Uuid,
    /// False when the tracer was skipped because the minidump itself is the uploaded format.
    pub tracer_ran: bool,
}

impl CrashReportExceptionHandler {
    /// Handles the crash of `pid`, then runs an external tracer over it.
    ///
    /// The tracer is started as `tracer_path initial_args... <annotation args>
    /// --output=<report stem>.<ext> <pid>`; see [`TracerArgv::build`]. The report written
    /// by the capture is uploaded once the tracer exits, and this call waits for the upload
    /// for at most the configured upload wait timeout.
    pub fn handle_exception_with_additional_tracer(
        &self,
        tracer_path: &Path,
        initial_args: &[String],
        pid: i32,
        uid: u32,
        info: &ClientInformation,
    ) -> Result<TracedException, HandlerError> {
        let handled = self.handle_exception(pid, uid, info, 0)?;
        let report_id = handled
            .report_id
            .ok_or_else(|| self.tracer_failed(HandlerError::MissingReport))?;
        tracing::info!("Crash handler generated report: {report_id}");

        if self.annotations.upload_minidump() {
            tracing::info!("Skip additional tracer, the minidump is the uploaded format");
            self.metrics.tracer_result(TracerResult::Skipped);
            return Ok(TracedException {
                report_id,
                tracer_ran: false,
            });
        }

        let report = self.database.look_up_report(report_id).map_err(|source| {
            self.tracer_failed(HandlerError::ReportLookup { report_id, source })
        })?;
        let output = report
            .file_path
            .with_extension(self.config.tracer_output_extension());

        let argv = TracerArgv::build(
            tracer_path,
            initial_args,
            &self.annotations,
            pid,
            Some(&output),
        )
        .map_err(|e| self.tracer_failed(e.into()))?;
        tracing::info!(
            tracer = %argv.program().display(),
            args = ?argv.args(),
            "Start additional tracer"
        );

        let exit = self
            .tool_runner
            .run(argv.program(), argv.args())
            .map_err(|source| {
                self.tracer_failed(HandlerError::TracerSpawn {
                    tracer: argv.program().to_path_buf(),
                    source,
                })
            })?;
        if !exit.exited_normally() {
            if let ToolExit::Stopped(signal) = exit {
                tracing::error!("{} stopped on signal {signal}", argv.program().display());
            }
            return Err(self.tracer_failed(HandlerError::TracerAbnormalExit {
                tracer: argv.program().to_path_buf(),
                exit,
            }));
        }
        tracing::info!(?exit, "Additional tracer succeeded");

        if let Some(upload) = &self.upload {
            tracing::info!("Uploading tracer report");
            upload.report_pending(report_id);
            if !upload.wait_for_pending_upload(self.config.upload_wait_timeout()) {
                return Err(self.tracer_failed(HandlerError::UploadTimeout(report_id)));
            }
            tracing::info!("Done uploading tracer report");
        }

        self.metrics.tracer_result(TracerResult::Success);
        Ok(TracedException {
            report_id,
            tracer_ran: true,
        })
    }
}
