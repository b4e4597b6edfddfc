// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

//! Crash report exception handling.
//!
//! When a monitored process crashes, a watcher calls into [`CrashReportExceptionHandler`].
//! The handler attaches to the crashed process, asks a [`SnapshotBuilder`] to capture it,
//! serializes the capture into a durable report (or an encoded log stream) and registers the
//! report for upload. Optionally, an external tracer tool is run over the crashed process and
//! its output is merged into the already-written report.
//!
//! The low-level introspection, the minidump serializer, the report store and the upload
//! worker are collaborators expressed as traits; see [`snapshot`], [`report`] and
//! [`connection`].

#[cfg(not(unix))]
compile_error!("libdd-crash-handler only supports unix targets");

pub mod annotations;
pub mod connection;
pub mod handler;
pub mod process;
pub mod report;
mod shared;
pub mod snapshot;
pub mod stream;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use annotations::{
    parameters::breakpad_http_form_parameters_from_minidump,
    tracer_args::{TracerAnnotation, TracerArgv, TracerArgvError},
    AnnotationDictionary,
};
pub use connection::{ConnectionError, ConnectionFactory, PtraceConnection};
pub use handler::{
    hooks::{set_user_callback_after_dump, set_user_callback_on_dump_event, DumpObserver},
    metrics::{CaptureCounters, CaptureMetrics, CaptureResult, TracerResult},
    CrashReportExceptionHandler, HandledException, HandlerError, TracedException,
};
pub use report::{
    DatabaseError, NewReport, Report, ReportDatabase, ReportSerializer, Settings,
    UploadCoordinator, UserStreamDataSource,
};
pub use shared::configuration::HandlerConfiguration;
pub use shared::constants;
pub use snapshot::{
    ClientInformation, CapturedSnapshot, ModuleSnapshot, ProcessSnapshot, SanitizationInfo,
    SnapshotBuilder,
};
