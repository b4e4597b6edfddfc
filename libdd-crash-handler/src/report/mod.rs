// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Contracts of the collaborators that turn a snapshot into a durable, uploadable report:
//! the report database, the settings store, the serializer and the upload coordinator.

mod attachments;
mod transaction;

pub use attachments::*;
pub use transaction::*;

use crate::snapshot::ProcessSnapshot;
use std::io::{Read, Seek, Write};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Report {0} not found")]
    ReportNotFound(Uuid),
    #[error("Report database I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Report database error: {0}")]
    Other(#[from] anyhow::Error),
}

pub trait WriteSeek: Write + Seek {}

impl<T: Write + Seek> WriteSeek for T {}

/// A report that has been prepared but not committed yet.
pub trait NewReport {
    /// The id the report will be committed under.
    fn report_id(&self) -> Uuid;

    /// The primary stream of the report.
    fn writer(&mut self) -> &mut dyn WriteSeek;

    /// Reads back what has been written to the primary stream so far, from the start.
    fn reader(&mut self) -> Option<Box<dyn Read + '_>>;

    /// Adds a named attachment to the report. `None` when the name is not acceptable.
    fn add_attachment(&mut self, name: &str) -> Option<&mut dyn Write>;
}

/// A committed report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub uuid: Uuid,
    /// Path of the primary file of the report.
    pub file_path: PathBuf,
    pub creation_time: Option<std::time::SystemTime>,
    pub uploaded: bool,
}

pub trait ReportDatabase: Send + Sync {
    fn settings(&self) -> Option<&dyn Settings>;

    fn prepare_new_report(&self) -> Result<Box<dyn NewReport>, DatabaseError>;

    /// Commits `report`, returning the id it was stored under.
    fn finished_writing_report(&self, report: Box<dyn NewReport>) -> Result<Uuid, DatabaseError>;

    /// Discards a prepared report and everything written to it.
    fn abandon_report(&self, report: Box<dyn NewReport>);

    fn look_up_report(&self, uuid: Uuid) -> Result<Report, DatabaseError>;
}

pub trait Settings: Send + Sync {
    /// The persistent id of this installation.
    fn client_id(&self) -> anyhow::Result<Uuid>;
}

/// Hands reports to the asynchronous upload worker.
pub trait UploadCoordinator: Send + Sync {
    /// Fire and forget.
    fn report_pending(&self, uuid: Uuid);

    /// Blocks until pending uploads complete. `false` on timeout or upload failure.
    fn wait_for_pending_upload(&self, timeout: Duration) -> bool;
}

/// An additional stream to embed into a report, produced by an extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionStream {
    pub stream_type: u32,
    pub data: Vec<u8>,
}

pub trait UserStreamDataSource: Send + Sync {
    fn produce_stream_data(&self, snapshot: &dyn ProcessSnapshot) -> Option<ExtensionStream>;
}

/// Collects the extension streams for `snapshot`, in source order.
pub fn user_extension_streams(
    sources: &[Box<dyn UserStreamDataSource>],
    snapshot: &dyn ProcessSnapshot,
) -> Vec<ExtensionStream> {
    sources
        .iter()
        .filter_map(|source| source.produce_stream_data(snapshot))
        .collect()
}

/// Serializes snapshots into the binary report format.
pub trait ReportSerializer: Send + Sync {
    /// Writes the full report. The writer may be seeked.
    fn write_everything(
        &self,
        snapshot: &dyn ProcessSnapshot,
        extensions: &[ExtensionStream],
        writer: &mut dyn WriteSeek,
    ) -> anyhow::Result<()>;

    /// Writes the report in a single forward pass when `allow_seek` is false.
    fn write_compact(
        &self,
        snapshot: &dyn ProcessSnapshot,
        extensions: &[ExtensionStream],
        writer: &mut dyn Write,
        allow_seek: bool,
    ) -> anyhow::Result<()>;
}
