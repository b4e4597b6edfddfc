// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! In-memory stand-ins for the collaborators of the exception handler.
//!
//! Every fake records what the handler asked of it, so tests can assert on the sequence of
//! calls as well as on the outcome.

use crate::annotations::parameters::breakpad_http_form_parameters_from_minidump;
use crate::connection::{ConnectionError, ConnectionFactory, PtraceConnection};
use crate::handler::hooks::DumpObserver;
use crate::process::{SpawnError, ToolExit, ToolRunner};
use crate::report::{
    DatabaseError, ExtensionStream, NewReport, Report, ReportDatabase, ReportSerializer,
    Settings, UploadCoordinator, UserStreamDataSource, WriteSeek,
};
use crate::snapshot::{
    CaptureRequest, CapturedProcess, ProcessSnapshot, ProcessSnapshotData, SanitizationInfo,
    SnapshotBuilder,
};
use crate::stream::LogSink;
use nix::unistd::Pid;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::io::{Cursor, Read, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use uuid::Uuid;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Default, Clone)]
struct StoredReport {
    contents: Vec<u8>,
    attachments: BTreeMap<String, Vec<u8>>,
}

#[derive(Debug, Default)]
struct DatabaseState {
    // Contents of prepared reports, handed over when the report is dropped.
    staged: HashMap<Uuid, StoredReport>,
    committed: HashMap<Uuid, StoredReport>,
    finished: Vec<Uuid>,
    abandoned: Vec<Uuid>,
}

#[derive(Debug, Clone, Copy)]
enum ClientIdSetting {
    Missing,
    Failing,
    Fixed(Uuid),
}

impl Settings for ClientIdSetting {
    fn client_id(&self) -> anyhow::Result<Uuid> {
        match self {
            ClientIdSetting::Fixed(id) => Ok(*id),
            _ => anyhow::bail!("settings are unreadable"),
        }
    }
}

/// A report database that keeps everything in memory.
///
/// Committed reports claim to live at `<reports_dir>/<uuid>.dmp`; nothing is written there.
#[derive(Debug)]
pub struct InMemoryDatabase {
    state: Arc<Mutex<DatabaseState>>,
    settings: ClientIdSetting,
    reports_dir: PathBuf,
    fail_prepare: AtomicBool,
    fail_finish: AtomicBool,
    unreadable_reports: AtomicBool,
}

impl Default for InMemoryDatabase {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryDatabase {
    pub fn new() -> Self {
        Self {
            state: Arc::default(),
            settings: ClientIdSetting::Missing,
            reports_dir: PathBuf::from("/var/crash/reports"),
            fail_prepare: AtomicBool::new(false),
            fail_finish: AtomicBool::new(false),
            unreadable_reports: AtomicBool::new(false),
        }
    }

    pub fn with_client_id(mut self, client_id: Uuid) -> Self {
        self.settings = ClientIdSetting::Fixed(client_id);
        self
    }

    pub fn with_failing_settings(mut self) -> Self {
        self.settings = ClientIdSetting::Failing;
        self
    }

    pub fn with_reports_dir(mut self, reports_dir: impl Into<PathBuf>) -> Self {
        self.reports_dir = reports_dir.into();
        self
    }

    pub fn fail_prepare(&self, fail: bool) {
        self.fail_prepare.store(fail, Ordering::SeqCst);
    }

    pub fn fail_finish(&self, fail: bool) {
        self.fail_finish.store(fail, Ordering::SeqCst);
    }

    /// Makes prepared reports refuse to be read back.
    pub fn unreadable_reports(&self, unreadable: bool) {
        self.unreadable_reports.store(unreadable, Ordering::SeqCst);
    }

    pub fn finished(&self) -> Vec<Uuid> {
        lock(&self.state).finished.clone()
    }

    pub fn abandoned(&self) -> Vec<Uuid> {
        lock(&self.state).abandoned.clone()
    }

    pub fn report_contents(&self, uuid: Uuid) -> Option<Vec<u8>> {
        lock(&self.state)
            .committed
            .get(&uuid)
            .map(|r| r.contents.clone())
    }

    pub fn attachments(&self, uuid: Uuid) -> Option<BTreeMap<String, Vec<u8>>> {
        lock(&self.state)
            .committed
            .get(&uuid)
            .map(|r| r.attachments.clone())
    }

    fn take_staged(&self, report: Box<dyn NewReport>) -> (Uuid, StoredReport) {
        let uuid = report.report_id();
        // Dropping the report stages its contents.
        drop(report);
        let stored = lock(&self.state).staged.remove(&uuid).unwrap_or_default();
        (uuid, stored)
    }
}

impl ReportDatabase for InMemoryDatabase {
    fn settings(&self) -> Option<&dyn Settings> {
        match self.settings {
            ClientIdSetting::Missing => None,
            _ => Some(&self.settings),
        }
    }

    fn prepare_new_report(&self) -> Result<Box<dyn NewReport>, DatabaseError> {
        if self.fail_prepare.load(Ordering::SeqCst) {
            return Err(DatabaseError::Io(std::io::Error::other("disk full")));
        }
        Ok(Box::new(InMemoryNewReport {
            state: self.state.clone(),
            uuid: Uuid::new_v4(),
            writer: Cursor::new(vec![]),
            attachments: vec![],
            readable: !self.unreadable_reports.load(Ordering::SeqCst),
        }))
    }

    fn finished_writing_report(&self, report: Box<dyn NewReport>) -> Result<Uuid, DatabaseError> {
        let (uuid, stored) = self.take_staged(report);
        let mut state = lock(&self.state);
        if self.fail_finish.load(Ordering::SeqCst) {
            state.abandoned.push(uuid);
            return Err(DatabaseError::Io(std::io::Error::other("rename failed")));
        }
        state.committed.insert(uuid, stored);
        state.finished.push(uuid);
        Ok(uuid)
    }

    fn abandon_report(&self, report: Box<dyn NewReport>) {
        let (uuid, _) = self.take_staged(report);
        lock(&self.state).abandoned.push(uuid);
    }

    fn look_up_report(&self, uuid: Uuid) -> Result<Report, DatabaseError> {
        if !lock(&self.state).committed.contains_key(&uuid) {
            return Err(DatabaseError::ReportNotFound(uuid));
        }
        Ok(Report {
            uuid,
            file_path: self.reports_dir.join(format!("{uuid}.dmp")),
            creation_time: None,
            uploaded: false,
        })
    }
}

struct InMemoryNewReport {
    state: Arc<Mutex<DatabaseState>>,
    uuid: Uuid,
    writer: Cursor<Vec<u8>>,
    attachments: Vec<(String, Vec<u8>)>,
    readable: bool,
}

impl NewReport for InMemoryNewReport {
    fn report_id(&self) -> Uuid {
        self.uuid
    }

    fn writer(&mut self) -> &mut dyn WriteSeek {
        &mut self.writer
    }

    fn reader(&mut self) -> Option<Box<dyn Read + '_>> {
        if !self.readable {
            return None;
        }
        Some(Box::new(self.writer.get_ref().as_slice()))
    }

    fn add_attachment(&mut self, name: &str) -> Option<&mut dyn Write> {
        if name.is_empty() || self.attachments.iter().any(|(n, _)| n == name) {
            return None;
        }
        self.attachments.push((name.to_string(), vec![]));
        self.attachments
            .last_mut()
            .map(|(_, contents)| contents as &mut dyn Write)
    }
}

impl Drop for InMemoryNewReport {
    fn drop(&mut self) {
        let stored = StoredReport {
            contents: std::mem::take(self.writer.get_mut()),
            attachments: std::mem::take(&mut self.attachments).into_iter().collect(),
        };
        lock(&self.state).staged.insert(self.uuid, stored);
    }
}

/// Hands out copies of a fixed capture.
#[derive(Debug, Default)]
pub struct StaticSnapshotBuilder {
    snapshot: ProcessSnapshotData,
    sanitization: Option<SanitizationInfo>,
    requesting_thread_id: Option<i32>,
    delay: Duration,
    fail: bool,
    requests: Arc<Mutex<Vec<(i32, u64)>>>,
}

impl StaticSnapshotBuilder {
    pub fn new(snapshot: ProcessSnapshotData) -> Self {
        Self {
            snapshot,
            ..Default::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn with_sanitization(mut self, sanitization: SanitizationInfo) -> Self {
        self.sanitization = Some(sanitization);
        self
    }

    pub fn with_requesting_thread_id(mut self, tid: i32) -> Self {
        self.requesting_thread_id = Some(tid);
        self
    }

    /// Makes every capture take at least `delay`.
    pub fn with_capture_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// `(pid of the connection, stack hint)` of every capture, usable after the builder was
    /// given away.
    pub fn requests(&self) -> Arc<Mutex<Vec<(i32, u64)>>> {
        self.requests.clone()
    }
}

impl SnapshotBuilder for StaticSnapshotBuilder {
    fn capture(
        &self,
        connection: &mut dyn PtraceConnection,
        request: &CaptureRequest<'_>,
    ) -> anyhow::Result<CapturedProcess> {
        lock(&self.requests).push((
            connection.process_id().as_raw(),
            request.requesting_thread_stack_address,
        ));
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        anyhow::ensure!(!self.fail, "process vanished during capture");

        let mut snapshot = self.snapshot.clone();
        for (key, value) in request.process_annotations {
            snapshot
                .annotations_simple_map
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
        Ok(CapturedProcess {
            snapshot: Box::new(snapshot),
            sanitization: self.sanitization.clone(),
            requesting_thread_id: self.requesting_thread_id,
        })
    }
}

/// What [`RecordingSerializer`] writes: a JSON summary of the snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedReport {
    pub process_id: i32,
    pub report_id: Uuid,
    pub client_id: Uuid,
    pub parameters: BTreeMap<String, String>,
    pub extension_streams: Vec<u32>,
}

impl SerializedReport {
    pub fn new(snapshot: &dyn ProcessSnapshot, extensions: &[ExtensionStream]) -> Self {
        Self {
            process_id: snapshot.process_id(),
            report_id: snapshot.report_id(),
            client_id: snapshot.client_id(),
            parameters: breakpad_http_form_parameters_from_minidump(snapshot),
            extension_streams: extensions.iter().map(|e| e.stream_type).collect(),
        }
    }

    #[allow(clippy::expect_used)]
    pub fn parse(bytes: &[u8]) -> Self {
        serde_json::from_slice(bytes).expect("report written by RecordingSerializer")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerializerCall {
    Everything,
    Compact { allow_seek: bool },
}

/// Writes [`SerializedReport`]s and records how it was asked to.
#[derive(Debug, Default)]
pub struct RecordingSerializer {
    fail: bool,
    calls: Arc<Mutex<Vec<SerializerCall>>>,
}

impl RecordingSerializer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    /// A handle on the calls, usable after the serializer was given away.
    pub fn calls(&self) -> Arc<Mutex<Vec<SerializerCall>>> {
        self.calls.clone()
    }

    fn write<W: Write + ?Sized>(
        &self,
        call: SerializerCall,
        snapshot: &dyn ProcessSnapshot,
        extensions: &[ExtensionStream],
        writer: &mut W,
    ) -> anyhow::Result<()> {
        lock(&self.calls).push(call);
        anyhow::ensure!(!self.fail, "serializer failure");
        serde_json::to_writer(writer, &SerializedReport::new(snapshot, extensions))?;
        Ok(())
    }
}

impl ReportSerializer for RecordingSerializer {
    fn write_everything(
        &self,
        snapshot: &dyn ProcessSnapshot,
        extensions: &[ExtensionStream],
        writer: &mut dyn WriteSeek,
    ) -> anyhow::Result<()> {
        self.write(SerializerCall::Everything, snapshot, extensions, writer)
    }

    fn write_compact(
        &self,
        snapshot: &dyn ProcessSnapshot,
        extensions: &[ExtensionStream],
        writer: &mut dyn Write,
        allow_seek: bool,
    ) -> anyhow::Result<()> {
        self.write(
            SerializerCall::Compact { allow_seek },
            snapshot,
            extensions,
            writer,
        )
    }
}

/// An upload coordinator that uploads nothing.
#[derive(Debug)]
pub struct RecordingUploadCoordinator {
    pending: Mutex<Vec<Uuid>>,
    waits: Mutex<Vec<Duration>>,
    upload_succeeds: bool,
}

impl RecordingUploadCoordinator {
    pub fn new(upload_succeeds: bool) -> Self {
        Self {
            pending: Mutex::default(),
            waits: Mutex::default(),
            upload_succeeds,
        }
    }

    pub fn pending(&self) -> Vec<Uuid> {
        lock(&self.pending).clone()
    }

    pub fn waits(&self) -> Vec<Duration> {
        lock(&self.waits).clone()
    }
}

impl UploadCoordinator for RecordingUploadCoordinator {
    fn report_pending(&self, uuid: Uuid) {
        lock(&self.pending).push(uuid);
    }

    fn wait_for_pending_upload(&self, timeout: Duration) -> bool {
        lock(&self.waits).push(timeout);
        self.upload_succeeds
    }
}

/// A connection to nothing.
#[derive(Debug)]
pub struct FakeConnection {
    pid: Pid,
}

impl PtraceConnection for FakeConnection {
    fn process_id(&self) -> Pid {
        self.pid
    }

    fn attach(&mut self, _tid: Pid) -> Result<(), ConnectionError> {
        Ok(())
    }

    fn is_64_bit(&self) -> bool {
        cfg!(target_pointer_width = "64")
    }

    fn threads(&self) -> Result<Vec<Pid>, ConnectionError> {
        Ok(vec![self.pid])
    }

    fn read_file_contents(&self, _path: &Path) -> Result<Vec<u8>, ConnectionError> {
        Ok(vec![])
    }
}

#[derive(Debug, Default)]
pub struct FakeConnectionFactory {
    pub fail_direct: bool,
    pub fail_brokered: bool,
}

impl ConnectionFactory for FakeConnectionFactory {
    fn direct(&self, pid: Pid) -> Result<Box<dyn PtraceConnection>, ConnectionError> {
        if self.fail_direct {
            return Err(ConnectionError::Attach {
                pid,
                source: nix::Error::EPERM,
            });
        }
        Ok(Box::new(FakeConnection { pid }))
    }

    fn brokered<'a>(
        &self,
        _broker: &'a UnixStream,
        pid: Pid,
    ) -> Result<Box<dyn PtraceConnection + 'a>, ConnectionError> {
        if self.fail_brokered {
            return Err(ConnectionError::Broker {
                request: "attach",
                status: libc::EPERM,
            });
        }
        Ok(Box::new(FakeConnection { pid }))
    }
}

#[derive(Debug, Default)]
pub struct CollectingLogSink {
    lines: Mutex<Vec<String>>,
}

impl CollectingLogSink {
    pub fn lines(&self) -> Vec<String> {
        lock(&self.lines).clone()
    }
}

impl LogSink for CollectingLogSink {
    fn log_line(&self, line: &str) {
        lock(&self.lines).push(line.to_string());
    }
}

/// Pretends to run tools, all of which terminate the same way.
#[derive(Debug)]
pub struct ScriptedToolRunner {
    exit: Option<ToolExit>,
    invocations: Arc<Mutex<Vec<(PathBuf, Vec<String>)>>>,
}

impl ScriptedToolRunner {
    pub fn new(exit: ToolExit) -> Self {
        Self {
            exit: Some(exit),
            invocations: Arc::default(),
        }
    }

    /// A runner whose tools can never be started.
    pub fn failing() -> Self {
        Self {
            exit: None,
            invocations: Arc::default(),
        }
    }

    /// A handle on the invocations, usable after the runner was given away.
    pub fn invocations(&self) -> Arc<Mutex<Vec<(PathBuf, Vec<String>)>>> {
        self.invocations.clone()
    }
}

impl ToolRunner for ScriptedToolRunner {
    fn run(&self, program: &Path, args: &[String]) -> Result<ToolExit, SpawnError> {
        lock(&self.invocations).push((program.to_path_buf(), args.to_vec()));
        self.exit.ok_or(SpawnError::Fork(nix::Error::EAGAIN))
    }
}

/// Records dump notifications, in order.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<String>>,
}

impl RecordingObserver {
    pub fn events(&self) -> Vec<String> {
        lock(&self.events).clone()
    }
}

impl DumpObserver for RecordingObserver {
    fn on_dump_event(&self) {
        lock(&self.events).push("on_dump_event".to_string());
    }

    fn after_dump(&self, report_id: Option<Uuid>) {
        let event = match report_id {
            Some(id) => format!("after_dump:{id}"),
            None => "after_dump".to_string(),
        };
        lock(&self.events).push(event);
    }
}

/// Produces the same extension stream for every snapshot.
#[derive(Debug, Clone)]
pub struct FixedUserStream(pub ExtensionStream);

impl UserStreamDataSource for FixedUserStream {
    fn produce_stream_data(&self, _snapshot: &dyn ProcessSnapshot) -> Option<ExtensionStream> {
        Some(self.0.clone())
    }
}
