// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Connections to a crashed process.
//!
//! A connection is either made directly, by ptrace-attaching from the handler, or brokered,
//! by asking a privileged helper on the other end of a unix socket to attach on the
//! handler's behalf. Either way, the connection lives only as long as one exception-handling
//! call.

mod broker;
#[cfg(target_os = "linux")]
mod direct;

pub use broker::*;
#[cfg(target_os = "linux")]
pub use direct::*;

use nix::unistd::Pid;
use std::os::unix::net::UnixStream;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("Failed to attach to {pid}: {source}")]
    Attach { pid: Pid, source: nix::Error },
    #[error("Failed waiting for {pid} to stop: {source}")]
    Wait { pid: Pid, source: nix::Error },
    #[error("{pid} did not stop after attach: {status}")]
    UnexpectedStatus { pid: Pid, status: String },
    #[error("Broker rejected {request} request with status {status}")]
    Broker { request: &'static str, status: i32 },
    #[error("Malformed broker response: {0}")]
    Protocol(String),
    #[error("Direct connections are not supported on this platform")]
    Unsupported,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A live channel to a stopped process.
pub trait PtraceConnection {
    fn process_id(&self) -> Pid;

    /// Attaches to an additional thread of the process. The thread is released when the
    /// connection is dropped.
    fn attach(&mut self, tid: Pid) -> Result<(), ConnectionError>;

    fn is_64_bit(&self) -> bool;

    fn threads(&self) -> Result<Vec<Pid>, ConnectionError>;

    /// Reads a file as seen by the connected process, e.g. `/proc/<pid>/maps`.
    fn read_file_contents(&self, path: &Path) -> Result<Vec<u8>, ConnectionError>;
}

/// Acquires connections for the handler.
pub trait ConnectionFactory: Send + Sync {
    fn direct(&self, pid: Pid) -> Result<Box<dyn PtraceConnection>, ConnectionError>;

    fn brokered<'a>(
        &self,
        broker: &'a UnixStream,
        pid: Pid,
    ) -> Result<Box<dyn PtraceConnection + 'a>, ConnectionError>;
}

/// Attaches with ptrace, either from this process or through a broker.
#[derive(Debug, Default, Clone, Copy)]
pub struct PtraceConnectionFactory;

impl ConnectionFactory for PtraceConnectionFactory {
    #[cfg(target_os = "linux")]
    fn direct(&self, pid: Pid) -> Result<Box<dyn PtraceConnection>, ConnectionError> {
        Ok(Box::new(DirectPtraceConnection::initialize(pid)?))
    }

    #[cfg(not(target_os = "linux"))]
    fn direct(&self, _pid: Pid) -> Result<Box<dyn PtraceConnection>, ConnectionError> {
        Err(ConnectionError::Unsupported)
    }

    fn brokered<'a>(
        &self,
        broker: &'a UnixStream,
        pid: Pid,
    ) -> Result<Box<dyn PtraceConnection + 'a>, ConnectionError> {
        Ok(Box::new(PtraceClient::initialize(broker, pid)?))
    }
}
