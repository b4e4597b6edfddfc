// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use super::{ConnectionError, PtraceConnection};
use nix::errno::Errno;
use nix::sys::ptrace;
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;
use std::fs::{self, File};
use std::io::Read;
use std::path::Path;

const ELF_MAGIC: [u8; 4] = [0x7f, b'E', b'L', b'F'];
const ELF_CLASS_64: u8 = 2;

/// Holds a thread in ptrace-stop for as long as it is alive.
#[derive(Debug)]
struct ScopedPtraceAttach {
    tid: Pid,
}

impl ScopedPtraceAttach {
    fn new(tid: Pid) -> Result<Self, ConnectionError> {
        ptrace::attach(tid).map_err(|source| ConnectionError::Attach { pid: tid, source })?;
        // From here on, dropping `attach` detaches the thread.
        let attach = Self { tid };
        loop {
            match waitpid(tid, Some(WaitPidFlag::__WALL)) {
                Ok(WaitStatus::Stopped(..)) => return Ok(attach),
                Ok(status) => {
                    return Err(ConnectionError::UnexpectedStatus {
                        pid: tid,
                        status: format!("{status:?}"),
                    })
                }
                Err(Errno::EINTR) => continue,
                Err(source) => return Err(ConnectionError::Wait { pid: tid, source }),
            }
        }
    }
}

impl Drop for ScopedPtraceAttach {
    fn drop(&mut self) {
        if let Err(e) = ptrace::detach(self.tid, None) {
            tracing::warn!(tid = self.tid.as_raw(), "ptrace detach failed: {e}");
        }
    }
}

/// A connection made by ptrace-attaching from this process.
#[derive(Debug)]
pub struct DirectPtraceConnection {
    pid: Pid,
    is_64_bit: bool,
    attachments: Vec<ScopedPtraceAttach>,
}

impl DirectPtraceConnection {
    /// Attaches to the main thread of `pid`.
    pub fn initialize(pid: Pid) -> Result<Self, ConnectionError> {
        let main_thread = ScopedPtraceAttach::new(pid)?;
        let is_64_bit = executable_is_64_bit(pid)?;
        Ok(Self {
            pid,
            is_64_bit,
            attachments: vec![main_thread],
        })
    }
}

impl PtraceConnection for DirectPtraceConnection {
    fn process_id(&self) -> Pid {
        self.pid
    }

    fn attach(&mut self, tid: Pid) -> Result<(), ConnectionError> {
        if self.attachments.iter().any(|a| a.tid == tid) {
            return Ok(());
        }
        self.attachments.push(ScopedPtraceAttach::new(tid)?);
        Ok(())
    }

    fn is_64_bit(&self) -> bool {
        self.is_64_bit
    }

    fn threads(&self) -> Result<Vec<Pid>, ConnectionError> {
        let mut threads = vec![];
        for entry in fs::read_dir(format!("/proc/{}/task", self.pid))? {
            let name = entry?.file_name();
            if let Some(tid) = name.to_str().and_then(|n| n.parse().ok()) {
                threads.push(Pid::from_raw(tid));
            }
        }
        threads.sort();
        Ok(threads)
    }

    fn read_file_contents(&self, path: &Path) -> Result<Vec<u8>, ConnectionError> {
        Ok(fs::read(path)?)
    }
}

fn executable_is_64_bit(pid: Pid) -> Result<bool, ConnectionError> {
    let mut ident = [0u8; 5];
    File::open(format!("/proc/{pid}/exe"))?.read_exact(&mut ident)?;
    if ident[..4] != ELF_MAGIC {
        return Err(ConnectionError::Protocol(format!(
            "/proc/{pid}/exe is not an ELF file"
        )));
    }
    Ok(ident[4] == ELF_CLASS_64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg_attr(miri, ignore)]
    fn test_own_executable_bitness() {
        let pid = nix::unistd::getpid();
        assert_eq!(
            executable_is_64_bit(pid).unwrap(),
            cfg!(target_pointer_width = "64")
        );
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn test_attach_to_missing_process_fails() {
        // Pid numbers are bounded well below i32::MAX by pid_max.
        let err = DirectPtraceConnection::initialize(Pid::from_raw(i32::MAX)).unwrap_err();
        assert!(matches!(err, ConnectionError::Attach { .. }), "{err}");
    }
}
