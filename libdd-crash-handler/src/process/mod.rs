// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Running an external tool to completion.

use nix::errno::Errno;
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::{fork, ForkResult, Pid};
use std::ffi::{CString, NulError};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum SpawnError {
    #[error("Failed to convert tool path to CString: {0}")]
    ProgramPath(NulError),
    #[error("Failed to convert argument to CString: {0}")]
    Argument(NulError),
    #[error("Failed to fork: {0}")]
    Fork(nix::Error),
    #[error("Error waiting for tool {pid} to exit: {source}")]
    Wait { pid: Pid, source: nix::Error },
}

/// How a tool process terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolExit {
    Exited(i32),
    Signaled(i32),
    Stopped(i32),
}

impl ToolExit {
    /// True when the tool returned from `main` or called `exit`, whatever its exit code.
    pub fn exited_normally(&self) -> bool {
        matches!(self, Self::Exited(_))
    }
}

/// `execv` arguments, fully allocated before forking.
///
/// The child of a fork in a multi-threaded process may only make async-signal-safe calls, so
/// nothing may be allocated between `fork` and `execv`. `argv[0]` is the program path.
// The CStrings are only storage for the pointers.
#[allow(dead_code)]
#[derive(Debug)]
pub struct PreparedExec {
    program: CString,
    args_cstrings: Vec<CString>,
    args_ptrs: Vec<*const libc::c_char>,
}

impl PreparedExec {
    pub fn new(program: &Path, args: &[String]) -> Result<Self, SpawnError> {
        let program =
            CString::new(program.as_os_str().as_bytes()).map_err(SpawnError::ProgramPath)?;
        let mut args_cstrings = Vec::with_capacity(args.len() + 1);
        args_cstrings.push(program.clone());
        for arg in args {
            args_cstrings.push(CString::new(arg.as_str()).map_err(SpawnError::Argument)?);
        }
        let args_ptrs = args_cstrings
            .iter()
            .map(|arg| arg.as_ptr())
            .chain(std::iter::once(std::ptr::null()))
            .collect();
        Ok(Self {
            program,
            args_cstrings,
            args_ptrs,
        })
    }

    /// Replaces the current process image. Only returns on failure.
    pub fn exec(&self) -> Errno {
        // Safety: `new` built a null-terminated array of pointers into strings owned by `self`.
        unsafe {
            libc::execv(self.program.as_ptr(), self.args_ptrs.as_ptr());
        }
        Errno::last()
    }
}

/// Runs a tool synchronously and reports how it terminated.
///
/// The tool shares nothing with the caller beyond its command line and inherited file
/// descriptors.
pub trait ToolRunner: Send + Sync {
    fn run(&self, program: &Path, args: &[String]) -> Result<ToolExit, SpawnError>;
}

/// Forks and execs the tool, then blocks until it terminates. There is no timeout on the wait.
#[derive(Debug, Default, Clone, Copy)]
pub struct ForkExecRunner;

impl ToolRunner for ForkExecRunner {
    fn run(&self, program: &Path, args: &[String]) -> Result<ToolExit, SpawnError> {
        let exec = PreparedExec::new(program, args)?;
        // Safety: the child only calls execv and _exit.
        match unsafe { fork() }.map_err(SpawnError::Fork)? {
            ForkResult::Child => {
                exec.exec();
                // Safety: no preconditions.
                unsafe { libc::_exit(127) }
            }
            ForkResult::Parent { child } => wait_for_exit(child),
        }
    }
}

fn wait_for_exit(pid: Pid) -> Result<ToolExit, SpawnError> {
    loop {
        match waitpid(pid, None) {
            Ok(WaitStatus::Exited(_, code)) => return Ok(ToolExit::Exited(code)),
            Ok(WaitStatus::Signaled(_, signal, _)) => return Ok(ToolExit::Signaled(signal as i32)),
            Ok(WaitStatus::Stopped(_, signal)) => return Ok(ToolExit::Stopped(signal as i32)),
            Ok(_) | Err(Errno::EINTR) => continue,
            Err(source) => return Err(SpawnError::Wait { pid, source }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> ToolExit {
        ForkExecRunner
            .run(Path::new("/bin/sh"), &["-c".to_string(), script.to_string()])
            .unwrap()
    }

    #[test]
    fn test_prepared_exec_rejects_nul() {
        assert!(matches!(
            PreparedExec::new(Path::new("/bin/true"), &["a\0b".to_string()]),
            Err(SpawnError::Argument(_))
        ));
        assert!(matches!(
            PreparedExec::new(Path::new("/bin/\0true"), &[]),
            Err(SpawnError::ProgramPath(_))
        ));
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn test_exit_codes() {
        assert_eq!(sh("exit 0"), ToolExit::Exited(0));
        assert_eq!(sh("exit 3"), ToolExit::Exited(3));
        assert!(sh("exit 3").exited_normally());
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn test_signal_termination() {
        let exit = sh("kill -KILL $$");
        assert_eq!(exit, ToolExit::Signaled(libc::SIGKILL));
        assert!(!exit.exited_normally());
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn test_missing_program_exits_127() {
        let exit = ForkExecRunner
            .run(Path::new("/definitely/not/a/tool"), &[])
            .unwrap();
        assert_eq!(exit, ToolExit::Exited(127));
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn test_receives_arguments() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("args");
        let script = format!("printf '%s\\n' \"$0\" \"$@\" > {}", out.display());

        let exit = ForkExecRunner
            .run(
                Path::new("/bin/sh"),
                &[
                    "-c".to_string(),
                    script,
                    "tracer".to_string(),
                    "--kv=a:b".to_string(),
                    "with space".to_string(),
                ],
            )
            .unwrap();
        assert_eq!(exit, ToolExit::Exited(0));
        assert_eq!(
            std::fs::read_to_string(&out).unwrap(),
            "tracer\n--kv=a:b\nwith space\n"
        );
    }
}
