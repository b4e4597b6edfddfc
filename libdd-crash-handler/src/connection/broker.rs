// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use super::{ConnectionError, PtraceConnection};
use nix::unistd::Pid;
use std::io::{Read, Write};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::net::UnixStream;
use std::path::Path;

// Requests are `[u32 kind][i32 tid]`, little endian, followed by a request specific payload.
// Every request but `Exit` is answered by an `i32` status; zero means success and is followed
// by the response payload.
pub const BROKER_REQUEST_ATTACH: u32 = 0;
pub const BROKER_REQUEST_IS_64_BIT: u32 = 1;
pub const BROKER_REQUEST_THREADS: u32 = 2;
pub const BROKER_REQUEST_READ_FILE: u32 = 3;
pub const BROKER_REQUEST_EXIT: u32 = 4;

const MAX_BROKER_PAYLOAD: usize = 64 * 1024 * 1024;

/// A connection whose ptrace operations are carried out by a broker process.
///
/// The socket is borrowed from the broker session; the client tells the broker to let go of
/// the process when it is dropped.
#[derive(Debug)]
pub struct PtraceClient<'a> {
    sock: &'a UnixStream,
    pid: Pid,
    is_64_bit: bool,
}

impl<'a> PtraceClient<'a> {
    pub fn initialize(sock: &'a UnixStream, pid: Pid) -> Result<Self, ConnectionError> {
        let mut client = Self {
            sock,
            pid,
            is_64_bit: false,
        };
        client.request(BROKER_REQUEST_ATTACH, pid, &[], "attach")?;
        client.request(BROKER_REQUEST_IS_64_BIT, pid, &[], "is_64_bit")?;
        let mut is_64_bit = [0u8; 1];
        client.sock.read_exact(&mut is_64_bit)?;
        client.is_64_bit = is_64_bit[0] != 0;
        Ok(client)
    }

    fn request(
        &self,
        kind: u32,
        tid: Pid,
        payload: &[u8],
        name: &'static str,
    ) -> Result<(), ConnectionError> {
        let mut sock = self.sock;
        let mut message = Vec::with_capacity(8 + payload.len());
        message.extend_from_slice(&kind.to_le_bytes());
        message.extend_from_slice(&tid.as_raw().to_le_bytes());
        message.extend_from_slice(payload);
        sock.write_all(&message)?;
        sock.flush()?;

        let status = i32::from_le_bytes(read_array(&mut sock)?);
        if status != 0 {
            return Err(ConnectionError::Broker {
                request: name,
                status,
            });
        }
        Ok(())
    }

    fn read_len(&self) -> Result<usize, ConnectionError> {
        let mut sock = self.sock;
        let len = u32::from_le_bytes(read_array(&mut sock)?) as usize;
        if len > MAX_BROKER_PAYLOAD {
            return Err(ConnectionError::Protocol(format!(
                "payload of {len} bytes exceeds limit"
            )));
        }
        Ok(len)
    }
}

impl PtraceConnection for PtraceClient<'_> {
    fn process_id(&self) -> Pid {
        self.pid
    }

    fn attach(&mut self, tid: Pid) -> Result<(), ConnectionError> {
        self.request(BROKER_REQUEST_ATTACH, tid, &[], "attach")
    }

    fn is_64_bit(&self) -> bool {
        self.is_64_bit
    }

    fn threads(&self) -> Result<Vec<Pid>, ConnectionError> {
        self.request(BROKER_REQUEST_THREADS, self.pid, &[], "threads")?;
        let count = self.read_len()? / std::mem::size_of::<i32>();
        let mut sock = self.sock;
        let mut threads = Vec::with_capacity(count);
        for _ in 0..count {
            threads.push(Pid::from_raw(i32::from_le_bytes(read_array(&mut sock)?)));
        }
        Ok(threads)
    }

    fn read_file_contents(&self, path: &Path) -> Result<Vec<u8>, ConnectionError> {
        let path = path.as_os_str().as_bytes();
        let path_len = u32::try_from(path.len())
            .map_err(|_| ConnectionError::Protocol("path too long".to_string()))?;
        let mut payload = path_len.to_le_bytes().to_vec();
        payload.extend_from_slice(path);
        self.request(BROKER_REQUEST_READ_FILE, self.pid, &payload, "read_file")?;

        let len = self.read_len()?;
        let mut contents = vec![0u8; len];
        let mut sock = self.sock;
        sock.read_exact(&mut contents)?;
        Ok(contents)
    }
}

impl Drop for PtraceClient<'_> {
    fn drop(&mut self) {
        let mut message = BROKER_REQUEST_EXIT.to_le_bytes().to_vec();
        message.extend_from_slice(&self.pid.as_raw().to_le_bytes());
        let mut sock = self.sock;
        if let Err(e) = sock.write_all(&message) {
            tracing::debug!("Failed to release broker: {e}");
        }
    }
}

fn read_array<const N: usize>(r: &mut impl Read) -> std::io::Result<[u8; N]> {
    let mut buf = [0u8; N];
    r.read_exact(&mut buf)?;
    Ok(buf)
}
