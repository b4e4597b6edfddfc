// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use super::{CapturedSnapshot, SanitizationInfo};
use crate::connection::PtraceConnection;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// What the crashing client told the handler about its crash. Addresses are in the
/// client's address space.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInformation {
    pub exception_information_address: u64,
    pub sanitization_information_address: u64,
    /// Crash loop detection cutoff, as seconds since the epoch. Zero disables it.
    pub crash_loop_before_time: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct CaptureRequest<'a> {
    pub client_info: &'a ClientInformation,
    pub process_annotations: &'a BTreeMap<String, String>,
    pub client_uid: u32,
    /// An address on the requesting thread's stack, or zero when unknown.
    pub requesting_thread_stack_address: u64,
}

pub struct CapturedProcess {
    pub snapshot: Box<dyn CapturedSnapshot>,
    /// Present when the client asked for its report to be sanitized.
    pub sanitization: Option<SanitizationInfo>,
    /// The thread whose stack contains the requested stack address, if it was found.
    pub requesting_thread_id: Option<i32>,
}

impl std::fmt::Debug for CapturedProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapturedProcess")
            .field("process_id", &self.snapshot.process_id())
            .field("sanitization", &self.sanitization)
            .field("requesting_thread_id", &self.requesting_thread_id)
            .finish()
    }
}

/// Reads the crashed process through an attached connection.
///
/// Implementations should bound the time they spend: the crashed process stays suspended for
/// the whole capture.
pub trait SnapshotBuilder: Send + Sync {
    fn capture(
        &self,
        connection: &mut dyn PtraceConnection,
        request: &CaptureRequest<'_>,
    ) -> anyhow::Result<CapturedProcess>;
}
