// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! In-memory views of a crashed process.
//!
//! Capturing the process (reading threads, memory and modules through a
//! [`PtraceConnection`](crate::connection::PtraceConnection)) is the job of a
//! [`SnapshotBuilder`]. This module only describes what the handler needs from a capture.

mod builder;
mod data;
mod sanitized;

pub use builder::*;
pub use data::*;
pub use sanitized::*;

use std::collections::BTreeMap;
use uuid::Uuid;

/// A typed annotation attached to a module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationSnapshot {
    pub name: String,
    pub annotation_type: u16,
    pub value: Vec<u8>,
}

impl AnnotationSnapshot {
    pub const TYPE_INVALID: u16 = 0;
    pub const TYPE_STRING: u16 = 1;

    pub fn new_string(name: impl Into<String>, value: impl AsRef<str>) -> Self {
        Self {
            name: name.into(),
            annotation_type: Self::TYPE_STRING,
            value: value.as_ref().as_bytes().to_vec(),
        }
    }

    /// The value of a string annotation. Invalid UTF-8 is replaced rather than rejected.
    pub fn string_value(&self) -> Option<String> {
        if self.annotation_type != Self::TYPE_STRING {
            return None;
        }
        Some(String::from_utf8_lossy(&self.value).into_owned())
    }
}

pub trait ModuleSnapshot {
    fn name(&self) -> &str;
    fn annotations_simple_map(&self) -> BTreeMap<String, String>;
    /// Free-form annotation list.
    fn annotations_vector(&self) -> Vec<String>;
    fn annotation_objects(&self) -> Vec<AnnotationSnapshot>;
}

/// Read-only capability shared by a raw capture and by a sanitized view of it.
pub trait ProcessSnapshot {
    fn process_id(&self) -> i32;
    fn report_id(&self) -> Uuid;
    fn client_id(&self) -> Uuid;
    fn annotations_simple_map(&self) -> BTreeMap<String, String>;
    fn modules(&self) -> Vec<&dyn ModuleSnapshot>;
}

/// The capture produced by a [`SnapshotBuilder`]. The handler stamps identities onto it
/// before it is serialized.
pub trait CapturedSnapshot: ProcessSnapshot {
    fn set_client_id(&mut self, client_id: Uuid);
    fn set_report_id(&mut self, report_id: Uuid);
    fn as_process_snapshot(&self) -> &dyn ProcessSnapshot;
}
