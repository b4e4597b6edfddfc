// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use super::{AnnotationSnapshot, CapturedSnapshot, ModuleSnapshot, ProcessSnapshot};
use std::collections::BTreeMap;
use uuid::Uuid;

/// A module whose annotations have already been read out of the crashed process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleSnapshotData {
    pub name: String,
    pub annotations_simple_map: BTreeMap<String, String>,
    pub annotations_vector: Vec<String>,
    pub annotation_objects: Vec<AnnotationSnapshot>,
}

impl ModuleSnapshotData {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

impl ModuleSnapshot for ModuleSnapshotData {
    fn name(&self) -> &str {
        &self.name
    }

    fn annotations_simple_map(&self) -> BTreeMap<String, String> {
        self.annotations_simple_map.clone()
    }

    fn annotations_vector(&self) -> Vec<String> {
        self.annotations_vector.clone()
    }

    fn annotation_objects(&self) -> Vec<AnnotationSnapshot> {
        self.annotation_objects.clone()
    }
}

/// A fully materialized capture. Snapshot builders that read everything up front can hand
/// this back directly.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessSnapshotData {
    pub process_id: i32,
    pub report_id: Uuid,
    pub client_id: Uuid,
    pub annotations_simple_map: BTreeMap<String, String>,
    pub modules: Vec<ModuleSnapshotData>,
}

impl ProcessSnapshotData {
    pub fn new(process_id: i32) -> Self {
        Self {
            process_id,
            ..Default::default()
        }
    }
}

impl ProcessSnapshot for ProcessSnapshotData {
    fn process_id(&self) -> i32 {
        self.process_id
    }

    fn report_id(&self) -> Uuid {
        self.report_id
    }

    fn client_id(&self) -> Uuid {
        self.client_id
    }

    fn annotations_simple_map(&self) -> BTreeMap<String, String> {
        self.annotations_simple_map.clone()
    }

    fn modules(&self) -> Vec<&dyn ModuleSnapshot> {
        self.modules
            .iter()
            .map(|m| m as &dyn ModuleSnapshot)
            .collect()
    }
}

impl CapturedSnapshot for ProcessSnapshotData {
    fn set_client_id(&mut self, client_id: Uuid) {
        self.client_id = client_id;
    }

    fn set_report_id(&mut self, report_id: Uuid) {
        self.report_id = report_id;
    }

    fn as_process_snapshot(&self) -> &dyn ProcessSnapshot {
        self
    }
}
