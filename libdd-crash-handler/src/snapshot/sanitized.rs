// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use super::{AnnotationSnapshot, ModuleSnapshot, ProcessSnapshot};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// What the crashing client asked to be redacted from its report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SanitizationInfo {
    /// Annotation names that may appear in the report. `None` keeps every annotation.
    pub allowed_annotations: Option<Vec<String>>,
}

impl SanitizationInfo {
    fn allows(&self, name: &str) -> bool {
        self.allowed_annotations
            .as_ref()
            .map_or(true, |allowed| allowed.iter().any(|a| a == name))
    }
}

/// A filtering view over a captured process. Nothing is copied out of the underlying
/// snapshot until it is queried.
pub struct SanitizedSnapshot<'a> {
    snapshot: &'a dyn ProcessSnapshot,
    info: &'a SanitizationInfo,
    modules: Vec<SanitizedModule<'a>>,
}

impl<'a> SanitizedSnapshot<'a> {
    pub fn new(snapshot: &'a dyn ProcessSnapshot, info: &'a SanitizationInfo) -> Self {
        let modules = snapshot
            .modules()
            .into_iter()
            .map(|module| SanitizedModule { module, info })
            .collect();
        Self {
            snapshot,
            info,
            modules,
        }
    }
}

impl ProcessSnapshot for SanitizedSnapshot<'_> {
    fn process_id(&self) -> i32 {
        self.snapshot.process_id()
    }

    fn report_id(&self) -> Uuid {
        self.snapshot.report_id()
    }

    fn client_id(&self) -> Uuid {
        self.snapshot.client_id()
    }

    fn annotations_simple_map(&self) -> BTreeMap<String, String> {
        filter_map(self.snapshot.annotations_simple_map(), self.info)
    }

    fn modules(&self) -> Vec<&dyn ModuleSnapshot> {
        self.modules
            .iter()
            .map(|m| m as &dyn ModuleSnapshot)
            .collect()
    }
}

struct SanitizedModule<'a> {
    module: &'a dyn ModuleSnapshot,
    info: &'a SanitizationInfo,
}

impl ModuleSnapshot for SanitizedModule<'_> {
    fn name(&self) -> &str {
        self.module.name()
    }

    fn annotations_simple_map(&self) -> BTreeMap<String, String> {
        filter_map(self.module.annotations_simple_map(), self.info)
    }

    fn annotations_vector(&self) -> Vec<String> {
        // Free-form entries have no name to check against the allowlist.
        if self.info.allowed_annotations.is_some() {
            return vec![];
        }
        self.module.annotations_vector()
    }

    fn annotation_objects(&self) -> Vec<AnnotationSnapshot> {
        let mut objects = self.module.annotation_objects();
        objects.retain(|a| self.info.allows(&a.name));
        objects
    }
}

fn filter_map(
    mut map: BTreeMap<String, String>,
    info: &SanitizationInfo,
) -> BTreeMap<String, String> {
    map.retain(|k, _| info.allows(k));
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{ModuleSnapshotData, ProcessSnapshotData};

    fn snapshot() -> ProcessSnapshotData {
        let mut module = ModuleSnapshotData::new("libapp.so");
        module
            .annotations_simple_map
            .insert("build".to_string(), "42".to_string());
        module
            .annotations_simple_map
            .insert("secret".to_string(), "hunter2".to_string());
        module.annotations_vector.push("free form".to_string());
        module
            .annotation_objects
            .push(AnnotationSnapshot::new_string("channel", "beta"));
        module
            .annotation_objects
            .push(AnnotationSnapshot::new_string("token", "abc"));

        let mut snapshot = ProcessSnapshotData::new(1234);
        snapshot
            .annotations_simple_map
            .insert("prod".to_string(), "app".to_string());
        snapshot
            .annotations_simple_map
            .insert("user".to_string(), "someone".to_string());
        snapshot.modules.push(module);
        snapshot
    }

    #[test]
    fn test_allowlist_filters_annotations() {
        let snapshot = snapshot();
        let info = SanitizationInfo {
            allowed_annotations: Some(vec![
                "prod".to_string(),
                "build".to_string(),
                "channel".to_string(),
            ]),
        };
        let sanitized = SanitizedSnapshot::new(&snapshot, &info);

        assert_eq!(sanitized.process_id(), 1234);
        assert_eq!(
            sanitized.annotations_simple_map().into_keys().collect::<Vec<_>>(),
            vec!["prod"]
        );
        let modules = sanitized.modules();
        assert_eq!(modules.len(), 1);
        assert_eq!(modules[0].name(), "libapp.so");
        assert_eq!(
            modules[0]
                .annotations_simple_map()
                .into_keys()
                .collect::<Vec<_>>(),
            vec!["build"]
        );
        assert!(modules[0].annotations_vector().is_empty());
        let objects = modules[0].annotation_objects();
        assert_eq!(objects.len(), 1);
        assert_eq!(objects[0].name, "channel");
    }

    #[test]
    fn test_no_allowlist_passes_everything_through() {
        let snapshot = snapshot();
        let info = SanitizationInfo::default();
        let sanitized = SanitizedSnapshot::new(&snapshot, &info);

        assert_eq!(
            sanitized.annotations_simple_map(),
            snapshot.annotations_simple_map
        );
        let modules = sanitized.modules();
        assert_eq!(modules[0].annotations_vector(), vec!["free form"]);
        assert_eq!(modules[0].annotation_objects().len(), 2);
    }

    #[test]
    fn test_view_reflects_stamped_ids() {
        let mut snapshot = snapshot();
        let report_id = Uuid::new_v4();
        snapshot.report_id = report_id;
        let info = SanitizationInfo::default();
        let sanitized = SanitizedSnapshot::new(&snapshot, &info);
        assert_eq!(sanitized.report_id(), report_id);
    }
}
