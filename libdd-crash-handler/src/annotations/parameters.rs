// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::shared::constants::{PARAMETER_GUID, PARAMETER_LIST_ANNOTATIONS};
use crate::snapshot::ProcessSnapshot;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

/// Builds the form parameters sent along with a report upload.
///
/// The process' own simple annotations come first; module annotations are folded in after,
/// and the first value seen for a key wins. Free-form module annotations are joined, one per
/// line, under `list_annotations`. `list_annotations` (when any module has free-form
/// annotations, even empty ones) and `guid` always carry the computed values, whatever a
/// module supplied for them.
pub fn breakpad_http_form_parameters_from_minidump(
    snapshot: &dyn ProcessSnapshot,
) -> BTreeMap<String, String> {
    let mut parameters = snapshot.annotations_simple_map();
    let mut list_annotations: Option<String> = None;

    for module in snapshot.modules() {
        for (key, value) in module.annotations_simple_map() {
            insert_first(&mut parameters, module.name(), key, value);
        }

        for annotation in module.annotations_vector() {
            let list = list_annotations.get_or_insert_with(String::new);
            list.push_str(&annotation);
            list.push('\n');
        }

        for annotation in module.annotation_objects() {
            if let Some(value) = annotation.string_value() {
                insert_first(&mut parameters, module.name(), annotation.name, value);
            }
        }
    }

    if let Some(mut list) = list_annotations {
        list.pop();
        parameters.insert(PARAMETER_LIST_ANNOTATIONS.to_string(), list);
    }
    parameters.insert(
        PARAMETER_GUID.to_string(),
        snapshot.client_id().hyphenated().to_string(),
    );
    parameters
}

fn insert_first(parameters: &mut BTreeMap<String, String>, module: &str, key: String, value: String) {
    match parameters.entry(key) {
        Entry::Vacant(entry) => {
            entry.insert(value);
        }
        Entry::Occupied(entry) => {
            tracing::warn!(
                module,
                key = entry.key().as_str(),
                "duplicate annotation, discarding {value}"
            );
        }
    }
}
