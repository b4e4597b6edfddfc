// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Notifications around report generation.
//!
//! Handlers call a [`DumpObserver`] they were given at construction. For setups where the
//! callbacks are only known to some unrelated part of the program, a process-wide registry is
//! available: each callback can be registered once, at startup, and the default observer
//! ([`RegisteredCallbacks`]) forwards to whatever was registered.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::OnceLock;
use uuid::Uuid;

pub trait DumpObserver: Send + Sync {
    /// The crashed process has been captured and a report is about to be written.
    fn on_dump_event(&self) {}

    /// A report was written. `report_id` is the committed id, if the report went to the
    /// database.
    fn after_dump(&self, _report_id: Option<Uuid>) {}
}

pub type UserCallback = fn();

static ON_DUMP_EVENT: OnceLock<UserCallback> = OnceLock::new();
static AFTER_DUMP: OnceLock<UserCallback> = OnceLock::new();

/// Registers the process-wide callback run when a dump is about to be written.
/// Fails if one was already registered.
pub fn set_user_callback_on_dump_event(callback: UserCallback) -> anyhow::Result<()> {
    ON_DUMP_EVENT
        .set(callback)
        .map_err(|_| anyhow::anyhow!("on-dump-event callback already registered"))
}

/// Registers the process-wide callback run after a dump was written.
/// Fails if one was already registered.
pub fn set_user_callback_after_dump(callback: UserCallback) -> anyhow::Result<()> {
    AFTER_DUMP
        .set(callback)
        .map_err(|_| anyhow::anyhow!("after-dump callback already registered"))
}

/// Forwards to the process-wide callbacks, if any were registered.
#[derive(Debug, Default, Clone, Copy)]
pub struct RegisteredCallbacks;

impl DumpObserver for RegisteredCallbacks {
    fn on_dump_event(&self) {
        if let Some(callback) = ON_DUMP_EVENT.get() {
            callback();
        }
    }

    fn after_dump(&self, _report_id: Option<Uuid>) {
        if let Some(callback) = AFTER_DUMP.get() {
            callback();
        }
    }
}

/// Runs `hook`, containing any panic it raises.
pub(crate) fn notify(name: &str, hook: impl FnOnce()) {
    if catch_unwind(AssertUnwindSafe(hook)).is_err() {
        tracing::warn!(hook = name, "Dump observer panicked");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static AFTER_DUMP_CALLS: AtomicUsize = AtomicUsize::new(0);

    fn count_after_dump() {
        AFTER_DUMP_CALLS.fetch_add(1, Ordering::SeqCst);
    }

    fn other_callback() {}

    // The registry is process-wide, so everything touching it lives in this one test.
    #[test]
    fn test_registry_is_single_assignment() {
        set_user_callback_after_dump(count_after_dump).unwrap();
        assert!(set_user_callback_after_dump(other_callback).is_err());

        RegisteredCallbacks.after_dump(None);
        RegisteredCallbacks.after_dump(Some(Uuid::new_v4()));
        assert_eq!(AFTER_DUMP_CALLS.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_notify_contains_panics() {
        let mut ran = false;
        notify("test", || ran = true);
        assert!(ran);
        notify("test", || panic!("misbehaving observer"));
    }
}
