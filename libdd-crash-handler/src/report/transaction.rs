// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use super::{DatabaseError, NewReport, ReportDatabase};
use std::ops::{Deref, DerefMut};
use uuid::Uuid;

/// Owns a prepared report until it is committed.
///
/// Dropping the transaction without calling [`ReportTransaction::finish`] abandons the report,
/// so no early return can leave a half-written report behind in the database.
pub struct ReportTransaction<'a> {
    database: &'a dyn ReportDatabase,
    report: Option<Box<dyn NewReport>>,
}

impl<'a> ReportTransaction<'a> {
    pub fn prepare(database: &'a dyn ReportDatabase) -> Result<Self, DatabaseError> {
        let report = database.prepare_new_report()?;
        Ok(Self {
            database,
            report: Some(report),
        })
    }

    /// Commits the report and returns the id it was stored under.
    pub fn finish(mut self) -> Result<Uuid, DatabaseError> {
        match self.report.take() {
            Some(report) => self.database.finished_writing_report(report),
            None => Err(DatabaseError::Other(anyhow::anyhow!(
                "report transaction already completed"
            ))),
        }
    }
}

impl Deref for ReportTransaction<'_> {
    type Target = dyn NewReport;

    #[allow(clippy::expect_used)]
    fn deref(&self) -> &Self::Target {
        // Only `finish` and `drop` take the report, and both consume the transaction.
        self.report
            .as_deref()
            .expect("report is present until the transaction is consumed")
    }
}

impl DerefMut for ReportTransaction<'_> {
    #[allow(clippy::expect_used)]
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.report
            .as_deref_mut()
            .expect("report is present until the transaction is consumed")
    }
}

impl Drop for ReportTransaction<'_> {
    fn drop(&mut self) {
        if let Some(report) = self.report.take() {
            tracing::debug!(report_id = %report.report_id(), "Abandoning report");
            self.database.abandon_report(report);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::InMemoryDatabase;
    use std::io::Write;

    #[test]
    fn test_drop_abandons() {
        let database = InMemoryDatabase::new();
        let id = {
            let mut transaction = ReportTransaction::prepare(&database).unwrap();
            transaction.writer().write_all(b"partial").unwrap();
            transaction.report_id()
        };
        assert_eq!(database.abandoned(), vec![id]);
        assert!(database.finished().is_empty());
    }

    #[test]
    fn test_finish_commits() {
        let database = InMemoryDatabase::new();
        let mut transaction = ReportTransaction::prepare(&database).unwrap();
        transaction.writer().write_all(b"report").unwrap();
        let id = transaction.finish().unwrap();

        assert!(database.abandoned().is_empty());
        assert_eq!(database.finished(), vec![id]);
        assert_eq!(database.report_contents(id).unwrap(), b"report");
    }
}
