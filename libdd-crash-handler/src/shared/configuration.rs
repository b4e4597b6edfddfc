// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0
use crate::shared::constants;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandlerConfiguration {
    #[serde(default = "default_capture_time_budget")]
    capture_time_budget: Duration,
    // Fallback for the `UploadAttachmentKiloByteLimit` annotation
    attachment_kilobyte_limit: i64,
    // Passed through to the snapshot builder
    process_annotations: BTreeMap<String, String>,
    // Attachment name -> source file. Sources are re-read for every report.
    process_attachments: BTreeMap<String, PathBuf>,
    tracer_output_extension: String,
    upload_wait_timeout: Duration,
    write_minidump_to_database: bool,
    write_minidump_to_log: bool,
}

impl HandlerConfiguration {
    /// Creates a configuration with default limits.
    ///
    /// At least one of the destinations must be enabled. When both are enabled, the report is
    /// written to the database and a copy of it is pushed through the log stream.
    pub fn new(
        write_minidump_to_database: bool,
        write_minidump_to_log: bool,
        process_annotations: BTreeMap<String, String>,
        process_attachments: BTreeMap<String, PathBuf>,
    ) -> anyhow::Result<Self> {
        let config = Self {
            capture_time_budget: constants::DEFAULT_CAPTURE_TIME_BUDGET,
            attachment_kilobyte_limit: constants::DEFAULT_ATTACHMENT_KILOBYTE_LIMIT,
            process_annotations,
            process_attachments,
            tracer_output_extension: constants::DEFAULT_TRACER_OUTPUT_EXTENSION.to_string(),
            upload_wait_timeout: constants::DEFAULT_UPLOAD_WAIT_TIMEOUT,
            write_minidump_to_database,
            write_minidump_to_log,
        };
        config.validate()?;
        Ok(config)
    }

    /// Parses a json configuration, applying the same checks as [`HandlerConfiguration::new`].
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.write_minidump_to_database || self.write_minidump_to_log,
            "Handler must write minidumps to the database, the log, or both"
        );
        anyhow::ensure!(
            !self.capture_time_budget.is_zero(),
            "Capture time budget must be non-zero"
        );
        anyhow::ensure!(
            !self.upload_wait_timeout.is_zero(),
            "Upload wait timeout must be non-zero"
        );
        anyhow::ensure!(
            !self.tracer_output_extension.is_empty()
                && !self.tracer_output_extension.contains(&['.', '/'][..]),
            "Invalid tracer output extension {:?}",
            self.tracer_output_extension
        );
        Ok(())
    }

    /// Wall-clock time a capture may take before it is reported as slow.
    pub fn capture_time_budget(&self) -> Duration {
        self.capture_time_budget
    }

    pub fn attachment_kilobyte_limit(&self) -> i64 {
        self.attachment_kilobyte_limit
    }

    pub fn process_annotations(&self) -> &BTreeMap<String, String> {
        &self.process_annotations
    }

    pub fn process_attachments(&self) -> &BTreeMap<String, PathBuf> {
        &self.process_attachments
    }

    pub fn tracer_output_extension(&self) -> &str {
        &self.tracer_output_extension
    }

    pub fn upload_wait_timeout(&self) -> Duration {
        self.upload_wait_timeout
    }

    pub fn write_minidump_to_database(&self) -> bool {
        self.write_minidump_to_database
    }

    pub fn write_minidump_to_log(&self) -> bool {
        self.write_minidump_to_log
    }

    pub fn set_attachment_kilobyte_limit(&mut self, limit: i64) {
        self.attachment_kilobyte_limit = limit;
    }

    pub fn set_capture_time_budget(&mut self, budget: Duration) -> anyhow::Result<()> {
        anyhow::ensure!(!budget.is_zero(), "Capture time budget must be non-zero");
        self.capture_time_budget = budget;
        Ok(())
    }

    pub fn set_upload_wait_timeout(&mut self, timeout: Duration) -> anyhow::Result<()> {
        anyhow::ensure!(!timeout.is_zero(), "Upload wait timeout must be non-zero");
        self.upload_wait_timeout = timeout;
        Ok(())
    }

    pub fn set_tracer_output_extension(&mut self, extension: String) -> anyhow::Result<()> {
        anyhow::ensure!(
            !extension.is_empty() && !extension.contains(&['.', '/'][..]),
            "Invalid tracer output extension {extension:?}"
        );
        self.tracer_output_extension = extension;
        Ok(())
    }
}

fn default_capture_time_budget() -> Duration {
    constants::DEFAULT_CAPTURE_TIME_BUDGET
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_a_destination() {
        HandlerConfiguration::new(false, false, BTreeMap::new(), BTreeMap::new()).unwrap_err();

        for (database, log) in [(true, false), (false, true), (true, true)] {
            let config =
                HandlerConfiguration::new(database, log, BTreeMap::new(), BTreeMap::new())
                    .unwrap();
            assert_eq!(config.write_minidump_to_database(), database);
            assert_eq!(config.write_minidump_to_log(), log);
        }
    }

    #[test]
    fn test_defaults() {
        let config = HandlerConfiguration::new(true, false, BTreeMap::new(), BTreeMap::new())
            .unwrap();
        assert_eq!(config.attachment_kilobyte_limit(), 1000);
        assert_eq!(config.upload_wait_timeout(), Duration::from_secs(60));
        assert_eq!(config.tracer_output_extension(), "btt");
        assert_eq!(config.capture_time_budget(), Duration::from_secs(5));
    }

    #[test]
    fn test_capture_time_budget() -> anyhow::Result<()> {
        let mut config = HandlerConfiguration::new(true, false, BTreeMap::new(), BTreeMap::new())?;
        config.set_capture_time_budget(Duration::ZERO).unwrap_err();
        config.set_capture_time_budget(Duration::from_millis(250))?;
        assert_eq!(config.capture_time_budget(), Duration::from_millis(250));

        // Configurations written without a budget get the default one.
        let mut value = serde_json::to_value(&config)?;
        if let Some(fields) = value.as_object_mut() {
            fields.remove("capture_time_budget");
        }
        let parsed = HandlerConfiguration::from_json(&value.to_string())?;
        assert_eq!(parsed.capture_time_budget(), Duration::from_secs(5));
        Ok(())
    }

    #[test]
    fn test_from_json_is_validated() -> anyhow::Result<()> {
        let mut config = HandlerConfiguration::new(
            true,
            false,
            BTreeMap::from([("prod".to_string(), "app".to_string())]),
            BTreeMap::from([("log".to_string(), PathBuf::from("/var/log/app.log"))]),
        )?;
        config.set_attachment_kilobyte_limit(16);
        let json = serde_json::to_string(&config)?;
        assert_eq!(HandlerConfiguration::from_json(&json)?, config);

        let mut value: serde_json::Value = serde_json::from_str(&json)?;
        value["write_minidump_to_database"] = serde_json::Value::Bool(false);
        HandlerConfiguration::from_json(&value.to_string()).unwrap_err();
        Ok(())
    }

    #[test]
    fn test_setters_reject_invalid_values() {
        let mut config = HandlerConfiguration::new(true, true, BTreeMap::new(), BTreeMap::new())
            .unwrap();
        config.set_upload_wait_timeout(Duration::ZERO).unwrap_err();
        config
            .set_tracer_output_extension("tar.gz".to_string())
            .unwrap_err();
        config.set_tracer_output_extension(String::new()).unwrap_err();
        config
            .set_tracer_output_extension("trace".to_string())
            .unwrap();
        assert_eq!(config.tracer_output_extension(), "trace");
    }
}
