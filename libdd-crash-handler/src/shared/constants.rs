// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

pub const MINIDUMP_LOG_BEGIN: &str = "-----BEGIN CRASHPAD MINIDUMP-----";
pub const MINIDUMP_LOG_END: &str = "-----END CRASHPAD MINIDUMP-----";
pub const MINIDUMP_LOG_ABORT: &str = "-----ABORT CRASHPAD MINIDUMP-----";

/// Width of a single encoded line handed to the log sink.
pub const MINIDUMP_LOG_LINE_LENGTH: usize = 512;
/// Encoded bytes a single log stream may emit before it is aborted.
pub const MINIDUMP_LOG_OUTPUT_CAP: usize = 4 * 1024 * 1024;

pub const ANNOTATION_UPLOAD_ATTACHMENT_KB_LIMIT: &str = "UploadAttachmentKiloByteLimit";
pub const ANNOTATION_UPLOAD_PERCENTAGE: &str = "UploadPercentage";
pub const ANNOTATION_FORMAT: &str = "Format";
pub const FORMAT_MINIDUMP: &str = "minidump";

pub const PARAMETER_LIST_ANNOTATIONS: &str = "list_annotations";
pub const PARAMETER_GUID: &str = "guid";

pub const TRACER_OPT_PREFIX: &str = "--additional-tracer-opt";
pub const TRACER_PATH_PREFIX: &str = "--additional-tracer";
pub const FAULTING_TID_PREFIX: &str = "_mod_faulting_tid";

pub const DEFAULT_ATTACHMENT_KILOBYTE_LIMIT: i64 = 1000;
pub const DEFAULT_UPLOAD_WAIT_TIMEOUT: Duration = Duration::from_secs(60);
/// Captures slower than this are reported; the crashed process is suspended meanwhile.
pub const DEFAULT_CAPTURE_TIME_BUDGET: Duration = Duration::from_secs(5);
pub const DEFAULT_TRACER_OUTPUT_EXTENSION: &str = "btt";

pub const ANNOTATION_DICTIONARY_MAX_ENTRIES: usize = 64;
pub const ANNOTATION_DICTIONARY_MAX_KEY_LEN: usize = 255;
pub const ANNOTATION_DICTIONARY_MAX_VALUE_LEN: usize = 255;
