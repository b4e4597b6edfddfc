// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The process-wide annotation dictionary and the upload policy values read from it.
//!
//! The monitored process fills the dictionary before it crashes. From the handler's point of
//! view it is read-only: it is shared behind an `Arc` once setup is complete.

pub mod parameters;
pub mod tracer_args;

use crate::shared::constants::*;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnnotationDictionary {
    entries: Vec<(String, String)>,
}

impl AnnotationDictionary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `key` to `value`.
    ///
    /// An existing key keeps its position and has its value replaced. Keys and values longer
    /// than the dictionary limits are truncated. When the dictionary is full a new key is
    /// dropped and `false` is returned.
    pub fn set_key_value(&mut self, key: &str, value: &str) -> bool {
        let key = truncate(key, ANNOTATION_DICTIONARY_MAX_KEY_LEN);
        let value = truncate(value, ANNOTATION_DICTIONARY_MAX_VALUE_LEN);
        if key.is_empty() {
            return false;
        }
        if let Some(entry) = self.entries.iter_mut().find(|(k, _)| k == key) {
            entry.1 = value.to_string();
            return true;
        }
        if self.entries.len() >= ANNOTATION_DICTIONARY_MAX_ENTRIES {
            tracing::warn!(key, "annotation dictionary is full, dropping entry");
            return false;
        }
        self.entries.push((key.to_string(), value.to_string()));
        true
    }

    pub fn remove_key(&mut self, key: &str) -> Option<String> {
        let idx = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(idx).1)
    }

    pub fn value_for_key(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Reads `name` as a decimal integer, falling back to `default` when the entry is missing
    /// or does not parse.
    pub fn annotation_int64(&self, name: &str, default: i64) -> i64 {
        self.value_for_key(name)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    /// Reads `name`, yielding the empty string when it is missing.
    pub fn annotation_string(&self, name: &str) -> String {
        self.value_for_key(name).unwrap_or_default().to_string()
    }

    /// Size, in bytes, of the trailing part of each attachment that is copied into a report.
    pub fn upload_attachment_file_size_limit(&self, default_kilobytes: i64) -> i64 {
        self.annotation_int64(ANNOTATION_UPLOAD_ATTACHMENT_KB_LIMIT, default_kilobytes)
            .saturating_mul(1000)
    }

    pub fn upload_percentage(&self, default_percentage: i32) -> i32 {
        let percentage =
            self.annotation_int64(ANNOTATION_UPLOAD_PERCENTAGE, default_percentage.into());
        i32::try_from(percentage).unwrap_or(default_percentage)
    }

    /// Whether the deployment selected the minidump format rather than the tracer format.
    pub fn upload_minidump(&self) -> bool {
        self.annotation_string(ANNOTATION_FORMAT) == FORMAT_MINIDUMP
    }
}

impl<K: AsRef<str>, V: AsRef<str>> FromIterator<(K, V)> for AnnotationDictionary {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut dictionary = Self::new();
        for (k, v) in iter {
            dictionary.set_key_value(k.as_ref(), v.as_ref());
        }
        dictionary
    }
}

fn truncate(s: &str, max_len: usize) -> &str {
    if s.len() <= max_len {
        return s;
    }
    let mut end = max_len;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_key_value_keeps_order_on_replace() {
        let mut dictionary = AnnotationDictionary::new();
        assert!(dictionary.set_key_value("a", "1"));
        assert!(dictionary.set_key_value("b", "2"));
        assert!(dictionary.set_key_value("a", "3"));

        let entries: Vec<_> = dictionary.iter().collect();
        assert_eq!(entries, vec![("a", "3"), ("b", "2")]);
    }

    #[test]
    fn test_limits() {
        let mut dictionary = AnnotationDictionary::new();
        let long = "é".repeat(200);
        assert!(dictionary.set_key_value("long", &long));
        let stored = dictionary.value_for_key("long").unwrap();
        assert!(stored.len() <= ANNOTATION_DICTIONARY_MAX_VALUE_LEN);
        assert!(long.starts_with(stored));

        for i in 1..ANNOTATION_DICTIONARY_MAX_ENTRIES {
            assert!(dictionary.set_key_value(&format!("key{i}"), "v"));
        }
        assert_eq!(dictionary.len(), ANNOTATION_DICTIONARY_MAX_ENTRIES);
        assert!(!dictionary.set_key_value("overflow", "v"));
        assert_eq!(dictionary.value_for_key("overflow"), None);
        // Replacing still works on a full dictionary
        assert!(dictionary.set_key_value("key1", "w"));
        assert_eq!(dictionary.value_for_key("key1"), Some("w"));
    }

    #[test]
    fn test_remove_key() {
        let mut dictionary: AnnotationDictionary = [("a", "1"), ("b", "2")].into_iter().collect();
        assert_eq!(dictionary.remove_key("a"), Some("1".to_string()));
        assert_eq!(dictionary.remove_key("a"), None);
        assert_eq!(dictionary.iter().collect::<Vec<_>>(), vec![("b", "2")]);
    }

    #[test]
    fn test_upload_minidump_requires_exact_match() {
        let mut dictionary = AnnotationDictionary::new();
        assert!(!dictionary.upload_minidump());
        dictionary.set_key_value("Format", "Minidump");
        assert!(!dictionary.upload_minidump());
        dictionary.set_key_value("Format", "minidump ");
        assert!(!dictionary.upload_minidump());
        dictionary.set_key_value("Format", "minidump");
        assert!(dictionary.upload_minidump());
    }

    #[test]
    fn test_attachment_file_size_limit() {
        let mut dictionary = AnnotationDictionary::new();
        assert_eq!(dictionary.upload_attachment_file_size_limit(100), 100_000);
        dictionary.set_key_value("UploadAttachmentKiloByteLimit", "7");
        assert_eq!(dictionary.upload_attachment_file_size_limit(100), 7_000);
        dictionary.set_key_value("UploadAttachmentKiloByteLimit", "lots");
        assert_eq!(dictionary.upload_attachment_file_size_limit(100), 100_000);
    }

    #[test]
    fn test_upload_percentage() {
        let mut dictionary = AnnotationDictionary::new();
        assert_eq!(dictionary.upload_percentage(25), 25);
        dictionary.set_key_value("UploadPercentage", "80");
        assert_eq!(dictionary.upload_percentage(25), 80);
        dictionary.set_key_value("UploadPercentage", "99999999999");
        assert_eq!(dictionary.upload_percentage(25), 25);
    }
}
