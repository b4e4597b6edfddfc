// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Turns the annotation dictionary into the command line of the additional tracer.

use super::AnnotationDictionary;
use crate::shared::constants::{FAULTING_TID_PREFIX, TRACER_OPT_PREFIX, TRACER_PATH_PREFIX};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TracerArgvError {
    #[error("The annotation dictionary holds no key/value annotations for the tracer")]
    NoGenericAnnotations,
}

/// What a single annotation entry contributes to the tracer command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TracerAnnotation {
    /// Replaces the initial argument that sets the same `option`, or adds `argument` when
    /// there is none.
    OverrideOption { option: String, argument: String },
    /// Replaces the tracer executable.
    OverridePath(PathBuf),
    FaultThread(String),
    Generic { key: String, value: String },
}

impl TracerAnnotation {
    /// Classifies an entry by the prefix of its key.
    ///
    /// Overrides carry their payload in the key, after the first `=`:
    /// `--additional-tracer-opt=<option>=<value>` and `--additional-tracer=<path>`.
    pub fn classify(key: &str, value: &str) -> Self {
        // The opt prefix extends the path prefix, so it is checked first.
        if key.starts_with(TRACER_OPT_PREFIX) {
            let argument = after_first_eq(key);
            let option = argument.split('=').next().unwrap_or_default();
            Self::OverrideOption {
                option: option.to_string(),
                argument: argument.to_string(),
            }
        } else if key.starts_with(TRACER_PATH_PREFIX) {
            Self::OverridePath(PathBuf::from(after_first_eq(key)))
        } else if key.starts_with(FAULTING_TID_PREFIX) {
            Self::FaultThread(value.to_string())
        } else {
            Self::Generic {
                key: key.to_string(),
                value: value.to_string(),
            }
        }
    }
}

fn after_first_eq(s: &str) -> &str {
    s.split_once('=').map(|(_, rest)| rest).unwrap_or(s)
}

fn option_name(argument: &str) -> &str {
    argument.split('=').next().unwrap_or_default()
}

/// The tracer executable and its arguments, owned.
///
/// The pointer array handed to `execv` is derived from this only right before spawning, see
/// [`crate::process::PreparedExec`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracerArgv {
    program: PathBuf,
    args: Vec<String>,
}

impl TracerArgv {
    /// Builds the tracer command line from `initial_args` and the annotation dictionary.
    ///
    /// Fails unless the dictionary holds at least one generic key/value entry, even when it
    /// holds overrides. On success the last argument is `tracee` and, when `output` is given,
    /// the one before it is `--output=<output>`.
    pub fn build(
        tracer_path: &Path,
        initial_args: &[String],
        annotations: &AnnotationDictionary,
        tracee: i32,
        output: Option<&Path>,
    ) -> Result<Self, TracerArgvError> {
        let mut builder = TracerArgvBuilder::new(tracer_path, initial_args);
        for (key, value) in annotations.iter() {
            builder.push(TracerAnnotation::classify(key, value));
        }
        builder.finish(tracee, output)
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }
}

/// Assembles a [`TracerArgv`] from classified annotations, in dictionary order.
///
/// Option overrides only ever replace one of the initial arguments. Arguments added while
/// building, including those added by earlier overrides, are never replaced.
#[derive(Debug)]
pub struct TracerArgvBuilder {
    program: PathBuf,
    args: Vec<String>,
    // Option name -> index of the last initial argument setting it
    initial_options: HashMap<String, usize>,
    generic_count: usize,
}

impl TracerArgvBuilder {
    pub fn new(tracer_path: &Path, initial_args: &[String]) -> Self {
        let initial_options = initial_args
            .iter()
            .enumerate()
            .map(|(idx, arg)| (option_name(arg).to_string(), idx))
            .collect();
        Self {
            program: tracer_path.to_path_buf(),
            args: initial_args.to_vec(),
            initial_options,
            generic_count: 0,
        }
    }

    pub fn push(&mut self, annotation: TracerAnnotation) {
        match annotation {
            TracerAnnotation::OverrideOption { option, argument } => {
                match self.initial_options.get(&option).copied() {
                    Some(idx) => {
                        tracing::info!("Replace tracer argument [{idx}] : {argument}");
                        self.args[idx] = argument;
                    }
                    None => {
                        tracing::info!("Add a tracer argument: {argument}");
                        self.args.push(argument);
                    }
                }
            }
            TracerAnnotation::OverridePath(path) => {
                tracing::info!("Replace tracer pathname: {}", path.display());
                self.program = path;
            }
            TracerAnnotation::FaultThread(tid) => {
                self.args.push(format!("--fault-thread={tid}"));
            }
            TracerAnnotation::Generic { key, value } => {
                self.args.push(format!("--kv={key}:{value}"));
                self.generic_count += 1;
            }
        }
    }

    pub fn finish(mut self, tracee: i32, output: Option<&Path>) -> Result<TracerArgv, TracerArgvError> {
        if self.generic_count == 0 {
            tracing::error!("The annotation dictionary is empty");
            return Err(TracerArgvError::NoGenericAnnotations);
        }
        if let Some(output) = output.filter(|o| !o.as_os_str().is_empty()) {
            self.args.push(format!("--output={}", output.display()));
        }
        self.args.push(tracee.to_string());
        Ok(TracerArgv {
            program: self.program,
            args: self.args,
        })
    }
}
