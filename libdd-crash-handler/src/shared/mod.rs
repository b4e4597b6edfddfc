// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! This module holds constants/structures that are shared between the handler, the report
//! writer and the tracer launcher

pub(crate) mod configuration;
pub mod constants;
