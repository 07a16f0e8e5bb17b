// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! # Instana Autoprofile
//!
//! Scheduling for the periodic profiler: a [`Timer`] runs a job after an initial
//! delay and then at a fixed interval, isolating the schedule from panics raised
//! by the job.

#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![deny(clippy::unwrap_used)]
#![deny(unused_extern_crates)]
#![deny(unused_allocation)]
#![deny(unused_assignments)]
#![deny(unused_comparisons)]
#![deny(missing_copy_implementations)]
#![allow(missing_docs)]
#![allow(clippy::missing_panics_doc)]

pub mod timer;

pub use timer::Timer;
