// Copyright 2025 The Axvisor Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! AxExec - Domain and vcpu lifecycle control for hypervisor guests.
//!
//! This crate materializes a guest domain from an executable image, drives one vcpu through its
//! run loop until it halts or faults, and guarantees that every vcpu and domain it acquired is
//! released exactly once, whichever way the execution ends. All privileged requests go through
//! an implementation of the `AxControlChannel` trait.
//!
//! # Features
//!
//! - Boot command line assembly and domain creation requests
//! - State machine for the vcpu run loop (Created → Running → Halted / Faulted / Unknown)
//! - Scoped release of vcpus and owned domains, in reverse acquisition order
//! - A control channel backed by the hypervisor builder driver (Linux only)

// Core modules
mod channel; // Control channel trait and identifiers
mod domain; // Domain creation requests
#[cfg(target_os = "linux")]
pub mod driver; // Builder driver backed control channel
mod error; // Error taxonomy
mod exit; // Run event enumeration and classification
mod lifecycle; // Execution sequencing and domain ownership
mod vcpu; // Vcpu run loop and state management

// Public API exports
pub use channel::*; // Control channel trait and identifiers
pub use domain::*; // Domain creation
pub use error::{ExecError, ExecResult};
pub use exit::AxRunEvent;
pub use lifecycle::*; // Controller, options and exit status
pub use vcpu::*; // Vcpu runner and guard
