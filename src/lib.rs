// SPDX-License-Identifier: MIT OR Apache-2.0
//! Scout
//!
//! Facade crate re-exporting the pieces of the Scout research orchestrator
//! that an embedder needs: [`scout_orchestrator::JobOrchestrator`] plus the
//! transport-agnostic boundary types from [`scout_protocol`].
//!
//! If you only take one dependency, take this one.

#![deny(unsafe_code)]

/// Current contract version embedded in result records.
pub const CONTRACT_VERSION: &str = "scout/v0.1";

pub use scout_orchestrator::{JobOrchestrator, OrchestratorError};
pub use scout_protocol::{JobTrigger, ResultRecord, StatusQuery, StatusResponse};
