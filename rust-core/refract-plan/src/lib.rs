// SPDX-License-Identifier: PMPL-1.0-or-later
//! Refract Plan
//!
//! The backend-neutral query-plan tree the rewriter compiles into, plus the
//! recursive AST-to-plan builder. The plan is handed to a backend-specific
//! serializer, which is outside this workspace.

pub mod builder;
pub mod error;
pub mod plan;

pub use builder::{ExpansionResolution, PlanBuilder};
pub use error::PlanError;
pub use plan::{PlanValue, QueryPlan, TermsExecution};
