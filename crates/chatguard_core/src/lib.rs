#![forbid(unsafe_code)]

pub mod actions;
pub mod admin_cache;
pub mod classifier;
pub mod membership;
pub mod notice;
pub mod pipeline;
pub mod registry;
pub mod trust;

#[cfg(test)]
mod pipeline_tests;

pub use actions::{ExecutionReport, execute_actions, execute_outcome};
pub use admin_cache::{AdminCache, RefreshOutcome};
pub use classifier::{RestrictionReason, classify};
pub use membership::Departure;
pub use pipeline::{Action, ModerationConfig, ModerationPipeline, Outcome, Restriction, Stage};
pub use registry::{AdminEntry, ChatHandle, ChatRecord, ChatRegistry, MembershipEntry};
pub use trust::{Trust, TrustEngine};
