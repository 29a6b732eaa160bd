//! Envelope types, error taxonomy, queue naming authority, and dispatch
//! context shared by every other `relay-*` crate.
//!
//! This crate has no transport dependency of its own — it describes the
//! shape of messages and the rules for naming the queues they travel over,
//! nothing about how bytes actually move.

pub mod context;
pub mod envelope;
pub mod error;
pub mod naming;

pub use context::{ExecutionContext, TenantTier, TenantTierResolver};
pub use envelope::{Action, ActionBuilder, ActionResponse};
pub use error::{CoreError, ErrorDetail, ErrorType};
pub use naming::{
    action_queue_name, callback_queue_name, response_queue_name, sanitise_action_type,
    target_service_from_action_type,
};
