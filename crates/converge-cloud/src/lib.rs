//! Converge reconciliation engine
//!
//! This crate moves remote cloud-platform resources from their last-known
//! state to a newly declared state, tolerating a backend whose reads lag
//! its writes.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                   Reconciler                     │
//! │         create / read / update / delete          │
//! └───────┬───────────────┬───────────────┬─────────┘
//!         │               │               │
//! ┌───────▼──────┐ ┌──────▼───────┐ ┌─────▼────────┐
//! │  Diff Engine │ │   Planner    │ │    Poller    │
//! │  (ChangeSet) │ │    (Plan)    │ │ (wait_until) │
//! └──────────────┘ └──────────────┘ └──────────────┘
//!         │
//! ┌───────▼─────────────────────────────────────────┐
//! │     trait ResourceHandler (per resource kind)    │
//! └─────────────────────────────────────────────────┘
//! ```

pub mod action;
pub mod diff;
pub mod error;
pub mod paginate;
pub mod planner;
pub mod poll;
pub mod provider;
pub mod reconciler;
pub mod schema;
pub mod state;
pub mod value;

// Re-exports
pub use action::{Identity, Operation, Plan, PlanSummary, SubResource, WaitPredicate};
pub use diff::{Change, ChangeSet, diff};
pub use error::{ClientError, ErrorKind, ReconcileError, Result, Transient};
pub use paginate::{Page, collect_pages};
pub use planner::Planner;
pub use poll::{PollConfig, PollError, Poller};
pub use provider::{ReconcileContext, ResourceHandler};
pub use reconciler::Reconciler;
pub use schema::{AttrKind, AttrMode, AttrSpec, Dependency, PlanRule, Schema};
pub use state::{PhaseTracker, ResourcePhase};
pub use value::{AttrValue, AttributeMap, Record};
