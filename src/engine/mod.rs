//! Reconcile engine for mxform
//!
//! 1. Planning - merge declarations with recorded state, refresh, diff
//! 2. Display - show the plan grouped by kind
//! 3. Executing - apply in dependency order, saving state after each resource

pub mod differ;
pub mod executor;
pub mod planner;
