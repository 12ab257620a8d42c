// Reconcile commands: plan, apply, destroy
pub mod reconcile;

// Read-only state inspection
pub mod show;
