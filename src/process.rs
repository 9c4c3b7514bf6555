//! The working-state contract a pipeline builds up.

/// Mutable state accumulated by the steps of one run.
///
/// A fresh process is created for every run and shared by the steps behind an
/// `Arc`. Concurrent steps may run at the same time, so fields are written
/// through interior mutability, and each step should own the fields it writes.
pub trait Process: Send + Sync + 'static {
    /// Immutable result handed to the caller after a successful run.
    type Container: Send + Sync + 'static;

    /// Snapshot the process into its container.
    ///
    /// Called exactly once per successful run, after every step has completed.
    fn finalize(&self) -> Self::Container;
}
