pub mod reconciler;

pub use reconciler::{NavDirection, SelectionReconciler, SessionCard};
