//! Lock core: session state machine, protected set, validation bridge.
//!
//! Nothing in here performs I/O. The daemon loop owns a single
//! [`LockSessionManager`] and feeds it every input in arrival order.

pub mod manager;
pub mod protected;
pub mod settings;
pub mod validation;

pub use manager::{LockInput, LockSessionManager};
pub use settings::{PermissionOracle, PreferenceStore, SharedSettings};
pub use validation::ValidationBridge;
