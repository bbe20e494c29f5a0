//! searchscale-provision — carries out scaling operations.
//!
//! ```text
//! Provisioner (ProvisioningExecutor)
//!   ├── phase: pending → in progress        (compare-and-set)
//!   ├── NodeInventory: clamp to min/max     (LiveInventory → /_cat/nodes)
//!   ├── NodeProvider: add / remove nodes    (CommandProvider → child process)
//!   └── phase: in progress → idle           (on success only)
//! ```
//!
//! A failed provider call leaves the phase in progress with the error
//! recorded, so the next coordinator's watchdog can pick it up.

pub mod provider;
pub mod provisioner;

pub use provider::{CommandProvider, NodeProvider};
pub use provisioner::{LiveInventory, NodeInventory, Provisioner};
