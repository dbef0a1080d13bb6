//! NebulaFlow Cloud
//!
//! This crate provides the provider-neutral layer of NebulaFlow's
//! reconciliation engine: the control plane client abstraction, the
//! configuration document that every resource kind is created from, and the
//! outcome type returned to the host's control loop.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │          host control loop (watch/requeue)       │
//! └─────────────────┬───────────────────────────────┘
//!                   │ desired state / Reconciled<S>
//! ┌─────────────────▼───────────────────────────────┐
//! │          nebulaflow-cloud-opennebula             │
//! │   cluster / machine reconcilers, handles,        │
//! │   cleanup coordinator                            │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │               nebulaflow-cloud                   │
//! │  trait ControlPlane { ... }    Document          │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │        transport (XML-RPC client, external)      │
//! └──────────────────────────────────────────────────┘
//! ```

pub mod error;
pub mod outcome;
pub mod provider;
pub mod template;
#[cfg(feature = "test-utils")]
pub mod testing;

// Re-exports
pub use error::{CloudError, Result};
pub use outcome::Reconciled;
pub use provider::{AddressRange, ControlPlane, ResourceId, ResourceInfo, ResourceKind, UpdateMode};
pub use template::{CONTEXT_SECTION, Document, Element, NIC_SECTION, Pair, Section};
