//! # andon-core
//!
//! Core library for the Andon floor dashboard: machine and matrix status
//! tracking, operator sessions, stop-cause attribution, and cycle
//! aggregation, shared by every client surface.
//!
//! ## Design Principles
//!
//! - **Synchronous**: No async runtime dependency. Clients can wrap with async if needed.
//! - **Not thread-safe**: Clients provide their own synchronization (`Mutex`, `RwLock`).
//! - **Local state is a cache**: The gateway is the single writer of truth;
//!   every mutation is "issue intent, then refetch", never an optimistic patch.
//! - **Closed transition table**: Statuses are enumerated variants and every
//!   request is validated locally before an intent is built.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use andon_core::{AndonEngine, SocketGateway};
//! use std::sync::Arc;
//!
//! let gateway = Arc::new(SocketGateway::from_env()?);
//! let mut engine = AndonEngine::new(gateway, "company-1");
//! engine.refresh()?;
//! let machines = engine.snapshot().machines();
//! ```

// Public modules
pub mod cycles;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod reasons;
#[cfg(unix)]
pub mod remote;
pub mod sessions;
pub mod snapshot;
pub mod status;
pub mod types;

// Re-export commonly used items at crate root
pub use cycles::{aggregate_window, CycleLog, ReasonUsage, WindowReport};
pub use engine::AndonEngine;
pub use error::{AndonError, Result};
pub use gateway::Gateway;
pub use reasons::{ReasonRegistry, SHIFT_END_REASON_NAME};
#[cfg(unix)]
pub use remote::SocketGateway;
pub use sessions::{elapsed_seconds, EndPolicy};
pub use snapshot::FloorSnapshot;
pub use status::{check_addressing, validate_transition};
pub use types::{
    CycleRecord, Machine, Matrix, MatrixProvenance, ProductionSession, StopInterval, StopReason,
    UnitRef, UnitStatus,
};
