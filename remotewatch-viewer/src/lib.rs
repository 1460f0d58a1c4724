//! RemoteWatch viewer engine
//!
//! Keeps a live, merged view of a device fleet from two backend endpoints:
//! - `fetcher`: concurrent inventory + usage retrieval
//! - `merger`: join by device `Name`, usage overlaid on inventory
//! - `aligner`: CPU/memory/disk history zipped onto one timeline
//! - `poller`: periodic and manual cycles, atomic publication, clean stop
//! - `presentation` / `render`: UI state and terminal rendering

pub mod aligner;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod merger;
pub mod models;
pub mod poller;
pub mod presentation;
pub mod render;
pub mod summary;

pub use config::ViewerConfig;
pub use error::{AlignmentGap, FailureKind, FetchError, PollerError};
pub use fetcher::{HttpFetcher, TelemetrySource};
pub use models::{DeviceView, InventoryRecord, UsageHistoryEntry, UsageRecord};
pub use poller::{FleetSnapshot, Poller, PollerHandle, PollerState};
