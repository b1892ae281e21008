//! Hazard-aware, bandwidth-arbitrated chunk memory.
//!
//! Submodules:
//!
//! - `request`: request records and payload descriptors
//! - `timing`: the bandwidth/latency model
//! - `hazard`: RAW/WAR/WAW/RAR detection and counters
//! - `engine`: the admission/completion engine and its ports

pub mod engine;
pub mod hazard;
pub mod request;
pub mod timing;

pub use engine::{ChunkMemory, ChunkMemoryPort};
pub use hazard::{HazardKind, HazardStats};
pub use request::{ChunkCommand, ChunkDesc, RequestStatus};
pub use timing::MemTimingConfig;
