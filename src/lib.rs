//! deltasim library
//!
//! A discrete-event simulation kernel for hardware-like models: cooperative
//! tasks suspend on events, time advances in cycle + delta steps, and a
//! hazard-aware chunk-memory engine arbitrates read/write traffic over a
//! shared bandwidth budget. Semaphores, FIFOs and pipeline stages are thin
//! companions built from the kernel's wait/notify primitives.

pub mod config;
pub mod fifo;
pub mod kernel;
pub mod memory;
pub mod pipeline;
pub mod sync;

pub use config::Config;
pub use fifo::{DelayFifo, Fifo};
pub use kernel::{
    Event, KernelStats, Module, ModuleId, SchedulerStatus, SimContext, SimSession, SimTime, TaskId,
};
pub use memory::{
    ChunkCommand, ChunkDesc, ChunkMemory, ChunkMemoryPort, HazardKind, HazardStats,
    MemTimingConfig, RequestStatus,
};
pub use pipeline::{FifoMap, PipeGraph, PipeGraphError, PipeStage, StageMode};
pub use sync::{SimDelaySemaphore, SimOrderedSemaphore, SimSemaphore};
