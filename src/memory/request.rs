//! Memory request records.

use std::cell::RefCell;
use std::rc::Rc;

use crate::kernel::{Event, SimTime};

/// Direction of a chunk-memory request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkCommand {
    /// Snapshot the cell's value at completion.
    Read,
    /// Commit the payload into the cell at completion.
    Write,
}

/// Shape of a request's payload, for size accounting only.
///
/// The engine never looks inside a payload; the descriptor is what feeds
/// the bandwidth model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkDesc {
    /// Number of elements in the chunk.
    pub elem_count: u64,
    /// Elements per batch.
    pub batch_size: u64,
    /// Bytes per element.
    pub elem_bytes: u64,
}

impl ChunkDesc {
    /// Describe a chunk of `elem_count` batches of `batch_size` elements of
    /// `elem_bytes` bytes each.
    pub const fn new(elem_count: u64, batch_size: u64, elem_bytes: u64) -> Self {
        ChunkDesc {
            elem_count,
            batch_size,
            elem_bytes,
        }
    }

    /// A flat chunk of `n` bytes.
    pub const fn bytes(n: u64) -> Self {
        ChunkDesc {
            elem_count: n,
            batch_size: 1,
            elem_bytes: 1,
        }
    }

    /// Total size in bytes.
    pub fn total_bytes(&self) -> u64 {
        self.elem_count * self.batch_size * self.elem_bytes
    }
}

/// Lifecycle of a request inside the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStatus {
    /// In the admission queue, not yet issued.
    Waiting,
    /// Issued; occupying bandwidth until its finish time.
    Running,
    /// Resolved; its completion event has been notified.
    Finished,
}

/// One outstanding request, owned by the engine.
pub(crate) struct ChunkRequest<T> {
    pub(crate) command: ChunkCommand,
    pub(crate) addr: u64,
    pub(crate) chunk: ChunkDesc,
    /// For reads: the tag value the address must carry before issue.
    pub(crate) expect_tag: u64,
    /// For reads: reset the address tag to zero at completion.
    pub(crate) clear_on_read: bool,
    /// For writes: fail fatally if dispatched while the tag is nonzero.
    pub(crate) check_tag: bool,
    pub(crate) status: RequestStatus,
    /// Absolute completion time, set at admission.
    pub(crate) finish_time: Option<SimTime>,
    /// Write payload; consumed at commit.
    pub(crate) payload: Option<T>,
    /// Read result slot, shared with the issuing port.
    pub(crate) result: Rc<RefCell<Option<T>>>,
    /// Completion event, notified one delta after resolution.
    pub(crate) done: Event,
}

impl<T> std::fmt::Debug for ChunkRequest<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkRequest")
            .field("command", &self.command)
            .field("addr", &self.addr)
            .field("bytes", &self.chunk.total_bytes())
            .field("status", &self.status)
            .field("finish_time", &self.finish_time)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_desc_total_bytes() {
        assert_eq!(ChunkDesc::new(2, 2, 4).total_bytes(), 16);
        assert_eq!(ChunkDesc::bytes(10).total_bytes(), 10);
        assert_eq!(ChunkDesc::new(3, 1, 8).total_bytes(), 24);
    }
}
