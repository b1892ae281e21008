//! Ordering-hazard detection between chunk-memory requests.
//!
//! Requests to the same address must resolve in a well-defined order:
//!
//! - **RAW** (Read After Write): a read cannot issue while a write to its
//!   address is queued ahead of it or still in flight.
//! - **WAW** (Write After Write): at most one write per address in flight.
//! - **WAR** (Write After Read): a write cannot issue over an in-flight
//!   read of its address.
//! - **RAR-with-clear**: a clearing read resets the address tag, so a later
//!   read must not issue around it.
//!
//! On top of the structural hazards, per-address *tags* order producers and
//! consumers across time: each committed write increments the address tag,
//! a clearing read resets it to zero, and a read carrying an expected tag
//! stays queued until the address tag matches.
//!
//! A blocked request is requeued, not failed; detection is recoverable by
//! design. The one exception, a tag-checked write dispatched onto a
//! nonzero tag, is handled by the engine as a fatal condition.

use super::request::ChunkCommand;

/// Why a candidate request cannot issue right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HazardKind {
    /// Read blocked by a queued-ahead or in-flight write.
    Raw,
    /// Write blocked by an in-flight read.
    War,
    /// Write blocked by a queued-ahead or in-flight write.
    Waw,
    /// Read blocked by a queued-ahead or in-flight clearing read.
    RarClear,
    /// Read blocked until the address tag reaches its expected value.
    TagMismatch,
}

/// Admission counters, in the spirit of per-unit hardware stall statistics.
#[derive(Debug, Clone, Copy, Default)]
pub struct HazardStats {
    /// Requests admitted to the running set.
    pub admitted: u64,
    /// Blocked-candidate observations, all kinds.
    pub blocked: u64,
    /// Blocked on RAW.
    pub raw: u64,
    /// Blocked on WAR.
    pub war: u64,
    /// Blocked on WAW.
    pub waw: u64,
    /// Blocked on a clearing read.
    pub rar_clear: u64,
    /// Blocked on a tag mismatch.
    pub tag_mismatch: u64,
}

impl HazardStats {
    /// Record one blocked-candidate observation.
    pub fn record_blocked(&mut self, kind: HazardKind) {
        self.blocked += 1;
        match kind {
            HazardKind::Raw => self.raw += 1,
            HazardKind::War => self.war += 1,
            HazardKind::Waw => self.waw += 1,
            HazardKind::RarClear => self.rar_clear += 1,
            HazardKind::TagMismatch => self.tag_mismatch += 1,
        }
    }
}

/// Summary of a waiting-queue entry ahead of the candidate.
#[derive(Debug, Clone, Copy)]
pub(crate) struct WaitingView {
    pub(crate) command: ChunkCommand,
    pub(crate) addr: u64,
    pub(crate) clear_on_read: bool,
}

/// Check whether a read of `addr` may issue.
///
/// `earlier` are the waiting-queue entries ahead of the candidate;
/// `running_reads`/`running_writes` are the in-flight sets as
/// `(addr, clear_on_read)` / `addr`.
pub(crate) fn check_read(
    addr: u64,
    expect_tag: u64,
    current_tag: u64,
    earlier: &[WaitingView],
    running_reads: &[(u64, bool)],
    running_writes: &[u64],
) -> Option<HazardKind> {
    for entry in earlier {
        if entry.addr != addr {
            continue;
        }
        match entry.command {
            ChunkCommand::Write => return Some(HazardKind::Raw),
            ChunkCommand::Read if entry.clear_on_read => return Some(HazardKind::RarClear),
            ChunkCommand::Read => {}
        }
    }
    if running_writes.contains(&addr) {
        return Some(HazardKind::Raw);
    }
    if running_reads.iter().any(|&(a, clear)| a == addr && clear) {
        return Some(HazardKind::RarClear);
    }
    if current_tag != expect_tag {
        return Some(HazardKind::TagMismatch);
    }
    None
}

/// Check whether a write to `addr` may issue.
///
/// The tag-check rule is deliberately absent here: it fires at dispatch
/// time, once nothing else blocks the write, and it is fatal rather than a
/// requeue.
pub(crate) fn check_write(
    addr: u64,
    earlier: &[WaitingView],
    running_reads: &[(u64, bool)],
    running_writes: &[u64],
) -> Option<HazardKind> {
    if earlier
        .iter()
        .any(|e| e.addr == addr && e.command == ChunkCommand::Write)
    {
        return Some(HazardKind::Waw);
    }
    if running_reads.iter().any(|&(a, _)| a == addr) {
        return Some(HazardKind::War);
    }
    if running_writes.contains(&addr) {
        return Some(HazardKind::Waw);
    }
    None
}
