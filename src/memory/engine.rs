//! The chunk-memory engine.
//!
//! A [`ChunkMemory`] is a module with one resident task that arbitrates
//! read/write requests over a shared bandwidth budget:
//!
//! ```text
//! port.write ──┐                       ┌── running writes ──┐
//! port.read  ──┼─► admission queue ──► │                    ├─► resolve,
//! port.read  ──┘   (FIFO, scanned      └── running reads ───┘   wake port
//!                    for the first
//!                    hazard-free entry)
//! ```
//!
//! Ports enqueue requests and poke the engine's trigger event one delta
//! later; the engine also arms an internal tick at the earliest finish time
//! of the running set. Every wake first resolves completions due at the
//! current instant, then re-runs admission to a fixed point: one request
//! per scan, first admissible entry wins, so a blocked head does not stall
//! independent traffic behind it.
//!
//! Per-address tags order producers and consumers: a committed write
//! increments the tag, a clearing read resets it, a read with an expected
//! tag waits for it, and a tag-checked write dispatched onto a nonzero tag
//! aborts the run.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use crate::kernel::{Event, Module, SimContext, SimTime};

use super::hazard::{self, HazardStats, WaitingView};
use super::request::{ChunkCommand, ChunkDesc, ChunkRequest, RequestStatus};
use super::timing::MemTimingConfig;

/// Interior state of a chunk memory.
struct MemState<T> {
    timing: MemTimingConfig,
    cells: HashMap<u64, T>,
    tags: HashMap<u64, u64>,
    /// Request arena; slots are recycled once a request resolves.
    slots: Vec<Option<ChunkRequest<T>>>,
    free_slots: Vec<usize>,
    /// FIFO admission queue of slot indices.
    waiting: VecDeque<usize>,
    running_reads: Vec<usize>,
    running_writes: Vec<usize>,
    stats: HazardStats,
}

impl<T> MemState<T> {
    fn new(timing: MemTimingConfig) -> Self {
        MemState {
            timing,
            cells: HashMap::new(),
            tags: HashMap::new(),
            slots: Vec::new(),
            free_slots: Vec::new(),
            waiting: VecDeque::new(),
            running_reads: Vec::new(),
            running_writes: Vec::new(),
            stats: HazardStats::default(),
        }
    }

    fn tag(&self, addr: u64) -> u64 {
        self.tags.get(&addr).copied().unwrap_or(0)
    }

    fn alloc_slot(&mut self, request: ChunkRequest<T>) -> usize {
        if let Some(id) = self.free_slots.pop() {
            self.slots[id] = Some(request);
            id
        } else {
            self.slots.push(Some(request));
            self.slots.len() - 1
        }
    }

    fn request(&self, id: usize) -> &ChunkRequest<T> {
        match self.slots[id].as_ref() {
            Some(req) => req,
            None => panic!("stale chunk-memory request slot {id}"),
        }
    }

    fn request_mut(&mut self, id: usize) -> &mut ChunkRequest<T> {
        match self.slots[id].as_mut() {
            Some(req) => req,
            None => panic!("stale chunk-memory request slot {id}"),
        }
    }

    fn running_read_views(&self) -> Vec<(u64, bool)> {
        self.running_reads
            .iter()
            .map(|&id| {
                let req = self.request(id);
                (req.addr, req.clear_on_read)
            })
            .collect()
    }

    fn running_write_views(&self) -> Vec<u64> {
        self.running_writes
            .iter()
            .map(|&id| self.request(id).addr)
            .collect()
    }

    /// Earliest finish time over the running set, for re-arming the tick.
    fn min_finish(&self) -> Option<SimTime> {
        self.running_reads
            .iter()
            .chain(self.running_writes.iter())
            .filter_map(|&id| self.request(id).finish_time)
            .min()
    }
}

impl<T: Clone> MemState<T> {
    /// Scan the waiting queue in order and issue the first hazard-free
    /// request. Returns `true` if one was admitted.
    fn try_admit_one(&mut self, now: SimTime) -> bool {
        let running_reads = self.running_read_views();
        let running_writes = self.running_write_views();

        for pos in 0..self.waiting.len() {
            let id = self.waiting[pos];
            let earlier: Vec<WaitingView> = self
                .waiting
                .iter()
                .take(pos)
                .map(|&i| {
                    let req = self.request(i);
                    WaitingView {
                        command: req.command,
                        addr: req.addr,
                        clear_on_read: req.clear_on_read,
                    }
                })
                .collect();

            let req = self.request(id);
            let conflict = match req.command {
                ChunkCommand::Read => hazard::check_read(
                    req.addr,
                    req.expect_tag,
                    self.tag(req.addr),
                    &earlier,
                    &running_reads,
                    &running_writes,
                ),
                ChunkCommand::Write => {
                    hazard::check_write(req.addr, &earlier, &running_reads, &running_writes)
                }
            };

            if let Some(kind) = conflict {
                log::debug!(
                    "requeue {:?} addr {} at {}: {:?}",
                    req.command,
                    req.addr,
                    now,
                    kind
                );
                self.stats.record_blocked(kind);
                continue;
            }

            // Dispatch. The tag-check rule bites here, once nothing else
            // blocks the write: a live tag means an unconsumed value would
            // be overwritten, which is a protocol violation, not a stall.
            if req.command == ChunkCommand::Write && req.check_tag {
                let tag = self.tag(req.addr);
                assert!(
                    tag == 0,
                    "tag-checked write dispatched to addr {} with nonzero tag {}",
                    req.addr,
                    tag
                );
            }

            let latency = self.timing.latency_cycles(req.chunk.total_bytes());
            let finish = now + SimTime::cycles(latency);
            let command = req.command;
            {
                let req = self.request_mut(id);
                req.status = RequestStatus::Running;
                req.finish_time = Some(finish);
            }
            let _ = self.waiting.remove(pos);
            match command {
                ChunkCommand::Read => self.running_reads.push(id),
                ChunkCommand::Write => self.running_writes.push(id),
            }
            self.stats.admitted += 1;
            log::debug!(
                "admit {:?} addr {} at {}, {} cycle(s) to {}",
                command,
                self.request(id).addr,
                now,
                latency,
                finish
            );
            return true;
        }
        false
    }

    /// Resolve every running request whose finish time is the current
    /// instant. Returns the completion events to notify.
    fn complete_due(&mut self, now: SimTime) -> Vec<Event> {
        let due: Vec<usize> = self
            .running_reads
            .iter()
            .chain(self.running_writes.iter())
            .copied()
            .filter(|&id| self.request(id).finish_time == Some(now))
            .collect();
        if due.is_empty() {
            return Vec::new();
        }

        self.running_reads.retain(|id| !due.contains(id));
        self.running_writes.retain(|id| !due.contains(id));

        let mut done_events = Vec::with_capacity(due.len());
        for id in due {
            let mut req = match self.slots[id].take() {
                Some(req) => req,
                None => panic!("stale chunk-memory request slot {id}"),
            };
            self.free_slots.push(id);
            req.status = RequestStatus::Finished;

            match req.command {
                ChunkCommand::Write => {
                    let payload = match req.payload.take() {
                        Some(value) => value,
                        None => panic!("write request to addr {} lost its payload", req.addr),
                    };
                    self.cells.insert(req.addr, payload);
                    *self.tags.entry(req.addr).or_insert(0) += 1;
                }
                ChunkCommand::Read => {
                    let tag = self.tag(req.addr);
                    assert!(
                        tag == req.expect_tag,
                        "read of addr {} resolved with tag {} but expected {}",
                        req.addr,
                        tag,
                        req.expect_tag
                    );
                    let value = match self.cells.get(&req.addr) {
                        Some(value) => value.clone(),
                        None => panic!("read of uninitialized addr {}", req.addr),
                    };
                    *req.result.borrow_mut() = Some(value);
                    if req.clear_on_read {
                        self.tags.insert(req.addr, 0);
                    }
                }
            }

            log::debug!("complete {:?} addr {} at {}", req.command, req.addr, now);
            done_events.push(req.done.clone());
        }
        done_events
    }
}

/// Handle to a hazard-aware, bandwidth-arbitrated memory.
///
/// Cloning is cheap and shares the same memory; issue timed traffic through
/// [`ChunkMemoryPort`]s created with [`ChunkMemory::port`].
pub struct ChunkMemory<T> {
    ctx: SimContext,
    state: Rc<RefCell<MemState<T>>>,
    trigger: Event,
}

impl<T> Clone for ChunkMemory<T> {
    fn clone(&self) -> Self {
        ChunkMemory {
            ctx: self.ctx.clone(),
            state: self.state.clone(),
            trigger: self.trigger.clone(),
        }
    }
}

impl<T: Clone + 'static> ChunkMemory<T> {
    /// Create a chunk memory with the default timing.
    pub fn new(ctx: &SimContext) -> Self {
        Self::with_timing(ctx, MemTimingConfig::default())
    }

    /// Create a chunk memory with timing taken from the crate
    /// configuration.
    pub fn from_config(ctx: &SimContext) -> Self {
        Self::with_timing(ctx, MemTimingConfig::from_config())
    }

    /// Create a chunk memory with an explicit timing configuration.
    pub fn with_timing(ctx: &SimContext, timing: MemTimingConfig) -> Self {
        let state = Rc::new(RefCell::new(MemState::new(timing)));
        let trigger = Event::new(ctx);
        let finish_tick = Event::new(ctx);

        let module = Module::new(ctx);
        {
            let ctx = ctx.clone();
            let state = state.clone();
            let trigger = trigger.clone();
            let finish_tick = finish_tick.clone();
            module.register_coroutine(
                async move {
                    loop {
                        ctx.wait_any(&[&trigger, &finish_tick]).await;
                        let now = ctx.now();

                        let done_events = state.borrow_mut().complete_due(now);
                        for done in &done_events {
                            done.notify(SimTime::DELTA);
                        }

                        while state.borrow_mut().try_admit_one(now) {}

                        if let Some(at) = state.borrow().min_finish() {
                            finish_tick.notify_at(at);
                        }
                    }
                },
                &[],
            );
        }

        ChunkMemory {
            ctx: ctx.clone(),
            state,
            trigger,
        }
    }

    /// Create a port for issuing timed requests.
    pub fn port(&self) -> ChunkMemoryPort<T> {
        ChunkMemoryPort {
            mem: self.clone(),
            done: Event::new(&self.ctx),
            busy: Cell::new(false),
        }
    }

    /// Untimed write, for pre-loading memory before the simulation starts.
    /// Commits immediately and increments the address tag; with `check_tag`
    /// the tag must be zero, exactly as for a timed write at dispatch.
    pub fn direct_write(&self, addr: u64, value: T, check_tag: bool) {
        {
            let mut m = self.state.borrow_mut();
            if check_tag {
                let tag = m.tag(addr);
                assert!(
                    tag == 0,
                    "tag-checked write dispatched to addr {} with nonzero tag {}",
                    addr,
                    tag
                );
            }
            m.cells.insert(addr, value);
            *m.tags.entry(addr).or_insert(0) += 1;
        }
        // The new tag may unblock a queued read; have the engine rescan.
        self.trigger.notify(SimTime::DELTA);
    }

    /// Untimed snapshot of a cell, if it was ever written.
    pub fn peek(&self, addr: u64) -> Option<T> {
        self.state.borrow().cells.get(&addr).cloned()
    }

    /// Current tag of an address (zero if never written or cleared).
    pub fn peek_tag(&self, addr: u64) -> u64 {
        self.state.borrow().tag(addr)
    }

    /// Admission counters accumulated so far.
    pub fn hazard_stats(&self) -> HazardStats {
        self.state.borrow().stats
    }

    /// Requests sitting in the admission queue.
    pub fn waiting_len(&self) -> usize {
        self.state.borrow().waiting.len()
    }

    /// Requests currently occupying bandwidth.
    pub fn running_len(&self) -> usize {
        let m = self.state.borrow();
        m.running_reads.len() + m.running_writes.len()
    }

    fn submit(&self, request: ChunkRequest<T>) {
        {
            let mut m = self.state.borrow_mut();
            log::debug!(
                "enqueue {:?} addr {} ({} bytes)",
                request.command,
                request.addr,
                request.chunk.total_bytes()
            );
            let id = m.alloc_slot(request);
            m.waiting.push_back(id);
        }
        self.trigger.notify(SimTime::DELTA);
    }
}

/// Issue side of a [`ChunkMemory`]. One operation may be outstanding at a
/// time; overlapping a second one is fatal.
pub struct ChunkMemoryPort<T> {
    mem: ChunkMemory<T>,
    done: Event,
    busy: Cell<bool>,
}

impl<T: Clone + 'static> ChunkMemoryPort<T> {
    /// Issue a timed read and suspend until it resolves.
    ///
    /// The request stays queued until the address tag equals `expect_tag`
    /// and no conflicting request is queued ahead or in flight. With
    /// `clear_on_read` the address tag is reset to zero at completion.
    pub async fn read(
        &self,
        addr: u64,
        chunk: ChunkDesc,
        expect_tag: u64,
        clear_on_read: bool,
    ) -> T {
        self.claim(addr);
        let result = Rc::new(RefCell::new(None));
        self.mem.submit(ChunkRequest {
            command: ChunkCommand::Read,
            addr,
            chunk,
            expect_tag,
            clear_on_read,
            check_tag: false,
            status: RequestStatus::Waiting,
            finish_time: None,
            payload: None,
            result: result.clone(),
            done: self.done.clone(),
        });
        self.mem.ctx.wait(&self.done).await;
        self.busy.set(false);
        let value = result.borrow_mut().take();
        match value {
            Some(value) => value,
            None => panic!("read of addr {addr} completed without a value"),
        }
    }

    /// Issue a timed write and suspend until it commits.
    ///
    /// With `check_tag`, dispatching while the address tag is nonzero is
    /// fatal.
    pub async fn write(&self, addr: u64, value: T, chunk: ChunkDesc, check_tag: bool) {
        self.claim(addr);
        self.mem.submit(ChunkRequest {
            command: ChunkCommand::Write,
            addr,
            chunk,
            expect_tag: 0,
            clear_on_read: false,
            check_tag,
            status: RequestStatus::Waiting,
            finish_time: None,
            payload: Some(value),
            result: Rc::new(RefCell::new(None)),
            done: self.done.clone(),
        });
        self.mem.ctx.wait(&self.done).await;
        self.busy.set(false);
    }

    fn claim(&self, addr: u64) {
        assert!(
            !self.busy.get(),
            "port busy: an operation is already outstanding (new request for addr {addr})"
        );
        self.busy.set(true);
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use crate::kernel::{Module, SimSession, SimTime};

    use super::*;

    fn init_logs() {
        let _ = env_logger::try_init();
    }

    /// 2 elements x 2 per batch x 4 bytes = 16 bytes; at 4 bytes/cycle
    /// every transfer below takes 4 cycles.
    const CHUNK: ChunkDesc = ChunkDesc::new(2, 2, 4);

    fn t(cycle: u64, delta: u64) -> SimTime {
        SimTime::new(cycle, delta)
    }

    /// Write then dependent read: the read is held back by the in-flight
    /// write and its expected tag, and resolves one write latency plus one
    /// read latency after the write was admitted.
    #[test]
    fn test_write_then_read_resolves_in_order() {
        init_logs();
        let session = SimSession::init();
        let ctx = session.context();
        let mem: ChunkMemory<u32> = ChunkMemory::with_timing(&ctx, MemTimingConfig::new(4));
        let module = Module::new(&ctx);
        let trace = Rc::new(RefCell::new(Vec::new()));

        {
            let (ctx, port, trace) = (ctx.clone(), mem.port(), trace.clone());
            module.register_coroutine(
                async move {
                    port.write(5, 9, CHUNK, true).await;
                    trace.borrow_mut().push(("write done", 0, ctx.now()));
                },
                &[],
            );
        }
        {
            let (ctx, port, trace) = (ctx.clone(), mem.port(), trace.clone());
            module.register_coroutine(
                async move {
                    let value = port.read(5, CHUNK, 1, false).await;
                    trace.borrow_mut().push(("read done", value, ctx.now()));
                },
                &[],
            );
        }

        session.run();

        // Admitted at (0,1); write resolves 4 cycles later, the read is
        // admitted in the same instant and resolves 4 cycles after that.
        assert_eq!(
            *trace.borrow(),
            vec![("write done", 0, t(4, 3)), ("read done", 9, t(8, 1))]
        );
        assert_eq!(mem.peek(5), Some(9));
        assert_eq!(mem.peek_tag(5), 1);

        let stats = mem.hazard_stats();
        assert_eq!(stats.admitted, 2);
        // The read was observed blocked at least once (in-flight write).
        assert!(stats.raw >= 1);
    }

    /// Latency law: finish - admit == ceil(bytes / bandwidth).
    #[test]
    fn test_latency_law() {
        init_logs();
        for (bandwidth, bytes, want_cycles) in [(3u64, 10u64, 4u64), (8, 8, 1), (5, 11, 3)] {
            let session = SimSession::init();
            let ctx = session.context();
            let mem: ChunkMemory<u64> =
                ChunkMemory::with_timing(&ctx, MemTimingConfig::new(bandwidth));
            let module = Module::new(&ctx);
            let done_at = Rc::new(RefCell::new(None));

            {
                let (ctx, port, done_at) = (ctx.clone(), mem.port(), done_at.clone());
                module.register_coroutine(
                    async move {
                        port.write(0, 1, ChunkDesc::bytes(bytes), false).await;
                        *done_at.borrow_mut() = Some(ctx.now());
                    },
                    &[],
                );
            }
            session.run();

            let done = done_at.borrow().expect("write never resolved");
            // Admission happens in cycle 0; the port observes completion
            // one delta after the finish instant, same cycle.
            assert_eq!(done.cycle, want_cycles, "bw={bandwidth} bytes={bytes}");
        }
    }

    /// Two writes to the same address in the same instant: the second stays
    /// waiting until the first finishes (WAW), then issues.
    #[test]
    fn test_waw_serializes_same_address_writes() {
        init_logs();
        let session = SimSession::init();
        let ctx = session.context();
        let mem: ChunkMemory<u32> = ChunkMemory::with_timing(&ctx, MemTimingConfig::new(4));
        let module = Module::new(&ctx);
        let trace = Rc::new(RefCell::new(Vec::new()));

        for (name, value) in [("first", 11u32), ("second", 22u32)] {
            let (ctx, port, trace) = (ctx.clone(), mem.port(), trace.clone());
            module.register_coroutine(
                async move {
                    port.write(7, value, CHUNK, false).await;
                    trace.borrow_mut().push((name, ctx.now().cycle));
                },
                &[],
            );
        }

        session.run();

        assert_eq!(*trace.borrow(), vec![("first", 4), ("second", 8)]);
        // Both writes committed, in order.
        assert_eq!(mem.peek(7), Some(22));
        assert_eq!(mem.peek_tag(7), 2);
        assert!(mem.hazard_stats().waw >= 1);
    }

    /// With tag checking enabled, the trailing write is dispatched once the
    /// WAW clears, onto a tag the first write left nonzero. Fatal.
    #[test]
    #[should_panic(expected = "nonzero tag")]
    fn test_tag_checked_waw_is_fatal() {
        let session = SimSession::init();
        let ctx = session.context();
        let mem: ChunkMemory<u32> = ChunkMemory::with_timing(&ctx, MemTimingConfig::new(4));
        let module = Module::new(&ctx);

        for value in [11u32, 22] {
            let port = mem.port();
            module.register_coroutine(
                async move {
                    port.write(7, value, CHUNK, true).await;
                },
                &[],
            );
        }
        session.run();
    }

    /// A clearing read resets the tag, which unblocks a tag-checked write.
    #[test]
    fn test_clear_on_read_resets_tag() {
        init_logs();
        let session = SimSession::init();
        let ctx = session.context();
        let mem: ChunkMemory<u32> = ChunkMemory::with_timing(&ctx, MemTimingConfig::new(4));
        mem.direct_write(3, 7, false);
        assert_eq!(mem.peek_tag(3), 1);

        let module = Module::new(&ctx);
        let trace = Rc::new(RefCell::new(Vec::new()));
        {
            let (port, trace) = (mem.port(), trace.clone());
            module.register_coroutine(
                async move {
                    let value = port.read(3, CHUNK, 1, true).await;
                    trace.borrow_mut().push(value);
                    // Tag is back to zero, so a checked write goes through.
                    port.write(3, 99, CHUNK, true).await;
                },
                &[],
            );
        }

        session.run();
        assert_eq!(*trace.borrow(), vec![7]);
        assert_eq!(mem.peek(3), Some(99));
        assert_eq!(mem.peek_tag(3), 1);
    }

    /// A second read must not issue around a clearing read of the same
    /// address; it waits for the cleared tag.
    #[test]
    fn test_clearing_read_blocks_later_read() {
        init_logs();
        let session = SimSession::init();
        let ctx = session.context();
        let mem: ChunkMemory<u32> = ChunkMemory::with_timing(&ctx, MemTimingConfig::new(4));
        mem.direct_write(4, 5, false);

        let module = Module::new(&ctx);
        let trace = Rc::new(RefCell::new(Vec::new()));
        {
            let (ctx, port, trace) = (ctx.clone(), mem.port(), trace.clone());
            module.register_coroutine(
                async move {
                    let value = port.read(4, CHUNK, 1, true).await;
                    trace.borrow_mut().push(("clearing", value, ctx.now().cycle));
                },
                &[],
            );
        }
        {
            let (ctx, port, trace) = (ctx.clone(), mem.port(), trace.clone());
            module.register_coroutine(
                async move {
                    let value = port.read(4, CHUNK, 0, false).await;
                    trace.borrow_mut().push(("plain", value, ctx.now().cycle));
                },
                &[],
            );
        }

        session.run();
        assert_eq!(
            *trace.borrow(),
            vec![("clearing", 5, 4), ("plain", 5, 8)]
        );
        assert_eq!(mem.peek_tag(4), 0);
        assert!(mem.hazard_stats().rar_clear >= 1);
    }

    /// Admission is out-of-order: a blocked queue head does not stall an
    /// independent request behind it.
    #[test]
    fn test_out_of_order_issue_around_blocked_head() {
        init_logs();
        let session = SimSession::init();
        let ctx = session.context();
        let mem: ChunkMemory<u32> = ChunkMemory::with_timing(&ctx, MemTimingConfig::new(4));
        mem.direct_write(2, 77, false);

        let module = Module::new(&ctx);
        let trace = Rc::new(RefCell::new(Vec::new()));

        // First writer owns addr 1 for cycles 0..4.
        {
            let port = mem.port();
            module.register_coroutine(
                async move {
                    port.write(1, 10, CHUNK, false).await;
                },
                &[],
            );
        }
        // Second writer to addr 1 is WAW-blocked behind it...
        {
            let (ctx, port, trace) = (ctx.clone(), mem.port(), trace.clone());
            module.register_coroutine(
                async move {
                    port.write(1, 20, CHUNK, false).await;
                    trace.borrow_mut().push(("write addr1", ctx.now().cycle));
                },
                &[],
            );
        }
        // ...but the read of addr 2, queued behind both, issues at once.
        {
            let (ctx, port, trace) = (ctx.clone(), mem.port(), trace.clone());
            module.register_coroutine(
                async move {
                    let value = port.read(2, CHUNK, 1, false).await;
                    assert_eq!(value, 77);
                    trace.borrow_mut().push(("read addr2", ctx.now().cycle));
                },
                &[],
            );
        }

        session.run();
        assert_eq!(
            *trace.borrow(),
            vec![("read addr2", 4), ("write addr1", 8)]
        );
    }

    /// A read whose expected tag never materializes stays waiting; the run
    /// still terminates once nothing else can make progress.
    #[test]
    fn test_tag_mismatch_read_stays_waiting() {
        init_logs();
        let session = SimSession::init();
        let ctx = session.context();
        let mem: ChunkMemory<u32> = ChunkMemory::with_timing(&ctx, MemTimingConfig::new(4));
        mem.direct_write(6, 1, false); // tag 1, reader expects 2

        let module = Module::new(&ctx);
        let trace = Rc::new(RefCell::new(Vec::new()));
        {
            let (port, trace) = (mem.port(), trace.clone());
            module.register_coroutine(
                async move {
                    let value = port.read(6, CHUNK, 2, false).await;
                    trace.borrow_mut().push(value);
                },
                &[],
            );
        }

        session.run();
        assert!(trace.borrow().is_empty());
        assert_eq!(mem.waiting_len(), 1);
        assert_eq!(mem.running_len(), 0);
        assert!(mem.hazard_stats().tag_mismatch >= 1);
    }

    #[test]
    #[should_panic(expected = "port busy")]
    fn test_port_reuse_while_outstanding_is_fatal() {
        let session = SimSession::init();
        let ctx = session.context();
        let mem: ChunkMemory<u32> = ChunkMemory::with_timing(&ctx, MemTimingConfig::new(4));
        mem.direct_write(0, 1, false);

        let module = Module::new(&ctx);
        let port = Rc::new(mem.port());
        for _ in 0..2 {
            let port = port.clone();
            module.register_coroutine(
                async move {
                    let _ = port.read(0, CHUNK, 1, false).await;
                },
                &[],
            );
        }
        session.run();
    }

    #[test]
    #[should_panic(expected = "nonzero tag")]
    fn test_checked_direct_write_over_live_tag_is_fatal() {
        let session = SimSession::init();
        let ctx = session.context();
        let mem: ChunkMemory<u32> = ChunkMemory::with_timing(&ctx, MemTimingConfig::new(4));
        mem.direct_write(1, 1, true);
        mem.direct_write(1, 2, true);
    }

    #[test]
    fn test_from_config_constructs() {
        let session = SimSession::init();
        let ctx = session.context();
        let mem: ChunkMemory<u32> = ChunkMemory::from_config(&ctx);
        mem.direct_write(0, 42, false);
        assert_eq!(mem.peek(0), Some(42));
    }
}
