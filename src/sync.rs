//! Counting semaphores over the kernel's wait/notify primitives.
//!
//! Three flavors:
//!
//! - [`SimSemaphore`]: the plain one. All blocked waiters retry when a post
//!   lands; among waiters released in the same instant, ready-queue FIFO
//!   order decides who wins.
//! - [`SimOrderedSemaphore`]: strict arrival-order handover. Each waiter
//!   parks on its own event and only the queue head is woken.
//! - [`SimDelaySemaphore`]: posts become visible after a simulated delay,
//!   for modeling produced-but-in-flight resources.
//!
//! All handles are cheap clones sharing one counter.

use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::rc::Rc;

use crate::kernel::{Event, Module, SimContext, SimTime};

/// Plain counting semaphore.
#[derive(Clone)]
pub struct SimSemaphore {
    ctx: SimContext,
    value: Rc<RefCell<i64>>,
    free: Event,
}

impl SimSemaphore {
    /// Create a semaphore with an initial count.
    pub fn new(ctx: &SimContext, value: i64) -> Self {
        SimSemaphore {
            ctx: ctx.clone(),
            value: Rc::new(RefCell::new(value)),
            free: Event::new(ctx),
        }
    }

    /// Current count.
    pub fn value(&self) -> i64 {
        *self.value.borrow()
    }

    /// True while the count is exhausted.
    pub fn in_use(&self) -> bool {
        self.value() <= 0
    }

    /// Take one unit without blocking. Returns `false` if none is free.
    pub fn try_wait(&self) -> bool {
        if self.in_use() {
            return false;
        }
        *self.value.borrow_mut() -= 1;
        true
    }

    /// Suspend until a unit is free, then take it.
    pub async fn wait(&self) {
        while self.in_use() {
            self.ctx.wait(&self.free).await;
        }
        *self.value.borrow_mut() -= 1;
    }

    /// Release one unit and wake blocked waiters one delta later.
    pub fn post(&self) {
        *self.value.borrow_mut() += 1;
        self.free.notify(SimTime::DELTA);
    }
}

#[derive(Default)]
struct OrderedState {
    value: i64,
    /// Per-waiter park events, in arrival order.
    queue: VecDeque<Event>,
}

/// Counting semaphore with FIFO handover.
#[derive(Clone)]
pub struct SimOrderedSemaphore {
    ctx: SimContext,
    state: Rc<RefCell<OrderedState>>,
}

impl SimOrderedSemaphore {
    /// Create an ordered semaphore with an initial count.
    pub fn new(ctx: &SimContext, value: i64) -> Self {
        SimOrderedSemaphore {
            ctx: ctx.clone(),
            state: Rc::new(RefCell::new(OrderedState {
                value,
                queue: VecDeque::new(),
            })),
        }
    }

    /// Current count.
    pub fn value(&self) -> i64 {
        self.state.borrow().value
    }

    /// Take one unit without blocking; refuses while older waiters queue.
    pub fn try_wait(&self) -> bool {
        let mut s = self.state.borrow_mut();
        if s.value <= 0 || !s.queue.is_empty() {
            return false;
        }
        s.value -= 1;
        true
    }

    /// Suspend until a unit is free *and* every earlier waiter has been
    /// served, then take it.
    pub async fn wait(&self) {
        let park = Event::new(&self.ctx);
        self.state.borrow_mut().queue.push_back(park.clone());
        loop {
            {
                let mut s = self.state.borrow_mut();
                let at_head = s.queue.front().map(|e| e == &park).unwrap_or(false);
                if at_head && s.value > 0 {
                    s.queue.pop_front();
                    s.value -= 1;
                    // Pass surplus on to the next in line.
                    if s.value > 0 {
                        if let Some(next) = s.queue.front() {
                            next.notify(SimTime::DELTA);
                        }
                    }
                    return;
                }
            }
            self.ctx.wait(&park).await;
        }
    }

    /// Release one unit; the oldest waiter is woken one delta later.
    pub fn post(&self) {
        let mut s = self.state.borrow_mut();
        s.value += 1;
        if let Some(front) = s.queue.front() {
            front.notify(SimTime::DELTA);
        }
    }
}

struct DelayState {
    value: i64,
    /// Posts not yet visible, keyed by the instant they land.
    pending: BTreeMap<SimTime, i64>,
}

/// Counting semaphore whose posts take simulated time to land.
#[derive(Clone)]
pub struct SimDelaySemaphore {
    ctx: SimContext,
    state: Rc<RefCell<DelayState>>,
    free: Event,
    arm: Event,
}

impl SimDelaySemaphore {
    /// Create a delayed semaphore with an initial count.
    ///
    /// Registers a resident task that applies pending posts when their time
    /// comes, so this must be called while task registration is possible
    /// (before `run`, or dynamically while running).
    pub fn new(ctx: &SimContext, value: i64) -> Self {
        let state = Rc::new(RefCell::new(DelayState {
            value,
            pending: BTreeMap::new(),
        }));
        let free = Event::new(ctx);
        let arm = Event::new(ctx);

        let module = Module::new(ctx);
        {
            let ctx = ctx.clone();
            let state = state.clone();
            let free = free.clone();
            let arm = arm.clone();
            module.register_coroutine(
                async move {
                    loop {
                        ctx.wait(&arm).await;
                        let now = ctx.now();
                        let mut landed = 0;
                        {
                            let mut s = state.borrow_mut();
                            while let Some((&at, _)) = s.pending.first_key_value() {
                                if at > now {
                                    break;
                                }
                                if let Some((_, n)) = s.pending.pop_first() {
                                    landed += n;
                                }
                            }
                            s.value += landed;
                        }
                        if landed > 0 {
                            free.notify(SimTime::DELTA);
                        }
                        let next = state.borrow().pending.first_key_value().map(|(&at, _)| at);
                        if let Some(at) = next {
                            arm.notify_at(at);
                        }
                    }
                },
                &[],
            );
        }

        SimDelaySemaphore {
            ctx: ctx.clone(),
            state,
            free,
            arm,
        }
    }

    /// Currently visible count.
    pub fn value(&self) -> i64 {
        self.state.borrow().value
    }

    /// True while the visible count is exhausted.
    pub fn in_use(&self) -> bool {
        self.value() <= 0
    }

    /// Suspend until a visible unit is free, then take it.
    pub async fn wait(&self) {
        while self.in_use() {
            self.ctx.wait(&self.free).await;
        }
        self.state.borrow_mut().value -= 1;
    }

    /// Release one unit immediately.
    pub fn post(&self) {
        self.state.borrow_mut().value += 1;
        self.free.notify(SimTime::DELTA);
    }

    /// Release one unit that becomes visible at `now + delay`. The delay
    /// must move strictly into the future.
    pub fn post_delayed(&self, delay: SimTime) {
        let at = self.ctx.now() + delay;
        let mut s = self.state.borrow_mut();
        *s.pending.entry(at).or_insert(0) += 1;
        // Re-arm to the earliest landing; replacement keeps one occurrence.
        if let Some((&first, _)) = s.pending.first_key_value() {
            self.arm.notify_at(first);
        }
    }
}
