//! Bounded FIFOs built from two semaphores.
//!
//! An items-semaphore counts readable entries, a space-semaphore counts
//! free capacity; `read` and `write` block on them in the classic
//! producer/consumer arrangement. Two edge events report the transitions
//! into "just became empty" and "just became full" for observers that only
//! care about the boundary.
//!
//! [`DelayFifo`] swaps the items-semaphore for a delayed-post one: a
//! `delay_write` consumes capacity immediately, but the item only becomes
//! readable after its delay elapses.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use crate::kernel::{Event, SimContext, SimTime};
use crate::sync::{SimDelaySemaphore, SimSemaphore};

/// Bounded blocking FIFO.
#[derive(Clone)]
pub struct Fifo<T> {
    ctx: SimContext,
    data: Rc<RefCell<VecDeque<T>>>,
    items: SimSemaphore,
    space: SimSemaphore,
    is_empty_event: Event,
    is_full_event: Event,
}

impl<T: Clone + 'static> Fifo<T> {
    /// Create an empty FIFO with the given capacity.
    pub fn new(ctx: &SimContext, capacity: usize) -> Self {
        Self::with_initial(ctx, capacity, Vec::new())
    }

    /// Create a FIFO pre-seeded with `initial` items.
    pub fn with_initial(ctx: &SimContext, capacity: usize, initial: Vec<T>) -> Self {
        assert!(capacity > 0, "fifo capacity must be nonzero");
        assert!(
            initial.len() <= capacity,
            "fifo seeded with {} items but capacity is {}",
            initial.len(),
            capacity
        );
        let occupied = initial.len() as i64;
        Fifo {
            ctx: ctx.clone(),
            data: Rc::new(RefCell::new(initial.into_iter().collect())),
            items: SimSemaphore::new(ctx, occupied),
            space: SimSemaphore::new(ctx, capacity as i64 - occupied),
            is_empty_event: Event::new(ctx),
            is_full_event: Event::new(ctx),
        }
    }

    /// Pop the oldest item, suspending while the FIFO is empty.
    pub async fn read(&self) -> T {
        self.items.wait().await;
        self.space.post();
        if self.items.value() == 0 {
            self.is_empty_event.notify(SimTime::cycles(1));
        }
        match self.data.borrow_mut().pop_front() {
            Some(value) => value,
            None => panic!("fifo underflow: items available but no data"),
        }
    }

    /// Push an item, suspending while the FIFO is full.
    pub async fn write(&self, value: T) {
        self.space.wait().await;
        self.items.post();
        if self.space.value() == 0 {
            self.is_full_event.notify(SimTime::cycles(1));
        }
        self.data.borrow_mut().push_back(value);
    }

    /// Suspend until the FIFO becomes full. Returns immediately if it
    /// already is.
    pub async fn wait_full(&self) {
        if self.space.value() != 0 {
            self.ctx.wait(&self.is_full_event).await;
        }
    }

    /// Suspend until the FIFO becomes empty. Returns immediately if it
    /// already is.
    pub async fn wait_empty(&self) {
        if self.items.value() != 0 {
            self.ctx.wait(&self.is_empty_event).await;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.value() == 0
    }

    pub fn is_full(&self) -> bool {
        self.space.value() == 0
    }

    /// Items physically buffered (for a plain FIFO, the readable count).
    pub fn len(&self) -> usize {
        self.data.borrow().len()
    }
}

/// Bounded FIFO whose writes become readable only after a delay.
#[derive(Clone)]
pub struct DelayFifo<T> {
    ctx: SimContext,
    data: Rc<RefCell<VecDeque<T>>>,
    items: SimDelaySemaphore,
    space: SimSemaphore,
    is_empty_event: Event,
    is_full_event: Event,
}

impl<T: Clone + 'static> DelayFifo<T> {
    /// Create an empty delayed FIFO with the given capacity.
    ///
    /// Registers a resident task (the delayed semaphore's), so call while
    /// task registration is possible.
    pub fn new(ctx: &SimContext, capacity: usize) -> Self {
        assert!(capacity > 0, "fifo capacity must be nonzero");
        DelayFifo {
            ctx: ctx.clone(),
            data: Rc::new(RefCell::new(VecDeque::new())),
            items: SimDelaySemaphore::new(ctx, 0),
            space: SimSemaphore::new(ctx, capacity as i64),
            is_empty_event: Event::new(ctx),
            is_full_event: Event::new(ctx),
        }
    }

    /// Pop the oldest *visible* item, suspending until one lands.
    pub async fn read(&self) -> T {
        self.items.wait().await;
        self.space.post();
        if self.items.value() == 0 {
            self.is_empty_event.notify(SimTime::cycles(1));
        }
        match self.data.borrow_mut().pop_front() {
            Some(value) => value,
            None => panic!("fifo underflow: items available but no data"),
        }
    }

    /// Push an item that becomes readable at `now + delay`. Capacity is
    /// consumed immediately.
    pub async fn delay_write(&self, value: T, delay: SimTime) {
        self.space.wait().await;
        self.items.post_delayed(delay);
        if self.space.value() == 0 {
            self.is_full_event.notify(SimTime::DELTA);
        }
        self.data.borrow_mut().push_back(value);
    }

    /// Suspend until the FIFO becomes full.
    pub async fn wait_full(&self) {
        if self.space.value() != 0 {
            self.ctx.wait(&self.is_full_event).await;
        }
    }

    /// Suspend until the FIFO becomes empty.
    pub async fn wait_empty(&self) {
        if self.items.value() != 0 {
            self.ctx.wait(&self.is_empty_event).await;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.value() == 0
    }

    pub fn is_full(&self) -> bool {
        self.space.value() == 0
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

    /// Producer and consumer over a capacity-2 FIFO: all values arrive in
    /// order, with the producer throttled by backpressure.
    #[test]
    fn test_fifo_producer_consumer() {
        init_logs();
        let session = SimSession::init();
        let ctx = session.context();
        let module = Module::new(&ctx);
        let fifo: Fifo<u32> = Fifo::new(&ctx, 2);
        let seen = Rc::new(RefCell::new(Vec::new()));

        {
            let fifo = fifo.clone();
            module.register_coroutine(
                async move {
                    for i in 0..5 {
                        fifo.write(i).await;
                    }
                },
                &[],
            );
        }
        {
            let (fifo, seen) = (fifo.clone(), seen.clone());
            module.register_coroutine(
                async move {
                    for _ in 0..5 {
                        seen.borrow_mut().push(fifo.read().await);
                    }
                },
                &[],
            );
        }

        session.run();
        assert_eq!(*seen.borrow(), vec![0, 1, 2, 3, 4]);
        assert!(fifo.is_empty());
        assert!(!fifo.is_full());
    }

    #[test]
    fn test_fifo_seeded_is_readable() {
        init_logs();
        let session = SimSession::init();
        let ctx = session.context();
        let module = Module::new(&ctx);
        let fifo: Fifo<u32> = Fifo::with_initial(&ctx, 4, vec![7, 8]);
        let seen = Rc::new(RefCell::new(Vec::new()));

        assert_eq!(fifo.len(), 2);
        {
            let (fifo, seen) = (fifo.clone(), seen.clone());
            module.register_coroutine(
                async move {
                    seen.borrow_mut().push(fifo.read().await);
                    seen.borrow_mut().push(fifo.read().await);
                },
                &[],
            );
        }
        session.run();
        assert_eq!(*seen.borrow(), vec![7, 8]);
    }

    /// `wait_empty` resumes once the last item leaves the queue.
    #[test]
    fn test_fifo_wait_empty() {
        init_logs();
        let session = SimSession::init();
        let ctx = session.context();
        let module = Module::new(&ctx);
        let fifo: Fifo<u32> = Fifo::with_initial(&ctx, 2, vec![1]);
        let trace = Rc::new(RefCell::new(Vec::new()));

        {
            let (ctx, fifo, trace) = (ctx.clone(), fifo.clone(), trace.clone());
            module.register_coroutine(
                async move {
                    fifo.wait_empty().await;
                    trace.borrow_mut().push(("empty", ctx.now().cycle));
                },
                &[],
            );
        }
        {
            let (ctx, fifo, trace) = (ctx.clone(), fifo.clone(), trace.clone());
            module.register_coroutine(
                async move {
                    ctx.wait_time(SimTime::cycles(3)).await;
                    let value = fifo.read().await;
                    trace.borrow_mut().push(("read", value as u64));
                },
                &[],
            );
        }

        session.run();
        // The drain happens at cycle 3; the empty edge fires a cycle later.
        assert_eq!(*trace.borrow(), vec![("read", 1), ("empty", 4)]);
    }

    /// Delayed writes become readable only after their delay.
    #[test]
    fn test_delay_fifo_visibility() {
        init_logs();
        let session = SimSession::init();
        let ctx = session.context();
        let module = Module::new(&ctx);
        let fifo: DelayFifo<u32> = DelayFifo::new(&ctx, 2);
        let seen = Rc::new(RefCell::new(Vec::new()));

        {
            let fifo = fifo.clone();
            module.register_coroutine(
                async move {
                    for i in 0..3 {
                        fifo.delay_write(i, SimTime::cycles(2)).await;
                    }
                },
                &[],
            );
        }
        {
            let (ctx, fifo, seen) = (ctx.clone(), fifo.clone(), seen.clone());
            module.register_coroutine(
                async move {
                    for _ in 0..3 {
                        let value = fifo.read().await;
                        seen.borrow_mut().push((value, ctx.now().cycle));
                    }
                },
                &[],
            );
        }

        session.run();
        // First two writes land two cycles after t0; the third was blocked
        // on capacity until the first read and lands at cycle 4.
        assert_eq!(*seen.borrow(), vec![(0, 2), (1, 2), (2, 4)]);
        assert!(fifo.is_empty());
    }
}
