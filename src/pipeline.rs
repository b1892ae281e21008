//! Pipeline stages wired by named FIFO edges.
//!
//! A [`PipeStage`] is a module whose resident task sleeps until its start
//! event, then repeatedly runs a user handler against the stage's named
//! input and output FIFOs, either a fixed number of times or until the handler
//! reports it is done. A [`PipeGraph`] registers stages by name, wires
//! directed edges (each backed by a fresh bounded FIFO), and exposes
//! sink-completion waiting for end-of-pipeline synchronization.
//!
//! Graph wiring is validated eagerly: unknown stage names and duplicate
//! edges are [`PipeGraphError`]s, not latent hangs.

use std::cell::RefCell;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;

use thiserror::Error;

use crate::fifo::Fifo;
use crate::kernel::{Event, Module, SimContext, SimTime};

/// Named FIFO endpoints of a stage, keyed by the peer stage's name.
pub type FifoMap<T> = HashMap<String, Fifo<T>>;

/// One invocation of stage logic. Returns `false` when the stage is done.
pub type StageHandler<T> =
    Box<dyn FnMut(&FifoMap<T>, &FifoMap<T>) -> Pin<Box<dyn Future<Output = bool>>>>;

/// How often a stage runs its handler per start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageMode {
    /// Run until the handler returns `false`.
    UntilDone,
    /// Run at most this many times, stopping early on `false`.
    Times(u32),
}

/// Graph-wiring errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PipeGraphError {
    /// A stage with this name is already registered.
    #[error("duplicate stage name `{0}`")]
    DuplicateStage(String),
    /// An edge endpoint names no registered stage.
    #[error("unknown stage `{0}`")]
    UnknownStage(String),
    /// This edge has already been wired.
    #[error("duplicate edge `{0}` -> `{1}`")]
    DuplicateEdge(String, String),
}

struct StageState<T> {
    handler: Option<StageHandler<T>>,
    mode: StageMode,
    inputs: FifoMap<T>,
    outputs: FifoMap<T>,
    finished: bool,
}

/// A pipeline stage. Cloning shares the same stage.
pub struct PipeStage<T> {
    ctx: SimContext,
    state: Rc<RefCell<StageState<T>>>,
    start: Event,
    done: Event,
}

impl<T> Clone for PipeStage<T> {
    fn clone(&self) -> Self {
        PipeStage {
            ctx: self.ctx.clone(),
            state: self.state.clone(),
            start: self.start.clone(),
            done: self.done.clone(),
        }
    }
}

impl<T: Clone + 'static> PipeStage<T> {
    /// Create a stage and register its resident task.
    pub fn new(ctx: &SimContext) -> Self {
        let state = Rc::new(RefCell::new(StageState {
            handler: None,
            mode: StageMode::UntilDone,
            inputs: HashMap::new(),
            outputs: HashMap::new(),
            finished: false,
        }));
        let start = Event::new(ctx);
        let done = Event::new(ctx);

        let module = Module::new(ctx);
        {
            let ctx = ctx.clone();
            let state = state.clone();
            let start = start.clone();
            let done = done.clone();
            module.register_coroutine(
                async move {
                    loop {
                        ctx.wait(&start).await;
                        state.borrow_mut().finished = false;
                        let mode = state.borrow().mode;
                        match mode {
                            StageMode::UntilDone => {
                                while Self::step(&state).await {}
                            }
                            StageMode::Times(n) => {
                                for _ in 0..n {
                                    if !Self::step(&state).await {
                                        break;
                                    }
                                }
                            }
                        }
                        state.borrow_mut().finished = true;
                        done.notify(SimTime::DELTA);
                    }
                },
                &[],
            );
        }

        PipeStage {
            ctx: ctx.clone(),
            state,
            start,
            done,
        }
    }

    /// One handler invocation against the current FIFO maps.
    async fn step(state: &Rc<RefCell<StageState<T>>>) -> bool {
        let fut = {
            let mut s = state.borrow_mut();
            let s = &mut *s;
            let handler = match s.handler.as_mut() {
                Some(handler) => handler,
                None => panic!("pipeline stage started without a handler"),
            };
            (handler)(&s.inputs, &s.outputs)
        };
        fut.await
    }

    /// Install the stage logic and its run mode.
    ///
    /// The handler is called with the stage's input and output FIFO maps;
    /// it clones the handles it needs into the future it returns. It must
    /// not call back into the stage itself.
    pub fn config_handler<F, Fut>(&self, mode: StageMode, mut handler: F)
    where
        F: FnMut(&FifoMap<T>, &FifoMap<T>) -> Fut + 'static,
        Fut: Future<Output = bool> + 'static,
    {
        let boxed: StageHandler<T> = Box::new(move |inputs, outputs| {
            Box::pin(handler(inputs, outputs)) as Pin<Box<dyn Future<Output = bool>>>
        });
        let mut s = self.state.borrow_mut();
        s.mode = mode;
        s.handler = Some(boxed);
    }

    /// Wire an input FIFO under the given peer name.
    pub fn add_input(&self, from: &str, fifo: Fifo<T>) {
        self.state.borrow_mut().inputs.insert(from.to_string(), fifo);
    }

    /// Wire an output FIFO under the given peer name.
    pub fn add_output(&self, to: &str, fifo: Fifo<T>) {
        self.state.borrow_mut().outputs.insert(to.to_string(), fifo);
    }

    /// Kick the stage off one delta from now.
    pub fn start(&self) {
        self.start.notify(SimTime::DELTA);
    }

    /// True once the current run of the stage has completed.
    pub fn finished(&self) -> bool {
        self.state.borrow().finished
    }

    /// Event notified one delta after each run completes.
    pub fn done_event(&self) -> &Event {
        &self.done
    }
}

/// A directed graph of named stages with FIFO edges.
pub struct PipeGraph<T> {
    ctx: SimContext,
    stages: HashMap<String, PipeStage<T>>,
    next: HashMap<String, Vec<String>>,
    prev: HashMap<String, Vec<String>>,
    edges: HashMap<(String, String), Fifo<T>>,
}

impl<T: Clone + 'static> PipeGraph<T> {
    pub fn new(ctx: &SimContext) -> Self {
        PipeGraph {
            ctx: ctx.clone(),
            stages: HashMap::new(),
            next: HashMap::new(),
            prev: HashMap::new(),
            edges: HashMap::new(),
        }
    }

    /// Register a stage under a unique name.
    pub fn add_stage(&mut self, name: &str, stage: PipeStage<T>) -> Result<(), PipeGraphError> {
        if self.stages.contains_key(name) {
            return Err(PipeGraphError::DuplicateStage(name.to_string()));
        }
        self.stages.insert(name.to_string(), stage);
        Ok(())
    }

    /// Wire `from -> to` with a fresh FIFO of the given capacity. The FIFO
    /// appears in `from`'s outputs and `to`'s inputs under the peer's name.
    pub fn add_edge(
        &mut self,
        from: &str,
        to: &str,
        capacity: usize,
    ) -> Result<Fifo<T>, PipeGraphError> {
        let from_stage = self
            .stages
            .get(from)
            .ok_or_else(|| PipeGraphError::UnknownStage(from.to_string()))?
            .clone();
        let to_stage = self
            .stages
            .get(to)
            .ok_or_else(|| PipeGraphError::UnknownStage(to.to_string()))?
            .clone();
        let key = (from.to_string(), to.to_string());
        if self.edges.contains_key(&key) {
            return Err(PipeGraphError::DuplicateEdge(
                from.to_string(),
                to.to_string(),
            ));
        }

        let fifo = Fifo::new(&self.ctx, capacity);
        from_stage.add_output(to, fifo.clone());
        to_stage.add_input(from, fifo.clone());
        self.next.entry(from.to_string()).or_default().push(to.to_string());
        self.prev.entry(to.to_string()).or_default().push(from.to_string());
        self.edges.insert(key, fifo.clone());
        Ok(fifo)
    }

    /// Look up a registered stage.
    pub fn stage(&self, name: &str) -> Option<&PipeStage<T>> {
        self.stages.get(name)
    }

    /// Stage names with no incoming edge, sorted.
    pub fn sources(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .stages
            .keys()
            .filter(|name| !self.prev.contains_key(*name))
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Stage names with no outgoing edge, sorted.
    pub fn sinks(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .stages
            .keys()
            .filter(|name| !self.next.contains_key(*name))
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Start every stage one delta from now.
    pub fn start(&self) {
        let mut names: Vec<&String> = self.stages.keys().collect();
        names.sort();
        for name in names {
            self.stages[name].start();
        }
    }

    /// Suspend until every sink stage has completed its run.
    pub async fn wait_sinks(&self) {
        for name in self.sinks() {
            let stage = &self.stages[&name];
            if !stage.finished() {
                self.ctx.wait(stage.done_event()).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    use crate::kernel::{Module, SimSession};

    use super::*;

    fn init_logs() {
        let _ = env_logger::try_init();
    }

    #[test]
    fn test_graph_wiring_errors() {
        let session = SimSession::init();
        let ctx = session.context();
        let mut graph: PipeGraph<u32> = PipeGraph::new(&ctx);

        graph.add_stage("a", PipeStage::new(&ctx)).unwrap();
        graph.add_stage("b", PipeStage::new(&ctx)).unwrap();
        assert_eq!(
            graph.add_stage("a", PipeStage::new(&ctx)),
            Err(PipeGraphError::DuplicateStage("a".to_string()))
        );

        assert!(graph.add_edge("a", "b", 2).is_ok());
        assert!(matches!(
            graph.add_edge("a", "b", 2),
            Err(PipeGraphError::DuplicateEdge(_, _))
        ));
        assert!(matches!(
            graph.add_edge("a", "missing", 2),
            Err(PipeGraphError::UnknownStage(name)) if name == "missing"
        ));

        assert_eq!(graph.sources(), vec!["a".to_string()]);
        assert_eq!(graph.sinks(), vec!["b".to_string()]);
    }

    /// Two-stage pipeline: the source pushes three values through a
    /// capacity-2 edge, the sink collects them, and the driver observes
    /// sink completion.
    #[test]
    fn test_two_stage_pipeline() {
        init_logs();
        let session = SimSession::init();
        let ctx = session.context();

        let source: PipeStage<u32> = PipeStage::new(&ctx);
        let sink: PipeStage<u32> = PipeStage::new(&ctx);

        let counter = Rc::new(Cell::new(0u32));
        {
            let counter = counter.clone();
            source.config_handler(StageMode::Times(3), move |_inputs, outputs| {
                let fifo = outputs.get("sink").unwrap().clone();
                let counter = counter.clone();
                async move {
                    let value = counter.get();
                    counter.set(value + 1);
                    fifo.write(value).await;
                    true
                }
            });
        }

        let collected = Rc::new(RefCell::new(Vec::new()));
        {
            let collected = collected.clone();
            sink.config_handler(StageMode::Times(3), move |inputs, _outputs| {
                let fifo = inputs.get("source").unwrap().clone();
                let collected = collected.clone();
                async move {
                    collected.borrow_mut().push(fifo.read().await);
                    true
                }
            });
        }

        let mut graph: PipeGraph<u32> = PipeGraph::new(&ctx);
        graph.add_stage("source", source).unwrap();
        graph.add_stage("sink", sink.clone()).unwrap();
        graph.add_edge("source", "sink", 2).unwrap();

        let finished = Rc::new(Cell::new(false));
        {
            let module = Module::new(&ctx);
            let finished = finished.clone();
            module.register_coroutine(
                async move {
                    graph.start();
                    graph.wait_sinks().await;
                    finished.set(true);
                },
                &[],
            );
        }

        session.run();
        assert_eq!(*collected.borrow(), vec![0, 1, 2]);
        assert!(finished.get());
        assert!(sink.finished());
    }

    /// A stage stops early when its handler reports it is done.
    #[test]
    fn test_until_done_mode_stops_on_false() {
        init_logs();
        let session = SimSession::init();
        let ctx = session.context();

        let stage: PipeStage<u32> = PipeStage::new(&ctx);
        let runs = Rc::new(Cell::new(0u32));
        {
            let runs = runs.clone();
            stage.config_handler(StageMode::UntilDone, move |_inputs, _outputs| {
                let runs = runs.clone();
                async move {
                    let n = runs.get() + 1;
                    runs.set(n);
                    n < 4
                }
            });
        }
        stage.start();

        session.run();
        assert_eq!(runs.get(), 4);
        assert!(stage.finished());
    }
}
