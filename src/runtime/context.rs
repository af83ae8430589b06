//! Run context: shared properties, scratch variables, the expression
//! evaluator and the component lifecycle tracker.

use std::cell::RefCell;
use std::collections::HashMap;

use log::debug;

use crate::error::{EtlError, EtlResult};
use crate::expr::Evaluator;
use crate::runtime::message::{Message, Value};
use crate::runtime::node::{Component, MessageStream, Node};

/// Lifecycle position of a tracked component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LifecycleState {
    Initialized,
    Finalized,
}

/// Per-run context threaded through every `process` call.
///
/// The context owns the lifecycle tracker that guarantees at-most-once
/// `initialize` and `finalize` per component (keyed by component name),
/// and flags process-before-initialize / process-after-finalize as fatal.
pub struct Context {
    props: RefCell<HashMap<String, Value>>,
    vars: RefCell<HashMap<String, Value>>,
    tracker: RefCell<HashMap<String, LifecycleState>>,
    evaluator: Evaluator,
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Context {
    pub fn new() -> Self {
        Self {
            props: RefCell::new(HashMap::new()),
            vars: RefCell::new(HashMap::new()),
            tracker: RefCell::new(HashMap::new()),
            evaluator: Evaluator::new(),
        }
    }

    /// Set a shared property, visible to expressions as `props.<name>`.
    pub fn set_prop(&self, name: impl Into<String>, value: impl Into<Value>) {
        self.props.borrow_mut().insert(name.into(), value.into());
    }

    pub fn prop(&self, name: &str) -> Option<Value> {
        self.props.borrow().get(name).cloned()
    }

    /// Set a scratch variable, visible to expressions as `var.<name>`.
    pub fn set_var(&self, name: impl Into<String>, value: impl Into<Value>) {
        self.vars.borrow_mut().insert(name.into(), value.into());
    }

    pub fn var(&self, name: &str) -> Option<Value> {
        self.vars.borrow().get(name).cloned()
    }

    /// Evaluate an expression template against the message and this context.
    ///
    /// `component` names the caller for diagnostics on failure.
    pub fn eval(&self, template: &str, msg: &Message, component: &str) -> EtlResult<Value> {
        let props = self.props.borrow();
        let vars = self.vars.borrow();
        self.evaluator.eval(template, msg, &props, &vars, component)
    }

    /// Initialize a component, at most once for the lifetime of the run.
    ///
    /// Re-initialization is a no-op; initializing after finalize is fatal.
    /// A component's own `initialize` may recursively initialize its
    /// children through this method; children are marked before the hook
    /// runs so shared children are still visited only once.
    pub fn initialize<C>(&self, comp: &C) -> EtlResult<()>
    where
        C: Component + ?Sized,
    {
        let name = comp.name().to_string();
        match self.tracker.borrow().get(&name) {
            Some(LifecycleState::Initialized) => return Ok(()),
            Some(LifecycleState::Finalized) => {
                return Err(EtlError::lifecycle(name, "initialized after finalize"));
            }
            None => {}
        }
        self.tracker
            .borrow_mut()
            .insert(name.clone(), LifecycleState::Initialized);
        debug!("initializing component '{}'", name);
        comp.initialize(self)
    }

    /// Finalize a component, at most once. Finalizing a component that was
    /// never initialized is a no-op.
    pub fn finalize<C>(&self, comp: &C) -> EtlResult<()>
    where
        C: Component + ?Sized,
    {
        let name = comp.name().to_string();
        match self.tracker.borrow().get(&name) {
            Some(LifecycleState::Initialized) => {}
            _ => return Ok(()),
        }
        self.tracker
            .borrow_mut()
            .insert(name.clone(), LifecycleState::Finalized);
        debug!("finalizing component '{}'", name);
        comp.finalize(self)
    }

    /// Process a message through a node, enforcing the lifecycle window.
    pub fn process<'a, N>(&'a self, node: &'a N, msg: Message) -> EtlResult<MessageStream<'a>>
    where
        N: Node + ?Sized,
    {
        match self.tracker.borrow().get(node.name()) {
            Some(LifecycleState::Initialized) => {}
            Some(LifecycleState::Finalized) => {
                return Err(EtlError::lifecycle(node.name(), "processed after finalize"));
            }
            None => {
                return Err(EtlError::lifecycle(
                    node.name(),
                    "processed before initialize",
                ));
            }
        }
        node.process(self, msg)
    }

    /// Process a message and collect every output, driving the lazy stream
    /// to completion. Convenience for pipeline tops and tests.
    pub fn run<N>(&self, node: &N, msg: Message) -> EtlResult<Vec<Message>>
    where
        N: Node + ?Sized,
    {
        self.process(node, msg)?.collect()
    }
}
