//! Flow combinators: chain, fork, filter, multiplier and union.

use std::rc::Rc;

use log::debug;

use crate::error::EtlResult;
use crate::runtime::context::Context;
use crate::runtime::message::{Message, Value};
use crate::runtime::node::{
    empty_stream, error_stream, once_stream, Component, MessageStream, Node,
};

/// Runs a fixed sequence of steps, feeding each step's outputs into the
/// next step's input.
///
/// With `fork` set, the chain discards everything the inner sequence
/// produces and re-yields a copy of the original input message, so the
/// branch cannot affect the main flow.
pub struct Chain {
    name: String,
    steps: Vec<Rc<dyn Node>>,
    fork: bool,
}

impl Chain {
    pub fn new(name: impl Into<String>, steps: Vec<Rc<dyn Node>>) -> Self {
        Self {
            name: name.into(),
            steps,
            fork: false,
        }
    }

    pub fn with_fork(mut self, fork: bool) -> Self {
        self.fork = fork;
        self
    }

    /// Lazily pipe a message through every step in order.
    fn chained<'a>(&'a self, ctx: &'a Context, msg: Message) -> MessageStream<'a> {
        let mut stream: MessageStream<'a> = once_stream(msg);
        for step in &self.steps {
            let node: &'a dyn Node = step.as_ref();
            stream = Box::new(stream.flat_map(move |item| -> MessageStream<'a> {
                match item {
                    Ok(m) => match ctx.process(node, m) {
                        Ok(out) => out,
                        Err(e) => error_stream(e),
                    },
                    Err(e) => error_stream(e),
                }
            }));
        }
        stream
    }
}

impl Component for Chain {
    fn name(&self) -> &str {
        &self.name
    }

    fn initialize(&self, ctx: &Context) -> EtlResult<()> {
        for step in &self.steps {
            ctx.initialize(step.as_ref())?;
        }
        Ok(())
    }

    fn finalize(&self, ctx: &Context) -> EtlResult<()> {
        for step in self.steps.iter().rev() {
            ctx.finalize(step.as_ref())?;
        }
        Ok(())
    }
}

impl Node for Chain {
    fn process<'a>(&'a self, ctx: &'a Context, msg: Message) -> EtlResult<MessageStream<'a>> {
        if self.fork {
            let copy = msg.clone();
            let inner = self.chained(ctx, msg);
            // The branch is drained when the single output is pulled, so
            // branch errors still surface to the consumer.
            return Ok(Box::new(std::iter::once_with(
                move || -> EtlResult<Message> {
                    for item in inner {
                        item?;
                    }
                    Ok(copy)
                },
            )));
        }
        Ok(self.chained(ctx, msg))
    }
}

/// Yields the message unchanged when a boolean expression holds, nothing
/// otherwise.
pub struct Filter {
    name: String,
    condition: String,
}

impl Filter {
    pub fn new(name: impl Into<String>, condition: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            condition: condition.into(),
        }
    }
}

impl Component for Filter {
    fn name(&self) -> &str {
        &self.name
    }
}

impl Node for Filter {
    fn process<'a>(&'a self, ctx: &'a Context, msg: Message) -> EtlResult<MessageStream<'a>> {
        let verdict = ctx.eval(&self.condition, &msg, &self.name)?;
        if verdict.truthy() {
            Ok(once_stream(msg))
        } else {
            debug!("filter '{}' dropped message", self.name);
            Ok(empty_stream())
        }
    }
}

/// Where a multiplier's values come from.
pub enum ValuesSource {
    /// A literal list of values.
    List(Vec<Value>),
    /// A comma-separated string; items are trimmed.
    Csv(String),
    /// An expression producing a sequence (or a single value).
    Expr(String),
}

/// Fans a message out: one copy per value, each with `field` set.
pub struct Multiplier {
    name: String,
    field: String,
    values: ValuesSource,
}

impl Multiplier {
    pub fn new(name: impl Into<String>, field: impl Into<String>, values: ValuesSource) -> Self {
        Self {
            name: name.into(),
            field: field.into(),
            values,
        }
    }

    fn resolve_values(&self, ctx: &Context, msg: &Message) -> EtlResult<Vec<Value>> {
        match &self.values {
            ValuesSource::List(vs) => Ok(vs.clone()),
            ValuesSource::Csv(s) => Ok(s
                .split(',')
                .map(|item| Value::String(item.trim().to_string()))
                .collect()),
            ValuesSource::Expr(expr) => match ctx.eval(expr, msg, &self.name)? {
                Value::List(vs) => Ok(vs),
                single => Ok(vec![single]),
            },
        }
    }
}

impl Component for Multiplier {
    fn name(&self) -> &str {
        &self.name
    }
}

impl Node for Multiplier {
    fn process<'a>(&'a self, ctx: &'a Context, msg: Message) -> EtlResult<MessageStream<'a>> {
        let values = self.resolve_values(ctx, &msg)?;
        let field = self.field.clone();
        Ok(Box::new(values.into_iter().map(
            move |v| -> EtlResult<Message> {
                let mut copy = msg.clone();
                copy.insert(field.clone(), v);
                Ok(copy)
            },
        )))
    }
}

/// Runs independent branches against copies of the same input and
/// concatenates their outputs: a true fan-out, unlike fork.
pub struct Union {
    name: String,
    branches: Vec<Rc<dyn Node>>,
}

impl Union {
    pub fn new(name: impl Into<String>, branches: Vec<Rc<dyn Node>>) -> Self {
        Self {
            name: name.into(),
            branches,
        }
    }
}

impl Component for Union {
    fn name(&self) -> &str {
        &self.name
    }

    fn initialize(&self, ctx: &Context) -> EtlResult<()> {
        for branch in &self.branches {
            ctx.initialize(branch.as_ref())?;
        }
        Ok(())
    }

    fn finalize(&self, ctx: &Context) -> EtlResult<()> {
        for branch in self.branches.iter().rev() {
            ctx.finalize(branch.as_ref())?;
        }
        Ok(())
    }
}

impl Node for Union {
    fn process<'a>(&'a self, ctx: &'a Context, msg: Message) -> EtlResult<MessageStream<'a>> {
        let mut streams = Vec::with_capacity(self.branches.len());
        for branch in &self.branches {
            streams.push(ctx.process(branch.as_ref(), msg.clone())?);
        }
        Ok(Box::new(streams.into_iter().flatten()))
    }
}

/// Sets fields on the message from expression templates. The workhorse
/// transform node for hand-built pipelines and tests.
pub struct SetFields {
    name: String,
    fields: Vec<(String, String)>,
}

impl SetFields {
    pub fn new(name: impl Into<String>, fields: Vec<(String, String)>) -> Self {
        Self {
            name: name.into(),
            fields,
        }
    }
}

impl Component for SetFields {
    fn name(&self) -> &str {
        &self.name
    }
}

impl Node for SetFields {
    fn process<'a>(&'a self, ctx: &'a Context, mut msg: Message) -> EtlResult<MessageStream<'a>> {
        for (field, template) in &self.fields {
            let value = ctx.eval(template, &msg, &self.name)?;
            msg.insert(field.clone(), value);
        }
        Ok(once_stream(msg))
    }
}
