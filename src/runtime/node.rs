//! The component and node abstractions.
//!
//! A [`Component`] participates in the run lifecycle (`initialize` /
//! `finalize`, driven at most once each by the context's tracker). A
//! [`Node`] is a component that processes messages: `process` returns a
//! lazy stream of output messages, so a consumer that stops pulling stops
//! the work, and a node can short-circuit by yielding nothing.

use crate::error::EtlResult;
use crate::runtime::context::Context;
use crate::runtime::message::Message;

/// Lazy sequence of messages produced by one `process` call.
pub type MessageStream<'a> = Box<dyn Iterator<Item = EtlResult<Message>> + 'a>;

/// A lifecycle-managed pipeline participant.
pub trait Component {
    /// Stable identity for lifecycle tracking and diagnostics. Names must
    /// be unique within a run.
    fn name(&self) -> &str;

    fn initialize(&self, _ctx: &Context) -> EtlResult<()> {
        Ok(())
    }

    fn finalize(&self, _ctx: &Context) -> EtlResult<()> {
        Ok(())
    }
}

/// A message-processing component.
pub trait Node: Component {
    /// Process one input message into zero, one or many output messages.
    ///
    /// The returned stream is lazy: work happens as the consumer advances
    /// it. Errors inside the stream propagate to the consumer; the runtime
    /// never retries.
    fn process<'a>(&'a self, ctx: &'a Context, msg: Message) -> EtlResult<MessageStream<'a>>;
}

/// A stream yielding exactly one message.
pub fn once_stream<'a>(msg: Message) -> MessageStream<'a> {
    Box::new(std::iter::once(Ok(msg)))
}

/// A stream yielding nothing.
pub fn empty_stream<'a>() -> MessageStream<'a> {
    Box::new(std::iter::empty())
}

/// A stream yielding a single error.
pub fn error_stream<'a>(err: crate::error::EtlError) -> MessageStream<'a> {
    Box::new(std::iter::once(Err(err)))
}
