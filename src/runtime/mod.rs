//! The message-passing pipeline runtime.
//!
//! Messages are key-value records pulled lazily through a graph of nodes.
//! The [`context::Context`] owns run-scoped state and the lifecycle
//! tracker; [`flow`] provides the chain/fork/filter/multiplier/union
//! combinators pipelines are assembled from.

pub mod context;
pub mod flow;
pub mod message;
pub mod node;

pub use context::Context;
pub use flow::{Chain, Filter, Multiplier, SetFields, Union, ValuesSource};
pub use message::{message, Message, Value};
pub use node::{empty_stream, once_stream, Component, MessageStream, Node};
