//! The `Store` pipeline node.
//!
//! Stores each incoming message as a row of the target entity through an
//! [`OlapMapper`] scope, attaching the resolved primary-key value back
//! onto the message as `<entity>_id` so downstream nodes (typically
//! dependent fact stores) can reference it.

use std::rc::Rc;

use crate::error::EtlResult;
use crate::olap::mapper::{DatePart, OlapMapper};
use crate::runtime::context::Context;
use crate::runtime::message::{Message, Value};
use crate::runtime::node::{once_stream, Component, MessageStream, Node};

pub struct Store {
    name: String,
    entity: String,
    mapper: Rc<OlapMapper>,
    date_part_fields: Vec<String>,
}

impl Store {
    pub fn new(
        name: impl Into<String>,
        entity: impl Into<String>,
        mapper: Rc<OlapMapper>,
    ) -> Self {
        Self {
            name: name.into(),
            entity: entity.into(),
            mapper,
            date_part_fields: Vec::new(),
        }
    }

    /// Expand a date-valued field into `<field>_year`, `<field>_month`,
    /// `<field>_day` and `<field>_week` fields before storing, so date
    /// dimensions flattened into date-part columns can resolve them.
    pub fn with_date_parts(mut self, field: impl Into<String>) -> Self {
        self.date_part_fields.push(field.into());
        self
    }

    fn expand_date_parts(&self, msg: &mut Message) -> EtlResult<()> {
        for field in &self.date_part_fields {
            let value = match msg.get(field) {
                Some(v @ (Value::Date(_) | Value::DateTime(_))) => v.clone(),
                _ => continue,
            };
            for part in DatePart::ALL {
                let extracted = part.extract(&value)?;
                msg.insert(format!("{}_{}", field, part.tag()), extracted);
            }
        }
        Ok(())
    }
}

impl Component for Store {
    fn name(&self) -> &str {
        &self.name
    }

    fn initialize(&self, ctx: &Context) -> EtlResult<()> {
        ctx.initialize(self.mapper.as_ref())
    }

    fn finalize(&self, ctx: &Context) -> EtlResult<()> {
        ctx.finalize(self.mapper.as_ref())
    }
}

impl Node for Store {
    fn process<'a>(&'a self, ctx: &'a Context, mut msg: Message) -> EtlResult<MessageStream<'a>> {
        self.expand_date_parts(&mut msg)?;
        let key = self.mapper.store(ctx, &self.entity, &mut msg)?;
        msg.insert(format!("{}_id", self.entity), key);
        Ok(once_stream(msg))
    }
}
