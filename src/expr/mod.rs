//! Embedded expression evaluation.
//!
//! Templates contain delimited expression spans in two styles, `${ expr }`
//! and the escaped `$!{ expr }`; both are evaluated. When the whole template
//! is exactly one span, the expression's native value is returned untouched;
//! otherwise each span is stringified into the surrounding text:
//!
//! ```text
//! "${ 1 + 1 }"        -> Int(2)
//! "value=${ 1 + 1 }"  -> String("value=2")
//! ```
//!
//! Expressions are Lua, evaluated against a scope exposing `m` (the current
//! message), `props` (shared context properties) and `var` (scratch
//! variables), plus the Lua standard library for string and date helpers.
//! Each distinct expression text is compiled once and kept in a bounded
//! least-recently-used cache.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};

use log::error;
use mlua::{Function, Lua, Table};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{EtlError, EtlResult};
use crate::runtime::message::{Message, Value};

// One level of nested braces is allowed so Lua table constructors like
// `${ {1, 2, 3} }` parse.
static SPAN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$!?\{((?:[^{}]|\{[^{}]*\})*)\}").expect("span regex is valid")
});

/// How many compiled expressions the cache retains.
const CACHE_CAPACITY: usize = 512;

/// Compiles and evaluates expression templates.
pub struct Evaluator {
    lua: Lua,
    cache: RefCell<CompiledCache>,
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl Evaluator {
    pub fn new() -> Self {
        Self {
            lua: Lua::new(),
            cache: RefCell::new(CompiledCache::new(CACHE_CAPACITY)),
        }
    }

    /// Evaluate a template against the given scope.
    ///
    /// `component` identifies the caller for diagnostics; evaluation errors
    /// are logged with the original expression text and re-raised.
    pub fn eval(
        &self,
        template: &str,
        msg: &Message,
        props: &HashMap<String, Value>,
        vars: &HashMap<String, Value>,
        component: &str,
    ) -> EtlResult<Value> {
        let spans: Vec<_> = SPAN_RE.captures_iter(template).collect();
        if spans.is_empty() {
            return Ok(Value::String(template.to_string()));
        }

        // A template that is exactly one span preserves the expression's
        // native type instead of stringifying it.
        if spans.len() == 1 {
            let m = spans[0].get(0).expect("capture group 0 always present");
            if m.start() == 0 && m.end() == template.len() {
                let expr = spans[0]
                    .get(1)
                    .expect("capture group 1 always present")
                    .as_str();
                return self.eval_expr(expr, msg, props, vars, component);
            }
        }

        let mut out = String::with_capacity(template.len());
        let mut last = 0;
        for cap in &spans {
            let whole = cap.get(0).expect("capture group 0 always present");
            let expr = cap.get(1).expect("capture group 1 always present").as_str();
            out.push_str(&template[last..whole.start()]);
            let value = self.eval_expr(expr, msg, props, vars, component)?;
            out.push_str(&value.to_string());
            last = whole.end();
        }
        out.push_str(&template[last..]);
        Ok(Value::String(out))
    }

    /// Evaluate a bare expression (no delimiters) to its native value.
    pub fn eval_expr(
        &self,
        expr: &str,
        msg: &Message,
        props: &HashMap<String, Value>,
        vars: &HashMap<String, Value>,
        component: &str,
    ) -> EtlResult<Value> {
        let func = self
            .compile(expr)
            .map_err(|e| self.wrap(expr, component, e))?;
        let scope = self
            .build_scope(msg, props, vars)
            .map_err(|e| self.wrap(expr, component, e))?;
        let result: mlua::Value = func
            .call(scope)
            .map_err(|e| self.wrap(expr, component, e))?;
        lua_to_value(&result)
    }

    fn wrap(&self, expr: &str, component: &str, err: mlua::Error) -> EtlError {
        error!(
            "expression evaluation failed in component '{}': {} (expression: {})",
            component,
            err,
            expr.trim()
        );
        EtlError::Expr {
            expression: expr.trim().to_string(),
            component: component.to_string(),
            source: err,
        }
    }

    fn compile(&self, expr: &str) -> mlua::Result<Function> {
        if let Some(f) = self.cache.borrow_mut().get(expr) {
            return Ok(f);
        }
        let chunk = format!("local m, props, var = ...\nreturn ({})", expr.trim());
        let func = self.lua.load(&chunk).into_function()?;
        self.cache.borrow_mut().put(expr, func.clone());
        Ok(func)
    }

    fn build_scope(
        &self,
        msg: &Message,
        props: &HashMap<String, Value>,
        vars: &HashMap<String, Value>,
    ) -> mlua::Result<(Table, Table, Table)> {
        let m = self.lua.create_table()?;
        for (k, v) in msg {
            m.set(k.as_str(), value_to_lua(&self.lua, v)?)?;
        }
        let p = self.lua.create_table()?;
        for (k, v) in props {
            p.set(k.as_str(), value_to_lua(&self.lua, v)?)?;
        }
        let vt = self.lua.create_table()?;
        for (k, v) in vars {
            vt.set(k.as_str(), value_to_lua(&self.lua, v)?)?;
        }
        Ok((m, p, vt))
    }
}

fn value_to_lua(lua: &Lua, v: &Value) -> mlua::Result<mlua::Value> {
    Ok(match v {
        Value::Null => mlua::Value::Nil,
        Value::Bool(b) => mlua::Value::Boolean(*b),
        Value::Int(i) => mlua::Value::Integer(*i),
        Value::Float(f) => mlua::Value::Number(*f),
        Value::String(s) => mlua::Value::String(lua.create_string(s)?),
        Value::Date(_) | Value::DateTime(_) | Value::Bytes(_) => {
            mlua::Value::String(lua.create_string(v.to_string())?)
        }
        Value::List(vs) => {
            let t = lua.create_table()?;
            for (i, item) in vs.iter().enumerate() {
                t.set(i + 1, value_to_lua(lua, item)?)?;
            }
            mlua::Value::Table(t)
        }
    })
}

fn lua_to_value(v: &mlua::Value) -> EtlResult<Value> {
    match v {
        mlua::Value::Nil => Ok(Value::Null),
        mlua::Value::Boolean(b) => Ok(Value::Bool(*b)),
        mlua::Value::Integer(i) => Ok(Value::Int(*i)),
        mlua::Value::Number(n) => Ok(Value::Float(*n)),
        mlua::Value::String(s) => Ok(Value::String(s.to_string_lossy())),
        mlua::Value::Table(t) => {
            let mut items = Vec::new();
            for item in t.clone().sequence_values::<mlua::Value>() {
                let item = item.map_err(|e| EtlError::Type(e.to_string()))?;
                items.push(lua_to_value(&item)?);
            }
            Ok(Value::List(items))
        }
        other => Err(EtlError::Type(format!(
            "expression produced an unsupported value: {}",
            other.type_name()
        ))),
    }
}

/// Bounded LRU cache of compiled expressions keyed by their text.
struct CompiledCache {
    capacity: usize,
    map: HashMap<String, Function>,
    order: VecDeque<String>,
}

impl CompiledCache {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            map: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    fn get(&mut self, key: &str) -> Option<Function> {
        let func = self.map.get(key)?.clone();
        self.touch(key);
        Some(func)
    }

    fn put(&mut self, key: &str, func: Function) {
        if self.map.contains_key(key) {
            self.touch(key);
            self.map.insert(key.to_string(), func);
            return;
        }
        if self.map.len() >= self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.map.remove(&evicted);
            }
        }
        self.order.push_back(key.to_string());
        self.map.insert(key.to_string(), func);
    }

    fn touch(&mut self, key: &str) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            if let Some(k) = self.order.remove(pos) {
                self.order.push_back(k);
            }
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.map.len()
    }
}
