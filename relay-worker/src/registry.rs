//! `HandlerRegistry`: an explicit `action_type -> handler` map built once at
//! worker construction time.
//!
//! Deliberately not a discovery mechanism — no scanning for methods that
//! happen to be named after an action type, no attribute macro. Every
//! registered action type is named once, in one place, at startup; an
//! inbound action whose type was never registered is rejected at dispatch
//! time with `ErrorType::Unsupported`, not silently dropped.

use std::collections::HashMap;
use std::sync::Arc;

use crate::handler::{ActionHandler, BoxedHandler};

#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, BoxedHandler>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `action_type`. Registering the same
    /// `action_type` twice replaces the previous handler — the last
    /// registration at builder time wins, matching ordinary `HashMap`
    /// insert semantics rather than raising at build time, since a service
    /// re-registering its own action type during test setup is common and
    /// shouldn't need special-casing.
    pub fn register(&mut self, action_type: impl Into<String>, handler: impl ActionHandler + 'static) {
        self.handlers.insert(action_type.into(), Arc::new(handler));
    }

    pub fn get(&self, action_type: &str) -> Option<&BoxedHandler> {
        self.handlers.get(action_type)
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }
}
