//! Programmable fake backend.
//!
//! Each `Class.method` has a FIFO queue of canned outcomes. A call pops the
//! front of its queue; an empty queue is an internal error. Classes are
//! registered through the normal [`ClassBuilder`], so the allow-list still
//! applies.

use crate::error::BackendError;
use crate::registry::{ApiObject, ClassBuilder, CtorArgs};
use bindrpc_protocol::Params;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// A call observed by the fake backend.
#[derive(Debug, Clone, PartialEq)]
pub struct FakeCall {
    pub class: String,
    pub method: String,
    pub ctor_args: CtorArgs,
    pub params: Params,
}

#[derive(Default)]
struct FakeState {
    queues: HashMap<(String, String), VecDeque<Result<Value, BackendError>>>,
    calls: Vec<FakeCall>,
}

/// Shared handle to the canned outcomes. Clones share state.
#[derive(Clone, Default)]
pub struct FakeApi {
    state: Arc<Mutex<FakeState>>,
}

impl FakeApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a successful result for `class.method`.
    pub fn expect(&self, class: &str, method: &str, result: Value) {
        self.push(class, method, Ok(result));
    }

    /// Queues a failure for `class.method`.
    pub fn expect_error(&self, class: &str, method: &str, error: BackendError) {
        self.push(class, method, Err(error));
    }

    fn push(&self, class: &str, method: &str, outcome: Result<Value, BackendError>) {
        self.state
            .lock()
            .queues
            .entry((class.to_string(), method.to_string()))
            .or_default()
            .push_back(outcome);
    }

    /// Number of outcomes still queued for `class.method`.
    pub fn pending(&self, class: &str, method: &str) -> usize {
        self.state
            .lock()
            .queues
            .get(&(class.to_string(), method.to_string()))
            .map_or(0, VecDeque::len)
    }

    /// Calls observed so far, oldest first.
    pub fn calls(&self) -> Vec<FakeCall> {
        self.state.lock().calls.clone()
    }

    /// Drops all queued outcomes and recorded calls.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.queues.clear();
        state.calls.clear();
    }

    /// Returns a class whose methods are answered from this fake.
    pub fn class(&self, name: &str) -> ClassBuilder {
        let api = self.clone();
        let class = name.to_string();
        ClassBuilder::new(name, move |ctor_args| {
            Ok(Box::new(FakeObject {
                api: api.clone(),
                class: class.clone(),
                ctor_args,
            }) as Box<dyn ApiObject>)
        })
    }
}

struct FakeObject {
    api: FakeApi,
    class: String,
    ctor_args: CtorArgs,
}

impl ApiObject for FakeObject {
    fn call(&mut self, method: &str, params: Params) -> Result<Value, BackendError> {
        let mut state = self.api.state.lock();
        state.calls.push(FakeCall {
            class: self.class.clone(),
            method: method.to_string(),
            ctor_args: self.ctor_args.clone(),
            params,
        });
        state
            .queues
            .get_mut(&(self.class.clone(), method.to_string()))
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| {
                Err(BackendError::internal(format!(
                    "No API data available for {}.{}",
                    self.class, method
                )))
            })
    }
}
