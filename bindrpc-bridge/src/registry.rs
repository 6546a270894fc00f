//! Backend registry and dispatch.
//!
//! A registry is a fixed set of classes, each with an explicit allow-list of
//! callable methods and read-only constants. Dispatch resolves a
//! `Class.member` name against that allow-list only; nothing outside it is
//! reachable, whatever the backend object itself could do.

use crate::error::{BackendError, BridgeError};
use bindrpc_protocol::Params;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// Name of the data member every class exposes with its constructor
/// argument names.
pub const CTOR_ARGS_MEMBER: &str = "ctorArgs";

/// A backend object, constructed per call.
pub trait ApiObject {
    /// Invokes an allow-listed method with the non-constructor params.
    fn call(&mut self, method: &str, params: Params) -> Result<Value, BackendError>;
}

/// Constructor arguments split off a request's params.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CtorArgs {
    values: Map<String, Value>,
}

impl CtorArgs {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Returns a string argument, or an invalid-params error.
    pub fn get_str(&self, name: &str) -> Result<&str, BackendError> {
        match self.values.get(name) {
            Some(Value::String(s)) => Ok(s),
            Some(_) => Err(BackendError::invalid_params(format!(
                "constructor argument '{}' must be a string",
                name
            ))),
            None => Err(BackendError::invalid_params(format!(
                "missing constructor argument '{}'",
                name
            ))),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.values
    }
}

type Factory = dyn Fn(CtorArgs) -> Result<Box<dyn ApiObject>, BackendError> + Send + Sync;

/// Declares one class: its factory, constructor arguments and allow-list.
pub struct ClassBuilder {
    name: String,
    factory: Option<Arc<Factory>>,
    ctor_args: Vec<String>,
    methods: BTreeSet<String>,
    constants: BTreeMap<String, Value>,
}

impl ClassBuilder {
    /// Starts a class backed by `factory`.
    pub fn new<F>(name: impl Into<String>, factory: F) -> Self
    where
        F: Fn(CtorArgs) -> Result<Box<dyn ApiObject>, BackendError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            factory: Some(Arc::new(factory)),
            ctor_args: Vec::new(),
            methods: BTreeSet::new(),
            constants: BTreeMap::new(),
        }
    }

    /// Starts a class that only exposes constants.
    pub fn data(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            factory: None,
            ctor_args: Vec::new(),
            methods: BTreeSet::new(),
            constants: BTreeMap::new(),
        }
    }

    pub fn ctor_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ctor_args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn method(mut self, name: impl Into<String>) -> Self {
        self.methods.insert(name.into());
        self
    }

    pub fn methods<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.methods.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn constant(mut self, name: impl Into<String>, value: Value) -> Self {
        self.constants.insert(name.into(), value);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn build(self) -> Result<Class, BridgeError> {
        let invalid = |reason: String| BridgeError::InvalidDefinition {
            class: self.name.clone(),
            reason,
        };

        if !is_identifier(&self.name) {
            return Err(invalid(format!("'{}' is not a valid class name", self.name)));
        }
        if !self.methods.is_empty() && self.factory.is_none() {
            return Err(invalid("methods declared without a backend factory".into()));
        }

        let mut members = HashMap::new();
        for method in &self.methods {
            if !is_identifier(method) {
                return Err(invalid(format!("'{}' is not a valid member name", method)));
            }
            members.insert(method.clone(), Member::Method);
        }
        for (name, value) in &self.constants {
            if !is_identifier(name) {
                return Err(invalid(format!("'{}' is not a valid member name", name)));
            }
            if members
                .insert(name.clone(), Member::Constant(value.clone()))
                .is_some()
            {
                return Err(invalid(format!("'{}' is both a method and a constant", name)));
            }
        }

        let ctor_list = Value::Array(self.ctor_args.iter().cloned().map(Value::String).collect());
        if members
            .insert(CTOR_ARGS_MEMBER.to_string(), Member::Constant(ctor_list))
            .is_some()
        {
            return Err(invalid(format!("'{}' is reserved", CTOR_ARGS_MEMBER)));
        }

        Ok(Class {
            name: self.name,
            factory: self.factory,
            ctor_args: self.ctor_args,
            members,
        })
    }
}

#[derive(Debug, Clone)]
enum Member {
    Method,
    Constant(Value),
}

struct Class {
    name: String,
    factory: Option<Arc<Factory>>,
    ctor_args: Vec<String>,
    members: HashMap<String, Member>,
}

impl Class {
    /// Splits constructor arguments off the front of `params`.
    fn split_ctor_args(&self, params: Params) -> Result<(CtorArgs, Params), BridgeError> {
        let mut values = Map::new();
        let rest = match params {
            Params::Named(mut map) => {
                for arg in &self.ctor_args {
                    let value = map.remove(arg).ok_or_else(|| self.missing(arg))?;
                    values.insert(arg.clone(), value);
                }
                Params::Named(map)
            }
            Params::Positional(items) => {
                if items.len() < self.ctor_args.len() {
                    return Err(self.missing(&self.ctor_args[items.len()]));
                }
                let mut items = items.into_iter();
                for arg in &self.ctor_args {
                    if let Some(value) = items.next() {
                        values.insert(arg.clone(), value);
                    }
                }
                Params::Positional(items.collect())
            }
        };
        Ok((CtorArgs { values }, rest))
    }

    fn missing(&self, arg: &str) -> BridgeError {
        BridgeError::MissingCtorArg {
            class: self.name.clone(),
            arg: arg.to_string(),
        }
    }
}

/// Collects classes into a [`Bridge`].
#[derive(Default)]
pub struct RegistryBuilder {
    classes: Vec<ClassBuilder>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn class(mut self, class: ClassBuilder) -> Self {
        self.classes.push(class);
        self
    }

    /// Validates every class and freezes the registry.
    pub fn build(self) -> Result<Bridge, BridgeError> {
        let mut classes = HashMap::new();
        for builder in self.classes {
            let class = builder.build()?;
            if classes.contains_key(&class.name) {
                return Err(BridgeError::DuplicateClass { class: class.name });
            }
            classes.insert(class.name.clone(), class);
        }
        tracing::debug!("Registry built with {} classes", classes.len());
        Ok(Bridge { classes })
    }
}

/// Dispatches `Class.member` calls to allow-listed backends.
///
/// Immutable once built and safe to share across connections.
pub struct Bridge {
    classes: HashMap<String, Class>,
}

impl Bridge {
    /// Resolves `method` and invokes it with `params`.
    ///
    /// Constants are returned without touching the backend. A panic inside
    /// the backend is caught and reported as [`BridgeError::Panicked`].
    pub fn dispatch(&self, method: &str, params: Params) -> Result<Value, BridgeError> {
        let not_found = || BridgeError::MethodNotFound {
            method: method.to_string(),
        };

        let (class_name, member_name) = method.split_once('.').ok_or_else(not_found)?;
        let class = self.classes.get(class_name).ok_or_else(not_found)?;
        let member = class.members.get(member_name).ok_or_else(not_found)?;

        match member {
            Member::Constant(value) => Ok(value.clone()),
            Member::Method => {
                let factory = class.factory.as_ref().ok_or_else(not_found)?;
                let (ctor_args, params) = class.split_ctor_args(params)?;

                tracing::debug!(method, ctor_args = ctor_args.len(), "Invoking backend");
                let outcome = catch_unwind(AssertUnwindSafe(|| {
                    let mut object = factory(ctor_args)?;
                    object.call(member_name, params)
                }));

                match outcome {
                    Ok(result) => result.map_err(BridgeError::from),
                    Err(payload) => {
                        let message = panic_message(payload.as_ref());
                        tracing::warn!(method, "Backend panicked: {}", message);
                        Err(BridgeError::Panicked {
                            method: method.to_string(),
                            message,
                        })
                    }
                }
            }
        }
    }

    /// Returns whether `method` names an exposed member.
    pub fn contains(&self, method: &str) -> bool {
        method
            .split_once('.')
            .and_then(|(class, member)| self.classes.get(class)?.members.get(member))
            .is_some()
    }

    /// Lists every exposed `Class.member`, sorted.
    pub fn methods(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .classes
            .values()
            .flat_map(|class| {
                class
                    .members
                    .keys()
                    .map(move |member| format!("{}.{}", class.name, member))
            })
            .collect();
        names.sort();
        names
    }

    pub fn class_count(&self) -> usize {
        self.classes.len()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn is_identifier(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}
