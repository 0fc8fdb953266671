//! Host object model - the managed side of the bridge
//!
//! Design: Host values are `Arc`-backed cells compared by reference identity.
//! Liveness is implicit: a value is reclaimed once the last strong handle
//! drops, which is exactly the regime the bridge must reconcile with native
//! refcounts. Weak handles observe that reclamation.
//!
//! Architecture:
//! - `HostObject` / `WeakHostObject` - strong and weak handles
//! - `HostValue` - the payload (scalars, strings, tuples, callables, classes)
//! - `builtins.rs` - builtin classes backing the host's `type()` walk

mod builtins;


pub use builtins::HostBuiltins;

use crate::abi::Address;
use crate::bridge::{HostRef, WeakHandle};
use crate::error::{Error, Result};
use once_cell::sync::OnceCell;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

/// Keyword arguments, in call order
pub type Kwargs = [(String, HostObject)];

/// Native-backed or Rust-backed host callable
pub type CallFn = dyn Fn(&[HostObject], &Kwargs) -> Result<HostObject> + Send + Sync;

#[derive(Clone)]
pub struct HostFunction {
    pub name: String,
    pub doc: Option<String>,
    call: Arc<CallFn>,
}

impl HostFunction {
    pub fn new<F>(name: impl Into<String>, doc: Option<String>, call: F) -> Self
    where
        F: Fn(&[HostObject], &Kwargs) -> Result<HostObject> + Send + Sync + 'static,
    {
        Self { name: name.into(), doc, call: Arc::new(call) }
    }

    #[inline]
    pub fn invoke(&self, args: &[HostObject], kwargs: &Kwargs) -> Result<HostObject> {
        (self.call)(args, kwargs)
    }
}

pub struct ClassInfo {
    pub name: String,
    /// `None` means the builtin `type`
    pub metaclass: Option<HostObject>,
    /// Type descriptor this class was generated from
    pub native_type: OnceCell<Address>,
}

/// Runs once when an instance is reclaimed
pub type Finalizer = Box<dyn FnOnce() + Send>;

pub struct InstanceInfo {
    pub class: HostObject,
    /// Address of the native object backing this instance
    pub native: OnceCell<Address>,
    finalizer: Mutex<Option<Finalizer>>,
}

impl InstanceInfo {
    /// Install the hook that runs when the instance is reclaimed, replacing any previous one
    pub fn set_finalizer(&self, finalizer: Finalizer) {
        *self.finalizer.lock() = Some(finalizer);
    }

    /// Drop the hook without running it
    pub fn clear_finalizer(&self) {
        self.finalizer.lock().take();
    }
}

impl Drop for InstanceInfo {
    fn drop(&mut self) {
        if let Some(finalizer) = self.finalizer.get_mut().take() {
            finalizer();
        }
    }
}

pub enum HostValue {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Tuple(Vec<HostObject>),
    Dict(Vec<(String, HostObject)>),
    Function(HostFunction),
    Module(String),
    Class(ClassInfo),
    Instance(InstanceInfo),
}

struct HostCell {
    value: HostValue,
    attrs: RwLock<HashMap<String, HostObject>>,
}

/// Strong handle to a host value; identity is the allocation
#[derive(Clone)]
pub struct HostObject(Arc<HostCell>);

/// Weak handle; upgrading fails once the value has been reclaimed
#[derive(Clone)]
pub struct WeakHostObject(Weak<HostCell>);

impl HostObject {
    pub fn new(value: HostValue) -> Self {
        Self(Arc::new(HostCell { value, attrs: RwLock::new(HashMap::new()) }))
    }

    pub fn none() -> Self {
        Self::new(HostValue::None)
    }

    pub fn int(value: i64) -> Self {
        Self::new(HostValue::Int(value))
    }

    pub fn float(value: f64) -> Self {
        Self::new(HostValue::Float(value))
    }

    pub fn str(value: impl Into<String>) -> Self {
        Self::new(HostValue::Str(value.into()))
    }

    pub fn tuple(items: Vec<HostObject>) -> Self {
        Self::new(HostValue::Tuple(items))
    }

    pub fn dict(items: Vec<(String, HostObject)>) -> Self {
        Self::new(HostValue::Dict(items))
    }

    pub fn function(function: HostFunction) -> Self {
        Self::new(HostValue::Function(function))
    }

    /// Module whose variables start as `vars`
    pub fn module(
        name: impl Into<String>,
        vars: impl IntoIterator<Item = (String, HostObject)>,
    ) -> Self {
        let name = name.into();
        let module = Self::new(HostValue::Module(name.clone()));
        module.set_attr("__name__", Self::str(name));
        for (key, value) in vars {
            module.set_attr(key, value);
        }
        module
    }

    pub fn class(name: impl Into<String>, metaclass: Option<HostObject>) -> Self {
        Self::new(HostValue::Class(ClassInfo {
            name: name.into(),
            metaclass,
            native_type: OnceCell::new(),
        }))
    }

    /// Bare instance of `class`, before any constructor ran
    pub fn instance(class: &HostObject) -> Self {
        Self::new(HostValue::Instance(InstanceInfo {
            class: class.clone(),
            native: OnceCell::new(),
            finalizer: Mutex::new(None),
        }))
    }

    #[inline]
    pub fn value(&self) -> &HostValue {
        &self.0.value
    }

    #[inline]
    pub fn ptr_eq(&self, other: &HostObject) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    #[inline]
    pub fn downgrade(&self) -> WeakHostObject {
        WeakHostObject(Arc::downgrade(&self.0))
    }

    pub fn kind(&self) -> &'static str {
        match self.value() {
            HostValue::None => "NoneType",
            HostValue::Bool(_) => "bool",
            HostValue::Int(_) => "int",
            HostValue::Float(_) => "float",
            HostValue::Str(_) => "str",
            HostValue::Tuple(_) => "tuple",
            HostValue::Dict(_) => "dict",
            HostValue::Function(_) => "function",
            HostValue::Module(_) => "module",
            HostValue::Class(_) => "type",
            HostValue::Instance(_) => "instance",
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self.value() {
            HostValue::Int(v) => Some(*v),
            HostValue::Bool(v) => Some(*v as i64),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self.value() {
            HostValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self.value() {
            HostValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_tuple(&self) -> Option<&[HostObject]> {
        match self.value() {
            HostValue::Tuple(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_class(&self) -> Option<&ClassInfo> {
        match self.value() {
            HostValue::Class(info) => Some(info),
            _ => None,
        }
    }

    pub fn as_instance(&self) -> Option<&InstanceInfo> {
        match self.value() {
            HostValue::Instance(info) => Some(info),
            _ => None,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self.value(), HostValue::None)
    }

    // ===== Attributes =====

    pub fn get_attr(&self, name: &str) -> Option<HostObject> {
        self.0.attrs.read().get(name).cloned()
    }

    pub fn set_attr(&self, name: impl Into<String>, value: HostObject) {
        self.0.attrs.write().insert(name.into(), value);
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.0.attrs.read().contains_key(name)
    }

    /// Attribute lookup that falls back from an instance to its class
    pub fn lookup(&self, name: &str) -> Option<HostObject> {
        self.get_attr(name).or_else(|| match self.value() {
            HostValue::Instance(info) => info.class.get_attr(name),
            _ => None,
        })
    }

    pub fn attr_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.0.attrs.read().keys().cloned().collect();
        names.sort();
        names
    }

    // ===== Calls =====

    /// Dynamic call: functions are invoked, classes construct an instance
    pub fn call(&self, args: &[HostObject], kwargs: &Kwargs) -> Result<HostObject> {
        match self.value() {
            HostValue::Function(function) => function.invoke(args, kwargs),
            HostValue::Class(_) => self.construct(args, kwargs),
            _ => Err(Error::type_error(format!("'{}' object is not callable", self.kind()))),
        }
    }

    /// `__new__` then `__init__`, both optional
    fn construct(&self, args: &[HostObject], kwargs: &Kwargs) -> Result<HostObject> {
        let instance = match self.get_attr("__new__") {
            Some(new) => new.call(&prepend(self, args), kwargs)?,
            None => HostObject::instance(self),
        };

        if let Some(init) = self.get_attr("__init__") {
            init.call(&prepend(&instance, args), kwargs)?;
        }
        Ok(instance)
    }

    /// Call a named attribute; class-level functions receive `self` first
    pub fn call_method(&self, name: &str, args: &[HostObject], kwargs: &Kwargs) -> Result<HostObject> {
        if let Some(own) = self.get_attr(name) {
            return own.call(args, kwargs);
        }

        let class_attr = match self.value() {
            HostValue::Instance(info) => info.class.get_attr(name),
            _ => None,
        };

        match class_attr {
            Some(method) => method.call(&prepend(self, args), kwargs),
            None => Err(Error::attribute_error(format!(
                "'{}' object has no attribute '{}'",
                self.kind(),
                name
            ))),
        }
    }
}

fn prepend(first: &HostObject, rest: &[HostObject]) -> Vec<HostObject> {
    let mut all = Vec::with_capacity(rest.len() + 1);
    all.push(first.clone());
    all.extend_from_slice(rest);
    all
}

impl fmt::Debug for HostObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.value() {
            HostValue::None => write!(f, "None"),
            HostValue::Bool(v) => write!(f, "{}", v),
            HostValue::Int(v) => write!(f, "{}", v),
            HostValue::Float(v) => write!(f, "{}", v),
            HostValue::Str(s) => write!(f, "{:?}", s),
            HostValue::Tuple(items) => f.debug_tuple("").field(items).finish(),
            HostValue::Dict(items) => f.debug_map().entries(items.iter().map(|(k, v)| (k, v))).finish(),
            HostValue::Function(func) => write!(f, "<function {}>", func.name),
            HostValue::Module(name) => write!(f, "<module {}>", name),
            HostValue::Class(info) => write!(f, "<class {}>", info.name),
            HostValue::Instance(info) => match info.class.as_class() {
                Some(class) => write!(f, "<{} instance>", class.name),
                None => write!(f, "<instance>"),
            },
        }
    }
}

impl WeakHostObject {
    pub fn upgrade(&self) -> Option<HostObject> {
        self.0.upgrade().map(HostObject)
    }
}

impl HostRef for HostObject {
    type Weak = WeakHostObject;

    fn downgrade(&self) -> WeakHostObject {
        HostObject::downgrade(self)
    }

    fn identity(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }
}

impl WeakHandle for WeakHostObject {
    type Strong = HostObject;

    fn upgrade(&self) -> Option<HostObject> {
        WeakHostObject::upgrade(self)
    }
}
