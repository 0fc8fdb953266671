//! Dispatch table - qualified names to native entry points

use super::CallingConvention;
use crate::abi::{GetIterFunc, InitProc, NewFunc, PyCFunction, PyCFunctionWithKeywords};
use crate::error::{Error, Result};
use parking_lot::RwLock;
use std::collections::HashMap;

/// Typed native function pointer, tagged by how it is called
#[derive(Debug, Clone, Copy)]
pub enum NativeEntry {
    NoArgs(PyCFunction),
    OneArg(PyCFunction),
    VarArgs(PyCFunction),
    VarArgsKeywords(PyCFunctionWithKeywords),
    /// `tp_iter` / `tp_iternext`: `f(self)`
    Unary(GetIterFunc),
    New(NewFunc),
    Init(InitProc),
}

impl NativeEntry {
    /// Entry for a method-table function pointer under `convention`
    pub fn method(convention: CallingConvention, meth: PyCFunction) -> Self {
        match convention {
            CallingConvention::NoArgs => Self::NoArgs(meth),
            CallingConvention::OneArg => Self::OneArg(meth),
            CallingConvention::VarArgs => Self::VarArgs(meth),
            CallingConvention::VarArgsKeywords => {
                // SAFETY: descriptors flagged METH_KEYWORDS store a three-argument
                // function cast to `PyCFunction`; this undoes that cast
                let meth = unsafe { std::mem::transmute::<PyCFunction, PyCFunctionWithKeywords>(meth) };
                Self::VarArgsKeywords(meth)
            }
        }
    }

    pub fn convention(&self) -> Option<CallingConvention> {
        match self {
            Self::NoArgs(_) => Some(CallingConvention::NoArgs),
            Self::OneArg(_) => Some(CallingConvention::OneArg),
            Self::VarArgs(_) => Some(CallingConvention::VarArgs),
            Self::VarArgsKeywords(_) => Some(CallingConvention::VarArgsKeywords),
            Self::Unary(_) | Self::New(_) | Self::Init(_) => None,
        }
    }
}

/// Entries by qualified name: `func` for module functions, `Class.method` for methods
#[derive(Default)]
pub struct DispatchTable {
    entries: RwLock<HashMap<String, NativeEntry>>,
}

impl DispatchTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `entry` under `key`, replacing any previous entry
    pub fn register(&self, key: impl Into<String>, entry: NativeEntry) {
        self.entries.write().insert(key.into(), entry);
    }

    pub fn get(&self, key: &str) -> Result<NativeEntry> {
        self.entries
            .read()
            .get(key)
            .copied()
            .ok_or_else(|| Error::lookup(format_args!("no dispatch entry for {}", key)))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.read().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.read().keys().cloned().collect();
        keys.sort();
        keys
    }
}
