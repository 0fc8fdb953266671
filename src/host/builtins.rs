//! Builtin host classes and the host's `type()` primitive

use super::{HostObject, HostValue};

/// Builtin classes every runtime shares with its extension modules
pub struct HostBuiltins {
    pub type_: HostObject,
    pub object: HostObject,
    pub none_type: HostObject,
    pub bool_: HostObject,
    pub int: HostObject,
    pub float: HostObject,
    pub str_: HostObject,
    pub tuple: HostObject,
    pub dict: HostObject,
    pub function: HostObject,
    pub module: HostObject,
    /// The `None` singleton
    pub none: HostObject,
}

impl HostBuiltins {
    pub fn new() -> Self {
        Self {
            type_: HostObject::class("type", None),
            object: HostObject::class("object", None),
            none_type: HostObject::class("NoneType", None),
            bool_: HostObject::class("bool", None),
            int: HostObject::class("int", None),
            float: HostObject::class("float", None),
            str_: HostObject::class("str", None),
            tuple: HostObject::class("tuple", None),
            dict: HostObject::class("dict", None),
            function: HostObject::class("builtin_function_or_method", None),
            module: HostObject::class("module", None),
            none: HostObject::none(),
        }
    }

    /// `type(obj)`: a class's metaclass (default `type`), an instance's class,
    /// or the builtin class of a plain value
    pub fn type_of(&self, obj: &HostObject) -> HostObject {
        match obj.value() {
            HostValue::None => self.none_type.clone(),
            HostValue::Bool(_) => self.bool_.clone(),
            HostValue::Int(_) => self.int.clone(),
            HostValue::Float(_) => self.float.clone(),
            HostValue::Str(_) => self.str_.clone(),
            HostValue::Tuple(_) => self.tuple.clone(),
            HostValue::Dict(_) => self.dict.clone(),
            HostValue::Function(_) => self.function.clone(),
            HostValue::Module(_) => self.module.clone(),
            HostValue::Class(info) => info.metaclass.clone().unwrap_or_else(|| self.type_.clone()),
            HostValue::Instance(info) => info.class.clone(),
        }
    }
}

impl Default for HostBuiltins {
    fn default() -> Self {
        Self::new()
    }
}
