//! Calling conventions the bridge can dispatch

use crate::abi::MethodFlags;
use crate::error::{Error, Result};
use std::ffi::c_int;
use std::fmt;

/// Closed set of `ml_flags` combinations with a shim
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallingConvention {
    /// `METH_NOARGS`: `f(self, NULL)`
    NoArgs,
    /// `METH_O`: `f(self, arg)`
    OneArg,
    /// `METH_VARARGS`: `f(self, args_tuple)`
    VarArgs,
    /// `METH_VARARGS | METH_KEYWORDS`: `f(self, args_tuple, kwargs_or_NULL)`
    VarArgsKeywords,
}

impl CallingConvention {
    /// Exact flag match; any other combination has no shim
    pub fn classify(name: &str, flags: c_int) -> Result<Self> {
        let bits = MethodFlags::from_bits_retain(flags);
        if bits == MethodFlags::NOARGS {
            Ok(Self::NoArgs)
        } else if bits == MethodFlags::O {
            Ok(Self::OneArg)
        } else if bits == MethodFlags::VARARGS {
            Ok(Self::VarArgs)
        } else if bits == MethodFlags::VARARGS | MethodFlags::KEYWORDS {
            Ok(Self::VarArgsKeywords)
        } else {
            Err(Error::UnsupportedConvention { name: name.to_string(), flags })
        }
    }

    /// Check a host call's arguments before anything is marshaled
    pub fn check_arity(self, name: &str, args: usize, kwargs: usize) -> Result<()> {
        let given = args + kwargs;
        match self {
            Self::NoArgs if given != 0 => {
                Err(Error::type_error(format!("{}() takes no arguments ({} given)", name, given)))
            }
            Self::OneArg if args != 1 || kwargs != 0 => Err(Error::type_error(format!(
                "{}() takes exactly one argument ({} given)",
                name, given
            ))),
            Self::VarArgs if kwargs != 0 => {
                Err(Error::type_error(format!("{}() takes no keyword arguments", name)))
            }
            _ => Ok(()),
        }
    }
}

impl fmt::Display for CallingConvention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NoArgs => "noargs",
            Self::OneArg => "objarg",
            Self::VarArgs => "varargs",
            Self::VarArgsKeywords => "varargs_kwargs",
        };
        f.write_str(name)
    }
}
