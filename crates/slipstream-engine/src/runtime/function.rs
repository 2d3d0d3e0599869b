//! Callable values: compiled functions and native functions.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use super::value::Value;
use crate::Error;
use crate::compiler::FunctionProto;

/// A lexical scope: a set of bindings plus a parent link.
#[derive(Debug, Default)]
pub struct Scope {
    /// Variable bindings in this scope
    pub vars: rustc_hash::FxHashMap<String, Value>,
    /// Enclosing scope, None for the global scope
    pub parent: Option<Env>,
}

/// A shared, mutable environment handle.
pub type Env = Rc<RefCell<Scope>>;

/// Creates a child environment of `parent`.
pub fn child_env(parent: &Env) -> Env {
    Rc::new(RefCell::new(Scope {
        vars: rustc_hash::FxHashMap::default(),
        parent: Some(Rc::clone(parent)),
    }))
}

/// A compiled function together with its captured environment.
#[derive(Clone)]
pub struct Function {
    /// The compiled prototype
    pub proto: Rc<FunctionProto>,
    /// The environment captured at closure creation
    pub env: Env,
}

/// The signature native functions implement.
///
/// Natives receive the engine so they can allocate objects, call back into
/// script code or raise engine errors.
pub type NativeFn = Rc<dyn Fn(&mut crate::Engine, &[Value]) -> Result<Value, Error>>;

/// Anything that can be called.
pub enum Callable {
    /// A compiled closure
    Function(Function),
    /// A native (Rust) function
    Native {
        /// Diagnostic name
        name: String,
        /// The implementation
        func: NativeFn,
    },
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Callable::Function(func) => f
                .debug_struct("Function")
                .field("name", &func.proto.name)
                .field("params", &func.proto.params)
                .finish(),
            Callable::Native { name, .. } => {
                f.debug_struct("Native").field("name", name).finish()
            }
        }
    }
}

/// A heap-allocated JavaScript object.
#[derive(Debug, Default, Clone)]
pub struct JsObject {
    /// Property map
    pub props: rustc_hash::FxHashMap<String, Value>,
    /// True for array-like objects created by array literals
    pub is_array: bool,
}
