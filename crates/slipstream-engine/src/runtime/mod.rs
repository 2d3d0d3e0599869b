//! Runtime data structures: values, objects, scopes and callables.

mod function;
mod value;

pub use function::{Callable, Env, Function, JsObject, NativeFn, Scope, child_env};
pub use value::{Value, number_to_string};
