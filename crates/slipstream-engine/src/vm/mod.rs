//! The bytecode interpreter.

use std::rc::Rc;

use crate::compiler::{Chunk, Const, OpCode};
use crate::runtime::{Callable, Env, Function, JsObject, Value, child_env, number_to_string};
use crate::{Engine, Error};

/// Abstract equality comparison with type coercion (`==`).
fn abstract_equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        // Same-type comparisons defer to strict equality
        (Value::Undefined, Value::Undefined) => true,
        (Value::Null, Value::Null) => true,
        (Value::Boolean(_), Value::Boolean(_))
        | (Value::Number(_), Value::Number(_))
        | (Value::String(_), Value::String(_))
        | (Value::Object(_), Value::Object(_))
        | (Value::Function(_), Value::Function(_)) => a == b,

        // null == undefined
        (Value::Null, Value::Undefined) | (Value::Undefined, Value::Null) => true,

        // Number vs string: convert the string to a number
        (Value::Number(n), Value::String(s)) | (Value::String(s), Value::Number(n)) => {
            let parsed = s.trim().parse::<f64>().unwrap_or(f64::NAN);
            !parsed.is_nan() && !n.is_nan() && *n == parsed
        }

        // Booleans coerce to numbers
        (Value::Boolean(b), other) | (other, Value::Boolean(b)) => {
            let num = if *b { 1.0 } else { 0.0 };
            abstract_equals(&Value::Number(num), other)
        }

        _ => false,
    }
}

/// Converts a value to a number (ToNumber), best effort.
fn to_number(value: &Value) -> f64 {
    match value {
        Value::Undefined => f64::NAN,
        Value::Null => 0.0,
        Value::Boolean(b) => {
            if *b {
                1.0
            } else {
                0.0
            }
        }
        Value::Number(n) => *n,
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                0.0
            } else {
                trimmed.parse::<f64>().unwrap_or(f64::NAN)
            }
        }
        Value::Object(_) | Value::Function(_) => f64::NAN,
    }
}

/// Converts a value to a property key string.
fn to_property_key(value: &Value) -> String {
    match value {
        Value::Number(n) => number_to_string(*n),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn lookup(env: &Env, name: &str) -> Option<Value> {
    let scope = env.borrow();
    if let Some(value) = scope.vars.get(name) {
        return Some(value.clone());
    }
    scope.parent.as_ref().and_then(|parent| lookup(parent, name))
}

/// Assigns to an existing binding, walking the scope chain.
/// Returns false if no binding exists.
fn assign(env: &Env, name: &str, value: &Value) -> bool {
    let mut scope = env.borrow_mut();
    if let Some(slot) = scope.vars.get_mut(name) {
        *slot = value.clone();
        return true;
    }
    match &scope.parent {
        Some(parent) => assign(parent, name, value),
        None => false,
    }
}

impl Engine {
    /// Executes a chunk in the given environment.
    ///
    /// Returns the function's return value, or the completion value for
    /// script chunks ending in `Halt`.
    pub(crate) fn execute(&mut self, chunk: &Chunk, env: Env) -> Result<Value, Error> {
        let mut stack: Vec<Value> = Vec::with_capacity(16);
        let mut completion = Value::Undefined;
        let mut ip = 0usize;

        macro_rules! pop {
            () => {
                stack
                    .pop()
                    .ok_or_else(|| Error::InternalError("stack underflow".into()))?
            };
        }

        macro_rules! arith {
            ($op:tt) => {{
                let b = pop!();
                let a = pop!();
                stack.push(Value::Number(to_number(&a) $op to_number(&b)));
            }};
        }

        macro_rules! compare {
            ($op:tt) => {{
                let b = pop!();
                let a = pop!();
                let result = match (&a, &b) {
                    (Value::String(x), Value::String(y)) => x $op y,
                    _ => {
                        let (x, y) = (to_number(&a), to_number(&b));
                        x $op y
                    }
                };
                stack.push(Value::Boolean(result));
            }};
        }

        while ip < chunk.code.len() {
            let instr = chunk.code[ip];
            ip += 1;

            match instr.op {
                OpCode::LoadConst => {
                    let value = match constant(chunk, instr.operand)? {
                        Const::Number(n) => Value::Number(*n),
                        Const::String(s) => Value::String(s.clone()),
                        Const::Function(_) => {
                            return Err(Error::InternalError(
                                "LoadConst on function prototype".into(),
                            ));
                        }
                    };
                    stack.push(value);
                }
                OpCode::LoadUndefined => stack.push(Value::Undefined),
                OpCode::LoadNull => stack.push(Value::Null),
                OpCode::LoadTrue => stack.push(Value::Boolean(true)),
                OpCode::LoadFalse => stack.push(Value::Boolean(false)),
                OpCode::Pop => {
                    pop!();
                }
                OpCode::Dup => {
                    let top = stack
                        .last()
                        .cloned()
                        .ok_or_else(|| Error::InternalError("stack underflow".into()))?;
                    stack.push(top);
                }

                OpCode::Add => {
                    let b = pop!();
                    let a = pop!();
                    // String concatenation wins when either side is a string
                    let result = match (&a, &b) {
                        (Value::String(_), _) | (_, Value::String(_)) => {
                            Value::String(format!("{}{}", a, b))
                        }
                        _ => Value::Number(to_number(&a) + to_number(&b)),
                    };
                    stack.push(result);
                }
                OpCode::Sub => arith!(-),
                OpCode::Mul => arith!(*),
                OpCode::Div => arith!(/),
                OpCode::Mod => {
                    let b = pop!();
                    let a = pop!();
                    stack.push(Value::Number(to_number(&a) % to_number(&b)));
                }
                OpCode::Neg => {
                    let a = pop!();
                    stack.push(Value::Number(-to_number(&a)));
                }

                OpCode::Eq => {
                    let b = pop!();
                    let a = pop!();
                    stack.push(Value::Boolean(abstract_equals(&a, &b)));
                }
                OpCode::Ne => {
                    let b = pop!();
                    let a = pop!();
                    stack.push(Value::Boolean(!abstract_equals(&a, &b)));
                }
                OpCode::StrictEq => {
                    let b = pop!();
                    let a = pop!();
                    stack.push(Value::Boolean(a == b));
                }
                OpCode::StrictNe => {
                    let b = pop!();
                    let a = pop!();
                    stack.push(Value::Boolean(a != b));
                }
                OpCode::Lt => compare!(<),
                OpCode::Le => compare!(<=),
                OpCode::Gt => compare!(>),
                OpCode::Ge => compare!(>=),

                OpCode::Not => {
                    let a = pop!();
                    stack.push(Value::Boolean(!a.to_boolean()));
                }
                OpCode::TypeOf => {
                    let a = pop!();
                    stack.push(Value::String(a.type_of().to_string()));
                }

                OpCode::DeclareName => {
                    let value = pop!();
                    let name = name_constant(chunk, instr.operand)?;
                    env.borrow_mut().vars.insert(name.to_string(), value);
                }
                OpCode::LoadName => {
                    let name = name_constant(chunk, instr.operand)?;
                    match lookup(&env, name) {
                        Some(value) => stack.push(value),
                        None => {
                            return Err(Error::ReferenceError(format!(
                                "{} is not defined",
                                name
                            )));
                        }
                    }
                }
                OpCode::StoreName => {
                    let value = stack
                        .last()
                        .cloned()
                        .ok_or_else(|| Error::InternalError("stack underflow".into()))?;
                    let name = name_constant(chunk, instr.operand)?;
                    if !assign(&env, name, &value) {
                        // Undeclared assignment lands on the global object
                        self.globals
                            .borrow_mut()
                            .vars
                            .insert(name.to_string(), value);
                    }
                }

                OpCode::GetProperty => {
                    let object = pop!();
                    let name = name_constant(chunk, instr.operand)?;
                    if matches!(object, Value::Undefined | Value::Null) {
                        return Err(Error::TypeError(format!(
                            "cannot read property '{}' of {}",
                            name,
                            object.type_of()
                        )));
                    }
                    stack.push(self.get_property(&object, name));
                }
                OpCode::SetProperty => {
                    let value = pop!();
                    let object = pop!();
                    let name = name_constant(chunk, instr.operand)?;
                    self.set_property(&object, name, value.clone())?;
                    stack.push(value);
                }
                OpCode::InitProperty => {
                    let value = pop!();
                    let object = stack
                        .last()
                        .cloned()
                        .ok_or_else(|| Error::InternalError("stack underflow".into()))?;
                    let name = name_constant(chunk, instr.operand)?;
                    self.set_property(&object, name, value)?;
                }
                OpCode::GetIndex => {
                    let key = pop!();
                    let object = pop!();
                    let name = to_property_key(&key);
                    if matches!(object, Value::Undefined | Value::Null) {
                        return Err(Error::TypeError(format!(
                            "cannot read property '{}' of {}",
                            name,
                            object.type_of()
                        )));
                    }
                    stack.push(self.get_property(&object, &name));
                }
                OpCode::SetIndex => {
                    let value = pop!();
                    let key = pop!();
                    let object = pop!();
                    self.set_property(&object, &to_property_key(&key), value.clone())?;
                    stack.push(value);
                }

                OpCode::Jump => {
                    ip = instr.operand as usize;
                }
                OpCode::JumpIfFalse => {
                    let condition = pop!();
                    if !condition.to_boolean() {
                        ip = instr.operand as usize;
                    }
                }
                OpCode::JumpIfFalseKeep => {
                    let keep = stack
                        .last()
                        .ok_or_else(|| Error::InternalError("stack underflow".into()))?;
                    if !keep.to_boolean() {
                        ip = instr.operand as usize;
                    }
                }
                OpCode::JumpIfTrueKeep => {
                    let keep = stack
                        .last()
                        .ok_or_else(|| Error::InternalError("stack underflow".into()))?;
                    if keep.to_boolean() {
                        ip = instr.operand as usize;
                    }
                }

                OpCode::Call => {
                    let argc = instr.operand as usize;
                    if stack.len() < argc + 1 {
                        return Err(Error::InternalError("stack underflow in call".into()));
                    }
                    let args = stack.split_off(stack.len() - argc);
                    let callee = pop!();
                    let result = self.call_value(callee, &args)?;
                    stack.push(result);
                }
                OpCode::Return => {
                    return Ok(pop!());
                }
                OpCode::Closure => {
                    let proto = match constant(chunk, instr.operand)? {
                        Const::Function(proto) => Rc::clone(proto),
                        _ => {
                            return Err(Error::InternalError(
                                "Closure operand is not a function".into(),
                            ));
                        }
                    };
                    stack.push(Value::Function(Rc::new(Callable::Function(Function {
                        proto,
                        env: Rc::clone(&env),
                    }))));
                }

                OpCode::NewObject => {
                    let object = self.alloc_object();
                    stack.push(object);
                }
                OpCode::NewArray => {
                    let count = instr.operand as usize;
                    if stack.len() < count {
                        return Err(Error::InternalError("stack underflow in array".into()));
                    }
                    let elements = stack.split_off(stack.len() - count);
                    let index = self.heap.len();
                    let mut object = JsObject {
                        is_array: true,
                        ..JsObject::default()
                    };
                    for (i, element) in elements.into_iter().enumerate() {
                        object.props.insert(i.to_string(), element);
                    }
                    object
                        .props
                        .insert("length".to_string(), Value::Number(count as f64));
                    self.heap.push(object);
                    stack.push(Value::Object(index));
                }

                OpCode::StoreCompletion => {
                    completion = pop!();
                }
                OpCode::Halt => {
                    return Ok(completion);
                }
            }
        }

        Ok(completion)
    }

    /// Calls any callable value with the given arguments.
    pub(crate) fn call_value(&mut self, callee: Value, args: &[Value]) -> Result<Value, Error> {
        match callee {
            Value::Function(callable) => match callable.as_ref() {
                Callable::Native { func, .. } => {
                    let func = Rc::clone(func);
                    func(self, args)
                }
                Callable::Function(function) => {
                    let proto = Rc::clone(&function.proto);
                    let env = child_env(&function.env);
                    {
                        let mut scope = env.borrow_mut();
                        // Named function expressions can call themselves
                        if let Some(name) = &proto.name {
                            scope
                                .vars
                                .insert(name.clone(), Value::Function(Rc::clone(&callable)));
                        }
                        for (i, param) in proto.params.iter().enumerate() {
                            let value = args.get(i).cloned().unwrap_or(Value::Undefined);
                            scope.vars.insert(param.clone(), value);
                        }
                    }
                    self.execute(&proto.chunk, env)
                }
            },
            other => Err(Error::TypeError(format!(
                "{} is not a function",
                other.type_of()
            ))),
        }
    }
}

fn constant(chunk: &Chunk, index: u32) -> Result<&Const, Error> {
    chunk
        .consts
        .get(index as usize)
        .ok_or_else(|| Error::InternalError(format!("constant index {} out of range", index)))
}

fn name_constant(chunk: &Chunk, index: u32) -> Result<&str, Error> {
    match constant(chunk, index)? {
        Const::String(s) => Ok(s),
        _ => Err(Error::InternalError(format!(
            "constant {} is not a name",
            index
        ))),
    }
}

#[cfg(test)]
mod tests {
    use crate::{Engine, Error, Value};

    fn eval(src: &str) -> Value {
        Engine::new().eval(src).expect("eval should succeed")
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(eval("5 + 3;"), Value::Number(8.0));
        assert_eq!(eval("10 - 4;"), Value::Number(6.0));
        assert_eq!(eval("6 * 7;"), Value::Number(42.0));
        assert_eq!(eval("15 / 3;"), Value::Number(5.0));
        assert_eq!(eval("17 % 5;"), Value::Number(2.0));
        assert_eq!(eval("-(1 + 2);"), Value::Number(-3.0));
    }

    #[test]
    fn test_string_concatenation() {
        assert_eq!(eval("'a' + 'b';"), Value::String("ab".into()));
        assert_eq!(eval("'n=' + 42;"), Value::String("n=42".into()));
    }

    #[test]
    fn test_comparisons() {
        assert_eq!(eval("5 == '5';"), Value::Boolean(true));
        assert_eq!(eval("5 === '5';"), Value::Boolean(false));
        assert_eq!(eval("null == undefined;"), Value::Boolean(true));
        assert_eq!(eval("1 < 2;"), Value::Boolean(true));
        assert_eq!(eval("'a' < 'b';"), Value::Boolean(true));
    }

    #[test]
    fn test_variables_and_assignment() {
        assert_eq!(eval("var x = 1; x = x + 2; x;"), Value::Number(3.0));
    }

    #[test]
    fn test_control_flow() {
        assert_eq!(eval("var x = 0; if (true) { x = 1; } x;"), Value::Number(1.0));
        assert_eq!(
            eval("var i = 0; var s = 0; while (i < 5) { s = s + i; i = i + 1; } s;"),
            Value::Number(10.0)
        );
    }

    #[test]
    fn test_logical_short_circuit() {
        assert_eq!(eval("false && missing;"), Value::Boolean(false));
        assert_eq!(eval("true || missing;"), Value::Boolean(true));
        assert_eq!(eval("0 || 'fallback';"), Value::String("fallback".into()));
    }

    #[test]
    fn test_functions_and_closures() {
        assert_eq!(
            eval("function add(a, b) { return a + b; } add(40, 3);"),
            Value::Number(43.0)
        );
        assert_eq!(
            eval(
                "function counter() { var n = 0; return function () { n = n + 1; return n; }; } \
                 var next = counter(); next(); next();"
            ),
            Value::Number(2.0)
        );
    }

    #[test]
    fn test_objects_and_arrays() {
        assert_eq!(eval("var o = { a: 1 }; o.b = 2; o.a + o.b;"), Value::Number(3.0));
        assert_eq!(eval("var a = [1, 2, 3]; a[0] + a.length;"), Value::Number(4.0));
        assert_eq!(eval("var o = {}; o['k'] = 7; o.k;"), Value::Number(7.0));
    }

    #[test]
    fn test_typeof() {
        assert_eq!(eval("typeof 1;"), Value::String("number".into()));
        assert_eq!(eval("typeof 'x';"), Value::String("string".into()));
        assert_eq!(
            eval("typeof function () {};"),
            Value::String("function".into())
        );
    }

    #[test]
    fn test_reference_error() {
        let err = Engine::new().eval("missing;").unwrap_err();
        assert!(matches!(err, Error::ReferenceError(_)));
    }

    #[test]
    fn test_call_non_function_is_type_error() {
        let err = Engine::new().eval("var x = 1; x();").unwrap_err();
        assert!(matches!(err, Error::TypeError(_)));
    }
}
