//! Code generation from AST to bytecode.

use std::rc::Rc;

use crate::Error;
use crate::ast::{BinaryOp, Expr, LogicalOp, Program, Stmt, UnaryOp};
use crate::compiler::bytecode::{Chunk, Const, FunctionProto, OpCode};

/// Compiles an AST into bytecode chunks.
#[derive(Default)]
pub struct Compiler {
    chunk: Chunk,
}

impl Compiler {
    /// Creates a new compiler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Compiles a top-level program into a script chunk.
    ///
    /// The chunk ends with `Halt`; the completion slot carries the value of
    /// the last expression statement, matching eval semantics.
    pub fn compile(mut self, program: &Program) -> Result<Chunk, Error> {
        for stmt in &program.body {
            self.statement(stmt, true)?;
        }
        self.chunk.emit(OpCode::Halt, 0);
        Ok(self.chunk)
    }

    fn compile_function(
        name: Option<String>,
        params: &[String],
        body: &[Stmt],
    ) -> Result<FunctionProto, Error> {
        let mut inner = Compiler::new();
        for stmt in body {
            inner.statement(stmt, false)?;
        }
        // Implicit `return undefined` for bodies that fall off the end
        inner.chunk.emit(OpCode::LoadUndefined, 0);
        inner.chunk.emit(OpCode::Return, 0);
        Ok(FunctionProto {
            name,
            params: params.to_vec(),
            chunk: inner.chunk,
        })
    }

    fn statement(&mut self, stmt: &Stmt, top_level: bool) -> Result<(), Error> {
        match stmt {
            Stmt::Empty => {}
            Stmt::Expr(expr) => {
                self.expression(expr)?;
                // At the top level the value feeds the completion slot;
                // inside a function it is discarded.
                if top_level {
                    self.chunk.emit(OpCode::StoreCompletion, 0);
                } else {
                    self.chunk.emit(OpCode::Pop, 0);
                }
            }
            Stmt::VarDecl { name, init } => {
                match init {
                    Some(expr) => self.expression(expr)?,
                    None => {
                        self.chunk.emit(OpCode::LoadUndefined, 0);
                    }
                }
                let idx = self.name_const(name);
                self.chunk.emit(OpCode::DeclareName, idx);
            }
            Stmt::FunctionDecl { name, params, body } => {
                let proto = Self::compile_function(Some(name.clone()), params, body)?;
                let idx = self.chunk.add_const(Const::Function(Rc::new(proto)));
                self.chunk.emit(OpCode::Closure, idx);
                let name_idx = self.name_const(name);
                self.chunk.emit(OpCode::DeclareName, name_idx);
            }
            Stmt::Return(value) => {
                match value {
                    Some(expr) => self.expression(expr)?,
                    None => {
                        self.chunk.emit(OpCode::LoadUndefined, 0);
                    }
                }
                self.chunk.emit(OpCode::Return, 0);
            }
            Stmt::If {
                test,
                consequent,
                alternate,
            } => {
                self.expression(test)?;
                let to_else = self.chunk.emit(OpCode::JumpIfFalse, 0);
                for stmt in consequent {
                    self.statement(stmt, top_level)?;
                }
                match alternate {
                    Some(alternate) => {
                        let to_end = self.chunk.emit(OpCode::Jump, 0);
                        let else_at = self.chunk.code.len();
                        self.chunk.patch_jump(to_else, else_at);
                        for stmt in alternate {
                            self.statement(stmt, top_level)?;
                        }
                        let end = self.chunk.code.len();
                        self.chunk.patch_jump(to_end, end);
                    }
                    None => {
                        let end = self.chunk.code.len();
                        self.chunk.patch_jump(to_else, end);
                    }
                }
            }
            Stmt::While { test, body } => {
                let loop_start = self.chunk.code.len();
                self.expression(test)?;
                let to_end = self.chunk.emit(OpCode::JumpIfFalse, 0);
                for stmt in body {
                    self.statement(stmt, top_level)?;
                }
                self.chunk.emit(OpCode::Jump, loop_start as u32);
                let end = self.chunk.code.len();
                self.chunk.patch_jump(to_end, end);
            }
        }
        Ok(())
    }

    fn expression(&mut self, expr: &Expr) -> Result<(), Error> {
        match expr {
            Expr::Number(n) => {
                let idx = self.chunk.add_const(Const::Number(*n));
                self.chunk.emit(OpCode::LoadConst, idx);
            }
            Expr::String(s) => {
                let idx = self.chunk.add_const(Const::String(s.clone()));
                self.chunk.emit(OpCode::LoadConst, idx);
            }
            Expr::Boolean(true) => {
                self.chunk.emit(OpCode::LoadTrue, 0);
            }
            Expr::Boolean(false) => {
                self.chunk.emit(OpCode::LoadFalse, 0);
            }
            Expr::Null => {
                self.chunk.emit(OpCode::LoadNull, 0);
            }
            Expr::Identifier(name) if name == "undefined" => {
                self.chunk.emit(OpCode::LoadUndefined, 0);
            }
            Expr::Identifier(name) => {
                let idx = self.name_const(name);
                self.chunk.emit(OpCode::LoadName, idx);
            }
            Expr::Object(props) => {
                self.chunk.emit(OpCode::NewObject, 0);
                for (key, value) in props {
                    self.expression(value)?;
                    let idx = self.name_const(key);
                    self.chunk.emit(OpCode::InitProperty, idx);
                }
            }
            Expr::Array(elements) => {
                for element in elements {
                    self.expression(element)?;
                }
                self.chunk.emit(OpCode::NewArray, elements.len() as u32);
            }
            Expr::Member { object, property } => {
                self.expression(object)?;
                let idx = self.name_const(property);
                self.chunk.emit(OpCode::GetProperty, idx);
            }
            Expr::Index { object, index } => {
                self.expression(object)?;
                self.expression(index)?;
                self.chunk.emit(OpCode::GetIndex, 0);
            }
            Expr::Call { callee, args } => {
                self.expression(callee)?;
                for arg in args {
                    self.expression(arg)?;
                }
                self.chunk.emit(OpCode::Call, args.len() as u32);
            }
            Expr::Assign { target, value } => match target.as_ref() {
                Expr::Identifier(name) => {
                    self.expression(value)?;
                    let idx = self.name_const(name);
                    self.chunk.emit(OpCode::StoreName, idx);
                }
                Expr::Member { object, property } => {
                    self.expression(object)?;
                    self.expression(value)?;
                    let idx = self.name_const(property);
                    self.chunk.emit(OpCode::SetProperty, idx);
                }
                Expr::Index { object, index } => {
                    self.expression(object)?;
                    self.expression(index)?;
                    self.expression(value)?;
                    self.chunk.emit(OpCode::SetIndex, 0);
                }
                _ => {
                    return Err(Error::SyntaxError("invalid assignment target".into()));
                }
            },
            Expr::Binary { op, left, right } => {
                self.expression(left)?;
                self.expression(right)?;
                let opcode = match op {
                    BinaryOp::Add => OpCode::Add,
                    BinaryOp::Sub => OpCode::Sub,
                    BinaryOp::Mul => OpCode::Mul,
                    BinaryOp::Div => OpCode::Div,
                    BinaryOp::Mod => OpCode::Mod,
                    BinaryOp::Eq => OpCode::Eq,
                    BinaryOp::Ne => OpCode::Ne,
                    BinaryOp::StrictEq => OpCode::StrictEq,
                    BinaryOp::StrictNe => OpCode::StrictNe,
                    BinaryOp::Lt => OpCode::Lt,
                    BinaryOp::Le => OpCode::Le,
                    BinaryOp::Gt => OpCode::Gt,
                    BinaryOp::Ge => OpCode::Ge,
                };
                self.chunk.emit(opcode, 0);
            }
            Expr::Logical { op, left, right } => {
                self.expression(left)?;
                let short = match op {
                    LogicalOp::And => self.chunk.emit(OpCode::JumpIfFalseKeep, 0),
                    LogicalOp::Or => self.chunk.emit(OpCode::JumpIfTrueKeep, 0),
                };
                self.chunk.emit(OpCode::Pop, 0);
                self.expression(right)?;
                let end = self.chunk.code.len();
                self.chunk.patch_jump(short, end);
            }
            Expr::Unary { op, operand } => {
                self.expression(operand)?;
                let opcode = match op {
                    UnaryOp::Neg => OpCode::Neg,
                    UnaryOp::Not => OpCode::Not,
                    UnaryOp::TypeOf => OpCode::TypeOf,
                };
                self.chunk.emit(opcode, 0);
            }
            Expr::Function { name, params, body } => {
                let proto = Self::compile_function(name.clone(), params, body)?;
                let idx = self.chunk.add_const(Const::Function(Rc::new(proto)));
                self.chunk.emit(OpCode::Closure, idx);
            }
        }
        Ok(())
    }

    fn name_const(&mut self, name: &str) -> u32 {
        self.chunk.add_const(Const::String(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;

    fn compile_source(src: &str) -> Result<Chunk, Error> {
        let program = Parser::new(src).parse_program()?;
        Compiler::new().compile(&program)
    }

    fn compile_ok(src: &str) -> Chunk {
        compile_source(src).expect("compilation should succeed")
    }

    #[test]
    fn test_compile_empty_program() {
        let chunk = compile_ok("");
        assert_eq!(chunk.code.len(), 1);
        assert_eq!(chunk.code[0].op, OpCode::Halt);
    }

    #[test]
    fn test_compile_number_literal() {
        let chunk = compile_ok("42;");
        assert_eq!(chunk.code[0].op, OpCode::LoadConst);
        assert_eq!(chunk.code[1].op, OpCode::StoreCompletion);
    }

    #[test]
    fn test_compile_binary_ops() {
        compile_ok("1 + 2;");
        compile_ok("5 - 3;");
        compile_ok("2 * 3 / 4 % 5;");
        compile_ok("1 < 2;");
        compile_ok("1 === 2;");
    }

    #[test]
    fn test_compile_variables() {
        let chunk = compile_ok("var x = 1; x;");
        assert!(chunk.code.iter().any(|i| i.op == OpCode::DeclareName));
        assert!(chunk.code.iter().any(|i| i.op == OpCode::LoadName));
    }

    #[test]
    fn test_compile_function_nesting() {
        let chunk = compile_ok("function f(a) { return a + 1; }");
        let nested = chunk
            .consts
            .iter()
            .any(|c| matches!(c, Const::Function(_)));
        assert!(nested);
    }

    #[test]
    fn test_compile_const_pool_dedup() {
        let chunk = compile_ok("x = x + x;");
        let names = chunk
            .consts
            .iter()
            .filter(|c| matches!(c, Const::String(s) if s == "x"))
            .count();
        assert_eq!(names, 1);
    }

    #[test]
    fn test_compile_if_patches_jumps() {
        let chunk = compile_ok("if (true) { 1; } else { 2; }");
        for instr in &chunk.code {
            if matches!(instr.op, OpCode::Jump | OpCode::JumpIfFalse) {
                assert!((instr.operand as usize) <= chunk.code.len());
            }
        }
    }

    #[test]
    fn test_compile_logical_short_circuit() {
        let chunk = compile_ok("true && false;");
        assert!(chunk.code.iter().any(|i| i.op == OpCode::JumpIfFalseKeep));
    }
}
