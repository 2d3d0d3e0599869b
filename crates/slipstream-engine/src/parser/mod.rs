//! Recursive-descent parser for the supported JavaScript subset.

use crate::Error;
use crate::ast::{BinaryOp, Expr, LogicalOp, Program, Stmt, UnaryOp};
use crate::lexer::{Scanner, Token, TokenKind};

/// A parser that turns source text into an AST.
pub struct Parser<'a> {
    scanner: Scanner<'a>,
    current: Token,
}

impl<'a> Parser<'a> {
    /// Creates a new parser for the given source code.
    pub fn new(source: &'a str) -> Self {
        let mut scanner = Scanner::new(source);
        let current = scanner.next_token();
        Self { scanner, current }
    }

    /// Parses a full program.
    pub fn parse_program(&mut self) -> Result<Program, Error> {
        let mut body = Vec::new();
        while self.current.kind != TokenKind::Eof {
            body.push(self.parse_statement()?);
        }
        Ok(Program { body })
    }

    fn advance(&mut self) -> Token {
        let next = self.scanner.next_token();
        std::mem::replace(&mut self.current, next)
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if &self.current.kind == kind {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, context: &str) -> Result<(), Error> {
        if self.current.kind == kind {
            self.advance();
            Ok(())
        } else {
            Err(Error::SyntaxError(format!(
                "expected {:?} {}, found {:?}",
                kind, context, self.current.kind
            )))
        }
    }

    fn expect_identifier(&mut self, context: &str) -> Result<String, Error> {
        match self.advance().kind {
            TokenKind::Identifier(name) => Ok(name),
            other => Err(Error::SyntaxError(format!(
                "expected identifier {}, found {:?}",
                context, other
            ))),
        }
    }

    /// Consumes an optional trailing semicolon.
    fn eat_semicolon(&mut self) {
        self.eat(&TokenKind::Semicolon);
    }

    fn parse_statement(&mut self) -> Result<Stmt, Error> {
        match &self.current.kind {
            TokenKind::Var | TokenKind::Let | TokenKind::Const => self.parse_var_decl(),
            TokenKind::Function => self.parse_function_decl(),
            TokenKind::Return => {
                self.advance();
                let value = if matches!(
                    self.current.kind,
                    TokenKind::Semicolon | TokenKind::RightBrace | TokenKind::Eof
                ) {
                    None
                } else {
                    Some(self.parse_expression()?)
                };
                self.eat_semicolon();
                Ok(Stmt::Return(value))
            }
            TokenKind::If => self.parse_if(),
            TokenKind::While => self.parse_while(),
            TokenKind::Semicolon => {
                self.advance();
                Ok(Stmt::Empty)
            }
            _ => {
                let expr = self.parse_expression()?;
                self.eat_semicolon();
                Ok(Stmt::Expr(expr))
            }
        }
    }

    fn parse_var_decl(&mut self) -> Result<Stmt, Error> {
        self.advance();
        let name = self.expect_identifier("in variable declaration")?;
        let init = if self.eat(&TokenKind::Assign) {
            Some(self.parse_expression()?)
        } else {
            None
        };
        self.eat_semicolon();
        Ok(Stmt::VarDecl { name, init })
    }

    fn parse_function_decl(&mut self) -> Result<Stmt, Error> {
        self.advance();
        let name = self.expect_identifier("after 'function'")?;
        let params = self.parse_params()?;
        let body = self.parse_block()?;
        Ok(Stmt::FunctionDecl { name, params, body })
    }

    fn parse_if(&mut self) -> Result<Stmt, Error> {
        self.advance();
        self.expect(TokenKind::LeftParen, "after 'if'")?;
        let test = self.parse_expression()?;
        self.expect(TokenKind::RightParen, "after condition")?;
        let consequent = self.parse_branch()?;
        let alternate = if self.eat(&TokenKind::Else) {
            if self.current.kind == TokenKind::If {
                Some(vec![self.parse_if()?])
            } else {
                Some(self.parse_branch()?)
            }
        } else {
            None
        };
        Ok(Stmt::If {
            test,
            consequent,
            alternate,
        })
    }

    fn parse_while(&mut self) -> Result<Stmt, Error> {
        self.advance();
        self.expect(TokenKind::LeftParen, "after 'while'")?;
        let test = self.parse_expression()?;
        self.expect(TokenKind::RightParen, "after condition")?;
        let body = self.parse_branch()?;
        Ok(Stmt::While { test, body })
    }

    /// A branch is either a block or a single statement.
    fn parse_branch(&mut self) -> Result<Vec<Stmt>, Error> {
        if self.current.kind == TokenKind::LeftBrace {
            self.parse_block()
        } else {
            Ok(vec![self.parse_statement()?])
        }
    }

    fn parse_block(&mut self) -> Result<Vec<Stmt>, Error> {
        self.expect(TokenKind::LeftBrace, "to open block")?;
        let mut body = Vec::new();
        while self.current.kind != TokenKind::RightBrace {
            if self.current.kind == TokenKind::Eof {
                return Err(Error::SyntaxError("unexpected end of input in block".into()));
            }
            body.push(self.parse_statement()?);
        }
        self.advance();
        Ok(body)
    }

    fn parse_params(&mut self) -> Result<Vec<String>, Error> {
        self.expect(TokenKind::LeftParen, "to open parameter list")?;
        let mut params = Vec::new();
        if self.current.kind != TokenKind::RightParen {
            loop {
                params.push(self.expect_identifier("in parameter list")?);
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RightParen, "to close parameter list")?;
        Ok(params)
    }

    /// Expressions, lowest precedence first: assignment.
    pub fn parse_expression(&mut self) -> Result<Expr, Error> {
        let left = self.parse_logical_or()?;
        if self.eat(&TokenKind::Assign) {
            match left {
                Expr::Identifier(_) | Expr::Member { .. } | Expr::Index { .. } => {
                    let value = self.parse_expression()?;
                    Ok(Expr::Assign {
                        target: Box::new(left),
                        value: Box::new(value),
                    })
                }
                _ => Err(Error::SyntaxError("invalid assignment target".into())),
            }
        } else {
            Ok(left)
        }
    }

    fn parse_logical_or(&mut self) -> Result<Expr, Error> {
        let mut left = self.parse_logical_and()?;
        while self.eat(&TokenKind::PipePipe) {
            let right = self.parse_logical_and()?;
            left = Expr::Logical {
                op: LogicalOp::Or,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_logical_and(&mut self) -> Result<Expr, Error> {
        let mut left = self.parse_equality()?;
        while self.eat(&TokenKind::AmpAmp) {
            let right = self.parse_equality()?;
            left = Expr::Logical {
                op: LogicalOp::And,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> Result<Expr, Error> {
        let mut left = self.parse_relational()?;
        loop {
            let op = match self.current.kind {
                TokenKind::Eq => BinaryOp::Eq,
                TokenKind::NotEq => BinaryOp::Ne,
                TokenKind::StrictEq => BinaryOp::StrictEq,
                TokenKind::StrictNotEq => BinaryOp::StrictNe,
                _ => break,
            };
            self.advance();
            let right = self.parse_relational()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_relational(&mut self) -> Result<Expr, Error> {
        let mut left = self.parse_additive()?;
        loop {
            let op = match self.current.kind {
                TokenKind::Less => BinaryOp::Lt,
                TokenKind::LessEq => BinaryOp::Le,
                TokenKind::Greater => BinaryOp::Gt,
                TokenKind::GreaterEq => BinaryOp::Ge,
                _ => break,
            };
            self.advance();
            let right = self.parse_additive()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> Result<Expr, Error> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.current.kind {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, Error> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.current.kind {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::Percent => BinaryOp::Mod,
                _ => break,
            };
            self.advance();
            let right = self.parse_unary()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, Error> {
        let op = match self.current.kind {
            TokenKind::Minus => UnaryOp::Neg,
            TokenKind::Bang => UnaryOp::Not,
            TokenKind::Typeof => UnaryOp::TypeOf,
            _ => return self.parse_postfix(),
        };
        self.advance();
        let operand = self.parse_unary()?;
        Ok(Expr::Unary {
            op,
            operand: Box::new(operand),
        })
    }

    /// Member access, indexing and calls, left to right.
    fn parse_postfix(&mut self) -> Result<Expr, Error> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.eat(&TokenKind::Dot) {
                let property = self.expect_identifier("after '.'")?;
                expr = Expr::Member {
                    object: Box::new(expr),
                    property,
                };
            } else if self.eat(&TokenKind::LeftBracket) {
                let index = self.parse_expression()?;
                self.expect(TokenKind::RightBracket, "to close index")?;
                expr = Expr::Index {
                    object: Box::new(expr),
                    index: Box::new(index),
                };
            } else if self.eat(&TokenKind::LeftParen) {
                let mut args = Vec::new();
                if self.current.kind != TokenKind::RightParen {
                    loop {
                        args.push(self.parse_expression()?);
                        if !self.eat(&TokenKind::Comma) {
                            break;
                        }
                    }
                }
                self.expect(TokenKind::RightParen, "to close arguments")?;
                expr = Expr::Call {
                    callee: Box::new(expr),
                    args,
                };
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expr, Error> {
        match self.advance().kind {
            TokenKind::Number(n) => Ok(Expr::Number(n)),
            TokenKind::String(s) => Ok(Expr::String(s)),
            TokenKind::True => Ok(Expr::Boolean(true)),
            TokenKind::False => Ok(Expr::Boolean(false)),
            TokenKind::Null => Ok(Expr::Null),
            TokenKind::Identifier(name) => Ok(Expr::Identifier(name)),
            TokenKind::LeftParen => {
                let expr = self.parse_expression()?;
                self.expect(TokenKind::RightParen, "to close grouping")?;
                Ok(expr)
            }
            TokenKind::LeftBrace => self.parse_object_literal(),
            TokenKind::LeftBracket => self.parse_array_literal(),
            TokenKind::Function => {
                let name = match &self.current.kind {
                    TokenKind::Identifier(n) => {
                        let n = n.clone();
                        self.advance();
                        Some(n)
                    }
                    _ => None,
                };
                let params = self.parse_params()?;
                let body = self.parse_block()?;
                Ok(Expr::Function { name, params, body })
            }
            other => Err(Error::SyntaxError(format!(
                "unexpected token {:?} in expression",
                other
            ))),
        }
    }

    fn parse_object_literal(&mut self) -> Result<Expr, Error> {
        let mut props = Vec::new();
        if self.current.kind != TokenKind::RightBrace {
            loop {
                let key = match self.advance().kind {
                    TokenKind::Identifier(name) => name,
                    TokenKind::String(s) => s,
                    TokenKind::Number(n) => crate::runtime::number_to_string(n),
                    other => {
                        return Err(Error::SyntaxError(format!(
                            "invalid object key {:?}",
                            other
                        )));
                    }
                };
                self.expect(TokenKind::Colon, "after object key")?;
                let value = self.parse_expression()?;
                props.push((key, value));
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
                // Trailing comma
                if self.current.kind == TokenKind::RightBrace {
                    break;
                }
            }
        }
        self.expect(TokenKind::RightBrace, "to close object literal")?;
        Ok(Expr::Object(props))
    }

    fn parse_array_literal(&mut self) -> Result<Expr, Error> {
        let mut elements = Vec::new();
        if self.current.kind != TokenKind::RightBracket {
            loop {
                elements.push(self.parse_expression()?);
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
                if self.current.kind == TokenKind::RightBracket {
                    break;
                }
            }
        }
        self.expect(TokenKind::RightBracket, "to close array literal")?;
        Ok(Expr::Array(elements))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(src: &str) -> Program {
        Parser::new(src)
            .parse_program()
            .expect("source should parse")
    }

    #[test]
    fn test_parse_expression_statement() {
        let program = parse_ok("1 + 2 * 3;");
        assert_eq!(program.body.len(), 1);
    }

    #[test]
    fn test_parse_var_and_assignment() {
        parse_ok("var x = 1; x = x + 1;");
        parse_ok("let y = 'a'; const z = y;");
    }

    #[test]
    fn test_parse_member_and_call() {
        parse_ok("console.log('hi');");
        parse_ok("module.exports = require('./dep');");
        parse_ok("obj['key'] = 1;");
    }

    #[test]
    fn test_parse_function_forms() {
        parse_ok("function add(a, b) { return a + b; }");
        parse_ok("(function (exports, require, module, __filename, __dirname) { 1; });");
        parse_ok("var f = function named() { return 1; };");
    }

    #[test]
    fn test_parse_control_flow() {
        parse_ok("if (x) { 1; } else if (y) { 2; } else { 3; }");
        parse_ok("while (i < 10) { i = i + 1; }");
    }

    #[test]
    fn test_parse_literals() {
        parse_ok("({ a: 1, 'b': 2, 3: 'c' });");
        parse_ok("[1, 'two', [3]];");
    }

    #[test]
    fn test_parse_error_reports_syntax_error() {
        let err = Parser::new("var = 1;").parse_program().unwrap_err();
        assert!(matches!(err, Error::SyntaxError(_)));
    }
}
