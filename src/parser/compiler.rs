//! JavaScript compiler
//!
//! Turns source text into a [`Program`] in a single recursive-descent pass.
//! Declarations are collected while parsing so the interpreter can hoist
//! `var` names and function declarations without walking the tree again.

use std::sync::Arc;

use thiserror::Error;

use super::ast::*;
use super::lexer::{Lexer, SourcePos, Token};
use crate::runtime::JSString;
use crate::util::dtoa::number_to_string;

/// Nesting limit for statements and expressions
const MAX_NESTING: usize = 400;

/// Compilation error
#[derive(Debug, Clone, Error, PartialEq)]
#[error("SyntaxError: {message}")]
pub struct CompileError {
    pub message: String,
    pub line: usize,
    pub column: usize,
}

/// Declarations gathered for the function currently being parsed
#[derive(Default)]
struct FunctionScope {
    var_names: Vec<JSString>,
    functions: Vec<Arc<FunctionNode>>,
    uses_arguments: bool,
    is_arrow: bool,
}

/// Parser state that can be restored after a failed lookahead
#[derive(Clone)]
struct Checkpoint<'a> {
    lexer: Lexer<'a>,
    token: Token,
    token_pos: SourcePos,
    newline_before: bool,
    prev_end: usize,
}

enum BinaryKind {
    Binary(BinaryOp),
    Logical(LogicalOp),
}

/// Compiler state
pub struct Compiler<'a> {
    lexer: Lexer<'a>,
    current_token: Token,
    token_pos: SourcePos,
    newline_before: bool,
    /// Byte offset just past the previous token
    prev_end: usize,
    scopes: Vec<FunctionScope>,
    function_depth: usize,
    nesting: usize,
}

impl<'a> Compiler<'a> {
    /// Create a new compiler for the given source
    pub fn new(source: &'a str) -> Self {
        let mut lexer = Lexer::new(source);
        let current_token = lexer.next_token();
        let token_pos = lexer.token_start();
        let newline_before = lexer.newline_before();

        Compiler {
            lexer,
            current_token,
            token_pos,
            newline_before,
            prev_end: 0,
            scopes: Vec::new(),
            function_depth: 0,
            nesting: 0,
        }
    }

    /// Compile the source into a program
    pub fn compile(mut self) -> Result<Program, CompileError> {
        self.check_error_token()?;
        self.scopes.push(FunctionScope::default());

        let mut body = Vec::new();
        while self.current_token != Token::Eof {
            body.push(self.parse_statement()?);
        }

        let scope = self.scopes.pop().unwrap_or_default();
        Ok(Program {
            body,
            var_names: scope.var_names,
            functions: scope.functions,
        })
    }

    // =========================================================================
    // Token helpers
    // =========================================================================

    /// Advance to the next token
    fn advance(&mut self) -> Result<(), CompileError> {
        self.prev_end = self.lexer.position().offset;
        self.current_token = self.lexer.next_token();
        self.token_pos = self.lexer.token_start();
        self.newline_before = self.lexer.newline_before();
        self.check_error_token()
    }

    fn check_error_token(&self) -> Result<(), CompileError> {
        match &self.current_token {
            Token::Error(msg) => Err(self.error_at(self.token_pos, msg.clone())),
            _ => Ok(()),
        }
    }

    /// Check if current token matches expected
    fn check(&self, expected: &Token) -> bool {
        std::mem::discriminant(&self.current_token) == std::mem::discriminant(expected)
    }

    /// Expect a specific token, advance if matched
    fn expect(&mut self, expected: Token) -> Result<(), CompileError> {
        if self.check(&expected) {
            self.advance()
        } else {
            Err(self.unexpected())
        }
    }

    fn eat(&mut self, token: Token) -> Result<bool, CompileError> {
        if self.check(&token) {
            self.advance()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn peek_token(&self) -> Token {
        let mut lexer = self.lexer.clone();
        lexer.next_token()
    }

    fn checkpoint(&self) -> Checkpoint<'a> {
        Checkpoint {
            lexer: self.lexer.clone(),
            token: self.current_token.clone(),
            token_pos: self.token_pos,
            newline_before: self.newline_before,
            prev_end: self.prev_end,
        }
    }

    fn restore(&mut self, checkpoint: Checkpoint<'a>) {
        self.lexer = checkpoint.lexer;
        self.current_token = checkpoint.token;
        self.token_pos = checkpoint.token_pos;
        self.newline_before = checkpoint.newline_before;
        self.prev_end = checkpoint.prev_end;
    }

    fn error_at(&self, pos: SourcePos, message: impl Into<String>) -> CompileError {
        CompileError {
            message: message.into(),
            line: pos.line,
            column: pos.column,
        }
    }

    fn unexpected(&self) -> CompileError {
        let message = match &self.current_token {
            Token::Eof => "Unexpected end of input".to_string(),
            Token::Error(msg) => msg.clone(),
            Token::String(_) => "Unexpected string".to_string(),
            Token::Number(_) => "Unexpected number".to_string(),
            Token::Ident(name) => format!("Unexpected identifier '{}'", name),
            other => format!("Unexpected token '{}'", other.describe()),
        };
        self.error_at(self.token_pos, message)
    }

    /// Automatic semicolon insertion
    fn consume_semicolon(&mut self) -> Result<(), CompileError> {
        match self.current_token {
            Token::Semicolon => self.advance(),
            Token::RBrace | Token::Eof => Ok(()),
            _ if self.newline_before => Ok(()),
            _ => Err(self.unexpected()),
        }
    }

    fn expect_ident(&mut self) -> Result<JSString, CompileError> {
        match &self.current_token {
            Token::Ident(name) => {
                let name = JSString::from(name.as_str());
                self.advance()?;
                Ok(name)
            }
            _ => Err(self.unexpected()),
        }
    }

    fn enter_nested(&mut self) -> Result<(), CompileError> {
        self.nesting += 1;
        if self.nesting > MAX_NESTING {
            return Err(self.error_at(self.token_pos, "Maximum nesting depth exceeded"));
        }
        Ok(())
    }

    fn declare_var(&mut self, name: &JSString) {
        if let Some(scope) = self.scopes.last_mut()
            && !scope.var_names.contains(name)
        {
            scope.var_names.push(name.clone());
        }
    }

    fn mark_uses_arguments(&mut self) {
        if let Some(scope) = self.scopes.iter_mut().rev().find(|s| !s.is_arrow) {
            scope.uses_arguments = true;
        }
    }

    // =========================================================================
    // Statements
    // =========================================================================

    fn parse_statement(&mut self) -> Result<Stmt, CompileError> {
        self.enter_nested()?;
        let pos = self.token_pos;
        let kind = self.parse_statement_kind();
        self.nesting -= 1;
        Ok(Stmt {
            kind: kind?,
            line: pos.line as u32,
            column: pos.column as u32,
        })
    }

    fn parse_statement_kind(&mut self) -> Result<StmtKind, CompileError> {
        match &self.current_token {
            Token::LBrace => {
                let body = self.parse_block()?;
                let scoped = body
                    .iter()
                    .any(|s| matches!(s.kind, StmtKind::VarDecl(VarKind::Let | VarKind::Const, _)));
                Ok(StmtKind::Block { body, scoped })
            }
            Token::Var | Token::Let | Token::Const => {
                let kind = match self.current_token {
                    Token::Var => VarKind::Var,
                    Token::Let => VarKind::Let,
                    _ => VarKind::Const,
                };
                self.advance()?;
                let decls = self.parse_var_declarations(kind, false)?;
                self.consume_semicolon()?;
                Ok(StmtKind::VarDecl(kind, decls))
            }
            Token::Function => {
                let start = self.token_pos;
                self.advance()?;
                let name = self.expect_ident()?;
                let node = self.parse_function_rest(Some(name.clone()), false, start)?;
                self.declare_var(&name);
                if let Some(scope) = self.scopes.last_mut() {
                    scope.functions.push(node);
                }
                Ok(StmtKind::FunctionDecl(name))
            }
            Token::If => {
                self.advance()?;
                self.expect(Token::LParen)?;
                let test = self.parse_expression(false)?;
                self.expect(Token::RParen)?;
                let consequent = Box::new(self.parse_statement()?);
                let alternate = if self.eat(Token::Else)? {
                    Some(Box::new(self.parse_statement()?))
                } else {
                    None
                };
                Ok(StmtKind::If { test, consequent, alternate })
            }
            Token::For => self.parse_for(),
            Token::While => {
                self.advance()?;
                self.expect(Token::LParen)?;
                let test = self.parse_expression(false)?;
                self.expect(Token::RParen)?;
                let body = Box::new(self.parse_statement()?);
                Ok(StmtKind::While { test, body })
            }
            Token::Do => {
                self.advance()?;
                let body = Box::new(self.parse_statement()?);
                self.expect(Token::While)?;
                self.expect(Token::LParen)?;
                let test = self.parse_expression(false)?;
                self.expect(Token::RParen)?;
                self.eat(Token::Semicolon)?;
                Ok(StmtKind::DoWhile { body, test })
            }
            Token::Return => {
                if self.function_depth == 0 {
                    return Err(self.error_at(self.token_pos, "Illegal return statement"));
                }
                self.advance()?;
                let value = if matches!(self.current_token, Token::Semicolon | Token::RBrace | Token::Eof)
                    || self.newline_before
                {
                    None
                } else {
                    Some(self.parse_expression(false)?)
                };
                self.consume_semicolon()?;
                Ok(StmtKind::Return(value))
            }
            Token::Break | Token::Continue => {
                let is_break = self.check(&Token::Break);
                self.advance()?;
                let label = match &self.current_token {
                    Token::Ident(name) if !self.newline_before => {
                        let label = JSString::from(name.as_str());
                        self.advance()?;
                        Some(label)
                    }
                    _ => None,
                };
                self.consume_semicolon()?;
                Ok(if is_break { StmtKind::Break(label) } else { StmtKind::Continue(label) })
            }
            Token::Throw => {
                self.advance()?;
                if self.newline_before {
                    return Err(self.error_at(self.token_pos, "Illegal newline after throw"));
                }
                let value = self.parse_expression(false)?;
                self.consume_semicolon()?;
                Ok(StmtKind::Throw(value))
            }
            Token::Try => self.parse_try(),
            Token::Switch => self.parse_switch(),
            Token::Semicolon => {
                self.advance()?;
                Ok(StmtKind::Empty)
            }
            Token::Debugger => {
                self.advance()?;
                self.consume_semicolon()?;
                Ok(StmtKind::Debugger)
            }
            Token::Ident(_) if self.peek_token() == Token::Colon => {
                let label = self.expect_ident()?;
                self.expect(Token::Colon)?;
                let body = Box::new(self.parse_statement()?);
                Ok(StmtKind::Labeled { label, body })
            }
            _ => {
                let expr = self.parse_expression(false)?;
                self.consume_semicolon()?;
                Ok(StmtKind::Expr(expr))
            }
        }
    }

    fn parse_block(&mut self) -> Result<Vec<Stmt>, CompileError> {
        self.expect(Token::LBrace)?;
        let mut body = Vec::new();
        while !self.check(&Token::RBrace) {
            if self.current_token == Token::Eof {
                return Err(self.unexpected());
            }
            body.push(self.parse_statement()?);
        }
        self.advance()?;
        Ok(body)
    }

    fn parse_var_declarations(
        &mut self,
        kind: VarKind,
        no_in: bool,
    ) -> Result<Vec<VarDeclarator>, CompileError> {
        let mut decls = Vec::new();
        loop {
            let name_pos = self.token_pos;
            let name = self.expect_ident()?;
            if kind == VarKind::Var {
                self.declare_var(&name);
            }
            let init = if self.eat(Token::Eq)? {
                Some(self.parse_assignment(no_in)?)
            } else {
                if kind == VarKind::Const {
                    return Err(self.error_at(name_pos, "Missing initializer in const declaration"));
                }
                None
            };
            decls.push(VarDeclarator { name, init });
            if !self.eat(Token::Comma)? {
                break;
            }
        }
        Ok(decls)
    }

    fn is_of_keyword(&self) -> bool {
        matches!(&self.current_token, Token::Ident(name) if name == "of")
    }

    fn parse_for(&mut self) -> Result<StmtKind, CompileError> {
        self.advance()?;
        self.expect(Token::LParen)?;

        let mut init = None;
        if !self.check(&Token::Semicolon) {
            if matches!(self.current_token, Token::Var | Token::Let | Token::Const) {
                let kind = match self.current_token {
                    Token::Var => VarKind::Var,
                    Token::Let => VarKind::Let,
                    _ => VarKind::Const,
                };
                self.advance()?;
                let next = self.peek_token();
                let is_each = matches!(self.current_token, Token::Ident(_))
                    && (next == Token::In || next == Token::Ident("of".to_string()));
                if is_each {
                    let name = self.expect_ident()?;
                    if kind == VarKind::Var {
                        self.declare_var(&name);
                    }
                    return self.parse_for_each(ForBinding::Decl(kind, name));
                }
                init = Some(ForInit::Var(kind, self.parse_var_declarations(kind, true)?));
            } else {
                let expr = self.parse_expression(true)?;
                if self.check(&Token::In) || self.is_of_keyword() {
                    if !matches!(expr, Expr::Ident(_) | Expr::Member(..)) {
                        return Err(self.error_at(self.token_pos, "Invalid left-hand side in for-loop"));
                    }
                    return self.parse_for_each(ForBinding::Target(expr));
                }
                init = Some(ForInit::Expr(expr));
            }
        }

        self.expect(Token::Semicolon)?;
        let test = if self.check(&Token::Semicolon) {
            None
        } else {
            Some(self.parse_expression(false)?)
        };
        self.expect(Token::Semicolon)?;
        let update = if self.check(&Token::RParen) {
            None
        } else {
            Some(self.parse_expression(false)?)
        };
        self.expect(Token::RParen)?;
        let body = Box::new(self.parse_statement()?);
        Ok(StmtKind::For { init, test, update, body })
    }

    fn parse_for_each(&mut self, binding: ForBinding) -> Result<StmtKind, CompileError> {
        let is_of = self.is_of_keyword();
        self.advance()?;
        let subject = if is_of {
            self.parse_assignment(false)?
        } else {
            self.parse_expression(false)?
        };
        self.expect(Token::RParen)?;
        let body = Box::new(self.parse_statement()?);
        Ok(if is_of {
            StmtKind::ForOf { binding, iterable: subject, body }
        } else {
            StmtKind::ForIn { binding, object: subject, body }
        })
    }

    fn parse_try(&mut self) -> Result<StmtKind, CompileError> {
        self.advance()?;
        let block = self.parse_block()?;
        let mut param = None;
        let mut handler = None;
        if self.eat(Token::Catch)? {
            if self.eat(Token::LParen)? {
                param = Some(self.expect_ident()?);
                self.expect(Token::RParen)?;
            }
            handler = Some(self.parse_block()?);
        }
        let finalizer = if self.eat(Token::Finally)? {
            Some(self.parse_block()?)
        } else {
            None
        };
        if handler.is_none() && finalizer.is_none() {
            return Err(self.error_at(self.token_pos, "Missing catch or finally after try"));
        }
        Ok(StmtKind::Try { block, param, handler, finalizer })
    }

    fn parse_switch(&mut self) -> Result<StmtKind, CompileError> {
        self.advance()?;
        self.expect(Token::LParen)?;
        let discriminant = self.parse_expression(false)?;
        self.expect(Token::RParen)?;
        self.expect(Token::LBrace)?;

        let mut cases = Vec::new();
        let mut seen_default = false;
        while !self.eat(Token::RBrace)? {
            let test = match self.current_token {
                Token::Case => {
                    self.advance()?;
                    Some(self.parse_expression(false)?)
                }
                Token::Default => {
                    if seen_default {
                        return Err(self.error_at(self.token_pos, "More than one default clause in switch statement"));
                    }
                    seen_default = true;
                    self.advance()?;
                    None
                }
                _ => return Err(self.unexpected()),
            };
            self.expect(Token::Colon)?;
            let mut body = Vec::new();
            while !matches!(self.current_token, Token::Case | Token::Default | Token::RBrace) {
                if self.current_token == Token::Eof {
                    return Err(self.unexpected());
                }
                body.push(self.parse_statement()?);
            }
            cases.push(SwitchCase { test, body });
        }
        Ok(StmtKind::Switch { discriminant, cases })
    }

    // =========================================================================
    // Functions
    // =========================================================================

    /// Parse parameters and body after the function name
    fn parse_function_rest(
        &mut self,
        name: Option<JSString>,
        is_expression: bool,
        start: SourcePos,
    ) -> Result<Arc<FunctionNode>, CompileError> {
        self.expect(Token::LParen)?;
        let mut params = Vec::new();
        while !self.check(&Token::RParen) {
            params.push(self.expect_ident()?);
            if !self.eat(Token::Comma)? {
                break;
            }
        }
        self.expect(Token::RParen)?;

        self.scopes.push(FunctionScope::default());
        self.function_depth += 1;
        let body = self.parse_block();
        self.function_depth -= 1;
        let scope = self.scopes.pop().unwrap_or_default();
        let body = body?;

        Ok(Arc::new(FunctionNode {
            name,
            params,
            body,
            is_arrow: false,
            is_expression,
            var_names: scope.var_names,
            functions: scope.functions,
            uses_arguments: scope.uses_arguments,
            line: start.line as u32,
            column: start.column as u32,
            span: (start.offset, self.prev_end),
        }))
    }

    /// Parse an arrow function body; the current token is `=>`
    fn parse_arrow_rest(
        &mut self,
        params: Vec<JSString>,
        start: SourcePos,
        no_in: bool,
    ) -> Result<Expr, CompileError> {
        if self.newline_before {
            return Err(self.unexpected());
        }
        self.expect(Token::Arrow)?;

        self.scopes.push(FunctionScope {
            is_arrow: true,
            ..FunctionScope::default()
        });
        self.function_depth += 1;
        let body = if self.check(&Token::LBrace) {
            self.parse_block()
        } else {
            let pos = self.token_pos;
            self.parse_assignment(no_in).map(|expr| {
                vec![Stmt {
                    kind: StmtKind::Return(Some(expr)),
                    line: pos.line as u32,
                    column: pos.column as u32,
                }]
            })
        };
        self.function_depth -= 1;
        let scope = self.scopes.pop().unwrap_or_default();
        let body = body?;

        Ok(Expr::Function(Arc::new(FunctionNode {
            name: None,
            params,
            body,
            is_arrow: true,
            is_expression: false,
            var_names: scope.var_names,
            functions: scope.functions,
            uses_arguments: false,
            line: start.line as u32,
            column: start.column as u32,
            span: (start.offset, self.prev_end),
        })))
    }

    /// Try to read `(a, b) =>`; restores the parser if this is not an arrow
    fn try_arrow_params(&mut self) -> Option<Vec<JSString>> {
        let checkpoint = self.checkpoint();
        let params = self.arrow_params();
        match params {
            Some(params) if self.check(&Token::Arrow) => Some(params),
            _ => {
                self.restore(checkpoint);
                None
            }
        }
    }

    fn arrow_params(&mut self) -> Option<Vec<JSString>> {
        self.advance().ok()?;
        let mut params = Vec::new();
        while !self.check(&Token::RParen) {
            match &self.current_token {
                Token::Ident(name) => params.push(JSString::from(name.as_str())),
                _ => return None,
            }
            self.advance().ok()?;
            if self.check(&Token::Comma) {
                self.advance().ok()?;
            } else if !self.check(&Token::RParen) {
                return None;
            }
        }
        self.advance().ok()?;
        Some(params)
    }

    // =========================================================================
    // Expressions
    // =========================================================================

    fn parse_expression(&mut self, no_in: bool) -> Result<Expr, CompileError> {
        let first = self.parse_assignment(no_in)?;
        if !self.check(&Token::Comma) {
            return Ok(first);
        }
        let mut exprs = vec![first];
        while self.eat(Token::Comma)? {
            exprs.push(self.parse_assignment(no_in)?);
        }
        Ok(Expr::Sequence(exprs))
    }

    fn parse_assignment(&mut self, no_in: bool) -> Result<Expr, CompileError> {
        self.enter_nested()?;
        let result = self.parse_assignment_inner(no_in);
        self.nesting -= 1;
        result
    }

    fn parse_assignment_inner(&mut self, no_in: bool) -> Result<Expr, CompileError> {
        let start = self.token_pos;

        // Arrow functions
        if let Token::Ident(name) = &self.current_token
            && self.peek_token() == Token::Arrow
        {
            let param = JSString::from(name.as_str());
            self.advance()?;
            return self.parse_arrow_rest(vec![param], start, no_in);
        }
        if self.check(&Token::LParen)
            && let Some(params) = self.try_arrow_params()
        {
            return self.parse_arrow_rest(params, start, no_in);
        }

        let left = self.parse_conditional(no_in)?;

        let op = match self.current_token {
            Token::Eq => None,
            Token::PlusEq => Some(BinaryOp::Add),
            Token::MinusEq => Some(BinaryOp::Sub),
            Token::StarEq => Some(BinaryOp::Mul),
            Token::SlashEq => Some(BinaryOp::Div),
            Token::PercentEq => Some(BinaryOp::Mod),
            Token::StarStarEq => Some(BinaryOp::Exp),
            Token::LtLtEq => Some(BinaryOp::Shl),
            Token::GtGtEq => Some(BinaryOp::Shr),
            Token::GtGtGtEq => Some(BinaryOp::UShr),
            Token::AmpEq => Some(BinaryOp::BitAnd),
            Token::PipeEq => Some(BinaryOp::BitOr),
            Token::CaretEq => Some(BinaryOp::BitXor),
            _ => return Ok(left),
        };

        if !matches!(left, Expr::Ident(_) | Expr::Member(..)) {
            return Err(self.error_at(start, "Invalid left-hand side in assignment"));
        }
        self.advance()?;
        let value = self.parse_assignment(no_in)?;
        Ok(Expr::Assign {
            op,
            target: Box::new(left),
            value: Box::new(value),
        })
    }

    fn parse_conditional(&mut self, no_in: bool) -> Result<Expr, CompileError> {
        let test = self.parse_binary(0, no_in)?;
        if !self.eat(Token::Question)? {
            return Ok(test);
        }
        let consequent = self.parse_assignment(false)?;
        self.expect(Token::Colon)?;
        let alternate = self.parse_assignment(no_in)?;
        Ok(Expr::Conditional {
            test: Box::new(test),
            consequent: Box::new(consequent),
            alternate: Box::new(alternate),
        })
    }

    /// Precedence of the binary operator at the current token
    fn binary_operator(&self, no_in: bool) -> Option<(u8, BinaryKind)> {
        use BinaryKind::{Binary, Logical};
        Some(match self.current_token {
            Token::QuestionQuestion => (1, Logical(LogicalOp::Nullish)),
            Token::PipePipe => (2, Logical(LogicalOp::Or)),
            Token::AmpAmp => (3, Logical(LogicalOp::And)),
            Token::Pipe => (4, Binary(BinaryOp::BitOr)),
            Token::Caret => (5, Binary(BinaryOp::BitXor)),
            Token::Amp => (6, Binary(BinaryOp::BitAnd)),
            Token::EqEq => (7, Binary(BinaryOp::Eq)),
            Token::BangEq => (7, Binary(BinaryOp::NotEq)),
            Token::EqEqEq => (7, Binary(BinaryOp::StrictEq)),
            Token::BangEqEq => (7, Binary(BinaryOp::StrictNotEq)),
            Token::Lt => (8, Binary(BinaryOp::Lt)),
            Token::LtEq => (8, Binary(BinaryOp::LtEq)),
            Token::Gt => (8, Binary(BinaryOp::Gt)),
            Token::GtEq => (8, Binary(BinaryOp::GtEq)),
            Token::InstanceOf => (8, Binary(BinaryOp::InstanceOf)),
            Token::In if !no_in => (8, Binary(BinaryOp::In)),
            Token::LtLt => (9, Binary(BinaryOp::Shl)),
            Token::GtGt => (9, Binary(BinaryOp::Shr)),
            Token::GtGtGt => (9, Binary(BinaryOp::UShr)),
            Token::Plus => (10, Binary(BinaryOp::Add)),
            Token::Minus => (10, Binary(BinaryOp::Sub)),
            Token::Star => (11, Binary(BinaryOp::Mul)),
            Token::Slash => (11, Binary(BinaryOp::Div)),
            Token::Percent => (11, Binary(BinaryOp::Mod)),
            Token::StarStar => (12, Binary(BinaryOp::Exp)),
            _ => return None,
        })
    }

    fn parse_binary(&mut self, min_prec: u8, no_in: bool) -> Result<Expr, CompileError> {
        let mut left = self.parse_unary()?;
        while let Some((prec, kind)) = self.binary_operator(no_in) {
            if prec < min_prec {
                break;
            }
            self.advance()?;
            // `**` is right-associative
            let next_min = if prec == 12 { prec } else { prec + 1 };
            let right = self.parse_binary(next_min, no_in)?;
            left = match kind {
                BinaryKind::Binary(op) => Expr::Binary(op, Box::new(left), Box::new(right)),
                BinaryKind::Logical(op) => Expr::Logical(op, Box::new(left), Box::new(right)),
            };
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, CompileError> {
        let op = match self.current_token {
            Token::Bang => UnaryOp::Not,
            Token::Minus => UnaryOp::Minus,
            Token::Plus => UnaryOp::Plus,
            Token::Tilde => UnaryOp::BitNot,
            Token::TypeOf => UnaryOp::TypeOf,
            Token::Void => UnaryOp::Void,
            Token::Delete => UnaryOp::Delete,
            Token::PlusPlus | Token::MinusMinus => {
                let op = if self.check(&Token::PlusPlus) {
                    UpdateOp::Increment
                } else {
                    UpdateOp::Decrement
                };
                let pos = self.token_pos;
                self.advance()?;
                let target = self.parse_unary()?;
                if !matches!(target, Expr::Ident(_) | Expr::Member(..)) {
                    return Err(self.error_at(pos, "Invalid left-hand side expression in prefix operation"));
                }
                return Ok(Expr::Update {
                    op,
                    prefix: true,
                    target: Box::new(target),
                });
            }
            _ => return self.parse_postfix(),
        };
        self.enter_nested()?;
        let advanced = self.advance();
        let operand = advanced.and_then(|_| self.parse_unary());
        self.nesting -= 1;
        Ok(Expr::Unary(op, Box::new(operand?)))
    }

    fn parse_postfix(&mut self) -> Result<Expr, CompileError> {
        let pos = self.token_pos;
        let expr = self.parse_call_member()?;
        if matches!(self.current_token, Token::PlusPlus | Token::MinusMinus) && !self.newline_before {
            if !matches!(expr, Expr::Ident(_) | Expr::Member(..)) {
                return Err(self.error_at(pos, "Invalid left-hand side expression in postfix operation"));
            }
            let op = if self.check(&Token::PlusPlus) {
                UpdateOp::Increment
            } else {
                UpdateOp::Decrement
            };
            self.advance()?;
            return Ok(Expr::Update {
                op,
                prefix: false,
                target: Box::new(expr),
            });
        }
        Ok(expr)
    }

    /// Property name after `.`: identifiers and reserved words
    fn parse_member_name(&mut self) -> Result<JSString, CompileError> {
        let name = match &self.current_token {
            Token::Ident(name) => JSString::from(name.as_str()),
            other => match other.keyword_name() {
                Some(name) => JSString::from(name),
                None => return Err(self.unexpected()),
            },
        };
        self.advance()?;
        Ok(name)
    }

    fn parse_arguments(&mut self) -> Result<Vec<Expr>, CompileError> {
        self.expect(Token::LParen)?;
        let mut args = Vec::new();
        while !self.check(&Token::RParen) {
            args.push(self.parse_assignment(false)?);
            if !self.eat(Token::Comma)? {
                break;
            }
        }
        self.expect(Token::RParen)?;
        Ok(args)
    }

    fn parse_call_member(&mut self) -> Result<Expr, CompileError> {
        let mut expr = if self.check(&Token::New) {
            self.parse_new()?
        } else {
            self.parse_primary()?
        };
        loop {
            match self.current_token {
                Token::Dot => {
                    self.advance()?;
                    let name = self.parse_member_name()?;
                    expr = Expr::Member(Box::new(expr), MemberProp::Named(name));
                }
                Token::LBracket => {
                    self.advance()?;
                    let property = self.parse_expression(false)?;
                    self.expect(Token::RBracket)?;
                    expr = Expr::Member(Box::new(expr), MemberProp::Computed(Box::new(property)));
                }
                Token::LParen => {
                    let args = self.parse_arguments()?;
                    expr = Expr::Call {
                        callee: Box::new(expr),
                        args,
                    };
                }
                _ => return Ok(expr),
            }
        }
    }

    fn parse_new(&mut self) -> Result<Expr, CompileError> {
        self.enter_nested()?;
        self.advance()?;
        let mut callee = if self.check(&Token::New) {
            self.parse_new()?
        } else {
            self.parse_primary()?
        };
        loop {
            match self.current_token {
                Token::Dot => {
                    self.advance()?;
                    let name = self.parse_member_name()?;
                    callee = Expr::Member(Box::new(callee), MemberProp::Named(name));
                }
                Token::LBracket => {
                    self.advance()?;
                    let property = self.parse_expression(false)?;
                    self.expect(Token::RBracket)?;
                    callee = Expr::Member(Box::new(callee), MemberProp::Computed(Box::new(property)));
                }
                _ => break,
            }
        }
        let args = if self.check(&Token::LParen) {
            self.parse_arguments()?
        } else {
            Vec::new()
        };
        self.nesting -= 1;
        Ok(Expr::New {
            callee: Box::new(callee),
            args,
        })
    }

    fn parse_primary(&mut self) -> Result<Expr, CompileError> {
        let expr = match &self.current_token {
            Token::Number(n) => Expr::Number(*n),
            Token::String(s) => Expr::String(JSString::from(s.as_str())),
            Token::True => Expr::Bool(true),
            Token::False => Expr::Bool(false),
            Token::Null => Expr::Null,
            Token::This => Expr::This,
            Token::Ident(name) => {
                let name = JSString::from(name.as_str());
                if &*name == "arguments" {
                    self.mark_uses_arguments();
                }
                Expr::Ident(name)
            }
            Token::LParen => {
                self.advance()?;
                let expr = self.parse_expression(false)?;
                self.expect(Token::RParen)?;
                return Ok(expr);
            }
            Token::LBracket => return self.parse_array_literal(),
            Token::LBrace => return self.parse_object_literal(),
            Token::Function => {
                let start = self.token_pos;
                self.advance()?;
                let name = match &self.current_token {
                    Token::Ident(name) => {
                        let name = JSString::from(name.as_str());
                        self.advance()?;
                        Some(name)
                    }
                    _ => None,
                };
                let is_expression = name.is_some();
                return Ok(Expr::Function(self.parse_function_rest(name, is_expression, start)?));
            }
            Token::Slash | Token::SlashEq => {
                let token = self.lexer.rescan_regexp(self.token_pos);
                match token {
                    Token::RegExp { pattern, flags } => Expr::RegExp {
                        pattern: JSString::from(pattern),
                        flags: JSString::from(flags),
                    },
                    Token::Error(msg) => return Err(self.error_at(self.token_pos, msg)),
                    _ => return Err(self.unexpected()),
                }
            }
            _ => return Err(self.unexpected()),
        };
        self.advance()?;
        Ok(expr)
    }

    fn parse_array_literal(&mut self) -> Result<Expr, CompileError> {
        self.advance()?;
        let mut elements = Vec::new();
        loop {
            if self.check(&Token::RBracket) {
                break;
            }
            if self.check(&Token::Comma) {
                elements.push(None);
                self.advance()?;
                continue;
            }
            elements.push(Some(self.parse_assignment(false)?));
            if !self.eat(Token::Comma)? {
                break;
            }
        }
        self.expect(Token::RBracket)?;
        Ok(Expr::Array(elements))
    }

    /// Property key in an object literal; the flag is set for plain identifiers
    fn parse_property_name(&mut self) -> Result<(PropName, bool), CompileError> {
        let result = match &self.current_token {
            Token::Ident(name) => (PropName::Static(JSString::from(name.as_str())), true),
            Token::String(s) => (PropName::Static(JSString::from(s.as_str())), false),
            Token::Number(n) => (PropName::Static(JSString::from(number_to_string(*n))), false),
            Token::LBracket => {
                self.advance()?;
                let key = self.parse_assignment(false)?;
                self.expect(Token::RBracket)?;
                return Ok((PropName::Computed(key), false));
            }
            other => match other.keyword_name() {
                Some(name) => (PropName::Static(JSString::from(name)), false),
                None => return Err(self.unexpected()),
            },
        };
        self.advance()?;
        Ok(result)
    }

    fn parse_object_literal(&mut self) -> Result<Expr, CompileError> {
        self.advance()?;
        let mut props = Vec::new();
        while !self.check(&Token::RBrace) {
            props.push(self.parse_property()?);
            if !self.eat(Token::Comma)? {
                break;
            }
        }
        self.expect(Token::RBrace)?;
        Ok(Expr::Object(props))
    }

    fn parse_property(&mut self) -> Result<PropDef, CompileError> {
        let start = self.token_pos;

        // get/set accessors
        if let Token::Ident(word) = &self.current_token
            && (word == "get" || word == "set")
        {
            let is_getter = word == "get";
            let next = self.peek_token();
            if !matches!(next, Token::Colon | Token::LParen | Token::Comma | Token::RBrace) {
                self.advance()?;
                let (key, _) = self.parse_property_name()?;
                let name = match &key {
                    PropName::Static(name) => Some(name.clone()),
                    PropName::Computed(_) => None,
                };
                let func = self.parse_function_rest(name, false, start)?;
                return Ok(if is_getter {
                    PropDef::Getter(key, func)
                } else {
                    PropDef::Setter(key, func)
                });
            }
        }

        let (key, is_ident) = self.parse_property_name()?;
        match self.current_token {
            Token::Colon => {
                self.advance()?;
                let value = self.parse_assignment(false)?;
                Ok(PropDef::Init(key, value))
            }
            Token::LParen => {
                let name = match &key {
                    PropName::Static(name) => Some(name.clone()),
                    PropName::Computed(_) => None,
                };
                let func = self.parse_function_rest(name, false, start)?;
                Ok(PropDef::Init(key, Expr::Function(func)))
            }
            _ => match key {
                PropName::Static(name) if is_ident => {
                    if &*name == "arguments" {
                        self.mark_uses_arguments();
                    }
                    Ok(PropDef::Init(PropName::Static(name.clone()), Expr::Ident(name)))
                }
                _ => Err(self.unexpected()),
            },
        }
    }
}

/// Parse a complete script
pub fn parse(source: &str) -> Result<Program, CompileError> {
    Compiler::new(source).compile()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn first_expr(source: &str) -> Expr {
        let mut program = parse(source).unwrap();
        match program.body.remove(0).kind {
            StmtKind::Expr(e) => e,
            other => panic!("expected expression statement, got {:?}", other),
        }
    }

    #[test]
    fn test_precedence() {
        match first_expr("1 + 2 * 3") {
            Expr::Binary(BinaryOp::Add, _, right) => {
                assert!(matches!(*right, Expr::Binary(BinaryOp::Mul, _, _)));
            }
            other => panic!("unexpected {:?}", other),
        }
        match first_expr("2 ** 3 ** 2") {
            Expr::Binary(BinaryOp::Exp, _, right) => {
                assert!(matches!(*right, Expr::Binary(BinaryOp::Exp, _, _)));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_hoisting_collects_declarations() {
        let program = parse("var a = 1; function f() { var b; } if (x) { var c; }").unwrap();
        let names: Vec<&str> = program.var_names.iter().map(|n| n.as_str()).collect();
        assert_eq!(names, vec!["a", "f", "c"]);
        assert_eq!(program.functions.len(), 1);
        assert_eq!(program.functions[0].var_names.len(), 1);
    }

    #[test]
    fn test_asi() {
        let program = parse("var a = 1\nvar b = 2\na + b").unwrap();
        assert_eq!(program.body.len(), 3);
        assert!(parse("var a = 1 var b = 2").is_err());
    }

    #[test]
    fn test_return_asi() {
        let program = parse("function f() { return\n1 }").unwrap();
        match &program.functions[0].body[0].kind {
            StmtKind::Return(None) => {}
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_arrow_functions() {
        match first_expr("(a, b) => a + b") {
            Expr::Function(node) => {
                assert!(node.is_arrow);
                assert_eq!(node.params.len(), 2);
            }
            other => panic!("unexpected {:?}", other),
        }
        match first_expr("x => x * 2") {
            Expr::Function(node) => assert_eq!(node.params.len(), 1),
            other => panic!("unexpected {:?}", other),
        }
        // A parenthesized expression is not an arrow
        assert!(matches!(first_expr("(a, b)"), Expr::Sequence(_)));
    }

    #[test]
    fn test_regexp_vs_division() {
        assert!(matches!(first_expr("a / b / c"), Expr::Binary(BinaryOp::Div, _, _)));
        assert!(matches!(first_expr("/ab+c/g"), Expr::RegExp { .. }));
    }

    #[test]
    fn test_object_literal() {
        match first_expr("({ a: 1, 'b': 2, 3: 3, get c() { return 1 }, d() {}, e, if: 1 })") {
            Expr::Object(props) => assert_eq!(props.len(), 7),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_for_variants() {
        parse("for (var i = 0; i < 3; i++) {}").unwrap();
        parse("for (let k in o) {}").unwrap();
        parse("for (const v of a) {}").unwrap();
        parse("for (x.y in o) {}").unwrap();
        parse("for (;;) break;").unwrap();
    }

    #[test]
    fn test_syntax_errors() {
        let err = parse("var = 1").unwrap_err();
        assert_eq!(err.line, 1);
        assert!(parse("return 1").is_err());
        assert!(parse("1 = 2").is_err());
        assert!(parse("const a;").is_err());
        assert!(parse("try {}").is_err());
        assert!(parse("'unterminated").is_err());
        assert_eq!(
            parse("\n\n  }").unwrap_err(),
            CompileError {
                message: "Unexpected token '}'".to_string(),
                line: 3,
                column: 3
            }
        );
    }

    #[test]
    fn test_function_span() {
        let source = "var f = function add(a, b) { return a + b; };";
        let program = parse(source).unwrap();
        let StmtKind::VarDecl(_, decls) = &program.body[0].kind else {
            panic!("expected declaration");
        };
        let Some(Expr::Function(node)) = &decls[0].init else {
            panic!("expected function");
        };
        assert_eq!(&source[node.span.0..node.span.1], "function add(a, b) { return a + b; }");
    }
}
