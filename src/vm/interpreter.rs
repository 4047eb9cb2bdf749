//! Tree-walking interpreter
//!
//! Executes the syntax tree produced by the parser directly. Scopes are heap
//! environments so closures can capture them; control flow that leaves a
//! statement early (return, break, continue) travels back up as a
//! [`Completion`] and thrown values travel as the `Err` side of
//! [`JsResult`].
//!
//! Heap borrows are kept as short as possible: nothing here holds a `Ref`
//! on the heap or execution state across a call that may run script or host
//! code.

use std::sync::Arc;

use once_cell::sync::Lazy;

use crate::exception::{Exception, token_width};
use crate::gc::{EnvId, ObjectId, RealmId};
use crate::parser::ast::{
    BinaryOp, Expr, ForBinding, ForInit, FunctionNode, LogicalOp, MemberProp, Program, PropDef,
    PropName, Stmt, StmtKind, SwitchCase, UnaryOp, UpdateOp, VarDeclarator, VarKind,
};
use crate::runtime::env::Env;
use crate::runtime::function::{BoundFunction, Closure};
use crate::runtime::host::HostCall;
use crate::runtime::object::TypedView;
use crate::runtime::property::PropertyKey;
use crate::runtime::realm::ErrorKind;
use crate::runtime::{
    ClassId, FunctionKind, JSArray, JSObject, JSString, JSValue, JsResult, NativeCall, NativeFn, ObjectData,
    PropertyFlags, Runtime, ScriptSource, ThrowSite,
};
use crate::vm::stack::CallFrame;

static EMPTY_SOURCE: Lazy<Arc<ScriptSource>> =
    Lazy::new(|| Arc::new(ScriptSource::anonymous(Arc::from(""))));

/// How a statement finished
#[derive(Debug, Clone)]
pub enum Completion {
    Normal,
    Return(JSValue),
    Break(Option<JSString>),
    Continue(Option<JSString>),
}

/// What a loop does after running its body once
enum LoopFlow {
    Next,
    Stop,
    Exit(Completion),
}

impl LoopFlow {
    fn from_completion(completion: Completion, labels: &[JSString]) -> Self {
        match completion {
            Completion::Normal | Completion::Continue(None) => LoopFlow::Next,
            Completion::Continue(Some(label)) if labels.contains(&label) => LoopFlow::Next,
            Completion::Break(None) => LoopFlow::Stop,
            Completion::Break(Some(label)) if labels.contains(&label) => LoopFlow::Stop,
            other => LoopFlow::Exit(other),
        }
    }
}

/// Interpreter state
///
/// Cheap to create: everything persistent lives in the [`Runtime`].
pub struct Interpreter<'rt> {
    pub(crate) rt: &'rt Runtime,
    pub(crate) realm: RealmId,
    /// Innermost scope
    pub(crate) env: EnvId,
    /// Script whose code is running
    source: Arc<ScriptSource>,
    /// Value of the last expression statement
    completion: JSValue,
    /// Nested native calls, which do not push call frames
    native_depth: usize,
    /// Arrays being joined, to cut cycles short
    pub(crate) joining: Vec<ObjectId>,
}

impl<'rt> Interpreter<'rt> {
    /// Create an interpreter running at the top level of `realm`
    pub fn new(rt: &'rt Runtime, realm: RealmId) -> Self {
        let env = rt.heap().realm(realm).global_env;
        Interpreter {
            rt,
            realm,
            env,
            source: EMPTY_SOURCE.clone(),
            completion: JSValue::Undefined,
            native_depth: 0,
            joining: Vec::new(),
        }
    }

    #[inline]
    pub fn runtime(&self) -> &'rt Runtime {
        self.rt
    }

    #[inline]
    pub fn realm(&self) -> RealmId {
        self.realm
    }

    /// Run a parsed script and return its completion value
    pub fn run_program(&mut self, program: &Program, source: Arc<ScriptSource>) -> JsResult<JSValue> {
        let global_env = self.rt.heap().realm(self.realm).global_env;
        let global = self.global();

        let saved_env = std::mem::replace(&mut self.env, global_env);
        let saved_source = std::mem::replace(&mut self.source, source.clone());
        let saved_completion = std::mem::take(&mut self.completion);
        self.rt
            .state_mut()
            .call_stack
            .push(CallFrame::new(None, source, 1, 1));

        for name in &program.var_names {
            let key = PropertyKey::String(name.clone());
            let exists = self.rt.heap().object(global).properties.has(&key);
            if !exists {
                self.define_own(global, key, JSValue::Undefined, PropertyFlags::DONT_DELETE);
            }
        }
        for node in &program.functions {
            let func = self.make_closure(node, global_env, None);
            if let Some(name) = &node.name {
                self.define_own(
                    global,
                    PropertyKey::String(name.clone()),
                    JSValue::Object(func),
                    PropertyFlags::DONT_DELETE,
                );
            }
        }

        let result = self.exec_stmts(&program.body);

        self.rt.state_mut().call_stack.pop();
        self.env = saved_env;
        self.source = saved_source;
        let completion = std::mem::replace(&mut self.completion, saved_completion);
        result.map(|_| completion)
    }

    // =========================================================================
    // Statements
    // =========================================================================

    fn exec_stmts(&mut self, stmts: &[Stmt]) -> JsResult<Completion> {
        for stmt in stmts {
            match self.exec_stmt(stmt)? {
                Completion::Normal => {}
                abrupt => return Ok(abrupt),
            }
        }
        Ok(Completion::Normal)
    }

    /// Run statements in a fresh block scope
    fn exec_scoped(&mut self, stmts: &[Stmt]) -> JsResult<Completion> {
        let saved = self.env;
        self.env = self.rt.heap_mut().alloc_env(Env::new(Some(saved)));
        let result = self.exec_stmts(stmts);
        self.env = saved;
        result
    }

    fn exec_stmt(&mut self, stmt: &Stmt) -> JsResult<Completion> {
        self.rt
            .state_mut()
            .call_stack
            .set_position(stmt.line, stmt.column);
        let result = self.exec_stmt_kind(stmt, &[]);
        if result.is_err() {
            self.record_throw_site(stmt);
        }
        result
    }

    /// Remember where an exception was first seen
    fn record_throw_site(&mut self, stmt: &Stmt) {
        let mut state = self.rt.state_mut();
        if state.throw_site.is_none() {
            state.throw_site = Some(ThrowSite {
                source: self.source.clone(),
                line: stmt.line,
                column: stmt.column,
            });
        }
    }

    fn exec_stmt_kind(&mut self, stmt: &Stmt, labels: &[JSString]) -> JsResult<Completion> {
        match &stmt.kind {
            StmtKind::Expr(expr) => {
                self.completion = self.eval(expr)?;
                Ok(Completion::Normal)
            }
            StmtKind::VarDecl(kind, decls) => {
                self.exec_var_decl(*kind, decls)?;
                Ok(Completion::Normal)
            }
            StmtKind::FunctionDecl(_) | StmtKind::Empty | StmtKind::Debugger => Ok(Completion::Normal),
            StmtKind::Return(value) => {
                let value = match value {
                    Some(expr) => self.eval(expr)?,
                    None => JSValue::Undefined,
                };
                Ok(Completion::Return(value))
            }
            StmtKind::If {
                test,
                consequent,
                alternate,
            } => {
                if self.eval(test)?.to_boolean() {
                    self.exec_stmt(consequent)
                } else if let Some(alternate) = alternate {
                    self.exec_stmt(alternate)
                } else {
                    Ok(Completion::Normal)
                }
            }
            StmtKind::Block { body, scoped } => {
                if *scoped {
                    self.exec_scoped(body)
                } else {
                    self.exec_stmts(body)
                }
            }
            StmtKind::While { test, body } => {
                while self.eval(test)?.to_boolean() {
                    match LoopFlow::from_completion(self.exec_stmt(body)?, labels) {
                        LoopFlow::Next => {}
                        LoopFlow::Stop => break,
                        LoopFlow::Exit(completion) => return Ok(completion),
                    }
                }
                Ok(Completion::Normal)
            }
            StmtKind::DoWhile { body, test } => {
                loop {
                    match LoopFlow::from_completion(self.exec_stmt(body)?, labels) {
                        LoopFlow::Next => {}
                        LoopFlow::Stop => break,
                        LoopFlow::Exit(completion) => return Ok(completion),
                    }
                    if !self.eval(test)?.to_boolean() {
                        break;
                    }
                }
                Ok(Completion::Normal)
            }
            StmtKind::For {
                init,
                test,
                update,
                body,
            } => {
                let lexical = matches!(init, Some(ForInit::Var(kind, _)) if *kind != VarKind::Var);
                let saved = self.env;
                if lexical {
                    self.env = self.rt.heap_mut().alloc_env(Env::new(Some(saved)));
                }
                let result = self.exec_for(init.as_ref(), test.as_ref(), update.as_ref(), body, lexical, labels);
                self.env = saved;
                result
            }
            StmtKind::ForIn {
                binding,
                object,
                body,
            } => {
                let object = self.eval(object)?;
                if object.is_nullish() {
                    return Ok(Completion::Normal);
                }
                let object = self.to_object(&object)?;
                let keys = self.enumerable_keys(object)?;
                let values = keys
                    .into_iter()
                    .map(|key| JSValue::String(key.to_js_string()))
                    .collect();
                self.exec_for_each(binding, values, body, labels)
            }
            StmtKind::ForOf {
                binding,
                iterable,
                body,
            } => {
                let iterable = self.eval(iterable)?;
                self.exec_for_of(binding, iterable, body, labels)
            }
            StmtKind::Break(label) => Ok(Completion::Break(label.clone())),
            StmtKind::Continue(label) => Ok(Completion::Continue(label.clone())),
            StmtKind::Throw(expr) => {
                let value = self.eval(expr)?;
                Err(value)
            }
            StmtKind::Try {
                block,
                param,
                handler,
                finalizer,
            } => self.exec_try(block, param.as_ref(), handler.as_deref(), finalizer.as_deref()),
            StmtKind::Switch { discriminant, cases } => {
                let saved = self.env;
                self.env = self.rt.heap_mut().alloc_env(Env::new(Some(saved)));
                let result = self.exec_switch(discriminant, cases, labels);
                self.env = saved;
                result
            }
            StmtKind::Labeled { label, body } => {
                let mut all = labels.to_vec();
                all.push(label.clone());
                self.rt
                    .state_mut()
                    .call_stack
                    .set_position(body.line, body.column);
                let result = self.exec_stmt_kind(body, &all);
                if result.is_err() {
                    self.record_throw_site(body);
                }
                match result? {
                    Completion::Break(Some(l)) if l == *label => Ok(Completion::Normal),
                    other => Ok(other),
                }
            }
        }
    }

    fn exec_var_decl(&mut self, kind: VarKind, decls: &[VarDeclarator]) -> JsResult<()> {
        for decl in decls {
            let value = match &decl.init {
                Some(init) => Some(self.eval_named(init, &decl.name)?),
                None => None,
            };
            match kind {
                VarKind::Var => {
                    if let Some(value) = value {
                        self.assign_identifier(&decl.name, value)?;
                    }
                }
                VarKind::Let | VarKind::Const => {
                    let value = value.unwrap_or_default();
                    self.rt
                        .heap_mut()
                        .env_mut(self.env)
                        .declare(decl.name.clone(), value, kind == VarKind::Let);
                }
            }
        }
        Ok(())
    }

    /// Copy the current loop scope so closures see one binding per iteration
    fn next_iteration_env(&mut self) {
        let mut heap = self.rt.heap_mut();
        let current = heap.env(self.env);
        let copy = Env {
            bindings: current.bindings.clone(),
            parent: current.parent,
            this_value: None,
            global: None,
        };
        self.env = heap.alloc_env(copy);
    }

    fn exec_for(
        &mut self,
        init: Option<&ForInit>,
        test: Option<&Expr>,
        update: Option<&Expr>,
        body: &Stmt,
        lexical: bool,
        labels: &[JSString],
    ) -> JsResult<Completion> {
        match init {
            Some(ForInit::Var(kind, decls)) => self.exec_var_decl(*kind, decls)?,
            Some(ForInit::Expr(expr)) => {
                self.eval(expr)?;
            }
            None => {}
        }
        if lexical {
            self.next_iteration_env();
        }
        loop {
            if let Some(test) = test {
                if !self.eval(test)?.to_boolean() {
                    break;
                }
            }
            match LoopFlow::from_completion(self.exec_stmt(body)?, labels) {
                LoopFlow::Next => {}
                LoopFlow::Stop => break,
                LoopFlow::Exit(completion) => return Ok(completion),
            }
            if lexical {
                self.next_iteration_env();
            }
            if let Some(update) = update {
                self.eval(update)?;
            }
        }
        Ok(Completion::Normal)
    }

    /// Bind the loop variable of a for-in/for-of iteration
    fn bind_loop_value(&mut self, binding: &ForBinding, value: JSValue) -> JsResult<()> {
        match binding {
            ForBinding::Decl(VarKind::Var, name) => self.assign_identifier(name, value),
            ForBinding::Decl(kind, name) => {
                let mut env = Env::new(Some(self.env));
                env.declare(name.clone(), value, *kind == VarKind::Let);
                self.env = self.rt.heap_mut().alloc_env(env);
                Ok(())
            }
            ForBinding::Target(target) => self.assign_to(target, value),
        }
    }

    fn exec_for_each(
        &mut self,
        binding: &ForBinding,
        values: Vec<JSValue>,
        body: &Stmt,
        labels: &[JSString],
    ) -> JsResult<Completion> {
        let saved = self.env;
        for value in values {
            self.env = saved;
            let step = self
                .bind_loop_value(binding, value)
                .and_then(|_| self.exec_stmt(body));
            let completion = match step {
                Ok(completion) => completion,
                Err(e) => {
                    self.env = saved;
                    return Err(e);
                }
            };
            match LoopFlow::from_completion(completion, labels) {
                LoopFlow::Next => {}
                LoopFlow::Stop => break,
                LoopFlow::Exit(completion) => {
                    self.env = saved;
                    return Ok(completion);
                }
            }
        }
        self.env = saved;
        Ok(Completion::Normal)
    }

    fn exec_for_of(
        &mut self,
        binding: &ForBinding,
        iterable: JSValue,
        body: &Stmt,
        labels: &[JSString],
    ) -> JsResult<Completion> {
        if let JSValue::String(s) = &iterable {
            let chars = s.chars().map(|c| JSValue::string(c.to_string())).collect();
            return self.exec_for_each(binding, chars, body, labels);
        }
        let Some(id) = iterable.as_object() else {
            let desc = self.describe_value(&iterable);
            return self.throw(ErrorKind::TypeError, format!("{} is not iterable", desc));
        };
        let iterable_kind = {
            let heap = self.rt.heap();
            match &heap.object(id).data {
                ObjectData::Array(_) | ObjectData::Uint8Array(_) => true,
                ObjectData::Primitive(JSValue::String(_)) => true,
                _ => false,
            }
        };
        if !iterable_kind {
            return self.throw(ErrorKind::TypeError, "object is not iterable");
        }

        // Arrays are walked live so the body may append to them
        let saved = self.env;
        let mut index = 0u32;
        loop {
            let length = self.length_of(id)?;
            if index >= length {
                break;
            }
            let value = self.get(id, &PropertyKey::Index(index))?;
            index += 1;
            self.env = saved;
            let step = self
                .bind_loop_value(binding, value)
                .and_then(|_| self.exec_stmt(body));
            let completion = match step {
                Ok(completion) => completion,
                Err(e) => {
                    self.env = saved;
                    return Err(e);
                }
            };
            match LoopFlow::from_completion(completion, labels) {
                LoopFlow::Next => {}
                LoopFlow::Stop => break,
                LoopFlow::Exit(completion) => {
                    self.env = saved;
                    return Ok(completion);
                }
            }
        }
        self.env = saved;
        Ok(Completion::Normal)
    }

    fn exec_try(
        &mut self,
        block: &[Stmt],
        param: Option<&JSString>,
        handler: Option<&[Stmt]>,
        finalizer: Option<&[Stmt]>,
    ) -> JsResult<Completion> {
        let mut result = self.exec_scoped(block);

        if let (Err(exception), Some(handler)) = (&result, handler) {
            let exception = exception.clone();
            self.rt.state_mut().throw_site = None;
            let saved = self.env;
            let mut env = Env::new(Some(saved));
            if let Some(param) = param {
                env.declare(param.clone(), exception, true);
            }
            self.env = self.rt.heap_mut().alloc_env(env);
            result = self.exec_stmts(handler);
            self.env = saved;
        }

        if let Some(finalizer) = finalizer {
            let saved_site = self.rt.state_mut().throw_site.take();
            match self.exec_scoped(finalizer)? {
                Completion::Normal => self.rt.state_mut().throw_site = saved_site,
                abrupt => return Ok(abrupt),
            }
        }
        result
    }

    fn exec_switch(
        &mut self,
        discriminant: &Expr,
        cases: &[SwitchCase],
        labels: &[JSString],
    ) -> JsResult<Completion> {
        let value = self.eval(discriminant)?;
        let mut start = None;
        for (index, case) in cases.iter().enumerate() {
            if let Some(test) = &case.test {
                if self.eval(test)?.strict_equals(&value) {
                    start = Some(index);
                    break;
                }
            }
        }
        let start = start.or_else(|| cases.iter().position(|case| case.test.is_none()));
        let Some(start) = start else {
            return Ok(Completion::Normal);
        };
        for case in &cases[start..] {
            match self.exec_stmts(&case.body)? {
                Completion::Normal => {}
                Completion::Break(None) => return Ok(Completion::Normal),
                Completion::Break(Some(label)) if labels.contains(&label) => {
                    return Ok(Completion::Normal);
                }
                abrupt => return Ok(abrupt),
            }
        }
        Ok(Completion::Normal)
    }

    // =========================================================================
    // Expressions
    // =========================================================================

    /// Evaluate an initializer, naming anonymous functions after `name`
    fn eval_named(&mut self, expr: &Expr, name: &JSString) -> JsResult<JSValue> {
        match expr {
            Expr::Function(node) if node.name.is_none() => {
                Ok(JSValue::Object(self.make_closure(node, self.env, Some(name))))
            }
            _ => self.eval(expr),
        }
    }

    pub(crate) fn eval(&mut self, expr: &Expr) -> JsResult<JSValue> {
        match expr {
            Expr::Number(n) => Ok(JSValue::Number(*n)),
            Expr::String(s) => Ok(JSValue::String(s.clone())),
            Expr::Bool(b) => Ok(JSValue::Bool(*b)),
            Expr::Null => Ok(JSValue::Null),
            Expr::Ident(name) => match self.lookup_identifier(name)? {
                Some(value) => Ok(value),
                None => self.throw(ErrorKind::ReferenceError, format!("{} is not defined", name)),
            },
            Expr::This => Ok(self.this_value()),
            Expr::RegExp { pattern, flags } => self.new_regexp(pattern, flags).map(JSValue::Object),
            Expr::Array(elements) => {
                let mut values = Vec::with_capacity(elements.len());
                for element in elements {
                    values.push(match element {
                        Some(expr) => self.eval(expr)?,
                        None => JSValue::Undefined,
                    });
                }
                Ok(JSValue::Object(self.new_array(values)))
            }
            Expr::Object(props) => self.eval_object_literal(props),
            Expr::Function(node) => Ok(JSValue::Object(self.make_closure(node, self.env, None))),
            Expr::Unary(op, operand) => self.eval_unary(*op, operand),
            Expr::Update {
                op,
                prefix,
                target,
            } => {
                let old = self.eval(target)?;
                let old = self.to_number(&old)?;
                let new = match op {
                    UpdateOp::Increment => old + 1.0,
                    UpdateOp::Decrement => old - 1.0,
                };
                self.assign_to(target, JSValue::Number(new))?;
                Ok(JSValue::Number(if *prefix { new } else { old }))
            }
            Expr::Binary(op, left, right) => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                self.binary_op(*op, &left, &right)
            }
            Expr::Logical(op, left, right) => {
                let left = self.eval(left)?;
                let short_circuit = match op {
                    LogicalOp::And => !left.to_boolean(),
                    LogicalOp::Or => left.to_boolean(),
                    LogicalOp::Nullish => !left.is_nullish(),
                };
                if short_circuit { Ok(left) } else { self.eval(right) }
            }
            Expr::Assign { op, target, value } => self.eval_assign(*op, target, value),
            Expr::Conditional {
                test,
                consequent,
                alternate,
            } => {
                if self.eval(test)?.to_boolean() {
                    self.eval(consequent)
                } else {
                    self.eval(alternate)
                }
            }
            Expr::Member(object, prop) => {
                let base = self.eval(object)?;
                let key = self.member_key(prop)?;
                self.get_value(&base, &key)
            }
            Expr::Call { callee, args } => self.eval_call(callee, args),
            Expr::New { callee, args } => {
                let constructor = self.eval(callee)?;
                let args = self.eval_args(args)?;
                if !self.is_constructor(&constructor) {
                    let desc = describe_expr(callee);
                    return self.throw(ErrorKind::TypeError, format!("{} is not a constructor", desc));
                }
                self.construct(&constructor, &args)
            }
            Expr::Sequence(exprs) => {
                let mut last = JSValue::Undefined;
                for expr in exprs {
                    last = self.eval(expr)?;
                }
                Ok(last)
            }
        }
    }

    fn member_key(&mut self, prop: &MemberProp) -> JsResult<PropertyKey> {
        match prop {
            MemberProp::Named(name) => Ok(PropertyKey::String(name.clone())),
            MemberProp::Computed(expr) => {
                let key = self.eval(expr)?;
                self.to_property_key(&key)
            }
        }
    }

    fn eval_args(&mut self, args: &[Expr]) -> JsResult<Vec<JSValue>> {
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.eval(arg)?);
        }
        Ok(values)
    }

    fn eval_object_literal(&mut self, props: &[PropDef]) -> JsResult<JSValue> {
        let obj = self.new_object();
        for prop in props {
            match prop {
                PropDef::Init(PropName::Static(name), value) if name.as_str() == "__proto__" => {
                    let value = self.eval(value)?;
                    match value {
                        JSValue::Object(proto) => self.rt.heap_mut().object_mut(obj).proto = Some(proto),
                        JSValue::Null => self.rt.heap_mut().object_mut(obj).proto = None,
                        _ => {}
                    }
                }
                PropDef::Init(name, value) => {
                    let key = self.prop_name(name)?;
                    let value = match (&key, value) {
                        (PropertyKey::String(name), expr) => self.eval_named(expr, name)?,
                        (_, expr) => self.eval(expr)?,
                    };
                    self.define_own(obj, key, value, PropertyFlags::NONE);
                }
                PropDef::Getter(name, node) => {
                    let key = self.prop_name(name)?;
                    let func = self.make_closure(node, self.env, Some(&key.to_js_string()));
                    self.define_accessor(obj, key, Some(func), None, PropertyFlags::NONE);
                }
                PropDef::Setter(name, node) => {
                    let key = self.prop_name(name)?;
                    let func = self.make_closure(node, self.env, Some(&key.to_js_string()));
                    self.define_accessor(obj, key, None, Some(func), PropertyFlags::NONE);
                }
            }
        }
        Ok(JSValue::Object(obj))
    }

    fn prop_name(&mut self, name: &PropName) -> JsResult<PropertyKey> {
        match name {
            PropName::Static(name) => Ok(PropertyKey::from_string(name.clone())),
            PropName::Computed(expr) => {
                let key = self.eval(expr)?;
                self.to_property_key(&key)
            }
        }
    }

    fn eval_unary(&mut self, op: UnaryOp, operand: &Expr) -> JsResult<JSValue> {
        match op {
            UnaryOp::TypeOf => {
                if let Expr::Ident(name) = operand {
                    return match self.lookup_identifier(name)? {
                        Some(value) => Ok(JSValue::string(self.type_of(&value))),
                        None => Ok(JSValue::string("undefined")),
                    };
                }
                let value = self.eval(operand)?;
                Ok(JSValue::string(self.type_of(&value)))
            }
            UnaryOp::Delete => match operand {
                Expr::Member(object, prop) => {
                    let base = self.eval(object)?;
                    let key = self.member_key(prop)?;
                    let obj = self.to_object(&base)?;
                    self.delete_property(obj, &key, false).map(JSValue::Bool)
                }
                Expr::Ident(name) => self.delete_identifier(name).map(JSValue::Bool),
                other => {
                    self.eval(other)?;
                    Ok(JSValue::Bool(true))
                }
            },
            UnaryOp::Void => {
                self.eval(operand)?;
                Ok(JSValue::Undefined)
            }
            UnaryOp::Not => Ok(JSValue::Bool(!self.eval(operand)?.to_boolean())),
            UnaryOp::Minus => {
                let value = self.eval(operand)?;
                Ok(JSValue::Number(-self.to_number(&value)?))
            }
            UnaryOp::Plus => {
                let value = self.eval(operand)?;
                Ok(JSValue::Number(self.to_number(&value)?))
            }
            UnaryOp::BitNot => {
                let value = self.eval(operand)?;
                Ok(JSValue::Number(!self.to_int32(&value)? as f64))
            }
        }
    }

    fn eval_assign(&mut self, op: Option<BinaryOp>, target: &Expr, value: &Expr) -> JsResult<JSValue> {
        match target {
            Expr::Ident(name) => {
                let value = match op {
                    None => self.eval_named(value, name)?,
                    Some(op) => {
                        let current = match self.lookup_identifier(name)? {
                            Some(current) => current,
                            None => {
                                return self.throw(
                                    ErrorKind::ReferenceError,
                                    format!("{} is not defined", name),
                                );
                            }
                        };
                        let rhs = self.eval(value)?;
                        self.binary_op(op, &current, &rhs)?
                    }
                };
                self.assign_identifier(name, value.clone())?;
                Ok(value)
            }
            Expr::Member(object, prop) => {
                let base = self.eval(object)?;
                let key = self.member_key(prop)?;
                let value = match op {
                    None => self.eval(value)?,
                    Some(op) => {
                        let current = self.get_value(&base, &key)?;
                        let rhs = self.eval(value)?;
                        self.binary_op(op, &current, &rhs)?
                    }
                };
                self.put_value(&base, &key, value.clone())?;
                Ok(value)
            }
            _ => self.throw(ErrorKind::SyntaxError, "Invalid left-hand side in assignment"),
        }
    }

    /// Store into an assignment target (identifier or member expression)
    fn assign_to(&mut self, target: &Expr, value: JSValue) -> JsResult<()> {
        match target {
            Expr::Ident(name) => self.assign_identifier(name, value),
            Expr::Member(object, prop) => {
                let base = self.eval(object)?;
                let key = self.member_key(prop)?;
                self.put_value(&base, &key, value)
            }
            _ => self.throw(ErrorKind::SyntaxError, "Invalid left-hand side in assignment"),
        }
    }

    fn eval_call(&mut self, callee: &Expr, args: &[Expr]) -> JsResult<JSValue> {
        let (func, this) = match callee {
            Expr::Member(object, prop) => {
                let base = self.eval(object)?;
                let key = self.member_key(prop)?;
                let func = self.get_value(&base, &key)?;
                (func, base)
            }
            other => (self.eval(other)?, JSValue::Undefined),
        };
        let args = self.eval_args(args)?;
        if !self.is_callable(&func) {
            let desc = describe_expr(callee);
            return self.throw(ErrorKind::TypeError, format!("{} is not a function", desc));
        }
        self.call(&func, this, &args)
    }

    // =========================================================================
    // Scopes
    // =========================================================================

    /// Resolve a name through the scope chain; `None` if unresolvable
    pub(crate) fn lookup_identifier(&mut self, name: &JSString) -> JsResult<Option<JSValue>> {
        let mut current = Some(self.env);
        while let Some(id) = current {
            let (found, global, parent) = {
                let heap = self.rt.heap();
                let env = heap.env(id);
                (env.get(name).map(|b| b.value.clone()), env.global, env.parent)
            };
            if found.is_some() {
                return Ok(found);
            }
            if let Some(global) = global {
                let key = PropertyKey::String(name.clone());
                let receiver = JSValue::Object(global);
                return self.get_property(global, &key, &receiver);
            }
            current = parent;
        }
        Ok(None)
    }

    pub(crate) fn assign_identifier(&mut self, name: &JSString, value: JSValue) -> JsResult<()> {
        let mut current = Some(self.env);
        while let Some(id) = current {
            let (global, parent) = {
                let mut heap = self.rt.heap_mut();
                let env = heap.env_mut(id);
                if let Some(binding) = env.bindings.get_mut(name) {
                    if !binding.mutable {
                        drop(heap);
                        return self.throw(ErrorKind::TypeError, "Assignment to constant variable.");
                    }
                    binding.value = value;
                    return Ok(());
                }
                (env.global, env.parent)
            };
            if let Some(global) = global {
                self.put(global, &PropertyKey::String(name.clone()), value)?;
                return Ok(());
            }
            current = parent;
        }
        Ok(())
    }

    fn delete_identifier(&mut self, name: &JSString) -> JsResult<bool> {
        let mut current = Some(self.env);
        while let Some(id) = current {
            let (bound, global, parent) = {
                let heap = self.rt.heap();
                let env = heap.env(id);
                (env.get(name).is_some(), env.global, env.parent)
            };
            if bound {
                return Ok(false);
            }
            if let Some(global) = global {
                return self.delete_property(global, &PropertyKey::String(name.clone()), false);
            }
            current = parent;
        }
        Ok(true)
    }

    /// `this` of the innermost non-arrow function, or the global object
    pub(crate) fn this_value(&self) -> JSValue {
        let heap = self.rt.heap();
        let mut current = Some(self.env);
        while let Some(id) = current {
            let env = heap.env(id);
            if let Some(this) = &env.this_value {
                return this.clone();
            }
            current = env.parent;
        }
        JSValue::Undefined
    }

    // =========================================================================
    // Functions
    // =========================================================================

    /// Create a function object for a function literal
    pub(crate) fn make_closure(
        &mut self,
        node: &Arc<FunctionNode>,
        env: EnvId,
        name_hint: Option<&JSString>,
    ) -> ObjectId {
        let intrinsics = self.intrinsics();
        let name = node
            .name
            .clone()
            .or_else(|| name_hint.cloned())
            .unwrap_or_else(|| JSString::from(""));

        let mut heap = self.rt.heap_mut();
        let closure = Closure {
            node: node.clone(),
            env,
            source: self.source.clone(),
        };
        let mut function = JSObject::with_data(
            ClassId::Function,
            Some(intrinsics.function_prototype),
            ObjectData::Function(FunctionKind::Closure(closure)),
        );
        function.realm = Some(self.realm);
        let hidden = PropertyFlags::READ_ONLY | PropertyFlags::DONT_ENUM;
        function.define_value("length".into(), JSValue::from(node.params.len()), hidden);
        function.define_value("name".into(), JSValue::String(name), hidden);
        let func = heap.alloc_object(function);

        if !node.is_arrow {
            let mut prototype = JSObject::new(ClassId::Object, Some(intrinsics.object_prototype));
            prototype.define_value("constructor".into(), JSValue::Object(func), PropertyFlags::DONT_ENUM);
            let prototype = heap.alloc_object(prototype);
            heap.object_mut(func).define_value(
                "prototype".into(),
                JSValue::Object(prototype),
                PropertyFlags::DONT_ENUM | PropertyFlags::DONT_DELETE,
            );
        }
        func
    }

    /// Call a function value
    pub fn call(&mut self, func: &JSValue, this: JSValue, args: &[JSValue]) -> JsResult<JSValue> {
        let Some(id) = func.as_object() else {
            let desc = self.describe_value(func);
            return self.throw(ErrorKind::TypeError, format!("{} is not a function", desc));
        };
        let target = {
            let heap = self.rt.heap();
            let obj = heap.object(id);
            obj.function_kind().map(|kind| (kind.clone(), obj.realm))
        };
        let Some((kind, realm)) = target else {
            return self.throw(ErrorKind::TypeError, "object is not a function");
        };

        let saved_realm = self.realm;
        if let Some(realm) = realm {
            self.realm = realm;
        }
        let result = match kind {
            FunctionKind::Closure(closure) => self.call_closure(id, &closure, this, args),
            FunctionKind::Native { func, .. } => self.call_native(
                func,
                &NativeCall {
                    this,
                    args,
                    callee: id,
                    construct: false,
                },
            ),
            FunctionKind::Bound(bound) => {
                let BoundFunction {
                    target,
                    this,
                    args: bound_args,
                } = *bound;
                let mut all = bound_args;
                all.extend_from_slice(args);
                self.call(&JSValue::Object(target), this, &all)
            }
            FunctionKind::Host { template } => self.call_host(template, id, this, args, false),
        };
        self.realm = saved_realm;
        result
    }

    /// `new func(...args)`
    pub fn construct(&mut self, func: &JSValue, args: &[JSValue]) -> JsResult<JSValue> {
        let target = func.as_object().and_then(|id| {
            let heap = self.rt.heap();
            let obj = heap.object(id);
            obj.function_kind().map(|kind| (id, kind.clone(), obj.realm))
        });
        let Some((id, kind, realm)) = target.filter(|(_, kind, _)| kind.is_constructor()) else {
            let desc = self.describe_value(func);
            return self.throw(ErrorKind::TypeError, format!("{} is not a constructor", desc));
        };

        let saved_realm = self.realm;
        if let Some(realm) = realm {
            self.realm = realm;
        }
        let result = self.construct_kind(id, kind, args);
        self.realm = saved_realm;
        result
    }

    fn construct_kind(&mut self, id: ObjectId, kind: FunctionKind, args: &[JSValue]) -> JsResult<JSValue> {
        match kind {
            FunctionKind::Closure(closure) => {
                let instance = self.instance_for(id)?;
                let result = self.call_closure(id, &closure, JSValue::Object(instance), args)?;
                Ok(if result.is_object() { result } else { JSValue::Object(instance) })
            }
            FunctionKind::Native { func, .. } => self.call_native(
                func,
                &NativeCall {
                    this: JSValue::Undefined,
                    args,
                    callee: id,
                    construct: true,
                },
            ),
            FunctionKind::Bound(bound) => {
                let mut all = bound.args;
                all.extend_from_slice(args);
                self.construct(&JSValue::Object(bound.target), &all)
            }
            FunctionKind::Host { template } => {
                let instance = self.instance_for(id)?;
                let host = self.rt.host();
                host.init_instance(self, template, instance)?;
                let result = self.call_host(template, id, JSValue::Object(instance), args, true)?;
                Ok(if result.is_object() { result } else { JSValue::Object(instance) })
            }
        }
    }

    /// Fresh object whose prototype is `constructor.prototype`
    fn instance_for(&mut self, constructor: ObjectId) -> JsResult<ObjectId> {
        let proto = match self.get(constructor, &PropertyKey::from("prototype"))? {
            JSValue::Object(proto) => proto,
            _ => self.intrinsics().object_prototype,
        };
        Ok(self.new_object_with_proto(Some(proto)))
    }

    fn call_host(
        &mut self,
        template: u64,
        callee: ObjectId,
        this: JSValue,
        args: &[JSValue],
        construct: bool,
    ) -> JsResult<JSValue> {
        self.check_call_depth()?;
        let host = self.rt.host();
        let result = host.call(
            self,
            HostCall {
                template,
                callee,
                this,
                args,
                construct,
            },
        )?;
        Ok(result.unwrap_or_default())
    }

    fn call_native(&mut self, func: NativeFn, call: &NativeCall<'_>) -> JsResult<JSValue> {
        if self.native_depth > self.rt.config().max_call_depth * 4 {
            return self.throw(ErrorKind::RangeError, "Maximum call stack size exceeded");
        }
        self.native_depth += 1;
        let result = func(self, call);
        self.native_depth -= 1;
        result
    }

    fn check_call_depth(&mut self) -> JsResult<()> {
        let depth = self.rt.state().call_stack.depth();
        if depth > self.rt.config().max_call_depth {
            return self.throw(ErrorKind::RangeError, "Maximum call stack size exceeded");
        }
        Ok(())
    }

    fn call_closure(
        &mut self,
        callee: ObjectId,
        closure: &Closure,
        this: JSValue,
        args: &[JSValue],
    ) -> JsResult<JSValue> {
        self.check_call_depth()?;
        let node = &closure.node;

        let mut env = Env::new(Some(closure.env));
        if !node.is_arrow {
            let this = if this.is_nullish() {
                JSValue::Object(self.global())
            } else {
                this
            };
            env.this_value = Some(this);
        }
        if node.is_expression {
            if let Some(name) = &node.name {
                env.declare(name.clone(), JSValue::Object(callee), true);
            }
        }
        for (i, param) in node.params.iter().enumerate() {
            env.declare(param.clone(), args.get(i).cloned().unwrap_or_default(), true);
        }
        if node.uses_arguments && !node.is_arrow {
            let arguments = self.new_arguments(args);
            env.declare(JSString::from("arguments"), JSValue::Object(arguments), true);
        }
        for name in &node.var_names {
            if !env.bindings.contains_key(name) {
                env.declare(name.clone(), JSValue::Undefined, true);
            }
        }
        let env = self.rt.heap_mut().alloc_env(env);
        for function in &node.functions {
            let func = self.make_closure(function, env, None);
            if let Some(name) = &function.name {
                self.rt
                    .heap_mut()
                    .env_mut(env)
                    .declare(name.clone(), JSValue::Object(func), true);
            }
        }

        let name = self.function_name(callee);
        self.rt.state_mut().call_stack.push(CallFrame::new(
            name,
            closure.source.clone(),
            node.line,
            node.column,
        ));
        let saved_env = std::mem::replace(&mut self.env, env);
        let saved_source = std::mem::replace(&mut self.source, closure.source.clone());
        let saved_completion = std::mem::take(&mut self.completion);

        let result = self.exec_stmts(&node.body);

        self.env = saved_env;
        self.source = saved_source;
        self.completion = saved_completion;
        self.rt.state_mut().call_stack.pop();

        match result? {
            Completion::Return(value) => Ok(value),
            _ => Ok(JSValue::Undefined),
        }
    }

    /// Name a function reports in stack traces
    fn function_name(&self, func: ObjectId) -> Option<JSString> {
        let heap = self.rt.heap();
        let name = heap.object(func).properties.get(&PropertyKey::from("name"))?;
        match &name.slot {
            crate::runtime::property::PropertySlot::Data(JSValue::String(s)) if !s.is_empty() => {
                Some(s.clone())
            }
            _ => None,
        }
    }

    fn new_arguments(&mut self, args: &[JSValue]) -> ObjectId {
        let proto = self.intrinsics().object_prototype;
        let obj = JSObject::with_data(
            ClassId::Arguments,
            Some(proto),
            ObjectData::Array(JSArray::from_values(args.to_vec())),
        );
        self.alloc(obj)
    }

    /// Length of an array-like object
    pub(crate) fn length_of(&mut self, obj: ObjectId) -> JsResult<u32> {
        let fast = {
            let heap = self.rt.heap();
            match &heap.object(obj).data {
                ObjectData::Array(arr) => Some(arr.len()),
                ObjectData::Uint8Array(TypedView { length, .. }) => Some(*length as u32),
                ObjectData::Primitive(JSValue::String(s)) => Some(s.len_utf16() as u32),
                _ => None,
            }
        };
        match fast {
            Some(length) => Ok(length),
            None => {
                let length = self.get(obj, &PropertyKey::from("length"))?;
                let length = self.to_number(&length)?;
                Ok(if length.is_nan() || length <= 0.0 {
                    0
                } else {
                    length.min(u32::MAX as f64) as u32
                })
            }
        }
    }

    // =========================================================================
    // Exceptions
    // =========================================================================

    /// Snapshot a thrown value for the embedder
    pub fn describe_exception(&mut self, value: &JSValue) -> Exception {
        let message = match self.to_string(value) {
            Ok(s) => s.to_string(),
            Err(_) => "Uncaught exception".to_string(),
        };
        let stack_trace = value.as_object().and_then(|id| {
            let heap = self.rt.heap();
            let stack = heap.object(id).properties.get(&PropertyKey::from("stack"))?;
            match &stack.slot {
                crate::runtime::property::PropertySlot::Data(JSValue::String(s)) => Some(s.to_string()),
                _ => None,
            }
        });

        let mut exception = Exception::new(message);
        exception.stack_trace = stack_trace;
        let site = self.rt.state().throw_site.clone();
        if let Some(site) = site {
            let source = &site.source;
            let start = source.report_column(site.line, site.column) - 1;
            let source_line = source.line_text(site.line).map(str::to_string);
            let width = source_line.as_deref().map_or(1, |line| {
                let byte = line
                    .char_indices()
                    .nth(site.column.saturating_sub(1) as usize)
                    .map_or(line.len(), |(i, _)| i);
                token_width(line, byte)
            });
            exception.resource_name = Some(source.name.to_string());
            exception.line = Some(source.report_line(site.line));
            exception.start_column = Some(start);
            exception.end_column = Some(start + width as i64);
            exception.source_line = source_line;
        }
        exception
    }
}

/// Short description of a callee for error messages
fn describe_expr(expr: &Expr) -> String {
    match expr {
        Expr::Ident(name) => name.to_string(),
        Expr::This => "this".to_string(),
        Expr::Member(object, MemberProp::Named(name)) => format!("{}.{}", describe_expr(object), name),
        Expr::Member(object, MemberProp::Computed(_)) => format!("{}[...]", describe_expr(object)),
        Expr::Call { callee, .. } => format!("{}(...)", describe_expr(callee)),
        _ => "expression".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::parser::parse;
    use crate::runtime::NoHost;

    fn run(code: &str) -> Result<JSValue, String> {
        let rt = Runtime::new(EngineConfig::default(), Arc::new(NoHost));
        let realm = rt.create_realm();
        let program = parse(code).map_err(|e| e.to_string())?;
        let source = Arc::new(ScriptSource::anonymous(Arc::from(code)));
        let result = rt.execute(realm, |interp| {
            let value = interp.run_program(&program, source)?;
            // Stringify inside the realm so objects can be inspected
            interp.to_string(&value).map(JSValue::String)
        });
        result.map_err(|thrown| thrown.exception.message)
    }

    fn run_str(code: &str) -> String {
        match run(code) {
            Ok(value) => value.as_string().map(|s| s.to_string()).unwrap_or_default(),
            Err(message) => panic!("uncaught: {}", message),
        }
    }

    #[test]
    fn test_arithmetic_and_strings() {
        assert_eq!(run_str("1 + 2 * 3"), "7");
        assert_eq!(run_str("'Hello ' + 'World!'"), "Hello World!");
        assert_eq!(run_str("'n' + 1 + 2"), "n12");
        assert_eq!(run_str("2 ** 10"), "1024");
        assert_eq!(run_str("7 % -3"), "1");
        assert_eq!(run_str("-1 >>> 28"), "15");
        assert_eq!(run_str("null ?? 'd'"), "d");
    }

    #[test]
    fn test_closures_and_hoisting() {
        assert_eq!(
            run_str("function outer() { var n = 0; return function () { return ++n; }; } var c = outer(); c(); c()"),
            "2"
        );
        assert_eq!(run_str("hoisted(); function hoisted() { return 'ok'; } hoisted()"), "ok");
        assert_eq!(run_str("var f = function fact(n) { return n <= 1 ? 1 : n * fact(n - 1); }; f(5)"), "120");
        assert_eq!(run_str("var add = (a, b) => a + b; add(2, 3)"), "5");
    }

    #[test]
    fn test_let_per_iteration() {
        assert_eq!(
            run_str("var fs = []; for (let i = 0; i < 3; i++) { fs.push(() => i); } fs.map(f => f()).join()"),
            "0,1,2"
        );
        assert_eq!(run("const c = 1; c = 2;").unwrap_err(), "TypeError: Assignment to constant variable.");
    }

    #[test]
    fn test_this_binding() {
        assert_eq!(run_str("var o = { v: 4, get() { return this.v; } }; o.get()"), "4");
        assert_eq!(
            run_str("var o = { v: 5, f: function () { return [1].map(() => this.v)[0]; } }; o.f()"),
            "5"
        );
        assert_eq!(run_str("function P(x) { this.x = x; } new P(9).x"), "9");
        assert_eq!(run_str("function Q() { return { y: 1 }; } new Q().y"), "1");
    }

    #[test]
    fn test_control_flow() {
        assert_eq!(
            run_str("var s = 0; outer: for (var i = 0; i < 5; i++) { for (var j = 0; j < 5; j++) { if (j == 2) continue outer; if (i == 3) break outer; s++; } } s"),
            "6"
        );
        assert_eq!(
            run_str("var r = ''; switch (2) { case 1: r += 'a'; case 2: r += 'b'; case 3: r += 'c'; break; default: r += 'd'; } r"),
            "bc"
        );
        assert_eq!(run_str("var k = []; for (var p in { a: 1, b: 2 }) k.push(p); k.join()"), "a,b");
        assert_eq!(run_str("var t = 0; for (var v of [1, 2, 3]) t += v; t"), "6");
        assert_eq!(run_str("var n = 0; do { n++; } while (n < 3); n"), "3");
    }

    #[test]
    fn test_try_catch_finally() {
        assert_eq!(run_str("var r; try { null.x; } catch (e) { r = e.name; } r"), "TypeError");
        assert_eq!(run_str("function f() { try { return 1; } finally { return 2; } } f()"), "2");
        assert_eq!(run_str("var log = []; try { try { throw 1; } finally { log.push('f'); } } catch (e) { log.push(e); } log.join()"), "f,1");
        assert_eq!(run("throw new RangeError('r')").unwrap_err(), "RangeError: r");
    }

    #[test]
    fn test_reference_errors() {
        assert_eq!(run("missing + 1").unwrap_err(), "ReferenceError: missing is not defined");
        assert_eq!(run_str("typeof missing"), "undefined");
        assert_eq!(run("var o = {}; o.f()").unwrap_err(), "TypeError: o.f is not a function");
    }

    #[test]
    fn test_call_depth_limit() {
        let handle = std::thread::Builder::new()
            .stack_size(64 * 1024 * 1024)
            .spawn(|| run("function r() { return r(); } r()"))
            .unwrap();
        let result = handle.join().unwrap();
        assert_eq!(result.unwrap_err(), "RangeError: Maximum call stack size exceeded");
    }

    #[test]
    fn test_arguments_object() {
        assert_eq!(run_str("function f() { return arguments.length + ':' + arguments[1]; } f(1, 2, 3)"), "3:2");
    }

    #[test]
    fn test_sloppy_globals() {
        assert_eq!(run_str("function f() { implicit = 3; } f(); implicit"), "3");
        assert_eq!(run_str("var g = 1; delete g"), "false");
        assert_eq!(run_str("h = 1; delete h"), "true");
    }
}
