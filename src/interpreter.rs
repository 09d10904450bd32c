//! Tree-walking evaluator.
//!
//! Control flow (`return`/`break`/`continue`/`breakout`) and runtime errors
//! are both modeled as the `Err` arm of an internal `Result`, so `?`
//! naturally threads them upward through nested evaluation. Every scope push
//! is paired with a pop via `with_scope`, which runs regardless of which
//! unwind kind (if any) comes back out of the closure.

use std::collections::HashMap;
use std::rc::Rc;

use crate::ast::{Ast, BinaryOp, ClassMember, LoopExit, Literal, NodeId, NodeKind, UnaryOp};
use crate::error::{ErrorKind, RuntimeError, RuntimeErrorKind};
use crate::intern::Interner;
use crate::intrinsics;
use crate::object::{FieldDecl, MethodBody, MethodInfo, Payload, RuntimeObject, RuntimeObjectRef, TypeData, TypeRef};
use crate::scope::{Binding, BindingFlags, ScopeStack};
use crate::token::Span;
use crate::value::{CallableData, Value};

const MAX_SCOPE_DEPTH: usize = 100;

#[derive(Debug)]
pub enum Unwind {
    Return(Value),
    Break,
    Continue,
    Breakout,
    Error(RuntimeError),
}

pub type EvalResult = Result<Value, Unwind>;

/// `foreach`'s iteration state. `Indexed` is a fast path over the collection
/// value itself (`Array`/`Range`/`Slice`/`String`, probed by position);
/// `Enumerator` holds the distinct object `GetEnumerator()` returned for
/// anything else, polled via `Next` each iteration.
enum Cursor {
    Indexed(Value),
    Enumerator(Value),
}

fn fail<T>(kind: RuntimeErrorKind, message: impl Into<String>, span: Span) -> Result<T, Unwind> {
    Err(Unwind::Error(RuntimeError::new(kind, message, span)))
}

pub struct Interpreter {
    pub interner: Interner,
    pub ast: Ast,
    pub scope: ScopeStack,
    pub primitive_types: HashMap<&'static str, TypeRef>,
}

impl Interpreter {
    pub fn new(interner: Interner, ast: Ast) -> Self {
        let mut interp = Interpreter { interner, ast, scope: ScopeStack::new(), primitive_types: HashMap::new() };
        intrinsics::install(&mut interp);
        interp
    }

    pub fn resolve(&self, sym: crate::intern::Symbol) -> String {
        self.interner.resolve(sym).to_string()
    }

    /// Parses `source` and grafts it onto this interpreter's AST arena,
    /// returning the new root. Used by `Runtime.Eval` to run code built at
    /// runtime on the live evaluator stack.
    pub fn parse_into_ast(&mut self, source: &str) -> Result<NodeId, Vec<crate::error::ParseError>> {
        let (fragment, fragment_root, errors) = {
            let mut lexer = crate::lexer::Lexer::new(source, &mut self.interner);
            let parser = crate::parser::Parser::new(&mut lexer);
            parser.parse_program()
        };
        if !errors.is_empty() {
            return Err(errors);
        }
        Ok(self.ast.append(fragment, fragment_root))
    }

    fn with_scope<F>(&mut self, f: F) -> EvalResult
    where
        F: FnOnce(&mut Self) -> EvalResult,
    {
        if self.scope.depth() >= MAX_SCOPE_DEPTH {
            return fail(RuntimeErrorKind::StackOverflow, "scope stack exceeded 100 frames", Span::default());
        }
        self.scope.push_scope();
        let result = f(self);
        self.scope.pop_scope();
        result
    }

    /// Evaluates a top-level program. Unlike a nested `{ ... }` block, the
    /// top level runs directly in the current scope frame (the global scope,
    /// or whatever frame the REPL/`Runtime.Eval` caller is already in)
    /// rather than pushing and popping its own — declarations made at the
    /// top level must stay visible to whatever runs next.
    pub fn run_program(&mut self, root: NodeId) -> EvalResult {
        match self.ast.kind(root).clone() {
            NodeKind::Statements { stmts } => self.eval_block(&stmts),
            _ => self.eval(root),
        }
    }

    /// Looks up a top-level `Main` function and, if present, calls it with
    /// `args` wrapped as an Array of Strings. Returns `Null` if no `Main`
    /// was declared (the `load` CLI subcommand relies on this).
    pub fn call_main(&mut self, args: &[String]) -> Result<Value, Unwind> {
        let binding = self.scope.find("Main", 1, false).cloned();
        let Some(binding) = binding else {
            return Ok(Value::Null);
        };
        let array_ty = self.primitive_type("Array");
        let items = args.iter().map(|a| Value::string(a.clone())).collect();
        let array = Value::Object(RuntimeObject::with_payload(array_ty, Payload::Array(items)));
        self.call_value(binding.value, &[array], Span::default())
    }

    pub fn eval(&mut self, id: NodeId) -> EvalResult {
        let span = self.ast.span(id);
        match self.ast.kind(id).clone() {
            NodeKind::Literal(lit) => Ok(self.literal_value(lit)),
            NodeKind::Name(sym) => self.eval_name(sym, span),
            NodeKind::This => match self.scope.find("this", -1, false) {
                Some(b) => Ok(b.value.clone()),
                None => fail(RuntimeErrorKind::UnknownIdentifier, "'this' is not bound here", span),
            },
            NodeKind::Unary { op, operand } => self.eval_unary(op, operand, span),
            NodeKind::Binary { op, left, right } => self.eval_binary(op, left, right, span),
            NodeKind::AssignName { name, op, value } => self.eval_assign_name(name, op, value, span),
            NodeKind::AssignField { target, field, op, value } => self.eval_assign_field(target, field, op, value, span),
            NodeKind::AssignIndex { target, index, op, value } => self.eval_assign_index(target, index, op, value, span),
            NodeKind::GetMember { target, member, static_access: _ } => {
                let target_val = self.eval(target)?;
                self.get_member(target_val, self.resolve(member).to_string(), span)
            }
            NodeKind::AccessArray { target, index } => {
                let t = self.eval(target)?;
                let i = self.eval(index)?;
                self.index_get(t, i, span)
            }
            NodeKind::InvokeFunction { callee, args } => self.eval_invoke(callee, &args, span),
            NodeKind::AnonymousFunction { .. } => Ok(Value::AstNode(id)),
            NodeKind::NewObject { class_name, args, field_inits } => self.eval_new(class_name, &args, &field_inits, span),
            NodeKind::Range { start, end, inclusive } => {
                let s = self.eval(start)?.to_integer(span).map_err(Unwind::Error)?;
                let e = self.eval(end)?.to_integer(span).map_err(Unwind::Error)?;
                let ty = self.primitive_type("Range");
                Ok(Value::Object(RuntimeObject::with_payload(ty, Payload::Range { start: s, end: e, inclusive })))
            }
            NodeKind::ArrayLiteral { elements } => {
                let mut items = Vec::with_capacity(elements.len());
                for e in &elements {
                    items.push(self.eval(*e)?);
                }
                let ty = self.primitive_type("Array");
                Ok(Value::Object(RuntimeObject::with_payload(ty, Payload::Array(items))))
            }
            NodeKind::IfThenElse { cond, then_branch, else_branch } => {
                let c = self.eval(cond)?;
                if c.to_boolean(span).map_err(Unwind::Error)? {
                    self.eval(then_branch)
                } else if let Some(e) = else_branch {
                    self.eval(e)
                } else {
                    Ok(Value::Null)
                }
            }
            NodeKind::Match { subject, arms, default_arm } => self.eval_match(subject, &arms, default_arm, span),
            NodeKind::ExpressionStatement { expr, has_semicolon } => {
                let v = self.eval(expr)?;
                if has_semicolon {
                    Ok(Value::Null)
                } else {
                    Ok(v)
                }
            }
            NodeKind::Statements { stmts } => self.with_scope(|me| me.eval_block(&stmts)),
            NodeKind::VarVal { name, is_const, init } => self.eval_var_val(name, is_const, init, span),
            NodeKind::While { cond, body } => self.eval_while(cond, body, span),
            NodeKind::Repeat { count, body } => self.eval_repeat(count, body, span),
            NodeKind::For { init, cond, step, body } => self.eval_for(init, cond, step, body, span),
            NodeKind::ForEach { name, iterable, body } => self.eval_foreach(name, iterable, body, span),
            NodeKind::Return { value } => {
                let v = match value {
                    Some(e) => self.eval(e)?,
                    None => Value::Null,
                };
                Err(Unwind::Return(v))
            }
            NodeKind::BreakOrContinue(exit) => Err(match exit {
                LoopExit::Break => Unwind::Break,
                LoopExit::Continue => Unwind::Continue,
                LoopExit::Breakout => Unwind::Breakout,
            }),
            NodeKind::FunctionDeclaration { .. } => Ok(Value::Null),
            NodeKind::ClassDeclaration { .. } => Ok(Value::Null),
            NodeKind::EnumDeclaration { .. } => Ok(Value::Null),
            NodeKind::InterfaceDeclaration { .. } => Ok(Value::Null),
            NodeKind::UseStatement { name } => {
                self.scope.add_use(&self.resolve(name));
                Ok(Value::Null)
            }
        }
    }

    fn literal_value(&mut self, lit: Literal) -> Value {
        match lit {
            Literal::Integer(i) => Value::Integer(i),
            Literal::Real(r) => Value::Real(r),
            Literal::Boolean(b) => Value::Boolean(b),
            Literal::Null => Value::Null,
            Literal::String(sym) => Value::string(self.resolve(sym)),
        }
    }

    fn eval_block(&mut self, stmts: &[NodeId]) -> EvalResult {
        self.hoist(stmts);
        let mut last = Value::Null;
        for s in stmts {
            last = self.eval(*s)?;
        }
        Ok(last)
    }

    fn hoist(&mut self, stmts: &[NodeId]) {
        for &id in stmts {
            match self.ast.kind(id).clone() {
                NodeKind::FunctionDeclaration { name, params, body } => {
                    let name_str = self.resolve(name).to_string();
                    self.scope.add(&name_str, Binding::function(Value::AstNode(id), params.len() as i8));
                    let _ = body;
                }
                NodeKind::ClassDeclaration { name, .. } => {
                    let ty = self.build_class(id);
                    let name_str = self.resolve(name).to_string();
                    self.scope.add(&name_str, Binding { value: Value::Type(ty), flags: BindingFlags::CLASS, arity: -1 });
                }
                NodeKind::EnumDeclaration { name, variants } => {
                    let ty = self.build_enum(&variants);
                    let name_str = self.resolve(name).to_string();
                    self.scope.add(&name_str, Binding { value: Value::Type(ty), flags: BindingFlags::ENUM, arity: -1 });
                }
                _ => {}
            }
        }
    }

    // ---------- names, members, indexing ----------

    fn eval_name(&mut self, sym: crate::intern::Symbol, span: Span) -> EvalResult {
        let name = self.resolve(sym).to_string();
        let bindings = self.scope.find_all(&name, false, true);
        match bindings.len() {
            0 => fail(RuntimeErrorKind::UnknownIdentifier, format!("undefined name '{}'", name), span),
            1 => {
                let b = &bindings[0];
                if b.flags.contains(BindingFlags::USE_IMPORT) {
                    // Reachable only via `use`: rewrite to `Class::member` and re-evaluate.
                    self.get_member(b.value.clone(), name, span)
                } else {
                    Ok(b.value.clone())
                }
            }
            _ => {
                if bindings.iter().all(|b| b.flags.contains(BindingFlags::FUNCTION)) {
                    Ok(Value::string(name))
                } else {
                    fail(RuntimeErrorKind::MultipleSymbols, format!("'{}' is ambiguous", name), span)
                }
            }
        }
    }

    fn get_member(&mut self, target: Value, member: String, span: Span) -> EvalResult {
        match &target {
            Value::Type(t) => {
                if let Some(v) = t.static_fields.borrow().get(&member) {
                    return Ok(v.clone());
                }
                if let Some(v) = t.enum_values.get(&member) {
                    return Ok(Value::Integer(*v));
                }
                Ok(Value::Callable(Rc::new(CallableData {
                    name: member,
                    instance: Some(target.clone()),
                    node: None,
                    native: None,
                    arity: -1,
                })))
            }
            Value::Object(obj) => {
                if let Some(v) = obj.borrow().fields.get(&member) {
                    return Ok(v.clone());
                }
                Ok(Value::Callable(Rc::new(CallableData {
                    name: member,
                    instance: Some(target.clone()),
                    node: None,
                    native: None,
                    arity: -1,
                })))
            }
            Value::String(_) => Ok(Value::Callable(Rc::new(CallableData {
                name: member,
                instance: Some(target.clone()),
                node: None,
                native: None,
                arity: -1,
            }))),
            _ => fail(RuntimeErrorKind::UnknownMember, format!("no member '{}' on {}", member, target.type_name()), span),
        }
    }

    fn index_get(&mut self, target: Value, index: Value, span: Span) -> EvalResult {
        if let Value::Object(obj) = &target {
            let is_range_index = matches!(&index, Value::Object(o) if matches!(o.borrow().payload, Payload::Range { .. }));
            if is_range_index {
                return self.slice_of(&target, &index, span);
            }
            let idx = index.to_integer(span).map_err(Unwind::Error)?;
            let b = obj.borrow();
            return match &b.payload {
                Payload::Array(items) => {
                    if idx < 0 || idx as usize >= items.len() {
                        drop(b);
                        fail(RuntimeErrorKind::IndexOutOfRange, format!("index {} out of range", idx), span)
                    } else {
                        Ok(items[idx as usize].clone())
                    }
                }
                Payload::Slice { target: inner, start, len } => {
                    let base = (**inner).clone();
                    let start = *start;
                    let len = *len;
                    drop(b);
                    self.slice_index(&base, start, len, idx, span)
                }
                _ => {
                    drop(b);
                    fail(RuntimeErrorKind::IndexerNotSupported, "type does not support indexing", span)
                }
            };
        }
        if let Value::String(s) = &target {
            let idx = index.to_integer(span).map_err(Unwind::Error)?;
            let bytes = s.as_bytes();
            if idx < 0 || idx as usize >= bytes.len() {
                return fail(RuntimeErrorKind::IndexOutOfRange, format!("index {} out of range", idx), span);
            }
            return Ok(Value::Integer(bytes[idx as usize] as i64));
        }
        fail(RuntimeErrorKind::IndexerNotSupported, format!("{} does not support indexing", target.type_name()), span)
    }

    fn slice_index(&mut self, base: &Value, start: i64, len: Option<i64>, idx: i64, span: Span) -> EvalResult {
        let real_idx = start + idx;
        if idx < 0 || len.map(|l| idx >= l).unwrap_or(false) {
            return fail(RuntimeErrorKind::IndexOutOfRange, format!("slice index {} out of range", idx), span);
        }
        self.index_get(base.clone(), Value::Integer(real_idx), span)
    }

    fn slice_of(&mut self, target: &Value, range: &Value, span: Span) -> EvalResult {
        let (start, end, inclusive) = if let Value::Object(o) = range {
            match o.borrow().payload {
                Payload::Range { start, end, inclusive } => (start, end, inclusive),
                _ => unreachable!(),
            }
        } else {
            return fail(RuntimeErrorKind::TypeMismatch, "expected a Range", span);
        };
        let len = if inclusive { (end - start + 1).max(0) } else { (end - start).max(0) };
        let ty = self.primitive_type("Slice");
        Ok(Value::Object(RuntimeObject::with_payload(
            ty,
            Payload::Slice { target: Box::new(target.clone()), start, len: Some(len) },
        )))
    }

    // ---------- assignment ----------

    fn eval_assign_name(&mut self, name: crate::intern::Symbol, op: Option<BinaryOp>, value: NodeId, span: Span) -> EvalResult {
        let name_str = self.resolve(name).to_string();
        if self.scope.is_const(&name_str) {
            return fail(RuntimeErrorKind::InvalidType, format!("cannot assign to const '{}'", name_str), span);
        }
        let rhs = self.eval(value)?;
        let newv = match op {
            Some(o) => {
                let cur = self
                    .scope
                    .find(&name_str, -1, false)
                    .map(|b| b.value.clone())
                    .ok_or(())
                    .map_err(|_| Unwind::Error(RuntimeError::new(RuntimeErrorKind::UnknownIdentifier, &name_str, span)))?;
                self.apply_binary(o, cur, rhs, span)?
            }
            None => rhs,
        };
        if !self.scope.set(&name_str, newv.clone()) {
            return fail(RuntimeErrorKind::UnknownIdentifier, format!("undefined name '{}'", name_str), span);
        }
        Ok(newv)
    }

    fn eval_assign_field(
        &mut self,
        target: NodeId,
        field: crate::intern::Symbol,
        op: Option<BinaryOp>,
        value: NodeId,
        span: Span,
    ) -> EvalResult {
        let field_name = self.resolve(field).to_string();
        let target_val = self.eval(target)?;
        let rhs = self.eval(value)?;
        match &target_val {
            Value::Object(obj) => {
                let cur = obj.borrow().fields.get(&field_name).cloned();
                let newv = match op {
                    Some(o) => {
                        let cur = cur.ok_or_else(|| {
                            Unwind::Error(RuntimeError::new(RuntimeErrorKind::UnknownMember, &field_name, span))
                        })?;
                        self.apply_binary(o, cur, rhs, span)?
                    }
                    None => rhs,
                };
                obj.borrow_mut().fields.insert(field_name, newv.clone());
                Ok(newv)
            }
            Value::Type(t) => {
                let cur = t.static_fields.borrow().get(&field_name).cloned();
                let newv = match op {
                    Some(o) => {
                        let cur = cur.ok_or_else(|| {
                            Unwind::Error(RuntimeError::new(RuntimeErrorKind::UnknownMember, &field_name, span))
                        })?;
                        self.apply_binary(o, cur, rhs, span)?
                    }
                    None => rhs,
                };
                t.static_fields.borrow_mut().insert(field_name, newv.clone());
                Ok(newv)
            }
            _ => fail(RuntimeErrorKind::UnknownMember, format!("cannot set field on {}", target_val.type_name()), span),
        }
    }

    fn eval_assign_index(
        &mut self,
        target: NodeId,
        index: NodeId,
        op: Option<BinaryOp>,
        value: NodeId,
        span: Span,
    ) -> EvalResult {
        let target_val = self.eval(target)?;
        let index_val = self.eval(index)?;
        let rhs = self.eval(value)?;
        if let Value::Object(obj) = &target_val {
            let idx = index_val.to_integer(span).map_err(Unwind::Error)?;
            let mut b = obj.borrow_mut();
            if let Payload::Array(items) = &mut b.payload {
                if idx < 0 || idx as usize >= items.len() {
                    return fail(RuntimeErrorKind::IndexOutOfRange, format!("index {} out of range", idx), span);
                }
                let newv = match op {
                    Some(o) => {
                        let cur = items[idx as usize].clone();
                        drop(b);
                        let nv = self.apply_binary(o, cur, rhs, span)?;
                        if let Value::Object(obj2) = &target_val {
                            if let Payload::Array(items2) = &mut obj2.borrow_mut().payload {
                                items2[idx as usize] = nv.clone();
                            }
                        }
                        return Ok(nv);
                    }
                    None => rhs,
                };
                items[idx as usize] = newv.clone();
                return Ok(newv);
            }
        }
        fail(RuntimeErrorKind::IndexerNotSupported, "type does not support index assignment", span)
    }

    // ---------- operators ----------

    fn eval_unary(&mut self, op: UnaryOp, operand: NodeId, span: Span) -> EvalResult {
        let v = self.eval(operand)?;
        match op {
            UnaryOp::Neg => match v {
                Value::Integer(i) => Ok(Value::Integer(-i)),
                Value::Real(r) => Ok(Value::Real(-r)),
                _ => fail(RuntimeErrorKind::TypeMismatch, "unary '-' requires a number", span),
            },
            UnaryOp::Not => Ok(Value::Boolean(!v.to_boolean(span).map_err(Unwind::Error)?)),
            UnaryOp::BitNot => Ok(Value::Integer(!v.to_integer(span).map_err(Unwind::Error)?)),
            UnaryOp::Typeof => Ok(self.type_of_value(&v)),
        }
    }

    fn eval_binary(&mut self, op: BinaryOp, left: NodeId, right: NodeId, span: Span) -> EvalResult {
        match op {
            BinaryOp::And => {
                let l = self.eval(left)?;
                if !l.to_boolean(span).map_err(Unwind::Error)? {
                    return Ok(Value::Boolean(false));
                }
                let r = self.eval(right)?;
                Ok(Value::Boolean(r.to_boolean(span).map_err(Unwind::Error)?))
            }
            BinaryOp::Or => {
                let l = self.eval(left)?;
                if l.to_boolean(span).map_err(Unwind::Error)? {
                    return Ok(Value::Boolean(true));
                }
                let r = self.eval(right)?;
                Ok(Value::Boolean(r.to_boolean(span).map_err(Unwind::Error)?))
            }
            _ => {
                let l = self.eval(left)?;
                let r = self.eval(right)?;
                self.apply_binary(op, l, r, span)
            }
        }
    }

    fn apply_binary(&mut self, op: BinaryOp, l: Value, r: Value, span: Span) -> EvalResult {
        if let Value::Object(obj) = &l {
            if let Some(result) = self.try_invoke_operator(obj, op, &r, span)? {
                return Ok(result);
            }
        }
        use BinaryOp::*;
        if op == Add && (matches!(l, Value::String(_)) || matches!(r, Value::String(_))) {
            return Ok(Value::string(format!("{}{}", l.to_display_string(), r.to_display_string())));
        }
        match op {
            Eq => return Ok(Value::Boolean(l == r)),
            NotEq => return Ok(Value::Boolean(l != r)),
            _ => {}
        }
        let both_int = matches!((&l, &r), (Value::Integer(_), Value::Integer(_)));
        match op {
            Add | Sub | Mul | Div | Mod | Pow => {
                if both_int && !matches!(op, Pow) {
                    let (a, b) = (l.to_integer(span).unwrap(), r.to_integer(span).unwrap());
                    return self.integer_arith(op, a, b, span);
                }
                let a = l.to_real(span).map_err(Unwind::Error)?;
                let b = r.to_real(span).map_err(Unwind::Error)?;
                self.real_arith(op, a, b, both_int, span)
            }
            BitAnd | BitOr | BitXor | Shl | Shr => {
                let a = l.to_integer(span).map_err(Unwind::Error)?;
                let b = r.to_integer(span).map_err(Unwind::Error)?;
                Ok(Value::Integer(match op {
                    BitAnd => a & b,
                    BitOr => a | b,
                    BitXor => a ^ b,
                    Shl => a << b,
                    Shr => a >> b,
                    _ => unreachable!(),
                }))
            }
            Lt | LtEq | Gt | GtEq => self.compare(op, &l, &r, span),
            _ => fail(RuntimeErrorKind::UnknownOperator, format!("unsupported operator for {:?}", op), span),
        }
    }

    fn integer_arith(&mut self, op: BinaryOp, a: i64, b: i64, span: Span) -> EvalResult {
        use BinaryOp::*;
        match op {
            Add => Ok(Value::Integer(a.wrapping_add(b))),
            Sub => Ok(Value::Integer(a.wrapping_sub(b))),
            Mul => Ok(Value::Integer(a.wrapping_mul(b))),
            Div => {
                if b == 0 {
                    fail(RuntimeErrorKind::DivisionByZero, "integer division by zero", span)
                } else {
                    Ok(Value::Integer(a / b))
                }
            }
            Mod => {
                if b == 0 {
                    Ok(Value::Error(ErrorKind::DivideByZero))
                } else {
                    Ok(Value::Integer(a % b))
                }
            }
            _ => unreachable!(),
        }
    }

    fn real_arith(&mut self, op: BinaryOp, a: f64, b: f64, both_int: bool, span: Span) -> EvalResult {
        use BinaryOp::*;
        match op {
            Add => Ok(Value::Real(a + b)),
            Sub => Ok(Value::Real(a - b)),
            Mul => Ok(Value::Real(a * b)),
            Div => {
                if b == 0.0 {
                    if both_int {
                        fail(RuntimeErrorKind::DivisionByZero, "integer division by zero", span)
                    } else {
                        Ok(Value::Error(ErrorKind::DivideByZero))
                    }
                } else {
                    Ok(Value::Real(a / b))
                }
            }
            Mod => {
                if b == 0.0 {
                    Ok(Value::Error(ErrorKind::DivideByZero))
                } else {
                    Ok(Value::Real(a % b))
                }
            }
            Pow => {
                let result = a.powf(b);
                if both_int && b >= 0.0 {
                    Ok(Value::Integer(result as i64))
                } else {
                    Ok(Value::Real(result))
                }
            }
            _ => unreachable!(),
        }
    }

    fn compare(&mut self, op: BinaryOp, l: &Value, r: &Value, span: Span) -> EvalResult {
        use BinaryOp::*;
        let ordering = match (l, r) {
            (Value::String(a), Value::String(b)) => a.as_bytes().cmp(b.as_bytes()),
            _ => {
                let a = l.to_real(span).map_err(Unwind::Error)?;
                let b = r.to_real(span).map_err(Unwind::Error)?;
                a.partial_cmp(&b).ok_or(()).map_err(|_| {
                    Unwind::Error(RuntimeError::new(RuntimeErrorKind::TypeMismatch, "NaN is not ordered", span))
                })?
            }
        };
        Ok(Value::Boolean(match op {
            Lt => ordering.is_lt(),
            LtEq => ordering.is_le(),
            Gt => ordering.is_gt(),
            GtEq => ordering.is_ge(),
            _ => unreachable!(),
        }))
    }

    fn try_invoke_operator(&mut self, obj: &RuntimeObjectRef, op: BinaryOp, rhs: &Value, span: Span) -> Result<Option<Value>, Unwind> {
        let method_name = match op {
            BinaryOp::Add => "op_add",
            BinaryOp::Sub => "op_sub",
            BinaryOp::Mul => "op_mul",
            BinaryOp::Div => "op_div",
            _ => return Ok(None),
        };
        let type_ref = obj.borrow().type_ref.clone();
        if type_ref.get_method(method_name, 1).is_none() {
            return Ok(None);
        }
        let result = self.invoke_method(type_ref, Some(Value::Object(obj.clone())), method_name, std::slice::from_ref(rhs), span)?;
        Ok(Some(result))
    }

    pub fn type_of_value(&mut self, v: &Value) -> Value {
        match v {
            Value::Object(o) => Value::Type(o.borrow().type_ref.clone()),
            Value::Type(t) => Value::Type(t.clone()),
            Value::Integer(_) => Value::Type(self.primitive_type("Integer")),
            Value::Real(_) => Value::Type(self.primitive_type("Real")),
            Value::Boolean(_) => Value::Type(self.primitive_type("Boolean")),
            Value::String(_) => Value::Type(self.primitive_type("String")),
            Value::Null => Value::Type(self.primitive_type("Null")),
            _ => Value::Type(self.primitive_type("Function")),
        }
    }

    pub fn primitive_type(&mut self, name: &'static str) -> TypeRef {
        if let Some(t) = self.primitive_types.get(name) {
            return t.clone();
        }
        let t = TypeData::new(name);
        self.primitive_types.insert(name, t.clone());
        t
    }

    // ---------- calls ----------

    fn eval_invoke(&mut self, callee: NodeId, args: &[NodeId], span: Span) -> EvalResult {
        let mut argvals = Vec::with_capacity(args.len());
        for a in args {
            argvals.push(self.eval(*a)?);
        }
        match self.ast.kind(callee).clone() {
            NodeKind::Name(sym) => {
                let name = self.resolve(sym).to_string();
                let arity = argvals.len() as i8;
                let binding = self.scope.find(&name, arity, false).cloned();
                match binding {
                    Some(b) => self.call_value(b.value, &argvals, span),
                    None => fail(RuntimeErrorKind::UnknownIdentifier, format!("undefined function '{}'", name), span),
                }
            }
            NodeKind::GetMember { target, member, .. } => {
                let target_val = self.eval(target)?;
                let member_name = self.resolve(member).to_string();
                self.call_method_on(target_val, &member_name, &argvals, span)
            }
            _ => {
                let f = self.eval(callee)?;
                self.call_value(f, &argvals, span)
            }
        }
    }

    fn call_value(&mut self, f: Value, args: &[Value], span: Span) -> EvalResult {
        match f {
            Value::NativeFunction(nf) => nf(self, args, span).map_err(Unwind::Error),
            Value::AstNode(id) => self.invoke_ast_function(id, args, span, None),
            Value::Callable(c) => self.invoke_callable(&c, args, span),
            Value::String(name) => {
                let arity = args.len() as i8;
                let binding = self.scope.find(&name, arity, false).cloned();
                match binding {
                    Some(b) => self.call_value(b.value, args, span),
                    None => fail(RuntimeErrorKind::UnknownIdentifier, format!("undefined function '{}'", name), span),
                }
            }
            other => fail(RuntimeErrorKind::MethodNotFound, format!("{} is not callable", other.type_name()), span),
        }
    }

    fn invoke_callable(&mut self, c: &CallableData, args: &[Value], span: Span) -> EvalResult {
        self.call_method_on(c.instance.clone().unwrap_or(Value::Null), &c.name, args, span)
    }

    fn call_method_on(&mut self, target: Value, member: &str, args: &[Value], span: Span) -> EvalResult {
        match &target {
            Value::Type(t) => self.invoke_method(t.clone(), None, member, args, span),
            Value::Object(obj) => {
                let t = obj.borrow().type_ref.clone();
                self.invoke_method(t, Some(target.clone()), member, args, span)
            }
            Value::String(s) => intrinsics::call_string_method(self, s, member, args, span).map_err(Unwind::Error),
            _ => fail(RuntimeErrorKind::MethodNotFound, format!("no method '{}' on {}", member, target.type_name()), span),
        }
    }

    pub fn invoke_method(&mut self, ty: TypeRef, instance: Option<Value>, name: &str, args: &[Value], span: Span) -> EvalResult {
        let arity = args.len() as i8;
        let method = ty
            .get_method(name, arity)
            .ok_or_else(|| Unwind::Error(RuntimeError::new(RuntimeErrorKind::MethodNotFound, format!("{}.{}", ty.name, name), span)))?;
        match &method.body {
            MethodBody::Native(f) => {
                // Native statics still receive a receiver (the `Type` itself) as
                // `args[0]`, same shape as an instance method's `this` — lets one
                // native fn (e.g. `ObjectCount`) serve every type without closing
                // over which type it belongs to.
                let receiver = if method.is_static { Some(Value::Type(ty.clone())) } else { instance.clone() };
                let mut full = Vec::with_capacity(args.len() + 1);
                if let Some(r) = receiver {
                    full.push(r);
                }
                full.extend_from_slice(args);
                f(self, &full, span).map_err(Unwind::Error)
            }
            MethodBody::UserDefined { params, body } => {
                if params.len() != args.len() {
                    return fail(
                        RuntimeErrorKind::WrongNumberArguments,
                        format!("{} expects {} argument(s), got {}", name, params.len(), args.len()),
                        span,
                    );
                }
                let params = params.clone();
                let body = *body;
                self.with_scope(|me| {
                    if let Some(i) = &instance {
                        me.scope.add("this", Binding::constant(i.clone()));
                    }
                    for (p, a) in params.iter().zip(args.iter()) {
                        let pname = me.resolve(*p).to_string();
                        me.scope.add(&pname, Binding::variable(a.clone()));
                    }
                    match me.eval(body) {
                        Ok(v) => Ok(v),
                        Err(Unwind::Return(v)) => Ok(v),
                        Err(Unwind::Breakout) => Ok(Value::Null),
                        Err(e) => Err(e),
                    }
                })
            }
        }
    }

    fn invoke_ast_function(&mut self, node_id: NodeId, args: &[Value], span: Span, this: Option<Value>) -> EvalResult {
        let (params, body) = match self.ast.kind(node_id).clone() {
            NodeKind::FunctionDeclaration { params, body, .. } => (params, body),
            NodeKind::AnonymousFunction { params, body } => (params, body),
            _ => return fail(RuntimeErrorKind::MethodNotFound, "value is not a function", span),
        };
        if params.len() != args.len() {
            return fail(
                RuntimeErrorKind::WrongNumberArguments,
                format!("expected {} argument(s), got {}", params.len(), args.len()),
                span,
            );
        }
        self.with_scope(|me| {
            if let Some(t) = &this {
                me.scope.add("this", Binding::constant(t.clone()));
            }
            for (p, a) in params.iter().zip(args.iter()) {
                let pname = me.resolve(*p).to_string();
                me.scope.add(&pname, Binding::variable(a.clone()));
            }
            match me.eval(body) {
                Ok(v) => Ok(v),
                Err(Unwind::Return(v)) => Ok(v),
                Err(Unwind::Breakout) => Ok(Value::Null),
                Err(e) => Err(e),
            }
        })
    }

    // ---------- declarations ----------

    fn eval_var_val(&mut self, name: crate::intern::Symbol, is_const: bool, init: Option<NodeId>, _span: Span) -> EvalResult {
        let name_str = self.resolve(name).to_string();
        if self.scope.find(&name_str, -1, true).is_some() {
            return Ok(Value::Error(ErrorKind::DuplicateName));
        }
        let value = match init {
            Some(e) => self.eval(e)?,
            None => Value::Null,
        };
        let binding = if is_const { Binding::constant(value) } else { Binding::variable(value) };
        self.scope.add(&name_str, binding);
        Ok(Value::Null)
    }

    pub fn build_class(&mut self, id: NodeId) -> TypeRef {
        let (name, base, members) = match self.ast.kind(id).clone() {
            NodeKind::ClassDeclaration { name, base, members } => (name, base, members),
            _ => unreachable!(),
        };
        let ty = TypeData::new(self.resolve(name));
        if let Some(b) = base {
            let base_name = self.resolve(b).to_string();
            if let Some(Binding { value: Value::Type(bt), .. }) = self.scope.find(&base_name, -1, false) {
                *ty.base.borrow_mut() = Some(bt.clone());
            }
        }
        for m in &members {
            match m {
                ClassMember::Field { name, is_const, is_static, init } => {
                    let fname = self.resolve(*name).to_string();
                    ty.add_field(FieldDecl { name: fname, is_const: *is_const, is_static: *is_static, init: *init });
                }
                ClassMember::Method { name, params, body, is_static, is_ctor } => {
                    let mname = self.resolve(*name).to_string();
                    let arity = params.len() as i8;
                    let info = MethodInfo { body: MethodBody::UserDefined { params: params.clone(), body: *body }, is_static: *is_static, arity };
                    if *is_ctor {
                        if *is_static {
                            *ty.static_ctor.borrow_mut() = Some(*body);
                        } else {
                            ty.add_constructor(info);
                        }
                    } else {
                        ty.add_method(&mname, info);
                    }
                }
                ClassMember::Nested(nested_id) => {
                    let nested_name = match self.ast.kind(*nested_id) {
                        NodeKind::ClassDeclaration { name, .. } => self.resolve(*name).to_string(),
                        _ => continue,
                    };
                    let nested_ty = self.build_class(*nested_id);
                    ty.nested_types.borrow_mut().insert(nested_name, nested_ty);
                }
            }
        }
        ty
    }

    fn build_enum(&mut self, variants: &[(crate::intern::Symbol, Option<i64>)]) -> TypeRef {
        let mut values = HashMap::new();
        let mut next = 0i64;
        for (sym, explicit) in variants {
            let v = explicit.unwrap_or(next);
            values.insert(self.resolve(*sym).to_string(), v);
            next = v + 1;
        }
        let ty = Rc::new(TypeData {
            name: "Enum".to_string(),
            base: std::cell::RefCell::new(None),
            fields: std::cell::RefCell::new(Vec::new()),
            methods: std::cell::RefCell::new(HashMap::new()),
            constructors: std::cell::RefCell::new(HashMap::new()),
            static_ctor: std::cell::RefCell::new(None),
            static_ctor_ran: std::cell::Cell::new(true),
            static_fields: std::cell::RefCell::new(HashMap::new()),
            nested_types: std::cell::RefCell::new(HashMap::new()),
            object_count: std::cell::Cell::new(0),
            enum_values: values,
        });
        ty.add_native_method("ObjectCount", 0, true, crate::object::native_object_count);
        ty
    }

    fn ensure_static_init(&mut self, ty: &TypeRef) -> Result<(), Unwind> {
        if ty.static_ctor_ran.get() {
            return Ok(());
        }
        ty.static_ctor_ran.set(true);
        let fields: Vec<FieldDecl> = ty.fields.borrow().iter().filter(|f| f.is_static).cloned().collect();
        for f in fields {
            let v = match f.init {
                Some(e) => self.eval(e)?,
                None => Value::Null,
            };
            ty.static_fields.borrow_mut().insert(f.name, v);
        }
        let ctor = *ty.static_ctor.borrow();
        if let Some(body) = ctor {
            self.with_scope(|me| me.eval(body))?;
        }
        Ok(())
    }

    pub fn create_object(&mut self, ty: TypeRef, args: &[Value], span: Span) -> Result<Value, Unwind> {
        self.ensure_static_init(&ty)?;
        let obj = RuntimeObject::new(ty.clone());
        {
            let mut all_fields = Vec::new();
            let mut cur = Some(ty.clone());
            let mut seen = std::collections::HashSet::new();
            while let Some(t) = cur {
                for f in t.fields.borrow().iter().filter(|f| !f.is_static) {
                    if seen.insert(f.name.clone()) {
                        all_fields.push(f.clone());
                    }
                }
                cur = t.base.borrow().clone();
            }
            for f in all_fields {
                let v = match f.init {
                    Some(e) => self.eval(e)?,
                    None => Value::Null,
                };
                obj.borrow_mut().fields.insert(f.name, v);
            }
        }
        let arity = args.len() as i8;
        if let Some(ctor) = ty.get_constructor(arity) {
            match &ctor.body {
                MethodBody::UserDefined { params, body } => {
                    let params = params.clone();
                    let body = *body;
                    let this = Value::Object(obj.clone());
                    self.with_scope(|me| {
                        me.scope.add("this", Binding::constant(this.clone()));
                        for (p, a) in params.iter().zip(args.iter()) {
                            let pname = me.resolve(*p).to_string();
                            me.scope.add(&pname, Binding::variable(a.clone()));
                        }
                        match me.eval(body) {
                            Ok(v) => Ok(v),
                            Err(Unwind::Return(v)) => Ok(v),
                            Err(Unwind::Breakout) => Ok(Value::Null),
                            Err(e) => Err(e),
                        }
                    })?;
                }
                MethodBody::Native(f) => {
                    let mut full = vec![Value::Object(obj.clone())];
                    full.extend_from_slice(args);
                    f(self, &full, span).map_err(Unwind::Error)?;
                }
            }
        } else if !args.is_empty() {
            return Err(Unwind::Error(RuntimeError::new(
                RuntimeErrorKind::NoMatchingConstructor,
                format!("{} has no constructor accepting {} argument(s)", ty.name, args.len()),
                span,
            )));
        }
        Ok(Value::Object(obj))
    }

    fn eval_new(
        &mut self,
        class_name: crate::intern::Symbol,
        args: &[NodeId],
        field_inits: &[(crate::intern::Symbol, NodeId)],
        span: Span,
    ) -> EvalResult {
        let name = self.resolve(class_name).to_string();
        let ty = match self.scope.find(&name, -1, false) {
            Some(Binding { value: Value::Type(t), .. }) => t.clone(),
            _ => return fail(RuntimeErrorKind::UnknownIdentifier, format!("unknown class '{}'", name), span),
        };
        let mut argvals = Vec::with_capacity(args.len());
        for a in args {
            argvals.push(self.eval(*a)?);
        }
        let obj = self.create_object(ty, &argvals, span)?;
        for (fsym, expr) in field_inits {
            let fname = self.resolve(*fsym).to_string();
            let v = self.eval(*expr)?;
            if let Value::Object(o) = &obj {
                o.borrow_mut().fields.insert(fname, v);
            }
        }
        Ok(obj)
    }

    // ---------- control flow ----------

    fn eval_while(&mut self, cond: NodeId, body: NodeId, span: Span) -> EvalResult {
        loop {
            if !self.eval(cond)?.to_boolean(span).map_err(Unwind::Error)? {
                break;
            }
            match self.eval(body) {
                Err(Unwind::Break) => break,
                Err(Unwind::Continue) => continue,
                Err(e) => return Err(e),
                Ok(_) => {}
            }
        }
        Ok(Value::Null)
    }

    fn eval_repeat(&mut self, count: Option<NodeId>, body: NodeId, span: Span) -> EvalResult {
        let n = match count {
            Some(c) => Some(self.eval(c)?.to_integer(span).map_err(Unwind::Error)?),
            None => None,
        };
        let mut i: i64 = 0;
        loop {
            if let Some(n) = n {
                if i >= n {
                    break;
                }
            }
            match self.eval(body) {
                Err(Unwind::Break) => break,
                Err(Unwind::Continue) => {}
                Err(e) => return Err(e),
                Ok(_) => {}
            }
            i += 1;
        }
        Ok(Value::Null)
    }

    fn eval_for(&mut self, init: Option<NodeId>, cond: Option<NodeId>, step: Option<NodeId>, body: NodeId, span: Span) -> EvalResult {
        self.with_scope(|me| {
            if let Some(i) = init {
                me.eval(i)?;
            }
            loop {
                if let Some(c) = cond {
                    if !me.eval(c)?.to_boolean(span).map_err(Unwind::Error)? {
                        break;
                    }
                }
                match me.eval(body) {
                    Err(Unwind::Break) => break,
                    Err(Unwind::Continue) => {}
                    Err(e) => return Err(e),
                    Ok(_) => {}
                }
                if let Some(s) = step {
                    me.eval(s)?;
                }
            }
            Ok(Value::Null)
        })
    }

    // ---------- foreach / enumeration ----------

    fn eval_foreach(&mut self, name: crate::intern::Symbol, iterable: NodeId, body: NodeId, span: Span) -> EvalResult {
        let coll = self.eval(iterable)?;
        let name_str = self.resolve(name).to_string();
        let mut cursor = self.get_enumerator(coll, span)?;
        let mut idx: i64 = 0;
        loop {
            let next = self.enumerate_next(&mut cursor, idx, span)?;
            let item = match next {
                None => break,
                Some(v) => v,
            };
            self.scope.push_scope();
            self.scope.add(&name_str, Binding::variable(item));
            let r = self.eval(body);
            self.scope.pop_scope();
            match r {
                Err(Unwind::Break) => break,
                Err(Unwind::Continue) => {}
                Err(e) => return Err(e),
                Ok(_) => {}
            }
            idx += 1;
        }
        Ok(Value::Null)
    }

    /// Resolves the collection to an `Enumerator` cursor. `Array`/`Range`/
    /// `Slice`/`String` are enumerated index-by-index without a materialized
    /// enumerator object (a performance shortcut for these intrinsic types);
    /// any other `Object` must implement the Enumerable capability, and its
    /// `GetEnumerator()` is called exactly once here, matching `Next`/
    /// `GetNextValue` being polled on the returned enumerator - not on the
    /// collection itself - so two concurrent loops over the same collection
    /// get independent cursor state.
    fn get_enumerator(&mut self, coll: Value, span: Span) -> Result<Cursor, Unwind> {
        match &coll {
            Value::Object(obj) => {
                let b = obj.borrow();
                match &b.payload {
                    Payload::Array(_) | Payload::Range { .. } | Payload::Slice { .. } => {
                        drop(b);
                        Ok(Cursor::Indexed(coll))
                    }
                    _ => {
                        let ty = b.type_ref.clone();
                        drop(b);
                        let enumerator = self.invoke_method(ty, Some(coll), "GetEnumerator", &[], span)?;
                        Ok(Cursor::Enumerator(enumerator))
                    }
                }
            }
            Value::String(_) => Ok(Cursor::Indexed(coll)),
            _ => fail(RuntimeErrorKind::TypeMismatch, format!("{} is not enumerable", coll.type_name()), span),
        }
    }

    fn enumerate_next(&mut self, cursor: &mut Cursor, idx: i64, span: Span) -> Result<Option<Value>, Unwind> {
        match cursor {
            Cursor::Enumerator(enumerator) => {
                let Value::Object(obj) = enumerator else {
                    return fail(RuntimeErrorKind::TypeMismatch, "GetEnumerator() did not return an Object", span);
                };
                let ty = obj.borrow().type_ref.clone();
                match self.invoke_method(ty, Some(enumerator.clone()), "Next", &[], span) {
                    Ok(Value::Error(ErrorKind::CollectionEnd)) => Ok(None),
                    Ok(v) => Ok(Some(v)),
                    Err(e) => Err(e),
                }
            }
            Cursor::Indexed(coll) => match coll {
                Value::Object(obj) => {
                    let b = obj.borrow();
                    match &b.payload {
                        Payload::Array(items) => Ok(items.get(idx as usize).cloned()),
                        Payload::Range { start, end, inclusive } => {
                            let last = if *inclusive { *end } else { *end - 1 };
                            let v = start + idx;
                            Ok(if v <= last { Some(Value::Integer(v)) } else { None })
                        }
                        Payload::Slice { target, start, len } => {
                            let target = (**target).clone();
                            let start = *start;
                            let len = *len;
                            drop(b);
                            if len.map(|l| idx >= l).unwrap_or(false) {
                                return Ok(None);
                            }
                            match self.index_get(target, Value::Integer(start + idx), span) {
                                Ok(v) => Ok(Some(v)),
                                Err(Unwind::Error(e)) if e.kind == RuntimeErrorKind::IndexOutOfRange => Ok(None),
                                Err(e) => Err(e),
                            }
                        }
                        Payload::None | Payload::Complex { .. } => {
                            fail(RuntimeErrorKind::TypeMismatch, format!("{} is not enumerable", b.type_ref.name), span)
                        }
                    }
                }
                Value::String(s) => Ok(s.as_bytes().get(idx as usize).map(|b| Value::Integer(*b as i64))),
                _ => fail(RuntimeErrorKind::TypeMismatch, format!("{} is not enumerable", coll.type_name()), span),
            },
        }
    }

    fn eval_match(&mut self, subject: NodeId, arms: &[crate::ast::MatchArm], default_arm: Option<NodeId>, span: Span) -> EvalResult {
        let subject_val = self.eval(subject)?;
        for arm in arms {
            let is_predicate = matches!(self.ast.kind(arm.pattern), NodeKind::AnonymousFunction { params, .. } if params.len() == 1);
            let matched = if is_predicate {
                let result = self.invoke_ast_function(arm.pattern, std::slice::from_ref(&subject_val), span, None)?;
                result.to_boolean(span).map_err(Unwind::Error)?
            } else {
                let pattern_val = self.eval(arm.pattern)?;
                pattern_val == subject_val
            };
            if matched {
                return self.eval(arm.body);
            }
        }
        if let Some(d) = default_arm {
            return self.eval(d);
        }
        Ok(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;
    use crate::parser::Parser;

    fn run(src: &str) -> Value {
        let mut interner = Interner::new();
        let ast;
        let root;
        {
            let mut lexer = Lexer::new(src, &mut interner);
            let parser = Parser::new(&mut lexer);
            let (a, r, errors) = parser.parse_program();
            assert!(errors.is_empty(), "parse errors: {:?}", errors);
            ast = a;
            root = r;
        }
        let mut interp = Interpreter::new(interner, ast);
        interp.run_program(root).unwrap_or_else(|e| panic!("eval error: {:?}", e))
    }

    #[test]
    fn arithmetic_and_precedence() {
        assert_eq!(run("1 + 2 * 3;"), Value::Null);
        assert_eq!(run("1 + 2 * 3"), Value::Integer(7));
    }

    #[test]
    fn factorial_recursion() {
        let v = run("fn fact(n) { if (n == 0) { return 1; } return n * fact(n - 1); } fact(5)");
        assert_eq!(v, Value::Integer(120));
    }

    #[test]
    fn foreach_sums_array() {
        let v = run("var sum = 0; foreach (item in [1, 2, 3, 4]) { sum = sum + item; } sum");
        assert_eq!(v, Value::Integer(10));
    }

    #[test]
    fn range_iteration_count() {
        let v = run("var n = 0; foreach (i in 0..5) { n = n + 1; } n");
        assert_eq!(v, Value::Integer(5));
    }

    #[test]
    fn division_by_zero_is_runtime_error() {
        let mut interner = Interner::new();
        let mut lexer = Lexer::new("1 / 0", &mut interner);
        let parser = Parser::new(&mut lexer);
        let (ast, root, errors) = parser.parse_program();
        assert!(errors.is_empty());
        let mut interp = Interpreter::new(interner, ast);
        match interp.run_program(root) {
            Err(Unwind::Error(e)) => assert_eq!(e.kind, RuntimeErrorKind::DivisionByZero),
            other => panic!("expected DivisionByZero, got {:?}", other),
        }
    }

    #[test]
    fn object_count_drops_to_zero_after_scope_exit() {
        let src = "class Foo { } repeat 3 { new Foo(); }";
        let mut interner = Interner::new();
        let mut lexer = Lexer::new(src, &mut interner);
        let parser = Parser::new(&mut lexer);
        let (ast, root, errors) = parser.parse_program();
        assert!(errors.is_empty());
        let mut interp = Interpreter::new(interner, ast);
        interp.run_program(root).unwrap();
        let foo = interp.scope.find("Foo", -1, false).unwrap().value.clone();
        if let Value::Type(t) = foo {
            assert_eq!(t.object_count(), 0);
        } else {
            panic!("Foo is not a type");
        }
    }
}
