use std::rc::Rc;

use crate::ast::NodeId;
use crate::error::{ErrorKind, RuntimeError, RuntimeErrorKind};
use crate::interpreter::Interpreter;
use crate::object::{RuntimeObjectRef, TypeRef};
use crate::token::Span;

pub type NativeFn = fn(&mut Interpreter, &[Value], Span) -> Result<Value, RuntimeError>;

/// A bound call target: either a free function/native, or a method bound to
/// an instance (or a static method bound to its owning type).
#[derive(Debug, Clone)]
pub struct CallableData {
    pub name: String,
    pub instance: Option<Value>,
    pub node: Option<NodeId>,
    pub native: Option<NativeFn>,
    pub arity: i8,
}

#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Boolean(bool),
    String(Rc<String>),
    Object(RuntimeObjectRef),
    Type(TypeRef),
    AstNode(NodeId),
    NativeFunction(NativeFn),
    Callable(Rc<CallableData>),
    Error(ErrorKind),
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        use Value::*;
        match (self, other) {
            (Null, Null) => true,
            (Integer(a), Integer(b)) => a == b,
            (Real(a), Real(b)) => a == b,
            (Integer(a), Real(b)) | (Real(b), Integer(a)) => (*a as f64) == *b,
            (Boolean(a), Boolean(b)) => a == b,
            (String(a), String(b)) => a == b,
            (Object(a), Object(b)) => Rc::ptr_eq(a, b),
            (Type(a), Type(b)) => Rc::ptr_eq(a, b),
            (AstNode(a), AstNode(b)) => a == b,
            (NativeFunction(a), NativeFunction(b)) => std::ptr::eq(*a as *const (), *b as *const ()),
            (Callable(a), Callable(b)) => Rc::ptr_eq(a, b),
            (Error(a), Error(b)) => a == b,
            _ => false,
        }
    }
}

impl Value {
    pub fn string(s: impl Into<String>) -> Self {
        Value::String(Rc::new(s.into()))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "Null",
            Value::Integer(_) => "Integer",
            Value::Real(_) => "Real",
            Value::Boolean(_) => "Boolean",
            Value::String(_) => "String",
            Value::Object(_) => "Object",
            Value::Type(_) => "Type",
            Value::AstNode(_) => "Function",
            Value::NativeFunction(_) => "NativeFunction",
            Value::Callable(_) => "Callable",
            Value::Error(_) => "Error",
        }
    }

    pub fn to_integer(&self, span: Span) -> Result<i64, RuntimeError> {
        match self {
            Value::Integer(i) => Ok(*i),
            Value::Real(r) => Ok(*r as i64),
            Value::Boolean(b) => Ok(*b as i64),
            _ => Err(RuntimeError::new(
                RuntimeErrorKind::CannotConvertToInteger,
                format!("cannot convert {} to Integer", self.type_name()),
                span,
            )),
        }
    }

    pub fn to_real(&self, span: Span) -> Result<f64, RuntimeError> {
        match self {
            Value::Integer(i) => Ok(*i as f64),
            Value::Real(r) => Ok(*r),
            Value::Boolean(b) => Ok(if *b { 1.0 } else { 0.0 }),
            _ => Err(RuntimeError::new(
                RuntimeErrorKind::CannotConvertToReal,
                format!("cannot convert {} to Real", self.type_name()),
                span,
            )),
        }
    }

    pub fn to_boolean(&self, span: Span) -> Result<bool, RuntimeError> {
        match self {
            Value::Boolean(b) => Ok(*b),
            Value::Integer(i) => Ok(*i != 0),
            Value::Real(r) => Ok(*r != 0.0),
            Value::Null => Ok(false),
            Value::String(s) => Ok(!s.is_empty()),
            _ => Err(RuntimeError::new(
                RuntimeErrorKind::CannotConvertToBoolean,
                format!("cannot convert {} to Boolean", self.type_name()),
                span,
            )),
        }
    }

    pub fn to_display_string(&self) -> String {
        match self {
            Value::Null => "<empty>".to_string(),
            Value::Integer(i) => i.to_string(),
            Value::Real(r) => r.to_string(),
            Value::Boolean(b) => b.to_string(),
            Value::String(s) => (**s).clone(),
            Value::Object(obj) => obj.borrow().to_display_string(),
            Value::Type(t) => format!("<type {}>", t.name),
            Value::AstNode(_) => "<function>".to_string(),
            Value::NativeFunction(_) => "<native function>".to_string(),
            Value::Callable(c) => format!("<callable {}>", c.name),
            Value::Error(k) => format!("<Error:{}>", k),
        }
    }

    pub fn is_truthy(&self) -> bool {
        self.to_boolean(Span::default()).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_to_real_promotes() {
        assert_eq!(Value::Integer(3).to_real(Span::default()).unwrap(), 3.0);
    }

    #[test]
    fn real_to_integer_truncates_toward_zero() {
        assert_eq!(Value::Real(-3.9).to_integer(Span::default()).unwrap(), -3);
    }

    #[test]
    fn null_is_falsy_and_empty_string() {
        assert!(!Value::Null.to_boolean(Span::default()).unwrap());
        assert_eq!(Value::Null.to_display_string(), "<empty>");
    }

    #[test]
    fn integer_equals_real_by_value() {
        assert_eq!(Value::Integer(2), Value::Real(2.0));
    }
}
