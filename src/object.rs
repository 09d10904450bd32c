use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use crate::ast::NodeId;
use crate::error::RuntimeError;
use crate::intern::Symbol;
use crate::interpreter::Interpreter;
use crate::token::Span;
use crate::value::{NativeFn, Value};

pub type TypeRef = Rc<TypeData>;
pub type RuntimeObjectRef = Rc<RefCell<RuntimeObject>>;

#[derive(Debug, Clone)]
pub enum MethodBody {
    Native(NativeFn),
    UserDefined { params: Vec<Symbol>, body: NodeId },
}

#[derive(Debug, Clone)]
pub struct MethodInfo {
    pub body: MethodBody,
    pub is_static: bool,
    pub arity: i8,
}

#[derive(Debug, Clone)]
pub struct FieldDecl {
    pub name: String,
    pub is_const: bool,
    pub is_static: bool,
    pub init: Option<NodeId>,
}

/// Type/class metadata: field and method declarations, constructors, and the
/// per-type live-object census exposed through `typeof(T).ObjectCount()`.
#[derive(Debug)]
pub struct TypeData {
    pub name: String,
    pub base: RefCell<Option<TypeRef>>,
    pub fields: RefCell<Vec<FieldDecl>>,
    pub methods: RefCell<HashMap<String, Rc<MethodInfo>>>,
    pub constructors: RefCell<HashMap<i8, Rc<MethodInfo>>>,
    pub static_ctor: RefCell<Option<NodeId>>,
    pub static_ctor_ran: Cell<bool>,
    pub static_fields: RefCell<HashMap<String, Value>>,
    pub nested_types: RefCell<HashMap<String, TypeRef>>,
    pub object_count: Cell<usize>,
    pub enum_values: HashMap<String, i64>,
}

impl TypeData {
    pub fn new(name: impl Into<String>) -> TypeRef {
        let t = Rc::new(TypeData {
            name: name.into(),
            base: RefCell::new(None),
            fields: RefCell::new(Vec::new()),
            methods: RefCell::new(HashMap::new()),
            constructors: RefCell::new(HashMap::new()),
            static_ctor: RefCell::new(None),
            static_ctor_ran: Cell::new(false),
            static_fields: RefCell::new(HashMap::new()),
            nested_types: RefCell::new(HashMap::new()),
            object_count: Cell::new(0),
            enum_values: HashMap::new(),
        });
        t.add_native_method("ObjectCount", 0, true, native_object_count);
        t
    }

    fn method_key(name: &str, arity: i8) -> String {
        format!("{}/{}", name, arity)
    }

    pub fn add_method(&self, name: &str, info: MethodInfo) {
        let arity = info.arity;
        self.methods.borrow_mut().insert(Self::method_key(name, arity), Rc::new(info));
    }

    pub fn add_native_method(&self, name: &str, arity: i8, is_static: bool, f: NativeFn) {
        self.add_method(name, MethodInfo { body: MethodBody::Native(f), is_static, arity });
    }

    pub fn get_method(&self, name: &str, arity: i8) -> Option<Rc<MethodInfo>> {
        let methods = self.methods.borrow();
        if let Some(m) = methods.get(&Self::method_key(name, arity)) {
            return Some(m.clone());
        }
        if arity >= 0 {
            if let Some(m) = methods.get(&Self::method_key(name, -1)) {
                return Some(m.clone());
            }
        }
        drop(methods);
        self.base.borrow().as_ref().and_then(|b| b.get_method(name, arity))
    }

    pub fn add_field(&self, field: FieldDecl) {
        self.fields.borrow_mut().push(field);
    }

    pub fn get_field(&self, name: &str) -> Option<FieldDecl> {
        if let Some(f) = self.fields.borrow().iter().find(|f| f.name == name) {
            return Some(f.clone());
        }
        self.base.borrow().as_ref().and_then(|b| b.get_field(name))
    }

    pub fn add_constructor(&self, info: MethodInfo) {
        self.constructors.borrow_mut().insert(info.arity, Rc::new(info));
    }

    pub fn get_constructor(&self, arity: i8) -> Option<Rc<MethodInfo>> {
        self.constructors.borrow().get(&arity).cloned()
    }

    pub fn object_count(&self) -> usize {
        self.object_count.get()
    }

    pub fn increment_count(&self) {
        self.object_count.set(self.object_count.get() + 1);
    }

    pub fn decrement_count(&self) {
        self.object_count.set(self.object_count.get().saturating_sub(1));
    }

    /// Whether this type (or a base it inherits from) exposes a member
    /// named `name` - a static field, an enum value, or a method under any
    /// arity. Used to resolve `use`-imported classes: a `Name` expression
    /// unresolved in scope is rewritten to `Class::member` when exactly one
    /// `use`d class exposes it (see `ScopeStack::find_all`).
    pub fn exposes_member(&self, name: &str) -> bool {
        if self.static_fields.borrow().contains_key(name) {
            return true;
        }
        if self.enum_values.contains_key(name) {
            return true;
        }
        let prefix = format!("{}/", name);
        if self.methods.borrow().keys().any(|k| k.starts_with(&prefix)) {
            return true;
        }
        self.base.borrow().as_ref().is_some_and(|b| b.exposes_member(name))
    }

    pub fn is_instance_of(self: &TypeRef, other: &TypeRef) -> bool {
        let mut cur = Some(self.clone());
        while let Some(t) = cur {
            if Rc::ptr_eq(&t, other) {
                return true;
            }
            cur = t.base.borrow().clone();
        }
        false
    }
}

/// Payload distinguishing intrinsic object instances from plain user
/// instances; both carry the same `type_ref` + field-map shape.
#[derive(Debug, Clone)]
pub enum Payload {
    None,
    Array(Vec<Value>),
    Range { start: i64, end: i64, inclusive: bool },
    Slice { target: Box<Value>, start: i64, len: Option<i64> },
    Complex { re: f64, im: f64 },
}

#[derive(Debug)]
pub struct RuntimeObject {
    pub type_ref: TypeRef,
    pub fields: HashMap<String, Value>,
    pub payload: Payload,
}

impl RuntimeObject {
    pub fn new(type_ref: TypeRef) -> RuntimeObjectRef {
        type_ref.increment_count();
        Rc::new(RefCell::new(RuntimeObject { type_ref, fields: HashMap::new(), payload: Payload::None }))
    }

    pub fn with_payload(type_ref: TypeRef, payload: Payload) -> RuntimeObjectRef {
        type_ref.increment_count();
        Rc::new(RefCell::new(RuntimeObject { type_ref, fields: HashMap::new(), payload }))
    }

    pub fn to_display_string(&self) -> String {
        match &self.payload {
            Payload::Array(items) => {
                let parts: Vec<String> = items.iter().map(|v| v.to_display_string()).collect();
                format!("[{}]", parts.join(", "))
            }
            Payload::Range { start, end, inclusive } => {
                if *inclusive {
                    format!("{}..={}", start, end)
                } else {
                    format!("{}..{}", start, end)
                }
            }
            Payload::Complex { re, im } => format!("{}+{}i", re, im),
            Payload::Slice { .. } => format!("<Slice of {}>", self.type_ref.name),
            Payload::None => format!("<{} instance>", self.type_ref.name),
        }
    }
}

impl Drop for RuntimeObject {
    fn drop(&mut self) {
        self.type_ref.decrement_count();
    }
}

/// `typeof(T).ObjectCount()` — registered on every `TypeData`, including
/// user classes and enums, so it reads the receiver out of `args[0]` rather
/// than closing over a particular type.
pub fn native_object_count(_interp: &mut Interpreter, args: &[Value], span: Span) -> Result<Value, RuntimeError> {
    match args.first() {
        Some(Value::Type(t)) => Ok(Value::Integer(t.object_count() as i64)),
        _ => Err(RuntimeError::new(
            crate::error::RuntimeErrorKind::TypeMismatch,
            "ObjectCount requires a type receiver",
            span,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_count_tracks_live_instances() {
        let ty = TypeData::new("Foo");
        assert_eq!(ty.object_count(), 0);
        let a = RuntimeObject::new(ty.clone());
        assert_eq!(ty.object_count(), 1);
        let b = RuntimeObject::new(ty.clone());
        assert_eq!(ty.object_count(), 2);
        drop(a);
        assert_eq!(ty.object_count(), 1);
        drop(b);
        assert_eq!(ty.object_count(), 0);
    }

    #[test]
    fn get_method_falls_back_to_wildcard_arity_then_base() {
        let base = TypeData::new("Base");
        base.add_native_method("greet", -1, false, |_, _, _| Ok(Value::Null));
        let derived = TypeData::new("Derived");
        *derived.base.borrow_mut() = Some(base.clone());
        assert!(derived.get_method("greet", 2).is_some());
        assert!(derived.get_method("missing", 0).is_none());
    }
}
