use std::collections::HashMap;

use crate::value::Value;

/// All bindings for `name` found in `frame`'s overload list, if any.
fn find_all_in_frame<'a>(frame: &'a ScopeFrame, name: &str) -> Option<&'a [Binding]> {
    frame.bindings.get(name).filter(|list| !list.is_empty()).map(|list| list.as_slice())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BindingFlags(u8);

impl BindingFlags {
    pub const NONE: BindingFlags = BindingFlags(0);
    pub const CONST: BindingFlags = BindingFlags(1 << 0);
    pub const FUNCTION: BindingFlags = BindingFlags(1 << 1);
    pub const STATIC: BindingFlags = BindingFlags(1 << 2);
    pub const NATIVE: BindingFlags = BindingFlags(1 << 3);
    pub const CLASS: BindingFlags = BindingFlags(1 << 4);
    pub const ENUM: BindingFlags = BindingFlags(1 << 5);
    /// Synthesized by `find_all`'s `with_use` search: this binding is a
    /// `use`-imported class exposing the requested member, not a name bound
    /// directly in scope. The caller rewrites the access to `Class::member`.
    pub const USE_IMPORT: BindingFlags = BindingFlags(1 << 6);

    pub fn contains(self, other: BindingFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn union(self, other: BindingFlags) -> BindingFlags {
        BindingFlags(self.0 | other.0)
    }
}

/// A single binding in a scope frame. `arity` is `-1` for non-function
/// bindings and for the vararg/wildcard overload.
#[derive(Debug, Clone)]
pub struct Binding {
    pub value: Value,
    pub flags: BindingFlags,
    pub arity: i8,
}

impl Binding {
    pub fn variable(value: Value) -> Self {
        Self { value, flags: BindingFlags::NONE, arity: -1 }
    }

    pub fn constant(value: Value) -> Self {
        Self { value, flags: BindingFlags::CONST, arity: -1 }
    }

    pub fn function(value: Value, arity: i8) -> Self {
        Self { value, flags: BindingFlags::FUNCTION, arity }
    }
}

#[derive(Debug, Default)]
struct ScopeFrame {
    bindings: HashMap<String, Vec<Binding>>,
    uses: Vec<String>,
}

/// The lexical scope chain: a stack of frames, bottom is global.
#[derive(Debug, Default)]
pub struct ScopeStack {
    frames: Vec<ScopeFrame>,
}

impl ScopeStack {
    pub fn new() -> Self {
        let mut stack = Self { frames: Vec::new() };
        stack.push_scope();
        stack
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn push_scope(&mut self) {
        self.frames.push(ScopeFrame::default());
    }

    pub fn pop_scope(&mut self) {
        self.frames.pop();
    }

    /// Adds a binding to the current (innermost) frame's overload list for `name`.
    pub fn add(&mut self, name: &str, binding: Binding) {
        self.frames
            .last_mut()
            .expect("scope stack never empty")
            .bindings
            .entry(name.to_string())
            .or_default()
            .push(binding);
    }

    pub fn add_use(&mut self, class_name: &str) {
        self.frames.last_mut().expect("scope stack never empty").uses.push(class_name.to_string());
    }

    pub fn uses_in_scope(&self) -> Vec<String> {
        self.frames.iter().rev().flat_map(|f| f.uses.iter().cloned()).collect()
    }

    /// Finds the first binding for `name` matching `arity` (`-1` = any),
    /// walking outward unless `local_only`. Exact-arity matches are
    /// preferred; a wildcard (`-1`) overload is tried last.
    pub fn find(&self, name: &str, arity: i8, local_only: bool) -> Option<&Binding> {
        if local_only {
            return find_in_frame(self.frames.last().expect("scope stack never empty"), name, arity);
        }
        for frame in self.frames.iter().rev() {
            if let Some(b) = find_in_frame(frame, name, arity) {
                return Some(b);
            }
        }
        None
    }

    /// All bindings for `name`'s overload list (innermost matching frame
    /// first), restricted to the current frame when `local_only`. When
    /// `with_use` and no plain binding was found, widens the search to
    /// every `use` import visible in the chain: for each imported class
    /// whose bound type exposes a member named `name`, synthesizes a
    /// `USE_IMPORT`-flagged binding wrapping that class's `Value::Type` so
    /// the caller can rewrite the access to `Class::member`.
    pub fn find_all(&self, name: &str, local_only: bool, with_use: bool) -> Vec<Binding> {
        let plain: Vec<Binding> = if local_only {
            find_all_in_frame(self.frames.last().expect("scope stack never empty"), name)
                .map(|list| list.to_vec())
                .unwrap_or_default()
        } else {
            self.frames
                .iter()
                .rev()
                .find_map(|f| find_all_in_frame(f, name))
                .map(|list| list.to_vec())
                .unwrap_or_default()
        };
        if !plain.is_empty() || !with_use {
            return plain;
        }
        self.uses_in_scope()
            .iter()
            .filter_map(|class_name| {
                let class_binding = self.find(class_name, -1, false)?;
                let Value::Type(ty) = &class_binding.value else { return None };
                ty.exposes_member(name).then(|| Binding {
                    value: class_binding.value.clone(),
                    flags: BindingFlags::USE_IMPORT,
                    arity: -1,
                })
            })
            .collect()
    }

    pub fn set(&mut self, name: &str, value: Value) -> bool {
        for frame in self.frames.iter_mut().rev() {
            if let Some(list) = frame.bindings.get_mut(name) {
                if let Some(b) = list.iter_mut().find(|b| b.arity < 0) {
                    b.value = value;
                    return true;
                }
            }
        }
        false
    }

    pub fn is_const(&self, name: &str) -> bool {
        self.find(name, -1, false).map(|b| b.flags.contains(BindingFlags::CONST)).unwrap_or(false)
    }
}

fn find_in_frame<'a>(frame: &'a ScopeFrame, name: &str, arity: i8) -> Option<&'a Binding> {
    let list = frame.bindings.get(name)?;
    if arity < 0 {
        return list.first();
    }
    list.iter()
        .find(|b| b.arity == arity)
        .or_else(|| list.iter().find(|b| b.arity < 0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_pop_isolates_bindings() {
        let mut scope = ScopeStack::new();
        scope.push_scope();
        scope.add("x", Binding::variable(Value::Integer(1)));
        assert!(scope.find("x", -1, false).is_some());
        scope.pop_scope();
        assert!(scope.find("x", -1, false).is_none());
    }

    #[test]
    fn overload_resolution_prefers_exact_arity() {
        let mut scope = ScopeStack::new();
        scope.add("f", Binding::function(Value::Integer(1), 1));
        scope.add("f", Binding::function(Value::Integer(2), -1));
        assert_eq!(scope.find("f", 1, false).unwrap().value, Value::Integer(1));
        assert_eq!(scope.find("f", 2, false).unwrap().value, Value::Integer(2));
    }

    #[test]
    fn find_walks_parent_frames() {
        let mut scope = ScopeStack::new();
        scope.add("g", Binding::variable(Value::Integer(7)));
        scope.push_scope();
        assert_eq!(scope.find("g", -1, false).unwrap().value, Value::Integer(7));
        assert!(scope.find("g", -1, true).is_none());
    }
}
