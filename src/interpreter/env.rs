use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use super::value::Value;

/// A chained lexical scope.
///
/// Scopes are shared by reference: closures capture the environment they
/// were created in, so later mutations through the chain stay visible to
/// them. Parent links are fixed at creation, which keeps the chain a tree.
#[derive(Debug, Clone)]
pub struct Env(Rc<Scope>);

#[derive(Debug)]
struct Scope {
    vars: RefCell<HashMap<String, Value>>,
    parent: Option<Env>,
}

impl Env {
    pub fn root() -> Self {
        Self::with_parent(None)
    }

    /// A new innermost scope reading through to this one.
    pub fn extend(&self) -> Self {
        Self::with_parent(Some(self.clone()))
    }

    fn with_parent(parent: Option<Env>) -> Self {
        Self(Rc::new(Scope {
            vars: RefCell::new(HashMap::new()),
            parent,
        }))
    }

    /// Write into this scope unconditionally, shadowing any enclosing
    /// binding of the same name.
    pub fn define(&self, name: impl Into<String>, value: Value) {
        self.0.vars.borrow_mut().insert(name.into(), value);
    }

    /// The scope that owns `name`, walking the parent chain outward.
    pub fn lookup(&self, name: &str) -> Option<Env> {
        let mut scope = Some(self.clone());
        while let Some(env) = scope {
            if env.0.vars.borrow().contains_key(name) {
                return Some(env);
            }
            scope = env.0.parent.clone();
        }
        None
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        let mut scope = Some(self.clone());
        while let Some(env) = scope {
            if let Some(value) = env.0.vars.borrow().get(name) {
                return Some(value.clone());
            }
            scope = env.0.parent.clone();
        }
        None
    }

    /// Assign to the owning scope if the name is bound anywhere in the
    /// chain; otherwise create the binding here. This is the only way the
    /// surface language introduces variables.
    pub fn set(&self, name: &str, value: Value) {
        match self.lookup(name) {
            Some(owner) => owner.define(name, value),
            None => self.define(name, value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn define_and_get_in_one_scope() {
        let env = Env::root();
        env.define("x", Value::Int(1));
        assert_eq!(env.get("x"), Some(Value::Int(1)));
        assert_eq!(env.get("y"), None);
    }

    #[test]
    fn inner_scope_reads_through_to_outer() {
        let outer = Env::root();
        outer.define("x", Value::Int(1));
        let inner = outer.extend();
        assert_eq!(inner.get("x"), Some(Value::Int(1)));
    }

    #[test]
    fn set_writes_to_the_owning_scope() {
        let outer = Env::root();
        outer.define("x", Value::Int(1));
        let inner = outer.extend();
        inner.set("x", Value::Int(2));
        assert_eq!(outer.get("x"), Some(Value::Int(2)));
    }

    #[test]
    fn set_of_a_fresh_name_binds_the_current_scope() {
        let outer = Env::root();
        let inner = outer.extend();
        inner.set("x", Value::Int(1));
        assert_eq!(inner.get("x"), Some(Value::Int(1)));
        assert_eq!(outer.get("x"), None);
    }

    #[test]
    fn define_shadows_without_touching_the_outer_binding() {
        let outer = Env::root();
        outer.define("x", Value::Int(1));
        let inner = outer.extend();
        inner.define("x", Value::Int(2));
        assert_eq!(inner.get("x"), Some(Value::Int(2)));
        assert_eq!(outer.get("x"), Some(Value::Int(1)));
    }

    #[test]
    fn lookup_returns_the_owning_scope() {
        let outer = Env::root();
        outer.define("x", Value::Int(1));
        let inner = outer.extend();
        let owner = inner.lookup("x").expect("x should resolve");
        owner.define("x", Value::Int(3));
        assert_eq!(outer.get("x"), Some(Value::Int(3)));
        assert!(inner.lookup("missing").is_none());
    }
}
