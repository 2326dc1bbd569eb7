use crate::types::{ClassDescriptor, EnumDescriptor, TypeHandle};
use indexmap::IndexMap;
use std::cell::RefCell;
use std::rc::Rc;

/// A materialized object graph node.
///
/// Containers are shared handles: cloning a `Value` clones the handle, not
/// the contents, so a graph can hold the same list, map or instance at
/// several places and the serializer can recover that sharing by identity.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Rc<RefCell<Vec<Value>>>),
    Map(Rc<RefCell<IndexMap<String, Value>>>),
    Object(Rc<RefCell<Instance>>),
    Enum(Rc<EnumDescriptor>, String),
}

/// A dynamic instance of a registered class. Member access is by name; the
/// descriptor carries the metadata the evaluator and serializer consult.
#[derive(Debug)]
pub struct Instance {
    pub class: Rc<ClassDescriptor>,
    pub fields: IndexMap<String, Value>,
}

impl Instance {
    pub fn new(class: Rc<ClassDescriptor>) -> Self {
        Self {
            class,
            fields: IndexMap::new(),
        }
    }

    pub fn get(&self, member: &str) -> Option<Value> {
        self.fields.get(member).cloned()
    }

    pub fn set(&mut self, member: impl Into<String>, value: Value) {
        self.fields.insert(member.into(), value);
    }
}

impl Value {
    pub fn new_list(items: Vec<Value>) -> Value {
        Value::List(Rc::new(RefCell::new(items)))
    }

    pub fn new_map() -> Value {
        Value::Map(Rc::new(RefCell::new(IndexMap::new())))
    }

    pub fn new_object(class: Rc<ClassDescriptor>) -> Value {
        Value::Object(Rc::new(RefCell::new(Instance::new(class))))
    }

    /// Pointer identity of a shared container, the key of the serializer's
    /// reference map. Primitives have no identity.
    pub fn identity(&self) -> Option<usize> {
        match self {
            Value::List(rc) => Some(Rc::as_ptr(rc) as usize),
            Value::Map(rc) => Some(Rc::as_ptr(rc) as usize),
            Value::Object(rc) => Some(Rc::as_ptr(rc) as usize),
            _ => None,
        }
    }

    /// The runtime type of this value, used to decide cast emission when it
    /// differs from the declared type.
    pub fn runtime_type(&self) -> TypeHandle {
        match self {
            Value::Null | Value::Map(_) => TypeHandle::Any,
            Value::Bool(_) => TypeHandle::Bool,
            Value::Int(_) => TypeHandle::Int,
            Value::Float(_) => TypeHandle::Float,
            Value::Str(_) => TypeHandle::Str,
            Value::List(_) => TypeHandle::List(Box::new(TypeHandle::Any)),
            Value::Object(rc) => TypeHandle::Class(rc.borrow().class.clone()),
            Value::Enum(descriptor, _) => TypeHandle::Enum(descriptor.clone()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<String> {
        match self {
            Value::Str(s) => Some(s.clone()),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<Rc<RefCell<Vec<Value>>>> {
        match self {
            Value::List(rc) => Some(rc.clone()),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<Rc<RefCell<IndexMap<String, Value>>>> {
        match self {
            Value::Map(rc) => Some(rc.clone()),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<Rc<RefCell<Instance>>> {
        match self {
            Value::Object(rc) => Some(rc.clone()),
            _ => None,
        }
    }

    /// Reads a member of an object instance.
    pub fn member(&self, name: &str) -> Option<Value> {
        match self {
            Value::Object(rc) => rc.borrow().get(name),
            _ => None,
        }
    }

    /// Reads a list element.
    pub fn index(&self, i: usize) -> Option<Value> {
        match self {
            Value::List(rc) => rc.borrow().get(i).cloned(),
            _ => None,
        }
    }
}

/// Structural equality for acyclic graphs. Shared handles short-circuit on
/// pointer identity, so a value always equals itself even when cyclic.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow(),
            (Value::Map(a), Value::Map(b)) => Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow(),
            (Value::Object(a), Value::Object(b)) => {
                Rc::ptr_eq(a, b) || {
                    let (a, b) = (a.borrow(), b.borrow());
                    a.class.name == b.class.name && a.fields == b.fields
                }
            }
            (Value::Enum(da, va), Value::Enum(db, vb)) => Rc::ptr_eq(da, db) && va == vb,
            _ => false,
        }
    }
}

/// Serializes through the plain-JSON projection, so a graph can feed any
/// serde consumer. Fails on cyclic graphs.
impl serde::Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match crate::api::to_json(self) {
            Ok(json) => json.serialize(serializer),
            Err(err) => Err(serde::ser::Error::custom(err)),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ClassBuilder;

    #[test]
    fn test_identity_shared_on_clone() {
        let list = Value::new_list(vec![Value::Int(1)]);
        let alias = list.clone();
        assert_eq!(list.identity(), alias.identity());
        let other = Value::new_list(vec![Value::Int(1)]);
        assert_ne!(list.identity(), other.identity());
    }

    #[test]
    fn test_primitives_have_no_identity() {
        assert!(Value::Int(3).identity().is_none());
        assert!(Value::Null.identity().is_none());
    }

    #[test]
    fn test_structural_equality() {
        let a = Value::new_list(vec![Value::Int(1), Value::Str("x".into())]);
        let b = Value::new_list(vec![Value::Int(1), Value::Str("x".into())]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_cyclic_self_equality() {
        let map = Value::new_map();
        if let Value::Map(rc) = &map {
            rc.borrow_mut().insert("me".into(), map.clone());
        }
        // Pointer identity short-circuits the cycle.
        assert_eq!(map, map.clone());
    }

    #[test]
    fn test_instance_member_access() {
        let class = Rc::new(ClassBuilder::new("User").member("name", TypeHandle::Str).build());
        let user = Value::new_object(class);
        if let Value::Object(rc) = &user {
            rc.borrow_mut().set("name", Value::from("Ada"));
        }
        assert_eq!(user.member("name"), Some(Value::from("Ada")));
        assert_eq!(user.member("missing"), None);
    }

    #[test]
    fn test_serde_projection() {
        let map = Value::new_map();
        if let Value::Map(rc) = &map {
            rc.borrow_mut().insert("a".into(), Value::Int(1));
        }
        let json = serde_json::to_string(&map).unwrap();
        assert_eq!(json, r#"{"a":1}"#);
    }

    #[test]
    fn test_runtime_type() {
        assert_eq!(Value::Int(1).runtime_type(), TypeHandle::Int);
        let class = Rc::new(ClassBuilder::new("User").build());
        let user = Value::new_object(class.clone());
        assert_eq!(user.runtime_type(), TypeHandle::Class(class));
    }
}
