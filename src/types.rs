use crate::value::{Instance, Value};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// A cheap, clonable handle on a runtime type. Class and enum handles share
/// their descriptor; handle equality is pointer identity for those.
#[derive(Debug, Clone)]
pub enum TypeHandle {
    /// The universal type: any value fits, literal shape decides.
    Any,
    Bool,
    Int,
    Float,
    Str,
    /// An ordered collection with the given element type.
    List(Box<TypeHandle>),
    /// A string-keyed map with the given value type.
    Map(Box<TypeHandle>),
    Enum(Rc<EnumDescriptor>),
    Class(Rc<ClassDescriptor>),
}

impl PartialEq for TypeHandle {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (TypeHandle::Any, TypeHandle::Any)
            | (TypeHandle::Bool, TypeHandle::Bool)
            | (TypeHandle::Int, TypeHandle::Int)
            | (TypeHandle::Float, TypeHandle::Float)
            | (TypeHandle::Str, TypeHandle::Str) => true,
            (TypeHandle::List(a), TypeHandle::List(b)) => a == b,
            (TypeHandle::Map(a), TypeHandle::Map(b)) => a == b,
            (TypeHandle::Enum(a), TypeHandle::Enum(b)) => Rc::ptr_eq(a, b),
            (TypeHandle::Class(a), TypeHandle::Class(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl TypeHandle {
    /// The element type this handle prescribes for list items.
    pub fn element_type(&self) -> TypeHandle {
        match self {
            TypeHandle::List(elem) => (**elem).clone(),
            _ => TypeHandle::Any,
        }
    }

    /// The value type this handle prescribes for map entries.
    pub fn value_type(&self) -> TypeHandle {
        match self {
            TypeHandle::Map(value) => (**value).clone(),
            _ => TypeHandle::Any,
        }
    }
}

impl fmt::Display for TypeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeHandle::Any => write!(f, "any"),
            TypeHandle::Bool => write!(f, "bool"),
            TypeHandle::Int => write!(f, "int"),
            TypeHandle::Float => write!(f, "float"),
            TypeHandle::Str => write!(f, "string"),
            TypeHandle::List(elem) => write!(f, "list<{elem}>"),
            TypeHandle::Map(value) => write!(f, "map<{value}>"),
            TypeHandle::Enum(e) => write!(f, "{}", e.name),
            TypeHandle::Class(c) => write!(f, "{}", c.name),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct EnumDescriptor {
    pub name: String,
    pub variants: Vec<String>,
}

/// Fired exactly once after all members of a freshly constructed instance are
/// set.
pub type CompletionCallback = Rc<dyn Fn(&mut Instance)>;

/// A pure function mutating member metadata at registration time; the ordered
/// processor list replaces attribute scanning.
pub type MetadataProcessor = Box<dyn Fn(&mut ClassDescriptor)>;

pub struct ClassDescriptor {
    pub name: String,
    /// Serializable members in declaration order.
    pub members: Vec<MemberDescriptor>,
    /// Public constructors in declaration order.
    pub constructors: Vec<ConstructorDescriptor>,
    pub on_complete: Option<CompletionCallback>,
}

impl fmt::Debug for ClassDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassDescriptor")
            .field("name", &self.name)
            .field("members", &self.members)
            .field("constructors", &self.constructors)
            .field("on_complete", &self.on_complete.is_some())
            .finish()
    }
}

impl ClassDescriptor {
    /// Finds a member by its name or explicit alias, case-sensitively.
    pub fn find_member(&self, name: &str) -> Option<&MemberDescriptor> {
        self.members
            .iter()
            .find(|m| m.name == name || m.alias.as_deref() == Some(name))
    }
}

pub struct MemberDescriptor {
    pub name: String,
    pub alias: Option<String>,
    pub ty: TypeHandle,
    pub ignored: bool,
    /// A per-member converter overrides any type-level converter.
    pub converter: Option<Rc<dyn ValueConverter>>,
    /// When set, the member feeds the named constructor parameter instead of
    /// being assigned through a setter.
    pub ctor_param: Option<String>,
}

impl fmt::Debug for MemberDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemberDescriptor")
            .field("name", &self.name)
            .field("alias", &self.alias)
            .field("ty", &self.ty)
            .field("ignored", &self.ignored)
            .field("converter", &self.converter.is_some())
            .field("ctor_param", &self.ctor_param)
            .finish()
    }
}

impl MemberDescriptor {
    pub fn new(name: impl Into<String>, ty: TypeHandle) -> Self {
        Self {
            name: name.into(),
            alias: None,
            ty,
            ignored: false,
            converter: None,
            ctor_param: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConstructorDescriptor {
    pub params: Vec<ParamDescriptor>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParamDescriptor {
    pub name: String,
    pub alias: Option<String>,
    pub ty: TypeHandle,
}

impl ParamDescriptor {
    pub fn new(name: impl Into<String>, ty: TypeHandle) -> Self {
        Self {
            name: name.into(),
            alias: None,
            ty,
        }
    }

    /// Case-sensitive match against the parameter name or its alias.
    pub fn matches_exact(&self, name: &str) -> bool {
        self.name == name || self.alias.as_deref() == Some(name)
    }

    /// Case-insensitive match, used by the loose constructor pass.
    pub fn matches_loose(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
            || self
                .alias
                .as_deref()
                .is_some_and(|a| a.eq_ignore_ascii_case(name))
    }
}

/// Maps an intermediate, notation-friendly representation to a final value
/// and back. Registered per class on the [`crate::config::Configuration`] or
/// per member on its descriptor.
pub trait ValueConverter {
    /// The type the converted value takes in the written document.
    fn serialized_type(&self) -> TypeHandle;
    fn to_serialized(&self, value: &Value) -> Result<Value, String>;
    fn from_serialized(&self, value: Value) -> Result<Value, String>;
}

/// Builds a concrete collection instance incrementally while the evaluator
/// walks list items.
pub trait CollectionBuilder {
    fn push(&mut self, item: Value);
    fn finish(self: Box<Self>) -> Value;
}

/// Supplies collection builders sized to the expected item count.
pub trait CollectionHandler {
    fn builder(&self, capacity: usize) -> Box<dyn CollectionBuilder>;
}

/// The default collection strategy: a shared growable list.
pub struct VecCollectionHandler;

struct VecCollectionBuilder {
    items: Vec<Value>,
}

impl CollectionBuilder for VecCollectionBuilder {
    fn push(&mut self, item: Value) {
        self.items.push(item);
    }

    fn finish(self: Box<Self>) -> Value {
        Value::new_list(self.items)
    }
}

impl CollectionHandler for VecCollectionHandler {
    fn builder(&self, capacity: usize) -> Box<dyn CollectionBuilder> {
        Box::new(VecCollectionBuilder {
            items: Vec::with_capacity(capacity),
        })
    }
}

/// Read-only once configured: maps friendly names and fully-qualified names
/// to type handles, and handles back to their preferred written name.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    names: HashMap<String, TypeHandle>,
    /// canonical name -> preferred (usually shortest) alias for writing.
    preferred: HashMap<String, String>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry pre-populated with the primitive and collection aliases the
    /// notation understands out of the box.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for name in ["any", "object"] {
            registry.names.insert(name.into(), TypeHandle::Any);
        }
        for name in ["bool", "boolean"] {
            registry.names.insert(name.into(), TypeHandle::Bool);
        }
        for name in ["int", "long", "short", "byte"] {
            registry.names.insert(name.into(), TypeHandle::Int);
        }
        for name in ["float", "double", "decimal"] {
            registry.names.insert(name.into(), TypeHandle::Float);
        }
        for name in ["string", "str", "char"] {
            registry.names.insert(name.into(), TypeHandle::Str);
        }
        for name in ["list", "array"] {
            registry
                .names
                .insert(name.into(), TypeHandle::List(Box::new(TypeHandle::Any)));
        }
        for name in ["map", "dict", "dictionary"] {
            registry
                .names
                .insert(name.into(), TypeHandle::Map(Box::new(TypeHandle::Any)));
        }
        registry
    }

    pub fn register_class(&mut self, class: Rc<ClassDescriptor>) -> TypeHandle {
        let handle = TypeHandle::Class(class.clone());
        self.names.insert(class.name.clone(), handle.clone());
        handle
    }

    pub fn register_enum(&mut self, descriptor: Rc<EnumDescriptor>) -> TypeHandle {
        let handle = TypeHandle::Enum(descriptor.clone());
        self.names.insert(descriptor.name.clone(), handle.clone());
        handle
    }

    /// Registers a friendly alias for an already-registered type. The first
    /// alias of a type becomes its preferred written name.
    pub fn add_alias(&mut self, alias: impl Into<String>, canonical: &str) -> bool {
        let alias = alias.into();
        let Some(handle) = self.names.get(canonical).cloned() else {
            return false;
        };
        self.preferred
            .entry(canonical.to_string())
            .or_insert_with(|| alias.clone());
        self.names.insert(alias, handle);
        true
    }

    /// Alias table first, then fully-qualified name lookup; both live in the
    /// same table so the alias simply shadows nothing or adds a second key.
    pub fn lookup(&self, name: &str) -> Option<TypeHandle> {
        self.names.get(name).cloned()
    }

    /// The name under which a type is written in casts and constructor
    /// expressions: its preferred alias when one is registered, otherwise the
    /// canonical name.
    pub fn name_for(&self, handle: &TypeHandle) -> String {
        let canonical = handle.to_string();
        self.preferred
            .get(&canonical)
            .cloned()
            .unwrap_or(canonical)
    }
}

/// Fluent construction of a class descriptor, mirroring how host metadata
/// would be discovered in one pass.
pub struct ClassBuilder {
    class: ClassDescriptor,
}

impl ClassBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            class: ClassDescriptor {
                name: name.into(),
                members: Vec::new(),
                constructors: Vec::new(),
                on_complete: None,
            },
        }
    }

    pub fn member(mut self, name: &str, ty: TypeHandle) -> Self {
        self.class.members.push(MemberDescriptor::new(name, ty));
        self
    }

    pub fn member_alias(mut self, member: &str, alias: &str) -> Self {
        if let Some(m) = self.class.members.iter_mut().find(|m| m.name == member) {
            m.alias = Some(alias.to_string());
        }
        self
    }

    pub fn ignore(mut self, member: &str) -> Self {
        if let Some(m) = self.class.members.iter_mut().find(|m| m.name == member) {
            m.ignored = true;
        }
        self
    }

    pub fn member_converter(mut self, member: &str, converter: Rc<dyn ValueConverter>) -> Self {
        if let Some(m) = self.class.members.iter_mut().find(|m| m.name == member) {
            m.converter = Some(converter);
        }
        self
    }

    /// Wires a member to the constructor parameter of the given name; the
    /// member's value is passed to the constructor instead of a setter.
    pub fn ctor_member(mut self, member: &str, param: &str) -> Self {
        if let Some(m) = self.class.members.iter_mut().find(|m| m.name == member) {
            m.ctor_param = Some(param.to_string());
        }
        self
    }

    pub fn ctor(mut self, params: &[(&str, TypeHandle)]) -> Self {
        self.class.constructors.push(ConstructorDescriptor {
            params: params
                .iter()
                .map(|(name, ty)| ParamDescriptor::new(*name, ty.clone()))
                .collect(),
        });
        self
    }

    pub fn on_complete(mut self, callback: impl Fn(&mut Instance) + 'static) -> Self {
        self.class.on_complete = Some(Rc::new(callback));
        self
    }

    pub fn build(self) -> ClassDescriptor {
        self.class
    }
}
