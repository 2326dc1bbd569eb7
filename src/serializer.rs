use crate::ast::child_path;
use crate::config::{Configuration, ReferencePolicy};
use crate::error::{WriteError, XonError};
use crate::types::{MemberDescriptor, TypeHandle};
use crate::value::Value;
use crate::writer::Writer;
use log::trace;
use std::collections::HashMap;
use std::rc::Rc;

/// Where a shared node was first written, and whether a back-reference to it
/// would resolve on re-read.
#[derive(Debug)]
struct ReferenceInfo {
    path: String,
    can_reference: bool,
}

/// Walks a materialized graph and drives the writer, recovering sharing and
/// cycles through container identity.
pub struct GraphSerializer<'a> {
    config: &'a Configuration,
    seen: HashMap<usize, ReferenceInfo>,
}

/// True when `path` lies inside the subtree rooted at `ancestor`, which is
/// what distinguishes a true cycle from mere sharing.
fn is_descendant(ancestor: &str, path: &str) -> bool {
    path.len() > ancestor.len()
        && path.starts_with(ancestor)
        && path.as_bytes()[ancestor.len()] == b'.'
}

impl<'a> GraphSerializer<'a> {
    pub fn new(config: &'a Configuration) -> Self {
        Self {
            config,
            seen: HashMap::new(),
        }
    }

    /// Serializes one graph to a document. The declared type plays the same
    /// role as on the read side: values whose runtime type it already names
    /// need no cast.
    pub fn serialize(&mut self, value: &Value, declared: &TypeHandle) -> Result<String, XonError> {
        let mut writer = Writer::new(self.config.options.clone());
        if self.config.options.type_comment {
            let name = self.config.registry.name_for(&value.runtime_type());
            writer.comment(&format!(" {name} "))?;
        }
        self.write_value(&mut writer, value, declared, "this")?;
        Ok(writer.finish()?)
    }

    fn write_value(
        &mut self,
        writer: &mut Writer,
        value: &Value,
        declared: &TypeHandle,
        path: &str,
    ) -> Result<(), XonError> {
        if let Some(id) = value.identity() {
            if let Some(info) = self.seen.get(&id) {
                match self.config.options.reference_policy {
                    ReferencePolicy::WriteIdentifier => {
                        if info.can_reference {
                            trace!("back-reference at {path} to {}", info.path);
                            writer.special_value(&info.path)?;
                            return Ok(());
                        }
                        return Err(WriteError::CannotReference {
                            path: info.path.clone(),
                        }
                        .into());
                    }
                    ReferencePolicy::IgnoreCircular => {
                        if is_descendant(&info.path, path) {
                            writer.null_value()?;
                            return Ok(());
                        }
                        // Shared but acyclic: re-serialized in place.
                    }
                    ReferencePolicy::ErrorCircular => {
                        if is_descendant(&info.path, path) {
                            return Err(WriteError::CircularReference {
                                path: path.to_string(),
                            }
                            .into());
                        }
                    }
                }
            }
        }

        match value {
            Value::Null => {
                writer.null_value()?;
            }
            Value::Bool(b) => {
                self.maybe_cast(writer, value, declared)?;
                writer.bool_value(*b)?;
            }
            Value::Int(i) => {
                self.maybe_cast(writer, value, declared)?;
                writer.int_value(*i)?;
            }
            Value::Float(f) => {
                self.maybe_cast(writer, value, declared)?;
                writer.float_value(*f)?;
            }
            Value::Str(s) => {
                self.maybe_cast(writer, value, declared)?;
                writer.quoted_value(s)?;
            }
            Value::Enum(_, variant) => {
                self.maybe_cast(writer, value, declared)?;
                writer.quoted_value(variant)?;
            }
            Value::List(items) => {
                let id = Rc::as_ptr(items) as usize;
                // A list cannot be referenced until its last element is
                // written, because the reader only registers it then.
                self.seen.insert(
                    id,
                    ReferenceInfo {
                        path: path.to_string(),
                        can_reference: false,
                    },
                );
                writer.array_start()?;
                let element = declared.element_type();
                for (i, item) in items.borrow().iter().enumerate() {
                    self.write_value(writer, item, &element, &child_path(path, i))?;
                }
                writer.array_end()?;
                if let Some(info) = self.seen.get_mut(&id) {
                    info.can_reference = true;
                }
            }
            Value::Map(entries) => {
                let id = Rc::as_ptr(entries) as usize;
                self.seen.insert(
                    id,
                    ReferenceInfo {
                        path: path.to_string(),
                        can_reference: true,
                    },
                );
                writer.object_start()?;
                let value_type = declared.value_type();
                for (key, entry) in entries.borrow().iter() {
                    writer.key(key)?;
                    self.write_value(writer, entry, &value_type, &child_path(path, key))?;
                }
                writer.object_end()?;
            }
            Value::Object(instance) => {
                self.write_instance(writer, value, instance, declared, path)?;
            }
        }
        Ok(())
    }

    fn write_instance(
        &mut self,
        writer: &mut Writer,
        value: &Value,
        instance: &Rc<std::cell::RefCell<crate::value::Instance>>,
        declared: &TypeHandle,
        path: &str,
    ) -> Result<(), XonError> {
        let id = Rc::as_ptr(instance) as usize;
        let class = instance.borrow().class.clone();

        // A type-level converter replaces the whole instance with its
        // serialized form.
        if let Some(converter) = self.config.converter_for(&class) {
            self.seen.insert(
                id,
                ReferenceInfo {
                    path: path.to_string(),
                    can_reference: false,
                },
            );
            self.maybe_cast(writer, value, declared)?;
            let intermediate =
                converter
                    .to_serialized(value)
                    .map_err(|message| WriteError::Converter {
                        message,
                        path: path.to_string(),
                    })?;
            self.write_value(writer, &intermediate, &converter.serialized_type(), path)?;
            if let Some(info) = self.seen.get_mut(&id) {
                info.can_reference = true;
            }
            return Ok(());
        }

        // An instance is referenceable immediately: the reader registers it
        // before populating its members.
        self.seen.insert(
            id,
            ReferenceInfo {
                path: path.to_string(),
                can_reference: true,
            },
        );

        // Members wired to constructor parameters serialize as a `new`
        // expression when a constructor covers exactly the wired set.
        let instance = instance.borrow();
        let wired: Vec<(&MemberDescriptor, Value)> = class
            .members
            .iter()
            .filter(|m| !m.ignored && m.ctor_param.is_some())
            .filter_map(|m| instance.get(&m.name).map(|v| (m, v)))
            .collect();
        let ctor = class.constructors.iter().find(|c| {
            c.params.len() == wired.len()
                && c.params.iter().all(|p| {
                    wired
                        .iter()
                        .any(|(m, _)| m.ctor_param.as_deref() == Some(p.name.as_str()))
                })
        });

        let mut in_ctor: Vec<&str> = Vec::new();
        match (wired.is_empty(), ctor) {
            (false, Some(ctor)) => {
                // The type name after `new` already recreates the type, so no
                // cast is needed.
                writer.ctor_start(&self.config.registry.name_for(&value.runtime_type()))?;
                for (i, param) in ctor.params.iter().enumerate() {
                    let (member, member_value) = wired
                        .iter()
                        .find(|(m, _)| m.ctor_param.as_deref() == Some(param.name.as_str()))
                        .ok_or_else(|| WriteError::Converter {
                            message: format!("constructor parameter '{}' has no wired member", param.name),
                            path: path.to_string(),
                        })?;
                    in_ctor.push(&member.name);
                    self.write_member(
                        writer,
                        Some(*member),
                        member_value,
                        &param.ty,
                        &child_path(path, i),
                    )?;
                }
                writer.ctor_args_end()?;
            }
            _ => {
                self.maybe_cast(writer, value, declared)?;
                writer.object_start()?;
            }
        }
        let ctor_emitted = !in_ctor.is_empty();

        let mut opened_body = !ctor_emitted;
        for (name, member_value) in instance.fields.iter() {
            if in_ctor.contains(&name.as_str()) {
                continue;
            }
            let member = class.find_member(name);
            if member.is_some_and(|m| m.ignored) {
                continue;
            }
            if !opened_body {
                writer.object_start()?;
                opened_body = true;
            }
            writer.key(name)?;
            let member_type = member.map(|m| m.ty.clone()).unwrap_or(TypeHandle::Any);
            self.write_member(
                writer,
                member,
                member_value,
                &member_type,
                &child_path(path, name),
            )?;
        }
        if opened_body {
            writer.object_end()?;
        }
        Ok(())
    }

    fn write_member(
        &mut self,
        writer: &mut Writer,
        member: Option<&MemberDescriptor>,
        value: &Value,
        declared: &TypeHandle,
        path: &str,
    ) -> Result<(), XonError> {
        if let Some(converter) = member.and_then(|m| m.converter.as_ref()) {
            let intermediate =
                converter
                    .to_serialized(value)
                    .map_err(|message| WriteError::Converter {
                        message,
                        path: path.to_string(),
                    })?;
            return self.write_value(writer, &intermediate, &converter.serialized_type(), path);
        }
        self.write_value(writer, value, declared, path)
    }

    /// Emits a cast when re-reading the output under the declared type would
    /// produce a different runtime type. Primitives inferable from their
    /// literal shape never need one against an `any` context.
    fn maybe_cast(
        &self,
        writer: &mut Writer,
        value: &Value,
        declared: &TypeHandle,
    ) -> Result<(), XonError> {
        if !self.config.options.cast_on_mismatch {
            return Ok(());
        }
        let runtime = value.runtime_type();
        let needed = match (&runtime, value) {
            (TypeHandle::Enum(_) | TypeHandle::Class(_), _) => runtime != *declared,
            // Non-finite floats print as bare identifiers, which an untyped
            // re-read would take for strings.
            (_, Value::Float(f)) if !f.is_finite() => runtime != *declared,
            (TypeHandle::Bool | TypeHandle::Int | TypeHandle::Float | TypeHandle::Str, _) => {
                !matches!(declared, TypeHandle::Any) && runtime != *declared
            }
            _ => false,
        };
        if needed {
            writer.cast(&self.config.registry.name_for(&runtime))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WriteOptions;
    use crate::types::{ClassBuilder, EnumDescriptor};

    fn write(value: &Value, config: &Configuration) -> String {
        let mut serializer = GraphSerializer::new(config);
        serializer.serialize(value, &TypeHandle::Any).unwrap()
    }

    #[test]
    fn test_primitives() {
        let config = Configuration::new();
        assert_eq!(write(&Value::Null, &config), "null");
        assert_eq!(write(&Value::Bool(true), &config), "true");
        assert_eq!(write(&Value::Int(-3), &config), "-3");
        assert_eq!(write(&Value::Float(2.0), &config), "2.0");
        assert_eq!(write(&Value::Str("hi".into()), &config), r#""hi""#);
    }

    #[test]
    fn test_list_and_map() {
        let config = Configuration::new();
        let list = Value::new_list(vec![Value::Int(1), Value::Str("x".into())]);
        assert_eq!(write(&list, &config), r#"[1,"x"]"#);

        let map = Value::new_map();
        if let Value::Map(rc) = &map {
            rc.borrow_mut().insert("a".into(), Value::Int(1));
            rc.borrow_mut().insert("b".into(), Value::Null);
        }
        assert_eq!(write(&map, &config), r#"{"a":1,"b":null}"#);
    }

    #[test]
    fn test_scalar_cast_against_declared_type() {
        let config = Configuration::new();
        let mut serializer = GraphSerializer::new(&config);
        // Declared string, runtime int: without the cast the reader would
        // hand back the string "3456".
        let out = serializer
            .serialize(&Value::Int(3456), &TypeHandle::Str)
            .unwrap();
        assert_eq!(out, "(int)3456");
    }

    #[test]
    fn test_no_cast_when_inferable() {
        let config = Configuration::new();
        assert_eq!(write(&Value::Int(5), &config), "5");
        assert_eq!(write(&Value::Float(1.5), &config), "1.5");
    }

    #[test]
    fn test_enum_casts_against_any() {
        let mut config = Configuration::new();
        let status = Rc::new(EnumDescriptor {
            name: "Status".into(),
            variants: vec!["Active".into()],
        });
        config.registry.register_enum(status.clone());
        let value = Value::Enum(status, "Active".into());
        assert_eq!(write(&value, &config), r#"(Status)"Active""#);
    }

    #[test]
    fn test_object_casts_against_any() {
        let mut config = Configuration::new();
        let handle = config.register_class(
            ClassBuilder::new("User").member("name", TypeHandle::Str).build(),
        );
        let TypeHandle::Class(class) = &handle else {
            panic!("expected class");
        };
        let user = Value::new_object(class.clone());
        if let Value::Object(rc) = &user {
            rc.borrow_mut().set("name", Value::from("Ada"));
        }
        assert_eq!(write(&user, &config), r#"(User){"name":"Ada"}"#);

        let mut serializer = GraphSerializer::new(&config);
        let typed = serializer.serialize(&user, &handle).unwrap();
        assert_eq!(typed, r#"{"name":"Ada"}"#);
    }

    #[test]
    fn test_shared_node_writes_reference() {
        let config = Configuration::new();
        let shared = Value::new_map();
        if let Value::Map(rc) = &shared {
            rc.borrow_mut().insert("x".into(), Value::Int(1));
        }
        let root = Value::new_map();
        if let Value::Map(rc) = &root {
            rc.borrow_mut().insert("a".into(), shared.clone());
            rc.borrow_mut().insert("b".into(), shared);
        }
        assert_eq!(write(&root, &config), r#"{"a":{"x":1},"b":this.a}"#);
    }

    #[test]
    fn test_cycle_writes_reference_to_ancestor() {
        let config = Configuration::new();
        let root = Value::new_map();
        if let Value::Map(rc) = &root {
            rc.borrow_mut().insert("me".into(), root.clone());
        }
        assert_eq!(write(&root, &config), r#"{"me":this}"#);
    }

    #[test]
    fn test_ignore_circular_policy() {
        let mut config = Configuration::new();
        config.options.reference_policy = ReferencePolicy::IgnoreCircular;
        let root = Value::new_map();
        if let Value::Map(rc) = &root {
            rc.borrow_mut().insert("me".into(), root.clone());
        }
        assert_eq!(write(&root, &config), r#"{"me":null}"#);
    }

    #[test]
    fn test_ignore_circular_reserializes_shared() {
        let mut config = Configuration::new();
        config.options.reference_policy = ReferencePolicy::IgnoreCircular;
        let shared = Value::new_list(vec![Value::Int(1)]);
        let root = Value::new_list(vec![shared.clone(), shared]);
        assert_eq!(write(&root, &config), "[[1],[1]]");
    }

    #[test]
    fn test_error_circular_policy() {
        let mut config = Configuration::new();
        config.options.reference_policy = ReferencePolicy::ErrorCircular;
        let root = Value::new_map();
        if let Value::Map(rc) = &root {
            rc.borrow_mut().insert("me".into(), root.clone());
        }
        let mut serializer = GraphSerializer::new(&config);
        let err = serializer
            .serialize(&root, &TypeHandle::Any)
            .unwrap_err();
        assert!(matches!(
            err,
            XonError::Write(WriteError::CircularReference { .. })
        ));
    }

    #[test]
    fn test_cycle_through_list_cannot_reference() {
        let config = Configuration::new();
        let list = Value::new_list(vec![]);
        if let Value::List(rc) = &list {
            let inner = list.clone();
            rc.borrow_mut().push(inner);
        }
        let mut serializer = GraphSerializer::new(&config);
        let err = serializer.serialize(&list, &TypeHandle::Any).unwrap_err();
        assert!(matches!(
            err,
            XonError::Write(WriteError::CannotReference { .. })
        ));
    }

    #[test]
    fn test_ctor_wired_members_emit_new_expression() {
        let mut config = Configuration::new();
        let handle = config.register_class(
            ClassBuilder::new("Point")
                .member("x", TypeHandle::Int)
                .member("y", TypeHandle::Int)
                .member("label", TypeHandle::Str)
                .ctor(&[("x", TypeHandle::Int), ("y", TypeHandle::Int)])
                .ctor_member("x", "x")
                .ctor_member("y", "y")
                .build(),
        );
        let TypeHandle::Class(class) = &handle else {
            panic!("expected class");
        };
        let point = Value::new_object(class.clone());
        if let Value::Object(rc) = &point {
            rc.borrow_mut().set("x", Value::Int(1));
            rc.borrow_mut().set("y", Value::Int(-1));
            rc.borrow_mut().set("label", Value::from("p"));
        }
        let mut serializer = GraphSerializer::new(&config);
        let out = serializer.serialize(&point, &handle).unwrap();
        assert_eq!(out, r#"new Point(1,-1){"label":"p"}"#);
    }

    #[test]
    fn test_ctor_without_remaining_members_has_no_body() {
        let mut config = Configuration::new();
        let handle = config.register_class(
            ClassBuilder::new("Point")
                .member("x", TypeHandle::Int)
                .ctor(&[("x", TypeHandle::Int)])
                .ctor_member("x", "x")
                .build(),
        );
        let TypeHandle::Class(class) = &handle else {
            panic!("expected class");
        };
        let point = Value::new_object(class.clone());
        if let Value::Object(rc) = &point {
            rc.borrow_mut().set("x", Value::Int(7));
        }
        let mut serializer = GraphSerializer::new(&config);
        let out = serializer.serialize(&point, &handle).unwrap();
        assert_eq!(out, "new Point(7)");
    }

    #[test]
    fn test_ignored_member_not_written() {
        let mut config = Configuration::new();
        let handle = config.register_class(
            ClassBuilder::new("Session")
                .member("id", TypeHandle::Int)
                .member("secret", TypeHandle::Str)
                .ignore("secret")
                .build(),
        );
        let TypeHandle::Class(class) = &handle else {
            panic!("expected class");
        };
        let session = Value::new_object(class.clone());
        if let Value::Object(rc) = &session {
            rc.borrow_mut().set("id", Value::Int(1));
            rc.borrow_mut().set("secret", Value::from("x"));
        }
        let mut serializer = GraphSerializer::new(&config);
        let out = serializer.serialize(&session, &handle).unwrap();
        assert_eq!(out, r#"{"id":1}"#);
    }

    #[test]
    fn test_type_comment_names_runtime_type() {
        let mut config = Configuration::new();
        config.options.type_comment = true;
        assert_eq!(write(&Value::Int(1), &config), "/* int */ 1");
    }

    #[test]
    fn test_indented_output_reads_back() {
        let mut config = Configuration::new();
        config.options = WriteOptions {
            indent: true,
            ..WriteOptions::default()
        };
        let map = Value::new_map();
        if let Value::Map(rc) = &map {
            rc.borrow_mut().insert("a".into(), Value::Int(1));
        }
        assert_eq!(write(&map, &config), "{\n  \"a\": 1\n}");
    }
}
