use crate::ast::child_path;
use crate::config::Configuration;
use crate::error::{WriteError, XonError};
use crate::eval::Evaluator;
use crate::parser::Parser;
use crate::serializer::GraphSerializer;
use crate::types::TypeHandle;
use crate::value::Value;
use std::collections::HashSet;
use std::rc::Rc;

/// Reads a document into an object graph, inferring the natural type of
/// every value from its literal shape and casts.
///
/// # Errors
/// Returns an `XonError` when the document fails to lex, parse or evaluate.
pub fn read(source: &str, config: &Configuration) -> Result<Value, XonError> {
    read_typed(source, config, &TypeHandle::Any)
}

/// Reads a document into an object graph, converting the root value to the
/// desired type the same way a member position would.
///
/// # Errors
/// Returns an `XonError` when the document fails to lex, parse or evaluate,
/// including when the root value cannot convert to the desired type.
pub fn read_typed(
    source: &str,
    config: &Configuration,
    desired: &TypeHandle,
) -> Result<Value, XonError> {
    let mut parser = Parser::new(source)?;
    let expr = parser.parse_document()?;
    let mut evaluator = Evaluator::new(config, parser.source());
    evaluator.evaluate_document(&expr, desired)
}

/// Writes an object graph to a document under `config.options`.
///
/// # Errors
/// Returns an `XonError` when the graph violates the configured reference
/// policy or a converter fails.
pub fn write(value: &Value, config: &Configuration) -> Result<String, XonError> {
    write_typed(value, config, &TypeHandle::Any)
}

/// Writes an object graph with a declared root type, suppressing the root
/// cast when the runtime type already matches.
///
/// # Errors
/// Returns an `XonError` when the graph violates the configured reference
/// policy or a converter fails.
pub fn write_typed(
    value: &Value,
    config: &Configuration,
    declared: &TypeHandle,
) -> Result<String, XonError> {
    let mut serializer = GraphSerializer::new(config);
    serializer.serialize(value, declared)
}

/// Exports a graph as plain JSON, losing type and identity information.
/// Enum values become their variant names and instances become objects.
///
/// # Errors
/// Returns a `WriteError` when the graph is cyclic or contains a non-finite
/// float, neither of which standard JSON can represent.
pub fn to_json(value: &Value) -> Result<serde_json::Value, WriteError> {
    let mut active = HashSet::new();
    json_value(value, &mut active, "this")
}

fn json_value(
    value: &Value,
    active: &mut HashSet<usize>,
    path: &str,
) -> Result<serde_json::Value, WriteError> {
    use serde_json::Value as Json;
    match value {
        Value::Null => Ok(Json::Null),
        Value::Bool(b) => Ok(Json::Bool(*b)),
        Value::Int(i) => Ok(Json::from(*i)),
        Value::Float(f) => serde_json::Number::from_f64(*f)
            .map(Json::Number)
            .ok_or_else(|| WriteError::JsonInterop {
                path: path.to_string(),
            }),
        Value::Str(s) => Ok(Json::String(s.clone())),
        Value::Enum(_, variant) => Ok(Json::String(variant.clone())),
        Value::List(items) => {
            let id = Rc::as_ptr(items) as usize;
            if !active.insert(id) {
                return Err(WriteError::JsonInterop {
                    path: path.to_string(),
                });
            }
            let mut out = Vec::with_capacity(items.borrow().len());
            for (i, item) in items.borrow().iter().enumerate() {
                out.push(json_value(item, active, &child_path(path, i))?);
            }
            active.remove(&id);
            Ok(Json::Array(out))
        }
        Value::Map(entries) => {
            let id = Rc::as_ptr(entries) as usize;
            if !active.insert(id) {
                return Err(WriteError::JsonInterop {
                    path: path.to_string(),
                });
            }
            let mut out = serde_json::Map::new();
            for (key, entry) in entries.borrow().iter() {
                out.insert(
                    key.clone(),
                    json_value(entry, active, &child_path(path, key))?,
                );
            }
            active.remove(&id);
            Ok(Json::Object(out))
        }
        Value::Object(instance) => {
            let id = Rc::as_ptr(instance) as usize;
            if !active.insert(id) {
                return Err(WriteError::JsonInterop {
                    path: path.to_string(),
                });
            }
            let instance = instance.borrow();
            let mut out = serde_json::Map::new();
            for (name, field) in instance.fields.iter() {
                if instance.class.find_member(name).is_some_and(|m| m.ignored) {
                    continue;
                }
                out.insert(
                    name.clone(),
                    json_value(field, active, &child_path(path, name))?,
                );
            }
            active.remove(&id);
            Ok(Json::Object(out))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ClassBuilder;

    #[test]
    fn test_read_write_round_trip() {
        let config = Configuration::new();
        for doc in [
            "null",
            "true",
            "-42",
            "2.5",
            r#""hello""#,
            r#"[1,2.0,"three"]"#,
            r#"{"a":1,"b":{"c":[true,null]}}"#,
        ] {
            let value = read(doc, &config).unwrap();
            assert_eq!(write(&value, &config).unwrap(), doc, "round trip of {doc}");
        }
    }

    #[test]
    fn test_shared_graph_round_trip() {
        let config = Configuration::new();
        let doc = r#"{"a":{"x":1},"b":this.a}"#;
        let value = read(doc, &config).unwrap();
        assert_eq!(write(&value, &config).unwrap(), doc);
    }

    #[test]
    fn test_typed_round_trip_suppresses_cast() {
        let mut config = Configuration::new();
        let handle = config.register_class(
            ClassBuilder::new("User")
                .member("name", TypeHandle::Str)
                .build(),
        );
        let doc = r#"{"name":"Ada"}"#;
        let value = read_typed(doc, &config, &handle).unwrap();
        assert_eq!(write_typed(&value, &config, &handle).unwrap(), doc);
    }

    #[test]
    fn test_to_json_flat_graph() {
        let config = Configuration::new();
        let value = read(r#"{"a":1,"b":[true,"x"]}"#, &config).unwrap();
        let json = to_json(&value).unwrap();
        assert_eq!(json, serde_json::json!({"a": 1, "b": [true, "x"]}));
    }

    #[test]
    fn test_to_json_rejects_cycles() {
        let config = Configuration::new();
        let value = read(r#"{"me":this}"#, &config).unwrap();
        let err = to_json(&value).unwrap_err();
        assert!(matches!(err, WriteError::JsonInterop { .. }));
    }

    #[test]
    fn test_to_json_shared_acyclic_is_duplicated() {
        let config = Configuration::new();
        let value = read(r#"{"a":{"x":1},"b":this.a}"#, &config).unwrap();
        let json = to_json(&value).unwrap();
        assert_eq!(json, serde_json::json!({"a": {"x": 1}, "b": {"x": 1}}));
    }
}
