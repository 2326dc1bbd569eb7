use crate::ast::{child_path, join_path, Expression, ExpressionKind};
use crate::config::Configuration;
use crate::construct::{resolve_constructor, CtorArgument};
use crate::error::{EvalError, ResolveError, XonError};
use crate::types::{ClassDescriptor, MemberDescriptor, TypeHandle};
use crate::typespec;
use crate::value::{Instance, Value};
use indexmap::IndexMap;
use log::{debug, trace};
use miette::NamedSource;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

/// Materializes an object graph from an expression tree in a single
/// depth-first pass. The only state is the path map that back-references
/// resolve against, populated as a side effect of every successful node
/// evaluation.
pub struct Evaluator<'a> {
    config: &'a Configuration,
    source: Arc<NamedSource<String>>,
    path_map: HashMap<String, Value>,
}

impl<'a> Evaluator<'a> {
    pub fn new(config: &'a Configuration, source: Arc<NamedSource<String>>) -> Self {
        Self {
            config,
            source,
            path_map: HashMap::new(),
        }
    }

    /// Evaluates the document root at path `this`.
    pub fn evaluate_document(
        &mut self,
        expr: &Expression,
        desired: &TypeHandle,
    ) -> Result<Value, XonError> {
        self.evaluate(expr, desired, "this")
    }

    pub fn evaluate(
        &mut self,
        expr: &Expression,
        desired: &TypeHandle,
        path: &str,
    ) -> Result<Value, XonError> {
        // A cast bound at parse time overrides the contextual desired type.
        let bound;
        let desired = match &expr.result_type {
            Some(spec) => {
                bound = typespec::bind(spec, &self.config.registry, &self.source)?;
                &bound
            }
            None => desired,
        };

        // Nulls and back-references produce their value as-is, bypassing any
        // converter: a referenced value was already converted at its first
        // occurrence.
        if matches!(
            expr.kind,
            ExpressionKind::Null | ExpressionKind::Reference(_)
        ) {
            return self.evaluate_shape(expr, desired, path);
        }

        // A converter registered for the desired type short-circuits: the
        // sub-expression evaluates against the converter's serialized type
        // and the converter maps the intermediate value to the final one.
        if let TypeHandle::Class(class) = desired {
            if let Some(converter) = self.config.converter_for(class) {
                let serialized = converter.serialized_type();
                let intermediate = self.evaluate_shape(expr, &serialized, path)?;
                let value = converter
                    .from_serialized(intermediate)
                    .map_err(|message| EvalError::Converter {
                        src: (*self.source).clone(),
                        span: expr.span(),
                        message,
                    })?;
                self.path_map.insert(path.to_string(), value.clone());
                return Ok(value);
            }
        }

        self.evaluate_shape(expr, desired, path)
    }

    fn evaluate_shape(
        &mut self,
        expr: &Expression,
        desired: &TypeHandle,
        path: &str,
    ) -> Result<Value, XonError> {
        let value = match &expr.kind {
            ExpressionKind::Null => Value::Null,
            ExpressionKind::Boolean(b) => self.convert_bool(*b, desired, expr)?,
            ExpressionKind::Numeric(text) => self.convert_numeric(text, desired, expr)?,
            ExpressionKind::Scalar(text) => self.convert_scalar(text, desired, expr)?,
            ExpressionKind::List(items) => self.build_list(items, expr, desired, path)?,
            ExpressionKind::Object(members) => match desired {
                TypeHandle::Class(class) => {
                    self.build_instance(class.clone(), members, expr, path)?
                }
                TypeHandle::Any | TypeHandle::Map(_) => {
                    self.build_map(members, desired, path)?
                }
                other => {
                    return Err(self.conversion_error("{...}", other, expr));
                }
            },
            ExpressionKind::Reference(segments) => {
                let target = join_path(segments);
                return match self.path_map.get(&target) {
                    Some(value) => Ok(value.clone()),
                    None => Err(EvalError::UnresolvedReference {
                        src: (*self.source).clone(),
                        span: expr.span(),
                        path: target,
                    }
                    .into()),
                };
            }
        };

        trace!("evaluated {path}");
        self.path_map.insert(path.to_string(), value.clone());
        Ok(value)
    }

    fn build_list(
        &mut self,
        items: &[Expression],
        expr: &Expression,
        desired: &TypeHandle,
        path: &str,
    ) -> Result<Value, XonError> {
        // Constructor arguments on a list body only size the builder; a
        // single integer argument is taken as a capacity hint.
        let mut capacity = items.len();
        for (i, arg) in expr.constructor_args.iter().enumerate() {
            let value = self.evaluate(arg, &TypeHandle::Any, &child_path(path, i))?;
            if expr.constructor_args.len() == 1 {
                if let Some(hint) = value.as_int() {
                    capacity = capacity.max(hint.max(0) as usize);
                }
            }
        }

        let element = desired.element_type();
        let mut builder = self.config.collection_handler().builder(capacity);
        for (i, item) in items.iter().enumerate() {
            let value = self.evaluate(item, &element, &child_path(path, i))?;
            builder.push(value);
        }
        Ok(builder.finish())
    }

    fn build_map(
        &mut self,
        members: &[(Expression, Expression)],
        desired: &TypeHandle,
        path: &str,
    ) -> Result<Value, XonError> {
        let entries = Rc::new(RefCell::new(IndexMap::new()));
        let map = Value::Map(entries.clone());
        // Registered before the entries evaluate so they can refer back to
        // the map itself.
        self.path_map.insert(path.to_string(), map.clone());

        let value_type = desired.value_type();
        for (key_expr, value_expr) in members {
            let key = self.evaluate_key(key_expr)?;
            let value = self.evaluate(value_expr, &value_type, &child_path(path, &key))?;
            entries.borrow_mut().insert(key, value);
        }
        Ok(map)
    }

    fn build_instance(
        &mut self,
        class: Rc<ClassDescriptor>,
        members: &[(Expression, Expression)],
        expr: &Expression,
        path: &str,
    ) -> Result<Value, XonError> {
        let instance = Rc::new(RefCell::new(Instance::new(class.clone())));
        let value = Value::Object(instance.clone());
        // An instance's identity is stable once allocated, so members may
        // reference it while it is being populated.
        self.path_map.insert(path.to_string(), value.clone());

        let explicit_args = &expr.constructor_args;
        if !explicit_args.is_empty() {
            self.construct_with_args(&class, explicit_args, expr, path, &instance)?;
        }

        // Members wired to constructor parameters are collected and deferred
        // until the whole member list is seen, unless an explicit argument
        // list already ran the constructor.
        let wire_members = explicit_args.is_empty();
        let mut deferred: Vec<(&MemberDescriptor, &Expression, String, String)> = Vec::new();

        for (key_expr, value_expr) in members {
            let key = self.evaluate_key(key_expr)?;
            let Some(member) = class.find_member(&key) else {
                return Err(EvalError::UnknownMember {
                    src: (*self.source).clone(),
                    span: key_expr.span(),
                    member: key,
                    type_name: class.name.clone(),
                }
                .into());
            };
            if member.ignored {
                trace!("skipping ignored member {} of {}", member.name, class.name);
                continue;
            }
            let member_path = child_path(path, &key);
            if wire_members {
                if let Some(param) = &member.ctor_param {
                    deferred.push((member, value_expr, member_path, param.clone()));
                    continue;
                }
            }
            let value = self.evaluate_member(member, value_expr, &member_path, &member.ty)?;
            instance.borrow_mut().set(member.name.clone(), value);
        }

        if !deferred.is_empty() {
            let args: Vec<CtorArgument> = deferred
                .iter()
                .enumerate()
                .map(|(i, (member, _, _, param))| {
                    CtorArgument::named(i, param.clone(), member.ty.clone())
                })
                .collect();
            let resolution = resolve_constructor(&class, &args).ok_or_else(|| {
                ResolveError::NoMatchingConstructor {
                    src: (*self.source).clone(),
                    span: expr.span(),
                    type_name: class.name.clone(),
                }
            })?;
            debug!(
                "constructing {} via constructor {}",
                class.name, resolution.constructor
            );
            for ((member, value_expr, member_path, _), arg_type) in
                deferred.iter().zip(&resolution.arg_types)
            {
                let value = self.evaluate_member(member, value_expr, member_path, arg_type)?;
                instance.borrow_mut().set(member.name.clone(), value);
            }
        }

        if let Some(callback) = &class.on_complete {
            callback(&mut instance.borrow_mut());
        }
        Ok(value)
    }

    /// Runs an explicit `new Type(args)` argument list: resolves the
    /// constructor positionally, evaluates each argument against its
    /// resolved parameter type and assigns it under the parameter's name.
    fn construct_with_args(
        &mut self,
        class: &Rc<ClassDescriptor>,
        args: &[Expression],
        expr: &Expression,
        path: &str,
        instance: &Rc<RefCell<Instance>>,
    ) -> Result<(), XonError> {
        let ctor_args: Vec<CtorArgument> = (0..args.len()).map(CtorArgument::positional).collect();
        let resolution = resolve_constructor(class, &ctor_args).ok_or_else(|| {
            ResolveError::NoMatchingConstructor {
                src: (*self.source).clone(),
                span: expr.span(),
                type_name: class.name.clone(),
            }
        })?;
        debug!(
            "constructing {} via constructor {} ({} explicit args)",
            class.name,
            resolution.constructor,
            args.len()
        );
        let ctor = &class.constructors[resolution.constructor];
        for (i, (arg, param)) in args.iter().zip(&ctor.params).enumerate() {
            let value = self.evaluate(arg, &param.ty, &child_path(path, i))?;
            instance.borrow_mut().set(param.name.clone(), value);
        }
        Ok(())
    }

    fn evaluate_member(
        &mut self,
        member: &MemberDescriptor,
        expr: &Expression,
        path: &str,
        desired: &TypeHandle,
    ) -> Result<Value, XonError> {
        match &member.converter {
            Some(converter) => {
                let intermediate = self.evaluate(expr, &converter.serialized_type(), path)?;
                let value = converter
                    .from_serialized(intermediate)
                    .map_err(|message| EvalError::Converter {
                        src: (*self.source).clone(),
                        span: expr.span(),
                        message,
                    })?;
                self.path_map.insert(path.to_string(), value.clone());
                Ok(value)
            }
            None => self.evaluate(expr, desired, path),
        }
    }

    /// Object keys are expressions, but only ones with an obvious string
    /// form are accepted as member names.
    fn evaluate_key(&mut self, expr: &Expression) -> Result<String, XonError> {
        match &expr.kind {
            ExpressionKind::Scalar(text) => Ok(text.clone()),
            ExpressionKind::Numeric(text) => Ok(text.clone()),
            ExpressionKind::Boolean(b) => Ok(b.to_string()),
            ExpressionKind::Null => Ok("null".to_string()),
            _ => Err(self.conversion_error("<compound key>", &TypeHandle::Str, expr)),
        }
    }

    fn convert_bool(
        &self,
        b: bool,
        desired: &TypeHandle,
        expr: &Expression,
    ) -> Result<Value, XonError> {
        match desired {
            TypeHandle::Bool | TypeHandle::Any => Ok(Value::Bool(b)),
            TypeHandle::Str => Ok(Value::Str(b.to_string())),
            other => Err(self.conversion_error(&b.to_string(), other, expr)),
        }
    }

    fn convert_numeric(
        &self,
        text: &str,
        desired: &TypeHandle,
        expr: &Expression,
    ) -> Result<Value, XonError> {
        match desired {
            TypeHandle::Int => {
                if let Ok(i) = text.parse::<i64>() {
                    return Ok(Value::Int(i));
                }
                // An integer literal that missed the parse above is out of
                // range; only float-shaped literals get the fallback.
                if !text.contains(['.', 'e', 'E']) {
                    return Err(self.conversion_error(text, desired, expr));
                }
                // A whole-valued float literal still converts, but only in
                // range: `i64::MAX as f64` rounds up to 2^63, which would
                // overflow, so the upper bound is strict.
                match text.parse::<f64>() {
                    Ok(f)
                        if f.fract() == 0.0
                            && f >= i64::MIN as f64
                            && f < i64::MAX as f64 =>
                    {
                        Ok(Value::Int(f as i64))
                    }
                    _ => Err(self.conversion_error(text, desired, expr)),
                }
            }
            TypeHandle::Float => text
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|_| self.conversion_error(text, desired, expr)),
            TypeHandle::Str => Ok(Value::Str(text.to_string())),
            TypeHandle::Any => {
                // Infer the narrowest natural type from the literal shape.
                if !text.contains(['.', 'e', 'E']) {
                    if let Ok(i) = text.parse::<i64>() {
                        return Ok(Value::Int(i));
                    }
                }
                text.parse::<f64>()
                    .map(Value::Float)
                    .map_err(|_| self.conversion_error(text, desired, expr))
            }
            other => Err(self.conversion_error(text, other, expr)),
        }
    }

    fn convert_scalar(
        &self,
        text: &str,
        desired: &TypeHandle,
        expr: &Expression,
    ) -> Result<Value, XonError> {
        match desired {
            TypeHandle::Str | TypeHandle::Any => Ok(Value::Str(text.to_string())),
            TypeHandle::Int => text
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|_| self.conversion_error(text, desired, expr)),
            TypeHandle::Float => text
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|_| self.conversion_error(text, desired, expr)),
            TypeHandle::Bool => match text {
                "true" => Ok(Value::Bool(true)),
                "false" => Ok(Value::Bool(false)),
                _ => Err(self.conversion_error(text, desired, expr)),
            },
            TypeHandle::Enum(descriptor) => {
                // Enum targets parse by member name.
                if descriptor.variants.iter().any(|v| v == text) {
                    Ok(Value::Enum(descriptor.clone(), text.to_string()))
                } else {
                    Err(self.conversion_error(text, desired, expr))
                }
            }
            other => Err(self.conversion_error(text, other, expr)),
        }
    }

    fn conversion_error(&self, literal: &str, target: &TypeHandle, expr: &Expression) -> XonError {
        EvalError::TypeConversion {
            src: (*self.source).clone(),
            span: expr.span(),
            literal: literal.to_string(),
            target: target.to_string(),
        }
        .into()
    }
}
