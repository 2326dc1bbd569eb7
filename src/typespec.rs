use crate::error::ResolveError;
use crate::types::{TypeHandle, TypeRegistry};
use miette::NamedSource;
use std::fmt::Display;
use std::sync::Arc;

/// A parsed, not-yet-resolved description of a type: a dotted name, optional
/// generic arguments and an array rank. Produced once per cast, constructor or
/// generic-argument occurrence; resolution against the registry happens lazily
/// through [`bind`].
#[derive(Debug, PartialEq, Clone)]
pub struct TypeSpecifier {
    pub name: String,
    pub generic_args: Vec<TypeSpecifier>,
    pub array_rank: usize,
    pub pos_start: usize,
    pub pos_end: usize,
}

impl TypeSpecifier {
    pub fn simple(name: impl Into<String>, pos_start: usize, pos_end: usize) -> Self {
        Self {
            name: name.into(),
            generic_args: Vec::new(),
            array_rank: 0,
            pos_start,
            pos_end,
        }
    }

    pub fn span(&self) -> miette::SourceSpan {
        (self.pos_start, self.pos_end.saturating_sub(self.pos_start)).into()
    }
}

impl Display for TypeSpecifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)?;
        if !self.generic_args.is_empty() {
            write!(f, "<")?;
            for (i, arg) in self.generic_args.iter().enumerate() {
                if i > 0 {
                    write!(f, ",")?;
                }
                write!(f, "{arg}")?;
            }
            write!(f, ">")?;
        }
        for _ in 0..self.array_rank {
            write!(f, "[]")?;
        }
        Ok(())
    }
}

/// Binds a parsed specifier to a concrete runtime type handle.
///
/// The alias table is consulted first, then a full-name lookup. `list<T>` and
/// `map<V>` specifiers (under any registered alias) carry their element type
/// through; a trailing `[]` wraps the bound type in a list once per rank.
pub fn bind(
    spec: &TypeSpecifier,
    registry: &TypeRegistry,
    source: &Arc<NamedSource<String>>,
) -> Result<TypeHandle, ResolveError> {
    let unknown = || ResolveError::UnknownType {
        src: (**source).clone(),
        span: spec.span(),
        name: spec.to_string(),
    };

    let base = registry.lookup(&spec.name).ok_or_else(unknown)?;

    let mut bound = if spec.generic_args.is_empty() {
        base
    } else {
        match base {
            TypeHandle::List(_) => {
                // The element type is the single generic argument.
                if spec.generic_args.len() != 1 {
                    return Err(unknown());
                }
                let elem = bind(&spec.generic_args[0], registry, source)?;
                TypeHandle::List(Box::new(elem))
            }
            TypeHandle::Map(_) => {
                // String keys are implicit; the last argument is the value
                // type, so both `map<V>` and `map<K,V>` spellings bind.
                let value_spec = spec.generic_args.last().ok_or_else(unknown)?;
                let value = bind(value_spec, registry, source)?;
                TypeHandle::Map(Box::new(value))
            }
            _ => return Err(unknown()),
        }
    };

    for _ in 0..spec.array_rank {
        bound = TypeHandle::List(Box::new(bound));
    }
    Ok(bound)
}
