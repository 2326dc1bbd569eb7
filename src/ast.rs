use crate::typespec::TypeSpecifier;
use std::fmt::Display;

/// One segment of a back-reference path: either a property name or an index
/// jump through a list.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum PathSegment {
    Property(String),
    Index(usize),
}

impl Display for PathSegment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PathSegment::Property(name) => write!(f, "{name}"),
            PathSegment::Index(i) => write!(f, "{i}"),
        }
    }
}

/// Joins `this` and the given segments into the canonical dotted path string
/// used as the key of the evaluator's and serializer's path maps.
pub fn join_path(segments: &[PathSegment]) -> String {
    let mut path = String::from("this");
    for segment in segments {
        path.push('.');
        path.push_str(&segment.to_string());
    }
    path
}

/// Appends one path segment to an existing dotted path.
pub fn child_path(parent: &str, segment: impl Display) -> String {
    format!("{parent}.{segment}")
}

#[derive(Debug, PartialEq, Clone)]
pub enum ExpressionKind {
    Null,
    /// A number literal; the exact text is preserved so the evaluator can
    /// decide between integer and floating-point at conversion time.
    Numeric(String),
    Boolean(bool),
    /// A deferred-typed primitive: quoted strings and bare identifiers. The
    /// concrete primitive type is decided at evaluation time from the
    /// context's desired type.
    Scalar(String),
    List(Vec<Expression>),
    /// Members in document order. Keys are full expressions, not just
    /// identifiers.
    Object(Vec<(Expression, Expression)>),
    /// A `this`-rooted back-reference to an already-materialized node.
    Reference(Vec<PathSegment>),
}

/// A node of the expression tree. The tree is owned top-down and has no
/// cycles; sharing only exists in the materialized graph.
#[derive(Debug, PartialEq, Clone)]
pub struct Expression {
    pub kind: ExpressionKind,
    /// Bound by an enclosing cast at parse time; a bound type is never
    /// overwritten by the evaluator.
    pub result_type: Option<TypeSpecifier>,
    /// Non-empty only for nodes produced by a `new Type(...)` production.
    pub constructor_args: Vec<Expression>,
    pub pos_start: usize,
    pub pos_end: usize,
}

impl Expression {
    pub fn new(kind: ExpressionKind, pos_start: usize, pos_end: usize) -> Self {
        Self {
            kind,
            result_type: None,
            constructor_args: Vec::new(),
            pos_start,
            pos_end,
        }
    }

    pub fn span(&self) -> miette::SourceSpan {
        (self.pos_start, self.pos_end.saturating_sub(self.pos_start)).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_path() {
        assert_eq!(join_path(&[]), "this");
        assert_eq!(
            join_path(&[
                PathSegment::Property("items".into()),
                PathSegment::Index(0),
                PathSegment::Property("name".into()),
            ]),
            "this.items.0.name"
        );
    }

    #[test]
    fn test_child_path() {
        assert_eq!(child_path("this", "key"), "this.key");
        assert_eq!(child_path("this.items", 2), "this.items.2");
    }
}
