// Error paths through the public API
// These exercise each error family a caller can hit: lexical, syntactic,
// type resolution, evaluation and writing.

use xon_core::error::{EvalError, LexError, ParseError, ResolveError, WriteError};
use xon_core::types::ClassBuilder;
use xon_core::{read, read_typed, write, Configuration, ReferencePolicy, TypeHandle, XonError};

#[test]
fn test_unterminated_string_error() {
    let config = Configuration::new();
    let result = read(r#""never ends"#, &config);
    assert!(matches!(
        result,
        Err(XonError::Lex(LexError::UnterminatedString { .. }))
    ));
}

#[test]
fn test_invalid_number_error() {
    let config = Configuration::new();
    let result = read("1.2.3", &config);
    assert!(matches!(
        result,
        Err(XonError::Lex(LexError::InvalidNumber { .. }))
    ));
}

#[test]
fn test_unexpected_character_error() {
    let config = Configuration::new();
    let result = read("@", &config);
    assert!(matches!(
        result,
        Err(XonError::Lex(LexError::UnexpectedCharacter { character: '@', .. }))
    ));
}

#[test]
fn test_unterminated_comment_error() {
    let config = Configuration::new();
    let result = read("/* never closed", &config);
    assert!(matches!(
        result,
        Err(XonError::Lex(LexError::UnterminatedComment { .. }))
    ));
}

#[test]
fn test_truncated_document_error() {
    let config = Configuration::new();
    let result = read(r#"{"key""#, &config);
    assert!(matches!(
        result,
        Err(XonError::Parse(ParseError::UnexpectedEof { .. }))
    ));
}

#[test]
fn test_unexpected_token_error() {
    let config = Configuration::new();
    let result = read("[1 2]", &config);
    assert!(matches!(
        result,
        Err(XonError::Parse(ParseError::UnexpectedToken { .. }))
    ));
}

#[test]
fn test_trailing_input_rejected() {
    let config = Configuration::new();
    let result = read("1 2", &config);
    assert!(matches!(result, Err(XonError::Parse(_))));
}

#[test]
fn test_unknown_type_error() {
    let config = Configuration::new();
    let result = read("(Widget)1", &config);
    assert!(matches!(
        result,
        Err(XonError::Resolve(ResolveError::UnknownType { ref name, .. })) if name == "Widget"
    ));
}

#[test]
fn test_type_conversion_error() {
    let config = Configuration::new();
    let result = read_typed("true", &config, &TypeHandle::Int);
    assert!(matches!(
        result,
        Err(XonError::Eval(EvalError::TypeConversion { .. }))
    ));
}

#[test]
fn test_forward_reference_error() {
    let config = Configuration::new();
    // Back-references only resolve against values already materialized.
    let result = read("[this.1, 2]", &config);
    assert!(matches!(
        result,
        Err(XonError::Eval(EvalError::UnresolvedReference { ref path, .. })) if path == "this.1"
    ));
}

#[test]
fn test_unknown_member_error() {
    let mut config = Configuration::new();
    let handle = config.register_class(
        ClassBuilder::new("User")
            .member("name", TypeHandle::Str)
            .build(),
    );
    let result = read_typed(r#"{"nope":1}"#, &config, &handle);
    assert!(matches!(
        result,
        Err(XonError::Eval(EvalError::UnknownMember { ref member, .. })) if member == "nope"
    ));
}

#[test]
fn test_no_matching_constructor_error() {
    let mut config = Configuration::new();
    config.register_class(
        ClassBuilder::new("Point")
            .member("x", TypeHandle::Int)
            .ctor(&[("x", TypeHandle::Int)])
            .build(),
    );
    let result = read("new Point(1, 2, 3)", &config);
    assert!(matches!(
        result,
        Err(XonError::Resolve(ResolveError::NoMatchingConstructor { ref type_name, .. }))
            if type_name == "Point"
    ));
}

#[test]
fn test_circular_reference_error_policy() {
    let mut config = Configuration::new();
    let value = read(r#"{"me":this}"#, &config).unwrap();
    config.options.reference_policy = ReferencePolicy::ErrorCircular;
    let result = write(&value, &config);
    assert!(matches!(
        result,
        Err(XonError::Write(WriteError::CircularReference { .. }))
    ));
}

#[test]
fn test_errors_render_as_diagnostics() {
    let config = Configuration::new();
    let err = read("(Widget)1", &config).unwrap_err();
    // The miette report must carry the failing source snippet.
    let rendered = format!("{:?}", miette::Report::new(err));
    assert!(rendered.contains("Widget"));
}
