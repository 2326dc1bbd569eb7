use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

#[derive(Error, Debug, Diagnostic)]
pub enum XonError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Lex(#[from] LexError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Eval(#[from] EvalError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Write(#[from] WriteError),
}

#[derive(Error, Debug, Diagnostic)]
#[error("Lexer Error")]
pub enum LexError {
    #[error("Unterminated string")]
    #[diagnostic(
        code(lexer::unterminated_string),
        help("The input ended before the closing quote of this string literal.")
    )]
    UnterminatedString {
        #[source_code]
        src: NamedSource<String>,
        #[label("String opened here is never closed")]
        span: SourceSpan,
    },

    #[error("Unterminated block comment")]
    #[diagnostic(
        code(lexer::unterminated_comment),
        help("A `/*` comment must be closed with `*/` before the end of the input.")
    )]
    UnterminatedComment {
        #[source_code]
        src: NamedSource<String>,
        #[label("Comment opened here is never closed")]
        span: SourceSpan,
    },

    #[error("Invalid number literal '{literal}'")]
    #[diagnostic(
        code(lexer::invalid_number),
        help("A number may have one fractional part and one signed exponent, in that order.")
    )]
    InvalidNumber {
        #[source_code]
        src: NamedSource<String>,
        #[label("This is not a valid number")]
        span: SourceSpan,
        literal: String,
    },

    #[error("Unexpected character '{character}'")]
    #[diagnostic(
        code(lexer::unexpected_character),
        help("This character does not start any token of the notation.")
    )]
    UnexpectedCharacter {
        #[source_code]
        src: NamedSource<String>,
        #[label("Not a valid start of a token")]
        span: SourceSpan,
        character: char,
    },
}

#[derive(Error, Debug, Diagnostic)]
#[error("Parser Error")]
pub enum ParseError {
    #[error("Unexpected token")]
    #[diagnostic(
        code(parser::unexpected_token),
        help("The parser found a token it did not expect in this position.")
    )]
    UnexpectedToken {
        #[source_code]
        src: NamedSource<String>,
        #[label("Expected {expected}, but found this")]
        span: SourceSpan,
        expected: String,
    },

    #[error("Unexpected end of file")]
    #[diagnostic(
        code(parser::unexpected_eof),
        help("The input ended unexpectedly. The parser expected more tokens.")
    )]
    UnexpectedEof {
        #[source_code]
        src: NamedSource<String>,
        #[label("Input ended unexpectedly here")]
        span: SourceSpan,
    },
}

#[derive(Error, Debug, Diagnostic)]
#[error("Type Resolution Error")]
pub enum ResolveError {
    #[error("Unknown type '{name}'")]
    #[diagnostic(
        code(resolve::unknown_type),
        help("The type name is neither a registered alias nor a fully-qualified registered type.")
    )]
    UnknownType {
        #[source_code]
        src: NamedSource<String>,
        #[label("No registered type matches this name")]
        span: SourceSpan,
        name: String,
    },

    #[error("No matching constructor on type '{type_name}'")]
    #[diagnostic(
        code(resolve::no_matching_constructor),
        help("No public constructor of the target type binds every supplied argument uniquely.")
    )]
    NoMatchingConstructor {
        #[source_code]
        src: NamedSource<String>,
        #[label("Arguments supplied here")]
        span: SourceSpan,
        type_name: String,
    },
}

#[derive(Error, Debug, Diagnostic)]
#[error("Evaluation Error")]
pub enum EvalError {
    #[error("Cannot convert '{literal}' to {target}")]
    #[diagnostic(
        code(eval::type_conversion),
        help("The literal cannot be converted to the type required by this position.")
    )]
    TypeConversion {
        #[source_code]
        src: NamedSource<String>,
        #[label("Expected a value convertible to {target}")]
        span: SourceSpan,
        literal: String,
        target: String,
    },

    #[error("Unresolved reference '{path}'")]
    #[diagnostic(
        code(eval::unresolved_reference),
        help("A back-reference can only point at a value that appears earlier in the document.")
    )]
    UnresolvedReference {
        #[source_code]
        src: NamedSource<String>,
        #[label("No value was materialized at this path")]
        span: SourceSpan,
        path: String,
    },

    #[error("Unknown member '{member}' on type '{type_name}'")]
    #[diagnostic(
        code(eval::unknown_member),
        help("The target type declares no member with this name or alias.")
    )]
    UnknownMember {
        #[source_code]
        src: NamedSource<String>,
        #[label("Not a member of {type_name}")]
        span: SourceSpan,
        member: String,
        type_name: String,
    },

    #[error("Value converter failed: {message}")]
    #[diagnostic(code(eval::converter))]
    Converter {
        #[source_code]
        src: NamedSource<String>,
        #[label("While converting this value")]
        span: SourceSpan,
        message: String,
    },
}

#[derive(Error, Debug, Diagnostic)]
#[error("Writer Error")]
pub enum WriteError {
    #[error("Operation {operation} is not valid in writer state {state}")]
    #[diagnostic(
        code(writer::invalid_state),
        help("The sequence of writer operations violates the notation grammar.")
    )]
    InvalidWriterState { operation: String, state: String },

    #[error("Circular reference detected at '{path}'")]
    #[diagnostic(
        code(writer::circular_reference),
        help("The object graph contains a cycle and the reference policy is error-circular.")
    )]
    CircularReference { path: String },

    #[error("Cannot emit reference to '{path}'")]
    #[diagnostic(
        code(writer::cannot_reference),
        help("The referenced value has not finished writing, so a back-reference to it would not resolve.")
    )]
    CannotReference { path: String },

    #[error("Value at '{path}' cannot be represented as plain JSON")]
    #[diagnostic(
        code(writer::json_interop),
        help("Only acyclic graphs can be exported to standard JSON; use the notation writer instead.")
    )]
    JsonInterop { path: String },

    #[error("Value converter failed at '{path}': {message}")]
    #[diagnostic(code(writer::converter))]
    Converter { message: String, path: String },
}
