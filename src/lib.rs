pub mod api;
pub mod ast;
pub mod config;
pub mod error;
pub mod eval;
pub mod lexer;
pub mod parser;
pub mod types;
pub mod typespec;
pub mod value;
pub mod writer;
mod construct;
mod serializer;

pub use api::{read, read_typed, to_json, write, write_typed};
pub use config::{Configuration, ReferencePolicy, WriteOptions};
pub use error::XonError;
pub use types::{ClassBuilder, TypeHandle, TypeRegistry};
pub use value::Value;
