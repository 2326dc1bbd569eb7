use crate::types::{
    ClassDescriptor, CollectionHandler, MetadataProcessor, TypeHandle, TypeRegistry,
    ValueConverter, VecCollectionHandler,
};
use std::collections::HashMap;
use std::rc::Rc;

/// How repeated or cyclic object identity is serialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReferencePolicy {
    /// Emit a `this.`-path back-reference to the first occurrence.
    #[default]
    WriteIdentifier,
    /// Emit `null` for true cycles, re-serialize shared acyclic values.
    IgnoreCircular,
    /// Fail on true cycles, re-serialize shared acyclic values.
    ErrorCircular,
}

/// Output knobs consumed by the writer and graph serializer.
#[derive(Debug, Clone)]
pub struct WriteOptions {
    /// Indented multi-line output instead of the compact single line.
    pub indent: bool,
    /// Emit a `/* ... */` header naming the root type.
    pub type_comment: bool,
    /// Emit a cast when a value's runtime type differs from its declared
    /// type, so the reader re-creates the right type.
    pub cast_on_mismatch: bool,
    pub reference_policy: ReferencePolicy,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            indent: false,
            type_comment: false,
            cast_on_mismatch: true,
            reference_policy: ReferencePolicy::WriteIdentifier,
        }
    }
}

/// All process-wide state of the converter, constructed once and passed by
/// shared reference into the parser, evaluator and serializer. Nothing here
/// mutates during a read or write call, so independent calls on separate
/// threads need no coordination.
pub struct Configuration {
    pub registry: TypeRegistry,
    pub options: WriteOptions,
    processors: Vec<MetadataProcessor>,
    converters: HashMap<String, Rc<dyn ValueConverter>>,
    collection_handler: Rc<dyn CollectionHandler>,
}

impl Default for Configuration {
    fn default() -> Self {
        Self::new()
    }
}

impl Configuration {
    pub fn new() -> Self {
        Self {
            registry: TypeRegistry::with_defaults(),
            options: WriteOptions::default(),
            processors: Vec::new(),
            converters: HashMap::new(),
            collection_handler: Rc::new(VecCollectionHandler),
        }
    }

    /// Adds a metadata processor applied, in order, to every class registered
    /// afterwards.
    pub fn add_processor(&mut self, processor: MetadataProcessor) {
        self.processors.push(processor);
    }

    /// Runs the metadata processors over the class and registers it. Returns
    /// the handle for use in declared types.
    pub fn register_class(&mut self, mut class: ClassDescriptor) -> TypeHandle {
        for processor in &self.processors {
            processor(&mut class);
        }
        self.registry.register_class(Rc::new(class))
    }

    /// Registers a type-level converter for the named class.
    pub fn register_converter(&mut self, type_name: &str, converter: Rc<dyn ValueConverter>) {
        self.converters.insert(type_name.to_string(), converter);
    }

    pub fn converter_for(&self, class: &ClassDescriptor) -> Option<Rc<dyn ValueConverter>> {
        self.converters.get(&class.name).cloned()
    }

    pub fn collection_handler(&self) -> Rc<dyn CollectionHandler> {
        self.collection_handler.clone()
    }

    pub fn set_collection_handler(&mut self, handler: Rc<dyn CollectionHandler>) {
        self.collection_handler = handler;
    }
}
