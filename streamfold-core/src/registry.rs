//! Explicit registry of processor factories and the check compiler.
//! Passing the registry into batcher construction keeps the set of
//! constructible components a property of the embedding process instead
//! of a process-wide side effect.

use std::collections::HashMap;
use std::sync::Arc;

use crate::check::{Check, CheckCompiler, ComparisonCompiler};
use crate::config::ProcessorSpec;
use crate::error::{Error, Result};
use crate::processor::lines::LinesFactory;
use crate::processor::noop::NoopFactory;
use crate::processor::sleep::SleepFactory;
use crate::processor::split::SplitFactory;
use crate::processor::Processor;

/// Creates processor instances from their persisted specs.
pub trait ProcessorFactory: Send + Sync {
    /// Build a processor from its spec.
    ///
    /// # Errors
    /// Returns [`Error::BadProcessor`] when the spec's options are invalid.
    fn create(&self, spec: &ProcessorSpec) -> Result<Box<dyn Processor>>;

    /// Human-readable name for this factory (for error messages).
    fn name(&self) -> &'static str;
}

/// Maps processor type names to factories and compiles check expressions.
pub struct Registry {
    factories: HashMap<String, Box<dyn ProcessorFactory>>,
    check_compiler: Box<dyn CheckCompiler>,
}

impl Registry {
    /// A registry with no processor factories and the built-in check
    /// compiler.
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
            check_compiler: Box::new(ComparisonCompiler),
        }
    }

    /// Register a processor factory under a type name.
    ///
    /// # Panics
    /// Panics if a factory is already registered with this name; wiring up
    /// the registry happens once at startup, so a duplicate is a bug.
    pub fn register<F: ProcessorFactory + 'static>(&mut self, type_name: &str, factory: F) {
        if self.factories.contains_key(type_name) {
            panic!("processor factory {type_name:?} already registered");
        }
        self.factories
            .insert(type_name.to_string(), Box::new(factory));
    }

    /// Replace the check compiler, e.g. with a full mapping language.
    pub fn set_check_compiler<C: CheckCompiler + 'static>(&mut self, compiler: C) {
        self.check_compiler = Box::new(compiler);
    }

    /// Build a processor from its spec.
    pub fn create(&self, spec: &ProcessorSpec) -> Result<Box<dyn Processor>> {
        let factory = self.factories.get(&spec.kind).ok_or_else(|| {
            Error::BadProcessor(format!(
                "unknown processor type {:?}, available: [{}]",
                spec.kind,
                self.available_types().join(", ")
            ))
        })?;
        factory.create(spec)
    }

    /// Compile a check expression with the configured compiler.
    pub fn compile_check(&self, source: &str) -> Result<Arc<dyn Check>> {
        self.check_compiler.compile(source)
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.factories.contains_key(type_name)
    }

    /// Registered type names, sorted for stable error messages.
    pub fn available_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }
}

impl Default for Registry {
    /// A registry with every built-in processor registered.
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register("lines", LinesFactory);
        registry.register("noop", NoopFactory);
        registry.register("sleep", SleepFactory);
        registry.register("split", SplitFactory);
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_registry_has_builtins() {
        let registry = Registry::default();
        assert_eq!(
            registry.available_types(),
            vec!["lines", "noop", "sleep", "split"]
        );
        assert!(registry.contains("noop"));
        assert!(!registry.contains("http"));
    }

    #[test]
    fn test_create_unknown_type() {
        let registry = Registry::default();
        let err = registry
            .create(&ProcessorSpec::new("warp_drive"))
            .unwrap_err();
        match err {
            Error::BadProcessor(detail) => {
                assert!(detail.contains("warp_drive"));
                assert!(detail.contains("noop"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_create_builtin() {
        let registry = Registry::default();
        let processor = registry.create(&ProcessorSpec::new("noop")).unwrap();
        assert_eq!(processor.name(), "noop");
    }

    #[test]
    #[should_panic(expected = "already registered")]
    fn test_duplicate_registration_panics() {
        let mut registry = Registry::default();
        registry.register("noop", NoopFactory);
    }

    #[test]
    fn test_compile_check_uses_builtin_compiler() {
        let registry = Registry::empty();
        assert!(registry.compile_check(r#"payload == "END""#).is_ok());
        assert!(matches!(
            registry.compile_check("nonsense").unwrap_err(),
            Error::BadCheck(_)
        ));
    }
}
