//! Name → factory lookup used to instantiate program handles

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::config::EngineConfig;
use crate::error::{HarnessError, Result};
use crate::program::{DatalogFactory, ProgramFactory, ProgramHandle};

// Generated by build.rs from programs/*.dl
include!(concat!(env!("OUT_DIR"), "/builtin_programs.rs"));

/// Registry of instantiable programs
///
/// Passed explicitly to whoever creates handles, so tests can register
/// fake factories instead of the bundled programs.
#[derive(Clone, Default)]
pub struct ProgramRegistry {
    factories: BTreeMap<String, Arc<dyn ProgramFactory>>,
    config: EngineConfig,
}

impl ProgramRegistry {
    /// Empty registry with the default engine configuration
    pub fn new() -> Self {
        ProgramRegistry::default()
    }

    /// Registry holding every program bundled at build time
    pub fn builtin() -> Result<Self> {
        let mut registry = ProgramRegistry::new();
        for (name, source) in BUILTIN_PROGRAMS {
            registry.register_source(name, source)?;
        }
        Ok(registry)
    }

    /// Engine configuration handed to every new instance
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Register a factory under its own name, returning the one it replaces
    pub fn register(&mut self, factory: Arc<dyn ProgramFactory>) -> Option<Arc<dyn ProgramFactory>> {
        self.factories.insert(factory.name().to_string(), factory)
    }

    /// Compile Datalog source and register it as `name`
    pub fn register_source(&mut self, name: &str, source: &str) -> Result<()> {
        let factory = DatalogFactory::from_source(name, source)?;
        self.register(Arc::new(factory));
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered program names, sorted
    pub fn names(&self) -> Vec<&str> {
        self.factories.keys().map(|k| k.as_str()).collect()
    }

    /// Create a new handle for the named program, in state `Created`
    pub fn instantiate(&self, name: &str) -> Result<ProgramHandle> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| HarnessError::UnknownProgram(name.to_string()))?;

        let program = factory.instantiate(&self.config)?;
        tracing::info!("Instantiated program {}", name);
        Ok(ProgramHandle::new(program))
    }

    /// Run `f` with a fresh handle and dispose it afterwards, whatever `f`
    /// returned. An error from `f` takes precedence over a disposal error.
    pub fn with_program<T, F>(&self, name: &str, f: F) -> Result<T>
    where
        F: FnOnce(&mut ProgramHandle) -> Result<T>,
    {
        let mut handle = self.instantiate(name)?;
        let result = f(&mut handle);

        if handle.is_disposed() {
            return result;
        }
        let disposed = handle.dispose();
        match (result, disposed) {
            (Err(e), _) => Err(e),
            (Ok(_), Err(e)) => Err(e),
            (Ok(value), Ok(())) => Ok(value),
        }
    }
}

impl fmt::Debug for ProgramRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgramRegistry")
            .field("programs", &self.names())
            .field("config", &self.config)
            .finish()
    }
}
