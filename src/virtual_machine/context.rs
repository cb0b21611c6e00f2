//! Loaded bytecode modules and the memoizing loader that resolves them by name.

use crate::types::bytes::Bytes;
use crate::types::hash::Hash;
use crate::virtual_machine::errors::VMError;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Name under which the top-level script is registered.
pub const ENTRY_CONTEXT: &str = "entry";

/// An immutable bytecode module.
///
/// `base_offset` marks where code starts inside `script`; program offsets are
/// relative to it.
#[derive(Clone, PartialEq, Eq)]
pub struct ExecutionContext {
    name: String,
    script: Bytes,
    base_offset: usize,
}

impl ExecutionContext {
    /// A `base_offset` past the end of `script` yields an empty code section.
    pub fn new(name: impl Into<String>, script: impl Into<Bytes>, base_offset: usize) -> Self {
        Self {
            name: name.into(),
            script: script.into(),
            base_offset,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn script(&self) -> &Bytes {
        &self.script
    }

    pub fn base_offset(&self) -> usize {
        self.base_offset
    }

    pub fn code(&self) -> &[u8] {
        self.script.get(self.base_offset..).unwrap_or(&[])
    }

    /// SHA3-256 of the code section.
    pub fn hash(&self) -> Hash {
        Hash::digest(self.code())
    }

    pub(crate) fn renamed(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            script: self.script.clone(),
            base_offset: self.base_offset,
        }
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("name", &self.name)
            .field("code_len", &self.code().len())
            .field("base_offset", &self.base_offset)
            .finish()
    }
}

/// Host callback mapping a context name to its module.
pub type ContextResolver = Arc<dyn Fn(&str) -> Option<ExecutionContext> + Send + Sync>;

/// Resolves contexts on first reference and caches them for the loader's lifetime.
///
/// Misses are not cached: asking again re-invokes the resolver.
#[derive(Default)]
pub struct ContextLoader {
    resolver: Option<ContextResolver>,
    cache: HashMap<String, Arc<ExecutionContext>>,
}

impl ContextLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_resolver(resolver: ContextResolver) -> Self {
        Self {
            resolver: Some(resolver),
            cache: HashMap::new(),
        }
    }

    pub fn set_resolver(&mut self, resolver: ContextResolver) {
        self.resolver = Some(resolver);
    }

    /// Pre-registers a built-in context, replacing any cached one with the same name.
    pub fn register(&mut self, context: ExecutionContext) -> Arc<ExecutionContext> {
        let context = Arc::new(context);
        self.cache
            .insert(context.name().to_string(), Arc::clone(&context));
        context
    }

    pub fn unregister(&mut self, name: &str) -> Option<Arc<ExecutionContext>> {
        self.cache.remove(name)
    }

    pub fn load(&mut self, name: &str) -> Result<Arc<ExecutionContext>, VMError> {
        if let Some(context) = self.cache.get(name) {
            return Ok(Arc::clone(context));
        }

        let resolved = self
            .resolver
            .as_ref()
            .and_then(|resolve| resolve(name))
            .ok_or_else(|| VMError::ContextNotFound(name.to_string()))?;

        // Cache under the requested name even if the resolver named it differently.
        let context = Arc::new(if resolved.name() == name {
            resolved
        } else {
            resolved.renamed(name)
        });
        self.cache.insert(name.to_string(), Arc::clone(&context));
        Ok(context)
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.cache.contains_key(name)
    }

    pub fn loaded_count(&self) -> usize {
        self.cache.len()
    }
}

impl fmt::Debug for ContextLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.cache.keys().collect();
        names.sort();
        f.debug_struct("ContextLoader")
            .field("has_resolver", &self.resolver.is_some())
            .field("loaded", &names)
            .finish()
    }
}
