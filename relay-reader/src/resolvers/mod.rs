//! User resolver functions, registered by module path and export name.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use displaydoc::Display;
use serde::Serialize;
use thiserror::Error;

use crate::error::ConfigurationError;
use crate::json_ext::Object;
use crate::json_ext::Value;

/// A function computing a derived field from the data of its dependency fragment.
///
/// Resolvers must be pure functions of their input: outputs are cached by input and are not
/// recomputed while the input is unchanged.
///
/// Implemented for closures `Fn(&Value, &Object) -> Result<Value, ResolverError>`.
pub trait Resolver: Send + Sync {
    /// Computes the field from the dependency `data` and the field `args`.
    fn resolve(&self, data: &Value, args: &Object) -> Result<Value, ResolverError>;
}

impl<F> Resolver for F
where
    F: Fn(&Value, &Object) -> Result<Value, ResolverError> + Send + Sync,
{
    fn resolve(&self, data: &Value, args: &Object) -> Result<Value, ResolverError> {
        self(data, args)
    }
}

/// {message}
#[derive(Error, Display, Debug, Clone, PartialEq, Eq)]
pub struct ResolverError {
    /// The message surfaced in the resolver execution error.
    pub message: String,
}

impl From<String> for ResolverError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<&str> for ResolverError {
    fn from(message: &str) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}

/// The registration identity of a resolver.
///
/// Cached outputs are keyed by this identity, so registering a new function under an existing
/// key never serves outputs computed by the previous one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ResolverId(usize);

impl fmt::Display for ResolverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Clone)]
pub(crate) struct RegisteredResolver {
    pub(crate) id: ResolverId,
    pub(crate) resolver: Arc<dyn Resolver>,
}

/// Maps (module path, export name) to resolver functions.
#[derive(Clone, Default)]
pub struct ResolverRegistry {
    modules: HashMap<String, HashMap<String, RegisteredResolver>>,
    next_id: usize,
}

impl ResolverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `resolver` as the `export` of `module`, replacing any previous registration.
    pub fn register<R>(
        &mut self,
        module: impl Into<String>,
        export: impl Into<String>,
        resolver: R,
    ) -> ResolverId
    where
        R: Resolver + 'static,
    {
        let id = ResolverId(self.next_id);
        self.next_id += 1;
        self.modules.entry(module.into()).or_default().insert(
            export.into(),
            RegisteredResolver {
                id,
                resolver: Arc::new(resolver),
            },
        );
        id
    }

    pub(crate) fn lookup(
        &self,
        module: &str,
        export: &str,
    ) -> Result<&RegisteredResolver, ConfigurationError> {
        self.modules
            .get(module)
            .and_then(|exports| exports.get(export))
            .ok_or_else(|| ConfigurationError::UnknownResolver {
                module: module.to_string(),
                export: export.to_string(),
            })
    }

    /// The identity of a registered resolver.
    pub fn id(&self, module: &str, export: &str) -> Result<ResolverId, ConfigurationError> {
        self.lookup(module, export).map(|registered| registered.id)
    }

    pub fn len(&self) -> usize {
        self.modules.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for ResolverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (module, exports) in &self.modules {
            for (export, registered) in exports {
                map.entry(&format_args!("{module}#{export}"), &registered.id);
            }
        }
        map.finish()
    }
}

/// Registers the exports of one resolver module.
///
/// ```ignore
/// resolver_module!(registry, "TodoDescription", {
///     text => |data: &Value, _args: &Object| Ok(data["text"].clone()),
///     color => |data: &Value, _args: &Object| Ok(data["color"].clone()),
/// });
/// ```
#[macro_export]
macro_rules! resolver_module {
    ($registry: expr, $module: expr, { $( $export: ident => $resolver: expr ),+ $(,)? }) => {{
        let registry: &mut $crate::ResolverRegistry = &mut $registry;
        let module: &str = $module;
        $(
            registry.register(module, stringify!($export), $resolver);
        )+
    }};
}
