//! Reader errors.
use displaydoc::Display;
use serde::Serialize;
use thiserror::Error;

use crate::graphql;
use crate::graphql::ErrorExtension;
use crate::json_ext::Object;
use crate::json_ext::Path;

/// Errors in the generated artifacts or in the resolver wiring.
///
/// These are fatal: they are surfaced immediately and never captured by `@catch`.
#[derive(Error, Display, Debug, Clone, Serialize, Eq, PartialEq)]
#[non_exhaustive]
pub enum ConfigurationError {
    /// unknown fragment '{0}'
    UnknownFragment(String),
    /// no resolver registered for export '{export}' of module '{module}'
    UnknownResolver {
        /// The module path declared by the artifact.
        module: String,
        /// The export name declared by the artifact.
        export: String,
    },
    /// invalid reader fragment: {reason}
    InvalidFragment {
        /// Why the artifact could not be loaded.
        reason: String,
    },
    /// fragment '{0}' includes itself
    FragmentCycle(String),
    /// fragment '{0}' is registered twice
    DuplicateFragment(String),
}

impl ErrorExtension for ConfigurationError {
    fn extension_code(&self) -> String {
        match self {
            ConfigurationError::UnknownFragment(_) => "UNKNOWN_FRAGMENT",
            ConfigurationError::UnknownResolver { .. } => "UNKNOWN_RESOLVER",
            ConfigurationError::InvalidFragment { .. } => "INVALID_FRAGMENT",
            ConfigurationError::FragmentCycle(_) => "FRAGMENT_CYCLE",
            ConfigurationError::DuplicateFragment(_) => "DUPLICATE_FRAGMENT",
        }
        .to_string()
    }
}

/// Errors raised while reading a fragment.
#[derive(Error, Display, Debug, Clone, Serialize, Eq, PartialEq)]
#[non_exhaustive]
pub enum ReaderError {
    /// {0}
    Configuration(#[from] ConfigurationError),

    /// resolver '{resolver}' failed at '{path}': {message}
    ResolverExecution {
        /// The declared name of the resolver field.
        resolver: String,
        /// Where the resolver field sits in the result.
        path: Path,
        /// The message returned by the resolver.
        message: String,
    },

    /// resolver '{resolver}' at '{path}' returned an invalid value: {reason}
    InvalidResolverOutput {
        /// The declared name of the resolver field.
        resolver: String,
        /// Where the resolver field sits in the result.
        path: Path,
        /// What was wrong with the value.
        reason: String,
    },

    /// selection recursion limit({0}) exceeded
    RecursionLimitExceeded(usize),
}

impl ReaderError {
    /// Returns `true` for errors caused by user resolver code, which `@catch` may capture.
    pub fn is_field_error(&self) -> bool {
        matches!(
            self,
            ReaderError::ResolverExecution { .. } | ReaderError::InvalidResolverOutput { .. }
        )
    }

    /// The path of the field that failed, if this is a field error.
    pub fn path(&self) -> Option<&Path> {
        match self {
            ReaderError::ResolverExecution { path, .. }
            | ReaderError::InvalidResolverOutput { path, .. } => Some(path),
            _ => None,
        }
    }

    /// Convert the reader error to a GraphQL error.
    pub fn to_graphql_error(&self) -> graphql::Error {
        let mut error = graphql::Error::builder()
            .message(self.to_string())
            .extension_code(self.extension_code())
            .build();
        error.path = self.path().cloned();
        for (key, value) in self.custom_extension_details().unwrap_or_default() {
            error.extensions.insert(key, value);
        }
        error
    }
}

impl ErrorExtension for ReaderError {
    fn extension_code(&self) -> String {
        match self {
            ReaderError::Configuration(error) => return error.extension_code(),
            ReaderError::ResolverExecution { .. } => "RESOLVER_EXECUTION_ERROR",
            ReaderError::InvalidResolverOutput { .. } => "INVALID_RESOLVER_OUTPUT",
            ReaderError::RecursionLimitExceeded(_) => "RECURSION_LIMIT_EXCEEDED",
        }
        .to_string()
    }

    fn custom_extension_details(&self) -> Option<Object> {
        let mut obj = Object::new();
        match self {
            ReaderError::ResolverExecution { resolver, .. }
            | ReaderError::InvalidResolverOutput { resolver, .. } => {
                obj.insert("resolver", resolver.clone().into());
            }
            _ => (),
        }

        (!obj.is_empty()).then_some(obj)
    }
}
