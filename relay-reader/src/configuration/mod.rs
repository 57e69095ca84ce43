//! Logic for loading configuration in to an object model

use std::num::NonZeroUsize;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::Deserialize;
use serde::Serialize;

#[cfg(test)]
mod tests;

/// The configuration for the reader.
///
/// Can be created through `serde::Deserialize` from various formats,
/// or inline in Rust code with the builder.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Configuration {
    /// Resolver output cache configuration.
    #[serde(default)]
    pub(crate) resolver_cache: ResolverCache,

    /// Maximum nesting depth of selections followed during a single read.
    #[serde(default = "default_recursion_limit")]
    pub(crate) recursion_limit: usize,
}

fn default_recursion_limit() -> usize {
    // The RECURSION_LIMIT is chosen to be:
    //   < # expected to cause stack overflow &&
    //   > # expected in a legitimate fragment
    512
}

#[buildstructor::buildstructor]
impl Configuration {
    #[builder]
    pub fn new(resolver_cache: Option<ResolverCache>, recursion_limit: Option<usize>) -> Self {
        Self {
            resolver_cache: resolver_cache.unwrap_or_default(),
            recursion_limit: recursion_limit.unwrap_or_else(default_recursion_limit),
        }
    }

    /// The eviction policy of the resolver output cache.
    pub fn eviction(&self) -> &EvictionPolicy {
        &self.resolver_cache.eviction
    }

    /// Maximum nesting depth of selections followed during a single read.
    pub fn recursion_limit(&self) -> usize {
        self.recursion_limit
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Configuration::builder().build()
    }
}

/// Parse configuration from a string in YAML syntax
impl FromStr for Configuration {
    type Err = serde_yaml::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_yaml::from_str(s)
    }
}

/// Resolver output cache configuration.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ResolverCache {
    /// How cached resolver outputs are retained.
    #[serde(default)]
    pub(crate) eviction: EvictionPolicy,
}

#[buildstructor::buildstructor]
impl ResolverCache {
    #[builder]
    pub fn new(eviction: Option<EvictionPolicy>) -> Self {
        Self {
            eviction: eviction.unwrap_or_default(),
        }
    }
}

/// How cached resolver outputs are retained.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub enum EvictionPolicy {
    /// Entries per (resolver, dependency data) pair, each resolver field instance (resolver,
    /// record, storage key) keeping only the entry of its last dependency data.
    #[default]
    SingleSlot,

    /// One entry per (resolver, dependency data) pair, kept for the lifetime of the reader.
    Unbounded,

    /// One entry per (resolver, dependency data) pair, bounded by a least recently used policy.
    Lru {
        /// Maximum number of cached outputs.
        capacity: NonZeroUsize,
    },
}

/// Generate a JSON schema for the configuration.
pub fn generate_config_schema() -> serde_json::Value {
    serde_json::to_value(schemars::schema_for!(Configuration)).unwrap_or_default()
}
