//! Reads compiled GraphQL fragments out of a normalized client store, computing resolver-backed
//! fields with user functions and caching their outputs by input.

#![cfg_attr(feature = "failfast", allow(unreachable_code))]
#![warn(unreachable_pub)]

macro_rules! failfast_debug {
    ($($tokens:tt)+) => {{
        tracing::debug!($($tokens)+);
        #[cfg(feature = "failfast")]
        panic!(
            "failfast triggered. \
            Please remove the feature failfast if you don't want to see these panics"
        );
    }};
}

macro_rules! failfast_error {
    ($($tokens:tt)+) => {{
        tracing::error!($($tokens)+);
        #[cfg(feature = "failfast")]
        panic!(
            "failfast triggered. \
            Please remove the feature failfast if you don't want to see these panics"
        );
    }};
}

pub mod cache;
pub mod configuration;
pub mod error;
pub mod graphql;
pub mod json_ext;
mod reader;
pub mod resolvers;
pub mod spec;
pub mod store;

pub use cache::CacheStats;
pub use cache::ResolverValue;
pub use cache::WrappedObject;
pub use configuration::Configuration;
pub use configuration::EvictionPolicy;
pub use error::ConfigurationError;
pub use error::ReaderError;
pub use reader::Reader;
pub use reader::Snapshot;
pub use resolvers::Resolver;
pub use resolvers::ResolverError;
pub use resolvers::ResolverId;
pub use resolvers::ResolverRegistry;
pub use spec::Fragments;
pub use spec::ReaderFragment;
pub use store::InMemoryRecordSource;
pub use store::Record;
pub use store::RecordSource;
pub use store::RecordState;
