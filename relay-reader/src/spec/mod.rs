//! The generated reader artifacts: fragments and their selection trees.

#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::panic))]

mod arguments;
mod fragments;
mod selection;

pub(crate) use arguments::argument_values;
pub use arguments::Argument;
pub use fragments::*;
pub use selection::*;
