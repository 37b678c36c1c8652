#![doc = include_str!("../README.md")]
#![deny(missing_docs)]
#![forbid(unsafe_code)]

mod botgate;
pub use botgate::*;

mod throttler;
pub use throttler::*;

mod keyed_lock;
pub use keyed_lock::*;

mod error;
pub use error::*;

mod common;
pub use common::{ChatScope, ScopeLimit, ScopePeriodSeconds, ScopeRule, ThrottlerOptions};

mod window_tracker;

#[cfg(test)]
mod tests;
