//! Runtime support for suspended calls.

mod liveness;
mod suspend;

pub use liveness::*;
pub use suspend::*;

#[cfg(test)]
mod suspend_test;
