//! Tarn execution core: fused-segment preparation for validated bytecode
//! and resumable suspension states for functions paused at an `await`.
//!
//! The front end (tokenizer, parser, type analyzer) and the generic opcode
//! interpreter live elsewhere; this crate owns what happens between them:
//! turning validated instruction runs into pre-decoded execution steps, and
//! keeping a paused call resumable across script and instance teardown.

pub mod rt;
pub mod util;
pub mod val;
pub mod vm;

pub use val::{Type, Val};
