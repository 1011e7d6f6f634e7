//! Bytecode execution subsystem
//!
//! Address codec, instruction shapes, fused-segment preparation, and the
//! specialized segment executor. Segment plans are built once per function
//! at preparation time and are immutable afterwards.

mod addr;
mod debug_info;
mod dispatch;
mod frame;
mod function;
mod opcode;
mod segment;

pub use addr::*;
pub use debug_info::*;
pub use dispatch::*;
pub use frame::*;
pub use function::*;
pub use opcode::*;
pub use segment::*;

#[cfg(test)]
mod debug_info_test;
