//! Specialized execution of fused segments.
//!
//! This is the entry the interpreter loop jumps into after `segment_at`
//! hits: a tight walk over pre-decoded steps with no opcode dispatch.
//! Operand addresses resolve against the frame below; operands are read by
//! clone (cheap, payloads are `Arc`-shared) and destinations written back
//! through the same resolution.

use anyhow::{Result, anyhow};

use crate::val::Val;
use crate::vm::addr::{Addr, StorageClass};
use crate::vm::segment::{CallStep, CallTarget, FusedSegment, FusedStep};

/// The storage a fused segment executes against. `stack` excludes nothing:
/// it is the live register window, including the fixed reserved prefix.
pub struct FusedFrame<'a> {
    pub stack: &'a mut [Val],
    pub consts: &'a [Val],
    pub members: &'a mut [Val],
    pub self_val: Val,
    pub class_val: Val,
}

impl FusedFrame<'_> {
    fn read(&self, addr: Addr) -> Result<Val> {
        let idx = addr.index as usize;
        match addr.class {
            StorageClass::Stack => self.stack.get(idx).cloned(),
            StorageClass::Constant => self.consts.get(idx).cloned(),
            StorageClass::Member => self.members.get(idx).cloned(),
            StorageClass::SelfRef => Some(self.self_val.clone()),
            StorageClass::Class => Some(self.class_val.clone()),
            StorageClass::Nil => Some(Val::Nil),
        }
        .ok_or_else(|| anyhow!("operand address out of range: {:?}", addr))
    }

    /// Mutable slot for a destination or receiver address. Only stack and
    /// member slots are writable; the front end never emits anything else
    /// as a destination.
    fn slot_mut(&mut self, addr: Addr) -> Result<&mut Val> {
        let idx = addr.index as usize;
        match addr.class {
            StorageClass::Stack => self.stack.get_mut(idx),
            StorageClass::Member => self.members.get_mut(idx),
            _ => return Err(anyhow!("unwritable destination address: {:?}", addr)),
        }
        .ok_or_else(|| anyhow!("destination address out of range: {:?}", addr))
    }

    #[inline]
    fn write(&mut self, addr: Addr, value: Val) -> Result<()> {
        *self.slot_mut(addr)? = value;
        Ok(())
    }
}

impl FusedSegment {
    /// Run every step in order against `frame`.
    pub fn run(&self, frame: &mut FusedFrame<'_>) -> Result<()> {
        for step in &self.steps {
            step.execute(frame)?;
        }
        Ok(())
    }
}

impl FusedStep {
    pub fn execute(&self, frame: &mut FusedFrame<'_>) -> Result<()> {
        match self {
            FusedStep::Operator { a, b, dst, eval, unary } => {
                let a = frame.read(*a)?;
                let b = if *unary { Val::Nil } else { frame.read(*b)? };
                let mut out = Val::Nil;
                eval(&a, &b, &mut out);
                frame.write(*dst, out)
            }
            FusedStep::NamedGet { src, dst, getter } => {
                let base = frame.read(*src)?;
                let mut out = Val::Nil;
                getter(&base, &mut out);
                frame.write(*dst, out)
            }
            FusedStep::NamedSet { dst, value, setter } => {
                let value = frame.read(*value)?;
                setter(frame.slot_mut(*dst)?, &value);
                Ok(())
            }
            FusedStep::KeyedGet { src, key, dst, getter } => {
                let base = frame.read(*src)?;
                let key = frame.read(*key)?;
                let mut out = Val::Nil;
                getter(&base, &key, &mut out);
                frame.write(*dst, out)
            }
            FusedStep::KeyedSet { dst, key, value, setter } => {
                let key = frame.read(*key)?;
                let value = frame.read(*value)?;
                setter(frame.slot_mut(*dst)?, &key, &value);
                Ok(())
            }
            FusedStep::IndexedGet { src, index, dst, getter } => {
                let base = frame.read(*src)?;
                let index = frame.read(*index)?.as_index();
                let mut out = Val::Nil;
                getter(&base, index, &mut out);
                frame.write(*dst, out)
            }
            FusedStep::IndexedSet { dst, index, value, setter } => {
                let index = frame.read(*index)?.as_index();
                let value = frame.read(*value)?;
                setter(frame.slot_mut(*dst)?, index, &value);
                Ok(())
            }
            FusedStep::Call(call) => call.execute(frame),
            FusedStep::TypeAdjust { dst, target } => {
                let slot = frame.slot_mut(*dst)?;
                *slot = std::mem::take(slot).coerce_to(*target);
                Ok(())
            }
        }
    }
}

impl CallStep {
    fn execute(&self, frame: &mut FusedFrame<'_>) -> Result<()> {
        let mut args = Vec::with_capacity(self.args.len());
        for addr in &self.args {
            args.push(frame.read(*addr)?);
        }
        let mut out = Val::Nil;
        match &self.target {
            CallTarget::Builtin { base, method } => {
                method(frame.slot_mut(*base)?, &args, &mut out);
            }
            CallTarget::Utility(func) | CallTarget::LangUtility(func) => {
                func(&args, &mut out);
            }
        }
        frame.write(self.dst, out)
    }
}
