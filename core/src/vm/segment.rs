//! Fused-segment preparation.
//!
//! A single forward pass over a function's instruction stream rewrites
//! maximal contiguous runs of validated instructions into pre-decoded
//! execution steps: operand addresses unpacked, function-table indices
//! resolved to pointers. The interpreter loop consults the resulting plan
//! at every instruction boundary and jumps into a segment instead of
//! dispatching opcodes one by one.
//!
//! Build-time decode failures are never surfaced; they only shrink the
//! optimized coverage. A failure abandons the remainder of the scan
//! entirely, not just the current segment. Conservative fail-stop: the
//! generic interpreter can always run the unfused remainder.

use crate::util::fast_map::{FastHashMap, fast_hash_map_with_capacity};
use crate::val::Type;
use crate::vm::addr::Addr;
use crate::vm::dispatch::{
    BuiltinMethodFn, DispatchTables, IndexedGetterFn, IndexedSetterFn, KeyedGetterFn, KeyedSetterFn, NamedGetterFn,
    NamedSetterFn, OperatorFn, UtilityFn,
};
use crate::vm::opcode::{Opcode, width_at};

/// Segments shorter than this are dropped: the specialized-entry overhead
/// is not amortized by so few steps.
pub const MIN_FUSED_STEPS: usize = 10;

/// Front-end hint marking an operator-apply site as unary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct OperatorHint {
    pub ip: usize,
    pub unary: bool,
}

/// One pre-decoded instruction. Operands are decoded addresses, targets are
/// resolved function pointers; nothing is re-looked-up at run time.
#[derive(Debug, Clone, PartialEq)]
pub enum FusedStep {
    Operator {
        a: Addr,
        b: Addr,
        dst: Addr,
        eval: OperatorFn,
        unary: bool,
    },
    NamedGet {
        src: Addr,
        dst: Addr,
        getter: NamedGetterFn,
    },
    NamedSet {
        dst: Addr,
        value: Addr,
        setter: NamedSetterFn,
    },
    KeyedGet {
        src: Addr,
        key: Addr,
        dst: Addr,
        getter: KeyedGetterFn,
    },
    KeyedSet {
        dst: Addr,
        key: Addr,
        value: Addr,
        setter: KeyedSetterFn,
    },
    IndexedGet {
        src: Addr,
        index: Addr,
        dst: Addr,
        getter: IndexedGetterFn,
    },
    IndexedSet {
        dst: Addr,
        index: Addr,
        value: Addr,
        setter: IndexedSetterFn,
    },
    Call(CallStep),
    TypeAdjust {
        dst: Addr,
        target: Type,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct CallStep {
    pub args: Vec<Addr>,
    pub dst: Addr,
    pub target: CallTarget,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CallTarget {
    Builtin { base: Addr, method: BuiltinMethodFn },
    Utility(UtilityFn),
    LangUtility(UtilityFn),
}

/// A maximal contiguous run of fused steps.
/// Invariant: the widths of the decoded instructions sum to `end_ip - start_ip`.
#[derive(Debug, Clone, PartialEq)]
pub struct FusedSegment {
    pub start_ip: usize,
    pub end_ip: usize,
    pub steps: Vec<FusedStep>,
}

/// Immutable build output: retained segments plus an ip-indexed lookup.
/// Built once per function, then shared freely across interpreter threads.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SegmentPlan {
    pub segments: Vec<FusedSegment>,
    index_by_ip: Vec<u32>,
}

impl SegmentPlan {
    /// Segment beginning exactly at `ip`, if any. This is the query the
    /// interpreter loop issues before generic dispatch.
    #[inline]
    pub fn segment_at(&self, ip: usize) -> Option<&FusedSegment> {
        let idx = *self.index_by_ip.get(ip)?;
        if idx == u32::MAX {
            None
        } else {
            self.segments.get(idx as usize)
        }
    }
}

/// Build the segment plan for one function. Pure over its inputs: never
/// errors, and rebuilding from identical inputs yields an identical plan.
pub fn build(code: &[i32], hints: &[OperatorHint], tables: &DispatchTables) -> SegmentPlan {
    let mut segments: Vec<FusedSegment> = Vec::new();

    if !code.is_empty() {
        let mut unary_map: FastHashMap<usize, bool> = fast_hash_map_with_capacity(hints.len());
        for hint in hints {
            unary_map.insert(hint.ip, hint.unary);
        }

        let mut ip = 0usize;
        while ip < code.len() {
            let fusable = Opcode::from_word(code[ip]).is_some_and(Opcode::fusable);
            if !fusable {
                ip += width_at(code, ip);
                continue;
            }

            let start_ip = ip;
            let mut steps = Vec::new();
            let mut cursor = ip;
            let mut failed = false;
            while cursor < code.len() {
                let Some(op) = Opcode::from_word(code[cursor]).filter(|op| op.fusable()) else {
                    break;
                };
                match decode_step(code, cursor, op, &unary_map, tables) {
                    Some(step) => {
                        steps.push(step);
                        cursor += width_at(code, cursor);
                    }
                    None => {
                        failed = true;
                        break;
                    }
                }
            }

            segments.push(FusedSegment {
                start_ip,
                end_ip: cursor,
                steps,
            });

            if failed {
                // Fail-stop: one undecodable instruction abandons the rest
                // of the stream, it does not merely close this segment.
                break;
            }
            ip = cursor;
        }
    }

    segments.retain(|seg| seg.steps.len() >= MIN_FUSED_STEPS);

    let mut index_by_ip = vec![u32::MAX; code.len()];
    for (i, seg) in segments.iter().enumerate() {
        if seg.start_ip < index_by_ip.len() {
            index_by_ip[seg.start_ip] = i as u32;
        }
    }

    SegmentPlan { segments, index_by_ip }
}

#[inline]
fn word(code: &[i32], pos: usize) -> Option<i32> {
    code.get(pos).copied()
}

#[inline]
fn addr_at(code: &[i32], pos: usize) -> Option<Addr> {
    word(code, pos).map(Addr::decode)
}

/// Resolve a table index read from the stream. `None` on a truncated read
/// or an out-of-range index; both are decode failures for the instruction.
#[inline]
fn resolve<T: Copy>(table: &[T], code: &[i32], pos: usize) -> Option<T> {
    let idx = word(code, pos)?;
    if idx < 0 {
        return None;
    }
    table.get(idx as usize).copied()
}

fn decode_step(
    code: &[i32],
    ip: usize,
    op: Opcode,
    unary_map: &FastHashMap<usize, bool>,
    tables: &DispatchTables,
) -> Option<FusedStep> {
    match op {
        Opcode::OperatorValidated => {
            let eval = resolve(&tables.operators, code, ip + 4)?;
            Some(FusedStep::Operator {
                a: addr_at(code, ip + 1)?,
                b: addr_at(code, ip + 2)?,
                dst: addr_at(code, ip + 3)?,
                eval,
                unary: unary_map.get(&ip).copied().unwrap_or(false),
            })
        }
        Opcode::GetNamedValidated => {
            let getter = resolve(&tables.named_getters, code, ip + 3)?;
            Some(FusedStep::NamedGet {
                src: addr_at(code, ip + 1)?,
                dst: addr_at(code, ip + 2)?,
                getter,
            })
        }
        Opcode::SetNamedValidated => {
            let setter = resolve(&tables.named_setters, code, ip + 3)?;
            Some(FusedStep::NamedSet {
                dst: addr_at(code, ip + 1)?,
                value: addr_at(code, ip + 2)?,
                setter,
            })
        }
        Opcode::GetKeyedValidated => {
            let getter = resolve(&tables.keyed_getters, code, ip + 4)?;
            Some(FusedStep::KeyedGet {
                src: addr_at(code, ip + 1)?,
                key: addr_at(code, ip + 2)?,
                dst: addr_at(code, ip + 3)?,
                getter,
            })
        }
        Opcode::SetKeyedValidated => {
            let setter = resolve(&tables.keyed_setters, code, ip + 4)?;
            Some(FusedStep::KeyedSet {
                dst: addr_at(code, ip + 1)?,
                key: addr_at(code, ip + 2)?,
                value: addr_at(code, ip + 3)?,
                setter,
            })
        }
        Opcode::GetIndexedValidated => {
            let getter = resolve(&tables.indexed_getters, code, ip + 4)?;
            Some(FusedStep::IndexedGet {
                src: addr_at(code, ip + 1)?,
                index: addr_at(code, ip + 2)?,
                dst: addr_at(code, ip + 3)?,
                getter,
            })
        }
        Opcode::SetIndexedValidated => {
            let setter = resolve(&tables.indexed_setters, code, ip + 4)?;
            Some(FusedStep::IndexedSet {
                dst: addr_at(code, ip + 1)?,
                index: addr_at(code, ip + 2)?,
                value: addr_at(code, ip + 3)?,
                setter,
            })
        }
        Opcode::CallBuiltinValidated | Opcode::CallUtilityValidated | Opcode::CallLangUtility => {
            decode_call_step(code, ip, op, tables)
        }
        Opcode::TypeAdjustBool => adjust_step(code, ip, Type::Bool),
        Opcode::TypeAdjustInt => adjust_step(code, ip, Type::Int),
        Opcode::TypeAdjustFloat => adjust_step(code, ip, Type::Float),
        Opcode::TypeAdjustStr => adjust_step(code, ip, Type::Str),
        Opcode::TypeAdjustList => adjust_step(code, ip, Type::List),
        Opcode::TypeAdjustMap => adjust_step(code, ip, Type::Map),
        _ => None,
    }
}

fn adjust_step(code: &[i32], ip: usize, target: Type) -> Option<FusedStep> {
    Some(FusedStep::TypeAdjust {
        dst: addr_at(code, ip + 1)?,
        target,
    })
}

fn decode_call_step(code: &[i32], ip: usize, op: Opcode, tables: &DispatchTables) -> Option<FusedStep> {
    let argc = word(code, ip + 1)?;
    if argc < 0 {
        return None;
    }
    let argc = argc as usize;

    let mut args = Vec::with_capacity(argc);
    for i in 0..argc {
        args.push(addr_at(code, ip + 2 + i)?);
    }
    let after_args = ip + 2 + argc;

    let (dst, target) = match op {
        Opcode::CallBuiltinValidated => {
            let base = addr_at(code, after_args)?;
            let dst = addr_at(code, after_args + 1)?;
            let method = resolve(&tables.builtin_methods, code, after_args + 2)?;
            (dst, CallTarget::Builtin { base, method })
        }
        Opcode::CallUtilityValidated => {
            let dst = addr_at(code, after_args)?;
            let func = resolve(&tables.utilities, code, after_args + 1)?;
            (dst, CallTarget::Utility(func))
        }
        Opcode::CallLangUtility => {
            let dst = addr_at(code, after_args)?;
            let func = resolve(&tables.lang_utilities, code, after_args + 1)?;
            (dst, CallTarget::LangUtility(func))
        }
        _ => return None,
    };

    Some(FusedStep::Call(CallStep { args, dst, target }))
}
