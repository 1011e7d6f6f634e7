//! Opcode numbering and instruction shapes.
//!
//! The instruction stream is self-describing: the word at offset 0 of each
//! instruction is the opcode, and the instruction's total word width follows
//! from the shape table below. Call-like opcodes additionally embed an
//! argument-count word right after the opcode.

/// Opcodes the execution core knows about. The generic interpreter handles
/// many more; anything not listed here is opaque to this crate and scans as
/// a one-word instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum Opcode {
    Nop = 0,
    Jump = 1,
    JumpIfFalse = 2,
    Return = 3,
    Yield = 4,

    // Validated instructions: operand types proven by the front end, so a
    // specialized execution path is allowed to skip generic dispatch.
    OperatorValidated = 10,
    GetNamedValidated = 11,
    SetNamedValidated = 12,
    GetKeyedValidated = 13,
    SetKeyedValidated = 14,
    GetIndexedValidated = 15,
    SetIndexedValidated = 16,
    CallBuiltinValidated = 17,
    CallUtilityValidated = 18,
    CallLangUtility = 19,

    // Type coercion: force the destination slot to a concrete value kind.
    TypeAdjustBool = 20,
    TypeAdjustInt = 21,
    TypeAdjustFloat = 22,
    TypeAdjustStr = 23,
    TypeAdjustList = 24,
    TypeAdjustMap = 25,
}

impl Opcode {
    pub fn from_word(word: i32) -> Option<Opcode> {
        Some(match word {
            0 => Opcode::Nop,
            1 => Opcode::Jump,
            2 => Opcode::JumpIfFalse,
            3 => Opcode::Return,
            4 => Opcode::Yield,
            10 => Opcode::OperatorValidated,
            11 => Opcode::GetNamedValidated,
            12 => Opcode::SetNamedValidated,
            13 => Opcode::GetKeyedValidated,
            14 => Opcode::SetKeyedValidated,
            15 => Opcode::GetIndexedValidated,
            16 => Opcode::SetIndexedValidated,
            17 => Opcode::CallBuiltinValidated,
            18 => Opcode::CallUtilityValidated,
            19 => Opcode::CallLangUtility,
            20 => Opcode::TypeAdjustBool,
            21 => Opcode::TypeAdjustInt,
            22 => Opcode::TypeAdjustFloat,
            23 => Opcode::TypeAdjustStr,
            24 => Opcode::TypeAdjustList,
            25 => Opcode::TypeAdjustMap,
            _ => return None,
        })
    }

    /// Whether the segment builder may fuse this opcode into a segment.
    #[inline]
    pub fn fusable(self) -> bool {
        matches!(
            self,
            Opcode::OperatorValidated
                | Opcode::GetNamedValidated
                | Opcode::SetNamedValidated
                | Opcode::GetKeyedValidated
                | Opcode::SetKeyedValidated
                | Opcode::GetIndexedValidated
                | Opcode::SetIndexedValidated
                | Opcode::CallBuiltinValidated
                | Opcode::CallUtilityValidated
                | Opcode::CallLangUtility
                | Opcode::TypeAdjustBool
                | Opcode::TypeAdjustInt
                | Opcode::TypeAdjustFloat
                | Opcode::TypeAdjustStr
                | Opcode::TypeAdjustList
                | Opcode::TypeAdjustMap
        )
    }
}

/// Argument count embedded in a call-like instruction, clamped to zero so a
/// malformed negative count cannot produce a bogus width. The decoder still
/// rejects the instruction itself.
#[inline]
fn argc_at(code: &[i32], ip: usize) -> usize {
    code.get(ip + 1).copied().map(|c| c.max(0) as usize).unwrap_or(0)
}

/// Width in words of the instruction at `ip`. Unknown opcodes report 1 so a
/// scan always advances.
pub fn width_at(code: &[i32], ip: usize) -> usize {
    let Some(op) = code.get(ip).copied().and_then(Opcode::from_word) else {
        return 1;
    };
    match op {
        Opcode::OperatorValidated
        | Opcode::GetKeyedValidated
        | Opcode::SetKeyedValidated
        | Opcode::GetIndexedValidated
        | Opcode::SetIndexedValidated => 5,
        Opcode::GetNamedValidated | Opcode::SetNamedValidated => 4,
        // op, argc, args, dst, fn-index
        Opcode::CallUtilityValidated | Opcode::CallLangUtility => 4 + argc_at(code, ip),
        // op, argc, args, base, dst, method-index
        Opcode::CallBuiltinValidated => 5 + argc_at(code, ip),
        Opcode::TypeAdjustBool
        | Opcode::TypeAdjustInt
        | Opcode::TypeAdjustFloat
        | Opcode::TypeAdjustStr
        | Opcode::TypeAdjustList
        | Opcode::TypeAdjustMap => 2,
        _ => 1,
    }
}
