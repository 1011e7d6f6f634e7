//! Packed operand-address codec.
//!
//! Every operand reference in the instruction stream is one code word: the
//! top byte carries the storage class, the low 24 bits the index within that
//! class. Decoding lives here and only here so mask/shift arithmetic never
//! leaks into instruction decoders.

use serde::{Deserialize, Serialize};

/// Number of index bits in a packed address word.
pub const ADDR_BITS: u32 = 24;
pub const ADDR_MASK: u32 = (1 << ADDR_BITS) - 1;

/// Stack slots `0..FIXED_SLOTS` are reserved (self, class, nil scratch) and
/// are never part of a suspension's captured stack.
pub const FIXED_SLOTS: usize = 3;

/// Storage class of an operand address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum StorageClass {
    Stack = 0,
    Constant = 1,
    Member = 2,
    SelfRef = 3,
    Class = 4,
    Nil = 5,
}

impl StorageClass {
    #[inline]
    fn from_tag(tag: u8) -> StorageClass {
        match tag {
            0 => StorageClass::Stack,
            1 => StorageClass::Constant,
            2 => StorageClass::Member,
            3 => StorageClass::SelfRef,
            4 => StorageClass::Class,
            _ => StorageClass::Nil,
        }
    }
}

/// A decoded operand address. Execution steps store these, never raw words.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Addr {
    pub class: StorageClass,
    pub index: u32,
}

impl Addr {
    #[inline]
    pub const fn new(class: StorageClass, index: u32) -> Addr {
        Addr { class, index }
    }

    /// Decode a packed word. Total: any in-range integer produces an
    /// address; unknown tags collapse to the Nil class. Out-of-range
    /// indices are a front-end invariant, not checked here.
    #[inline]
    pub fn decode(word: i32) -> Addr {
        let bits = word as u32;
        Addr {
            class: StorageClass::from_tag((bits >> ADDR_BITS) as u8),
            index: bits & ADDR_MASK,
        }
    }

    /// Pack into a code word. Inverse of [`Addr::decode`] for indices that
    /// fit in [`ADDR_BITS`] bits.
    #[inline]
    pub const fn encode(self) -> i32 {
        (((self.class as u32) << ADDR_BITS) | (self.index & ADDR_MASK)) as i32
    }
}

#[inline]
pub const fn stack(index: u32) -> Addr {
    Addr::new(StorageClass::Stack, index)
}

#[inline]
pub const fn constant(index: u32) -> Addr {
    Addr::new(StorageClass::Constant, index)
}

#[inline]
pub const fn member(index: u32) -> Addr {
    Addr::new(StorageClass::Member, index)
}
