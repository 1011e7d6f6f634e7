//! Runtime value model.
//!
//! This is the subset of the Tarn value universe that the execution core
//! touches directly: segment operands, coercion targets, and suspension
//! results. Collection payloads are `Arc`-shared so cloning a `Val` is cheap.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::rt::FunctionState;
use crate::util::fast_map::FastHashMap;

/// Value kind tag, also used as the target of type-coercion steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Type {
    Nil,
    Bool,
    Int,
    Float,
    Str,
    List,
    Map,
    /// A suspended-call continuation.
    State,
}

impl Type {
    pub fn name(self) -> &'static str {
        match self {
            Type::Nil => "Nil",
            Type::Bool => "Bool",
            Type::Int => "Int",
            Type::Float => "Float",
            Type::Str => "Str",
            Type::List => "List",
            Type::Map => "Map",
            Type::State => "State",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub enum Val {
    #[default]
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Arc<str>),
    List(Arc<Vec<Val>>),
    Map(Arc<FastHashMap<Arc<str>, Val>>),
    State(Arc<FunctionState>),
}

impl Val {
    #[inline]
    pub fn kind(&self) -> Type {
        match self {
            Val::Nil => Type::Nil,
            Val::Bool(_) => Type::Bool,
            Val::Int(_) => Type::Int,
            Val::Float(_) => Type::Float,
            Val::Str(_) => Type::Str,
            Val::List(_) => Type::List,
            Val::Map(_) => Type::Map,
            Val::State(_) => Type::State,
        }
    }

    #[inline]
    pub fn type_name(&self) -> &'static str {
        self.kind().name()
    }

    /// Only Nil and false are falsey.
    #[inline]
    pub fn truthy(&self) -> bool {
        !matches!(self, Val::Nil | Val::Bool(false))
    }

    /// Lossy integer view used when an operand address resolves to an index.
    /// Non-numeric values map to 0; the front end has already proven the
    /// operand numeric for validated instructions.
    #[inline]
    pub fn as_index(&self) -> i64 {
        match self {
            Val::Int(i) => *i,
            Val::Float(f) => *f as i64,
            Val::Bool(b) => *b as i64,
            _ => 0,
        }
    }

    /// Coerce into `target`, producing the target's default value when no
    /// meaningful conversion exists. Total: never fails.
    pub fn coerce_to(self, target: Type) -> Val {
        if self.kind() == target {
            return self;
        }
        match target {
            Type::Nil => Val::Nil,
            Type::Bool => Val::Bool(self.truthy()),
            Type::Int => match self {
                Val::Float(f) => Val::Int(f as i64),
                Val::Bool(b) => Val::Int(b as i64),
                _ => Val::Int(0),
            },
            Type::Float => match self {
                Val::Int(i) => Val::Float(i as f64),
                Val::Bool(b) => Val::Float(b as i64 as f64),
                _ => Val::Float(0.0),
            },
            Type::Str => Val::Str(Arc::from(self.to_string().as_str())),
            Type::List => Val::List(Arc::new(Vec::new())),
            Type::Map => Val::Map(Arc::new(FastHashMap::default())),
            // There is no coercion opcode targeting State; fall back to Nil.
            Type::State => Val::Nil,
        }
    }
}

impl PartialEq for Val {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Val::Nil, Val::Nil) => true,
            (Val::Bool(a), Val::Bool(b)) => a == b,
            (Val::Int(a), Val::Int(b)) => a == b,
            (Val::Float(a), Val::Float(b)) => a == b,
            (Val::Str(a), Val::Str(b)) => a == b,
            (Val::List(a), Val::List(b)) => a == b,
            (Val::Map(a), Val::Map(b)) => a == b,
            (Val::State(a), Val::State(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for Val {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Val::Nil => write!(f, "nil"),
            Val::Bool(b) => write!(f, "{}", b),
            Val::Int(i) => write!(f, "{}", i),
            Val::Float(x) => write!(f, "{}", x),
            Val::Str(s) => write!(f, "{}", s),
            Val::List(items) => {
                write!(f, "[")?;
                for (i, v) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                write!(f, "]")
            }
            Val::Map(map) => {
                // Stable order so stringified maps are deterministic.
                let mut keys: Vec<&Arc<str>> = map.keys().collect();
                keys.sort();
                write!(f, "{{")?;
                for (i, k) in keys.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", k, map[*k])?;
                }
                write!(f, "}}")
            }
            Val::State(state) => write!(f, "<suspended {}>", state.function_name()),
        }
    }
}
