//! Function-pointer resolution tables.
//!
//! The front end proves operand types ahead of time and emits table indices
//! into the instruction stream; the segment builder resolves each index once
//! and stores the function pointer by value in the decoded step, so nothing
//! is looked up by index at run time. All entries are plain `fn` pointers
//! (`Copy`), which keeps decoded steps cheap to clone and comparable.

use std::sync::Arc;

use crate::val::Val;

/// Binary/unary operator evaluator. Unary evaluators ignore `b`.
pub type OperatorFn = fn(a: &Val, b: &Val, dst: &mut Val);

/// Property read resolved to a concrete (type, name) pair by the front end.
pub type NamedGetterFn = fn(base: &Val, dst: &mut Val);
pub type NamedSetterFn = fn(base: &mut Val, value: &Val);

pub type KeyedGetterFn = fn(base: &Val, key: &Val, dst: &mut Val);
pub type KeyedSetterFn = fn(base: &mut Val, key: &Val, value: &Val);

pub type IndexedGetterFn = fn(base: &Val, index: i64, dst: &mut Val);
pub type IndexedSetterFn = fn(base: &mut Val, index: i64, value: &Val);

/// Builtin method on a receiver value.
pub type BuiltinMethodFn = fn(base: &mut Val, args: &[Val], dst: &mut Val);

/// Free utility function (also used for language-level utilities).
pub type UtilityFn = fn(args: &[Val], dst: &mut Val);

/// Per-function resolution tables, assembled by the front end. The core
/// only indexes into them at segment-build time; out-of-range indices make
/// the affected instruction undecodable.
#[derive(Default)]
pub struct DispatchTables {
    pub operators: Vec<OperatorFn>,
    pub named_getters: Vec<NamedGetterFn>,
    pub named_setters: Vec<NamedSetterFn>,
    pub keyed_getters: Vec<KeyedGetterFn>,
    pub keyed_setters: Vec<KeyedSetterFn>,
    pub indexed_getters: Vec<IndexedGetterFn>,
    pub indexed_setters: Vec<IndexedSetterFn>,
    pub builtin_methods: Vec<BuiltinMethodFn>,
    pub utilities: Vec<UtilityFn>,
    pub lang_utilities: Vec<UtilityFn>,
}

impl DispatchTables {
    /// Tables preloaded with the stock evaluators below, in declaration
    /// order. The front end typically starts from these and appends the
    /// monomorphic getters/setters it resolves per script.
    pub fn with_core() -> DispatchTables {
        DispatchTables {
            operators: vec![op_add, op_sub, op_mul, op_div, op_mod, op_neg],
            named_getters: vec![named_get_len],
            named_setters: Vec::new(),
            keyed_getters: vec![map_keyed_get],
            keyed_setters: vec![map_keyed_set],
            indexed_getters: vec![list_indexed_get],
            indexed_setters: vec![list_indexed_set],
            builtin_methods: vec![builtin_list_push, builtin_str_upper],
            utilities: vec![util_abs, util_max],
            lang_utilities: vec![lang_typeof, lang_str],
        }
    }
}

// Stock evaluators. Dynamic over numeric kinds; the front end only routes
// operand combinations here that it has proven sensible.

fn arith(a: &Val, b: &Val, int_op: fn(i64, i64) -> i64, float_op: fn(f64, f64) -> f64) -> Val {
    match (a, b) {
        (Val::Int(x), Val::Int(y)) => Val::Int(int_op(*x, *y)),
        (Val::Float(x), Val::Float(y)) => Val::Float(float_op(*x, *y)),
        (Val::Int(x), Val::Float(y)) => Val::Float(float_op(*x as f64, *y)),
        (Val::Float(x), Val::Int(y)) => Val::Float(float_op(*x, *y as f64)),
        _ => Val::Nil,
    }
}

pub fn op_add(a: &Val, b: &Val, dst: &mut Val) {
    *dst = match (a, b) {
        (Val::Str(x), Val::Str(y)) => {
            let mut s = String::with_capacity(x.len() + y.len());
            s.push_str(x);
            s.push_str(y);
            Val::Str(Arc::from(s.as_str()))
        }
        _ => arith(a, b, i64::wrapping_add, |x, y| x + y),
    };
}

pub fn op_sub(a: &Val, b: &Val, dst: &mut Val) {
    *dst = arith(a, b, i64::wrapping_sub, |x, y| x - y);
}

pub fn op_mul(a: &Val, b: &Val, dst: &mut Val) {
    *dst = arith(a, b, i64::wrapping_mul, |x, y| x * y);
}

pub fn op_div(a: &Val, b: &Val, dst: &mut Val) {
    *dst = match (a, b) {
        (Val::Int(_), Val::Int(0)) => Val::Nil,
        _ => arith(a, b, i64::wrapping_div, |x, y| x / y),
    };
}

pub fn op_mod(a: &Val, b: &Val, dst: &mut Val) {
    *dst = match (a, b) {
        (Val::Int(_), Val::Int(0)) => Val::Nil,
        _ => arith(a, b, i64::wrapping_rem, |x, y| x % y),
    };
}

/// Unary negate; operand B is unused.
pub fn op_neg(a: &Val, _b: &Val, dst: &mut Val) {
    *dst = match a {
        Val::Int(x) => Val::Int(x.wrapping_neg()),
        Val::Float(x) => Val::Float(-x),
        _ => Val::Nil,
    };
}

pub fn named_get_len(base: &Val, dst: &mut Val) {
    *dst = match base {
        Val::Str(s) => Val::Int(s.chars().count() as i64),
        Val::List(items) => Val::Int(items.len() as i64),
        Val::Map(map) => Val::Int(map.len() as i64),
        _ => Val::Nil,
    };
}

pub fn map_keyed_get(base: &Val, key: &Val, dst: &mut Val) {
    *dst = match (base, key) {
        (Val::Map(map), Val::Str(k)) => map.get(k).cloned().unwrap_or(Val::Nil),
        _ => Val::Nil,
    };
}

pub fn map_keyed_set(base: &mut Val, key: &Val, value: &Val) {
    if let (Val::Map(map), Val::Str(k)) = (base, key) {
        Arc::make_mut(map).insert(k.clone(), value.clone());
    }
}

pub fn list_indexed_get(base: &Val, index: i64, dst: &mut Val) {
    *dst = match base {
        Val::List(items) => {
            let len = items.len() as i64;
            let idx = if index < 0 { index + len } else { index };
            if (0..len).contains(&idx) {
                items[idx as usize].clone()
            } else {
                Val::Nil
            }
        }
        _ => Val::Nil,
    };
}

pub fn list_indexed_set(base: &mut Val, index: i64, value: &Val) {
    if let Val::List(items) = base {
        let len = items.len() as i64;
        let idx = if index < 0 { index + len } else { index };
        if (0..len).contains(&idx) {
            Arc::make_mut(items)[idx as usize] = value.clone();
        }
    }
}

pub fn builtin_list_push(base: &mut Val, args: &[Val], dst: &mut Val) {
    if let Val::List(items) = base {
        let items = Arc::make_mut(items);
        items.extend(args.iter().cloned());
        *dst = Val::Int(items.len() as i64);
    } else {
        *dst = Val::Nil;
    }
}

pub fn builtin_str_upper(base: &mut Val, _args: &[Val], dst: &mut Val) {
    *dst = match base {
        Val::Str(s) => Val::Str(Arc::from(s.to_uppercase().as_str())),
        _ => Val::Nil,
    };
}

pub fn util_abs(args: &[Val], dst: &mut Val) {
    *dst = match args.first() {
        Some(Val::Int(x)) => Val::Int(x.wrapping_abs()),
        Some(Val::Float(x)) => Val::Float(x.abs()),
        _ => Val::Nil,
    };
}

pub fn util_max(args: &[Val], dst: &mut Val) {
    let mut best: Option<f64> = None;
    let mut all_int = true;
    for arg in args {
        let x = match arg {
            Val::Int(i) => *i as f64,
            Val::Float(f) => {
                all_int = false;
                *f
            }
            _ => {
                *dst = Val::Nil;
                return;
            }
        };
        best = Some(best.map_or(x, |b: f64| b.max(x)));
    }
    *dst = match best {
        Some(x) if all_int => Val::Int(x as i64),
        Some(x) => Val::Float(x),
        None => Val::Nil,
    };
}

pub fn lang_typeof(args: &[Val], dst: &mut Val) {
    *dst = match args.first() {
        Some(v) => Val::Str(Arc::from(v.type_name())),
        None => Val::Nil,
    };
}

pub fn lang_str(args: &[Val], dst: &mut Val) {
    let mut out = String::new();
    for arg in args {
        out.push_str(&arg.to_string());
    }
    *dst = Val::Str(Arc::from(out.as_str()));
}
