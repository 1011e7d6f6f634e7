//! Suspended-call state (the `await` continuation).
//!
//! When a function yields, the interpreter captures its frame into a
//! [`FunctionState`] and hands the state to whoever is waiting. Resuming
//! re-enters the interpreter at the saved offset with the supplied result.
//! A state survives the teardown of its owning script or instance: it just
//! becomes permanently unusable, detected lazily through the liveness
//! registry at the next validity check or resume attempt.

use std::fmt;
use std::sync::{Arc, Mutex};

use crate::rt::liveness::{InstanceId, ScriptId, StateId, with_registry};
use crate::val::{Type, Val};
use crate::vm::ScriptFunction;

/// The paused frame: everything needed to re-enter the interpreter.
/// Exclusively owned by its state; taken out exactly once, by the winning
/// resume. The fixed reserved stack prefix is never captured here.
pub struct Capture {
    pub function: Arc<ScriptFunction>,
    pub stack: Vec<Val>,
    pub resume_ip: usize,
    /// Source line of the suspension site, for diagnostics.
    pub line: i32,
    /// Result value handed to `resume`, visible to the re-entered frame.
    pub result: Val,
}

impl Capture {
    pub fn new(function: Arc<ScriptFunction>, stack: Vec<Val>, resume_ip: usize, line: i32) -> Capture {
        Capture {
            function,
            stack,
            resume_ip,
            line,
            result: Val::Nil,
        }
    }

    fn clear_stack(&mut self) {
        self.stack.clear();
    }
}

struct StateInner {
    capture: Option<Capture>,
    /// Head of the await chain this state belongs to. Set on the next leg
    /// when a resumed function suspends again; sharing the owning `Arc`
    /// keeps the whole chain reachable from any link.
    first_state: Option<Arc<FunctionState>>,
}

pub struct FunctionState {
    id: StateId,
    script: ScriptId,
    instance: Option<InstanceId>,
    inner: Mutex<StateInner>,
}

impl FunctionState {
    /// Capture a suspension and attach it to its owners' liveness tables.
    pub fn suspend(capture: Capture, script: ScriptId, instance: Option<InstanceId>) -> Arc<FunctionState> {
        let id = with_registry(|reg| {
            let id = reg.new_state_id();
            reg.attach(id, script, instance);
            id
        });
        Arc::new(FunctionState {
            id,
            script,
            instance,
            inner: Mutex::new(StateInner {
                capture: Some(capture),
                first_state: None,
            }),
        })
    }

    /// Without the extended check: simply "not yet resumed". The extended
    /// check also verifies the owning script and bound instance are still
    /// alive and still carry this state.
    pub fn is_valid(&self, extended_check: bool) -> bool {
        if extended_check {
            let (script_ok, instance_ok) = with_registry(|reg| reg.attached(self.id, self.script, self.instance));
            if !script_ok || !instance_ok {
                return false;
            }
        }
        self.inner.lock().unwrap().capture.is_some()
    }

    /// Resume the paused call with `value` as the await result.
    ///
    /// Exactly one concurrent caller can win: the liveness detach below is
    /// performed under the global lock before the interpreter is re-entered,
    /// so every later attempt observes the state as already dead and gets
    /// `Val::Nil` back without side effects.
    pub fn resume(self: &Arc<Self>, value: Val) -> Val {
        let alive = with_registry(|reg| {
            let (script_ok, instance_ok) = reg.attached(self.id, self.script, self.instance);
            if script_ok && instance_ok {
                reg.detach(self.id, self.script, self.instance);
                true
            } else {
                #[cfg(debug_assertions)]
                self.report_dead_resume(script_ok);
                false
            }
        });
        if !alive {
            return Val::Nil;
        }

        // Only the winner of the detach above reaches this take.
        let Some(mut capture) = self.inner.lock().unwrap().capture.take() else {
            return Val::Nil;
        };

        capture.result = value;
        let function = Arc::clone(&capture.function);
        let ret = (function.entry)(&function, &mut capture);

        let mut completed = true;

        // If the interpreter handed back a fresh state for the same
        // function, the call suspended again: extend the await chain.
        if let Val::State(next) = &ret
            && next.owning_function().is_some_and(|f| Arc::ptr_eq(&f, &function))
        {
            completed = false;
            let head = self
                .inner
                .lock()
                .unwrap()
                .first_state
                .clone()
                .unwrap_or_else(|| Arc::clone(self));
            next.inner.lock().unwrap().first_state = Some(head);
        }

        capture.result = Val::Nil;
        if completed {
            capture.clear_stack();
        }
        drop(capture);

        ret
    }

    /// First state of the await chain, once a re-suspension created one.
    pub fn chain_head(&self) -> Option<Arc<FunctionState>> {
        self.inner.lock().unwrap().first_state.clone()
    }

    pub fn function_name(&self) -> Arc<str> {
        match &self.inner.lock().unwrap().capture {
            Some(capture) => Arc::clone(&capture.function.name),
            None => Arc::from("<resumed>"),
        }
    }

    fn owning_function(&self) -> Option<Arc<ScriptFunction>> {
        self.inner
            .lock()
            .unwrap()
            .capture
            .as_ref()
            .map(|capture| Arc::clone(&capture.function))
    }

    #[cfg(debug_assertions)]
    fn report_dead_resume(&self, script_ok: bool) {
        let inner = self.inner.lock().unwrap();
        let Some(capture) = &inner.capture else {
            tracing::warn!("resumed a function state twice; ignoring");
            return;
        };
        let what = if script_ok { "class instance" } else { "script" };
        tracing::warn!(
            "Resumed function '{}()' after await, but {} is gone. At script: {}:{}",
            capture.function.name,
            what,
            capture.function.source_path,
            capture.line
        );
    }
}

impl Drop for FunctionState {
    fn drop(&mut self) {
        with_registry(|reg| reg.detach(self.id, self.script, self.instance));
    }
}

impl fmt::Debug for FunctionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionState")
            .field("id", &self.id)
            .field("function", &self.function_name())
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallErrorKind {
    TooFewArguments,
    InvalidArgument,
}

/// Structured failure from the callback adapter: which argument offended
/// and what was expected there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallError {
    pub kind: CallErrorKind,
    pub argument: usize,
    pub expected: Type,
}

impl fmt::Display for CallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            CallErrorKind::TooFewArguments => {
                write!(f, "too few arguments: expected at least {}", self.argument + 1)
            }
            CallErrorKind::InvalidArgument => {
                write!(f, "invalid argument {}: expected {}", self.argument, self.expected.name())
            }
        }
    }
}

impl std::error::Error for CallError {}

/// Adapter for "resume when an external event fires". The event source
/// appends the continuation as the trailing argument; the payload handed to
/// `resume` collapses by arity: none, the sole value, or the whole list.
pub fn signal_callback(args: &[Val]) -> Result<Val, CallError> {
    if args.is_empty() {
        return Err(CallError {
            kind: CallErrorKind::TooFewArguments,
            argument: 0,
            expected: Type::State,
        });
    }

    let arg = match args.len() {
        1 => Val::Nil,
        2 => args[0].clone(),
        n => Val::List(Arc::new(args[..n - 1].to_vec())),
    };

    let last = args.len() - 1;
    let Val::State(state) = &args[last] else {
        return Err(CallError {
            kind: CallErrorKind::InvalidArgument,
            argument: last,
            expected: Type::State,
        });
    };

    Ok(state.resume(arg))
}
