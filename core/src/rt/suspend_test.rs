use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use crate::rt::liveness::{ScriptId, register_instance, register_script, unregister_instance, unregister_script};
use crate::rt::suspend::{Capture, CallError, CallErrorKind, FunctionState, signal_callback};
use crate::val::{Type, Val};
use crate::vm::{DispatchTables, ResumeEntry, ScriptFunction};

/// Entry that counts invocations and echoes the resume value back.
fn echo_function(calls: Arc<AtomicUsize>) -> Arc<ScriptFunction> {
    let entry: ResumeEntry = Arc::new(move |_function, capture| {
        calls.fetch_add(1, Ordering::SeqCst);
        capture.result.clone()
    });
    Arc::new(ScriptFunction::new(
        "paused",
        "demo.tarn",
        Vec::new(),
        Vec::new(),
        Arc::new(DispatchTables::default()),
        entry,
    ))
}

fn suspend_echo(script: ScriptId, calls: &Arc<AtomicUsize>) -> Arc<FunctionState> {
    let function = echo_function(Arc::clone(calls));
    FunctionState::suspend(Capture::new(function, vec![Val::Int(1)], 8, 3), script, None)
}

#[test]
fn resume_reenters_once_and_completes() {
    let script = register_script();
    let calls = Arc::new(AtomicUsize::new(0));
    let state = suspend_echo(script, &calls);

    assert!(state.is_valid(false));
    assert!(state.is_valid(true));
    assert_eq!(state.function_name().as_ref(), "paused");

    assert_eq!(state.resume(Val::Int(7)), Val::Int(7));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // Consumed: later attempts are inert.
    assert!(!state.is_valid(false));
    assert!(!state.is_valid(true));
    assert_eq!(state.function_name().as_ref(), "<resumed>");
    assert_eq!(state.resume(Val::Int(8)), Val::Nil);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    unregister_script(script);
}

#[test]
fn script_teardown_makes_resume_inert() {
    let script = register_script();
    let calls = Arc::new(AtomicUsize::new(0));
    let state = suspend_echo(script, &calls);

    unregister_script(script);

    // The capture is still there, but the owner is gone.
    assert!(state.is_valid(false));
    assert!(!state.is_valid(true));
    assert_eq!(state.resume(Val::Int(7)), Val::Nil);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn instance_teardown_makes_resume_inert() {
    let script = register_script();
    let instance = register_instance();
    let calls = Arc::new(AtomicUsize::new(0));
    let function = echo_function(Arc::clone(&calls));
    let state = FunctionState::suspend(Capture::new(function, Vec::new(), 0, 1), script, Some(instance));

    assert!(state.is_valid(true));
    unregister_instance(instance);

    assert!(!state.is_valid(true));
    assert_eq!(state.resume(Val::Int(7)), Val::Nil);
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    unregister_script(script);
}

#[test]
fn concurrent_resume_admits_exactly_one_winner() {
    let script = register_script();
    let calls = Arc::new(AtomicUsize::new(0));
    let entry: ResumeEntry = {
        let calls = Arc::clone(&calls);
        Arc::new(move |_function, capture| {
            calls.fetch_add(1, Ordering::SeqCst);
            // Widen the race window while the state already looks dead to
            // every other caller.
            thread::sleep(Duration::from_millis(30));
            capture.result.clone()
        })
    };
    let function = Arc::new(ScriptFunction::new(
        "raced",
        "demo.tarn",
        Vec::new(),
        Vec::new(),
        Arc::new(DispatchTables::default()),
        entry,
    ));
    let state = FunctionState::suspend(Capture::new(function, Vec::new(), 0, 1), script, None);

    let handles: Vec<_> = (0..2)
        .map(|_| {
            let state = Arc::clone(&state);
            thread::spawn(move || state.resume(Val::Int(1)))
        })
        .collect();
    let results: Vec<Val> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(results.iter().filter(|r| **r == Val::Int(1)).count(), 1);
    assert_eq!(results.iter().filter(|r| **r == Val::Nil).count(), 1);

    unregister_script(script);
}

#[test]
fn resuspension_chains_back_to_the_first_state() {
    let script = register_script();
    let calls = Arc::new(AtomicUsize::new(0));
    let entry: ResumeEntry = {
        let calls = Arc::clone(&calls);
        Arc::new(move |_function, capture| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                // Suspend again at a later offset.
                let next = Capture::new(Arc::clone(&capture.function), Vec::new(), capture.resume_ip + 4, 10);
                Val::State(FunctionState::suspend(next, script, None))
            } else {
                capture.result.clone()
            }
        })
    };
    let function = Arc::new(ScriptFunction::new(
        "multi_await",
        "demo.tarn",
        Vec::new(),
        Vec::new(),
        Arc::new(DispatchTables::default()),
        entry,
    ));

    let first = FunctionState::suspend(Capture::new(Arc::clone(&function), Vec::new(), 0, 1), script, None);
    let first_weak = Arc::downgrade(&first);
    assert!(first.chain_head().is_none());

    let Val::State(second) = first.resume(Val::Nil) else {
        panic!("first resume should suspend again");
    };
    assert!(second.chain_head().is_some_and(|head| Arc::ptr_eq(&head, &first)));

    // Every link holds the head alive, even once the caller lets go.
    drop(first);
    assert!(first_weak.upgrade().is_some());

    let Val::State(third) = second.resume(Val::Nil) else {
        panic!("second resume should suspend again");
    };
    let head = third.chain_head().unwrap();
    assert!(Arc::ptr_eq(&head, &first_weak.upgrade().unwrap()));
    drop(head);

    assert_eq!(third.resume(Val::Int(9)), Val::Int(9));
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    drop(second);
    drop(third);
    assert!(first_weak.upgrade().is_none());

    unregister_script(script);
}

#[test]
fn signal_callback_requires_arguments() {
    let err = signal_callback(&[]).unwrap_err();
    assert_eq!(
        err,
        CallError {
            kind: CallErrorKind::TooFewArguments,
            argument: 0,
            expected: Type::State,
        }
    );
}

#[test]
fn signal_callback_rejects_non_state_trailing_argument() {
    let err = signal_callback(&[Val::Int(1), Val::Int(2)]).unwrap_err();
    assert_eq!(err.kind, CallErrorKind::InvalidArgument);
    assert_eq!(err.argument, 1);
    assert_eq!(err.expected, Type::State);
}

#[test]
fn signal_callback_collapses_payload_by_arity() {
    let script = register_script();
    let calls = Arc::new(AtomicUsize::new(0));

    // Sole argument: the continuation resumes with Nil.
    let state = suspend_echo(script, &calls);
    assert_eq!(signal_callback(&[Val::State(state)]).unwrap(), Val::Nil);

    // One payload value: passed through as-is.
    let state = suspend_echo(script, &calls);
    assert_eq!(
        signal_callback(&[Val::Int(5), Val::State(state)]).unwrap(),
        Val::Int(5)
    );

    // Several payload values: bundled into a list.
    let state = suspend_echo(script, &calls);
    assert_eq!(
        signal_callback(&[Val::Int(1), Val::Int(2), Val::Int(3), Val::State(state)]).unwrap(),
        Val::List(Arc::new(vec![Val::Int(1), Val::Int(2), Val::Int(3)]))
    );

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    unregister_script(script);
}
