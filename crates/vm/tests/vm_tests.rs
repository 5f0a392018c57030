//! End-to-end tests for the Ember VM: modules built with `ModuleBuilder`,
//! loaded into a `Runtime` and driven through the embedding API.

use ember_common::{Module, ModuleBuilder, ObjectRef, Opcode, Operand, RuntimeValue};
use ember_vm::{
    run_module, ApiError, LoadError, ManualClock, Output, RunOutcome, Runtime, RuntimeConfig,
    RuntimeError,
};
use proptest::prelude::*;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

// ============================================================
// Helper functions
// ============================================================

/// Runtime on a manual clock that advances 1 ms per reading.
fn runtime() -> (Runtime, Rc<ManualClock>) {
    runtime_with(RuntimeConfig::default())
}

fn runtime_with(config: RuntimeConfig) -> (Runtime, Rc<ManualClock>) {
    let clock = Rc::new(ManualClock::new(1));
    (Runtime::with_clock(config, clock.clone()), clock)
}

fn slot(i: i32) -> Operand {
    Operand::AbsoluteSlot(i)
}

/// Module whose `_Main` runs `body` and then returns.
fn main_module(body: impl FnOnce(&mut ModuleBuilder)) -> Module {
    let mut b = ModuleBuilder::new();
    let main = b.function("_Main", 0, 0);
    body(&mut b);
    b.op(Opcode::Ret);
    b.set_main(main);
    b.build().unwrap()
}

/// `_Main` computes `Fact(n)`; `Fact` is the usual recursive factorial.
fn factorial_module(n: i64) -> Module {
    let mut b = ModuleBuilder::new();
    let main = b.function("_Main", 0, 0);
    let fact = b.declare_function("Fact", 1, 0);
    b.emit(Opcode::Push, vec![Operand::Int(n)]);
    b.emit(Opcode::Call, vec![Operand::FuncTarget(fact)]);
    b.op(Opcode::Ret);

    // The single parameter sits at frame - 3.
    b.place_function(fact);
    b.emit(Opcode::Push, vec![slot(-3)]);
    b.emit(Opcode::Push, vec![Operand::Int(1)]);
    let recurse = b.emit_forward(Opcode::Jg);
    b.emit(Opcode::Mov, vec![Operand::ret(), Operand::Int(1)]);
    b.op(Opcode::Ret);
    let here = b.here();
    b.patch_target(recurse, here);
    b.emit(Opcode::Push, vec![slot(-3)]);
    b.op(Opcode::Dec);
    b.emit(Opcode::Call, vec![Operand::FuncTarget(fact)]);
    b.emit(Opcode::Push, vec![slot(-3)]);
    b.emit(Opcode::Push, vec![Operand::ret()]);
    b.op(Opcode::Mul);
    b.emit(Opcode::Pop, vec![Operand::ret()]);
    b.op(Opcode::Ret);

    b.set_main(main);
    b.build().unwrap()
}

/// Host function that records every string argument it receives.
fn recorder(rt: &mut Runtime, name: &str) -> Rc<RefCell<Vec<String>>> {
    let log = Rc::new(RefCell::new(Vec::new()));
    let sink = log.clone();
    rt.register_host(name, move |s| {
        sink.borrow_mut().push(s.param_as_string(0)?);
        s.return_void();
        Ok(())
    });
    log
}

// ============================================================
// Calls and stack balance
// ============================================================

#[test]
fn factorial_of_ten() {
    assert_eq!(run_module(factorial_module(10)).unwrap(), 3_628_800);
}

#[test]
fn factorial_leaves_stack_balanced() {
    let (mut rt, _) = runtime();
    let id = rt.load_module(factorial_module(10)).unwrap();
    let before = rt.state(id).unwrap().top();

    rt.pass_int(id, 10).unwrap();
    let value = rt.call_sync(id, "fact").unwrap();
    assert_eq!(value, RuntimeValue::Int(3_628_800));
    assert_eq!(rt.state(id).unwrap().top(), before);
    assert_eq!(rt.state(id).unwrap().call_depth(), 0);

    // The same holds at every depth.
    for n in 0..12 {
        rt.pass_int(id, n).unwrap();
        rt.call_sync(id, "Fact").unwrap();
        assert_eq!(rt.state(id).unwrap().top(), before);
    }
}

#[test]
fn scheduled_main_sets_exit_code() {
    let (mut rt, _) = runtime();
    let id = rt.load_module(factorial_module(5)).unwrap();
    rt.start(id).unwrap();
    rt.run_until_idle().unwrap();
    assert_eq!(rt.exit_code(id).unwrap(), 120);
    assert!(!rt.is_running(id).unwrap());
}

#[test]
fn async_call_runs_under_scheduler() {
    let (mut rt, _) = runtime();
    let id = rt.load_module(factorial_module(1)).unwrap();
    rt.pass_int(id, 6).unwrap();
    rt.call_async(id, "Fact").unwrap();
    assert!(rt.is_running(id).unwrap());
    rt.run_until_idle().unwrap();
    assert_eq!(rt.return_as_int(id).unwrap(), 720);
    assert!(!rt.is_running(id).unwrap());
}

// ============================================================
// Arithmetic and branches
// ============================================================

#[test]
fn two_plus_three_times_four() {
    let module = main_module(|b| {
        b.emit(Opcode::Push, vec![Operand::Int(2)]);
        b.emit(Opcode::Push, vec![Operand::Int(3)]);
        b.emit(Opcode::Push, vec![Operand::Int(4)]);
        b.op(Opcode::Mul);
        b.op(Opcode::Add);
        b.emit(Opcode::Pop, vec![Operand::ret()]);
    });
    assert_eq!(run_module(module).unwrap(), 14);
}

#[test]
fn division_is_typed_by_left_operand() {
    let divide = |left: Operand, right: Operand| {
        let module = main_module(|b| {
            b.emit(Opcode::Push, vec![left]);
            b.emit(Opcode::Push, vec![right]);
            b.op(Opcode::Div);
            b.emit(Opcode::Pop, vec![Operand::ret()]);
        });
        let (mut rt, _) = runtime();
        let id = rt.load_module(module).unwrap();
        rt.run_main(id).unwrap();
        rt.return_value(id).unwrap().clone()
    };
    assert_eq!(divide(Operand::Int(7), Operand::Int(2)), RuntimeValue::Int(3));
    assert_eq!(
        divide(Operand::Float(7.0), Operand::Float(2.0)),
        RuntimeValue::Float(3.5)
    );
}

#[test]
fn jl_branches_only_when_less() {
    let less = |left: i64, right: i64| {
        let module = main_module(|b| {
            b.emit(Opcode::Push, vec![Operand::Int(left)]);
            b.emit(Opcode::Push, vec![Operand::Int(right)]);
            let jump = b.emit_forward(Opcode::Jl);
            b.emit(Opcode::Mov, vec![Operand::ret(), Operand::Int(0)]);
            let skip = b.emit_forward(Opcode::Jmp);
            let taken = b.here();
            b.patch_target(jump, taken);
            b.emit(Opcode::Mov, vec![Operand::ret(), Operand::Int(1)]);
            let end = b.here();
            b.patch_target(skip, end);
        });
        run_module(module).unwrap()
    };
    assert_eq!(less(3, 5), 1);
    assert_eq!(less(5, 3), 0);
}

#[test]
fn division_by_zero_faults() {
    let module = main_module(|b| {
        b.emit(Opcode::Push, vec![Operand::Int(1)]);
        b.op(Opcode::IConst0);
        b.op(Opcode::Div);
    });
    assert!(matches!(
        run_module(module),
        Err(ApiError::Fault {
            source: RuntimeError::DivisionByZero { at: 2 },
            ..
        })
    ));
}

// ============================================================
// Host functions
// ============================================================

#[test]
fn host_function_called_once_with_params_in_push_order() {
    let (mut rt, _) = runtime();
    let calls: Rc<RefCell<Vec<Vec<RuntimeValue>>>> = Rc::default();
    let sink = calls.clone();
    rt.register_host("Explode", move |s| {
        let n = s.param_count();
        let args = (0..n)
            .rev()
            .map(|i| s.param(i).cloned())
            .collect::<Result<Vec<_>, _>>()?;
        sink.borrow_mut().push(args);
        s.return_int(n as i64);
        Ok(())
    });

    let mut b = ModuleBuilder::new();
    let main = b.function("_Main", 0, 0);
    let explode = b.host_call("Explode");
    b.emit(Opcode::Push, vec![Operand::Int(1)]);
    b.emit(Opcode::Push, vec![Operand::from("two")]);
    b.emit(Opcode::Push, vec![Operand::Float(3.5)]);
    b.emit(Opcode::Call, vec![Operand::HostCallTarget(explode)]);
    b.op(Opcode::Ret);
    b.set_main(main);
    let id = rt.load_module(b.build().unwrap()).unwrap();

    assert_eq!(rt.run_main(id).unwrap(), 3);
    assert_eq!(
        *calls.borrow(),
        vec![vec![
            RuntimeValue::Int(1),
            RuntimeValue::from("two"),
            RuntimeValue::Float(3.5)
        ]]
    );
}

#[test]
fn unregistered_host_function_faults() {
    let mut b = ModuleBuilder::new();
    let main = b.function("_Main", 0, 0);
    let nope = b.host_call("Nope");
    b.emit(Opcode::Call, vec![Operand::HostCallTarget(nope)]);
    b.op(Opcode::Ret);
    b.set_main(main);

    match run_module(b.build().unwrap()) {
        Err(ApiError::Fault { source, .. }) => assert_eq!(
            source,
            RuntimeError::UnknownHostFunction {
                at: 0,
                name: "Nope".into()
            }
        ),
        other => panic!("expected fault, got {other:?}"),
    }
}

#[test]
fn instance_host_shadows_global() {
    let (mut rt, _) = runtime();
    rt.register_host("Who", |s| {
        s.return_int(1);
        Ok(())
    });
    let module = || {
        let mut b = ModuleBuilder::new();
        let main = b.function("_Main", 0, 0);
        let who = b.host_call("Who");
        b.emit(Opcode::Call, vec![Operand::HostCallTarget(who)]);
        b.op(Opcode::Ret);
        b.set_main(main);
        b.build().unwrap()
    };
    let a = rt.load_module(module()).unwrap();
    let b = rt.load_module(module()).unwrap();
    rt.register_instance_host(a, "Who", |s| {
        s.return_int(2);
        Ok(())
    })
    .unwrap();

    assert_eq!(rt.run_main(a).unwrap(), 2);
    assert_eq!(rt.run_main(b).unwrap(), 1);
}

#[test]
fn host_enters_script_function() {
    let (mut rt, _) = runtime();
    rt.register_host("Twice", |s| {
        let n = s.param_as_int(0)?;
        s.return_void();
        s.push_value(RuntimeValue::Int(n * 2))?;
        s.enter_function("Echo")
    });

    let mut b = ModuleBuilder::new();
    let main = b.function("_Main", 0, 0);
    let echo = b.declare_function("Echo", 1, 0);
    let twice = b.host_call("Twice");
    b.emit(Opcode::Push, vec![Operand::Int(21)]);
    b.emit(Opcode::Call, vec![Operand::HostCallTarget(twice)]);
    b.op(Opcode::Ret);
    b.place_function(echo);
    b.emit(Opcode::Mov, vec![Operand::ret(), slot(-3)]);
    b.op(Opcode::Ret);
    b.set_main(main);
    let id = rt.load_module(b.build().unwrap()).unwrap();

    assert_eq!(rt.run_main(id).unwrap(), 42);
    assert_eq!(rt.state(id).unwrap().top(), 0);
}

// ============================================================
// Heap
// ============================================================

/// Registers `Collect`, which runs a collection and returns the number of
/// objects freed.
fn register_collect(rt: &mut Runtime) {
    rt.register_host("Collect", |s| {
        let stats = s.collect_garbage();
        s.return_int(stats.freed as i64);
        Ok(())
    });
}

#[test]
fn unreachable_cycle_is_freed() {
    let (mut rt, _) = runtime();
    register_collect(&mut rt);

    let mut b = ModuleBuilder::new();
    b.globals(2);
    let collect = b.host_call("Collect");
    b.emit(Opcode::New, vec![Operand::Int(1)]);
    b.emit(Opcode::Pop, vec![slot(0)]);
    b.emit(Opcode::New, vec![Operand::Int(1)]);
    b.emit(Opcode::Pop, vec![slot(1)]);
    b.emit(Opcode::SetField, vec![slot(0), Operand::Int(0), slot(1)]);
    b.emit(Opcode::SetField, vec![slot(1), Operand::Int(0), slot(0)]);
    b.emit(Opcode::Mov, vec![slot(0), Operand::Int(0)]);
    b.emit(Opcode::Mov, vec![slot(1), Operand::Int(0)]);
    b.emit(Opcode::Call, vec![Operand::HostCallTarget(collect)]);
    b.op(Opcode::Halt);
    let id = rt.load_module(b.build().unwrap()).unwrap();

    rt.start(id).unwrap();
    rt.run_until_idle().unwrap();
    assert_eq!(rt.return_as_int(id).unwrap(), 2);
    assert_eq!(rt.state(id).unwrap().heap().live_count(), 0);
}

#[test]
fn rooted_object_survives_collection() {
    let config = RuntimeConfig {
        initial_gc_threshold: 1000,
        ..RuntimeConfig::default()
    };
    let (mut rt, _) = runtime_with(config);
    register_collect(&mut rt);

    let mut b = ModuleBuilder::new();
    b.globals(2);
    let collect = b.host_call("Collect");
    b.emit(Opcode::New, vec![Operand::Int(1)]);
    b.emit(Opcode::Pop, vec![slot(0)]);
    b.emit(Opcode::Mov, vec![slot(1), Operand::Int(9)]);
    let top = b.emit(Opcode::New, vec![Operand::Int(1)]);
    b.op(Opcode::Remove);
    b.emit(Opcode::Push, vec![slot(1)]);
    b.op(Opcode::Dec);
    b.emit(Opcode::Pop, vec![slot(1)]);
    b.emit(Opcode::Push, vec![slot(1)]);
    b.op(Opcode::IConst0);
    b.emit(Opcode::Jg, vec![Operand::InstrTarget(top)]);
    b.emit(Opcode::Call, vec![Operand::HostCallTarget(collect)]);
    b.op(Opcode::Halt);
    let id = rt.load_module(b.build().unwrap()).unwrap();

    rt.start(id).unwrap();
    rt.run_until_idle().unwrap();
    assert_eq!(rt.return_as_int(id).unwrap(), 9);
    let state = rt.state(id).unwrap();
    assert_eq!(state.heap().live_count(), 1);
    let kept = state.cell(0).and_then(RuntimeValue::as_object).unwrap();
    assert!(state.heap().contains(kept));
}

#[test]
fn stale_handle_is_dangling() {
    let (mut rt, _) = runtime();
    register_collect(&mut rt);
    let stash: Rc<Cell<Option<ObjectRef>>> = Rc::default();
    let put = stash.clone();
    rt.register_host("Stash", move |s| {
        put.set(s.param(0)?.as_object());
        s.return_void();
        Ok(())
    });
    rt.register_host("Restore", move |s| {
        let object = stash.get().ok_or_else(|| s.host_error("nothing stashed"))?;
        s.return_with(RuntimeValue::Object(object));
        Ok(())
    });

    let mut b = ModuleBuilder::new();
    b.globals(2);
    let put = b.host_call("Stash");
    let collect = b.host_call("Collect");
    let restore = b.host_call("Restore");
    b.emit(Opcode::New, vec![Operand::Int(1)]);
    b.emit(Opcode::Call, vec![Operand::HostCallTarget(put)]);
    b.emit(Opcode::Call, vec![Operand::HostCallTarget(collect)]);
    b.emit(Opcode::Call, vec![Operand::HostCallTarget(restore)]);
    b.emit(Opcode::GetField, vec![slot(1), Operand::ret(), Operand::Int(0)]);
    b.op(Opcode::Halt);
    let id = rt.load_module(b.build().unwrap()).unwrap();

    rt.start(id).unwrap();
    match rt.run_until_idle() {
        Err(ApiError::Fault { instance, source }) => {
            assert_eq!(instance, id);
            assert_eq!(source, RuntimeError::DanglingObject { at: 4 });
        }
        other => panic!("expected fault, got {other:?}"),
    }
    assert!(!rt.is_running(id).unwrap());
}

#[test]
fn huge_object_faults_only_its_instance() {
    let (mut rt, _) = runtime();
    let mut b = ModuleBuilder::new();
    b.globals(1);
    b.emit(Opcode::Mov, vec![slot(0), Operand::Int(i64::from(i32::MAX))]);
    b.emit(Opcode::Push, vec![slot(0)]);
    b.emit(Opcode::Push, vec![slot(0)]);
    b.op(Opcode::Mul);
    b.emit(Opcode::Pop, vec![slot(0)]);
    b.emit(Opcode::New, vec![slot(0)]);
    b.op(Opcode::Halt);
    let greedy = rt.load_module(b.build().unwrap()).unwrap();
    let other = rt.load_module(factorial_module(4)).unwrap();

    rt.start(greedy).unwrap();
    rt.start(other).unwrap();
    match rt.run_until_idle() {
        Err(ApiError::Fault { instance, source }) => {
            assert_eq!(instance, greedy);
            assert!(matches!(source, RuntimeError::BadFieldCount { at: 5, .. }));
        }
        other => panic!("expected fault, got {other:?}"),
    }
    rt.run_until_idle().unwrap();
    assert_eq!(rt.exit_code(other).unwrap(), 24);
}

#[test]
fn object_field_limit_comes_from_config() {
    let config = RuntimeConfig {
        max_object_fields: 3,
        ..RuntimeConfig::default()
    };
    let (mut rt, _) = runtime_with(config);
    let module = main_module(|b| {
        b.emit(Opcode::New, vec![Operand::Int(3)]);
        b.emit(Opcode::New, vec![Operand::Int(4)]);
    });
    let id = rt.load_module(module).unwrap();
    assert!(matches!(
        rt.run_main(id),
        Err(ApiError::Fault {
            source: RuntimeError::BadFieldCount { at: 1, count: 4 },
            ..
        })
    ));
}

// ============================================================
// Script output
// ============================================================

#[test]
fn print_trap_writes_to_runtime_output() {
    let (mut rt, _) = runtime();
    let buf = Rc::new(RefCell::new(Vec::new()));
    rt.set_output(Output::shared(buf.clone()));

    let module = main_module(|b| {
        b.emit(Opcode::Push, vec![Operand::from("hello")]);
        b.emit(Opcode::Trap, vec![Operand::Int(0)]);
        b.emit(Opcode::Push, vec![Operand::Float(1.25)]);
        b.emit(Opcode::Trap, vec![Operand::Int(0)]);
    });
    let id = rt.load_module(module).unwrap();
    rt.run_main(id).unwrap();
    assert_eq!(String::from_utf8(buf.borrow().clone()).unwrap(), "hello\n1.25\n");
}

// ============================================================
// Scheduler
// ============================================================

/// Top-level loop: `CALL Tick; JMP 0`.
fn ticker() -> Module {
    let mut b = ModuleBuilder::new();
    let tick = b.host_call("Tick");
    b.emit(Opcode::Call, vec![Operand::HostCallTarget(tick)]);
    b.emit(Opcode::Jmp, vec![Operand::InstrTarget(0)]);
    b.build().unwrap()
}

#[test]
fn equal_slices_alternate_and_never_overlap() {
    let (mut rt, _) = runtime();
    let log: Rc<RefCell<Vec<char>>> = Rc::default();
    let a = rt.load_module(ticker()).unwrap();
    let b = rt.load_module(ticker()).unwrap();
    for (id, tag) in [(a, 'a'), (b, 'b')] {
        let sink = log.clone();
        rt.register_instance_host(id, "Tick", move |s| {
            sink.borrow_mut().push(tag);
            s.return_void();
            Ok(())
        })
        .unwrap();
        rt.set_timeslice(id, 10).unwrap();
        rt.start(id).unwrap();
    }

    let mut order = Vec::new();
    for _ in 0..20 {
        let report = rt.run_slice().unwrap().unwrap();
        assert_eq!(report.outcome, RunOutcome::SliceExpired);
        order.push(report.instance);
    }
    let expected: Vec<_> = [a, b].into_iter().cycle().take(20).collect();
    assert_eq!(order, expected);

    // Ticks form one contiguous run per slice, alternating by instance.
    let log = log.borrow();
    let mut runs = log.iter().collect::<Vec<_>>();
    runs.dedup();
    let expected: Vec<_> = ['a', 'b'].iter().cycle().take(20).collect();
    assert_eq!(runs, expected);
}

#[test]
fn pause_lets_other_instances_run() {
    let (mut rt, clock) = runtime();
    let log = recorder(&mut rt, "Mark");

    let mut b = ModuleBuilder::new();
    let mark = b.host_call("Mark");
    b.emit(Opcode::Push, vec![Operand::from("a1")]);
    b.emit(Opcode::Call, vec![Operand::HostCallTarget(mark)]);
    b.emit(Opcode::Pause, vec![Operand::Int(100)]);
    b.emit(Opcode::Push, vec![Operand::from("a2")]);
    b.emit(Opcode::Call, vec![Operand::HostCallTarget(mark)]);
    b.op(Opcode::Halt);
    let a = rt.load_module(b.build().unwrap()).unwrap();

    let mut b = ModuleBuilder::new();
    let mark = b.host_call("Mark");
    b.emit(Opcode::Push, vec![Operand::from("b")]);
    b.emit(Opcode::Call, vec![Operand::HostCallTarget(mark)]);
    b.op(Opcode::Halt);
    let b = rt.load_module(b.build().unwrap()).unwrap();

    rt.start(a).unwrap();
    rt.start(b).unwrap();
    rt.run_until_idle().unwrap();
    assert_eq!(*log.borrow(), ["a1", "b", "a2"]);
    assert!(clock.peek() >= 100);
}

#[test]
fn break_leaves_runtime_idle_until_resumed() {
    let (mut rt, _) = runtime();
    let module = main_module(|b| {
        b.op(Opcode::Break);
        b.emit(Opcode::Mov, vec![Operand::ret(), Operand::Int(8)]);
    });
    let id = rt.load_module(module).unwrap();
    rt.start(id).unwrap();
    rt.run_until_idle().unwrap();
    assert!(rt.is_running(id).unwrap());

    rt.resume(id).unwrap();
    rt.run_until_idle().unwrap();
    assert_eq!(rt.exit_code(id).unwrap(), 8);
}

#[test]
fn sync_call_resumes_interrupted_instance() {
    let (mut rt, _) = runtime();
    let mut b = ModuleBuilder::new();
    b.globals(1);
    b.emit(Opcode::Push, vec![slot(0)]);
    b.op(Opcode::Inc);
    b.emit(Opcode::Pop, vec![slot(0)]);
    b.emit(Opcode::Push, vec![slot(0)]);
    b.emit(Opcode::Push, vec![Operand::Int(30)]);
    b.emit(Opcode::Jl, vec![Operand::InstrTarget(0)]);
    b.op(Opcode::Halt);
    b.function("Peek", 0, 0);
    b.emit(Opcode::Mov, vec![Operand::ret(), slot(0)]);
    b.op(Opcode::Ret);
    let id = rt.load_module(b.build().unwrap()).unwrap();
    rt.set_timeslice(id, 5).unwrap();
    rt.start(id).unwrap();

    let report = rt.run_slice().unwrap().unwrap();
    assert_eq!(report.outcome, RunOutcome::SliceExpired);
    let (ip, top) = {
        let state = rt.state(id).unwrap();
        (state.ip(), state.top())
    };

    let seen = rt.call_sync(id, "Peek").unwrap().coerce_int();
    assert!(seen > 0 && seen < 30);
    let state = rt.state(id).unwrap();
    assert_eq!((state.ip(), state.top()), (ip, top));
    assert!(state.is_running());

    rt.run_until_idle().unwrap();
    assert_eq!(rt.state(id).unwrap().cell(0), Some(&RuntimeValue::Int(30)));
}

#[test]
fn stop_takes_effect_between_instructions() {
    let (mut rt, _) = runtime();
    let id = rt.load_module(ticker()).unwrap();
    rt.register_host("Tick", |s| {
        s.return_void();
        Ok(())
    });
    rt.start(id).unwrap();
    rt.run_for(50).unwrap();
    assert!(rt.is_running(id).unwrap());
    rt.stop(id).unwrap();
    assert_eq!(rt.run_slice().unwrap(), None);
}

// ============================================================
// Loading
// ============================================================

#[test]
fn load_encoded_module() {
    let bytes = factorial_module(4).encode().unwrap();
    let (mut rt, _) = runtime();
    let id = rt.load_bytes(&bytes).unwrap();
    assert_eq!(rt.run_main(id).unwrap(), 24);
}

#[test]
fn load_missing_file() {
    let (mut rt, _) = runtime();
    assert!(matches!(
        rt.load_file("/nonexistent/ember/module.emb"),
        Err(LoadError::Io { .. })
    ));
}

#[test]
fn load_garbage_bytes() {
    let (mut rt, _) = runtime();
    assert!(matches!(
        rt.load_bytes(b"not a module"),
        Err(LoadError::Decode(_))
    ));
}

// ============================================================
// Properties
// ============================================================

proptest! {
    /// Integer arithmetic in scripts matches wrapping i64 arithmetic.
    #[test]
    fn script_arithmetic_matches_native(
        a in any::<i64>(),
        b in any::<i64>(),
        op in prop::sample::select(vec![Opcode::Add, Opcode::Sub, Opcode::Mul, Opcode::Div]),
    ) {
        prop_assume!(!(op == Opcode::Div && b == 0));
        let module = main_module(|m| {
            m.emit(Opcode::Push, vec![Operand::Int(a)]);
            m.emit(Opcode::Push, vec![Operand::Int(b)]);
            m.op(op);
            m.emit(Opcode::Pop, vec![Operand::ret()]);
        });
        let expected = match op {
            Opcode::Add => a.wrapping_add(b),
            Opcode::Sub => a.wrapping_sub(b),
            Opcode::Mul => a.wrapping_mul(b),
            _ => a.wrapping_div(b),
        };
        prop_assert_eq!(run_module(module).unwrap(), expected);
    }
}
