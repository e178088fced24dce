use hearth::context::{ContextVar, copy_context};
use hearth::config::LoopConfig;
use hearth::{Error, EventLoop, Runner};

use std::cell::RefCell;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;
use std::task::Poll;

#[test]
fn non_debug() {
    let runner = Runner::builder().debug(false).build();
    let scope = runner.enter().unwrap();

    assert!(!scope.get_loop().unwrap().get_debug());
}

#[test]
fn debug() {
    let runner = Runner::builder().debug(true).build();
    let scope = runner.enter().unwrap();

    assert!(scope.get_loop().unwrap().get_debug());
}

#[test]
fn custom_factory() {
    let event_loop = EventLoop::with_config(LoopConfig::default());
    let expected = event_loop.clone();

    let runner = Runner::builder().loop_factory(move || event_loop).build();
    let scope = runner.enter().unwrap();

    assert!(scope.get_loop().unwrap().ptr_eq(&expected));
    scope.exit().unwrap();
    assert!(expected.is_closed());
}

#[test]
fn loop_debug_default_is_kept_without_a_flag() {
    let debug_loop = || {
        EventLoop::with_config(LoopConfig {
            debug: true,
            ..LoopConfig::default()
        })
    };

    let runner = Runner::builder().loop_factory(debug_loop).build();
    let debug = runner.run(async { hearth::running_loop().unwrap().get_debug() });
    assert_eq!(debug, Ok(true));
    runner.close().unwrap();

    let runner = Runner::builder().debug(false).loop_factory(debug_loop).build();
    let debug = runner.run(async { hearth::running_loop().unwrap().get_debug() });
    assert_eq!(debug, Ok(false));
    runner.close().unwrap();
}

#[test]
fn close_cancels_leftovers_parked_on_poll_fn() {
    let runner = Runner::new();

    let leftover = runner
        .run(async {
            let handle = hearth::spawn(std::future::poll_fn(|_| Poll::<u32>::Pending));
            hearth::yield_now().await.ok();
            handle.task().clone()
        })
        .unwrap();

    assert!(!leftover.is_done());
    runner.close().unwrap();
    assert!(leftover.is_cancelled());
}

#[test]
fn run() {
    let runner = Runner::new();
    let event_loop = {
        let scope = runner.enter().unwrap();
        let done = scope.run(async {
            hearth::yield_now().await.ok();
            "done"
        });
        assert_eq!(done, Ok("done"));
        scope.get_loop().unwrap()
    };

    assert_eq!(runner.get_loop().err(), Some(Error::Closed));
    assert_eq!(runner.run(async {}), Err(Error::Closed));
    assert!(event_loop.is_closed());
}

#[test]
fn run_non_coro() {
    let runner = Runner::new();
    let scope = runner.enter().unwrap();

    let handle = scope.get_loop().unwrap().create_task(async { 1 });
    let err = scope.run(handle).unwrap_err();

    assert!(err.to_string().starts_with("a coroutine was expected"));
}

#[test]
fn explicit_close() {
    let runner = Runner::new();
    let event_loop = runner.get_loop().unwrap();

    runner.close().unwrap();

    assert_eq!(runner.get_loop().err(), Some(Error::Closed));
    assert!(event_loop.is_closed());
}

#[test]
fn double_close() {
    let runner = Runner::new();
    let event_loop = runner.get_loop().unwrap();

    runner.close().unwrap();
    assert!(event_loop.is_closed());

    runner.close().unwrap();
    assert!(event_loop.is_closed());
    assert!(runner.is_closed());
}

#[test]
fn close_before_first_use() {
    let runner = Runner::new();
    runner.close().unwrap();

    assert!(runner.is_closed());
    assert_eq!(runner.get_loop().err(), Some(Error::Closed));
}

#[test]
fn second_enter_fails() {
    let ret = Rc::new(RefCell::new(Vec::new()));
    let runner = Runner::new();

    {
        let scope = runner.enter().unwrap();
        let sink = ret.clone();
        scope.run(async move { sink.borrow_mut().push(1) }).unwrap();
    }

    let err = runner.enter().err();
    assert_eq!(err, Some(Error::Closed));
    assert_eq!(*ret.borrow(), vec![1]);
}

#[test]
fn run_keeps_context() {
    let cvar = ContextVar::new("cvar", -1);

    async fn f(cvar: ContextVar<i32>, val: i32) -> i32 {
        let old = cvar.get();
        hearth::yield_now().await.ok();
        cvar.set(val);
        old
    }

    let runner = Runner::new();
    let scope = runner.enter().unwrap();

    assert_eq!(scope.run(f(cvar.clone(), 1)), Ok(-1));
    assert_eq!(scope.run(f(cvar.clone(), 2)), Ok(1));

    let context = scope.run(async { copy_context() }).unwrap();
    assert_eq!(context.get(&cvar), Some(2));
    assert_eq!(context.len(), 1);

    assert_eq!(cvar.get(), -1);
}

#[test]
fn runners_do_not_share_context() {
    let cvar = ContextVar::new("cvar", -1);

    let first = Runner::new();
    let setter = cvar.clone();
    first.run(async move { setter.set(7) }).unwrap();

    let second = Runner::new();
    let getter = cvar.clone();
    assert_eq!(second.run(async move { getter.get() }), Ok(-1));

    first.close().unwrap();
    second.close().unwrap();
}

#[test]
fn explicit_context_is_used_for_one_run() {
    let cvar = ContextVar::new("cvar", 0);
    let runner = Runner::new();

    let context = hearth::context::Context::new();
    let setter = cvar.clone();
    runner
        .run_with_context(async move { setter.set(5) }, context.clone())
        .unwrap();

    let getter = cvar.clone();
    assert_eq!(runner.run(async move { getter.get() }), Ok(0));
    assert_eq!(context.get(&cvar), Some(5));

    runner.close().unwrap();
}

#[test]
fn recursive_run() {
    let runner = Rc::new(Runner::new());
    let inner = runner.clone();

    let nested = runner.run(async move { inner.run(async {}) }).unwrap();

    assert_eq!(
        nested,
        Err(Error::Reentrancy {
            entry: "Runner::run()"
        })
    );
    assert_eq!(
        nested.unwrap_err().to_string(),
        "Runner::run() cannot be called from a running event loop"
    );

    runner.close().unwrap();
}

#[test]
fn close_from_running_work_is_refused() {
    let runner = Rc::new(Runner::new());
    let inner = runner.clone();

    let closed = runner.run(async move { inner.close() }).unwrap();

    assert_eq!(
        closed,
        Err(Error::Reentrancy {
            entry: "Runner::close()"
        })
    );
    assert_eq!(runner.run(async { 5 }), Ok(5));

    runner.close().unwrap();
}

#[test]
fn another_runner_cannot_nest() {
    let runner = Runner::new();

    let nested = runner
        .run(async { Runner::new().run(async { 1 }) })
        .unwrap();

    assert!(matches!(nested, Err(Error::Reentrancy { .. })));
    runner.close().unwrap();
}

#[test]
fn scope_closes_while_unwinding() {
    let runner = Runner::new();
    let event_loop = runner.get_loop().unwrap();

    let result: std::thread::Result<Result<(), Error>> = panic::catch_unwind(AssertUnwindSafe(|| {
        let scope = runner.enter().unwrap();
        scope.run(async { panic!("boom") })
    }));

    assert!(result.is_err());
    assert!(runner.is_closed());
    assert!(event_loop.is_closed());
}

#[test]
fn dropping_the_runner_closes_its_loop() {
    let event_loop = {
        let runner = Runner::new();
        runner.get_loop().unwrap()
    };

    assert!(event_loop.is_closed());
}
