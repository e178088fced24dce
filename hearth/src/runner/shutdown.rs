//! Reconciliation of a loop's leftovers before it is closed.
//!
//! Runs in two strictly ordered steps: every pending task is cancelled and
//! awaited, then every live asynchronous generator is closed. Failures of
//! either step are reported through the loop's exception handler and never
//! returned.

use crate::error::Error;
use crate::runtime::task::gather;
use crate::runtime::{EventLoop, ExceptionRecord};

use tracing::debug;

/// Cancels leftover tasks, then closes live asynchronous generators.
///
/// The errors returned are those of driving the loop itself, e.g. when the
/// loop was closed behind the runner's back.
pub(crate) fn reconcile(event_loop: &EventLoop, entry: &str) -> Result<(), Error> {
    cancel_all_tasks(event_loop, entry)?;
    event_loop.run_until_complete(event_loop.shutdown_async_generators())
}

/// Cancels every pending task of `event_loop` and waits for all of them.
///
/// Tasks that settle as cancelled are expected; every task that panicked
/// instead is reported once, with the task and its failure attached.
pub(crate) fn cancel_all_tasks(event_loop: &EventLoop, entry: &str) -> Result<(), Error> {
    let to_cancel = event_loop.all_tasks();
    if to_cancel.is_empty() {
        return Ok(());
    }

    debug!(count = to_cancel.len(), entry, "cancelling leftover tasks");

    for task in &to_cancel {
        task.cancel();
    }

    event_loop.run_until_complete(gather(to_cancel.clone()))?;

    for task in &to_cancel {
        if task.is_cancelled() {
            continue;
        }

        if let Some(fault) = task.fault() {
            let record = ExceptionRecord::new(format!(
                "{entry} is shutting down and {} task(s) were not finished yet; cancelling it",
                to_cancel.len()
            ))
            .with_task(task.clone())
            .with_exception(fault);

            event_loop.call_exception_handler(&record);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Fault;
    use crate::time::sleep;

    use std::cell::RefCell;
    use std::rc::Rc;
    use std::time::Duration;

    fn collect_records(event_loop: &EventLoop) -> Rc<RefCell<Vec<ExceptionRecord>>> {
        let records = Rc::new(RefCell::new(Vec::new()));
        let sink = records.clone();
        event_loop.set_exception_handler(move |_, record| sink.borrow_mut().push(record.clone()));
        records
    }

    #[test]
    fn nothing_to_cancel() {
        let event_loop = EventLoop::new();
        cancel_all_tasks(&event_loop, "test").unwrap();
        event_loop.close().unwrap();
    }

    #[test]
    fn plainly_cancelled_tasks_are_not_reported() {
        let event_loop = EventLoop::new();
        let records = collect_records(&event_loop);
        let leftover = event_loop.create_task(async {
            sleep(Duration::from_secs(3600)).await?;
            Ok::<_, crate::Cancelled>(())
        });

        event_loop.run_until_complete(async {}).unwrap();
        cancel_all_tasks(&event_loop, "test").unwrap();

        assert!(leftover.task().is_cancelled());
        assert!(records.borrow().is_empty());
        event_loop.close().unwrap();
    }

    #[test]
    fn panicking_leftover_is_reported_once() {
        let event_loop = EventLoop::new();
        let records = collect_records(&event_loop);
        let leftover = event_loop.create_task(async {
            if sleep(Duration::from_secs(3600)).await.is_err() {
                panic!("cleanup failed");
            }
        });

        event_loop.run_until_complete(async {}).unwrap();
        cancel_all_tasks(&event_loop, "test").unwrap();
        event_loop.close().unwrap();
        drop(leftover);

        let records = records.borrow();
        assert_eq!(records.len(), 1);
        assert!(records[0].message.starts_with("test is shutting down"));
        assert_eq!(
            records[0].exception,
            Some(Fault::Panicked("cleanup failed".into()))
        );
        assert!(records[0].task.is_some());
    }
}
