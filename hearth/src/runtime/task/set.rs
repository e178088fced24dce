use super::Task;

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Future that resolves once every task of a group has settled.
///
/// `Gather` never fails: how each task settled is read from the tasks
/// themselves afterwards. It is the waiting half of the shutdown pass,
/// where the outcome of each task is inspected individually.
pub struct Gather {
    /// Tasks that had not settled at the last poll.
    pending: Vec<Task>,
}

impl Future for Gather {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        self.pending.retain(|task| !task.is_done());

        if self.pending.is_empty() {
            return Poll::Ready(());
        }

        for task in &self.pending {
            task.add_waiter(cx.waker());
        }

        Poll::Pending
    }
}

/// Waits for every task in `tasks` to settle.
///
/// # Examples
///
/// ```rust,ignore
/// let tasks = vec![spawn(a()).task().clone(), spawn(b()).task().clone()];
/// gather(tasks).await;
/// ```
pub fn gather(tasks: impl IntoIterator<Item = Task>) -> Gather {
    Gather {
        pending: tasks.into_iter().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::EventLoop;

    #[test]
    fn resolves_once_all_tasks_settle() {
        let event_loop = EventLoop::new();
        let a = event_loop.create_task(async { 1 });
        let b = event_loop.create_task(async {
            crate::yield_now().await.ok();
            2
        });
        let tasks = vec![a.task().clone(), b.task().clone()];

        event_loop
            .run_until_complete(gather(tasks.clone()))
            .unwrap();

        assert!(tasks.iter().all(Task::is_done));
        assert!(event_loop.close().is_ok());
    }

    #[test]
    fn empty_group_is_ready() {
        let event_loop = EventLoop::new();
        event_loop.run_until_complete(gather(Vec::new())).unwrap();
        event_loop.close().unwrap();
    }
}
