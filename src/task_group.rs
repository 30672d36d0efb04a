//! Fan-out / join barrier for materialization tasks

use std::future::Future;

use tokio::task::JoinSet;
use tracing::warn;

use crate::error::{ProcessError, Result};

/// A group of spawned tasks joined as one unit.
///
/// [`join`](Self::join) waits for every task, even after one fails, so no
/// task is left writing in the background when the caller moves on. The
/// outputs come back in spawn order. If any task failed, the error of the
/// earliest-spawned failing task is returned and the rest are logged.
pub struct TaskGroup<T> {
    tasks: JoinSet<(usize, Result<T>)>,
    spawned: usize,
}

impl<T: Send + 'static> TaskGroup<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            tasks: JoinSet::new(),
            spawned: 0,
        }
    }

    pub fn spawn<F>(&mut self, future: F)
    where
        F: Future<Output = Result<T>> + Send + 'static,
    {
        let slot = self.spawned;
        self.spawned += 1;
        self.tasks.spawn(async move { (slot, future.await) });
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.spawned
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.spawned == 0
    }

    /// Wait for all tasks and collect their outputs in spawn order.
    pub async fn join(mut self) -> Result<Vec<T>> {
        let mut outputs: Vec<Option<T>> = (0..self.spawned).map(|_| None).collect();
        let mut errors: Vec<(usize, ProcessError)> = Vec::new();

        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok((slot, Ok(value))) => outputs[slot] = Some(value),
                Ok((slot, Err(err))) => errors.push((slot, err)),
                Err(join_err) => {
                    errors.push((usize::MAX, ProcessError::Task(join_err.to_string())));
                }
            }
        }

        if errors.is_empty() {
            return outputs
                .into_iter()
                .map(|o| o.ok_or_else(|| ProcessError::Task("task produced no output".into())))
                .collect();
        }

        errors.sort_by_key(|(slot, _)| *slot);
        let mut errors = errors.into_iter();
        let Some((_, first)) = errors.next() else {
            return Err(ProcessError::Task("task group failed".into()));
        };
        for (slot, err) in errors {
            warn!(slot, error = %err, "Additional task failure");
        }
        Err(first)
    }
}

impl<T: Send + 'static> Default for TaskGroup<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_join_preserves_spawn_order() {
        let mut group = TaskGroup::new();
        for i in 0..5u64 {
            group.spawn(async move {
                tokio::time::sleep(Duration::from_millis(10 * (5 - i))).await;
                Ok(i)
            });
        }
        assert_eq!(group.join().await.unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_join_waits_for_all_and_returns_first_error() {
        let finished = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let mut group = TaskGroup::new();

        for i in 0..4usize {
            let finished = finished.clone();
            group.spawn(async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                finished.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                if i == 1 || i == 3 {
                    Err(ProcessError::Parse(format!("task {i}")))
                } else {
                    Ok(i)
                }
            });
        }

        let err = group.join().await.unwrap_err();
        assert_eq!(err.to_string(), "Failed to parse message: task 1");
        assert_eq!(finished.load(std::sync::atomic::Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_empty_group() {
        let group: TaskGroup<()> = TaskGroup::new();
        assert!(group.is_empty());
        assert!(group.join().await.unwrap().is_empty());
    }
}
