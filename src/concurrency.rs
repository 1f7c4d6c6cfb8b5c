use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::future::join_all;
use futures::FutureExt;
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{mpsc, Semaphore};
use tracing::warn;

/// How a bounded batch of tasks is scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Batching {
    /// `ceil(n / limit)` sequential waves; each wave is joined before the next starts.
    Waves,
    /// Semaphore-bounded spawned tasks feeding a channel; a slow task only
    /// holds its own permit.
    Pool,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TaskError {
    #[error("task panicked: {0}")]
    Panicked(String),
    #[error("task skipped after an earlier failure")]
    Skipped,
}

pub type TaskResult<O> = Result<O, TaskError>;

#[derive(Debug, Clone, Copy)]
pub struct Bounded {
    pub limit: usize,
    pub batching: Batching,
    /// Stop starting new tasks once one has failed.
    pub halt_on_failure: bool,
}

impl Bounded {
    pub fn new(limit: usize, batching: Batching) -> Self {
        Bounded {
            limit: limit.max(1),
            batching,
            halt_on_failure: false,
        }
    }

    pub fn halting(mut self) -> Self {
        self.halt_on_failure = true;
        self
    }

    /// Run `task` over every item with at most `limit` in flight.
    /// Results come back in input order; a panicking task becomes
    /// `TaskError::Panicked` and never takes the batch down.
    pub async fn run<T, O, F, Fut>(&self, items: Vec<T>, task: F) -> Vec<TaskResult<O>>
    where
        T: Send + 'static,
        O: Send + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = O> + Send + 'static,
    {
        match self.batching {
            Batching::Waves => self.run_waves(items, task).await,
            Batching::Pool => self.run_pool(items, task).await,
        }
    }

    async fn run_waves<T, O, F, Fut>(&self, items: Vec<T>, task: F) -> Vec<TaskResult<O>>
    where
        F: Fn(T) -> Fut,
        Fut: Future<Output = O>,
    {
        let total = items.len();
        let mut results = Vec::with_capacity(total);
        let mut items = items.into_iter();
        let mut halted = false;

        while results.len() < total {
            let wave: Vec<T> = items.by_ref().take(self.limit).collect();
            if halted {
                results.extend(wave.into_iter().map(|_| Err(TaskError::Skipped)));
                continue;
            }
            let outputs = join_all(
                wave.into_iter()
                    .map(|item| AssertUnwindSafe(task(item)).catch_unwind()),
            )
            .await;
            for out in outputs {
                let res = out.map_err(|p| TaskError::Panicked(panic_message(p)));
                if res.is_err() && self.halt_on_failure {
                    halted = true;
                }
                results.push(res);
            }
        }
        results
    }

    async fn run_pool<T, O, F, Fut>(&self, items: Vec<T>, task: F) -> Vec<TaskResult<O>>
    where
        T: Send + 'static,
        O: Send + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = O> + Send + 'static,
    {
        let total = items.len();
        let task = Arc::new(task);
        let semaphore = Arc::new(Semaphore::new(self.limit));
        let (tx, mut rx) = mpsc::channel::<(usize, TaskResult<O>)>(self.limit * 2);

        for (idx, item) in items.into_iter().enumerate() {
            let task = Arc::clone(&task);
            let sem = Arc::clone(&semaphore);
            let tx = tx.clone();
            tokio::spawn(async move {
                // A closed semaphore means an earlier task failed and we are halting.
                let res = match sem.acquire().await {
                    Ok(_permit) => AssertUnwindSafe(task(item))
                        .catch_unwind()
                        .await
                        .map_err(|p| TaskError::Panicked(panic_message(p))),
                    Err(_) => Err(TaskError::Skipped),
                };
                let _ = tx.send((idx, res)).await;
            });
        }
        drop(tx);

        let mut slots: Vec<Option<TaskResult<O>>> = (0..total).map(|_| None).collect();
        while let Some((idx, res)) = rx.recv().await {
            if matches!(res, Err(TaskError::Panicked(_))) && self.halt_on_failure {
                semaphore.close();
            }
            slots[idx] = Some(res);
        }

        slots
            .into_iter()
            .map(|slot| {
                slot.unwrap_or_else(|| {
                    warn!("Bounded task finished without reporting a result");
                    Err(TaskError::Panicked("no result reported".into()))
                })
            })
            .collect()
    }
}

/// Progress bar for a per-record phase. Hidden automatically when stderr
/// is not a terminal.
pub fn progress_bar(total: usize) -> ProgressBar {
    let pb = ProgressBar::new(total as u64);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")
    {
        pb.set_style(style.progress_chars("=> "));
    }
    pb
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
