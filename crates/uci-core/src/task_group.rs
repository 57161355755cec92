//! A group of tasks sharing one cancellation scope.
//!
//! When any member returns an error (or panics) the scope token is cancelled,
//! so every other member observes the same signal. [`TaskGroup::wait`] returns
//! only after every member has exited, and cancels the scope on return.

use std::future::Future;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::error::UciError;
use crate::obs;

/// Outcome of a supervised task.
pub type TaskResult = std::result::Result<(), UciError>;

pub struct TaskGroup {
    tasks: JoinSet<(&'static str, TaskResult)>,
    token: CancellationToken,
}

impl TaskGroup {
    /// Create a group whose members cancel `token` on error.
    pub fn new(token: CancellationToken) -> Self {
        Self {
            tasks: JoinSet::new(),
            token,
        }
    }

    /// The scope token shared by every member.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Launch a member.
    pub fn spawn<F>(&mut self, name: &'static str, task: F)
    where
        F: Future<Output = TaskResult> + Send + 'static,
    {
        let token = self.token.clone();
        self.tasks.spawn(async move {
            obs::emit_task_started(name);
            let result = task.await;
            match &result {
                Ok(()) => obs::emit_task_finished(name),
                Err(e) => {
                    obs::emit_task_failed(name, e);
                    token.cancel();
                }
            }
            (name, result)
        });
    }

    /// Wait for every member and return the first error, if any.
    pub async fn wait(mut self) -> TaskResult {
        let mut first_error = None;
        while let Some(joined) = self.tasks.join_next().await {
            let result = match joined {
                Ok((_, result)) => result,
                Err(join_error) => {
                    self.token.cancel();
                    Err(UciError::Task {
                        name: "unknown".to_string(),
                        message: join_error.to_string(),
                    })
                }
            };
            if let Err(e) = result {
                first_error.get_or_insert(e);
            }
        }
        self.token.cancel();
        first_error.map_or(Ok(()), Err)
    }
}
