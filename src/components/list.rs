use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::watch;
use tracing::{debug, error};
use uuid::Uuid;

use super::events::{Revision, TaskEvents};
use crate::error::AppError;
use crate::models::{Task, UpdateTaskRequest};
use crate::repository::TaskRepository;

const LOAD_FAILED: &str = "Could not load tasks. Please try refreshing the page.";

/// Cloneable view of whether a controller is still mounted. Fetch results
/// that land after unmount are dropped.
///
/// The handle can be unmounted from another task while a fetch is in flight;
/// callers that own the list behind a lock unmount through a handle taken
/// before the fetch started.
#[derive(Debug, Clone)]
pub struct MountHandle(Arc<AtomicBool>);

impl MountHandle {
    fn mounted() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    pub fn is_mounted(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub fn unmount(&self) {
        self.0.store(false, Ordering::Release);
    }
}

/// The user's tasks as last fetched, newest first.
pub struct TaskList {
    repo: TaskRepository,
    changes: watch::Receiver<Revision>,
    mount: MountHandle,
    tasks: Vec<Task>,
    seen: Option<u64>,
    error: Option<String>,
}

impl TaskList {
    pub fn mount(repo: TaskRepository, events: &TaskEvents) -> Self {
        Self {
            repo,
            changes: events.subscribe(),
            mount: MountHandle::mounted(),
            tasks: Vec::new(),
            seen: None,
            error: None,
        }
    }

    pub fn mount_handle(&self) -> MountHandle {
        self.mount.clone()
    }

    pub fn unmount(&self) {
        self.mount.unmount();
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_loaded(&self) -> bool {
        self.seen.is_some()
    }

    /// Fetches when nothing is loaded yet, the last load failed, or a newer
    /// task revision was published.
    pub async fn sync(&mut self) -> Result<(), AppError> {
        let latest = self.changes.borrow().tasks;
        if self.seen == Some(latest) && self.error.is_none() {
            return Ok(());
        }
        self.refresh().await
    }

    /// Refetches unconditionally. Load failures are kept as the list's error
    /// message; only a lost session is returned to the caller.
    pub async fn refresh(&mut self) -> Result<(), AppError> {
        let revision = self.changes.borrow_and_update().tasks;
        let result = self.repo.list_tasks().await;

        if !self.mount.is_mounted() {
            debug!("task list unmounted, dropping fetch result");
            return Ok(());
        }

        match result {
            Ok(tasks) => {
                self.tasks = tasks;
                self.error = None;
            }
            Err(AppError::Unauthenticated) => return Err(AppError::Unauthenticated),
            Err(e) => {
                error!("Failed to load tasks: {}", e);
                self.error = Some(LOAD_FAILED.to_string());
            }
        }
        self.seen = Some(revision);
        Ok(())
    }

    /// Flips completion of a listed task with a single update call. A list
    /// whose last load failed cannot tell a missing task from an outage, so
    /// that case reports the store as unavailable.
    pub async fn toggle_complete(&mut self, id: Uuid) -> Result<Task, AppError> {
        if let Some(message) = &self.error {
            return Err(AppError::TransientStore(message.clone()));
        }

        let is_complete = self
            .tasks
            .iter()
            .find(|task| task.id == id)
            .map(|task| task.is_complete)
            .ok_or(AppError::NotFound)?;

        let updated = self
            .repo
            .update_task(id, UpdateTaskRequest::completion(!is_complete))
            .await
            .inspect_err(|e| error!("Failed to update task {}: {}", id, e))?;

        if let Some(task) = self.tasks.iter_mut().find(|task| task.id == id) {
            *task = updated.clone();
        }
        Ok(updated)
    }

    /// Deletes at the store; the row leaves the list only once that succeeded.
    pub async fn delete(&mut self, id: Uuid) -> Result<(), AppError> {
        self.repo
            .delete_task(id)
            .await
            .inspect_err(|e| error!("Failed to delete task {}: {}", id, e))?;
        self.tasks.retain(|task| task.id != id);
        Ok(())
    }
}
