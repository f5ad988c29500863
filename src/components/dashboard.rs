use serde::Serialize;
use tokio::sync::watch;
use tracing::error;
use uuid::Uuid;

use super::events::{Revision, TaskEvents};
use super::list::TaskList;
use crate::error::AppError;
use crate::filter::{ListFilter, StatusFilter};
use crate::models::category::DEFAULT_CATEGORY_COLOR;
use crate::models::{Category, Identity, Task};
use crate::repository::TaskRepository;

const EMPTY_ALL: &str = "Create a new task to get started";
const EMPTY_FILTERED: &str = "Try changing your filters";

#[derive(Debug, Clone, Serialize)]
pub struct TaskRow {
    #[serde(flatten)]
    pub task: Task,
    pub priority_label: &'static str,
    pub category_name: Option<String>,
    pub category_color: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FilterView {
    pub status: StatusFilter,
    pub query: String,
    pub category: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardView {
    pub user: Identity,
    pub filter: FilterView,
    pub tasks: Vec<TaskRow>,
    pub categories: Vec<Category>,
    pub empty_message: Option<&'static str>,
    pub error: Option<String>,
}

/// Main task view: the task list, the category list and the display filter.
pub struct Dashboard {
    repo: TaskRepository,
    list: TaskList,
    changes: watch::Receiver<Revision>,
    categories: Vec<Category>,
    categories_seen: Option<u64>,
    filter: ListFilter,
}

impl Dashboard {
    pub fn mount(repo: TaskRepository, events: &TaskEvents) -> Self {
        Self {
            list: TaskList::mount(repo.clone(), events),
            changes: events.subscribe(),
            repo,
            categories: Vec::new(),
            categories_seen: None,
            filter: ListFilter::default(),
        }
    }

    pub fn unmount(&self) {
        self.list.unmount();
    }

    pub fn list_mut(&mut self) -> &mut TaskList {
        &mut self.list
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    pub fn set_filter(&mut self, filter: ListFilter) {
        self.filter = filter;
    }

    /// Brings tasks and categories up to the latest published revision.
    pub async fn load(&mut self) -> Result<(), AppError> {
        self.list.sync().await?;

        let latest = self.changes.borrow_and_update().categories;
        if self.categories_seen != Some(latest) {
            match self.repo.list_categories().await {
                Ok(categories) => {
                    self.categories = categories;
                    self.categories_seen = Some(latest);
                }
                Err(AppError::Unauthenticated) => return Err(AppError::Unauthenticated),
                Err(e) => error!("Failed to load categories: {}", e),
            }
        }
        Ok(())
    }

    fn row(&self, task: Task) -> TaskRow {
        let category = task
            .category
            .and_then(|id| self.categories.iter().find(|c| c.id == id));

        TaskRow {
            priority_label: task.priority.label(),
            category_name: category.map(|c| c.name.clone()),
            category_color: category
                .map(|c| c.color.clone())
                .unwrap_or_else(|| DEFAULT_CATEGORY_COLOR.to_string()),
            task,
        }
    }

    pub fn render(&self, user: Identity) -> DashboardView {
        let tasks: Vec<TaskRow> = self
            .filter
            .apply(self.list.tasks())
            .into_iter()
            .map(|task| self.row(task))
            .collect();

        let error = self.list.error().map(str::to_string);
        let empty_message = match (tasks.is_empty(), &error) {
            (true, None) if self.filter.status == StatusFilter::All && self.filter.category.is_none() => {
                Some(EMPTY_ALL)
            }
            (true, None) => Some(EMPTY_FILTERED),
            _ => None,
        };

        DashboardView {
            user,
            filter: FilterView {
                status: self.filter.status,
                query: self.filter.query.clone(),
                category: self.filter.category,
            },
            tasks,
            categories: self.categories.clone(),
            empty_message,
            error,
        }
    }
}
