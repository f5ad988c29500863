use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::error;
use uuid::Uuid;

use super::events::TaskEvents;
use crate::error::AppError;
use crate::models::{
    Category, NewCategoryRequest, NewTaskRequest, Priority, Task, UpdateTaskRequest,
};
use crate::repository::TaskRepository;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FormPhase {
    #[default]
    Idle,
    Submitting,
}

/// Editable values of a task form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskFields {
    #[serde(rename = "task")]
    pub label: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub category: Option<Uuid>,
}

impl TaskFields {
    pub fn from_task(task: &Task) -> Self {
        Self {
            label: task.label.clone(),
            description: task.description.clone().unwrap_or_default(),
            due_date: task.due_date,
            priority: task.priority,
            category: task.category,
        }
    }

    pub fn from_request(req: NewTaskRequest) -> Self {
        Self {
            label: req.label,
            description: req.description.unwrap_or_default(),
            due_date: req.due_date,
            priority: req.priority,
            category: req.category,
        }
    }

    /// Overwrites the fields a partial update touches.
    pub fn apply(&mut self, req: &UpdateTaskRequest) {
        if let Some(label) = &req.label {
            self.label = label.clone();
        }
        if let Some(description) = &req.description {
            self.description = description.clone().unwrap_or_default();
        }
        if let Some(due_date) = req.due_date {
            self.due_date = due_date;
        }
        if let Some(priority) = req.priority {
            self.priority = priority;
        }
        if let Some(category) = req.category {
            self.category = category;
        }
    }

    fn description(&self) -> Option<String> {
        let description = self.description.trim();
        (!description.is_empty()).then(|| description.to_string())
    }

    fn to_new(&self) -> NewTaskRequest {
        NewTaskRequest {
            label: self.label.trim().to_string(),
            description: self.description(),
            due_date: self.due_date,
            priority: self.priority,
            category: self.category,
        }
    }

    fn to_update(&self) -> UpdateTaskRequest {
        UpdateTaskRequest {
            label: Some(self.label.trim().to_string()),
            description: Some(self.description()),
            due_date: Some(self.due_date),
            priority: Some(self.priority),
            category: Some(self.category),
            is_complete: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CategoryPicker {
    #[default]
    Hidden,
    Shown {
        name: String,
    },
}

/// Create/edit form for one task, including the inline new-category form.
pub struct TaskForm {
    editing: Option<Uuid>,
    pub fields: TaskFields,
    categories: Vec<Category>,
    picker: CategoryPicker,
    phase: FormPhase,
    error: Option<String>,
}

impl TaskForm {
    pub fn create(categories: Vec<Category>) -> Self {
        Self {
            editing: None,
            fields: TaskFields::default(),
            categories,
            picker: CategoryPicker::Hidden,
            phase: FormPhase::Idle,
            error: None,
        }
    }

    pub fn edit(task: &Task, categories: Vec<Category>) -> Self {
        Self {
            editing: Some(task.id),
            fields: TaskFields::from_task(task),
            ..Self::create(categories)
        }
    }

    pub fn title(&self) -> &'static str {
        if self.editing.is_some() { "Edit Task" } else { "Add New Task" }
    }

    pub fn submit_label(&self) -> &'static str {
        match (self.phase, self.editing) {
            (FormPhase::Submitting, _) => "Saving...",
            (FormPhase::Idle, Some(_)) => "Update Task",
            (FormPhase::Idle, None) => "Add Task",
        }
    }

    pub fn phase(&self) -> FormPhase {
        self.phase
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    pub fn picker(&self) -> &CategoryPicker {
        &self.picker
    }

    pub fn can_submit(&self) -> bool {
        self.phase == FormPhase::Idle && !self.fields.label.trim().is_empty()
    }

    fn begin(&mut self) -> Result<(), AppError> {
        if self.phase == FormPhase::Submitting {
            return Err(AppError::validation("A save is already in progress"));
        }
        self.phase = FormPhase::Submitting;
        self.error = None;
        Ok(())
    }

    fn finish<T>(&mut self, result: Result<T, AppError>, action: &str) -> Result<T, AppError> {
        self.phase = FormPhase::Idle;
        result.inspect_err(|e| {
            error!("Failed to {}: {}", action, e);
            self.error = Some(e.to_string());
        })
    }

    /// Saves the task and publishes a task change on success. The error
    /// message stays on the form until the next submission.
    pub async fn submit(
        &mut self,
        repo: &TaskRepository,
        events: &TaskEvents,
    ) -> Result<Task, AppError> {
        if self.fields.label.trim().is_empty() {
            return Err(AppError::validation("Task label is required"));
        }
        self.begin()?;

        let result = match self.editing {
            Some(id) => repo.update_task(id, self.fields.to_update()).await,
            None => repo.create_task(self.fields.to_new()).await,
        };
        let task = self.finish(result, "save task")?;

        events.publish_tasks();
        Ok(task)
    }

    pub fn show_category_form(&mut self) {
        if self.picker == CategoryPicker::Hidden {
            self.picker = CategoryPicker::Shown {
                name: String::new(),
            };
        }
    }

    pub fn set_category_name(&mut self, value: &str) {
        if let CategoryPicker::Shown { name } = &mut self.picker {
            *name = value.to_string();
        }
    }

    pub fn cancel_category_form(&mut self) {
        self.picker = CategoryPicker::Hidden;
    }

    /// Creates the typed category, selects it for this task and collapses the
    /// inline form.
    pub async fn submit_category(
        &mut self,
        repo: &TaskRepository,
        events: &TaskEvents,
    ) -> Result<Category, AppError> {
        let name = match &self.picker {
            CategoryPicker::Shown { name } if !name.trim().is_empty() => name.clone(),
            CategoryPicker::Shown { .. } => {
                return Err(AppError::validation("Category name is required"));
            }
            CategoryPicker::Hidden => {
                return Err(AppError::validation("Category form is not open"));
            }
        };
        self.begin()?;

        let result = repo.create_category(NewCategoryRequest { name }).await;
        let category = self.finish(result, "add category")?;

        self.categories.push(category.clone());
        self.fields.category = Some(category.id);
        self.picker = CategoryPicker::Hidden;
        events.publish_categories();
        Ok(category)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::models::Identity;
    use crate::session::SessionStore;
    use crate::supabase::MemoryBackend;

    async fn setup() -> (Arc<MemoryBackend>, TaskRepository, TaskEvents) {
        let backend = Arc::new(MemoryBackend::new());
        let identity = Identity {
            id: Uuid::new_v4(),
            email: None,
        };
        let session = backend.sign_in(&identity).await;
        let store = Arc::new(SessionStore::signed_in(backend.clone(), session));
        (backend.clone(), TaskRepository::new(store, backend), TaskEvents::new())
    }

    #[tokio::test]
    async fn test_create_publishes_change() {
        let (_backend, repo, events) = setup().await;
        let mut form = TaskForm::create(Vec::new());
        form.fields.label = "Buy bread".to_string();
        form.fields.priority = Priority::High;

        assert_eq!(form.title(), "Add New Task");
        assert_eq!(form.submit_label(), "Add Task");
        let task = form.submit(&repo, &events).await.expect("Failed to submit");

        assert_eq!(task.priority, Priority::High);
        assert_eq!(task.description, None);
        assert_eq!(events.current().tasks, 1);
        assert_eq!(form.phase(), FormPhase::Idle);
    }

    #[tokio::test]
    async fn test_edit_prepopulates_fields() {
        let (_backend, repo, events) = setup().await;
        let task = repo
            .create_task(NewTaskRequest {
                label: "Pay rent".to_string(),
                description: Some("landlord".to_string()),
                due_date: NaiveDate::from_ymd_opt(2026, 11, 1),
                ..NewTaskRequest::default()
            })
            .await
            .expect("Failed to create task");

        let mut form = TaskForm::edit(&task, Vec::new());
        assert_eq!(form.title(), "Edit Task");
        assert_eq!(form.submit_label(), "Update Task");
        assert_eq!(form.fields.description, "landlord");
        assert_eq!(form.fields.due_date, task.due_date);

        form.fields.label = "Pay rent early".to_string();
        let saved = form.submit(&repo, &events).await.expect("Failed to update");
        assert_eq!(saved.id, task.id);
        assert_eq!(saved.label, "Pay rent early");
        assert_eq!(saved.due_date, task.due_date);
    }

    #[tokio::test]
    async fn test_failure_keeps_error_until_next_submit() {
        let (backend, repo, events) = setup().await;
        let mut form = TaskForm::create(Vec::new());
        form.fields.label = "Feed dog".to_string();

        backend.set_unavailable(true).await;
        assert!(form.submit(&repo, &events).await.is_err());
        assert!(form.error().is_some());
        assert_eq!(form.phase(), FormPhase::Idle);
        assert_eq!(events.current().tasks, 0);

        backend.set_unavailable(false).await;
        form.submit(&repo, &events).await.expect("Failed to submit");
        assert_eq!(form.error(), None);
    }

    #[tokio::test]
    async fn test_blank_label_is_refused_locally() {
        let (backend, repo, events) = setup().await;
        let mut form = TaskForm::create(Vec::new());
        form.fields.label = "  ".to_string();

        assert!(!form.can_submit());
        assert!(matches!(
            form.submit(&repo, &events).await,
            Err(AppError::Validation(_))
        ));
        assert_eq!(backend.calls().await.total(), 0);
    }

    #[tokio::test]
    async fn test_category_subform_selects_new_category() {
        let (backend, repo, events) = setup().await;
        let mut form = TaskForm::create(Vec::new());

        form.show_category_form();
        form.set_category_name("Work");
        let category = form
            .submit_category(&repo, &events)
            .await
            .expect("Failed to add category");

        assert_eq!(form.picker(), &CategoryPicker::Hidden);
        assert_eq!(form.fields.category, Some(category.id));
        assert_eq!(form.categories(), &[category]);
        assert_eq!(events.current().categories, 1);

        form.show_category_form();
        form.set_category_name("Home");
        form.cancel_category_form();
        assert_eq!(form.picker(), &CategoryPicker::Hidden);
        assert_eq!(backend.calls().await.insert, 1);
    }

    #[test]
    fn test_apply_partial_update() {
        let mut fields = TaskFields {
            label: "Pay rent".to_string(),
            description: "landlord".to_string(),
            ..TaskFields::default()
        };

        fields.apply(&UpdateTaskRequest {
            description: Some(None),
            priority: Some(Priority::Medium),
            ..UpdateTaskRequest::default()
        });

        assert_eq!(fields.label, "Pay rent");
        assert_eq!(fields.description, "");
        assert_eq!(fields.priority, Priority::Medium);
    }
}
