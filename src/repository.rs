use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, error};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::category::pastel_color;
use crate::models::{
    Category, Identity, NewCategoryRequest, NewTaskRequest, Task, UpdateCategoryRequest,
    UpdateTaskRequest,
};
use crate::session::SessionStore;
use crate::supabase::{Filter, Order, Table, TableStore};

#[derive(Serialize)]
struct NewTaskRow<'a> {
    user_id: Uuid,
    #[serde(flatten)]
    fields: &'a NewTaskRequest,
}

#[derive(Serialize)]
struct NewCategoryRow<'a> {
    user_id: Uuid,
    name: &'a str,
    color: String,
}

/// Task and category access for the signed-in user. Every call is a fresh
/// round trip; nothing is cached here.
#[derive(Clone)]
pub struct TaskRepository {
    session: Arc<SessionStore>,
    store: Arc<dyn TableStore>,
}

impl TaskRepository {
    pub fn new(session: Arc<SessionStore>, store: Arc<dyn TableStore>) -> Self {
        Self { session, store }
    }

    /// Filters that pin a mutation to one record of the acting user.
    fn owned(id: Uuid, identity: &Identity) -> [Filter; 2] {
        [Filter::eq("id", id), Filter::eq("user_id", identity.id)]
    }

    pub async fn list_tasks(&self) -> Result<Vec<Task>, AppError> {
        let (identity, token) = self.session.access().await?;
        debug!(user_id = %identity.id, "fetching tasks");

        let rows = self
            .store
            .select(
                &token,
                Table::Todos,
                &[Filter::eq("user_id", identity.id)],
                Some(Order::desc("created_at")),
            )
            .await
            .inspect_err(|e| error!("Failed to fetch tasks: {}", e))?;

        let tasks: Vec<Task> = decode_rows(rows)?;
        debug!(count = tasks.len(), "fetched tasks");
        Ok(tasks)
    }

    pub async fn find_task(&self, id: Uuid) -> Result<Task, AppError> {
        let (identity, token) = self.session.access().await?;

        let rows = self
            .store
            .select(&token, Table::Todos, &Self::owned(id, &identity), None)
            .await?;

        decode_rows::<Task>(rows)?
            .into_iter()
            .next()
            .ok_or(AppError::NotFound)
    }

    pub async fn create_task(&self, req: NewTaskRequest) -> Result<Task, AppError> {
        validate_label(&req.label)?;
        let (identity, token) = self.session.access().await?;
        debug!(user_id = %identity.id, "adding task");

        let row = to_row(&NewTaskRow {
            user_id: identity.id,
            fields: &req,
        })?;
        let created = self
            .store
            .insert(&token, Table::Todos, row)
            .await
            .inspect_err(|e| error!("Failed to add task: {}", e))?;

        decode_row(created)
    }

    pub async fn update_task(&self, id: Uuid, req: UpdateTaskRequest) -> Result<Task, AppError> {
        if let Some(label) = &req.label {
            validate_label(label)?;
        }
        if req.is_empty() {
            return Err(AppError::validation("Nothing to update"));
        }
        let (identity, token) = self.session.access().await?;
        debug!(user_id = %identity.id, task_id = %id, "updating task");

        let rows = self
            .store
            .update(&token, Table::Todos, &Self::owned(id, &identity), to_row(&req)?)
            .await
            .inspect_err(|e| error!("Failed to update task {}: {}", id, e))?;

        decode_rows::<Task>(rows)?
            .into_iter()
            .next()
            .ok_or(AppError::NotFound)
    }

    pub async fn delete_task(&self, id: Uuid) -> Result<(), AppError> {
        let (identity, token) = self.session.access().await?;
        debug!(user_id = %identity.id, task_id = %id, "deleting task");

        let removed = self
            .store
            .delete(&token, Table::Todos, &Self::owned(id, &identity))
            .await
            .inspect_err(|e| error!("Failed to delete task {}: {}", id, e))?;

        if removed.is_empty() {
            return Err(AppError::NotFound);
        }
        Ok(())
    }

    pub async fn list_categories(&self) -> Result<Vec<Category>, AppError> {
        let (identity, token) = self.session.access().await?;

        let rows = self
            .store
            .select(
                &token,
                Table::Categories,
                &[Filter::eq("user_id", identity.id)],
                Some(Order::asc("name")),
            )
            .await
            .inspect_err(|e| error!("Failed to fetch categories: {}", e))?;

        decode_rows(rows)
    }

    pub async fn create_category(&self, req: NewCategoryRequest) -> Result<Category, AppError> {
        let name = validate_category_name(&req.name)?;
        let (identity, token) = self.session.access().await?;
        debug!(user_id = %identity.id, name, "adding category");

        let row = to_row(&NewCategoryRow {
            user_id: identity.id,
            name,
            color: pastel_color(),
        })?;
        let created = self
            .store
            .insert(&token, Table::Categories, row)
            .await
            .inspect_err(|e| error!("Failed to add category: {}", e))?;

        decode_row(created)
    }

    pub async fn update_category(
        &self,
        id: Uuid,
        mut req: UpdateCategoryRequest,
    ) -> Result<Category, AppError> {
        if let Some(name) = &req.name {
            req.name = Some(validate_category_name(name)?.to_string());
        }
        let patch = to_row(&req)?;
        if patch.as_object().is_some_and(|fields| fields.is_empty()) {
            return Err(AppError::validation("Nothing to update"));
        }
        let (identity, token) = self.session.access().await?;

        let rows = self
            .store
            .update(&token, Table::Categories, &Self::owned(id, &identity), patch)
            .await
            .inspect_err(|e| error!("Failed to update category {}: {}", id, e))?;

        decode_rows::<Category>(rows)?
            .into_iter()
            .next()
            .ok_or(AppError::NotFound)
    }

    /// Deletes a category after detaching it from the user's tasks; tasks are kept.
    pub async fn delete_category(&self, id: Uuid) -> Result<(), AppError> {
        let (identity, token) = self.session.access().await?;
        debug!(user_id = %identity.id, category_id = %id, "deleting category");

        let detached = self
            .store
            .update(
                &token,
                Table::Todos,
                &[Filter::eq("category", id), Filter::eq("user_id", identity.id)],
                json!({ "category": null }),
            )
            .await
            .inspect_err(|e| error!("Failed to detach category {}: {}", id, e))?;
        debug!(count = detached.len(), "detached tasks from category");

        let removed = self
            .store
            .delete(&token, Table::Categories, &Self::owned(id, &identity))
            .await
            .inspect_err(|e| error!("Failed to delete category {}: {}", id, e))?;

        if removed.is_empty() {
            return Err(AppError::NotFound);
        }
        Ok(())
    }
}

fn validate_label(label: &str) -> Result<(), AppError> {
    if label.trim().is_empty() {
        return Err(AppError::validation("Task label is required"));
    }
    Ok(())
}

fn validate_category_name(name: &str) -> Result<&str, AppError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::validation("Category name is required"));
    }
    Ok(name)
}

fn to_row<T: Serialize>(value: &T) -> Result<Value, AppError> {
    serde_json::to_value(value)
        .map_err(|e| AppError::Internal(format!("Failed to encode row: {}", e)))
}

fn decode_row<T: DeserializeOwned>(row: Value) -> Result<T, AppError> {
    serde_json::from_value(row)
        .map_err(|e| AppError::TransientStore(format!("Unexpected row from store: {}", e)))
}

fn decode_rows<T: DeserializeOwned>(rows: Vec<Value>) -> Result<Vec<T>, AppError> {
    rows.into_iter().map(decode_row).collect()
}
