mod client;

use std::sync::Arc;

use axum::extract::{Extension, OriginalUri, Path, Query, State};
use axum::http::StatusCode;
use axum::middleware::{from_fn, from_fn_with_state};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::components::{DashboardView, TaskFields, TaskForm};
use crate::error::AppError;
use crate::filter::ListFilter;
use crate::guard::route_guard_middleware;
use crate::models::*;
use crate::session::{DASHBOARD_ROUTE, ENTRY_ROUTE, SessionChange};
use crate::state::{AppState, ClientSession};

pub use client::{REFRESH_COOKIE, SESSION_COOKIE, client_session_middleware};

type Client = Extension<Arc<ClientSession>>;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(entry))
        .route("/auth/sign-in", get(sign_in))
        .route("/auth/callback", get(auth_callback))
        .route("/auth/sign-out", post(sign_out))
        .route("/dashboard", get(dashboard))
        .route("/api/tasks", get(list_tasks).post(create_task))
        .route("/api/tasks/{id}", patch(update_task).delete(delete_task))
        .route("/api/tasks/{id}/toggle", post(toggle_task))
        .route("/api/categories", get(list_categories).post(create_category))
        .route(
            "/api/categories/{id}",
            patch(update_category).delete(delete_category),
        )
        .layer(
            ServiceBuilder::new()
                .layer(from_fn_with_state(state.clone(), client_session_middleware))
                .layer(from_fn(route_guard_middleware)),
        )
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> StatusCode {
    StatusCode::OK
}

#[derive(Serialize)]
struct EntryView {
    signed_in: bool,
    sign_in_url: &'static str,
}

async fn entry(Extension(client): Client) -> Response {
    if client.session.current_identity().is_some() {
        return Redirect::to(DASHBOARD_ROUTE).into_response();
    }
    Json(EntryView {
        signed_in: false,
        sign_in_url: "/auth/sign-in?provider=google",
    })
    .into_response()
}

#[derive(Deserialize)]
struct SignInParams {
    #[serde(default)]
    provider: Option<String>,
}

async fn sign_in(
    State(state): State<AppState>,
    Extension(client): Client,
    Query(params): Query<SignInParams>,
) -> Result<Redirect, AppError> {
    let provider = match params.provider.as_deref() {
        Some(name) => name.parse()?,
        None => OAuthProvider::default(),
    };
    let url = client
        .session
        .sign_in_with_provider(provider, &state.config.callback_url())
        .await?;
    Ok(Redirect::to(&url))
}

#[derive(Deserialize)]
struct CallbackParams {
    code: Option<String>,
    error_description: Option<String>,
}

async fn auth_callback(
    Extension(client): Client,
    OriginalUri(uri): OriginalUri,
    Query(params): Query<CallbackParams>,
) -> Result<Redirect, AppError> {
    if let Some(reason) = params.error_description {
        return Err(AppError::Provider(reason));
    }
    let code = params
        .code
        .ok_or_else(|| AppError::validation("Missing authorization code"))?;

    client.session.complete_sign_in(&code).await?;
    let to = SessionChange::SignedIn
        .navigation(uri.path())
        .unwrap_or(DASHBOARD_ROUTE);
    Ok(Redirect::to(to))
}

async fn sign_out(Extension(client): Client, OriginalUri(uri): OriginalUri) -> Redirect {
    let change = client.session.sign_out().await;
    client.reset_dashboard().await;
    let to = change
        .and_then(|change| change.navigation(uri.path()))
        .unwrap_or(ENTRY_ROUTE);
    Redirect::to(to)
}

#[derive(Deserialize)]
struct DashboardParams {
    status: Option<String>,
    q: Option<String>,
    category: Option<Uuid>,
}

async fn dashboard(
    Extension(client): Client,
    Query(params): Query<DashboardParams>,
) -> Result<Json<DashboardView>, AppError> {
    let mut filter = match params.status.as_deref() {
        Some(select) => ListFilter::from_select(select)?,
        None => ListFilter::default(),
    };
    if let Some(query) = params.q {
        filter.query = query;
    }
    if params.category.is_some() {
        filter.category = params.category;
    }

    let mut dashboard = client.dashboard().await;
    dashboard.set_filter(filter);
    dashboard.load().await?;

    let user = client
        .session
        .current_identity()
        .ok_or(AppError::Unauthenticated)?;
    Ok(Json(dashboard.render(user)))
}

async fn list_tasks(Extension(client): Client) -> Result<Json<Vec<Task>>, AppError> {
    let tasks = client.repo.list_tasks().await?;
    Ok(Json(tasks))
}

async fn create_task(
    Extension(client): Client,
    Json(req): Json<NewTaskRequest>,
) -> Result<(StatusCode, Json<Task>), AppError> {
    let mut form = TaskForm::create(Vec::new());
    form.fields = TaskFields::from_request(req);
    let task = form.submit(&client.repo, &client.events).await?;
    Ok((StatusCode::CREATED, Json(task)))
}

async fn update_task(
    Extension(client): Client,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateTaskRequest>,
) -> Result<Json<Task>, AppError> {
    if req.is_complete.is_some() {
        return Err(AppError::validation(
            "Use the toggle endpoint to change completion",
        ));
    }
    let task = client.repo.find_task(id).await?;

    let mut form = TaskForm::edit(&task, Vec::new());
    form.fields.apply(&req);
    let task = form.submit(&client.repo, &client.events).await?;
    Ok(Json(task))
}

async fn delete_task(
    Extension(client): Client,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    client.dashboard().await.list_mut().delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn toggle_task(
    Extension(client): Client,
    Path(id): Path<Uuid>,
) -> Result<Json<Task>, AppError> {
    let mut dashboard = client.dashboard().await;
    let list = dashboard.list_mut();
    list.sync().await?;
    let task = list.toggle_complete(id).await?;
    Ok(Json(task))
}

async fn list_categories(Extension(client): Client) -> Result<Json<Vec<Category>>, AppError> {
    let categories = client.repo.list_categories().await?;
    Ok(Json(categories))
}

async fn create_category(
    Extension(client): Client,
    Json(req): Json<NewCategoryRequest>,
) -> Result<(StatusCode, Json<Category>), AppError> {
    let mut form = TaskForm::create(Vec::new());
    form.show_category_form();
    form.set_category_name(&req.name);
    let category = form.submit_category(&client.repo, &client.events).await?;
    Ok((StatusCode::CREATED, Json(category)))
}

async fn update_category(
    Extension(client): Client,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateCategoryRequest>,
) -> Result<Json<Category>, AppError> {
    let category = client.repo.update_category(id, req).await?;
    client.events.publish_categories();
    Ok(Json(category))
}

async fn delete_category(
    Extension(client): Client,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    client.repo.delete_category(id).await?;
    client.events.publish_categories();
    client.events.publish_tasks();
    Ok(StatusCode::NO_CONTENT)
}
