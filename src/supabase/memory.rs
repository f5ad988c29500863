use std::cmp::Ordering;
use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{Duration, SecondsFormat, Utc};
use reqwest::Url;
use serde_json::{Map, Value, json};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{Filter, IdentityProvider, Order, Table, TableStore};
use crate::error::AppError;
use crate::models::{Identity, OAuthProvider, Session};

/// Number of table calls that reached the store, by kind.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StoreCalls {
    pub select: usize,
    pub insert: usize,
    pub update: usize,
    pub delete: usize,
}

impl StoreCalls {
    pub fn total(&self) -> usize {
        self.select + self.insert + self.update + self.delete
    }
}

struct StoredRow {
    seq: u64,
    value: Value,
}

#[derive(Default)]
struct MemoryState {
    access_tokens: HashMap<String, Identity>,
    refresh_tokens: HashMap<String, Identity>,
    codes: HashMap<String, Identity>,
    tables: HashMap<Table, Vec<StoredRow>>,
    next_seq: u64,
    calls: StoreCalls,
    unavailable: bool,
}

impl MemoryState {
    fn identity(&self, access_token: &str) -> Result<Identity, AppError> {
        self.access_tokens
            .get(access_token)
            .cloned()
            .ok_or(AppError::Unauthenticated)
    }

    fn check_available(&self) -> Result<(), AppError> {
        if self.unavailable {
            return Err(AppError::TransientStore("memory backend is offline".to_string()));
        }
        Ok(())
    }

    fn issue_session(&mut self, identity: Identity) -> Session {
        let access_token = format!("access-{}", Uuid::new_v4());
        let refresh_token = format!("refresh-{}", Uuid::new_v4());
        self.access_tokens.insert(access_token.clone(), identity.clone());
        self.refresh_tokens.insert(refresh_token.clone(), identity.clone());

        Session {
            identity,
            access_token,
            refresh_token: Some(refresh_token),
            expires_at: Some(Utc::now() + Duration::hours(1)),
        }
    }

    fn push_row(&mut self, table: Table, value: Value) {
        self.next_seq += 1;
        let seq = self.next_seq;
        self.tables.entry(table).or_default().push(StoredRow { seq, value });
    }
}

/// In-process stand-in for the managed backend. Rows are only visible to the
/// identity stored in their `user_id` column, like the hosted row-level
/// security policies.
#[derive(Default)]
pub struct MemoryBackend {
    state: Mutex<MemoryState>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issues tokens for `identity` as if it had completed an OAuth sign-in.
    pub async fn sign_in(&self, identity: &Identity) -> Session {
        self.state.lock().await.issue_session(identity.clone())
    }

    /// Issues a one-time authorization code that [`IdentityProvider::exchange_code`] accepts.
    pub async fn issue_code(&self, identity: &Identity) -> String {
        let code = Uuid::new_v4().to_string();
        self.state.lock().await.codes.insert(code.clone(), identity.clone());
        code
    }

    pub async fn calls(&self) -> StoreCalls {
        self.state.lock().await.calls
    }

    /// Makes every table call fail as a transient store error.
    pub async fn set_unavailable(&self, unavailable: bool) {
        self.state.lock().await.unavailable = unavailable;
    }

    /// Writes a row without any authorization check.
    pub async fn seed(&self, table: Table, row: Value) {
        self.state.lock().await.push_row(table, row);
    }

    /// Every row of `table` regardless of owner.
    pub async fn rows(&self, table: Table) -> Vec<Value> {
        let state = self.state.lock().await;
        state
            .tables
            .get(&table)
            .map(|rows| rows.iter().map(|row| row.value.clone()).collect())
            .unwrap_or_default()
    }
}

fn as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn owned_by(row: &Value, identity: &Identity) -> bool {
    row.get("user_id").map(as_text) == Some(identity.id.to_string())
}

fn matches(row: &Value, filters: &[Filter]) -> bool {
    filters.iter().all(|filter| match filter {
        Filter::Eq(column, expected) => row.get(*column).map(as_text).as_deref() == Some(expected.as_str()),
    })
}

fn into_object(value: Value, what: &str) -> Result<Map<String, Value>, AppError> {
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(AppError::Validation(format!("{} must be a json object", what))),
    }
}

fn fill_defaults(table: Table, row: &mut Map<String, Value>) {
    row.entry("id").or_insert_with(|| json!(Uuid::new_v4()));
    if table == Table::Todos {
        row.entry("description").or_insert(Value::Null);
        row.entry("due_date").or_insert(Value::Null);
        row.entry("priority").or_insert(json!(1));
        row.entry("category").or_insert(Value::Null);
        row.entry("is_complete").or_insert(json!(false));
        row.entry("created_at")
            .or_insert_with(|| json!(Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)));
    }
}

#[async_trait]
impl TableStore for MemoryBackend {
    async fn select(
        &self,
        access_token: &str,
        table: Table,
        filters: &[Filter],
        order: Option<Order>,
    ) -> Result<Vec<Value>, AppError> {
        let mut state = self.state.lock().await;
        state.calls.select += 1;
        state.check_available()?;
        let identity = state.identity(access_token)?;

        let mut rows: Vec<&StoredRow> = state
            .tables
            .get(&table)
            .map(|rows| {
                rows.iter()
                    .filter(|row| owned_by(&row.value, &identity) && matches(&row.value, filters))
                    .collect()
            })
            .unwrap_or_default();

        if let Some(order) = order {
            rows.sort_by(|a, b| {
                let by_column = as_text(&a.value[order.column]).cmp(&as_text(&b.value[order.column]));
                let ordering: Ordering = by_column.then(a.seq.cmp(&b.seq));
                if order.ascending { ordering } else { ordering.reverse() }
            });
        }

        Ok(rows.into_iter().map(|row| row.value.clone()).collect())
    }

    async fn insert(&self, access_token: &str, table: Table, row: Value) -> Result<Value, AppError> {
        let mut state = self.state.lock().await;
        state.calls.insert += 1;
        state.check_available()?;
        let identity = state.identity(access_token)?;

        let mut row = into_object(row, "inserted row")?;
        if row.get("user_id").map(as_text) != Some(identity.id.to_string()) {
            return Err(AppError::AuthorizationDenied);
        }
        fill_defaults(table, &mut row);

        let value = Value::Object(row);
        state.push_row(table, value.clone());
        Ok(value)
    }

    async fn update(
        &self,
        access_token: &str,
        table: Table,
        filters: &[Filter],
        patch: Value,
    ) -> Result<Vec<Value>, AppError> {
        let mut state = self.state.lock().await;
        state.calls.update += 1;
        state.check_available()?;
        let identity = state.identity(access_token)?;

        let patch = into_object(patch, "update patch")?;
        if let Some(owner) = patch.get("user_id") {
            if as_text(owner) != identity.id.to_string() {
                return Err(AppError::AuthorizationDenied);
            }
        }

        let mut updated = Vec::new();
        if let Some(rows) = state.tables.get_mut(&table) {
            for row in rows
                .iter_mut()
                .filter(|row| owned_by(&row.value, &identity) && matches(&row.value, filters))
            {
                if let Value::Object(fields) = &mut row.value {
                    for (key, value) in &patch {
                        fields.insert(key.clone(), value.clone());
                    }
                }
                updated.push(row.value.clone());
            }
        }

        Ok(updated)
    }

    async fn delete(
        &self,
        access_token: &str,
        table: Table,
        filters: &[Filter],
    ) -> Result<Vec<Value>, AppError> {
        let mut state = self.state.lock().await;
        state.calls.delete += 1;
        state.check_available()?;
        let identity = state.identity(access_token)?;

        let mut removed = Vec::new();
        if let Some(rows) = state.tables.get_mut(&table) {
            rows.retain(|row| {
                let hit = owned_by(&row.value, &identity) && matches(&row.value, filters);
                if hit {
                    removed.push(row.value.clone());
                }
                !hit
            });
        }

        Ok(removed)
    }
}

#[async_trait]
impl IdentityProvider for MemoryBackend {
    async fn resolve_session(&self, access_token: &str) -> Result<Identity, AppError> {
        self.state.lock().await.identity(access_token)
    }

    fn authorize_url(
        &self,
        provider: OAuthProvider,
        redirect_to: &str,
        code_verifier: &str,
    ) -> Result<String, AppError> {
        let url = Url::parse_with_params(
            "memory://auth/authorize",
            &[
                ("provider", provider.as_str()),
                ("redirect_to", redirect_to),
                ("code_challenge", code_verifier),
            ],
        )
        .map_err(|e| AppError::Config(format!("Invalid auth url: {}", e)))?;
        Ok(url.to_string())
    }

    async fn exchange_code(&self, code: &str, _code_verifier: &str) -> Result<Session, AppError> {
        let mut state = self.state.lock().await;
        let identity = state
            .codes
            .remove(code)
            .ok_or_else(|| AppError::Provider("unknown or used authorization code".to_string()))?;
        Ok(state.issue_session(identity))
    }

    async fn refresh(&self, refresh_token: &str) -> Result<Session, AppError> {
        let mut state = self.state.lock().await;
        let identity = state
            .refresh_tokens
            .remove(refresh_token)
            .ok_or_else(|| AppError::Provider("refresh token is not valid".to_string()))?;
        Ok(state.issue_session(identity))
    }

    async fn invalidate_session(&self, access_token: &str) -> Result<(), AppError> {
        let mut state = self.state.lock().await;
        if let Some(identity) = state.access_tokens.remove(access_token) {
            state.refresh_tokens.retain(|_, owner| *owner != identity);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> Identity {
        Identity {
            id: Uuid::new_v4(),
            email: Some("ada@example.com".to_string()),
        }
    }

    #[tokio::test]
    async fn test_rows_are_scoped_to_owner() {
        let backend = MemoryBackend::new();
        let ada = identity();
        let bob = identity();
        let ada_session = backend.sign_in(&ada).await;
        let bob_session = backend.sign_in(&bob).await;

        backend
            .insert(
                &ada_session.access_token,
                Table::Categories,
                json!({ "user_id": ada.id, "name": "Work", "color": "hsl(1, 70%, 80%)" }),
            )
            .await
            .expect("Failed to insert");

        let mine = backend
            .select(&ada_session.access_token, Table::Categories, &[], None)
            .await
            .expect("Failed to select");
        let theirs = backend
            .select(&bob_session.access_token, Table::Categories, &[], None)
            .await
            .expect("Failed to select");

        assert_eq!(mine.len(), 1);
        assert!(theirs.is_empty());
    }

    #[tokio::test]
    async fn test_insert_for_someone_else_is_denied() {
        let backend = MemoryBackend::new();
        let ada = identity();
        let session = backend.sign_in(&ada).await;

        let result = backend
            .insert(
                &session.access_token,
                Table::Todos,
                json!({ "user_id": Uuid::new_v4(), "task": "Sneaky" }),
            )
            .await;

        assert!(matches!(result, Err(AppError::AuthorizationDenied)));
    }

    #[tokio::test]
    async fn test_unknown_token_is_unauthenticated() {
        let backend = MemoryBackend::new();
        let result = backend.select("nope", Table::Todos, &[], None).await;
        assert!(matches!(result, Err(AppError::Unauthenticated)));
    }

    #[tokio::test]
    async fn test_refresh_rotates_tokens() {
        let backend = MemoryBackend::new();
        let ada = identity();
        let session = backend.sign_in(&ada).await;
        let refresh_token = session.refresh_token.clone().expect("missing refresh token");

        let renewed = backend.refresh(&refresh_token).await.expect("Failed to refresh");
        assert_eq!(renewed.identity, ada);
        assert!(backend.refresh(&refresh_token).await.is_err());
    }
}
