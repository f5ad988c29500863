pub mod dto;
mod http;
mod memory;

use std::env;
use std::fmt;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::AppError;
use crate::models::{Identity, OAuthProvider, Session};

pub use http::SupabaseHttpClient;
pub use memory::{MemoryBackend, StoreCalls};

#[derive(Clone, Debug)]
pub struct SupabaseConfig {
    pub url: String,
    pub anon_key: String,
}

impl SupabaseConfig {
    pub fn new_from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let url = lookup("SUPABASE_URL")
            .ok_or_else(|| AppError::Config("SUPABASE_URL is not set".to_string()))?;
        let anon_key = lookup("SUPABASE_ANON_KEY")
            .ok_or_else(|| AppError::Config("SUPABASE_ANON_KEY is not set".to_string()))?;

        Ok(Self {
            url: url.trim_end_matches('/').to_string(),
            anon_key,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Todos,
    Categories,
}

impl Table {
    pub fn as_str(self) -> &'static str {
        match self {
            Table::Todos => "todos",
            Table::Categories => "categories",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Row predicate understood by the table store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    Eq(&'static str, String),
}

impl Filter {
    pub fn eq(column: &'static str, value: impl ToString) -> Self {
        Filter::Eq(column, value.to_string())
    }

    pub fn column(&self) -> &'static str {
        match self {
            Filter::Eq(column, _) => column,
        }
    }

    /// Query-string operand in PostgREST syntax.
    pub fn operand(&self) -> String {
        match self {
            Filter::Eq(_, value) => format!("eq.{}", value),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Order {
    pub column: &'static str,
    pub ascending: bool,
}

impl Order {
    pub fn asc(column: &'static str) -> Self {
        Self { column, ascending: true }
    }

    pub fn desc(column: &'static str) -> Self {
        Self { column, ascending: false }
    }

    pub fn operand(&self) -> String {
        format!("{}.{}", self.column, if self.ascending { "asc" } else { "desc" })
    }
}

/// Scoped-table access to the managed store. Every call carries the caller's
/// access token; the store authorizes rows by their `user_id` column.
#[async_trait]
pub trait TableStore: Send + Sync {
    async fn select(
        &self,
        access_token: &str,
        table: Table,
        filters: &[Filter],
        order: Option<Order>,
    ) -> Result<Vec<Value>, AppError>;

    async fn insert(&self, access_token: &str, table: Table, row: Value) -> Result<Value, AppError>;

    async fn update(
        &self,
        access_token: &str,
        table: Table,
        filters: &[Filter],
        patch: Value,
    ) -> Result<Vec<Value>, AppError>;

    async fn delete(
        &self,
        access_token: &str,
        table: Table,
        filters: &[Filter],
    ) -> Result<Vec<Value>, AppError>;
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn resolve_session(&self, access_token: &str) -> Result<Identity, AppError>;

    /// Where to send the browser to start an OAuth sign-in.
    fn authorize_url(
        &self,
        provider: OAuthProvider,
        redirect_to: &str,
        code_verifier: &str,
    ) -> Result<String, AppError>;

    async fn exchange_code(&self, code: &str, code_verifier: &str) -> Result<Session, AppError>;

    async fn refresh(&self, refresh_token: &str) -> Result<Session, AppError>;

    async fn invalidate_session(&self, access_token: &str) -> Result<(), AppError>;
}
