use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, RequestBuilder, StatusCode, Url};
use serde::Serialize;
use serde_json::Value;

use super::dto;
use super::{Filter, IdentityProvider, Order, SupabaseConfig, Table, TableStore};
use crate::error::AppError;
use crate::models::{Identity, OAuthProvider, Session};

const REST_PATH: &str = "/rest/v1";
const AUTH_PATH: &str = "/auth/v1";

/// Talks to the managed backend: PostgREST for tables, GoTrue for auth.
pub struct SupabaseHttpClient {
    client: Client,
    config: SupabaseConfig,
}

impl SupabaseHttpClient {
    pub fn new(config: SupabaseConfig) -> Result<Self, AppError> {
        let client = Client::builder()
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build http client: {}", e)))?;
        Ok(Self { client, config })
    }

    fn table_url(
        &self,
        table: Table,
        filters: &[Filter],
        order: Option<Order>,
    ) -> Result<Url, AppError> {
        let mut params = vec![("select".to_string(), "*".to_string())];
        params.extend(
            filters
                .iter()
                .map(|filter| (filter.column().to_string(), filter.operand())),
        );
        if let Some(order) = order {
            params.push(("order".to_string(), order.operand()));
        }

        let base = format!("{}{}/{}", self.config.url, REST_PATH, table);
        Url::parse_with_params(&base, &params)
            .map_err(|e| AppError::Config(format!("Invalid store url {}: {}", base, e)))
    }

    fn auth_url(&self, path: &str) -> String {
        format!("{}{}{}", self.config.url, AUTH_PATH, path)
    }

    fn with_token(&self, request: RequestBuilder, access_token: &str) -> RequestBuilder {
        request
            .header("apikey", &self.config.anon_key)
            .header("Authorization", format!("Bearer {}", access_token))
    }

    async fn send_rows(&self, table: Table, request: RequestBuilder) -> Result<Vec<Value>, AppError> {
        let response = request
            .header("Prefer", "return=representation")
            .send()
            .await
            .map_err(|e| AppError::TransientStore(format!("{} request failed: {}", table, e)))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if !status.is_success() {
            tracing::warn!("store rejected {} request: {} {}", table, status, body);
            return Err(store_error(status, &body));
        }

        serde_json::from_str::<Vec<Value>>(&body).map_err(|e| {
            tracing::error!("Failed to parse {} response: {}", table, e);
            AppError::TransientStore(format!("Failed to parse {} response: {}", table, e))
        })
    }

    async fn token_grant<T: Serialize + Sync>(
        &self,
        grant_type: &str,
        body: &T,
    ) -> Result<Session, AppError> {
        let url = Url::parse_with_params(&self.auth_url("/token"), &[("grant_type", grant_type)])
            .map_err(|e| AppError::Config(format!("Invalid auth url: {}", e)))?;

        let response = self
            .client
            .post(url)
            .header("apikey", &self.config.anon_key)
            .json(body)
            .send()
            .await
            .map_err(|e| AppError::Provider(format!("{} grant failed: {}", grant_type, e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Provider(format!("{} grant rejected {}: {}", grant_type, status, body)));
        }

        let token = response
            .json::<dto::TokenResponse>()
            .await
            .map_err(|e| AppError::Provider(format!("Failed to parse token response: {}", e)))?;

        Ok(token.into_session(Utc::now()))
    }
}

/// Maps a failed REST response onto the application's error taxonomy.
pub(crate) fn store_error(status: StatusCode, body: &str) -> AppError {
    let detail: dto::PostgrestError = serde_json::from_str(body).unwrap_or_default();
    tracing::debug!(
        code = ?detail.code,
        details = ?detail.details,
        hint = ?detail.hint,
        "store error detail"
    );
    let message = detail.message.unwrap_or_else(|| body.to_string());

    match status {
        StatusCode::UNAUTHORIZED => AppError::Unauthenticated,
        StatusCode::FORBIDDEN => AppError::AuthorizationDenied,
        StatusCode::NOT_FOUND | StatusCode::NOT_ACCEPTABLE => AppError::NotFound,
        StatusCode::BAD_REQUEST | StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY => {
            AppError::Validation(message)
        }
        _ => AppError::TransientStore(format!("{} {}", status, message)),
    }
}

#[async_trait]
impl TableStore for SupabaseHttpClient {
    async fn select(
        &self,
        access_token: &str,
        table: Table,
        filters: &[Filter],
        order: Option<Order>,
    ) -> Result<Vec<Value>, AppError> {
        let url = self.table_url(table, filters, order)?;
        let request = self.with_token(self.client.get(url), access_token);
        self.send_rows(table, request).await
    }

    async fn insert(&self, access_token: &str, table: Table, row: Value) -> Result<Value, AppError> {
        let url = self.table_url(table, &[], None)?;
        let request = self.with_token(self.client.post(url), access_token).json(&row);

        self.send_rows(table, request)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| AppError::TransientStore(format!("insert into {} returned no row", table)))
    }

    async fn update(
        &self,
        access_token: &str,
        table: Table,
        filters: &[Filter],
        patch: Value,
    ) -> Result<Vec<Value>, AppError> {
        let url = self.table_url(table, filters, None)?;
        let request = self.with_token(self.client.patch(url), access_token).json(&patch);
        self.send_rows(table, request).await
    }

    async fn delete(
        &self,
        access_token: &str,
        table: Table,
        filters: &[Filter],
    ) -> Result<Vec<Value>, AppError> {
        let url = self.table_url(table, filters, None)?;
        let request = self.with_token(self.client.delete(url), access_token);
        self.send_rows(table, request).await
    }
}

#[async_trait]
impl IdentityProvider for SupabaseHttpClient {
    async fn resolve_session(&self, access_token: &str) -> Result<Identity, AppError> {
        let response = self
            .with_token(self.client.get(self.auth_url("/user")), access_token)
            .send()
            .await
            .map_err(|e| AppError::Provider(format!("user lookup failed: {}", e)))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(AppError::Unauthenticated);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Provider(format!("user lookup rejected {}: {}", status, body)));
        }

        let user = response
            .json::<dto::UserResponse>()
            .await
            .map_err(|e| AppError::Provider(format!("Failed to parse user response: {}", e)))?;
        Ok(user.into())
    }

    fn authorize_url(
        &self,
        provider: OAuthProvider,
        redirect_to: &str,
        code_verifier: &str,
    ) -> Result<String, AppError> {
        let url = Url::parse_with_params(
            &self.auth_url("/authorize"),
            &[
                ("provider", provider.as_str()),
                ("redirect_to", redirect_to),
                ("code_challenge", code_verifier),
                ("code_challenge_method", "plain"),
            ],
        )
        .map_err(|e| AppError::Config(format!("Invalid auth url: {}", e)))?;
        Ok(url.to_string())
    }

    async fn exchange_code(&self, code: &str, code_verifier: &str) -> Result<Session, AppError> {
        let body = dto::PkceGrantRequest {
            auth_code: code,
            code_verifier,
        };
        self.token_grant("pkce", &body).await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<Session, AppError> {
        let body = dto::RefreshGrantRequest { refresh_token };
        self.token_grant("refresh_token", &body).await
    }

    async fn invalidate_session(&self, access_token: &str) -> Result<(), AppError> {
        let response = self
            .with_token(self.client.post(self.auth_url("/logout")), access_token)
            .send()
            .await
            .map_err(|e| AppError::Provider(format!("logout failed: {}", e)))?;

        let status = response.status();
        // An already expired token means there is nothing left to invalidate.
        if status.is_success() || status == StatusCode::UNAUTHORIZED {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(AppError::Provider(format!("logout rejected {}: {}", status, body)))
    }
}
