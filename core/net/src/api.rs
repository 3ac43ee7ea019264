//! Expense API surface, expressed as a trait so the sync engine and the
//! repository can run against an in-memory fake in tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use spendsync_common::{dates, Error, Expense, ExpenseDraft, Result};

use crate::client::ApiClient;
use crate::wire::{
    AuthResponse, AuthUser, ChangedExpensesResponse, CreateExpenseRequest, EmptyResponse,
    ExpenseListResponse, LoginRequest, RegisterRequest, SummarySnapshot, SyncBatch, SyncReport,
};

/// Paging and filtering options for the server-side expense list.
#[derive(Debug, Clone, Default)]
pub struct ListQuery {
    pub category: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl ListQuery {
    pub fn category(category: impl Into<String>) -> Self {
        Self {
            category: Some(category.into()),
            ..Self::default()
        }
    }
}

/// Everything the backend offers. Implemented by [`HttpApi`] for real use
/// and by [`crate::MemoryApi`] for tests.
#[async_trait]
pub trait ExpenseApi: Send + Sync {
    async fn create_expense(&self, draft: &ExpenseDraft) -> Result<Expense>;
    async fn update_expense(&self, id: &str, draft: &ExpenseDraft) -> Result<Expense>;
    async fn delete_expense(&self, id: &str) -> Result<()>;
    /// Server-side list, optionally filtered and paged.
    async fn list_expenses(&self, query: &ListQuery) -> Result<Vec<Expense>>;
    /// Aggregated totals, optionally restricted to a date range.
    async fn summary(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<SummarySnapshot>;

    async fn login(&self, email: &str, password: &str) -> Result<AuthResponse>;
    async fn register(&self, name: &str, email: &str, password: &str) -> Result<AuthResponse>;
    async fn profile(&self) -> Result<AuthUser>;

    /// Upload a batch of local changes; per-record verdicts come back in
    /// the report even when some records fail.
    async fn push_changes(&self, batch: &SyncBatch) -> Result<SyncReport>;
    /// Download records changed on the server since `since`.
    async fn pull_changes(&self, since: DateTime<Utc>) -> Result<Vec<Expense>>;

    /// Lightweight reachability probe, no auth required.
    async fn health(&self) -> Result<()>;
}

/// [`ExpenseApi`] over HTTP. Login and register store the returned token
/// so subsequent calls authenticate transparently.
pub struct HttpApi {
    client: ApiClient,
}

impl HttpApi {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    fn to_json<T: serde::Serialize>(value: &T) -> Result<serde_json::Value> {
        serde_json::to_value(value).map_err(|e| Error::DecodingFailure(e.to_string()))
    }
}

#[async_trait]
impl ExpenseApi for HttpApi {
    async fn create_expense(&self, draft: &ExpenseDraft) -> Result<Expense> {
        draft.validate()?;
        let body = Self::to_json(&CreateExpenseRequest::from(draft))?;
        self.client.post("/expenses", body).await
    }

    async fn update_expense(&self, id: &str, draft: &ExpenseDraft) -> Result<Expense> {
        draft.validate()?;
        let body = Self::to_json(&CreateExpenseRequest::from(draft))?;
        self.client.patch(&format!("/expenses/{id}"), body).await
    }

    async fn delete_expense(&self, id: &str) -> Result<()> {
        let _: EmptyResponse = self.client.delete(&format!("/expenses/{id}")).await?;
        Ok(())
    }

    async fn list_expenses(&self, query: &ListQuery) -> Result<Vec<Expense>> {
        let mut params = Vec::new();
        if let Some(category) = &query.category {
            params.push(format!("category={category}"));
        }
        if let Some(page) = query.page {
            params.push(format!("page={page}"));
        }
        if let Some(limit) = query.limit {
            params.push(format!("limit={limit}"));
        }
        let path = if params.is_empty() {
            "/expenses".to_string()
        } else {
            format!("/expenses?{}", params.join("&"))
        };
        let response: ExpenseListResponse = self.client.get(&path).await?;
        Ok(response.expenses)
    }

    async fn summary(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<SummarySnapshot> {
        let mut params = Vec::new();
        if let Some(start) = start {
            params.push(format!("startDate={}", dates::to_wire(&start)));
        }
        if let Some(end) = end {
            params.push(format!("endDate={}", dates::to_wire(&end)));
        }
        let path = if params.is_empty() {
            "/expenses/summary".to_string()
        } else {
            format!("/expenses/summary?{}", params.join("&"))
        };
        self.client.get(&path).await
    }

    async fn login(&self, email: &str, password: &str) -> Result<AuthResponse> {
        let body = Self::to_json(&LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        })?;
        let response: AuthResponse = self.client.post_public("/auth/login", body).await?;
        self.client.tokens().set(&response.token)?;
        debug!("login succeeded, token stored");
        Ok(response)
    }

    async fn register(&self, name: &str, email: &str, password: &str) -> Result<AuthResponse> {
        let body = Self::to_json(&RegisterRequest {
            name: name.to_string(),
            email: email.to_string(),
            password: password.to_string(),
        })?;
        let response: AuthResponse = self.client.post_public("/auth/register", body).await?;
        self.client.tokens().set(&response.token)?;
        Ok(response)
    }

    async fn profile(&self) -> Result<AuthUser> {
        self.client.get("/auth/profile").await
    }

    async fn push_changes(&self, batch: &SyncBatch) -> Result<SyncReport> {
        let body = Self::to_json(batch)?;
        self.client.post("/sync/expenses", body).await
    }

    async fn pull_changes(&self, since: DateTime<Utc>) -> Result<Vec<Expense>> {
        let path = format!("/sync/expenses?lastSyncTime={}", dates::to_wire(&since));
        let response: ChangedExpensesResponse = self.client.get(&path).await?;
        Ok(response.expenses)
    }

    async fn health(&self) -> Result<()> {
        let _: EmptyResponse = self.client.probe("/health").await?;
        Ok(())
    }
}
