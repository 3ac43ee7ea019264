//! Request and response bodies for the REST API and the bulk sync endpoint.
//!
//! Dates travel as ISO-8601 strings; decoding tolerates the multi-format
//! reality of the backend via the adapters in `spendsync_common::dates`.

use serde::{Deserialize, Serialize};

use spendsync_common::{dates, Expense, ExpenseDraft};

/// Body for `POST /expenses` and `PATCH /expenses/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateExpenseRequest {
    pub title: String,
    pub amount: f64,
    pub category: String,
    pub currency: String,
    /// Sent as a string so the backend never sees a numeric date.
    pub date: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl From<&ExpenseDraft> for CreateExpenseRequest {
    fn from(draft: &ExpenseDraft) -> Self {
        Self {
            title: draft.title.clone(),
            amount: draft.amount,
            category: draft.category.clone(),
            currency: draft.currency.clone(),
            date: dates::to_wire(&draft.date),
            description: draft.description.clone(),
        }
    }
}

/// Response for `GET /expenses`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpenseListResponse {
    pub expenses: Vec<Expense>,
    #[serde(default, rename = "total_count", skip_serializing_if = "Option::is_none")]
    pub total_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

/// Responses with no interesting body (e.g. `DELETE /expenses/{id}`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmptyResponse {}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AmountSum {
    pub amount: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryBreakdown {
    pub category: String,
    #[serde(rename = "_sum")]
    pub sum: AmountSum,
    #[serde(rename = "_count")]
    pub count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonthlyTrend {
    #[serde(with = "spendsync_common::dates::flexible")]
    pub date: chrono::DateTime<chrono::Utc>,
    #[serde(rename = "_sum")]
    pub sum: AmountSum,
    #[serde(rename = "_count")]
    pub count: u32,
}

/// Response for `GET /expenses/summary`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummarySnapshot {
    pub total_amount: f64,
    pub total_count: u32,
    pub category_breakdown: Vec<CategoryBreakdown>,
    pub monthly_trend: Vec<MonthlyTrend>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub email: String,
}

/// Response for `POST /auth/login` and `POST /auth/register`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    #[serde(default)]
    pub user: Option<AuthUser>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

/// Operation kind for one record in a sync batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncOperation {
    #[serde(rename = "CREATE")]
    Create,
    #[serde(rename = "UPDATE")]
    Update,
    #[serde(rename = "DELETE")]
    Delete,
}

/// One record in the upload batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRecord {
    /// Server id; present only for records the server already knows.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub title: String,
    pub amount: f64,
    pub category: String,
    pub currency: String,
    pub date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub operation: SyncOperation,
    /// Client id echoed back so results can be correlated.
    pub local_id: String,
}

impl SyncRecord {
    /// Build the transfer record for one dirty local record.
    ///
    /// `ever_synced` decides whether the server id accompanies the record:
    /// a never-acknowledged record is a CREATE and carries no server id.
    pub fn from_expense(expense: &Expense, operation: SyncOperation, ever_synced: bool) -> Self {
        Self {
            id: ever_synced.then(|| expense.id.clone()),
            title: expense.title.clone(),
            amount: expense.amount,
            category: expense.category.clone(),
            currency: expense.currency.clone(),
            date: dates::to_wire(&expense.date),
            description: expense.description.clone(),
            operation,
            local_id: expense.id.clone(),
        }
    }
}

/// Body for `POST /sync/expenses`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncBatch {
    pub expenses: Vec<SyncRecord>,
}

/// Per-record verdict in the sync response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Expense>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncCounts {
    pub total: u32,
    pub successful: u32,
    pub failed: u32,
}

/// Response for `POST /sync/expenses`. The batch is all-or-nothing at the
/// transport level; per-record success lives in `results`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncReport {
    pub results: Vec<RecordOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<SyncCounts>,
}

/// Response for `GET /sync/expenses?lastSyncTime=...`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangedExpensesResponse {
    pub expenses: Vec<Expense>,
}
