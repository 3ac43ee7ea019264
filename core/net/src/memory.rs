//! In-memory [`ExpenseApi`] used by sync engine and repository tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use spendsync_common::{Error, Expense, ExpenseDraft, Result};

use crate::api::{ExpenseApi, ListQuery};
use crate::wire::{
    AuthResponse, AuthUser, RecordOutcome, SummarySnapshot, SyncBatch, SyncCounts, SyncOperation,
    SyncReport,
};

#[derive(Debug, Clone)]
struct ServerRecord {
    expense: Expense,
    updated_at: DateTime<Utc>,
}

/// Fake backend with failure injection.
///
/// Records live in a map keyed by server id; pushes assign fresh server
/// ids to CREATEs. `reject` marks local ids whose push outcome should
/// fail, which exercises partial-batch handling. `fail_push`/`fail_pull`
/// make whole calls return a 500. `latency` slows calls down so
/// concurrency tests can observe overlap.
pub struct MemoryApi {
    records: Mutex<HashMap<String, ServerRecord>>,
    reject: Mutex<HashSet<String>>,
    fail_push: AtomicBool,
    fail_pull: AtomicBool,
    fail_requests: AtomicBool,
    latency: Mutex<Option<Duration>>,
    next_id: AtomicUsize,
    push_calls: AtomicUsize,
    pull_calls: AtomicUsize,
    list_calls: AtomicUsize,
}

impl MemoryApi {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            reject: Mutex::new(HashSet::new()),
            fail_push: AtomicBool::new(false),
            fail_pull: AtomicBool::new(false),
            fail_requests: AtomicBool::new(false),
            latency: Mutex::new(None),
            next_id: AtomicUsize::new(1),
            push_calls: AtomicUsize::new(0),
            pull_calls: AtomicUsize::new(0),
            list_calls: AtomicUsize::new(0),
        }
    }

    /// Make `push_changes` report failure for this local id.
    pub fn reject_local_id(&self, local_id: &str) {
        self.reject.lock().unwrap().insert(local_id.to_string());
    }

    pub fn set_fail_push(&self, fail: bool) {
        self.fail_push.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_pull(&self, fail: bool) {
        self.fail_pull.store(fail, Ordering::SeqCst);
    }

    /// Make every CRUD endpoint return a 500.
    pub fn set_fail_requests(&self, fail: bool) {
        self.fail_requests.store(fail, Ordering::SeqCst);
    }

    fn check_requests(&self) -> Result<()> {
        if self.fail_requests.load(Ordering::SeqCst) {
            return Err(Error::ServerError(500));
        }
        Ok(())
    }

    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap() = Some(latency);
    }

    pub fn push_calls(&self) -> usize {
        self.push_calls.load(Ordering::SeqCst)
    }

    pub fn pull_calls(&self) -> usize {
        self.pull_calls.load(Ordering::SeqCst)
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    /// Seed a record as if it had been created on the server at `when`.
    pub fn seed(&self, expense: Expense, when: DateTime<Utc>) {
        self.records.lock().unwrap().insert(
            expense.id.clone(),
            ServerRecord {
                expense,
                updated_at: when,
            },
        );
    }

    pub fn record(&self, id: &str) -> Option<Expense> {
        self.records
            .lock()
            .unwrap()
            .get(id)
            .map(|r| r.expense.clone())
    }

    pub fn record_count(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    fn fresh_id(&self) -> String {
        format!("srv-{}", self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    async fn simulate_latency(&self) {
        let latency = *self.latency.lock().unwrap();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn store(&self, draft: &ExpenseDraft, id: String, now: DateTime<Utc>) -> Expense {
        let expense = Expense {
            id: id.clone(),
            title: draft.title.clone(),
            amount: draft.amount,
            category: draft.category.clone(),
            currency: draft.currency.clone(),
            date: draft.date,
            description: draft.description.clone(),
            synced_at: Some(now),
        };
        self.records.lock().unwrap().insert(
            id,
            ServerRecord {
                expense: expense.clone(),
                updated_at: now,
            },
        );
        expense
    }
}

impl Default for MemoryApi {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExpenseApi for MemoryApi {
    async fn create_expense(&self, draft: &ExpenseDraft) -> Result<Expense> {
        self.simulate_latency().await;
        self.check_requests()?;
        draft.validate()?;
        Ok(self.store(draft, self.fresh_id(), Utc::now()))
    }

    async fn update_expense(&self, id: &str, draft: &ExpenseDraft) -> Result<Expense> {
        self.simulate_latency().await;
        self.check_requests()?;
        draft.validate()?;
        if !self.records.lock().unwrap().contains_key(id) {
            return Err(Error::InvalidRequest(format!("no such expense: {id}")));
        }
        Ok(self.store(draft, id.to_string(), Utc::now()))
    }

    async fn delete_expense(&self, id: &str) -> Result<()> {
        self.simulate_latency().await;
        self.check_requests()?;
        self.records.lock().unwrap().remove(id);
        Ok(())
    }

    async fn list_expenses(&self, query: &ListQuery) -> Result<Vec<Expense>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;
        self.check_requests()?;

        let records = self.records.lock().unwrap();
        let mut expenses: Vec<Expense> = records
            .values()
            .filter(|r| {
                query
                    .category
                    .as_deref()
                    .map_or(true, |c| r.expense.category == c)
            })
            .map(|r| r.expense.clone())
            .collect();
        expenses.sort_by(|a, b| b.date.cmp(&a.date));

        if let Some(limit) = query.limit {
            let page = query.page.unwrap_or(1).max(1);
            let skip = ((page - 1) * limit) as usize;
            expenses = expenses.into_iter().skip(skip).take(limit as usize).collect();
        }
        Ok(expenses)
    }

    async fn summary(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<SummarySnapshot> {
        let records = self.records.lock().unwrap();
        let in_range: Vec<&ServerRecord> = records
            .values()
            .filter(|r| start.map_or(true, |s| r.expense.date >= s))
            .filter(|r| end.map_or(true, |e| r.expense.date <= e))
            .collect();
        Ok(SummarySnapshot {
            total_amount: in_range.iter().map(|r| r.expense.amount).sum(),
            total_count: in_range.len() as u32,
            category_breakdown: Vec::new(),
            monthly_trend: Vec::new(),
        })
    }

    async fn login(&self, email: &str, _password: &str) -> Result<AuthResponse> {
        Ok(AuthResponse {
            token: "test-token".to_string(),
            user: Some(AuthUser {
                id: "user-1".to_string(),
                name: None,
                email: email.to_string(),
            }),
        })
    }

    async fn register(&self, name: &str, email: &str, password: &str) -> Result<AuthResponse> {
        let mut response = self.login(email, password).await?;
        if let Some(user) = &mut response.user {
            user.name = Some(name.to_string());
        }
        Ok(response)
    }

    async fn profile(&self) -> Result<AuthUser> {
        Ok(AuthUser {
            id: "user-1".to_string(),
            name: None,
            email: "user@example.com".to_string(),
        })
    }

    async fn push_changes(&self, batch: &SyncBatch) -> Result<SyncReport> {
        self.push_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;
        if self.fail_push.load(Ordering::SeqCst) {
            return Err(Error::ServerError(500));
        }

        let now = Utc::now();
        let reject = self.reject.lock().unwrap().clone();
        let mut results = Vec::with_capacity(batch.expenses.len());

        for record in &batch.expenses {
            if reject.contains(&record.local_id) {
                results.push(RecordOutcome {
                    success: false,
                    data: None,
                    local_id: Some(record.local_id.clone()),
                    error: Some("rejected".to_string()),
                });
                continue;
            }

            let data = match record.operation {
                SyncOperation::Create | SyncOperation::Update => {
                    let id = match (record.operation, &record.id) {
                        (SyncOperation::Update, Some(id)) => id.clone(),
                        _ => self.fresh_id(),
                    };
                    let expense = Expense {
                        id: id.clone(),
                        title: record.title.clone(),
                        amount: record.amount,
                        category: record.category.clone(),
                        currency: record.currency.clone(),
                        date: spendsync_common::dates::parse(&record.date).unwrap_or(now),
                        description: record.description.clone(),
                        synced_at: Some(now),
                    };
                    self.records.lock().unwrap().insert(
                        id,
                        ServerRecord {
                            expense: expense.clone(),
                            updated_at: now,
                        },
                    );
                    Some(expense)
                }
                SyncOperation::Delete => {
                    if let Some(id) = &record.id {
                        self.records.lock().unwrap().remove(id);
                    }
                    None
                }
            };

            results.push(RecordOutcome {
                success: true,
                data,
                local_id: Some(record.local_id.clone()),
                error: None,
            });
        }

        let failed = results.iter().filter(|r| !r.success).count() as u32;
        let total = results.len() as u32;
        Ok(SyncReport {
            results,
            summary: Some(SyncCounts {
                total,
                successful: total - failed,
                failed,
            }),
        })
    }

    async fn pull_changes(&self, since: DateTime<Utc>) -> Result<Vec<Expense>> {
        self.pull_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;
        if self.fail_pull.load(Ordering::SeqCst) {
            return Err(Error::ServerError(500));
        }

        let records = self.records.lock().unwrap();
        Ok(records
            .values()
            .filter(|r| r.updated_at > since)
            .map(|r| r.expense.clone())
            .collect())
    }

    async fn health(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::SyncRecord;

    fn draft(title: &str) -> ExpenseDraft {
        ExpenseDraft {
            title: title.to_string(),
            amount: 10.0,
            category: "Food".to_string(),
            currency: "USD".to_string(),
            date: Utc::now(),
            description: None,
        }
    }

    #[tokio::test]
    async fn create_assigns_server_id() {
        let api = MemoryApi::new();
        let expense = api.create_expense(&draft("Lunch")).await.unwrap();
        assert!(expense.id.starts_with("srv-"));
        assert!(expense.synced_at.is_some());
    }

    #[tokio::test]
    async fn push_mixes_successes_and_rejections() {
        let api = MemoryApi::new();
        api.reject_local_id("bad");

        let mk = |local_id: &str| {
            let expense = Expense {
                id: local_id.to_string(),
                title: local_id.to_string(),
                amount: 1.0,
                category: "Food".to_string(),
                currency: "USD".to_string(),
                date: Utc::now(),
                description: None,
                synced_at: None,
            };
            SyncRecord::from_expense(&expense, SyncOperation::Create, false)
        };

        let report = api
            .push_changes(&SyncBatch {
                expenses: vec![mk("good"), mk("bad")],
            })
            .await
            .unwrap();

        assert_eq!(report.results.len(), 2);
        assert!(report.results[0].success);
        assert!(!report.results[1].success);
        assert_eq!(report.summary.unwrap().failed, 1);
        assert_eq!(api.record_count(), 1);
    }

    #[tokio::test]
    async fn pull_filters_by_updated_time() {
        let api = MemoryApi::new();
        let old = Utc::now() - chrono::Duration::hours(2);
        let cutoff = Utc::now() - chrono::Duration::hours(1);

        let expense = api.create_expense(&draft("Recent")).await.unwrap();
        api.seed(
            Expense {
                id: "srv-old".to_string(),
                synced_at: Some(old),
                ..expense.clone()
            },
            old,
        );

        let changed = api.pull_changes(cutoff).await.unwrap();
        assert_eq!(changed.len(), 1);
        assert_eq!(changed[0].id, expense.id);
    }
}
