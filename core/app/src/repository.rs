//! The expense repository: optimistic local-first writes, read-through
//! cached reads, and change notifications.
//!
//! Writes land in the local store first, then push to the server when
//! the monitor says online; a failed push leaves the dirty record for
//! the sync engine. Reads go memory cache, disk cache, network, local
//! store, in that order.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use spendsync_cache::{expenses_key, CacheLayer, LIST_TTL_SECS};
use spendsync_common::{Error, Expense, ExpenseDraft, Result};
use spendsync_currency::{convert, RateTable};
use spendsync_net::wire::SummarySnapshot;
use spendsync_net::{ConnectivityMonitor, ExpenseApi, ListQuery, TokenStore};
use spendsync_store::LocalStore;

use crate::events::{ChangeEvent, ChangeNotifier};

/// Result of a list load that may have been overtaken by a newer request.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    Loaded(Vec<Expense>),
    /// A newer load started while this one was in flight; discard it.
    Superseded,
}

/// Whether a failed network write should leave a dirty local record.
///
/// A content rejection would fail again on every sync pass, so it
/// surfaces to the caller instead.
fn queue_on_failure(error: &Error) -> bool {
    !matches!(error, Error::InvalidRequest(_))
}

pub struct ExpenseRepository<A: ExpenseApi + ?Sized> {
    store: Arc<LocalStore>,
    cache: Arc<CacheLayer>,
    api: Arc<A>,
    tokens: Arc<TokenStore>,
    connectivity: ConnectivityMonitor,
    rates: Arc<RateTable>,
    notifier: ChangeNotifier,
    list_generation: AtomicU64,
}

impl<A: ExpenseApi + ?Sized> ExpenseRepository<A> {
    pub fn new(
        store: Arc<LocalStore>,
        cache: Arc<CacheLayer>,
        api: Arc<A>,
        tokens: Arc<TokenStore>,
        connectivity: ConnectivityMonitor,
        rates: Arc<RateTable>,
    ) -> Self {
        Self {
            store,
            cache,
            api,
            tokens,
            connectivity,
            rates,
            notifier: ChangeNotifier::new(),
            list_generation: AtomicU64::new(0),
        }
    }

    /// Observe repository-level data changes.
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.notifier.subscribe()
    }

    /// Create an expense. The dirty record lands in the local store
    /// before any network work, so a crash mid-request never loses the
    /// write; a successful push settles it in place. Always succeeds
    /// offline.
    pub async fn add(&self, draft: &ExpenseDraft) -> Result<Expense> {
        draft.validate()?;

        let local = self.create_queued(draft)?;

        let expense = if self.connectivity.is_connected() {
            match self.api.create_expense(draft).await {
                Ok(mut record) => {
                    if record.synced_at.is_none() {
                        record.synced_at = Some(Utc::now());
                    }
                    self.store.mark_synced(&local.id, Some(&record))?;
                    record
                }
                Err(e) if queue_on_failure(&e) => {
                    warn!(error = %e, "create failed, leaving the record queued");
                    local
                }
                Err(e) => {
                    // A content rejection would fail again on every sync
                    // pass, so the queued record goes away with it.
                    self.store.delete_hard(&local.id)?;
                    return Err(e);
                }
            }
        } else {
            local
        };

        self.invalidate_lists(&expense.category).await;
        self.notifier.emit(ChangeEvent::DataChanged);
        Ok(expense)
    }

    fn create_queued(&self, draft: &ExpenseDraft) -> Result<Expense> {
        let id = self.store.create_local(draft)?;
        let stored = self
            .store
            .get(&id)?
            .ok_or_else(|| Error::Storage(format!("record {id} vanished after create")))?;
        Ok(stored.expense)
    }

    /// Edit an expense. The dirty edit lands in the local store first,
    /// then is pushed for records the server already knows; a successful
    /// push settles it in place.
    pub async fn update(&self, id: &str, draft: &ExpenseDraft) -> Result<Expense> {
        draft.validate()?;
        let stored = self
            .store
            .get(id)?
            .ok_or_else(|| Error::InvalidRequest(format!("no such expense: {id}")))?;

        let local = self.update_queued(id, draft)?;

        let expense = if stored.ever_synced && self.connectivity.is_connected() {
            match self.api.update_expense(id, draft).await {
                Ok(mut record) => {
                    if record.synced_at.is_none() {
                        record.synced_at = Some(Utc::now());
                    }
                    self.store.mark_synced(id, Some(&record))?;
                    record
                }
                Err(e) if queue_on_failure(&e) => {
                    warn!(error = %e, "update failed, leaving the edit dirty");
                    local
                }
                Err(e) => {
                    // Content rejection: restore the pre-edit record
                    // instead of retrying a doomed edit forever.
                    self.store.upsert(&stored.expense, stored.is_deleted)?;
                    return Err(e);
                }
            }
        } else {
            local
        };

        self.invalidate_lists(&expense.category).await;
        self.notifier.emit(ChangeEvent::DataChanged);
        Ok(expense)
    }

    fn update_queued(&self, id: &str, draft: &ExpenseDraft) -> Result<Expense> {
        let expense = Expense {
            id: id.to_string(),
            title: draft.title.clone(),
            amount: draft.amount,
            category: draft.category.clone(),
            currency: draft.currency.clone(),
            date: draft.date,
            description: draft.description.clone(),
            synced_at: None,
        };
        self.store.upsert(&expense, false)?;
        Ok(expense)
    }

    /// Delete an expense. Records the server never saw go away outright;
    /// synced records are deleted server-first, tombstoned on failure.
    pub async fn delete(&self, id: &str) -> Result<()> {
        let Some(stored) = self.store.get(id)? else {
            return Ok(());
        };

        if !stored.ever_synced {
            self.store.delete_hard(id)?;
        } else if self.connectivity.is_connected() {
            match self.api.delete_expense(id).await {
                Ok(()) => self.store.delete_hard(id)?,
                Err(e) => {
                    warn!(error = %e, "delete failed, tombstoning locally");
                    self.store.mark_deleted_locally(id)?;
                }
            }
        } else {
            self.store.mark_deleted_locally(id)?;
        }

        self.invalidate_lists(&stored.expense.category).await;
        self.notifier.emit(ChangeEvent::DataChanged);
        Ok(())
    }

    /// Read-through list: memory cache, disk cache, network, local store.
    ///
    /// Loads are last-request-wins: a load overtaken by a newer one
    /// reports [`LoadOutcome::Superseded`] instead of stale data.
    pub async fn list(&self, category: Option<&str>) -> Result<LoadOutcome> {
        let generation = self.list_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let key = expenses_key(category);

        if let Some(hit) = self.cache.get_memory::<Vec<Expense>>(&key) {
            debug!(%key, "list served from memory cache");
            return Ok(LoadOutcome::Loaded(hit));
        }

        if let Some(hit) = self.cache.get_disk::<Vec<Expense>>(&key).await {
            debug!(%key, "list served from disk cache");
            self.cache.set_memory(&key, &hit, LIST_TTL_SECS);
            if self.superseded(generation) {
                return Ok(LoadOutcome::Superseded);
            }
            return Ok(LoadOutcome::Loaded(hit));
        }

        if self.connectivity.is_connected() {
            let query = category.map(ListQuery::category).unwrap_or_default();
            match self.api.list_expenses(&query).await {
                Ok(expenses) => {
                    if self.superseded(generation) {
                        return Ok(LoadOutcome::Superseded);
                    }
                    for expense in &expenses {
                        let mut record = expense.clone();
                        if record.synced_at.is_none() {
                            record.synced_at = Some(Utc::now());
                        }
                        self.store.upsert(&record, false)?;
                    }
                    self.cache.set_memory(&key, &expenses, LIST_TTL_SECS);
                    if let Err(e) = self.cache.set_disk(&key, &expenses).await {
                        warn!(error = %e, "disk cache write failed");
                    }
                    return Ok(LoadOutcome::Loaded(expenses));
                }
                Err(e) => {
                    warn!(error = %e, "server list failed, falling back to local store");
                }
            }
        }

        let local = self.store.fetch_all(false)?;
        let filtered = match category {
            Some(c) => local.into_iter().filter(|e| e.category == c).collect(),
            None => local,
        };
        Ok(LoadOutcome::Loaded(filtered))
    }

    /// [`Self::list`] with amounts converted into `target` currency.
    pub async fn list_converted(
        &self,
        category: Option<&str>,
        target: &str,
    ) -> Result<LoadOutcome> {
        match self.list(category).await? {
            LoadOutcome::Superseded => Ok(LoadOutcome::Superseded),
            LoadOutcome::Loaded(expenses) => Ok(LoadOutcome::Loaded(
                expenses
                    .into_iter()
                    .map(|mut e| {
                        e.amount = convert(&self.rates, e.amount, &e.currency, target);
                        e.currency = target.to_string();
                        e
                    })
                    .collect(),
            )),
        }
    }

    /// Server-side aggregation; requires connectivity.
    pub async fn summary(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<SummarySnapshot> {
        if !self.connectivity.is_connected() {
            return Err(Error::NoConnectivity);
        }
        self.api.summary(start, end).await
    }

    /// Records still waiting to be uploaded.
    pub fn pending_count(&self) -> Result<usize> {
        self.store.pending_count()
    }

    /// End the session: wipe credentials, store, and caches.
    pub async fn logout(&self) -> Result<()> {
        self.tokens.clear();
        self.store.clear_all()?;
        self.cache.clear_all().await?;
        self.notifier.emit(ChangeEvent::LoggedOut);
        Ok(())
    }

    fn superseded(&self, generation: u64) -> bool {
        self.list_generation.load(Ordering::SeqCst) != generation
    }

    async fn invalidate_lists(&self, category: &str) {
        self.cache.invalidate(&expenses_key(None)).await;
        self.cache.invalidate(&expenses_key(Some(category))).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spendsync_net::MemoryApi;
    use std::time::Duration;
    use tempfile::TempDir;

    struct Fixture {
        repo: Arc<ExpenseRepository<MemoryApi>>,
        api: Arc<MemoryApi>,
        store: Arc<LocalStore>,
        connectivity: ConnectivityMonitor,
        _dir: TempDir,
    }

    fn fixture(connected: bool) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(LocalStore::open_in_memory().unwrap());
        let cache = Arc::new(CacheLayer::new(dir.path().join("cache")).unwrap());
        let api = Arc::new(MemoryApi::new());
        let tokens = Arc::new(TokenStore::in_memory());
        tokens.set("t").unwrap();
        let connectivity = ConnectivityMonitor::new(connected);

        let repo = Arc::new(ExpenseRepository::new(
            Arc::clone(&store),
            cache,
            Arc::clone(&api),
            tokens,
            connectivity.clone(),
            Arc::new(RateTable::new()),
        ));
        Fixture {
            repo,
            api,
            store,
            connectivity,
            _dir: dir,
        }
    }

    fn draft(title: &str, category: &str) -> ExpenseDraft {
        ExpenseDraft {
            title: title.to_string(),
            amount: 10.0,
            category: category.to_string(),
            currency: "USD".to_string(),
            date: Utc::now(),
            description: None,
        }
    }

    #[tokio::test]
    async fn add_online_stores_canonical_record() {
        let f = fixture(true);
        let mut events = f.repo.subscribe();

        let expense = f.repo.add(&draft("Coffee", "Food")).await.unwrap();

        assert!(expense.id.starts_with("srv-"));
        assert!(expense.synced_at.is_some());
        assert_eq!(f.api.record_count(), 1);
        assert_eq!(f.store.pending_count().unwrap(), 0);
        assert_eq!(events.recv().await.unwrap(), ChangeEvent::DataChanged);
    }

    #[tokio::test]
    async fn add_offline_queues_locally() {
        let f = fixture(false);

        let expense = f.repo.add(&draft("Coffee", "Food")).await.unwrap();

        assert!(expense.is_dirty());
        assert_eq!(f.api.record_count(), 0);
        assert_eq!(f.store.pending_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn add_persists_locally_before_the_push() {
        let f = fixture(true);
        f.api.set_latency(Duration::from_millis(50));

        let task = tokio::spawn({
            let repo = Arc::clone(&f.repo);
            async move { repo.add(&draft("Coffee", "Food")).await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        // The write is already durable while the request is in flight.
        assert_eq!(f.store.pending_count().unwrap(), 1);

        let expense = task.await.unwrap().unwrap();
        assert!(expense.id.starts_with("srv-"));
        assert_eq!(f.store.pending_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn update_keeps_the_edit_when_the_push_fails() {
        let f = fixture(true);
        let expense = f.repo.add(&draft("Original", "Food")).await.unwrap();
        f.api.set_fail_requests(true);

        let updated = f
            .repo
            .update(&expense.id, &draft("Edited", "Food"))
            .await
            .unwrap();

        assert!(updated.is_dirty());
        let stored = f.store.get(&expense.id).unwrap().unwrap();
        assert_eq!(stored.expense.title, "Edited");
        assert_eq!(f.api.record(&expense.id).unwrap().title, "Original");
    }

    #[tokio::test]
    async fn add_falls_back_on_server_error() {
        let f = fixture(true);
        f.api.set_fail_requests(true);

        let expense = f.repo.add(&draft("Coffee", "Food")).await.unwrap();

        assert!(expense.is_dirty());
        assert_eq!(f.store.pending_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn add_rejects_invalid_drafts() {
        let f = fixture(false);
        let mut bad = draft("", "Food");
        bad.title = String::new();
        assert!(matches!(
            f.repo.add(&bad).await.unwrap_err(),
            Error::InvalidRequest(_)
        ));
        assert_eq!(f.store.pending_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn update_offline_re_dirties() {
        let f = fixture(true);
        let expense = f.repo.add(&draft("Original", "Food")).await.unwrap();

        f.connectivity.set_connected(false);
        let updated = f
            .repo
            .update(&expense.id, &draft("Edited", "Food"))
            .await
            .unwrap();

        assert!(updated.is_dirty());
        let stored = f.store.get(&expense.id).unwrap().unwrap();
        assert_eq!(stored.expense.title, "Edited");
        assert!(stored.ever_synced);
    }

    #[tokio::test]
    async fn delete_synced_record_offline_leaves_tombstone() {
        let f = fixture(true);
        let expense = f.repo.add(&draft("Doomed", "Food")).await.unwrap();

        f.connectivity.set_connected(false);
        f.repo.delete(&expense.id).await.unwrap();

        let stored = f.store.get(&expense.id).unwrap().unwrap();
        assert!(stored.is_deleted);
        assert!(stored.expense.is_dirty());
        // Still on the server until the tombstone syncs.
        assert_eq!(f.api.record_count(), 1);
    }

    #[tokio::test]
    async fn delete_never_synced_record_skips_the_server() {
        let f = fixture(false);
        let expense = f.repo.add(&draft("Ephemeral", "Food")).await.unwrap();

        f.repo.delete(&expense.id).await.unwrap();

        assert!(f.store.get(&expense.id).unwrap().is_none());
        assert_eq!(f.store.pending_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn delete_online_removes_both_sides() {
        let f = fixture(true);
        let expense = f.repo.add(&draft("Gone", "Food")).await.unwrap();

        f.repo.delete(&expense.id).await.unwrap();

        assert!(f.store.get(&expense.id).unwrap().is_none());
        assert_eq!(f.api.record_count(), 0);
    }

    #[tokio::test]
    async fn list_caches_and_serves_repeat_reads_from_memory() {
        let f = fixture(true);
        f.repo.add(&draft("Coffee", "Food")).await.unwrap();

        let first = f.repo.list(None).await.unwrap();
        assert!(matches!(first, LoadOutcome::Loaded(ref v) if v.len() == 1));
        assert_eq!(f.api.list_calls(), 1);

        let second = f.repo.list(None).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(f.api.list_calls(), 1);
    }

    #[tokio::test]
    async fn mutation_invalidates_list_caches() {
        let f = fixture(true);
        f.repo.add(&draft("Coffee", "Food")).await.unwrap();
        f.repo.list(None).await.unwrap();

        f.repo.add(&draft("Lunch", "Food")).await.unwrap();

        let LoadOutcome::Loaded(expenses) = f.repo.list(None).await.unwrap() else {
            panic!("superseded");
        };
        assert_eq!(expenses.len(), 2);
        assert_eq!(f.api.list_calls(), 2);
    }

    #[tokio::test]
    async fn list_offline_falls_back_to_local_store() {
        let f = fixture(false);
        f.repo.add(&draft("Local", "Food")).await.unwrap();
        f.repo.add(&draft("Other", "Bills")).await.unwrap();

        let LoadOutcome::Loaded(food) = f.repo.list(Some("Food")).await.unwrap() else {
            panic!("superseded");
        };
        assert_eq!(food.len(), 1);
        assert_eq!(food[0].title, "Local");
    }

    #[tokio::test]
    async fn slower_stale_load_is_superseded() {
        let f = fixture(true);
        f.repo.add(&draft("Coffee", "Food")).await.unwrap();
        f.api.set_latency(Duration::from_millis(50));

        let stale = tokio::spawn({
            let repo = Arc::clone(&f.repo);
            async move { repo.list(None).await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        let fresh = f.repo.list(None).await.unwrap();

        assert_eq!(stale.await.unwrap().unwrap(), LoadOutcome::Superseded);
        assert!(matches!(fresh, LoadOutcome::Loaded(_)));
    }

    #[tokio::test]
    async fn converted_list_applies_rates() {
        let f = fixture(false);
        f.repo.add(&draft("Coffee", "Food")).await.unwrap();

        let LoadOutcome::Loaded(expenses) =
            f.repo.list_converted(None, "EUR").await.unwrap()
        else {
            panic!("superseded");
        };
        assert_eq!(expenses[0].currency, "EUR");
        assert!((expenses[0].amount - 8.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn summary_requires_connectivity() {
        let f = fixture(false);
        assert!(matches!(
            f.repo.summary(None, None).await.unwrap_err(),
            Error::NoConnectivity
        ));
    }

    #[tokio::test]
    async fn logout_wipes_local_state() {
        let f = fixture(true);
        let mut events = f.repo.subscribe();
        f.repo.add(&draft("Coffee", "Food")).await.unwrap();
        f.repo.list(None).await.unwrap();

        f.repo.logout().await.unwrap();

        assert!(f.store.fetch_all(true).unwrap().is_empty());
        assert_eq!(f.store.cursor().unwrap().timestamp(), 0);
        // Cached lists are gone too, so an offline read starts cold.
        f.connectivity.set_connected(false);
        let LoadOutcome::Loaded(expenses) = f.repo.list(Some("Food")).await.unwrap() else {
            panic!("superseded");
        };
        assert!(expenses.is_empty());

        assert_eq!(events.recv().await.unwrap(), ChangeEvent::DataChanged);
        assert_eq!(events.recv().await.unwrap(), ChangeEvent::LoggedOut);
    }
}
