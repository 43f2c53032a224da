use std::sync::Arc;

use chrono::{Datelike, NaiveDate, Utc};
use log::{info, warn};
use rust_decimal::Decimal;
use tokio::sync::broadcast;

use crate::aggregate;
use crate::constants::SOURCE_FANOUT_MONTHS;
use crate::errors::{AuthError, Result};
use crate::models::{
    DailyEntry, ExportEnvelope, Goal, GoalUpdate, IncomeSource, IncomeSourceUpdate, MonthlyEntry,
    Preferences, PreferencesUpdate,
};
use crate::queue::{paths, ActionTarget, AddIncomePayload, OfflineActionKind, OfflineQueue};
use crate::service::in_flight::InFlightTracker;
use crate::service::session::{Session, SessionEvent};
use crate::storage::{DocumentClient, KvStore, LocalStore, RemoteStore, StorageBackend};
use crate::sync::{ReplayOutcome, SyncService, WriteLocks};

const EVENT_CHANNEL_CAPACITY: usize = 32;

/// The façade every caller goes through.
///
/// Each call is routed to the remote store when a user is signed in
/// and the session is online, and to the local store otherwise. A
/// failed or unreachable remote mutation is queued for replay and
/// committed to the local store instead, so the caller's change is
/// never silently dropped. Replay fires on reconnect and on sign-in.
pub struct DataService {
    local: Arc<LocalStore>,
    remote: Arc<RemoteStore>,
    queue: Arc<OfflineQueue>,
    sync: Arc<SyncService>,
    locks: Arc<WriteLocks>,
    session: Session,
    tracker: InFlightTracker,
    events: broadcast::Sender<SessionEvent>,
}

impl DataService {
    pub fn new(kv: Arc<dyn KvStore>, client: Arc<dyn DocumentClient>) -> Self {
        let local = Arc::new(LocalStore::new(kv.clone()));
        let remote = Arc::new(RemoteStore::new(client));
        let queue = Arc::new(OfflineQueue::new(kv));
        let locks = Arc::new(WriteLocks::new());
        let sync = Arc::new(SyncService::new(
            queue.clone(),
            remote.clone() as Arc<dyn StorageBackend>,
            locks.clone(),
        ));
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        DataService {
            local,
            remote,
            queue,
            sync,
            locks,
            session: Session::new(),
            tracker: InFlightTracker::new(),
            events,
        }
    }

    // --- Session management ---

    /// Record a signed-in user (authentication itself is the host's
    /// concern) and replay anything queued while signed out or offline.
    pub async fn sign_in(&self, user_id: &str) -> Result<ReplayOutcome> {
        self.remote.set_user(user_id);
        self.session.set_user(user_id);
        info!("signed in as {user_id}");
        self.emit(SessionEvent::AuthChanged {
            user_id: Some(user_id.to_string()),
        });
        if self.session.is_online() {
            self.replay_queue().await
        } else {
            Ok(ReplayOutcome::default())
        }
    }

    pub fn sign_out(&self) {
        self.remote.clear_user();
        self.session.clear_user();
        info!("signed out");
        self.emit(SessionEvent::AuthChanged { user_id: None });
    }

    /// Feed a connectivity signal. Coming online with a signed-in user
    /// triggers queue replay.
    pub async fn set_online(&self, online: bool) -> Result<ReplayOutcome> {
        if self.session.set_online(online) {
            info!("connectivity changed: online={online}");
            self.emit(SessionEvent::ConnectivityChanged { online });
        }
        if online && self.session.is_authenticated() {
            self.replay_queue().await
        } else {
            Ok(ReplayOutcome::default())
        }
    }

    pub fn is_online(&self) -> bool {
        self.session.is_online()
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.is_authenticated()
    }

    pub fn current_user(&self) -> Option<String> {
        self.session.user_id()
    }

    /// Number of data-service calls currently outstanding
    pub fn in_flight(&self) -> usize {
        self.tracker.in_flight()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub async fn pending_action_count(&self) -> Result<usize> {
        self.queue.len().await
    }

    /// Manual replay trigger, for hosts with their own sync scheduling
    pub async fn replay_pending(&self) -> Result<ReplayOutcome> {
        self.replay_queue().await
    }

    async fn replay_queue(&self) -> Result<ReplayOutcome> {
        let outcome = self.sync.replay().await?;
        if outcome.attempted > 0 {
            self.emit(SessionEvent::ReplayFinished {
                applied: outcome.applied,
                failed: outcome.failed,
            });
        }
        Ok(outcome)
    }

    fn emit(&self, event: SessionEvent) {
        // Nobody listening is fine
        let _ = self.events.send(event);
    }

    fn use_remote(&self) -> bool {
        self.session.is_authenticated() && self.session.is_online()
    }

    // --- Goals ---

    pub async fn get_goals(&self) -> Result<Goal> {
        let _op = self.tracker.start();
        if self.use_remote() {
            match self.remote.get_goals().await {
                Ok(goals) => return Ok(goals),
                Err(e) => warn!("remote goals read failed, reading local: {e}"),
            }
        }
        self.local.get_goals().await
    }

    pub async fn update_goals(&self, update: GoalUpdate) -> Result<Goal> {
        let _op = self.tracker.start();
        let _guards = self
            .locks
            .lock_scope(&ActionTarget::Goals.write_scope())
            .await;
        if self.session.is_authenticated() {
            if self.session.is_online() {
                match self.remote.update_goals(update.clone()).await {
                    Ok(goals) => return Ok(goals),
                    Err(e) => warn!("remote goals update failed, queueing: {e}"),
                }
            }
            self.queue
                .enqueue(
                    OfflineActionKind::Update,
                    paths::GOALS.to_string(),
                    Some(serde_json::to_value(&update)?),
                )
                .await?;
        }
        self.local.update_goals(update).await
    }

    // --- Preferences ---

    pub async fn get_preferences(&self) -> Result<Preferences> {
        let _op = self.tracker.start();
        if self.use_remote() {
            match self.remote.get_preferences().await {
                Ok(preferences) => return Ok(preferences),
                Err(e) => warn!("remote preferences read failed, reading local: {e}"),
            }
        }
        self.local.get_preferences().await
    }

    pub async fn update_preferences(&self, update: PreferencesUpdate) -> Result<Preferences> {
        let _op = self.tracker.start();
        let _guards = self
            .locks
            .lock_scope(&ActionTarget::Preferences.write_scope())
            .await;
        if self.session.is_authenticated() {
            if self.session.is_online() {
                match self.remote.update_preferences(update.clone()).await {
                    Ok(preferences) => return Ok(preferences),
                    Err(e) => warn!("remote preferences update failed, queueing: {e}"),
                }
            }
            self.queue
                .enqueue(
                    OfflineActionKind::Update,
                    paths::PREFERENCES.to_string(),
                    Some(serde_json::to_value(&update)?),
                )
                .await?;
        }
        self.local.update_preferences(update).await
    }

    // --- Daily entries ---

    pub async fn get_daily_entry(&self, date: NaiveDate) -> Result<Option<DailyEntry>> {
        let _op = self.tracker.start();
        if self.use_remote() {
            match self.remote.get_daily_entry(date).await {
                Ok(entry) => return Ok(entry),
                Err(e) => warn!("remote daily read failed, reading local: {e}"),
            }
        }
        self.local.get_daily_entry(date).await
    }

    pub async fn get_daily_entries(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyEntry>> {
        let _op = self.tracker.start();
        if self.use_remote() {
            match self.remote.get_daily_entries(start, end).await {
                Ok(entries) => return Ok(entries),
                Err(e) => warn!("remote daily range read failed, reading local: {e}"),
            }
        }
        self.local.get_daily_entries(start, end).await
    }

    pub async fn add_income_to_day(
        &self,
        date: NaiveDate,
        amount: Decimal,
        source: &IncomeSource,
    ) -> Result<DailyEntry> {
        let _op = self.tracker.start();
        let _guards = self
            .locks
            .lock_scope(&ActionTarget::DailyEntry(date).write_scope())
            .await;
        if self.session.is_authenticated() {
            if self.session.is_online() {
                match self.remote.add_income_to_day(date, amount, source).await {
                    Ok(entry) => return Ok(entry),
                    Err(e) => warn!("remote income add failed, queueing: {e}"),
                }
            }
            let payload = AddIncomePayload {
                amount,
                source: source.clone(),
            };
            self.queue
                .enqueue(
                    OfflineActionKind::Add,
                    paths::daily_entry(date),
                    Some(serde_json::to_value(&payload)?),
                )
                .await?;
        }
        self.local.add_income_to_day(date, amount, source).await
    }

    pub async fn update_day_entry(&self, entry: DailyEntry) -> Result<Option<DailyEntry>> {
        let _op = self.tracker.start();
        let _guards = self
            .locks
            .lock_scope(&ActionTarget::DailyEntry(entry.date).write_scope())
            .await;
        if self.session.is_authenticated() {
            if self.session.is_online() {
                match self.remote.update_day_entry(entry.clone()).await {
                    Ok(stored) => return Ok(stored),
                    Err(e) => warn!("remote day update failed, queueing: {e}"),
                }
            }
            self.queue
                .enqueue(
                    OfflineActionKind::Update,
                    paths::daily_entry(entry.date),
                    Some(serde_json::to_value(&entry)?),
                )
                .await?;
        }
        self.local.update_day_entry(entry).await
    }

    pub async fn delete_day_entry(&self, date: NaiveDate) -> Result<()> {
        let _op = self.tracker.start();
        let _guards = self
            .locks
            .lock_scope(&ActionTarget::DailyEntry(date).write_scope())
            .await;
        if self.session.is_authenticated() {
            if self.session.is_online() {
                match self.remote.delete_day_entry(date).await {
                    Ok(()) => return Ok(()),
                    Err(e) => warn!("remote day delete failed, queueing: {e}"),
                }
            }
            self.queue
                .enqueue(OfflineActionKind::Delete, paths::daily_entry(date), None)
                .await?;
        }
        self.local.delete_day_entry(date).await
    }

    // --- Monthly entries ---

    pub async fn get_monthly_entry(&self, year: i32, month: u32) -> Result<Option<MonthlyEntry>> {
        let _op = self.tracker.start();
        if self.use_remote() {
            match self.remote.get_monthly_entry(year, month).await {
                Ok(entry) => return Ok(entry),
                Err(e) => warn!("remote monthly read failed, reading local: {e}"),
            }
        }
        self.local.get_monthly_entry(year, month).await
    }

    pub async fn get_monthly_entries(
        &self,
        start_year: i32,
        start_month: u32,
        end_year: i32,
        end_month: u32,
    ) -> Result<Vec<MonthlyEntry>> {
        let _op = self.tracker.start();
        if self.use_remote() {
            match self
                .remote
                .get_monthly_entries(start_year, start_month, end_year, end_month)
                .await
            {
                Ok(entries) => return Ok(entries),
                Err(e) => warn!("remote monthly range read failed, reading local: {e}"),
            }
        }
        self.local
            .get_monthly_entries(start_year, start_month, end_year, end_month)
            .await
    }

    // --- Income sources ---

    pub async fn get_income_sources(&self) -> Result<Vec<IncomeSource>> {
        let _op = self.tracker.start();
        if self.use_remote() {
            match self.remote.get_income_sources().await {
                Ok(sources) => return Ok(sources),
                Err(e) => warn!("remote sources read failed, reading local: {e}"),
            }
        }
        self.local.get_income_sources().await
    }

    pub async fn add_income_source(&self, source: &IncomeSource) -> Result<Vec<IncomeSource>> {
        let _op = self.tracker.start();
        let _guards = self
            .locks
            .lock_scope(&ActionTarget::IncomeSource(source.id.clone()).write_scope())
            .await;
        if self.session.is_authenticated() {
            if self.session.is_online() {
                match self.remote.add_income_source(source).await {
                    Ok(sources) => return Ok(sources),
                    Err(e) => warn!("remote source add failed, queueing: {e}"),
                }
            }
            self.queue
                .enqueue(
                    OfflineActionKind::Add,
                    paths::income_source(&source.id),
                    Some(serde_json::to_value(source)?),
                )
                .await?;
        }
        self.local.add_income_source(source).await
    }

    pub async fn update_income_source(
        &self,
        id: &str,
        update: IncomeSourceUpdate,
    ) -> Result<Vec<IncomeSource>> {
        let _op = self.tracker.start();
        let _guards = self
            .locks
            .lock_scope(&ActionTarget::IncomeSource(id.to_string()).write_scope())
            .await;
        if self.session.is_authenticated() {
            if self.session.is_online() {
                match self.remote.update_income_source(id, update.clone()).await {
                    Ok(sources) => return Ok(sources),
                    Err(e) => warn!("remote source update failed, queueing: {e}"),
                }
            }
            self.queue
                .enqueue(
                    OfflineActionKind::Update,
                    paths::income_source(id),
                    Some(serde_json::to_value(&update)?),
                )
                .await?;
        }
        self.local.update_income_source(id, update).await
    }

    /// Rename/recolor a source in the catalog and fan the change out
    /// to every daily entry referencing it within the trailing
    /// twelve-month window. Today's entry is rewritten first so the
    /// currently viewed day reflects the change immediately.
    pub async fn update_income_source_everywhere(
        &self,
        id: &str,
        update: IncomeSourceUpdate,
    ) -> Result<Vec<IncomeSource>> {
        let _op = self.tracker.start();
        let sources = self.update_income_source(id, update.clone()).await?;

        let today = Utc::now().date_naive();
        self.rewrite_day_segments(today, id, &update).await?;

        let window_start = fanout_window_start(today);
        let entries = self.get_daily_entries(window_start, today).await?;
        for entry in entries {
            if entry.date == today {
                continue;
            }
            let mut patched = entry;
            if aggregate::apply_source_update(&mut patched, id, &update) {
                self.update_day_entry(patched).await?;
            }
        }
        Ok(sources)
    }

    async fn rewrite_day_segments(
        &self,
        date: NaiveDate,
        id: &str,
        update: &IncomeSourceUpdate,
    ) -> Result<()> {
        if let Some(mut entry) = self.get_daily_entry(date).await? {
            if aggregate::apply_source_update(&mut entry, id, update) {
                self.update_day_entry(entry).await?;
            }
        }
        Ok(())
    }

    // --- Data management ---
    //
    // Export, import and clear run against the signed-in user's store
    // directly; their failures surface to the caller instead of being
    // queued.

    pub async fn clear_all_data(&self) -> Result<()> {
        let _op = self.tracker.start();
        if self.session.is_authenticated() {
            self.remote.clear_all_data().await
        } else {
            self.local.clear_all_data().await
        }
    }

    pub async fn export_data(&self) -> Result<ExportEnvelope> {
        let _op = self.tracker.start();
        if self.session.is_authenticated() {
            self.remote.export_data().await
        } else {
            self.local.export_data().await
        }
    }

    pub async fn import_data(&self, envelope: ExportEnvelope) -> Result<()> {
        let _op = self.tracker.start();
        if self.session.is_authenticated() {
            self.remote.import_data(envelope).await
        } else {
            self.local.import_data(envelope).await
        }
    }

    /// Move anonymous local data into the signed-in user's remote
    /// store, then clear the local copy.
    pub async fn migrate_local_to_remote(&self) -> Result<()> {
        let _op = self.tracker.start();
        if !self.session.is_authenticated() {
            return Err(AuthError::NotAuthenticated.into());
        }
        let envelope = self.local.export_data().await?;
        self.remote.import_data(envelope).await?;
        self.local.clear_all_data().await?;
        info!("migrated local data to remote store");
        Ok(())
    }
}

/// First day of the month `SOURCE_FANOUT_MONTHS` months before `today`
fn fanout_window_start(today: NaiveDate) -> NaiveDate {
    let months = today.year() * 12 + today.month0() as i32 - SOURCE_FANOUT_MONTHS as i32;
    let year = months.div_euclid(12);
    let month = months.rem_euclid(12) as u32 + 1;
    NaiveDate::from_ymd_opt(year, month, 1).expect("first of month is always valid")
}
