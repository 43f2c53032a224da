use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use log::info;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::aggregate;
use crate::errors::{AuthError, Result, StorageError, ValidationError};
use crate::models::{
    default_income_sources, entry_key, month_key, DailyEntry, ExportEnvelope, Goal, GoalUpdate,
    IncomeSource, IncomeSourceUpdate, MonthlyEntry, Preferences, PreferencesUpdate,
    UserDataSnapshot,
};
use crate::storage::document_client::DocumentClient;
use crate::storage::storage_traits::StorageBackend;

/// Storage adapter over the per-user remote document tree. Every
/// operation requires a signed-in user; the unified data service only
/// routes here when one is present.
pub struct RemoteStore {
    client: Arc<dyn DocumentClient>,
    user_id: RwLock<Option<String>>,
}

impl RemoteStore {
    pub fn new(client: Arc<dyn DocumentClient>) -> Self {
        RemoteStore {
            client,
            user_id: RwLock::new(None),
        }
    }

    pub fn set_user(&self, user_id: &str) {
        *self.user_id.write().expect("user lock poisoned") = Some(user_id.to_string());
    }

    pub fn clear_user(&self) {
        *self.user_id.write().expect("user lock poisoned") = None;
    }

    pub fn current_user(&self) -> Option<String> {
        self.user_id.read().expect("user lock poisoned").clone()
    }

    fn require_user(&self) -> Result<String> {
        self.current_user()
            .ok_or_else(|| AuthError::NotAuthenticated.into())
    }

    fn user_path(&self, suffix: &str) -> Result<String> {
        Ok(format!("users/{}/{suffix}", self.require_user()?))
    }

    async fn read_document<T: DeserializeOwned>(&self, suffix: &str) -> Result<Option<T>> {
        let path = self.user_path(suffix)?;
        match self.client.get_document(&path).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    async fn write_document<T: Serialize>(&self, suffix: &str, value: &T) -> Result<()> {
        let path = self.user_path(suffix)?;
        self.client
            .put_document(&path, serde_json::to_value(value)?)
            .await
    }

    /// Seed the user's tree with defaults on first write
    async fn ensure_initialized(&self) -> Result<()> {
        if self.read_document::<Goal>("settings/goals").await?.is_none() {
            info!("initializing remote data for user {:?}", self.current_user());
            self.write_document("settings/goals", &Goal::default()).await?;
            self.write_document("settings/preferences", &Preferences::default())
                .await?;
            for source in default_income_sources() {
                self.write_document(&format!("incomeSources/{}", source.id), &source)
                    .await?;
            }
        }
        Ok(())
    }

    async fn ensure_source_registered(&self, source: &IncomeSource) -> Result<()> {
        let suffix = format!("incomeSources/{}", source.id);
        if self.read_document::<IncomeSource>(&suffix).await?.is_none() {
            self.write_document(&suffix, &source.as_catalog_entry())
                .await?;
        }
        Ok(())
    }

    async fn load_daily_entries(&self) -> Result<Vec<DailyEntry>> {
        let prefix = self.user_path("dailyEntries")?;
        let mut entries = Vec::new();
        for (id, value) in self.client.list_documents(&prefix).await? {
            let entry: DailyEntry = serde_json::from_value(value).map_err(|e| {
                StorageError::KeyValue(format!("malformed daily entry '{id}': {e}"))
            })?;
            entries.push(entry);
        }
        entries.sort_by_key(|e| e.date);
        Ok(entries)
    }

    async fn recompute_month(&self, year: i32, month: u32) -> Result<()> {
        let (first, last) = aggregate::month_bounds(year, month)?;
        let days: Vec<DailyEntry> = self
            .load_daily_entries()
            .await?
            .into_iter()
            .filter(|e| e.date >= first && e.date <= last)
            .collect();
        let suffix = format!("monthlyEntries/{}", month_key(year, month));
        match aggregate::build_monthly_entry(year, month, &days) {
            Some(monthly) => self.write_document(&suffix, &monthly).await,
            None => {
                let path = self.user_path(&suffix)?;
                self.client.delete_document(&path).await
            }
        }
    }
}

#[async_trait]
impl StorageBackend for RemoteStore {
    async fn get_goals(&self) -> Result<Goal> {
        Ok(self
            .read_document("settings/goals")
            .await?
            .unwrap_or_default())
    }

    async fn update_goals(&self, update: GoalUpdate) -> Result<Goal> {
        self.ensure_initialized().await?;
        let mut goals = self.get_goals().await?;
        goals.apply(&update);
        self.write_document("settings/goals", &goals).await?;
        Ok(goals)
    }

    async fn get_preferences(&self) -> Result<Preferences> {
        Ok(self
            .read_document("settings/preferences")
            .await?
            .unwrap_or_default())
    }

    async fn update_preferences(&self, update: PreferencesUpdate) -> Result<Preferences> {
        self.ensure_initialized().await?;
        let mut preferences = self.get_preferences().await?;
        preferences.apply(&update);
        self.write_document("settings/preferences", &preferences)
            .await?;
        Ok(preferences)
    }

    async fn get_daily_entry(&self, date: NaiveDate) -> Result<Option<DailyEntry>> {
        self.read_document(&format!("dailyEntries/{}", entry_key(date)))
            .await
    }

    async fn get_daily_entries(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyEntry>> {
        Ok(self
            .load_daily_entries()
            .await?
            .into_iter()
            .filter(|e| e.date >= start && e.date <= end)
            .collect())
    }

    async fn add_income_to_day(
        &self,
        date: NaiveDate,
        amount: Decimal,
        source: &IncomeSource,
    ) -> Result<DailyEntry> {
        if amount <= Decimal::ZERO {
            return Err(
                ValidationError::InvalidInput("income amount must be positive".to_string()).into(),
            );
        }
        self.ensure_initialized().await?;
        let existing = self.get_daily_entry(date).await?;
        let entry = aggregate::append_income(existing, date, amount, source);
        self.write_document(&format!("dailyEntries/{}", entry_key(date)), &entry)
            .await?;
        self.ensure_source_registered(source).await?;
        self.recompute_month(date.year(), date.month()).await?;
        Ok(entry)
    }

    async fn update_day_entry(&self, entry: DailyEntry) -> Result<Option<DailyEntry>> {
        if !entry.is_consistent() {
            return Err(ValidationError::ProgressMismatch {
                progress: entry.progress,
                sum: entry.segment_sum(),
            }
            .into());
        }
        self.ensure_initialized().await?;
        let date = entry.date;
        let suffix = format!("dailyEntries/{}", entry_key(date));
        let stored = if entry.segments.is_empty() {
            let path = self.user_path(&suffix)?;
            self.client.delete_document(&path).await?;
            None
        } else {
            self.write_document(&suffix, &entry).await?;
            for segment in &entry.segments {
                self.ensure_source_registered(segment).await?;
            }
            Some(entry)
        };
        self.recompute_month(date.year(), date.month()).await?;
        Ok(stored)
    }

    async fn delete_day_entry(&self, date: NaiveDate) -> Result<()> {
        let path = self.user_path(&format!("dailyEntries/{}", entry_key(date)))?;
        self.client.delete_document(&path).await?;
        self.recompute_month(date.year(), date.month()).await
    }

    async fn get_monthly_entry(&self, year: i32, month: u32) -> Result<Option<MonthlyEntry>> {
        self.read_document(&format!("monthlyEntries/{}", month_key(year, month)))
            .await
    }

    async fn get_monthly_entries(
        &self,
        start_year: i32,
        start_month: u32,
        end_year: i32,
        end_month: u32,
    ) -> Result<Vec<MonthlyEntry>> {
        let mut entries = Vec::new();
        for (year, month) in aggregate::month_span(start_year, start_month, end_year, end_month)? {
            if let Some(entry) = self
                .read_document(&format!("monthlyEntries/{}", month_key(year, month)))
                .await?
            {
                entries.push(entry);
            }
        }
        Ok(entries)
    }

    async fn get_income_sources(&self) -> Result<Vec<IncomeSource>> {
        let prefix = self.user_path("incomeSources")?;
        let mut sources = Vec::new();
        for (id, value) in self.client.list_documents(&prefix).await? {
            let source: IncomeSource = serde_json::from_value(value).map_err(|e| {
                StorageError::KeyValue(format!("malformed income source '{id}': {e}"))
            })?;
            sources.push(source);
        }
        Ok(sources)
    }

    async fn add_income_source(&self, source: &IncomeSource) -> Result<Vec<IncomeSource>> {
        self.ensure_initialized().await?;
        self.ensure_source_registered(source).await?;
        self.get_income_sources().await
    }

    async fn update_income_source(
        &self,
        id: &str,
        update: IncomeSourceUpdate,
    ) -> Result<Vec<IncomeSource>> {
        let suffix = format!("incomeSources/{id}");
        if let Some(mut source) = self.read_document::<IncomeSource>(&suffix).await? {
            source.apply(&update);
            self.write_document(&suffix, &source).await?;
        }
        self.get_income_sources().await
    }

    async fn clear_all_data(&self) -> Result<()> {
        for suffix in ["settings/goals", "settings/preferences"] {
            let path = self.user_path(suffix)?;
            self.client.delete_document(&path).await?;
        }
        for collection in ["dailyEntries", "monthlyEntries", "incomeSources"] {
            let prefix = self.user_path(collection)?;
            for (id, _) in self.client.list_documents(&prefix).await? {
                self.client
                    .delete_document(&format!("{prefix}/{id}"))
                    .await?;
            }
        }
        Ok(())
    }

    async fn export_data(&self) -> Result<ExportEnvelope> {
        let mut data = UserDataSnapshot {
            goals: self.get_goals().await?,
            preferences: self.get_preferences().await?,
            income_sources: self.get_income_sources().await?,
            ..Default::default()
        };
        for entry in self.load_daily_entries().await? {
            data.daily_entries.insert(entry_key(entry.date), entry);
        }
        let prefix = self.user_path("monthlyEntries")?;
        for (id, value) in self.client.list_documents(&prefix).await? {
            let entry: MonthlyEntry = serde_json::from_value(value).map_err(|e| {
                StorageError::KeyValue(format!("malformed monthly entry '{id}': {e}"))
            })?;
            data.monthly_entries.insert(entry.month_key.clone(), entry);
        }
        Ok(ExportEnvelope::new(data))
    }

    async fn import_data(&self, envelope: ExportEnvelope) -> Result<()> {
        envelope.validate()?;
        self.clear_all_data().await?;

        let data = envelope.data;
        self.write_document("settings/goals", &data.goals).await?;
        self.write_document("settings/preferences", &data.preferences)
            .await?;
        for source in &data.income_sources {
            self.write_document(&format!("incomeSources/{}", source.id), source)
                .await?;
        }
        for entry in data.daily_entries.values() {
            self.write_document(&format!("dailyEntries/{}", entry_key(entry.date)), entry)
                .await?;
        }
        for entry in data.monthly_entries.values() {
            self.write_document(&format!("monthlyEntries/{}", entry.month_key), entry)
                .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::document_client::MemoryDocumentClient;
    use rust_decimal_macros::dec;

    fn signed_in_store() -> (Arc<MemoryDocumentClient>, RemoteStore) {
        let client = Arc::new(MemoryDocumentClient::new());
        let store = RemoteStore::new(client.clone());
        store.set_user("u1");
        (client, store)
    }

    fn source(id: &str) -> IncomeSource {
        default_income_sources()
            .into_iter()
            .find(|s| s.id == id)
            .unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[tokio::test]
    async fn test_operations_require_signed_in_user() {
        let store = RemoteStore::new(Arc::new(MemoryDocumentClient::new()));
        assert!(store.get_goals().await.is_err());
        assert!(store
            .add_income_to_day(date(2024, 5, 1), dec!(100), &source("other"))
            .await
            .is_err());

        store.set_user("u1");
        assert!(store.get_goals().await.is_ok());

        store.clear_user();
        assert!(store.get_goals().await.is_err());
    }

    #[tokio::test]
    async fn test_first_write_seeds_defaults() {
        let (client, store) = signed_in_store();
        store
            .update_goals(GoalUpdate {
                daily_goal: Some(dec!(2500)),
                ..Default::default()
            })
            .await
            .unwrap();

        let prefs = client
            .get_document("users/u1/settings/preferences")
            .await
            .unwrap();
        assert!(prefs.is_some());
        assert_eq!(store.get_income_sources().await.unwrap().len(), 3);
        assert_eq!(store.get_goals().await.unwrap().daily_goal, dec!(2500));
    }

    #[tokio::test]
    async fn test_mutations_stamp_updated_at() {
        let (client, store) = signed_in_store();
        store
            .add_income_to_day(date(2024, 5, 1), dec!(500), &source("freelance"))
            .await
            .unwrap();

        let doc = client
            .get_document("users/u1/dailyEntries/2024-05-01")
            .await
            .unwrap()
            .unwrap();
        assert!(doc["updatedAt"].is_string());
    }

    #[tokio::test]
    async fn test_add_income_maintains_monthly_document() {
        let (_, store) = signed_in_store();
        store
            .add_income_to_day(date(2024, 5, 1), dec!(500), &source("freelance"))
            .await
            .unwrap();
        store
            .add_income_to_day(date(2024, 5, 20), dec!(300), &source("parttime"))
            .await
            .unwrap();

        let monthly = store.get_monthly_entry(2024, 5).await.unwrap().unwrap();
        assert_eq!(monthly.progress, dec!(800));
        assert_eq!(monthly.segments.len(), 2);

        store.delete_day_entry(date(2024, 5, 1)).await.unwrap();
        let monthly = store.get_monthly_entry(2024, 5).await.unwrap().unwrap();
        assert_eq!(monthly.progress, dec!(300));
    }

    #[tokio::test]
    async fn test_clear_all_data_empties_user_tree() {
        let (client, store) = signed_in_store();
        store
            .add_income_to_day(date(2024, 5, 1), dec!(500), &source("freelance"))
            .await
            .unwrap();
        assert!(client.document_count() > 0);

        store.clear_all_data().await.unwrap();
        assert_eq!(client.document_count(), 0);
    }

    #[tokio::test]
    async fn test_export_import_round_trip() {
        let (_, store) = signed_in_store();
        store
            .add_income_to_day(date(2024, 5, 1), dec!(500), &source("freelance"))
            .await
            .unwrap();
        let exported = store.export_data().await.unwrap();

        let fresh = RemoteStore::new(Arc::new(MemoryDocumentClient::new()));
        fresh.set_user("u2");
        fresh.import_data(exported.clone()).await.unwrap();

        let round_tripped = fresh.export_data().await.unwrap();
        assert_eq!(exported.data, round_tripped.data);
    }
}
