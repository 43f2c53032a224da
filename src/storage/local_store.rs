use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use log::error;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::aggregate;
use crate::constants::{
    LOCAL_DAILY_PREFIX, LOCAL_DATA_PREFIX, LOCAL_KEY_GOALS, LOCAL_KEY_INCOME_SOURCES,
    LOCAL_KEY_PREFERENCES, LOCAL_MONTHLY_PREFIX,
};
use crate::errors::{Result, ValidationError};
use crate::models::{
    default_income_sources, entry_key, month_key, DailyEntry, ExportEnvelope, Goal, GoalUpdate,
    IncomeSource, IncomeSourceUpdate, MonthlyEntry, Preferences, PreferencesUpdate,
    UserDataSnapshot,
};
use crate::storage::kv_store::KvStore;
use crate::storage::storage_traits::StorageBackend;

/// Storage adapter over the browser-persistent key-value namespace.
/// Serves unauthenticated sessions and the optimistic fallback path of
/// the unified data service.
pub struct LocalStore {
    kv: Arc<dyn KvStore>,
}

impl LocalStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        LocalStore { kv }
    }

    fn read_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.kv.get(key)? {
            Some(raw) => match serde_json::from_str(&raw) {
                Ok(value) => Ok(Some(value)),
                Err(e) => {
                    // A corrupt blob reads as a missing key
                    error!("discarding unparseable value under '{key}': {e}");
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    fn write_json<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        self.kv.set(key, &serde_json::to_string(value)?)
    }

    fn daily_key(date: NaiveDate) -> String {
        format!("{LOCAL_DAILY_PREFIX}{}", entry_key(date))
    }

    fn monthly_key(year: i32, month: u32) -> String {
        format!("{LOCAL_MONTHLY_PREFIX}{}", month_key(year, month))
    }

    fn load_daily_range(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<DailyEntry>> {
        let mut entries = Vec::new();
        let mut date = start;
        while date <= end {
            if let Some(entry) = self.read_json::<DailyEntry>(&Self::daily_key(date))? {
                entries.push(entry);
            }
            match date.succ_opt() {
                Some(next) => date = next,
                None => break,
            }
        }
        Ok(entries)
    }

    fn load_income_sources(&self) -> Result<Vec<IncomeSource>> {
        Ok(self
            .read_json(LOCAL_KEY_INCOME_SOURCES)?
            .unwrap_or_else(default_income_sources))
    }

    /// Register a source in the catalog if its id is new
    fn ensure_source_registered(&self, source: &IncomeSource) -> Result<()> {
        let mut sources = self.load_income_sources()?;
        if !sources.iter().any(|s| s.id == source.id) {
            sources.push(source.as_catalog_entry());
            self.write_json(LOCAL_KEY_INCOME_SOURCES, &sources)?;
        }
        Ok(())
    }

    /// Full monthly recompute from the month's daily entries
    fn recompute_month(&self, year: i32, month: u32) -> Result<()> {
        let (first, last) = aggregate::month_bounds(year, month)?;
        let days = self.load_daily_range(first, last)?;
        let key = Self::monthly_key(year, month);
        match aggregate::build_monthly_entry(year, month, &days) {
            Some(monthly) => self.write_json(&key, &monthly),
            None => self.kv.remove(&key),
        }
    }
}

#[async_trait]
impl StorageBackend for LocalStore {
    async fn get_goals(&self) -> Result<Goal> {
        Ok(self.read_json(LOCAL_KEY_GOALS)?.unwrap_or_default())
    }

    async fn update_goals(&self, update: GoalUpdate) -> Result<Goal> {
        let mut goals = self.get_goals().await?;
        goals.apply(&update);
        self.write_json(LOCAL_KEY_GOALS, &goals)?;
        Ok(goals)
    }

    async fn get_preferences(&self) -> Result<Preferences> {
        Ok(self.read_json(LOCAL_KEY_PREFERENCES)?.unwrap_or_default())
    }

    async fn update_preferences(&self, update: PreferencesUpdate) -> Result<Preferences> {
        let mut preferences = self.get_preferences().await?;
        preferences.apply(&update);
        self.write_json(LOCAL_KEY_PREFERENCES, &preferences)?;
        Ok(preferences)
    }

    async fn get_daily_entry(&self, date: NaiveDate) -> Result<Option<DailyEntry>> {
        self.read_json(&Self::daily_key(date))
    }

    async fn get_daily_entries(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyEntry>> {
        self.load_daily_range(start, end)
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
        let existing = self.get_daily_entry(date).await?;
        let entry = aggregate::append_income(existing, date, amount, source);
        self.write_json(&Self::daily_key(date), &entry)?;
        self.ensure_source_registered(source)?;
        self.recompute_month(date.year(), date.month())?;
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
        let date = entry.date;
        let stored = if entry.segments.is_empty() {
            self.kv.remove(&Self::daily_key(date))?;
            None
        } else {
            self.write_json(&Self::daily_key(date), &entry)?;
            for segment in &entry.segments {
                self.ensure_source_registered(segment)?;
            }
            Some(entry)
        };
        self.recompute_month(date.year(), date.month())?;
        Ok(stored)
    }

    async fn delete_day_entry(&self, date: NaiveDate) -> Result<()> {
        self.kv.remove(&Self::daily_key(date))?;
        self.recompute_month(date.year(), date.month())
    }

    async fn get_monthly_entry(&self, year: i32, month: u32) -> Result<Option<MonthlyEntry>> {
        self.read_json(&Self::monthly_key(year, month))
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
            if let Some(entry) = self.read_json(&Self::monthly_key(year, month))? {
                entries.push(entry);
            }
        }
        Ok(entries)
    }

    async fn get_income_sources(&self) -> Result<Vec<IncomeSource>> {
        self.load_income_sources()
    }

    async fn add_income_source(&self, source: &IncomeSource) -> Result<Vec<IncomeSource>> {
        self.ensure_source_registered(source)?;
        self.load_income_sources()
    }

    async fn update_income_source(
        &self,
        id: &str,
        update: IncomeSourceUpdate,
    ) -> Result<Vec<IncomeSource>> {
        let mut sources = self.load_income_sources()?;
        for source in sources.iter_mut().filter(|s| s.id == id) {
            source.apply(&update);
        }
        self.write_json(LOCAL_KEY_INCOME_SOURCES, &sources)?;
        Ok(sources)
    }

    async fn clear_all_data(&self) -> Result<()> {
        for key in self.kv.keys_with_prefix(LOCAL_DATA_PREFIX)? {
            self.kv.remove(&key)?;
        }
        Ok(())
    }

    async fn export_data(&self) -> Result<ExportEnvelope> {
        let mut data = UserDataSnapshot {
            goals: self.get_goals().await?,
            preferences: self.get_preferences().await?,
            income_sources: self.load_income_sources()?,
            ..Default::default()
        };
        for key in self.kv.keys_with_prefix(LOCAL_DAILY_PREFIX)? {
            if let Some(entry) = self.read_json::<DailyEntry>(&key)? {
                data.daily_entries.insert(entry_key(entry.date), entry);
            }
        }
        for key in self.kv.keys_with_prefix(LOCAL_MONTHLY_PREFIX)? {
            if let Some(entry) = self.read_json::<MonthlyEntry>(&key)? {
                data.monthly_entries.insert(entry.month_key.clone(), entry);
            }
        }
        Ok(ExportEnvelope::new(data))
    }

    async fn import_data(&self, envelope: ExportEnvelope) -> Result<()> {
        envelope.validate()?;
        self.clear_all_data().await?;

        let data = envelope.data;
        self.write_json(LOCAL_KEY_GOALS, &data.goals)?;
        self.write_json(LOCAL_KEY_PREFERENCES, &data.preferences)?;
        self.write_json(LOCAL_KEY_INCOME_SOURCES, &data.income_sources)?;
        for entry in data.daily_entries.values() {
            self.write_json(&Self::daily_key(entry.date), entry)?;
        }
        for entry in data.monthly_entries.values() {
            self.write_json(
                &format!("{LOCAL_MONTHLY_PREFIX}{}", entry.month_key),
                entry,
            )?;
        }
        Ok(())
    }
}
