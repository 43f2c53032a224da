use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::errors::Result;
use crate::models::{
    DailyEntry, ExportEnvelope, Goal, GoalUpdate, IncomeSource, IncomeSourceUpdate, MonthlyEntry,
    Preferences, PreferencesUpdate,
};

/// Contract shared by the local and remote storage adapters.
///
/// Reads on missing keys return the documented default (goals,
/// preferences, income sources) or nothing (entries); they never fail
/// for absence. Daily mutations trigger a full recompute of the owning
/// monthly aggregate before returning. Storage-layer errors propagate
/// unmodified; retry and fallback policy live in the service above.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    async fn get_goals(&self) -> Result<Goal>;
    async fn update_goals(&self, update: GoalUpdate) -> Result<Goal>;

    async fn get_preferences(&self) -> Result<Preferences>;
    async fn update_preferences(&self, update: PreferencesUpdate) -> Result<Preferences>;

    async fn get_daily_entry(&self, date: NaiveDate) -> Result<Option<DailyEntry>>;
    async fn get_daily_entries(&self, start: NaiveDate, end: NaiveDate)
        -> Result<Vec<DailyEntry>>;
    /// Additive: load-or-create the day, append a segment sized
    /// `amount`, register an unknown source in the catalog, persist,
    /// recompute the month.
    async fn add_income_to_day(
        &self,
        date: NaiveDate,
        amount: Decimal,
        source: &IncomeSource,
    ) -> Result<DailyEntry>;
    /// Replace a day wholesale. An entry emptied of segments is
    /// deleted. Returns the stored entry, `None` when it was removed.
    async fn update_day_entry(&self, entry: DailyEntry) -> Result<Option<DailyEntry>>;
    async fn delete_day_entry(&self, date: NaiveDate) -> Result<()>;

    async fn get_monthly_entry(&self, year: i32, month: u32) -> Result<Option<MonthlyEntry>>;
    async fn get_monthly_entries(
        &self,
        start_year: i32,
        start_month: u32,
        end_year: i32,
        end_month: u32,
    ) -> Result<Vec<MonthlyEntry>>;

    async fn get_income_sources(&self) -> Result<Vec<IncomeSource>>;
    async fn add_income_source(&self, source: &IncomeSource) -> Result<Vec<IncomeSource>>;
    async fn update_income_source(
        &self,
        id: &str,
        update: IncomeSourceUpdate,
    ) -> Result<Vec<IncomeSource>>;

    async fn clear_all_data(&self) -> Result<()>;
    async fn export_data(&self) -> Result<ExportEnvelope>;
    /// Clear-then-restore. The envelope is validated in full before
    /// any existing data is touched.
    async fn import_data(&self, envelope: ExportEnvelope) -> Result<()>;
}
