use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::constants::EXPORT_VERSION;
use crate::errors::{ImportError, ValidationError};

/// Goal configuration, one instance per user. Never deleted, only
/// updated or reset to defaults.
#[derive(Serialize, Deserialize, PartialEq, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Goal {
    pub daily_goal: Decimal,
    pub monthly_goal: Decimal,
    /// Index 0 is Sunday
    pub active_days: [bool; 7],
}

impl Default for Goal {
    fn default() -> Self {
        Goal {
            daily_goal: dec!(2000),
            monthly_goal: dec!(30000),
            active_days: [false, true, true, true, true, true, false],
        }
    }
}

impl Goal {
    pub fn apply(&mut self, update: &GoalUpdate) {
        if let Some(daily_goal) = update.daily_goal {
            self.daily_goal = daily_goal;
        }
        if let Some(monthly_goal) = update.monthly_goal {
            self.monthly_goal = monthly_goal;
        }
        if let Some(active_days) = update.active_days {
            self.active_days = active_days;
        }
    }
}

/// Partial update for [`Goal`]
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct GoalUpdate {
    pub daily_goal: Option<Decimal>,
    pub monthly_goal: Option<Decimal>,
    pub active_days: Option<[bool; 7]>,
}

#[derive(Serialize, Deserialize, PartialEq, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct RingColors {
    pub daily_ring: String,
    pub monthly_ring: String,
    pub accent: String,
}

impl Default for RingColors {
    fn default() -> Self {
        RingColors {
            daily_ring: "#FF0000".to_string(),
            monthly_ring: "#FFD700".to_string(),
            accent: "#7C3AED".to_string(),
        }
    }
}

/// Display preferences, one instance per user
#[derive(Serialize, Deserialize, PartialEq, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Preferences {
    pub is_dark_mode: bool,
    pub colors: RingColors,
}

impl Default for Preferences {
    fn default() -> Self {
        Preferences {
            is_dark_mode: true,
            colors: RingColors::default(),
        }
    }
}

impl Preferences {
    pub fn apply(&mut self, update: &PreferencesUpdate) {
        if let Some(is_dark_mode) = update.is_dark_mode {
            self.is_dark_mode = is_dark_mode;
        }
        if let Some(colors) = &update.colors {
            self.colors = colors.clone();
        }
    }
}

/// Partial update for [`Preferences`]
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct PreferencesUpdate {
    pub is_dark_mode: Option<bool>,
    pub colors: Option<RingColors>,
}

/// A named, colored income category. In the catalog `value` is always
/// zero; embedded in an entry's segments it carries the contributed
/// amount.
#[derive(Serialize, Deserialize, PartialEq, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct IncomeSource {
    pub id: String,
    pub name: String,
    pub value: Decimal,
    pub color: String,
}

impl IncomeSource {
    /// Catalog form of this source, with the amount zeroed
    pub fn as_catalog_entry(&self) -> IncomeSource {
        IncomeSource {
            id: self.id.clone(),
            name: self.name.clone(),
            value: Decimal::ZERO,
            color: self.color.clone(),
        }
    }

    /// Segment form of this source, sized to `amount`
    pub fn as_segment(&self, amount: Decimal) -> IncomeSource {
        IncomeSource {
            id: self.id.clone(),
            name: self.name.clone(),
            value: amount,
            color: self.color.clone(),
        }
    }

    pub fn apply(&mut self, update: &IncomeSourceUpdate) {
        if let Some(name) = &update.name {
            self.name = name.clone();
        }
        if let Some(color) = &update.color {
            self.color = color.clone();
        }
    }
}

/// Rename/recolor update for an [`IncomeSource`]. The id is fixed and
/// segment values are never touched by catalog updates.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct IncomeSourceUpdate {
    pub name: Option<String>,
    pub color: Option<String>,
}

/// The catalog a fresh store starts with
pub fn default_income_sources() -> Vec<IncomeSource> {
    vec![
        IncomeSource {
            id: "freelance".to_string(),
            name: "Freelance".to_string(),
            value: Decimal::ZERO,
            color: "#FF6B6B".to_string(),
        },
        IncomeSource {
            id: "parttime".to_string(),
            name: "Part Time".to_string(),
            value: Decimal::ZERO,
            color: "#4ECDC4".to_string(),
        },
        IncomeSource {
            id: "other".to_string(),
            name: "Other".to_string(),
            value: Decimal::ZERO,
            color: "#45B7D1".to_string(),
        },
    ]
}

/// One day's income, keyed by ISO date. Created on the first income
/// addition for a day and deleted when emptied.
#[derive(Serialize, Deserialize, PartialEq, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct DailyEntry {
    pub date: NaiveDate,
    pub progress: Decimal,
    pub segments: Vec<IncomeSource>,
}

impl DailyEntry {
    pub fn empty(date: NaiveDate) -> Self {
        DailyEntry {
            date,
            progress: Decimal::ZERO,
            segments: Vec::new(),
        }
    }

    pub fn segment_sum(&self) -> Decimal {
        self.segments.iter().map(|s| s.value).sum()
    }

    /// Invariant: `progress` always equals the sum of the segments
    pub fn is_consistent(&self) -> bool {
        self.progress == self.segment_sum()
    }
}

/// Derived monthly aggregate over a month's daily entries. Rebuilt by
/// full recompute after every daily mutation, never edited directly.
#[derive(Serialize, Deserialize, PartialEq, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyEntry {
    pub year: i32,
    /// Calendar month, 1-12
    pub month: u32,
    pub month_key: String,
    pub progress: Decimal,
    pub segments: Vec<IncomeSource>,
}

/// ISO date key for a daily entry (`YYYY-MM-DD`)
pub fn entry_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub fn parse_entry_key(key: &str) -> Result<NaiveDate, ValidationError> {
    NaiveDate::parse_from_str(key, "%Y-%m-%d")
        .map_err(|_| ValidationError::InvalidDateKey(key.to_string()))
}

/// Month key for a monthly entry (`YYYY-MM`, calendar month)
pub fn month_key(year: i32, month: u32) -> String {
    format!("{year:04}-{month:02}")
}

pub fn parse_month_key(key: &str) -> Result<(i32, u32), ValidationError> {
    let invalid = || ValidationError::InvalidMonthKey(key.to_string());
    let (year_str, month_str) = key.split_once('-').ok_or_else(invalid)?;
    let year: i32 = year_str.parse().map_err(|_| invalid())?;
    let month: u32 = month_str.parse().map_err(|_| invalid())?;
    if !(1..=12).contains(&month) {
        return Err(invalid());
    }
    Ok((year, month))
}

/// Everything a user's store holds, as exported/imported
#[derive(Serialize, Deserialize, PartialEq, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct UserDataSnapshot {
    #[serde(default)]
    pub goals: Goal,
    #[serde(default)]
    pub preferences: Preferences,
    #[serde(default)]
    pub income_sources: Vec<IncomeSource>,
    #[serde(default)]
    pub daily_entries: HashMap<String, DailyEntry>,
    #[serde(default)]
    pub monthly_entries: HashMap<String, MonthlyEntry>,
}

/// Single-document export format. Import fully replaces existing data
/// (clear-then-restore, not a merge).
#[derive(Serialize, Deserialize, PartialEq, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ExportEnvelope {
    pub version: u32,
    pub timestamp: DateTime<Utc>,
    pub data: UserDataSnapshot,
}

impl ExportEnvelope {
    pub fn new(data: UserDataSnapshot) -> Self {
        ExportEnvelope {
            version: EXPORT_VERSION,
            timestamp: Utc::now(),
            data,
        }
    }

    /// Full structural validation, run before an import touches any
    /// existing data.
    pub fn validate(&self) -> Result<(), ImportError> {
        if self.version != EXPORT_VERSION {
            return Err(ImportError::UnsupportedVersion(self.version));
        }
        for (key, entry) in &self.data.daily_entries {
            let date = parse_entry_key(key)
                .map_err(|_| ImportError::Malformed(format!("daily entry key '{key}'")))?;
            if date != entry.date {
                return Err(ImportError::Inconsistent(format!(
                    "daily entry key '{key}' does not match entry date {}",
                    entry.date
                )));
            }
            if !entry.is_consistent() {
                return Err(ImportError::Inconsistent(format!(
                    "daily entry '{key}' progress {} does not match its segments",
                    entry.progress
                )));
            }
        }
        for (key, entry) in &self.data.monthly_entries {
            parse_month_key(key)
                .map_err(|_| ImportError::Malformed(format!("monthly entry key '{key}'")))?;
            if month_key(entry.year, entry.month) != *key || entry.month_key != *key {
                return Err(ImportError::Inconsistent(format!(
                    "monthly entry key '{key}' does not match entry {}-{}",
                    entry.year, entry.month
                )));
            }
        }
        Ok(())
    }
}
