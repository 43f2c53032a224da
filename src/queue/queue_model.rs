use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::models::{entry_key, month_key, parse_entry_key, IncomeSource};

/// Entity paths mutations are recorded against. The same strings name
/// the per-path write locks shared by live calls and replay.
pub mod paths {
    use super::*;

    pub const GOALS: &str = "goals";
    pub const PREFERENCES: &str = "preferences";
    pub const INCOME_SOURCES: &str = "incomeSources";

    pub fn income_source(id: &str) -> String {
        format!("{INCOME_SOURCES}/{id}")
    }

    pub fn daily_entry(date: NaiveDate) -> String {
        format!("dailyEntries/{}", entry_key(date))
    }

    pub fn monthly_entry(year: i32, month: u32) -> String {
        format!("monthlyEntries/{}", month_key(year, month))
    }
}

#[derive(Serialize, Deserialize, PartialEq, Eq, Debug, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum OfflineActionKind {
    Add,
    Update,
    Delete,
}

/// One durably queued mutation that could not be applied remotely when
/// it was made. Replayed in FIFO order, removed by id on success.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct OfflineAction {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: OfflineActionKind,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl OfflineAction {
    pub fn new(kind: OfflineActionKind, path: String, data: Option<Value>) -> Self {
        OfflineAction {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            kind,
            path,
            data,
        }
    }
}

/// Payload of a queued `add` against a daily entry path
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct AddIncomePayload {
    pub amount: Decimal,
    pub source: IncomeSource,
}

/// Parsed form of an action path, used to re-derive the concrete
/// backend call at replay time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionTarget {
    Goals,
    Preferences,
    IncomeSource(String),
    DailyEntry(NaiveDate),
}

impl ActionTarget {
    pub fn parse(path: &str) -> Option<ActionTarget> {
        match path {
            paths::GOALS => return Some(ActionTarget::Goals),
            paths::PREFERENCES => return Some(ActionTarget::Preferences),
            _ => {}
        }
        if let Some(id) = path.strip_prefix("incomeSources/") {
            if !id.is_empty() && !id.contains('/') {
                return Some(ActionTarget::IncomeSource(id.to_string()));
            }
        }
        if let Some(key) = path.strip_prefix("dailyEntries/") {
            if let Ok(date) = parse_entry_key(key) {
                return Some(ActionTarget::DailyEntry(date));
            }
        }
        None
    }

    /// Lock paths guarding a write to this target, in acquisition
    /// order. Daily writes also take the owning month's lock, since the
    /// monthly aggregate is rewritten as part of the same operation.
    /// Source writes serialize on the whole catalog.
    pub fn write_scope(&self) -> Vec<String> {
        match self {
            ActionTarget::Goals => vec![paths::GOALS.to_string()],
            ActionTarget::Preferences => vec![paths::PREFERENCES.to_string()],
            ActionTarget::IncomeSource(_) => vec![paths::INCOME_SOURCES.to_string()],
            ActionTarget::DailyEntry(date) => {
                use chrono::Datelike;
                vec![
                    paths::daily_entry(*date),
                    paths::monthly_entry(date.year(), date.month()),
                ]
            }
        }
    }
}
