//! Monthly aggregate maintenance.
//!
//! A [`MonthlyEntry`](crate::models::MonthlyEntry) is derived state: after
//! any daily mutation the owning month is rebuilt in full from that
//! month's daily entries. Full recompute costs at most 31 reads and is
//! preferred over incremental patching for correctness at personal-data
//! scale.

use std::collections::HashMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::errors::{Result, ValidationError};
use crate::models::{month_key, DailyEntry, IncomeSource, IncomeSourceUpdate, MonthlyEntry};

/// First and last day of a calendar month
pub fn month_bounds(year: i32, month: u32) -> Result<(NaiveDate, NaiveDate)> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)
        .ok_or_else(|| ValidationError::InvalidMonthKey(month_key(year, month)))?;
    let next_month = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    };
    // Both branches are valid by construction once `first` exists
    let last = next_month
        .and_then(|d| d.pred_opt())
        .ok_or_else(|| ValidationError::InvalidMonthKey(month_key(year, month)))?;
    Ok((first, last))
}

/// Inclusive `(year, month)` range between two calendar months
pub fn month_span(
    start_year: i32,
    start_month: u32,
    end_year: i32,
    end_month: u32,
) -> Result<Vec<(i32, u32)>> {
    for (year, month) in [(start_year, start_month), (end_year, end_month)] {
        if !(1..=12).contains(&month) {
            return Err(ValidationError::InvalidMonthKey(month_key(year, month)).into());
        }
    }
    let mut months = Vec::new();
    let (mut year, mut month) = (start_year, start_month);
    while (year, month) <= (end_year, end_month) {
        months.push((year, month));
        if month == 12 {
            year += 1;
            month = 1;
        } else {
            month += 1;
        }
    }
    Ok(months)
}

/// Merge segments by source id, summing values. Name and color come
/// from the first occurrence encountered; first-seen order is kept.
pub fn merge_segments<'a, I>(segments: I) -> Vec<IncomeSource>
where
    I: IntoIterator<Item = &'a IncomeSource>,
{
    let mut merged: Vec<IncomeSource> = Vec::new();
    let mut by_id: HashMap<String, usize> = HashMap::new();
    for segment in segments {
        match by_id.get(&segment.id) {
            Some(&index) => merged[index].value += segment.value,
            None => {
                by_id.insert(segment.id.clone(), merged.len());
                merged.push(segment.clone());
            }
        }
    }
    merged
}

/// Rebuild the monthly aggregate from a month's daily entries.
/// Returns `None` when the month holds no entries, which deletes the
/// stored aggregate.
pub fn build_monthly_entry(year: i32, month: u32, days: &[DailyEntry]) -> Option<MonthlyEntry> {
    if days.is_empty() {
        return None;
    }
    let mut days: Vec<&DailyEntry> = days.iter().collect();
    days.sort_by_key(|d| d.date);

    let progress: Decimal = days.iter().map(|d| d.progress).sum();
    let segments = merge_segments(days.iter().flat_map(|d| d.segments.iter()));
    Some(MonthlyEntry {
        year,
        month,
        month_key: month_key(year, month),
        progress,
        segments,
    })
}

/// Load-or-create a day's entry and append a segment sized `amount`.
/// Each call appends; segments are never merged at the daily level, so
/// a day records one segment per addition.
pub fn append_income(
    existing: Option<DailyEntry>,
    date: NaiveDate,
    amount: Decimal,
    source: &IncomeSource,
) -> DailyEntry {
    let mut entry = existing.unwrap_or_else(|| DailyEntry::empty(date));
    entry.progress += amount;
    entry.segments.push(source.as_segment(amount));
    entry
}

/// Apply a rename/recolor to every segment of `entry` referencing
/// `source_id`. Returns whether anything changed.
pub fn apply_source_update(
    entry: &mut DailyEntry,
    source_id: &str,
    update: &IncomeSourceUpdate,
) -> bool {
    let mut touched = false;
    for segment in entry.segments.iter_mut().filter(|s| s.id == source_id) {
        segment.apply(update);
        touched = true;
    }
    touched
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::default_income_sources;
    use rust_decimal_macros::dec;

    fn day(date: (i32, u32, u32), amounts: &[(&str, Decimal)]) -> DailyEntry {
        let date = NaiveDate::from_ymd_opt(date.0, date.1, date.2).unwrap();
        let catalog = default_income_sources();
        let mut entry = DailyEntry::empty(date);
        for (id, amount) in amounts {
            let source = catalog.iter().find(|s| s.id == *id).unwrap();
            entry = append_income(Some(entry), date, *amount, source);
        }
        entry
    }

    #[test]
    fn test_append_income_accumulates() {
        let entry = day((2024, 5, 1), &[("freelance", dec!(500)), ("parttime", dec!(300))]);
        assert_eq!(entry.progress, dec!(800));
        assert_eq!(entry.segments.len(), 2);
        assert!(entry.is_consistent());
    }

    #[test]
    fn test_append_income_keeps_one_segment_per_call() {
        let entry = day((2024, 5, 1), &[("freelance", dec!(500)), ("freelance", dec!(250))]);
        assert_eq!(entry.segments.len(), 2);
        assert_eq!(entry.progress, dec!(750));
    }

    #[test]
    fn test_merge_segments_sums_by_id() {
        let a = day((2024, 5, 1), &[("freelance", dec!(500)), ("parttime", dec!(300))]);
        let b = day((2024, 5, 2), &[("freelance", dec!(200))]);

        let merged = merge_segments(a.segments.iter().chain(b.segments.iter()));
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].id, "freelance");
        assert_eq!(merged[0].value, dec!(700));
        assert_eq!(merged[1].value, dec!(300));
    }

    #[test]
    fn test_merge_keeps_first_occurrence_metadata() {
        let first = IncomeSource {
            id: "freelance".to_string(),
            name: "Freelance".to_string(),
            value: dec!(100),
            color: "#FF6B6B".to_string(),
        };
        let renamed = IncomeSource {
            name: "Contract work".to_string(),
            value: dec!(50),
            ..first.clone()
        };

        let merged = merge_segments([&first, &renamed]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].name, "Freelance");
        assert_eq!(merged[0].value, dec!(150));
    }

    #[test]
    fn test_build_monthly_entry() {
        let days = vec![
            day((2024, 5, 1), &[("freelance", dec!(500))]),
            day((2024, 5, 14), &[("freelance", dec!(100)), ("other", dec!(50))]),
        ];
        let monthly = build_monthly_entry(2024, 5, &days).unwrap();
        assert_eq!(monthly.month_key, "2024-05");
        assert_eq!(monthly.progress, dec!(650));
        assert_eq!(monthly.segments.len(), 2);
        assert_eq!(monthly.segments[0].value, dec!(600));
    }

    #[test]
    fn test_build_monthly_entry_empty_month() {
        assert!(build_monthly_entry(2024, 5, &[]).is_none());
    }

    #[test]
    fn test_month_bounds() {
        let (first, last) = month_bounds(2024, 2).unwrap();
        assert_eq!(first, NaiveDate::from_ymd_opt(2024, 2, 1).unwrap());
        assert_eq!(last, NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());

        let (_, last) = month_bounds(2023, 12).unwrap();
        assert_eq!(last, NaiveDate::from_ymd_opt(2023, 12, 31).unwrap());

        assert!(month_bounds(2024, 13).is_err());
    }

    #[test]
    fn test_month_span_crosses_year_boundary() {
        let span = month_span(2023, 11, 2024, 2).unwrap();
        assert_eq!(span, vec![(2023, 11), (2023, 12), (2024, 1), (2024, 2)]);
        assert!(month_span(2024, 3, 2024, 1).unwrap().is_empty());
    }

    #[test]
    fn test_apply_source_update_targets_one_id() {
        let mut entry = day((2024, 5, 1), &[("freelance", dec!(500)), ("parttime", dec!(300))]);
        let update = IncomeSourceUpdate {
            name: Some("Contract work".to_string()),
            color: Some("#123456".to_string()),
        };

        assert!(apply_source_update(&mut entry, "freelance", &update));
        assert_eq!(entry.segments[0].name, "Contract work");
        assert_eq!(entry.segments[0].value, dec!(500));
        assert_eq!(entry.segments[1].name, "Part Time");

        assert!(!apply_source_update(&mut entry, "missing", &update));
    }
}
