//! CSV export and summary statistics over a (usually filtered) record set.

use std::collections::BTreeMap;
use std::io::Write;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Serialize;

use crate::models::{FeatureRecord, ReleaseStatus};

/// Column order of the CSV export. Changing it breaks downstream sheets.
pub const CSV_COLUMNS: [&str; 16] = [
    "release_plan_id",
    "product_name",
    "feature_name",
    "status",
    "investment_area",
    "release_wave",
    "ga_release_wave",
    "preview_release_wave",
    "early_access_date",
    "preview_date",
    "ga_date",
    "days_to_ga",
    "enabled_for",
    "last_updated",
    "business_value",
    "feature_details",
];

/// Days ahead counted as "GA soon" in the summary.
pub const UPCOMING_GA_DAYS: i64 = 30;

/// Write one CSV row per record, with a header row.
pub fn write_csv<'a, W, I>(writer: W, records: I, today: NaiveDate) -> Result<()>
where
    W: Write,
    I: IntoIterator<Item = &'a FeatureRecord>,
{
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(CSV_COLUMNS)?;

    for record in records {
        let date = |d: Option<NaiveDate>| {
            d.map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_default()
        };
        let text = |t: Option<&str>| t.unwrap_or_default().to_string();

        csv.write_record([
            record.release_plan_id.clone(),
            record.product_name.clone(),
            record.feature_name.clone(),
            record.status(today).label().to_string(),
            text(record.investment_area.as_deref()),
            text(record.release_wave()),
            text(record.ga_release_wave.as_deref()),
            text(record.preview_release_wave.as_deref()),
            date(record.early_access_date),
            date(record.preview_date),
            date(record.ga_date),
            record
                .days_to_ga(today)
                .map(|d| d.to_string())
                .unwrap_or_default(),
            text(record.enabled_for.as_deref()),
            date(record.last_updated),
            text(record.business_value.as_deref()),
            text(record.feature_details.as_deref()),
        ])
        .with_context(|| format!("Failed to write CSV row for {}", record.release_plan_id))?;
    }

    csv.flush()?;
    Ok(())
}

pub fn to_csv_string<'a, I>(records: I, today: NaiveDate) -> Result<String>
where
    I: IntoIterator<Item = &'a FeatureRecord>,
{
    let mut buf = Vec::new();
    write_csv(&mut buf, records, today)?;
    Ok(String::from_utf8(buf)?)
}

/// Headline numbers for a record set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub total: usize,
    pub by_status: BTreeMap<ReleaseStatus, usize>,
    pub by_product: BTreeMap<String, usize>,
    /// Keyed by the raw `Enabled for` text; records without one are left out.
    pub by_enabled_for: BTreeMap<String, usize>,
    pub by_wave: BTreeMap<String, usize>,
    /// Records whose GA date falls within the next [`UPCOMING_GA_DAYS`] days.
    pub upcoming_ga: usize,
    /// GA dates from the current month on, keyed `YYYY-MM`.
    pub upcoming_ga_by_month: BTreeMap<String, usize>,
    pub without_ga_date: usize,
}

pub fn summarize<'a, I>(records: I, today: NaiveDate) -> Summary
where
    I: IntoIterator<Item = &'a FeatureRecord>,
{
    let mut summary = Summary {
        by_status: ReleaseStatus::ALL.into_iter().map(|s| (s, 0)).collect(),
        ..Default::default()
    };

    for record in records {
        summary.total += 1;
        *summary.by_status.entry(record.status(today)).or_default() += 1;
        *summary
            .by_product
            .entry(record.product_name.clone())
            .or_default() += 1;

        if let Some(enabled_for) = record.enabled_for.as_deref() {
            *summary
                .by_enabled_for
                .entry(enabled_for.to_string())
                .or_default() += 1;
        }
        if let Some(wave) = record.release_wave() {
            *summary.by_wave.entry(wave.to_string()).or_default() += 1;
        }

        match record.days_to_ga(today) {
            Some(days) if (0..=UPCOMING_GA_DAYS).contains(&days) => summary.upcoming_ga += 1,
            Some(_) => {}
            None => summary.without_ga_date += 1,
        }

        if let Some(ga) = record.ga_date.filter(|ga| month_key(*ga) >= month_key(today)) {
            *summary.upcoming_ga_by_month.entry(month_key(ga)).or_default() += 1;
        }
    }

    summary
}

fn month_key(date: NaiveDate) -> String {
    date.format("%Y-%m").to_string()
}
