use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::record::FeatureRecord;

/// A record field watched for changes between snapshots.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TrackedField {
    GaDate,
    PreviewDate,
    EarlyAccessDate,
    ReleaseWave,
    BusinessValue,
    FeatureDetails,
    EnabledFor,
    InvestmentArea,
}

impl TrackedField {
    /// Comparison order used when emitting change events.
    pub const ALL: [TrackedField; 8] = [
        Self::GaDate,
        Self::PreviewDate,
        Self::EarlyAccessDate,
        Self::ReleaseWave,
        Self::BusinessValue,
        Self::FeatureDetails,
        Self::EnabledFor,
        Self::InvestmentArea,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GaDate => "ga_date",
            Self::PreviewDate => "preview_date",
            Self::EarlyAccessDate => "early_access_date",
            Self::ReleaseWave => "release_wave",
            Self::BusinessValue => "business_value",
            Self::FeatureDetails => "feature_details",
            Self::EnabledFor => "enabled_for",
            Self::InvestmentArea => "investment_area",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.as_str() == s)
    }

    pub fn change_type(&self) -> ChangeType {
        match self {
            Self::GaDate => ChangeType::GaDateChanged,
            Self::PreviewDate => ChangeType::PreviewDateChanged,
            Self::EarlyAccessDate => ChangeType::EarlyAccessDateChanged,
            Self::ReleaseWave => ChangeType::ReleaseWaveChanged,
            Self::BusinessValue => ChangeType::BusinessValueChanged,
            Self::FeatureDetails => ChangeType::FeatureDetailsChanged,
            Self::EnabledFor => ChangeType::EnabledForChanged,
            Self::InvestmentArea => ChangeType::InvestmentAreaChanged,
        }
    }

    /// The field's value in comparable form: dates as `YYYY-MM-DD`, text
    /// trimmed, blank text absent.
    pub fn value(&self, record: &FeatureRecord) -> Option<String> {
        let date = |d: Option<chrono::NaiveDate>| d.map(|d| d.format("%Y-%m-%d").to_string());
        let text = |t: Option<&str>| {
            t.map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
        };

        match self {
            Self::GaDate => date(record.ga_date),
            Self::PreviewDate => date(record.preview_date),
            Self::EarlyAccessDate => date(record.early_access_date),
            Self::ReleaseWave => text(record.release_wave()),
            Self::BusinessValue => text(record.business_value.as_deref()),
            Self::FeatureDetails => text(record.feature_details.as_deref()),
            Self::EnabledFor => text(record.enabled_for.as_deref()),
            Self::InvestmentArea => text(record.investment_area.as_deref()),
        }
    }
}

/// The kind of change detected between two snapshots.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeType {
    GaDateChanged,
    PreviewDateChanged,
    EarlyAccessDateChanged,
    ReleaseWaveChanged,
    BusinessValueChanged,
    FeatureDetailsChanged,
    EnabledForChanged,
    InvestmentAreaChanged,
    NewFeature,
}

impl ChangeType {
    pub const ALL: [ChangeType; 9] = [
        Self::GaDateChanged,
        Self::PreviewDateChanged,
        Self::EarlyAccessDateChanged,
        Self::ReleaseWaveChanged,
        Self::BusinessValueChanged,
        Self::FeatureDetailsChanged,
        Self::EnabledForChanged,
        Self::InvestmentAreaChanged,
        Self::NewFeature,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GaDateChanged => "GA_DATE_CHANGED",
            Self::PreviewDateChanged => "PREVIEW_DATE_CHANGED",
            Self::EarlyAccessDateChanged => "EARLY_ACCESS_DATE_CHANGED",
            Self::ReleaseWaveChanged => "RELEASE_WAVE_CHANGED",
            Self::BusinessValueChanged => "BUSINESS_VALUE_CHANGED",
            Self::FeatureDetailsChanged => "FEATURE_DETAILS_CHANGED",
            Self::EnabledForChanged => "ENABLED_FOR_CHANGED",
            Self::InvestmentAreaChanged => "INVESTMENT_AREA_CHANGED",
            Self::NewFeature => "NEW_FEATURE",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == s)
    }

    pub fn category(&self) -> ChangeCategory {
        match self {
            Self::NewFeature => ChangeCategory::NewFeature,
            Self::GaDateChanged | Self::PreviewDateChanged | Self::EarlyAccessDateChanged => {
                ChangeCategory::Date
            }
            Self::ReleaseWaveChanged => ChangeCategory::Wave,
            Self::BusinessValueChanged | Self::FeatureDetailsChanged => {
                ChangeCategory::Description
            }
            Self::EnabledForChanged | Self::InvestmentAreaChanged => ChangeCategory::Status,
        }
    }
}

/// Coarse grouping of change types for change-log summaries.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ChangeCategory {
    NewFeature,
    Date,
    Wave,
    Description,
    Status,
}

impl ChangeCategory {
    pub const ALL: [ChangeCategory; 5] = [
        Self::NewFeature,
        Self::Date,
        Self::Wave,
        Self::Description,
        Self::Status,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NewFeature => "new_feature",
            Self::Date => "date",
            Self::Wave => "wave",
            Self::Description => "description",
            Self::Status => "status",
        }
    }
}

/// Change-log counts since a cutoff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSummary {
    pub since: DateTime<Utc>,
    pub total: usize,
    /// Distinct features with at least one change.
    pub features: usize,
    pub by_category: BTreeMap<ChangeCategory, usize>,
    pub by_type: BTreeMap<ChangeType, usize>,
}

impl ChangeSummary {
    /// A summary with every category and type present at zero.
    pub fn empty(since: DateTime<Utc>) -> Self {
        Self {
            since,
            total: 0,
            features: 0,
            by_category: ChangeCategory::ALL.into_iter().map(|c| (c, 0)).collect(),
            by_type: ChangeType::ALL.into_iter().map(|t| (t, 0)).collect(),
        }
    }

    pub fn add(&mut self, change_type: ChangeType, count: usize) {
        self.total += count;
        *self.by_type.entry(change_type).or_default() += count;
        *self.by_category.entry(change_type.category()).or_default() += count;
    }
}

/// Start of a look-back window of `days` days ending at `now`.
///
/// `None` when `days` is negative or the window reaches outside the
/// representable date range.
pub fn window_start(now: DateTime<Utc>, days: i64) -> Option<DateTime<Utc>> {
    if days < 0 {
        return None;
    }
    now.checked_sub_signed(Duration::try_days(days)?)
}

/// A single detected difference between two snapshots.
///
/// Change events are produced only by the differ and are append-only once
/// persisted. A `NewFeature` event has no field and no old value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub release_plan_id: String,
    pub field: Option<TrackedField>,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub change_type: ChangeType,
    pub detected_at: DateTime<Utc>,
    /// Display context, copied from the current record.
    pub feature_name: String,
    pub product_name: String,
}

/// A persisted change event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeLogEntry {
    pub id: Uuid,
    #[serde(flatten)]
    pub event: ChangeEvent,
    pub category: ChangeCategory,
}
