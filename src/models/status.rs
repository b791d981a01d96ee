use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// The lifecycle stage of a release-plan feature.
///
/// - `Planned`: no milestone date has passed yet
/// - `EarlyAccess`: the early access date has passed
/// - `PublicPreview`: the public preview date has passed
/// - `GenerallyAvailable`: the GA date has passed
///
/// Variants are declared in lifecycle order, so `Ord` compares stages.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseStatus {
    Planned,
    EarlyAccess,
    PublicPreview,
    GenerallyAvailable,
}

impl ReleaseStatus {
    pub const ALL: [ReleaseStatus; 4] = [
        Self::GenerallyAvailable,
        Self::PublicPreview,
        Self::EarlyAccess,
        Self::Planned,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Planned => "planned",
            Self::EarlyAccess => "early_access",
            Self::PublicPreview => "public_preview",
            Self::GenerallyAvailable => "generally_available",
        }
    }

    /// Human-readable name, as shown by the release planner.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Planned => "Planned",
            Self::EarlyAccess => "Early Access",
            Self::PublicPreview => "Public Preview",
            Self::GenerallyAvailable => "Generally Available",
        }
    }

    /// Parse either the wire name (`public_preview`) or the label (`Public Preview`).
    pub fn from_str(s: &str) -> Option<Self> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s || status.label().eq_ignore_ascii_case(s))
    }
}

/// Derive the lifecycle stage from the three milestone dates.
///
/// The latest milestone that has been reached wins. Absent dates never count
/// as reached.
pub fn derive_status(
    early_access: Option<NaiveDate>,
    preview: Option<NaiveDate>,
    ga: Option<NaiveDate>,
    today: NaiveDate,
) -> ReleaseStatus {
    let reached = |date: Option<NaiveDate>| date.is_some_and(|d| d <= today);

    if reached(ga) {
        ReleaseStatus::GenerallyAvailable
    } else if reached(preview) {
        ReleaseStatus::PublicPreview
    } else if reached(early_access) {
        ReleaseStatus::EarlyAccess
    } else {
        ReleaseStatus::Planned
    }
}

/// Signed number of days from `today` until GA. Negative once GA has passed.
pub fn days_to_ga(ga: Option<NaiveDate>, today: NaiveDate) -> Option<i64> {
    ga.map(|ga| (ga - today).num_days())
}
