use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::status::{days_to_ga, derive_status, ReleaseStatus};

/// Base URL of the public release planner, used for search links.
const RELEASE_PLANNER_URL: &str = "https://releaseplans.microsoft.com/en-us/";

/// One release-plan entry from the feed.
///
/// Records are replaced wholesale on every fetch; nothing mutates them in
/// place. Every descriptive field is optional because the feed routinely
/// omits them, and a missing date is a normal state ("not scheduled yet"),
/// never an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureRecord {
    /// Release-plan identifier, unique within a snapshot.
    pub release_plan_id: String,
    pub product_id: Option<String>,
    pub product_name: String,
    pub feature_name: String,
    pub investment_area: Option<String>,
    pub business_value: Option<String>,
    pub feature_details: Option<String>,
    /// Who the feature is enabled for (users, admins, ...).
    pub enabled_for: Option<String>,
    pub ga_release_wave: Option<String>,
    pub preview_release_wave: Option<String>,
    pub early_access_date: Option<NaiveDate>,
    pub preview_date: Option<NaiveDate>,
    pub ga_date: Option<NaiveDate>,
    /// Date of the last upstream edit to this entry.
    pub last_updated: Option<NaiveDate>,
}

impl FeatureRecord {
    /// Create a record with only the required fields set.
    pub fn new(
        release_plan_id: impl Into<String>,
        product_name: impl Into<String>,
        feature_name: impl Into<String>,
    ) -> Self {
        Self {
            release_plan_id: release_plan_id.into(),
            product_id: None,
            product_name: product_name.into(),
            feature_name: feature_name.into(),
            investment_area: None,
            business_value: None,
            feature_details: None,
            enabled_for: None,
            ga_release_wave: None,
            preview_release_wave: None,
            early_access_date: None,
            preview_date: None,
            ga_date: None,
            last_updated: None,
        }
    }

    /// The combined release wave: the GA wave when present, otherwise the
    /// public preview wave.
    pub fn release_wave(&self) -> Option<&str> {
        self.ga_release_wave
            .as_deref()
            .or(self.preview_release_wave.as_deref())
    }

    pub fn status(&self, today: NaiveDate) -> ReleaseStatus {
        derive_status(
            self.early_access_date,
            self.preview_date,
            self.ga_date,
            today,
        )
    }

    pub fn days_to_ga(&self, today: NaiveDate) -> Option<i64> {
        days_to_ga(self.ga_date, today)
    }

    /// All textual attributes, used by free-text search.
    pub fn text_fields(&self) -> impl Iterator<Item = &str> {
        [
            Some(self.release_plan_id.as_str()),
            Some(self.product_name.as_str()),
            Some(self.feature_name.as_str()),
            self.investment_area.as_deref(),
            self.business_value.as_deref(),
            self.feature_details.as_deref(),
            self.enabled_for.as_deref(),
            self.ga_release_wave.as_deref(),
            self.preview_release_wave.as_deref(),
        ]
        .into_iter()
        .flatten()
    }

    /// Link to this feature in the public release planner.
    pub fn search_link(&self) -> Option<String> {
        let app = self
            .product_name
            .replace("Dynamics 365 ", "")
            .replace("Microsoft ", "");
        reqwest::Url::parse_with_params(
            RELEASE_PLANNER_URL,
            &[("app", app.trim()), ("q", self.feature_name.as_str())],
        )
        .ok()
        .map(String::from)
    }

    /// Build the read-side view of this record for the given day.
    pub fn view(&self, today: NaiveDate) -> FeatureView {
        FeatureView {
            record: self.clone(),
            status: self.status(today),
            release_wave: self.release_wave().map(str::to_string),
            days_to_ga: self.days_to_ga(today),
            search_link: self.search_link(),
        }
    }
}

/// A record plus the values derived from it on read.
///
/// The record fields are flattened into the JSON response. Status is never
/// stored; it is recomputed against `today` every time a view is built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureView {
    #[serde(flatten)]
    pub record: FeatureRecord,
    pub status: ReleaseStatus,
    pub release_wave: Option<String>,
    pub days_to_ga: Option<i64>,
    pub search_link: Option<String>,
}
