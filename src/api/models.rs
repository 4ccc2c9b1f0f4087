use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::error::ApiError;

/// Categories known to the portal backend. The backend stays authoritative,
/// this list only feeds form hints and CLI validation.
pub const CATEGORIES: &[&str] = &[
    "Ceste",
    "Drevesa, rastje in zelene površine",
    "Parki in zelenice",
    "Javni red in mir",
    "Delo Mestnega redarstva",
    "Vzdrževanje cest",
    "Kolesarske poti",
    "LPP",
    "Pešpoti in pločniki",
    "Razno",
    "Umiritev prometa in varnost",
    "Vodovod",
    "Kultura",
    "Delo inšpekcij",
    "Avtobusna postajališča",
    "Oglaševanje ",
    "Športne površine",
    "Mirujoči promet",
    "Socialno varstvo in zdravje",
    "Informatika",
    "other",
];

/// Backend spelling of a category, matched after trimming. Unknown names are
/// returned trimmed.
pub fn canonical_category(wanted: &str) -> String {
    let wanted = wanted.trim();
    CATEGORIES
        .iter()
        .find(|c| c.trim() == wanted)
        .map(|c| c.to_string())
        .unwrap_or_else(|| wanted.to_string())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    #[serde(rename = "pending", alias = "v obravnavi")]
    Pending,
    #[serde(rename = "responded", alias = "odgovorjeno")]
    Responded,
}

impl Status {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "pending" | "unanswered" | "v obravnavi" => Some(Self::Pending),
            "responded" | "answered" | "odgovorjeno" => Some(Self::Responded),
            _ => None,
        }
    }

    /// Spelling the backend stores and filters on.
    pub fn query_value(self) -> &'static str {
        match self {
            Self::Pending => "v obravnavi",
            Self::Responded => "odgovorjeno",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Responded => "responded",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Initiative {
    pub id: u64,
    pub title: String,
    pub description: String,
    pub location: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub category: Option<String>,
    pub email: String,
    #[serde(default)]
    pub image_path: Option<String>,
    pub status: Status,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub response: Option<String>,
    #[serde(default, with = "timestamp::option")]
    pub responded_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyCount {
    pub date: NaiveDate,
    pub count: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statistics {
    pub total_pobude: u64,
    pub pending_pobude: u64,
    pub responded_pobude: u64,
    pub daily_stats: Vec<DailyCount>,
    pub response_stats: Vec<DailyCount>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SummaryStatistics {
    pub total_pobude: u64,
    pub pending_pobude: u64,
    pub responded_pobude: u64,
    pub response_rate: f64,
    #[serde(default)]
    pub average_response_time: Option<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CategoryStatistics {
    pub category: String,
    pub total: u64,
    pub pending: u64,
    pub responded: u64,
    pub response_rate: f64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthlyStatistics {
    pub month: String,
    pub total: u64,
    pub responded: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationStatistics {
    pub location: String,
    pub total: u64,
    pub responded: u64,
    pub pending: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PublicStatistics {
    pub summary: SummaryStatistics,
    pub category_stats: Vec<CategoryStatistics>,
    pub monthly_stats: Vec<MonthlyStatistics>,
    pub location_stats: Vec<LocationStatistics>,
    #[serde(default)]
    pub most_problematic_category: Option<CategoryStatistics>,
    #[serde(default)]
    pub least_problematic_category: Option<CategoryStatistics>,
}

/// Shape the prioritize endpoint accepts for each initiative.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PrioritizeItem {
    pub id: u64,
    pub title: String,
    pub description: String,
}

impl From<&Initiative> for PrioritizeItem {
    fn from(value: &Initiative) -> Self {
        Self {
            id: value.id,
            title: value.title.clone(),
            description: value.description.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct PrioritizedInitiative {
    pub id: u64,
    #[serde(default)]
    pub title: String,
    pub priority_score: i64,
    #[serde(default)]
    pub ai_analysis: Option<String>,
}

impl PrioritizedInitiative {
    pub fn score(&self) -> u8 {
        self.priority_score.clamp(0, 100) as u8
    }
}

#[derive(Clone, Serialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for LoginRequest {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("LoginRequest")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Clone, Deserialize)]
pub struct LoginResponse {
    pub token: String,
}

impl fmt::Debug for LoginResponse {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("LoginResponse")
            .field("token", &"<redacted>")
            .finish()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RespondRequest {
    pub response: String,
}

/// Fields of the multipart create request.
#[derive(Clone, Debug, PartialEq)]
pub struct NewInitiative {
    pub title: String,
    pub description: String,
    pub location: String,
    pub latitude: f64,
    pub longitude: f64,
    pub email: String,
    pub category: Option<String>,
    pub image: Option<PathBuf>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ListQuery {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    pub status: Option<Status>,
    pub category: Option<String>,
    pub search: Option<String>,
}

impl ListQuery {
    pub fn to_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(limit) = self.limit {
            pairs.push(("limit", limit.to_string()));
        }
        if let Some(offset) = self.offset {
            pairs.push(("offset", offset.to_string()));
        }
        if let Some(status) = self.status {
            pairs.push(("status", status.query_value().to_string()));
        }
        if let Some(category) = self.category.as_deref().filter(|c| !c.trim().is_empty()) {
            pairs.push(("category", category.to_string()));
        }
        if let Some(search) = self.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            pairs.push(("search", search.to_string()));
        }
        pairs
    }
}

/// Checks run on every decoded response before it reaches callers.
pub trait Validate {
    fn validate(&self) -> Result<(), ApiError>;
}

fn invalid(kind: &'static str, message: impl Into<String>) -> ApiError {
    ApiError::InvalidPayload {
        kind,
        message: message.into(),
    }
}

impl Validate for Initiative {
    fn validate(&self) -> Result<(), ApiError> {
        if !self.latitude.is_finite() || !(-90.0..=90.0).contains(&self.latitude) {
            return Err(invalid(
                "initiative",
                format!("id {} has latitude {} out of range", self.id, self.latitude),
            ));
        }
        if !self.longitude.is_finite() || !(-180.0..=180.0).contains(&self.longitude) {
            return Err(invalid(
                "initiative",
                format!(
                    "id {} has longitude {} out of range",
                    self.id, self.longitude
                ),
            ));
        }
        Ok(())
    }
}

impl Validate for Statistics {
    fn validate(&self) -> Result<(), ApiError> {
        if self.pending_pobude + self.responded_pobude > self.total_pobude {
            return Err(invalid(
                "statistics",
                format!(
                    "pending ({}) + responded ({}) exceeds total ({})",
                    self.pending_pobude, self.responded_pobude, self.total_pobude
                ),
            ));
        }
        Ok(())
    }
}

fn check_rate(kind: &'static str, rate: f64) -> Result<(), ApiError> {
    if !rate.is_finite() || !(0.0..=100.0).contains(&rate) {
        return Err(invalid(kind, format!("response rate {rate} out of range")));
    }
    Ok(())
}

impl Validate for PublicStatistics {
    fn validate(&self) -> Result<(), ApiError> {
        check_rate("public statistics", self.summary.response_rate)?;
        for c in self.category_stats.iter() {
            check_rate("category statistics", c.response_rate)?;
        }
        Ok(())
    }
}

impl Validate for PrioritizedInitiative {
    fn validate(&self) -> Result<(), ApiError> {
        Ok(())
    }
}

impl Validate for LoginResponse {
    fn validate(&self) -> Result<(), ApiError> {
        if self.token.trim().is_empty() {
            return Err(invalid("login response", "token is empty"));
        }
        Ok(())
    }
}

impl Validate for String {
    fn validate(&self) -> Result<(), ApiError> {
        Ok(())
    }
}

impl<T: Validate> Validate for Vec<T> {
    fn validate(&self) -> Result<(), ApiError> {
        self.iter().try_for_each(Validate::validate)
    }
}

/// Backend timestamps come with or without an offset; naive values are UTC.
pub(crate) mod timestamp {
    use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
        let raw = raw.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(dt.with_timezone(&Utc));
        }
        ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
            .map(|naive| Utc.from_utc_datetime(&naive))
    }

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&value.to_rfc3339())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        parse(&raw).ok_or_else(|| de::Error::custom(format!("invalid timestamp '{raw}'")))
    }

    pub mod option {
        use chrono::{DateTime, Utc};
        use serde::{de, Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            value: &Option<DateTime<Utc>>,
            s: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(v) => s.serialize_some(&v.to_rfc3339()),
                None => s.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            d: D,
        ) -> Result<Option<DateTime<Utc>>, D::Error> {
            match Option::<String>::deserialize(d)? {
                Some(raw) => super::parse(&raw)
                    .map(Some)
                    .ok_or_else(|| de::Error::custom(format!("invalid timestamp '{raw}'"))),
                None => Ok(None),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};
    use serde_json::json;

    #[test]
    fn canonical_category_restores_backend_spelling() {
        assert_eq!(canonical_category("Oglaševanje"), "Oglaševanje ");
        assert_eq!(canonical_category("  Ceste "), "Ceste");
        assert_eq!(canonical_category("Nova kategorija "), "Nova kategorija");
    }

    fn initiative_json() -> serde_json::Value {
        json!({
            "id": 7,
            "title": "Luknja na cesti",
            "description": "Velika luknja pred šolo.",
            "location": "Dunajska cesta 5, Ljubljana",
            "latitude": 46.07,
            "longitude": 14.51,
            "email": "obcan@example.com",
            "image_path": null,
            "status": "v obravnavi",
            "created_at": "2025-05-20T10:15:30.123456",
            "response": null,
            "responded_at": null
        })
    }

    #[test]
    fn decodes_backend_initiative_with_slovene_status() {
        let item: Initiative = serde_json::from_value(initiative_json()).unwrap();
        assert_eq!(item.id, 7);
        assert_eq!(item.status, Status::Pending);
        assert_eq!(item.category, None);
        assert_eq!(item.created_at.year(), 2025);
        assert_eq!(item.created_at.hour(), 10);
        assert!(item.responded_at.is_none());
        assert!(item.validate().is_ok());
    }

    #[test]
    fn decodes_english_status_and_offset_timestamps() {
        let mut value = initiative_json();
        value["status"] = json!("responded");
        value["responded_at"] = json!("2025-05-21T08:00:00+02:00");
        let item: Initiative = serde_json::from_value(value).unwrap();
        assert_eq!(item.status, Status::Responded);
        assert_eq!(item.responded_at.unwrap().hour(), 6);
    }

    #[test]
    fn rejects_missing_required_fields() {
        let mut value = initiative_json();
        value.as_object_mut().unwrap().remove("status");
        assert!(serde_json::from_value::<Initiative>(value).is_err());
    }

    #[test]
    fn rejects_unknown_status_and_bad_timestamp() {
        let mut value = initiative_json();
        value["status"] = json!("approved");
        assert!(serde_json::from_value::<Initiative>(value).is_err());

        let mut value = initiative_json();
        value["created_at"] = json!("yesterday");
        assert!(serde_json::from_value::<Initiative>(value).is_err());
    }

    #[test]
    fn validation_flags_out_of_range_coordinates() {
        let mut value = initiative_json();
        value["latitude"] = json!(123.0);
        let item: Initiative = serde_json::from_value(value).unwrap();
        assert!(matches!(
            item.validate(),
            Err(ApiError::InvalidPayload { kind: "initiative", .. })
        ));
        assert!(vec![item].validate().is_err());
    }

    #[test]
    fn statistics_totals_must_add_up() {
        let stats = Statistics {
            total_pobude: 3,
            pending_pobude: 2,
            responded_pobude: 2,
            daily_stats: Vec::new(),
            response_stats: Vec::new(),
        };
        assert!(stats.validate().is_err());
    }

    #[test]
    fn public_statistics_decode_with_nullable_fields() {
        let value = json!({
            "summary": {
                "total_pobude": 10,
                "pending_pobude": 4,
                "responded_pobude": 6,
                "response_rate": 60.0,
                "average_response_time": null
            },
            "category_stats": [
                {"category": "Ceste", "total": 10, "pending": 4, "responded": 6, "response_rate": 60.0}
            ],
            "monthly_stats": [{"month": "2025-05", "total": 10, "responded": 6}],
            "location_stats": [{"location": "Vič", "total": 2, "responded": 1, "pending": 1}],
            "most_problematic_category": null,
            "least_problematic_category": null
        });
        let stats: PublicStatistics = serde_json::from_value(value).unwrap();
        assert!(stats.validate().is_ok());
        assert_eq!(stats.summary.average_response_time, None);
        assert_eq!(stats.monthly_stats[0].month, "2025-05");
    }

    #[test]
    fn prioritized_scores_are_clamped() {
        let item = PrioritizedInitiative {
            id: 1,
            title: String::new(),
            priority_score: 140,
            ai_analysis: None,
        };
        assert_eq!(item.score(), 100);
        let item = PrioritizedInitiative {
            priority_score: -5,
            ..item
        };
        assert_eq!(item.score(), 0);
    }

    #[test]
    fn list_query_pairs_use_backend_status_spelling_and_skip_blanks() {
        let query = ListQuery {
            limit: Some(20),
            offset: Some(40),
            status: Some(Status::Responded),
            category: Some(String::new()),
            search: Some("  ".to_string()),
        };
        assert_eq!(
            query.to_pairs(),
            vec![
                ("limit", "20".to_string()),
                ("offset", "40".to_string()),
                ("status", "odgovorjeno".to_string()),
            ]
        );
    }

    #[test]
    fn login_request_debug_redacts_password() {
        let req = LoginRequest {
            username: "admin".to_string(),
            password: "hunter2".to_string(),
        };
        let rendered = format!("{req:?}");
        assert!(rendered.contains("admin"));
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn status_parse_accepts_both_spellings() {
        assert_eq!(Status::parse("Unanswered"), Some(Status::Pending));
        assert_eq!(Status::parse("odgovorjeno"), Some(Status::Responded));
        assert_eq!(Status::parse("approved"), None);
    }
}
