//! Portable document envelopes.
//!
//! Everything in here is expressed in stable identifiers only: catalog ids,
//! food tokens and plan uuids. Local row ids never appear, except for
//! `BackupDiet::id`, which is only meaningful inside the same document.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ExchangeError;
use crate::identity::{self, FoodReference};
use crate::models::{Food, Nutrients};

pub const FORMAT_VERSION: i64 = 1;

/// File extension for diet-share documents.
pub const DIET_SHARE_EXTENSION: &str = "diet";

/// File extension for full backups.
pub const BACKUP_EXTENSION: &str = "json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    DietShare,
    FullBackup,
    Unknown,
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentKind::DietShare => write!(f, "diet share"),
            DocumentKind::FullBackup => write!(f, "full backup"),
            DocumentKind::Unknown => write!(f, "unknown"),
        }
    }
}

/// Guess a document's kind from its top-level key names without decoding it.
#[must_use]
pub fn detect_document_kind(raw: &[u8]) -> DocumentKind {
    if contains(raw, b"\"diets\"") && contains(raw, b"\"daily_logs\"") {
        DocumentKind::FullBackup
    } else if contains(raw, b"\"diet\"") && contains(raw, b"\"entries\"") {
        DocumentKind::DietShare
    } else {
        DocumentKind::Unknown
    }
}

/// Extension first, then the key probe on the leading bytes.
#[must_use]
pub fn detect_file_kind(path: &Path, raw: &[u8]) -> DocumentKind {
    let is_diet_ext = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(DIET_SHARE_EXTENSION));
    if is_diet_ext {
        DocumentKind::DietShare
    } else {
        detect_document_kind(raw)
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomFoodPayload {
    pub uuid: String,
    pub taco_id: String,
    pub name: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(flatten)]
    pub nutrients: Nutrients,
}

impl CustomFoodPayload {
    /// Payload for a custom food whose token has already been resolved.
    #[must_use]
    pub fn from_food(food: &Food, token: &str) -> Self {
        Self {
            uuid: token.to_string(),
            taco_id: identity::portable_custom_id(&food.taco_id, token),
            name: food.name.clone(),
            category: food.category.clone(),
            nutrients: food.nutrients.clone(),
        }
    }
}

// --- Diet share ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SharedDiet {
    pub name: String,
    #[serde(default)]
    pub calorie_goal: Option<f64>,
    pub creation_date: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SharedEntry {
    pub food_ref: FoodReference,
    pub quantity_grams: f64,
    #[serde(default)]
    pub meal_type: Option<String>,
    #[serde(default)]
    pub consumption_time: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DietShareDocument {
    pub format_version: i64,
    pub exported_at: i64,
    pub diet: SharedDiet,
    pub entries: Vec<SharedEntry>,
    #[serde(default)]
    pub custom_foods: Vec<CustomFoodPayload>,
}

// --- Full backup ---

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub sex: Option<String>,
    #[serde(default)]
    pub age_years: Option<i64>,
    #[serde(default)]
    pub height_cm: Option<f64>,
    #[serde(default)]
    pub weight_kg: Option<f64>,
    #[serde(default)]
    pub activity_level: Option<String>,
    #[serde(default)]
    pub objective: Option<String>,
    #[serde(default)]
    pub water_goal_ml: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupDiet {
    pub id: i64,
    #[serde(default)]
    pub uuid: Option<String>,
    pub name: String,
    #[serde(default)]
    pub calorie_goal: Option<f64>,
    pub creation_date: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupDietItem {
    pub diet_id: i64,
    pub food_taco_id: String,
    pub quantity_grams: f64,
    #[serde(default)]
    pub meal_type: Option<String>,
    #[serde(default)]
    pub consumption_time: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupDailyLog {
    pub food_taco_id: String,
    pub date: String,
    pub quantity_grams: f64,
    #[serde(default)]
    pub meal_type: Option<String>,
    #[serde(default)]
    pub is_consumed: bool,
    #[serde(default)]
    pub original_quantity_grams: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupWaterLog {
    pub date: String,
    pub quantity_ml: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FullBackupDocument {
    pub format_version: i64,
    pub exported_at: i64,
    #[serde(default)]
    pub profile: Option<UserProfile>,
    #[serde(default)]
    pub custom_foods: Vec<CustomFoodPayload>,
    pub diets: Vec<BackupDiet>,
    #[serde(default)]
    pub diet_items: Vec<BackupDietItem>,
    pub daily_logs: Vec<BackupDailyLog>,
    #[serde(default)]
    pub water_logs: Vec<BackupWaterLog>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Document {
    DietShare(DietShareDocument),
    FullBackup(FullBackupDocument),
}

impl Document {
    /// Decode `bytes` as a document of the given kind. `Unknown` is tried as a
    /// diet share first, then as a full backup.
    pub fn decode(bytes: &[u8], kind: DocumentKind) -> Result<Self, ExchangeError> {
        match kind {
            DocumentKind::DietShare => serde_json::from_slice(bytes)
                .map(Document::DietShare)
                .map_err(|source| ExchangeError::Decode { kind, source }),
            DocumentKind::FullBackup => serde_json::from_slice(bytes)
                .map(Document::FullBackup)
                .map_err(|source| ExchangeError::Decode { kind, source }),
            DocumentKind::Unknown => serde_json::from_slice(bytes)
                .map(Document::DietShare)
                .or_else(|_| serde_json::from_slice(bytes).map(Document::FullBackup))
                .map_err(|source| ExchangeError::Decode { kind, source }),
        }
    }

    #[must_use]
    pub fn kind(&self) -> DocumentKind {
        match self {
            Document::DietShare(_) => DocumentKind::DietShare,
            Document::FullBackup(_) => DocumentKind::FullBackup,
        }
    }

    #[must_use]
    pub fn format_version(&self) -> i64 {
        match self {
            Document::DietShare(d) => d.format_version,
            Document::FullBackup(d) => d.format_version,
        }
    }

    #[must_use]
    pub fn custom_foods(&self) -> &[CustomFoodPayload] {
        match self {
            Document::DietShare(d) => &d.custom_foods,
            Document::FullBackup(d) => &d.custom_foods,
        }
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        match self {
            Document::DietShare(d) => serde_json::to_string_pretty(d),
            Document::FullBackup(d) => serde_json::to_string_pretty(d),
        }
    }

    pub fn write_json<W: std::io::Write>(&self, writer: W) -> serde_json::Result<()> {
        match self {
            Document::DietShare(d) => serde_json::to_writer_pretty(writer, d),
            Document::FullBackup(d) => serde_json::to_writer_pretty(writer, d),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHARE_JSON: &str = r#"{
        "format_version": 1,
        "exported_at": 1718000000000,
        "diet": {"name": "Cutting", "calorie_goal": 1800, "creation_date": 1717000000000},
        "entries": [
            {"food_ref": {"taco_id": "1", "uuid": null}, "quantity_grams": 150, "meal_type": "Almoço", "consumption_time": "12:30"}
        ],
        "custom_foods": []
    }"#;

    const BACKUP_JSON: &str = r#"{
        "format_version": 1,
        "exported_at": 1718000000000,
        "profile": {"name": "Ana", "weight_kg": 62.5},
        "custom_foods": [],
        "diets": [{"id": 4, "name": "Base", "calorie_goal": null, "creation_date": 1}],
        "diet_items": [{"diet_id": 4, "food_taco_id": "1", "quantity_grams": 100, "meal_type": null, "consumption_time": null}],
        "daily_logs": [{"food_taco_id": "1", "date": "2024-06-15", "quantity_grams": 80, "meal_type": "Jantar", "is_consumed": true, "original_quantity_grams": 100}],
        "water_logs": [{"date": "2024-06-15", "quantity_ml": 1500}]
    }"#;

    #[test]
    fn test_detect_document_kind() {
        assert_eq!(
            detect_document_kind(SHARE_JSON.as_bytes()),
            DocumentKind::DietShare
        );
        assert_eq!(
            detect_document_kind(BACKUP_JSON.as_bytes()),
            DocumentKind::FullBackup
        );
        assert_eq!(
            detect_document_kind(br#"{"foo": 1}"#),
            DocumentKind::Unknown
        );
        assert_eq!(detect_document_kind(b""), DocumentKind::Unknown);
    }

    #[test]
    fn test_detect_file_kind_prefers_extension() {
        let path = Path::new("/tmp/plan.diet");
        assert_eq!(detect_file_kind(path, b"garbage"), DocumentKind::DietShare);
        let path = Path::new("/tmp/backup.json");
        assert_eq!(
            detect_file_kind(path, BACKUP_JSON.as_bytes()),
            DocumentKind::FullBackup
        );
    }

    #[test]
    fn test_decode_diet_share() {
        let doc = Document::decode(SHARE_JSON.as_bytes(), DocumentKind::DietShare).unwrap();
        let Document::DietShare(share) = doc else {
            panic!("expected diet share");
        };
        assert_eq!(share.diet.name, "Cutting");
        assert_eq!(share.diet.calorie_goal, Some(1800.0));
        assert_eq!(share.entries.len(), 1);
        assert_eq!(share.entries[0].food_ref, FoodReference::official("1"));
    }

    #[test]
    fn test_decode_full_backup() {
        let doc = Document::decode(BACKUP_JSON.as_bytes(), DocumentKind::FullBackup).unwrap();
        let Document::FullBackup(backup) = doc else {
            panic!("expected full backup");
        };
        assert_eq!(backup.diets.len(), 1);
        assert!(backup.diets[0].uuid.is_none());
        assert_eq!(backup.daily_logs[0].date, "2024-06-15");
        assert_eq!(backup.profile.unwrap().weight_kg, Some(62.5));
    }

    #[test]
    fn test_decode_unknown_falls_back() {
        let doc = Document::decode(BACKUP_JSON.as_bytes(), DocumentKind::Unknown).unwrap();
        assert_eq!(doc.kind(), DocumentKind::FullBackup);
    }

    #[test]
    fn test_decode_error_hides_parser_detail() {
        let err = Document::decode(b"{not json", DocumentKind::DietShare).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("invalid file"));
        assert!(!message.contains("line"));
    }

    #[test]
    fn test_custom_payload_flattens_nutrients() {
        let payload = CustomFoodPayload {
            uuid: "t".to_string(),
            taco_id: "custom_t".to_string(),
            name: "Granola caseira".to_string(),
            category: None,
            nutrients: Nutrients {
                energia_kcal: Some(410.0),
                ..Nutrients::default()
            },
        };
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["energia_kcal"], serde_json::json!(410.0));
        let back: CustomFoodPayload = serde_json::from_value(value).unwrap();
        assert_eq!(back, payload);
    }
}
