//! Pre-flight checks for documents that came from outside this install.
//!
//! Nothing here touches the database. `validate` stops at the first rule a
//! document breaks and reports the field path and offending value.

use thiserror::Error;

use crate::document::{
    CustomFoodPayload, DietShareDocument, Document, FORMAT_VERSION, FullBackupDocument,
    UserProfile,
};
use crate::identity::{self, FoodReference};
use crate::models::{NutrientClass, parse_consumption_time, parse_log_date};

/// Bounds applied to imported documents.
#[derive(Debug, Clone)]
pub struct Limits {
    pub max_document_bytes: u64,
    pub max_entries: usize,
    pub max_backup_rows: usize,
    pub max_custom_foods: usize,
    pub max_diets: usize,
    pub max_string_len: usize,
    pub max_name_len: usize,
    pub max_quantity_grams: f64,
    pub max_calorie_goal: f64,
    pub max_water_ml: f64,
    pub max_kcal: f64,
    pub max_kj: f64,
    pub max_grams: f64,
    pub max_mg: f64,
    pub max_mcg: f64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_document_bytes: 10 * 1024 * 1024,
            max_entries: 5_000,
            max_backup_rows: 200_000,
            max_custom_foods: 2_000,
            max_diets: 500,
            max_string_len: 200,
            max_name_len: 120,
            max_quantity_grams: 10_000.0,
            max_calorie_goal: 20_000.0,
            max_water_ml: 20_000.0,
            max_kcal: 1_000.0,
            max_kj: 4_200.0,
            max_grams: 100.0,
            max_mg: 100_000.0,
            max_mcg: 100_000_000.0,
        }
    }
}

impl Limits {
    #[must_use]
    pub fn nutrient_ceiling(&self, class: NutrientClass) -> f64 {
        match class {
            NutrientClass::Kcal => self.max_kcal,
            NutrientClass::Kilojoule => self.max_kj,
            NutrientClass::Grams | NutrientClass::Percent => self.max_grams,
            NutrientClass::Milligrams => self.max_mg,
            NutrientClass::Micrograms => self.max_mcg,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("file is {size} bytes; the maximum is {max}")]
    TooLarge { size: u64, max: u64 },

    #[error("format version {found} is not supported (this app reads up to {supported})")]
    UnsupportedVersion { found: i64, supported: i64 },

    #[error("too many {what}: {count} (maximum {max})")]
    TooMany {
        what: &'static str,
        count: usize,
        max: usize,
    },

    #[error("{field} is {len} characters long (maximum {max})")]
    StringTooLong {
        field: String,
        len: usize,
        max: usize,
    },

    #[error("{field} must not be empty")]
    Empty { field: String },

    #[error("{field} is not a finite number ({value})")]
    NotFinite { field: String, value: f64 },

    #[error("{field} = {value} is outside the allowed range 0..={max}")]
    OutOfRange { field: String, value: f64, max: f64 },

    #[error("{field} must set exactly one of taco_id or uuid")]
    InvalidReference { field: String },

    #[error("{field} = '{value}' is not a custom food identifier")]
    NotCustomIdentifier { field: String, value: String },

    #[error("{field} = '{value}' is not a valid date (YYYY-MM-DD)")]
    InvalidDate { field: String, value: String },

    #[error("{field} = '{value}' is not a valid time (HH:MM)")]
    InvalidTime { field: String, value: String },
}

/// A document that passed [`validate`]. Only the validator can build one,
/// and the importer only accepts this type.
#[derive(Debug, Clone, Copy)]
pub struct Validated<'a> {
    document: &'a Document,
}

impl<'a> Validated<'a> {
    #[must_use]
    pub fn document(&self) -> &'a Document {
        self.document
    }
}

/// Reject a source by its byte length before it is decoded.
pub fn check_size(size: u64, limits: &Limits) -> Result<(), ValidationError> {
    if size > limits.max_document_bytes {
        return Err(ValidationError::TooLarge {
            size,
            max: limits.max_document_bytes,
        });
    }
    Ok(())
}

pub fn validate<'a>(
    document: &'a Document,
    limits: &Limits,
) -> Result<Validated<'a>, ValidationError> {
    let version = document.format_version();
    if !(1..=FORMAT_VERSION).contains(&version) {
        return Err(ValidationError::UnsupportedVersion {
            found: version,
            supported: FORMAT_VERSION,
        });
    }
    let checker = Checker { limits };
    match document {
        Document::DietShare(doc) => checker.diet_share(doc)?,
        Document::FullBackup(doc) => checker.full_backup(doc)?,
    }
    Ok(Validated { document })
}

struct Checker<'l> {
    limits: &'l Limits,
}

impl Checker<'_> {
    fn diet_share(&self, doc: &DietShareDocument) -> Result<(), ValidationError> {
        self.count("entries", doc.entries.len(), self.limits.max_entries)?;
        self.custom_foods(&doc.custom_foods)?;

        self.name("diet.name", &doc.diet.name)?;
        if let Some(goal) = doc.diet.calorie_goal {
            self.number("diet.calorie_goal", goal, self.limits.max_calorie_goal)?;
        }

        for (i, entry) in doc.entries.iter().enumerate() {
            self.reference(&format!("entries[{i}].food_ref"), &entry.food_ref)?;
            self.number(
                &format!("entries[{i}].quantity_grams"),
                entry.quantity_grams,
                self.limits.max_quantity_grams,
            )?;
            self.opt_string(&format!("entries[{i}].meal_type"), entry.meal_type.as_deref())?;
            self.opt_time(
                &format!("entries[{i}].consumption_time"),
                entry.consumption_time.as_deref(),
            )?;
        }
        Ok(())
    }

    fn full_backup(&self, doc: &FullBackupDocument) -> Result<(), ValidationError> {
        let max_rows = self.limits.max_backup_rows;
        self.count("diets", doc.diets.len(), self.limits.max_diets)?;
        self.count("diet_items", doc.diet_items.len(), max_rows)?;
        self.count("daily_logs", doc.daily_logs.len(), max_rows)?;
        self.count("water_logs", doc.water_logs.len(), max_rows)?;
        self.custom_foods(&doc.custom_foods)?;

        if let Some(profile) = &doc.profile {
            self.profile(profile)?;
        }

        for (i, diet) in doc.diets.iter().enumerate() {
            self.name(&format!("diets[{i}].name"), &diet.name)?;
            self.opt_string(&format!("diets[{i}].uuid"), diet.uuid.as_deref())?;
            if let Some(goal) = diet.calorie_goal {
                self.number(
                    &format!("diets[{i}].calorie_goal"),
                    goal,
                    self.limits.max_calorie_goal,
                )?;
            }
        }

        for (i, item) in doc.diet_items.iter().enumerate() {
            self.catalog_id(&format!("diet_items[{i}].food_taco_id"), &item.food_taco_id)?;
            self.number(
                &format!("diet_items[{i}].quantity_grams"),
                item.quantity_grams,
                self.limits.max_quantity_grams,
            )?;
            self.opt_string(&format!("diet_items[{i}].meal_type"), item.meal_type.as_deref())?;
            self.opt_time(
                &format!("diet_items[{i}].consumption_time"),
                item.consumption_time.as_deref(),
            )?;
        }

        for (i, log) in doc.daily_logs.iter().enumerate() {
            self.catalog_id(&format!("daily_logs[{i}].food_taco_id"), &log.food_taco_id)?;
            self.date(&format!("daily_logs[{i}].date"), &log.date)?;
            self.number(
                &format!("daily_logs[{i}].quantity_grams"),
                log.quantity_grams,
                self.limits.max_quantity_grams,
            )?;
            if let Some(original) = log.original_quantity_grams {
                self.number(
                    &format!("daily_logs[{i}].original_quantity_grams"),
                    original,
                    self.limits.max_quantity_grams,
                )?;
            }
            self.opt_string(&format!("daily_logs[{i}].meal_type"), log.meal_type.as_deref())?;
        }

        for (i, water) in doc.water_logs.iter().enumerate() {
            self.date(&format!("water_logs[{i}].date"), &water.date)?;
            self.number(
                &format!("water_logs[{i}].quantity_ml"),
                water.quantity_ml,
                self.limits.max_water_ml,
            )?;
        }
        Ok(())
    }

    fn custom_foods(&self, foods: &[CustomFoodPayload]) -> Result<(), ValidationError> {
        self.count("custom_foods", foods.len(), self.limits.max_custom_foods)?;
        for (i, food) in foods.iter().enumerate() {
            let prefix = format!("custom_foods[{i}]");
            self.string(&format!("{prefix}.uuid"), &food.uuid)?;
            self.string(&format!("{prefix}.taco_id"), &food.taco_id)?;
            if !identity::is_custom_taco_id(&food.taco_id) {
                return Err(ValidationError::NotCustomIdentifier {
                    field: format!("{prefix}.taco_id"),
                    value: food.taco_id.clone(),
                });
            }
            self.name(&format!("{prefix}.name"), &food.name)?;
            self.opt_string(&format!("{prefix}.category"), food.category.as_deref())?;
            for (column, class, value) in food.nutrients.iter() {
                if let Some(value) = value {
                    self.number(
                        &format!("{prefix}.{column}"),
                        value,
                        self.limits.nutrient_ceiling(class),
                    )?;
                }
            }
        }
        Ok(())
    }

    fn profile(&self, profile: &UserProfile) -> Result<(), ValidationError> {
        self.opt_string("profile.name", profile.name.as_deref())?;
        self.opt_string("profile.sex", profile.sex.as_deref())?;
        self.opt_string("profile.activity_level", profile.activity_level.as_deref())?;
        self.opt_string("profile.objective", profile.objective.as_deref())?;
        if let Some(age) = profile.age_years {
            #[allow(clippy::cast_precision_loss)]
            let age = age as f64;
            self.number("profile.age_years", age, 150.0)?;
        }
        if let Some(height) = profile.height_cm {
            self.number("profile.height_cm", height, 300.0)?;
        }
        if let Some(weight) = profile.weight_kg {
            self.number("profile.weight_kg", weight, 700.0)?;
        }
        if let Some(goal) = profile.water_goal_ml {
            self.number("profile.water_goal_ml", goal, self.limits.max_water_ml)?;
        }
        Ok(())
    }

    fn count(&self, what: &'static str, count: usize, max: usize) -> Result<(), ValidationError> {
        if count > max {
            return Err(ValidationError::TooMany { what, count, max });
        }
        Ok(())
    }

    fn number(&self, field: &str, value: f64, max: f64) -> Result<(), ValidationError> {
        if !value.is_finite() {
            return Err(ValidationError::NotFinite {
                field: field.to_string(),
                value,
            });
        }
        if !(0.0..=max).contains(&value) {
            return Err(ValidationError::OutOfRange {
                field: field.to_string(),
                value,
                max,
            });
        }
        Ok(())
    }

    fn string(&self, field: &str, value: &str) -> Result<(), ValidationError> {
        if value.trim().is_empty() {
            return Err(ValidationError::Empty {
                field: field.to_string(),
            });
        }
        self.length(field, value, self.limits.max_string_len)
    }

    fn name(&self, field: &str, value: &str) -> Result<(), ValidationError> {
        if value.trim().is_empty() {
            return Err(ValidationError::Empty {
                field: field.to_string(),
            });
        }
        self.length(field, value, self.limits.max_name_len)
    }

    fn opt_string(&self, field: &str, value: Option<&str>) -> Result<(), ValidationError> {
        match value {
            Some(v) => self.length(field, v, self.limits.max_string_len),
            None => Ok(()),
        }
    }

    fn length(&self, field: &str, value: &str, max: usize) -> Result<(), ValidationError> {
        let len = value.chars().count();
        if len > max {
            return Err(ValidationError::StringTooLong {
                field: field.to_string(),
                len,
                max,
            });
        }
        Ok(())
    }

    fn catalog_id(&self, field: &str, value: &str) -> Result<(), ValidationError> {
        self.string(field, value)
    }

    fn reference(&self, field: &str, reference: &FoodReference) -> Result<(), ValidationError> {
        if reference.classify().is_none() {
            return Err(ValidationError::InvalidReference {
                field: field.to_string(),
            });
        }
        self.opt_string(&format!("{field}.taco_id"), reference.taco_id.as_deref())?;
        self.opt_string(&format!("{field}.uuid"), reference.uuid.as_deref())
    }

    fn date(&self, field: &str, value: &str) -> Result<(), ValidationError> {
        if value.len() > 10 || parse_log_date(value).is_err() {
            return Err(ValidationError::InvalidDate {
                field: field.to_string(),
                value: truncated(value),
            });
        }
        Ok(())
    }

    fn opt_time(&self, field: &str, value: Option<&str>) -> Result<(), ValidationError> {
        let Some(value) = value else {
            return Ok(());
        };
        if value.len() > 5 || parse_consumption_time(value).is_err() {
            return Err(ValidationError::InvalidTime {
                field: field.to_string(),
                value: truncated(value),
            });
        }
        Ok(())
    }
}

/// Keep user-facing messages short when echoing hostile input.
fn truncated(value: &str) -> String {
    value.chars().take(32).collect()
}
