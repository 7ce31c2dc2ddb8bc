use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::identity;

/// Unit family of a nutrient column. Each family has its own sanity ceiling
/// when documents are validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NutrientClass {
    Percent,
    Kcal,
    Kilojoule,
    Grams,
    Milligrams,
    Micrograms,
}

macro_rules! nutrients {
    ($($field:ident: $class:ident),* $(,)?) => {
        /// Per-100g composition of a food. Every value is optional because the
        /// reference catalog leaves many cells blank ("traces" / not analysed).
        #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
        pub struct Nutrients {
            $(
                #[serde(default)]
                pub $field: Option<f64>,
            )*
        }

        impl Nutrients {
            /// Column names, in storage order.
            pub const COLUMNS: &'static [&'static str] = &[$(stringify!($field)),*];

            pub fn iter(&self) -> impl Iterator<Item = (&'static str, NutrientClass, Option<f64>)> {
                [$((stringify!($field), NutrientClass::$class, self.$field)),*].into_iter()
            }

            pub fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
                Ok(Self {
                    $($field: row.get(stringify!($field))?,)*
                })
            }

            /// Build from `(column, value)` pairs; unknown columns are ignored.
            pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, Option<f64>)>) -> Self {
                let mut out = Self::default();
                for (name, value) in pairs {
                    match name {
                        $(stringify!($field) => out.$field = value,)*
                        _ => {}
                    }
                }
                out
            }
        }
    };
}

nutrients! {
    umidade_pct: Percent,
    energia_kcal: Kcal,
    energia_kj: Kilojoule,
    proteina_g: Grams,
    lipidios_g: Grams,
    colesterol_mg: Milligrams,
    carboidrato_g: Grams,
    fibra_alimentar_g: Grams,
    cinzas_g: Grams,
    saturados_g: Grams,
    monoinsaturados_g: Grams,
    poliinsaturados_g: Grams,
    gorduras_trans_g: Grams,
    calcio_mg: Milligrams,
    magnesio_mg: Milligrams,
    manganes_mg: Milligrams,
    fosforo_mg: Milligrams,
    ferro_mg: Milligrams,
    sodio_mg: Milligrams,
    potassio_mg: Milligrams,
    cobre_mg: Milligrams,
    zinco_mg: Milligrams,
    selenio_mcg: Micrograms,
    retinol_mcg: Micrograms,
    re_mcg: Micrograms,
    rae_mcg: Micrograms,
    tiamina_mg: Milligrams,
    riboflavina_mg: Milligrams,
    piridoxina_mg: Milligrams,
    niacina_mg: Milligrams,
    vitamina_c_mg: Milligrams,
    vitamina_d_mcg: Micrograms,
    vitamina_e_mg: Milligrams,
    vitamina_b12_mcg: Micrograms,
    folato_mcg: Micrograms,
    triptofano_g: Grams,
    treonina_g: Grams,
    isoleucina_g: Grams,
    leucina_g: Grams,
    lisina_g: Grams,
    metionina_g: Grams,
    fenilalanina_g: Grams,
    valina_g: Grams,
    histidina_g: Grams,
}

#[derive(Debug, Clone, Serialize)]
pub struct Food {
    pub id: i64,
    pub taco_id: String,
    pub uuid: Option<String>,
    pub is_custom: bool,
    pub name: String,
    pub category: Option<String>,
    pub nutrients: Nutrients,
    pub created_at: String,
}

impl Food {
    /// A record is user-owned when it carries a stable token, is flagged as
    /// custom, or lives in the custom catalog namespace (legacy rows).
    #[must_use]
    pub fn is_custom_record(&self) -> bool {
        self.uuid.is_some() || self.is_custom || identity::is_custom_taco_id(&self.taco_id)
    }
}

#[derive(Debug, Clone)]
pub struct NewFood {
    pub taco_id: String,
    pub uuid: Option<String>,
    pub is_custom: bool,
    pub name: String,
    pub category: Option<String>,
    pub nutrients: Nutrients,
}

impl NewFood {
    /// A user-owned food with a freshly minted identity.
    #[must_use]
    pub fn custom(name: &str, nutrients: Nutrients) -> Self {
        let identity = identity::mint_custom_identity();
        Self {
            taco_id: identity.taco_id,
            uuid: Some(identity.token),
            is_custom: true,
            name: name.to_string(),
            category: None,
            nutrients,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Diet {
    pub id: i64,
    pub uuid: String,
    pub name: String,
    pub calorie_goal: Option<f64>,
    /// Epoch millis.
    pub creation_date: i64,
    pub is_main: bool,
}

#[derive(Debug, Clone)]
pub struct NewDiet {
    /// Stable plan identity; a fresh one is generated when absent.
    pub uuid: Option<String>,
    pub name: String,
    pub calorie_goal: Option<f64>,
    pub creation_date: i64,
    pub is_main: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct DietItem {
    pub id: i64,
    pub diet_id: i64,
    pub food_id: i64,
    pub quantity_grams: f64,
    pub meal_type: Option<String>,
    pub consumption_time: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewDietItem {
    pub diet_id: i64,
    pub food_id: i64,
    pub quantity_grams: f64,
    pub meal_type: Option<String>,
    pub consumption_time: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DailyLog {
    pub id: i64,
    pub food_id: i64,
    pub date: String,
    pub quantity_grams: f64,
    pub meal_type: Option<String>,
    pub is_consumed: bool,
    pub original_quantity_grams: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct NewDailyLog {
    pub food_id: i64,
    pub date: NaiveDate,
    pub quantity_grams: f64,
    pub meal_type: Option<String>,
    pub is_consumed: bool,
    pub original_quantity_grams: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WaterLog {
    pub id: i64,
    pub date: String,
    pub quantity_ml: f64,
}

pub fn parse_log_date(date: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .with_context(|| format!("Invalid date '{date}'. Must be YYYY-MM-DD"))
}

pub fn parse_consumption_time(time: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(time, "%H:%M")
        .with_context(|| format!("Invalid time '{time}'. Must be HH:MM"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nutrient_columns_match_iter() {
        let n = Nutrients::default();
        let names: Vec<&str> = n.iter().map(|(name, _, _)| name).collect();
        assert_eq!(names, Nutrients::COLUMNS);
        assert_eq!(Nutrients::COLUMNS.len(), 44);
    }

    #[test]
    fn test_nutrient_classes() {
        let n = Nutrients::default();
        let class_of = |field: &str| {
            n.iter()
                .find(|(name, _, _)| *name == field)
                .map(|(_, class, _)| class)
                .unwrap()
        };
        assert_eq!(class_of("energia_kcal"), NutrientClass::Kcal);
        assert_eq!(class_of("energia_kj"), NutrientClass::Kilojoule);
        assert_eq!(class_of("proteina_g"), NutrientClass::Grams);
        assert_eq!(class_of("sodio_mg"), NutrientClass::Milligrams);
        assert_eq!(class_of("selenio_mcg"), NutrientClass::Micrograms);
        assert_eq!(class_of("umidade_pct"), NutrientClass::Percent);
    }

    #[test]
    fn test_nutrients_from_pairs_ignores_unknown() {
        let n = Nutrients::from_pairs([
            ("energia_kcal", Some(120.0)),
            ("proteina_g", Some(3.5)),
            ("not_a_nutrient", Some(1.0)),
        ]);
        assert_eq!(n.energia_kcal, Some(120.0));
        assert_eq!(n.proteina_g, Some(3.5));
        assert!(n.lipidios_g.is_none());
    }

    #[test]
    fn test_nutrients_deserialize_missing_fields() {
        let n: Nutrients = serde_json::from_str(r#"{"energia_kcal": 52}"#).unwrap();
        assert_eq!(n.energia_kcal, Some(52.0));
        assert!(n.ferro_mg.is_none());
    }

    #[test]
    fn test_new_custom_food_identity() {
        let food = NewFood::custom("Bolo de cenoura", Nutrients::default());
        let token = food.uuid.clone().unwrap();
        assert!(food.is_custom);
        assert_eq!(food.taco_id, format!("custom_{token}"));
    }

    #[test]
    fn test_is_custom_record() {
        let mut food = Food {
            id: 1,
            taco_id: "1".to_string(),
            uuid: None,
            is_custom: false,
            name: "Arroz, integral, cozido".to_string(),
            category: Some("Cereais e derivados".to_string()),
            nutrients: Nutrients::default(),
            created_at: String::new(),
        };
        assert!(!food.is_custom_record());

        food.taco_id = "custom_1698765432100".to_string();
        assert!(food.is_custom_record());

        // Short suffixes are still in the custom namespace.
        food.taco_id = "custom_12".to_string();
        assert!(food.is_custom_record());

        food.taco_id = "42".to_string();
        food.uuid = Some("7c9e6679-7425-40de-944b-e07fc1f90ae7".to_string());
        assert!(food.is_custom_record());
    }

    #[test]
    fn test_parse_log_date() {
        assert!(parse_log_date("2024-06-15").is_ok());
        assert!(parse_log_date("15/06/2024").is_err());
    }

    #[test]
    fn test_parse_consumption_time() {
        assert!(parse_consumption_time("07:30").is_ok());
        assert!(parse_consumption_time("7h30").is_err());
    }
}
