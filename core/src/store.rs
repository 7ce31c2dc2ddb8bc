//! Collaborator interface the exchange engine reads and writes through.
//!
//! Implementations are expected to be transaction-capable: the importer is
//! handed a store bound to an open transaction and never commits itself.

use std::collections::{HashMap, HashSet};

use anyhow::Result;
use chrono::NaiveDate;

use crate::models::{
    DailyLog, Diet, DietItem, Food, NewDailyLog, NewDiet, NewDietItem, NewFood, Nutrients,
    WaterLog,
};

pub trait Store {
    // --- Foods ---

    fn food_by_id(&self, id: i64) -> Result<Option<Food>>;

    /// Batch lookup by local key. Missing ids are absent from the map.
    fn foods_by_ids(&self, ids: &[i64]) -> Result<HashMap<i64, Food>>;

    /// Batch lookup of catalog ids to local keys. Missing ids are absent.
    fn food_ids_by_taco_ids(&self, taco_ids: &[&str]) -> Result<HashMap<String, i64>>;

    fn food_by_taco_id(&self, taco_id: &str) -> Result<Option<Food>>;

    fn food_by_uuid(&self, token: &str) -> Result<Option<Food>>;

    /// Every user-owned food, including legacy rows without a token.
    fn custom_foods(&self) -> Result<Vec<Food>>;

    fn insert_food(&self, food: &NewFood) -> Result<i64>;

    /// Overwrite name, category and nutrients; the key and identity stay.
    fn update_food_content(
        &self,
        id: i64,
        name: &str,
        category: Option<&str>,
        nutrients: &Nutrients,
    ) -> Result<()>;

    fn set_food_uuid(&self, id: i64, token: &str) -> Result<()>;

    // --- Diets ---

    fn get_diet(&self, id: i64) -> Result<Option<Diet>>;

    fn list_diets(&self) -> Result<Vec<Diet>>;

    fn diet_by_uuid(&self, uuid: &str) -> Result<Option<Diet>>;

    fn diet_names(&self) -> Result<HashSet<String>>;

    fn create_diet(&self, diet: &NewDiet) -> Result<Diet>;

    fn clear_diet_items(&self, diet_id: i64) -> Result<usize>;

    /// Remove every plan together with its items.
    fn clear_diets(&self) -> Result<usize>;

    fn diet_items(&self, diet_id: i64) -> Result<Vec<DietItem>>;

    fn insert_diet_items(&self, items: &[NewDietItem]) -> Result<usize>;

    // --- Logs ---

    fn daily_logs(&self) -> Result<Vec<DailyLog>>;

    fn insert_daily_logs(&self, logs: &[NewDailyLog]) -> Result<usize>;

    fn clear_daily_logs(&self) -> Result<usize>;

    fn water_logs(&self) -> Result<Vec<WaterLog>>;

    /// One row per date; an existing row for `date` is replaced.
    fn upsert_water_log(&self, date: NaiveDate, quantity_ml: f64) -> Result<()>;

    fn clear_water_logs(&self) -> Result<usize>;
}
