use std::collections::{HashMap, HashSet};
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use rusqlite::types::Value;
use rusqlite::{Connection, params, params_from_iter};
use uuid::Uuid;

use crate::catalog::{CatalogLoadSummary, CatalogRow};
use crate::models::{
    DailyLog, Diet, DietItem, Food, NewDailyLog, NewDiet, NewDietItem, NewFood, Nutrients,
    WaterLog,
};
use crate::store::Store;

/// Upper bound on host parameters per `IN (...)` lookup.
const BATCH_CHUNK: usize = 500;

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<()> {
        self.conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        let version: i64 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version < 1 {
            let nutrient_columns = Nutrients::COLUMNS
                .iter()
                .map(|c| format!("{c} REAL"))
                .collect::<Vec<_>>()
                .join(",\n                    ");
            self.conn.execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS foods (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    taco_id TEXT NOT NULL UNIQUE,
                    is_custom INTEGER NOT NULL DEFAULT 0,
                    name TEXT NOT NULL,
                    category TEXT,
                    {nutrient_columns},
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS diets (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    uuid TEXT NOT NULL UNIQUE,
                    name TEXT NOT NULL,
                    calorie_goal REAL,
                    creation_date INTEGER NOT NULL,
                    is_main INTEGER NOT NULL DEFAULT 0
                );

                CREATE TABLE IF NOT EXISTS diet_items (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    diet_id INTEGER NOT NULL REFERENCES diets(id) ON DELETE CASCADE,
                    food_id INTEGER NOT NULL REFERENCES foods(id),
                    quantity_grams REAL NOT NULL,
                    meal_type TEXT,
                    consumption_time TEXT
                );

                CREATE TABLE IF NOT EXISTS daily_logs (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    food_id INTEGER NOT NULL REFERENCES foods(id),
                    date TEXT NOT NULL,
                    quantity_grams REAL NOT NULL,
                    meal_type TEXT,
                    is_consumed INTEGER NOT NULL DEFAULT 0,
                    original_quantity_grams REAL
                );

                CREATE TABLE IF NOT EXISTS water_logs (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    date TEXT NOT NULL UNIQUE,
                    quantity_ml REAL NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_foods_name ON foods(name);
                CREATE INDEX IF NOT EXISTS idx_diet_items_diet ON diet_items(diet_id);
                CREATE INDEX IF NOT EXISTS idx_daily_logs_date ON daily_logs(date);

                PRAGMA user_version = 1;"
            ))?;
        }

        if version < 2 {
            // Stable tokens for user-owned foods. Legacy rows stay NULL until
            // their first export back-fills one.
            self.conn.execute_batch(
                "ALTER TABLE foods ADD COLUMN uuid TEXT;
                 CREATE UNIQUE INDEX IF NOT EXISTS idx_foods_uuid ON foods(uuid);
                 PRAGMA user_version = 2;",
            )?;
        }

        Ok(())
    }

    /// Store view over the plain connection; every statement autocommits.
    #[must_use]
    pub fn store(&self) -> SqliteStore<'_> {
        SqliteStore::new(&self.conn)
    }

    /// Run `f` inside one transaction. `Ok` commits; `Err` rolls back
    /// everything `f` wrote.
    pub fn transaction<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&SqliteStore<'_>) -> Result<T>,
    {
        let tx = self
            .conn
            .transaction()
            .context("Failed to begin transaction")?;
        let value = f(&SqliteStore::new(&tx))?;
        tx.commit().context("Failed to commit transaction")?;
        Ok(value)
    }

    #[cfg(test)]
    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Upsert official foods by `taco_id` in a single transaction.
    pub fn load_reference_catalog(&mut self, rows: &[CatalogRow]) -> Result<CatalogLoadSummary> {
        self.transaction(|store| {
            let ids: Vec<&str> = rows.iter().map(|r| r.taco_id.as_str()).collect();
            let mut existing = store.food_ids_by_taco_ids(&ids)?;
            let mut summary = CatalogLoadSummary {
                rows_parsed: rows.len(),
                ..CatalogLoadSummary::default()
            };
            for row in rows {
                if let Some(&id) = existing.get(&row.taco_id) {
                    store.update_food_content(
                        id,
                        &row.name,
                        row.category.as_deref(),
                        &row.nutrients,
                    )?;
                    summary.foods_updated += 1;
                } else {
                    let id = store.insert_food(&NewFood {
                        taco_id: row.taco_id.clone(),
                        uuid: None,
                        is_custom: false,
                        name: row.name.clone(),
                        category: row.category.clone(),
                        nutrients: row.nutrients.clone(),
                    })?;
                    existing.insert(row.taco_id.clone(), id);
                    summary.foods_inserted += 1;
                }
            }
            Ok(summary)
        })
    }
}

/// [`Store`] over a borrowed connection, plain or inside a transaction.
pub struct SqliteStore<'c> {
    conn: &'c Connection,
}

impl<'c> SqliteStore<'c> {
    #[must_use]
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    // --- Row mapping helpers ---

    fn food_from_row(row: &rusqlite::Row) -> rusqlite::Result<Food> {
        Ok(Food {
            id: row.get("id")?,
            taco_id: row.get("taco_id")?,
            uuid: row.get("uuid")?,
            is_custom: row.get("is_custom")?,
            name: row.get("name")?,
            category: row.get("category")?,
            nutrients: Nutrients::from_row(row)?,
            created_at: row.get("created_at")?,
        })
    }

    // Expects columns:
    // 0: id, 1: uuid, 2: name, 3: calorie_goal, 4: creation_date, 5: is_main
    fn diet_from_row(row: &rusqlite::Row) -> rusqlite::Result<Diet> {
        Ok(Diet {
            id: row.get(0)?,
            uuid: row.get(1)?,
            name: row.get(2)?,
            calorie_goal: row.get(3)?,
            creation_date: row.get(4)?,
            is_main: row.get(5)?,
        })
    }

    fn diet_item_from_row(row: &rusqlite::Row) -> rusqlite::Result<DietItem> {
        Ok(DietItem {
            id: row.get(0)?,
            diet_id: row.get(1)?,
            food_id: row.get(2)?,
            quantity_grams: row.get(3)?,
            meal_type: row.get(4)?,
            consumption_time: row.get(5)?,
        })
    }

    fn daily_log_from_row(row: &rusqlite::Row) -> rusqlite::Result<DailyLog> {
        Ok(DailyLog {
            id: row.get(0)?,
            food_id: row.get(1)?,
            date: row.get(2)?,
            quantity_grams: row.get(3)?,
            meal_type: row.get(4)?,
            is_consumed: row.get(5)?,
            original_quantity_grams: row.get(6)?,
        })
    }

    fn query_foods(&self, sql: &str, params: impl rusqlite::Params) -> Result<Vec<Food>> {
        let mut stmt = self.conn.prepare(sql)?;
        let foods = stmt
            .query_map(params, Self::food_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(foods)
    }

    fn query_one_food(&self, sql: &str, params: impl rusqlite::Params) -> Result<Option<Food>> {
        Ok(self.query_foods(sql, params)?.into_iter().next())
    }
}

const DIET_COLUMNS: &str = "id, uuid, name, calorie_goal, creation_date, is_main";

fn placeholders(start: usize, count: usize) -> String {
    (start..start + count)
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn nutrient_values(nutrients: &Nutrients) -> impl Iterator<Item = Value> + '_ {
    nutrients.iter().map(|(_, _, v)| Value::from(v))
}

impl Store for SqliteStore<'_> {
    // --- Foods ---

    fn food_by_id(&self, id: i64) -> Result<Option<Food>> {
        self.query_one_food("SELECT * FROM foods WHERE id = ?1", params![id])
    }

    fn foods_by_ids(&self, ids: &[i64]) -> Result<HashMap<i64, Food>> {
        let mut out = HashMap::with_capacity(ids.len());
        for chunk in ids.chunks(BATCH_CHUNK) {
            let sql = format!(
                "SELECT * FROM foods WHERE id IN ({})",
                placeholders(1, chunk.len())
            );
            for food in self.query_foods(&sql, params_from_iter(chunk.iter()))? {
                out.insert(food.id, food);
            }
        }
        Ok(out)
    }

    fn food_ids_by_taco_ids(&self, taco_ids: &[&str]) -> Result<HashMap<String, i64>> {
        let mut out = HashMap::with_capacity(taco_ids.len());
        for chunk in taco_ids.chunks(BATCH_CHUNK) {
            let sql = format!(
                "SELECT taco_id, id FROM foods WHERE taco_id IN ({})",
                placeholders(1, chunk.len())
            );
            let mut stmt = self.conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(chunk.iter()), |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?;
            for row in rows {
                let (taco_id, id) = row?;
                out.insert(taco_id, id);
            }
        }
        Ok(out)
    }

    fn food_by_taco_id(&self, taco_id: &str) -> Result<Option<Food>> {
        self.query_one_food("SELECT * FROM foods WHERE taco_id = ?1", params![taco_id])
    }

    fn food_by_uuid(&self, token: &str) -> Result<Option<Food>> {
        self.query_one_food("SELECT * FROM foods WHERE uuid = ?1", params![token])
    }

    fn custom_foods(&self) -> Result<Vec<Food>> {
        let foods = self.query_foods(
            "SELECT * FROM foods
             WHERE is_custom = 1 OR uuid IS NOT NULL OR substr(taco_id, 1, 7) = 'custom_'
             ORDER BY name",
            [],
        )?;
        Ok(foods.into_iter().filter(Food::is_custom_record).collect())
    }

    fn insert_food(&self, food: &NewFood) -> Result<i64> {
        let now = Local::now().to_rfc3339();
        let columns = Nutrients::COLUMNS.join(", ");
        let sql = format!(
            "INSERT INTO foods (taco_id, uuid, is_custom, name, category, created_at, {columns})
             VALUES ({})",
            placeholders(1, 6 + Nutrients::COLUMNS.len())
        );
        let values = [
            Value::from(food.taco_id.clone()),
            Value::from(food.uuid.clone()),
            Value::from(food.is_custom),
            Value::from(food.name.clone()),
            Value::from(food.category.clone()),
            Value::from(now),
        ]
        .into_iter()
        .chain(nutrient_values(&food.nutrients));
        self.conn
            .execute(&sql, params_from_iter(values))
            .with_context(|| format!("Failed to insert food '{}'", food.taco_id))?;
        Ok(self.conn.last_insert_rowid())
    }

    fn update_food_content(
        &self,
        id: i64,
        name: &str,
        category: Option<&str>,
        nutrients: &Nutrients,
    ) -> Result<()> {
        let assignments = Nutrients::COLUMNS
            .iter()
            .enumerate()
            .map(|(i, c)| format!("{c} = ?{}", i + 3))
            .collect::<Vec<_>>()
            .join(", ");
        let id_param = Nutrients::COLUMNS.len() + 3;
        let sql = format!(
            "UPDATE foods SET name = ?1, category = ?2, {assignments} WHERE id = ?{id_param}"
        );
        let values = [
            Value::from(name.to_string()),
            Value::from(category.map(str::to_string)),
        ]
        .into_iter()
        .chain(nutrient_values(nutrients))
        .chain(std::iter::once(Value::from(id)));
        let changed = self.conn.execute(&sql, params_from_iter(values))?;
        if changed == 0 {
            anyhow::bail!("Food {id} not found");
        }
        Ok(())
    }

    fn set_food_uuid(&self, id: i64, token: &str) -> Result<()> {
        self.conn
            .execute(
                "UPDATE foods SET uuid = ?1 WHERE id = ?2",
                params![token, id],
            )
            .with_context(|| format!("Failed to set token for food {id}"))?;
        Ok(())
    }

    // --- Diets ---

    fn get_diet(&self, id: i64) -> Result<Option<Diet>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {DIET_COLUMNS} FROM diets WHERE id = ?1"))?;
        let mut rows = stmt.query(params![id])?;
        if let Some(row) = rows.next()? {
            Ok(Some(Self::diet_from_row(row)?))
        } else {
            Ok(None)
        }
    }

    fn list_diets(&self) -> Result<Vec<Diet>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {DIET_COLUMNS} FROM diets ORDER BY id"))?;
        let diets = stmt
            .query_map([], Self::diet_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(diets)
    }

    fn diet_by_uuid(&self, uuid: &str) -> Result<Option<Diet>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {DIET_COLUMNS} FROM diets WHERE uuid = ?1"))?;
        let mut rows = stmt.query(params![uuid])?;
        if let Some(row) = rows.next()? {
            Ok(Some(Self::diet_from_row(row)?))
        } else {
            Ok(None)
        }
    }

    fn diet_names(&self) -> Result<HashSet<String>> {
        let mut stmt = self.conn.prepare("SELECT name FROM diets")?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<HashSet<String>, _>>()?;
        Ok(names)
    }

    fn create_diet(&self, diet: &NewDiet) -> Result<Diet> {
        let uuid = diet
            .uuid
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        self.conn
            .execute(
                "INSERT INTO diets (uuid, name, calorie_goal, creation_date, is_main)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    uuid,
                    diet.name,
                    diet.calorie_goal,
                    diet.creation_date,
                    diet.is_main
                ],
            )
            .with_context(|| format!("Failed to create diet '{}'", diet.name))?;
        let id = self.conn.last_insert_rowid();
        self.get_diet(id)?.context("Diet not found after insert")
    }

    fn clear_diet_items(&self, diet_id: i64) -> Result<usize> {
        let n = self
            .conn
            .execute("DELETE FROM diet_items WHERE diet_id = ?1", params![diet_id])?;
        Ok(n)
    }

    fn clear_diets(&self) -> Result<usize> {
        self.conn.execute("DELETE FROM diet_items", [])?;
        let n = self.conn.execute("DELETE FROM diets", [])?;
        Ok(n)
    }

    fn diet_items(&self, diet_id: i64) -> Result<Vec<DietItem>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, diet_id, food_id, quantity_grams, meal_type, consumption_time
             FROM diet_items WHERE diet_id = ?1 ORDER BY id",
        )?;
        let items = stmt
            .query_map(params![diet_id], Self::diet_item_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(items)
    }

    fn insert_diet_items(&self, items: &[NewDietItem]) -> Result<usize> {
        let mut stmt = self.conn.prepare(
            "INSERT INTO diet_items (diet_id, food_id, quantity_grams, meal_type, consumption_time)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )?;
        for item in items {
            stmt.execute(params![
                item.diet_id,
                item.food_id,
                item.quantity_grams,
                item.meal_type,
                item.consumption_time,
            ])
            .with_context(|| format!("Failed to insert item into diet {}", item.diet_id))?;
        }
        Ok(items.len())
    }

    // --- Logs ---

    fn daily_logs(&self) -> Result<Vec<DailyLog>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, food_id, date, quantity_grams, meal_type, is_consumed, original_quantity_grams
             FROM daily_logs ORDER BY date, id",
        )?;
        let logs = stmt
            .query_map([], Self::daily_log_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(logs)
    }

    fn insert_daily_logs(&self, logs: &[NewDailyLog]) -> Result<usize> {
        let mut stmt = self.conn.prepare(
            "INSERT INTO daily_logs (food_id, date, quantity_grams, meal_type, is_consumed, original_quantity_grams)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )?;
        for log in logs {
            let date_str = log.date.format("%Y-%m-%d").to_string();
            stmt.execute(params![
                log.food_id,
                date_str,
                log.quantity_grams,
                log.meal_type,
                log.is_consumed,
                log.original_quantity_grams,
            ])
            .with_context(|| format!("Failed to insert log for {date_str}"))?;
        }
        Ok(logs.len())
    }

    fn clear_daily_logs(&self) -> Result<usize> {
        Ok(self.conn.execute("DELETE FROM daily_logs", [])?)
    }

    fn water_logs(&self) -> Result<Vec<WaterLog>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, date, quantity_ml FROM water_logs ORDER BY date")?;
        let logs = stmt
            .query_map([], |row| {
                Ok(WaterLog {
                    id: row.get(0)?,
                    date: row.get(1)?,
                    quantity_ml: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(logs)
    }

    fn upsert_water_log(&self, date: NaiveDate, quantity_ml: f64) -> Result<()> {
        let date_str = date.format("%Y-%m-%d").to_string();
        self.conn.execute(
            "INSERT INTO water_logs (date, quantity_ml) VALUES (?1, ?2)
             ON CONFLICT(date) DO UPDATE SET quantity_ml = excluded.quantity_ml",
            params![date_str, quantity_ml],
        )?;
        Ok(())
    }

    fn clear_water_logs(&self) -> Result<usize> {
        Ok(self.conn.execute("DELETE FROM water_logs", [])?)
    }
}
