//! Builds portable documents from a store.

use std::collections::{HashMap, HashSet};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::document::{
    BackupDailyLog, BackupDiet, BackupDietItem, BackupWaterLog, BACKUP_EXTENSION,
    CustomFoodPayload, DIET_SHARE_EXTENSION, DietShareDocument, Document, FORMAT_VERSION,
    FullBackupDocument, SharedDiet, SharedEntry, UserProfile,
};
use crate::error::{ExchangeError, Result};
use crate::identity::{self, FoodReference};
use crate::models::Food;
use crate::store::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportScope {
    /// One plan, as a diet-share document.
    Diet(i64),
    /// Every plan, log and custom food, as a full backup.
    Everything,
}

/// Read the scope from `store` into a document.
///
/// Legacy custom foods without a token get one persisted on the way out, so
/// every later export reuses it. `profile` is only used for full backups.
pub fn export<S: Store + ?Sized>(
    store: &S,
    scope: ExportScope,
    profile: Option<UserProfile>,
) -> Result<Document> {
    let document = match scope {
        ExportScope::Diet(id) => Document::DietShare(export_diet(store, id)?),
        ExportScope::Everything => Document::FullBackup(export_full(store, profile)?),
    };
    info!(kind = %document.kind(), custom_foods = document.custom_foods().len(), "exported document");
    Ok(document)
}

fn export_diet<S: Store + ?Sized>(store: &S, diet_id: i64) -> Result<DietShareDocument> {
    let diet = store
        .get_diet(diet_id)
        .map_err(ExchangeError::Store)?
        .ok_or(ExchangeError::DietNotFound(diet_id))?;
    let items = store.diet_items(diet_id).map_err(ExchangeError::Store)?;
    let foods = load_foods(store, items.iter().map(|i| i.food_id))?;

    let mut tokens = Tokens::new(store);
    let mut embedded = Vec::new();
    let mut seen = HashSet::new();
    let mut entries = Vec::with_capacity(items.len());

    for item in &items {
        let Some(food) = foods.get(&item.food_id) else {
            warn!(food_id = item.food_id, "skipping diet item with missing food");
            continue;
        };
        let food_ref = if food.is_custom_record() {
            let token = tokens.token_for(food)?;
            if seen.insert(food.id) {
                embedded.push(CustomFoodPayload::from_food(food, &token));
            }
            FoodReference::custom(&token)
        } else {
            FoodReference::official(&food.taco_id)
        };
        entries.push(SharedEntry {
            food_ref,
            quantity_grams: item.quantity_grams,
            meal_type: item.meal_type.clone(),
            consumption_time: item.consumption_time.clone(),
        });
    }

    Ok(DietShareDocument {
        format_version: FORMAT_VERSION,
        exported_at: Utc::now().timestamp_millis(),
        diet: SharedDiet {
            name: diet.name,
            calorie_goal: diet.calorie_goal,
            creation_date: diet.creation_date,
        },
        entries,
        custom_foods: embedded,
    })
}

fn export_full<S: Store + ?Sized>(
    store: &S,
    profile: Option<UserProfile>,
) -> Result<FullBackupDocument> {
    let diets = store.list_diets().map_err(ExchangeError::Store)?;
    let mut items = Vec::new();
    for diet in &diets {
        items.extend(store.diet_items(diet.id).map_err(ExchangeError::Store)?);
    }
    let logs = store.daily_logs().map_err(ExchangeError::Store)?;
    let water = store.water_logs().map_err(ExchangeError::Store)?;

    // The whole custom library travels, referenced or not.
    let mut tokens = Tokens::new(store);
    let mut custom_foods = Vec::new();
    let mut portable_ids: HashMap<i64, String> = HashMap::new();
    for food in store.custom_foods().map_err(ExchangeError::Store)? {
        let token = tokens.token_for(&food)?;
        let payload = CustomFoodPayload::from_food(&food, &token);
        portable_ids.insert(food.id, payload.taco_id.clone());
        custom_foods.push(payload);
    }

    let foods = load_foods(
        store,
        items
            .iter()
            .map(|i| i.food_id)
            .chain(logs.iter().map(|l| l.food_id)),
    )?;
    let taco_id_of = |food_id: i64| -> Option<String> {
        portable_ids
            .get(&food_id)
            .cloned()
            .or_else(|| foods.get(&food_id).map(|f| f.taco_id.clone()))
    };

    let diet_items = items
        .iter()
        .filter_map(|item| {
            let Some(food_taco_id) = taco_id_of(item.food_id) else {
                warn!(food_id = item.food_id, "skipping diet item with missing food");
                return None;
            };
            Some(BackupDietItem {
                diet_id: item.diet_id,
                food_taco_id,
                quantity_grams: item.quantity_grams,
                meal_type: item.meal_type.clone(),
                consumption_time: item.consumption_time.clone(),
            })
        })
        .collect();

    let daily_logs = logs
        .iter()
        .filter_map(|log| {
            let Some(food_taco_id) = taco_id_of(log.food_id) else {
                warn!(food_id = log.food_id, "skipping daily log with missing food");
                return None;
            };
            Some(BackupDailyLog {
                food_taco_id,
                date: log.date.clone(),
                quantity_grams: log.quantity_grams,
                meal_type: log.meal_type.clone(),
                is_consumed: log.is_consumed,
                original_quantity_grams: log.original_quantity_grams,
            })
        })
        .collect();

    Ok(FullBackupDocument {
        format_version: FORMAT_VERSION,
        exported_at: Utc::now().timestamp_millis(),
        profile,
        custom_foods,
        diets: diets
            .into_iter()
            .map(|d| BackupDiet {
                id: d.id,
                uuid: Some(d.uuid),
                name: d.name,
                calorie_goal: d.calorie_goal,
                creation_date: d.creation_date,
            })
            .collect(),
        diet_items,
        daily_logs,
        water_logs: water
            .into_iter()
            .map(|w| BackupWaterLog {
                date: w.date,
                quantity_ml: w.quantity_ml,
            })
            .collect(),
    })
}

fn load_foods<S: Store + ?Sized>(
    store: &S,
    ids: impl Iterator<Item = i64>,
) -> Result<HashMap<i64, Food>> {
    let mut seen = HashSet::new();
    let ids: Vec<i64> = ids.filter(|id| seen.insert(*id)).collect();
    store.foods_by_ids(&ids).map_err(ExchangeError::Store)
}

/// Stable tokens for custom foods, back-filling legacy rows once per call.
struct Tokens<'s, S: ?Sized> {
    store: &'s S,
    assigned: HashMap<i64, String>,
}

impl<'s, S: Store + ?Sized> Tokens<'s, S> {
    fn new(store: &'s S) -> Self {
        Self {
            store,
            assigned: HashMap::new(),
        }
    }

    fn token_for(&mut self, food: &Food) -> Result<String> {
        if let Some(token) = &food.uuid {
            return Ok(token.clone());
        }
        if let Some(token) = self.assigned.get(&food.id) {
            return Ok(token.clone());
        }
        let token = identity::derive_token(&food.taco_id)
            .unwrap_or_else(|| identity::mint_custom_identity().token);
        self.store
            .set_food_uuid(food.id, &token)
            .map_err(ExchangeError::Store)?;
        debug!(food_id = food.id, taco_id = %food.taco_id, "back-filled custom food token");
        self.assigned.insert(food.id, token.clone());
        Ok(token)
    }
}

/// Serialize `document` as pretty JSON into any sink.
pub fn export_to_writer<W: Write>(document: &Document, writer: W) -> std::io::Result<()> {
    document.write_json(writer).map_err(std::io::Error::from)
}

/// Write `document` to `path`, creating parent directories.
pub fn export_to_path(document: &Document, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| ExchangeError::transport(parent, e))?;
    }
    let file = File::create(path).map_err(|e| ExchangeError::transport(path, e))?;
    let mut writer = BufWriter::new(file);
    export_to_writer(document, &mut writer).map_err(|e| ExchangeError::transport(path, e))?;
    writer
        .flush()
        .map_err(|e| ExchangeError::transport(path, e))?;
    Ok(())
}

/// File name for a document: `<plan-slug>.diet` or `dieta-backup-<date>.json`.
#[must_use]
pub fn suggested_file_name(document: &Document) -> String {
    match document {
        Document::DietShare(doc) => {
            let slug = slugify(&doc.diet.name);
            let stem = if slug.is_empty() { "diet" } else { slug.as_str() };
            format!("{stem}.{DIET_SHARE_EXTENSION}")
        }
        Document::FullBackup(_) => format!(
            "dieta-backup-{}.{BACKUP_EXTENSION}",
            Utc::now().format("%Y-%m-%d")
        ),
    }
}

fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_alphanumeric() {
            slug.extend(c.to_lowercase());
        } else if !slug.ends_with('-') && !slug.is_empty() {
            slug.push('-');
        }
    }
    slug.trim_end_matches('-').to_string()
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::db::Database;
    use crate::document::DocumentKind;
    use crate::import::{ImportOptions, apply};
    use crate::models::{NewDailyLog, NewDiet, NewDietItem, NewFood, Nutrients};
    use crate::policy::ConflictPolicy;
    use crate::validate::{Limits, validate};

    fn official(taco_id: &str, kcal: f64) -> NewFood {
        NewFood {
            taco_id: taco_id.to_string(),
            uuid: None,
            is_custom: false,
            name: format!("Alimento {taco_id}"),
            category: None,
            nutrients: Nutrients {
                energia_kcal: Some(kcal),
                ..Nutrients::default()
            },
        }
    }

    fn seed_catalog(db: &Database) {
        let store = db.store();
        store.insert_food(&official("1", 124.0)).unwrap();
        store.insert_food(&official("2", 76.0)).unwrap();
    }

    fn item(diet_id: i64, food_id: i64, grams: f64) -> NewDietItem {
        NewDietItem {
            diet_id,
            food_id,
            quantity_grams: grams,
            meal_type: Some("Café da manhã".to_string()),
            consumption_time: Some("07:30".to_string()),
        }
    }

    fn plan(db: &Database, name: &str) -> i64 {
        db.store()
            .create_diet(&NewDiet {
                uuid: None,
                name: name.to_string(),
                calorie_goal: Some(2100.0),
                creation_date: 1_717_000_000_000,
                is_main: true,
            })
            .unwrap()
            .id
    }

    #[test]
    fn test_export_diet_references() {
        let db = Database::open_in_memory().unwrap();
        seed_catalog(&db);
        let store = db.store();
        let rice = store.food_ids_by_taco_ids(&["1"]).unwrap()["1"];
        let custom = NewFood::custom(
            "Panqueca de aveia",
            Nutrients {
                energia_kcal: Some(210.0),
                proteina_g: Some(9.0),
                ..Nutrients::default()
            },
        );
        let token = custom.uuid.clone().unwrap();
        let custom_id = store.insert_food(&custom).unwrap();
        let diet = plan(&db, "Cutting");
        store
            .insert_diet_items(&[
                item(diet, rice, 150.0),
                item(diet, custom_id, 80.0),
                item(diet, custom_id, 40.0),
            ])
            .unwrap();

        let Document::DietShare(doc) = export(&store, ExportScope::Diet(diet), None).unwrap()
        else {
            panic!("expected diet share");
        };
        assert_eq!(doc.diet.name, "Cutting");
        assert_eq!(doc.entries.len(), 3);
        assert_eq!(doc.entries[0].food_ref, FoodReference::official("1"));
        assert_eq!(doc.entries[1].food_ref, FoodReference::custom(&token));
        // Embedded once, official foods never.
        assert_eq!(doc.custom_foods.len(), 1);
        assert_eq!(doc.custom_foods[0].uuid, token);
        assert_eq!(doc.custom_foods[0].nutrients.proteina_g, Some(9.0));
    }

    #[test]
    fn test_export_missing_diet() {
        let db = Database::open_in_memory().unwrap();
        let err = export(&db.store(), ExportScope::Diet(42), None).unwrap_err();
        assert!(matches!(err, ExchangeError::DietNotFound(42)));
    }

    #[test]
    fn test_export_empty_diet_succeeds() {
        let db = Database::open_in_memory().unwrap();
        let diet = plan(&db, "Vazia");
        let doc = export(&db.store(), ExportScope::Diet(diet), None).unwrap();
        let Document::DietShare(doc) = doc else {
            panic!("expected diet share");
        };
        assert!(doc.entries.is_empty());
        assert!(doc.custom_foods.is_empty());
    }

    #[test]
    fn test_legacy_token_backfilled_once() {
        let db = Database::open_in_memory().unwrap();
        let store = db.store();
        let legacy = store
            .insert_food(&NewFood {
                taco_id: "custom_1698765432100".to_string(),
                uuid: None,
                is_custom: true,
                name: "Vitamina de banana".to_string(),
                category: None,
                nutrients: Nutrients::default(),
            })
            .unwrap();
        let diet = plan(&db, "Manhã");
        store.insert_diet_items(&[item(diet, legacy, 300.0)]).unwrap();

        let first = export(&store, ExportScope::Diet(diet), None).unwrap();
        let second = export(&store, ExportScope::Diet(diet), None).unwrap();
        let token = store.food_by_id(legacy).unwrap().unwrap().uuid.unwrap();
        assert_eq!(first.custom_foods()[0].uuid, token);
        assert_eq!(second.custom_foods()[0].uuid, token);
        assert_eq!(
            identity::derive_token("custom_1698765432100").unwrap(),
            token
        );
    }

    #[test]
    fn test_diet_round_trip_into_empty_store() {
        let source = Database::open_in_memory().unwrap();
        seed_catalog(&source);
        let store = source.store();
        let rice = store.food_ids_by_taco_ids(&["1"]).unwrap()["1"];
        let custom_id = store
            .insert_food(&NewFood::custom(
                "Bolo de cenoura",
                Nutrients {
                    energia_kcal: Some(345.0),
                    carboidrato_g: Some(55.2),
                    ..Nutrients::default()
                },
            ))
            .unwrap();
        let diet = plan(&source, "Semana 1");
        store
            .insert_diet_items(&[item(diet, rice, 150.0), item(diet, custom_id, 60.0)])
            .unwrap();
        let document = export(&store, ExportScope::Diet(diet), None).unwrap();

        let mut target = Database::open_in_memory().unwrap();
        seed_catalog(&target);
        let validated = validate(&document, &Limits::default()).unwrap();
        let options = ImportOptions {
            policy: ConflictPolicy::KeepBoth,
            ..ImportOptions::default()
        };
        let summary = target
            .transaction(|store| apply(store, validated, &options))
            .unwrap();
        assert_eq!(summary.imported_count, 2);

        let target_store = target.store();
        let imported = target_store.get_diet(summary.diet_id.unwrap()).unwrap().unwrap();
        assert_eq!(imported.name, "Semana 1");
        assert_eq!(imported.calorie_goal, Some(2100.0));
        assert!(!imported.is_main);

        let source_items = store.diet_items(diet).unwrap();
        let target_items = target_store.diet_items(imported.id).unwrap();
        assert_eq!(source_items.len(), target_items.len());
        for (a, b) in source_items.iter().zip(&target_items) {
            assert_eq!(a.quantity_grams, b.quantity_grams);
            assert_eq!(a.meal_type, b.meal_type);
            assert_eq!(a.consumption_time, b.consumption_time);
            let fa = store.food_by_id(a.food_id).unwrap().unwrap();
            let fb = target_store.food_by_id(b.food_id).unwrap().unwrap();
            assert_eq!(fa.nutrients, fb.nutrients);
            assert_eq!(fa.name, fb.name);
        }
    }

    #[test]
    fn test_full_backup_round_trip() {
        let source = Database::open_in_memory().unwrap();
        seed_catalog(&source);
        let store = source.store();
        let beans = store.food_ids_by_taco_ids(&["2"]).unwrap()["2"];
        let custom_id = store
            .insert_food(&NewFood::custom("Granola", Nutrients::default()))
            .unwrap();
        let diet = plan(&source, "Base");
        store
            .insert_diet_items(&[item(diet, beans, 100.0), item(diet, custom_id, 30.0)])
            .unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 6, 15).unwrap();
        store
            .insert_daily_logs(&[NewDailyLog {
                food_id: custom_id,
                date,
                quantity_grams: 30.0,
                meal_type: None,
                is_consumed: false,
                original_quantity_grams: Some(30.0),
            }])
            .unwrap();
        store.upsert_water_log(date, 2250.0).unwrap();

        let profile = UserProfile {
            name: Some("Ana".to_string()),
            ..UserProfile::default()
        };
        let document = export(&store, ExportScope::Everything, Some(profile)).unwrap();
        assert_eq!(document.kind(), DocumentKind::FullBackup);

        let mut target = Database::open_in_memory().unwrap();
        seed_catalog(&target);
        let validated = validate(&document, &Limits::default()).unwrap();
        let summary = target
            .transaction(|s| apply(s, validated, &ImportOptions::default()))
            .unwrap();
        assert_eq!(summary.diet_items_imported, 2);
        assert_eq!(summary.daily_logs_imported, 1);
        assert_eq!(summary.water_logs_imported, 1);
        assert_eq!(summary.entries_dropped, 0);

        let target_store = target.store();
        let diets = target_store.list_diets().unwrap();
        assert_eq!(diets[0].uuid, store.get_diet(diet).unwrap().unwrap().uuid);
        assert_eq!(target_store.water_logs().unwrap()[0].quantity_ml, 2250.0);
        assert_eq!(target_store.custom_foods().unwrap().len(), 1);
    }

    #[test]
    fn test_export_to_path_creates_dirs() {
        let db = Database::open_in_memory().unwrap();
        let diet = plan(&db, "Plano");
        let document = export(&db.store(), ExportScope::Diet(diet), None).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shares").join("plano.diet");
        export_to_path(&document, &path).unwrap();
        let raw = fs::read(&path).unwrap();
        let back = Document::decode(&raw, DocumentKind::DietShare).unwrap();
        assert_eq!(back, document);
    }

    #[test]
    fn test_export_to_path_transport_error() {
        let db = Database::open_in_memory().unwrap();
        let diet = plan(&db, "Plano");
        let document = export(&db.store(), ExportScope::Diet(diet), None).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, b"x").unwrap();
        let err = export_to_path(&document, &blocker.join("plano.diet")).unwrap_err();
        assert!(matches!(err, ExchangeError::Transport { .. }));
    }

    #[test]
    fn test_suggested_file_name() {
        let db = Database::open_in_memory().unwrap();
        let diet = plan(&db, "Minha Dieta: Verão!");
        let document = export(&db.store(), ExportScope::Diet(diet), None).unwrap();
        assert_eq!(suggested_file_name(&document), "minha-dieta-verão.diet");
        assert_eq!(slugify("!!!"), "");
    }
}
