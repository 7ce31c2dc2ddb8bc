//! Applies a validated document to a store.
//!
//! The caller owns the transaction: `apply` only reads and writes through
//! the [`Store`] it is handed, and any `Err` it returns is expected to roll
//! the whole import back.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use anyhow::Result;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::document::{CustomFoodPayload, DietShareDocument, Document, FullBackupDocument};
use crate::identity::{self, FoodReference, RefKind};
use crate::models::{NewDailyLog, NewDiet, NewDietItem, NewFood, parse_log_date};
use crate::policy::{CollisionPrompt, ConflictPolicy, FoodCollision, Resolution, decide};
use crate::store::Store;
use crate::validate::Validated;

/// How a full backup meets existing local data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImportMode {
    /// Keep local data; plans with a matching uuid get their items replaced.
    #[default]
    Merge,
    /// Clear plans, logs and water logs first, then restore.
    Overwrite,
}

impl fmt::Display for ImportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImportMode::Merge => f.write_str("merge"),
            ImportMode::Overwrite => f.write_str("overwrite"),
        }
    }
}

impl FromStr for ImportMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "merge" => Ok(ImportMode::Merge),
            "overwrite" | "replace" => Ok(ImportMode::Overwrite),
            _ => anyhow::bail!("Invalid import mode '{s}'. Must be one of: merge, overwrite"),
        }
    }
}

#[derive(Default)]
pub struct ImportOptions<'p> {
    pub policy: ConflictPolicy,
    pub mode: ImportMode,
    /// Base name for the plan created from a diet share.
    pub name_override: Option<String>,
    pub prompt: Option<&'p dyn CollisionPrompt>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportSummary {
    /// Diet items plus daily logs written.
    pub imported_count: usize,
    pub custom_foods_imported: usize,
    pub custom_foods_skipped: usize,
    pub diets_created: usize,
    pub diets_reused: usize,
    pub diet_items_imported: usize,
    pub daily_logs_imported: usize,
    pub water_logs_imported: usize,
    /// Entries whose food reference matched nothing.
    pub entries_dropped: usize,
    pub collisions: Vec<FoodCollision>,
    /// Plan created by a diet-share import.
    pub diet_id: Option<i64>,
    pub profile_restored: bool,
}

/// `base` if it is free, otherwise `"<stem> (n)"` with the smallest free
/// `n >= 2`. A trailing `" (n)"` on `base` is treated as part of the counter.
#[must_use]
pub fn unique_name(base: &str, taken: &HashSet<String>) -> String {
    if !taken.contains(base) {
        return base.to_string();
    }
    let stem = strip_counter(base);
    (2u64..)
        .map(|n| format!("{stem} ({n})"))
        .find(|candidate| !taken.contains(candidate))
        .unwrap_or_else(|| base.to_string())
}

fn strip_counter(name: &str) -> &str {
    let Some(open) = name.rfind(" (") else {
        return name;
    };
    let digits = &name[open + 2..];
    match digits.strip_suffix(')') {
        Some(n) if !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()) => &name[..open],
        _ => name,
    }
}

pub fn apply<S: Store + ?Sized>(
    store: &S,
    validated: Validated<'_>,
    options: &ImportOptions<'_>,
) -> Result<ImportSummary> {
    let document = validated.document();
    info!(
        kind = %document.kind(),
        policy = %options.policy,
        mode = %options.mode,
        "importing document"
    );

    let mut summary = ImportSummary::default();
    let mut resolver = Resolver::new(store);
    resolver.import_custom_foods(document.custom_foods(), options, &mut summary)?;

    match document {
        Document::DietShare(doc) => {
            apply_diet_share(store, &mut resolver, doc, options, &mut summary)?;
        }
        Document::FullBackup(doc) => {
            apply_full_backup(store, &mut resolver, doc, options, &mut summary)?;
        }
    }

    info!(
        imported = summary.imported_count,
        custom_imported = summary.custom_foods_imported,
        custom_skipped = summary.custom_foods_skipped,
        dropped = summary.entries_dropped,
        "import applied"
    );
    Ok(summary)
}

fn apply_diet_share<S: Store + ?Sized>(
    store: &S,
    resolver: &mut Resolver<'_, S>,
    doc: &DietShareDocument,
    options: &ImportOptions<'_>,
    summary: &mut ImportSummary,
) -> Result<()> {
    let taco_ids: Vec<&str> = doc
        .entries
        .iter()
        .filter_map(|e| e.food_ref.taco_id.as_deref())
        .collect();
    resolver.resolve_catalog(&taco_ids)?;

    let base = options
        .name_override
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .unwrap_or(&doc.diet.name);
    let name = unique_name(base, &store.diet_names()?);
    let diet = store.create_diet(&NewDiet {
        uuid: None,
        name,
        calorie_goal: doc.diet.calorie_goal,
        creation_date: doc.diet.creation_date,
        is_main: false,
    })?;
    summary.diets_created = 1;
    summary.diet_id = Some(diet.id);

    let mut items = Vec::with_capacity(doc.entries.len());
    for (index, entry) in doc.entries.iter().enumerate() {
        let Some(food_id) = resolver.resolve(&entry.food_ref)? else {
            warn!(index, "dropping entry with unresolved food reference");
            summary.entries_dropped += 1;
            continue;
        };
        items.push(NewDietItem {
            diet_id: diet.id,
            food_id,
            quantity_grams: entry.quantity_grams,
            meal_type: entry.meal_type.clone(),
            consumption_time: entry.consumption_time.clone(),
        });
    }

    summary.diet_items_imported = store.insert_diet_items(&items)?;
    summary.imported_count = summary.diet_items_imported;
    Ok(())
}

fn apply_full_backup<S: Store + ?Sized>(
    store: &S,
    resolver: &mut Resolver<'_, S>,
    doc: &FullBackupDocument,
    options: &ImportOptions<'_>,
    summary: &mut ImportSummary,
) -> Result<()> {
    if options.mode == ImportMode::Overwrite {
        let diets = store.clear_diets()?;
        let logs = store.clear_daily_logs()?;
        let water = store.clear_water_logs()?;
        info!(diets, logs, water, "cleared local plans and logs");
    }

    let taco_ids: Vec<&str> = doc
        .diet_items
        .iter()
        .map(|i| i.food_taco_id.as_str())
        .chain(doc.daily_logs.iter().map(|l| l.food_taco_id.as_str()))
        .collect();
    resolver.resolve_catalog(&taco_ids)?;

    // Document-local diet id -> local key.
    let mut diet_keys: HashMap<i64, i64> = HashMap::with_capacity(doc.diets.len());
    let mut taken = store.diet_names()?;
    for diet in &doc.diets {
        let uuid = diet.uuid.as_deref().filter(|u| !u.is_empty());
        let existing = match uuid {
            Some(uuid) => store.diet_by_uuid(uuid)?,
            None => None,
        };
        if let Some(local) = existing {
            store.clear_diet_items(local.id)?;
            diet_keys.insert(diet.id, local.id);
            summary.diets_reused += 1;
            continue;
        }
        let name = unique_name(&diet.name, &taken);
        taken.insert(name.clone());
        let created = store.create_diet(&NewDiet {
            uuid: uuid.map(str::to_string),
            name,
            calorie_goal: diet.calorie_goal,
            creation_date: diet.creation_date,
            is_main: false,
        })?;
        diet_keys.insert(diet.id, created.id);
        summary.diets_created += 1;
    }

    let mut items = Vec::with_capacity(doc.diet_items.len());
    for (index, item) in doc.diet_items.iter().enumerate() {
        let Some(&diet_id) = diet_keys.get(&item.diet_id) else {
            warn!(index, diet_id = item.diet_id, "dropping item for unknown diet");
            summary.entries_dropped += 1;
            continue;
        };
        let Some(food_id) = resolver.resolve(&FoodReference::from_taco_id(&item.food_taco_id))?
        else {
            warn!(index, "dropping diet item with unresolved food reference");
            summary.entries_dropped += 1;
            continue;
        };
        items.push(NewDietItem {
            diet_id,
            food_id,
            quantity_grams: item.quantity_grams,
            meal_type: item.meal_type.clone(),
            consumption_time: item.consumption_time.clone(),
        });
    }
    summary.diet_items_imported = store.insert_diet_items(&items)?;

    let mut logs = Vec::with_capacity(doc.daily_logs.len());
    for (index, log) in doc.daily_logs.iter().enumerate() {
        let Some(food_id) = resolver.resolve(&FoodReference::from_taco_id(&log.food_taco_id))?
        else {
            warn!(index, "dropping daily log with unresolved food reference");
            summary.entries_dropped += 1;
            continue;
        };
        logs.push(NewDailyLog {
            food_id,
            date: parse_log_date(&log.date)?,
            quantity_grams: log.quantity_grams,
            meal_type: log.meal_type.clone(),
            is_consumed: log.is_consumed,
            original_quantity_grams: log.original_quantity_grams,
        });
    }
    summary.daily_logs_imported = store.insert_daily_logs(&logs)?;

    // Repeated dates overwrite each other; count the days written.
    let mut water_days = HashSet::with_capacity(doc.water_logs.len());
    for water in &doc.water_logs {
        let date = parse_log_date(&water.date)?;
        store.upsert_water_log(date, water.quantity_ml)?;
        water_days.insert(date);
    }
    summary.water_logs_imported = water_days.len();

    summary.imported_count = summary.diet_items_imported + summary.daily_logs_imported;
    Ok(())
}

/// Call-scoped identifier maps. Nothing here outlives one `apply`.
struct Resolver<'s, S: ?Sized> {
    store: &'s S,
    /// Stable token -> local key.
    tokens: HashMap<String, i64>,
    /// Catalog id -> local key.
    catalog: HashMap<String, i64>,
    /// Tokens already looked up locally without a match.
    misses: HashSet<String>,
}

impl<'s, S: Store + ?Sized> Resolver<'s, S> {
    fn new(store: &'s S) -> Self {
        Self {
            store,
            tokens: HashMap::new(),
            catalog: HashMap::new(),
            misses: HashSet::new(),
        }
    }

    fn import_custom_foods(
        &mut self,
        payloads: &[CustomFoodPayload],
        options: &ImportOptions<'_>,
        summary: &mut ImportSummary,
    ) -> Result<()> {
        let mut custom_names: Option<HashSet<String>> = None;

        for payload in payloads {
            if self.tokens.contains_key(&payload.uuid) {
                debug!(token = %payload.uuid, "duplicate custom food in document");
                summary.custom_foods_skipped += 1;
                continue;
            }

            let existing = match self.store.food_by_uuid(&payload.uuid)? {
                Some(food) => Some(food),
                None => self.store.food_by_taco_id(&payload.taco_id)?,
            };

            let Some(local) = existing else {
                let id = self.store.insert_food(&NewFood {
                    taco_id: payload.taco_id.clone(),
                    uuid: Some(payload.uuid.clone()),
                    is_custom: true,
                    name: payload.name.clone(),
                    category: payload.category.clone(),
                    nutrients: payload.nutrients.clone(),
                })?;
                self.map_payload(payload, id);
                summary.custom_foods_imported += 1;
                continue;
            };

            // A legacy row matched by catalog id adopts the incoming token.
            if local.uuid.is_none() {
                self.store.set_food_uuid(local.id, &payload.uuid)?;
            }

            let resolution = decide(
                options.policy,
                &payload.uuid,
                &local.name,
                &payload.name,
                options.prompt,
            );
            debug!(
                token = %payload.uuid,
                local_id = local.id,
                ?resolution,
                "custom food collision"
            );
            summary.collisions.push(FoodCollision {
                token: payload.uuid.clone(),
                local_id: local.id,
                local_name: local.name.clone(),
                incoming_name: payload.name.clone(),
                resolution,
            });

            match resolution {
                Resolution::KeepLocal => {
                    self.map_payload(payload, local.id);
                    summary.custom_foods_skipped += 1;
                }
                Resolution::Replace => {
                    self.store.update_food_content(
                        local.id,
                        &payload.name,
                        payload.category.as_deref(),
                        &payload.nutrients,
                    )?;
                    self.map_payload(payload, local.id);
                    summary.custom_foods_imported += 1;
                }
                Resolution::KeepBoth => {
                    if custom_names.is_none() {
                        let loaded = self.store.custom_foods()?.into_iter().map(|f| f.name);
                        custom_names = Some(loaded.collect());
                    }
                    let names = custom_names.get_or_insert_with(HashSet::new);
                    // The copy always gets a suffix, even when the local row
                    // was renamed in the meantime.
                    names.insert(payload.name.clone());
                    let name = unique_name(&payload.name, names);
                    names.insert(name.clone());

                    let fresh = identity::mint_custom_identity();
                    let id = self.store.insert_food(&NewFood {
                        taco_id: fresh.taco_id,
                        uuid: Some(fresh.token),
                        is_custom: true,
                        name,
                        category: payload.category.clone(),
                        nutrients: payload.nutrients.clone(),
                    })?;
                    self.map_payload(payload, id);
                    summary.custom_foods_imported += 1;
                }
            }
        }
        Ok(())
    }

    /// Both the token and the catalog id of an incoming food point at the
    /// row it resolved to. Backup rows only carry the catalog id, and the
    /// token derived from it need not match the payload's.
    fn map_payload(&mut self, payload: &CustomFoodPayload, id: i64) {
        self.tokens.insert(payload.uuid.clone(), id);
        self.catalog.insert(payload.taco_id.clone(), id);
    }

    /// One batched lookup for every catalog id not already mapped.
    fn resolve_catalog(&mut self, taco_ids: &[&str]) -> Result<()> {
        let mut seen = HashSet::new();
        let wanted: Vec<&str> = taco_ids
            .iter()
            .copied()
            .filter(|id| !id.is_empty() && !self.catalog.contains_key(*id))
            .filter(|id| seen.insert(*id))
            .collect();
        if wanted.is_empty() {
            return Ok(());
        }
        let found = self.store.food_ids_by_taco_ids(&wanted)?;
        debug!(requested = wanted.len(), found = found.len(), "resolved catalog ids");
        self.catalog.extend(found);
        Ok(())
    }

    /// Catalog map for references that carry a catalog id, then the token
    /// map. Custom tokens that were not embedded fall back to a local lookup.
    fn resolve(&mut self, reference: &FoodReference) -> Result<Option<i64>> {
        match reference.classify() {
            None => Ok(None),
            Some(RefKind::Official(taco_id)) => Ok(self.catalog.get(&taco_id).copied()),
            Some(RefKind::Custom(token)) => {
                // A catalog id names the exact payload or row; its derived
                // token may not.
                let by_catalog = reference
                    .taco_id
                    .as_ref()
                    .and_then(|taco_id| self.catalog.get(taco_id))
                    .copied();
                if by_catalog.is_some() {
                    return Ok(by_catalog);
                }
                if let Some(&id) = self.tokens.get(&token) {
                    return Ok(Some(id));
                }
                if self.misses.contains(&token) {
                    return Ok(None);
                }
                match self.store.food_by_uuid(&token)? {
                    Some(food) => {
                        self.tokens.insert(token, food.id);
                        Ok(Some(food.id))
                    }
                    None => {
                        self.misses.insert(token);
                        Ok(None)
                    }
                }
            }
        }
    }
}
