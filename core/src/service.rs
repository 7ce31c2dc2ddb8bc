use std::fs::File;
use std::io::Read;
use std::path::Path;

use tracing::{error, info, warn};

use crate::db::Database;
use crate::document::{Document, DocumentKind, UserProfile, detect_file_kind};
use crate::error::{ExchangeError, Result};
use crate::export::{self, ExportScope};
use crate::import::{self, ImportOptions, ImportSummary};
use crate::profile::{ProfileStore, restored_profile};
use crate::validate::{Limits, check_size, validate};

/// Export and import entry points over a caller-owned database.
///
/// The service only borrows its collaborators for the duration of a call.
/// Every call is blocking; async callers should run it on a blocking worker.
pub struct ExchangeService<'a> {
    db: &'a mut Database,
    profiles: &'a dyn ProfileStore,
    limits: Limits,
}

impl<'a> ExchangeService<'a> {
    pub fn new(db: &'a mut Database, profiles: &'a dyn ProfileStore) -> Self {
        Self {
            db,
            profiles,
            limits: Limits::default(),
        }
    }

    #[must_use]
    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    // --- Export ---

    pub fn export(&self, scope: ExportScope) -> Result<Document> {
        let profile = match scope {
            ExportScope::Everything => self.profiles.load().map_err(ExchangeError::Store)?,
            ExportScope::Diet(_) => None,
        };
        export::export(&self.db.store(), scope, profile)
    }

    /// Export and write to `path`. Data is read before the sink is opened,
    /// so a sink failure is always reported as `Transport`.
    pub fn export_to_sink(&self, scope: ExportScope, path: &Path) -> Result<Document> {
        let document = self.export(scope)?;
        export::export_to_path(&document, path)?;
        info!(path = %path.display(), "wrote document");
        Ok(document)
    }

    // --- Import ---

    /// Validate, then apply `document` in one transaction. A full backup's
    /// profile is restored after the commit.
    pub fn import(
        &mut self,
        document: &Document,
        options: &ImportOptions<'_>,
    ) -> Result<ImportSummary> {
        let validated = validate(document, &self.limits)?;

        let mut summary = self
            .db
            .transaction(|store| import::apply(store, validated, options))
            .map_err(|e| {
                error!(error = %format!("{e:#}"), "import rolled back");
                ExchangeError::Reconciliation(e)
            })?;

        if let Document::FullBackup(backup) = document {
            if let Some(incoming) = &backup.profile {
                summary.profile_restored = self.restore_profile(incoming, options);
            }
        }
        Ok(summary)
    }

    pub fn import_bytes(
        &mut self,
        bytes: &[u8],
        kind: DocumentKind,
        options: &ImportOptions<'_>,
    ) -> Result<ImportSummary> {
        check_size(bytes.len() as u64, &self.limits)?;
        let document = Document::decode(bytes, kind)?;
        self.import(&document, options)
    }

    pub fn import_file(
        &mut self,
        path: &Path,
        options: &ImportOptions<'_>,
    ) -> Result<ImportSummary> {
        let document = read_document(path, &self.limits)?;
        self.import(&document, options)
    }

    fn restore_profile(
        &self,
        incoming: &UserProfile,
        options: &ImportOptions<'_>,
    ) -> bool {
        let result = self.profiles.load().and_then(|local| {
            let profile = restored_profile(local, incoming, options.mode);
            self.profiles.save(&profile)
        });
        match result {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %format!("{e:#}"), "data imported but profile was not restored");
                false
            }
        }
    }
}

/// Read a document file, refusing oversized files from their metadata
/// before any bytes are read.
pub fn read_source(path: &Path, limits: &Limits) -> Result<Vec<u8>> {
    let file = File::open(path).map_err(|e| ExchangeError::transport(path, e))?;
    let size = file
        .metadata()
        .map_err(|e| ExchangeError::transport(path, e))?
        .len();
    check_size(size, limits)?;

    let mut raw = Vec::with_capacity(usize::try_from(size).unwrap_or(0));
    file.take(limits.max_document_bytes + 1)
        .read_to_end(&mut raw)
        .map_err(|e| ExchangeError::transport(path, e))?;
    // The file may have grown since it was measured.
    check_size(raw.len() as u64, limits)?;
    Ok(raw)
}

pub fn read_document(path: &Path, limits: &Limits) -> Result<Document> {
    let raw = read_source(path, limits)?;
    Document::decode(&raw, detect_file_kind(path, &raw))
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::import::ImportMode;
    use crate::models::{NewDiet, NewDietItem, NewFood, Nutrients};
    use crate::profile::MemoryProfileStore;
    use crate::store::Store;
    use crate::validate::ValidationError;

    fn seeded() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.store()
            .insert_food(&NewFood {
                taco_id: "1".to_string(),
                uuid: None,
                is_custom: false,
                name: "Arroz, integral, cozido".to_string(),
                category: None,
                nutrients: Nutrients {
                    energia_kcal: Some(124.0),
                    ..Nutrients::default()
                },
            })
            .unwrap();
        db
    }

    fn plan_with_items(db: &Database) -> i64 {
        let store = db.store();
        let diet = store
            .create_diet(&NewDiet {
                uuid: None,
                name: "Cutting".to_string(),
                calorie_goal: Some(1800.0),
                creation_date: 1_717_000_000_000,
                is_main: true,
            })
            .unwrap();
        let rice = store.food_by_taco_id("1").unwrap().unwrap().id;
        store
            .insert_diet_items(&[NewDietItem {
                diet_id: diet.id,
                food_id: rice,
                quantity_grams: 150.0,
                meal_type: Some("Almoço".to_string()),
                consumption_time: None,
            }])
            .unwrap();
        diet.id
    }

    const NEGATIVE_KCAL: &str = r#"{
        "format_version": 1,
        "exported_at": 0,
        "diet": {"name": "Bad", "calorie_goal": null, "creation_date": 0},
        "entries": [{"food_ref": {"taco_id": "1"}, "quantity_grams": 100}],
        "custom_foods": [{
            "uuid": "7c9e6679-7425-40de-944b-e07fc1f90ae7",
            "taco_id": "custom_7c9e6679-7425-40de-944b-e07fc1f90ae7",
            "name": "Bolo",
            "energia_kcal": -5
        }]
    }"#;

    #[test]
    fn test_export_to_sink_then_import_file() {
        let mut source = seeded();
        let diet = plan_with_items(&source);
        let profiles = MemoryProfileStore::default();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cutting.diet");
        {
            let svc = ExchangeService::new(&mut source, &profiles);
            svc.export_to_sink(ExportScope::Diet(diet), &path).unwrap();
        }

        let mut target = seeded();
        let mut svc = ExchangeService::new(&mut target, &profiles);
        let summary = svc.import_file(&path, &ImportOptions::default()).unwrap();
        assert_eq!(summary.imported_count, 1);
        assert_eq!(summary.diets_created, 1);
    }

    #[test]
    fn test_backup_restores_profile() {
        let mut source = seeded();
        plan_with_items(&source);
        let source_profiles = MemoryProfileStore::with_profile(UserProfile {
            name: Some("Ana".to_string()),
            weight_kg: Some(62.5),
            ..UserProfile::default()
        });
        let document = ExchangeService::new(&mut source, &source_profiles)
            .export(ExportScope::Everything)
            .unwrap();

        let mut target = seeded();
        let target_profiles = MemoryProfileStore::with_profile(UserProfile {
            name: Some("Bia".to_string()),
            ..UserProfile::default()
        });
        let options = ImportOptions {
            mode: ImportMode::Merge,
            ..ImportOptions::default()
        };
        let summary = ExchangeService::new(&mut target, &target_profiles)
            .import(&document, &options)
            .unwrap();
        assert!(summary.profile_restored);
        let profile = target_profiles.load().unwrap().unwrap();
        assert_eq!(profile.name.as_deref(), Some("Bia"));
        assert_eq!(profile.weight_kg, Some(62.5));
    }

    #[test]
    fn test_oversized_input_rejected_before_import() {
        let mut db = seeded();
        let profiles = MemoryProfileStore::default();
        let limits = Limits {
            max_document_bytes: 64,
            ..Limits::default()
        };
        let mut svc = ExchangeService::new(&mut db, &profiles).with_limits(limits);
        let err = svc
            .import_bytes(
                NEGATIVE_KCAL.as_bytes(),
                DocumentKind::DietShare,
                &ImportOptions::default(),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            ExchangeError::Validation(ValidationError::TooLarge { .. })
        ));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.diet");
        fs::write(&path, NEGATIVE_KCAL).unwrap();
        let err = svc.import_file(&path, &ImportOptions::default()).unwrap_err();
        assert!(matches!(
            err,
            ExchangeError::Validation(ValidationError::TooLarge { .. })
        ));

        let store = db.store();
        assert!(store.list_diets().unwrap().is_empty());
        assert!(store.custom_foods().unwrap().is_empty());
    }

    #[test]
    fn test_out_of_range_nutrient_names_field() {
        let mut db = seeded();
        let profiles = MemoryProfileStore::default();
        let mut svc = ExchangeService::new(&mut db, &profiles);
        let err = svc
            .import_bytes(
                NEGATIVE_KCAL.as_bytes(),
                DocumentKind::Unknown,
                &ImportOptions::default(),
            )
            .unwrap_err();
        assert!(matches!(err, ExchangeError::Validation(_)));
        assert!(err.to_string().contains("custom_foods[0].energia_kcal"));
        assert!(db.store().list_diets().unwrap().is_empty());
    }

    #[test]
    fn test_decode_error_is_generic() {
        let mut db = seeded();
        let profiles = MemoryProfileStore::default();
        let mut svc = ExchangeService::new(&mut db, &profiles);
        let err = svc
            .import_bytes(
                br#"{"diet": 3, "entries": "no"}"#,
                DocumentKind::DietShare,
                &ImportOptions::default(),
            )
            .unwrap_err();
        assert!(matches!(err, ExchangeError::Decode { .. }));
        assert_eq!(err.to_string(), "invalid file: not a valid diet share document");
    }

    #[test]
    fn test_missing_file_is_transport_error() {
        let mut db = seeded();
        let profiles = MemoryProfileStore::default();
        let mut svc = ExchangeService::new(&mut db, &profiles);
        let err = svc
            .import_file(Path::new("/nonexistent/plan.diet"), &ImportOptions::default())
            .unwrap_err();
        assert!(matches!(err, ExchangeError::Transport { .. }));
        assert!(err.to_string().contains("/nonexistent/plan.diet"));
    }

    #[test]
    fn test_store_failure_rolls_back() {
        let mut source = seeded();
        plan_with_items(&source);
        let profiles = MemoryProfileStore::default();
        let document = ExchangeService::new(&mut source, &profiles)
            .export(ExportScope::Everything)
            .unwrap();
        let Document::FullBackup(mut backup) = document else {
            panic!("expected full backup");
        };
        backup.water_logs.push(crate::document::BackupWaterLog {
            date: "2024-06-15".to_string(),
            quantity_ml: 1000.0,
        });
        let document = Document::FullBackup(backup);

        let mut target = seeded();
        target.conn().execute_batch("DROP TABLE water_logs").unwrap();
        let err = ExchangeService::new(&mut target, &profiles)
            .import(&document, &ImportOptions::default())
            .unwrap_err();
        assert!(matches!(err, ExchangeError::Reconciliation(_)));
        assert_eq!(err.to_string(), "import failed; no changes were made");
        assert!(target.store().list_diets().unwrap().is_empty());
    }

    #[test]
    fn test_read_document_detects_kind() {
        let mut db = seeded();
        let diet = plan_with_items(&db);
        let profiles = MemoryProfileStore::default();
        let dir = tempfile::tempdir().unwrap();
        let svc = ExchangeService::new(&mut db, &profiles);

        let share = dir.path().join("plan.diet");
        svc.export_to_sink(ExportScope::Diet(diet), &share).unwrap();
        let backup = dir.path().join("backup.json");
        svc.export_to_sink(ExportScope::Everything, &backup).unwrap();

        let limits = Limits::default();
        assert_eq!(
            read_document(&share, &limits).unwrap().kind(),
            DocumentKind::DietShare
        );
        assert_eq!(
            read_document(&backup, &limits).unwrap().kind(),
            DocumentKind::FullBackup
        );
    }
}
