use std::path::Path;

use anyhow::Result;

use dieta_core::document::detect_file_kind;
use dieta_core::service::read_source;
use dieta_core::validate::validate;
use dieta_core::{Document, DocumentKind, Limits};

use super::helpers::user_facing;

/// Report a file's kind and whether it would pass validation, without
/// touching the database.
pub(crate) fn cmd_detect(file: &Path, json: bool) -> Result<()> {
    let limits = Limits::default();
    let raw = read_source(file, &limits).map_err(user_facing)?;
    let kind = detect_file_kind(file, &raw);

    let verdict = if kind == DocumentKind::Unknown {
        Err("not a dieta document".to_string())
    } else {
        Document::decode(&raw, kind)
            .map_err(|e| e.to_string())
            .and_then(|doc| {
                validate(&doc, &limits)
                    .map(|_| doc.format_version())
                    .map_err(|e| format!("rejected: {e}"))
            })
    };

    if json {
        let (format_version, problem) = match &verdict {
            Ok(v) => (Some(*v), None),
            Err(p) => (None, Some(p.as_str())),
        };
        println!(
            "{}",
            serde_json::json!({
                "kind": kind,
                "valid": verdict.is_ok(),
                "format_version": format_version,
                "problem": problem,
            })
        );
    } else {
        match verdict {
            Ok(version) => println!("{}: {kind} (format v{version}), valid", file.display()),
            Err(problem) => println!("{}: {kind}, {problem}", file.display()),
        }
    }

    Ok(())
}
