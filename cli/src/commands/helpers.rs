use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io::{self, BufRead, Write};
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use dieta_core::ExchangeError;
use dieta_core::models::Diet;
use dieta_core::policy::{CollisionPrompt, FoodCollision, Resolution};

/// Engine errors are shown by their own message only. Parser and store
/// detail goes to the debug log instead of the terminal.
pub(crate) fn user_facing(e: ExchangeError) -> anyhow::Error {
    let message = e.to_string();
    let detail = anyhow::Error::from(e);
    tracing::debug!(error = %format!("{detail:#}"), "exchange failed");
    anyhow!(message)
}

/// Asks on stderr for each collision when the `ask` policy is used.
pub(crate) struct StdinPrompt;

impl CollisionPrompt for StdinPrompt {
    fn resolve(&self, token: &str, local_name: &str, incoming_name: &str) -> Option<Resolution> {
        match ask_resolution(token, local_name, incoming_name) {
            Ok(answer) => answer,
            Err(e) => {
                tracing::warn!(error = %format!("{e:#}"), "no answer, keeping local food");
                None
            }
        }
    }
}

fn ask_resolution(token: &str, local_name: &str, incoming_name: &str) -> Result<Option<Resolution>> {
    eprintln!("\nCustom food {token} already exists.");
    eprintln!("  local:    {local_name}");
    eprintln!("  incoming: {incoming_name}");
    eprint!("Keep [l]ocal, [r]eplace, keep [b]oth? ");
    io::stderr().flush()?;
    let stdin = io::stdin();
    let line = stdin.lock().lines().next().context("No input")??;
    Ok(parse_resolution(&line))
}

pub(crate) fn parse_resolution(answer: &str) -> Option<Resolution> {
    match answer.trim().to_lowercase().as_str() {
        "l" | "local" | "keep-local" => Some(Resolution::KeepLocal),
        "r" | "replace" => Some(Resolution::Replace),
        "b" | "both" | "keep-both" => Some(Resolution::KeepBoth),
        _ => None,
    }
}

pub(crate) fn print_diet_table(diets: &[Diet]) {
    #[derive(Tabled)]
    struct DietRow {
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "Goal (kcal)")]
        goal: String,
        #[tabled(rename = "Created")]
        created: String,
        #[tabled(rename = "Main")]
        main: String,
    }

    let rows: Vec<DietRow> = diets
        .iter()
        .map(|d| DietRow {
            id: d.id,
            name: truncate(&d.name, 40),
            goal: d.calorie_goal.map_or("-".into(), |g| format!("{g:.0}")),
            created: format_millis(d.creation_date),
            main: if d.is_main { "*".into() } else { String::new() },
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::single(2)).with(Alignment::right()))
        .to_string();
    println!("{table}");
}

pub(crate) fn print_collision_table(collisions: &[FoodCollision]) {
    #[derive(Tabled)]
    struct CollisionRow {
        #[tabled(rename = "Local")]
        local: String,
        #[tabled(rename = "Incoming")]
        incoming: String,
        #[tabled(rename = "Outcome")]
        outcome: String,
    }

    let rows: Vec<CollisionRow> = collisions
        .iter()
        .map(|c| CollisionRow {
            local: truncate(&c.local_name, 35),
            incoming: truncate(&c.incoming_name, 35),
            outcome: resolution_label(c.resolution).to_string(),
        })
        .collect();

    let table = Table::new(&rows).with(Style::rounded()).to_string();
    println!("{table}");
}

pub(crate) fn resolution_label(resolution: Resolution) -> &'static str {
    match resolution {
        Resolution::KeepLocal => "kept local",
        Resolution::Replace => "replaced",
        Resolution::KeepBoth => "kept both",
    }
}

pub(crate) fn format_millis(millis: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .map_or_else(|| "-".to_string(), |d| d.format("%Y-%m-%d").to_string())
}

pub(crate) fn json_error(message: &str) -> String {
    #[derive(Serialize)]
    struct CliError<'a> {
        error: &'a str,
    }
    serde_json::to_string(&CliError { error: message })
        .unwrap_or_else(|_| format!("{{\"error\":\"{message}\"}}"))
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let end = s.char_indices().nth(max - 3).map_or(s.len(), |(i, _)| i);
        format!("{}...", &s[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dieta_core::DocumentKind;

    #[test]
    fn test_parse_resolution() {
        assert_eq!(parse_resolution("l"), Some(Resolution::KeepLocal));
        assert_eq!(parse_resolution(" R \n"), Some(Resolution::Replace));
        assert_eq!(parse_resolution("both"), Some(Resolution::KeepBoth));
        assert_eq!(parse_resolution(""), None);
        assert_eq!(parse_resolution("maybe"), None);
    }

    #[test]
    fn test_format_millis() {
        assert_eq!(format_millis(1_717_000_000_000), "2024-05-29");
        assert_eq!(format_millis(i64::MAX), "-");
    }

    #[test]
    fn test_user_facing_hides_parser_detail() {
        let source = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = user_facing(ExchangeError::Decode {
            kind: DocumentKind::DietShare,
            source,
        });
        assert_eq!(format!("{err:#}"), "invalid file: not a valid diet share document");
    }

    #[test]
    fn test_json_error() {
        assert_eq!(json_error("boom"), r#"{"error":"boom"}"#);
        assert_eq!(json_error("say \"hi\""), r#"{"error":"say \"hi\""}"#);
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("hello", 10), "hello");
        assert_eq!(truncate("hello world this is long", 10), "hello w...");
    }

    #[test]
    fn test_truncate_utf8() {
        assert_eq!(truncate("Pão de queijo assado", 10), "Pão de ...");
        assert_eq!(truncate("Açaí", 10), "Açaí");
    }
}
