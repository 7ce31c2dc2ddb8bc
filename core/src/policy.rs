use std::fmt;
use std::str::FromStr;

use serde::Serialize;

/// What to do when an incoming custom food has the same token as a local one.
/// One policy applies to every collision within an import.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConflictPolicy {
    #[default]
    KeepLocal,
    ReplaceWithIncoming,
    KeepBoth,
    /// Defer to a [`CollisionPrompt`]; keep-local when nobody answers.
    AskUser,
}

pub const POLICY_NAMES: &[&str] = &["keep-local", "replace", "keep-both", "ask"];

impl fmt::Display for ConflictPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConflictPolicy::KeepLocal => "keep-local",
            ConflictPolicy::ReplaceWithIncoming => "replace",
            ConflictPolicy::KeepBoth => "keep-both",
            ConflictPolicy::AskUser => "ask",
        };
        f.write_str(name)
    }
}

impl FromStr for ConflictPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.to_lowercase().as_str() {
            "keep-local" | "keep_local" | "local" => Ok(ConflictPolicy::KeepLocal),
            "replace" | "replace-with-incoming" | "incoming" => {
                Ok(ConflictPolicy::ReplaceWithIncoming)
            }
            "keep-both" | "keep_both" | "both" => Ok(ConflictPolicy::KeepBoth),
            "ask" | "ask-user" => Ok(ConflictPolicy::AskUser),
            _ => anyhow::bail!(
                "Invalid conflict policy '{s}'. Must be one of: {}",
                POLICY_NAMES.join(", ")
            ),
        }
    }
}

/// Outcome for a single collision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    KeepLocal,
    Replace,
    KeepBoth,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FoodCollision {
    pub token: String,
    pub local_id: i64,
    pub local_name: String,
    pub incoming_name: String,
    pub resolution: Resolution,
}

/// Per-collision answer from an interactive caller.
///
/// Called while the import transaction is open, so implementations must
/// answer promptly. Returning `None` keeps the local row.
pub trait CollisionPrompt {
    fn resolve(&self, token: &str, local_name: &str, incoming_name: &str) -> Option<Resolution>;
}

#[must_use]
pub fn decide(
    policy: ConflictPolicy,
    token: &str,
    local_name: &str,
    incoming_name: &str,
    prompt: Option<&dyn CollisionPrompt>,
) -> Resolution {
    match policy {
        ConflictPolicy::KeepLocal => Resolution::KeepLocal,
        ConflictPolicy::ReplaceWithIncoming => Resolution::Replace,
        ConflictPolicy::KeepBoth => Resolution::KeepBoth,
        ConflictPolicy::AskUser => prompt
            .and_then(|p| p.resolve(token, local_name, incoming_name))
            .unwrap_or(Resolution::KeepLocal),
    }
}
