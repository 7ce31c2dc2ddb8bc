//! The two identifier spaces of a food record.
//!
//! Local rows are keyed by an auto-increment `id` that never leaves the
//! device. Portable references use either the reference catalog's `taco_id`
//! (official foods, identical on every install) or a random `uuid` token
//! (user-owned foods). User-owned foods also get a catalog id inside the
//! [`CUSTOM_PREFIX`] namespace so that every row has a `taco_id`.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

pub const CUSTOM_PREFIX: &str = "custom_";

const LEGACY_TOKEN_SALT: &str = "dieta-legacy:";

#[must_use]
pub fn is_custom_taco_id(taco_id: &str) -> bool {
    taco_id.starts_with(CUSTOM_PREFIX)
}

#[must_use]
pub fn custom_taco_id(token: &str) -> String {
    format!("{CUSTOM_PREFIX}{token}")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomIdentity {
    pub token: String,
    pub taco_id: String,
}

#[must_use]
pub fn mint_custom_identity() -> CustomIdentity {
    let token = Uuid::new_v4().to_string();
    let taco_id = custom_taco_id(&token);
    CustomIdentity { token, taco_id }
}

/// Stable token for a custom-namespaced catalog id.
///
/// Ids minted by this crate embed their token after the prefix. Older ids
/// (timestamps and the like) get a token hashed from the id itself, so the
/// same row always maps to the same token. Returns `None` for official ids.
#[must_use]
pub fn derive_token(taco_id: &str) -> Option<String> {
    let suffix = taco_id.strip_prefix(CUSTOM_PREFIX)?;
    if let Ok(uuid) = Uuid::parse_str(suffix) {
        return Some(uuid.to_string());
    }
    let digest = Sha256::digest(format!("{LEGACY_TOKEN_SALT}{taco_id}").as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    Some(Uuid::from_bytes(bytes).to_string())
}

/// Catalog id a custom food travels under. Rows outside the custom namespace
/// get one built from their token.
#[must_use]
pub fn portable_custom_id(taco_id: &str, token: &str) -> String {
    if is_custom_taco_id(taco_id) {
        taco_id.to_string()
    } else {
        custom_taco_id(token)
    }
}

/// Portable pointer to a food: exactly one of the two fields is populated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FoodReference {
    #[serde(default)]
    pub taco_id: Option<String>,
    #[serde(default)]
    pub uuid: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefKind {
    /// Shared reference data, resolved through the receiving catalog.
    Official(String),
    /// User-owned data, resolved through the document's embedded foods.
    Custom(String),
}

impl FoodReference {
    #[must_use]
    pub fn official(taco_id: &str) -> Self {
        Self {
            taco_id: Some(taco_id.to_string()),
            uuid: None,
        }
    }

    #[must_use]
    pub fn custom(token: &str) -> Self {
        Self {
            taco_id: None,
            uuid: Some(token.to_string()),
        }
    }

    #[must_use]
    pub fn from_taco_id(taco_id: &str) -> Self {
        Self::official(taco_id)
    }

    /// `None` when both or neither field is populated.
    #[must_use]
    pub fn classify(&self) -> Option<RefKind> {
        let taco_id = self.taco_id.as_deref().filter(|s| !s.is_empty());
        let uuid = self.uuid.as_deref().filter(|s| !s.is_empty());
        match (taco_id, uuid) {
            (None, Some(token)) => Some(RefKind::Custom(token.to_string())),
            (Some(id), None) if is_custom_taco_id(id) => derive_token(id).map(RefKind::Custom),
            (Some(id), None) => Some(RefKind::Official(id.to_string())),
            _ => None,
        }
    }
}
