//! Store lifecycle model: identifiers, statuses, phases, and the
//! transition table enforced by the orchestrator.

use crate::error::{Error, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Length of a store identifier.
pub const STORE_ID_LEN: usize = 8;

/// Minimum store name length.
pub const STORE_NAME_MIN: usize = 3;

/// Maximum store name length.
pub const STORE_NAME_MAX: usize = 50;

/// Alphabet for store identifiers: lowercase alphanumerics only, so the
/// id is URL-safe and valid inside a namespace name.
const ID_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Generate a new opaque store identifier.
pub fn generate_store_id() -> String {
    let mut rng = rand::rng();
    (0..STORE_ID_LEN)
        .map(|_| ID_ALPHABET[rng.random_range(0..ID_ALPHABET.len())] as char)
        .collect()
}

/// Derive the namespace for a store id. Never changes after creation.
pub fn namespace_for(store_id: &str) -> String {
    format!("store-{store_id}")
}

/// Validate a user-supplied store name: 3-50 chars, lowercase
/// alphanumerics and hyphens only.
pub fn validate_store_name(name: &str) -> Result<()> {
    if name.len() < STORE_NAME_MIN || name.len() > STORE_NAME_MAX {
        return Err(Error::InvalidStoreName(format!(
            "name must be {STORE_NAME_MIN}-{STORE_NAME_MAX} characters, got {}",
            name.len()
        )));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err(Error::InvalidStoreName(
            "name may only contain lowercase letters, digits, and hyphens".to_string(),
        ));
    }
    Ok(())
}

/// Store engine tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    Woocommerce,
    /// Reserved for a future release; admission rejects it.
    Medusa,
}

impl Engine {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Woocommerce => "woocommerce",
            Self::Medusa => "medusa",
        }
    }

    /// Whether this engine can currently be provisioned.
    pub fn is_supported(&self) -> bool {
        matches!(self, Self::Woocommerce)
    }
}

impl FromStr for Engine {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "woocommerce" => Ok(Self::Woocommerce),
            "medusa" => Ok(Self::Medusa),
            other => Err(Error::UnsupportedEngine(other.to_string())),
        }
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Store record status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreStatus {
    Pending,
    Provisioning,
    Ready,
    Failed,
    Deleting,
    Deleted,
}

impl StoreStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Provisioning => "provisioning",
            Self::Ready => "ready",
            Self::Failed => "failed",
            Self::Deleting => "deleting",
            Self::Deleted => "deleted",
        }
    }

    /// Whether a record in this status counts against the active-store cap.
    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Failed | Self::Deleted)
    }

    /// Whether the transition `self -> to` is permitted.
    ///
    /// `failed -> provisioning` is the retry edge; `deleted` is terminal.
    pub fn can_transition(&self, to: StoreStatus) -> bool {
        use StoreStatus::*;
        matches!(
            (*self, to),
            (Pending, Provisioning)
                | (Pending, Failed)
                | (Pending, Deleting)
                | (Provisioning, Ready)
                | (Provisioning, Failed)
                | (Ready, Deleting)
                | (Failed, Provisioning)
                | (Failed, Deleting)
                | (Deleting, Failed)
                | (Deleting, Deleted)
        )
    }

    /// Validate the transition `self -> to`, returning the target status.
    pub fn transition(&self, to: StoreStatus) -> Result<StoreStatus> {
        if self.can_transition(to) {
            Ok(to)
        } else {
            Err(Error::InvalidTransition {
                from: self.as_str().to_string(),
                to: to.as_str().to_string(),
            })
        }
    }
}

impl FromStr for StoreStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "provisioning" => Ok(Self::Provisioning),
            "ready" => Ok(Self::Ready),
            "failed" => Ok(Self::Failed),
            "deleting" => Ok(Self::Deleting),
            "deleted" => Ok(Self::Deleted),
            other => Err(Error::InvalidStatus(other.to_string())),
        }
    }
}

impl fmt::Display for StoreStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered phases of the provisioning pipeline. Present on a record only
/// while its status is `provisioning`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProvisionPhase {
    Namespace,
    Database,
    Application,
    Validation,
}

impl ProvisionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Namespace => "namespace",
            Self::Database => "database",
            Self::Application => "application",
            Self::Validation => "validation",
        }
    }
}

impl FromStr for ProvisionPhase {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "namespace" => Ok(Self::Namespace),
            "database" => Ok(Self::Database),
            "application" => Ok(Self::Application),
            "validation" => Ok(Self::Validation),
            other => Err(Error::InvalidPhase(other.to_string())),
        }
    }
}

impl fmt::Display for ProvisionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_id_shape() {
        let id = generate_store_id();
        assert_eq!(id.len(), STORE_ID_LEN);
        assert!(
            id.chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        );
    }

    #[test]
    fn store_ids_are_distinct() {
        let a = generate_store_id();
        let b = generate_store_id();
        assert_ne!(a, b);
    }

    #[test]
    fn namespace_derivation() {
        assert_eq!(namespace_for("ab12cd34"), "store-ab12cd34");
    }

    #[test]
    fn name_length_boundaries() {
        assert!(validate_store_name("ab").is_err());
        assert!(validate_store_name("abc").is_ok());
        assert!(validate_store_name(&"a".repeat(50)).is_ok());
        assert!(validate_store_name(&"a".repeat(51)).is_err());
    }

    #[test]
    fn name_charset() {
        assert!(validate_store_name("abc-def").is_ok());
        assert!(validate_store_name("123").is_ok());
        assert!(validate_store_name("abc_def").is_err());
        assert!(validate_store_name("ABC").is_err());
    }

    #[test]
    fn engine_support() {
        assert!(Engine::Woocommerce.is_supported());
        assert!(!Engine::Medusa.is_supported());
        assert!("shopify".parse::<Engine>().is_err());
    }

    #[test]
    fn transition_table_allows_documented_edges() {
        use StoreStatus::*;
        assert!(Pending.can_transition(Provisioning));
        assert!(Pending.can_transition(Failed));
        assert!(Pending.can_transition(Deleting));
        assert!(Provisioning.can_transition(Ready));
        assert!(Provisioning.can_transition(Failed));
        assert!(Ready.can_transition(Deleting));
        assert!(Failed.can_transition(Provisioning));
        assert!(Failed.can_transition(Deleting));
        assert!(Deleting.can_transition(Failed));
        assert!(Deleting.can_transition(Deleted));
    }

    #[test]
    fn transition_table_rejects_everything_else() {
        use StoreStatus::*;
        let all = [Pending, Provisioning, Ready, Failed, Deleting, Deleted];
        let allowed = [
            (Pending, Provisioning),
            (Pending, Failed),
            (Pending, Deleting),
            (Provisioning, Ready),
            (Provisioning, Failed),
            (Ready, Deleting),
            (Failed, Provisioning),
            (Failed, Deleting),
            (Deleting, Failed),
            (Deleting, Deleted),
        ];
        for from in all {
            for to in all {
                let expect = allowed.contains(&(from, to));
                assert_eq!(
                    from.can_transition(to),
                    expect,
                    "transition {from} -> {to}"
                );
            }
        }
    }

    #[test]
    fn deleted_is_terminal() {
        use StoreStatus::*;
        for to in [Pending, Provisioning, Ready, Failed, Deleting, Deleted] {
            assert!(Deleted.transition(to).is_err());
        }
    }

    #[test]
    fn active_statuses() {
        use StoreStatus::*;
        assert!(Pending.is_active());
        assert!(Provisioning.is_active());
        assert!(Ready.is_active());
        assert!(Deleting.is_active());
        assert!(!Failed.is_active());
        assert!(!Deleted.is_active());
    }

    #[test]
    fn status_round_trips_through_strings() {
        use StoreStatus::*;
        for status in [Pending, Provisioning, Ready, Failed, Deleting, Deleted] {
            assert_eq!(status.as_str().parse::<StoreStatus>().unwrap(), status);
        }
        assert!("unknown".parse::<StoreStatus>().is_err());
    }
}
