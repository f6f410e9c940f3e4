//! Supplier identity registry.
//!
//! Persisted offer rows encode `supplier_id`, and the downstream sync payload
//! carries `external_uid`, so both must stay stable across runs for an
//! existing supplier. Defaults live here; deployments can override single
//! fields through `SUPPLIER_REGISTRY_JSON` without touching code.

use std::collections::BTreeMap;

use serde::Deserialize;
use tracing::warn;

use crate::util::env::env_opt;

use super::SupplierKey;

/// Stable identity of one supplier as encoded in persisted data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupplierIdentity {
    pub id: i32,
    pub name: String,
    pub external_uid: String,
}

#[derive(Debug, Deserialize)]
struct IdentityOverride {
    id: Option<i32>,
    uid: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SupplierRegistry {
    entries: BTreeMap<String, SupplierIdentity>,
}

impl SupplierRegistry {
    /// Built-in identities. Ids are append-only: new suppliers take the next
    /// free number, existing ones are never renumbered.
    pub fn with_defaults() -> Self {
        SupplierRegistry {
            entries: BTreeMap::new(),
        }
        .register(SupplierKey::Deltyre, 1, "DLT")
        .register(SupplierKey::Rimexpo, 2, "RMX")
        .register(SupplierKey::Nordwheel, 3, "NWL")
        .register(SupplierKey::Gripfield, 4, "GRF")
        .register(SupplierKey::Autopart24, 5, "AP24")
        .register(SupplierKey::Vulkanexpress, 6, "VLK")
    }

    pub fn register(mut self, key: SupplierKey, id: i32, uid: &str) -> Self {
        self.entries.insert(
            key.name().to_string(),
            SupplierIdentity {
                id,
                name: key.name().to_string(),
                external_uid: uid.to_string(),
            },
        );
        self
    }

    /// Defaults plus any `SUPPLIER_REGISTRY_JSON` overrides. A malformed
    /// override document is logged and ignored; running with defaults beats
    /// not running.
    pub fn from_env() -> Self {
        let registry = Self::with_defaults();
        match env_opt("SUPPLIER_REGISTRY_JSON") {
            Some(raw) => match registry.clone().apply_overrides(&raw) {
                Ok(overridden) => overridden,
                Err(error) => {
                    warn!(%error, "ignoring malformed SUPPLIER_REGISTRY_JSON");
                    registry
                }
            },
            None => registry,
        }
    }

    /// Applies a JSON document of the form
    /// `{"deltyre": {"id": 11, "uid": "DL2"}, ...}`. Unknown supplier names
    /// are rejected so typos do not silently do nothing.
    pub fn apply_overrides(mut self, raw: &str) -> anyhow::Result<Self> {
        let overrides: BTreeMap<String, IdentityOverride> = serde_json::from_str(raw)?;
        for (name, patch) in overrides {
            let key = name.to_ascii_lowercase();
            let Some(entry) = self.entries.get_mut(&key) else {
                anyhow::bail!("unknown supplier {name:?} in registry overrides");
            };
            if let Some(id) = patch.id {
                entry.id = id;
            }
            if let Some(uid) = patch.uid {
                entry.external_uid = uid;
            }
        }
        Ok(self)
    }

    pub fn identity(&self, key: SupplierKey) -> Option<&SupplierIdentity> {
        self.entries.get(key.name())
    }

    pub fn by_id(&self, id: i32) -> Option<&SupplierIdentity> {
        self.entries.values().find(|e| e.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SupplierIdentity> {
        self.entries.values()
    }
}
