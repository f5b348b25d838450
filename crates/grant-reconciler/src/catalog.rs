//! Desired State Catalog.
//!
//! The declarative list of grants that must exist, grouped into ordered stages.
//! Decoded once at start-up and never mutated for the lifetime of a run.
//!
//! ```json
//! {
//!   "contracts": { "AXM_TOKEN": "0x864F9c6f50dC5Bd244F5002F1B0873Cd80e2539D" },
//!   "stages": [
//!     {
//!       "id": 1,
//!       "name": "Core Security & Token Plumbing",
//!       "entries": [
//!         {
//!           "targetContract": "AXM_TOKEN",
//!           "role": "MINTER_ROLE",
//!           "grantee": "0x3fD63728288546AC41dAe3bf25ca383061c3A929",
//!           "description": "Allow Treasury to mint AXM for rewards distribution"
//!         }
//!       ]
//!     }
//!   ]
//! }
//! ```

use std::{
    collections::{BTreeMap, HashSet},
    path::Path,
};

use serde::Deserialize;
use tracing::debug;

use crate::{
    error::{ConfigurationError, Problems},
    primitives::{Address, RoleId},
};

/// Catalog file as written by operators.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RawCatalog {
    /// Named addresses usable in place of hex addresses.
    #[serde(default)]
    contracts: BTreeMap<String, String>,
    /// Stages in execution order.
    stages: Vec<RawStage>,
}

/// One stage as written by operators.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RawStage {
    /// Stage ordinal.
    id: u32,
    /// Human readable name.
    name: String,
    /// Grants of this stage.
    #[serde(default)]
    entries: Vec<RawEntry>,
}

/// One grant as written by operators.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RawEntry {
    /// Hex address or contract alias.
    target_contract: String,
    /// Hex role identifier.
    #[serde(default)]
    role_id: Option<String>,
    /// Role name, hashed into the identifier.
    #[serde(default)]
    role: Option<String>,
    /// Hex address or contract alias.
    grantee: String,
    /// Free text.
    #[serde(default)]
    description: String,
}

/// A required grant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    /// Contract that holds the role.
    pub target_contract: Address,
    /// Role to grant.
    pub role_id: RoleId,
    /// Role name, when the catalog named it.
    pub role_name: Option<String>,
    /// Account receiving the role.
    pub grantee: Address,
    /// Free text.
    pub description: String,
}

/// An ordered batch of required grants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogStage {
    /// Stage ordinal.
    pub id: u32,
    /// Human readable name.
    pub name: String,
    /// Grants in declaration order.
    pub entries: Vec<CatalogEntry>,
}

/// Validated, immutable desired state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catalog {
    /// Stages in execution order.
    stages: Vec<CatalogStage>,
}

impl Catalog {
    /// Validate a set of stages into a catalog.
    ///
    /// # Errors
    ///
    /// `ConfigurationError::Invalid` listing every duplicate stage id, empty stage name
    /// and duplicate grant found.
    pub fn new(stages: Vec<CatalogStage>) -> Result<Self, ConfigurationError> {
        let mut problems = Problems::new();
        let mut stage_ids = HashSet::new();
        let mut grants = HashSet::new();

        for stage in &stages {
            if !stage_ids.insert(stage.id) {
                problems.add(format!("stage id {} is declared more than once", stage.id));
            }
            if stage.name.trim().is_empty() {
                problems.add(format!("stage {} has an empty name", stage.id));
            }
            for (index, entry) in stage.entries.iter().enumerate() {
                if !grants.insert((entry.target_contract, entry.role_id, entry.grantee)) {
                    problems.add(format!(
                        "stage {} entry {index}: role {} for {} on {} is already declared",
                        stage.id, entry.role_id, entry.grantee, entry.target_contract
                    ));
                }
            }
        }

        problems.return_result(Self { stages })
    }

    /// Decode and validate a catalog document.
    ///
    /// # Errors
    ///
    /// `ConfigurationError::Parse` for malformed JSON, otherwise
    /// `ConfigurationError::Invalid` with every problem found.
    pub fn from_json(json: &str) -> Result<Self, ConfigurationError> {
        let raw: RawCatalog = serde_json::from_str(json)?;
        let mut problems = Problems::new();

        let mut aliases = BTreeMap::new();
        for (name, value) in &raw.contracts {
            match value.parse::<Address>() {
                Ok(addr) => {
                    aliases.insert(name.as_str(), addr);
                },
                Err(e) => problems.add(format!("contract alias `{name}`: {e}")),
            }
        }

        let resolve = |value: &str, what: &str, ctx: &str, problems: &mut Problems| {
            if let Some(addr) = aliases.get(value) {
                return Some(*addr);
            }
            match value.parse::<Address>() {
                Ok(addr) => Some(addr),
                Err(e) => {
                    problems.add(format!(
                        "{ctx}: {what} `{value}` is neither a known contract nor an address ({e})"
                    ));
                    None
                },
            }
        };

        let mut stages = Vec::with_capacity(raw.stages.len());
        for raw_stage in raw.stages {
            let mut entries = Vec::with_capacity(raw_stage.entries.len());
            for (index, raw_entry) in raw_stage.entries.into_iter().enumerate() {
                let ctx = format!("stage {} entry {index}", raw_stage.id);
                let target = resolve(
                    &raw_entry.target_contract,
                    "targetContract",
                    &ctx,
                    &mut problems,
                );
                let grantee = resolve(&raw_entry.grantee, "grantee", &ctx, &mut problems);
                let role = match (&raw_entry.role_id, &raw_entry.role) {
                    (Some(id), None) => {
                        match id.parse::<RoleId>() {
                            Ok(role_id) => Some((role_id, None)),
                            Err(e) => {
                                problems.add(format!("{ctx}: roleId `{id}`: {e}"));
                                None
                            },
                        }
                    },
                    (None, Some(name)) if !name.trim().is_empty() => {
                        Some((RoleId::from_name(name), Some(name.clone())))
                    },
                    (None, _) => {
                        problems.add(format!("{ctx}: one of roleId or role is required"));
                        None
                    },
                    (Some(_), Some(_)) => {
                        problems.add(format!("{ctx}: roleId and role are mutually exclusive"));
                        None
                    },
                };

                if let (Some(target_contract), Some(grantee), Some((role_id, role_name))) =
                    (target, grantee, role)
                {
                    entries.push(CatalogEntry {
                        target_contract,
                        role_id,
                        role_name,
                        grantee,
                        description: raw_entry.description,
                    });
                }
            }
            stages.push(CatalogStage {
                id: raw_stage.id,
                name: raw_stage.name,
                entries,
            });
        }

        let stages = problems.return_result(stages)?;
        let catalog = Self::new(stages)?;
        debug!(
            stages = catalog.stages.len(),
            entries = catalog.len(),
            "Catalog decoded"
        );
        Ok(catalog)
    }

    /// Read, decode and validate a catalog file.
    ///
    /// # Errors
    ///
    /// `ConfigurationError::Io` when the file can not be read, otherwise as
    /// [`Catalog::from_json`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigurationError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| ConfigurationError::Io(path.to_path_buf(), e))?;
        Self::from_json(&json)
    }

    /// Stages in execution order.
    #[must_use]
    pub fn stages(&self) -> &[CatalogStage] {
        &self.stages
    }

    /// Total number of grants across all stages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.iter().map(|s| s.entries.len()).sum()
    }

    /// Does the catalog declare no grants at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
