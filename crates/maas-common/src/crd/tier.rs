//! Tier records and the persisted tier registry document
//!
//! The registry lives as a YAML sequence under the `tiers` key of a ConfigMap:
//!
//! ```yaml
//! - name: free
//!   description: Free tier
//!   level: 1
//!   groups:
//!   - system:authenticated
//! ```
//!
//! Document order is registry order; it is preserved across load and save.

use serde::{Deserialize, Deserializer, Serialize};

use crate::validation::{validate_group_name, validate_tier_name, ValidationError};
use crate::Error;

/// Level value in a [`TierUpdate`] meaning "leave the level unchanged"
pub const LEVEL_UNCHANGED: i64 = -1;

/// A named subscription tier granted to a set of identity-system groups
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tier {
    /// Unique, immutable tier name
    pub name: String,
    /// Human-readable description (required)
    #[serde(default)]
    pub description: String,
    /// Priority level; lower values sort first
    #[serde(default)]
    pub level: i64,
    /// Groups granted this tier. Order is kept for display only.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub groups: Vec<String>,
}

impl Tier {
    /// Create a tier
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        level: i64,
        groups: Vec<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            level,
            groups,
        }
    }

    /// Validate name, description, level and group syntax.
    ///
    /// Does not check that the groups exist in the cluster.
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_tier_name(&self.name)?;
        if self.description.is_empty() {
            return Err(ValidationError::DescriptionRequired);
        }
        if self.level < 0 {
            return Err(ValidationError::NegativeLevel { level: self.level });
        }
        for group in &self.groups {
            validate_group_name(group)?;
        }
        Ok(())
    }

    /// True if the tier lists exactly this group
    pub fn has_group(&self, group: &str) -> bool {
        self.groups.iter().any(|g| g == group)
    }
}

/// The whole tier registry as persisted
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TierConfig {
    /// Tiers in registry order
    pub tiers: Vec<Tier>,
}

impl TierConfig {
    /// Parse the YAML stored under the ConfigMap's `tiers` key.
    ///
    /// Empty text and `[]` both yield an empty registry.
    pub fn from_yaml(text: &str) -> Result<Self, Error> {
        let trimmed = text.trim();
        if trimmed.is_empty() || trimmed == "[]" {
            return Ok(Self::default());
        }
        let tiers: Option<Vec<Tier>> = serde_yaml::from_str(trimmed)
            .map_err(|e| Error::serialization(format!("failed to parse tiers YAML: {}", e)))?;
        Ok(Self {
            tiers: tiers.unwrap_or_default(),
        })
    }

    /// Render the registry as YAML, without a document marker or trailing newline
    pub fn to_yaml(&self) -> Result<String, Error> {
        let text = serde_yaml::to_string(&self.tiers)
            .map_err(|e| Error::serialization(format!("failed to marshal tiers: {}", e)))?;
        let text = text.strip_prefix("---\n").unwrap_or(&text);
        Ok(text.trim_end_matches('\n').to_string())
    }

    /// Look up a tier by name
    pub fn find(&self, name: &str) -> Option<&Tier> {
        self.tiers.iter().find(|t| t.name == name)
    }

    /// Look up a tier by name for modification
    pub fn find_mut(&mut self, name: &str) -> Option<&mut Tier> {
        self.tiers.iter_mut().find(|t| t.name == name)
    }

    /// True if a tier with this name exists
    pub fn contains(&self, name: &str) -> bool {
        self.find(name).is_some()
    }
}

/// Partial update of a tier.
///
/// Field semantics on the wire:
/// - `name`: empty or equal to the tier's name; anything else is a rename and is rejected
/// - `description`: empty means unchanged
/// - `level`: negative means unchanged; an omitted level reads as 0 and is applied
/// - `groups`: absent or null means unchanged; any list (including `[]`) replaces
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierUpdate {
    /// Must be empty or match the tier being updated
    #[serde(default)]
    pub name: String,
    /// Replacement description
    #[serde(default)]
    pub description: String,
    /// Replacement level
    #[serde(default)]
    pub level: i64,
    /// Replacement group list
    #[serde(default)]
    pub groups: Option<Vec<String>>,
}

impl TierUpdate {
    /// An update that changes nothing
    pub fn unchanged() -> Self {
        Self {
            level: LEVEL_UNCHANGED,
            ..Default::default()
        }
    }

    /// Set the replacement description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the replacement level
    pub fn with_level(mut self, level: i64) -> Self {
        self.level = level;
        self
    }

    /// Set the replacement group list
    pub fn with_groups(mut self, groups: Vec<String>) -> Self {
        self.groups = Some(groups);
        self
    }

    /// Merge the supplied fields into `tier`
    pub fn apply_to(&self, tier: &mut Tier) {
        if !self.description.is_empty() {
            tier.description = self.description.clone();
        }
        if self.level >= 0 {
            tier.level = self.level;
        }
        if let Some(groups) = &self.groups {
            tier.groups = groups.clone();
        }
    }
}

/// A tier as seen by one user: only the groups that grant the user access
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserTier {
    /// Tier name
    pub name: String,
    /// Tier description
    pub description: String,
    /// Tier level
    pub level: i64,
    /// The user's groups that grant this tier
    pub groups: Vec<String>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}
