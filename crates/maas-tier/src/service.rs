//! Tier registry operations
//!
//! Every mutation is a read-modify-write of the whole registry document. The
//! store's versioned save turns a concurrent writer into a `StorageConflict`,
//! and the whole cycle is re-run from a fresh load a bounded number of times.
//! Input validation and group-existence lookups happen once, before the
//! first load.

use std::sync::Arc;

use tracing::{debug, info};

use maas_common::crd::{Tier, TierConfig, TierUpdate, UserTier};
use maas_common::retry::{retry_on_conflict, RetryConfig};
use maas_common::validation::{validate_group_name, ValidationError};
use maas_common::{Error, Result};

use crate::groups::GroupDirectory;
use crate::store::TierStore;

/// Tier CRUD and group-membership queries
pub struct TierService {
    store: Arc<dyn TierStore>,
    groups: Arc<dyn GroupDirectory>,
    retry: RetryConfig,
}

impl TierService {
    /// Create a service with the default conflict retry policy
    pub fn new(store: Arc<dyn TierStore>, groups: Arc<dyn GroupDirectory>) -> Self {
        Self {
            store,
            groups,
            retry: RetryConfig::default(),
        }
    }

    /// Override the conflict retry policy
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Create a tier. Fails if the name is taken or a group does not exist.
    pub async fn create_tier(&self, tier: Tier) -> Result<Tier> {
        tier.validate()?;
        self.ensure_groups_exist(&tier.groups).await?;

        let created = self
            .modify("create_tier", |config| {
                if config.contains(&tier.name) {
                    return Err(Error::TierAlreadyExists {
                        tier: tier.name.clone(),
                    });
                }
                config.tiers.push(tier.clone());
                Ok(tier.clone())
            })
            .await?;

        info!(tier = %created.name, level = created.level, groups = ?created.groups, "Created tier");
        Ok(created)
    }

    /// All tiers in registry order
    pub async fn get_tiers(&self) -> Result<Vec<Tier>> {
        Ok(self.store.load().await?.config.tiers)
    }

    /// One tier by name
    pub async fn get_tier(&self, name: &str) -> Result<Tier> {
        self.store
            .load()
            .await?
            .config
            .find(name)
            .cloned()
            .ok_or_else(|| Error::tier_not_found(name))
    }

    /// Apply a partial update. The tier name cannot change.
    pub async fn update_tier(&self, name: &str, update: TierUpdate) -> Result<Tier> {
        if !update.name.is_empty() && update.name != name {
            return Err(Error::TierNameImmutable {
                current: name.to_string(),
                requested: update.name,
            });
        }

        if let Some(groups) = &update.groups {
            for group in groups {
                validate_group_name(group)?;
            }
            self.ensure_groups_exist(groups).await?;
        }

        let updated = self
            .modify("update_tier", |config| {
                let tier = config
                    .find_mut(name)
                    .ok_or_else(|| Error::tier_not_found(name))?;
                let mut merged = tier.clone();
                update.apply_to(&mut merged);
                merged.validate()?;
                *tier = merged.clone();
                Ok(merged)
            })
            .await?;

        info!(tier = %name, level = updated.level, groups = ?updated.groups, "Updated tier");
        Ok(updated)
    }

    /// Delete a tier. Workload annotations naming it are left in place.
    pub async fn delete_tier(&self, name: &str) -> Result<Tier> {
        let removed = self
            .modify("delete_tier", |config| {
                let idx = config
                    .tiers
                    .iter()
                    .position(|t| t.name == name)
                    .ok_or_else(|| Error::tier_not_found(name))?;
                Ok(config.tiers.remove(idx))
            })
            .await?;

        info!(tier = %name, "Deleted tier");
        Ok(removed)
    }

    /// Grant a tier to an existing group
    pub async fn add_group(&self, tier_name: &str, group: &str) -> Result<Tier> {
        validate_group_name(group)?;
        self.ensure_groups_exist(&[group.to_string()]).await?;

        let updated = self
            .modify("add_group", |config| {
                let tier = config
                    .find_mut(tier_name)
                    .ok_or_else(|| Error::tier_not_found(tier_name))?;
                if tier.has_group(group) {
                    return Err(Error::GroupAlreadyExists {
                        tier: tier_name.to_string(),
                        group: group.to_string(),
                    });
                }
                tier.groups.push(group.to_string());
                Ok(tier.clone())
            })
            .await?;

        info!(tier = %tier_name, group = %group, "Added group to tier");
        Ok(updated)
    }

    /// Revoke a tier from a group, keeping the order of the remaining groups
    pub async fn remove_group(&self, tier_name: &str, group: &str) -> Result<Tier> {
        validate_group_name(group)?;

        let updated = self
            .modify("remove_group", |config| {
                let tier = config
                    .find_mut(tier_name)
                    .ok_or_else(|| Error::tier_not_found(tier_name))?;
                let idx = tier
                    .groups
                    .iter()
                    .position(|g| g == group)
                    .ok_or_else(|| Error::group_not_found(tier_name, group))?;
                tier.groups.remove(idx);
                Ok(tier.clone())
            })
            .await?;

        info!(tier = %tier_name, group = %group, "Removed group from tier");
        Ok(updated)
    }

    /// Tiers listing exactly this group, in registry order
    pub async fn get_tiers_by_group(&self, group: &str) -> Result<Vec<Tier>> {
        validate_group_name(group)?;
        let config = self.store.load().await?.config;
        Ok(config
            .tiers
            .into_iter()
            .filter(|t| t.has_group(group))
            .collect())
    }

    /// Tiers available to a user, ascending by level.
    ///
    /// Each entry carries only the groups through which the user has the
    /// tier. Equal levels keep registry order.
    pub async fn get_tiers_for_user(&self, username: &str) -> Result<Vec<UserTier>> {
        if username.is_empty() {
            return Err(ValidationError::UserRequired.into());
        }

        let user_groups = self.groups.user_groups(username).await?;
        let config = self.store.load().await?.config;

        let mut tiers: Vec<UserTier> = config
            .tiers
            .into_iter()
            .filter_map(|tier| {
                let matching: Vec<String> = tier
                    .groups
                    .iter()
                    .filter(|g| user_groups.contains(g))
                    .cloned()
                    .collect();
                (!matching.is_empty()).then(|| UserTier {
                    name: tier.name,
                    description: tier.description,
                    level: tier.level,
                    groups: matching,
                })
            })
            .collect();

        // Stable: ties keep registry order
        tiers.sort_by_key(|t| t.level);
        debug!(user = %username, tiers = tiers.len(), "Resolved tiers for user");
        Ok(tiers)
    }

    /// Stop at the first group missing from the identity system
    async fn ensure_groups_exist(&self, groups: &[String]) -> Result<()> {
        for group in groups {
            if !self.groups.group_exists(group).await? {
                return Err(Error::GroupNotFoundInCluster {
                    group: group.clone(),
                });
            }
        }
        Ok(())
    }

    /// Load, apply `mutate`, save; re-run from the load on a version conflict
    async fn modify<F>(&self, operation: &str, mutate: F) -> Result<Tier>
    where
        F: Fn(&mut TierConfig) -> Result<Tier> + Send + Sync,
    {
        let store = &self.store;
        let mutate = &mutate;

        retry_on_conflict(&self.retry, operation, move || async move {
            let mut stored = store.load().await?;
            let result = mutate(&mut stored.config)?;
            store.save(&stored).await?;
            Ok(result)
        })
        .await
    }
}
