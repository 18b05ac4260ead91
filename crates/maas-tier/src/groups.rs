//! Identity-system lookups against OpenShift `user.openshift.io/v1` Groups

use async_trait::async_trait;
use kube::api::{Api, DynamicObject, ListParams};
use kube::Client;
#[cfg(test)]
use mockall::automock;
use tracing::debug;

use maas_common::crd::{GroupMembers, OpenShiftGroupResource};
use maas_common::kube_utils::HasApiResource;
use maas_common::{Error, Result, SYSTEM_AUTHENTICATED_GROUP};

/// Group existence and membership queries
#[cfg_attr(test, automock)]
#[async_trait]
pub trait GroupDirectory: Send + Sync {
    /// True if the group exists.
    ///
    /// "Not found" is `Ok(false)`; any other failure is an `IdentityLookup`
    /// error so callers can tell "unknown" from "confirmed absent".
    async fn group_exists(&self, name: &str) -> Result<bool>;

    /// Groups the user belongs to, always including `system:authenticated`.
    ///
    /// Fails with `UserNotFound` if the user is not a member of any group.
    async fn user_groups(&self, username: &str) -> Result<Vec<String>>;
}

/// [`GroupDirectory`] backed by the cluster's OpenShift Group objects
pub struct OpenShiftGroupDirectory {
    client: Client,
}

impl OpenShiftGroupDirectory {
    /// Create a directory using the given client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self) -> Api<DynamicObject> {
        Api::all_with(self.client.clone(), &OpenShiftGroupResource::api_resource())
    }
}

#[async_trait]
impl GroupDirectory for OpenShiftGroupDirectory {
    async fn group_exists(&self, name: &str) -> Result<bool> {
        // Built in to the identity system and not listable
        if name == SYSTEM_AUTHENTICATED_GROUP {
            return Ok(true);
        }

        let group = self.api().get_opt(name).await.map_err(|e| Error::IdentityLookup {
            subject: format!("group {}", name),
            message: e.to_string(),
        })?;

        debug!(group = %name, exists = group.is_some(), "Checked group existence");
        Ok(group.is_some())
    }

    async fn user_groups(&self, username: &str) -> Result<Vec<String>> {
        let list = self
            .api()
            .list(&ListParams::default())
            .await
            .map_err(|e| Error::IdentityLookup {
                subject: format!("user {}", username),
                message: e.to_string(),
            })?;

        let members: Vec<GroupMembers> = list.items.iter().map(group_members).collect();
        let groups = memberships(&members, username)?;
        debug!(user = %username, groups = groups.len(), "Resolved user groups");
        Ok(groups)
    }
}

/// Project a Group object onto its name and `users` list.
///
/// OpenShift stores `users: null` for an empty group.
pub fn group_members(obj: &DynamicObject) -> GroupMembers {
    let users = obj
        .data
        .get("users")
        .and_then(|v| serde_json::from_value::<Option<Vec<String>>>(v.clone()).ok())
        .flatten()
        .unwrap_or_default();

    GroupMembers {
        name: obj.metadata.name.clone().unwrap_or_default(),
        users,
    }
}

/// Names of the groups listing `username`, plus `system:authenticated`.
///
/// A user found in no group is unknown to the identity system.
pub fn memberships(groups: &[GroupMembers], username: &str) -> Result<Vec<String>> {
    let mut names: Vec<String> = groups
        .iter()
        .filter(|g| g.contains(username))
        .map(|g| g.name.clone())
        .collect();

    if names.is_empty() {
        return Err(Error::UserNotFound {
            username: username.to_string(),
        });
    }

    if !names.iter().any(|n| n == SYSTEM_AUTHENTICATED_GROUP) {
        names.push(SYSTEM_AUTHENTICATED_GROUP.to_string());
    }
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use http;

    /// Client whose every request fails, counting the attempts
    fn unreachable_client(calls: Arc<AtomicUsize>) -> Client {
        let service = tower::service_fn(move |_req: http::Request<kube::client::Body>| {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err::<http::Response<kube::client::Body>, _>(std::io::Error::new(
                    std::io::ErrorKind::ConnectionRefused,
                    "identity system unreachable",
                ))
            }
        });
        Client::new(service, "default")
    }

    fn group_object(value: serde_json::Value) -> DynamicObject {
        serde_json::from_value(value).unwrap()
    }

    fn members(name: &str, users: &[&str]) -> GroupMembers {
        GroupMembers {
            name: name.to_string(),
            users: users.iter().map(|u| u.to_string()).collect(),
        }
    }

    #[test]
    fn projects_group_object_users() {
        let obj = group_object(serde_json::json!({
            "apiVersion": "user.openshift.io/v1",
            "kind": "Group",
            "metadata": { "name": "trial-users" },
            "users": ["alice", "bob"],
        }));
        assert_eq!(group_members(&obj), members("trial-users", &["alice", "bob"]));
    }

    #[test]
    fn null_or_missing_users_is_empty_group() {
        let null_users = group_object(serde_json::json!({
            "apiVersion": "user.openshift.io/v1",
            "kind": "Group",
            "metadata": { "name": "empty" },
            "users": null,
        }));
        assert!(group_members(&null_users).users.is_empty());

        let no_users = group_object(serde_json::json!({
            "apiVersion": "user.openshift.io/v1",
            "kind": "Group",
            "metadata": { "name": "empty" },
        }));
        assert!(group_members(&no_users).users.is_empty());
    }

    #[test]
    fn memberships_include_authenticated_group() {
        let groups = vec![
            members("trial-users", &["alice"]),
            members("premium-users", &["bob"]),
            members("staff", &["alice", "bob"]),
        ];
        assert_eq!(
            memberships(&groups, "alice").unwrap(),
            vec!["trial-users", "staff", "system:authenticated"]
        );
    }

    #[test]
    fn user_in_no_group_is_not_found() {
        let groups = vec![members("trial-users", &["alice"])];
        let err = memberships(&groups, "mallory").unwrap_err();
        assert!(matches!(err, Error::UserNotFound { ref username } if username == "mallory"));
    }

    #[test]
    fn membership_is_exact_match() {
        let groups = vec![members("trial-users", &["alice-admin"])];
        assert!(memberships(&groups, "alice").is_err());
    }

    #[tokio::test]
    async fn authenticated_group_exists_without_remote_call() {
        let calls = Arc::new(AtomicUsize::new(0));
        let directory = OpenShiftGroupDirectory::new(unreachable_client(calls.clone()));

        assert!(directory
            .group_exists(SYSTEM_AUTHENTICATED_GROUP)
            .await
            .unwrap());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unreachable_identity_system_is_lookup_error() {
        let calls = Arc::new(AtomicUsize::new(0));
        let directory = OpenShiftGroupDirectory::new(unreachable_client(calls.clone()));

        let err = directory.group_exists("trial-users").await.unwrap_err();
        assert!(matches!(err, Error::IdentityLookup { ref subject, .. } if subject == "group trial-users"));
        assert!(calls.load(Ordering::SeqCst) >= 1);
    }
}
