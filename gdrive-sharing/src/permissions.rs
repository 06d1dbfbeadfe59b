use std::collections::BTreeSet;

use gdrive_core::{BatchItemResult, DriveError, Mutation, Permission, RemoteObject, Role, UserInfo};
use tracing::info;

use crate::batch::{BatchAggregator, DEFAULT_BATCH_CAPACITY};
use crate::desired::{DesiredState, normalize_email};
use crate::pager;
use crate::remote::RemoteObjectService;

pub const DEFAULT_PAGE_SIZE: u32 = 1000;

/// One change needed to bring an object's grants to the desired state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlannedAction {
    DisableLink { permission_id: String },
    Revoke { permission_id: String, email: String },
    Grant { email: String, role: Role },
}

impl PlannedAction {
    pub fn to_mutation(&self, object_id: &str) -> Mutation {
        match self {
            PlannedAction::DisableLink { permission_id }
            | PlannedAction::Revoke { permission_id, .. } => Mutation::DeletePermission {
                file_id: object_id.to_string(),
                permission_id: permission_id.clone(),
            },
            PlannedAction::Grant { email, role } => Mutation::CreatePermission {
                file_id: object_id.to_string(),
                email: email.clone(),
                role: *role,
            },
        }
    }

    pub fn describe(&self, object_name: &str) -> String {
        match self {
            PlannedAction::DisableLink { .. } => format!("Disabling link for '{object_name}'"),
            PlannedAction::Revoke { email, .. } => {
                format!("Deleting access to '{object_name}' for '{email}'.")
            }
            PlannedAction::Grant { email, .. } => {
                format!("Adding access to '{object_name}' for '{email}'.")
            }
        }
    }
}

pub(crate) fn what_if_prefix(dry_run: bool) -> &'static str {
    if dry_run { "What-If: " } else { "" }
}

/// Diffs an object's grants against the desired collaborator set.
///
/// The desired set is the complete target, so running twice against
/// unchanged state issues nothing the second time. Owner grants and the
/// acting user's own grant are never touched.
pub struct PermissionReconciler<'a, S> {
    service: &'a S,
    acting_user: &'a UserInfo,
    desired: &'a DesiredState,
    batch_capacity: usize,
    page_size: u32,
}

impl<'a, S: RemoteObjectService> PermissionReconciler<'a, S> {
    pub fn new(service: &'a S, acting_user: &'a UserInfo, desired: &'a DesiredState) -> Self {
        Self {
            service,
            acting_user,
            desired,
            batch_capacity: DEFAULT_BATCH_CAPACITY,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_batch_capacity(mut self, capacity: usize) -> Self {
        self.batch_capacity = capacity;
        self
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn plan(&self, permissions: &[Permission]) -> Vec<PlannedAction> {
        let acting_email = normalize_email(&self.acting_user.email_address);
        let mut actions = Vec::new();
        let mut present = BTreeSet::new();

        for permission in permissions {
            if permission.is_owner() {
                if let Some(email) = &permission.email_address {
                    present.insert(normalize_email(email));
                }
                continue;
            }
            if permission.is_link() {
                if self.desired.disable_links {
                    actions.push(PlannedAction::DisableLink {
                        permission_id: permission.id.clone(),
                    });
                }
                continue;
            }
            // Domain and other non-identity grants carry no address to compare.
            let Some(email) = &permission.email_address else {
                continue;
            };
            let email = normalize_email(email);
            if email == acting_email || self.desired.wants(&email) {
                present.insert(email);
            } else {
                actions.push(PlannedAction::Revoke {
                    permission_id: permission.id.clone(),
                    email,
                });
            }
        }

        actions.extend(
            self.desired
                .collaborators()
                .difference(&present)
                .map(|email| PlannedAction::Grant {
                    email: email.clone(),
                    role: self.desired.role(),
                }),
        );
        actions
    }

    /// Converge `object` using a batch scoped to this call, flushed before
    /// returning. `permissions` are fetched when not supplied.
    pub async fn reconcile(
        &self,
        object: &RemoteObject,
        permissions: Option<Vec<Permission>>,
    ) -> Result<Vec<PlannedAction>, DriveError> {
        let mut batch = BatchAggregator::new(self.service, self.batch_capacity);
        let actions = self.reconcile_into(object, permissions, &mut batch).await?;
        batch.flush().await?;
        Ok(actions)
    }

    /// Converge `object`, queueing mutations on the caller's batch. The caller
    /// owns the final flush.
    pub async fn reconcile_into<F>(
        &self,
        object: &RemoteObject,
        permissions: Option<Vec<Permission>>,
        batch: &mut BatchAggregator<'_, S, F>,
    ) -> Result<Vec<PlannedAction>, DriveError>
    where
        F: FnMut(&BatchItemResult),
    {
        let permissions = match permissions {
            Some(permissions) => permissions,
            None => {
                pager::permissions(self.service, &object.id, self.page_size)
                    .try_collect()
                    .await?
            }
        };
        let actions = self.plan(&permissions);
        let prefix = what_if_prefix(self.desired.dry_run);
        for action in &actions {
            info!("{prefix}{}", action.describe(&object.name));
            if !self.desired.dry_run {
                batch.add(action.to_mutation(&object.id)).await?;
            }
        }
        Ok(actions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Call, FakeDrive, me, user_permission};

    fn link() -> Permission {
        Permission {
            id: gdrive_core::ANYONE_WITH_LINK.into(),
            grantee_type: Some("anyone".into()),
            email_address: None,
            role: Role::Reader,
        }
    }

    fn shared_doc(drive: &FakeDrive) -> RemoteObject {
        drive.add_file("doc", "Plan", &[]);
        drive.grant("doc", "pa", "a@example.com", Role::Writer);
        drive.grant("doc", "pc", "c@example.com", Role::Writer);
        drive.share_link("doc");
        drive.object("doc")
    }

    #[test]
    fn plan_revokes_extras_disables_link_and_grants_missing() {
        let drive = FakeDrive::new();
        let user = me();
        let desired = DesiredState::new(["a@example.com", "b@example.com"]).disable_links(true);
        let reconciler = PermissionReconciler::new(&drive, &user, &desired);

        let actions = reconciler.plan(&[
            user_permission("pa", "a@example.com", Role::Writer),
            user_permission("pc", "c@example.com", Role::Writer),
            link(),
        ]);

        assert_eq!(
            actions,
            vec![
                PlannedAction::Revoke {
                    permission_id: "pc".into(),
                    email: "c@example.com".into(),
                },
                PlannedAction::DisableLink {
                    permission_id: gdrive_core::ANYONE_WITH_LINK.into(),
                },
                PlannedAction::Grant {
                    email: "b@example.com".into(),
                    role: Role::Writer,
                },
            ]
        );
    }

    #[test]
    fn link_survives_unless_disabled() {
        let drive = FakeDrive::new();
        let user = me();
        let desired = DesiredState::new(Vec::<String>::new());
        let reconciler = PermissionReconciler::new(&drive, &user, &desired);

        assert!(reconciler.plan(&[link()]).is_empty());
    }

    #[test]
    fn owner_and_acting_user_are_never_revoked() {
        let drive = FakeDrive::new();
        let user = me();
        let desired = DesiredState::new(Vec::<String>::new()).disable_links(true);
        let reconciler = PermissionReconciler::new(&drive, &user, &desired);

        let actions = reconciler.plan(&[
            user_permission("po", "boss@example.com", Role::Owner),
            user_permission("p-me", "Me@Example.com", Role::Writer),
        ]);

        assert!(actions.is_empty());
    }

    #[test]
    fn existing_owner_counts_as_present() {
        let drive = FakeDrive::new();
        let user = me();
        let desired = DesiredState::new(["boss@example.com"])
            .with_role(Role::Commenter)
            .unwrap();
        let reconciler = PermissionReconciler::new(&drive, &user, &desired);

        let actions = reconciler.plan(&[
            user_permission("po", "boss@example.com", Role::Owner),
            user_permission("px", "x@example.com", Role::Reader),
        ]);

        assert_eq!(
            actions,
            vec![PlannedAction::Revoke {
                permission_id: "px".into(),
                email: "x@example.com".into(),
            }]
        );
    }

    #[tokio::test]
    async fn reconcile_converges_and_second_pass_is_empty() {
        let drive = FakeDrive::new();
        let doc = shared_doc(&drive);
        let user = me();
        let desired = DesiredState::new(["a@example.com", "b@example.com"]).disable_links(true);
        let reconciler = PermissionReconciler::new(&drive, &user, &desired);

        let first = reconciler.reconcile(&doc, None).await.unwrap();
        assert_eq!(first.len(), 3);
        assert_eq!(
            drive.emails("doc"),
            vec!["a@example.com", "b@example.com", "me@example.com"]
        );
        assert!(drive.permissions("doc").iter().all(|p| !p.is_link()));

        drive.clear_calls();
        let second = reconciler.reconcile(&doc, None).await.unwrap();
        assert!(second.is_empty());
        assert_eq!(drive.mutation_calls(), 0);
    }

    #[tokio::test]
    async fn reconcile_fetches_permissions_when_not_supplied() {
        let drive = FakeDrive::new();
        let doc = shared_doc(&drive);
        let user = me();
        let desired = DesiredState::new(["a@example.com", "c@example.com"]);
        let reconciler = PermissionReconciler::new(&drive, &user, &desired);

        let actions = reconciler.reconcile(&doc, None).await.unwrap();

        assert!(actions.is_empty());
        assert_eq!(drive.calls(), vec![Call::ListPermissions("doc".into())]);
    }

    #[tokio::test]
    async fn supplied_permissions_skip_the_fetch() {
        let drive = FakeDrive::new();
        let doc = shared_doc(&drive);
        let user = me();
        let desired = DesiredState::new(["a@example.com"]);
        let reconciler = PermissionReconciler::new(&drive, &user, &desired);

        let actions = reconciler
            .reconcile(&doc, Some(drive.permissions("doc")))
            .await
            .unwrap();

        assert_eq!(actions.len(), 1);
        assert!(
            !drive
                .calls()
                .iter()
                .any(|call| matches!(call, Call::ListPermissions(_)))
        );
        assert_eq!(drive.batch_calls().len(), 1);
    }

    #[tokio::test]
    async fn dry_run_reports_without_mutating() {
        let drive = FakeDrive::new();
        let doc = shared_doc(&drive);
        let user = me();
        let desired = DesiredState::new(["b@example.com"])
            .disable_links(true)
            .dry_run(true);
        let reconciler = PermissionReconciler::new(&drive, &user, &desired);

        let actions = reconciler.reconcile(&doc, None).await.unwrap();

        assert_eq!(actions.len(), 4);
        assert_eq!(drive.mutation_calls(), 0);
        assert_eq!(drive.permissions("doc").len(), 4);
    }

    #[tokio::test]
    async fn caller_batch_is_not_flushed() {
        let drive = FakeDrive::new();
        let doc = shared_doc(&drive);
        let user = me();
        let desired = DesiredState::new(["a@example.com", "b@example.com"]);
        let reconciler = PermissionReconciler::new(&drive, &user, &desired);
        let mut batch = BatchAggregator::new(&drive, 100);

        reconciler
            .reconcile_into(&doc, None, &mut batch)
            .await
            .unwrap();
        assert_eq!(batch.pending(), 2);
        assert_eq!(drive.mutation_calls(), 0);

        batch.flush().await.unwrap();
        assert_eq!(
            drive.emails("doc"),
            vec!["a@example.com", "b@example.com", "me@example.com"]
        );
    }

    #[test]
    fn actions_describe_themselves() {
        let revoke = PlannedAction::Revoke {
            permission_id: "pc".into(),
            email: "c@example.com".into(),
        };
        assert_eq!(
            revoke.describe("Plan"),
            "Deleting access to 'Plan' for 'c@example.com'."
        );
        assert_eq!(
            revoke.to_mutation("doc"),
            Mutation::DeletePermission {
                file_id: "doc".into(),
                permission_id: "pc".into(),
            }
        );
    }
}
