use std::fmt;

use gdrive_core::{DriveError, FileUpdate, ListRequest, Mutation, RemoteObject, UserInfo, query};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::batch::{BatchAggregator, DEFAULT_BATCH_CAPACITY};
use crate::pager;
use crate::permissions::{DEFAULT_PAGE_SIZE, what_if_prefix};
use crate::remote::RemoteObjectService;
use crate::scope::FolderSet;

/// Prefix held by the original object while its replacement is created.
pub const RENAME_PREFIX: &str = "Old - ";

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("remote call failed: {0}")]
    Remote(#[from] DriveError),
    #[error("'{0}' has no parent inside the managed folders")]
    NoScopedParents(String),
    #[error("{failed} children of '{name}' could not be moved; original left in place")]
    RelinkIncomplete { name: String, failed: usize },
    #[error("owner of '{0}' is not known")]
    OwnerUnknown(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    Owned,
    NotOwned,
    Renamed,
    Duplicated,
    ChildrenRelinked,
    Detached,
}

impl fmt::Display for TransferState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TransferState::Owned => "owned",
            TransferState::NotOwned => "not-owned",
            TransferState::Renamed => "renamed",
            TransferState::Duplicated => "duplicated",
            TransferState::ChildrenRelinked => "children-relinked",
            TransferState::Detached => "detached",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    /// Already ours; carries the object unchanged.
    AlreadyOwned(RemoteObject),
    /// Dry run stopped before the first mutation.
    Planned,
    /// The replacement owned by the acting user.
    Transferred(RemoteObject),
}

impl TransferOutcome {
    /// The object whose permissions should be reconciled afterwards.
    pub fn current<'o>(&'o self, original: &'o RemoteObject) -> &'o RemoteObject {
        match self {
            TransferOutcome::AlreadyOwned(object) | TransferOutcome::Transferred(object) => object,
            TransferOutcome::Planned => original,
        }
    }
}

/// Temporary rename of the original object.
///
/// Async code cannot restore on drop, so every path that acquires a guard
/// must call `release`.
struct RenameGuard {
    object_id: String,
    original_name: String,
}

impl RenameGuard {
    async fn acquire<S: RemoteObjectService>(
        service: &S,
        object: &RemoteObject,
    ) -> Result<Self, DriveError> {
        let temporary = format!("{RENAME_PREFIX}{}", object.name);
        service
            .update_object(&object.id, &FileUpdate::rename(temporary))
            .await?;
        Ok(Self {
            object_id: object.id.clone(),
            original_name: object.name.clone(),
        })
    }

    async fn release<S: RemoteObjectService>(self, service: &S) -> Result<(), DriveError> {
        service
            .update_object(&self.object_id, &FileUpdate::rename(self.original_name))
            .await
            .map(|_| ())
    }
}

/// Replaces objects the acting user does not own with owned duplicates.
///
/// Sequence for a foreign object: rename the original, duplicate it at its
/// in-scope parents under the original name, move a container's children to
/// the duplicate, detach the original from the in-scope parents, restore the
/// original's name. Nothing is rolled back; partial transfers are returned as
/// errors.
///
/// The name is restored after the detach, so on success the duplicate and
/// the original never share an in-scope parent under the same name. When the
/// detach itself fails the restore still runs and both objects are left in
/// the same folder carrying the same name.
pub struct OwnershipTransfer<'a, S> {
    service: &'a S,
    acting_user: &'a UserInfo,
    scope: &'a FolderSet,
    dry_run: bool,
    batch_capacity: usize,
    page_size: u32,
}

impl<'a, S: RemoteObjectService> OwnershipTransfer<'a, S> {
    pub fn new(service: &'a S, acting_user: &'a UserInfo, scope: &'a FolderSet) -> Self {
        Self {
            service,
            acting_user,
            scope,
            dry_run: false,
            batch_capacity: DEFAULT_BATCH_CAPACITY,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_batch_capacity(mut self, capacity: usize) -> Self {
        self.batch_capacity = capacity;
        self
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    /// Owner check against the embedded owner list, fetching the object when
    /// the listing did not include it.
    pub async fn is_owner(&self, object: &RemoteObject) -> Result<bool, TransferError> {
        if let Some(owned) = object.is_owned_by(self.acting_user) {
            return Ok(owned);
        }
        let fresh = self.service.get_object(&object.id).await?;
        fresh
            .is_owned_by(self.acting_user)
            .ok_or_else(|| TransferError::OwnerUnknown(object.name.clone()))
    }

    pub async fn transfer(&self, object: &RemoteObject) -> Result<TransferOutcome, TransferError> {
        if self.is_owner(object).await? {
            enter(object, TransferState::Owned);
            return Ok(TransferOutcome::AlreadyOwned(object.clone()));
        }
        enter(object, TransferState::NotOwned);

        info!(
            "{}Taking ownership of '{}' from '{}'.",
            what_if_prefix(self.dry_run),
            object.name,
            owner_label(object)
        );
        if self.dry_run {
            return Ok(TransferOutcome::Planned);
        }

        let parents = self.scope.in_scope_parents(object);
        if parents.is_empty() {
            return Err(TransferError::NoScopedParents(object.name.clone()));
        }

        let guard = RenameGuard::acquire(self.service, object).await?;
        enter(object, TransferState::Renamed);
        let replaced = self.replace(object, &parents).await;
        let restored = guard.release(self.service).await;

        match (replaced, restored) {
            (Ok(replacement), Ok(())) => Ok(TransferOutcome::Transferred(replacement)),
            (Ok(_), Err(err)) => Err(err.into()),
            (Err(err), Ok(())) => Err(err),
            (Err(err), Err(restore)) => {
                warn!("Could not restore the name of '{}': {restore}", object.name);
                Err(err)
            }
        }
    }

    async fn replace(
        &self,
        object: &RemoteObject,
        parents: &[String],
    ) -> Result<RemoteObject, TransferError> {
        let replacement = if object.is_folder() {
            self.service.create_folder(&object.name, parents).await?
        } else {
            let copy = self
                .service
                .copy_object(&object.id, &object.name, parents)
                .await?;
            self.service.get_object(&copy.id).await?
        };
        enter(object, TransferState::Duplicated);

        if object.is_folder() {
            self.relink_children(object, &replacement).await?;
            enter(object, TransferState::ChildrenRelinked);
        }

        self.service
            .update_object(&object.id, &FileUpdate::remove_parents(parents.to_vec()))
            .await?;
        enter(object, TransferState::Detached);
        Ok(replacement)
    }

    async fn relink_children(
        &self,
        original: &RemoteObject,
        replacement: &RemoteObject,
    ) -> Result<(), TransferError> {
        // Collect first: reparenting shrinks the listing being paged.
        let request =
            ListRequest::new(query::in_parents(&original.id)).with_page_size(self.page_size);
        let children = pager::objects(self.service, request).try_collect().await?;
        debug!(object = %original.name, children = children.len(), "relinking children");

        let mut batch = BatchAggregator::new(self.service, self.batch_capacity);
        for child in children {
            batch
                .add(Mutation::Reparent {
                    file_id: child.id,
                    add_parents: vec![replacement.id.clone()],
                    remove_parents: vec![original.id.clone()],
                })
                .await?;
        }
        batch.flush().await?;

        match batch.failed_items() {
            0 => Ok(()),
            failed => Err(TransferError::RelinkIncomplete {
                name: original.name.clone(),
                failed,
            }),
        }
    }
}

/// First owner address the listing exposed. Display only.
fn owner_label(object: &RemoteObject) -> &str {
    object
        .owners
        .iter()
        .flatten()
        .find_map(|owner| owner.email_address.as_deref())
        .unwrap_or("unknown owner")
}

fn enter(object: &RemoteObject, state: TransferState) {
    debug!(object = %object.name, id = %object.id, %state, "transfer state");
}
