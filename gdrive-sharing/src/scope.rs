use std::collections::HashSet;

use gdrive_core::{DriveError, ListRequest, RemoteObject, query};
use thiserror::Error;
use tracing::{debug, info};

use crate::pager;
use crate::remote::RemoteObjectService;

#[derive(Debug, Error)]
pub enum ScopeError {
    #[error("Folder '{0}' was not found.")]
    NotFound(String),
    #[error("remote call failed: {0}")]
    Remote(#[from] DriveError),
}

/// The root folder plus every folder below it.
///
/// Only parent links to folders in this set are ever modified. Descendants
/// keep discovery order: deeper folders come before the folders that contain
/// them, and the root is last.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderSet {
    root_id: String,
    order: Vec<String>,
    members: HashSet<String>,
}

impl FolderSet {
    pub fn new(root_id: impl Into<String>, descendants: Vec<String>) -> Self {
        let root_id = root_id.into();
        let mut members = HashSet::with_capacity(descendants.len() + 1);
        let mut order = Vec::with_capacity(descendants.len() + 1);
        for id in descendants.into_iter().chain(std::iter::once(root_id.clone())) {
            if members.insert(id.clone()) {
                order.push(id);
            }
        }
        Self {
            root_id,
            order,
            members,
        }
    }

    pub fn root_id(&self) -> &str {
        &self.root_id
    }

    pub fn contains(&self, id: &str) -> bool {
        self.members.contains(id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Descendant folders, deepest first, without the root.
    pub fn descendants(&self) -> impl Iterator<Item = &str> {
        self.order
            .iter()
            .map(String::as_str)
            .filter(|id| *id != self.root_id)
    }

    /// The object's parents that lie inside this set, in the object's order.
    pub fn in_scope_parents(&self, object: &RemoteObject) -> Vec<String> {
        object
            .parents
            .iter()
            .filter(|parent| self.contains(parent))
            .cloned()
            .collect()
    }

    /// Query clause selecting direct children of any folder in the set.
    ///
    /// One `'<id>' in parents` clause per folder, OR-joined, so the query
    /// grows linearly with the tree. Very large trees can exceed what the
    /// server accepts in a single `q` parameter.
    pub fn parent_filter(&self) -> String {
        self.order
            .iter()
            .map(|id| query::in_parents(id))
            .collect::<Vec<_>>()
            .join(" or ")
    }
}

pub struct TreeScanner<'a, S> {
    service: &'a S,
    page_size: u32,
}

impl<'a, S: RemoteObjectService> TreeScanner<'a, S> {
    pub fn new(service: &'a S, page_size: u32) -> Self {
        Self { service, page_size }
    }

    /// Resolve a folder by exact name. With duplicates the first folder the
    /// service returns wins.
    pub async fn resolve_root(&self, name: &str) -> Result<String, ScopeError> {
        let request = ListRequest::new(query::folder_named(name)).with_page_size(1);
        let mut folders = pager::objects(self.service, request);
        match folders.try_next().await? {
            Some(folder) => Ok(folder.id),
            None => Err(ScopeError::NotFound(name.to_string())),
        }
    }

    /// Every folder below `folder_id`, children before their parent, without
    /// `folder_id` itself.
    ///
    /// Assumes the folder graph has no cycles; a cycle makes this recurse
    /// forever.
    pub async fn discover_subtree(&self, folder_id: &str) -> Result<Vec<String>, ScopeError> {
        let mut found = Vec::new();
        let request =
            ListRequest::new(query::child_folders_of(folder_id)).with_page_size(self.page_size);
        let mut children = pager::objects(self.service, request);
        while let Some(child) = children.try_next().await? {
            let nested = Box::pin(self.discover_subtree(&child.id)).await?;
            found.extend(nested);
            found.push(child.id);
        }
        Ok(found)
    }

    pub async fn scan(&self, root_name: &str) -> Result<FolderSet, ScopeError> {
        info!("Scanning folders...");
        let root_id = self.resolve_root(root_name).await?;
        debug!(root = %root_id, "resolved root folder");
        let descendants = self.discover_subtree(&root_id).await?;
        let scope = FolderSet::new(root_id, descendants);
        info!(folders = scope.len(), "Finished scanning folders.");
        Ok(scope)
    }
}
