//! In-memory Drive used by the engine tests.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};

use gdrive_core::{
    BatchItemResult, DriveError, FOLDER_MIME_TYPE, FileUpdate, ListRequest, Mutation, Owner, Page,
    Permission, RemoteObject, Role, StatusCode, UserInfo,
};

use crate::remote::RemoteObjectService;

pub(crate) const ME: &str = "me@example.com";
pub(crate) const OTHER: &str = "other@example.com";

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    CurrentUser,
    ListObjects(Option<String>),
    ListPermissions(String),
    GetObject(String),
    CreateFolder { name: String, parents: Vec<String> },
    Copy { id: String, name: String, parents: Vec<String> },
    Update { id: String, update: FileUpdate },
    Batch(Vec<Mutation>),
}

impl Call {
    fn is_mutation(&self) -> bool {
        matches!(
            self,
            Call::CreateFolder { .. } | Call::Copy { .. } | Call::Update { .. } | Call::Batch(_)
        )
    }
}

#[derive(Default)]
struct State {
    order: Vec<String>,
    objects: HashMap<String, RemoteObject>,
    permissions: HashMap<String, Vec<Permission>>,
    next_id: usize,
}

pub(crate) struct FakeDrive {
    user: UserInfo,
    state: RefCell<State>,
    calls: RefCell<Vec<Call>>,
    page_limit: Cell<Option<usize>>,
    fail_parent_removal: Cell<bool>,
    fail_batch_calls: Cell<bool>,
    failing_batch_files: RefCell<HashSet<String>>,
}

impl FakeDrive {
    pub(crate) fn new() -> Self {
        Self {
            user: me(),
            state: RefCell::new(State::default()),
            calls: RefCell::new(Vec::new()),
            page_limit: Cell::new(None),
            fail_parent_removal: Cell::new(false),
            fail_batch_calls: Cell::new(false),
            failing_batch_files: RefCell::new(HashSet::new()),
        }
    }

    /// Cap every listing page, forcing multi-page responses.
    pub(crate) fn with_page_limit(self, limit: usize) -> Self {
        self.page_limit.set(Some(limit));
        self
    }

    pub(crate) fn fail_parent_removal(&self) {
        self.fail_parent_removal.set(true);
    }

    /// Make every batch call fail as a whole, before any item is applied.
    pub(crate) fn fail_batch_calls(&self) {
        self.fail_batch_calls.set(true);
    }

    pub(crate) fn fail_batch_items_for(&self, file_id: &str) {
        self.failing_batch_files
            .borrow_mut()
            .insert(file_id.to_string());
    }

    pub(crate) fn add_folder(&self, id: &str, name: &str, parents: &[&str]) {
        self.insert(object(id, name, FOLDER_MIME_TYPE, parents, ME));
    }

    pub(crate) fn add_foreign_folder(&self, id: &str, name: &str, parents: &[&str]) {
        self.insert(object(id, name, FOLDER_MIME_TYPE, parents, OTHER));
    }

    pub(crate) fn add_file(&self, id: &str, name: &str, parents: &[&str]) {
        self.insert(object(id, name, "text/plain", parents, ME));
    }

    pub(crate) fn add_foreign_file(&self, id: &str, name: &str, parents: &[&str]) {
        self.insert(object(id, name, "text/plain", parents, OTHER));
    }

    pub(crate) fn grant(&self, object_id: &str, permission_id: &str, email: &str, role: Role) {
        self.state
            .borrow_mut()
            .permissions
            .entry(object_id.to_string())
            .or_default()
            .push(user_permission(permission_id, email, role));
    }

    pub(crate) fn share_link(&self, object_id: &str) {
        self.state
            .borrow_mut()
            .permissions
            .entry(object_id.to_string())
            .or_default()
            .push(Permission {
                id: gdrive_core::ANYONE_WITH_LINK.to_string(),
                grantee_type: Some("anyone".into()),
                email_address: None,
                role: Role::Reader,
            });
    }

    /// Drop the owner's address from both the owner list and the owner grant.
    pub(crate) fn hide_owner_email(&self, id: &str) {
        let mut state = self.state.borrow_mut();
        if let Some(owners) = state.objects.get_mut(id).and_then(|o| o.owners.as_mut()) {
            for owner in owners {
                owner.email_address = None;
            }
        }
        for grant in state.permissions.entry(id.to_string()).or_default() {
            if grant.is_owner() {
                grant.email_address = None;
            }
        }
    }

    pub(crate) fn object(&self, id: &str) -> RemoteObject {
        self.state.borrow().objects[id].clone()
    }

    pub(crate) fn permissions(&self, id: &str) -> Vec<Permission> {
        self.state
            .borrow()
            .permissions
            .get(id)
            .cloned()
            .unwrap_or_default()
    }

    pub(crate) fn emails(&self, id: &str) -> Vec<String> {
        let mut emails: Vec<String> = self
            .permissions(id)
            .into_iter()
            .filter_map(|p| p.email_address)
            .collect();
        emails.sort();
        emails
    }

    pub(crate) fn children_of(&self, id: &str) -> Vec<String> {
        let state = self.state.borrow();
        state
            .order
            .iter()
            .filter(|child| state.objects[*child].parents.iter().any(|p| p == id))
            .cloned()
            .collect()
    }

    pub(crate) fn named(&self, name: &str) -> Vec<RemoteObject> {
        let state = self.state.borrow();
        state
            .order
            .iter()
            .map(|id| state.objects[id].clone())
            .filter(|object| object.name == name)
            .collect()
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    pub(crate) fn mutation_calls(&self) -> usize {
        self.calls.borrow().iter().filter(|c| c.is_mutation()).count()
    }

    pub(crate) fn batch_calls(&self) -> Vec<Vec<Mutation>> {
        self.calls
            .borrow()
            .iter()
            .filter_map(|call| match call {
                Call::Batch(items) => Some(items.clone()),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn clear_calls(&self) {
        self.calls.borrow_mut().clear();
    }

    fn record(&self, call: Call) {
        self.calls.borrow_mut().push(call);
    }

    fn insert(&self, object: RemoteObject) {
        let mut state = self.state.borrow_mut();
        let owner = object
            .owners
            .as_ref()
            .and_then(|owners| owners.first())
            .map(|owner| {
                user_permission(
                    &owner.permission_id,
                    owner.email_address.as_deref().unwrap_or_default(),
                    Role::Owner,
                )
            });
        state
            .permissions
            .entry(object.id.clone())
            .or_default()
            .extend(owner);
        state.order.push(object.id.clone());
        state.objects.insert(object.id.clone(), object);
    }

    fn fresh_id(&self, prefix: &str) -> String {
        let mut state = self.state.borrow_mut();
        state.next_id += 1;
        format!("{prefix}-{}", state.next_id)
    }

    fn page_size(&self, request: &ListRequest) -> usize {
        let requested = request.page_size.map(|size| size as usize).unwrap_or(100);
        self.page_limit
            .get()
            .map_or(requested, |limit| limit.min(requested))
            .max(1)
    }

    fn apply(&self, mutation: &Mutation) -> Result<(), DriveError> {
        let mut state = self.state.borrow_mut();
        if !state.objects.contains_key(mutation.file_id()) {
            return Err(not_found(mutation.file_id()));
        }
        match mutation {
            Mutation::CreatePermission {
                file_id,
                email,
                role,
            } => {
                state.next_id += 1;
                let id = format!("perm-{}", state.next_id);
                state
                    .permissions
                    .entry(file_id.clone())
                    .or_default()
                    .push(user_permission(&id, email, *role));
            }
            Mutation::DeletePermission {
                file_id,
                permission_id,
            } => {
                let permissions = state.permissions.entry(file_id.clone()).or_default();
                let before = permissions.len();
                permissions.retain(|p| p.id != *permission_id);
                if permissions.len() == before {
                    return Err(not_found(permission_id));
                }
            }
            Mutation::Reparent {
                file_id,
                add_parents,
                remove_parents,
            } => {
                if let Some(object) = state.objects.get_mut(file_id) {
                    move_parents(object, add_parents, remove_parents);
                }
            }
        }
        Ok(())
    }
}

impl RemoteObjectService for FakeDrive {
    async fn current_user(&self) -> Result<UserInfo, DriveError> {
        self.record(Call::CurrentUser);
        Ok(self.user.clone())
    }

    async fn list_objects(&self, request: &ListRequest) -> Result<Page<RemoteObject>, DriveError> {
        self.record(Call::ListObjects(request.query.clone()));
        let state = self.state.borrow();
        let matching: Vec<RemoteObject> = state
            .order
            .iter()
            .map(|id| &state.objects[id])
            .filter(|object| {
                request
                    .query
                    .as_deref()
                    .is_none_or(|query| query_matches(query, object))
            })
            .cloned()
            .collect();
        Ok(paginate(matching, request, self.page_size(request)))
    }

    async fn list_permissions(
        &self,
        object_id: &str,
        request: &ListRequest,
    ) -> Result<Page<Permission>, DriveError> {
        self.record(Call::ListPermissions(object_id.to_string()));
        if !self.state.borrow().objects.contains_key(object_id) {
            return Err(not_found(object_id));
        }
        Ok(paginate(
            self.permissions(object_id),
            request,
            self.page_size(request),
        ))
    }

    async fn get_object(&self, object_id: &str) -> Result<RemoteObject, DriveError> {
        self.record(Call::GetObject(object_id.to_string()));
        self.state
            .borrow()
            .objects
            .get(object_id)
            .cloned()
            .ok_or_else(|| not_found(object_id))
    }

    async fn create_folder(
        &self,
        name: &str,
        parents: &[String],
    ) -> Result<RemoteObject, DriveError> {
        self.record(Call::CreateFolder {
            name: name.to_string(),
            parents: parents.to_vec(),
        });
        let id = self.fresh_id("folder");
        let parents: Vec<&str> = parents.iter().map(String::as_str).collect();
        let created = object(&id, name, FOLDER_MIME_TYPE, &parents, ME);
        self.insert(created.clone());
        Ok(created)
    }

    async fn copy_object(
        &self,
        object_id: &str,
        name: &str,
        parents: &[String],
    ) -> Result<RemoteObject, DriveError> {
        self.record(Call::Copy {
            id: object_id.to_string(),
            name: name.to_string(),
            parents: parents.to_vec(),
        });
        let source = self
            .state
            .borrow()
            .objects
            .get(object_id)
            .cloned()
            .ok_or_else(|| not_found(object_id))?;
        let id = self.fresh_id("copy");
        let parents: Vec<&str> = parents.iter().map(String::as_str).collect();
        let copy = object(&id, name, &source.mime_type, &parents, ME);
        self.insert(copy.clone());
        Ok(copy)
    }

    async fn update_object(
        &self,
        object_id: &str,
        update: &FileUpdate,
    ) -> Result<RemoteObject, DriveError> {
        self.record(Call::Update {
            id: object_id.to_string(),
            update: update.clone(),
        });
        if self.fail_parent_removal.get() && !update.remove_parents.is_empty() {
            return Err(DriveError::Api {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                body: "backend error".into(),
            });
        }
        let mut state = self.state.borrow_mut();
        let object = state
            .objects
            .get_mut(object_id)
            .ok_or_else(|| not_found(object_id))?;
        if let Some(name) = &update.name {
            object.name = name.clone();
        }
        move_parents(object, &update.add_parents, &update.remove_parents);
        Ok(object.clone())
    }

    async fn execute_batch(
        &self,
        mutations: &[Mutation],
    ) -> Result<Vec<BatchItemResult>, DriveError> {
        self.record(Call::Batch(mutations.to_vec()));
        if self.fail_batch_calls.get() {
            return Err(DriveError::Api {
                status: StatusCode::SERVICE_UNAVAILABLE,
                body: "backendError".into(),
            });
        }
        let failing = self.failing_batch_files.borrow().clone();
        Ok(mutations
            .iter()
            .enumerate()
            .map(|(index, mutation)| {
                let result = if failing.contains(mutation.file_id()) {
                    Err(DriveError::Api {
                        status: StatusCode::FORBIDDEN,
                        body: "insufficientFilePermissions".into(),
                    })
                } else {
                    self.apply(mutation)
                };
                BatchItemResult {
                    index,
                    content_id: format!("response-item-{index}"),
                    result,
                }
            })
            .collect())
    }
}

pub(crate) fn me() -> UserInfo {
    UserInfo {
        email_address: ME.into(),
        permission_id: "p-me".into(),
        display_name: None,
    }
}

pub(crate) fn user_permission(id: &str, email: &str, role: Role) -> Permission {
    Permission {
        id: id.to_string(),
        grantee_type: Some("user".into()),
        email_address: Some(email.to_string()),
        role,
    }
}

fn object(id: &str, name: &str, mime_type: &str, parents: &[&str], owner: &str) -> RemoteObject {
    let permission_id = if owner == ME { "p-me" } else { "p-other" };
    RemoteObject {
        id: id.to_string(),
        name: name.to_string(),
        mime_type: mime_type.to_string(),
        parents: parents.iter().map(|p| p.to_string()).collect(),
        owners: Some(vec![Owner {
            permission_id: permission_id.to_string(),
            email_address: Some(owner.to_string()),
        }]),
    }
}

fn move_parents(object: &mut RemoteObject, add: &[String], remove: &[String]) {
    object.parents.retain(|p| !remove.contains(p));
    for parent in add {
        if !object.parents.contains(parent) {
            object.parents.push(parent.clone());
        }
    }
}

fn not_found(id: &str) -> DriveError {
    DriveError::Api {
        status: StatusCode::NOT_FOUND,
        body: format!("File not found: {id}"),
    }
}

fn paginate<T>(items: Vec<T>, request: &ListRequest, size: usize) -> Page<T> {
    let offset = request
        .page_token
        .as_deref()
        .and_then(|token| token.parse::<usize>().ok())
        .unwrap_or(0);
    let total = items.len();
    let items: Vec<T> = items.into_iter().skip(offset).take(size).collect();
    let end = offset + items.len();
    Page {
        items,
        next_page_token: (end < total).then(|| end.to_string()),
    }
}

/// Evaluates the subset of the Drive query language the engine emits.
fn query_matches(query: &str, object: &RemoteObject) -> bool {
    split_top_level(query, " or ").iter().any(|disjunct| {
        split_top_level(disjunct, " and ")
            .iter()
            .all(|clause| clause_matches(clause.trim(), object))
    })
}

fn clause_matches(clause: &str, object: &RemoteObject) -> bool {
    if let Some(inner) = clause.strip_prefix('(').and_then(|c| c.strip_suffix(')')) {
        return query_matches(inner, object);
    }
    if clause == "trashed = false" {
        return true;
    }
    if let Some(value) = clause.strip_suffix(" in parents") {
        let id = unquote(value);
        return object.parents.iter().any(|p| *p == id);
    }
    if let Some(value) = clause.strip_prefix("mimeType != ") {
        return object.mime_type != unquote(value);
    }
    if let Some(value) = clause.strip_prefix("mimeType = ") {
        return object.mime_type == unquote(value);
    }
    if let Some(value) = clause.strip_prefix("name = ") {
        return object.name == unquote(value);
    }
    panic!("unsupported query clause: {clause}");
}

fn split_top_level<'a>(input: &'a str, separator: &str) -> Vec<&'a str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut in_quote = false;
    let mut escaped = false;
    let mut start = 0usize;
    for (index, ch) in input.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_quote => escaped = true,
            '\'' => in_quote = !in_quote,
            '(' if !in_quote => depth += 1,
            ')' if !in_quote => depth = depth.saturating_sub(1),
            _ => {
                if !in_quote
                    && depth == 0
                    && index >= start
                    && input[index..].starts_with(separator)
                {
                    parts.push(&input[start..index]);
                    start = index + separator.len();
                }
            }
        }
    }
    parts.push(&input[start..]);
    parts
}

fn unquote(value: &str) -> String {
    let value = value.trim();
    let inner = value
        .strip_prefix('\'')
        .and_then(|v| v.strip_suffix('\''))
        .unwrap_or(value);
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(ch);
        }
    }
    out
}
