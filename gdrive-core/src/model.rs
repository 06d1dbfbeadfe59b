use serde::{Deserialize, Serialize};

pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

/// Permission id Drive uses for "anyone holding the link".
pub const ANYONE_WITH_LINK: &str = "anyoneWithLink";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    File,
    Folder,
}

/// File or folder metadata as returned with the standard field mask.
///
/// `owners` stays `None` when the listing that produced the object did not
/// request it; callers that need ownership must fetch it explicitly.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RemoteObject {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub parents: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owners: Option<Vec<Owner>>,
}

impl RemoteObject {
    pub fn kind(&self) -> ObjectKind {
        if self.mime_type == FOLDER_MIME_TYPE {
            ObjectKind::Folder
        } else {
            ObjectKind::File
        }
    }

    pub fn is_folder(&self) -> bool {
        self.kind() == ObjectKind::Folder
    }

    /// `None` when the owner list was not part of the fetched metadata.
    pub fn is_owned_by(&self, user: &UserInfo) -> Option<bool> {
        self.owners.as_ref().map(|owners| {
            owners
                .iter()
                .any(|owner| owner.permission_id == user.permission_id)
        })
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Owner {
    pub permission_id: String,
    #[serde(default)]
    pub email_address: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Reader,
    #[default]
    Writer,
    Commenter,
    Owner,
    #[serde(other)]
    Other,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Reader => "reader",
            Role::Writer => "writer",
            Role::Commenter => "commenter",
            Role::Owner => "owner",
            Role::Other => "other",
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Permission {
    pub id: String,
    #[serde(rename = "type", default)]
    pub grantee_type: Option<String>,
    #[serde(default)]
    pub email_address: Option<String>,
    pub role: Role,
}

impl Permission {
    pub fn is_link(&self) -> bool {
        self.id == ANYONE_WITH_LINK || self.grantee_type.as_deref() == Some("anyone")
    }

    pub fn is_owner(&self) -> bool {
        self.role == Role::Owner
    }
}

/// The authenticated account, as reported by `about.get`.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    pub email_address: String,
    pub permission_id: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

/// One page of a cursor-paginated listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_page_token: Option<String>,
}

impl<T> Page<T> {
    pub fn last(items: Vec<T>) -> Self {
        Self {
            items,
            next_page_token: None,
        }
    }
}
