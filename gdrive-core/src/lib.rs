mod batch;
mod client;
mod model;
mod oauth;
pub mod query;

pub use batch::{BatchItemResult, Mutation};
pub use client::{ApiErrorClass, DriveClient, DriveError, FileUpdate, ListRequest};
pub use model::{
    ANYONE_WITH_LINK, FOLDER_MIME_TYPE, ObjectKind, Owner, Page, Permission, RemoteObject, Role,
    UserInfo,
};
pub use oauth::{OAuthClient, OAuthError, OAuthToken};
pub use reqwest::StatusCode;
