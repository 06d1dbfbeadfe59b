mod token_storage;

pub(crate) use token_storage::now_unix;
pub use token_storage::{OAuthState, StorageError, TokenStorage};
