use gdrive_core::{
    BatchItemResult, DriveClient, DriveError, FileUpdate, ListRequest, Mutation, Page, Permission,
    RemoteObject, UserInfo,
};

/// Everything the engine needs from the remote store.
///
/// Calls are awaited one at a time; implementations do not need to be `Send`.
#[allow(async_fn_in_trait)]
pub trait RemoteObjectService {
    async fn current_user(&self) -> Result<UserInfo, DriveError>;

    async fn list_objects(&self, request: &ListRequest) -> Result<Page<RemoteObject>, DriveError>;

    async fn list_permissions(
        &self,
        object_id: &str,
        request: &ListRequest,
    ) -> Result<Page<Permission>, DriveError>;

    async fn get_object(&self, object_id: &str) -> Result<RemoteObject, DriveError>;

    async fn create_folder(
        &self,
        name: &str,
        parents: &[String],
    ) -> Result<RemoteObject, DriveError>;

    async fn copy_object(
        &self,
        object_id: &str,
        name: &str,
        parents: &[String],
    ) -> Result<RemoteObject, DriveError>;

    async fn update_object(
        &self,
        object_id: &str,
        update: &FileUpdate,
    ) -> Result<RemoteObject, DriveError>;

    async fn execute_batch(
        &self,
        mutations: &[Mutation],
    ) -> Result<Vec<BatchItemResult>, DriveError>;
}

impl RemoteObjectService for DriveClient {
    async fn current_user(&self) -> Result<UserInfo, DriveError> {
        self.about_user().await
    }

    async fn list_objects(&self, request: &ListRequest) -> Result<Page<RemoteObject>, DriveError> {
        self.list_files(request).await
    }

    async fn list_permissions(
        &self,
        object_id: &str,
        request: &ListRequest,
    ) -> Result<Page<Permission>, DriveError> {
        DriveClient::list_permissions(self, object_id, request).await
    }

    async fn get_object(&self, object_id: &str) -> Result<RemoteObject, DriveError> {
        self.get_file(object_id).await
    }

    async fn create_folder(
        &self,
        name: &str,
        parents: &[String],
    ) -> Result<RemoteObject, DriveError> {
        DriveClient::create_folder(self, name, parents).await
    }

    async fn copy_object(
        &self,
        object_id: &str,
        name: &str,
        parents: &[String],
    ) -> Result<RemoteObject, DriveError> {
        self.copy_file(object_id, name, parents).await
    }

    async fn update_object(
        &self,
        object_id: &str,
        update: &FileUpdate,
    ) -> Result<RemoteObject, DriveError> {
        self.update_file(object_id, update).await
    }

    async fn execute_batch(
        &self,
        mutations: &[Mutation],
    ) -> Result<Vec<BatchItemResult>, DriveError> {
        DriveClient::execute_batch(self, mutations).await
    }
}
