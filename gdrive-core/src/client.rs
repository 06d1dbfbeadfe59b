use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use url::Url;

use crate::batch::{self, BATCH_BOUNDARY, BatchItemResult, Mutation, push_segments};
use crate::model::{FOLDER_MIME_TYPE, Page, Permission, RemoteObject, UserInfo};

const DEFAULT_BASE_URL: &str = "https://www.googleapis.com";
const STANDARD_FIELDS: &str = "id,name,mimeType,parents,owners(emailAddress,permissionId)";
const PERMISSION_FIELDS: &str = "id,type,emailAddress,role";
const USER_FIELDS: &str = "user(emailAddress,permissionId,displayName)";

#[derive(Debug, Error)]
pub enum DriveError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("api returned {status}: {body}")]
    Api { status: StatusCode, body: String },
    #[error("malformed batch response: {0}")]
    Batch(String),
    #[error("batch call failed before the change to '{file_id}' was sent: {reason}")]
    NotSent { file_id: String, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorClass {
    Auth,
    NotFound,
    RateLimit,
    Transient,
    Permanent,
}

/// Parameters of one list call; `page_token` is advanced by the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListRequest {
    pub query: Option<String>,
    pub page_size: Option<u32>,
    pub page_token: Option<String>,
}

impl ListRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: Some(query.into()),
            ..Self::default()
        }
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = Some(page_size.max(1));
        self
    }

    /// Request for the page after `token`, or `None` when there is none.
    pub fn next_page(&self, token: Option<&str>) -> Option<Self> {
        token.map(|token| Self {
            page_token: Some(token.to_string()),
            ..self.clone()
        })
    }
}

/// Partial metadata update for `files.update`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileUpdate {
    pub name: Option<String>,
    pub add_parents: Vec<String>,
    pub remove_parents: Vec<String>,
}

impl FileUpdate {
    pub fn rename(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn remove_parents(parents: Vec<String>) -> Self {
        Self {
            remove_parents: parents,
            ..Self::default()
        }
    }
}

#[derive(Clone)]
pub struct DriveClient {
    http: Client,
    base_url: Url,
    token: String,
}

impl DriveClient {
    pub fn new(token: impl Into<String>) -> Result<Self, DriveError> {
        Self::with_base_url(DEFAULT_BASE_URL, token)
    }

    pub fn with_base_url(base_url: &str, token: impl Into<String>) -> Result<Self, DriveError> {
        Ok(Self {
            http: Client::new(),
            base_url: Url::parse(base_url)?,
            token: token.into(),
        })
    }

    pub async fn about_user(&self) -> Result<UserInfo, DriveError> {
        let mut url = self.endpoint("/drive/v3/about")?;
        url.query_pairs_mut().append_pair("fields", USER_FIELDS);
        let about: About = Self::handle_response(self.authorized(self.http.get(url))).await?;
        Ok(about.user)
    }

    pub async fn list_files(&self, request: &ListRequest) -> Result<Page<RemoteObject>, DriveError> {
        let mut url = self.endpoint("/drive/v3/files")?;
        {
            let mut query = url.query_pairs_mut();
            if let Some(q) = &request.query {
                query.append_pair("q", q);
            }
            append_paging(&mut query, request);
            query.append_pair("fields", &format!("nextPageToken,files({STANDARD_FIELDS})"));
        }
        let list: FileList = Self::handle_response(self.authorized(self.http.get(url))).await?;
        Ok(Page {
            items: list.files,
            next_page_token: list.next_page_token,
        })
    }

    pub async fn list_permissions(
        &self,
        file_id: &str,
        request: &ListRequest,
    ) -> Result<Page<Permission>, DriveError> {
        let mut url = self.file_endpoint(&[file_id, "permissions"])?;
        {
            let mut query = url.query_pairs_mut();
            append_paging(&mut query, request);
            query.append_pair(
                "fields",
                &format!("nextPageToken,permissions({PERMISSION_FIELDS})"),
            );
        }
        let list: PermissionList =
            Self::handle_response(self.authorized(self.http.get(url))).await?;
        Ok(Page {
            items: list.permissions,
            next_page_token: list.next_page_token,
        })
    }

    pub async fn get_file(&self, file_id: &str) -> Result<RemoteObject, DriveError> {
        let mut url = self.file_endpoint(&[file_id])?;
        url.query_pairs_mut().append_pair("fields", STANDARD_FIELDS);
        Self::handle_response(self.authorized(self.http.get(url))).await
    }

    pub async fn create_folder(
        &self,
        name: &str,
        parents: &[String],
    ) -> Result<RemoteObject, DriveError> {
        let mut url = self.endpoint("/drive/v3/files")?;
        url.query_pairs_mut().append_pair("fields", STANDARD_FIELDS);
        let body = json!({
            "name": name,
            "parents": parents,
            "mimeType": FOLDER_MIME_TYPE,
        });
        Self::handle_response(self.authorized(self.http.post(url).json(&body))).await
    }

    pub async fn copy_file(
        &self,
        file_id: &str,
        name: &str,
        parents: &[String],
    ) -> Result<RemoteObject, DriveError> {
        let mut url = self.file_endpoint(&[file_id, "copy"])?;
        url.query_pairs_mut().append_pair("fields", STANDARD_FIELDS);
        let body = json!({
            "name": name,
            "parents": parents,
        });
        Self::handle_response(self.authorized(self.http.post(url).json(&body))).await
    }

    pub async fn update_file(
        &self,
        file_id: &str,
        update: &FileUpdate,
    ) -> Result<RemoteObject, DriveError> {
        let mut url = self.file_endpoint(&[file_id])?;
        {
            let mut query = url.query_pairs_mut();
            if !update.add_parents.is_empty() {
                query.append_pair("addParents", &update.add_parents.join(","));
            }
            if !update.remove_parents.is_empty() {
                query.append_pair("removeParents", &update.remove_parents.join(","));
            }
            query.append_pair("fields", STANDARD_FIELDS);
        }
        let body = match &update.name {
            Some(name) => json!({ "name": name }),
            None => json!({}),
        };
        Self::handle_response(self.authorized(self.http.patch(url).json(&body))).await
    }

    pub async fn execute(&self, mutation: &Mutation) -> Result<(), DriveError> {
        let url = mutation.target(&self.base_url)?;
        let mut request = self.http.request(mutation.method(), url);
        if let Some(body) = mutation.body() {
            request = request.json(&body);
        }
        let response = self.authorized(request).send().await?;
        if response.status().is_success() {
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(DriveError::Api { status, body })
        }
    }

    /// Run all mutations in one `multipart/mixed` round trip.
    ///
    /// An `Err` means the batch call itself failed; per-item failures are
    /// returned inside the result list.
    pub async fn execute_batch(
        &self,
        mutations: &[Mutation],
    ) -> Result<Vec<BatchItemResult>, DriveError> {
        if mutations.is_empty() {
            return Ok(Vec::new());
        }
        let url = self.endpoint("/batch/drive/v3")?;
        let body = batch::encode(&self.base_url, mutations)?;
        let request = self
            .http
            .post(url)
            .header(
                CONTENT_TYPE,
                format!("multipart/mixed; boundary={BATCH_BOUNDARY}"),
            )
            .body(body);
        let response = self.authorized(request).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DriveError::Api { status, body });
        }
        let boundary = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .and_then(batch::boundary_from_content_type)
            .ok_or_else(|| DriveError::Batch("response has no multipart boundary".into()))?;
        let text = response.text().await?;
        batch::decode(&boundary, &text, mutations.len())
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request.bearer_auth(&self.token)
    }

    fn endpoint(&self, path: &str) -> Result<Url, DriveError> {
        Ok(self.base_url.join(path)?)
    }

    fn file_endpoint(&self, segments: &[&str]) -> Result<Url, DriveError> {
        let mut url = self.endpoint("/drive/v3/files")?;
        push_segments(&mut url, segments)?;
        Ok(url)
    }

    async fn handle_response<T: serde::de::DeserializeOwned>(
        request: RequestBuilder,
    ) -> Result<T, DriveError> {
        let response = request.send().await?;
        if response.status().is_success() {
            Ok(response.json::<T>().await?)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(DriveError::Api { status, body })
        }
    }
}

fn append_paging(
    query: &mut url::form_urlencoded::Serializer<'_, url::UrlQuery<'_>>,
    request: &ListRequest,
) {
    if let Some(page_size) = request.page_size {
        query.append_pair("pageSize", &page_size.to_string());
    }
    if let Some(token) = &request.page_token {
        query.append_pair("pageToken", token);
    }
}

impl DriveError {
    pub fn classification(&self) -> Option<ApiErrorClass> {
        match self {
            DriveError::Api { status, .. } => Some(classify_api_status(*status)),
            _ => None,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self.classification(),
            Some(ApiErrorClass::RateLimit | ApiErrorClass::Transient)
        )
    }
}

fn classify_api_status(status: StatusCode) -> ApiErrorClass {
    if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
        ApiErrorClass::Auth
    } else if status == StatusCode::NOT_FOUND {
        ApiErrorClass::NotFound
    } else if status == StatusCode::TOO_MANY_REQUESTS {
        ApiErrorClass::RateLimit
    } else if status.is_server_error()
        || matches!(status, StatusCode::REQUEST_TIMEOUT | StatusCode::CONFLICT)
    {
        ApiErrorClass::Transient
    } else {
        ApiErrorClass::Permanent
    }
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct FileList {
    #[serde(default)]
    files: Vec<RemoteObject>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct PermissionList {
    #[serde(default)]
    permissions: Vec<Permission>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
struct About {
    user: UserInfo,
}
