use reqwest::{Method, StatusCode};
use serde_json::{Value, json};
use url::Url;

use crate::client::DriveError;
use crate::model::Role;

pub(crate) const BATCH_BOUNDARY: &str = "gdrive_batch_3f9c2e7a51";

/// A remote mutation that can run on its own or inside a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    CreatePermission {
        file_id: String,
        email: String,
        role: Role,
    },
    DeletePermission {
        file_id: String,
        permission_id: String,
    },
    Reparent {
        file_id: String,
        add_parents: Vec<String>,
        remove_parents: Vec<String>,
    },
}

impl Mutation {
    pub fn file_id(&self) -> &str {
        match self {
            Mutation::CreatePermission { file_id, .. }
            | Mutation::DeletePermission { file_id, .. }
            | Mutation::Reparent { file_id, .. } => file_id,
        }
    }

    pub(crate) fn method(&self) -> Method {
        match self {
            Mutation::CreatePermission { .. } => Method::POST,
            Mutation::DeletePermission { .. } => Method::DELETE,
            Mutation::Reparent { .. } => Method::PATCH,
        }
    }

    pub(crate) fn target(&self, base: &Url) -> Result<Url, DriveError> {
        let mut url = base.join("/drive/v3/files")?;
        match self {
            Mutation::CreatePermission { file_id, .. } => {
                push_segments(&mut url, &[file_id, "permissions"])?;
            }
            Mutation::DeletePermission {
                file_id,
                permission_id,
            } => {
                push_segments(&mut url, &[file_id, "permissions", permission_id])?;
            }
            Mutation::Reparent {
                file_id,
                add_parents,
                remove_parents,
            } => {
                push_segments(&mut url, &[file_id])?;
                let mut query = url.query_pairs_mut();
                if !add_parents.is_empty() {
                    query.append_pair("addParents", &add_parents.join(","));
                }
                if !remove_parents.is_empty() {
                    query.append_pair("removeParents", &remove_parents.join(","));
                }
            }
        }
        if url.query() == Some("") {
            url.set_query(None);
        }
        Ok(url)
    }

    pub(crate) fn body(&self) -> Option<Value> {
        match self {
            Mutation::CreatePermission { email, role, .. } => Some(json!({
                "type": "user",
                "role": role.as_str(),
                "emailAddress": email,
            })),
            Mutation::DeletePermission { .. } => None,
            Mutation::Reparent { .. } => Some(json!({})),
        }
    }
}

pub(crate) fn push_segments(url: &mut Url, segments: &[&str]) -> Result<(), DriveError> {
    let shown = url.to_string();
    url.path_segments_mut()
        .map_err(|_| DriveError::Batch(format!("cannot extend base url {shown}")))?
        .extend(segments);
    Ok(())
}

/// Outcome of one mutation inside an executed batch.
#[derive(Debug)]
pub struct BatchItemResult {
    pub index: usize,
    pub content_id: String,
    pub result: Result<(), DriveError>,
}

pub(crate) fn encode(base: &Url, mutations: &[Mutation]) -> Result<String, DriveError> {
    let mut out = String::new();
    for (index, mutation) in mutations.iter().enumerate() {
        let target = mutation.target(base)?;
        let mut request_line = target.path().to_string();
        if let Some(query) = target.query() {
            request_line.push('?');
            request_line.push_str(query);
        }
        out.push_str(&format!("--{BATCH_BOUNDARY}\r\n"));
        out.push_str("Content-Type: application/http\r\n");
        out.push_str(&format!("Content-ID: <item-{index}>\r\n\r\n"));
        out.push_str(&format!("{} {request_line} HTTP/1.1\r\n", mutation.method()));
        match mutation.body() {
            Some(body) => {
                out.push_str("Content-Type: application/json; charset=UTF-8\r\n\r\n");
                out.push_str(&serde_json::to_string(&body)?);
                out.push_str("\r\n");
            }
            None => out.push_str("\r\n"),
        }
    }
    out.push_str(&format!("--{BATCH_BOUNDARY}--\r\n"));
    Ok(out)
}

pub(crate) fn boundary_from_content_type(content_type: &str) -> Option<String> {
    content_type.split(';').find_map(|param| {
        let (key, value) = param.trim().split_once('=')?;
        key.eq_ignore_ascii_case("boundary")
            .then(|| value.trim_matches('"').to_string())
    })
}

/// Split a `multipart/mixed` batch response back into per-item results.
///
/// Items the server did not answer are reported as failures.
pub(crate) fn decode(
    boundary: &str,
    body: &str,
    expected: usize,
) -> Result<Vec<BatchItemResult>, DriveError> {
    let normalized = body.replace("\r\n", "\n");
    let delimiter = format!("--{boundary}");
    let mut slots: Vec<Option<BatchItemResult>> = (0..expected).map(|_| None).collect();

    for part in normalized.split(delimiter.as_str()).skip(1) {
        if part.starts_with("--") {
            break;
        }
        let part = part.trim_start_matches('\n');
        let (headers, http) = part
            .split_once("\n\n")
            .ok_or_else(|| DriveError::Batch("batch part without body".into()))?;
        let content_id = header_value(headers, "content-id")
            .map(|value| value.trim_matches(|c| c == '<' || c == '>').to_string())
            .ok_or_else(|| DriveError::Batch("batch part without Content-ID".into()))?;
        let index = content_id
            .trim_start_matches("response-")
            .strip_prefix("item-")
            .and_then(|n| n.parse::<usize>().ok())
            .filter(|n| *n < expected)
            .ok_or_else(|| DriveError::Batch(format!("unexpected Content-ID {content_id}")))?;

        let (status, payload) = parse_embedded_response(http)?;
        let result = if status.is_success() {
            Ok(())
        } else {
            Err(DriveError::Api {
                status,
                body: payload,
            })
        };
        slots[index] = Some(BatchItemResult {
            index,
            content_id,
            result,
        });
    }

    Ok(slots
        .into_iter()
        .enumerate()
        .map(|(index, slot)| {
            slot.unwrap_or_else(|| BatchItemResult {
                index,
                content_id: format!("response-item-{index}"),
                result: Err(DriveError::Batch("no response for batch item".into())),
            })
        })
        .collect())
}

fn header_value<'a>(headers: &'a str, name: &str) -> Option<&'a str> {
    headers.lines().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        key.trim()
            .eq_ignore_ascii_case(name)
            .then_some(value.trim())
    })
}

fn parse_embedded_response(http: &str) -> Result<(StatusCode, String), DriveError> {
    let status_line = http
        .lines()
        .next()
        .ok_or_else(|| DriveError::Batch("empty embedded response".into()))?;
    let code = status_line
        .split_whitespace()
        .nth(1)
        .and_then(|code| code.parse::<u16>().ok())
        .and_then(|code| StatusCode::from_u16(code).ok())
        .ok_or_else(|| DriveError::Batch(format!("bad status line: {status_line}")))?;
    let payload = http
        .split_once("\n\n")
        .map(|(_, payload)| payload.trim().to_string())
        .unwrap_or_default();
    Ok((code, payload))
}
