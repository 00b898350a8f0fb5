//! GraphQL envelope codec.
//!
//! Every backend response is expected to follow the `{data, errors}`
//! envelope. Decoding surfaces a structured error when the envelope
//! reports failure; the multipart builder produces the conventional
//! GraphQL upload layout (`operations`, `map`, file part).

use rand::Rng;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use super::ApiError;

#[derive(Debug, Serialize)]
pub struct GraphqlRequest<'a> {
    pub query: &'a str,
    pub variables: Value,
}

/// The backend serializes envelope fields in varying casings depending
/// on the resolver, so both are accepted.
#[derive(Debug, Deserialize)]
pub struct GraphqlErrorEntry {
    #[serde(alias = "Message")]
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct GraphqlEnvelope<T> {
    // No `serde(default)` here: missing Option fields already come out
    // as None, and the attribute would demand `T: Default`.
    #[serde(alias = "Data")]
    pub data: Option<T>,
    #[serde(alias = "Errors")]
    pub errors: Option<Vec<GraphqlErrorEntry>>,
}

/// Decode a response body into the envelope's `data`, raising on a
/// reported failure or a missing payload.
pub fn decode<T: DeserializeOwned>(body: &str) -> Result<T, ApiError> {
    if body.trim().is_empty() {
        return Err(ApiError::InvalidResponse("empty response".to_string()));
    }

    let envelope: GraphqlEnvelope<T> = match serde_json::from_str(body) {
        Ok(envelope) => envelope,
        Err(error) => {
            // A body that does not parse as an envelope (`null`, HTML,
            // truncated JSON) carries no data either way.
            debug!(%error, "response body is not a GraphQL envelope");
            return Err(ApiError::InvalidResponse("empty response".to_string()));
        }
    };

    if let Some(errors) = &envelope.errors {
        if !errors.is_empty() {
            let joined = errors
                .iter()
                .map(|e| e.message.as_str())
                .collect::<Vec<_>>()
                .join("; ");
            debug!(errors = errors.len(), "GraphQL envelope reported failure");
            return Err(ApiError::Graphql(joined));
        }
    }

    envelope
        .data
        .ok_or_else(|| ApiError::InvalidResponse("response contains no data".to_string()))
}

#[derive(Debug)]
pub struct MultipartBody {
    pub content_type: String,
    pub body: Vec<u8>,
}

/// Assemble a GraphQL multipart-upload body per the multipart request
/// convention: `operations` carries the query with the file variable
/// nulled, `map` points the variable at part `"0"`, and part `"0"`
/// carries the raw bytes.
pub fn upload_body(
    query: &str,
    variables: &Value,
    file_var: &str,
    filename: &str,
    bytes: &[u8],
) -> Result<MultipartBody, ApiError> {
    let mut variables = match variables {
        Value::Object(map) => map.clone(),
        Value::Null => serde_json::Map::new(),
        other => {
            return Err(ApiError::InvalidResponse(format!(
                "upload variables must be an object, got {}",
                other
            )))
        }
    };
    variables.insert(file_var.to_string(), Value::Null);

    let operations = serde_json::to_string(&json!({
        "query": query,
        "variables": variables,
    }))?;
    let map = serde_json::to_string(&json!({
        "0": [format!("variables.{}", file_var)],
    }))?;

    let boundary = format!("shopdesk-{:032x}", rand::thread_rng().gen::<u128>());

    let mut body = Vec::with_capacity(bytes.len() + operations.len() + map.len() + 512);
    let mut text_part = |name: &str, value: &str| {
        body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
        body.extend_from_slice(
            format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name).as_bytes(),
        );
        body.extend_from_slice(value.as_bytes());
        body.extend_from_slice(b"\r\n");
    };
    text_part("operations", &operations);
    text_part("map", &map);

    body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"0\"; filename=\"{}\"\r\n",
            filename
        )
        .as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());

    Ok(MultipartBody {
        content_type: format!("multipart/form-data; boundary={}", boundary),
        body,
    })
}
