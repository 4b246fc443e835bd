//! ADLS Gen2 DFS REST client.
//!
//! Requests are authorized with SharedKey (HMAC-SHA256 over the canonical
//! request) when the connection string carries an account key, or with the
//! connection string's SAS token otherwise.

use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::{header::CONTENT_LENGTH, Method, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;

use super::{ConnectionString, FileStore, StorageError};

type HmacSha256 = Hmac<Sha256>;

const API_VERSION: &str = "2021-06-08";

enum Credential {
    SharedKey(SecretString),
    Sas(SecretString),
}

/// File store backed by a storage account's DFS endpoint.
pub struct DataLakeClient {
    http: reqwest::Client,
    endpoint: String,
    account: String,
    credential: Credential,
}

impl DataLakeClient {
    pub fn new(conn: &ConnectionString, timeout: Duration) -> Result<Self, StorageError> {
        let credential = match (&conn.account_key, &conn.shared_access_signature) {
            (Some(key), _) => Credential::SharedKey(key.clone()),
            (None, Some(sas)) => Credential::Sas(sas.clone()),
            (None, None) => {
                return Err(StorageError::InvalidConnectionString(
                    "no credential present".to_string(),
                ))
            }
        };
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            endpoint: conn.dfs_endpoint(),
            account: conn.account_name.clone(),
            credential,
        })
    }

    pub fn from_connection_string(raw: &str, timeout: Duration) -> Result<Self, StorageError> {
        Self::new(&ConnectionString::parse(raw)?, timeout)
    }

    async fn send(
        &self,
        operation: &'static str,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Vec<u8>,
    ) -> Result<StatusCode, StorageError> {
        let date = Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string();
        let ms_headers = [("x-ms-date", date.as_str()), ("x-ms-version", API_VERSION)];
        let content_length = body.len() as u64;

        let mut query_string: Vec<String> = query
            .iter()
            .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
            .collect();

        let mut request_headers: Vec<(&str, String)> = ms_headers
            .iter()
            .map(|(k, v)| (*k, v.to_string()))
            .collect();

        match &self.credential {
            Credential::SharedKey(key) => {
                let canonical = string_to_sign(&SignedRequest {
                    method: method.as_str(),
                    content_length,
                    ms_headers: &ms_headers,
                    account: &self.account,
                    path,
                    query,
                });
                let signature = sign(key, &canonical)?;
                request_headers.push((
                    "authorization",
                    format!("SharedKey {}:{}", self.account, signature),
                ));
            }
            Credential::Sas(sas) => query_string.push(sas.expose_secret().to_string()),
        }

        let mut url = format!("{}{}", self.endpoint, path);
        if !query_string.is_empty() {
            url.push('?');
            url.push_str(&query_string.join("&"));
        }

        let mut request = self
            .http
            .request(method, url)
            .header(CONTENT_LENGTH, content_length);
        for (name, value) in request_headers {
            request = request.header(name, value);
        }

        let response = request.body(body).send().await?;
        let status = response.status();
        tracing::debug!(operation, path, status = status.as_u16(), "Data lake request");

        if status.is_success() || (operation == "file_system_exists" && status == StatusCode::NOT_FOUND) {
            return Ok(status);
        }

        let code = response
            .headers()
            .get("x-ms-error-code")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let text = response.text().await.unwrap_or_default();
        Err(StorageError::Status {
            operation,
            status: status.as_u16(),
            message: code.unwrap_or(text),
        })
    }
}

#[async_trait]
impl FileStore for DataLakeClient {
    async fn file_system_exists(&self, file_system: &str) -> Result<bool, StorageError> {
        let path = resource_path(file_system, None);
        let query = [("resource", "filesystem".to_string())];
        let status = self
            .send("file_system_exists", Method::HEAD, &path, &query, Vec::new())
            .await?;
        Ok(status != StatusCode::NOT_FOUND)
    }

    async fn create_file(&self, file_system: &str, path: &str) -> Result<(), StorageError> {
        let path = resource_path(file_system, Some(path));
        let query = [("resource", "file".to_string())];
        self.send("create_file", Method::PUT, &path, &query, Vec::new())
            .await
            .map(|_| ())
    }

    async fn append(
        &self,
        file_system: &str,
        path: &str,
        position: u64,
        data: Vec<u8>,
    ) -> Result<(), StorageError> {
        let path = resource_path(file_system, Some(path));
        let query = [
            ("action", "append".to_string()),
            ("position", position.to_string()),
        ];
        self.send("append", Method::PATCH, &path, &query, data)
            .await
            .map(|_| ())
    }

    async fn flush(&self, file_system: &str, path: &str, position: u64) -> Result<(), StorageError> {
        let path = resource_path(file_system, Some(path));
        let query = [
            ("action", "flush".to_string()),
            ("position", position.to_string()),
        ];
        self.send("flush", Method::PATCH, &path, &query, Vec::new())
            .await
            .map(|_| ())
    }
}

// ============================================================================
// SHARED KEY SIGNING
// ============================================================================

struct SignedRequest<'a> {
    method: &'a str,
    content_length: u64,
    ms_headers: &'a [(&'a str, &'a str)],
    account: &'a str,
    path: &'a str,
    query: &'a [(&'a str, String)],
}

/// `/{file_system}[/{path}]` with each segment percent-encoded.
fn resource_path(file_system: &str, path: Option<&str>) -> String {
    let mut out = format!("/{}", urlencoding::encode(file_system));
    if let Some(path) = path {
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            out.push('/');
            out.push_str(&urlencoding::encode(segment));
        }
    }
    out
}

/// Canonical SharedKey string-to-sign.
///
/// Standard headers this client never sends are empty lines; Content-Length
/// is empty when zero.
fn string_to_sign(req: &SignedRequest<'_>) -> String {
    let content_length = if req.content_length == 0 {
        String::new()
    } else {
        req.content_length.to_string()
    };

    let mut lines = vec![
        req.method.to_string(),
        String::new(), // Content-Encoding
        String::new(), // Content-Language
        content_length,
        String::new(), // Content-MD5
        String::new(), // Content-Type
        String::new(), // Date
        String::new(), // If-Modified-Since
        String::new(), // If-Match
        String::new(), // If-None-Match
        String::new(), // If-Unmodified-Since
        String::new(), // Range
    ];

    let mut headers: Vec<(String, &str)> = req
        .ms_headers
        .iter()
        .map(|(k, v)| (k.to_ascii_lowercase(), v.trim()))
        .collect();
    headers.sort_by(|a, b| a.0.cmp(&b.0));
    lines.extend(headers.into_iter().map(|(k, v)| format!("{}:{}", k, v)));

    let mut resource = format!("/{}{}", req.account, req.path);
    let mut query: Vec<(String, &str)> = req
        .query
        .iter()
        .map(|(k, v)| (k.to_ascii_lowercase(), v.as_str()))
        .collect();
    query.sort_by(|a, b| a.0.cmp(&b.0));
    for (k, v) in query {
        resource.push('\n');
        resource.push_str(&k);
        resource.push(':');
        resource.push_str(v);
    }
    lines.push(resource);

    lines.join("\n")
}

fn sign(key: &SecretString, string_to_sign: &str) -> Result<String, StorageError> {
    let decoded = STANDARD
        .decode(key.expose_secret())
        .map_err(|e| StorageError::Signing(format!("account key is not base64: {}", e)))?;
    let mut mac = HmacSha256::new_from_slice(&decoded)
        .map_err(|e| StorageError::Signing(format!("failed to initialize HMAC: {}", e)))?;
    mac.update(string_to_sign.as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}
