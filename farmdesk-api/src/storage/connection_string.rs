//! Azure storage connection strings.
//!
//! Format: `Key=Value` pairs separated by `;`. Values may themselves contain
//! `=` (base64 account keys), so each pair is split on the first `=` only.
//! An explicit `DfsEndpoint=` replaces the endpoint derived from the account
//! name, protocol and suffix (private endpoints, local emulators).

use secrecy::SecretString;

use super::StorageError;

const DEFAULT_ENDPOINT_SUFFIX: &str = "core.windows.net";

/// Parsed storage account coordinates.
#[derive(Debug, Clone)]
pub struct ConnectionString {
    pub account_name: String,
    pub account_key: Option<SecretString>,
    pub shared_access_signature: Option<SecretString>,
    pub protocol: String,
    pub endpoint_suffix: String,
    pub dfs_endpoint_override: Option<String>,
}

impl ConnectionString {
    pub fn parse(raw: &str) -> Result<Self, StorageError> {
        let mut account_name = None;
        let mut account_key = None;
        let mut sas = None;
        let mut protocol = None;
        let mut endpoint_suffix = None;
        let mut dfs_endpoint_override = None;

        for pair in raw.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').ok_or_else(|| {
                StorageError::InvalidConnectionString(format!("segment '{}' has no '='", key_of(pair)))
            })?;
            let value = value.trim().to_string();
            match key.trim() {
                "AccountName" => account_name = Some(value),
                "AccountKey" => account_key = Some(SecretString::new(value.into())),
                "SharedAccessSignature" => {
                    sas = Some(SecretString::new(value.trim_start_matches('?').into()))
                }
                "DefaultEndpointsProtocol" => protocol = Some(value),
                "EndpointSuffix" => endpoint_suffix = Some(value),
                "DfsEndpoint" => {
                    dfs_endpoint_override = Some(value.trim_end_matches('/').to_string())
                }
                _ => {}
            }
        }

        let account_name = account_name
            .filter(|n| !n.is_empty())
            .ok_or_else(|| StorageError::InvalidConnectionString("AccountName is missing".to_string()))?;
        if account_key.is_none() && sas.is_none() {
            return Err(StorageError::InvalidConnectionString(
                "neither AccountKey nor SharedAccessSignature is present".to_string(),
            ));
        }

        Ok(Self {
            account_name,
            account_key,
            shared_access_signature: sas,
            protocol: protocol.unwrap_or_else(|| "https".to_string()),
            endpoint_suffix: endpoint_suffix.unwrap_or_else(|| DEFAULT_ENDPOINT_SUFFIX.to_string()),
            dfs_endpoint_override: dfs_endpoint_override.filter(|e| !e.is_empty()),
        })
    }

    /// `DfsEndpoint` when given, else `{protocol}://{account}.dfs.{suffix}`
    pub fn dfs_endpoint(&self) -> String {
        if let Some(endpoint) = &self.dfs_endpoint_override {
            return endpoint.clone();
        }
        format!(
            "{}://{}.dfs.{}",
            self.protocol, self.account_name, self.endpoint_suffix
        )
    }
}

/// Segment name for error messages; never echoes a secret value.
fn key_of(pair: &str) -> &str {
    pair.split('=').next().unwrap_or_default()
}
