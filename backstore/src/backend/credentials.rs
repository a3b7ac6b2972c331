use k8s_openapi::api::core::v1::Secret;
use secrecy::SecretString;
use std::collections::BTreeMap;

use crate::bail;
use crate::error::{ErrorKind, SnapshotResult};

/// Password encrypting the restic repository. Always required.
pub const RESTIC_PASSWORD: &str = "RESTIC_PASSWORD";

/// PEM bundle trusted when talking to a self-signed backend endpoint.
pub const CA_CERT_DATA: &str = "CA_CERT_DATA";

/// GCS service account key, handed to restic as a file.
pub const GOOGLE_SERVICE_ACCOUNT_JSON_KEY: &str = "GOOGLE_SERVICE_ACCOUNT_JSON_KEY";

/// Variable pointing restic at the service account key file.
pub const GOOGLE_APPLICATION_CREDENTIALS: &str = "GOOGLE_APPLICATION_CREDENTIALS";

/// Credentials resolved from a repository's storage secret.
///
/// Values stay wrapped in [`SecretString`] until they are handed to the backend
/// client process.
#[derive(Debug, Clone, Default)]
pub struct StorageCredentials {
    values: BTreeMap<String, SecretString>,
}

impl StorageCredentials {
    /// Reads every entry of `secret`, with `stringData` taking precedence over `data`.
    ///
    /// Fails when an entry is not UTF-8 or when [`RESTIC_PASSWORD`] is missing.
    pub fn from_secret(secret: &Secret) -> SnapshotResult<StorageCredentials> {
        let mut values = BTreeMap::new();

        for (key, value) in secret.data.iter().flatten() {
            let value = match String::from_utf8(value.0.clone()) {
                Ok(value) => value,
                Err(_) => bail!(
                    ErrorKind::ConfigError,
                    "Storage secret entry is not valid UTF-8",
                    format!("key `{key}`")
                ),
            };
            values.insert(key.clone(), SecretString::from(value));
        }

        for (key, value) in secret.string_data.iter().flatten() {
            values.insert(key.clone(), SecretString::from(value.clone()));
        }

        if !values.contains_key(RESTIC_PASSWORD) {
            bail!(
                ErrorKind::MissingCredentials,
                "Storage secret does not contain the repository password",
                format!("missing key `{RESTIC_PASSWORD}`")
            );
        }

        Ok(StorageCredentials { values })
    }

    pub fn get(&self, key: &str) -> Option<&SecretString> {
        self.values.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SecretString)> {
        self.values.iter().map(|(key, value)| (key.as_str(), value))
    }
}
