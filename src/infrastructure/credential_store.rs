use crate::infrastructure::error::ApiError;
use std::collections::HashMap;
use std::sync::Mutex;

const KEY_ACCESS_TOKEN: &str = "access_token";
const KEY_REFRESH_TOKEN: &str = "refresh_token";
const KEY_PROFILE: &str = "cached_profile";

/// Key-value store over the three logical session keys. Each key is read and
/// written atomically on its own; there is no cross-key transaction.
pub trait CredentialStore: Send + Sync {
    fn access_token(&self) -> Result<Option<String>, ApiError>;
    fn set_access_token(&self, token: &str) -> Result<(), ApiError>;
    fn refresh_token(&self) -> Result<Option<String>, ApiError>;
    fn set_refresh_token(&self, token: &str) -> Result<(), ApiError>;
    fn cached_profile(&self) -> Result<Option<serde_json::Value>, ApiError>;
    fn set_cached_profile(&self, profile: &serde_json::Value) -> Result<(), ApiError>;
    /// Removes all three keys. Missing keys are not an error.
    fn clear(&self) -> Result<(), ApiError>;
}

/// Platform keyring store, one entry per logical key.
#[derive(Debug, Clone)]
pub struct KeyringCredentialStore {
    service_name: String,
}

impl KeyringCredentialStore {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
        }
    }

    fn entry(&self, key: &str) -> Result<keyring::Entry, ApiError> {
        keyring::Entry::new(&self.service_name, key)
            .map_err(|error| ApiError::Credential(error.to_string()))
    }

    fn get(&self, key: &str) -> Result<Option<String>, ApiError> {
        match self.entry(key)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(error) => Err(ApiError::Credential(error.to_string())),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), ApiError> {
        self.entry(key)?
            .set_password(value)
            .map_err(|error| ApiError::Credential(error.to_string()))
    }

    fn remove(&self, key: &str) -> Result<(), ApiError> {
        match self.entry(key)?.delete_credential() {
            Ok(_) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(error) => Err(ApiError::Credential(error.to_string())),
        }
    }
}

impl Default for KeyringCredentialStore {
    fn default() -> Self {
        Self::new("courtside.owner.session")
    }
}

impl CredentialStore for KeyringCredentialStore {
    fn access_token(&self) -> Result<Option<String>, ApiError> {
        self.get(KEY_ACCESS_TOKEN)
    }

    fn set_access_token(&self, token: &str) -> Result<(), ApiError> {
        self.set(KEY_ACCESS_TOKEN, token)
    }

    fn refresh_token(&self) -> Result<Option<String>, ApiError> {
        self.get(KEY_REFRESH_TOKEN)
    }

    fn set_refresh_token(&self, token: &str) -> Result<(), ApiError> {
        self.set(KEY_REFRESH_TOKEN, token)
    }

    fn cached_profile(&self) -> Result<Option<serde_json::Value>, ApiError> {
        let Some(payload) = self.get(KEY_PROFILE)? else {
            return Ok(None);
        };
        serde_json::from_str(&payload)
            .map(Some)
            .map_err(|error| ApiError::Credential(error.to_string()))
    }

    fn set_cached_profile(&self, profile: &serde_json::Value) -> Result<(), ApiError> {
        let payload =
            serde_json::to_string(profile).map_err(|error| ApiError::Credential(error.to_string()))?;
        self.set(KEY_PROFILE, &payload)
    }

    fn clear(&self) -> Result<(), ApiError> {
        self.remove(KEY_ACCESS_TOKEN)?;
        self.remove(KEY_REFRESH_TOKEN)?;
        self.remove(KEY_PROFILE)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryCredentialStore {
    values: Mutex<HashMap<&'static str, String>>,
}

impl InMemoryCredentialStore {
    fn with_values<T>(
        &self,
        operate: impl FnOnce(&mut HashMap<&'static str, String>) -> T,
    ) -> Result<T, ApiError> {
        let mut guard = self
            .values
            .lock()
            .map_err(|error| ApiError::Credential(format!("in-memory lock poisoned: {error}")))?;
        Ok(operate(&mut guard))
    }
}

impl CredentialStore for InMemoryCredentialStore {
    fn access_token(&self) -> Result<Option<String>, ApiError> {
        self.with_values(|values| values.get(KEY_ACCESS_TOKEN).cloned())
    }

    fn set_access_token(&self, token: &str) -> Result<(), ApiError> {
        self.with_values(|values| {
            values.insert(KEY_ACCESS_TOKEN, token.to_string());
        })
    }

    fn refresh_token(&self) -> Result<Option<String>, ApiError> {
        self.with_values(|values| values.get(KEY_REFRESH_TOKEN).cloned())
    }

    fn set_refresh_token(&self, token: &str) -> Result<(), ApiError> {
        self.with_values(|values| {
            values.insert(KEY_REFRESH_TOKEN, token.to_string());
        })
    }

    fn cached_profile(&self) -> Result<Option<serde_json::Value>, ApiError> {
        let payload = self.with_values(|values| values.get(KEY_PROFILE).cloned())?;
        let Some(payload) = payload else {
            return Ok(None);
        };
        serde_json::from_str(&payload)
            .map(Some)
            .map_err(|error| ApiError::Credential(error.to_string()))
    }

    fn set_cached_profile(&self, profile: &serde_json::Value) -> Result<(), ApiError> {
        let payload =
            serde_json::to_string(profile).map_err(|error| ApiError::Credential(error.to_string()))?;
        self.with_values(|values| {
            values.insert(KEY_PROFILE, payload);
        })
    }

    fn clear(&self) -> Result<(), ApiError> {
        self.with_values(HashMap::clear)
    }
}
