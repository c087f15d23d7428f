use rand::Rng;
use rand::distributions::Alphanumeric;
use serde::{Deserialize, Serialize};

use super::ids::{ApplicationId, ApplicationKeyId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Application {
    pub id: ApplicationId,
    pub name: String,
}

impl Application {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: ApplicationId::generate(),
            name: name.into(),
        }
    }
}

/// The client key of an application. Configuration is stored and
/// distributed per key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationKey {
    pub id: ApplicationKeyId,
    pub application_id: ApplicationId,
    pub key: String,
}

impl ApplicationKey {
    pub fn new(application_id: ApplicationId) -> Self {
        Self {
            id: ApplicationKeyId::generate(),
            application_id,
            key: String::new(),
        }
    }

    pub fn exists(&self) -> bool {
        !self.key.is_empty()
    }

    /// Replace `key` with `length` random characters from `[a-zA-Z0-9]`.
    pub fn generate_key(&mut self, length: usize) {
        self.key = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(length)
            .map(char::from)
            .collect();
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplicationKeyFilter {
    pub application_id: Option<ApplicationId>,
    pub key: Option<String>,
    /// Lookups by key alone skip the application id requirement.
    pub skip_validation: bool,
}

impl ApplicationKeyFilter {
    pub fn by_application(application_id: ApplicationId) -> Self {
        Self {
            application_id: Some(application_id),
            ..Self::default()
        }
    }

    pub fn by_key(key: impl Into<String>) -> Self {
        Self {
            key: Some(key.into()),
            skip_validation: true,
            ..Self::default()
        }
    }

    pub fn is_valid(&self) -> bool {
        self.skip_validation || self.application_id.is_some()
    }

    pub fn matches(&self, candidate: &ApplicationKey) -> bool {
        if !self.is_valid() {
            return false;
        }
        let application_ok = self
            .application_id
            .is_none_or(|id| id == candidate.application_id);
        let key_ok = self.key.as_deref().is_none_or(|k| k == candidate.key);
        application_ok && key_ok
    }
}
