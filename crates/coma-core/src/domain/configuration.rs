use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::ids::ConfigurationId;

/// One configuration field of one client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Configuration {
    pub id: ConfigurationId,
    pub client_key: String,
    pub field: String,
    pub value: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl Configuration {
    pub fn new(
        client_key: impl Into<String>,
        field: impl Into<String>,
        value: Option<String>,
    ) -> Self {
        Self {
            id: ConfigurationId::generate(),
            client_key: client_key.into(),
            field: field.into(),
            value,
            updated_at: Utc::now(),
        }
    }
}

/// The configuration set of a client, in storage order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Configurations(pub Vec<Configuration>);

impl Configurations {
    pub fn exists(&self) -> bool {
        !self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Configuration> {
        self.0.iter()
    }

    pub fn into_inner(self) -> Vec<Configuration> {
        self.0
    }

    /// Copy field and value from `updates` onto the entries with the same id.
    ///
    /// Returns how many entries changed.
    pub fn update_from(&mut self, updates: &[Configuration]) -> usize {
        let mut changed = 0;
        for current in &mut self.0 {
            if let Some(update) = updates.iter().find(|u| u.id == current.id) {
                current.field.clone_from(&update.field);
                current.value.clone_from(&update.value);
                current.updated_at = update.updated_at;
                changed += 1;
            }
        }
        changed
    }

    /// `{field: value}` object sent to clients. Unset values become `null`;
    /// for a repeated field the last entry wins.
    pub fn to_json_view(&self) -> Map<String, Value> {
        let mut view = Map::new();
        for configuration in &self.0 {
            let value = configuration
                .value
                .as_ref()
                .map_or(Value::Null, |v| Value::String(v.clone()));
            view.insert(configuration.field.clone(), value);
        }
        view
    }
}

impl From<Vec<Configuration>> for Configurations {
    fn from(configurations: Vec<Configuration>) -> Self {
        Self(configurations)
    }
}

impl IntoIterator for Configurations {
    type Item = Configuration;
    type IntoIter = std::vec::IntoIter<Configuration>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Selects configurations of one client, optionally narrowed by id or field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigurationFilter {
    pub client_key: String,
    pub id: Option<ConfigurationId>,
    pub field: Option<String>,
}

impl ConfigurationFilter {
    pub fn client(client_key: impl Into<String>) -> Self {
        Self {
            client_key: client_key.into(),
            ..Self::default()
        }
    }

    pub fn with_id(mut self, id: ConfigurationId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn matches(&self, candidate: &Configuration) -> bool {
        candidate.client_key == self.client_key
            && self.id.is_none_or(|id| id == candidate.id)
            && self.field.as_deref().is_none_or(|f| f == candidate.field)
    }
}
