//! ApplicationKeyService - アプリケーションキーの発行と照会
//!
//! アプリケーションとキーの検索は `Routine` で並行に実行し、
//! 失敗はすべてログに残したうえで最初の原因を返す。

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{error, info};

use crate::domain::{Application, ApplicationId, ApplicationKey, ApplicationKeyFilter};
use crate::error::ServiceError;
use crate::ports::{ApplicationKeyReader, ApplicationKeyWriter, ApplicationReader};
use crate::routine::{Routine, Slot};

/// An application together with its key, if one was generated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApplicationKeyView {
    pub application: Application,
    pub key: Option<ApplicationKey>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedApplicationKey {
    pub application_name: String,
    pub key: String,
}

pub struct ApplicationKeyService {
    applications: Arc<dyn ApplicationReader>,
    key_reader: Arc<dyn ApplicationKeyReader>,
    key_writer: Arc<dyn ApplicationKeyWriter>,
    key_length: usize,
    routine_timeout: Option<Duration>,
}

impl ApplicationKeyService {
    pub fn new(
        applications: Arc<dyn ApplicationReader>,
        key_reader: Arc<dyn ApplicationKeyReader>,
        key_writer: Arc<dyn ApplicationKeyWriter>,
        key_length: usize,
        routine_timeout: Option<Duration>,
    ) -> Self {
        Self {
            applications,
            key_reader,
            key_writer,
            key_length,
            routine_timeout,
        }
    }

    /// Look up an application and its key concurrently.
    pub async fn find_application_key(
        &self,
        application_id: &str,
    ) -> Result<ApplicationKeyView, ServiceError> {
        let application_id = parse_application_id(application_id)?;
        let application = Slot::new();
        let key = Slot::new();

        let mut routine = Routine::new();
        routine
            .register(
                "findApplication",
                &application,
                find_application,
                (Arc::clone(&self.applications), application_id),
            )
            .register(
                "findKey",
                &key,
                find_key,
                (
                    Arc::clone(&self.key_reader),
                    ApplicationKeyFilter::by_application(application_id),
                ),
            );
        self.settle(routine, "find_application_key").await?;

        Ok(ApplicationKeyView {
            application: application.take().ok_or_else(|| unfilled("findApplication"))?,
            key: key.take().ok_or_else(|| unfilled("findKey"))?,
        })
    }

    /// Generate a fresh key for an application, replacing any existing one.
    pub async fn generate_or_update_application_key(
        &self,
        application_id: &str,
    ) -> Result<GeneratedApplicationKey, ServiceError> {
        let application_id = parse_application_id(application_id)?;
        let mut key = ApplicationKey::new(application_id);
        key.generate_key(self.key_length);

        let application = Slot::new();
        let mut routine = Routine::new();
        routine.register(
            "findApplication",
            &application,
            find_application,
            (Arc::clone(&self.applications), application_id),
        );
        self.settle(routine, "generate_or_update_application_key")
            .await?;
        let application = application
            .take()
            .ok_or_else(|| unfilled("findApplication"))?;

        self.key_writer
            .save_application_key(&key)
            .await
            .inspect_err(|e| {
                error!(application_id = %application_id, error = %e, "failed to save application key");
            })?;
        info!(application_id = %application_id, "application key generated");

        Ok(GeneratedApplicationKey {
            application_name: application.name,
            key: key.key,
        })
    }

    /// `Ok(true)` when `key` belongs to some application, `NotFound` otherwise.
    pub async fn is_exists_application_key(&self, key: &str) -> Result<bool, ServiceError> {
        if key.is_empty() {
            return Err(ServiceError::Validation("application key is required".to_string()));
        }
        let found = self
            .key_reader
            .find_application_key(&ApplicationKeyFilter::by_key(key))
            .await
            .inspect_err(|e| error!(error = %e, "failed to find application key"))?;

        match found {
            Some(_) => Ok(true),
            None => Err(ServiceError::NotFound("application key".to_string())),
        }
    }

    async fn settle(
        &self,
        mut routine: Routine<ServiceError>,
        operation: &'static str,
    ) -> Result<(), ServiceError> {
        match self.routine_timeout {
            Some(limit) => routine.start_with_timeout(limit).await,
            None => routine.start().await,
        }
        if !routine.is_error() {
            return Ok(());
        }

        for err in routine.errors() {
            error!(operation, task = err.task().unwrap_or("-"), error = %err, "routine task failed");
        }
        match routine.into_error() {
            Some(first) => Err(first.into()),
            None => Ok(()),
        }
    }
}

fn parse_application_id(raw: &str) -> Result<ApplicationId, ServiceError> {
    if raw.is_empty() {
        return Err(ServiceError::Validation("application id is required".to_string()));
    }
    raw.parse()
        .map_err(|e| ServiceError::Validation(format!("invalid application id '{raw}': {e}")))
}

fn unfilled(task: &str) -> ServiceError {
    ServiceError::Concurrency(format!("task '{task}' finished without a result"))
}

async fn find_application(
    (reader, id): (Arc<dyn ApplicationReader>, ApplicationId),
) -> Result<Application, ServiceError> {
    reader
        .find_application(id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("application {id}")))
}

async fn find_key(
    (reader, filter): (Arc<dyn ApplicationKeyReader>, ApplicationKeyFilter),
) -> Result<Option<ApplicationKey>, ServiceError> {
    Ok(reader.find_application_key(&filter).await?)
}
