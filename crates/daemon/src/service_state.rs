use std::sync::Arc;

use common::prelude::ReplayGuard;

use crate::database::directory::DirectoryIdentity;
use crate::database::{Database, DatabaseSetupError};
use crate::error::RelayError;
use crate::handshake::HandshakeCoordinator;
use crate::http_server::api::RelayRejection;
use crate::identity::DynIdentityGateway;
use crate::relay::MessageRelay;
use crate::ServiceConfig;

/// Shared handles every request works through. Cheap to clone.
#[derive(Clone)]
pub struct State {
    database: Database,
    identity: DynIdentityGateway,
    replay_guard: ReplayGuard,
    expose_error_details: bool,
}

impl State {
    pub async fn from_config(config: &ServiceConfig) -> Result<Self, StateSetupError> {
        let database = match &config.sqlite_path {
            Some(path) => Database::connect(&Database::sqlite_url(path)?).await?,
            None => {
                tracing::warn!("no sqlite path configured, using an in-memory database");
                Database::in_memory().await?
            }
        };

        let identity = Arc::new(DirectoryIdentity::new(database.clone()));
        Ok(Self::new(database, identity).with_error_details(config.expose_error_details))
    }

    pub fn new(database: Database, identity: DynIdentityGateway) -> Self {
        Self {
            database,
            identity,
            replay_guard: ReplayGuard::default(),
            expose_error_details: false,
        }
    }

    pub fn with_error_details(mut self, expose: bool) -> Self {
        self.expose_error_details = expose;
        self
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    pub fn identity(&self) -> &DynIdentityGateway {
        &self.identity
    }

    pub fn handshakes(&self) -> HandshakeCoordinator {
        HandshakeCoordinator::new(self.database.clone(), self.identity.clone())
    }

    pub fn relay(&self) -> MessageRelay {
        MessageRelay::new(
            self.database.clone(),
            self.identity.clone(),
            self.replay_guard,
        )
    }

    /// Wrap a failure for the HTTP layer under this service's disclosure policy
    pub fn reject(&self, error: RelayError) -> RelayRejection {
        RelayRejection::new(error, self.expose_error_details)
    }
}

impl AsRef<Database> for State {
    fn as_ref(&self) -> &Database {
        &self.database
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StateSetupError {
    #[error("failed to set up the database: {0}")]
    DatabaseSetupError(#[from] DatabaseSetupError),
}
