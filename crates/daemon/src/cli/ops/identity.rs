use clap::{Args, Subcommand};

use common::prelude::UserId;
use courier_daemon::database::directory::{DirectoryIdentity, PublishedKeys};
use courier_daemon::database::{Database, DatabaseSetupError};
use courier_daemon::identity::{IdentityError, IdentityGateway};
use courier_daemon::state::{AppState, StateError};

use crate::cli::op::{Op, OpContext};

crate::command_enum! {
    (Add, Add),
    (Keys, Keys),
    (Token, Token),
}

pub type IdentityCommand = Command;

/// Provision users in the local identity directory
#[derive(Args, Debug, Clone)]
pub struct Identity {
    #[command(subcommand)]
    pub command: IdentityCommand,
}

#[async_trait::async_trait]
impl Op for Identity {
    type Error = OpError;
    type Output = OpOutput;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        self.command.execute(ctx).await
    }
}

#[derive(Debug, thiserror::Error)]
pub enum IdentityOpError {
    #[error("state error: {0}")]
    State(#[from] StateError),
    #[error("database setup failed: {0}")]
    Setup(#[from] DatabaseSetupError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("identity lookup failed: {0}")]
    Identity(#[from] IdentityError),
    #[error("unknown user: {0}")]
    UnknownUser(UserId),
}

async fn open_directory(ctx: &OpContext) -> Result<DirectoryIdentity, IdentityOpError> {
    let state = AppState::load(ctx.config_path.clone())?;
    let db = Database::connect(&Database::sqlite_url(&state.db_path)?).await?;
    Ok(DirectoryIdentity::new(db))
}

#[derive(Args, Debug, Clone, Default)]
pub struct KeyArgs {
    /// Public signing key, required before the user can exchange keys
    #[arg(long)]
    pub signing_key: Option<String>,

    #[arg(long)]
    pub ecc_key: Option<String>,

    #[arg(long)]
    pub rsa_key: Option<String>,
}

impl From<&KeyArgs> for PublishedKeys {
    fn from(args: &KeyArgs) -> Self {
        Self {
            signing_public_key: args.signing_key.clone(),
            ecc_public_key: args.ecc_key.clone(),
            rsa_public_key: args.rsa_key.clone(),
        }
    }
}

/// Register a user and print a fresh access token for it
#[derive(Args, Debug, Clone)]
pub struct Add {
    #[arg(long)]
    pub name: String,

    #[command(flatten)]
    pub keys: KeyArgs,

    /// Token lifetime in days (never expires if unset)
    #[arg(long)]
    pub token_ttl_days: Option<i64>,
}

#[async_trait::async_trait]
impl Op for Add {
    type Error = IdentityOpError;
    type Output = String;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        let directory = open_directory(ctx).await?;
        let user_id = directory
            .register_user(&self.name, &PublishedKeys::from(&self.keys))
            .await?;
        let token = directory
            .issue_token(&user_id, self.token_ttl_days.map(time::Duration::days))
            .await?;

        Ok(format!("user_id: {}\ntoken:   {}", user_id, token))
    }
}

/// Replace the published keys of an existing user
#[derive(Args, Debug, Clone)]
pub struct Keys {
    #[arg(long)]
    pub user_id: UserId,

    #[command(flatten)]
    pub keys: KeyArgs,
}

#[async_trait::async_trait]
impl Op for Keys {
    type Error = IdentityOpError;
    type Output = String;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        let directory = open_directory(ctx).await?;
        if !directory
            .publish_keys(&self.user_id, &PublishedKeys::from(&self.keys))
            .await?
        {
            return Err(IdentityOpError::UnknownUser(self.user_id));
        }
        Ok(format!("updated keys for {}", self.user_id))
    }
}

/// Issue an additional access token for an existing user
#[derive(Args, Debug, Clone)]
pub struct Token {
    #[arg(long)]
    pub user_id: UserId,

    /// Token lifetime in days (never expires if unset)
    #[arg(long)]
    pub ttl_days: Option<i64>,
}

#[async_trait::async_trait]
impl Op for Token {
    type Error = IdentityOpError;
    type Output = String;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        let directory = open_directory(ctx).await?;
        if directory.lookup_user(&self.user_id).await?.is_none() {
            return Err(IdentityOpError::UnknownUser(self.user_id));
        }
        let token = directory
            .issue_token(&self.user_id, self.ttl_days.map(time::Duration::days))
            .await?;
        Ok(token)
    }
}
