use clap::{Args, Subcommand};
use time::OffsetDateTime;

use courier_daemon::database::types::unix_millis;
use courier_daemon::handshake::{InitiateRequest, RespondRequest};
use courier_daemon::http_server::api::client::ApiError;
use courier_daemon::http_server::api::v0::key_exchange::{
    HistoryRequest, PendingRequest, StatusRequest,
};

use crate::cli::op::{Op, OpContext};

crate::command_enum! {
    (Initiate, Initiate),
    (Respond, Respond),
    (Pending, PendingRequest),
    (Status, StatusRequest),
    (History, HistoryRequest),
}

pub type ExchangeCommand = Command;

/// Run and inspect key exchanges the caller takes part in
#[derive(Args, Debug, Clone)]
pub struct Exchange {
    #[command(subcommand)]
    pub command: ExchangeCommand,
}

#[async_trait::async_trait]
impl Op for Exchange {
    type Error = OpError;
    type Output = OpOutput;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        self.command.execute(ctx).await
    }
}

/// Open a key exchange with a peer from an already signed initiator round
#[derive(Args, Debug, Clone)]
pub struct Initiate {
    /// User to exchange keys with
    #[arg(long)]
    pub peer_id: String,
    /// Client chosen session id
    #[arg(long)]
    pub session_id: String,
    #[arg(long)]
    pub ecdh_public_key: String,
    #[arg(long)]
    pub challenge: String,
    #[arg(long)]
    pub signature: String,
    /// Unix millis the round was signed at; defaults to now
    #[arg(long)]
    pub timestamp: Option<i64>,
}

impl Initiate {
    fn to_request(&self, now: OffsetDateTime) -> InitiateRequest {
        InitiateRequest {
            peer_id: Some(self.peer_id.clone()),
            session_id: Some(self.session_id.clone()),
            ecdh_public_key: Some(self.ecdh_public_key.clone()),
            challenge: Some(self.challenge.clone()),
            timestamp: Some(self.timestamp.unwrap_or_else(|| unix_millis(now))),
            signature: Some(self.signature.clone()),
        }
    }
}

#[async_trait::async_trait]
impl Op for Initiate {
    type Error = ApiError;
    type Output = String;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        let request = self.to_request(OffsetDateTime::now_utc());
        let response = ctx.client.call(request).await?;
        let exchange = response.exchange;
        Ok(format!(
            "{}: {} -> {}  {}",
            exchange.session_id,
            name_or_id(&exchange.initiator),
            name_or_id(&exchange.responder),
            exchange.status
        ))
    }
}

/// Answer a pending key exchange with a signed responder round
#[derive(Args, Debug, Clone)]
pub struct Respond {
    #[arg(long)]
    pub session_id: String,
    #[arg(long)]
    pub ecdh_public_key: String,
    #[arg(long)]
    pub challenge_response: String,
    #[arg(long)]
    pub signature: String,
    /// Unix millis the round was signed at; defaults to now
    #[arg(long)]
    pub timestamp: Option<i64>,
}

impl Respond {
    fn to_request(&self, now: OffsetDateTime) -> RespondRequest {
        RespondRequest {
            session_id: Some(self.session_id.clone()),
            ecdh_public_key: Some(self.ecdh_public_key.clone()),
            challenge_response: Some(self.challenge_response.clone()),
            timestamp: Some(self.timestamp.unwrap_or_else(|| unix_millis(now))),
            signature: Some(self.signature.clone()),
        }
    }
}

#[async_trait::async_trait]
impl Op for Respond {
    type Error = ApiError;
    type Output = String;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        let request = self.to_request(OffsetDateTime::now_utc());
        let response = ctx.client.call(request).await?;
        Ok(format!(
            "{}: {}",
            response.exchange.session_id, response.exchange.status
        ))
    }
}

fn name_or_id(participant: &courier_daemon::identity::Participant) -> String {
    participant
        .display_name
        .clone()
        .unwrap_or_else(|| participant.id.to_string())
}

#[async_trait::async_trait]
impl Op for PendingRequest {
    type Error = ApiError;
    type Output = String;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        let response = ctx.client.call(self.clone()).await?;
        if response.exchanges.is_empty() {
            return Ok("no pending key exchanges".to_string());
        }

        let lines: Vec<String> = response
            .exchanges
            .iter()
            .map(|exchange| {
                format!(
                    "{}  from {}  at {}",
                    exchange.session_id,
                    name_or_id(&exchange.initiator),
                    exchange.initiated_at
                )
            })
            .collect();
        Ok(lines.join("\n"))
    }
}

#[async_trait::async_trait]
impl Op for StatusRequest {
    type Error = ApiError;
    type Output = String;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        let response = ctx.client.call(self.clone()).await?;
        let exchange = response.exchange;

        let mut output = format!("{}: {}", exchange.session_id, exchange.status);
        if let Some(reply) = exchange.reply {
            output.push_str(&format!(
                "\nresponder: {}\necdh public key: {}",
                reply.responder_id, reply.round.ecdh_public_key
            ));
        }
        Ok(output)
    }
}

#[async_trait::async_trait]
impl Op for HistoryRequest {
    type Error = ApiError;
    type Output = String;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        let response = ctx.client.call(self.clone()).await?;
        if response.exchanges.is_empty() {
            return Ok("no key exchanges".to_string());
        }

        let lines: Vec<String> = response
            .exchanges
            .iter()
            .map(|exchange| {
                format!(
                    "{}  {} -> {}  {}",
                    exchange.session_id,
                    name_or_id(&exchange.initiator),
                    name_or_id(&exchange.responder),
                    exchange.status
                )
            })
            .collect();
        Ok(lines.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;
    use time::macros::datetime;

    use super::*;

    #[derive(Parser)]
    struct Cli {
        #[command(subcommand)]
        command: ExchangeCommand,
    }

    #[test]
    fn test_initiate_args_fill_every_field() {
        let cli = Cli::try_parse_from([
            "exchange",
            "initiate",
            "--peer-id",
            "8d2c5cbe-3f43-4bb4-9f8e-0d5d1b3c7a10",
            "--session-id",
            "s1",
            "--ecdh-public-key",
            "ecdh-a",
            "--challenge",
            "c-a",
            "--signature",
            "sig-a",
        ])
        .unwrap();
        let Command::Initiate(initiate) = cli.command else {
            panic!("expected initiate");
        };

        let now = datetime!(2025-10-16 00:00:01.5 UTC);
        let request = initiate.to_request(now);
        assert_eq!(request.session_id.as_deref(), Some("s1"));
        assert_eq!(request.ecdh_public_key.as_deref(), Some("ecdh-a"));
        assert_eq!(request.challenge.as_deref(), Some("c-a"));
        assert_eq!(request.signature.as_deref(), Some("sig-a"));
        assert_eq!(request.timestamp, Some(unix_millis(now)));
    }

    #[test]
    fn test_respond_keeps_explicit_timestamp() {
        let cli = Cli::try_parse_from([
            "exchange",
            "respond",
            "--session-id",
            "s1",
            "--ecdh-public-key",
            "ecdh-b",
            "--challenge-response",
            "r-b",
            "--signature",
            "sig-b",
            "--timestamp",
            "1700000000000",
        ])
        .unwrap();
        let Command::Respond(respond) = cli.command else {
            panic!("expected respond");
        };

        let request = respond.to_request(OffsetDateTime::now_utc());
        assert_eq!(request.challenge_response.as_deref(), Some("r-b"));
        assert_eq!(request.timestamp, Some(1_700_000_000_000));
    }

    #[test]
    fn test_initiate_requires_signature() {
        let result = Cli::try_parse_from([
            "exchange",
            "initiate",
            "--peer-id",
            "8d2c5cbe-3f43-4bb4-9f8e-0d5d1b3c7a10",
            "--session-id",
            "s1",
            "--ecdh-public-key",
            "ecdh-a",
            "--challenge",
            "c-a",
        ]);
        assert!(result.is_err());
    }
}
