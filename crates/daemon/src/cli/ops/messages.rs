use clap::{Args, Subcommand};
use time::OffsetDateTime;

use courier_daemon::database::types::unix_millis;
use courier_daemon::http_server::api::client::ApiError;
use courier_daemon::http_server::api::v0::messages::{
    CleanupRequest, ConversationsRequest, SessionMessagesRequest,
};

use courier_daemon::relay::SendRequest;

use crate::cli::op::{Op, OpContext};

crate::command_enum! {
    (Send, SendEnvelope),
    (Session, SessionMessagesRequest),
    (Conversations, ConversationsRequest),
    (Cleanup, CleanupRequest),
}

pub type MessagesCommand = Command;

/// Send and read relayed envelopes, and run retention cleanup
#[derive(Args, Debug, Clone)]
pub struct Messages {
    #[command(subcommand)]
    pub command: MessagesCommand,
}

#[async_trait::async_trait]
impl Op for Messages {
    type Error = OpError;
    type Output = OpOutput;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        self.command.execute(ctx).await
    }
}

/// Relay one already encrypted envelope to the other participant
#[derive(Args, Debug, Clone)]
pub struct SendEnvelope {
    #[arg(long)]
    pub session_id: String,
    #[arg(long)]
    pub receiver_id: String,
    /// Base64 ciphertext
    #[arg(long)]
    pub ciphertext: String,
    #[arg(long)]
    pub iv: String,
    #[arg(long)]
    pub nonce: String,
    #[arg(long)]
    pub sequence_number: i64,
    /// Unix millis the envelope was sealed at; defaults to now
    #[arg(long)]
    pub timestamp: Option<i64>,
}

impl SendEnvelope {
    fn to_request(&self, now: OffsetDateTime) -> SendRequest {
        SendRequest {
            session_id: Some(self.session_id.clone()),
            receiver_id: Some(self.receiver_id.clone()),
            ciphertext: Some(self.ciphertext.clone()),
            iv: Some(self.iv.clone()),
            nonce: Some(self.nonce.clone()),
            timestamp: Some(self.timestamp.unwrap_or_else(|| unix_millis(now))),
            sequence_number: Some(self.sequence_number),
        }
    }
}

#[async_trait::async_trait]
impl Op for SendEnvelope {
    type Error = ApiError;
    type Output = String;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        let request = self.to_request(OffsetDateTime::now_utc());
        let response = ctx.client.call(request).await?;
        let envelope = response.envelope;
        Ok(format!(
            "sent #{} as {} at {}",
            envelope.sequence_number, envelope.message_id, envelope.sent_at
        ))
    }
}

#[async_trait::async_trait]
impl Op for SessionMessagesRequest {
    type Error = ApiError;
    type Output = String;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        let response = ctx.client.call(self.clone()).await?;
        if response.messages.is_empty() {
            return Ok("no messages".to_string());
        }

        // ciphertext stays opaque here; print envelope metadata only
        let lines: Vec<String> = response
            .messages
            .iter()
            .map(|message| {
                format!(
                    "#{:<4} {} -> {}  {}  ({} bytes)",
                    message.sequence_number,
                    message.sender.id,
                    message.receiver.id,
                    message.sent_at,
                    message.ciphertext.len()
                )
            })
            .collect();
        Ok(lines.join("\n"))
    }
}

#[async_trait::async_trait]
impl Op for ConversationsRequest {
    type Error = ApiError;
    type Output = String;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        let response = ctx.client.call(self.clone()).await?;
        if response.conversations.is_empty() {
            return Ok("no conversations".to_string());
        }

        let lines: Vec<String> = response
            .conversations
            .iter()
            .map(|conversation| {
                format!(
                    "{}  session {}  last message {}",
                    conversation
                        .partner_name
                        .clone()
                        .unwrap_or_else(|| conversation.partner_id.to_string()),
                    conversation.session_id,
                    conversation.last_message_at
                )
            })
            .collect();
        Ok(lines.join("\n"))
    }
}

#[async_trait::async_trait]
impl Op for CleanupRequest {
    type Error = ApiError;
    type Output = String;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        let response = ctx.client.call(self.clone()).await?;
        Ok(format!("deleted {} envelopes", response.deleted_count))
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
        command: MessagesCommand,
    }

    #[test]
    fn test_send_args_fill_every_field() {
        let cli = Cli::try_parse_from([
            "messages",
            "send",
            "--session-id",
            "s1",
            "--receiver-id",
            "8d2c5cbe-3f43-4bb4-9f8e-0d5d1b3c7a10",
            "--ciphertext",
            "aGVsbG8=",
            "--iv",
            "aXY=",
            "--nonce",
            "n-1",
            "--sequence-number",
            "3",
        ])
        .unwrap();
        let Command::Send(send) = cli.command else {
            panic!("expected send");
        };

        let now = datetime!(2025-10-16 00:00:01.5 UTC);
        let request = send.to_request(now);
        assert_eq!(request.session_id.as_deref(), Some("s1"));
        assert_eq!(request.nonce.as_deref(), Some("n-1"));
        assert_eq!(request.sequence_number, Some(3));
        assert_eq!(request.timestamp, Some(unix_millis(now)));
    }

    #[test]
    fn test_send_requires_sequence_number() {
        let result = Cli::try_parse_from([
            "messages",
            "send",
            "--session-id",
            "s1",
            "--receiver-id",
            "8d2c5cbe-3f43-4bb4-9f8e-0d5d1b3c7a10",
            "--ciphertext",
            "aGVsbG8=",
            "--iv",
            "aXY=",
            "--nonce",
            "n-1",
        ]);
        assert!(result.is_err());
    }
}
