//! Periodic removal of expired exchanges and envelopes.
//!
//! Reads already hide expired rows, so a late or skipped sweep only costs
//! disk space.

use std::time::Duration;

use time::OffsetDateTime;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::database::models::{Envelope, KeyExchange};
use crate::database::Database;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub sessions: u64,
    pub envelopes: u64,
}

pub async fn sweep_expired(db: &Database, now: OffsetDateTime) -> Result<SweepReport, sqlx::Error> {
    let sessions = KeyExchange::delete_expired(now, db).await?;
    let envelopes = Envelope::delete_expired(now, db).await?;
    Ok(SweepReport { sessions, envelopes })
}

/// Sweep every `interval` until shutdown is signalled
pub async fn run(db: Database, interval: Duration, mut shutdown_rx: watch::Receiver<()>) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    tracing::info!(interval_secs = interval.as_secs(), "expiry sweeper started");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match sweep_expired(&db, OffsetDateTime::now_utc()).await {
                    Ok(report) if report == SweepReport::default() => {
                        tracing::trace!("sweep found nothing expired");
                    }
                    Ok(report) => {
                        tracing::info!(
                            sessions = report.sessions,
                            envelopes = report.envelopes,
                            "swept expired records"
                        );
                    }
                    Err(err) => tracing::error!(error = %err, "expiry sweep failed"),
                }
            }
            _ = shutdown_rx.changed() => break,
        }
    }

    tracing::info!("expiry sweeper stopped");
}
