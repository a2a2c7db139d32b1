use clap::Args;

use courier_daemon::state::{AppConfig, AppState, StateError};

#[derive(Args, Debug, Clone)]
pub struct Init {
    /// API server port
    #[arg(long, default_value_t = 5000)]
    pub api_port: u16,

    /// Seconds between expiry sweeps
    #[arg(long, default_value_t = 300)]
    pub sweep_interval_secs: u64,

    /// Include server-side failure detail in error responses (development only)
    #[arg(long)]
    pub expose_error_details: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("init failed: {0}")]
    StateFailed(#[from] StateError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Init {
    type Error = InitError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let config = AppConfig {
            api_port: self.api_port,
            sweep_interval_secs: self.sweep_interval_secs,
            expose_error_details: self.expose_error_details,
        };

        let state = AppState::init(ctx.config_path.clone(), Some(config))?;

        Ok(format!(
            "Initialized courier directory at: {}\n\
             - Database: {}\n\
             - Config: {}\n\
             - API port: {}\n\
             - Sweep interval: {}s",
            state.courier_dir.display(),
            state.db_path.display(),
            state.config_path.display(),
            state.config.api_port,
            state.config.sweep_interval_secs,
        ))
    }
}
