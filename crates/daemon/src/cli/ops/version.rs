use std::convert::Infallible;

use clap::Args;

use courier_daemon::version::build_info;

#[derive(Args, Debug, Clone)]
pub struct Version;

#[async_trait::async_trait]
impl crate::cli::op::Op for Version {
    type Error = Infallible;
    type Output = String;

    async fn execute(&self, _ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let build = build_info();
        Ok(format!(
            "courier {} ({}, features: {}, built {})",
            build.version, build.build_profile, build.build_features, build.build_timestamp
        ))
    }
}
