//! # Gateway Config Controller
//!
//! Synchronizes repository bundles, external secrets and cluster configuration
//! into API gateway fleets. See the library documentation for details.

use anyhow::Result;
use gateway_config_controller::runtime::initialization::initialize;
use gateway_config_controller::runtime::watch_loop::run_watch_loop;

#[tokio::main]
async fn main() -> Result<()> {
    let init_result = initialize().await?;

    run_watch_loop(
        init_result.gateways,
        init_result.context,
        init_result.server_state,
    )
    .await
}
