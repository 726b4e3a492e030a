use crate::shared::*;
use relay_core::server_backend::run_server_backend;

pub fn run(config: RelayConfig) -> Result<()> {
    let rt = tokio::runtime::Runtime::new().context("failed to start tokio runtime")?;
    rt.block_on(async {
        info!(
            "starting relay on {} (max {} connections)",
            config.listen, config.max_connections
        );
        run_server_backend(&config).await
    })
}
