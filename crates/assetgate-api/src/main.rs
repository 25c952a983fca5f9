use assetgate_api::setup;
use assetgate_core::Config;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let config = Config::from_env()?;

    let (state, router) = setup::initialize_app(&config).await?;

    setup::server::start_server(&config, router).await?;

    state.resources.shutdown().await;
    tracing::info!("Cleanup queue stopped, exiting");
    Ok(())
}
