use anyhow::Context;
use webgate::{config::GatewayConfig, logger, server};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli_path = std::env::args().nth(1);
    let config = GatewayConfig::load(cli_path.as_deref()).context("加载配置失败")?;

    logger::init_tracing(&config.logging);
    tracing::info!(
        "[MAIN] webgate {} 启动，已配置 {} 个服务",
        env!("CARGO_PKG_VERSION"),
        config.services.len()
    );

    let state = server::AppState::new(config).context("创建出站客户端失败")?;
    state.start_session().await;
    server::serve(state).await.context("服务器异常退出")?;

    tracing::info!("[MAIN] 已退出");
    Ok(())
}
