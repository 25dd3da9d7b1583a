use anyhow::Result;
use syarah_harvester::utils::logging;
use syarah_harvester::{App, Config};

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志
    logging::init();

    // 加载配置
    let config = Config::from_env();

    // 初始化并运行应用（内部是"抓一轮睡一觉"的定时循环）
    App::initialize(config).await?.run().await
}
