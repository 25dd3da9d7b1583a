//! 日志工具模块
//!
//! 提供日志初始化和各类横幅输出的辅助函数

use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::orchestrator::crawl_run::CrawlSummary;

/// 初始化 tracing 日志
///
/// 默认 info 级别，可以用 RUST_LOG 覆盖
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// 记录程序启动信息
pub fn log_startup(config: &Config) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - syarah 增量抓取");
    info!("📄 列表页: {}", config.target_url);
    info!("🗄️ 数据库: {}", config.database_url);
    info!(
        "⏰ 抓取间隔: {} 小时 | headless={}",
        config.check_interval_hours, config.headless
    );
    info!("{}", "=".repeat(60));
}

/// 记录单轮抓取开始
pub fn log_run_banner(run_no: u64) {
    info!("\n{}", "=".repeat(60));
    info!(
        "📦 第 {} 轮抓取开始 - {}",
        run_no,
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
}

/// 打印单轮抓取统计
pub fn log_run_stats(summary: &CrawlSummary) {
    let c = &summary.counters;
    info!("\n{}", "─".repeat(60));
    info!("📊 本轮统计 ({:?})", summary.end);
    info!(
        "✅ 新插入: {} | 🔧 修复: {} | ⏭️ 跳过: {}",
        c.inserted, c.updated, c.skipped
    );
    info!(
        "📋 分发: {} | 去重见过: {} | 总数提示: {:?} | 401: {}",
        c.processed, summary.unique_seen, summary.total_hint, c.unauthorized
    );
    info!("{}", "─".repeat(60));
}
