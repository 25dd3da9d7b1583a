//! 应用生命周期 - 编排层
//!
//! 唯一持有稀缺资源（Browser、页面、数据库连接、API 会话）的模块。
//! 外层是一个简单的定时循环：抓完一轮，睡够配置的间隔，
//! 换一套新的 VisitedSet 和计数器再来一轮。

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chromiumoxide::Browser;
use tokio::time::sleep;
use tracing::{error, info};

use crate::browser;
use crate::config::{Config, CrawlTuning};
use crate::error::AppResult;
use crate::orchestrator::crawl_run::{run_crawl, CrawlSummary};
use crate::services::{ApiSession, ListingPage, SqlitePostStore};
use crate::utils::logging;
use crate::workflow::PostFlow;

/// 应用主结构
pub struct App {
    config: Config,
    tuning: CrawlTuning,
    _browser: Browser,
    listing_page: ListingPage,
    flow: PostFlow<ApiSession, SqlitePostStore>,
}

impl App {
    /// 初始化应用：启动浏览器、连库、装配处理流程
    pub async fn initialize(config: Config) -> Result<Self> {
        logging::log_startup(&config);

        let (browser, page) = browser::launch_browser(&config.target_url, config.headless).await?;
        let listing_page = ListingPage::new(page);

        let store = Arc::new(SqlitePostStore::connect(&config.database_url).await?);

        // 整次运行复用同一个 API 会话（请求头来自 .env）
        let session = ApiSession::new(&config);
        let flow = PostFlow::new(session, store);

        let tuning = CrawlTuning::from_config(&config);

        Ok(Self {
            config,
            tuning,
            _browser: browser,
            listing_page,
            flow,
        })
    }

    /// 运行应用主逻辑：抓一轮 → 睡一觉 → 再来
    pub async fn run(&self) -> Result<()> {
        let mut run_no = 0u64;
        loop {
            run_no += 1;
            logging::log_run_banner(run_no);

            match self.crawl_once().await {
                Ok(summary) => logging::log_run_stats(&summary),
                // 单轮失败不退出，外层定时循环本身就是重试
                Err(e) => error!("[error] 本轮抓取失败: {}", e),
            }

            info!(
                "[sleep] 等待 {} 小时后再次检查...",
                self.config.check_interval_hours
            );
            sleep(Duration::from_secs(self.config.check_interval_hours * 3600)).await;
        }
    }

    /// 跑一轮完整抓取
    async fn crawl_once(&self) -> AppResult<CrawlSummary> {
        info!("[syarah] 打开列表页: {}", self.config.target_url);
        self.listing_page
            .page()
            .goto(self.config.target_url.clone())
            .await
            .map_err(|e| crate::error::AppError::navigation_failed(&self.config.target_url, e))?;

        run_crawl(&self.listing_page, &self.flow, &self.tuning).await
    }
}
