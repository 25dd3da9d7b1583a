//! # Syarah Harvester
//!
//! 增量抓取 syarah.com 二手车列表并落地到本地文档库的工具
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 基础设施层（Browser）
//! - `browser/` - 启动浏览器、持有 CDP 事件循环
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，只处理单个能力
//! - `ListingPage` - 列表页读取能力（就绪等待 / 总数 / 可见卡片 / 滚动）
//! - `ApiSession` - 按 id 拉取两路 API 响应的能力
//! - `flatten` - 两路响应到扁平记录的纯投影
//! - `SqlitePostStore` - 查 / 插 / 修能力和好坏记录判定
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一个帖子"的完整处理流程
//! - `PostFlow` - 流程编排（预检查 → 抓取 → 处置 → 入库）
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/crawl_run` - 增量抓取循环，持有 VisitedSet 和计数器
//! - `orchestrator/app` - 资源持有者和外层定时循环
//!
//! ## 关键不变量
//!
//! - 同一 id 在一次运行内最多分发一次（VisitedSet 先标记后分发）
//! - 库里同一 id 最多一条记录（唯一索引兜底，冲突落到修复路径）
//! - 好记录不被重抓数据覆盖；坏记录允许原地修复
//! - 单个帖子路径上的任何失败都不允许中止整次运行

pub mod browser;
pub mod config;
pub mod error;
pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use browser::launch_browser;
pub use config::{Config, CrawlTuning};
pub use error::{AppError, AppResult};
pub use models::{ListingCard, RawPayload, StoredPost};
pub use orchestrator::{run_crawl, App, CrawlSummary, RunCounters, RunEnd};
pub use services::{ApiSession, ListingPage, ListingSource, PostFetcher, PostStore, SqlitePostStore};
pub use workflow::{PostFlow, PostHandler, ProcessResult};
