//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责整次抓取的调度，是系统的"指挥中心"。
//!
//! ### `crawl_run` - 增量抓取循环
//! - 驱动"读可见批次 → 过滤已处理 → 分发小块 → 滚动"的循环
//! - 持有 VisitedSet 和 RunCounters（一次运行一份）
//! - 判定收敛：总数提示到达 / 连续空批次耗尽
//!
//! ### `app` - 应用生命周期
//! - 唯一持有 Browser、页面和数据库连接的模块
//! - 外层定时循环：一轮抓完睡够间隔再来一轮
//!
//! ## 层次关系
//!
//! ```text
//! app (资源 + 定时循环)
//!     ↓
//! crawl_run (一次运行的批次循环)
//!     ↓
//! workflow::PostFlow (处理单个帖子)
//!     ↓
//! services (能力层：listing_page / post_api / flatten / store)
//!     ↓
//! browser (基础设施：CDP 页面)
//! ```

pub mod app;
pub mod crawl_run;

pub use app::App;
pub use crawl_run::{run_crawl, CrawlSummary, RunCounters, RunEnd};
