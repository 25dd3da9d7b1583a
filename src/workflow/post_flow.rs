//! 单个帖子的处理流程 - 流程层
//!
//! 核心职责：定义"一个帖子"的完整处理流程
//!
//! 流程顺序：
//! 1. 预检查：库里已有好记录 → 直接跳过，一次网络请求都不发
//! 2. 抓取两路 API 响应
//! 3. 处置：401 / 0 状态不入库（入库只会留下空壳，压住后续修复）
//! 4. 扁平化 → 插入或修复
//!
//! 这条路径上的任何失败都不允许中止整次运行：
//! 抓取失败是数据（status = 0），存储失败记日志后按失败上报。

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::models::ListingCard;
use crate::services::flatten::build_post_document;
use crate::services::post_api::PostFetcher;
use crate::services::store::{already_have_good, upsert_post, PostStore, UpsertOutcome};

/// 单个帖子的处理结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessResult {
    /// 库里已有好记录，未发起网络请求
    SkippedGood,
    /// 新插入
    Inserted,
    /// 修复了一条坏记录
    Updated,
    /// 存储层判定跳过（好记录不覆盖）
    Skipped,
    /// 没拿到可用响应或写入失败，未入库
    Failed {
        /// details 接口返回 401
        unauthorized: bool,
    },
}

/// 帖子处理能力
///
/// 抓取循环只通过这个 trait 分发单个卡片，
/// 测试时用记录调用的假实现替换。
#[async_trait]
pub trait PostHandler: Send + Sync {
    async fn handle(&self, card: &ListingCard) -> ProcessResult;
}

/// 帖子处理流程
///
/// 只依赖业务能力（fetcher / store），不持有页面资源，
/// 不认识 VisitedSet 和批次。
pub struct PostFlow<F, S> {
    fetcher: F,
    store: Arc<S>,
}

impl<F: PostFetcher, S: PostStore> PostFlow<F, S> {
    pub fn new(fetcher: F, store: Arc<S>) -> Self {
        Self { fetcher, store }
    }
}

#[async_trait]
impl<F: PostFetcher, S: PostStore> PostHandler for PostFlow<F, S> {
    async fn handle(&self, card: &ListingCard) -> ProcessResult {
        let id = card.id;

        // ========== 预检查：好记录零网络请求跳过 ==========
        match already_have_good(&*self.store, id).await {
            Ok(true) => {
                info!("[db] 跳过已有好记录 id={}", id);
                return ProcessResult::SkippedGood;
            }
            Ok(false) => {}
            // 预检查失败不拦路：重抓一次是安全的
            Err(e) => error!("[db] 预检查失败 id={}: {}，继续抓取", id, e),
        }

        // ========== 抓取 ==========
        let payload = self.fetcher.fetch(id).await;
        let details_status = payload.details.status;

        // ========== 处置 ==========
        if details_status == 401 {
            warn!(
                "[auth] id={} 返回 401，检查 .env 里的 Bearer/token/cookie",
                id
            );
            return ProcessResult::Failed { unauthorized: true };
        }
        if details_status == 0 {
            info!("[api] 不入库 id={} status={}", id, details_status);
            return ProcessResult::Failed {
                unauthorized: false,
            };
        }

        // ========== 扁平化 + 入库 ==========
        let doc = build_post_document(id, &payload);
        match upsert_post(&*self.store, id, &doc).await {
            Ok(UpsertOutcome::Inserted) => ProcessResult::Inserted,
            Ok(UpsertOutcome::Updated) => ProcessResult::Updated,
            Ok(UpsertOutcome::Skipped) => ProcessResult::Skipped,
            Err(e) => {
                error!("[db] 写入失败 id={}: {}", id, e);
                ProcessResult::Failed {
                    unauthorized: false,
                }
            }
        }
    }
}
