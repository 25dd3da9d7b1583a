//! 增量抓取循环 - 编排层
//!
//! ## 核心逻辑
//!
//! 1. 等待列表页就绪，读一次广告总数（尽力而为的提示值）
//! 2. 反复读取当前可见的卡片批次
//! 3. 用 VisitedSet 过滤掉本次运行已处理的 id：
//!    渲染出来的列表会在多次滚动之间重复同一批卡片
//! 4. 每轮最多分发 16 张卡片：一次滚动新渲染出来的卡片有限，
//!    处理太多只会空转
//! 5. 本批消化完才滚动；没消化完就原地再读一轮
//! 6. 收敛判定：VisitedSet 达到总数提示 → COMPLETE；
//!    连续 20 轮空批次 → EXHAUSTED（不是错误，列表渲染完了）
//!
//! 总数提示只是提示（页面上的数字可能过期或缺失），
//! 空批次计数和块的消化簿记才是防止死循环的真正保险。

use std::collections::HashSet;

use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::CrawlTuning;
use crate::error::AppResult;
use crate::services::listing_page::ListingSource;
use crate::workflow::{PostHandler, ProcessResult};

/// 一次运行的计数器
///
/// 显式结构体随循环流转，不用全局状态，
/// 每次运行从零开始，结束时整体打一条日志。
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunCounters {
    /// 分发给处理流程的卡片数（含预检查跳过的）
    pub processed: u64,
    pub inserted: u64,
    pub updated: u64,
    pub skipped: u64,
    /// details 接口 401 的次数
    pub unauthorized: u64,
}

impl RunCounters {
    fn tally(&mut self, result: ProcessResult) {
        match result {
            ProcessResult::Inserted => self.inserted += 1,
            ProcessResult::Updated => self.updated += 1,
            ProcessResult::Skipped | ProcessResult::SkippedGood => self.skipped += 1,
            ProcessResult::Failed { unauthorized } => {
                if unauthorized {
                    self.unauthorized += 1;
                }
            }
        }
    }
}

/// 一次运行的终止方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunEnd {
    /// VisitedSet 达到了总数提示
    Complete,
    /// 连续空批次，列表没有更多内容可渲染
    Exhausted,
}

/// 一次运行的汇总
#[derive(Debug, Clone)]
pub struct CrawlSummary {
    pub end: RunEnd,
    pub counters: RunCounters,
    /// 标题区读到的总数提示
    pub total_hint: Option<u64>,
    /// 本次运行见过的去重 id 数
    pub unique_seen: usize,
}

/// 跑一次完整的增量抓取
///
/// source 和 handler 都是 trait 对象边界：
/// 生产环境是真实浏览器和真实 API/数据库，
/// 测试里换成固定批次和内存存储。
pub async fn run_crawl<S, H>(
    source: &S,
    handler: &H,
    tuning: &CrawlTuning,
) -> AppResult<CrawlSummary>
where
    S: ListingSource + ?Sized,
    H: PostHandler + ?Sized,
{
    source.wait_until_ready(tuning.ready_timeout).await?;

    let total = source.read_total_count().await;
    info!("[syarah] 标题区广告总数: {:?}", total);

    let mut visited: HashSet<i64> = HashSet::new();
    let mut counters = RunCounters::default();
    let mut empty_rounds = 0usize;
    let mut batch_no = 0usize;

    let end = loop {
        batch_no += 1;
        let visible = source.read_visible_cards().await;

        if visible.is_empty() {
            empty_rounds += 1;
            info!(
                "[batch {}] visible=0 (round={}) -> 等待，不滚动",
                batch_no, empty_rounds
            );
            if empty_rounds >= tuning.empty_round_limit {
                warn!("[stop] 连续多轮没有读到卡片，本次运行结束");
                break RunEnd::Exhausted;
            }
            sleep(tuning.empty_wait).await;
            continue;
        }

        empty_rounds = 0;

        let unprocessed: Vec<_> = visible
            .iter()
            .filter(|c| !visited.contains(&c.id))
            .cloned()
            .collect();

        info!(
            "[batch {}] visible={} new_unprocessed={} processed={} inserted={} updated={} skipped={}",
            batch_no,
            visible.len(),
            unprocessed.len(),
            counters.processed,
            counters.inserted,
            counters.updated,
            counters.skipped
        );

        if unprocessed.is_empty() {
            scroll_and_log(source, "no new").await;
            sleep(tuning.scroll_pause).await;
            if total_reached(total, visited.len()) {
                break RunEnd::Complete;
            }
            continue;
        }

        // 每轮最多处理 chunk_size 张
        let chunk = &unprocessed[..unprocessed.len().min(tuning.chunk_size)];

        for card in chunk {
            // 分发前就标记已处理：同一 id 在后续批次再出现也不会二次分发
            visited.insert(card.id);
            counters.processed += 1;

            let result = handler.handle(card).await;
            debug!("[item] id={} result={:?}", card.id, result);
            counters.tally(result);
        }

        if chunk.len() == unprocessed.len() {
            scroll_and_log(source, "after chunk").await;
            sleep(tuning.scroll_pause).await;
        } else {
            // 本批还有没处理的卡片，原地再读一轮
            info!(
                "[hold] 可见卡片还有 {} 张未处理 -> 暂不滚动",
                unprocessed.len() - chunk.len()
            );
            sleep(tuning.hold_pause).await;
        }

        if total_reached(total, visited.len()) {
            info!(
                "[syarah] 达到标题区总数 (unique={} >= {:?})",
                visited.len(),
                total
            );
            break RunEnd::Complete;
        }
    };

    let summary = CrawlSummary {
        end,
        counters,
        total_hint: total,
        unique_seen: visited.len(),
    };

    info!(
        "[syarah] 本次运行结束 ({:?}) | total_hint={:?} unique={} processed={} inserted={} updated={} skipped={} 401s={}",
        summary.end,
        summary.total_hint,
        summary.unique_seen,
        counters.processed,
        counters.inserted,
        counters.updated,
        counters.skipped,
        counters.unauthorized
    );

    Ok(summary)
}

fn total_reached(total: Option<u64>, unique_seen: usize) -> bool {
    matches!(total, Some(t) if t > 0 && unique_seen as u64 >= t)
}

async fn scroll_and_log<S: ListingSource + ?Sized>(source: &S, reason: &str) {
    match source.advance_page().await {
        Some(info) => info!(
            "[scroll] ({}) y:{}->{} h={}",
            reason, info.before_y, info.after_y, info.height
        ),
        None => info!("[scroll] ({}) 无滚动信息", reason),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ListingCard, ScrollInfo};
    use crate::services::listing_page::ListingSource;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    /// 事件日志：验证"读批次 / 滚动 / 分发"的先后顺序
    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Event {
        Read,
        Advance,
        Dispatch(i64),
    }

    /// 固定批次的假列表源，脚本耗尽后一直返回空批次
    struct FakeSource {
        batches: Mutex<VecDeque<Vec<ListingCard>>>,
        total: Option<u64>,
        events: Mutex<Vec<Event>>,
    }

    impl FakeSource {
        fn new(batches: Vec<Vec<i64>>, total: Option<u64>) -> Self {
            let batches = batches
                .into_iter()
                .map(|ids| {
                    ids.into_iter()
                        .map(|id| ListingCard::new(id, format!("/cardetail/used-{}", id)))
                        .collect()
                })
                .collect();
            Self {
                batches: Mutex::new(batches),
                total,
                events: Mutex::new(Vec::new()),
            }
        }

        fn events(&self) -> Vec<Event> {
            self.events.lock().unwrap().clone()
        }

        fn advance_count(&self) -> usize {
            self.events()
                .iter()
                .filter(|e| **e == Event::Advance)
                .count()
        }

        fn read_count(&self) -> usize {
            self.events().iter().filter(|e| **e == Event::Read).count()
        }
    }

    #[async_trait]
    impl ListingSource for FakeSource {
        async fn wait_until_ready(&self, _timeout: Duration) -> AppResult<()> {
            Ok(())
        }

        async fn read_total_count(&self) -> Option<u64> {
            self.total
        }

        async fn read_visible_cards(&self) -> Vec<ListingCard> {
            self.events.lock().unwrap().push(Event::Read);
            self.batches
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_default()
        }

        async fn advance_page(&self) -> Option<ScrollInfo> {
            self.events.lock().unwrap().push(Event::Advance);
            Some(ScrollInfo::default())
        }
    }

    /// 把分发记到共享事件日志里的假处理器
    struct RecordingHandler<'a> {
        source: &'a FakeSource,
        result: ProcessResult,
    }

    #[async_trait]
    impl PostHandler for RecordingHandler<'_> {
        async fn handle(&self, card: &ListingCard) -> ProcessResult {
            self.source
                .events
                .lock()
                .unwrap()
                .push(Event::Dispatch(card.id));
            self.result
        }
    }

    fn instant_tuning() -> CrawlTuning {
        CrawlTuning {
            empty_wait: Duration::ZERO,
            scroll_pause: Duration::ZERO,
            hold_pause: Duration::ZERO,
            ..CrawlTuning::default()
        }
    }

    fn dispatched(source: &FakeSource) -> Vec<i64> {
        source
            .events()
            .iter()
            .filter_map(|e| match e {
                Event::Dispatch(id) => Some(*id),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn repeated_ids_are_dispatched_at_most_once() {
        let source = FakeSource::new(vec![vec![1, 2, 3], vec![2, 3, 4]], None);
        let handler = RecordingHandler {
            source: &source,
            result: ProcessResult::Inserted,
        };

        let summary = run_crawl(&source, &handler, &instant_tuning()).await.unwrap();

        assert_eq!(summary.end, RunEnd::Exhausted);
        assert_eq!(dispatched(&source), vec![1, 2, 3, 4]);
        assert_eq!(summary.counters.processed, 4);
        assert_eq!(summary.unique_seen, 4);
    }

    #[tokio::test]
    async fn chunk_cap_dispatches_sixteen_before_scroll_decision() {
        let big_batch: Vec<i64> = (1..=50).collect();
        let source = FakeSource::new(vec![big_batch.clone(), big_batch], None);
        let handler = RecordingHandler {
            source: &source,
            result: ProcessResult::Inserted,
        };

        run_crawl(&source, &handler, &instant_tuning()).await.unwrap();

        // 第一轮：读批次后正好分发 16 张，且没消化完 -> 不滚动直接再读
        let events = source.events();
        assert_eq!(events[0], Event::Read);
        let first_round: Vec<_> = events[1..17].to_vec();
        assert_eq!(
            first_round,
            (1..=16i64).map(Event::Dispatch).collect::<Vec<_>>()
        );
        assert_eq!(events[17], Event::Read);
    }

    #[tokio::test]
    async fn exhaustion_terminates_after_empty_round_limit() {
        let source = FakeSource::new(vec![vec![1]], None);
        let handler = RecordingHandler {
            source: &source,
            result: ProcessResult::Inserted,
        };

        let summary = run_crawl(&source, &handler, &instant_tuning()).await.unwrap();

        assert_eq!(summary.end, RunEnd::Exhausted);
        assert_eq!(dispatched(&source), vec![1]);
        // 1 次有卡片的读取 + 20 次空读
        assert_eq!(source.read_count(), 21);
    }

    #[tokio::test]
    async fn nonempty_batch_resets_empty_streak() {
        let mut batches = vec![vec![], vec![], vec![7]];
        batches.extend(std::iter::repeat(vec![]).take(25));
        let source = FakeSource::new(batches, None);
        let handler = RecordingHandler {
            source: &source,
            result: ProcessResult::Inserted,
        };

        let summary = run_crawl(&source, &handler, &instant_tuning()).await.unwrap();

        assert_eq!(summary.end, RunEnd::Exhausted);
        assert_eq!(dispatched(&source), vec![7]);
        // 空批次计数在第 3 轮被重置，之后重新数满 20 轮
        assert_eq!(source.read_count(), 3 + 20);
    }

    #[tokio::test]
    async fn all_visited_batch_triggers_scroll_not_dispatch() {
        let source = FakeSource::new(vec![vec![1], vec![1]], None);
        let handler = RecordingHandler {
            source: &source,
            result: ProcessResult::Inserted,
        };

        let summary = run_crawl(&source, &handler, &instant_tuning()).await.unwrap();

        assert_eq!(summary.end, RunEnd::Exhausted);
        assert_eq!(dispatched(&source), vec![1]);
        // 处理完第 1 批滚一次，第 2 批全是旧卡片再滚一次
        assert_eq!(source.advance_count(), 2);
    }

    #[tokio::test]
    async fn total_hint_completes_run() {
        use crate::services::post_api::PostFetcher;
        use crate::services::store::test_support::MemoryStore;
        use crate::models::{ApiResponse, RawPayload};
        use crate::workflow::PostFlow;
        use serde_json::json;
        use std::sync::Arc;

        struct OkFetcher;

        #[async_trait]
        impl PostFetcher for OkFetcher {
            async fn fetch(&self, post_id: i64) -> RawPayload {
                let details = json!({
                    "data": { "details": { "id": post_id, "title": format!("سيارة {}", post_id) } }
                });
                RawPayload {
                    inspection: ApiResponse {
                        status: 200,
                        json: Some(json!({})),
                        ..ApiResponse::failed("inspection")
                    },
                    details: ApiResponse {
                        status: 200,
                        json: Some(details),
                        ..ApiResponse::failed("details")
                    },
                }
            }
        }

        // 总数提示 3，三个 id 分两批出现，全部抓取成功
        let source = FakeSource::new(vec![vec![101, 102], vec![103]], Some(3));
        let store = Arc::new(MemoryStore::new());
        let flow = PostFlow::new(OkFetcher, store.clone());

        let summary = run_crawl(&source, &flow, &instant_tuning()).await.unwrap();

        assert_eq!(summary.end, RunEnd::Complete);
        assert_eq!(summary.counters.processed, 3);
        assert_eq!(summary.counters.inserted, 3);
        assert_eq!(summary.counters.updated, 0);
        assert_eq!(summary.counters.skipped, 0);
        assert_eq!(store.stored_ids(), vec![101, 102, 103]);
    }
}
