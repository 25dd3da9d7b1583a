//! 列表页读取服务 - 业务能力层
//!
//! 只负责"从已渲染的列表页读数据"的能力：
//! 等待就绪、读标题区总数、读可见卡片、滚动一步。
//! 不认识 VisitedSet，不关心抓取流程。

use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::Page;
use serde::de::DeserializeOwned;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

use crate::error::{AppResult, AppError};
use crate::models::{ListingCard, ScrollInfo};

const SEL_TITLE_AREA: &str = "div.UnbxdTitleArea-module__h1Area";
const SEL_CARDS_CONTAINER: &str = "div.UnbxdCards-module__allCarsResult";

/// 就绪轮询间隔
const READY_POLL: Duration = Duration::from_millis(500);

/// 滚动一步，步长取 900px 和视口高度 95% 的较大者
const JS_SCROLL_STEP: &str = r#"
(() => {
  const beforeY = window.scrollY;
  window.scrollBy(0, Math.max(900, window.innerHeight * 0.95));
  const afterY = window.scrollY;
  return { beforeY, afterY, h: document.body.scrollHeight };
})()
"#;

/// 卡片 DOM id 前缀，完整形如 modern-card_post-12345
const CARD_ID_PREFIX: &str = "modern-card_post-";

/// 从标题区的 span 里找纯数字文本，即广告总数
fn js_get_total() -> String {
    format!(
        r#"
(() => {{
  const area = document.querySelector({sel});
  if (!area) return null;
  const spans = Array.from(area.querySelectorAll('span')).map(s => (s.textContent||'').trim());
  const n = spans.find(t => /^\d+$/.test((t||'').replace(/\s+/g,'')));
  return n ? parseInt(n, 10) : null;
}})()
"#,
        sel = js_str(SEL_TITLE_AREA)
    )
}

/// 收集可见卡片，返回 [id, href] 对的去重数组
fn js_get_visible_cards() -> String {
    format!(
        r#"
(() => {{
  const prefix = {prefix};
  const container = document.querySelector({sel});
  const root = container || document;

  const nodes = Array.from(root.querySelectorAll(`div[id^="${{prefix}}"]`));
  const out = [];

  for (const el of nodes) {{
    const idAttr = (el.getAttribute('id') || '').trim();
    const m = idAttr.match(/^modern-card_post-(\d+)$/);
    if (!m) continue;

    const idNum = parseInt(m[1], 10);
    if (!Number.isFinite(idNum)) continue;

    const a = el.querySelector('a[href^="/cardetail/"]');
    if (!a) continue;

    const href = (a.getAttribute('href') || '').trim();
    if (!href) continue;

    out.push([idNum, href]);
  }}

  const seen = new Set();
  const uniq = [];
  for (const pair of out) {{
    if (seen.has(pair[0])) continue;
    seen.add(pair[0]);
    uniq.push(pair);
  }}
  return uniq;
}})()
"#,
        prefix = js_str(CARD_ID_PREFIX),
        sel = js_str(SEL_CARDS_CONTAINER)
    )
}

/// 把字符串安全地嵌入 JS 源码
fn js_str(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string())
}

/// 列表页数据源
///
/// 抓取循环只通过这个 trait 访问页面，
/// 测试时用固定批次的假实现替换真实浏览器。
#[async_trait]
pub trait ListingSource: Send + Sync {
    /// 等待列表页渲染就绪，超时返回 `ReadinessTimeout`
    async fn wait_until_ready(&self, timeout: Duration) -> AppResult<()>;

    /// 读取标题区的广告总数，尽力而为，读不到不阻塞流程
    async fn read_total_count(&self) -> Option<u64>;

    /// 读取当前可见的卡片，可能跨调用重复出现同一张卡片
    async fn read_visible_cards(&self) -> Vec<ListingCard>;

    /// 滚动一步，返回前后位置信息（仅用于日志）
    async fn advance_page(&self) -> Option<ScrollInfo>;
}

/// 基于 CDP 页面的列表页实现
///
/// 持有唯一的 Page 资源，所有读取都通过页面内 JS 求值完成。
pub struct ListingPage {
    page: Page,
}

impl ListingPage {
    pub fn new(page: Page) -> Self {
        Self { page }
    }

    /// 获取 page 的引用（用于导航等其他操作）
    pub fn page(&self) -> &Page {
        &self.page
    }

    /// 执行 JS 代码并反序列化为指定类型
    async fn eval_as<T: DeserializeOwned>(&self, js_code: &str) -> AppResult<T> {
        let result = self.page.evaluate(js_code.to_string()).await?;
        let typed_value = result.into_value().map_err(AppError::from)?;
        Ok(typed_value)
    }
}

#[async_trait]
impl ListingSource for ListingPage {
    async fn wait_until_ready(&self, timeout: Duration) -> AppResult<()> {
        let js = format!("Boolean(document.querySelector({}))", js_str(SEL_TITLE_AREA));
        let deadline = Instant::now() + timeout;

        loop {
            // 求值失败当作"还没就绪"，继续轮询
            match self.eval_as::<bool>(&js).await {
                Ok(true) => return Ok(()),
                Ok(false) => {}
                Err(e) => debug!("就绪检测求值失败: {}", e),
            }

            if Instant::now() > deadline {
                return Err(AppError::readiness_timeout(timeout.as_secs()));
            }
            sleep(READY_POLL).await;
        }
    }

    async fn read_total_count(&self) -> Option<u64> {
        match self.eval_as::<Option<u64>>(&js_get_total()).await {
            Ok(total) => total,
            Err(e) => {
                warn!("读取广告总数失败: {}", e);
                None
            }
        }
    }

    async fn read_visible_cards(&self) -> Vec<ListingCard> {
        match self.eval_as::<Vec<(i64, String)>>(&js_get_visible_cards()).await {
            Ok(pairs) => pairs
                .into_iter()
                .filter(|(_, href)| !href.trim().is_empty())
                .map(|(id, href)| ListingCard::new(id, href))
                .collect(),
            Err(e) => {
                // 提取失败按空批次处理，由循环的空批次计数兜底
                warn!("读取可见卡片失败: {}", e);
                Vec::new()
            }
        }
    }

    async fn advance_page(&self) -> Option<ScrollInfo> {
        match self.eval_as::<ScrollInfo>(JS_SCROLL_STEP).await {
            Ok(info) => Some(info),
            Err(e) => {
                warn!("滚动失败: {}", e);
                None
            }
        }
    }
}
