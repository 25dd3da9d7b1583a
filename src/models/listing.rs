//! 列表页数据模型

use serde::Deserialize;

/// 列表页上的一张车辆卡片
///
/// 由页面内 JS 提取，id 在一次运行内唯一标识一条帖子
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingCard {
    /// 帖子 id（来自卡片的 DOM id）
    pub id: i64,
    /// 详情页相对路径（如 /cardetail/used-12345）
    pub href: String,
}

impl ListingCard {
    pub fn new(id: i64, href: impl Into<String>) -> Self {
        Self {
            id,
            href: href.into(),
        }
    }

    /// 详情页绝对地址
    pub fn abs_url(&self) -> String {
        if self.href.is_empty() || self.href.starts_with("http") {
            self.href.clone()
        } else {
            format!("https://syarah.com{}", self.href)
        }
    }
}

/// 一次滚动的前后位置信息，仅用于日志
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct ScrollInfo {
    #[serde(rename = "beforeY")]
    pub before_y: f64,
    #[serde(rename = "afterY")]
    pub after_y: f64,
    #[serde(rename = "h")]
    pub height: f64,
}
