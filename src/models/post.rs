//! 帖子数据模型
//!
//! `ApiResponse` / `RawPayload` 是抓取层的原始产物，
//! `StoredPost` 是数据库中的持久化形态。

use serde_json::Value as JsonValue;

/// 单次 API 请求的结果
///
/// 网络层异常不向上抛，统一转成 status = 0、空 body 的响应，
/// 由调用方的分类逻辑决定如何处置。
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub ok: bool,
    /// HTTP 状态码，0 表示没有拿到可用响应
    pub status: u16,
    pub url: String,
    pub content_type: String,
    /// content-type 为 JSON 且解析成功时为 Some
    pub json: Option<JsonValue>,
    /// JSON 解析失败或非 JSON 响应时保留原始文本
    pub text: Option<String>,
    pub text_len: usize,
}

impl ApiResponse {
    /// 构造一个"请求失败"的响应（status = 0）
    pub fn failed(url: impl Into<String>) -> Self {
        Self {
            ok: false,
            status: 0,
            url: url.into(),
            content_type: String::new(),
            json: None,
            text: None,
            text_len: 0,
        }
    }
}

/// 一个帖子的两路 API 响应
///
/// inspection 是轻量视图（检测报告），details 是完整视图。
#[derive(Debug, Clone)]
pub struct RawPayload {
    pub inspection: ApiResponse,
    pub details: ApiResponse,
}

/// 数据库中的一条帖子记录
///
/// 两个状态字段与文档内容共同决定记录"好/坏"，
/// 判定逻辑见 `services::store::classify`。
#[derive(Debug, Clone)]
pub struct StoredPost {
    pub id: i64,
    pub fetched_at: String,
    pub inspection_status: Option<i64>,
    pub details_status: Option<i64>,
    /// 完整的扁平化文档
    pub doc: JsonValue,
}
