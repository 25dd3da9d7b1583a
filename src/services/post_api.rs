//! 帖子 API 抓取服务 - 业务能力层
//!
//! 只负责"按 id 拉取两路 API 响应"的能力。
//! 不做重试：非 200 响应原样作为数据返回，
//! 由调用方的分类逻辑决定处置；网络异常转成 status = 0。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Client;
use tracing::{debug, warn};

use crate::config::Config;
use crate::models::{ApiResponse, RawPayload};

const API_TIMEOUT: Duration = Duration::from_secs(30);

/// 帖子抓取能力
///
/// 抓取循环只通过这个 trait 发起网络请求，
/// 测试时用固定响应的假实现替换。
#[async_trait]
pub trait PostFetcher: Send + Sync {
    /// 拉取一个帖子的两路响应，永不失败：
    /// 拿不到可用响应时返回 status = 0 的占位
    async fn fetch(&self, post_id: i64) -> RawPayload;
}

/// 复用整次运行的 API 会话
///
/// 请求头在构造时一次性装好（与 DevTools 里看到的保持一致），
/// referer 按帖子单独补充。
pub struct ApiSession {
    client: Client,
    api_lang: String,
}

impl ApiSession {
    pub fn new(config: &Config) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert("accept", HeaderValue::from_static("application/json"));
        headers.insert("accept-enhancedstatuscodes", HeaderValue::from_static("1"));

        let device = config.device.as_deref().unwrap_or("web");
        insert_header(&mut headers, "device", device);

        // 可选头：配置里没给就不发
        let optional = [
            ("accept-language", &config.accept_language),
            ("user-agent", &config.user_agent),
            ("gbuuid", &config.gbuuid),
            ("authorization", &config.authorization),
            ("token", &config.token),
            ("user-id", &config.user_id),
            ("cookie", &config.cookie),
        ];
        for (name, value) in optional {
            if let Some(v) = value {
                insert_header(&mut headers, name, v);
            }
        }

        let client = Client::builder()
            .default_headers(headers)
            .timeout(API_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            api_lang: config.api_lang.clone(),
        }
    }

    /// 两路 API 地址：轻量的检测视图 + 完整的详情视图
    fn build_api_urls(&self, post_id: i64) -> (String, String) {
        let base = format!(
            "https://syarah.com/api/syarah_v1/{}/post/view-online",
            self.api_lang
        );
        let inspection = format!(
            "{base}?id={post_id}&thumb_size=300&device_type=web&include=inspection"
        );
        let details = format!(
            "{base}?id={post_id}&thumb_size=300&device_type=web&should_redirect=1&include=\
             details,price,story,quality,meta,analytics,campaign,g4Data,options,featuredImage,\
             gallery_section,gallery,fuel,faqs,footerdetails,footer"
        );
        (inspection, details)
    }

    /// 单次 GET，JSON 能解析就带 json，否则保留原始文本
    async fn get_json_or_text(&self, url: &str, referer: &str) -> ApiResponse {
        let resp = match self.client.get(url).header("referer", referer).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!("请求失败 {}: {}", url, e);
                return ApiResponse::failed(url);
            }
        };

        let status = resp.status().as_u16();
        let ok = resp.status().is_success();
        let content_type = resp
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        let text = match resp.text().await {
            Ok(t) => t,
            Err(e) => {
                warn!("读取响应体失败 {}: {}", url, e);
                return ApiResponse::failed(url);
            }
        };
        let text_len = text.len();

        let json = if content_type.to_lowercase().contains("application/json") {
            serde_json::from_str(&text).ok()
        } else {
            None
        };

        ApiResponse {
            ok,
            status,
            url: url.to_string(),
            content_type,
            text: if json.is_some() { None } else { Some(text) },
            json,
            text_len,
        }
    }
}

#[async_trait]
impl PostFetcher for ApiSession {
    async fn fetch(&self, post_id: i64) -> RawPayload {
        let (inspection_url, details_url) = self.build_api_urls(post_id);
        // referer 里的 slug 通常无所谓，尽力贴近真实即可
        let referer = format!(
            "https://syarah.com/{}/cardetail/used-{}",
            self.api_lang, post_id
        );

        let inspection = self.get_json_or_text(&inspection_url, &referer).await;
        let details = self.get_json_or_text(&details_url, &referer).await;

        debug!(
            "fetch id={} inspection_status={} details_status={}",
            post_id, inspection.status, details.status
        );

        RawPayload {
            inspection,
            details,
        }
    }
}

fn insert_header(headers: &mut HeaderMap, name: &'static str, value: &str) {
    match HeaderValue::from_str(value) {
        Ok(v) => {
            headers.insert(HeaderName::from_static(name), v);
        }
        Err(_) => warn!("请求头 {} 的值不合法，已忽略", name),
    }
}
