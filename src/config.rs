use std::time::Duration;

/// 程序配置
#[derive(Clone, Debug)]
pub struct Config {
    /// 列表页 URL
    pub target_url: String,
    /// 是否以无头模式启动浏览器
    pub headless: bool,
    /// SQLite 数据库路径
    pub database_url: String,
    /// 两次抓取之间的间隔（小时）
    pub check_interval_hours: u64,
    /// 滚动后的等待时间（秒）
    pub scroll_pause_sec: f64,
    /// API 语言（ar / en）
    pub api_lang: String,
    // --- API 请求头（从 DevTools 复制，配置一次） ---
    pub authorization: Option<String>,
    pub token: Option<String>,
    pub user_id: Option<String>,
    pub gbuuid: Option<String>,
    pub device: Option<String>,
    pub accept_language: Option<String>,
    pub user_agent: Option<String>,
    pub cookie: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            target_url: "https://syarah.com/filters".to_string(),
            headless: false,
            database_url: "sqlite://syarah.db".to_string(),
            check_interval_hours: 48,
            scroll_pause_sec: 1.5,
            api_lang: "ar".to_string(),
            authorization: None,
            token: None,
            user_id: None,
            gbuuid: None,
            device: Some("web".to_string()),
            accept_language: None,
            user_agent: None,
            cookie: None,
        }
    }
}

fn env_opt(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl Config {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            target_url: env_opt("TARGET_URL").unwrap_or(default.target_url),
            headless: env_opt("HEADLESS").map(|v| v.to_lowercase() == "true").unwrap_or(default.headless),
            database_url: env_opt("DATABASE_URL").unwrap_or(default.database_url),
            check_interval_hours: env_opt("CHECK_INTERVAL_HOURS").and_then(|v| v.parse().ok()).unwrap_or(default.check_interval_hours),
            scroll_pause_sec: env_opt("SCROLL_PAUSE_SEC").and_then(|v| v.parse().ok()).unwrap_or(default.scroll_pause_sec),
            api_lang: env_opt("SYARAH_API_LANG").unwrap_or(default.api_lang),
            authorization: env_opt("SYARAH_AUTHORIZATION"),
            token: env_opt("SYARAH_TOKEN"),
            user_id: env_opt("SYARAH_USER_ID"),
            gbuuid: env_opt("SYARAH_GBUUID"),
            device: env_opt("SYARAH_DEVICE").or(default.device),
            accept_language: env_opt("SYARAH_ACCEPT_LANGUAGE"),
            user_agent: env_opt("SYARAH_USER_AGENT"),
            cookie: env_opt("SYARAH_COOKIE"),
        }
    }
}

/// 抓取循环的调节参数
///
/// 这些阈值来自实际运行中的手工调优，作为默认值保留，
/// 不要当作不可变的常量。
#[derive(Clone, Debug)]
pub struct CrawlTuning {
    /// 每个可见批次最多处理的卡片数
    pub chunk_size: usize,
    /// 连续多少轮空批次后判定列表已耗尽
    pub empty_round_limit: usize,
    /// 空批次时的等待时间
    pub empty_wait: Duration,
    /// 滚动后的等待时间
    pub scroll_pause: Duration,
    /// 本批还有未处理卡片、不滚动时的短暂停顿
    pub hold_pause: Duration,
    /// 等待列表页就绪的超时
    pub ready_timeout: Duration,
}

impl Default for CrawlTuning {
    fn default() -> Self {
        Self {
            chunk_size: 16,
            empty_round_limit: 20,
            empty_wait: Duration::from_millis(1200),
            scroll_pause: Duration::from_millis(1500),
            hold_pause: Duration::from_millis(400),
            ready_timeout: Duration::from_secs(60),
        }
    }
}

impl CrawlTuning {
    /// 从程序配置构建（只有滚动等待时间对外可配）
    pub fn from_config(config: &Config) -> Self {
        Self {
            scroll_pause: Duration::from_secs_f64(config.scroll_pause_sec),
            ..Self::default()
        }
    }
}
