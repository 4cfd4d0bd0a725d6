//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `GIGA__*` 覆盖（双下划线表示嵌套，如 `GIGA__SETTINGS__THREADS=4`）。
//! 配置只在进程入口加载一次，之后以 `Arc<AppConfig>` 显式传给调度器与各组件。

use std::path::PathBuf;
use std::time::Duration;

use rand::Rng;
use serde::Deserialize;

use crate::core::RunnerError;
use crate::llm::DEEPSEEK_CHAT;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub settings: SettingsSection,
    #[serde(default)]
    pub oracle: OracleSection,
    #[serde(default)]
    pub game: GameSection,
}

/// 闭区间秒数范围 `[min, max]`，TOML 中写作两元素数组
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct PauseRange(pub u64, pub u64);

impl PauseRange {
    pub const ZERO: PauseRange = PauseRange(0, 0);

    pub fn min(&self) -> u64 {
        self.0.min(self.1)
    }

    pub fn max(&self) -> u64 {
        self.0.max(self.1)
    }

    /// 在闭区间内均匀取一个整数秒
    pub fn sample_secs(&self) -> u64 {
        let (lo, hi) = (self.min(), self.max());
        if lo == hi {
            return lo;
        }
        rand::thread_rng().gen_range(lo..=hi)
    }

    pub fn sample(&self) -> Duration {
        Duration::from_secs(self.sample_secs())
    }
}

/// [settings] 段：并发、重试、各类随机暂停、账户筛选
#[derive(Debug, Clone, Deserialize)]
pub struct SettingsSection {
    /// 同时运行的会话上限 K
    #[serde(default = "default_threads")]
    pub threads: usize,
    /// 每个可失败操作的尝试次数
    #[serde(default = "default_attempts")]
    pub attempts: u32,
    #[serde(default)]
    pub shuffle_accounts: bool,
    /// 账户序号闭区间；`[0, 0]` 表示不按区间筛选
    #[serde(default = "default_accounts_range")]
    pub accounts_range: [usize; 2],
    /// 精确指定的账户序号（仅在 accounts_range 为 [0, 0] 时生效）
    #[serde(default)]
    pub exact_accounts_to_use: Vec<usize>,
    #[serde(default = "default_pause_between_attempts")]
    pub pause_between_attempts: PauseRange,
    #[serde(default = "default_random_initialization_pause")]
    pub random_initialization_pause: PauseRange,
    /// 一次完整流程结束后的暂停
    #[serde(default = "default_random_pause_between_actions")]
    pub random_pause_between_actions: PauseRange,
    /// 会话之间（释放并发槽之后）的休眠
    #[serde(default = "default_pause_after_session")]
    pub pause_after_session: PauseRange,
    /// 会话异常后的固定退避（秒）
    #[serde(default = "default_error_backoff_secs")]
    pub error_backoff_secs: u64,
    #[serde(default = "default_accounts_file")]
    pub accounts_file: PathBuf,
}

fn default_threads() -> usize {
    1
}

fn default_attempts() -> u32 {
    3
}

fn default_accounts_range() -> [usize; 2] {
    [0, 0]
}

fn default_pause_between_attempts() -> PauseRange {
    PauseRange(3, 10)
}

fn default_random_initialization_pause() -> PauseRange {
    PauseRange(1, 10)
}

fn default_random_pause_between_actions() -> PauseRange {
    PauseRange(5, 15)
}

fn default_pause_after_session() -> PauseRange {
    PauseRange(0, 60)
}

fn default_error_backoff_secs() -> u64 {
    300
}

fn default_accounts_file() -> PathBuf {
    PathBuf::from("data/accounts.csv")
}

impl Default for SettingsSection {
    fn default() -> Self {
        Self {
            threads: default_threads(),
            attempts: default_attempts(),
            shuffle_accounts: false,
            accounts_range: default_accounts_range(),
            exact_accounts_to_use: Vec::new(),
            pause_between_attempts: default_pause_between_attempts(),
            random_initialization_pause: default_random_initialization_pause(),
            random_pause_between_actions: default_random_pause_between_actions(),
            pause_after_session: default_pause_after_session(),
            error_backoff_secs: default_error_backoff_secs(),
            accounts_file: default_accounts_file(),
        }
    }
}

/// [oracle] 段：决策顾问（OpenAI 兼容接口，默认 DeepSeek）
#[derive(Debug, Clone, Deserialize)]
pub struct OracleSection {
    /// 为空时不调用顾问，始终走确定性兜底策略
    #[serde(default)]
    pub api_keys: Vec<String>,
    #[serde(default = "default_oracle_model")]
    pub model: String,
    pub base_url: Option<String>,
    pub proxy: Option<String>,
    /// 单次请求超时（秒），超时后立即走兜底
    #[serde(default = "default_oracle_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_oracle_model() -> String {
    DEEPSEEK_CHAT.to_string()
}

fn default_oracle_timeout() -> u64 {
    60
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    1000
}

impl Default for OracleSection {
    fn default() -> Self {
        Self {
            api_keys: Vec::new(),
            model: default_oracle_model(),
            base_url: None,
            proxy: None,
            request_timeout_secs: default_oracle_timeout(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

/// [game] 段：远端游戏服务
#[derive(Debug, Clone, Deserialize)]
pub struct GameSection {
    #[serde(default = "default_game_base_url")]
    pub base_url: String,
    #[serde(default = "default_dungeon_id")]
    pub dungeon_id: u32,
    /// 单个动作的内部重试上限（与 settings.attempts 相互独立）
    #[serde(default = "default_max_dispatch_attempts")]
    pub max_dispatch_attempts: u32,
    #[serde(default = "default_dispatch_retry_delay")]
    pub dispatch_retry_delay_secs: u64,
    #[serde(default = "default_game_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_pause_between_rounds")]
    pub pause_between_rounds: PauseRange,
}

fn default_game_base_url() -> String {
    "https://gigaverse.io".to_string()
}

fn default_dungeon_id() -> u32 {
    1
}

fn default_max_dispatch_attempts() -> u32 {
    5
}

fn default_dispatch_retry_delay() -> u64 {
    3
}

fn default_game_timeout() -> u64 {
    30
}

fn default_pause_between_rounds() -> PauseRange {
    PauseRange(3, 3)
}

impl Default for GameSection {
    fn default() -> Self {
        Self {
            base_url: default_game_base_url(),
            dungeon_id: default_dungeon_id(),
            max_dispatch_attempts: default_max_dispatch_attempts(),
            dispatch_retry_delay_secs: default_dispatch_retry_delay(),
            request_timeout_secs: default_game_timeout(),
            pause_between_rounds: default_pause_between_rounds(),
        }
    }
}

impl AppConfig {
    /// 启动前校验：并发与尝试次数至少为 1，区间两端有序
    pub fn validate(&self) -> Result<(), RunnerError> {
        let s = &self.settings;
        if s.threads == 0 {
            return Err(RunnerError::Config("settings.threads must be >= 1".into()));
        }
        if s.attempts == 0 {
            return Err(RunnerError::Config("settings.attempts must be >= 1".into()));
        }
        if self.game.max_dispatch_attempts == 0 {
            return Err(RunnerError::Config(
                "game.max_dispatch_attempts must be >= 1".into(),
            ));
        }
        let ranges = [
            ("settings.pause_between_attempts", s.pause_between_attempts),
            ("settings.random_initialization_pause", s.random_initialization_pause),
            ("settings.random_pause_between_actions", s.random_pause_between_actions),
            ("settings.pause_after_session", s.pause_after_session),
            ("game.pause_between_rounds", self.game.pause_between_rounds),
        ];
        for (name, range) in ranges {
            if range.0 > range.1 {
                return Err(RunnerError::Config(format!(
                    "{name}: lower bound {} is greater than upper bound {}",
                    range.0, range.1
                )));
            }
        }
        if s.accounts_range[0] > s.accounts_range[1] {
            return Err(RunnerError::Config(
                "settings.accounts_range must be [start, end] with start <= end".into(),
            ));
        }
        Ok(())
    }
}

/// 从 config 目录加载配置，环境变量 GIGA__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 GIGA__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("GIGA")
            .separator("__")
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("oracle.api_keys"),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
