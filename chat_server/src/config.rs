//! 应用配置：监听地址、连接参数与内存存储的种子数据。
//!
//! 配置从 `app_settings.json` 读取；文件不存在或无法解析时使用默认配置并写回文件。
//! 加载结果由 `main` 显式传递给各组件，不使用全局静态变量。

use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use chat_models::{GroupId, UserId};
use chat_transport::frame::DEFAULT_MAX_LINE_BYTES;
use chat_transport::outbound::DEFAULT_OUTBOUND_CAPACITY;

use crate::error::AppError;

/// 配置文件名
pub const CONFIG_FILE_NAME: &str = "app_settings.json";
/// 服务的默认主机地址
pub const DEFAULT_HOST: &str = "0.0.0.0";
/// 服务的默认端口号
pub const DEFAULT_PORT: u16 = 12345;

/// 服务端详细配置
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// 绑定的主机地址
    pub host: String,
    /// 监听的端口号
    pub port: u16,
    /// 每个连接出站队列的容量 (条)
    pub outbound_queue_capacity: usize,
    /// 单行最大字节数，超过的行被丢弃
    pub max_line_bytes: usize,
    /// 历史记录请求未指定 limit 时的默认条数
    pub default_history_limit: u32,
    /// 历史记录请求 limit 的上限
    pub max_history_limit: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            outbound_queue_capacity: DEFAULT_OUTBOUND_CAPACITY,
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
            default_history_limit: 50,
            max_history_limit: 200,
        }
    }
}

impl ServerConfig {
    /// `host:port` 形式的监听地址。
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// 种子用户。密码以明文保存，仅用于内存存储与演示。
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SeedUser {
    pub uid: UserId,
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub gender: Option<u8>,
    #[serde(default)]
    pub birthday: Option<String>,
    #[serde(default)]
    pub tele: Option<String>,
}

impl SeedUser {
    /// 只有 uid、用户名与密码的用户，测试中常用。
    pub fn new(uid: UserId, username: &str, password: &str) -> Self {
        Self {
            uid,
            username: username.to_string(),
            password: password.to_string(),
            avatar_url: None,
            gender: None,
            birthday: None,
            tele: None,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SeedGroup {
    pub id: GroupId,
    pub name: String,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub members: Vec<UserId>,
}

/// 内存存储的初始数据。整个 `seed` 缺省时使用演示数据。
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SeedData {
    #[serde(default)]
    pub users: Vec<SeedUser>,
    #[serde(default)]
    pub groups: Vec<SeedGroup>,
    /// 好友关系 (双向)，每项为一对 uid。
    #[serde(default)]
    pub friendships: Vec<(UserId, UserId)>,
}

impl Default for SeedData {
    fn default() -> Self {
        let users = vec![
            SeedUser {
                gender: Some(1),
                birthday: Some("1995-03-14".to_string()),
                ..SeedUser::new(1, "alice", "alice123")
            },
            SeedUser {
                gender: Some(2),
                ..SeedUser::new(2, "bob", "bob123")
            },
            SeedUser::new(3, "carol", "carol123"),
        ];
        Self {
            users,
            groups: vec![SeedGroup {
                id: 9,
                name: "demo".to_string(),
                avatar: None,
                members: vec![1, 2, 3],
            }],
            friendships: vec![(1, 2), (1, 3)],
        }
    }
}

/// 应用的主配置结构体
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub seed: SeedData,
}

/// 确定配置文件路径：优先使用命令行传入的路径，否则为当前目录下的 `app_settings.json`。
pub fn resolve_config_path(cli_arg: Option<String>) -> PathBuf {
    match cli_arg {
        Some(path) if !path.trim().is_empty() => PathBuf::from(path),
        _ => env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(CONFIG_FILE_NAME),
    }
}

/// 加载或创建应用配置文件
pub fn load_or_create(config_file_path: &Path) -> AppConfig {
    match fs::read_to_string(config_file_path) {
        Ok(content) => match serde_json::from_str::<AppConfig>(&content) {
            Ok(config) => {
                info!("[配置模块] 已成功从配置文件 {:?} 加载应用配置。", config_file_path);
                config
            }
            Err(e) => {
                warn!(
                    "[配置模块] 警告：从 {:?} 反序列化配置失败: {}. 文件可能已损坏。将使用默认配置并尝试覆盖。",
                    config_file_path, e
                );
                write_defaults(config_file_path)
            }
        },
        Err(e) => {
            info!(
                "[配置模块] 未在 {:?} 找到配置文件或读取时发生错误 (错误: {}). 将使用默认配置并尝试创建新文件。",
                config_file_path, e
            );
            write_defaults(config_file_path)
        }
    }
}

fn write_defaults(path: &Path) -> AppConfig {
    let default_config = AppConfig::default();
    match save_config(&default_config, path) {
        Ok(()) => info!("[配置模块] 已将默认配置保存到 {:?}.", path),
        Err(e) => warn!("[配置模块] {}", e),
    }
    default_config
}

/// 保存配置到文件
pub fn save_config(config: &AppConfig, path: &Path) -> Result<(), AppError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)
                .map_err(|e| AppError::ConfigError(format!("创建配置目录 {:?} 失败: {}", parent, e)))?;
        }
    }
    let content = serde_json::to_string_pretty(config)
        .map_err(|e| AppError::ConfigError(format!("序列化配置失败: {}", e)))?;
    fs::write(path, content).map_err(|e| AppError::ConfigError(format!("将配置写入文件 {:?} 时失败: {}", path, e)))
}
