use std::sync::Arc;

use anyhow::Context;
use chat_server::config::{load_or_create, resolve_config_path};
use chat_server::db::{Collaborators, MemoryStore};
use chat_server::tcp_server::service::ChatService;
use log::{info, LevelFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志记录器，RUST_LOG 可覆盖默认级别
    env_logger::Builder::new()
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .format_timestamp_millis()
        .init();
    info!("[主程序] 日志系统已成功初始化 (env_logger)，默认级别: Info。");

    let config_path = resolve_config_path(std::env::args().nth(1));
    let app_config = load_or_create(&config_path);
    info!("[主程序] 应用配置已加载，监听地址: {}", app_config.server.bind_addr());

    let store = Arc::new(MemoryStore::from_seed(&app_config.seed));
    let collaborators = Collaborators::from_store(store);

    let service = ChatService::new(app_config.server.clone(), collaborators);
    info!("[主程序] 正在启动聊天服务...");
    service.start().await.context("聊天服务异常退出")
}
