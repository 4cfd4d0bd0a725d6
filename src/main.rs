//! Giga Runner
//!
//! 入口：初始化日志、加载配置与账户、启动有界并发调度，直到 Ctrl+C / SIGTERM。
//! 用法：`giga-runner [配置文件路径]`

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use giga_runner::accounts::{read_accounts, select_accounts};
use giga_runner::config::load_config;
use giga_runner::core::{run_until_shutdown, Scheduler, ShutdownManager};
use giga_runner::{observability, GameRunner};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = load_config(config_path).context("Failed to load config")?;
    config.validate().context("Invalid config")?;
    let config = Arc::new(config);

    let accounts = read_accounts(&config.settings.accounts_file)
        .context("Failed to read accounts")?;
    let accounts = select_accounts(accounts, &config.settings);

    let runner = Arc::new(GameRunner::from_config(Arc::clone(&config)).context("Failed to build runner")?);
    let shutdown = Arc::new(ShutdownManager::new());
    let scheduler = Scheduler::new(&config.settings, runner, shutdown.token());
    tracing::info!(
        "Starting {} account(s) with concurrency {}",
        accounts.len(),
        scheduler.gate().capacity()
    );

    run_until_shutdown(shutdown, scheduler.run(accounts))
        .await
        .context("Scheduler failed")?;

    Ok(())
}
