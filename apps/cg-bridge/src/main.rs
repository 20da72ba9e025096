//! cg-bridge：MQTT 遥测 → PostgreSQL 的摄取桥。
//!
//! 子命令：
//! - run      常驻运行（默认配置 config.yml）
//! - cleanup  执行一轮 retention 清理后退出
//! - health   探测 broker 与存储，退出码 0/1
//! - setup    应用幂等数据库模式后退出

mod health;
mod supervisor;

use cg_config::AppConfig;
use cg_telemetry::init_tracing;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::error;

#[derive(Parser)]
#[command(name = "cg-bridge", version, about = "CG telemetry ingestion bridge")]
struct Cli {
    /// 缺省子命令等价于 run
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// 订阅 broker 并持续落库
    Run {
        #[arg(short, long, default_value = "config.yml")]
        config: PathBuf,
    },
    /// 执行一轮 retention 清理后退出
    Cleanup {
        #[arg(short, long, default_value = "config.yml")]
        config: PathBuf,
    },
    /// 探测 broker 与存储连通性
    Health {
        #[arg(short, long, default_value = "config.yml")]
        config: PathBuf,
    },
    /// 应用数据库模式（CREATE ... IF NOT EXISTS）
    Setup {
        #[arg(short, long, default_value = "config.yml")]
        config: PathBuf,
    },
}

impl Command {
    fn config_path(&self) -> &PathBuf {
        match self {
            Command::Run { config }
            | Command::Cleanup { config }
            | Command::Health { config }
            | Command::Setup { config } => config,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // 本地 .env（如存在）便于直接 cargo run
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Command::Run {
        config: PathBuf::from("config.yml"),
    });

    let config = match AppConfig::load(command.config_path()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("config error: {err}");
            return ExitCode::FAILURE;
        }
    };

    let _log_guard = match init_tracing(&config.logging) {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("logging error: {err}");
            return ExitCode::FAILURE;
        }
    };

    let result = match &command {
        Command::Run { .. } => supervisor::run(config).await,
        Command::Cleanup { .. } => supervisor::cleanup_once(config).await,
        Command::Health { .. } => health::probe(&config).await,
        Command::Setup { .. } => supervisor::setup_schema(config).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(target: "cg.main", error = %err, "exiting with failure");
            ExitCode::FAILURE
        }
    }
}
