//! 命令行入口：`cloud-fs-fuse CONFIG_PATH CACHE_CAPACITY [test]`
//!
//! 退出码：参数或启动失败为 2，干净卸载为 0。
//! 信号触发的关停（约定退出码 1）属于内核桥接层的职责，
//! 桥接层在挂载与卸载之间驱动 [`session::Session`]。

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::error;

use cloud_fs_fuse::config::Config;
use cloud_fs_fuse::selftest;
use cloud_fs_fuse::session::Session;

/// 把对象桶挂成 POSIX 风格文件系统的宿主入口
#[derive(Parser)]
#[command(name = "cloud-fs-fuse", version, about)]
struct Cli {
    /// 配置文件路径
    config: PathBuf,

    /// 写回缓存容量（块数），必须为正
    #[arg(value_parser = clap::value_parser!(u64).range(1..))]
    cache_capacity: u64,

    /// 字面量 `test`：挂载后运行自检
    mode: Option<String>,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let run_tests = match cli.mode.as_deref() {
        None => false,
        Some("test") => true,
        Some(other) => {
            error!("unrecognized argument {other:?}, expected the literal \"test\"");
            return ExitCode::from(2);
        }
    };

    match run(&cli, run_tests) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::from(2)
        }
    }
}

fn run(cli: &Cli, run_tests: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load(&cli.config)?;
    let session = Session::start(&config, cli.cache_capacity as usize)?;

    if run_tests {
        let mut root = session.root()?;
        selftest::run_all(&mut root);
    }

    // 部分失败已在会话内记录；关停序列不重试
    if let Err(e) = session.finish() {
        error!("unmount left remote state incomplete: {e}");
    }
    Ok(())
}
