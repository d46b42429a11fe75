use anyhow::{Context, Result};
use clap::{Arg, ArgAction, Command};
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use playgo_client::config::{ConfigManager, EnvConfigOverride};
use playgo_client::producer::LocalProducer;
use playgo_client::session::{ControllerHandle, StreamController, UiEvent};
use playgo_client::sink::FileEngine;

#[tokio::main]
async fn main() -> Result<()> {
    // 解析命令行参数
    let matches = Command::new("PlayGo Playback Client")
        .version(env!("CARGO_PKG_VERSION"))
        .author("PlayGo Team")
        .about("Buffered playback client for fragmented media streams")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("PATH")
                .help("Configuration file")
                .default_value("playgo.toml"),
        )
        .arg(
            Arg::new("output-dir")
                .short('o')
                .long("output-dir")
                .value_name("DIR")
                .help("Directory receiving recorded streams"),
        )
        .arg(
            Arg::new("once")
                .long("once")
                .action(ArgAction::SetTrue)
                .help("Exit when the first stream ends"),
        )
        .arg(
            Arg::new("target")
                .value_name("TARGET")
                .help("Stream to play on startup (.jsonl event log or fragmented .mp4)"),
        )
        .get_matches();

    // 加载配置
    let config_path = matches
        .get_one::<String>("config")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("playgo.toml"));
    let mut manager = ConfigManager::new(config_path.clone());
    manager
        .load()
        .await
        .with_context(|| format!("Failed to load configuration from {:?}", config_path))?;

    let mut config = manager.get_config().clone();
    EnvConfigOverride::apply_overrides(&mut config);
    if let Some(dir) = matches.get_one::<String>("output-dir") {
        config.sink.output_dir = PathBuf::from(dir);
    }
    config.validate()?;

    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .with_target(false)
        .init();

    info!("🚀 PlayGo playback client v{}", env!("CARGO_PKG_VERSION"));
    info!("  Config: {:?}", config_path);
    info!("  Recordings: {:?}", config.sink.output_dir);
    info!(
        "  Queue: capacity {}, watermarks {}/{}",
        config.queue.capacity, config.queue.high_watermark, config.queue.low_watermark
    );

    // 组装控制器
    let (handle, events) = ControllerHandle::channel();
    let mut ui = handle.subscribe_ui();
    let producer = LocalProducer::new(handle.event_sender(), config.producer.clone());
    let engine = FileEngine::new(config.sink.clone());
    let controller = StreamController::new(&config, Box::new(producer), Box::new(engine), &handle);
    let controller_task = tokio::spawn(controller.run(events));

    let once = matches.get_flag("once");
    if let Some(target) = matches.get_one::<String>("target") {
        handle.play(target.clone());
    }
    print_commands();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) => {
                    if !dispatch_command(&handle, &line) {
                        break;
                    }
                }
                Ok(None) => {
                    stdin_open = false;
                    if !once {
                        break;
                    }
                }
                Err(e) => {
                    warn!("Failed to read console input: {}", e);
                    stdin_open = false;
                }
            },
            event = ui.recv() => match event {
                Ok(event) => {
                    print_ui_event(&event);
                    let finished = matches!(
                        event,
                        UiEvent::StreamEnded { reconnecting: false, .. } | UiEvent::OpenRejected { .. }
                    );
                    if once && finished {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Missed {} UI notifications", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down");
                break;
            }
        }
    }

    handle.shutdown();
    controller_task.await.context("Controller task panicked")?;
    info!("PlayGo playback client stopped");

    Ok(())
}

/// 处理一行控制台命令，返回false表示退出
fn dispatch_command(handle: &ControllerHandle, line: &str) -> bool {
    let mut parts = line.split_whitespace();

    match parts.next() {
        None => {}
        Some("play") => {
            let target = parts.collect::<Vec<_>>().join(" ");
            if target.is_empty() {
                warn!("Usage: play <target>");
            } else {
                handle.play(target);
            }
        }
        Some("stop") => handle.stop(),
        Some("reconnect") => handle.reconnect(),
        Some("help") => print_commands(),
        Some("quit") | Some("exit") => return false,
        Some(other) => warn!("Unknown command: {}", other),
    }

    true
}

fn print_ui_event(event: &UiEvent) {
    match serde_json::to_string(event) {
        Ok(line) => println!("{}", line),
        Err(e) => warn!("Failed to serialize UI event: {}", e),
    }
}

fn print_commands() {
    info!("Available commands:");
    info!("  play <target> - Play an event log or fragmented MP4");
    info!("  stop - Stop the current stream");
    info!("  reconnect - Restart the current stream from the beginning");
    info!("  quit - Exit client");
}
