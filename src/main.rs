//! master-agent：命令行入口
//!
//! 初始化日志、加载配置、建立原生通道与目录。
//! - `master-agent <message>`：对给出的用户消息跑一轮编排，输出 JSON 结果
//! - `master-agent serve`：在路由器上注册为主控智能体，持续处理转发来的请求
//!
//! ```bash
//! master-agent "Find a lab near 10001 and summarize its reviews"
//! MASTER_CONFIG=./master.toml master-agent serve
//! ```

use std::sync::Arc;

use anyhow::Context;
use master_agent::{
    agent::{ChatRequest, MasterAgent},
    channel::{NativeChannel, WsChannel},
    config::{load_config, AppConfig},
    observability, serve,
};
use tokio_util::sync::CancellationToken;

/// Ctrl-C 时取消返回的 token
fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_signal.cancel();
        }
    });
    cancel
}

async fn run_serve(cfg: &AppConfig) -> anyhow::Result<()> {
    let url = cfg
        .channel
        .ws_url
        .as_deref()
        .context("serve mode requires channel.ws_url")?;
    let channel = Arc::new(
        WsChannel::connect(
            url,
            cfg.channel.api_key.as_deref(),
            cfg.channel.request_timeout_secs,
        )
        .await
        .context("Failed to connect to router")?,
    );
    let native: Arc<dyn NativeChannel> = channel.clone();
    let agent = MasterAgent::from_config_with_channel(cfg, native)
        .context("Failed to build master agent")?;

    tracing::info!(agent = %cfg.channel.agent_name, "Master agent serving");
    serve::serve(
        Arc::new(agent),
        channel,
        &cfg.channel.agent_name,
        &cfg.channel.agent_description,
        cancel_on_ctrl_c(),
    )
    .await
    .context("Serve loop failed")?;
    Ok(())
}

async fn run_once(cfg: &AppConfig, message: String) -> anyhow::Result<()> {
    let agent = MasterAgent::from_config(cfg)
        .await
        .context("Failed to build master agent")?;

    let reply = agent
        .respond(ChatRequest::from_user(message).with_cancel(cancel_on_ctrl_c()))
        .await;
    println!(
        "{}",
        serde_json::to_string_pretty(&reply).context("Failed to encode reply")?
    );
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let config_path = std::env::var("MASTER_CONFIG").ok().map(Into::into);
    let cfg = load_config(config_path).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        AppConfig::default()
    });

    if args.first().map(String::as_str) == Some("serve") {
        return run_serve(&cfg).await;
    }

    let message = args.join(" ");
    if message.trim().is_empty() {
        anyhow::bail!("usage: master-agent <message> | master-agent serve");
    }
    run_once(&cfg, message).await
}
