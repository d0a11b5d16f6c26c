use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};

use voicechat_core_sdk::{
    config::Settings,
    error::{SendOutcome, SessionError},
    models::{ProviderId, PROVIDERS},
    orchestrator::RequestOrchestrator,
    server,
    session::{user_copy, Session},
    telemetry,
};

/**
 * \brief CLI 程序入口：文本聊天、交互模式与本地服务。
 */
#[derive(Parser, Debug)]
#[command(name = "voicechat", version, about = "VoiceChat text/voice AI chat client")]
struct Cli {
    /** \brief 开启遥测日志（写入 logs/voicechat.log） */
    #[arg(long, global = true, default_value_t = false)]
    telemetry: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /**
     * \brief 列出可用 Provider 以及 API Key 配置情况。
     */
    Providers,

    /**
     * \brief 发送一条消息并打印回复。
     * \param provider Provider 名称：openai/perplexity/anthropic
     * \param api_key  覆盖环境变量中的 API Key
     */
    Chat {
        #[arg(long, default_value = "openai")]
        provider: String,
        #[arg(long)]
        prompt: String,
        #[arg(long)]
        api_key: Option<String>,
    },

    /**
     * \brief 交互模式，逐行发送；支持 /clear /export /provider /quit。
     */
    Repl {
        #[arg(long, default_value = "openai")]
        provider: String,
    },

    /**
     * \brief 启动本地 HTTP 服务并提供前端页面。
     */
    Serve {
        #[arg(long, default_value = "127.0.0.1:5173")]
        addr: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = Settings::from_env().context("load settings from environment failed")?;
    if cli.telemetry {
        settings.telemetry_enabled = true;
    }
    if let Ok(dir) = std::env::var("VOICECHAT_LOG_DIR") {
        telemetry::set_log_dir(dir);
    }

    match cli.command {
        Commands::Providers => {
            for config in PROVIDERS.iter() {
                println!(
                    "{:<11} {:<17} {:<25} key={}",
                    config.id.as_str(),
                    config.display_name,
                    config.model_name,
                    if settings.api_keys.is_configured(config.id) {
                        "configured"
                    } else {
                        "missing"
                    }
                );
            }
        }
        Commands::Chat {
            provider,
            prompt,
            api_key,
        } => {
            let provider: ProviderId = provider.parse().context("invalid --provider")?;
            if let Some(key) = api_key {
                settings.api_keys.set(provider, key);
            }
            let mut session = Session::new(settings, RequestOrchestrator::default());
            telemetry::log_event(
                "cli.chat",
                &format!("provider={} prompt_len={}", provider, prompt.len()),
            );
            let outcome = session.submit(provider, &prompt).await;
            if !print_outcome(provider, outcome) {
                std::process::exit(1);
            }
        }
        Commands::Repl { provider } => {
            let provider: ProviderId = provider.parse().context("invalid --provider")?;
            let session = Session::new(settings, RequestOrchestrator::default());
            repl(session, provider).await?;
        }
        Commands::Serve { addr } => {
            let session = Session::new(settings, RequestOrchestrator::default());
            server::run(&addr, session).await?;
        }
    }

    Ok(())
}

/**
 * \brief 打印发送结果，返回是否成功。
 */
fn print_outcome(provider: ProviderId, outcome: Result<SendOutcome, SessionError>) -> bool {
    match outcome {
        Ok(SendOutcome::Success { text }) => {
            println!("{}", text);
            true
        }
        Ok(SendOutcome::Failure { kind, detail }) => {
            eprintln!("{}", user_copy(kind, provider, &detail));
            false
        }
        Err(e) => {
            eprintln!("{}", e);
            false
        }
    }
}

async fn repl(mut session: Session, mut provider: ProviderId) -> Result<()> {
    println!(
        "Chatting with {} (/provider NAME, /clear, /export [PATH], /quit)",
        provider.config().display_name
    );
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("read stdin failed")? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match line.split_once(' ').unwrap_or((line, "")) {
            ("/quit", _) | ("/exit", _) => break,
            ("/clear", _) => {
                session.clear_transcript();
                println!("Conversation cleared!");
            }
            ("/provider", name) => match name.parse::<ProviderId>() {
                Ok(p) => {
                    provider = p;
                    println!("Switched to {}", p.config().display_name);
                }
                Err(e) => eprintln!("{}", e),
            },
            ("/export", path) => match export_to(&session, path) {
                Ok(Some(path)) => println!("Conversation exported to {}", path.display()),
                Ok(None) => eprintln!("No conversation to export."),
                // 导出失败不结束会话，内存中的记录是唯一副本
                Err(e) => eprintln!("{:#}", e),
            },
            _ => {
                let outcome = session.submit(provider, line).await;
                print_outcome(provider, outcome);
            }
        }
    }
    Ok(())
}

/**
 * \brief 导出会话记录到文件；路径为空时使用默认文件名。
 * \return 空会话返回 Ok(None)
 */
fn export_to(session: &Session, path: &str) -> Result<Option<PathBuf>> {
    let Some(export) = session.export() else {
        return Ok(None);
    };
    let path = if path.trim().is_empty() {
        PathBuf::from(&export.file_name)
    } else {
        PathBuf::from(path.trim())
    };
    std::fs::write(&path, export.content)
        .with_context(|| format!("write {} failed", path.display()))?;
    Ok(Some(path))
}
