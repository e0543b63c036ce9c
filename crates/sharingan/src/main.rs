mod audit;
mod config;
mod error;
mod history;
mod model;
mod prompt;
mod render;
mod reveal;
mod session;

use std::io::{IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

use audit_common::gemini::{GeminiClient, GeminiClientConfig};

use audit::{Auditor, GeminiAuditor};
use config::Config;
use history::HistoryStore;
use model::{AuditSessionState, ScanMode};
use prompt::ImageEvidence;
use reveal::{RevealFrame, RevealSequencer};
use session::{AuditSession, ScanRequest};

#[derive(Parser)]
#[command(name = "sharingan", version, about = "Brand identity audits powered by Gemini")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Audit a brand
    Scan {
        /// Brand or company name
        brand: String,
        /// Competitor to compare against
        #[arg(long)]
        competitor: Option<String>,
        /// Screenshot to attach as visual evidence: a file path or a `data:` URL
        #[arg(long)]
        image: Option<String>,
        /// Deep scan (MANGEKYOU mode)
        #[arg(long)]
        deep: bool,
        #[command(flatten)]
        display: DisplayArgs,
    },
    /// List stored audits, newest first
    History,
    /// Show a stored audit
    Show {
        id: String,
        #[command(flatten)]
        display: DisplayArgs,
    },
    /// Print one block of a stored audit (the report by default)
    Copy {
        id: String,
        /// Vision prompt number, as shown in the report
        #[arg(long, conflicts_with = "versus")]
        prompt: Option<usize>,
        /// The versus analysis
        #[arg(long)]
        versus: bool,
    },
}

#[derive(Args)]
struct DisplayArgs {
    /// Also write the rendered report to this file
    #[arg(long)]
    output: Option<PathBuf>,
    /// Print the report at once
    #[arg(long)]
    no_reveal: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // Logs go to stderr so report output on stdout can be piped.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let cli = Cli::parse();

    let config = Config::from_env()?;
    info!(
        history_path = %config.history_path.display(),
        redis = config.redis_url.is_some(),
        "configuration loaded"
    );
    let store = HistoryStore::new(config.history_slot().await);

    let gemini_config = GeminiClientConfig::from_env();
    info!(
        base_url = %gemini_config.base_url,
        model = %gemini_config.model,
        timeout_ms = gemini_config.default_timeout.as_millis(),
        api_key = gemini_config.api_key.is_some(),
        "gemini client configured"
    );
    let auditor = GeminiAuditor::new(GeminiClient::new(gemini_config)?);
    let session = AuditSession::open(auditor, store).await;

    match cli.command {
        Command::Scan {
            brand,
            competitor,
            image,
            deep,
            display,
        } => {
            let image = match image {
                Some(raw) if raw.starts_with("data:") => {
                    Some(ImageEvidence::from_data_url(&raw)?)
                }
                Some(path) => Some(ImageEvidence::from_path(Path::new(&path)).await?),
                None => None,
            };
            let request = ScanRequest::new(
                &brand,
                ScanMode::from_deep_flag(deep),
                competitor.as_deref(),
                image,
            )?;
            let frames = start_reveal(&session, &display);

            eprintln!(
                "scanning {} ({}){}",
                request.company,
                request.mode,
                request
                    .competitor
                    .as_deref()
                    .map(|c| format!(" versus {c}"))
                    .unwrap_or_default()
            );
            let ticket = session.scan(request).await;
            tokio::select! {
                _ = ticket.wait() => {}
                _ = tokio::signal::ctrl_c() => {
                    session.reset().await;
                    eprintln!("scan cancelled");
                    return Ok(ExitCode::from(130));
                }
            }
            finish(&session, &display, frames).await
        }
        Command::History => {
            let items = session.history().await;
            if items.is_empty() {
                println!("no audits stored yet");
            }
            for item in &items {
                println!("{}", render::render_history_line(item));
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Show { id, display } => {
            let frames = start_reveal(&session, &display);
            session.load_history_item(&id).await?;
            finish(&session, &display, frames).await
        }
        Command::Copy { id, prompt, versus } => {
            let data = session.load_history_item(&id).await?;
            let block = if versus {
                match data.versus_report.as_deref() {
                    Some(text) => text,
                    None => bail!("audit {id} has no versus analysis"),
                }
            } else if let Some(n) = prompt {
                match render::prompt_text(&data, n) {
                    Some(text) => text,
                    None => bail!(
                        "audit {id} has {} vision prompts, no prompt {n}",
                        data.vision_prompts.len()
                    ),
                }
            } else {
                data.markdown_report.as_str()
            };
            println!("{block}");
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Attach a reveal sequencer to the session unless the report is to be printed at once.
fn start_reveal<A: Auditor>(
    session: &AuditSession<A>,
    display: &DisplayArgs,
) -> Option<watch::Receiver<RevealFrame>> {
    if display.no_reveal || !std::io::stdout().is_terminal() {
        return None;
    }
    let sequencer = RevealSequencer::new();
    let frames = sequencer.subscribe();
    // Detached; stops with the session.
    let _ = sequencer.follow(session.subscribe());
    Some(frames)
}

async fn finish<A: Auditor>(
    session: &AuditSession<A>,
    display: &DisplayArgs,
    frames: Option<watch::Receiver<RevealFrame>>,
) -> anyhow::Result<ExitCode> {
    match session.state() {
        AuditSessionState::Complete(data) => {
            let text = render::render_report(&data);
            present(&text, frames).await?;
            if let Some(path) = &display.output {
                tokio::fs::write(path, &text)
                    .await
                    .with_context(|| format!("cannot write report to {}", path.display()))?;
                info!(path = %path.display(), "report exported");
            }
            Ok(ExitCode::SUCCESS)
        }
        AuditSessionState::Error(message) => {
            eprintln!("SYSTEM ERROR: {message}");
            Ok(ExitCode::FAILURE)
        }
        other => {
            eprintln!("audit ended in unexpected state: {}", other.name());
            Ok(ExitCode::FAILURE)
        }
    }
}

/// Print `text`, uncovering lines as the reveal advances.
async fn present(text: &str, frames: Option<watch::Receiver<RevealFrame>>) -> anyhow::Result<()> {
    let mut stdout = std::io::stdout();
    let Some(mut frames) = frames else {
        stdout.write_all(text.as_bytes())?;
        return Ok(stdout.flush()?);
    };

    let lines: Vec<&str> = text.lines().collect();
    let mut shown = 0;
    loop {
        let frame = *frames.borrow_and_update();
        let target = render::visible_lines(text, frame.visible_fraction());
        while shown < target {
            writeln!(stdout, "{}", lines[shown])?;
            shown += 1;
        }
        stdout.flush()?;
        if frame.revealed() || frames.changed().await.is_err() {
            break;
        }
    }
    for line in &lines[shown..] {
        writeln!(stdout, "{line}")?;
    }
    Ok(stdout.flush()?)
}
