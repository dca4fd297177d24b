use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use rpger_extractor::address::Layout;
use rpger_extractor::catalog::ContentKind;
use rpger_extractor::config::AppConfig;
use rpger_extractor::enhance::EnhanceMode;
use rpger_extractor::identify::ManualOverride;
use rpger_extractor::llm::ProviderKind;
use rpger_extractor::logging;
use rpger_extractor::pipeline::{AnalyzeOptions, ExtractOptions, Stage};
use rpger_extractor::service::{ExtractorService, StoreKind};

const EXIT_USAGE: u8 = 2;

#[derive(Parser)]
#[command(name = "rpger", version, about = "TTRPG PDF extraction pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Extract a single PDF into the configured stores.
    Extract {
        pdf: PathBuf,
        #[command(flatten)]
        flags: ExtractFlags,
    },
    /// Walk a directory and extract every .pdf in it.
    Batch {
        dir: PathBuf,
        #[command(flatten)]
        flags: ExtractFlags,
    },
    /// Print store/provider health and recent sessions.
    Status,
}

#[derive(clap::Args, Clone)]
struct ExtractFlags {
    /// AI provider: mock, claude, openai, or ollama.
    #[arg(long, default_value = "mock")]
    provider: String,

    /// Content kind: source_material or novel.
    #[arg(long, default_value = "source_material")]
    kind: String,

    /// Manual override: game system identifier.
    #[arg(long)]
    game: Option<String>,

    /// Manual override: edition.
    #[arg(long)]
    edition: Option<String>,

    /// Manual override: book code.
    #[arg(long)]
    book: Option<String>,

    /// Store layout: separate or single.
    #[arg(long, default_value = "separate")]
    layout: String,

    /// Text enhancement: off, normal, or aggressive.
    #[arg(long, default_value = "normal")]
    enhance: String,

    /// Write the artifact JSON into this directory.
    #[arg(long)]
    out: Option<PathBuf>,
}

struct ParsedFlags {
    provider: ProviderKind,
    kind: ContentKind,
    layout: Layout,
    enhance: EnhanceMode,
    overrides: Option<ManualOverride>,
    out: Option<PathBuf>,
}

impl ExtractFlags {
    fn parse(&self) -> Result<ParsedFlags, String> {
        let provider = ProviderKind::parse(&self.provider)
            .ok_or_else(|| format!("unknown provider '{}'", self.provider))?;
        let kind = ContentKind::parse(&self.kind)
            .ok_or_else(|| format!("unknown kind '{}'", self.kind))?;
        let layout = Layout::parse(&self.layout)
            .ok_or_else(|| format!("unknown layout '{}'", self.layout))?;
        let enhance = EnhanceMode::parse(&self.enhance)
            .ok_or_else(|| format!("unknown enhance mode '{}'", self.enhance))?;

        let overrides = ManualOverride {
            game: self.game.clone(),
            edition: self.edition.clone(),
            book: self.book.clone(),
            kind: None,
        };
        Ok(ParsedFlags {
            provider,
            kind,
            layout,
            enhance,
            overrides: if overrides.is_empty() { None } else { Some(overrides) },
            out: self.out.clone(),
        })
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    logging::init();
    let cli = Cli::parse();
    let config = AppConfig::load();
    let service = Arc::new(ExtractorService::new(config));
    let _sweeper = service.start_sweeper();

    match cli.command {
        Command::Extract { pdf, flags } => {
            let parsed = match flags.parse() {
                Ok(p) => p,
                Err(message) => return usage_error(&message),
            };
            let code = run_one(&service, &pdf, &parsed).await;
            ExitCode::from(code as u8)
        }
        Command::Batch { dir, flags } => {
            let parsed = match flags.parse() {
                Ok(p) => p,
                Err(message) => return usage_error(&message),
            };
            run_batch(&service, &dir, &parsed).await
        }
        Command::Status => run_status(&service).await,
    }
}

fn usage_error(message: &str) -> ExitCode {
    eprintln!("error: {message}");
    ExitCode::from(EXIT_USAGE)
}

/// Drive one PDF through upload → analyze → extract, streaming progress to
/// stderr. Returns the CLI exit code for the session's terminal state.
async fn run_one(service: &Arc<ExtractorService>, pdf: &Path, flags: &ParsedFlags) -> i32 {
    let origin_name = pdf
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("document.pdf")
        .to_string();

    let bytes = match tokio::fs::read(pdf).await {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("error: cannot read {}: {e}", pdf.display());
            return Stage::FailedIdentification.exit_code();
        }
    };

    let session_id = match service.upload(bytes, &origin_name).await {
        Ok(id) => id,
        Err(e) => {
            eprintln!("error: upload failed: {e}");
            return Stage::FailedIdentification.exit_code();
        }
    };

    // Progress printer runs concurrently with processing.
    if let Ok(mut progress) = service.progress_stream(&session_id).await {
        let name = origin_name.clone();
        tokio::spawn(async move {
            while let Some(event) = progress.recv().await {
                match &event.note {
                    Some(note) => eprintln!(
                        "[{name}] {} {}% - {note}",
                        event.stage.as_str(),
                        event.percent
                    ),
                    None => eprintln!("[{name}] {} {}%", event.stage.as_str(), event.percent),
                }
            }
        });
    }

    let drive = async {
        let verdict = service
            .analyze(
                &session_id,
                AnalyzeOptions {
                    provider: flags.provider,
                    kind: flags.kind,
                    overrides: flags.overrides.clone(),
                },
            )
            .await?;
        tracing::info!(
            game = %verdict.game,
            edition = %verdict.edition,
            book = %verdict.book,
            confidence = verdict.confidence,
            "identified"
        );
        service
            .extract(
                &session_id,
                ExtractOptions { enhance: flags.enhance, layout: flags.layout },
            )
            .await
    };

    let result = tokio::select! {
        result = drive => result,
        _ = tokio::signal::ctrl_c() => {
            eprintln!("interrupted; cancelling {session_id}");
            let _ = service.cancel(&session_id).await;
            return Stage::Cancelled.exit_code();
        }
    };

    match result {
        Ok(artifact) => {
            println!(
                "{origin_name}: {} sections, {} words, grade {} ({} / {} / {})",
                artifact.counts.sections,
                artifact.counts.words,
                artifact.confidence.grade,
                artifact.verdict.game,
                artifact.verdict.edition,
                artifact.verdict.book,
            );
            if let Some(dir) = &flags.out {
                if let Err(e) = write_artifact(dir, &origin_name, &artifact).await {
                    eprintln!("warning: could not write artifact: {e}");
                }
            }
            Stage::Completed.exit_code()
        }
        Err(e) => {
            eprintln!("error: {e}");
            session_exit_code(service, &session_id).await
        }
    }
}

async fn session_exit_code(service: &Arc<ExtractorService>, session_id: &str) -> i32 {
    match service.status(session_id).await {
        Ok(snapshot) => snapshot.stage.exit_code(),
        Err(_) => 1,
    }
}

async fn write_artifact(
    dir: &Path,
    origin_name: &str,
    artifact: &rpger_extractor::pipeline::Artifact,
) -> anyhow::Result<()> {
    tokio::fs::create_dir_all(dir).await?;
    let stem = origin_name.trim_end_matches(".pdf");
    let full = dir.join(format!("{stem}.json"));
    tokio::fs::write(&full, serde_json::to_vec_pretty(artifact)?).await?;

    let summary = serde_json::json!({
        "verdict": &artifact.verdict,
        "counts": &artifact.counts,
        "confidence": &artifact.confidence,
        "ingested_at": &artifact.ingested_at,
    });
    let summary_path = dir.join(format!("{stem}.summary.json"));
    tokio::fs::write(&summary_path, serde_json::to_vec_pretty(&summary)?).await?;
    println!("wrote {} and {}", full.display(), summary_path.display());
    Ok(())
}

/// One session per .pdf under the directory. Exit 0 iff every session
/// reached completed or rejected_duplicate.
async fn run_batch(service: &Arc<ExtractorService>, dir: &Path, flags: &ParsedFlags) -> ExitCode {
    let mut pdfs: Vec<PathBuf> = walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            entry
                .path()
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("pdf"))
        })
        .map(|entry| entry.into_path())
        .collect();
    pdfs.sort();

    if pdfs.is_empty() {
        eprintln!("no .pdf files under {}", dir.display());
        return ExitCode::from(EXIT_USAGE);
    }

    let mut all_ok = true;
    for pdf in &pdfs {
        let code = run_one(service, pdf, flags).await;
        let acceptable = code == Stage::Completed.exit_code()
            || code == Stage::RejectedDuplicate.exit_code();
        if !acceptable {
            all_ok = false;
        }
    }
    if all_ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    }
}

async fn run_status(service: &Arc<ExtractorService>) -> ExitCode {
    let health = service.health().await;
    println!("vector store:   {}", health.vector_store);
    println!("document store: {}", health.document_store);
    for (name, state) in &health.providers {
        println!("provider {name}: {state}");
    }

    let recent = service.recent_sessions(10).await;
    if recent.is_empty() {
        println!("no recent sessions");
    } else {
        println!("recent sessions:");
        for snapshot in recent {
            println!(
                "  {}  {}  {}  {}%  {}",
                snapshot.id,
                snapshot.origin_name,
                snapshot.stage.as_str(),
                snapshot.percent,
                snapshot.last_touched_at.format("%Y-%m-%d %H:%M:%S"),
            );
        }
    }

    if let Ok(collections) = service.list_collections(StoreKind::Vector).await {
        if !collections.is_empty() {
            println!("vector collections: {}", collections.join(", "));
        }
    }
    ExitCode::SUCCESS
}
