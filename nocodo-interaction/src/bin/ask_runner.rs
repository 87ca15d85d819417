use clap::Parser;
use nocodo_interaction::{CliQuestionHandler, QuestionError, QuestionHandler, QuestionStore};
use shared_types::QuestionData;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "ask-runner")]
#[command(about = "Ask the operator a question on this terminal and print the answer", long_about = None)]
#[command(version)]
struct Cli {
    /// Question text
    #[arg(short, long)]
    prompt: String,

    /// Suggested answer, repeat for several
    #[arg(short, long = "suggestion")]
    suggestions: Vec<String>,

    #[arg(short, long, default_value = "cli")]
    job_id: String,

    /// Give up after this many seconds
    #[arg(short, long)]
    timeout_secs: Option<u64>,

    #[arg(short, long)]
    verbose: bool,
}

fn setup_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "warn" };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    // stdout carries the prompt and the answer
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let mut data = QuestionData::new(cli.job_id, cli.prompt).with_suggestions(cli.suggestions);
    data.timeout_secs = cli.timeout_secs;

    let store = Arc::new(QuestionStore::new());
    let handler = CliQuestionHandler::stdio(store);

    match handler.ask_question(data).await {
        Ok(response) => {
            println!("{}", response.answer);
            Ok(())
        }
        Err(e @ QuestionError::Validation { .. }) => Err(e.into()),
        Err(e) => {
            tracing::info!(error = %e, "No answer collected");
            std::process::exit(1);
        }
    }
}
