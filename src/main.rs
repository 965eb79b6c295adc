//! DeskBuddy - Internal IT Support Agent CLI

use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use deskbuddy::clients::{
    AlertSink, GeminiEmbedClient, LlmClient, QdrantIndex, TavilyClient, WebhookNotifier,
};
use deskbuddy::config::Config;
use deskbuddy::pipeline::{Pipeline, PipelineConfig, PipelineOutcome};
use deskbuddy::retrieval::sparse::Bm25Artifact;
use deskbuddy::retrieval::{RetrievalGate, SparseEncoder, TwoStageRetriever};
use deskbuddy::scoring::{BertCrossEncoder, ScoringGateway};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "deskbuddy", version, about = "Internal IT support assistant")]
struct Args {
    /// Ask a single question and exit instead of starting the REPL
    #[arg(short, long)]
    question: Option<String>,

    /// Print the stage trace and gate scores after each answer
    #[arg(short, long)]
    trace: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("deskbuddy=info")),
        )
        .init();

    let args = Args::parse();
    let config = Config::load()?;
    let alerts: Arc<dyn AlertSink> =
        Arc::new(WebhookNotifier::new(config.credentials.alert_url.clone()));
    let pipeline = build_pipeline(&config, alerts.clone())?;

    if let Some(question) = args.question {
        answer(&pipeline, &alerts, &question, args.trace).await;
        return Ok(());
    }

    run_repl(pipeline, alerts, args.trace).await
}

/// Wire every client into the pipeline. Missing credentials are warned
/// about rather than fatal; the affected call site fails at request time
/// and the pipeline degrades along its normal fallback edges.
fn build_pipeline(config: &Config, alerts: Arc<dyn AlertSink>) -> Result<Pipeline> {
    let llm_key = require_key(&config.credentials.llm_key, "DESKBUDDY_LLM_KEY");
    let embed_key = require_key(&config.credentials.embed_key, "DESKBUDDY_EMBED_KEY");
    let search_key = require_key(&config.credentials.search_key, "DESKBUDDY_SEARCH_KEY");

    let llm = Arc::new(LlmClient::new(
        &config.models.llm_base_url,
        &llm_key,
        &config.models.chat,
        &config.models.router,
    )?);
    let embedder = Arc::new(GeminiEmbedClient::new(
        &config.models.embed_base_url,
        &embed_key,
        &config.models.embedding,
    )?);
    let scorer = Arc::new(BertCrossEncoder::new(&config.models.reranker)?);

    let sparse = match SparseEncoder::load(&config.retrieval.bm25_path) {
        Ok(encoder) => encoder,
        Err(e) => {
            warn!(error = %e, "BM25 artifact unavailable, sparse recall disabled");
            SparseEncoder::from_artifact(Bm25Artifact {
                n_docs: 0,
                vocab: HashMap::new(),
            })
        }
    };

    let gateway = Arc::new(ScoringGateway::new(embedder, scorer, alerts.clone()));
    let index = Arc::new(QdrantIndex::new(
        &config.retrieval.index_url,
        &config.retrieval.index_name,
    )?);
    let retriever = Arc::new(TwoStageRetriever::new(
        gateway,
        index,
        sparse,
        alerts.clone(),
        config.retrieval.top_k,
    ));
    let search = Arc::new(TavilyClient::new(&search_key)?);

    Ok(Pipeline::new(
        llm,
        retriever,
        RetrievalGate::new(config.gate),
        search,
        alerts,
        PipelineConfig::default(),
    ))
}

fn require_key(key: &Option<String>, env_var: &str) -> String {
    match key {
        Some(k) if !k.is_empty() => k.clone(),
        _ => {
            warn!(env_var, "credential not configured");
            String::new()
        }
    }
}

async fn run_repl(pipeline: Pipeline, alerts: Arc<dyn AlertSink>, trace: bool) -> Result<()> {
    println!("{}", "=".repeat(60).cyan());
    println!(
        "  {} {} - Internal IT Support Assistant",
        "DeskBuddy".cyan().bold(),
        env!("CARGO_PKG_VERSION")
    );
    println!("  Type your question, or 'exit' to quit.");
    println!("{}", "=".repeat(60).cyan());

    let mut editor = DefaultEditor::new()?;

    loop {
        match editor.readline(">deskbuddy: ") {
            Ok(line) => {
                let input = line.trim();
                if input.is_empty() {
                    continue;
                }
                if input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit") {
                    println!("Goodbye!");
                    break;
                }

                let _ = editor.add_history_entry(input);
                answer(&pipeline, &alerts, input, trace).await;
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => {
                println!("Goodbye!");
                break;
            }
            Err(e) => {
                eprintln!("{} {}", "Input error:".red(), e);
                break;
            }
        }
    }

    Ok(())
}

/// Run one question and print the result. A pipeline error never kills
/// the session; the user gets a generic failure line, an alert goes out
/// with the error context, and the loop goes on.
async fn answer(pipeline: &Pipeline, alerts: &Arc<dyn AlertSink>, question: &str, trace: bool) {
    match pipeline.run(question).await {
        Ok(outcome) => {
            println!("\n{}\n", outcome.answer.text);
            if trace {
                print_trace(&outcome);
            }
        }
        Err(e) => {
            report_failure(alerts, question, &e);
        }
    }
}

/// Top-level catch: generic user-visible line plus an out-of-band alert
/// carrying the error and the question it failed on.
fn report_failure(alerts: &Arc<dyn AlertSink>, question: &str, error: &deskbuddy::AgentError) {
    warn!(error = %error, "pipeline run failed");
    alerts.alert("Main", &error.to_string(), question);
    println!(
        "\n{}\n",
        "Something went wrong while answering. Please try again.".red()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use deskbuddy::AgentError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingAlerts(AtomicUsize);

    impl AlertSink for CountingAlerts {
        fn alert(&self, module: &str, _error: &str, _detail: &str) {
            assert_eq!(module, "Main");
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_report_failure_dispatches_alert() {
        let counting = Arc::new(CountingAlerts::default());
        let alerts: Arc<dyn AlertSink> = counting.clone();

        report_failure(
            &alerts,
            "vpn failure",
            &AgentError::Generic("boom".to_string()),
        );

        assert_eq!(counting.0.load(Ordering::SeqCst), 1);
    }
}

fn print_trace(outcome: &PipelineOutcome) {
    let stages: Vec<&str> = outcome
        .state
        .trace
        .iter()
        .map(|s| s.display_name())
        .collect();
    println!("{} {}", "trace:".dimmed(), stages.join(" -> ").dimmed());

    if let Some(gate) = outcome.state.gate {
        println!(
            "{} top1={:.3} top2={:.3} margin={:.3} passed={}",
            "gate:".dimmed(),
            gate.top1,
            gate.top2,
            gate.margin,
            gate.passed
        );
    }
}
