use std::path::{Path, PathBuf};

use clap::Parser;
use tracing::info;

use revgate::agent::{OpenAiCredentials, OpenAiSource};
use revgate::autofix::{AutofixEngine, RunIds, autofix_scope};
use revgate::cli::{Cli, CliCommand};
use revgate::config::{AgentsFile, Policy};
use revgate::report::write_json;
use revgate::review::{ChangeScope, ReviewEngine};

fn init_logging() {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .init();
}

/// Read an environment variable, treating empty values as unset.
fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn build_source(policy: &Policy) -> Option<OpenAiSource> {
    let api_key = env_nonempty("OPENAI_API_KEY")?;
    let credentials = OpenAiCredentials {
        api_key,
        organization: env_nonempty("OPENAI_ORG"),
        project: env_nonempty("OPENAI_PROJECT"),
    };
    Some(OpenAiSource::new(credentials, &policy.ai))
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging();

    info!("revgate starting");

    let mut policy = match Policy::load(Path::new(&cli.policy)) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    };
    let agents = match AgentsFile::load(Path::new(&cli.agents)) {
        Ok(a) => a,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    };

    // Environment is read once here and threaded in as values
    if let Some(model) = env_nonempty("OPENAI_MODEL") {
        policy.ai.review_model = model.clone();
        policy.ai.autofix_model = model;
    }

    let repo_root = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let source = build_source(&policy);

    let result = match cli.command {
        CliCommand::Review { base_sha, head_sha } => {
            let base = base_sha
                .or_else(|| env_nonempty("BASE_SHA"))
                .unwrap_or_default();
            let head = head_sha
                .or_else(|| env_nonempty("HEAD_SHA"))
                .unwrap_or_default();

            let scope = ChangeScope::resolve(repo_root, &base, &head, &policy);
            let engine = ReviewEngine::new(&policy, &agents, source.as_ref());
            let report = engine.run(&scope);

            let out = cli
                .output
                .or_else(|| env_nonempty("AI_REVIEW_OUTPUT"))
                .unwrap_or_else(|| "ai_review.json".to_string());
            info!(status = ?report.status, output = %out, "writing review report");
            write_json(Path::new(&out), &report)
        }
        CliCommand::Autofix { pr_number, run_id } => {
            let ids = RunIds {
                pr_number: pr_number
                    .or_else(|| env_nonempty("PR_NUMBER"))
                    .unwrap_or_else(|| "0".to_string()),
                run_id: run_id
                    .or_else(|| env_nonempty("RUN_ID"))
                    .unwrap_or_else(|| "0".to_string()),
            };

            let scope = autofix_scope(&repo_root, &policy);
            let engine = AutofixEngine::new(&policy, source.as_ref());
            let report = engine.run(&scope, &ids).await;

            let out = cli
                .output
                .or_else(|| env_nonempty("AI_AUTOFIX_OUTPUT"))
                .unwrap_or_else(|| "ai_autofix.json".to_string());
            info!(applied = report.applied, output = %out, "writing autofix report");
            write_json(Path::new(&out), &report)
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
