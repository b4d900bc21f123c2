//! Replay an AIR record against the provider and report drift.
//!
//! Exits non-zero when drift is detected so CI pipelines can gate on it.

use std::path::PathBuf;
use std::process::ExitCode;

use airgate::recorder;
use airgate::replay::{self, ReplayOptions};
use airgate::vault::{Client as VaultClient, VaultConfig};
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "replayctl", about = "Replay recorded LLM runs and report drift")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Replay a recorded run from its AIR file
    Replay {
        /// Path to the <run_id>.air.json record
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let Command::Replay { path } = cli.command;

    let record = match recorder::load(&path) {
        Ok(record) => record,
        Err(e) => {
            eprintln!("load AIR record: {e}");
            return ExitCode::FAILURE;
        }
    };

    println!("Run ID:    {}", record.run_id);
    println!("Model:     {}", record.model);
    println!("Provider:  {}", record.provider);
    println!("Endpoint:  {}", record.endpoint);
    println!("Tokens:    {}", record.tokens.total);
    println!("Status:    {}", record.status.as_str());
    println!();

    let vault_client = match VaultClient::connect(VaultConfig {
        endpoint: env_or("VAULT_ENDPOINT", "localhost:9000"),
        access_key: env_or("VAULT_ACCESS_KEY", "minioadmin"),
        secret_key: env_or("VAULT_SECRET_KEY", "minioadmin"),
        bucket: env_or("VAULT_BUCKET", "air-runs"),
        use_ssl: env_or("VAULT_USE_SSL", "false") == "true",
    })
    .await
    {
        Ok(client) => client,
        Err(e) => {
            eprintln!("vault connect: {e}");
            return ExitCode::FAILURE;
        }
    };

    let api_key = env_or("OPENAI_API_KEY", "");
    if api_key.is_empty() {
        eprintln!("OPENAI_API_KEY required for replay");
        return ExitCode::FAILURE;
    }

    println!("Replaying...");
    let result = match replay::run(
        &record,
        &vault_client,
        &ReplayOptions {
            provider_url: env_or("PROVIDER_URL", "https://api.openai.com"),
            api_key,
        },
    )
    .await
    {
        Ok(result) => result,
        Err(e) => {
            eprintln!("replay failed: {e}");
            return ExitCode::FAILURE;
        }
    };

    println!();
    println!("Similarity: {:.2}", result.similarity);

    if result.drift {
        println!("DRIFT DETECTED: {}", result.drift_summary);
        if let Ok(json) = serde_json::to_string_pretty(&result) {
            println!("{json}");
        }
        return ExitCode::FAILURE;
    }

    println!("NO DRIFT — replay matches original within threshold.");
    ExitCode::SUCCESS
}

fn env_or(key: &str, fallback: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| fallback.to_string())
}
