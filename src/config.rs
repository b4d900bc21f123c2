//! Gateway configuration from flags and environment variables.

use std::path::PathBuf;

use clap::Parser;

use crate::vault::VaultConfig;

/// Command-line flags with environment fallbacks.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "OpenAI-compatible audit gateway", long_about = None)]
pub struct Args {
    /// Listen address
    #[arg(long = "addr", env = "LISTEN_ADDR", default_value = "0.0.0.0:8080")]
    pub listen_addr: String,

    /// Upstream LLM provider origin
    #[arg(
        long = "provider",
        env = "PROVIDER_URL",
        default_value = "https://api.openai.com"
    )]
    pub provider_url: String,

    /// AIR record output directory
    #[arg(long = "runs", env = "RUNS_DIR", default_value = "./runs")]
    pub runs_dir: PathBuf,

    /// Guardrails policy YAML; absence disables guardrails
    #[arg(long = "guardrails", env = "GUARDRAILS_CONFIG")]
    pub guardrails_path: Option<PathBuf>,
}

/// Fully resolved gateway settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub listen_addr: String,
    pub provider_url: String,
    pub runs_dir: PathBuf,
    pub guardrails_path: Option<PathBuf>,
    /// Incoming auth; absence disables gateway authentication.
    pub gateway_key: Option<String>,
    /// HMAC key for the audit chain and evidence attestation. Absence
    /// leaves the chain decorative (empty key).
    pub signing_key: String,
    /// Blob store settings; absence disables the vault.
    pub vault: Option<VaultConfig>,
}

impl Settings {
    /// Resolve settings from parsed args plus plain environment variables.
    pub fn from_args(args: Args) -> Self {
        let provider_url = args.provider_url.trim_end_matches('/').to_string();

        Self {
            listen_addr: args.listen_addr,
            provider_url,
            runs_dir: args.runs_dir,
            guardrails_path: args.guardrails_path,
            gateway_key: env_nonempty("GATEWAY_KEY"),
            signing_key: env_nonempty("TRUST_SIGNING_KEY").unwrap_or_default(),
            vault: vault_from_env(),
        }
    }
}

fn vault_from_env() -> Option<VaultConfig> {
    let endpoint = env_nonempty("VAULT_ENDPOINT")?;
    Some(VaultConfig {
        endpoint,
        access_key: env_or("VAULT_ACCESS_KEY", "minioadmin"),
        secret_key: env_or("VAULT_SECRET_KEY", "minioadmin"),
        bucket: env_or("VAULT_BUCKET", "air-runs"),
        use_ssl: env_or("VAULT_USE_SSL", "false") == "true",
    })
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_or(key: &str, fallback: &str) -> String {
    env_nonempty(key).unwrap_or_else(|| fallback.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_url_trailing_slash_is_trimmed() {
        let args = Args {
            listen_addr: "0.0.0.0:8080".into(),
            provider_url: "https://api.openai.com/".into(),
            runs_dir: "./runs".into(),
            guardrails_path: None,
        };
        let settings = Settings::from_args(args);
        assert_eq!(settings.provider_url, "https://api.openai.com");
    }
}
