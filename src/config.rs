use anyhow::{Context, Result};
use clap::Parser;
use dialoguer::{Confirm, Input, Password};
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use crate::api::Endpoints;
use crate::auth::Credentials;
use crate::http_client::RetryPolicy;

/// Pokemon ETL - authenticated extraction of pokemons, combats and attributes
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// API base URL
    #[arg(short = 'u', long, env = "API_BASE_URL")]
    pub base_url: Option<String>,

    /// API username
    #[arg(long, env = "API_USERNAME")]
    pub username: Option<String>,

    /// API password
    #[arg(long, env = "API_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Login endpoint
    #[arg(long, env = "API_LOGIN_ENDPOINT", default_value = "/auth/login")]
    pub login_endpoint: String,

    /// Health endpoint
    #[arg(long, env = "HEALTH_ENDPOINT", default_value = "/health")]
    pub health_endpoint: String,

    /// Pokemon listing endpoint
    #[arg(long, env = "POKEMON_ENDPOINT", default_value = "/pokemon")]
    pub pokemon_endpoint: String,

    /// Pokemon attribute endpoint ({pokemon_id} is substituted)
    #[arg(
        long,
        env = "POKEMON_ATTRIBUTES_ENDPOINT",
        default_value = "/pokemons/{pokemon_id}"
    )]
    pub attributes_endpoint: String,

    /// Combat listing endpoint
    #[arg(long, env = "COMBATS_ENDPOINT", default_value = "/combats")]
    pub combats_endpoint: String,

    /// Output directory for the extracted datasets
    #[arg(short = 'd', long, env = "DATA_DIR", default_value = "data")]
    pub data_dir: String,

    /// Page size for listing endpoints
    #[arg(short, long, env = "PER_PAGE", default_value = "50")]
    pub per_page: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// HTTP request timeout in seconds
    #[arg(long, env = "HTTP_REQUEST_TIMEOUT", default_value = "60")]
    pub http_timeout: u64,

    /// Login request timeout in seconds
    #[arg(long, env = "LOGIN_TIMEOUT", default_value = "30")]
    pub login_timeout: u64,

    /// Maximum attempts per request on 429/5xx
    #[arg(long, env = "HTTP_MAX_ATTEMPTS", default_value = "5")]
    pub http_attempts: u32,

    /// Lower bound of the pause between paced calls (ms)
    #[arg(long, env = "PACE_MIN_MS", default_value = "150")]
    pub pace_min_ms: u64,

    /// Upper bound of the pause between paced calls (ms)
    #[arg(long, env = "PACE_MAX_MS", default_value = "400")]
    pub pace_max_ms: u64,

    /// Only log in, probe health, and print a sample of each endpoint
    #[arg(long)]
    pub probe: bool,
}

#[derive(Clone, Debug)]
pub struct Config {
    // API
    pub api_base_url: String,
    pub credentials: Credentials,
    pub login_endpoint: String,
    pub endpoints: Endpoints,

    // Output
    pub data_dir: PathBuf,
    pub per_page: u64,

    // HTTP client
    pub http_request_timeout: u64,
    pub login_timeout: u64,
    pub http_max_attempts: u32,

    // Pacing
    pub pace_min: Duration,
    pub pace_max: Duration,

    // Logging
    pub log_level: String,

    pub probe: bool,
}

impl Config {
    /// Load configuration from all sources with priority: CLI > ENV > defaults
    pub fn load() -> Result<Self> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        Self::from_args(CliArgs::parse())
    }

    /// Build configuration from parsed arguments
    pub fn from_args(args: CliArgs) -> Result<Self> {
        let config = Config {
            api_base_url: args
                .base_url
                .map(|s| s.trim().trim_end_matches('/').to_string())
                .filter(|s| !s.is_empty())
                .context("API_BASE_URL is required (use -u or set API_BASE_URL env var)")?,

            credentials: Credentials::new(
                args.username
                    .context("API_USERNAME is required (use --username or set API_USERNAME)")?,
                args.password
                    .context("API_PASSWORD is required (use --password or set API_PASSWORD)")?,
            ),

            login_endpoint: args.login_endpoint,

            endpoints: Endpoints {
                health: args.health_endpoint,
                pokemons: args.pokemon_endpoint,
                combats: args.combats_endpoint,
                attributes: args.attributes_endpoint,
            },

            data_dir: expand_tilde(&args.data_dir),
            per_page: args.per_page,

            http_request_timeout: args.http_timeout,
            login_timeout: args.login_timeout,
            http_max_attempts: args.http_attempts,

            pace_min: Duration::from_millis(args.pace_min_ms),
            pace_max: Duration::from_millis(args.pace_max_ms),

            log_level: args.log_level,
            probe: args.probe,
        };

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if !self.api_base_url.starts_with("http://") && !self.api_base_url.starts_with("https://")
        {
            anyhow::bail!(
                "API_BASE_URL must start with http:// or https://: {}",
                self.api_base_url
            );
        }

        if self.credentials.username.is_empty() || self.credentials.password.is_empty() {
            anyhow::bail!("API_USERNAME and API_PASSWORD must not be empty");
        }

        if self.per_page == 0 {
            anyhow::bail!("PER_PAGE must be greater than zero");
        }

        if self.http_max_attempts == 0 {
            anyhow::bail!("HTTP_MAX_ATTEMPTS must be greater than zero");
        }

        Ok(())
    }

    /// Absolute login URL
    pub fn login_url(&self) -> String {
        crate::http_client::join_url(&self.api_base_url, &self.login_endpoint)
    }

    /// Retry policy derived from the configured attempt budget
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::with_max_attempts(self.http_max_attempts)
    }
}

/// Expand tilde (~) in file paths to user's home directory
fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> CliArgs {
        let mut argv = vec![
            "pokemon-etl",
            "--base-url",
            "http://localhost:8000/",
            "--username",
            "ash",
            "--password",
            "pikachu",
        ];
        argv.extend_from_slice(extra);
        CliArgs::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_expand_tilde() {
        let path = expand_tilde("~/test/file.txt");
        assert!(path.to_string_lossy().contains("test/file.txt"));
        assert!(!path.to_string_lossy().starts_with("~"));

        let path = expand_tilde("/absolute/path");
        assert_eq!(path, PathBuf::from("/absolute/path"));
    }

    #[test]
    fn test_expand_tilde_just_tilde() {
        // Just "~" without slash should not expand
        let path = expand_tilde("~");
        assert_eq!(path, PathBuf::from("~"));
    }

    #[test]
    fn test_from_args_defaults() {
        let config = Config::from_args(args(&[])).unwrap();
        assert_eq!(config.api_base_url, "http://localhost:8000");
        assert_eq!(config.login_url(), "http://localhost:8000/auth/login");
        assert_eq!(config.endpoints.pokemons, "/pokemon");
        assert_eq!(config.endpoints.attributes, "/pokemons/{pokemon_id}");
        assert_eq!(config.per_page, 50);
        assert_eq!(config.http_request_timeout, 60);
        assert_eq!(config.login_timeout, 30);
        assert_eq!(config.retry_policy().max_attempts, 5);
        assert_eq!(config.pace_min, Duration::from_millis(150));
        assert_eq!(config.pace_max, Duration::from_millis(400));
        assert!(!config.probe);
        config.validate().unwrap();
    }

    #[test]
    fn test_from_args_overrides() {
        let config = Config::from_args(args(&[
            "--per-page",
            "10",
            "--combats-endpoint",
            "/v2/combats",
            "--probe",
        ]))
        .unwrap();
        assert_eq!(config.per_page, 10);
        assert_eq!(config.endpoints.combats, "/v2/combats");
        assert!(config.probe);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::from_args(args(&[])).unwrap();
        config.api_base_url = "localhost:8000".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::from_args(args(&[])).unwrap();
        config.per_page = 0;
        assert!(config.validate().is_err());

        let mut config = Config::from_args(args(&[])).unwrap();
        config.credentials.password.clear();
        assert!(config.validate().is_err());
    }
}

// === Interactive Setup ===

/// Check if interactive setup is needed (no .env file and missing required values)
pub fn needs_interactive_setup() -> bool {
    let env_file_exists = std::path::Path::new(".env").exists();

    let missing = ["API_BASE_URL", "API_USERNAME", "API_PASSWORD"]
        .iter()
        .any(|key| std::env::var(key).is_err());

    !env_file_exists && missing
}

/// Configuration collected from interactive setup
#[derive(Debug, Clone)]
pub struct InteractiveConfig {
    pub api_base_url: String,
    pub api_username: String,
    pub api_password: String,
}

/// Run interactive setup to collect the API location and credentials
pub fn run_interactive_setup() -> Result<InteractiveConfig> {
    println!();
    println!("No configuration found. Let's set up API access.");
    println!();

    let api_base_url: String = Input::new()
        .with_prompt("API base URL (API_BASE_URL)")
        .interact_text()
        .context("Failed to read API_BASE_URL")?;

    let api_username: String = Input::new()
        .with_prompt("API username (API_USERNAME)")
        .interact_text()
        .context("Failed to read API_USERNAME")?;

    let api_password: String = Password::new()
        .with_prompt("API password (API_PASSWORD)")
        .interact()
        .context("Failed to read API_PASSWORD")?;

    if api_password.is_empty() {
        anyhow::bail!("API_PASSWORD cannot be empty");
    }

    let config = InteractiveConfig {
        api_base_url,
        api_username,
        api_password,
    };

    println!();
    let save_to_env = Confirm::new()
        .with_prompt("Save configuration to .env file?")
        .default(true)
        .interact()
        .context("Failed to read save confirmation")?;

    if save_to_env {
        save_env_file(&config)?;
        println!();
        println!("✅ Configuration saved to .env file");
    }

    println!();
    Ok(config)
}

/// Save configuration to .env file
fn save_env_file(config: &InteractiveConfig) -> Result<()> {
    let env_content = format!(
        r#"# Pokemon ETL Configuration
# Generated by interactive setup

API_BASE_URL={}
API_USERNAME={}
API_PASSWORD={}

# Endpoints
API_LOGIN_ENDPOINT=/auth/login
HEALTH_ENDPOINT=/health
POKEMON_ENDPOINT=/pokemon
POKEMON_ATTRIBUTES_ENDPOINT=/pokemons/{{pokemon_id}}
COMBATS_ENDPOINT=/combats

# Output
DATA_DIR=data

# Logging (trace, debug, info, warn, error)
LOG_LEVEL=info
"#,
        config.api_base_url, config.api_username, config.api_password,
    );

    let mut file = std::fs::File::create(".env").context("Failed to create .env file")?;
    file.write_all(env_content.as_bytes())
        .context("Failed to write .env file")?;

    Ok(())
}
