//! Configuration module for loan-report-service.

use secrecy::Secret;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ReportServiceConfig {
    pub common: core_config::Config,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub database: DatabaseConfig,
    pub ingestion: IngestionConfig,
    pub report_generator: ReportGeneratorConfig,
    pub bulk: BulkConfig,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub run_migrations: bool,
}

/// Owner ids stamped on every report ingested without explicit ids.
#[derive(Debug, Clone)]
pub struct IngestionConfig {
    pub default_user_id: i64,
    pub default_organization_id: i64,
    pub default_company_id: i64,
}

#[derive(Debug, Clone)]
pub struct ReportGeneratorConfig {
    pub base_url: String,
    pub login_path: String,
    /// Path template; `{report_id}` is substituted per download.
    pub report_path: String,
    pub email: String,
    pub password: Secret<String>,
    pub retries: u32,
    pub retry_delay: Duration,
    pub request_timeout: Duration,
    pub output_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct BulkConfig {
    pub max_batch_size: usize,
    pub status_ttl: Duration,
    pub sweep_interval: Duration,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            default_user_id: 187,
            default_organization_id: 179,
            default_company_id: 179,
        }
    }
}

impl Default for ReportGeneratorConfig {
    fn default() -> Self {
        Self {
            base_url: "https://qa-api.systemisers.in".to_string(),
            login_path: "/users/sign_in".to_string(),
            report_path: "/api/v1/report_generator/{report_id}/generation?type=project_report"
                .to_string(),
            email: String::new(),
            password: Secret::new(String::new()),
            retries: 3,
            retry_delay: Duration::from_secs(5),
            request_timeout: Duration::from_secs(60),
            output_dir: PathBuf::from("output_reports"),
        }
    }
}

impl Default for BulkConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 50,
            status_ttl: Duration::from_secs(3600),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

impl ReportGeneratorConfig {
    pub fn login_url(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), self.login_path)
    }

    pub fn report_url(&self, report_id: i64) -> String {
        format!(
            "{}{}",
            self.base_url.trim_end_matches('/'),
            self.report_path
                .replace("{report_id}", &report_id.to_string())
        )
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|s| s.parse().ok())
}

impl ReportServiceConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;
        let generator_defaults = ReportGeneratorConfig::default();
        let ingestion_defaults = IngestionConfig::default();
        let bulk_defaults = BulkConfig::default();

        Ok(Self {
            common,
            service_name: env::var("SERVICE_NAME")
                .unwrap_or_else(|_| "loan-report-service".to_string()),
            service_version: env::var("SERVICE_VERSION")
                .unwrap_or_else(|_| env!("CARGO_PKG_VERSION").to_string()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok().filter(|s| !s.is_empty()),
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").map_err(|_| {
                    AppError::ConfigError(anyhow::anyhow!("DATABASE_URL is required"))
                })?,
                max_connections: parse_env("DATABASE_MAX_CONNECTIONS").unwrap_or(10),
                min_connections: parse_env("DATABASE_MIN_CONNECTIONS").unwrap_or(2),
                run_migrations: parse_env("DATABASE_RUN_MIGRATIONS").unwrap_or(true),
            },
            ingestion: IngestionConfig {
                default_user_id: parse_env("INGEST_USER_ID")
                    .unwrap_or(ingestion_defaults.default_user_id),
                default_organization_id: parse_env("INGEST_ORGANIZATION_ID")
                    .unwrap_or(ingestion_defaults.default_organization_id),
                default_company_id: parse_env("INGEST_COMPANY_ID")
                    .unwrap_or(ingestion_defaults.default_company_id),
            },
            report_generator: ReportGeneratorConfig {
                base_url: env::var("REPORT_GENERATOR_URL")
                    .unwrap_or(generator_defaults.base_url),
                login_path: env::var("REPORT_GENERATOR_LOGIN_PATH")
                    .unwrap_or(generator_defaults.login_path),
                report_path: env::var("REPORT_GENERATOR_REPORT_PATH")
                    .unwrap_or(generator_defaults.report_path),
                email: env::var("REPORT_GENERATOR_EMAIL").unwrap_or_default(),
                password: Secret::new(env::var("REPORT_GENERATOR_PASSWORD").unwrap_or_default()),
                retries: parse_env("REPORT_DOWNLOAD_RETRIES")
                    .unwrap_or(generator_defaults.retries)
                    .max(1),
                retry_delay: parse_env("REPORT_DOWNLOAD_RETRY_DELAY_SECS")
                    .map(Duration::from_secs)
                    .unwrap_or(generator_defaults.retry_delay),
                request_timeout: parse_env("REPORT_DOWNLOAD_TIMEOUT_SECS")
                    .map(Duration::from_secs)
                    .unwrap_or(generator_defaults.request_timeout),
                output_dir: env::var("REPORT_OUTPUT_DIR")
                    .map(PathBuf::from)
                    .unwrap_or(generator_defaults.output_dir),
            },
            bulk: BulkConfig {
                max_batch_size: parse_env("BULK_MAX_BATCH_SIZE")
                    .unwrap_or(bulk_defaults.max_batch_size),
                status_ttl: parse_env("BULK_STATUS_TTL_SECS")
                    .map(Duration::from_secs)
                    .unwrap_or(bulk_defaults.status_ttl),
                sweep_interval: parse_env::<u64>("BULK_SWEEP_INTERVAL_SECS")
                    .map(|secs| Duration::from_secs(secs.max(1)))
                    .unwrap_or(bulk_defaults.sweep_interval),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_url_substitutes_id() {
        let config = ReportGeneratorConfig {
            base_url: "http://localhost:9000/".to_string(),
            ..Default::default()
        };
        assert_eq!(
            config.report_url(42),
            "http://localhost:9000/api/v1/report_generator/42/generation?type=project_report"
        );
        assert_eq!(config.login_url(), "http://localhost:9000/users/sign_in");
    }

    #[test]
    fn defaults_match_legacy_behaviour() {
        let generator = ReportGeneratorConfig::default();
        assert_eq!(generator.retries, 3);
        assert_eq!(generator.retry_delay, Duration::from_secs(5));
        assert_eq!(generator.output_dir, PathBuf::from("output_reports"));

        let ingestion = IngestionConfig::default();
        assert_eq!(ingestion.default_user_id, 187);
        assert_eq!(ingestion.default_organization_id, 179);

        assert_eq!(BulkConfig::default().max_batch_size, 50);
    }
}
