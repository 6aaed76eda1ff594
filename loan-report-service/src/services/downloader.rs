//! Client for the external report generator.
//!
//! A download logs in once with a fresh cookie-keeping client, then polls
//! the generation endpoint until it answers 200 or the attempts run out.

use crate::config::ReportGeneratorConfig;
use crate::services::metrics::{record_download_attempt, record_error};
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, Secret};
use serde::Serialize;
use service_core::error::AppError;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{info, instrument, warn};

#[derive(Debug, Clone)]
pub struct Credentials {
    pub email: String,
    pub password: Secret<String>,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: Secret::new(password.into()),
        }
    }
}

#[derive(Serialize)]
struct LoginBody<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("Login to report generator failed: {0}")]
    LoginFailed(String),

    #[error("Report {report_id} not available after {attempts} attempts")]
    Exhausted { report_id: i64, attempts: u32 },

    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),

    #[error("Failed to write report: {0}")]
    Io(#[from] std::io::Error),
}

impl From<DownloadError> for AppError {
    fn from(err: DownloadError) -> Self {
        match err {
            DownloadError::LoginFailed(_) | DownloadError::Exhausted { .. } => {
                AppError::BadGateway(err.to_string())
            }
            DownloadError::Client(e) => AppError::InternalError(anyhow::Error::new(e)),
            DownloadError::Io(e) => AppError::InternalError(anyhow::Error::new(e)),
        }
    }
}

#[derive(Clone)]
pub struct ReportDownloader {
    config: ReportGeneratorConfig,
}

impl ReportDownloader {
    pub fn new(config: ReportGeneratorConfig) -> Self {
        Self { config }
    }

    pub fn output_dir(&self) -> &Path {
        &self.config.output_dir
    }

    /// Credentials from the request, falling back to the configured account.
    pub fn credentials(&self, email: Option<String>, password: Option<String>) -> Credentials {
        Credentials {
            email: email
                .filter(|e| !e.is_empty())
                .unwrap_or_else(|| self.config.email.clone()),
            password: password
                .filter(|p| !p.is_empty())
                .map(Secret::new)
                .unwrap_or_else(|| self.config.password.clone()),
        }
    }

    pub fn file_name(report_id: i64) -> String {
        format!("Report_{}.pdf", report_id)
    }

    fn client(&self) -> Result<Client, DownloadError> {
        Ok(Client::builder()
            .cookie_store(true)
            .timeout(self.config.request_timeout)
            .build()?)
    }

    async fn login(&self, client: &Client, credentials: &Credentials) -> Result<(), DownloadError> {
        let url = self.config.login_url();
        let response = client
            .post(&url)
            .json(&LoginBody {
                email: &credentials.email,
                password: credentials.password.expose_secret(),
            })
            .send()
            .await
            .map_err(|e| {
                warn!(url = %url, error = %e, "Login request failed");
                DownloadError::LoginFailed(e.to_string())
            })?;

        if !response.status().is_success() {
            warn!(url = %url, status = %response.status(), "Login rejected");
            return Err(DownloadError::LoginFailed(format!(
                "login returned {}",
                response.status()
            )));
        }

        info!("Logged in to report generator");
        Ok(())
    }

    /// Downloads report `report_id` to `{output_dir}/Report_{id}.pdf`.
    #[instrument(skip(self, credentials), fields(email = %credentials.email))]
    pub async fn download(
        &self,
        report_id: i64,
        credentials: &Credentials,
    ) -> Result<PathBuf, DownloadError> {
        let client = self.client()?;
        if let Err(e) = self.login(&client, credentials).await {
            record_download_attempt("login_failed");
            record_error("download_login");
            return Err(e);
        }

        let url = self.config.report_url(report_id);
        let attempts = self.config.retries.max(1);

        for attempt in 1..=attempts {
            match client.get(&url).send().await {
                Ok(response) if response.status() == StatusCode::OK => {
                    match response.bytes().await {
                        Ok(bytes) => {
                            let path = self.write_report(report_id, &bytes).await?;
                            record_download_attempt("success");
                            info!(
                                report_id,
                                attempt,
                                size = bytes.len(),
                                path = %path.display(),
                                "Report downloaded"
                            );
                            return Ok(path);
                        }
                        Err(e) => {
                            record_download_attempt("retry");
                            warn!(
                                report_id,
                                attempt,
                                max_attempts = attempts,
                                error = %e,
                                "Report body could not be read"
                            );
                        }
                    }
                }
                Ok(response) => {
                    record_download_attempt("retry");
                    warn!(
                        report_id,
                        attempt,
                        max_attempts = attempts,
                        status = %response.status(),
                        "Report not ready"
                    );
                }
                Err(e) => {
                    record_download_attempt("retry");
                    warn!(
                        report_id,
                        attempt,
                        max_attempts = attempts,
                        error = %e,
                        "Report request failed"
                    );
                }
            }

            if attempt < attempts {
                self.wait(self.config.retry_delay).await;
            }
        }

        record_download_attempt("exhausted");
        record_error("download_exhausted");
        Err(DownloadError::Exhausted {
            report_id,
            attempts,
        })
    }

    async fn wait(&self, delay: Duration) {
        if !delay.is_zero() {
            sleep(delay).await;
        }
    }

    async fn write_report(&self, report_id: i64, bytes: &[u8]) -> Result<PathBuf, DownloadError> {
        tokio::fs::create_dir_all(&self.config.output_dir).await?;
        let path = self.config.output_dir.join(Self::file_name(report_id));
        tokio::fs::write(&path, bytes).await?;
        Ok(path)
    }
}
