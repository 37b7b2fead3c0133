//! Arr gateway implementation.

use std::time::Duration;

use reqwest::Client;
use tracing::{debug, warn};

use crate::config::ArrInstanceConfig;
use crate::release::MediaType;

use super::types::{ArrError, ExternalIds, ParseResponse, PingResponse};

/// Gateway over the configured Sonarr and Radarr instances.
pub struct ArrGateway {
    client: Client,
    sonarr: Vec<ArrInstanceConfig>,
    radarr: Vec<ArrInstanceConfig>,
}

impl ArrGateway {
    pub fn new(
        sonarr: Vec<ArrInstanceConfig>,
        radarr: Vec<ArrInstanceConfig>,
        timeout: Duration,
    ) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to create HTTP client");
        Self {
            client,
            sonarr,
            radarr,
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.sonarr.is_empty() || !self.radarr.is_empty()
    }

    /// Validate connectivity to every configured instance. Called once at
    /// startup; a failing instance is a configuration error.
    pub async fn probe_all(&self) -> Result<(), ArrError> {
        for instance in self.sonarr.iter().chain(&self.radarr) {
            self.ping(instance).await?;
        }
        Ok(())
    }

    /// Resolve external ids for a title.
    ///
    /// TV-ish titles go to Sonarr, movies to Radarr. OTHER tries Radarr
    /// first, then Sonarr with a synthetic ` S00E00` suffix (its parse
    /// endpoint requires episode structure; the suffix can mislead for true
    /// movie content, which is why Radarr gets the first word). The first
    /// instance returning any id wins; errors degrade to no ids.
    pub async fn resolve_ids(&self, title: &str, media_type: MediaType) -> ExternalIds {
        let attempts: Vec<(&ArrInstanceConfig, String)> = match media_type {
            MediaType::Episode | MediaType::Season | MediaType::Anime => self
                .sonarr
                .iter()
                .map(|i| (i, title.to_string()))
                .collect(),
            MediaType::Movie => self.radarr.iter().map(|i| (i, title.to_string())).collect(),
            MediaType::Other => self
                .radarr
                .iter()
                .map(|i| (i, title.to_string()))
                .chain(self.sonarr.iter().map(|i| (i, format!("{title} S00E00"))))
                .collect(),
        };

        for (instance, query_title) in attempts {
            match self.parse(instance, &query_title).await {
                Ok(ids) if ids.any() => {
                    debug!(title, arr = %instance.url, "Resolved external ids");
                    return ids;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(title, arr = %instance.url, error = %e, "Arr lookup failed, continuing");
                }
            }
        }
        ExternalIds::default()
    }

    async fn parse(
        &self,
        instance: &ArrInstanceConfig,
        title: &str,
    ) -> Result<ExternalIds, ArrError> {
        let url = format!(
            "{}/api/v3/parse?title={}",
            instance.url.trim_end_matches('/'),
            urlencoding::encode(title)
        );
        let response = self
            .client
            .get(&url)
            .header("X-Api-Key", &instance.apikey)
            .send()
            .await
            .map_err(map_reqwest_err)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ArrError::HttpStatus {
                status: status.as_u16(),
            });
        }

        let parsed: ParseResponse = response
            .json()
            .await
            .map_err(|e| ArrError::ParseError(e.to_string()))?;
        Ok(parsed.into_ids())
    }

    async fn ping(&self, instance: &ArrInstanceConfig) -> Result<(), ArrError> {
        let url = format!("{}/api", instance.url.trim_end_matches('/'));
        let response = self
            .client
            .get(&url)
            .header("X-Api-Key", &instance.apikey)
            .send()
            .await
            .map_err(map_reqwest_err)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ArrError::HttpStatus {
                status: status.as_u16(),
            });
        }

        let _: PingResponse = response
            .json()
            .await
            .map_err(|e| ArrError::ParseError(e.to_string()))?;
        Ok(())
    }
}

fn map_reqwest_err(e: reqwest::Error) -> ArrError {
    if e.is_timeout() {
        ArrError::Timeout
    } else {
        ArrError::ConnectionFailed(e.to_string())
    }
}
