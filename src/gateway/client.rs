//! HTTP gateway over an OpenAI-compatible chat-completions endpoint.

use std::time::Duration;

use reqwest::Client;
use tracing::debug;

use super::stats::GatewayStats;
use super::wire::{extract_content, ChatRequest};
use super::{ChannelStatus, GenerateFuture, GenerationProfile, ProfileKind, TextGenerator};
use crate::config::GatewayConfig;
use crate::error::{PulseError, Result};

/// HTTP text-generation gateway.
///
/// One request chain is at most `1 + retries` attempts with a linear
/// backoff between them, and holds one in-flight slot for its whole life.
#[derive(Debug)]
pub struct Gateway {
    http: Client,
    qa: GenerationProfile,
    summary: GenerationProfile,
    max_in_flight: usize,
    retry_backoff: Duration,
    stats: GatewayStats,
}

impl Gateway {
    /// Build the gateway and its HTTP client.
    pub fn new(config: &GatewayConfig) -> Result<Self> {
        let http = Client::builder()
            .connect_timeout(config.connect_timeout())
            .timeout(config.read_timeout())
            .build()
            .map_err(|e| PulseError::Gateway(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            qa: GenerationProfile::resolve(&config.qa, config.enabled, config.max_retries),
            summary: GenerationProfile::resolve(&config.summary, config.enabled, config.max_retries),
            max_in_flight: config.max_in_flight.max(1),
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
            stats: GatewayStats::new(),
        })
    }

    /// Resolved profile for `kind`
    pub fn profile(&self, kind: ProfileKind) -> &GenerationProfile {
        match kind {
            ProfileKind::Qa => &self.qa,
            ProfileKind::Summary => &self.summary,
        }
    }

    /// Request counters
    pub fn stats(&self) -> &GatewayStats {
        &self.stats
    }

    /// Run one request chain. Always resolves, possibly to `""`.
    pub async fn request(&self, prompt: &str, kind: ProfileKind) -> String {
        let profile = self.profile(kind);
        if !profile.is_callable() {
            self.stats.record_skipped();
            return String::new();
        }

        let Some(_slot) = self.stats.try_acquire(self.max_in_flight) else {
            debug!(profile = %kind, limit = self.max_in_flight, "Generation request shed");
            return String::new();
        };

        let attempts = profile.retries + 1;
        for attempt in 0..attempts {
            let text = self.request_once(profile, prompt, kind).await;
            if !text.trim().is_empty() {
                return text;
            }
            if attempt + 1 < attempts {
                tokio::time::sleep(self.retry_backoff * (attempt + 1)).await;
            }
        }
        self.stats.record_failure();
        String::new()
    }

    async fn request_once(&self, profile: &GenerationProfile, prompt: &str, kind: ProfileKind) -> String {
        self.stats.record_attempt();
        let body = ChatRequest::new(&profile.model, &profile.system_prompt, prompt, profile.max_tokens);

        let mut request = self.http.post(&profile.api_url).json(&body);
        if !profile.api_key.is_empty() {
            request = request.header("Authorization", format!("Bearer {}", profile.api_key));
        }

        let response = match request.send().await {
            Ok(r) => r,
            Err(e) => {
                debug!(profile = %kind, error = %e, "Generation attempt failed");
                return String::new();
            },
        };

        let status = response.status();
        if !status.is_success() {
            debug!(profile = %kind, status = status.as_u16(), "Generation attempt rejected");
            return String::new();
        }

        match response.text().await {
            Ok(text) => extract_content(&text),
            Err(e) => {
                debug!(profile = %kind, error = %e, "Generation body unreadable");
                String::new()
            },
        }
    }
}

impl TextGenerator for Gateway {
    fn generate<'a>(&'a self, prompt: &'a str, kind: ProfileKind) -> GenerateFuture<'a> {
        Box::pin(self.request(prompt, kind))
    }

    fn channel_status(&self, kind: ProfileKind) -> ChannelStatus {
        self.profile(kind).status()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unconfigured_profile_skips_network() {
        let gateway = Gateway::new(&GatewayConfig::default()).unwrap();
        assert_eq!(gateway.request("hello", ProfileKind::Qa).await, "");
        let snapshot = gateway.stats().snapshot();
        assert_eq!(snapshot.skipped, 1);
        assert_eq!(snapshot.attempts, 0);
        assert_eq!(
            gateway.channel_status(ProfileKind::Summary),
            ChannelStatus::Unconfigured
        );
    }
}
