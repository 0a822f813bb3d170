//! Text-generation gateway.
//!
//! [`TextGenerator`] is the seam the learning pipeline and the composer talk
//! to. [`Gateway`] implements it over an OpenAI-compatible chat-completions
//! endpoint; [`OfflineGenerator`] always answers empty and is used when no
//! profile is configured.
//!
//! Callers never see an error: a disabled profile, a shed request, a timeout,
//! a non-2xx status and an unparseable body all produce `""`.

mod client;
mod stats;
pub mod wire;

use std::future::Future;
use std::pin::Pin;

pub use client::Gateway;
pub use stats::{GatewayStats, GatewayStatsSnapshot};

use crate::config::ProfileConfig;
use crate::text::is_placeholder_credential;

/// Boxed future returned by [`TextGenerator::generate`].
pub type GenerateFuture<'a> = Pin<Box<dyn Future<Output = String> + Send + 'a>>;

/// Logical use of the generation service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProfileKind {
    /// Chat lines and question replies
    Qa,
    /// Phrase refinement
    Summary,
}

impl std::fmt::Display for ProfileKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProfileKind::Qa => write!(f, "qa"),
            ProfileKind::Summary => write!(f, "summary"),
        }
    }
}

/// Whether a profile can be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelStatus {
    /// Usable
    Ready,
    /// Switched off in config
    Disabled,
    /// Endpoint or model missing
    Unconfigured,
    /// Credential is a sample-config value
    PlaceholderCredential,
}

impl ChannelStatus {
    /// True for [`ChannelStatus::Ready`]
    pub fn is_ready(self) -> bool {
        self == ChannelStatus::Ready
    }
}

/// Resolved settings for one profile.
#[derive(Debug, Clone)]
pub struct GenerationProfile {
    /// Gateway and profile both enabled
    pub enabled: bool,
    /// Endpoint URL
    pub api_url: String,
    /// Bearer credential
    pub api_key: String,
    /// Model identifier
    pub model: String,
    /// System prompt
    pub system_prompt: String,
    /// Output ceiling
    pub max_tokens: u32,
    /// Retries after the first attempt
    pub retries: u32,
}

impl GenerationProfile {
    /// Resolve a profile against the gateway-wide switch and retry default.
    pub fn resolve(config: &ProfileConfig, gateway_enabled: bool, default_retries: u32) -> Self {
        Self {
            enabled: gateway_enabled && config.enabled,
            api_url: config.api_url.trim().to_string(),
            api_key: config.api_key.trim().to_string(),
            model: config.model.trim().to_string(),
            system_prompt: config.system_prompt.clone(),
            max_tokens: config.max_tokens,
            retries: config.retries.unwrap_or(default_retries),
        }
    }

    /// Enabled with an endpoint and a model
    pub fn is_callable(&self) -> bool {
        self.enabled && !self.api_url.is_empty() && !self.model.is_empty()
    }

    /// Full usability check, including placeholder credentials
    pub fn status(&self) -> ChannelStatus {
        if !self.enabled {
            ChannelStatus::Disabled
        } else if self.api_url.is_empty() || self.model.is_empty() {
            ChannelStatus::Unconfigured
        } else if is_placeholder_credential(&self.api_key) {
            ChannelStatus::PlaceholderCredential
        } else {
            ChannelStatus::Ready
        }
    }
}

/// Something that turns a prompt into text.
pub trait TextGenerator: Send + Sync {
    /// Generate text for `prompt` using `kind`'s profile.
    ///
    /// Resolves to an empty string on any failure.
    fn generate<'a>(&'a self, prompt: &'a str, kind: ProfileKind) -> GenerateFuture<'a>;

    /// Whether `kind` can currently be used.
    fn channel_status(&self, kind: ProfileKind) -> ChannelStatus;
}

/// Generator with no backing service.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineGenerator;

impl TextGenerator for OfflineGenerator {
    fn generate<'a>(&'a self, _prompt: &'a str, _kind: ProfileKind) -> GenerateFuture<'a> {
        Box::pin(async { String::new() })
    }

    fn channel_status(&self, _kind: ProfileKind) -> ChannelStatus {
        ChannelStatus::Disabled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(url: &str, key: &str, model: &str) -> ProfileConfig {
        ProfileConfig {
            api_url: url.to_string(),
            api_key: key.to_string(),
            model: model.to_string(),
            ..crate::config::GatewayConfig::default().summary
        }
    }

    #[test]
    fn test_profile_status() {
        let ready = GenerationProfile::resolve(&profile("http://x", "sk-1", "m"), true, 1);
        assert_eq!(ready.status(), ChannelStatus::Ready);
        assert_eq!(ready.retries, 1);

        let off = GenerationProfile::resolve(&profile("http://x", "sk-1", "m"), false, 1);
        assert_eq!(off.status(), ChannelStatus::Disabled);
        assert!(!off.is_callable());

        let no_model = GenerationProfile::resolve(&profile("http://x", "", " "), true, 1);
        assert_eq!(no_model.status(), ChannelStatus::Unconfigured);

        let sample = GenerationProfile::resolve(&profile("http://x", "your_api_key_here", "m"), true, 1);
        assert_eq!(sample.status(), ChannelStatus::PlaceholderCredential);
        assert!(sample.is_callable());
    }

    #[tokio::test]
    async fn test_offline_generator_is_empty() {
        let generator = OfflineGenerator;
        assert_eq!(generator.generate("hi", ProfileKind::Qa).await, "");
        assert!(!generator.channel_status(ProfileKind::Summary).is_ready());
    }
}
