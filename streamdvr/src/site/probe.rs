//! Online status probes.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tracing::{debug, error};

use crate::capture::auth_args;
use crate::config::{ProxyConfig, SiteConfig};
use crate::domain::StreamerRef;
use crate::{Error, Result};

/// Result of one status check.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProbeStatus {
    pub online: bool,
    /// Where the stream can be recorded from; empty when offline.
    pub locator: String,
}

impl ProbeStatus {
    pub fn online(locator: impl Into<String>) -> Self {
        Self {
            online: true,
            locator: locator.into(),
        }
    }

    pub fn offline() -> Self {
        Self::default()
    }
}

/// Checks whether a streamer is broadcasting.
#[async_trait]
pub trait StateProbe: Send + Sync {
    async fn check(&self, streamer: &StreamerRef) -> Result<ProbeStatus>;
}

/// [`StateProbe`] running the site's fetch script.
///
/// Called as `script page_url proxy_enable proxy_server auth [--user] [--pass]`;
/// a successful exit prints the stream locator, any other exit means offline.
#[derive(Debug, Clone)]
pub struct ScriptProbe {
    script: PathBuf,
    site_url: String,
    url_suffix: String,
    proxy: ProxyConfig,
    auth: [String; 3],
}

impl ScriptProbe {
    pub fn new(site: &SiteConfig, proxy: &ProxyConfig) -> Self {
        Self {
            script: site.m3u8_fetch.clone(),
            site_url: site.site_url.clone().unwrap_or_default(),
            url_suffix: site.url_suffix.clone(),
            proxy: proxy.clone(),
            auth: auth_args(site),
        }
    }

    /// Page URL of a streamer.
    pub fn page_url(&self, name: &str) -> String {
        format!("{}{}{}", self.site_url, name, self.url_suffix)
    }

    pub fn args(&self, streamer: &StreamerRef) -> Vec<String> {
        let mut args = vec![
            self.page_url(&streamer.name),
            if self.proxy.enable { "1" } else { "0" }.to_string(),
            self.proxy.server.clone(),
        ];
        args.extend(self.auth.iter().cloned());
        args
    }
}

#[async_trait]
impl StateProbe for ScriptProbe {
    async fn check(&self, streamer: &StreamerRef) -> Result<ProbeStatus> {
        let args = self.args(streamer);
        debug!(
            streamer = %streamer.name,
            "Running: {} {}",
            self.script.display(),
            args.join(" ")
        );

        let output = process_utils::tokio_command(&self.script)
            .args(&args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| Error::probe(&streamer.uid, e))?;

        if output.status.success() {
            let locator = String::from_utf8_lossy(&output.stdout).replace(['\r', '\n'], "");
            return Ok(ProbeStatus::online(locator));
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let stderr = stderr.trim();
        if !stderr.is_empty() {
            error!(streamer = %streamer.name, "{}", stderr);
        }
        Ok(ProbeStatus::offline())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site(script: &str) -> SiteConfig {
        SiteConfig {
            name: "Twitch".to_string(),
            site_url: Some("https://twitch.tv/".to_string()),
            url_suffix: "/live".to_string(),
            m3u8_fetch: PathBuf::from(script),
            username: Some("me".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_args_layout() {
        let proxy = ProxyConfig {
            enable: true,
            server: "socks5://proxy:1080".to_string(),
        };
        let probe = ScriptProbe::new(&site("fetch.sh"), &proxy);

        assert_eq!(
            probe.args(&StreamerRef::named("alice")),
            vec![
                "https://twitch.tv/alice/live",
                "1",
                "socks5://proxy:1080",
                "1",
                "--twitch-username=me",
                "",
            ]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_script_output_is_locator() {
        // `echo` prints its arguments, which stands in for a fetch script.
        let probe = ScriptProbe::new(&site("echo"), &ProxyConfig::default());
        let status = probe.check(&StreamerRef::named("alice")).await.unwrap();

        assert!(status.online);
        assert!(status.locator.starts_with("https://twitch.tv/alice/live 0"));
        assert!(!status.locator.contains('\n'));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failing_script_is_offline() {
        let probe = ScriptProbe::new(&site("false"), &ProxyConfig::default());
        let status = probe.check(&StreamerRef::named("alice")).await.unwrap();
        assert_eq!(status, ProbeStatus::offline());
    }

    #[tokio::test]
    async fn test_missing_script_is_probe_failure() {
        let probe = ScriptProbe::new(&site("/definitely/not/a/script"), &ProxyConfig::default());
        let err = probe.check(&StreamerRef::named("alice")).await.unwrap_err();
        assert!(matches!(err, Error::ProbeFailure { .. }));
    }
}
