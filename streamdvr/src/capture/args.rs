//! Recorder argument construction.
//!
//! Recorders are wrapper scripts with a positional calling convention, so
//! the order here is part of the contract with those scripts.

use std::path::Path;

use crate::config::{ProxyConfig, SiteConfig};

/// Inputs for building a recorder command line.
#[derive(Debug, Clone, Copy)]
pub struct CaptureContext<'a> {
    /// Full path of the recording to write.
    pub output_path: &'a Path,
    /// Stream locator (or page URL) handed to the recorder.
    pub source: &'a str,
    pub proxy: &'a ProxyConfig,
    pub debug_recorder: bool,
    pub site: &'a SiteConfig,
    /// Site specific parameters appended at the end.
    pub extra: &'a [String],
}

/// Builds the argument list for a recorder.
pub trait SpawnArgsBuilder: Send + Sync {
    fn build(&self, ctx: &CaptureContext<'_>) -> Vec<String>;
}

/// Argument layout of the bundled recorder scripts:
///
/// `output source proxy_enable proxy_server debug auth [--user] [--pass] extra..`
#[derive(Debug, Clone, Copy, Default)]
pub struct ScriptArgs;

impl SpawnArgsBuilder for ScriptArgs {
    fn build(&self, ctx: &CaptureContext<'_>) -> Vec<String> {
        let mut args = vec![
            ctx.output_path.to_string_lossy().to_string(),
            ctx.source.to_string(),
            flag(ctx.proxy.enable),
            ctx.proxy.server.clone(),
            flag(ctx.debug_recorder),
        ];
        args.extend(auth_args(ctx.site));
        args.extend(ctx.extra.iter().cloned());
        args
    }
}

/// `auth username-flag password-flag`, with empty flags when unset.
pub fn auth_args(site: &SiteConfig) -> [String; 3] {
    let list_name = site.list_name();
    let username = site.username.as_deref().filter(|u| !u.is_empty());
    let password = site.password.as_deref().filter(|p| !p.is_empty());

    [
        flag(username.is_some()),
        username
            .map(|u| format!("--{}-username={}", list_name, u))
            .unwrap_or_default(),
        password
            .map(|p| format!("--{}-password={}", list_name, p))
            .unwrap_or_default(),
    ]
}

fn flag(on: bool) -> String {
    if on { "1" } else { "0" }.to_string()
}
