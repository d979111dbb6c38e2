// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Daemon Descriptors
//!
//! A daemon is the deployment backend that runs ExApps. The gateway only
//! needs it to work out where an app is reachable from the host.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::domain::exapp::AppId;

pub const DOCKER_DEPLOY_ID: &str = "docker-install";
pub const MANUAL_DEPLOY_ID: &str = "manual-install";

/// Basic-auth user presented to the HAProxy in front of remote daemons.
pub const HAPROXY_USER: &str = "app_api_haproxy_user";

const WILDCARD_HOSTS: [&str; 4] = ["0.0.0.0", "127.0.0.1", "::", "::1"];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeployConfig {
    /// Container network mode; `host` means the app shares the host's network.
    pub net: Option<String>,
    pub haproxy_password: Option<String>,
    /// Apps are reached through the host's reverse proxy at `<nextcloud_url>/exapps/<app>`.
    pub harp: bool,
    pub nextcloud_url: Option<String>,
    pub additional_options: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaemonConfig {
    pub name: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default = "default_deploy_id")]
    pub accepts_deploy_id: String,
    pub protocol: String,
    pub host: String,
    #[serde(default)]
    pub deploy_config: DeployConfig,
}

fn default_deploy_id() -> String {
    DOCKER_DEPLOY_ID.to_string()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicAuth {
    pub username: String,
    pub password: String,
}

/// Where to send requests for one app.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppEndpoint {
    pub base_url: String,
    pub basic_auth: Option<BasicAuth>,
}

impl DaemonConfig {
    /// Resolve the base URL of `app_id` listening on `port`.
    ///
    /// `deploy_id` is the app's own deploy id; anything other than the docker
    /// deploy id is treated as a manually installed app at the daemon host.
    pub fn resolve_app_endpoint(&self, app_id: &AppId, deploy_id: &str, port: u16) -> AppEndpoint {
        let host = self.host.split(':').next().unwrap_or_default();
        if deploy_id != DOCKER_DEPLOY_ID {
            return AppEndpoint {
                base_url: format!("{}://{}:{}", self.protocol, host, port),
                basic_auth: None,
            };
        }

        let cfg = &self.deploy_config;
        if cfg.harp {
            if let Some(url) = cfg.nextcloud_url.as_deref() {
                let url = url.trim_end_matches('/');
                let url = url.strip_suffix("/index.php").unwrap_or(url);
                return AppEndpoint {
                    base_url: format!("{}/exapps/{}", url, app_id),
                    basic_auth: None,
                };
            }
        }

        if let Some(over) = cfg.additional_options.get("OVERRIDE_APP_HOST") {
            if !over.is_empty() && !WILDCARD_HOSTS.contains(&over.as_str()) {
                return AppEndpoint {
                    base_url: format!("{}://{}:{}", self.protocol, over, port),
                    basic_auth: None,
                };
            }
        }

        let is_https = self.protocol == "https";
        let app_host = if is_https {
            host.to_string()
        } else if cfg.net.as_deref() == Some("host") {
            "localhost".to_string()
        } else {
            app_id.to_string()
        };

        let basic_auth = match cfg.haproxy_password.as_deref() {
            Some(pass) if is_https && !pass.is_empty() => Some(BasicAuth {
                username: HAPROXY_USER.to_string(),
                password: pass.to_string(),
            }),
            _ => None,
        };

        AppEndpoint {
            base_url: format!("{}://{}:{}", self.protocol, app_host, port),
            basic_auth,
        }
    }
}
