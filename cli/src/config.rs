// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

use std::{error::Error, path::PathBuf, str::FromStr};

use cardamom_carddav::{AuthMethod, CardDavConfig};
use tokio::fs;

const CARDAMOM_CONFIG_ENV: &str = "CARDAMOM_CONFIG";
const CARDAMOM_SERVER_ENV: &str = "CARDAMOM_SERVER";
const CARDAMOM_USERNAME_ENV: &str = "CARDAMOM_USERNAME";
const CARDAMOM_PASSWORD_ENV: &str = "CARDAMOM_PASSWORD";
const CARDAMOM_TOKEN_ENV: &str = "CARDAMOM_TOKEN";

/// Server settings given on the command line. They take precedence over the
/// configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    pub server: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub token: Option<String>,
}

/// Resolves the account configuration.
///
/// The file is taken from `path`, else from `CARDAMOM_CONFIG`. Without a
/// file the configuration is built from `overrides` and the `CARDAMOM_*`
/// environment variables alone.
#[tracing::instrument(skip(overrides))]
pub async fn parse_config(
    path: Option<PathBuf>,
    overrides: &Overrides,
) -> Result<CardDavConfig, Box<dyn Error>> {
    let path = path.or_else(|| env_value(CARDAMOM_CONFIG_ENV).map(PathBuf::from));
    let file = match path {
        Some(path) => Some(
            fs::read_to_string(&path)
                .await
                .map_err(|e| format!("Failed to read config file at {}: {}", path.display(), e))?
                .parse::<ConfigRaw>()?
                .server,
        ),
        None => None,
    };

    let mut config = file.unwrap_or_default();
    if let Some(server) = &overrides.server {
        config.base_url.clone_from(server);
    } else if config.base_url.is_empty() {
        config.base_url = env_value(CARDAMOM_SERVER_ENV).ok_or_else(|| {
            format!(
                "No server configured: use --server, {CARDAMOM_SERVER_ENV} or a config file"
            )
        })?;
    }
    config.auth = resolve_auth(config.auth, overrides);
    Ok(config)
}

/// Flags win over the file; environment variables only fill in an account
/// without credentials.
fn resolve_auth(file: AuthMethod, overrides: &Overrides) -> AuthMethod {
    let password = || {
        overrides
            .password
            .clone()
            .or_else(|| env_value(CARDAMOM_PASSWORD_ENV))
            .unwrap_or_default()
    };

    if let Some(token) = &overrides.token {
        return AuthMethod::Bearer {
            token: token.clone(),
        };
    }
    if let Some(username) = &overrides.username {
        return AuthMethod::Basic {
            username: username.clone(),
            password: password(),
        };
    }

    match file {
        AuthMethod::Basic { username, password } => AuthMethod::Basic {
            username,
            password: overrides.password.clone().unwrap_or(password),
        },
        AuthMethod::None => {
            if let Some(token) = env_value(CARDAMOM_TOKEN_ENV) {
                AuthMethod::Bearer { token }
            } else if let Some(username) = env_value(CARDAMOM_USERNAME_ENV) {
                AuthMethod::Basic {
                    username,
                    password: password(),
                }
            } else {
                AuthMethod::None
            }
        }
        bearer @ AuthMethod::Bearer { .. } => bearer,
    }
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

#[derive(Debug, serde::Deserialize)]
struct ConfigRaw {
    server: CardDavConfig,
}

impl FromStr for ConfigRaw {
    type Err = Box<dyn Error>;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(toml::from_str(s)?)
    }
}
