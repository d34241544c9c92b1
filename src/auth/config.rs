use std::path::PathBuf;
use std::time::Duration;

use crate::auth::OAuth;
use oauth2::AuthType;
use serde_derive::Deserialize;


const GITHUB_AUTH_URL: &str = "https://github.com/login/oauth/authorize";
const GITHUB_TOKEN_URL: &str = "https://github.com/login/oauth/access_token";
const GITHUB_API_GATEWAY: &str = "https://api.github.com/";


/// Configuration for OAuth. Can be parsed from Figment (`oauth.github`).
#[derive(Debug, Clone, Deserialize)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_auth_url")]
    pub auth_url: String,
    #[serde(default = "default_token_url")]
    pub token_url: String,
    pub redirect_uri: String,
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,
    /// Prefix put in front of the token URL, e.g. `https://cors-anywhere.herokuapp.com/`.
    #[serde(default)]
    pub cors_relay: Option<String>,
    #[serde(default = "default_api_base")]
    pub api_base: String,
}

fn default_auth_url() -> String {
    GITHUB_AUTH_URL.to_string()
}

fn default_token_url() -> String {
    GITHUB_TOKEN_URL.to_string()
}

fn default_scopes() -> Vec<String> {
    vec!["user:email".to_string(), "repo".to_string()]
}

fn default_api_base() -> String {
    GITHUB_API_GATEWAY.to_string()
}

impl OAuthConfig {
    /// Token endpoint as actually requested, relay included.
    pub fn effective_token_url(&self) -> String {
        match &self.cors_relay {
            Some(relay) if !relay.is_empty() => format!("{}{}", relay, self.token_url),
            _ => self.token_url.clone(),
        }
    }

    /// API base with exactly one trailing slash.
    pub fn api_base(&self) -> String {
        format!("{}/", self.api_base.trim_end_matches('/'))
    }
}

/// Creates a new OAuth client from OAuthConfig.
/// GitHub expects the client secret in the request body.
impl TryFrom<&OAuthConfig> for OAuth {
    type Error = anyhow::Error;

    fn try_from(oauth_config: &OAuthConfig) -> Result<Self, Self::Error> {
        Ok(OAuth::new(
            oauth2::ClientId::new(oauth_config.client_id.clone()),
            Some(oauth2::ClientSecret::new(oauth_config.client_secret.clone())),
            oauth2::AuthUrl::new(oauth_config.auth_url.clone())?,
            Some(oauth2::TokenUrl::new(oauth_config.effective_token_url())?),
        )
            .set_auth_type(AuthType::RequestBody)
            .set_redirect_uri(oauth2::RedirectUrl::new(oauth_config.redirect_uri.clone())?))
    }
}


/// Behaviour of the login flow itself (`auth_session`).
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Origin of this application, the only origin whose messages are trusted.
    pub origin: String,
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default)]
    pub degrade_profile_on_error: bool,
}

fn default_store_path() -> PathBuf {
    PathBuf::from("session.json")
}

fn default_timeout_secs() -> u64 {
    5 * 60
}

fn default_poll_interval_ms() -> u64 {
    500
}

impl SessionConfig {
    pub fn new(origin: impl Into<String>) -> Self {
        SessionConfig {
            origin: origin.into(),
            store_path: default_store_path(),
            timeout_secs: default_timeout_secs(),
            poll_interval_ms: default_poll_interval_ms(),
            degrade_profile_on_error: false,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}


#[cfg(test)]
mod tests {
    use rocket::figment::Figment;
    use rocket::figment::providers::{Format, Toml};
    use crate::auth::config::{OAuthConfig, SessionConfig};
    use crate::auth::OAuth;

    const CONFIG: &str = r#"
        [oauth.github]
        client_id = "Iv1.abc"
        client_secret = "secret"
        redirect_uri = "http://127.0.0.1:8000/auth/github"
        cors_relay = "https://relay.example/"

        [auth_session]
        origin = "http://127.0.0.1:8000"
    "#;

    #[test]
    fn test_parse_with_defaults() {
        let figment = Figment::from(Toml::string(CONFIG));
        let oauth: OAuthConfig = figment.extract_inner("oauth.github").unwrap();
        let session: SessionConfig = figment.extract_inner("auth_session").unwrap();

        assert_eq!(oauth.scopes, vec!["user:email", "repo"]);
        assert_eq!(oauth.effective_token_url(),
                   "https://relay.example/https://github.com/login/oauth/access_token");
        assert_eq!(oauth.api_base(), "https://api.github.com/");
        assert_eq!(session.timeout().as_secs(), 300);
        assert_eq!(session.poll_interval().as_millis(), 500);
        assert!(!session.degrade_profile_on_error);

        assert!(OAuth::try_from(&oauth).is_ok());
    }

    #[test]
    fn test_invalid_url_is_rejected() {
        let figment = Figment::from(Toml::string(CONFIG))
            .merge(Toml::string("[oauth.github]\nauth_url = \"not a url\""));
        let oauth: OAuthConfig = figment.extract_inner("oauth.github").unwrap();

        assert!(OAuth::try_from(&oauth).is_err());
    }
}
