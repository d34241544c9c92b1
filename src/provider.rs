use chrono::{DateTime, Utc};
use oauth2::CsrfToken;
use oauth2::url::Url;
use serde_derive::{Deserialize, Serialize};

use crate::auth::{AuthError, UserEmail, UserProfile};


/// A repository as returned by the provider.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RepositoryRecord {
    pub id: u64,
    pub name: String,
    pub full_name: String,
    pub html_url: String,
    #[serde(default)]
    pub description: Option<String>,
    pub private: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub stargazers_count: u32,
    #[serde(default)]
    pub language: Option<String>,
}


/// What the caller asks for when creating a repository.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct RepositorySpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub private: bool,
    #[serde(default)]
    pub tech_stack: Vec<String>,
    #[serde(default)]
    pub learning_goals: Vec<String>,
}


/// Body of `POST /user/repos`.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct NewRepository {
    pub name: String,
    pub description: String,
    pub private: bool,
    pub auto_init: bool,
}


/// A file committed into a freshly created repository.
#[derive(Debug, Clone, PartialEq)]
pub struct RepositoryFile {
    pub path: String,
    pub message: String,
    pub content: String,
}


/// Everything the session needs from the identity provider.
#[rocket::async_trait]
pub trait ProviderClient: Send + Sync {
    /// Authorization URL carrying `state` and the fixed scope set.
    fn authorize_url(&self, state: &CsrfToken) -> Url;

    /// Exchanges an authorization code for an access token.
    async fn exchange_code(&self, code: &str) -> Result<String, AuthError>;

    async fn get_user(&self, token: &str) -> Result<UserProfile, AuthError>;

    async fn get_emails(&self, token: &str) -> Result<Vec<UserEmail>, AuthError>;

    async fn list_repositories(&self, token: &str) -> Result<Vec<RepositoryRecord>, AuthError>;

    async fn create_repository(&self, token: &str, repository: &NewRepository) -> Result<RepositoryRecord, AuthError>;

    async fn put_file(&self, token: &str, full_name: &str, file: &RepositoryFile) -> Result<(), AuthError>;
}
