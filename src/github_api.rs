use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use oauth2::basic::BasicErrorResponseType;
use oauth2::reqwest::async_http_client;
use oauth2::url::Url;
use oauth2::{AuthorizationCode, CsrfToken, RequestTokenError, Scope, StandardErrorResponse, TokenResponse};
use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde_derive::{Deserialize, Serialize};

use crate::auth::{AuthError, OAuth, OAuthConfig, UserEmail, UserProfile};
use crate::provider::{NewRepository, ProviderClient, RepositoryFile, RepositoryRecord};

const USER_AGENT: &str = "github-auth-session";
const MIMETYPE_JSON: &str = "application/vnd.github+json";
const X_GIT_HUB_API_VERSION: &str = "2022-11-28";
const REPOSITORY_PAGE: &str = "user/repos?sort=updated&per_page=10";


/// Error body GitHub sends with a `200 OK` from the token endpoint.
#[derive(Deserialize, Debug)]
struct GithubOAuthError {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

#[derive(Serialize, Debug)]
struct PutContents<'a> {
    message: &'a str,
    content: String,
}


pub struct GithubClient {
    oauth: OAuth,
    scopes: Vec<String>,
    api_base: String,
    http: reqwest::Client,
}

impl GithubClient {
    pub fn new(config: &OAuthConfig) -> Result<GithubClient, anyhow::Error> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()?;
        Ok(GithubClient {
            oauth: OAuth::try_from(config)?,
            scopes: config.scopes.clone(),
            api_base: config.api_base(),
            http,
        })
    }

    fn authorized(&self, request: RequestBuilder, token: &str) -> RequestBuilder {
        request
            .header("Accept", MIMETYPE_JSON)
            .header("Authorization", format!("Bearer {}", token))
            .header("X-GitHub-Api-Version", X_GIT_HUB_API_VERSION)
    }

    async fn send(&self, request: RequestBuilder, what: &str) -> Result<Response, AuthError> {
        let response = request.send().await
            .map_err(|e| AuthError::provider(format!("{} failed: {}", what, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("{} returned {}: {}", what, status, body);
            return Err(AuthError::provider(format!("{} returned {}", what, status)));
        }
        Ok(response)
    }

    async fn fetch<T: DeserializeOwned>(&self, request: RequestBuilder, what: &str) -> Result<T, AuthError> {
        let response = self.send(request, what).await?;
        response.json::<T>().await
            .map_err(|e| AuthError::provider(format!("{} returned a malformed payload: {}", what, e)))
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }
}


fn describe_server_error(response: &StandardErrorResponse<BasicErrorResponseType>) -> String {
    response.error().to_string()
}

#[rocket::async_trait]
impl ProviderClient for GithubClient {
    fn authorize_url(&self, state: &CsrfToken) -> Url {
        let state = state.clone();
        let mut request = self.oauth.authorize_url(move || state);
        for scope in &self.scopes {
            request = request.add_scope(Scope::new(scope.clone()));
        }
        let (url, _) = request.url();
        url
    }

    async fn exchange_code(&self, code: &str) -> Result<String, AuthError> {
        let token = self.oauth
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .request_async(async_http_client)
            .await;

        match token {
            Ok(token) => Ok(token.access_token().secret().clone()),
            Err(RequestTokenError::ServerResponse(response)) => {
                Err(AuthError::ProviderError(describe_server_error(&response)))
            }
            Err(RequestTokenError::Parse(e, body)) => {
                match serde_json::from_slice::<GithubOAuthError>(&body) {
                    Ok(github_error) => {
                        debug!("Token exchange refused: {:?}", github_error.error_description);
                        Err(AuthError::ProviderError(github_error.error))
                    }
                    Err(_) => Err(AuthError::provider(format!("malformed token response: {}", e))),
                }
            }
            Err(RequestTokenError::Request(e)) => Err(AuthError::provider(format!("token request failed: {}", e))),
            Err(RequestTokenError::Other(e)) => Err(AuthError::ProviderError(e)),
        }
    }

    async fn get_user(&self, token: &str) -> Result<UserProfile, AuthError> {
        let request = self.authorized(self.http.get(self.url("user")), token);
        self.fetch(request, "GET /user").await
    }

    async fn get_emails(&self, token: &str) -> Result<Vec<UserEmail>, AuthError> {
        let request = self.authorized(self.http.get(self.url("user/emails")), token);
        self.fetch(request, "GET /user/emails").await
    }

    async fn list_repositories(&self, token: &str) -> Result<Vec<RepositoryRecord>, AuthError> {
        let request = self.authorized(self.http.get(self.url(REPOSITORY_PAGE)), token);
        self.fetch(request, "GET /user/repos").await
    }

    async fn create_repository(&self, token: &str, repository: &NewRepository) -> Result<RepositoryRecord, AuthError> {
        let request = self.authorized(self.http.post(self.url("user/repos")), token)
            .json(repository);
        self.fetch(request, "POST /user/repos").await
    }

    async fn put_file(&self, token: &str, full_name: &str, file: &RepositoryFile) -> Result<(), AuthError> {
        let body = PutContents {
            message: &file.message,
            content: STANDARD.encode(file.content.as_bytes()),
        };
        let path = format!("repos/{}/contents/{}", full_name, file.path);
        let request = self.authorized(self.http.put(self.url(&path)), token)
            .json(&body);
        self.send(request, &format!("PUT /{}", path)).await?;
        Ok(())
    }
}
