use crate::auth::AuthSession;
use rocket::http::Status;
use rocket::Request;
use rocket::State;
use rocket::request::{FromRequest, Outcome};
use serde_derive::{Deserialize, Serialize};


/// Excerpt of the user data from the Github API
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct UserProfile {
    pub id: u64,
    pub login: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    pub avatar_url: String,
    #[serde(default)]
    pub public_repos: u32,
    #[serde(default)]
    pub followers: u32,
    #[serde(default)]
    pub following: u32,
    /// Set when the profile is a stand-in because the provider could not be reached.
    #[serde(default)]
    pub degraded: bool,
}

impl UserProfile {
    /// Stand-in profile for a session whose token is valid but whose profile fetch failed.
    pub fn placeholder() -> Self {
        UserProfile {
            id: 0,
            login: "github-user".to_string(),
            name: None,
            email: None,
            avatar_url: String::new(),
            public_repos: 0,
            followers: 0,
            following: 0,
            degraded: true,
        }
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().filter(|name| !name.is_empty()).unwrap_or(&self.login)
    }
}


/// One entry of `GET /user/emails`.
#[derive(Deserialize, Debug, Clone)]
pub struct UserEmail {
    pub email: String,
    #[serde(default)]
    pub primary: bool,
    #[serde(default)]
    pub verified: bool,
}

/// The entry flagged primary, else the first one.
pub fn select_email(emails: &[UserEmail]) -> Option<String> {
    emails.iter()
        .find(|entry| entry.primary)
        .or_else(|| emails.first())
        .map(|entry| entry.email.clone())
}


/// Request guard for the logged in user. Forwards with 401 when there is no session.
#[rocket::async_trait]
impl<'r> FromRequest<'r> for UserProfile
{
    type Error = anyhow::Error;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        if let Outcome::Success(auth) = request.guard::<&State<AuthSession>>().await {
            match auth.current_user() {
                Some(user) if auth.is_authenticated() => Outcome::Success(user),
                _ => Outcome::Forward(Status::Unauthorized),
            }
        } else {
            Outcome::Error((Status::InternalServerError, anyhow::anyhow!("Could not get application state!")))
        }
    }
}
