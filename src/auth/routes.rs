use std::convert::Infallible;

use crate::auth::{AuthError, AuthSession, CallbackMessage, UserProfile, WindowMessage};
use crate::provider::{RepositoryRecord, RepositorySpec};
use rocket::http::{RawStr, Status};
use rocket::request::{FromRequest, Outcome};
use rocket::response::{self, Redirect, Responder};
use rocket::serde::json::Json;
use rocket::{Catcher, Request, Route, State};
use rocket_dyn_templates::{context, Template};
use serde_derive::Serialize;


#[derive(Serialize, Debug)]
pub struct ErrorBody {
    error: &'static str,
    message: String,
}

/// An [`AuthError`] rendered as a JSON body with a matching status.
#[derive(Debug)]
pub struct ApiError(AuthError);

impl From<AuthError> for ApiError {
    fn from(error: AuthError) -> Self {
        ApiError(error)
    }
}

impl<'r> Responder<'r, 'static> for ApiError {
    fn respond_to(self, request: &'r Request<'_>) -> response::Result<'static> {
        let status = match &self.0 {
            AuthError::BlockedPopup(_) => Status::ServiceUnavailable,
            AuthError::Cancelled => Status::Conflict,
            AuthError::StateMismatch => Status::Forbidden,
            AuthError::Timeout => Status::RequestTimeout,
            AuthError::ProviderError(_) => Status::BadGateway,
            AuthError::NotAuthenticated => Status::Unauthorized,
            AuthError::Storage(_) => Status::InternalServerError,
        };
        let body = ErrorBody {
            error: self.0.kind(),
            message: self.0.to_string(),
        };
        (status, Json(body)).respond_to(request)
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;


/// Value of the `Origin` header, if the browser sent one.
pub struct RequestOrigin(Option<String>);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for RequestOrigin {
    type Error = Infallible;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        Outcome::Success(RequestOrigin(request.headers().get_one("Origin").map(str::to_string)))
    }
}


/// Only same-site paths are accepted as return targets.
fn local_path(return_to: Option<&str>) -> &str {
    match return_to {
        Some(path) if path.starts_with('/') && !path.starts_with("//") => path,
        _ => "/",
    }
}

fn error_redirect(error: &AuthError) -> Redirect {
    let reason = match error {
        AuthError::ProviderError(reason) => reason.as_str(),
        other => other.kind(),
    };
    Redirect::to(format!("/?auth_error={}", RawStr::new(reason).percent_encode().as_str()))
}


#[derive(Serialize)]
pub struct SessionStatus {
    authenticated: bool,
    state: crate::auth::FlowState,
    user: Option<UserProfile>,
}


/// Status page. Also the startup check that finishes a redirect login.
#[get("/?<auth_error>")]
pub async fn index(auth: &State<AuthSession>, auth_error: Option<String>) -> Result<Template, Redirect> {
    let error = match auth.resume_pending().await {
        Ok(Some(return_url)) => return Err(Redirect::to(return_url)),
        Ok(None) => auth_error,
        Err(e) => Some(e.to_string()),
    };

    let user = auth.current_user();
    Ok(Template::render("index", context! {
        logged_in: auth.is_authenticated(),
        degraded: user.as_ref().map_or(false, |user| user.degraded),
        display_name: user.as_ref().map(|user| user.display_name().to_string()),
        user: user,
        error: error,
    }))
}


/// Redirects the client to the Github login page.
/// The nonce and return path are kept until the client comes back.
#[get("/login/github?<return_to>")]
pub fn github_login(auth: &State<AuthSession>, return_to: Option<&str>) -> Result<Redirect, ApiError> {
    let url = auth.begin_redirect(local_path(return_to))?;
    Ok(Redirect::to(url.to_string()))
}


/// Popup login: opens the authorization page and resolves once the handshake settles.
#[post("/api/login")]
pub async fn popup_login(auth: &State<AuthSession>) -> ApiResult<UserProfile> {
    Ok(Json(auth.login().await?))
}


/// Callback after logging in to Github.
/// A redirect login parks the code for the startup check; a popup gets a page
/// that posts the result back to its opener.
#[get("/auth/github?<code>&<state>&<error>")]
pub fn github_callback(
    auth: &State<AuthSession>,
    code: Option<&str>,
    state: Option<&str>,
    error: Option<&str>,
) -> Result<Template, Redirect> {
    if auth.redirect_pending() {
        let redirect = match (code, state) {
            (Some(code), Some(state)) => match auth.accept_redirect_callback(code, state) {
                Ok(()) => Redirect::to("/"),
                Err(e) => error_redirect(&e),
            },
            _ => error_redirect(&auth.accept_redirect_error(error.unwrap_or("missing_code"))),
        };
        return Err(redirect);
    }

    let message = match (code, state) {
        (Some(code), Some(state)) => CallbackMessage::Success {
            code: code.to_string(),
            state: state.to_string(),
        },
        _ => CallbackMessage::Error {
            error: error.unwrap_or("missing_code").to_string(),
        },
    };
    let payload = serde_json::to_string(&message).unwrap_or_default();
    Ok(Template::render("callback", context! {
        payload: payload,
        success: matches!(message, CallbackMessage::Success { .. }),
    }))
}


/// Receives what the callback page posts to its opener.
#[post("/auth/message", format = "json", data = "<message>")]
pub fn window_message(auth: &State<AuthSession>, origin: RequestOrigin, message: Json<CallbackMessage>) -> Status {
    let Some(origin) = origin.0 else {
        warn!("Dropping window message without Origin header");
        return Status::Forbidden;
    };

    let delivered = auth.deliver_message(WindowMessage {
        origin,
        payload: message.into_inner(),
    });
    if delivered {
        Status::Accepted
    } else {
        Status::NotFound
    }
}


#[get("/logout")]
pub fn logout(auth: &State<AuthSession>) -> Redirect {
    auth.logout();
    Redirect::to("/")
}

#[post("/api/logout")]
pub fn api_logout(auth: &State<AuthSession>) -> Status {
    auth.logout();
    Status::NoContent
}

#[get("/api/session")]
pub fn session_status(auth: &State<AuthSession>) -> Json<SessionStatus> {
    Json(SessionStatus {
        authenticated: auth.is_authenticated(),
        state: auth.flow_state(),
        user: auth.current_user(),
    })
}

#[get("/api/user")]
pub fn current_user(user: UserProfile) -> Json<UserProfile> {
    Json(user)
}

#[get("/api/repos")]
pub async fn list_repositories(auth: &State<AuthSession>) -> ApiResult<Vec<RepositoryRecord>> {
    Ok(Json(auth.list_repositories().await?))
}

#[post("/api/repos", format = "json", data = "<spec>")]
pub async fn create_repository(auth: &State<AuthSession>, spec: Json<RepositorySpec>) -> Result<(Status, Json<RepositoryRecord>), ApiError> {
    let record = auth.create_repository(&spec).await?;
    Ok((Status::Created, Json(record)))
}


#[catch(401)]
fn unauthorized() -> Json<ErrorBody> {
    Json(ErrorBody {
        error: AuthError::NotAuthenticated.kind(),
        message: AuthError::NotAuthenticated.to_string(),
    })
}


pub fn routes() -> Vec<Route> {
    routes![
        index,
        github_login,
        popup_login,
        github_callback,
        window_message,
        logout,
        api_logout,
        session_status,
        current_user,
        list_repositories,
        create_repository,
    ]
}

pub fn catchers() -> Vec<Catcher> {
    catchers![unauthorized]
}
