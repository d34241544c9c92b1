#[macro_use]
extern crate rocket;

use std::sync::Arc;

use github_auth_session::auth::{self, AuthSession, FileStore, OAuthConfig, SessionConfig, SystemBrowser};
use github_auth_session::github_api::GithubClient;
use rocket::fairing::AdHoc;
use rocket::{Build, Rocket};
use rocket_dyn_templates::Template;


fn auth_session(rocket: &Rocket<Build>) -> Result<AuthSession, anyhow::Error> {
    let figment = rocket.figment();
    let oauth: OAuthConfig = figment.extract_inner("oauth.github")?;
    let config: SessionConfig = figment.extract_inner("auth_session")?;

    let provider = GithubClient::new(&oauth)?;
    let store = FileStore::open(&config.store_path)?;
    info!("GitHub session stored in {}", config.store_path.display());

    Ok(AuthSession::init(Arc::new(provider), Arc::new(store), Arc::new(SystemBrowser), config))
}

#[launch]
fn rocket() -> _ {
    rocket::build()
        .attach(AdHoc::try_on_ignite("GitHub session", |rocket| async move {
            match auth_session(&rocket) {
                Ok(session) => Ok(rocket.manage(session)),
                Err(e) => {
                    error!("GitHub session could not be configured: {:#}", e);
                    Err(rocket)
                }
            }
        }))
        .attach(AdHoc::on_shutdown("GitHub session", |rocket| Box::pin(async move {
            if let Some(session) = rocket.state::<AuthSession>() {
                session.dispose();
            }
        })))
        .mount("/", auth::routes())
        .register("/", auth::catchers())
        .attach(Template::fairing())
}
