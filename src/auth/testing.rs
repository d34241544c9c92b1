use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use oauth2::CsrfToken;
use oauth2::url::Url;

use crate::auth::{AuthError, AuthSession, AuthWindow, MemoryStore, PopupHandle, SessionConfig, UserEmail, UserProfile};
use crate::provider::{NewRepository, ProviderClient, RepositoryFile, RepositoryRecord};

pub const ORIGIN: &str = "http://127.0.0.1:8000";
pub const TOKEN: &str = "gho_mock_token";


/// Provider double that counts every call it receives.
#[derive(Default)]
pub struct MockProvider {
    pub fail_exchange: Option<String>,
    pub fail_profile: bool,
    pub fail_files: bool,
    pub user_email: Option<String>,
    pub emails: Vec<UserEmail>,
    pub exchanges: AtomicUsize,
    pub network_calls: AtomicUsize,
    pub created: Mutex<Vec<NewRepository>>,
    pub files: Mutex<Vec<String>>,
}

impl MockProvider {
    pub fn exchanges(&self) -> usize {
        self.exchanges.load(Ordering::SeqCst)
    }

    pub fn network_calls(&self) -> usize {
        self.network_calls.load(Ordering::SeqCst)
    }

    fn call(&self) {
        self.network_calls.fetch_add(1, Ordering::SeqCst);
    }

    fn record(&self, id: u64, name: &str, description: Option<String>, private: bool) -> RepositoryRecord {
        RepositoryRecord {
            id,
            name: name.to_string(),
            full_name: format!("octocat/{}", name),
            html_url: format!("https://github.com/octocat/{}", name),
            description,
            private,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            stargazers_count: 0,
            language: None,
        }
    }
}

#[rocket::async_trait]
impl ProviderClient for MockProvider {
    fn authorize_url(&self, state: &CsrfToken) -> Url {
        let mut url = Url::parse("https://github.com/login/oauth/authorize").unwrap();
        url.query_pairs_mut()
            .append_pair("client_id", "Iv1.client")
            .append_pair("state", state.secret());
        url
    }

    async fn exchange_code(&self, _code: &str) -> Result<String, AuthError> {
        self.call();
        self.exchanges.fetch_add(1, Ordering::SeqCst);
        match &self.fail_exchange {
            Some(error) => Err(AuthError::ProviderError(error.clone())),
            None => Ok(TOKEN.to_string()),
        }
    }

    async fn get_user(&self, token: &str) -> Result<UserProfile, AuthError> {
        self.call();
        assert_eq!(token, TOKEN);
        if self.fail_profile {
            return Err(AuthError::provider("GET /user returned 502 Bad Gateway"));
        }
        Ok(UserProfile {
            id: 583231,
            login: "octocat".to_string(),
            name: Some("The Octocat".to_string()),
            email: self.user_email.clone(),
            avatar_url: "https://avatars.githubusercontent.com/u/583231".to_string(),
            public_repos: 8,
            followers: 20,
            following: 9,
            degraded: false,
        })
    }

    async fn get_emails(&self, _token: &str) -> Result<Vec<UserEmail>, AuthError> {
        self.call();
        Ok(self.emails.clone())
    }

    async fn list_repositories(&self, _token: &str) -> Result<Vec<RepositoryRecord>, AuthError> {
        self.call();
        Ok(vec![
            self.record(2, "task-manager", None, false),
            self.record(1, "weather-dashboard", None, false),
        ])
    }

    async fn create_repository(&self, _token: &str, repository: &NewRepository) -> Result<RepositoryRecord, AuthError> {
        self.call();
        self.created.lock().unwrap().push(repository.clone());
        Ok(self.record(42, &repository.name, Some(repository.description.clone()), repository.private))
    }

    async fn put_file(&self, _token: &str, full_name: &str, file: &RepositoryFile) -> Result<(), AuthError> {
        self.call();
        if self.fail_files {
            return Err(AuthError::provider(format!("PUT /repos/{}/contents/{} returned 422", full_name, file.path)));
        }
        self.files.lock().unwrap().push(file.path.clone());
        Ok(())
    }
}


/// Window double; `closed` can be flipped by the test to simulate the user closing the popup.
#[derive(Default)]
pub struct MockWindow {
    pub blocked: bool,
    pub closed: Arc<AtomicBool>,
    pub opened: Mutex<Vec<Url>>,
}

impl MockWindow {
    pub fn close_popup(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

struct MockPopup(Arc<AtomicBool>);

impl PopupHandle for MockPopup {
    fn is_closed(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn close(&self) {}
}

impl AuthWindow for MockWindow {
    fn open(&self, url: &Url) -> Result<Arc<dyn PopupHandle>, AuthError> {
        if self.blocked {
            return Err(AuthError::BlockedPopup("popup blocked".to_string()));
        }
        self.opened.lock().unwrap().push(url.clone());
        Ok(Arc::new(MockPopup(self.closed.clone())))
    }
}


pub struct Harness {
    pub session: Arc<AuthSession>,
    pub provider: Arc<MockProvider>,
    pub window: Arc<MockWindow>,
    pub store: Arc<MemoryStore>,
}

pub fn harness_with(provider: MockProvider, window: MockWindow, config: SessionConfig) -> Harness {
    let provider = Arc::new(provider);
    let window = Arc::new(window);
    let store = Arc::new(MemoryStore::new());
    let session = Arc::new(AuthSession::init(provider.clone(), store.clone(), window.clone(), config));
    Harness { session, provider, window, store }
}

pub fn harness(provider: MockProvider) -> Harness {
    harness_with(provider, MockWindow::default(), SessionConfig::new(ORIGIN))
}

/// Yields until the session has armed its message listener.
pub async fn wait_for_popup(session: &AuthSession) {
    while !session.awaiting_popup() {
        tokio::task::yield_now().await;
    }
}

pub fn state_param(url: &Url) -> Option<String> {
    url.query_pairs()
        .find(|(key, _)| key == "state")
        .map(|(_, value)| value.into_owned())
}
