use std::sync::{Arc, Mutex, MutexGuard};

use oauth2::CsrfToken;
use oauth2::url::Url;
use tokio::sync::{broadcast, mpsc, watch};
use uuid::Uuid;

use crate::auth::session_data::keys;
use crate::auth::signal::{AuthEvent, Callback, CallbackMessage, FlowState, Settlement, WindowMessage};
use crate::auth::user::select_email;
use crate::auth::{AuthError, AuthWindow, PopupHandle, SessionConfig, SessionStore, UserProfile};
use crate::provider::{NewRepository, ProviderClient, RepositoryRecord, RepositorySpec};
use crate::scaffold::{repository_name, supplementary_files};

const DEFAULT_RETURN_URL: &str = "/";


fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}


/// Owns the GitHub login flow and the persisted session.
///
/// Only this type writes the session keys; everyone else reads through it or
/// listens on [`AuthSession::subscribe`].
pub struct AuthSession {
    provider: Arc<dyn ProviderClient>,
    store: Arc<dyn SessionStore>,
    window: Arc<dyn AuthWindow>,
    config: SessionConfig,
    /// Listener of the popup attempt in flight, keyed by attempt id.
    inbox: Mutex<Option<(Uuid, mpsc::UnboundedSender<WindowMessage>)>>,
    /// Attempt whose transitions are published on `state`.
    current: Mutex<Option<Uuid>>,
    exchange: tokio::sync::Mutex<()>,
    handoff: Mutex<()>,
    events: broadcast::Sender<AuthEvent>,
    state: watch::Sender<FlowState>,
}

impl AuthSession {
    /// Builds the session on top of whatever the store already holds.
    pub fn init(
        provider: Arc<dyn ProviderClient>,
        store: Arc<dyn SessionStore>,
        window: Arc<dyn AuthWindow>,
        config: SessionConfig,
    ) -> AuthSession {
        let (events, _) = broadcast::channel(16);
        let (state, _) = watch::channel(FlowState::Idle);

        let session = AuthSession {
            provider,
            store,
            window,
            config,
            inbox: Mutex::new(None),
            current: Mutex::new(None),
            exchange: tokio::sync::Mutex::new(()),
            handoff: Mutex::new(()),
            events,
            state,
        };

        if session.is_authenticated() {
            if let Some(user) = session.current_user() {
                info!("Restored GitHub session for {}", user.login);
            }
            session.state.send_replace(FlowState::Authenticated);
        }
        session
    }

    /// Drops in-memory listeners. Persisted state is left alone.
    pub fn dispose(&self) {
        lock(&self.inbox).take();
    }

    pub fn is_authenticated(&self) -> bool {
        self.token().is_some()
    }

    pub fn current_user(&self) -> Option<UserProfile> {
        let raw = self.store.get(keys::USER)?;
        match serde_json::from_str(&raw) {
            Ok(user) => Some(user),
            Err(e) => {
                warn!("Stored user profile is unreadable: {}", e);
                None
            }
        }
    }

    pub fn flow_state(&self) -> FlowState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }

    pub fn origin(&self) -> &str {
        &self.config.origin
    }

    /// Runs a fresh popup handshake, even when a session already exists.
    pub async fn login(&self) -> Result<UserProfile, AuthError> {
        let attempt = Uuid::new_v4();
        info!("[{}] Starting GitHub login", attempt);
        self.claim(attempt);
        self.transition(attempt, FlowState::AuthorizationRequested);

        // an abandoned redirect round-trip must not capture this attempt's callback
        let nonce = CsrfToken::new_random();
        let stored = self.store
            .remove(&[keys::AUTH_PENDING, keys::PENDING_CODE, keys::RETURN_URL])
            .and_then(|()| self.store.set(keys::OAUTH_STATE, nonce.secret().clone()));
        if let Err(e) = stored {
            return Err(self.fail(attempt, AuthError::Storage(e)));
        }
        let url = self.provider.authorize_url(&nonce);

        let inbox = self.arm(attempt);
        let popup = match self.window.open(&url) {
            Ok(popup) => popup,
            Err(e) => {
                self.disarm(attempt);
                self.forget_nonce(&nonce);
                return Err(self.fail(attempt, e));
            }
        };
        self.transition(attempt, FlowState::AwaitingProviderCallback);

        let outcome = self.await_callback(attempt, popup.clone(), inbox).await;
        self.disarm(attempt);
        popup.close();

        match outcome {
            Ok(callback) => self.complete(attempt, callback).await,
            Err(e) => {
                self.forget_nonce(&nonce);
                Err(self.fail(attempt, e))
            }
        }
    }

    /// Whether a popup attempt is currently listening for messages.
    pub fn awaiting_popup(&self) -> bool {
        lock(&self.inbox).is_some()
    }

    /// Hands a cross-window message to the attempt in flight.
    /// Returns false when nobody is listening.
    pub fn deliver_message(&self, message: WindowMessage) -> bool {
        let sender = lock(&self.inbox).as_ref().map(|(_, sender)| sender.clone());
        match sender {
            Some(sender) => sender.send(message).is_ok(),
            None => false,
        }
    }

    /// Starts a full-page redirect round-trip and returns where to navigate.
    pub fn begin_redirect(&self, return_url: &str) -> Result<Url, AuthError> {
        let attempt = Uuid::new_v4();
        info!("[{}] Starting GitHub login by redirect", attempt);
        if let Some((previous, _)) = lock(&self.inbox).take() {
            debug!("[{}] Superseded by redirect [{}]", previous, attempt);
        }
        self.claim(attempt);
        self.transition(attempt, FlowState::AuthorizationRequested);

        let nonce = CsrfToken::new_random();
        let stored = self.store.set_entries(&[
            (keys::OAUTH_STATE, nonce.secret().clone()),
            (keys::AUTH_PENDING, "true".to_string()),
            (keys::RETURN_URL, return_url.to_string()),
        ]);
        if let Err(e) = stored {
            self.forget(&keys::TRANSIENT);
            return Err(self.fail(attempt, AuthError::Storage(e)));
        }

        self.transition(attempt, FlowState::AwaitingProviderCallback);
        Ok(self.provider.authorize_url(&nonce))
    }

    pub fn redirect_pending(&self) -> bool {
        self.store.contains(keys::AUTH_PENDING)
    }

    /// Parks the returned code until the next startup check picks it up.
    pub fn accept_redirect_callback(&self, code: &str, state: &str) -> Result<(), AuthError> {
        let callback = Callback {
            code: code.to_string(),
            state: state.to_string(),
        };
        let serialized = serde_json::to_string(&callback).map_err(anyhow::Error::from)?;
        self.store.set(keys::PENDING_CODE, serialized)?;
        Ok(())
    }

    /// The provider sent the user back with an error instead of a code.
    pub fn accept_redirect_error(&self, error: &str) -> AuthError {
        warn!("GitHub refused the redirect login: {}", error);
        self.forget(&keys::TRANSIENT);
        let error = AuthError::provider(error);
        self.settle_state(&error);
        error
    }

    /// Startup check for a redirect round-trip. Completes the login when a code is
    /// waiting and returns the URL to send the user back to.
    pub async fn resume_pending(&self) -> Result<Option<String>, AuthError> {
        let (pending, return_url) = {
            let _handoff = lock(&self.handoff);
            if !self.store.contains(keys::AUTH_PENDING) {
                return Ok(None);
            }
            let Some(raw) = self.store.get(keys::PENDING_CODE) else {
                debug!("Redirect login started but no code has arrived yet");
                return Ok(None);
            };
            let return_url = self.store.get(keys::RETURN_URL);
            self.store.remove(&[keys::AUTH_PENDING, keys::PENDING_CODE, keys::RETURN_URL])?;
            (serde_json::from_str::<Callback>(&raw), return_url)
        };

        let attempt = Uuid::new_v4();
        self.claim(attempt);
        let callback = match pending {
            Ok(callback) => callback,
            Err(e) => {
                self.forget(&[keys::OAUTH_STATE]);
                return Err(self.fail(attempt, AuthError::provider(format!("unreadable pending code: {}", e))));
            }
        };

        info!("[{}] Resuming GitHub login after redirect", attempt);
        self.complete(attempt, callback).await?;
        Ok(Some(return_url.unwrap_or_else(|| DEFAULT_RETURN_URL.to_string())))
    }

    /// Forgets the session, including anything left over from an unfinished attempt.
    pub fn logout(&self) {
        lock(&self.inbox).take();
        lock(&self.current).take();
        if let Err(e) = self.store.remove(&keys::ALL) {
            error!("Could not clear the stored session: {}", e);
        }
        self.state.send_replace(FlowState::Idle);
        let _ = self.events.send(AuthEvent::LoggedOut);
    }

    pub async fn list_repositories(&self) -> Result<Vec<RepositoryRecord>, AuthError> {
        let token = self.require_token()?;
        self.provider.list_repositories(&token).await
    }

    /// Creates the repository, then tries to commit the starter files.
    /// Only the repository itself decides success.
    pub async fn create_repository(&self, spec: &RepositorySpec) -> Result<RepositoryRecord, AuthError> {
        let token = self.require_token()?;
        let repository = NewRepository {
            name: repository_name(&spec.name),
            description: spec.description.clone(),
            private: spec.private,
            auto_init: false,
        };

        let record = self.provider.create_repository(&token, &repository).await?;
        info!("Created repository {}", record.full_name);

        for file in supplementary_files(&record.name, spec) {
            if let Err(e) = self.provider.put_file(&token, &record.full_name, &file).await {
                warn!("Could not add {} to {}: {}", file.path, record.full_name, e);
            }
        }
        Ok(record)
    }

    fn token(&self) -> Option<String> {
        self.store.get(keys::ACCESS_TOKEN).filter(|token| !token.is_empty())
    }

    fn require_token(&self) -> Result<String, AuthError> {
        self.token().ok_or(AuthError::NotAuthenticated)
    }

    fn claim(&self, attempt: Uuid) {
        lock(&self.current).replace(attempt);
    }

    fn is_current(&self, attempt: Uuid) -> bool {
        *lock(&self.current) == Some(attempt)
    }

    fn transition(&self, attempt: Uuid, next: FlowState) {
        debug!("[{}] {:?}", attempt, next);
        if self.is_current(attempt) {
            self.state.send_replace(next);
        }
    }

    fn fail(&self, attempt: Uuid, error: AuthError) -> AuthError {
        warn!("[{}] GitHub login failed: {}", attempt, error);
        if self.is_current(attempt) {
            self.settle_state(&error);
        }
        error
    }

    /// A failed handshake leaves a still-stored session authenticated.
    fn settle_state(&self, error: &AuthError) {
        let next = if self.is_authenticated() {
            FlowState::Authenticated
        } else {
            FlowState::Failed(error.kind())
        };
        self.state.send_replace(next);
    }

    fn forget(&self, keys: &[&str]) {
        if let Err(e) = self.store.remove(keys) {
            error!("Could not remove {:?} from the session store: {}", keys, e);
        }
    }

    /// Removes the stored nonce unless a newer attempt has replaced it.
    fn forget_nonce(&self, nonce: &CsrfToken) {
        if self.store.get(keys::OAUTH_STATE).as_ref() == Some(nonce.secret()) {
            self.forget(&[keys::OAUTH_STATE]);
        }
    }

    fn arm(&self, attempt: Uuid) -> mpsc::UnboundedReceiver<WindowMessage> {
        let (sender, receiver) = mpsc::unbounded_channel();
        if let Some((previous, _)) = lock(&self.inbox).replace((attempt, sender)) {
            debug!("[{}] Superseded by [{}]", previous, attempt);
        }
        receiver
    }

    fn disarm(&self, attempt: Uuid) {
        let mut inbox = lock(&self.inbox);
        if matches!(inbox.as_ref(), Some((armed, _)) if *armed == attempt) {
            inbox.take();
        }
    }

    /// Waits for the first of: a trusted message, the popup closing, the timeout.
    async fn await_callback(
        &self,
        attempt: Uuid,
        popup: Arc<dyn PopupHandle>,
        mut inbox: mpsc::UnboundedReceiver<WindowMessage>,
    ) -> Result<Callback, AuthError> {
        let (settlement, mut outcome) = Settlement::new();
        let settlement = Arc::new(settlement);

        let listener = {
            let settlement = settlement.clone();
            let origin = self.config.origin.clone();
            tokio::spawn(async move {
                while let Some(message) = inbox.recv().await {
                    if message.origin != origin {
                        warn!("[{}] Ignoring message from untrusted origin {}", attempt, message.origin);
                        continue;
                    }
                    let result = match message.payload {
                        CallbackMessage::Success { code, state } => Ok(Callback { code, state }),
                        CallbackMessage::Error { error } => Err(AuthError::ProviderError(error)),
                    };
                    settlement.settle(result);
                    return;
                }
                // listener was disarmed by a newer attempt or by logout
                settlement.settle(Err(AuthError::Cancelled));
            })
        };

        let poller = {
            let settlement = settlement.clone();
            let interval = self.config.poll_interval();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                loop {
                    ticker.tick().await;
                    if settlement.is_settled() {
                        return;
                    }
                    if popup.is_closed() {
                        settlement.settle(Err(AuthError::Cancelled));
                        return;
                    }
                }
            })
        };

        let result = match tokio::time::timeout(self.config.timeout(), &mut outcome).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(AuthError::Cancelled),
            Err(_) => {
                if settlement.settle(Err(AuthError::Timeout)) {
                    Err(AuthError::Timeout)
                } else {
                    outcome.try_recv().unwrap_or(Err(AuthError::Timeout))
                }
            }
        };

        listener.abort();
        poller.abort();
        result
    }

    /// Checks the returned state, exchanges the code and stores token and profile together.
    async fn complete(&self, attempt: Uuid, callback: Callback) -> Result<UserProfile, AuthError> {
        let expected = self.store.get(keys::OAUTH_STATE);
        self.forget(&[keys::OAUTH_STATE]);

        match expected {
            None => {
                warn!("[{}] No known csrf_token!", attempt);
                return Err(self.fail(attempt, AuthError::StateMismatch));
            }
            Some(expected) => {
                if callback.state != expected {
                    warn!("[{}] csrf_token mismatch!", attempt);
                    return Err(self.fail(attempt, AuthError::StateMismatch));
                }
            }
        }

        self.transition(attempt, FlowState::ExchangingCode);
        let _exchange = self.exchange.lock().await;

        let token = match self.provider.exchange_code(&callback.code).await {
            Ok(token) if !token.is_empty() => token,
            Ok(_) => return Err(self.fail(attempt, AuthError::provider("empty access token"))),
            Err(e) => return Err(self.fail(attempt, e)),
        };

        let profile = match self.fetch_profile(&token).await {
            Ok(profile) => profile,
            Err(e) if self.config.degrade_profile_on_error => {
                warn!("[{}] Using a placeholder profile: {}", attempt, e);
                UserProfile::placeholder()
            }
            Err(e) => return Err(self.fail(attempt, e)),
        };

        let stored = serde_json::to_string(&profile)
            .map_err(anyhow::Error::from)
            .and_then(|serialized| self.store.set_entries(&[
                (keys::ACCESS_TOKEN, token),
                (keys::USER, serialized),
            ]));
        if let Err(e) = stored {
            self.forget(&[keys::ACCESS_TOKEN, keys::USER]);
            return Err(self.fail(attempt, AuthError::Storage(e)));
        }

        self.transition(attempt, FlowState::Authenticated);
        info!("[{}] Welcome {}", attempt, profile.login);
        let _ = self.events.send(AuthEvent::Authenticated(profile.clone()));
        Ok(profile)
    }

    async fn fetch_profile(&self, token: &str) -> Result<UserProfile, AuthError> {
        let mut profile = self.provider.get_user(token).await?;
        if profile.email.as_deref().map_or(true, str::is_empty) {
            match self.provider.get_emails(token).await {
                Ok(emails) => profile.email = select_email(&emails),
                Err(e) => debug!("Could not read the email addresses: {}", e),
            }
        }
        Ok(profile)
    }
}
