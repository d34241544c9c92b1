mod routes;
mod config;
mod error;
mod user;
mod session;
mod session_data;
mod signal;
mod window;
#[cfg(test)]
pub(crate) mod testing;

pub use routes::{routes, catchers};
pub use config::{OAuthConfig, SessionConfig};
pub use error::AuthError;

pub type OAuth = oauth2::basic::BasicClient;

pub use user::{UserEmail, UserProfile};
pub use session::AuthSession;
pub use session_data::{keys, FileStore, MemoryStore, SessionStore};
pub use signal::{AuthEvent, Callback, CallbackMessage, FlowState, WindowMessage};
pub use window::{AuthWindow, PopupHandle, SystemBrowser};
