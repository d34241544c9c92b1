use std::sync::Arc;

use oauth2::url::Url;

use crate::auth::AuthError;


/// An open authorization window.
pub trait PopupHandle: Send + Sync {
    fn is_closed(&self) -> bool;
    fn close(&self);
}

/// Opens the provider's authorization page somewhere the user can see it.
pub trait AuthWindow: Send + Sync {
    fn open(&self, url: &Url) -> Result<Arc<dyn PopupHandle>, AuthError>;
}


/// Opens the authorization page in the system browser.
#[derive(Debug, Default)]
pub struct SystemBrowser;

/// A browser tab gives no signal when it is closed; the flow timeout covers that case.
struct BrowserTab;

impl PopupHandle for BrowserTab {
    fn is_closed(&self) -> bool {
        false
    }

    fn close(&self) {}
}

impl AuthWindow for SystemBrowser {
    fn open(&self, url: &Url) -> Result<Arc<dyn PopupHandle>, AuthError> {
        match open::that(url.as_str()) {
            Ok(()) => Ok(Arc::new(BrowserTab)),
            Err(e) => {
                warn!("Could not open browser: {}", e);
                Err(AuthError::BlockedPopup(e.to_string()))
            }
        }
    }
}
