use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use serde_derive::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::auth::UserProfile;


/// Payload the callback page posts to its opener.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum CallbackMessage {
    #[serde(rename = "GITHUB_AUTH_SUCCESS")]
    Success { code: String, state: String },
    #[serde(rename = "GITHUB_AUTH_ERROR")]
    Error { error: String },
}

/// A cross-window message together with the origin it was sent from.
#[derive(Debug, Clone)]
pub struct WindowMessage {
    pub origin: String,
    pub payload: CallbackMessage,
}

/// Code and state handed back by the provider.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Callback {
    pub code: String,
    pub state: String,
}


/// Broadcast to observers whenever the session changes.
#[derive(Debug, Clone)]
pub enum AuthEvent {
    Authenticated(UserProfile),
    LoggedOut,
}


/// Where the current login attempt is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason")]
pub enum FlowState {
    Idle,
    AuthorizationRequested,
    AwaitingProviderCallback,
    ExchangingCode,
    Authenticated,
    Failed(&'static str),
}


/// Single-resolution slot: the first `settle` wins, every later one is ignored.
#[derive(Debug)]
pub struct Settlement<T> {
    settled: AtomicBool,
    sender: Mutex<Option<oneshot::Sender<T>>>,
}

impl<T> Settlement<T> {
    pub fn new() -> (Settlement<T>, oneshot::Receiver<T>) {
        let (sender, receiver) = oneshot::channel();
        (Settlement {
            settled: AtomicBool::new(false),
            sender: Mutex::new(Some(sender)),
        }, receiver)
    }

    pub fn is_settled(&self) -> bool {
        self.settled.load(Ordering::SeqCst)
    }

    /// Returns whether this call was the one that settled.
    pub fn settle(&self, value: T) -> bool {
        if self.settled.swap(true, Ordering::SeqCst) {
            return false;
        }
        let sender = self.sender
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(sender) = sender {
            let _ = sender.send(value);
        }
        true
    }
}


#[cfg(test)]
mod tests {
    use crate::auth::signal::{CallbackMessage, Settlement};

    #[test]
    fn test_first_settle_wins() {
        let (settlement, mut receiver) = Settlement::new();
        assert!(!settlement.is_settled());

        assert!(settlement.settle("message"));
        assert!(!settlement.settle("popup closed"));
        assert!(settlement.is_settled());

        assert_eq!(receiver.try_recv().unwrap(), "message");
    }

    #[test]
    fn test_parse_callback_messages() {
        let success: CallbackMessage =
            serde_json::from_str(r#"{"type":"GITHUB_AUTH_SUCCESS","code":"abc","state":"n1"}"#).unwrap();
        assert_eq!(success, CallbackMessage::Success { code: "abc".into(), state: "n1".into() });

        let error: CallbackMessage =
            serde_json::from_str(r#"{"type":"GITHUB_AUTH_ERROR","error":"access_denied"}"#).unwrap();
        assert_eq!(error, CallbackMessage::Error { error: "access_denied".into() });

        assert!(serde_json::from_str::<CallbackMessage>(r#"{"type":"SOMETHING_ELSE"}"#).is_err());
    }
}
