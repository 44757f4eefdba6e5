//! Task pane state machine
//!
//! The pane is either showing the login form (no key) or the generate form.
//! Which one is derived from the state alone, so the two can never be visible
//! together:
//!
//! ```text
//! LoggedOut --save key--> Idle --submit--> Loading --ok--> Ready
//!                                            |  \--err--> Failed
//!                                            \--401--> LoggedOut
//! Ready | Failed --submit--> Loading
//! ```

use std::sync::Arc;
use tracing::{info, warn};

use crate::client::{Completer, CompletionError};
use crate::credentials::CredentialStore;
use crate::document::{self, BridgeError, ClipboardWriter, DocumentEditor};

/// Which form is on screen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Form {
    Login,
    Generate,
}

/// Where the pane is in its request cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaneState {
    /// No key; `notice` carries the banner that caused the sign-out, if any
    LoggedOut { notice: Option<String> },
    /// Key present, nothing requested yet
    Idle,
    /// Request in flight
    Loading,
    /// Last request produced text
    Ready(String),
    /// Last request failed
    Failed(CompletionError),
}

impl PaneState {
    pub fn name(&self) -> &'static str {
        match self {
            PaneState::LoggedOut { .. } => "logged-out",
            PaneState::Idle => "idle",
            PaneState::Loading => "loading",
            PaneState::Ready(_) => "ready",
            PaneState::Failed(_) => "failed",
        }
    }
}

/// Capabilities the pane drives, injected at composition time
#[derive(Clone)]
pub struct Services {
    pub credentials: Arc<dyn CredentialStore>,
    pub completer: Arc<dyn Completer>,
    pub document: Arc<dyn DocumentEditor>,
    pub clipboard: Arc<dyn ClipboardWriter>,
}

/// A submitted prompt waiting for the completer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRequest {
    /// Hand back to `finish_generate` so stale replies can be told apart
    pub id: u64,
    pub prompt: String,
    pub api_key: String,
}

/// Result of handling a key-save attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// Key persisted and the generate form is showing
    Saved,
    /// Key is active for this session but could not be persisted
    SessionOnly,
    /// Blank input, still on the login form
    Rejected,
}

pub struct TaskPane {
    services: Services,
    api_key: Option<String>,
    prompt: String,
    state: PaneState,
    /// Id of the request the pane is waiting on
    in_flight: Option<u64>,
    next_request: u64,
}

impl TaskPane {
    /// Build the pane, picking the form from whatever key is stored
    pub fn mount(services: Services) -> Self {
        let api_key = services.credentials.load();
        let state = if api_key.is_some() {
            PaneState::Idle
        } else {
            PaneState::LoggedOut { notice: None }
        };
        info!(state = state.name(), "task pane mounted");
        Self {
            services,
            api_key,
            prompt: String::new(),
            state,
            in_flight: None,
            next_request: 1,
        }
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    pub fn state(&self) -> &PaneState {
        &self.state
    }

    pub fn form(&self) -> Form {
        match self.state {
            PaneState::LoggedOut { .. } => Form::Login,
            _ => Form::Generate,
        }
    }

    pub fn has_key(&self) -> bool {
        self.api_key.is_some()
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn set_prompt(&mut self, prompt: impl Into<String>) {
        self.prompt = prompt.into();
    }

    pub fn prompt_mut(&mut self) -> &mut String {
        &mut self.prompt
    }

    /// Text of the last successful request
    pub fn result(&self) -> Option<&str> {
        match &self.state {
            PaneState::Ready(text) => Some(text),
            _ => None,
        }
    }

    /// Banner text, if any
    pub fn error(&self) -> Option<String> {
        match &self.state {
            PaneState::Failed(e) => Some(e.to_string()),
            PaneState::LoggedOut { notice } => notice.clone(),
            _ => None,
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self.state, PaneState::Loading)
    }

    /// Whether a submit would be accepted right now
    pub fn can_submit(&self) -> bool {
        self.api_key.is_some() && !self.is_loading()
    }

    /// Login form submit
    pub fn save_key(&mut self, key: &str) -> SaveOutcome {
        let key = key.trim();
        if key.is_empty() {
            return SaveOutcome::Rejected;
        }

        let outcome = match self.services.credentials.save(key) {
            Ok(()) => SaveOutcome::Saved,
            Err(e) => {
                warn!(error = %e, "could not persist api key, keeping it for this session");
                SaveOutcome::SessionOnly
            }
        };
        self.api_key = Some(key.to_string());
        self.state = PaneState::Idle;
        info!("api key accepted");
        outcome
    }

    /// Drop the key and return to the login form
    pub fn sign_out(&mut self) {
        self.forget_key();
        self.state = PaneState::LoggedOut { notice: None };
        info!("signed out");
    }

    fn forget_key(&mut self) {
        self.api_key = None;
        self.in_flight = None;
        if let Err(e) = self.services.credentials.clear() {
            warn!(error = %e, "could not clear stored api key");
        }
    }

    /// Move to Loading and hand back what to send; None while a request is
    /// already in flight or no key is present
    pub fn begin_generate(&mut self) -> Option<PendingRequest> {
        if !self.can_submit() {
            return None;
        }
        let api_key = self.api_key.clone()?;
        let id = self.next_request;
        self.next_request += 1;
        self.in_flight = Some(id);
        self.state = PaneState::Loading;
        info!(request = id, prompt_chars = self.prompt.chars().count(), "generation started");
        Some(PendingRequest {
            id,
            prompt: self.prompt.clone(),
            api_key,
        })
    }

    /// Apply the completer's answer to request `id` from `begin_generate`.
    /// Replies for any other request, or outside Loading, are dropped.
    pub fn finish_generate(&mut self, id: u64, outcome: Result<String, CompletionError>) {
        if !self.is_loading() {
            warn!(request = id, state = self.state.name(), "dropping completion that arrived outside Loading");
            return;
        }
        if self.in_flight != Some(id) {
            warn!(request = id, current = ?self.in_flight, "dropping completion for a superseded request");
            return;
        }
        self.in_flight = None;
        self.state = match outcome {
            Ok(text) => {
                info!(chars = text.chars().count(), "generation finished");
                PaneState::Ready(text)
            }
            Err(e) if e.is_auth() => {
                warn!(error = %e, "api key rejected, signing out");
                self.forget_key();
                PaneState::LoggedOut {
                    notice: Some(e.to_string()),
                }
            }
            Err(e) => {
                warn!(kind = e.kind(), error = %e, "generation failed");
                PaneState::Failed(e)
            }
        };
    }

    /// Submit the prompt and wait for the answer
    pub async fn generate(&mut self) {
        let Some(request) = self.begin_generate() else {
            return;
        };
        let outcome = self
            .services
            .completer
            .complete(&request.prompt, &request.api_key)
            .await;
        self.finish_generate(request.id, outcome);
    }

    /// Insert the current result into the document; no-op without a result
    pub async fn insert(&self) -> Result<(), BridgeError> {
        match self.result() {
            Some(text) => document::insert_at_selection(self.services.document.as_ref(), text).await,
            None => Ok(()),
        }
    }

    /// Copy the current result; no-op without a result. State is untouched
    /// either way.
    pub fn copy(&self) -> Result<(), BridgeError> {
        match self.result() {
            Some(text) => document::copy_to_clipboard(self.services.clipboard.as_ref(), text),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::MemoryCredentialStore;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct ScriptedCompleter {
        replies: Mutex<Vec<Result<String, CompletionError>>>,
        seen: Mutex<Vec<(String, String)>>,
    }

    impl ScriptedCompleter {
        fn new(replies: Vec<Result<String, CompletionError>>) -> Self {
            Self {
                replies: Mutex::new(replies),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Completer for ScriptedCompleter {
        async fn complete(&self, prompt: &str, api_key: &str) -> Result<String, CompletionError> {
            self.seen
                .lock()
                .unwrap()
                .push((prompt.to_string(), api_key.to_string()));
            self.replies.lock().unwrap().remove(0)
        }
    }

    struct NullDocument;

    #[async_trait]
    impl DocumentEditor for NullDocument {
        async fn insert_text_at_start(&self, _text: &str) -> Result<(), BridgeError> {
            Ok(())
        }

        async fn sync(&self) -> Result<(), BridgeError> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingClipboard {
        copied: Mutex<Vec<String>>,
    }

    impl ClipboardWriter for RecordingClipboard {
        fn write_text(&self, text: &str) -> Result<(), BridgeError> {
            self.copied.lock().unwrap().push(text.to_string());
            Ok(())
        }
    }

    fn services(
        store: Arc<MemoryCredentialStore>,
        completer: Arc<ScriptedCompleter>,
        clipboard: Arc<RecordingClipboard>,
    ) -> Services {
        Services {
            credentials: store,
            completer,
            document: Arc::new(NullDocument),
            clipboard,
        }
    }

    #[test]
    fn test_mount_without_key_shows_login() {
        let pane = TaskPane::mount(services(
            Arc::new(MemoryCredentialStore::new()),
            Arc::new(ScriptedCompleter::new(vec![])),
            Arc::default(),
        ));
        assert_eq!(pane.form(), Form::Login);
        assert_eq!(pane.state(), &PaneState::LoggedOut { notice: None });
        assert!(!pane.can_submit());
    }

    #[test]
    fn test_mount_with_key_shows_generate() {
        let pane = TaskPane::mount(services(
            Arc::new(MemoryCredentialStore::with_key("sk-test")),
            Arc::new(ScriptedCompleter::new(vec![])),
            Arc::default(),
        ));
        assert_eq!(pane.form(), Form::Generate);
        assert_eq!(pane.state(), &PaneState::Idle);
    }

    #[test]
    fn test_blank_key_is_rejected() {
        let store = Arc::new(MemoryCredentialStore::new());
        let mut pane = TaskPane::mount(services(
            store.clone(),
            Arc::new(ScriptedCompleter::new(vec![])),
            Arc::default(),
        ));
        assert_eq!(pane.save_key("   "), SaveOutcome::Rejected);
        assert_eq!(pane.form(), Form::Login);
        assert_eq!(store.load(), None);

        assert_eq!(pane.save_key("  sk-test \n"), SaveOutcome::Saved);
        assert_eq!(pane.form(), Form::Generate);
        assert_eq!(store.load().as_deref(), Some("sk-test"));
    }

    #[test]
    fn test_no_second_request_while_loading() {
        let mut pane = TaskPane::mount(services(
            Arc::new(MemoryCredentialStore::with_key("sk-test")),
            Arc::new(ScriptedCompleter::new(vec![])),
            Arc::default(),
        ));
        pane.set_prompt("one");
        assert!(pane.begin_generate().is_some());
        assert!(pane.is_loading());
        assert_eq!(pane.begin_generate(), None);
    }

    #[test]
    fn test_late_completion_is_ignored() {
        let mut pane = TaskPane::mount(services(
            Arc::new(MemoryCredentialStore::with_key("sk-test")),
            Arc::new(ScriptedCompleter::new(vec![])),
            Arc::default(),
        ));
        pane.finish_generate(1, Ok("stray".into()));
        assert_eq!(pane.state(), &PaneState::Idle);
    }

    #[tokio::test]
    async fn test_resubmit_clears_previous_error() {
        let completer = Arc::new(ScriptedCompleter::new(vec![
            Err(CompletionError::Http {
                status: 500,
                message: "boom".into(),
            }),
            Ok("second".into()),
        ]));
        let mut pane = TaskPane::mount(services(
            Arc::new(MemoryCredentialStore::with_key("sk-test")),
            completer.clone(),
            Arc::default(),
        ));
        pane.set_prompt("hi");

        pane.generate().await;
        assert_eq!(pane.error().as_deref(), Some("Error: 500 - boom"));

        let retry = pane.begin_generate().unwrap();
        assert_eq!(pane.error(), None);
        assert_eq!(pane.result(), None);

        pane.finish_generate(retry.id, Ok("second".into()));
        assert_eq!(pane.result(), Some("second"));
        assert_eq!(
            completer.seen.lock().unwrap()[0],
            ("hi".to_string(), "sk-test".to_string())
        );
    }

    #[tokio::test]
    async fn test_auth_failure_signs_out_with_notice() {
        let store = Arc::new(MemoryCredentialStore::with_key("sk-dead"));
        let mut pane = TaskPane::mount(services(
            store.clone(),
            Arc::new(ScriptedCompleter::new(vec![Err(CompletionError::Auth {
                message: "Invalid key".into(),
            })])),
            Arc::default(),
        ));

        pane.generate().await;

        assert_eq!(pane.form(), Form::Login);
        assert!(!pane.has_key());
        assert_eq!(store.load(), None);
        assert_eq!(pane.error().as_deref(), Some("Error: 401 - Invalid key"));

        pane.save_key("sk-new");
        assert_eq!(pane.error(), None);
    }

    #[tokio::test]
    async fn test_copy_uses_current_result() {
        let clipboard = Arc::new(RecordingClipboard::default());
        let mut pane = TaskPane::mount(services(
            Arc::new(MemoryCredentialStore::with_key("sk-test")),
            Arc::new(ScriptedCompleter::new(vec![Ok("copied".into())])),
            clipboard.clone(),
        ));

        pane.copy().unwrap();
        assert!(clipboard.copied.lock().unwrap().is_empty());

        pane.generate().await;
        pane.copy().unwrap();
        assert_eq!(*clipboard.copied.lock().unwrap(), vec!["copied".to_string()]);
    }

    #[test]
    fn test_reply_for_old_key_is_dropped_after_relogin() {
        let store = Arc::new(MemoryCredentialStore::with_key("sk-old"));
        let mut pane = TaskPane::mount(services(
            store.clone(),
            Arc::new(ScriptedCompleter::new(vec![])),
            Arc::default(),
        ));
        pane.set_prompt("first");
        let old = pane.begin_generate().unwrap();
        assert_eq!(old.api_key, "sk-old");

        pane.sign_out();
        assert_eq!(pane.save_key("sk-new"), SaveOutcome::Saved);
        pane.set_prompt("second");
        let current = pane.begin_generate().unwrap();
        assert_ne!(old.id, current.id);

        // The old key's 401 lands while the new request is in flight
        pane.finish_generate(
            old.id,
            Err(CompletionError::Auth {
                message: "Invalid key".into(),
            }),
        );
        assert!(pane.is_loading());
        assert_eq!(pane.form(), Form::Generate);
        assert_eq!(store.load().as_deref(), Some("sk-new"));

        pane.finish_generate(current.id, Ok("for second".into()));
        assert_eq!(pane.result(), Some("for second"));
    }

    #[test]
    fn test_sign_out_clears_store() {
        let store = Arc::new(MemoryCredentialStore::with_key("sk-test"));
        let mut pane = TaskPane::mount(services(
            store.clone(),
            Arc::new(ScriptedCompleter::new(vec![])),
            Arc::default(),
        ));
        pane.sign_out();
        assert_eq!(pane.form(), Form::Login);
        assert_eq!(store.load(), None);
    }
}
