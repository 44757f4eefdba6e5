//! draftpane - prompt a hosted chat-completion API from a task pane and drop
//! the answer into your document
//!
//! The pieces are injected into [`pane::TaskPane`] as capability traits:
//! [`credentials::CredentialStore`], [`client::Completer`],
//! [`document::DocumentEditor`] and [`document::ClipboardWriter`].

pub mod client;
pub mod config;
pub mod credentials;
pub mod document;
pub mod logging;
pub mod pane;
pub mod ui;
