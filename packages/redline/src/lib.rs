//! Client core for AI-assisted document editing sessions.
//!
//! A session keeps one WebSocket connection to a server-side agent, folds its
//! events (chat, questions, plan snapshots, patch proposals) into a local
//! [`session::SessionState`], and lets the user accept or reject proposed
//! edits before they touch the document text.

pub mod cli;
pub mod config;
pub mod connection;
pub mod credentials;
pub mod documents;
pub mod drafts;
pub mod protocol;
pub mod session;

pub use connection::{ConnectionManager, ConnectionState};
pub use session::{ApplyOutcome, SessionError, SessionLink, SessionState, SessionStore};
