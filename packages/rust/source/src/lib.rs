//! Quiz site access: sessions, listing, item fetch with the reveal step.

mod client;
mod http;
mod session;

pub use client::SourceClient;
pub use http::request_error;
pub use session::SessionManager;
