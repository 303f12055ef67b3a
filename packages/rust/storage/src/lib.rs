//! Durable state for quizrelay runs.
//!
//! - [`StateStore`]: processed identifiers, committed only after distribution
//! - [`SessionStore`]: the authenticated session reused across runs
//!
//! Both persist through a [`Backend`]. [`FallbackBackend`] pairs a local
//! file with an optional remote copy (a GitHub Gist).

mod backend;
mod session;
mod state;

pub use backend::{
    Backend, FallbackBackend, GistBackend, LocalFileBackend, PayloadCheck, build_backend,
};
pub use session::SessionStore;
pub use state::StateStore;
