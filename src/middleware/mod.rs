pub mod session;

pub use session::{SESSION_HEADER, SessionPrincipal, session_middleware};
