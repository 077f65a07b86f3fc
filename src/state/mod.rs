pub mod response_dedup;
pub mod session_binder;

pub use response_dedup::ResponseDedup;
pub use session_binder::{Resolution, SessionBinder};
