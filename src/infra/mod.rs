pub mod backend;
pub mod oidc;

pub use backend::HttpSessionBackend;
pub use oidc::OidcClientCredentials;
