pub mod access_gate;
pub mod auth;
pub mod csrf;
pub mod no_store;
pub mod request_meta;

pub use access_gate::access_gate_middleware;
pub use auth::{session_auth_middleware, session_token, AuthAdmin};
pub use csrf::csrf_middleware;
pub use no_store::no_store_middleware;
pub use request_meta::RequestMeta;
