pub mod auth;
pub mod request_context;
pub mod response;

pub use auth::{authorize, authorize_middleware, AuthDecision, AuthGate, AuthPolicy, AuthUser, OptionalAuthUser};
pub use request_context::{request_context_middleware, ProxyTrust, RequestContext};
pub use response::{ApiResponse, ApiResult};
