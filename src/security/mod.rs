//! Security: password hashing, login and ownership checks, and the `auth`,
//! `role` and `api` (CORS) middleware.

pub mod auth;
pub mod hash;
pub mod middleware;

pub use auth::{Resource, attempt, can_access};
pub use middleware::{AuthMiddleware, CorsMiddleware, RoleMiddleware};
