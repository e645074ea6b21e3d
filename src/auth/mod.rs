//! Authentication: password hashing and JWT issuing / verification
//!
//! Request-level extraction of the current user lives in
//! `api::middleware`; revoked refresh tokens in `utils::cache`.

pub mod jwt;
pub mod password;

pub use jwt::{Claims, TokenPair, TokenService, TokenType};
pub use password::{hash_password, verify_password};
