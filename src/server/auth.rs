//! Authentication/authorization seam: the wire adapter resolves a caller's
//! identity and permissions through this trait. [`AllowAll`] is the only
//! implementation shipped here, matching the crate's scope — a real
//! deployment plugs in its own token/session verifier.

use async_trait::async_trait;
use axum::http::HeaderMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Permission {
    Read,
    Write,
    Admin,
}

#[derive(Debug, Clone)]
pub struct Caller {
    pub author: String,
}

#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn authenticate(&self, headers: &HeaderMap) -> Option<Caller>;
    fn authorize(&self, caller: &Caller, permission: Permission) -> bool;
}

/// Trusts the `X-Author` header (defaulting to `anonymous`) and grants
/// every permission, for local development and the seed scenarios.
pub struct AllowAll;

#[async_trait]
impl AuthProvider for AllowAll {
    async fn authenticate(&self, headers: &HeaderMap) -> Option<Caller> {
        let author = headers
            .get("x-author")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("anonymous")
            .to_string();
        Some(Caller { author })
    }

    fn authorize(&self, _caller: &Caller, _permission: Permission) -> bool {
        true
    }
}
