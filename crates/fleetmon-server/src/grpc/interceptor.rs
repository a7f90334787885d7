//! Per-service authentication interceptor.
//!
//! Agent-facing services run with `AuthRequirement::None`, matching the
//! default of not gating metric ingestion on operator credentials; the
//! bearer path validates a JWT signed with the configured secret and is
//! used by surfaces that carry operator identity.

use crate::auth::JwtKeys;
use tonic::service::Interceptor;
use tonic::{Request, Status};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthRequirement {
    None,
    Bearer,
}

#[derive(Clone)]
pub struct AuthInterceptor {
    requirement: AuthRequirement,
    keys: Option<JwtKeys>,
}

impl AuthInterceptor {
    pub fn new(requirement: AuthRequirement, keys: Option<JwtKeys>) -> Self {
        Self { requirement, keys }
    }
}

impl Interceptor for AuthInterceptor {
    fn call(&mut self, request: Request<()>) -> Result<Request<()>, Status> {
        match self.requirement {
            AuthRequirement::None => Ok(request),
            AuthRequirement::Bearer => {
                let keys = self
                    .keys
                    .as_ref()
                    .ok_or_else(|| Status::unauthenticated("authentication not configured"))?;

                let token = request
                    .metadata()
                    .get("authorization")
                    .and_then(|value| value.to_str().ok())
                    .and_then(|value| value.strip_prefix("Bearer "))
                    .ok_or_else(|| {
                        Status::unauthenticated("missing or invalid authorization header")
                    })?;

                match keys.validate(token) {
                    Ok(claims) => {
                        tracing::debug!(username = %claims.username, "request authenticated");
                        Ok(request)
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "authentication failed");
                        Err(Status::unauthenticated("invalid token"))
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys() -> JwtKeys {
        JwtKeys::new("secret".into(), "refresh".into())
    }

    fn bearer_request(token: &str) -> Request<()> {
        let mut request = Request::new(());
        request.metadata_mut().insert(
            "authorization",
            format!("Bearer {token}").parse().unwrap(),
        );
        request
    }

    #[test]
    fn none_requirement_passes_everything_through() {
        let mut interceptor = AuthInterceptor::new(AuthRequirement::None, None);
        assert!(interceptor.call(Request::new(())).is_ok());
    }

    #[test]
    fn bearer_requirement_accepts_valid_tokens() {
        let pair = keys().generate("admin").unwrap();
        let mut interceptor = AuthInterceptor::new(AuthRequirement::Bearer, Some(keys()));
        assert!(interceptor.call(bearer_request(&pair.token)).is_ok());
    }

    #[test]
    fn bearer_requirement_rejects_missing_header() {
        let mut interceptor = AuthInterceptor::new(AuthRequirement::Bearer, Some(keys()));
        let status = interceptor.call(Request::new(())).unwrap_err();
        assert_eq!(status.code(), tonic::Code::Unauthenticated);
    }

    #[test]
    fn bearer_requirement_rejects_forged_tokens() {
        let forged = JwtKeys::new("other".into(), "other".into())
            .generate("admin")
            .unwrap();
        let mut interceptor = AuthInterceptor::new(AuthRequirement::Bearer, Some(keys()));
        let status = interceptor.call(bearer_request(&forged.token)).unwrap_err();
        assert_eq!(status.code(), tonic::Code::Unauthenticated);
    }
}
