use std::{future::Future, pin::Pin, sync::Arc};

use axum::{
    extract::Request,
    http::{header::AUTHORIZATION, StatusCode},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{decode, errors::ErrorKind, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use super::correlation::correlation_id;
use super::error::error_response;

/// Registered claims carried by an access token. Issuance happens in the
/// auth service; this pipeline only verifies.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String, // Subject (user ID)
    pub iss: String, // Issuer
    pub iat: usize,  // Issued at
    pub exp: usize,  // Expiration time
}

/// The verified subject of the current request, placed in request
/// extensions for the handler. Lives exactly one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedPrincipal {
    pub subject: String,
}

/// Credential rejection reasons. Display strings are the exact messages the
/// client receives; tokens themselves never appear in them.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Authentication token required")]
    MissingToken,

    #[error("Malformed token")]
    Malformed,

    #[error("Token has expired")]
    Expired,

    #[error("Invalid token")]
    Invalid,
}

/// Verifies bearer tokens against the shared application secret.
///
/// The accepted algorithm is pinned to HS256: a token claiming any other
/// algorithm fails verification regardless of its signature, which closes
/// the usual algorithm-confusion hole.
#[derive(Clone)]
pub struct JwtVerifier {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = 0;

        Self { decoding_key: DecodingKey::from_secret(secret.as_ref()), validation }
    }

    /// Decode and verify a token, mapping failures onto the terminal
    /// rejection reasons.
    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::Expired,
                ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => AuthError::Invalid,
                _ => AuthError::Malformed,
            })
    }
}

/// Authentication middleware guarding the protected route subtree.
///
/// Terminal on the first failure: no credential, malformed credential,
/// expired claims, bad signature. On success the verified subject is
/// written into request extensions and the request continues.
pub fn require_auth(
    verifier: Arc<JwtVerifier>,
) -> impl Fn(Request, Next) -> Pin<Box<dyn Future<Output = Response> + Send>> + Clone {
    move |mut request: Request, next: Next| {
        let verifier = verifier.clone();
        Box::pin(async move {
            let request_id = correlation_id(request.extensions()).to_string();

            let claims = match bearer_token(&request).and_then(|token| verifier.verify(token)) {
                Ok(claims) => claims,
                Err(reason) => {
                    warn!(
                        target: "http_requests",
                        request_id = %request_id,
                        reason = %reason,
                        "authentication rejected"
                    );
                    return error_response(
                        StatusCode::UNAUTHORIZED,
                        &reason.to_string(),
                        &request_id,
                    );
                }
            };

            request.extensions_mut().insert(AuthenticatedPrincipal { subject: claims.sub });

            next.run(request).await
        })
    }
}

/// Extract the token from the canonical transport, the bearer scheme on the
/// `Authorization` header.
fn bearer_token(request: &Request) -> Result<&str, AuthError> {
    let header = request.headers().get(AUTHORIZATION).ok_or(AuthError::MissingToken)?;
    let value = header.to_str().map_err(|_| AuthError::Malformed)?;
    let token = value.strip_prefix("Bearer ").ok_or(AuthError::Malformed)?;

    if token.is_empty() {
        return Err(AuthError::Malformed);
    }

    Ok(token)
}
