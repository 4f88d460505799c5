use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{TimeZone, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;
use tracing::debug;

use shared_models::auth::{JwtClaims, Role, User};

type HmacSha256 = Hmac<Sha256>;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum TokenError {
    #[error("JWT secret is not set")]
    MissingSecret,

    #[error("Invalid token format")]
    Malformed,

    #[error("Invalid token signature")]
    BadSignature,

    #[error("Invalid claims format")]
    BadClaims,

    #[error("Token expired")]
    Expired,
}

/// Validates an HS256 token and builds the request [`User`].
///
/// Supabase stamps `role: "authenticated"` on every token, so the clinic role is read from
/// `app_metadata.role` first, then `user_metadata.role`, then the top-level claim.
pub fn validate_token(token: &str, jwt_secret: &str) -> Result<User, TokenError> {
    if jwt_secret.is_empty() {
        return Err(TokenError::MissingSecret);
    }

    let mut parts = token.split('.');
    let (header_b64, claims_b64, signature_b64) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(h), Some(c), Some(s), None) => (h, c, s),
        _ => return Err(TokenError::Malformed),
    };

    let signature = URL_SAFE_NO_PAD
        .decode(signature_b64)
        .map_err(|_| TokenError::BadSignature)?;

    let mut mac = HmacSha256::new_from_slice(jwt_secret.as_bytes())
        .map_err(|_| TokenError::MissingSecret)?;
    mac.update(header_b64.as_bytes());
    mac.update(b".");
    mac.update(claims_b64.as_bytes());

    if mac.verify_slice(&signature).is_err() {
        debug!("Token signature verification failed");
        return Err(TokenError::BadSignature);
    }

    let claims_bytes = URL_SAFE_NO_PAD
        .decode(claims_b64)
        .map_err(|_| TokenError::BadClaims)?;
    let claims: JwtClaims = serde_json::from_slice(&claims_bytes).map_err(|e| {
        debug!("Failed to parse claims: {}", e);
        TokenError::BadClaims
    })?;

    if let Some(exp) = claims.exp {
        let now = Utc::now().timestamp().max(0) as u64;
        if exp < now {
            debug!("Token expired at {} (now: {})", exp, now);
            return Err(TokenError::Expired);
        }
    }

    let role = clinic_role(&claims);
    let created_at = claims
        .iat
        .and_then(|ts| Utc.timestamp_opt(ts as i64, 0).single());

    let user = User {
        id: claims.sub,
        email: claims.email,
        role,
        metadata: claims.user_metadata,
        created_at,
    };

    debug!("Token validated for user {} with role {:?}", user.id, user.role);
    Ok(user)
}

fn clinic_role(claims: &JwtClaims) -> Option<String> {
    let from_metadata = |meta: &Option<serde_json::Value>| {
        meta.as_ref()
            .and_then(|m| m.get("role"))
            .and_then(|r| r.as_str())
            .and_then(Role::parse)
    };

    from_metadata(&claims.app_metadata)
        .or_else(|| from_metadata(&claims.user_metadata))
        .or_else(|| claims.role.as_deref().and_then(Role::parse))
        .map(|role| role.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{JwtTestUtils, TestUser};
    use assert_matches::assert_matches;

    const SECRET: &str = "unit-test-secret";

    #[test]
    fn accepts_signed_token_and_normalises_role() {
        let patient = TestUser::new("p@example.com", "user");
        let token = JwtTestUtils::create_test_token(&patient, SECRET, Some(1));

        let user = validate_token(&token, SECRET).unwrap();
        assert_eq!(user.id, patient.id);
        assert_eq!(user.role.as_deref(), Some("patient"));
    }

    #[test]
    fn rejects_wrong_signature_and_expiry() {
        let doctor = TestUser::doctor("d@example.com");

        let forged = JwtTestUtils::create_invalid_signature_token(&doctor);
        assert_matches!(validate_token(&forged, SECRET), Err(TokenError::BadSignature));

        let expired = JwtTestUtils::create_expired_token(&doctor, SECRET);
        assert_matches!(validate_token(&expired, SECRET), Err(TokenError::Expired));

        assert_matches!(validate_token("a.b", SECRET), Err(TokenError::Malformed));
        assert_matches!(validate_token("a.b.c", ""), Err(TokenError::MissingSecret));
    }
}
