use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};

use crate::{JwtClaims, TokenValidationError};

/// Verifies a raw bearer token and returns its claims.
pub trait JwtValidator: Send + Sync {
    fn validate(&self, token: &str) -> Result<JwtClaims, TokenValidationError>;
}

/// HMAC-SHA256 validator with issuer and audience checks.
///
/// Empty `issuer`/`audience` disable the corresponding check.
pub struct Hs256JwtValidator {
    key: DecodingKey,
    validation: Validation,
}

impl Hs256JwtValidator {
    pub fn new(secret: &[u8], issuer: Option<&str>, audience: Option<&str>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 30;

        match audience.filter(|a| !a.is_empty()) {
            Some(aud) => validation.set_audience(&[aud]),
            None => validation.validate_aud = false,
        }
        if let Some(iss) = issuer.filter(|i| !i.is_empty()) {
            validation.set_issuer(&[iss]);
        }

        Self {
            key: DecodingKey::from_secret(secret),
            validation,
        }
    }
}

impl core::fmt::Debug for Hs256JwtValidator {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Hs256JwtValidator")
            .field("iss", &self.validation.iss)
            .field("aud", &self.validation.aud)
            .finish_non_exhaustive()
    }
}

impl JwtValidator for Hs256JwtValidator {
    fn validate(&self, token: &str) -> Result<JwtClaims, TokenValidationError> {
        decode::<JwtClaims>(token, &self.key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!(error = %e, "bearer token rejected");
                match e.kind() {
                    ErrorKind::ExpiredSignature => TokenValidationError::Expired,
                    ErrorKind::InvalidSignature => TokenValidationError::InvalidSignature,
                    ErrorKind::InvalidAudience => TokenValidationError::InvalidAudience,
                    ErrorKind::InvalidIssuer => TokenValidationError::InvalidIssuer,
                    _ => TokenValidationError::Malformed(e.to_string()),
                }
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Audience;
    use chrono::{Duration, Utc};
    use jsonwebtoken::{EncodingKey, Header, encode};

    const SECRET: &[u8] = b"test-secret";

    fn claims(minutes: i64) -> JwtClaims {
        let now = Utc::now();
        JwtClaims {
            sub: "user-1".to_string(),
            email: Some("user@example.com".to_string()),
            iss: Some("https://auth.example.com/realms/catalog".to_string()),
            aud: Some(Audience::One("catalog-api".to_string())),
            exp: (now + Duration::minutes(minutes)).timestamp(),
            iat: Some(now.timestamp()),
            scope: None,
        }
    }

    fn mint(claims: &JwtClaims, secret: &[u8]) -> String {
        encode(&Header::new(Algorithm::HS256), claims, &EncodingKey::from_secret(secret)).unwrap()
    }

    fn validator() -> Hs256JwtValidator {
        Hs256JwtValidator::new(
            SECRET,
            Some("https://auth.example.com/realms/catalog"),
            Some("catalog-api"),
        )
    }

    #[test]
    fn accepts_well_formed_token() {
        let token = mint(&claims(10), SECRET);
        let decoded = validator().validate(&token).unwrap();
        assert_eq!(decoded.email(), Some("user@example.com"));
    }

    #[test]
    fn rejects_expired_token() {
        let token = mint(&claims(-10), SECRET);
        assert_eq!(validator().validate(&token), Err(TokenValidationError::Expired));
    }

    #[test]
    fn rejects_wrong_secret() {
        let token = mint(&claims(10), b"other-secret");
        assert_eq!(
            validator().validate(&token),
            Err(TokenValidationError::InvalidSignature)
        );
    }

    #[test]
    fn rejects_foreign_audience() {
        let mut c = claims(10);
        c.aud = Some(Audience::Many(vec!["billing".to_string()]));
        let token = mint(&c, SECRET);
        assert_eq!(
            validator().validate(&token),
            Err(TokenValidationError::InvalidAudience)
        );
    }

    #[test]
    fn issuer_check_can_be_disabled() {
        let mut c = claims(10);
        c.iss = Some("https://elsewhere".to_string());
        let token = mint(&c, SECRET);

        assert_eq!(validator().validate(&token), Err(TokenValidationError::InvalidIssuer));
        assert!(Hs256JwtValidator::new(SECRET, None, Some("catalog-api")).validate(&token).is_ok());
    }

    #[test]
    fn blank_email_claim_counts_as_missing() {
        let mut c = claims(10);
        c.email = Some("  ".to_string());
        assert_eq!(c.email(), None);
    }
}
