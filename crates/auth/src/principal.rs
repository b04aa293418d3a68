use crate::JwtClaims;

/// An authenticated caller, derived from verified claims.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    subject: String,
    email: Option<String>,
}

impl Principal {
    pub fn new(subject: impl Into<String>, email: Option<String>) -> Self {
        Self {
            subject: subject.into(),
            email,
        }
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Email used to stamp `last_updated_by` and event `userId`.
    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }
}

impl From<JwtClaims> for Principal {
    fn from(claims: JwtClaims) -> Self {
        let email = claims.email().map(str::to_string);
        Self::new(claims.sub, email)
    }
}
