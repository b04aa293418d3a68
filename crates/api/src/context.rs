use catalog_auth::Principal;

/// Principal context for a request (authenticated caller).
///
/// Only inserted for requests that passed the auth middleware, and only when
/// the token carried an email claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalContext {
    subject: String,
    email: String,
}

impl PrincipalContext {
    pub fn new(subject: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            email: email.into(),
        }
    }

    /// `None` when the principal has no email.
    pub fn from_principal(principal: Principal) -> Option<Self> {
        let email = principal.email()?.to_string();
        Some(Self::new(principal.subject(), email))
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Stamped into `last_updated_by` and event `userId`.
    pub fn email(&self) -> &str {
        &self.email
    }
}
