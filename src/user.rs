//! The signed-in caller.
//!
//! Authentication itself happens upstream; presence of an `AuthenticatedUser`
//! is the pass/fail contract the wizard relies on.

use secrecy::{ExposeSecret, SecretString};

#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub id: String,
    pub email: String,
    pub display_name: Option<String>,
    access_token: SecretString,
}

impl AuthenticatedUser {
    pub fn new(
        id: impl Into<String>,
        email: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
            display_name: None,
            access_token: SecretString::from(access_token.into()),
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Name used to greet the user, falling back to the email local part.
    pub fn greeting_name(&self) -> &str {
        match self.display_name.as_deref() {
            Some(name) if !name.trim().is_empty() => name,
            _ => self.email.split('@').next().unwrap_or(&self.email),
        }
    }

    /// Bearer token forwarded to the backing services.
    pub fn bearer_token(&self) -> &str {
        self.access_token.expose_secret()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn greeting_falls_back_to_email() {
        let user = AuthenticatedUser::new("u1", "jane@example.com", "tok");
        assert_eq!(user.greeting_name(), "jane");

        let named = user.with_display_name("Jane Doe");
        assert_eq!(named.greeting_name(), "Jane Doe");
    }

    #[test]
    fn debug_does_not_leak_token() {
        let user = AuthenticatedUser::new("u1", "jane@example.com", "very-secret-token");
        let debug = format!("{user:?}");
        assert!(!debug.contains("very-secret-token"));
        assert_eq!(user.bearer_token(), "very-secret-token");
    }
}
