//! Session token persistence and the account flows around it.
//!
//! Input problems are caught locally and never reach the network; service
//! failures become error notifications carrying the service's message.

mod token_store;

use std::sync::LazyLock;

use regex::Regex;

use crate::{
    api::{ApiClient, RegisterRequest},
    navigation::Route,
    notification::{Notification, NotificationQueue},
};

pub use token_store::{MemoryTokenStore, SessionTokenStore, SessionTokenStoreError, TokenStore};

const MIN_PASSWORD_LEN: usize = 6;

static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email regex must compile")
});

/// Client-side problems with account form input.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum CredentialIssue {
    #[error("Please fill in all fields")]
    MissingFields,
    #[error("Please enter a valid email address")]
    InvalidEmail,
    #[error("Passwords do not match")]
    PasswordMismatch,
    #[error("passwords must match")]
    ResetPasswordMismatch,
    #[error("password must be 6 chars at least")]
    PasswordTooShort,
    #[error("Please enter a pin")]
    MissingPin,
}

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_PATTERN.is_match(email)
}

fn check_login_input(email: &str, password: &str) -> Result<(), CredentialIssue> {
    if email.is_empty() || password.is_empty() {
        return Err(CredentialIssue::MissingFields);
    }
    if !is_valid_email(email) {
        return Err(CredentialIssue::InvalidEmail);
    }
    Ok(())
}

fn check_register_input(
    email: &str,
    password: &str,
    confirm: &str,
) -> Result<(), CredentialIssue> {
    if email.is_empty() || password.is_empty() || confirm.is_empty() {
        return Err(CredentialIssue::MissingFields);
    }
    if !is_valid_email(email) {
        return Err(CredentialIssue::InvalidEmail);
    }
    if password != confirm {
        return Err(CredentialIssue::PasswordMismatch);
    }
    Ok(())
}

fn check_reset_input(password: &str, confirm: &str) -> Result<(), CredentialIssue> {
    if password.is_empty() || password != confirm {
        return Err(CredentialIssue::ResetPasswordMismatch);
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(CredentialIssue::PasswordTooShort);
    }
    Ok(())
}

/// Drives login, registration and password reset against the auth service.
///
/// Each operation returns the route to navigate to on success, `None` when
/// the user stays on the current view (a notification explains why).
pub struct SessionController<S: TokenStore = SessionTokenStore> {
    api: ApiClient,
    store: S,
    notifications: NotificationQueue,
}

impl<S: TokenStore> SessionController<S> {
    pub fn new(api: ApiClient, store: S) -> Self {
        Self {
            api,
            store,
            notifications: NotificationQueue::default(),
        }
    }

    pub fn notifications(&mut self) -> &mut NotificationQueue {
        &mut self.notifications
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Currently persisted bearer token, if any.
    pub fn token(&self) -> Option<String> {
        match self.store.get() {
            Ok(token) => token,
            Err(err) => {
                tracing::warn!("Reading session token failed: {err}");
                None
            }
        }
    }

    pub fn login(&mut self, email: &str, password: &str) -> Option<Route> {
        if let Err(issue) = check_login_input(email, password) {
            self.notifications.push(Notification::error(issue.to_string()));
            return None;
        }
        let response = match self.api.login(email, password) {
            Ok(response) => response,
            Err(err) => {
                tracing::info!("Login rejected: {err}");
                self.notifications
                    .push(Notification::error(err.user_message("Login failed")));
                return None;
            }
        };
        if let Err(err) = self.store.set(&response.token) {
            self.notifications
                .push(Notification::error(format!("Failed to save session: {err}")));
            return None;
        }
        tracing::info!("Logged in");
        self.notifications
            .push(Notification::success("Login successful!"));
        Some(Route::Home)
    }

    pub fn register(
        &mut self,
        name: &str,
        email: &str,
        password: &str,
        confirm: &str,
    ) -> Option<Route> {
        if let Err(issue) = check_register_input(email, password, confirm) {
            self.notifications.push(Notification::error(issue.to_string()));
            return None;
        }
        let request = RegisterRequest {
            name: name.to_string(),
            email: email.to_string(),
            password: password.to_string(),
        };
        match self.api.register(&request) {
            Ok(()) => {
                self.notifications.push(Notification::success(
                    "Registration successful! Redirecting to login...",
                ));
                Some(Route::Login)
            }
            Err(err) => {
                self.notifications
                    .push(Notification::error(err.user_message("Registration failed")));
                None
            }
        }
    }

    pub fn check_email_exists(&mut self, email: &str) -> Option<bool> {
        match self.api.check_email_exists(email) {
            Ok(exists) => Some(exists),
            Err(err) => {
                self.notifications.push(Notification::error(
                    err.user_message("Failed to check email"),
                ));
                None
            }
        }
    }

    /// Ask the service to email a reset PIN; the service reply is shown as info.
    pub fn request_reset_pin(&mut self, email: &str) -> bool {
        match self.api.forgot_password(email) {
            Ok(message) => {
                self.notifications.push(Notification::info(message));
                true
            }
            Err(err) => {
                self.notifications.push(Notification::error(
                    err.user_message("Failed to send reset pin"),
                ));
                false
            }
        }
    }

    pub fn confirm_pin(&mut self, email: &str, pin: &str) -> Option<Route> {
        if pin.trim().is_empty() {
            self.notifications
                .push(Notification::error(CredentialIssue::MissingPin.to_string()));
            return None;
        }
        match self.api.confirm_pin(email, pin.trim()) {
            Ok(true) => Some(Route::ResetPassword),
            Ok(false) => {
                self.notifications.push(Notification::error("Invalid pin"));
                None
            }
            Err(err) => {
                self.notifications
                    .push(Notification::error(err.user_message("Invalid pin")));
                None
            }
        }
    }

    pub fn reset_password(
        &mut self,
        email: &str,
        pin: &str,
        password: &str,
        confirm: &str,
    ) -> Option<Route> {
        if let Err(issue) = check_reset_input(password, confirm) {
            self.notifications.push(Notification::error(issue.to_string()));
            return None;
        }
        match self.api.reset_password(email, pin, password) {
            Ok(message) => {
                self.notifications.push(Notification::success(message));
                Some(Route::Login)
            }
            Err(err) => {
                self.notifications.push(Notification::error(
                    err.user_message("Failed to reset password"),
                ));
                None
            }
        }
    }

    /// Forget the stored token and return to the login view.
    pub fn logout(&mut self) -> Route {
        if let Err(err) = self.store.delete() {
            tracing::warn!("Clearing session token failed: {err}");
        }
        Route::Login
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_pattern_matches_simple_addresses() {
        assert!(is_valid_email("a@b.com"));
        assert!(!is_valid_email("a@b"));
        assert!(!is_valid_email("a b@c.com"));
        assert!(!is_valid_email("@b.com"));
    }

    #[test]
    fn login_input_checks_run_in_order() {
        assert_eq!(
            check_login_input("", "x"),
            Err(CredentialIssue::MissingFields)
        );
        assert_eq!(
            check_login_input("nope", "x"),
            Err(CredentialIssue::InvalidEmail)
        );
        assert_eq!(check_login_input("a@b.com", "x"), Ok(()));
    }

    #[test]
    fn register_requires_matching_passwords() {
        assert_eq!(
            check_register_input("a@b.com", "secret", "secreT"),
            Err(CredentialIssue::PasswordMismatch)
        );
    }

    #[test]
    fn reset_requires_six_characters() {
        assert_eq!(
            check_reset_input("abc", "abc"),
            Err(CredentialIssue::PasswordTooShort)
        );
        assert_eq!(
            check_reset_input("abcdef", "abcdeg"),
            Err(CredentialIssue::ResetPasswordMismatch)
        );
        assert_eq!(check_reset_input("abcdef", "abcdef"), Ok(()));
    }

    #[test]
    fn invalid_input_never_calls_the_service() {
        let api = ApiClient::new("http://127.0.0.1:9");
        let mut controller = SessionController::new(api, MemoryTokenStore::default());
        assert_eq!(controller.login("", ""), None);
        let notes = controller.notifications().drain();
        assert_eq!(notes[0].message, "Please fill in all fields");
        assert_eq!(controller.token(), None);
    }

    #[test]
    fn logout_clears_token() {
        let api = ApiClient::new("http://127.0.0.1:9");
        let store = MemoryTokenStore::default();
        store.set("T").unwrap();
        let mut controller = SessionController::new(api, store);
        assert_eq!(controller.logout(), Route::Login);
        assert_eq!(controller.token(), None);
    }
}
