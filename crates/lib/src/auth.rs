//! Account flows: login, register, logout.

use crate::api::{ApiError, Backend, RegisteredUser};
use crate::forms::{LoginForm, RegisterForm, ValidationError};
use crate::session::{Session, SessionError, SessionStore};

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("login response did not include a user id")]
    MissingUserId,
    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Exchange credentials for a token and store the session.
pub async fn login(
    backend: &dyn Backend,
    store: &SessionStore,
    form: &LoginForm,
) -> Result<Session, AuthError> {
    let (username, password) = form.validate()?;
    let res = backend.login(&username, &password).await?;
    let user_id = res.id.ok_or(AuthError::MissingUserId)?;
    let session = Session {
        token: res.access_token,
        user_id,
        username: res.username.filter(|u| !u.is_empty()).unwrap_or(username),
    };
    store.set(session.clone())?;
    log::info!("signed in as {} (id {})", session.username, session.user_id);
    Ok(session)
}

/// Create an account. Does not sign in.
pub async fn register(backend: &dyn Backend, form: &RegisterForm) -> Result<RegisteredUser, AuthError> {
    let request = form.validate()?;
    let user = backend.register(&request).await?;
    log::info!("registered {}", request.username);
    Ok(user)
}

/// Forget the stored session.
pub fn logout(store: &SessionStore) -> Result<(), SessionError> {
    if let Some(name) = store.username() {
        log::info!("signing out {}", name);
    }
    store.clear()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeBackend;

    fn form(username: &str, password: &str) -> LoginForm {
        LoginForm {
            username: username.to_string(),
            password: password.to_string(),
        }
    }

    #[tokio::test]
    async fn login_stores_session() {
        let backend = FakeBackend::new();
        let store = SessionStore::in_memory();
        let session = login(&backend, &store, &form("ana", "Secret123")).await.unwrap();
        assert_eq!(session.user_id, 1);
        assert_eq!(store.username().as_deref(), Some("ana"));
        assert_eq!(store.token().as_deref(), Some("token-ana"));

        logout(&store).unwrap();
        assert!(!store.is_signed_in());
    }

    #[tokio::test]
    async fn bad_credentials_do_not_touch_store() {
        let backend = FakeBackend::new();
        let store = SessionStore::in_memory();
        let err = login(&backend, &store, &form("ana", "wrong")).await.unwrap_err();
        match err {
            AuthError::Api(ApiError::RequestFailed { status, reason }) => {
                assert_eq!(status, 401);
                assert_eq!(reason, "Incorrect username or password");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!store.is_signed_in());
    }

    #[tokio::test]
    async fn invalid_form_makes_no_request() {
        let backend = FakeBackend::new();
        let store = SessionStore::in_memory();
        let err = login(&backend, &store, &form("", "x")).await.unwrap_err();
        assert!(matches!(err, AuthError::Invalid(ValidationError::Required("username"))));
        assert_eq!(backend.calls(), 0);
    }

    #[tokio::test]
    async fn register_validates_then_calls_backend() {
        let backend = FakeBackend::new();
        let form = RegisterForm {
            username: "bruno".to_string(),
            full_name: "Bruno".to_string(),
            email: "bruno@example.com".to_string(),
            password: "Passw0rd".to_string(),
            confirm_password: "Passw0rd".to_string(),
        };
        let user = register(&backend, &form).await.unwrap();
        assert_eq!(user.username, "bruno");
        assert_eq!(backend.calls(), 1);
    }
}
