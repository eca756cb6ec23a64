use parceldesk_auth::{ApiError, ApiRequest};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::api::ParcelApi;
use crate::entities::User;
use crate::error::ClientError;
use crate::validation::{
    translate_auth_error, validate_email, validate_reset_confirmation, LoginForm, RegisterForm,
};

const LOGIN_PATH: &str = "auth/login/";
const REGISTER_PATH: &str = "auth/register/";
const LOGOUT_PATH: &str = "auth/logout/";
const PASSWORD_RESET_PATH: &str = "auth/password-reset/";
const PASSWORD_RESET_CONFIRM_PATH: &str = "auth/password-reset/confirm/";

/// Where the user goes after signing in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Landing {
    /// Warehouse staff go straight to the scanner.
    Scanner,
    Home,
}

impl Landing {
    pub fn for_user(user: Option<&User>) -> Self {
        if user.is_some_and(|user| user.is_employee) {
            Landing::Scanner
        } else {
            Landing::Home
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoginOutcome {
    pub user: Option<User>,
    pub landing: Landing,
}

impl ParcelApi {
    pub async fn login(&self, phone: &str, password: &str) -> Result<LoginOutcome, ClientError> {
        let phone = LoginForm::new(phone, password).validate()?;
        self.sign_in(&phone, password).await
    }

    /// Creates the account and signs straight into it.
    pub async fn register(&self, form: &RegisterForm) -> Result<LoginOutcome, ClientError> {
        let payload = form.validate()?;
        // A stale token from another account would turn the sign-up into a
        // refresh attempt.
        self.session().clear()?;
        self.client
            .send(ApiRequest::post(REGISTER_PATH).json(payload.clone()))
            .await?;
        info!("account registered");

        let phone = payload["phone"].as_str().unwrap_or_default().to_string();
        self.sign_in(&phone, &form.password).await
    }

    /// Tells the server to revoke the refresh token, then forgets the local
    /// session whether or not that worked.
    pub async fn logout(&self) -> Result<(), ClientError> {
        let refresh = self.session().refresh();
        let request = if refresh.is_empty() {
            ApiRequest::post(LOGOUT_PATH)
        } else {
            ApiRequest::post(LOGOUT_PATH).json(json!({ "refresh": refresh }))
        };

        if let Err(error) = self.client.send(request).await {
            warn!(%error, "logout request failed, clearing local session anyway");
        }

        self.session().clear()?;
        self.cache_user(None)?;
        info!("signed out");
        Ok(())
    }

    pub async fn request_password_reset(&self, email: &str) -> Result<(), ClientError> {
        let email = validate_email(email)?;
        self.client
            .send(ApiRequest::post(PASSWORD_RESET_PATH).json(json!({ "email": email })))
            .await?;
        info!("password reset e-mail requested");
        Ok(())
    }

    pub async fn confirm_password_reset(
        &self,
        uid: &str,
        token: &str,
        password: &str,
        confirmation: &str,
    ) -> Result<(), ClientError> {
        validate_reset_confirmation(uid, token, password, confirmation)?;
        self.client
            .send(ApiRequest::post(PASSWORD_RESET_CONFIRM_PATH).json(json!({
                "uid": uid.trim(),
                "token": token.trim(),
                "new_password": password,
            })))
            .await?;
        info!("password reset confirmed");
        Ok(())
    }

    async fn sign_in(&self, phone: &str, password: &str) -> Result<LoginOutcome, ClientError> {
        // Credentials from an earlier account must not ride along.
        self.session().clear()?;

        let request =
            ApiRequest::post(LOGIN_PATH).json(json!({ "phone": phone, "password": password }));
        let body = match self.client.send(request).await {
            Ok(response) => response.body,
            Err(source @ ApiError::Status { .. }) => {
                let detail = source.server_message().unwrap_or_default();
                return Err(ClientError::LoginRejected {
                    message: translate_auth_error(&detail).to_string(),
                    source,
                });
            }
            Err(other) => return Err(other.into()),
        };

        let session = self.session();
        session.set_access(&first_token(&body, &["access", "token", "access_token"]))?;
        session.set_refresh(&first_token(&body, &["refresh", "refresh_token"]))?;

        let user = body
            .get("user")
            .filter(|user| user.is_object())
            .and_then(|user| serde_json::from_value::<User>(user.clone()).ok());
        self.cache_user(user.as_ref())?;

        let landing = Landing::for_user(user.as_ref());
        info!(?landing, authenticated = session.is_authenticated(), "signed in");
        Ok(LoginOutcome { user, landing })
    }
}

fn first_token(body: &Value, keys: &[&str]) -> String {
    keys.iter()
        .filter_map(|key| body.get(key).and_then(Value::as_str))
        .find(|token| !token.is_empty())
        .unwrap_or_default()
        .to_string()
}
