//! Credential state, login and logout
//!
//! A login is two calls: the credential exchange that yields the API key and
//! the panel/user documents, then the claims call that yields the OAuth token.
//! Both tokens are stamped with the session generation they were obtained on
//! and are only ever sent on that session.

use crate::client::executor::transport_error;
use crate::client::inner::ClientInner;
use crate::client::response::ApiResponse;
use crate::client::session::Session;
use crate::client::urls;
use crate::error::{AbodeError, Result, MFA_CODE_REQUIRED, UNKNOWN_MFA_TYPE};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

/// Header carrying the API key on every authenticated call
pub const API_KEY_HEADER: &str = "ABODE-API-KEY";

const MFA_TYPE_AUTHENTICATOR: &str = "google_authenticator";

/// Tokens valid for one session generation
#[derive(Clone)]
pub(crate) struct AuthTokens {
    pub(crate) api_key: String,
    pub(crate) oauth: Option<String>,
}

/// Credentials and account documents from the last login
#[derive(Default)]
pub(crate) struct AuthState {
    token: Option<String>,
    oauth_token: Option<String>,
    generation: Option<u64>,
    pub(crate) panel: Option<Value>,
    pub(crate) user: Option<Value>,
}

impl AuthState {
    /// Tokens usable on the given session generation
    pub(crate) fn tokens_for(&self, generation: u64) -> Option<AuthTokens> {
        if self.generation != Some(generation) {
            return None;
        }
        self.token.as_ref().map(|api_key| AuthTokens {
            api_key: api_key.clone(),
            oauth: self.oauth_token.clone(),
        })
    }

    pub(crate) fn has_token(&self) -> bool {
        self.token.is_some()
    }

    pub(crate) fn clear_tokens(&mut self) {
        self.token = None;
        self.oauth_token = None;
        self.generation = None;
    }

    /// Forget everything, returning the API key that was held
    pub(crate) fn clear(&mut self) -> Option<String> {
        let token = self.token.take();
        self.clear_tokens();
        self.panel = None;
        self.user = None;
        token
    }
}

/// Turn a non-2xx login or claims answer into an error
fn login_failure(response: &ApiResponse) -> AbodeError {
    let status = response.status().as_u16();
    let message = response.best_message();
    if status == 429 {
        return AbodeError::rate_limit(message, response.retry_after());
    }
    AbodeError::authentication_status(status, message)
}

impl ClientInner {
    /// Log in, waiting for any login already in flight
    pub(crate) async fn login_serialized(&self, mfa_code: Option<&str>) -> Result<()> {
        let _guard = self.login_lock.lock().await;
        self.login_locked(mfa_code).await
    }

    /// Log in unless another task already produced tokens for the live
    /// session while this one waited for the lock
    async fn login_if_needed(&self, generation: u64) -> Result<()> {
        let _guard = self.login_lock.lock().await;
        if let Some(current) = self.sessions.generation().await {
            if self.auth.read().await.tokens_for(current).is_some() {
                debug!(generation, current, "Login already completed by another task");
                return Ok(());
            }
        }
        self.login_locked(None).await
    }

    /// Session plus tokens that belong to it, logging in when needed
    pub(crate) async fn authorized_session(&self) -> Result<(Session, AuthTokens)> {
        for _ in 0..3 {
            let session = self.ready_session().await?;
            if let Some(tokens) = self.auth.read().await.tokens_for(session.generation()) {
                return Ok((session, tokens));
            }
            self.login_if_needed(session.generation()).await?;
        }
        Err(AbodeError::authentication(
            "Session was replaced repeatedly while logging in",
        ))
    }

    /// Must be called with `login_lock` held
    async fn login_locked(&self, mfa_code: Option<&str>) -> Result<()> {
        let username = self.credentials.username.trim();
        let password = &self.credentials.password;
        if username.is_empty() {
            return Err(AbodeError::authentication("Username is required"));
        }
        if password.is_empty() {
            return Err(AbodeError::authentication("Password is required"));
        }

        let session = self.initialized_session().await?;
        self.auth.write().await.clear_tokens();

        let uuid = self.identity.read().await.uuid.clone();
        let mut payload = json!({
            "id": username,
            "password": password,
            "uuid": uuid,
        });
        if let Some(code) = mfa_code {
            payload["mfa_code"] = json!(code);
            payload["remember_me"] = json!(1);
        }

        debug!(generation = session.generation(), mfa = mfa_code.is_some(), "Logging in");

        let response = {
            let _permit = session.acquire().await?;
            let response = session
                .http()
                .post(self.config.endpoint(urls::LOGIN)?)
                .json(&payload)
                .send()
                .await
                .map_err(transport_error)?;
            ApiResponse::from_response(response).await?
        };
        if !response.is_success() {
            let error = login_failure(&response);
            warn!(status = response.status().as_u16(), "Login refused: {error}");
            return Err(error);
        }

        let body = response
            .as_json()
            .map_err(|_| AbodeError::api("Login response was not JSON"))?;

        if let Some(mfa_type) = body.get("mfa_type").and_then(Value::as_str) {
            if mfa_type == MFA_TYPE_AUTHENTICATOR {
                return Err(AbodeError::authentication(MFA_CODE_REQUIRED));
            }
            return Err(AbodeError::authentication(UNKNOWN_MFA_TYPE));
        }

        let token = body
            .get("token")
            .and_then(Value::as_str)
            .ok_or_else(|| AbodeError::api("Login response missing token"))?
            .to_string();
        let panel = body
            .get("panel")
            .cloned()
            .ok_or_else(|| AbodeError::api("Login response missing panel"))?;
        let user = body
            .get("user")
            .cloned()
            .ok_or_else(|| AbodeError::api("Login response missing user"))?;

        let oauth_token = self.fetch_oauth_token(&session, &token).await?;

        // a recreation while this login was in flight invalidates its tokens
        if self.sessions.generation().await != Some(session.generation()) {
            return Err(AbodeError::authentication(
                "Session was replaced while logging in",
            ));
        }

        if let Some(cms) = panel.pointer("/attributes/cms").and_then(Value::as_object) {
            self.settings.seed(cms).await;
        }

        {
            let mut auth = self.auth.write().await;
            auth.token = Some(token);
            auth.oauth_token = Some(oauth_token);
            auth.generation = Some(session.generation());
            auth.panel = Some(panel.clone());
            auth.user = Some(user);
        }
        self.cache.write().await.panel = Some(panel);
        self.health.write().await.record_auth();
        self.remember_login().await;

        info!(generation = session.generation(), "Login successful");
        Ok(())
    }

    async fn fetch_oauth_token(&self, session: &Session, api_key: &str) -> Result<String> {
        let response = {
            let _permit = session.acquire().await?;
            let response = session
                .http()
                .get(self.config.endpoint(urls::OAUTH_TOKEN)?)
                .header(API_KEY_HEADER, api_key)
                .send()
                .await
                .map_err(transport_error)?;
            ApiResponse::from_response(response).await?
        };
        if !response.is_success() {
            return Err(login_failure(&response));
        }

        response
            .as_json()
            .ok()
            .and_then(|v| v.get("access_token").and_then(Value::as_str).map(str::to_string))
            .ok_or_else(|| AbodeError::api("Claims response missing access_token"))
    }

    /// Stamp the identity and persist it when a path is configured
    async fn remember_login(&self) {
        let mut identity = self.identity.write().await;
        identity.mark_login();
        if let Some(path) = &self.config.identity_path {
            if let Err(e) = identity.save(path) {
                warn!(path = %path.display(), "Failed to persist client identity: {e}");
            }
        }
    }

    /// Fresh login after a failed attempt
    pub(crate) async fn relogin(&self) -> Result<()> {
        self.auth.write().await.clear_tokens();
        self.login_serialized(None).await
    }

    /// End the server-side session. Local state is cleared first, so the
    /// client is logged out even when the call fails.
    pub(crate) async fn logout(&self) -> Result<()> {
        let token = {
            let _guard = self.login_lock.lock().await;
            self.auth.write().await.clear()
        };
        {
            let mut cache = self.cache.write().await;
            cache.panel = None;
            cache.devices = None;
            cache.automations = None;
        }
        self.settings.invalidate().await;

        let Some(token) = token else {
            debug!("Logout requested without an active login");
            return Ok(());
        };
        let Some(session) = self.sessions.current().await else {
            return Ok(());
        };

        let result = async {
            let _permit = session.acquire().await?;
            let response = session
                .http()
                .post(self.config.endpoint(urls::LOGOUT)?)
                .header(API_KEY_HEADER, token.as_str())
                .send()
                .await
                .map_err(transport_error)?;
            ApiResponse::from_response(response).await
        }
        .await;

        self.health
            .write()
            .await
            .set_status(crate::client::diagnostics::ConnectionStatus::Disconnected, None);

        match result {
            Ok(response) if response.is_success() => {
                info!("Logout successful");
                Ok(())
            }
            Ok(response) => Err(AbodeError::authentication_status(
                response.status().as_u16(),
                response.best_message(),
            )),
            Err(e) if e.is_connection_error() => {
                warn!("Logout request failed, local state already cleared: {e}");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}
