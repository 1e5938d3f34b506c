use serde_json::{Map, Value};
use service_core::error::AppError;
use std::sync::Arc;

use uuid::Uuid;

use crate::{
    config::{SuperUserConfig, UrlConfig},
    dtos::auth::{RegisterRequest, TokenResponse},
    models::{NewUser, Role, SecurityToken, TokenType, User},
    services::{EmailProvider, TokenClaims, TokenService, UserDirectory},
    utils::{hash_fingerprint, hash_password, verify_password, Password},
};

/// Credential flows: login, refresh, logout, invitation, registration and
/// password management.
#[derive(Clone)]
pub struct AuthService {
    directory: Arc<dyn UserDirectory>,
    tokens: TokenService,
    email: Arc<dyn EmailProvider>,
    urls: UrlConfig,
}

impl AuthService {
    pub fn new(
        directory: Arc<dyn UserDirectory>,
        tokens: TokenService,
        email: Arc<dyn EmailProvider>,
        urls: UrlConfig,
    ) -> Self {
        Self {
            directory,
            tokens,
            email,
            urls,
        }
    }

    pub async fn login(
        &self,
        domain: &str,
        email: &str,
        password: &str,
    ) -> Result<TokenResponse, AppError> {
        let user = self.directory.find_user(domain, email).await?;

        // Same error for unknown users and wrong passwords.
        let user = match user {
            Some(user) if verify_password(&Password::new(password), &user.password_hash) => user,
            _ => {
                tracing::warn!(domain = %domain, "Login failed");
                return Err(AppError::Unauthorized(anyhow::anyhow!(
                    "Invalid email or password"
                )));
            }
        };

        if user.role.is_none() {
            return Err(AppError::Forbidden(anyhow::anyhow!(
                "User has no role assigned"
            )));
        }

        let (refresh_token, refresh_id) = self.tokens.issue_refresh(&user).await?;
        let access_token = self.tokens.issue_access(&user, refresh_id).await?;

        tracing::info!(user_id = %user.id, domain = %user.domain, "User logged in");
        Ok(self.token_response(access_token, refresh_token))
    }

    /// Issue a new access token bound to the same refresh token.
    ///
    /// The refresh token is revoked if its user is gone or has changed role.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, AppError> {
        let record = self.tokens.validate(refresh_token, TokenType::Refresh).await?;
        let claims = match self.tokens.decode_claims(refresh_token)? {
            TokenClaims::Refresh(claims) => claims,
            other => {
                return Err(AppError::InvalidToken(anyhow::anyhow!(
                    "Expected refresh claims, got {}",
                    other.scope()
                )))
            }
        };

        let user = match record.user_id {
            Some(user_id) => self.directory.find_user_by_id(user_id).await?,
            None => None,
        };

        let user = match user {
            Some(user)
                if user
                    .role
                    .as_ref()
                    .is_some_and(|r| r.name == claims.role && r.domain == claims.role_domain) =>
            {
                user
            }
            stale => {
                tracing::warn!(
                    token_id = %record.id,
                    user_found = stale.is_some(),
                    "Refresh token no longer matches its user, revoking"
                );
                self.tokens.store().delete(Some(record)).await?;
                return Err(AppError::Unauthorized(anyhow::anyhow!(
                    "Could not validate credentials"
                )));
            }
        };

        let access_token = self.tokens.issue_access(&user, record.id).await?;
        Ok(self.token_response(access_token, refresh_token.to_string()))
    }

    pub async fn logout(&self, access_token: &str) -> Result<(), AppError> {
        if !self.tokens.revoke_pair(access_token).await? {
            return Err(AppError::Unauthorized(anyhow::anyhow!("Logout failed")));
        }
        Ok(())
    }

    pub async fn invite(&self, domain: &str, email: &str, role_name: &str) -> Result<(), AppError> {
        let email = email.trim().to_lowercase();

        if self.directory.find_user(domain, &email).await?.is_some() {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "User {} already exists in domain {}",
                email,
                domain
            )));
        }

        let role = self
            .directory
            .find_role(domain, role_name)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Role not found")))?;

        let mut data = Map::new();
        data.insert("sub".to_string(), Value::from(email.clone()));
        data.insert("domain".to_string(), Value::from(domain));
        data.insert("role".to_string(), Value::from(role.name.clone()));

        let record = self
            .tokens
            .issue_email_token(TokenType::Invitation, data, self.tokens.invitation_ttl(), None)
            .await?;

        let sent = self
            .email
            .send_invitation_email(&email, &record.token, &self.urls.register)
            .await;
        self.discard_on_failure(record, sent).await?;

        tracing::info!(domain = %domain, role = %role.name, "Invitation sent");
        Ok(())
    }

    /// Create the invited user. The invitation token is spent on success.
    pub async fn register(&self, token: &str, req: RegisterRequest) -> Result<User, AppError> {
        let record = self.tokens.validate(token, TokenType::Invitation).await?;
        let claims = match self.tokens.decode_claims(token)? {
            TokenClaims::Invitation(claims) => claims,
            other => {
                return Err(AppError::InvalidToken(anyhow::anyhow!(
                    "Expected invitation claims, got {}",
                    other.scope()
                )))
            }
        };

        let missing_claim =
            |name: &str| AppError::Unprocessable(anyhow::anyhow!("Invitation lacks '{}'", name));
        let invited = claims.get_str("sub").ok_or_else(|| missing_claim("sub"))?;
        let domain = claims.get_str("domain").ok_or_else(|| missing_claim("domain"))?;
        let role_name = claims.get_str("role").ok_or_else(|| missing_claim("role"))?;

        if !invited.eq_ignore_ascii_case(req.email.trim()) {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Email does not match the invitation"
            )));
        }

        let role = self
            .directory
            .find_role(domain, role_name)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Role not found")))?;

        let password_hash = hash_password(&Password::new(req.password))?;
        let mut new_user = NewUser::new(&req.email, domain, password_hash, Some(role.id));
        new_user.first_name = req.first_name;
        new_user.last_name = req.last_name;
        new_user.phone = req.phone;

        let user = self.directory.create_user(new_user).await?;
        self.tokens.store().delete(Some(record)).await?;

        if let Err(e) = self
            .email
            .send_welcome_email(&user.email, &self.urls.login)
            .await
        {
            tracing::warn!(user_id = %user.id, error = %e, "Welcome email not sent");
        }

        tracing::info!(user_id = %user.id, domain = %user.domain, "User registered");
        Ok(user)
    }

    pub async fn forgot_password(&self, domain: &str, email: &str) -> Result<(), AppError> {
        let user = self
            .directory
            .find_user(domain, email)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("User not found")))?;

        let mut data = Map::new();
        data.insert("sub".to_string(), Value::from(user.email.clone()));
        data.insert("domain".to_string(), Value::from(user.domain.clone()));
        data.insert(
            "key".to_string(),
            Value::from(hash_fingerprint(&user.password_hash)),
        );

        let record = self
            .tokens
            .issue_email_token(TokenType::Reset, data, self.tokens.reset_ttl(), Some(user.id))
            .await?;

        let sent = self
            .email
            .send_password_reset_email(&user.email, &record.token, &self.urls.reset_password)
            .await;
        self.discard_on_failure(record, sent).await?;

        tracing::info!(user_id = %user.id, "Password reset requested");
        Ok(())
    }

    /// Set a new password from a reset token and revoke every token of the user.
    ///
    /// The token is bound to the password it was issued against, so it cannot
    /// be replayed after a successful reset.
    pub async fn reset_password(&self, token: &str, password: &str) -> Result<(), AppError> {
        let record = self.tokens.validate(token, TokenType::Reset).await?;
        let claims = match self.tokens.decode_claims(token)? {
            TokenClaims::Reset(claims) => claims,
            other => {
                return Err(AppError::InvalidToken(anyhow::anyhow!(
                    "Expected reset claims, got {}",
                    other.scope()
                )))
            }
        };

        let user = match record.user_id {
            Some(user_id) => self.directory.find_user_by_id(user_id).await?,
            None => None,
        }
        .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("User not found")))?;

        if claims.get_str("key") != Some(hash_fingerprint(&user.password_hash).as_str()) {
            return Err(AppError::InvalidToken(anyhow::anyhow!(
                "Reset token no longer valid"
            )));
        }

        self.set_password(&user, password).await?;
        tracing::info!(user_id = %user.id, "Password reset");
        Ok(())
    }

    pub async fn change_password(
        &self,
        domain: &str,
        email: &str,
        current_password: &str,
        new_password: &str,
    ) -> Result<User, AppError> {
        let user = self
            .directory
            .find_user(domain, email)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("User {} not found", email)))?;

        if !verify_password(&Password::new(current_password), &user.password_hash) {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Current password is incorrect"
            )));
        }

        self.set_password(&user, new_password).await?;
        tracing::info!(user_id = %user.id, "Password changed");
        Ok(user)
    }

    /// Make sure the super admin role exists and, when credentials are
    /// configured, that its account exists with them. Safe to run on every start.
    ///
    /// An existing account is moved back onto the role and its password reset
    /// to the configured one, revoking its tokens.
    pub async fn ensure_super_user(
        &self,
        config: &SuperUserConfig,
    ) -> Result<Option<User>, AppError> {
        let role = match self.directory.find_role(&config.domain, &config.role).await? {
            Some(role) => role,
            None => {
                let role = Role {
                    id: Uuid::new_v4(),
                    name: config.role.clone(),
                    domain: config.domain.clone(),
                    title: Some("Super admin".to_string()),
                    permissions: Vec::new(),
                };
                self.directory.create_role(&role).await?;
                tracing::info!(role = %role.name, domain = %role.domain, "Super admin role created");
                role
            }
        };

        let (Some(email), Some(password)) = (&config.email, &config.password) else {
            tracing::warn!("No super admin credentials configured, skipping account setup");
            return Ok(None);
        };

        let user = match self.directory.find_user(&config.domain, email).await? {
            None => {
                let password_hash = hash_password(&Password::new(password.clone()))?;
                let user = self
                    .directory
                    .create_user(NewUser::new(email, &config.domain, password_hash, Some(role.id)))
                    .await?;
                tracing::info!(user_id = %user.id, "Super admin account created");
                return Ok(Some(user));
            }
            Some(user) => user,
        };

        if user.role.as_ref().map(|r| r.id) != Some(role.id) {
            self.directory.assign_role(user.id, Some(role.id)).await?;
            tracing::warn!(user_id = %user.id, "Super admin account moved back onto its role");
        }
        if !verify_password(&Password::new(password.clone()), &user.password_hash) {
            self.set_password(&user, password).await?;
            tracing::warn!(user_id = %user.id, "Super admin password reset from configuration");
        }

        self.directory.find_user_by_id(user.id).await
    }

    async fn set_password(&self, user: &User, password: &str) -> Result<(), AppError> {
        let password_hash = hash_password(&Password::new(password))?;
        self.directory
            .update_password(user.id, &password_hash)
            .await?;

        let revoked = self.tokens.store().delete_all_for_user(user.id).await?;
        tracing::debug!(user_id = %user.id, revoked, "Revoked tokens after password update");
        Ok(())
    }

    /// Drop a freshly minted email token when its mail could not be sent.
    async fn discard_on_failure(
        &self,
        record: SecurityToken,
        sent: Result<(), AppError>,
    ) -> Result<(), AppError> {
        let Err(e) = sent else {
            return Ok(());
        };

        tracing::error!(
            token_type = %record.token_type,
            token_id = %record.id,
            error = %e,
            "Email delivery failed, discarding token"
        );
        if let Err(cleanup) = self.tokens.store().delete(Some(record)).await {
            tracing::error!(error = %cleanup, "Failed to discard undelivered token");
        }
        Err(e)
    }

    fn token_response(&self, access_token: String, refresh_token: String) -> TokenResponse {
        TokenResponse {
            access_token,
            refresh_token,
            token_type: "bearer".to_string(),
            expires_in: self.tokens.access_token_expire_seconds(),
        }
    }
}
