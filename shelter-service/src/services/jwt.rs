use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use service_core::error::AppError;
use std::{str::FromStr, sync::Arc};
use uuid::Uuid;

use crate::{
    config::TokenConfig,
    models::{Role, SecurityToken, TokenType, User},
    services::TokenStore,
};

/// Claims of an access token. `rid` is the id of the refresh row it was derived from.
///
/// `domain` is the user's domain and `role_domain` the domain the role belongs
/// to; the two may differ. `jti` keeps tokens minted within the same second
/// distinct.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessClaims {
    pub sub: String,
    pub domain: String,
    pub role: String,
    pub role_domain: String,
    pub permissions: Vec<String>,
    pub rid: Uuid,
    pub jti: Uuid,
    pub iat: i64,
    pub exp: i64,
    pub scope: TokenType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefreshClaims {
    pub sub: String,
    pub domain: String,
    pub role: String,
    pub role_domain: String,
    pub permissions: Vec<String>,
    pub jti: Uuid,
    pub iat: i64,
    pub exp: i64,
    pub scope: TokenType,
}

/// Claims of invitation and reset tokens: caller-supplied data plus the
/// registered fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailClaims {
    #[serde(flatten)]
    pub data: Map<String, Value>,
    pub iat: i64,
    pub exp: i64,
    pub scope: TokenType,
}

impl EmailClaims {
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(Value::as_str)
    }
}

/// Decoded token payload, tagged by the `scope` claim.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TokenClaims {
    Access(AccessClaims),
    Refresh(RefreshClaims),
    Invitation(EmailClaims),
    Reset(EmailClaims),
}

impl TokenClaims {
    pub fn scope(&self) -> TokenType {
        match self {
            TokenClaims::Access(c) => c.scope,
            TokenClaims::Refresh(c) => c.scope,
            TokenClaims::Invitation(c) | TokenClaims::Reset(c) => c.scope,
        }
    }

    pub fn exp(&self) -> i64 {
        match self {
            TokenClaims::Access(c) => c.exp,
            TokenClaims::Refresh(c) => c.exp,
            TokenClaims::Invitation(c) | TokenClaims::Reset(c) => c.exp,
        }
    }

    /// Pick the variant from `scope`, then deserialize the whole payload into it.
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        let scope = value
            .get("scope")
            .cloned()
            .ok_or_else(|| <serde_json::Error as serde::de::Error>::missing_field("scope"))?;
        let claims = match serde_json::from_value::<TokenType>(scope)? {
            TokenType::Access => TokenClaims::Access(serde_json::from_value(value)?),
            TokenType::Refresh => TokenClaims::Refresh(serde_json::from_value(value)?),
            TokenType::Invitation => TokenClaims::Invitation(serde_json::from_value(value)?),
            TokenType::Reset => TokenClaims::Reset(serde_json::from_value(value)?),
        };
        Ok(claims)
    }
}

const RESERVED_CLAIMS: [&str; 4] = ["iat", "exp", "scope", "jti"];

/// Issues, validates and revokes signed tokens, persisting every issued
/// token through the [`TokenStore`].
#[derive(Clone)]
pub struct TokenService {
    store: Arc<dyn TokenStore>,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    algorithm: Algorithm,
    access_ttl: Duration,
    refresh_ttl: Duration,
    invitation_ttl: Duration,
    reset_ttl: Duration,
    clock_skew: Duration,
}

impl TokenService {
    pub fn new(config: &TokenConfig, store: Arc<dyn TokenStore>) -> Result<Self, AppError> {
        let algorithm = Algorithm::from_str(&config.algorithm.to_uppercase()).map_err(|e| {
            AppError::ConfigError(anyhow::anyhow!(
                "Unsupported token algorithm {}: {}",
                config.algorithm,
                e
            ))
        })?;

        tracing::info!(algorithm = ?algorithm, "Token service initialized");

        Ok(Self {
            store,
            encoding_key: EncodingKey::from_secret(config.secret_key.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret_key.as_bytes()),
            algorithm,
            access_ttl: Duration::minutes(config.access_token_expire_minutes),
            refresh_ttl: Duration::days(config.refresh_token_expire_days),
            invitation_ttl: Duration::days(config.invitation_token_expire_days),
            reset_ttl: Duration::hours(config.reset_token_expire_hours),
            clock_skew: Duration::seconds(config.clock_skew_seconds),
        })
    }

    pub fn store(&self) -> &Arc<dyn TokenStore> {
        &self.store
    }

    pub fn invitation_ttl(&self) -> Duration {
        self.invitation_ttl
    }

    pub fn reset_ttl(&self) -> Duration {
        self.reset_ttl
    }

    pub fn access_token_expire_seconds(&self) -> i64 {
        self.access_ttl.num_seconds()
    }

    /// Mint a refresh token for `user`, returning the token and its row id.
    pub async fn issue_refresh(&self, user: &User) -> Result<(String, Uuid), AppError> {
        let (now, expire_on) = self.window(self.refresh_ttl);
        let role = required_role(user)?;
        let claims = TokenClaims::Refresh(RefreshClaims {
            sub: user.email.clone(),
            domain: user.domain.clone(),
            role: role.name.clone(),
            role_domain: role.domain.clone(),
            permissions: user.scopes(),
            jti: Uuid::new_v4(),
            iat: now.timestamp(),
            exp: expire_on.timestamp(),
            scope: TokenType::Refresh,
        });

        let record = self.issue(&claims, expire_on, Some(user.id)).await?;
        Ok((record.token, record.id))
    }

    /// Mint an access token bound to the refresh row `refresh_id`.
    pub async fn issue_access(&self, user: &User, refresh_id: Uuid) -> Result<String, AppError> {
        let (now, expire_on) = self.window(self.access_ttl);
        let role = required_role(user)?;
        let claims = TokenClaims::Access(AccessClaims {
            sub: user.email.clone(),
            domain: user.domain.clone(),
            role: role.name.clone(),
            role_domain: role.domain.clone(),
            permissions: user.scopes(),
            rid: refresh_id,
            jti: Uuid::new_v4(),
            iat: now.timestamp(),
            exp: expire_on.timestamp(),
            scope: TokenType::Access,
        });

        Ok(self.issue(&claims, expire_on, Some(user.id)).await?.token)
    }

    /// Mint an invitation or reset token carrying `data` as free-form claims.
    pub async fn issue_email_token(
        &self,
        token_type: TokenType,
        mut data: Map<String, Value>,
        ttl: Duration,
        user_id: Option<Uuid>,
    ) -> Result<SecurityToken, AppError> {
        for key in RESERVED_CLAIMS {
            data.remove(key);
        }
        data.insert("jti".to_string(), Value::from(Uuid::new_v4().to_string()));

        let (now, expire_on) = self.window(ttl);
        let email_claims = EmailClaims {
            data,
            iat: now.timestamp(),
            exp: expire_on.timestamp(),
            scope: token_type,
        };
        let claims = match token_type {
            TokenType::Invitation => TokenClaims::Invitation(email_claims),
            TokenType::Reset => TokenClaims::Reset(email_claims),
            other => {
                return Err(AppError::InternalError(anyhow::anyhow!(
                    "{} tokens cannot carry email claims",
                    other
                )))
            }
        };

        self.issue(&claims, expire_on, user_id).await
    }

    /// Check a presented token against the store and its own claims.
    ///
    /// Missing records and bad signatures are `Unauthorized`; expired tokens and
    /// tokens whose `scope` differs from `expected` are `InvalidToken`.
    pub async fn validate(
        &self,
        token: &str,
        expected: TokenType,
    ) -> Result<SecurityToken, AppError> {
        let record = self.store.read(token, expected).await?.ok_or_else(|| {
            tracing::debug!(token_type = %expected, "Token not found");
            AppError::Unauthorized(anyhow::anyhow!("Could not validate credentials"))
        })?;

        let payload = self.decode_payload(token).map_err(|e| {
            tracing::warn!(token_type = %expected, error = %e, "Token signature rejected");
            AppError::Unauthorized(anyhow::anyhow!("Could not validate credentials"))
        })?;
        let claims = TokenClaims::from_value(payload)
            .map_err(|e| AppError::Unprocessable(anyhow::anyhow!(e)))?;

        let now = Utc::now();
        if record.expire_on + self.clock_skew < now
            || claims.exp() + self.clock_skew.num_seconds() < now.timestamp()
        {
            return Err(AppError::InvalidToken(anyhow::anyhow!("Token expired")));
        }

        if claims.scope() != expected {
            tracing::warn!(
                expected = %expected,
                actual = %claims.scope(),
                "Token scope mismatch"
            );
            return Err(AppError::InvalidToken(anyhow::anyhow!(
                "Invalid scope for token"
            )));
        }

        Ok(record)
    }

    /// Validate as an access token and return its claims.
    pub async fn validate_access(
        &self,
        token: &str,
    ) -> Result<(SecurityToken, AccessClaims), AppError> {
        let record = self.validate(token, TokenType::Access).await?;
        match self.decode_claims(token)? {
            TokenClaims::Access(claims) => Ok((record, claims)),
            other => Err(AppError::InvalidToken(anyhow::anyhow!(
                "Expected access claims, got {}",
                other.scope()
            ))),
        }
    }

    /// Signature-checked decode without a store lookup. Expiry is not checked.
    pub fn decode_claims(&self, token: &str) -> Result<TokenClaims, AppError> {
        let payload = self.decode_payload(token)?;
        TokenClaims::from_value(payload).map_err(|e| AppError::Unprocessable(anyhow::anyhow!(e)))
    }

    /// Delete an access token and the refresh token it was derived from.
    ///
    /// Returns `false` when no access record exists for `access_token`.
    pub async fn revoke_pair(&self, access_token: &str) -> Result<bool, AppError> {
        let Some(access) = self.store.read(access_token, TokenType::Access).await? else {
            return Ok(false);
        };

        match self.decode_claims(access_token) {
            Ok(TokenClaims::Access(claims)) => {
                let refresh = self.store.read_by_id(claims.rid).await?;
                self.store.delete(refresh).await?;
            }
            Ok(other) => {
                tracing::warn!(scope = %other.scope(), "Access record holds non-access claims");
            }
            Err(e) => {
                tracing::warn!(error = %e, "Could not decode access token during revocation");
            }
        }

        self.store.delete(Some(access)).await?;
        Ok(true)
    }

    async fn issue(
        &self,
        claims: &TokenClaims,
        expire_on: DateTime<Utc>,
        user_id: Option<Uuid>,
    ) -> Result<SecurityToken, AppError> {
        let token = encode(&Header::new(self.algorithm), claims, &self.encoding_key)
            .map_err(|e| AppError::InternalError(anyhow::anyhow!("Failed to sign token: {}", e)))?;

        let record = self
            .store
            .write(&token, claims.scope(), expire_on, user_id)
            .await?;

        tracing::debug!(
            token_type = %claims.scope(),
            token_id = %record.id,
            expire_on = %record.expire_on,
            "Token issued"
        );
        Ok(record)
    }

    fn decode_payload(&self, token: &str) -> Result<Value, AppError> {
        let mut validation = Validation::new(self.algorithm);
        validation.validate_exp = false;
        let data = decode::<Value>(token, &self.decoding_key, &validation)?;
        Ok(data.claims)
    }

    fn window(&self, ttl: Duration) -> (DateTime<Utc>, DateTime<Utc>) {
        let now = Utc::now();
        (now, now + ttl)
    }
}

fn required_role(user: &User) -> Result<&Role, AppError> {
    user.role
        .as_ref()
        .ok_or_else(|| AppError::Forbidden(anyhow::anyhow!("User has no role assigned")))
}
