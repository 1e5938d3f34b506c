use service_core::config::{self as core_config, get_env, parse_env, parse_size};
use service_core::error::AppError;

#[derive(Debug, Clone)]
pub struct ShelterConfig {
    pub common: core_config::Config,
    pub environment: Environment,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub token: TokenConfig,
    pub super_user: SuperUserConfig,
    pub crm: CrmConfig,
    pub scheduler: SchedulerConfig,
    pub cache: CacheConfig,
    pub smtp: SmtpConfig,
    pub urls: UrlConfig,
    pub security: SecurityConfig,
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Environment {
    Dev,
    Prod,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub url: String,
    /// Bound on each connect attempt while Redis is unreachable.
    pub connect_timeout_ms: u64,
}

#[derive(Debug, Clone)]
pub struct TokenConfig {
    pub secret_key: String,
    pub algorithm: String,
    pub access_token_expire_minutes: i64,
    pub refresh_token_expire_days: i64,
    pub invitation_token_expire_days: i64,
    pub reset_token_expire_hours: i64,
    /// Grace applied to both `exp` and `expire_on` when validating.
    pub clock_skew_seconds: i64,
}

/// The (role, domain) pair that bypasses every scope check, and the account
/// seeded with it at startup.
#[derive(Clone)]
pub struct SuperUserConfig {
    pub role: String,
    pub domain: String,
    /// Without both, startup only makes sure the role exists.
    pub email: Option<String>,
    pub password: Option<String>,
}

impl std::fmt::Debug for SuperUserConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SuperUserConfig")
            .field("role", &self.role)
            .field("domain", &self.domain)
            .field("email", &self.email)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct CrmConfig {
    pub editing_lock_expire_minutes: i64,
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub frequency_seconds: u64,
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub default_ttl_seconds: u64,
    pub media_cache_size: u64,
    pub media_cache_record_limit: u64,
    pub blob_chunk_size: usize,
}

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub mail_from: String,
}

/// Front-end pages that mailed links point at.
#[derive(Debug, Clone)]
pub struct UrlConfig {
    pub register: String,
    pub login: String,
    pub reset_password: String,
}

#[derive(Debug, Clone)]
pub struct SecurityConfig {
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub times: u32,
    pub seconds: u64,
}

impl ShelterConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;

        let environment: Environment = get_env("ENVIRONMENT", Some("dev"), false)?
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;
        let is_prod = environment == Environment::Prod;

        // Mail settings fall back to a local relay in dev only.
        let dev_default = |value: &'static str| if is_prod { None } else { Some(value) };

        let config = ShelterConfig {
            common,
            environment: environment.clone(),
            service_name: get_env("SERVICE_NAME", Some("shelter-service"), is_prod)?,
            service_version: get_env(
                "SERVICE_VERSION",
                Some(env!("CARGO_PKG_VERSION")),
                is_prod,
            )?,
            log_level: get_env("LOG_LEVEL", Some("info"), is_prod)?,
            otlp_endpoint: get_env("OTLP_ENDPOINT", Some(""), is_prod)
                .ok()
                .filter(|v| !v.trim().is_empty()),
            database: DatabaseConfig {
                url: get_env("DATABASE_URL", None, is_prod)?,
                max_connections: parse_env("DATABASE_MAX_CONNECTIONS", Some("10"), is_prod)?,
                min_connections: parse_env("DATABASE_MIN_CONNECTIONS", Some("1"), is_prod)?,
            },
            redis: RedisConfig {
                url: get_env("REDIS_URL", None, is_prod)?,
                connect_timeout_ms: parse_env("REDIS_CONNECT_TIMEOUT_MS", Some("2000"), is_prod)?,
            },
            token: TokenConfig {
                secret_key: get_env("TOKEN_SECRET_KEY", None, is_prod)?,
                algorithm: get_env("TOKEN_ALGORITHM", Some("HS256"), is_prod)?,
                access_token_expire_minutes: parse_env(
                    "ACCESS_TOKEN_EXPIRE_MINUTES",
                    Some("30"),
                    is_prod,
                )?,
                refresh_token_expire_days: parse_env(
                    "REFRESH_TOKEN_EXPIRE_DAYS",
                    Some("7"),
                    is_prod,
                )?,
                invitation_token_expire_days: parse_env(
                    "INVITATION_TOKEN_EXPIRE_DAYS",
                    Some("7"),
                    is_prod,
                )?,
                reset_token_expire_hours: parse_env(
                    "RESET_TOKEN_EXPIRE_HOURS",
                    Some("1"),
                    is_prod,
                )?,
                clock_skew_seconds: parse_env("TOKEN_CLOCK_SKEW_SECONDS", Some("0"), is_prod)?,
            },
            super_user: SuperUserConfig {
                role: get_env("SUPER_USER_ROLE", Some("admin"), is_prod)?,
                domain: get_env("SUPER_USER_DOMAIN", Some("system"), is_prod)?,
                email: get_env("SUPER_USER_EMAIL", Some(""), is_prod)
                    .ok()
                    .map(|v| v.trim().to_lowercase())
                    .filter(|v| !v.is_empty()),
                password: get_env("SUPER_USER_PASSWORD", Some(""), is_prod)
                    .ok()
                    .filter(|v| !v.is_empty()),
            },
            crm: CrmConfig {
                editing_lock_expire_minutes: parse_env(
                    "CRM_EDITING_LOCK_EXPIRE_MINUTES",
                    Some("15"),
                    is_prod,
                )?,
            },
            scheduler: SchedulerConfig {
                frequency_seconds: parse_env(
                    "SCHEDULER_FREQUENCY_SECONDS",
                    Some("14400"),
                    is_prod,
                )?,
            },
            cache: CacheConfig {
                default_ttl_seconds: parse_env(
                    "DEFAULT_CACHE_TTL_SECONDS",
                    Some("900"),
                    is_prod,
                )?,
                media_cache_size: parse_size(&get_env(
                    "MEDIA_CACHE_SIZE",
                    Some("400MB"),
                    is_prod,
                )?)?,
                media_cache_record_limit: parse_size(&get_env(
                    "MEDIA_CACHE_RECORD_LIMIT",
                    Some("20MB"),
                    is_prod,
                )?)?,
                blob_chunk_size: parse_size(&get_env("BLOB_CHUNK_SIZE", Some("10MB"), is_prod)?)?
                    as usize,
            },
            smtp: SmtpConfig {
                host: get_env("SMTP_HOST", dev_default("localhost"), is_prod)?,
                port: parse_env("SMTP_PORT", dev_default("1025"), is_prod)?,
                user: get_env("SMTP_USER", dev_default(""), is_prod)?,
                password: get_env("SMTP_PASSWORD", dev_default(""), is_prod)?,
                mail_from: get_env("MAIL_FROM", dev_default("shelter@localhost"), is_prod)?,
            },
            urls: UrlConfig {
                register: get_env(
                    "URL_REGISTER",
                    Some("http://localhost:3000/register"),
                    is_prod,
                )?,
                login: get_env("URL_LOGIN", Some("http://localhost:3000/login"), is_prod)?,
                reset_password: get_env(
                    "URL_RESET_PASSWORD",
                    Some("http://localhost:3000/reset-password"),
                    is_prod,
                )?,
            },
            security: SecurityConfig {
                allowed_origins: get_env(
                    "ALLOWED_ORIGINS",
                    Some("http://localhost:3000"),
                    is_prod,
                )?
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            },
            rate_limit: RateLimitConfig {
                times: parse_env("RATE_LIMIT_TIMES", Some("5"), is_prod)?,
                seconds: parse_env("RATE_LIMIT_SECONDS", Some("60"), is_prod)?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.common.port == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "PORT must be greater than 0"
            )));
        }

        if self.token.secret_key.len() < 16 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "TOKEN_SECRET_KEY must be at least 16 characters"
            )));
        }

        if !self.token.algorithm.to_uppercase().starts_with("HS") {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "TOKEN_ALGORITHM must be an HMAC algorithm (HS256, HS384, HS512), got {}",
                self.token.algorithm
            )));
        }

        let lifetimes = [
            ("ACCESS_TOKEN_EXPIRE_MINUTES", self.token.access_token_expire_minutes),
            ("REFRESH_TOKEN_EXPIRE_DAYS", self.token.refresh_token_expire_days),
            ("INVITATION_TOKEN_EXPIRE_DAYS", self.token.invitation_token_expire_days),
            ("RESET_TOKEN_EXPIRE_HOURS", self.token.reset_token_expire_hours),
            ("CRM_EDITING_LOCK_EXPIRE_MINUTES", self.crm.editing_lock_expire_minutes),
        ];
        for (key, value) in lifetimes {
            if value <= 0 {
                return Err(AppError::ConfigError(anyhow::anyhow!("{} must be positive", key)));
            }
        }

        if self.token.clock_skew_seconds < 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "TOKEN_CLOCK_SKEW_SECONDS must not be negative"
            )));
        }

        if self.super_user.email.is_some() != self.super_user.password.is_some() {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "SUPER_USER_EMAIL and SUPER_USER_PASSWORD must be set together"
            )));
        }

        if self
            .super_user
            .password
            .as_ref()
            .is_some_and(|p| p.len() < 8)
        {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "SUPER_USER_PASSWORD must be at least 8 characters"
            )));
        }

        if self.redis.connect_timeout_ms == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "REDIS_CONNECT_TIMEOUT_MS must be greater than 0"
            )));
        }

        if self.scheduler.frequency_seconds == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "SCHEDULER_FREQUENCY_SECONDS must be greater than 0"
            )));
        }

        if self.cache.media_cache_record_limit > self.cache.media_cache_size {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "MEDIA_CACHE_RECORD_LIMIT must not exceed MEDIA_CACHE_SIZE"
            )));
        }

        if self.cache.blob_chunk_size == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "BLOB_CHUNK_SIZE must be greater than 0"
            )));
        }

        if self.database.min_connections > self.database.max_connections {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "DATABASE_MIN_CONNECTIONS must not exceed DATABASE_MAX_CONNECTIONS"
            )));
        }

        if self.rate_limit.times == 0 || self.rate_limit.seconds == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "RATE_LIMIT_TIMES and RATE_LIMIT_SECONDS must be greater than 0"
            )));
        }

        if self.environment == Environment::Prod
            && self.security.allowed_origins.iter().any(|o| o == "*")
        {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "Wildcard CORS origin not allowed in production"
            )));
        }

        Ok(())
    }
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}
