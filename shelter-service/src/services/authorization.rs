use service_core::error::AppError;
use std::collections::BTreeSet;

use crate::{
    config::SuperUserConfig,
    models::{SecurityToken, User},
    services::AccessClaims,
};

/// A validated access token together with the user it was issued to.
///
/// Placed in request extensions by the auth middleware.
#[derive(Debug, Clone)]
pub struct AuthenticatedToken {
    pub record: SecurityToken,
    pub claims: AccessClaims,
    pub user: User,
}

/// Scope checks against the permissions embedded in an access token.
///
/// Permission changes reach a user only when a new token is issued.
#[derive(Debug, Clone)]
pub struct AuthorizationGate {
    super_user_role: String,
    super_user_domain: String,
}

impl AuthorizationGate {
    pub fn new(config: &SuperUserConfig) -> Self {
        Self {
            super_user_role: config.role.clone(),
            super_user_domain: config.domain.clone(),
        }
    }

    /// Matches the role's own domain, not the domain of the user holding it.
    pub fn is_super_admin(&self, claims: &AccessClaims) -> bool {
        self.is_super_role(&claims.role, &claims.role_domain)
    }

    pub fn is_super_role(&self, role_name: &str, domain: &str) -> bool {
        role_name.eq_ignore_ascii_case(&self.super_user_role)
            && domain.eq_ignore_ascii_case(&self.super_user_domain)
    }

    /// Allow when every required scope is granted, or the caller is the super admin.
    pub fn authorize<'a, S: AsRef<str>>(
        &self,
        required: &[S],
        token: &'a AuthenticatedToken,
    ) -> Result<&'a User, AppError> {
        if self.is_super_admin(&token.claims) {
            return Ok(&token.user);
        }

        let granted: BTreeSet<&str> = token.claims.permissions.iter().map(String::as_str).collect();
        let missing: BTreeSet<&str> = required
            .iter()
            .map(AsRef::as_ref)
            .filter(|scope| !granted.contains(scope))
            .collect();

        if missing.is_empty() {
            return Ok(&token.user);
        }

        let missing = missing.into_iter().collect::<Vec<_>>().join(", ");
        tracing::warn!(
            user_id = %token.user.id,
            missing = %missing,
            "Access denied"
        );
        Err(AppError::Forbidden(anyhow::anyhow!(
            "Access denied. Required permissions: {}",
            missing
        )))
    }

    /// Like [`authorize`](Self::authorize), additionally requiring `{section}:write`.
    pub fn authorize_for_section<'a, S: AsRef<str>>(
        &self,
        section: &str,
        required: &[S],
        token: &'a AuthenticatedToken,
    ) -> Result<&'a User, AppError> {
        let mut scopes = vec![format!("{}:write", section)];
        scopes.extend(required.iter().map(|s| s.as_ref().to_string()));
        self.authorize(&scopes, token)
    }

    /// Allow the caller acting on their own account, otherwise check scopes
    /// within `domain`.
    pub fn authorize_or_self<'a, S: AsRef<str>>(
        &self,
        domain: &str,
        email: &str,
        required: &[S],
        token: &'a AuthenticatedToken,
    ) -> Result<&'a User, AppError> {
        if token.user.is_identity(domain, email) {
            return Ok(&token.user);
        }
        self.authorize_in_domain(domain, required, token)
    }

    /// Like [`authorize`](Self::authorize), and confined to the caller's own
    /// domain unless the caller is the super admin.
    pub fn authorize_in_domain<'a, S: AsRef<str>>(
        &self,
        domain: &str,
        required: &[S],
        token: &'a AuthenticatedToken,
    ) -> Result<&'a User, AppError> {
        let user = self.authorize(required, token)?;
        if self.is_super_admin(&token.claims) || user.domain == domain {
            return Ok(user);
        }

        tracing::warn!(
            user_id = %user.id,
            target_domain = %domain,
            "Refused cross-domain access"
        );
        Err(AppError::Forbidden(anyhow::anyhow!(
            "Access denied to domain {}",
            domain
        )))
    }

    /// Check for handing out, or reshaping, role `role_name` of `domain`.
    ///
    /// Besides [`authorize_in_domain`](Self::authorize_in_domain), only the
    /// super admin may touch the super admin role.
    pub fn authorize_role_grant<'a, S: AsRef<str>>(
        &self,
        domain: &str,
        role_name: &str,
        required: &[S],
        token: &'a AuthenticatedToken,
    ) -> Result<&'a User, AppError> {
        if self.is_super_role(role_name, domain) && !self.is_super_admin(&token.claims) {
            tracing::warn!(user_id = %token.user.id, "Refused grant of the super admin role");
            return Err(AppError::Forbidden(anyhow::anyhow!(
                "Only the super admin can grant role {}",
                role_name
            )));
        }
        self.authorize_in_domain(domain, required, token)
    }
}
