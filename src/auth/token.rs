use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::config::JwtConfig;

const ALGORITHM: Algorithm = Algorithm::HS256;

/// Signed bearer payload. `tenant_id` is absent on a no-tenant token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<Uuid>,
    pub username: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    pub fn expires_at(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.exp, 0)
            .single()
            .unwrap_or_else(Utc::now)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("missing authorization header")]
    MissingAuth,

    #[error("authorization header must be 'Bearer <token>'")]
    MalformedAuth,

    #[error("invalid token: {0}")]
    InvalidToken(String),

    #[error("jwt secret is not configured")]
    MissingSecret,

    #[error("token signing failed: {0}")]
    Signing(String),

    #[error("token lifetime of {0} hours is out of range")]
    InvalidLifetime(u64),
}

/// Issues and validates HS256 bearer tokens.
#[derive(Clone)]
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    lifetime: Duration,
}

impl TokenService {
    pub fn new(secret: &str, expire_time_hours: u64) -> Result<Self, TokenError> {
        if secret.is_empty() {
            return Err(TokenError::MissingSecret);
        }
        let lifetime = i64::try_from(expire_time_hours)
            .ok()
            .and_then(Duration::try_hours)
            .filter(|lifetime| *lifetime > Duration::zero())
            .ok_or(TokenError::InvalidLifetime(expire_time_hours))?;

        // The header's `alg` is never trusted; only HS256 verifies.
        let mut validation = Validation::new(ALGORITHM);
        validation.leeway = 0;
        validation.validate_exp = true;
        validation.set_required_spec_claims(&["exp"]);

        Ok(Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            lifetime,
        })
    }

    pub fn from_config(config: &JwtConfig) -> Result<Self, TokenError> {
        Self::new(&config.secret, config.expire_time_hours)
    }

    /// A nil `tenant_id` or empty `role` means "none selected".
    pub fn generate(
        &self,
        user_id: Uuid,
        tenant_id: Option<Uuid>,
        username: &str,
        email: &str,
        role: Option<&str>,
    ) -> Result<IssuedToken, TokenError> {
        self.generate_at(user_id, tenant_id, username, email, role, Utc::now())
    }

    pub fn generate_at(
        &self,
        user_id: Uuid,
        tenant_id: Option<Uuid>,
        username: &str,
        email: &str,
        role: Option<&str>,
        issued_at: DateTime<Utc>,
    ) -> Result<IssuedToken, TokenError> {
        let expires_at = issued_at + self.lifetime;
        let claims = Claims {
            user_id,
            tenant_id: tenant_id.filter(|id| !id.is_nil()),
            username: username.to_string(),
            email: email.to_string(),
            role: role.filter(|r| !r.is_empty()).map(str::to_string),
            iat: issued_at.timestamp(),
            exp: expires_at.timestamp(),
        };

        let token = encode(&Header::new(ALGORITHM), &claims, &self.encoding)
            .map_err(|e| TokenError::Signing(e.to_string()))?;

        Ok(IssuedToken { token, expires_at })
    }

    /// Bad signature, malformed payload or `now >= exp` are all `InvalidToken`.
    pub fn validate(&self, token: &str) -> Result<Claims, TokenError> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation)
            .map_err(|e| TokenError::InvalidToken(e.to_string()))?;

        // jsonwebtoken accepts exp == now; the boundary second is already expired here.
        if data.claims.exp <= Utc::now().timestamp() {
            return Err(TokenError::InvalidToken("ExpiredSignature".to_string()));
        }

        Ok(data.claims)
    }
}

/// Pull the token out of an `Authorization` header value.
///
/// The scheme is case-insensitive and must be followed by exactly one space.
pub fn extract_from_header(header: &str) -> Result<&str, TokenError> {
    if header.is_empty() {
        return Err(TokenError::MissingAuth);
    }

    let (scheme, token) = header.split_once(' ').ok_or(TokenError::MalformedAuth)?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(TokenError::MalformedAuth);
    }
    if token.is_empty() || token.chars().any(char::is_whitespace) {
        return Err(TokenError::MalformedAuth);
    }

    Ok(token)
}
