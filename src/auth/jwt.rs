use axum::http::StatusCode;
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

/// Claims of an identity-provider access token
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // Subject (user ID)
    #[serde(default)]
    pub email: Option<String>,
    pub exp: usize, // Expiration time
    pub iat: usize, // Issued at
}

/// Validate a bearer token issued by the identity provider and extract claims
pub fn validate_token(token: &str) -> Result<Claims, JwtError> {
    let jwt_secret = std::env::var("JWT_SECRET").map_err(|_| JwtError::MissingSecret)?;

    let mut validation = Validation::default();
    validation.validate_exp = true;
    validation.leeway = 0;

    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(jwt_secret.as_bytes()),
        &validation,
    )
    .map_err(|_| JwtError::InvalidToken)?;

    Ok(token_data.claims)
}

/// Sign a token the way the identity provider does.
#[cfg(test)]
pub fn generate_token(user_id: &uuid::Uuid, email: Option<&str>) -> String {
    use jsonwebtoken::{encode, EncodingKey, Header};

    let jwt_secret = std::env::var("JWT_SECRET").unwrap();
    let now = chrono::Utc::now();
    let claims = Claims {
        sub: user_id.to_string(),
        email: email.map(str::to_string),
        exp: (now + chrono::Duration::hours(1)).timestamp() as usize,
        iat: now.timestamp() as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(jwt_secret.as_bytes()),
    )
    .unwrap()
}

#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    #[error("JWT secret is missing or not set")]
    MissingSecret,

    #[error("Invalid or expired JWT token")]
    InvalidToken,
}

impl From<JwtError> for StatusCode {
    fn from(err: JwtError) -> Self {
        match err {
            JwtError::MissingSecret => StatusCode::INTERNAL_SERVER_ERROR,
            JwtError::InvalidToken => StatusCode::UNAUTHORIZED,
        }
    }
}

/// Secret shared by every test that signs or checks tokens.
#[cfg(test)]
pub const TEST_SECRET: &str = "test_secret";
