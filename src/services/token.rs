//! Per-card bearer tokens: HS256 JWTs carrying the holder's CPF as the
//! subject claim. The issued token is stored on the card and presented
//! back on every authenticated call.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
}

pub fn issue_card_token(
    secret: &str,
    cpf: &str,
    expiration_minutes: i64,
) -> Result<String, jsonwebtoken::errors::Error> {
    let exp = (Utc::now() + Duration::minutes(expiration_minutes)).timestamp() as usize;
    let claims = Claims {
        sub: cpf.to_string(),
        exp,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}

/// Decodes the bearer token and returns the CPF it is bound to. Expiry is
/// enforced.
pub fn decode_cpf(secret: &str, token: &str) -> Result<String, jsonwebtoken::errors::Error> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;

    Ok(data.claims.sub)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_carries_cpf() {
        let token = issue_card_token("secret", "12345678912", 60).unwrap();
        assert_eq!(decode_cpf("secret", &token).unwrap(), "12345678912");
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = issue_card_token("secret", "12345678912", 60).unwrap();
        assert!(decode_cpf("other-secret", &token).is_err());
    }

    #[test]
    fn test_expired_token_rejected() {
        let token = issue_card_token("secret", "12345678912", -120).unwrap();
        assert!(decode_cpf("secret", &token).is_err());
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(decode_cpf("secret", "not-a-jwt").is_err());
    }
}
