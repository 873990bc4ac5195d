//! Bearer credential checks.
//!
//! Every protected endpoint re-derives the principal from the presented
//! JWT (subject claim = CPF) and cross-checks it against the target card:
//! the card's CPF must match the claim and the stored per-card token must
//! be the very token presented.

use axum::http::{header, HeaderMap};
use secrecy::ExposeSecret;
use sqlx::PgPool;
use uuid::Uuid;

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::models::Card;
use crate::services::token;

const CREDENTIAL_DETAIL: &str = "Credencial inválida para o CPF vinculado.";
const CPF_NOT_LINKED: &str =
    "O CPF informado não está vinculado a nenhum cartão ou é inválido.";

pub fn bearer_token(headers: &HeaderMap) -> Result<String> {
    let value = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized(CREDENTIAL_DETAIL.to_string()))?;

    let token = value
        .strip_prefix("Bearer ")
        .ok_or_else(|| AppError::Unauthorized(CREDENTIAL_DETAIL.to_string()))?;

    Ok(token.to_string())
}

fn cpf_from_token(config: &Config, token: &str) -> Result<String> {
    token::decode_cpf(config.jwt_secret.expose_secret(), token)
        .map_err(|_| AppError::Unauthorized(CREDENTIAL_DETAIL.to_string()))
}

/// Resolves the bearer credential against a specific card UUID. The card
/// must exist, belong to the CPF in the token and hold this exact token.
pub async fn authorize_card(
    pool: &PgPool,
    config: &Config,
    headers: &HeaderMap,
    uuid: Uuid,
) -> Result<Card> {
    let token = bearer_token(headers)?;
    let cpf = cpf_from_token(config, &token)?;

    let card = Card::find_by_uuid(pool, uuid)
        .await?
        .ok_or_else(|| {
            AppError::NotFound("Cartão não encontrado, verifique o UUID.".to_string())
        })?;

    if card.cpf_titular != cpf || card.hash_token != token {
        return Err(AppError::Unauthorized(CREDENTIAL_DETAIL.to_string()));
    }

    Ok(card)
}

/// Resolves the bearer credential for a CPF-scoped lookup. The token's CPF
/// must own at least one card holding this token, and the path CPF must be
/// the caller's own.
pub async fn authorize_cpf(
    pool: &PgPool,
    config: &Config,
    headers: &HeaderMap,
    cpf_path: &str,
) -> Result<String> {
    let token = bearer_token(headers)?;
    let cpf = cpf_from_token(config, &token)?;

    let card = Card::first_by_cpf(pool, &cpf)
        .await?
        .ok_or_else(|| AppError::Validation(CPF_NOT_LINKED.to_string()))?;

    if card.hash_token != token {
        return Err(AppError::Unauthorized(CREDENTIAL_DETAIL.to_string()));
    }

    if card.cpf_titular != cpf_path {
        return Err(AppError::Validation(CPF_NOT_LINKED.to_string()));
    }

    Ok(card.cpf_titular)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_bearer_token_extraction() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer abc.def.ghi"),
        );
        assert_eq!(bearer_token(&headers).unwrap(), "abc.def.ghi");
    }

    #[test]
    fn test_missing_header_rejected() {
        let headers = HeaderMap::new();
        let err = bearer_token(&headers).unwrap_err();
        assert_eq!(err.to_string(), CREDENTIAL_DETAIL);
    }

    #[test]
    fn test_non_bearer_scheme_rejected() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Basic dXNlcjpwYXNz"),
        );
        assert!(bearer_token(&headers).is_err());
    }
}
