//! Field normalization and validation for inbound card data.
//!
//! All free-text fields are NFD-normalized with combining marks stripped
//! (diacritics removed), whitespace-collapsed and uppercased before they
//! reach the store.

use unicode_normalization::{char::is_combining_mark, UnicodeNormalization};

use crate::error::{AppError, Result};
use crate::models::CardStatus;
use rust_decimal::Decimal;

/// Strips diacritics the way the schema expects: NFD decomposition with
/// every combining mark dropped.
fn strip_diacritics(value: &str) -> String {
    value.nfd().filter(|c| !is_combining_mark(*c)).collect()
}

fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn normalize(value: &str) -> String {
    strip_diacritics(&collapse_whitespace(value)).to_uppercase()
}

pub fn validate_titular(raw: &str) -> Result<String> {
    if raw.trim().is_empty() {
        return Err(AppError::Validation(
            "Nome titular é um campo obrigatório e não pode ser uma string vazia.".to_string(),
        ));
    }
    validate_titular_characters(raw)
}

/// Same rules as issuance, but with the partial-update wording.
pub fn validate_titular_update(raw: &str) -> Result<String> {
    if raw.trim().is_empty() {
        return Err(AppError::Validation(
            "O nome do titular não pode ser uma string vazia.".to_string(),
        ));
    }
    validate_titular_characters(raw)
}

fn validate_titular_characters(raw: &str) -> Result<String> {
    let collapsed = collapse_whitespace(raw);
    if !collapsed
        .chars()
        .all(|c| c.is_alphabetic() || c.is_whitespace())
    {
        return Err(AppError::Validation(
            "O nome do titular deve ser composto apenas por letras.".to_string(),
        ));
    }
    Ok(strip_diacritics(&collapsed).to_uppercase())
}

pub fn validate_cpf(raw: &str) -> Result<String> {
    if raw.trim().is_empty() {
        return Err(AppError::Validation(
            "CPF é um campo obrigatório e não pode ser uma string vazia.".to_string(),
        ));
    }
    if !raw.chars().all(|c| c.is_ascii_digit()) {
        return Err(AppError::Validation(
            "O CPF deve conter apenas números.".to_string(),
        ));
    }
    if raw.len() != 11 {
        return Err(AppError::Validation(
            "O CPF deve conter exatamente 11 dígitos.".to_string(),
        ));
    }
    Ok(raw.to_string())
}

pub fn validate_endereco(raw: &str) -> Result<String> {
    if raw.trim().is_empty() {
        return Err(AppError::Validation(
            "Endereço é um campo obrigatório e não pode ser uma string vazia.".to_string(),
        ));
    }
    Ok(normalize(raw))
}

pub fn validate_endereco_update(raw: &str) -> Result<String> {
    if raw.trim().is_empty() {
        return Err(AppError::Validation(
            "Endereço inválido. O endereço não pode ser vazio.".to_string(),
        ));
    }
    Ok(normalize(raw))
}

pub fn validate_email(raw: &str) -> Result<String> {
    if raw.trim().is_empty() {
        return Err(AppError::Validation(
            "E-mail é um campo obrigatório e não pode ser uma string vazia.".to_string(),
        ));
    }
    Ok(normalize(raw))
}

pub fn validate_status(raw: &str) -> Result<CardStatus> {
    if raw.trim().is_empty() {
        return Err(AppError::Validation(
            "O status não pode ser uma string vazia.".to_string(),
        ));
    }
    CardStatus::parse(raw).ok_or_else(|| {
        AppError::Validation("O status fornecido deve ser do tipo StatusEnum.".to_string())
    })
}

/// Reload and transfer amounts must be strictly positive.
pub fn validate_valor(valor: Decimal) -> Result<Decimal> {
    if valor <= Decimal::ZERO {
        return Err(AppError::Validation(
            "O valor da recarga deve ser maior do que 0.".to_string(),
        ));
    }
    Ok(valor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_titular_empty() {
        let err = validate_titular("   ").unwrap_err();
        assert!(err
            .to_string()
            .contains("Nome titular é um campo obrigatório"));
    }

    #[test]
    fn test_titular_rejects_digits() {
        let err = validate_titular("JOAO DA SILV2").unwrap_err();
        assert_eq!(
            err.to_string(),
            "O nome do titular deve ser composto apenas por letras."
        );
    }

    #[test]
    fn test_titular_strips_diacritics_and_uppercases() {
        assert_eq!(validate_titular("joão  da   silva").unwrap(), "JOAO DA SILVA");
    }

    #[test]
    fn test_titular_update_empty_has_own_wording() {
        let err = validate_titular_update("").unwrap_err();
        assert_eq!(
            err.to_string(),
            "O nome do titular não pode ser uma string vazia."
        );
    }

    #[test]
    fn test_cpf_rules() {
        assert!(validate_cpf("").is_err());
        assert_eq!(
            validate_cpf("1234567891a").unwrap_err().to_string(),
            "O CPF deve conter apenas números."
        );
        assert_eq!(
            validate_cpf("123456789").unwrap_err().to_string(),
            "O CPF deve conter exatamente 11 dígitos."
        );
        assert_eq!(validate_cpf("12345678912").unwrap(), "12345678912");
    }

    #[test]
    fn test_endereco_normalized() {
        assert_eq!(
            validate_endereco("  rua da  felicidade, bairro alegria ").unwrap(),
            "RUA DA FELICIDADE, BAIRRO ALEGRIA"
        );
        assert!(validate_endereco(" ").is_err());
    }

    #[test]
    fn test_email_normalized() {
        assert_eq!(
            validate_email("joãodasilva@email.com").unwrap(),
            "JOAODASILVA@EMAIL.COM"
        );
        assert!(validate_email("").is_err());
    }

    #[test]
    fn test_status_values() {
        assert_eq!(validate_status("ATIVO").unwrap(), CardStatus::Ativo);
        assert_eq!(
            validate_status("APROVADO").unwrap_err().to_string(),
            "O status fornecido deve ser do tipo StatusEnum."
        );
        assert_eq!(
            validate_status(" ").unwrap_err().to_string(),
            "O status não pode ser uma string vazia."
        );
    }

    #[test]
    fn test_valor_strictly_positive() {
        assert!(validate_valor(Decimal::new(1000, 2)).is_ok());
        assert!(validate_valor(Decimal::ZERO).is_err());
        assert!(validate_valor(Decimal::new(-1, 0)).is_err());
    }
}
