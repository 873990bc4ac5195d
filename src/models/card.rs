use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::America::Sao_Paulo;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgExecutor};
use uuid::Uuid;

/// Card lifecycle status. `EM_ANALISE` is the state every card is created
/// in; the transition to `ATIVO` is what triggers the activation
/// notification path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "status_cartao")]
pub enum CardStatus {
    #[sqlx(rename = "EM_ANALISE")]
    #[serde(rename = "EM_ANALISE")]
    EmAnalise,
    #[sqlx(rename = "ATIVO")]
    #[serde(rename = "ATIVO")]
    Ativo,
    #[sqlx(rename = "CANCELADO")]
    #[serde(rename = "CANCELADO")]
    Cancelado,
}

impl CardStatus {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "EM_ANALISE" => Some(CardStatus::EmAnalise),
            "ATIVO" => Some(CardStatus::Ativo),
            "CANCELADO" => Some(CardStatus::Cancelado),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CardStatus::EmAnalise => "EM_ANALISE",
            CardStatus::Ativo => "ATIVO",
            CardStatus::Cancelado => "CANCELADO",
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct Card {
    pub uuid: Uuid,
    pub titular_cartao: String,
    pub cpf_titular: String,
    pub endereco: String,
    pub email: String,
    pub status: CardStatus,
    pub saldo: Decimal,
    pub numero_cartao_cifrado: Vec<u8>,
    pub cvv_cifrado: Vec<u8>,
    pub expiracao: NaiveDate,
    pub data_criacao: DateTime<Utc>,
    pub hash_token: String,
}

#[derive(Debug, Clone)]
pub struct CreateCardData {
    pub uuid: Uuid,
    pub titular_cartao: String,
    pub cpf_titular: String,
    pub endereco: String,
    pub email: String,
    pub numero_cartao_cifrado: Vec<u8>,
    pub cvv_cifrado: Vec<u8>,
    pub expiracao: NaiveDate,
    pub hash_token: String,
}

impl Card {
    /// Inserts a new card with status EM_ANALISE and zero balance
    pub async fn create(
        db: impl PgExecutor<'_>,
        data: CreateCardData,
    ) -> Result<Self, sqlx::Error> {
        let card = sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO cartoes
                (uuid, titular_cartao, cpf_titular, endereco, email,
                 numero_cartao_cifrado, cvv_cifrado, expiracao, hash_token)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(data.uuid)
        .bind(&data.titular_cartao)
        .bind(&data.cpf_titular)
        .bind(&data.endereco)
        .bind(&data.email)
        .bind(&data.numero_cartao_cifrado)
        .bind(&data.cvv_cifrado)
        .bind(data.expiracao)
        .bind(&data.hash_token)
        .fetch_one(db)
        .await?;

        Ok(card)
    }

    pub async fn find_by_uuid(
        db: impl PgExecutor<'_>,
        uuid: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        let card = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM cartoes WHERE uuid = $1
            "#,
        )
        .bind(uuid)
        .fetch_optional(db)
        .await?;

        Ok(card)
    }

    pub async fn list_by_cpf(
        db: impl PgExecutor<'_>,
        cpf_titular: &str,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let cards = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM cartoes WHERE cpf_titular = $1 ORDER BY data_criacao
            "#,
        )
        .bind(cpf_titular)
        .fetch_all(db)
        .await?;

        Ok(cards)
    }

    pub async fn first_by_cpf(
        db: impl PgExecutor<'_>,
        cpf_titular: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        let card = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM cartoes WHERE cpf_titular = $1 ORDER BY data_criacao LIMIT 1
            "#,
        )
        .bind(cpf_titular)
        .fetch_optional(db)
        .await?;

        Ok(card)
    }

    /// Updates holder name/address across every card that currently shares
    /// the (CPF, holder name) pair. The match is taken against the values
    /// as they were before the mutation.
    pub async fn update_holder_fields(
        db: impl PgExecutor<'_>,
        cpf_titular: &str,
        current_titular: &str,
        new_titular: Option<&str>,
        new_endereco: Option<&str>,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE cartoes
            SET
                titular_cartao = COALESCE($3, titular_cartao),
                endereco = COALESCE($4, endereco)
            WHERE cpf_titular = $1 AND titular_cartao = $2
            "#,
        )
        .bind(cpf_titular)
        .bind(current_titular)
        .bind(new_titular)
        .bind(new_endereco)
        .execute(db)
        .await?;

        Ok(result.rows_affected())
    }

    pub async fn set_status(
        db: impl PgExecutor<'_>,
        uuid: Uuid,
        status: CardStatus,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE cartoes SET status = $2 WHERE uuid = $1
            "#,
        )
        .bind(uuid)
        .bind(status)
        .execute(db)
        .await?;

        Ok(())
    }

    pub async fn set_email(
        db: impl PgExecutor<'_>,
        uuid: Uuid,
        email: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE cartoes SET email = $2 WHERE uuid = $1
            "#,
        )
        .bind(uuid)
        .bind(email)
        .execute(db)
        .await?;

        Ok(())
    }

    pub async fn set_saldo(
        db: impl PgExecutor<'_>,
        uuid: Uuid,
        saldo: Decimal,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE cartoes SET saldo = $2 WHERE uuid = $1
            "#,
        )
        .bind(uuid)
        .bind(saldo)
        .execute(db)
        .await?;

        Ok(())
    }

    /// Expiry rendered as MM/YYYY
    pub fn expiracao_formatada(&self) -> String {
        self.expiracao.format("%m/%Y").to_string()
    }

    /// Creation timestamp rendered in America/Sao_Paulo
    pub fn data_criacao_formatada(&self) -> String {
        self.data_criacao
            .with_timezone(&Sao_Paulo)
            .format("%d/%m/%Y %H:%M:%S")
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_status_parse() {
        assert_eq!(CardStatus::parse("EM_ANALISE"), Some(CardStatus::EmAnalise));
        assert_eq!(CardStatus::parse("ATIVO"), Some(CardStatus::Ativo));
        assert_eq!(CardStatus::parse("CANCELADO"), Some(CardStatus::Cancelado));
        assert_eq!(CardStatus::parse("ativo"), None);
        assert_eq!(CardStatus::parse(""), None);
    }

    #[test]
    fn test_status_serde_wire_values() {
        assert_eq!(
            serde_json::to_string(&CardStatus::EmAnalise).unwrap(),
            "\"EM_ANALISE\""
        );
        let status: CardStatus = serde_json::from_str("\"ATIVO\"").unwrap();
        assert_eq!(status, CardStatus::Ativo);
    }

    fn sample_card() -> Card {
        Card {
            uuid: Uuid::nil(),
            titular_cartao: "JOAO DA SILVA".to_string(),
            cpf_titular: "12345678912".to_string(),
            endereco: "RUA DA FELICIDADE, BAIRRO ALEGRIA".to_string(),
            email: "JOAODASILVA@EMAIL.COM".to_string(),
            status: CardStatus::EmAnalise,
            saldo: Decimal::ZERO,
            numero_cartao_cifrado: vec![],
            cvv_cifrado: vec![],
            expiracao: NaiveDate::from_ymd_opt(2030, 1, 15).unwrap(),
            data_criacao: Utc.with_ymd_and_hms(2026, 1, 15, 12, 0, 0).unwrap(),
            hash_token: "token".to_string(),
        }
    }

    #[test]
    fn test_expiracao_mm_yyyy() {
        assert_eq!(sample_card().expiracao_formatada(), "01/2030");
    }

    #[test]
    fn test_data_criacao_rendered_in_sao_paulo() {
        // UTC-3, no DST since 2019
        assert_eq!(sample_card().data_criacao_formatada(), "15/01/2026 09:00:00");
    }
}
