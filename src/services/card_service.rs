//! The five card operations. Each one runs against a single scoped
//! transaction: queries go through the transaction connection, the commit
//! happens once at the end, and any early error path drops the transaction
//! (rolling it back) before the HTTP error is surfaced.

use chrono::Utc;
use rust_decimal::Decimal;
use secrecy::ExposeSecret;
use sqlx::PgPool;
use uuid::Uuid;

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::models::{
    card::{Card, CreateCardData},
    CardStatus,
};
use crate::services::broker::{ApprovalMessage, Broker};
use crate::services::mailer::Mailer;
use crate::services::{card_generator, encryption, token};

/// Validated, normalized issuance input.
#[derive(Debug, Clone)]
pub struct NewCard {
    pub titular_cartao: String,
    pub cpf_titular: String,
    pub endereco: String,
    pub email: String,
}

/// Validated partial update. At least one field is guaranteed present by
/// the API layer.
#[derive(Debug, Clone, Default)]
pub struct CardUpdate {
    pub titular_cartao: Option<String>,
    pub endereco: Option<String>,
    pub status: Option<CardStatus>,
    pub email: Option<String>,
}

const ERR_CREATE: &str = "Erro ao criar cartão. Tente novamente mais tarde.";
const ERR_UPDATE: &str = "Erro ao atualizar o cartão. Tente novamente mais tarde.";
const ERR_RELOAD: &str = "Erro ao recarregar o cartão. Tente novamente mais tarde.";
const ERR_CARD_NOT_FOUND: &str = "Cartão não encontrado, verifique o UUID.";
const ERR_PAYEE_NOT_FOUND: &str = "Cartão não encontrado, verifique o UUID do recebedor.";

/// Issues a new card for the holder.
///
/// Persistence and the approval-request publish are tied together: the
/// insert only commits after the publish succeeds, so a broker failure
/// rolls the record back. The reverse gap is deliberate best-effort
/// behavior — if the commit itself fails after the publish went out, the
/// approval message is not compensated.
#[tracing::instrument(skip(pool, broker, config, data), fields(cpf = %data.cpf_titular))]
pub async fn issue_card(
    pool: &PgPool,
    broker: &dyn Broker,
    config: &Config,
    data: NewCard,
) -> Result<Card> {
    let existing = Card::list_by_cpf(pool, &data.cpf_titular).await?;
    ensure_same_holder(&existing, &data.titular_cartao, &data.email)?;

    let uuid = Uuid::new_v4();
    let numero_cartao = card_generator::generate_card_number();
    let cvv = card_generator::generate_cvv();
    let expiracao = card_generator::expiry_from(Utc::now());
    let hash_token = token::issue_card_token(
        config.jwt_secret.expose_secret(),
        &data.cpf_titular,
        config.token_expiration_minutes,
    )?;

    let key = encryption::derive_key(config.encryption_key.expose_secret());
    let numero_cartao_cifrado = encryption::encrypt(&numero_cartao, &key)?;
    let cvv_cifrado = encryption::encrypt(&cvv, &key)?;

    let mut tx = pool.begin().await?;

    let card = Card::create(
        &mut *tx,
        CreateCardData {
            uuid,
            titular_cartao: data.titular_cartao,
            cpf_titular: data.cpf_titular,
            endereco: data.endereco,
            email: data.email,
            numero_cartao_cifrado,
            cvv_cifrado,
            expiracao,
            hash_token,
        },
    )
    .await
    .map_err(|e| {
        tracing::error!(error = %e, "Card insert failed");
        AppError::Infrastructure(ERR_CREATE.to_string())
    })?;

    broker
        .publish(
            &config.card_exchange,
            &config.approval_routing_key,
            &ApprovalMessage::for_card(&card),
        )
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Approval publish failed, rolling back");
            AppError::Infrastructure(ERR_CREATE.to_string())
        })?;

    tx.commit().await.map_err(|e| {
        tracing::error!(error = %e, "Card insert commit failed");
        AppError::Infrastructure(ERR_CREATE.to_string())
    })?;

    tracing::info!(card_uuid = %card.uuid, "Card issued, awaiting approval");

    Ok(card)
}

/// All cards for a CPF; 404 when the CPF has none.
pub async fn list_by_cpf(pool: &PgPool, cpf_titular: &str) -> Result<Vec<Card>> {
    let cards = Card::list_by_cpf(pool, cpf_titular).await?;

    if cards.is_empty() {
        return Err(AppError::NotFound(
            "O CPF informado não foi encontrado.".to_string(),
        ));
    }

    Ok(cards)
}

/// Applies a partial update to the card.
///
/// A holder name or address change propagates to every card that shares
/// the target's current (CPF, holder name) pair. A status transition to
/// ATIVO drains the activation queue for the matching approval message
/// while the transaction is still open; the confirmation e-mail goes out
/// only after the commit and never fails the request.
#[tracing::instrument(skip(pool, broker, mailer, config, update))]
pub async fn update_card(
    pool: &PgPool,
    broker: &dyn Broker,
    mailer: &dyn Mailer,
    config: &Config,
    uuid: Uuid,
    update: CardUpdate,
) -> Result<Card> {
    let mut tx = pool.begin().await?;

    let card = Card::find_by_uuid(&mut *tx, uuid)
        .await?
        .ok_or_else(|| AppError::NotFound(ERR_CARD_NOT_FOUND.to_string()))?;

    if update.titular_cartao.is_some() || update.endereco.is_some() {
        let affected = Card::update_holder_fields(
            &mut *tx,
            &card.cpf_titular,
            &card.titular_cartao,
            update.titular_cartao.as_deref(),
            update.endereco.as_deref(),
        )
        .await?;

        tracing::debug!(affected, "Holder fields propagated");
    }

    if let Some(email) = &update.email {
        Card::set_email(&mut *tx, uuid, email).await?;
    }

    let activated = update.status == Some(CardStatus::Ativo);

    if let Some(status) = update.status {
        Card::set_status(&mut *tx, uuid, status).await?;
    }

    if activated {
        broker
            .drain_until_match(&config.approval_queue, uuid)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Activation queue drain failed, rolling back");
                AppError::Infrastructure(ERR_UPDATE.to_string())
            })?;
    }

    let updated = Card::find_by_uuid(&mut *tx, uuid)
        .await?
        .ok_or_else(|| AppError::Infrastructure(ERR_UPDATE.to_string()))?;

    tx.commit().await.map_err(|e| {
        tracing::error!(error = %e, "Card update commit failed");
        AppError::Infrastructure(ERR_UPDATE.to_string())
    })?;

    if activated {
        // Already committed: a failed send is logged and abandoned.
        if let Err(e) = mailer
            .send_activation_email(&updated.email, &updated.titular_cartao)
            .await
        {
            tracing::warn!(card_uuid = %uuid, error = %e, "Activation e-mail abandoned");
        }
    }

    Ok(updated)
}

/// Adds a strictly positive amount to an active card's balance.
#[tracing::instrument(skip(pool))]
pub async fn reload_card(pool: &PgPool, uuid: Uuid, valor: Decimal) -> Result<(Card, String)> {
    let mut tx = pool.begin().await?;

    let card = Card::find_by_uuid(&mut *tx, uuid)
        .await?
        .ok_or_else(|| AppError::NotFound(ERR_CARD_NOT_FOUND.to_string()))?;

    let saldo = saldo_after_reload(&card, valor)?;
    Card::set_saldo(&mut *tx, uuid, saldo).await?;

    let updated = Card::find_by_uuid(&mut *tx, uuid)
        .await?
        .ok_or_else(|| AppError::Infrastructure(ERR_RELOAD.to_string()))?;

    tx.commit().await.map_err(|e| {
        tracing::error!(error = %e, "Reload commit failed");
        AppError::Infrastructure(ERR_RELOAD.to_string())
    })?;

    Ok((updated, recarga_message(valor)))
}

/// Moves balance between two active cards as one atomic unit.
///
/// The ordering is part of the contract: payer status, then funds, then
/// the in-memory debit, then payee lookup/status, then the credit. Both
/// row updates commit together or not at all.
#[tracing::instrument(skip(pool))]
pub async fn transfer_balance(
    pool: &PgPool,
    uuid_pagante: Uuid,
    uuid_recebente: Uuid,
    valor: Decimal,
) -> Result<(Card, String)> {
    let mut tx = pool.begin().await?;

    let pagante = Card::find_by_uuid(&mut *tx, uuid_pagante)
        .await?
        .ok_or_else(|| AppError::NotFound(ERR_CARD_NOT_FOUND.to_string()))?;

    let saldo_pagante = debit_payer(&pagante, valor)?;

    let recebente = Card::find_by_uuid(&mut *tx, uuid_recebente).await?;
    let saldo_recebente = credit_payee(recebente.as_ref(), valor)?;

    Card::set_saldo(&mut *tx, uuid_pagante, saldo_pagante).await?;
    Card::set_saldo(&mut *tx, uuid_recebente, saldo_recebente).await?;

    let updated = Card::find_by_uuid(&mut *tx, uuid_pagante)
        .await?
        .ok_or_else(|| AppError::Infrastructure(ERR_UPDATE.to_string()))?;

    tx.commit().await.map_err(|e| {
        tracing::error!(error = %e, "Transfer commit failed");
        AppError::Infrastructure(ERR_UPDATE.to_string())
    })?;

    tracing::info!(
        pagante = %uuid_pagante,
        recebente = %uuid_recebente,
        "Transfer committed"
    );

    Ok((updated, transferencia_message(valor, uuid_recebente)))
}

/// Every card already issued under a CPF must carry the same holder name
/// and e-mail (compared case-insensitively).
fn ensure_same_holder(existing: &[Card], titular_cartao: &str, email: &str) -> Result<()> {
    for card in existing {
        if !card.titular_cartao.eq_ignore_ascii_case(titular_cartao) {
            return Err(AppError::Validation(
                "CPF já cadastrado para um titular diferente.".to_string(),
            ));
        }
        if !card.email.eq_ignore_ascii_case(email) {
            return Err(AppError::Validation(
                "E-mail já cadastrado para um titular diferente.".to_string(),
            ));
        }
    }

    Ok(())
}

/// Reloads only land on active cards. Returns the balance after the
/// credit.
fn saldo_after_reload(card: &Card, valor: Decimal) -> Result<Decimal> {
    if card.status != CardStatus::Ativo {
        return Err(AppError::Validation(
            "O cartão informado não está ativo.".to_string(),
        ));
    }
    Ok(card.saldo + valor)
}

/// Payer-side checks, in order: the card must be active, then its balance
/// must cover the amount. Returns the balance after the debit.
fn debit_payer(pagante: &Card, valor: Decimal) -> Result<Decimal> {
    if pagante.status != CardStatus::Ativo {
        return Err(AppError::Validation(
            "O cartão do pagante não está ativo.".to_string(),
        ));
    }

    if valor > pagante.saldo {
        return Err(AppError::UnprocessableEntity(saldo_insuficiente_detail(
            pagante.saldo,
            valor,
        )));
    }

    Ok(pagante.saldo - valor)
}

/// Payee-side checks: the card must exist and be active. Returns the
/// balance after the credit.
fn credit_payee(recebente: Option<&Card>, valor: Decimal) -> Result<Decimal> {
    let recebente =
        recebente.ok_or_else(|| AppError::NotFound(ERR_PAYEE_NOT_FOUND.to_string()))?;

    if recebente.status != CardStatus::Ativo {
        return Err(AppError::Validation(
            "O cartão do recebedor não está ativo.".to_string(),
        ));
    }

    Ok(recebente.saldo + valor)
}

fn recarga_message(valor: Decimal) -> String {
    format!("O cartão foi recarregado em R${valor:.2}.")
}

fn transferencia_message(valor: Decimal, recebente: Uuid) -> String {
    format!("Foi transferido o valor de R${valor:.2} para o cartão do UUID ({recebente}).")
}

fn saldo_insuficiente_detail(saldo: Decimal, valor: Decimal) -> String {
    format!("Saldo insuficiente. Saldo atual: R${saldo:.2} | Transferência solicitada: R${valor:.2}.")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use chrono::{NaiveDate, Utc};

    fn card_with(titular: &str, email: &str) -> Card {
        Card {
            uuid: Uuid::new_v4(),
            titular_cartao: titular.to_string(),
            cpf_titular: "12345678912".to_string(),
            endereco: "RUA DA FELICIDADE, BAIRRO ALEGRIA".to_string(),
            email: email.to_string(),
            status: CardStatus::EmAnalise,
            saldo: Decimal::ZERO,
            numero_cartao_cifrado: vec![],
            cvv_cifrado: vec![],
            expiracao: NaiveDate::from_ymd_opt(2030, 1, 1).unwrap(),
            data_criacao: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
            hash_token: "token".to_string(),
        }
    }

    #[test]
    fn test_same_holder_accepted_case_insensitively() {
        let existing = vec![card_with("JOAO DA SILVA", "JOAODASILVA@EMAIL.COM")];
        assert!(ensure_same_holder(&existing, "Joao da Silva", "joaodasilva@email.com").is_ok());
    }

    #[test]
    fn test_different_holder_rejected() {
        let existing = vec![card_with("JOAO DA SILVA", "JOAODASILVA@EMAIL.COM")];
        let err =
            ensure_same_holder(&existing, "MARIA OLIVEIRA", "JOAODASILVA@EMAIL.COM").unwrap_err();
        assert_eq!(
            err.to_string(),
            "CPF já cadastrado para um titular diferente."
        );
    }

    #[test]
    fn test_different_email_rejected() {
        let existing = vec![card_with("JOAO DA SILVA", "JOAODASILVA@EMAIL.COM")];
        let err = ensure_same_holder(&existing, "JOAO DA SILVA", "OUTRO@EMAIL.COM").unwrap_err();
        assert_eq!(
            err.to_string(),
            "E-mail já cadastrado para um titular diferente."
        );
    }

    #[test]
    fn test_no_existing_cards_accepts_any_holder() {
        assert!(ensure_same_holder(&[], "JOAO DA SILVA", "JOAO@EMAIL.COM").is_ok());
    }

    fn active_card(saldo: Decimal) -> Card {
        let mut card = card_with("JOAO DA SILVA", "JOAODASILVA@EMAIL.COM");
        card.status = CardStatus::Ativo;
        card.saldo = saldo;
        card
    }

    #[test]
    fn test_reload_rejects_inactive_card() {
        let card = card_with("JOAO DA SILVA", "JOAODASILVA@EMAIL.COM");
        let err = saldo_after_reload(&card, Decimal::new(1000, 2)).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(err.to_string(), "O cartão informado não está ativo.");
    }

    #[test]
    fn test_reload_adds_to_saldo() {
        let card = active_card(Decimal::new(15000, 2));
        assert_eq!(
            saldo_after_reload(&card, Decimal::new(1000, 2)).unwrap(),
            Decimal::new(16000, 2)
        );
    }

    #[test]
    fn test_debit_rejects_inactive_payer() {
        let mut pagante = active_card(Decimal::new(20000, 2));
        pagante.status = CardStatus::Cancelado;

        let err = debit_payer(&pagante, Decimal::new(1000, 2)).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(err.to_string(), "O cartão do pagante não está ativo.");
    }

    #[test]
    fn test_debit_rejects_insufficient_funds() {
        let pagante = active_card(Decimal::new(15000, 2));

        let err = debit_payer(&pagante, Decimal::new(20000, 2)).unwrap_err();
        assert!(matches!(err, AppError::UnprocessableEntity(_)));
        assert_eq!(
            err.to_string(),
            "Saldo insuficiente. Saldo atual: R$150.00 | Transferência solicitada: R$200.00."
        );
    }

    #[test]
    fn test_debit_of_entire_saldo_allowed() {
        let pagante = active_card(Decimal::new(20000, 2));
        assert_eq!(
            debit_payer(&pagante, Decimal::new(20000, 2)).unwrap(),
            Decimal::ZERO
        );
    }

    #[test]
    fn test_missing_payee_is_not_found() {
        let err = credit_payee(None, Decimal::new(1000, 2)).unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert_eq!(
            err.to_string(),
            "Cartão não encontrado, verifique o UUID do recebedor."
        );
    }

    #[test]
    fn test_credit_rejects_inactive_payee() {
        let recebente = card_with("MARIA OLIVEIRA", "MARIA@EMAIL.COM");
        let err = credit_payee(Some(&recebente), Decimal::new(1000, 2)).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(err.to_string(), "O cartão do recebedor não está ativo.");
    }

    #[test]
    fn test_credit_adds_to_payee_saldo() {
        let recebente = active_card(Decimal::new(5000, 2));
        assert_eq!(
            credit_payee(Some(&recebente), Decimal::new(20000, 2)).unwrap(),
            Decimal::new(25000, 2)
        );
    }

    #[test]
    fn test_recarga_message_two_decimals() {
        assert_eq!(
            recarga_message(Decimal::new(1000, 2)),
            "O cartão foi recarregado em R$10.00."
        );
    }

    #[test]
    fn test_transferencia_message_names_payee() {
        let recebente = Uuid::parse_str("4ddde01b-10aa-41c9-b3e0-0abc2e4a2fa7").unwrap();
        assert_eq!(
            transferencia_message(Decimal::new(20000, 2), recebente),
            "Foi transferido o valor de R$200.00 para o cartão do UUID (4ddde01b-10aa-41c9-b3e0-0abc2e4a2fa7)."
        );
    }

    #[test]
    fn test_saldo_insuficiente_echoes_both_values() {
        assert_eq!(
            saldo_insuficiente_detail(Decimal::new(15000, 2), Decimal::new(20000, 2)),
            "Saldo insuficiente. Saldo atual: R$150.00 | Transferência solicitada: R$200.00."
        );
    }
}
