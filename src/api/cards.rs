use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use rust_decimal::Decimal;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::{middleware::auth, AppState};
use crate::error::{AppError, Result};
use crate::models::{Card, CardStatus};
use crate::services::{
    card_service::{self, CardUpdate, NewCard},
    encryption, validation,
};

// Request types

#[derive(Debug, Deserialize)]
pub struct CardRequest {
    pub titular_cartao: String,
    pub cpf_titular: String,
    pub endereco: String,
    pub email: String,
}

impl CardRequest {
    fn validate(self) -> Result<NewCard> {
        Ok(NewCard {
            titular_cartao: validation::validate_titular(&self.titular_cartao)?,
            cpf_titular: validation::validate_cpf(&self.cpf_titular)?,
            endereco: validation::validate_endereco(&self.endereco)?,
            email: validation::validate_email(&self.email)?,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CardUpdateRequest {
    pub titular_cartao: Option<String>,
    pub endereco: Option<String>,
    pub status: Option<String>,
    pub email: Option<String>,
}

impl CardUpdateRequest {
    fn is_empty(&self) -> bool {
        self.titular_cartao.is_none()
            && self.endereco.is_none()
            && self.status.is_none()
            && self.email.is_none()
    }

    fn validate(self) -> Result<CardUpdate> {
        if self.is_empty() {
            return Err(AppError::UnprocessableEntity(
                "Nenhum campo para atualizar foi fornecido.".to_string(),
            ));
        }

        Ok(CardUpdate {
            titular_cartao: self
                .titular_cartao
                .as_deref()
                .map(validation::validate_titular_update)
                .transpose()?,
            endereco: self
                .endereco
                .as_deref()
                .map(validation::validate_endereco_update)
                .transpose()?,
            status: self
                .status
                .as_deref()
                .map(validation::validate_status)
                .transpose()?,
            email: self
                .email
                .as_deref()
                .map(validation::validate_email)
                .transpose()?,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct RecargaRequest {
    pub valor: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct TransferenciaRequest {
    pub uuid_pagante: Uuid,
    pub uuid_recebente: Uuid,
    pub valor: Decimal,
}

// Response types

#[derive(Debug, Serialize)]
pub struct ResponseWrapper<T> {
    pub status_code: u16,
    pub message: String,
    pub data: T,
}

/// Issuance projection: no balance and no card-network fields yet, the
/// card is still under review.
#[derive(Debug, Serialize)]
pub struct CardIssuedData {
    pub titular_cartao: String,
    pub cpf_titular: String,
    pub endereco: String,
    pub status: CardStatus,
    pub token: String,
}

impl CardIssuedData {
    fn from_card(card: &Card) -> Self {
        Self {
            titular_cartao: card.titular_cartao.clone(),
            cpf_titular: card.cpf_titular.clone(),
            endereco: card.endereco.clone(),
            status: card.status,
            token: card.hash_token.clone(),
        }
    }
}

/// Full projection. Card number and CVV are decrypted here and nowhere
/// else.
#[derive(Debug, Serialize)]
pub struct CardData {
    pub uuid: Uuid,
    pub titular_cartao: String,
    pub cpf_titular: String,
    pub status: CardStatus,
    pub email: String,
    pub endereco: String,
    pub saldo: Decimal,
    pub numero_cartao: String,
    pub cvv: String,
    pub expiracao: String,
    pub data_criacao: String,
    pub token: String,
}

impl CardData {
    fn from_card(card: &Card, key: &[u8; 32]) -> Result<Self> {
        Ok(Self {
            uuid: card.uuid,
            titular_cartao: card.titular_cartao.clone(),
            cpf_titular: card.cpf_titular.clone(),
            status: card.status,
            email: card.email.clone(),
            endereco: card.endereco.clone(),
            saldo: card.saldo,
            numero_cartao: encryption::decrypt(&card.numero_cartao_cifrado, key)?,
            cvv: encryption::decrypt(&card.cvv_cifrado, key)?,
            expiracao: card.expiracao_formatada(),
            data_criacao: card.data_criacao_formatada(),
            token: card.hash_token.clone(),
        })
    }
}

#[derive(Debug, Serialize)]
pub struct CartoesPorCpfData {
    pub cartoes: Vec<CardData>,
}

// Handlers

async fn solicitar_cartao(
    State(state): State<AppState>,
    Json(body): Json<CardRequest>,
) -> Result<impl IntoResponse> {
    let data = body.validate()?;

    let card =
        card_service::issue_card(&state.pool, state.broker.as_ref(), &state.config, data).await?;

    Ok((
        StatusCode::CREATED,
        Json(ResponseWrapper {
            status_code: StatusCode::CREATED.as_u16(),
            message: "Cartão criado com sucesso.".to_string(),
            data: CardIssuedData::from_card(&card),
        }),
    ))
}

async fn listar_cartoes(
    State(state): State<AppState>,
    Path(cpf_titular): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse> {
    let cpf =
        auth::authorize_cpf(&state.pool, &state.config, &headers, &cpf_titular).await?;

    let cards = card_service::list_by_cpf(&state.pool, &cpf).await?;

    let key = encryption::derive_key(state.config.encryption_key.expose_secret());
    let cartoes = cards
        .iter()
        .map(|card| CardData::from_card(card, &key))
        .collect::<Result<Vec<_>>>()?;

    Ok(Json(ResponseWrapper {
        status_code: StatusCode::OK.as_u16(),
        message: "Todos os cartões foram listados com sucesso.".to_string(),
        data: CartoesPorCpfData { cartoes },
    }))
}

async fn atualizar_dados(
    State(state): State<AppState>,
    Path(uuid): Path<Uuid>,
    headers: HeaderMap,
    Json(body): Json<CardUpdateRequest>,
) -> Result<impl IntoResponse> {
    // An empty partial body is rejected before the target is even looked at
    let update = body.validate()?;

    auth::authorize_card(&state.pool, &state.config, &headers, uuid).await?;

    let card = card_service::update_card(
        &state.pool,
        state.broker.as_ref(),
        state.mailer.as_ref(),
        &state.config,
        uuid,
        update,
    )
    .await?;

    let key = encryption::derive_key(state.config.encryption_key.expose_secret());

    Ok(Json(ResponseWrapper {
        status_code: StatusCode::OK.as_u16(),
        message: "Dados atualizados com sucesso.".to_string(),
        data: CardData::from_card(&card, &key)?,
    }))
}

async fn recarregar_cartao(
    State(state): State<AppState>,
    Path(uuid): Path<Uuid>,
    headers: HeaderMap,
    Json(body): Json<RecargaRequest>,
) -> Result<impl IntoResponse> {
    let valor = validation::validate_valor(body.valor)?;

    auth::authorize_card(&state.pool, &state.config, &headers, uuid).await?;

    let (card, message) = card_service::reload_card(&state.pool, uuid, valor).await?;

    let key = encryption::derive_key(state.config.encryption_key.expose_secret());

    Ok(Json(ResponseWrapper {
        status_code: StatusCode::OK.as_u16(),
        message,
        data: CardData::from_card(&card, &key)?,
    }))
}

async fn transferir_saldo(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<TransferenciaRequest>,
) -> Result<impl IntoResponse> {
    let valor = validation::validate_valor(body.valor)?;

    // The payer card must be the one the presented token is bound to
    auth::authorize_card(&state.pool, &state.config, &headers, body.uuid_pagante).await?;

    let (card, message) = card_service::transfer_balance(
        &state.pool,
        body.uuid_pagante,
        body.uuid_recebente,
        valor,
    )
    .await?;

    let key = encryption::derive_key(state.config.encryption_key.expose_secret());

    Ok(Json(ResponseWrapper {
        status_code: StatusCode::OK.as_u16(),
        message,
        data: CardData::from_card(&card, &key)?,
    }))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/cartoes/solicitar_cartao", post(solicitar_cartao))
        .route("/cartoes/listar_cartoes/cpf/:cpf_titular", get(listar_cartoes))
        .route("/cartoes/atualizar_dados/:uuid", put(atualizar_dados))
        .route("/cartoes/recarregar_cartao/:uuid", post(recarregar_cartao))
        .route("/cartoes/transferir_saldo", post(transferir_saldo))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_update_rejected() {
        let body: CardUpdateRequest = serde_json::from_str("{}").unwrap();
        let err = body.validate().unwrap_err();
        assert!(matches!(err, AppError::UnprocessableEntity(_)));
    }

    #[test]
    fn test_unknown_update_field_rejected() {
        let result = serde_json::from_str::<CardUpdateRequest>(r#"{"saldo": 100}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_update_normalizes_fields() {
        let body: CardUpdateRequest =
            serde_json::from_str(r#"{"titular_cartao": "joão da silva", "status": "ATIVO"}"#)
                .unwrap();
        let update = body.validate().unwrap();
        assert_eq!(update.titular_cartao.as_deref(), Some("JOAO DA SILVA"));
        assert_eq!(update.status, Some(CardStatus::Ativo));
        assert!(update.endereco.is_none());
    }

    #[test]
    fn test_update_invalid_status_is_bad_request() {
        let body: CardUpdateRequest =
            serde_json::from_str(r#"{"status": "APROVADO"}"#).unwrap();
        let err = body.validate().unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn test_card_request_validation() {
        let body: CardRequest = serde_json::from_str(
            r#"{
                "titular_cartao": "joão  da silva",
                "cpf_titular": "12345678912",
                "endereco": "rua da  felicidade, bairro alegria",
                "email": "joaodasilva@email.com"
            }"#,
        )
        .unwrap();

        let data = body.validate().unwrap();
        assert_eq!(data.titular_cartao, "JOAO DA SILVA");
        assert_eq!(data.endereco, "RUA DA FELICIDADE, BAIRRO ALEGRIA");
        assert_eq!(data.email, "JOAODASILVA@EMAIL.COM");
    }

    #[test]
    fn test_transferencia_request_shape() {
        let body: TransferenciaRequest = serde_json::from_str(
            r#"{
                "uuid_pagante": "1dac2271-04a0-43ab-8b5f-71ec292acbbb",
                "uuid_recebente": "4ddde01b-10aa-41c9-b3e0-0abc2e4a2fa7",
                "valor": 200.00
            }"#,
        )
        .unwrap();
        assert_eq!(body.valor, Decimal::new(200, 0));
    }
}
