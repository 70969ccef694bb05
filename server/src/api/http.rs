use axum::{
    body::Bytes,
    extract::State as AxumState,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use raspa_execution::{run_blocking, DepositError, PlayError, StoreError};
use raspa_types::api::{
    AckResponse, AffiliateResponse, ApplyCouponRequest, ApplyCouponResponse, CreateAccountResponse,
    CreateAffiliateRequest, DepositWebhook, ErrorResponse, PlayRequest, PlayResponse,
    ProfileResponse, WithdrawRequest, WithdrawResponse,
};
use raspa_types::casino::{AccountId, Money};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Write;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error as ThisError;

use super::WEBHOOK_SECRET_HEADER;
use crate::metrics::{GameMetricsSnapshot, HttpMetricsSnapshot, LatencySnapshot, WsMetricsSnapshot};
use crate::Server;

const PAID_EVENT: &str = "charge.paid";

/// Request failure rendered as `{success: false, message}` with a matching status.
#[derive(Debug, ThisError)]
pub(super) enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(ErrorResponse::new(self.to_string()))).into_response()
    }
}

impl From<PlayError> for ApiError {
    fn from(err: PlayError) -> Self {
        match err {
            PlayError::InvalidStake(_) | PlayError::InsufficientBalance { .. } => {
                ApiError::BadRequest(err.to_string())
            }
            PlayError::AccountNotFound(_) => ApiError::NotFound(err.to_string()),
            PlayError::AccountBusy(_) => ApiError::Conflict(err.to_string()),
            PlayError::Overflow(_) | PlayError::Persistence(_) => {
                ApiError::Internal("play could not be recorded".to_string())
            }
        }
    }
}

impl From<DepositError> for ApiError {
    fn from(err: DepositError) -> Self {
        match err {
            DepositError::InvalidAmount(_)
            | DepositError::InsufficientWithdrawable { .. }
            | DepositError::InvalidCoupon(_) => ApiError::BadRequest(err.to_string()),
            DepositError::AccountNotFound(_) => ApiError::NotFound(err.to_string()),
            DepositError::AccountBusy(_) | DepositError::AlreadyAffiliated(_) => {
                ApiError::Conflict(err.to_string())
            }
            DepositError::Overflow(_) | DepositError::Persistence(_) => {
                ApiError::Internal("account update could not be recorded".to_string())
            }
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        if let StoreError::Conflict(what) = &err {
            return ApiError::Conflict(format!("{what} already exists"));
        }
        tracing::error!(%err, "store failure");
        ApiError::Internal("storage unavailable".to_string())
    }
}

fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, ApiError> {
    serde_json::from_slice(body)
        .map_err(|err| ApiError::BadRequest(format!("invalid request body: {err}")))
}

/// Parse a client-supplied amount (JSON number or decimal string).
fn parse_money(value: &serde_json::Value) -> Result<Money, String> {
    if value.is_null() {
        return Err("amount is required".to_string());
    }
    serde_json::from_value(value.clone()).map_err(|err| err.to_string())
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

async fn authenticate(server: &Server, headers: &HeaderMap) -> Result<AccountId, ApiError> {
    let token = bearer_token(headers)
        .ok_or_else(|| ApiError::Unauthorized("missing bearer token".to_string()))?;
    server
        .sessions()
        .resolve(token)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("invalid session token".to_string()))
}

fn authorize_admin(server: &Server, headers: &HeaderMap) -> Result<(), ApiError> {
    let Some(expected) = server.config.admin_token.as_deref() else {
        return Err(ApiError::Unauthorized(
            "affiliate administration is disabled".to_string(),
        ));
    };
    if bearer_token(headers) != Some(expected) {
        return Err(ApiError::Unauthorized("invalid admin token".to_string()));
    }
    Ok(())
}

#[derive(Serialize)]
struct HealthzResponse {
    ok: bool,
}

pub(super) async fn healthz() -> Response {
    Json(HealthzResponse { ok: true }).into_response()
}

pub(super) async fn create_account(
    AxumState(server): AxumState<Arc<Server>>,
) -> Result<Response, ApiError> {
    let account = server.casino().create_account().await?;
    let token = server.sessions().issue(account.id).await?;
    Ok((
        StatusCode::CREATED,
        Json(CreateAccountResponse {
            account_id: account.id,
            token,
        }),
    )
        .into_response())
}

pub(super) async fn me(
    AxumState(server): AxumState<Arc<Server>>,
    headers: HeaderMap,
) -> Result<Json<ProfileResponse>, ApiError> {
    let id = authenticate(&server, &headers).await?;
    let account = server
        .casino()
        .account(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("account {id} not found")))?;
    Ok(Json(ProfileResponse::from(&account)))
}

pub(super) async fn play(
    AxumState(server): AxumState<Arc<Server>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<PlayResponse>, ApiError> {
    let id = authenticate(&server, &headers).await?;
    let request: PlayRequest = parse_body(&body)?;
    let stake = parse_money(&request.price).map_err(|reason| {
        server.game_metrics().inc_rejected_play();
        tracing::warn!(account_id = %id, %reason, "rejected unparseable stake");
        ApiError::from(PlayError::InvalidStake(reason))
    })?;

    let start = Instant::now();
    match server.casino().play_game(id, stake).await {
        Ok(outcome) => {
            server.game_metrics().record_play(&outcome, start.elapsed());
            Ok(Json(PlayResponse::from(&outcome)))
        }
        Err(err) => {
            match &err {
                PlayError::AccountBusy(_) => server.game_metrics().inc_busy_play(),
                PlayError::Overflow(_) | PlayError::Persistence(_) => {
                    server.game_metrics().inc_failed_play()
                }
                _ => server.game_metrics().inc_rejected_play(),
            }
            Err(err.into())
        }
    }
}

pub(super) async fn request_withdrawal(
    AxumState(server): AxumState<Arc<Server>>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let id = authenticate(&server, &headers).await?;
    let status = server.casino().request_withdrawal(id).await?;
    Ok(Json(status).into_response())
}

pub(super) async fn withdraw(
    AxumState(server): AxumState<Arc<Server>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WithdrawResponse>, ApiError> {
    let id = authenticate(&server, &headers).await?;
    let request: WithdrawRequest = parse_body(&body)?;
    let amount = parse_money(&request.amount)
        .map_err(|reason| ApiError::from(DepositError::InvalidAmount(reason)))?;
    let balances = server.casino().withdraw(id, amount).await?;
    server.game_metrics().record_withdrawal(amount);
    tracing::info!(
        account_id = %id,
        amount = %amount,
        has_pix_key = request.pix_key.is_some(),
        "withdrawal accepted for payout"
    );
    Ok(Json(WithdrawResponse {
        success: true,
        balances,
    }))
}

pub(super) async fn deposit_webhook(
    AxumState(server): AxumState<Arc<Server>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<AckResponse>, ApiError> {
    if let Some(secret) = server.config.webhook_secret.as_deref() {
        let provided = headers
            .get(WEBHOOK_SECRET_HEADER)
            .and_then(|value| value.to_str().ok());
        if provided != Some(secret) {
            tracing::warn!("deposit webhook rejected: bad secret");
            return Err(ApiError::Unauthorized("invalid webhook secret".to_string()));
        }
    }
    let webhook: DepositWebhook = parse_body(&body)?;
    if webhook.event != PAID_EVENT {
        server.game_metrics().inc_ignored_webhook();
        tracing::info!(event = %webhook.event, account_id = %webhook.data.account_id, "deposit webhook ignored");
        return Ok(Json(AckResponse {
            success: true,
            message: format!("event {} ignored", webhook.event),
        }));
    }

    let receipt = server
        .casino()
        .credit_deposit(webhook.data.account_id, webhook.data.amount)
        .await?;
    server.game_metrics().record_deposit(receipt.amount);
    Ok(Json(AckResponse {
        success: true,
        message: format!(
            "deposit of {} credited, {} unlocked",
            receipt.amount, receipt.unlocked
        ),
    }))
}

pub(super) async fn apply_coupon(
    AxumState(server): AxumState<Arc<Server>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ApplyCouponResponse>, ApiError> {
    let id = authenticate(&server, &headers).await?;
    let request: ApplyCouponRequest = parse_body(&body)?;
    let receipt = server.casino().apply_coupon(id, &request.coupon_code).await?;
    let bonus = receipt.affiliate.bonus_amount;
    server.game_metrics().record_coupon(bonus);
    Ok(Json(ApplyCouponResponse {
        success: true,
        message: format!("coupon applied, bonus of {bonus} credited"),
        affiliate_id: receipt.affiliate.id,
        bonus_amount: bonus,
        new_balance: receipt.balances.real_balance,
    }))
}

pub(super) async fn create_affiliate(
    AxumState(server): AxumState<Arc<Server>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    authorize_admin(&server, &headers)?;
    let request: CreateAffiliateRequest = parse_body(&body)?;
    let name = request.name.trim().to_string();
    let code = request.referral_code.trim().to_string();
    if name.is_empty() || code.is_empty() {
        return Err(ApiError::BadRequest(
            "name and referralCode are required".to_string(),
        ));
    }
    let store = server.casino().store().clone();
    let bonus = request.bonus_amount;
    let affiliate = run_blocking(move || store.create_affiliate(&name, &code, bonus)).await?;
    tracing::info!(
        affiliate_id = %affiliate.id,
        referral_code = %affiliate.referral_code,
        bonus = %affiliate.bonus_amount,
        "affiliate created"
    );
    Ok((
        StatusCode::CREATED,
        Json(AffiliateResponse {
            success: true,
            affiliate,
        }),
    )
        .into_response())
}

#[derive(Serialize)]
struct MetricsResponse {
    game: GameMetricsSnapshot,
    http: HttpMetricsSnapshot,
    ws: WsMetricsSnapshot,
    active_locks: usize,
    ws_connections: usize,
    sessions: usize,
}

pub(super) async fn metrics(
    headers: HeaderMap,
    AxumState(server): AxumState<Arc<Server>>,
) -> Response {
    if let Some(status) = metrics_auth_error(&headers) {
        return status.into_response();
    }
    Json(MetricsResponse {
        game: server.game_metrics().snapshot(),
        http: server.http_metrics().snapshot(),
        ws: server.ws_metrics().snapshot(),
        active_locks: server.casino().locks().active(),
        ws_connections: server.connections().len(),
        sessions: server.sessions().len(),
    })
    .into_response()
}

pub(super) async fn prometheus_metrics(
    headers: HeaderMap,
    AxumState(server): AxumState<Arc<Server>>,
) -> Response {
    if let Some(status) = metrics_auth_error(&headers) {
        return status.into_response();
    }
    let body = render_prometheus_metrics(&server);
    (
        StatusCode::OK,
        [(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; version=0.0.4"),
        )],
        body,
    )
        .into_response()
}

fn metrics_auth_error(headers: &HeaderMap) -> Option<StatusCode> {
    let token = std::env::var("METRICS_AUTH_TOKEN").unwrap_or_default();
    if token.is_empty() {
        return None;
    }
    let header_token = headers
        .get("x-metrics-token")
        .and_then(|value| value.to_str().ok());
    if bearer_token(headers) == Some(token.as_str()) || header_token == Some(token.as_str()) {
        None
    } else {
        Some(StatusCode::UNAUTHORIZED)
    }
}

fn render_prometheus_metrics(server: &Server) -> String {
    let game = server.game_metrics().snapshot();
    let http = server.http_metrics().snapshot();
    let ws = server.ws_metrics().snapshot();
    let mut out = String::new();

    append_counter(&mut out, "raspa_plays_total", game.plays);
    append_counter(&mut out, "raspa_wins_total", game.wins);
    append_counter(&mut out, "raspa_hook_wins_total", game.hook_wins);
    append_counter(&mut out, "raspa_recovery_wins_total", game.recovery_wins);
    append_counter(&mut out, "raspa_plays_rejected_total", game.rejected_plays);
    append_counter(&mut out, "raspa_plays_busy_total", game.busy_plays);
    append_counter(&mut out, "raspa_plays_failed_total", game.failed_plays);
    append_counter(&mut out, "raspa_staked_cents_total", game.staked_cents);
    append_counter(&mut out, "raspa_prize_cents_total", game.prize_cents);
    append_counter(&mut out, "raspa_deposits_total", game.deposits);
    append_counter(&mut out, "raspa_deposited_cents_total", game.deposited_cents);
    append_counter(&mut out, "raspa_webhooks_ignored_total", game.ignored_webhooks);
    append_counter(&mut out, "raspa_withdrawals_total", game.withdrawals);
    append_counter(&mut out, "raspa_withdrawn_cents_total", game.withdrawn_cents);
    append_counter(&mut out, "raspa_coupons_total", game.coupons);
    append_counter(&mut out, "raspa_coupon_bonus_cents_total", game.coupon_bonus_cents);
    append_histogram(&mut out, "raspa_play_latency_ms", &game.play_latency);

    append_counter(&mut out, "raspa_http_reject_unauthorized_total", http.reject_unauthorized);
    append_counter(&mut out, "raspa_http_reject_body_limit_total", http.reject_body_limit);
    append_counter(&mut out, "raspa_http_reject_rate_limit_total", http.reject_rate_limit);
    append_counter(&mut out, "raspa_http_server_errors_total", http.server_errors);

    append_counter(&mut out, "raspa_ws_connections_total", ws.connections);
    append_counter(&mut out, "raspa_ws_auth_failures_total", ws.auth_failures);
    append_counter(&mut out, "raspa_ws_replaced_total", ws.replaced);
    append_counter(&mut out, "raspa_ws_notifications_sent_total", ws.notifications_sent);
    append_counter(&mut out, "raspa_ws_notifications_dropped_total", ws.notifications_dropped);
    append_counter(&mut out, "raspa_ws_queue_full_total", ws.queue_full);
    append_counter(&mut out, "raspa_ws_send_errors_total", ws.send_errors);
    append_counter(&mut out, "raspa_ws_send_timeouts_total", ws.send_timeouts);

    append_gauge(&mut out, "raspa_ws_connections", server.connections().len());
    append_gauge(&mut out, "raspa_sessions_cached", server.sessions().len());
    append_gauge(&mut out, "raspa_account_locks_active", server.casino().locks().active());

    out
}

fn append_counter(out: &mut String, name: &str, value: u64) {
    let _ = writeln!(out, "# TYPE {name} counter");
    let _ = writeln!(out, "{name} {value}");
}

fn append_gauge(out: &mut String, name: &str, value: impl std::fmt::Display) {
    let _ = writeln!(out, "# TYPE {name} gauge");
    let _ = writeln!(out, "{name} {value}");
}

fn append_histogram(out: &mut String, name: &str, snapshot: &LatencySnapshot) {
    let _ = writeln!(out, "# TYPE {name} histogram");
    let mut cumulative = 0u64;
    for (bucket, count) in snapshot.buckets_ms.iter().zip(snapshot.counts.iter()) {
        cumulative = cumulative.saturating_add(*count);
        let _ = writeln!(out, "{name}_bucket{{le=\"{bucket}\"}} {cumulative}");
    }
    cumulative = cumulative.saturating_add(snapshot.overflow);
    let _ = writeln!(out, "{name}_bucket{{le=\"+Inf\"}} {cumulative}");
    let _ = writeln!(out, "{name}_count {}", snapshot.count);
    let sum = snapshot.avg_ms * snapshot.count as f64;
    let _ = writeln!(out, "{name}_sum {sum}");
}
