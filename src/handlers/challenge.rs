use std::sync::Arc;

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
};
use chrono::Utc;
use tracing::debug;

use crate::error::ChallengeError;
use crate::metrics::{CHALLENGES_ISSUED, CHALLENGE_VERIFICATIONS};
use crate::models::{ChallengeResponse, VerifyRequest, VerifyResponse};
use crate::state::AppState;

pub async fn issue_challenge(State(state): State<Arc<AppState>>) -> Json<ChallengeResponse> {
    CHALLENGES_ISSUED.inc();
    Json(state.challenges.issue(Utc::now()))
}

pub async fn verify_challenge(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<VerifyRequest>, JsonRejection>,
) -> Result<Json<VerifyResponse>, ChallengeError> {
    // an unreadable body carries no usable token
    let Json(payload) = payload.map_err(|rejection| {
        debug!(error = %rejection, "malformed verification body");
        ChallengeError::InvalidToken
    })?;

    let outcome = state.challenges.verify(&payload.token, &payload.answer, Utc::now());
    let label = match &outcome {
        Ok(_) => "success",
        Err(ChallengeError::InvalidToken) => "invalid_token",
        Err(ChallengeError::Expired) => "expired",
        Err(ChallengeError::WrongAnswer) => "wrong_answer",
    };
    CHALLENGE_VERIFICATIONS.with_label_values(&[label]).inc();

    let verification_token = outcome?;
    Ok(Json(VerifyResponse {
        success: true,
        verification_token,
    }))
}
