use std::sync::Arc;

use crate::challenge::ChallengeService;
use crate::gate::RequestGate;
use crate::session::SessionLookup;

// app's shared state
pub struct AppState {
    pub client: reqwest::Client,
    pub upstream: String,                  // site the allowed requests go to
    pub gate: RequestGate,                 // counters + suspicion records
    pub challenges: ChallengeService,      // outstanding captcha tokens
    pub sessions: Arc<dyn SessionLookup>,  // external session/role check
}
