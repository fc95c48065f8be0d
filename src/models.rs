use serde::{Deserialize, Serialize};

// Issued challenge, sent to the client
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct ChallengeResponse {
    pub token: String,
    pub question: String,
}

// Client's answer to a challenge
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct VerifyRequest {
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub answer: String,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    pub success: bool,
    pub verification_token: String,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct ErrorBody {
    pub error: String,
}

// What the site reports about the caller's session
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct Session {
    #[serde(default)]
    pub authenticated: bool,
    #[serde(default)]
    pub role: String,
}
