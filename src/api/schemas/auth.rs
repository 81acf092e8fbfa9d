use crate::domain::session::TokenPair;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub user_name: String,
    pub access_token: String,
    pub refresh_token: String,
}

impl From<TokenPair> for TokenResponse {
    fn from(pair: TokenPair) -> Self {
        Self { user_name: pair.user_name, access_token: pair.access_token, refresh_token: pair.refresh_token }
    }
}
