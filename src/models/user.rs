use serde::{Deserialize, Serialize};

/// JWT claims issued by the account service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
    #[serde(default)]
    pub iat: usize,
}

/// Authenticated caller, set by the auth middleware
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: String,
}
