use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::dto::validation::validate_not_blank;

/// Sign in as an existing user id, or as a fresh one when omitted.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct SignInRequest {
    /// Reuse this user id; a new one is generated when omitted.
    pub user_id: Option<Uuid>,
    /// Name shown to other participants.
    #[validate(length(min = 1, max = 64), custom(function = "validate_not_blank"))]
    pub display_name: String,
}

/// Issued session. Send `token` back in the `x-session-token` header.
#[derive(Debug, Serialize, ToSchema)]
pub struct SessionResponse {
    /// Session token.
    pub token: String,
    /// User the session signs in as.
    pub user_id: Uuid,
    /// Name shown to other participants.
    pub display_name: String,
}
