use tracing::info;
use uuid::Uuid;

use crate::{
    dto::session::{SessionResponse, SignInRequest},
    error::ServiceError,
    state::{
        SharedState,
        session::{CurrentUser, SessionContext},
    },
};

/// Open a session for `request.user_id`, or for a new user when none is given.
pub fn sign_in(state: &SharedState, request: SignInRequest) -> SessionResponse {
    let user = CurrentUser {
        id: request.user_id.unwrap_or_else(Uuid::new_v4),
        display_name: request.display_name.trim().to_string(),
    };
    let token = state.sessions().sign_in(user.clone());
    info!(user_id = %user.id, "session opened");

    SessionResponse {
        token,
        user_id: user.id,
        display_name: user.display_name,
    }
}

/// Close the session. Every lifecycle started with it stops on its own.
pub fn sign_out(state: &SharedState, token: &str) -> Result<(), ServiceError> {
    let user = state.sessions().user(token);
    if !state.sessions().sign_out(token) {
        return Err(unknown_session());
    }
    if let Some(user) = user {
        info!(user_id = %user.id, "session closed");
    }
    Ok(())
}

/// Resolve a session token into its user and a context following sign-out.
pub fn authenticate(
    state: &SharedState,
    token: &str,
) -> Result<(CurrentUser, SessionContext), ServiceError> {
    let sessions = state.sessions();
    match (sessions.user(token), sessions.context(token)) {
        (Some(user), Some(context)) => Ok((user, context)),
        _ => Err(unknown_session()),
    }
}

fn unknown_session() -> ServiceError {
    ServiceError::Unauthorized("unknown or expired session token".into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::AppConfig, state::AppState};

    #[test]
    fn sign_in_keeps_a_given_user_id() {
        let state = AppState::new(AppConfig::default());
        let user_id = Uuid::new_v4();
        let session = sign_in(
            &state,
            SignInRequest {
                user_id: Some(user_id),
                display_name: " Ada ".into(),
            },
        );
        assert_eq!(session.user_id, user_id);
        assert_eq!(session.display_name, "Ada");

        let (user, context) = authenticate(&state, &session.token).unwrap();
        assert_eq!(user.id, user_id);
        assert!(context.current_user().is_some());
    }

    #[test]
    fn signed_out_token_is_rejected() {
        let state = AppState::new(AppConfig::default());
        let session = sign_in(
            &state,
            SignInRequest {
                user_id: None,
                display_name: "Grace".into(),
            },
        );
        sign_out(&state, &session.token).unwrap();

        assert!(matches!(
            authenticate(&state, &session.token),
            Err(ServiceError::Unauthorized(_))
        ));
        assert!(matches!(
            sign_out(&state, &session.token),
            Err(ServiceError::Unauthorized(_))
        ));
    }
}
