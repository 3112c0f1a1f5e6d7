use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for Knockout Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::sessions::sign_in,
        crate::routes::sessions::sign_out,
        crate::routes::contests::list_contests,
        crate::routes::contests::get_contest,
        crate::routes::contests::list_participants,
        crate::routes::contests::join_contest,
        crate::routes::contests::leave_contest,
        crate::routes::contests::round_view,
        crate::routes::contests::submit_answer,
        crate::routes::sse::contest_stream,
        crate::routes::sse::round_stream,
        crate::routes::sse::admin_stream,
        crate::routes::admin::list_contests,
        crate::routes::admin::create_contest,
        crate::routes::admin::get_contest,
        crate::routes::admin::set_lobby,
        crate::routes::admin::set_submission,
        crate::routes::admin::set_round,
        crate::routes::admin::finish_contest,
        crate::routes::admin::list_questions,
        crate::routes::admin::create_question,
        crate::routes::admin::update_question,
        crate::routes::admin::delete_question,
        crate::routes::admin::set_correct_option,
        crate::routes::admin::list_participants,
        crate::routes::admin::reinstate_participants,
        crate::routes::admin::tally,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::session::SignInRequest,
            crate::dto::session::SessionResponse,
            crate::dto::contest::PhaseDto,
            crate::dto::contest::WindowDto,
            crate::dto::contest::ContestSummary,
            crate::dto::contest::ParticipantSummary,
            crate::dto::contest::QuestionSummary,
            crate::dto::participant::SubmitAnswerRequest,
            crate::dto::participant::ViewStatusDto,
            crate::dto::participant::RoundViewResponse,
            crate::dto::participant::JoinResponse,
            crate::dto::admin::CreateContestRequest,
            crate::dto::admin::ToggleRequest,
            crate::dto::admin::SetRoundRequest,
            crate::dto::admin::QuestionRequest,
            crate::dto::admin::CorrectOptionRequest,
            crate::dto::admin::ReinstateRequest,
            crate::dto::admin::ReinstateResponse,
            crate::dto::admin::StatusFilter,
            crate::dto::admin::OptionCount,
            crate::dto::admin::TallyResponse,
            crate::dto::sse::Handshake,
            crate::dto::sse::AdminHandshake,
            crate::dto::sse::SystemStatus,
            crate::dto::sse::ChangeKindDto,
            crate::dto::sse::ContestChangedEvent,
            crate::dto::sse::ParticipantChangedEvent,
            crate::dto::sse::QuestionChangedEvent,
            crate::dto::sse::AnswerRecordedEvent,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "sessions", description = "Participant sessions"),
        (name = "contests", description = "Contest listings and participant actions"),
        (name = "sse", description = "Server-sent events streams"),
        (name = "admin", description = "Contest administration, guarded by the admin token"),
    )
)]
/// OpenAPI document covering every route.
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_admin_and_participant_paths() {
        let doc = ApiDoc::openapi();
        let paths = &doc.paths.paths;
        assert!(paths.contains_key("/contests/{id}/answer"));
        assert!(paths.contains_key("/admin/contests/{id}/reinstate"));
        assert!(paths.contains_key("/sse/contests/{id}/me"));
    }
}
