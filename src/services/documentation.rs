use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for QuizPulse Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::health::consumer_health,
        crate::routes::answers::submit_answer,
        crate::routes::answers::complete_attempt,
        crate::routes::answers::finalize_quiz,
        crate::routes::quizzes::activate_quiz,
        crate::routes::quizzes::reset_quiz,
        crate::routes::quizzes::delete_quiz,
        crate::routes::quizzes::stats_projection,
        crate::routes::quizzes::leaderboard_view,
        crate::routes::events::quiz_events,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::health::ConsumerHealthResponse,
            crate::dto::health::BacklogMetricsDto,
            crate::dto::answer::SubmitAnswerRequest,
            crate::dto::answer::SubmitAnswerResponse,
            crate::dto::answer::CompleteAttemptRequest,
            crate::dto::answer::CompleteAttemptResponse,
            crate::dto::quiz::ActivateQuizRequest,
            crate::dto::quiz::QuestionRef,
            crate::dto::stats::StatsProjectionResponse,
            crate::dto::leaderboard::LeaderboardViewResponse,
            crate::dto::leaderboard::RankedPlayer,
            crate::dto::events::StatsUpdatedEvent,
            crate::dto::events::PlayerAnsweredEvent,
            crate::dto::events::AdminAnswerEvent,
            crate::dto::events::LeaderboardUpdatedEvent,
            crate::dto::events::PlayersCountEvent,
        )
    ),
    tags(
        (name = "answers", description = "Answer submission and attempt completion"),
        (name = "quizzes", description = "Quiz activation, eviction, and live projections"),
        (name = "events", description = "Server-sent event streams per quiz room"),
        (name = "health", description = "Health check endpoints"),
    )
)]
pub struct ApiDoc;
