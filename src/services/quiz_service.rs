use std::collections::HashMap;

use time::OffsetDateTime;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    dao::{
        answer_store::AnswerStore,
        models::{AnswerRecord, NewAttempt},
    },
    dto::{
        answer::{
            CompleteAttemptRequest, CompleteAttemptResponse, SubmitAnswerRequest,
            SubmitAnswerResponse,
        },
        events::{
            AdminAnswerEvent, AnswerAction, LeaderboardUpdatedEvent, PlayerAnsweredEvent,
            ServerEvent,
        },
        leaderboard::{LeaderboardViewResponse, RankedPlayer},
        now_rfc3339,
        quiz::{ActivateQuizRequest, QuestionRef},
        stats::StatsProjectionResponse,
    },
    error::ServiceError,
    services::{
        ingest::{Admission, IngestBackend, IngestError},
        leaderboard::BoardEntry,
        lifecycle::{self, schedule_quiz_expiry},
    },
    state::{SharedState, rooms::admin_room},
};

/// Base score for a correct answer, before the time bonus.
const CORRECT_BASE_SCORE: i32 = 100;
/// Bonus points per second left on the clock.
const TIME_BONUS_PER_SECOND: i32 = 10;
/// Players shown in a leaderboard broadcast.
const LEADERBOARD_PUSH_SIZE: usize = 10;
/// Default row limit of the leaderboard view.
const LEADERBOARD_VIEW_LIMIT: usize = 50;

/// Admit an answer into the pipeline and update the live projections.
///
/// Duplicates are a defined outcome; only transient backend trouble becomes
/// an error so the client can distinguish "already answered" from "retry".
pub async fn submit_answer(
    state: &SharedState,
    quiz_id: Uuid,
    request: SubmitAnswerRequest,
) -> Result<SubmitAnswerResponse, ServiceError> {
    let store = state.require_answer_store().await?;

    // Fast paths before the slower dedup guard: an admitted-but-not-durable
    // key, then the durable unique index itself.
    if state
        .ingest()
        .has_pending(request.actor_id, request.question_id)
        || store.has_answer(request.actor_id, request.question_id).await?
    {
        return Ok(SubmitAnswerResponse::duplicate());
    }

    prime_stats(state, quiz_id, None).await?;
    lifecycle::ensure_quiz_expiry(state, quiz_id).await?;

    let time_left = request.time_left.min(3600) as i32;
    let score = if request.is_correct {
        CORRECT_BASE_SCORE + time_left * TIME_BONUS_PER_SECOND
    } else {
        0
    };

    let record = AnswerRecord {
        attempt_id: request.attempt_id,
        actor_id: request.actor_id,
        question_id: request.question_id,
        quiz_id,
        option_index: request.option_index as i32,
        is_correct: request.is_correct,
        time_left,
        score,
    };

    match state.ingest().submit(record).await {
        Admission::Duplicate => return Ok(SubmitAnswerResponse::duplicate()),
        Admission::Unavailable => {
            return Err(ServiceError::Ingest(IngestError::Unavailable));
        }
        Admission::Accepted => {}
    }

    state
        .stats()
        .record(quiz_id, request.question_index, request.option_index as usize, 1);
    state
        .fanout()
        .mark_stats_dirty(quiz_id, request.question_index);

    let timestamp = now_rfc3339();
    let action = if request.is_correct {
        AnswerAction::Correct
    } else {
        AnswerAction::Wrong
    };
    state.fanout().queue_player_answered(
        quiz_id,
        PlayerAnsweredEvent {
            player_name: request.player_name.clone(),
            action,
            question_index: request.question_index,
            timestamp: timestamp.clone(),
        },
    );

    // Privileged observers get every answer immediately; viewers only see
    // the throttled batches.
    if let Ok(event) = ServerEvent::json(
        "admin:answer",
        &AdminAnswerEvent {
            player_name: request.player_name,
            question_index: request.question_index,
            option_index: request.option_index,
            is_correct: request.is_correct,
            score,
            timestamp,
        },
    ) {
        state.rooms().publish(&admin_room(quiz_id), event);
    }

    let stats = state.stats().project(quiz_id, request.question_index);
    Ok(SubmitAnswerResponse::accepted(
        request.is_correct,
        score,
        stats,
    ))
}

/// Complete the actor's attempt: flush, aggregate, record, and rank.
///
/// The blocking flush is the one mandatory wait in the pipeline — the
/// aggregate read below must never race ahead of the actor's own writes.
pub async fn complete_attempt(
    state: &SharedState,
    quiz_id: Uuid,
    request: CompleteAttemptRequest,
) -> Result<CompleteAttemptResponse, ServiceError> {
    let store = state.require_answer_store().await?;

    if store.find_attempt(quiz_id, request.actor_id).await?.is_some() {
        let update = leaderboard_update(state, quiz_id, request.actor_id).await?;
        return Ok(CompleteAttemptResponse {
            is_first_attempt: false,
            rank: update.rank,
            total_players: update.total_players,
        });
    }

    state.ingest().flush_quiz(quiz_id).await?;

    // Seed the board from storage before this completion lands in the
    // cache, so the first completion after a restart sees its rivals.
    prime_leaderboard(state, quiz_id).await?;

    let totals = store.actor_totals(quiz_id, request.actor_id).await?;
    let total_questions = store.question_count(quiz_id).await?;

    let attempt = store
        .record_attempt(NewAttempt {
            id: Uuid::new_v4(),
            quiz_id,
            actor_id: request.actor_id,
            display_name: request.player_name,
            total_score: totals.score_sum,
            correct_count: totals.correct_count,
            total_questions,
            is_first_attempt: true,
        })
        .await?;

    state.leaderboard().record_attempt(
        quiz_id,
        BoardEntry {
            actor_id: request.actor_id,
            name: attempt.display_name,
            score: attempt.total_score,
            completed_at: attempt.completed_at,
        },
    );
    state
        .fanout()
        .mark_leaderboard_dirty(quiz_id, request.actor_id);

    let update = leaderboard_update(state, quiz_id, request.actor_id).await?;
    Ok(CompleteAttemptResponse {
        is_first_attempt: true,
        rank: update.rank,
        total_players: update.total_players,
    })
}

/// Block until every pending answer of the quiz is durably recorded.
pub async fn finalize_quiz(state: &SharedState, quiz_id: Uuid) -> Result<(), ServiceError> {
    state.ingest().flush_quiz(quiz_id).await?;
    Ok(())
}

/// Prime the caches and schedule lifecycle timers for a quiz going live.
pub async fn activate_quiz(
    state: &SharedState,
    quiz_id: Uuid,
    request: ActivateQuizRequest,
) -> Result<(), ServiceError> {
    if request.expires_at <= OffsetDateTime::now_utc() {
        lifecycle::clear_quiz_state(state, quiz_id);
        return Err(ServiceError::Expired);
    }

    prime_stats(state, quiz_id, Some(&request.questions)).await?;
    prime_leaderboard(state, quiz_id).await?;
    schedule_quiz_expiry(state, quiz_id, request.expires_at);
    debug!(%quiz_id, questions = request.questions.len(), "quiz activated");
    Ok(())
}

/// Evict all cached state of a deleted quiz and cancel its timers.
pub fn delete_quiz(state: &SharedState, quiz_id: Uuid) {
    lifecycle::clear_quiz_state(state, quiz_id);
}

/// Evict all cached state of a reset quiz so it re-primes from storage.
pub fn reset_quiz(state: &SharedState, quiz_id: Uuid) {
    lifecycle::clear_quiz_state(state, quiz_id);
}

/// Current vote percentage projection for one question.
pub async fn stats_projection(
    state: &SharedState,
    quiz_id: Uuid,
    question_index: usize,
) -> Result<StatsProjectionResponse, ServiceError> {
    // A cache miss is resolved by priming, never reported; when storage is
    // down the warm (or empty) cache still answers.
    if let Err(err) = prime_stats(state, quiz_id, None).await {
        warn!(%quiz_id, error = %err, "stats priming failed; serving cached values");
    }

    Ok(StatsProjectionResponse {
        question_index,
        stats: state.stats().project(quiz_id, question_index),
        total_answers: state.stats().total_answers(quiz_id, question_index),
    })
}

/// Leaderboard view centered on the requesting actor.
pub async fn leaderboard_view(
    state: &SharedState,
    quiz_id: Uuid,
    actor_id: Uuid,
    limit: Option<usize>,
) -> Result<LeaderboardViewResponse, ServiceError> {
    prime_leaderboard(state, quiz_id).await?;
    let limit = limit.unwrap_or(LEADERBOARD_VIEW_LIMIT);

    Ok(state.leaderboard().with_sorted(quiz_id, |sorted| {
        let total_players = sorted.len();
        let my_rank = sorted
            .iter()
            .position(|entry| entry.actor_id == actor_id)
            .map(|index| index + 1)
            .unwrap_or(total_players + 1);
        let players = sorted
            .iter()
            .take(limit)
            .enumerate()
            .map(|(index, entry)| RankedPlayer {
                name: entry.name.clone(),
                score: entry.score,
                rank: index + 1,
            })
            .collect();

        LeaderboardViewResponse {
            players,
            my_rank,
            total_players,
        }
    }))
}

/// Compact leaderboard refresh used for broadcasts and completions.
pub(crate) async fn leaderboard_update(
    state: &SharedState,
    quiz_id: Uuid,
    actor_id: Uuid,
) -> Result<LeaderboardUpdatedEvent, ServiceError> {
    prime_leaderboard(state, quiz_id).await?;

    Ok(state.leaderboard().with_sorted(quiz_id, |sorted| {
        let total_players = sorted.len();
        let rank = sorted
            .iter()
            .position(|entry| entry.actor_id == actor_id)
            .map(|index| index + 1)
            .unwrap_or(total_players + 1);
        let top_players = sorted
            .iter()
            .take(LEADERBOARD_PUSH_SIZE)
            .enumerate()
            .map(|(index, entry)| RankedPlayer {
                name: entry.name.clone(),
                score: entry.score,
                rank: index + 1,
            })
            .collect();

        LeaderboardUpdatedEvent {
            rank,
            total_players,
            top_players,
        }
    }))
}

/// Backfill the stats cache from durable aggregates, once per activation.
async fn prime_stats(
    state: &SharedState,
    quiz_id: Uuid,
    questions: Option<&[QuestionRef]>,
) -> Result<(), ServiceError> {
    if state.stats().has_quiz(quiz_id) {
        return Ok(());
    }
    let Some(store) = state.answer_store().await else {
        // Stay unprimed so the next read retries once storage returns.
        return Ok(());
    };

    let positions: HashMap<Uuid, usize> = match questions {
        Some(questions) => questions
            .iter()
            .map(|question| (question.id, question.position))
            .collect(),
        None => store
            .question_positions(quiz_id)
            .await?
            .into_iter()
            .map(|row| (row.question_id, row.position.max(0) as usize))
            .collect(),
    };

    let question_count = positions
        .values()
        .max()
        .map(|max| max + 1)
        .unwrap_or(0)
        .max(positions.len());
    state.stats().init_quiz(quiz_id, question_count);

    for aggregate in store.vote_aggregates(quiz_id).await? {
        let Some(&question_index) = positions.get(&aggregate.question_id) else {
            continue;
        };
        state.stats().record(
            quiz_id,
            question_index,
            aggregate.option_index.max(0) as usize,
            aggregate.votes.max(0) as u64,
        );
    }

    debug!(%quiz_id, questions = question_count, "stats cache primed");
    Ok(())
}

/// Backfill the leaderboard from stored first attempts when the cache is
/// empty for the quiz; replays and retries never alter rank.
async fn prime_leaderboard(state: &SharedState, quiz_id: Uuid) -> Result<(), ServiceError> {
    if state.leaderboard().has_entries(quiz_id) {
        return Ok(());
    }
    let Some(store) = state.answer_store().await else {
        return Ok(());
    };

    let rows = store.first_attempts(quiz_id).await?;
    if rows.is_empty() {
        return Ok(());
    }

    let entries = rows
        .into_iter()
        .map(|row| BoardEntry {
            actor_id: row.actor_id,
            name: row.display_name,
            score: row.total_score,
            completed_at: row.completed_at,
        })
        .collect();
    state.leaderboard().replace(quiz_id, entries);
    debug!(%quiz_id, "leaderboard cache primed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dao::models::QuestionPositionRow,
        services::testing::test_state,
    };

    fn submit_request(actor_id: Uuid, question_id: Uuid, question_index: usize) -> SubmitAnswerRequest {
        SubmitAnswerRequest {
            attempt_id: Uuid::new_v4(),
            actor_id,
            question_id,
            question_index,
            option_index: 1,
            is_correct: true,
            time_left: 10,
            player_name: "@player".into(),
        }
    }

    #[tokio::test]
    async fn second_submission_of_the_same_answer_is_a_duplicate() {
        let (state, _store) = test_state().await;
        let quiz = Uuid::new_v4();
        let actor = Uuid::new_v4();
        let question = Uuid::new_v4();

        let first = submit_answer(&state, quiz, submit_request(actor, question, 0))
            .await
            .unwrap();
        assert!(first.accepted);
        assert!(!first.is_duplicate);
        assert_eq!(first.score, Some(200));

        let second = submit_answer(&state, quiz, submit_request(actor, question, 0))
            .await
            .unwrap();
        assert!(!second.accepted);
        assert!(second.is_duplicate);
    }

    #[tokio::test]
    async fn replay_after_flush_is_still_rejected() {
        let (state, store) = test_state().await;
        let quiz = Uuid::new_v4();
        let actor = Uuid::new_v4();
        let question = Uuid::new_v4();

        submit_answer(&state, quiz, submit_request(actor, question, 0))
            .await
            .unwrap();
        state.ingest().flush_quiz(quiz).await.unwrap();
        assert_eq!(store.answer_count(), 1);

        // The key left the pending set on flush; the durable store now
        // rejects the replay.
        let replay = submit_answer(&state, quiz, submit_request(actor, question, 0))
            .await
            .unwrap();
        assert!(replay.is_duplicate);
        assert_eq!(store.answer_count(), 1);
    }

    #[tokio::test]
    async fn accepted_answers_update_stats_and_dirty_sets() {
        let (state, _store) = test_state().await;
        let quiz = Uuid::new_v4();

        for _ in 0..3 {
            submit_answer(
                &state,
                quiz,
                submit_request(Uuid::new_v4(), Uuid::new_v4(), 2),
            )
            .await
            .unwrap();
        }

        assert_eq!(state.stats().total_answers(quiz, 2), 3);
        let dirty = state.fanout().drain_stats();
        assert_eq!(dirty[&quiz].len(), 1);
        let answered = state.fanout().drain_answered();
        assert_eq!(answered[&quiz].len(), 3);
    }

    #[tokio::test]
    async fn completion_flushes_before_reading_aggregates() {
        let (state, store) = test_state().await;
        let quiz = Uuid::new_v4();
        let actor = Uuid::new_v4();

        for question_index in 0..4 {
            submit_answer(
                &state,
                quiz,
                submit_request(actor, Uuid::new_v4(), question_index),
            )
            .await
            .unwrap();
        }
        assert_eq!(store.answer_count(), 0, "answers still buffered");

        let completion = complete_attempt(
            &state,
            quiz,
            CompleteAttemptRequest {
                actor_id: actor,
                player_name: "@player".into(),
            },
        )
        .await
        .unwrap();

        // All four answers observed by the aggregate read: 4 * (100 + 10*10).
        assert_eq!(store.answer_count(), 4);
        assert!(completion.is_first_attempt);
        assert_eq!(completion.rank, 1);
        assert_eq!(completion.total_players, 1);

        let view = leaderboard_view(&state, quiz, actor, None).await.unwrap();
        assert_eq!(view.players[0].score, 800);
    }

    #[tokio::test]
    async fn repeat_completion_returns_the_existing_rank() {
        let (state, store) = test_state().await;
        let quiz = Uuid::new_v4();
        let actor = Uuid::new_v4();

        submit_answer(&state, quiz, submit_request(actor, Uuid::new_v4(), 0))
            .await
            .unwrap();
        let request = CompleteAttemptRequest {
            actor_id: actor,
            player_name: "@player".into(),
        };
        let first = complete_attempt(&state, quiz, request).await.unwrap();
        assert!(first.is_first_attempt);

        let again = complete_attempt(
            &state,
            quiz,
            CompleteAttemptRequest {
                actor_id: actor,
                player_name: "@player".into(),
            },
        )
        .await
        .unwrap();
        assert!(!again.is_first_attempt);
        assert_eq!(again.rank, first.rank);
        assert_eq!(store.answer_count(), 1);
    }

    #[tokio::test]
    async fn stats_prime_backfills_from_durable_aggregates() {
        let (state, store) = test_state().await;
        let quiz = Uuid::new_v4();
        let question = Uuid::new_v4();
        store.set_questions(
            quiz,
            vec![QuestionPositionRow {
                question_id: question,
                position: 1,
            }],
        );

        // Durable answers from a previous process lifetime.
        let actor = Uuid::new_v4();
        submit_answer(&state, quiz, submit_request(actor, question, 1))
            .await
            .unwrap();
        state.ingest().flush_quiz(quiz).await.unwrap();
        state.stats().clear_quiz(quiz);

        let projection = stats_projection(&state, quiz, 1).await.unwrap();
        assert_eq!(projection.total_answers, 1);
        assert_eq!(projection.stats[1], 100);
    }

    #[tokio::test]
    async fn first_submission_schedules_expiry_from_storage() {
        let (state, store) = test_state().await;
        let quiz = Uuid::new_v4();
        store.set_expiry(quiz, OffsetDateTime::now_utc() + time::Duration::minutes(10));

        submit_answer(
            &state,
            quiz,
            submit_request(Uuid::new_v4(), Uuid::new_v4(), 0),
        )
        .await
        .unwrap();

        assert!(state.lifecycle().contains(quiz));
    }

    #[tokio::test]
    async fn activation_rejects_an_already_expired_quiz() {
        let (state, _store) = test_state().await;
        let quiz = Uuid::new_v4();

        let result = activate_quiz(
            &state,
            quiz,
            ActivateQuizRequest {
                expires_at: OffsetDateTime::now_utc() - time::Duration::minutes(1),
                questions: Vec::new(),
            },
        )
        .await;

        assert!(matches!(result, Err(ServiceError::Expired)));
        assert!(!state.lifecycle().contains(quiz));
    }
}
