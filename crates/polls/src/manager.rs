//! Poll session lifecycle.

use std::sync::Arc;

use chrono::Utc;
use classpulse_core::{
    ClassroomEvent, ClassroomId, EngineError, EngineResult, EventSink, Poll, PollId, PollResponse,
    PollResults, PollTally, StudentId,
};
use classpulse_storage::{Storage, StorageError};
use tracing::{info, warn};

/// Runs live polls for classrooms.
///
/// The single-active-poll and one-response-per-student rules live in
/// the storage layer; this service validates inputs, sequences the
/// lifecycle and publishes the open/close events.
pub struct PollSessionManager<S> {
    storage: Arc<S>,
    events: Arc<dyn EventSink>,
}

impl<S: Storage> PollSessionManager<S> {
    /// Create a poll manager over the given store.
    pub fn new(storage: Arc<S>, events: Arc<dyn EventSink>) -> Self {
        Self { storage, events }
    }

    /// Open a new poll in a classroom. Fails with `ConflictError` when
    /// the classroom already has an active poll.
    pub async fn open(
        &self,
        classroom_id: ClassroomId,
        question: impl Into<String>,
        options: Vec<String>,
    ) -> EngineResult<Poll> {
        let question = question.into();
        if question.trim().is_empty() {
            return Err(EngineError::Validation("poll question is empty".into()));
        }
        if options.len() < 2 {
            return Err(EngineError::Validation(
                "a poll needs at least two options".into(),
            ));
        }
        let mut seen = options.clone();
        seen.sort_unstable();
        seen.dedup();
        if seen.len() != options.len() {
            return Err(EngineError::Validation("poll options repeat".into()));
        }

        let poll = Poll {
            id: PollId::new(),
            classroom_id,
            question,
            options,
            is_active: true,
            created_at: Utc::now(),
            closed_at: None,
        };
        self.storage.activate_poll(&poll).await.map_err(|e| {
            let err: EngineError = e.into();
            match err {
                EngineError::Conflict(_) => EngineError::Conflict(format!(
                    "classroom {classroom_id} already has an active poll"
                )),
                other => other,
            }
        })?;
        info!(poll_id = %poll.id, %classroom_id, "poll opened");
        self.events
            .publish(classroom_id, ClassroomEvent::PollOpened { poll: poll.clone() });
        Ok(poll)
    }

    /// Record one student's answer. First write wins: a second answer
    /// from the same student fails with `ConflictError` and the stored
    /// one stands.
    pub async fn respond(
        &self,
        poll_id: PollId,
        student_id: StudentId,
        option: impl Into<String>,
    ) -> EngineResult<PollResponse> {
        let option = option.into();
        let poll = self.load(poll_id).await?;
        if !poll.is_active {
            return Err(EngineError::invalid_transition("respond", "closed"));
        }
        if !poll.options.contains(&option) {
            return Err(EngineError::Validation(format!(
                "{option:?} is not one of the poll's options"
            )));
        }

        let response = PollResponse {
            poll_id,
            student_id,
            option,
            submitted_at: Utc::now(),
        };
        self.storage.insert_poll_response(&response).await.map_err(|e| match e {
            StorageError::AlreadyExists(_) => {
                warn!(%poll_id, %student_id, "duplicate poll response rejected");
                EngineError::Conflict(format!("student {student_id} already responded"))
            }
            // The poll was closed between our read and the insert.
            StorageError::PreconditionFailed(current) => {
                EngineError::invalid_transition("respond", current)
            }
            other => other.into(),
        })?;
        Ok(response)
    }

    /// Close a poll and publish its final tallies. Closing an already
    /// closed poll fails with `InvalidTransition`.
    pub async fn close(&self, poll_id: PollId) -> EngineResult<PollResults> {
        let poll = match self.storage.close_poll(poll_id, Utc::now()).await {
            Ok(poll) => poll,
            Err(e) => {
                let err: EngineError = e.into();
                return Err(match err {
                    EngineError::Conflict(_) => {
                        EngineError::invalid_transition("close", "closed")
                    }
                    other => other,
                });
            }
        };
        let results = self.tally(poll).await?;
        info!(%poll_id, total = results.total_responses, "poll closed");
        self.events.publish(
            results.poll.classroom_id,
            ClassroomEvent::PollClosed {
                poll: results.poll.clone(),
                tallies: results.tallies.clone(),
            },
        );
        Ok(results)
    }

    /// The classroom's active poll, if one is running.
    pub async fn active(&self, classroom_id: ClassroomId) -> EngineResult<Option<Poll>> {
        Ok(self.storage.active_poll(classroom_id).await?)
    }

    /// Current results for a poll, active or closed.
    pub async fn results(&self, poll_id: PollId) -> EngineResult<PollResults> {
        let poll = self.load(poll_id).await?;
        self.tally(poll).await
    }

    async fn load(&self, poll_id: PollId) -> EngineResult<Poll> {
        self.storage
            .load_poll(poll_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("poll {poll_id}")))
    }

    async fn tally(&self, poll: Poll) -> EngineResult<PollResults> {
        let responses = self.storage.list_poll_responses(poll.id).await?;
        let tallies = poll
            .options
            .iter()
            .map(|option| PollTally {
                option: option.clone(),
                count: responses.iter().filter(|r| &r.option == option).count(),
            })
            .collect();
        Ok(PollResults {
            total_responses: responses.len(),
            poll,
            tallies,
        })
    }
}
