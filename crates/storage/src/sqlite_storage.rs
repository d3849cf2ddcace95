//! SQLite storage backend.
//!
//! The backend for multi-instance deployments: uniqueness constraints
//! and conditional updates run inside the database, so concurrent
//! engine instances resolve races at the store instead of in memory.
//! Records are stored as JSON documents alongside the key columns the
//! constraints need.

use async_trait::async_trait;
use sqlx::Row;

use classpulse_core::{
    AchievementUnlock, Assignment, AssignmentId, ClassroomId, Milestone, MilestoneId, PeerReview,
    Poll, PollId, PollResponse, Project, ProjectId, StudentId, Submission, SubmissionStatus,
    SubmitterId, Team, TeamId, Time, XpAward,
};

use super::trait_::{Result, Storage, StorageError};

/// SQLite storage implementation.
#[derive(Clone)]
pub struct SqliteStorage {
    /// Database connection pool
    pool: sqlx::SqlitePool,
}

impl SqliteStorage {
    /// Create a new SQLite storage instance.
    pub async fn new(db_path: &str) -> Result<Self> {
        let pool = sqlx::SqlitePool::connect(db_path)
            .await
            .map_err(|e| StorageError::Other(e.to_string()))?;

        let storage = Self { pool };
        storage.init_schema().await?;

        Ok(storage)
    }

    /// Create an in-memory SQLite storage for testing.
    pub async fn in_memory() -> Result<Self> {
        Self::new("sqlite::memory:").await
    }

    /// Initialize the database schema.
    async fn init_schema(&self) -> Result<()> {
        // Simple entities (projects, milestones, teams, assignments)
        // share one table; `scope` holds the parent id used by list
        // queries (classroom for projects, project for the rest).
        let statements = [
            "CREATE TABLE IF NOT EXISTS entities (
                id TEXT PRIMARY KEY,
                entity_type TEXT NOT NULL,
                scope TEXT NOT NULL,
                data TEXT NOT NULL
            )",
            "CREATE INDEX IF NOT EXISTS idx_entities_type_scope
                ON entities(entity_type, scope)",
            "CREATE TABLE IF NOT EXISTS submissions (
                assignment_id TEXT NOT NULL,
                submitter_id TEXT NOT NULL,
                status TEXT NOT NULL,
                data TEXT NOT NULL,
                PRIMARY KEY (assignment_id, submitter_id)
            )",
            "CREATE INDEX IF NOT EXISTS idx_submissions_submitter
                ON submissions(submitter_id)",
            "CREATE TABLE IF NOT EXISTS reviews (
                team_id TEXT NOT NULL,
                reviewer_id TEXT NOT NULL,
                reviewee_id TEXT NOT NULL,
                review_type TEXT NOT NULL,
                data TEXT NOT NULL,
                PRIMARY KEY (team_id, reviewer_id, reviewee_id, review_type)
            )",
            "CREATE INDEX IF NOT EXISTS idx_reviews_reviewee
                ON reviews(reviewee_id)",
            "CREATE TABLE IF NOT EXISTS xp_awards (
                team_id TEXT NOT NULL,
                source_key TEXT NOT NULL,
                data TEXT NOT NULL,
                PRIMARY KEY (team_id, source_key)
            )",
            "CREATE TABLE IF NOT EXISTS achievement_unlocks (
                team_id TEXT NOT NULL,
                achievement_id TEXT NOT NULL,
                earned_at TEXT NOT NULL,
                data TEXT NOT NULL,
                PRIMARY KEY (team_id, achievement_id)
            )",
            "CREATE TABLE IF NOT EXISTS polls (
                id TEXT PRIMARY KEY,
                classroom_id TEXT NOT NULL,
                is_active INTEGER NOT NULL,
                data TEXT NOT NULL
            )",
            // The single-active-poll invariant, enforced by the store.
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_polls_one_active
                ON polls(classroom_id) WHERE is_active = 1",
            "CREATE TABLE IF NOT EXISTS poll_responses (
                poll_id TEXT NOT NULL,
                student_id TEXT NOT NULL,
                data TEXT NOT NULL,
                PRIMARY KEY (poll_id, student_id)
            )",
        ];
        for stmt in statements {
            sqlx::query(stmt)
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::Other(e.to_string()))?;
        }
        Ok(())
    }

    async fn save_entity<T: serde::Serialize>(
        &self,
        id: String,
        entity_type: &str,
        scope: String,
        value: &T,
    ) -> Result<()> {
        let data = serde_json::to_string(value)?;
        sqlx::query(
            "INSERT OR REPLACE INTO entities (id, entity_type, scope, data)
            VALUES (?, ?, ?, ?)",
        )
        .bind(id)
        .bind(entity_type)
        .bind(scope)
        .bind(data)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Other(e.to_string()))?;
        Ok(())
    }

    async fn load_entity<T: serde::de::DeserializeOwned>(
        &self,
        id: String,
        entity_type: &str,
    ) -> Result<Option<T>> {
        let row = sqlx::query("SELECT data FROM entities WHERE id = ? AND entity_type = ?")
            .bind(id)
            .bind(entity_type)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Other(e.to_string()))?;
        match row {
            Some(row) => {
                let data: String = row
                    .try_get("data")
                    .map_err(|e| StorageError::Other(e.to_string()))?;
                Ok(Some(serde_json::from_str(&data)?))
            }
            None => Ok(None),
        }
    }

    async fn list_entities<T: serde::de::DeserializeOwned>(
        &self,
        entity_type: &str,
        scope: String,
    ) -> Result<Vec<T>> {
        let rows =
            sqlx::query("SELECT data FROM entities WHERE entity_type = ? AND scope = ?")
                .bind(entity_type)
                .bind(scope)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| StorageError::Other(e.to_string()))?;
        rows.into_iter()
            .map(|row| {
                let data: String = row
                    .try_get("data")
                    .map_err(|e| StorageError::Other(e.to_string()))?;
                Ok(serde_json::from_str(&data)?)
            })
            .collect()
    }
}

fn rows_to_records<T: serde::de::DeserializeOwned>(
    rows: Vec<sqlx::sqlite::SqliteRow>,
) -> Result<Vec<T>> {
    rows.into_iter()
        .map(|row| {
            let data: String = row
                .try_get("data")
                .map_err(|e| StorageError::Other(e.to_string()))?;
            Ok(serde_json::from_str(&data)?)
        })
        .collect()
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .map(|e| e.kind() == sqlx::error::ErrorKind::UniqueViolation)
        .unwrap_or(false)
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn save_project(&self, project: &Project) -> Result<()> {
        self.save_entity(
            project.id.to_string(),
            "project",
            project.classroom_id.to_string(),
            project,
        )
        .await
    }

    async fn load_project(&self, id: ProjectId) -> Result<Option<Project>> {
        self.load_entity(id.to_string(), "project").await
    }

    async fn list_projects(&self, classroom_id: ClassroomId) -> Result<Vec<Project>> {
        self.list_entities("project", classroom_id.to_string()).await
    }

    async fn save_milestone(&self, milestone: &Milestone) -> Result<()> {
        self.save_entity(
            milestone.id.to_string(),
            "milestone",
            milestone.project_id.to_string(),
            milestone,
        )
        .await
    }

    async fn load_milestone(&self, id: MilestoneId) -> Result<Option<Milestone>> {
        self.load_entity(id.to_string(), "milestone").await
    }

    async fn list_milestones(&self, project_id: ProjectId) -> Result<Vec<Milestone>> {
        let mut milestones: Vec<Milestone> =
            self.list_entities("milestone", project_id.to_string()).await?;
        milestones.sort_by_key(|m| m.sequence_index);
        Ok(milestones)
    }

    async fn save_team(&self, team: &Team) -> Result<()> {
        self.save_entity(
            team.id.to_string(),
            "team",
            team.project_id.to_string(),
            team,
        )
        .await
    }

    async fn load_team(&self, id: TeamId) -> Result<Option<Team>> {
        self.load_entity(id.to_string(), "team").await
    }

    async fn list_teams(&self, project_id: ProjectId) -> Result<Vec<Team>> {
        self.list_entities("team", project_id.to_string()).await
    }

    async fn save_assignment(&self, assignment: &Assignment) -> Result<()> {
        self.save_entity(
            assignment.id.to_string(),
            "assignment",
            assignment.classroom_id.to_string(),
            assignment,
        )
        .await
    }

    async fn load_assignment(&self, id: AssignmentId) -> Result<Option<Assignment>> {
        self.load_entity(id.to_string(), "assignment").await
    }

    async fn create_submission(&self, submission: &Submission) -> Result<bool> {
        let data = serde_json::to_string(submission)?;
        let result = sqlx::query(
            "INSERT INTO submissions (assignment_id, submitter_id, status, data)
            VALUES (?, ?, ?, ?)",
        )
        .bind(submission.assignment_id.to_string())
        .bind(submission.submitter_id.to_string())
        .bind(submission.status.as_str())
        .bind(data)
        .execute(&self.pool)
        .await;
        match result {
            Ok(_) => Ok(true),
            Err(e) if is_unique_violation(&e) => Ok(false),
            Err(e) => Err(StorageError::Other(e.to_string())),
        }
    }

    async fn load_submission(
        &self,
        assignment_id: AssignmentId,
        submitter_id: SubmitterId,
    ) -> Result<Option<Submission>> {
        let row = sqlx::query(
            "SELECT data FROM submissions WHERE assignment_id = ? AND submitter_id = ?",
        )
        .bind(assignment_id.to_string())
        .bind(submitter_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Other(e.to_string()))?;
        match row {
            Some(row) => {
                let data: String = row
                    .try_get("data")
                    .map_err(|e| StorageError::Other(e.to_string()))?;
                Ok(Some(serde_json::from_str(&data)?))
            }
            None => Ok(None),
        }
    }

    async fn update_submission(
        &self,
        submission: &Submission,
        expected: SubmissionStatus,
    ) -> Result<()> {
        let data = serde_json::to_string(submission)?;
        // The status condition makes this a compare-and-set: a
        // concurrent transition loses the race here, not in memory.
        let result = sqlx::query(
            "UPDATE submissions SET status = ?, data = ?
            WHERE assignment_id = ? AND submitter_id = ? AND status = ?",
        )
        .bind(submission.status.as_str())
        .bind(data)
        .bind(submission.assignment_id.to_string())
        .bind(submission.submitter_id.to_string())
        .bind(expected.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Other(e.to_string()))?;

        if result.rows_affected() == 0 {
            let current = self
                .load_submission(submission.assignment_id, submission.submitter_id)
                .await?;
            return match current {
                Some(sub) => Err(StorageError::PreconditionFailed(
                    sub.status.as_str().to_string(),
                )),
                None => Err(StorageError::NotFound(format!(
                    "submission ({}, {})",
                    submission.assignment_id, submission.submitter_id
                ))),
            };
        }
        Ok(())
    }

    async fn list_submissions(&self, submitter_id: SubmitterId) -> Result<Vec<Submission>> {
        let rows = sqlx::query("SELECT data FROM submissions WHERE submitter_id = ?")
            .bind(submitter_id.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Other(e.to_string()))?;
        rows_to_records(rows)
    }

    async fn upsert_review(&self, review: &PeerReview) -> Result<()> {
        let data = serde_json::to_string(review)?;
        sqlx::query(
            "INSERT OR REPLACE INTO reviews
                (team_id, reviewer_id, reviewee_id, review_type, data)
            VALUES (?, ?, ?, ?, ?)",
        )
        .bind(review.team_id.to_string())
        .bind(review.reviewer_id.to_string())
        .bind(review.reviewee_id.to_string())
        .bind(review.review_type.as_str())
        .bind(data)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Other(e.to_string()))?;
        Ok(())
    }

    async fn list_reviews_for_reviewee(
        &self,
        reviewee_id: StudentId,
        team_id: Option<TeamId>,
    ) -> Result<Vec<PeerReview>> {
        let rows = match team_id {
            Some(team_id) => {
                sqlx::query("SELECT data FROM reviews WHERE reviewee_id = ? AND team_id = ?")
                    .bind(reviewee_id.to_string())
                    .bind(team_id.to_string())
                    .fetch_all(&self.pool)
                    .await
            }
            None => {
                sqlx::query("SELECT data FROM reviews WHERE reviewee_id = ?")
                    .bind(reviewee_id.to_string())
                    .fetch_all(&self.pool)
                    .await
            }
        }
        .map_err(|e| StorageError::Other(e.to_string()))?;
        rows_to_records(rows)
    }

    async fn list_reviews_for_team(&self, team_id: TeamId) -> Result<Vec<PeerReview>> {
        let rows = sqlx::query("SELECT data FROM reviews WHERE team_id = ?")
            .bind(team_id.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Other(e.to_string()))?;
        rows_to_records(rows)
    }

    async fn insert_xp_award(&self, award: &XpAward) -> Result<()> {
        let data = serde_json::to_string(award)?;
        let result = sqlx::query(
            "INSERT INTO xp_awards (team_id, source_key, data) VALUES (?, ?, ?)",
        )
        .bind(award.team_id.to_string())
        .bind(award.source.key())
        .bind(data)
        .execute(&self.pool)
        .await;
        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(StorageError::AlreadyExists(format!(
                "xp award for team {} from {}",
                award.team_id,
                award.source.key()
            ))),
            Err(e) => Err(StorageError::Other(e.to_string())),
        }
    }

    async fn list_xp_awards(&self, team_id: TeamId) -> Result<Vec<XpAward>> {
        let rows = sqlx::query("SELECT data FROM xp_awards WHERE team_id = ?")
            .bind(team_id.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Other(e.to_string()))?;
        let mut awards: Vec<XpAward> = rows_to_records(rows)?;
        awards.sort_by_key(|a| a.awarded_at);
        Ok(awards)
    }

    async fn insert_achievement_unlock(&self, unlock: &AchievementUnlock) -> Result<bool> {
        let data = serde_json::to_string(unlock)?;
        let result = sqlx::query(
            "INSERT OR IGNORE INTO achievement_unlocks
                (team_id, achievement_id, earned_at, data)
            VALUES (?, ?, ?, ?)",
        )
        .bind(unlock.team_id.to_string())
        .bind(unlock.achievement_id.to_string())
        .bind(unlock.earned_at.to_rfc3339())
        .bind(data)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Other(e.to_string()))?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_achievement_unlocks(&self, team_id: TeamId) -> Result<Vec<AchievementUnlock>> {
        let rows = sqlx::query(
            "SELECT data FROM achievement_unlocks WHERE team_id = ? ORDER BY earned_at",
        )
        .bind(team_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Other(e.to_string()))?;
        rows_to_records(rows)
    }

    async fn activate_poll(&self, poll: &Poll) -> Result<()> {
        let data = serde_json::to_string(poll)?;
        // idx_polls_one_active rejects a second active poll per
        // classroom at the store, so two racing activations cannot
        // both succeed.
        let result = sqlx::query(
            "INSERT INTO polls (id, classroom_id, is_active, data) VALUES (?, ?, 1, ?)",
        )
        .bind(poll.id.to_string())
        .bind(poll.classroom_id.to_string())
        .bind(data)
        .execute(&self.pool)
        .await;
        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(StorageError::AlreadyExists(format!(
                "active poll in classroom {}",
                poll.classroom_id
            ))),
            Err(e) => Err(StorageError::Other(e.to_string())),
        }
    }

    async fn load_poll(&self, id: PollId) -> Result<Option<Poll>> {
        let row = sqlx::query("SELECT data FROM polls WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Other(e.to_string()))?;
        match row {
            Some(row) => {
                let data: String = row
                    .try_get("data")
                    .map_err(|e| StorageError::Other(e.to_string()))?;
                Ok(Some(serde_json::from_str(&data)?))
            }
            None => Ok(None),
        }
    }

    async fn active_poll(&self, classroom_id: ClassroomId) -> Result<Option<Poll>> {
        let row =
            sqlx::query("SELECT data FROM polls WHERE classroom_id = ? AND is_active = 1")
                .bind(classroom_id.to_string())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| StorageError::Other(e.to_string()))?;
        match row {
            Some(row) => {
                let data: String = row
                    .try_get("data")
                    .map_err(|e| StorageError::Other(e.to_string()))?;
                Ok(Some(serde_json::from_str(&data)?))
            }
            None => Ok(None),
        }
    }

    async fn close_poll(&self, id: PollId, closed_at: Time) -> Result<Poll> {
        let mut poll = self
            .load_poll(id)
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("poll {}", id)))?;
        poll.is_active = false;
        poll.closed_at = Some(closed_at);
        let data = serde_json::to_string(&poll)?;

        let result = sqlx::query(
            "UPDATE polls SET is_active = 0, data = ? WHERE id = ? AND is_active = 1",
        )
        .bind(data)
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Other(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(StorageError::PreconditionFailed("closed".to_string()));
        }
        Ok(poll)
    }

    async fn insert_poll_response(&self, response: &PollResponse) -> Result<()> {
        let data = serde_json::to_string(response)?;
        // The EXISTS clause pins the insert to an active poll in the
        // same statement, so a respond racing a concurrent close
        // cannot land in a closed poll.
        let result = sqlx::query(
            "INSERT INTO poll_responses (poll_id, student_id, data)
            SELECT ?, ?, ?
            WHERE EXISTS (SELECT 1 FROM polls WHERE id = ? AND is_active = 1)",
        )
        .bind(response.poll_id.to_string())
        .bind(response.student_id.to_string())
        .bind(data)
        .bind(response.poll_id.to_string())
        .execute(&self.pool)
        .await;
        let result = match result {
            Ok(result) => result,
            Err(e) if is_unique_violation(&e) => {
                return Err(StorageError::AlreadyExists(format!(
                    "response to poll {} by student {}",
                    response.poll_id, response.student_id
                )))
            }
            Err(e) => return Err(StorageError::Other(e.to_string())),
        };
        if result.rows_affected() == 0 {
            return match self.load_poll(response.poll_id).await? {
                Some(_) => Err(StorageError::PreconditionFailed("closed".to_string())),
                None => Err(StorageError::NotFound(format!(
                    "poll {}",
                    response.poll_id
                ))),
            };
        }
        Ok(())
    }

    async fn list_poll_responses(&self, poll_id: PollId) -> Result<Vec<PollResponse>> {
        let rows = sqlx::query("SELECT data FROM poll_responses WHERE poll_id = ?")
            .bind(poll_id.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Other(e.to_string()))?;
        rows_to_records(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn active_poll(classroom_id: ClassroomId) -> Poll {
        Poll {
            id: PollId::new(),
            classroom_id,
            question: "q".to_string(),
            options: vec!["a".to_string(), "b".to_string()],
            is_active: true,
            created_at: Utc::now(),
            closed_at: None,
        }
    }

    #[tokio::test]
    async fn duplicate_poll_response_hits_unique_constraint() {
        let storage = SqliteStorage::in_memory().await.unwrap();
        let poll = active_poll(ClassroomId::new());
        storage.activate_poll(&poll).await.unwrap();
        let response = PollResponse {
            poll_id: poll.id,
            student_id: StudentId::new(),
            option: "Yes".to_string(),
            submitted_at: Utc::now(),
        };
        storage.insert_poll_response(&response).await.unwrap();
        let err = storage.insert_poll_response(&response).await.unwrap_err();
        assert!(matches!(err, StorageError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn responses_to_a_closed_poll_are_rejected_at_the_store() {
        let storage = SqliteStorage::in_memory().await.unwrap();
        let poll = active_poll(ClassroomId::new());
        storage.activate_poll(&poll).await.unwrap();
        storage.close_poll(poll.id, Utc::now()).await.unwrap();

        let late = PollResponse {
            poll_id: poll.id,
            student_id: StudentId::new(),
            option: "a".to_string(),
            submitted_at: Utc::now(),
        };
        let err = storage.insert_poll_response(&late).await.unwrap_err();
        assert!(matches!(err, StorageError::PreconditionFailed(_)));
        assert!(storage.list_poll_responses(poll.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn second_active_poll_hits_partial_index() {
        let storage = SqliteStorage::in_memory().await.unwrap();
        let classroom_id = ClassroomId::new();
        let make_poll = || active_poll(classroom_id);

        let first = make_poll();
        storage.activate_poll(&first).await.unwrap();
        let err = storage.activate_poll(&make_poll()).await.unwrap_err();
        assert!(matches!(err, StorageError::AlreadyExists(_)));

        storage.close_poll(first.id, Utc::now()).await.unwrap();
        storage.activate_poll(&make_poll()).await.unwrap();
    }

    #[tokio::test]
    async fn submission_cas_is_conditional_update() {
        let storage = SqliteStorage::in_memory().await.unwrap();
        let issued = Submission::issue(
            AssignmentId::new(),
            StudentId::new().into(),
            Utc::now(),
        );
        assert!(storage.create_submission(&issued).await.unwrap());

        let mut turned_in = issued.clone();
        turned_in.status = SubmissionStatus::TurnedIn;
        storage
            .update_submission(&turned_in, SubmissionStatus::Assigned)
            .await
            .unwrap();

        // Retrying the same transition now fails with the actual state.
        let err = storage
            .update_submission(&turned_in, SubmissionStatus::Assigned)
            .await
            .unwrap_err();
        match err {
            StorageError::PreconditionFailed(actual) => assert_eq!(actual, "turned_in"),
            other => panic!("expected PreconditionFailed, got {:?}", other),
        }
    }
}
