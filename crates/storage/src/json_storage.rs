//! JSON file storage implementation.
//!
//! Stores one JSON file per record under a data root, keyed by the
//! entity's unique tuple. First-write-wins inserts rely on the
//! filesystem's `create_new` semantics; compare-and-set updates are
//! serialized behind an in-process mutex, which makes this backend a
//! single-instance development store. Multi-instance deployments use
//! the SQLite backend.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use classpulse_core::{
    AchievementUnlock, Assignment, AssignmentId, ClassroomId, Milestone, MilestoneId, PeerReview,
    Poll, PollId, PollResponse, Project, ProjectId, StudentId, Submission, SubmissionStatus,
    SubmitterId, Team, TeamId, Time, XpAward,
};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use super::{Result, Storage, StorageError};

/// File-based JSON storage backend.
pub struct JsonStorage {
    root: PathBuf,
    // Guards read-modify-write sections (submission CAS, poll close).
    write_lock: Arc<Mutex<()>>,
}

impl JsonStorage {
    /// Create storage rooted at `root`, creating the per-entity
    /// directories as needed.
    pub async fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();

        fs::create_dir_all(root.join("projects")).await?;
        fs::create_dir_all(root.join("milestones")).await?;
        fs::create_dir_all(root.join("teams")).await?;
        fs::create_dir_all(root.join("assignments")).await?;
        fs::create_dir_all(root.join("submissions")).await?;
        fs::create_dir_all(root.join("reviews")).await?;
        fs::create_dir_all(root.join("xp_awards")).await?;
        fs::create_dir_all(root.join("achievement_unlocks")).await?;
        fs::create_dir_all(root.join("polls")).await?;
        fs::create_dir_all(root.join("active_polls")).await?;
        fs::create_dir_all(root.join("poll_responses")).await?;

        Ok(Self {
            root,
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    fn project_path(&self, id: ProjectId) -> PathBuf {
        self.root.join("projects").join(format!("{}.json", id))
    }
    fn milestone_path(&self, id: MilestoneId) -> PathBuf {
        self.root.join("milestones").join(format!("{}.json", id))
    }
    fn team_path(&self, id: TeamId) -> PathBuf {
        self.root.join("teams").join(format!("{}.json", id))
    }
    fn assignment_path(&self, id: AssignmentId) -> PathBuf {
        self.root.join("assignments").join(format!("{}.json", id))
    }
    fn submission_path(&self, assignment_id: AssignmentId, submitter_id: SubmitterId) -> PathBuf {
        self.root
            .join("submissions")
            .join(format!("{}_{}.json", assignment_id, submitter_id))
    }
    fn review_path(&self, review: &PeerReview) -> PathBuf {
        self.root.join("reviews").join(format!(
            "{}_{}_{}_{}.json",
            review.team_id, review.reviewer_id, review.reviewee_id, review.review_type
        ))
    }
    fn xp_award_path(&self, award: &XpAward) -> PathBuf {
        self.root
            .join("xp_awards")
            .join(format!("{}_{}.json", award.team_id, award.source.key()))
    }
    fn unlock_path(&self, unlock: &AchievementUnlock) -> PathBuf {
        self.root
            .join("achievement_unlocks")
            .join(format!("{}_{}.json", unlock.team_id, unlock.achievement_id))
    }
    fn poll_path(&self, id: PollId) -> PathBuf {
        self.root.join("polls").join(format!("{}.json", id))
    }
    fn active_poll_path(&self, classroom_id: ClassroomId) -> PathBuf {
        self.root
            .join("active_polls")
            .join(format!("{}.json", classroom_id))
    }
    fn poll_response_path(&self, poll_id: PollId, student_id: StudentId) -> PathBuf {
        self.root
            .join("poll_responses")
            .join(format!("{}_{}.json", poll_id, student_id))
    }

    async fn write_json<T: serde::Serialize>(&self, path: &Path, value: &T) -> Result<()> {
        let json = serde_json::to_string_pretty(value)?;
        fs::write(path, json.as_bytes()).await?;
        Ok(())
    }

    /// Write `value` to `path` only if no file exists there. The
    /// filesystem's `create_new` is the uniqueness constraint: the
    /// first writer wins and later writers see `AlreadyExists`.
    async fn write_json_new<T: serde::Serialize>(&self, path: &Path, value: &T) -> Result<bool> {
        let json = serde_json::to_string_pretty(value)?;
        let open = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .await;
        match open {
            Ok(mut file) => {
                file.write_all(json.as_bytes()).await?;
                file.flush().await?;
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait::async_trait]
impl Storage for JsonStorage {
    async fn save_project(&self, project: &Project) -> Result<()> {
        self.write_json(&self.project_path(project.id), project).await
    }

    async fn load_project(&self, id: ProjectId) -> Result<Option<Project>> {
        read_json(&self.project_path(id)).await
    }

    async fn list_projects(&self, classroom_id: ClassroomId) -> Result<Vec<Project>> {
        let all: Vec<Project> = list_dir(&self.root.join("projects")).await?;
        Ok(all
            .into_iter()
            .filter(|p| p.classroom_id == classroom_id)
            .collect())
    }

    async fn save_milestone(&self, milestone: &Milestone) -> Result<()> {
        self.write_json(&self.milestone_path(milestone.id), milestone)
            .await
    }

    async fn load_milestone(&self, id: MilestoneId) -> Result<Option<Milestone>> {
        read_json(&self.milestone_path(id)).await
    }

    async fn list_milestones(&self, project_id: ProjectId) -> Result<Vec<Milestone>> {
        let all: Vec<Milestone> = list_dir(&self.root.join("milestones")).await?;
        let mut milestones: Vec<Milestone> = all
            .into_iter()
            .filter(|m| m.project_id == project_id)
            .collect();
        milestones.sort_by_key(|m| m.sequence_index);
        Ok(milestones)
    }

    async fn save_team(&self, team: &Team) -> Result<()> {
        self.write_json(&self.team_path(team.id), team).await
    }

    async fn load_team(&self, id: TeamId) -> Result<Option<Team>> {
        read_json(&self.team_path(id)).await
    }

    async fn list_teams(&self, project_id: ProjectId) -> Result<Vec<Team>> {
        let all: Vec<Team> = list_dir(&self.root.join("teams")).await?;
        Ok(all
            .into_iter()
            .filter(|t| t.project_id == project_id)
            .collect())
    }

    async fn save_assignment(&self, assignment: &Assignment) -> Result<()> {
        self.write_json(&self.assignment_path(assignment.id), assignment)
            .await
    }

    async fn load_assignment(&self, id: AssignmentId) -> Result<Option<Assignment>> {
        read_json(&self.assignment_path(id)).await
    }

    async fn create_submission(&self, submission: &Submission) -> Result<bool> {
        let path = self.submission_path(submission.assignment_id, submission.submitter_id);
        self.write_json_new(&path, submission).await
    }

    async fn load_submission(
        &self,
        assignment_id: AssignmentId,
        submitter_id: SubmitterId,
    ) -> Result<Option<Submission>> {
        read_json(&self.submission_path(assignment_id, submitter_id)).await
    }

    async fn update_submission(
        &self,
        submission: &Submission,
        expected: SubmissionStatus,
    ) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let path = self.submission_path(submission.assignment_id, submission.submitter_id);
        let current: Submission = read_json(&path).await?.ok_or_else(|| {
            StorageError::NotFound(format!(
                "submission ({}, {})",
                submission.assignment_id, submission.submitter_id
            ))
        })?;
        if current.status != expected {
            return Err(StorageError::PreconditionFailed(
                current.status.as_str().to_string(),
            ));
        }
        self.write_json(&path, submission).await
    }

    async fn list_submissions(&self, submitter_id: SubmitterId) -> Result<Vec<Submission>> {
        let all: Vec<Submission> = list_dir(&self.root.join("submissions")).await?;
        Ok(all
            .into_iter()
            .filter(|s| s.submitter_id == submitter_id)
            .collect())
    }

    async fn upsert_review(&self, review: &PeerReview) -> Result<()> {
        // Last write wins by the review tuple.
        self.write_json(&self.review_path(review), review).await
    }

    async fn list_reviews_for_reviewee(
        &self,
        reviewee_id: StudentId,
        team_id: Option<TeamId>,
    ) -> Result<Vec<PeerReview>> {
        let all: Vec<PeerReview> = list_dir(&self.root.join("reviews")).await?;
        Ok(all
            .into_iter()
            .filter(|r| r.reviewee_id == reviewee_id)
            .filter(|r| team_id.map_or(true, |t| r.team_id == t))
            .collect())
    }

    async fn list_reviews_for_team(&self, team_id: TeamId) -> Result<Vec<PeerReview>> {
        let all: Vec<PeerReview> = list_dir(&self.root.join("reviews")).await?;
        Ok(all.into_iter().filter(|r| r.team_id == team_id).collect())
    }

    async fn insert_xp_award(&self, award: &XpAward) -> Result<()> {
        let created = self.write_json_new(&self.xp_award_path(award), award).await?;
        if !created {
            return Err(StorageError::AlreadyExists(format!(
                "xp award for team {} from {}",
                award.team_id,
                award.source.key()
            )));
        }
        Ok(())
    }

    async fn list_xp_awards(&self, team_id: TeamId) -> Result<Vec<XpAward>> {
        let all: Vec<XpAward> = list_dir(&self.root.join("xp_awards")).await?;
        let mut awards: Vec<XpAward> =
            all.into_iter().filter(|a| a.team_id == team_id).collect();
        awards.sort_by_key(|a| a.awarded_at);
        Ok(awards)
    }

    async fn insert_achievement_unlock(&self, unlock: &AchievementUnlock) -> Result<bool> {
        self.write_json_new(&self.unlock_path(unlock), unlock).await
    }

    async fn list_achievement_unlocks(&self, team_id: TeamId) -> Result<Vec<AchievementUnlock>> {
        let all: Vec<AchievementUnlock> =
            list_dir(&self.root.join("achievement_unlocks")).await?;
        let mut unlocks: Vec<AchievementUnlock> =
            all.into_iter().filter(|u| u.team_id == team_id).collect();
        unlocks.sort_by_key(|u| u.earned_at);
        Ok(unlocks)
    }

    async fn activate_poll(&self, poll: &Poll) -> Result<()> {
        // The per-classroom marker file is the single-active-poll
        // constraint; creating it first means two racing activations
        // cannot both succeed.
        let marker = self.active_poll_path(poll.classroom_id);
        let created = self.write_json_new(&marker, &poll.id).await?;
        if !created {
            return Err(StorageError::AlreadyExists(format!(
                "active poll in classroom {}",
                poll.classroom_id
            )));
        }
        self.write_json(&self.poll_path(poll.id), poll).await
    }

    async fn load_poll(&self, id: PollId) -> Result<Option<Poll>> {
        read_json(&self.poll_path(id)).await
    }

    async fn active_poll(&self, classroom_id: ClassroomId) -> Result<Option<Poll>> {
        let marker = self.active_poll_path(classroom_id);
        let Some(poll_id) = read_json::<PollId>(&marker).await? else {
            return Ok(None);
        };
        read_json(&self.poll_path(poll_id)).await
    }

    async fn close_poll(&self, id: PollId, closed_at: Time) -> Result<Poll> {
        let _guard = self.write_lock.lock().await;
        let path = self.poll_path(id);
        let mut poll: Poll = read_json(&path)
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("poll {}", id)))?;
        if !poll.is_active {
            return Err(StorageError::PreconditionFailed("closed".to_string()));
        }
        poll.is_active = false;
        poll.closed_at = Some(closed_at);
        self.write_json(&path, &poll).await?;
        let marker = self.active_poll_path(poll.classroom_id);
        fs::remove_file(&marker).await.or_else(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Ok(())
            } else {
                Err(e)
            }
        })?;
        Ok(poll)
    }

    async fn insert_poll_response(&self, response: &PollResponse) -> Result<()> {
        // Same lock as close_poll, so a response cannot slip into a
        // poll that is being closed concurrently.
        let _guard = self.write_lock.lock().await;
        let poll: Poll = read_json(&self.poll_path(response.poll_id))
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("poll {}", response.poll_id)))?;
        if !poll.is_active {
            return Err(StorageError::PreconditionFailed("closed".to_string()));
        }
        let path = self.poll_response_path(response.poll_id, response.student_id);
        let created = self.write_json_new(&path, response).await?;
        if !created {
            return Err(StorageError::AlreadyExists(format!(
                "response to poll {} by student {}",
                response.poll_id, response.student_id
            )));
        }
        Ok(())
    }

    async fn list_poll_responses(&self, poll_id: PollId) -> Result<Vec<PollResponse>> {
        let all: Vec<PollResponse> = list_dir(&self.root.join("poll_responses")).await?;
        Ok(all.into_iter().filter(|r| r.poll_id == poll_id).collect())
    }
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match fs::read_to_string(path).await {
        Ok(json) => {
            let value = serde_json::from_str(&json)?;
            Ok(Some(value))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

// A record that fails to deserialize is surfaced as an error, never
// silently skipped: a corrupt submission or award file must not
// quietly vanish from derived totals.
async fn list_dir<T: serde::de::DeserializeOwned>(dir: &Path) -> Result<Vec<T>> {
    let mut items = Vec::new();
    let mut rd = fs::read_dir(dir).await?;
    while let Some(entry) = rd.next_entry().await? {
        if entry.path().extension().and_then(|s| s.to_str()) != Some("json") {
            continue;
        }
        if let Some(item) = read_json(&entry.path()).await? {
            items.push(item);
        }
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use classpulse_core::{Submission, XpSource};

    async fn storage() -> (tempfile::TempDir, JsonStorage) {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonStorage::new(dir.path()).await.unwrap();
        (dir, storage)
    }

    fn poll(classroom_id: ClassroomId) -> Poll {
        Poll {
            id: PollId::new(),
            classroom_id,
            question: "Ready for the demo?".to_string(),
            options: vec!["Yes".to_string(), "No".to_string()],
            is_active: true,
            created_at: Utc::now(),
            closed_at: None,
        }
    }

    #[tokio::test]
    async fn second_poll_response_is_rejected_first_is_kept() {
        let (_dir, storage) = storage().await;
        let active = poll(ClassroomId::new());
        storage.activate_poll(&active).await.unwrap();
        let poll_id = active.id;
        let student_id = StudentId::new();

        let first = PollResponse {
            poll_id,
            student_id,
            option: "Yes".to_string(),
            submitted_at: Utc::now(),
        };
        storage.insert_poll_response(&first).await.unwrap();

        let second = PollResponse {
            option: "No".to_string(),
            ..first.clone()
        };
        let err = storage.insert_poll_response(&second).await.unwrap_err();
        assert!(matches!(err, StorageError::AlreadyExists(_)));

        let stored = storage.list_poll_responses(poll_id).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].option, "Yes");
    }

    #[tokio::test]
    async fn replayed_xp_award_is_rejected() {
        let (_dir, storage) = storage().await;
        let team_id = TeamId::new();
        let award = XpAward {
            team_id,
            source: XpSource::Milestone(MilestoneId::new()),
            amount: 250,
            reason: "Milestone graded".to_string(),
            awarded_at: Utc::now(),
        };
        storage.insert_xp_award(&award).await.unwrap();
        let err = storage.insert_xp_award(&award).await.unwrap_err();
        assert!(matches!(err, StorageError::AlreadyExists(_)));
        assert_eq!(storage.list_xp_awards(team_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn submission_cas_reports_actual_status() {
        let (_dir, storage) = storage().await;
        let assignment_id = AssignmentId::new();
        let submitter_id: SubmitterId = StudentId::new().into();

        let issued = Submission::issue(assignment_id, submitter_id, Utc::now());
        assert!(storage.create_submission(&issued).await.unwrap());
        // Duplicate issue is a no-op.
        assert!(!storage.create_submission(&issued).await.unwrap());

        let mut graded = issued.clone();
        graded.status = SubmissionStatus::Graded;
        let err = storage
            .update_submission(&graded, SubmissionStatus::TurnedIn)
            .await
            .unwrap_err();
        match err {
            StorageError::PreconditionFailed(actual) => assert_eq!(actual, "assigned"),
            other => panic!("expected PreconditionFailed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn corrupt_record_surfaces_as_error_not_missing_data() {
        let (dir, storage) = storage().await;
        let team_id = TeamId::new();
        let award = XpAward {
            team_id,
            source: XpSource::Milestone(MilestoneId::new()),
            amount: 100,
            reason: "Milestone graded".to_string(),
            awarded_at: Utc::now(),
        };
        storage.insert_xp_award(&award).await.unwrap();

        tokio::fs::write(
            dir.path().join("xp_awards").join("mangled.json"),
            "{ not json",
        )
        .await
        .unwrap();

        let err = storage.list_xp_awards(team_id).await.unwrap_err();
        assert!(matches!(err, StorageError::Json(_)));
    }

    #[tokio::test]
    async fn one_active_poll_per_classroom() {
        let (_dir, storage) = storage().await;
        let classroom_id = ClassroomId::new();

        let first = poll(classroom_id);
        storage.activate_poll(&first).await.unwrap();

        let second = poll(classroom_id);
        let err = storage.activate_poll(&second).await.unwrap_err();
        assert!(matches!(err, StorageError::AlreadyExists(_)));

        // Closing the first frees the classroom slot.
        storage.close_poll(first.id, Utc::now()).await.unwrap();
        assert!(storage.active_poll(classroom_id).await.unwrap().is_none());
        storage.activate_poll(&poll(classroom_id)).await.unwrap();
    }

    #[tokio::test]
    async fn responses_to_a_closed_poll_are_rejected_at_the_store() {
        let (_dir, storage) = storage().await;
        let p = poll(ClassroomId::new());
        storage.activate_poll(&p).await.unwrap();

        let early = PollResponse {
            poll_id: p.id,
            student_id: StudentId::new(),
            option: "Yes".to_string(),
            submitted_at: Utc::now(),
        };
        storage.insert_poll_response(&early).await.unwrap();
        storage.close_poll(p.id, Utc::now()).await.unwrap();

        let late = PollResponse {
            poll_id: p.id,
            student_id: StudentId::new(),
            option: "No".to_string(),
            submitted_at: Utc::now(),
        };
        let err = storage.insert_poll_response(&late).await.unwrap_err();
        assert!(matches!(err, StorageError::PreconditionFailed(_)));

        // The final tallies stay consistent with the read path.
        let stored = storage.list_poll_responses(p.id).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].option, "Yes");
    }

    #[tokio::test]
    async fn closing_a_closed_poll_fails() {
        let (_dir, storage) = storage().await;
        let p = poll(ClassroomId::new());
        storage.activate_poll(&p).await.unwrap();
        storage.close_poll(p.id, Utc::now()).await.unwrap();
        let err = storage.close_poll(p.id, Utc::now()).await.unwrap_err();
        assert!(matches!(err, StorageError::PreconditionFailed(_)));
    }

    #[tokio::test]
    async fn review_upsert_replaces_prior_checkpoint() {
        let (_dir, storage) = storage().await;
        use classpulse_core::{ReviewType, Skill};
        use std::collections::BTreeMap;

        let team_id = TeamId::new();
        let reviewer = StudentId::new();
        let reviewee = StudentId::new();

        let mut ratings = BTreeMap::new();
        ratings.insert(Skill::Communication, 4u8);
        let review = PeerReview {
            team_id,
            reviewer_id: reviewer,
            reviewee_id: reviewee,
            review_type: ReviewType::MidProject,
            ratings: ratings.clone(),
            comments: None,
            submitted_at: Utc::now(),
        };
        storage.upsert_review(&review).await.unwrap();

        let mut replacement = review.clone();
        replacement.ratings.insert(Skill::Communication, 5u8);
        storage.upsert_review(&replacement).await.unwrap();

        let stored = storage
            .list_reviews_for_reviewee(reviewee, Some(team_id))
            .await
            .unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].ratings[&Skill::Communication], 5);
    }
}
