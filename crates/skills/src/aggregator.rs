//! Multi-rater soft-skill score aggregation.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use classpulse_core::{
    ClassroomId, ClassroomSkillSummary, EngineError, EngineResult, PeerReview, ReviewType, Skill,
    SkillDimension, SoftSkillProfile, StudentId, TeamId,
};
use classpulse_storage::Storage;
use tracing::{debug, info};

/// Service aggregating peer reviews into soft-skill scores.
pub struct SoftSkillAggregator<S> {
    storage: Arc<S>,
}

impl<S: Storage> SoftSkillAggregator<S> {
    /// Create an aggregator over the given store.
    pub fn new(storage: Arc<S>) -> Self {
        Self { storage }
    }

    /// Record a review. A repeat submission for the same
    /// `(team, reviewer, reviewee, checkpoint)` tuple replaces the
    /// prior one; it never averages with itself.
    pub async fn submit_review(
        &self,
        team_id: TeamId,
        reviewer_id: StudentId,
        reviewee_id: StudentId,
        review_type: ReviewType,
        ratings: BTreeMap<Skill, u8>,
        comments: Option<String>,
    ) -> EngineResult<PeerReview> {
        if ratings.is_empty() {
            return Err(EngineError::Validation(
                "a review must rate at least one skill".to_string(),
            ));
        }
        for (skill, rating) in &ratings {
            if !(1..=5).contains(rating) {
                return Err(EngineError::Validation(format!(
                    "rating {} for {:?} is outside 1..=5",
                    rating, skill
                )));
            }
        }

        let review = PeerReview {
            team_id,
            reviewer_id,
            reviewee_id,
            review_type,
            ratings,
            comments,
            submitted_at: Utc::now(),
        };
        self.storage.upsert_review(&review).await?;
        info!(%team_id, %reviewer_id, %reviewee_id, checkpoint = %review_type, "review recorded");
        Ok(review)
    }

    /// Aggregate everything a student has received into a profile.
    /// Returns `None` when zero reviews exist; "no data" is explicit,
    /// never a score of zero.
    pub async fn profile(
        &self,
        student_id: StudentId,
        team_id: Option<TeamId>,
    ) -> EngineResult<Option<SoftSkillProfile>> {
        let reviews = self
            .storage
            .list_reviews_for_reviewee(student_id, team_id)
            .await?;
        Ok(profile_from_reviews(student_id, &reviews))
    }

    /// Per-dimension class averages: the mean of all students'
    /// per-dimension averages, unweighted by review count, so one
    /// heavily reviewed student cannot skew the class number.
    pub async fn classroom_summary(
        &self,
        classroom_id: ClassroomId,
    ) -> EngineResult<ClassroomSkillSummary> {
        let mut reviews_by_student: BTreeMap<StudentId, Vec<PeerReview>> = BTreeMap::new();
        for project in self.storage.list_projects(classroom_id).await? {
            for team in self.storage.list_teams(project.id).await? {
                for review in self.storage.list_reviews_for_team(team.id).await? {
                    reviews_by_student
                        .entry(review.reviewee_id)
                        .or_default()
                        .push(review);
                }
            }
        }

        let profiles: Vec<SoftSkillProfile> = reviews_by_student
            .iter()
            .filter_map(|(student_id, reviews)| profile_from_reviews(*student_id, reviews))
            .collect();
        debug!(%classroom_id, students = profiles.len(), "classroom summary computed");

        let mut dimension_averages = BTreeMap::new();
        for dimension in SkillDimension::ALL {
            let values: Vec<f64> = profiles
                .iter()
                .filter_map(|p| p.dimension_averages.get(&dimension).copied())
                .collect();
            if !values.is_empty() {
                dimension_averages
                    .insert(dimension, values.iter().sum::<f64>() / values.len() as f64);
            }
        }

        Ok(ClassroomSkillSummary {
            classroom_id,
            dimension_averages,
            student_count: profiles.len(),
        })
    }
}

/// Fold a student's distinct reviews into per-dimension and overall
/// averages on the canonical 1..5 scale.
fn profile_from_reviews(
    student_id: StudentId,
    reviews: &[PeerReview],
) -> Option<SoftSkillProfile> {
    if reviews.is_empty() {
        return None;
    }

    // Pool every skill rating under its dimension, across reviews.
    let mut pools: BTreeMap<SkillDimension, Vec<u8>> = BTreeMap::new();
    for review in reviews {
        for (skill, rating) in &review.ratings {
            pools.entry(skill.dimension()).or_default().push(*rating);
        }
    }

    let dimension_averages: BTreeMap<SkillDimension, f64> = pools
        .into_iter()
        .map(|(dimension, ratings)| {
            let mean = ratings.iter().map(|r| *r as f64).sum::<f64>() / ratings.len() as f64;
            (dimension, mean)
        })
        .collect();

    let overall = dimension_averages.values().sum::<f64>() / dimension_averages.len() as f64;

    Some(SoftSkillProfile {
        student_id,
        dimension_averages,
        overall,
        review_count: reviews.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use classpulse_core::{Project, ProjectId, Team};
    use classpulse_storage::JsonStorage;

    async fn setup() -> (tempfile::TempDir, Arc<JsonStorage>, SoftSkillAggregator<JsonStorage>) {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(JsonStorage::new(dir.path()).await.unwrap());
        let aggregator = SoftSkillAggregator::new(storage.clone());
        (dir, storage, aggregator)
    }

    fn ratings(pairs: &[(Skill, u8)]) -> BTreeMap<Skill, u8> {
        pairs.iter().copied().collect()
    }

    #[tokio::test]
    async fn out_of_range_rating_is_rejected() {
        let (_dir, _storage, aggregator) = setup().await;
        let err = aggregator
            .submit_review(
                TeamId::new(),
                StudentId::new(),
                StudentId::new(),
                ReviewType::MidProject,
                ratings(&[(Skill::Communication, 6)]),
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));

        let err = aggregator
            .submit_review(
                TeamId::new(),
                StudentId::new(),
                StudentId::new(),
                ReviewType::MidProject,
                ratings(&[(Skill::Communication, 0)]),
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[tokio::test]
    async fn zero_reviews_is_no_data() {
        let (_dir, _storage, aggregator) = setup().await;
        let profile = aggregator.profile(StudentId::new(), None).await.unwrap();
        assert!(profile.is_none());
    }

    #[tokio::test]
    async fn repeat_checkpoint_review_replaces_not_averages() {
        // Scenario: R1 rates communication 4 then corrects to 5 at the
        // same checkpoint; R2 rates 2. Average must be mean(5, 2) = 3.5.
        let (_dir, _storage, aggregator) = setup().await;
        let team = TeamId::new();
        let reviewee = StudentId::new();
        let r1 = StudentId::new();
        let r2 = StudentId::new();

        aggregator
            .submit_review(
                team,
                r1,
                reviewee,
                ReviewType::MidProject,
                ratings(&[(Skill::Communication, 4)]),
                None,
            )
            .await
            .unwrap();
        aggregator
            .submit_review(
                team,
                r2,
                reviewee,
                ReviewType::MidProject,
                ratings(&[(Skill::Communication, 2)]),
                None,
            )
            .await
            .unwrap();
        aggregator
            .submit_review(
                team,
                r1,
                reviewee,
                ReviewType::MidProject,
                ratings(&[(Skill::Communication, 5)]),
                None,
            )
            .await
            .unwrap();

        let profile = aggregator.profile(reviewee, Some(team)).await.unwrap().unwrap();
        assert_eq!(profile.review_count, 2);
        assert_eq!(
            profile.dimension_averages[&SkillDimension::TeamDynamics],
            3.5
        );
    }

    #[tokio::test]
    async fn overall_is_mean_of_dimension_averages() {
        let (_dir, _storage, aggregator) = setup().await;
        let team = TeamId::new();
        let reviewee = StudentId::new();

        aggregator
            .submit_review(
                team,
                StudentId::new(),
                reviewee,
                ReviewType::Final,
                ratings(&[
                    (Skill::Communication, 4),
                    (Skill::Trust, 2),
                    (Skill::ClearRoles, 5),
                ]),
                None,
            )
            .await
            .unwrap();

        let profile = aggregator.profile(reviewee, None).await.unwrap().unwrap();
        // TeamDynamics pools communication and trust: (4 + 2) / 2 = 3.
        assert_eq!(
            profile.dimension_averages[&SkillDimension::TeamDynamics],
            3.0
        );
        assert_eq!(
            profile.dimension_averages[&SkillDimension::TeamStructure],
            5.0
        );
        assert_eq!(profile.overall, 4.0);
    }

    #[tokio::test]
    async fn classroom_summary_is_unweighted_by_review_count() {
        let (_dir, storage, aggregator) = setup().await;
        let classroom = ClassroomId::new();
        let project = Project {
            id: ProjectId::new(),
            classroom_id: classroom,
            title: "Bridge".to_string(),
            description: String::new(),
            milestones: Vec::new(),
            deadline: None,
            created_at: Utc::now(),
        };
        storage.save_project(&project).await.unwrap();
        let team = Team {
            id: TeamId::new(),
            project_id: project.id,
            name: "Alpha".to_string(),
            created_at: Utc::now(),
        };
        storage.save_team(&team).await.unwrap();

        // Student A: three reviews, all communication 5.
        let a = StudentId::new();
        for _ in 0..3 {
            aggregator
                .submit_review(
                    team.id,
                    StudentId::new(),
                    a,
                    ReviewType::MidProject,
                    ratings(&[(Skill::Communication, 5)]),
                    None,
                )
                .await
                .unwrap();
        }
        // Student B: one review, communication 1.
        let b = StudentId::new();
        aggregator
            .submit_review(
                team.id,
                StudentId::new(),
                b,
                ReviewType::MidProject,
                ratings(&[(Skill::Communication, 1)]),
                None,
            )
            .await
            .unwrap();

        let summary = aggregator.classroom_summary(classroom).await.unwrap();
        assert_eq!(summary.student_count, 2);
        // Mean of student means (5 and 1), not of all four ratings.
        assert_eq!(
            summary.dimension_averages[&SkillDimension::TeamDynamics],
            3.0
        );
    }
}
