//! End-to-end scenarios through the engine facade over a JSON store.

use std::sync::Arc;

use classpulse_core::{ClassroomEvent, ClassroomId, EngineError, StudentId, TaskId};
use classpulse_engine::{MilestonePlan, ProgressEngine, WorkPayload};
use classpulse_storage::JsonStorage;

async fn engine(dir: &tempfile::TempDir) -> ProgressEngine<JsonStorage> {
    let storage = Arc::new(JsonStorage::new(dir.path()).await.unwrap());
    ProgressEngine::new(storage)
}

fn plan(titles: &[&str]) -> Vec<MilestonePlan> {
    titles
        .iter()
        .map(|t| MilestonePlan {
            title: t.to_string(),
            description: String::new(),
            due_date: None,
            points: None,
        })
        .collect()
}

#[tokio::test]
async fn milestone_chain_unlocks_in_order_and_broadcasts() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine(&dir).await;
    let classroom = ClassroomId::new();
    let (project, milestones) = engine
        .create_project(
            classroom,
            "Mars Rover",
            "Build and present a rover",
            None,
            plan(&["Research", "Prototype", "Demo"]),
        )
        .await
        .unwrap();
    let team = engine.create_team(project.id, "Crater Crew").await.unwrap();
    let mut events = engine.subscribe(classroom);

    // Only the first milestone is open at the start.
    let progress = engine.milestone_progress(team.id).await.unwrap();
    assert!(progress.milestones[0].unlocked);
    assert!(!progress.milestones[1].unlocked);
    let err = engine
        .submit_milestone(team.id, milestones[1].id, WorkPayload::default())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::InvalidTransition { action: "submit", .. }
    ));

    // Turning in milestone 0 unlocks milestone 1 and fires events.
    let progress = engine
        .submit_milestone(team.id, milestones[0].id, WorkPayload::default())
        .await
        .unwrap();
    assert!(progress.milestones[1].unlocked);
    assert!(!progress.milestones[2].unlocked);
    assert_eq!(progress.current_index, 1);

    match events.try_recv().unwrap() {
        ClassroomEvent::MilestoneUnlocked { team_id, milestone } => {
            assert_eq!(team_id, team.id);
            assert_eq!(milestone.milestone_id, milestones[1].id);
        }
        other => panic!("expected MilestoneUnlocked, got {other:?}"),
    }
    match events.try_recv().unwrap() {
        ClassroomEvent::AchievementEarned { achievement, .. } => {
            assert_eq!(achievement.id.as_str(), "first-steps");
        }
        other => panic!("expected AchievementEarned, got {other:?}"),
    }
}

#[tokio::test]
async fn grading_awards_milestone_points_exactly_once() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine(&dir).await;
    let classroom = ClassroomId::new();
    let (project, milestones) = engine
        .create_project(classroom, "Bridge", "", None, plan(&["Design", "Build"]))
        .await
        .unwrap();
    let team = engine.create_team(project.id, "Truss Team").await.unwrap();

    engine
        .submit_milestone(team.id, milestones[0].id, WorkPayload::default())
        .await
        .unwrap();
    engine
        .grade_milestone(team.id, milestones[0].id, 90, Some("good".into()))
        .await
        .unwrap();

    // 100 for the milestone, 50 for first-steps, 100 for first-milestone.
    let progress = engine.team_progress(team.id).await.unwrap();
    assert_eq!(progress.total_xp, 250);
    assert!(progress
        .unlocked_achievements
        .iter()
        .any(|a| a.as_str() == "first-milestone"));

    // Return, resubmit and re-grade: no XP is awarded a second time.
    engine
        .return_milestone(team.id, milestones[0].id, Some("tighten the math".into()))
        .await
        .unwrap();
    engine
        .submit_milestone(team.id, milestones[0].id, WorkPayload::default())
        .await
        .unwrap();
    engine
        .grade_milestone(team.id, milestones[0].id, 95, None)
        .await
        .unwrap();

    let progress = engine.team_progress(team.id).await.unwrap();
    assert_eq!(progress.total_xp, 250);
}

#[tokio::test]
async fn task_completion_awards_configured_xp_once() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine(&dir).await;
    let (project, _) = engine
        .create_project(ClassroomId::new(), "Garden", "", None, plan(&["Plant"]))
        .await
        .unwrap();
    let team = engine.create_team(project.id, "Sprouts").await.unwrap();
    let task = TaskId::new();

    let progress = engine
        .complete_task(team.id, task, "Watering schedule drafted")
        .await
        .unwrap();
    assert_eq!(progress.total_xp, 50);

    let err = engine
        .complete_task(team.id, task, "replayed")
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Conflict(_)));
    assert_eq!(engine.team_progress(team.id).await.unwrap().total_xp, 50);
}

#[tokio::test]
async fn poll_lifecycle_broadcasts_open_and_close() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine(&dir).await;
    let classroom = ClassroomId::new();
    let mut events = engine.subscribe(classroom);

    let poll = engine
        .open_poll(
            classroom,
            "Which demo slot?",
            vec!["Morning".to_string(), "Afternoon".to_string()],
        )
        .await
        .unwrap();
    engine
        .respond_to_poll(poll.id, StudentId::new(), "Morning")
        .await
        .unwrap();
    engine
        .respond_to_poll(poll.id, StudentId::new(), "Morning")
        .await
        .unwrap();
    let results = engine.close_poll(poll.id).await.unwrap();
    assert_eq!(results.total_responses, 2);

    assert!(matches!(
        events.try_recv().unwrap(),
        ClassroomEvent::PollOpened { .. }
    ));
    match events.try_recv().unwrap() {
        ClassroomEvent::PollClosed { poll, tallies } => {
            assert!(!poll.is_active);
            assert_eq!(tallies[0].count, 2);
            assert_eq!(tallies[1].count, 0);
        }
        other => panic!("expected PollClosed, got {other:?}"),
    }

    // The classroom slot is free again.
    assert!(engine.active_poll(classroom).await.unwrap().is_none());
    engine
        .open_poll(classroom, "Next question?", vec!["a".into(), "b".into()])
        .await
        .unwrap();
}
