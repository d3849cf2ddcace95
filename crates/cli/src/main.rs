//! ClassPulse CLI - classroom learning-progress engine.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use classpulse_core::{
    AssignmentId, ClassroomId, EngineError, MilestoneId, PollId, ProjectId, ReviewType, Skill,
    StudentId, SubmitterId, TaskId, TeamId, Time,
};
use classpulse_engine::{
    default_catalog, ErrorBody, MilestonePlan, ProgressEngine, ProgressionConfig, WorkPayload,
};
use classpulse_storage::JsonStorage;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "classpulse")]
#[command(about = "Classroom learning progress and engagement engine", long_about = None)]
struct Cli {
    /// Data directory for the JSON store
    #[arg(long, default_value = ".classpulse", global = true)]
    data_dir: PathBuf,

    /// JSON file with the level curve and XP amounts
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Project and team setup
    Project {
        #[command(subcommand)]
        command: ProjectCommands,
    },
    /// Standalone assignment lifecycle
    Assignment {
        #[command(subcommand)]
        command: AssignmentCommands,
    },
    /// Team milestone workflow
    Milestone {
        #[command(subcommand)]
        command: MilestoneCommands,
    },
    /// Peer reviews and soft-skill profiles
    Review {
        #[command(subcommand)]
        command: ReviewCommands,
    },
    /// Live polls
    Poll {
        #[command(subcommand)]
        command: PollCommands,
    },
    /// Task completion XP
    Task {
        #[command(subcommand)]
        command: TaskCommands,
    },
    /// Show a team's milestone and XP progress
    Progress {
        /// Team ID
        team: TeamId,
    },
}

#[derive(Subcommand)]
enum ProjectCommands {
    /// Create a project with its ordered milestone plan
    Create {
        /// Classroom ID
        #[arg(long)]
        classroom: ClassroomId,
        /// Project title
        #[arg(long)]
        title: String,
        /// Project description
        #[arg(long, default_value = "")]
        description: String,
        /// Overall deadline (RFC 3339)
        #[arg(long)]
        deadline: Option<Time>,
        /// Milestone titles, in order (repeatable)
        #[arg(long = "milestone", required = true)]
        milestones: Vec<String>,
    },
    /// Register a team on a project
    AddTeam {
        /// Project ID
        #[arg(long)]
        project: ProjectId,
        /// Team name
        #[arg(long)]
        name: String,
    },
}

#[derive(Subcommand)]
enum AssignmentCommands {
    /// Create an assignment in a classroom
    Create {
        /// Classroom ID
        #[arg(long)]
        classroom: ClassroomId,
        /// Assignment title
        #[arg(long)]
        title: String,
        /// Due date (RFC 3339)
        #[arg(long)]
        due: Option<Time>,
        /// Points the assignment is graded out of
        #[arg(long, default_value = "100")]
        points: u32,
        /// Accept (and flag) late submissions
        #[arg(long)]
        allow_late: bool,
    },
    /// Issue an assignment to a student
    Issue {
        /// Assignment ID
        #[arg(long)]
        assignment: AssignmentId,
        /// Student ID
        #[arg(long)]
        student: StudentId,
    },
    /// Turn in a student's work
    Submit {
        /// Assignment ID
        #[arg(long)]
        assignment: AssignmentId,
        /// Student ID
        #[arg(long)]
        student: StudentId,
        /// Submission notes
        #[arg(long, default_value = "")]
        notes: String,
        /// Report URL
        #[arg(long)]
        report_url: Option<String>,
        /// Archive URL
        #[arg(long)]
        zip_url: Option<String>,
    },
    /// Grade turned-in work
    Grade {
        /// Assignment ID
        #[arg(long)]
        assignment: AssignmentId,
        /// Student ID
        #[arg(long)]
        student: StudentId,
        /// Grade (at most the assignment's points)
        #[arg(long)]
        grade: u32,
        /// Feedback for the student
        #[arg(long)]
        feedback: Option<String>,
    },
    /// Return graded work for revision
    Return {
        /// Assignment ID
        #[arg(long)]
        assignment: AssignmentId,
        /// Student ID
        #[arg(long)]
        student: StudentId,
        /// Feedback for the student
        #[arg(long)]
        feedback: Option<String>,
    },
}

#[derive(Subcommand)]
enum MilestoneCommands {
    /// Turn in a team's milestone work
    Submit {
        /// Team ID
        #[arg(long)]
        team: TeamId,
        /// Milestone ID
        #[arg(long)]
        milestone: MilestoneId,
        /// Submission notes
        #[arg(long, default_value = "")]
        notes: String,
        /// Report URL
        #[arg(long)]
        report_url: Option<String>,
        /// Archive URL
        #[arg(long)]
        zip_url: Option<String>,
    },
    /// Grade a team's milestone submission
    Grade {
        /// Team ID
        #[arg(long)]
        team: TeamId,
        /// Milestone ID
        #[arg(long)]
        milestone: MilestoneId,
        /// Grade (at most the milestone's points)
        #[arg(long)]
        grade: u32,
        /// Feedback for the team
        #[arg(long)]
        feedback: Option<String>,
    },
    /// Return a graded milestone for revision
    Return {
        /// Team ID
        #[arg(long)]
        team: TeamId,
        /// Milestone ID
        #[arg(long)]
        milestone: MilestoneId,
        /// Feedback for the team
        #[arg(long)]
        feedback: Option<String>,
    },
}

#[derive(Subcommand)]
enum ReviewCommands {
    /// Submit (or replace) a peer review
    Submit {
        /// Team ID
        #[arg(long)]
        team: TeamId,
        /// Reviewing student
        #[arg(long)]
        reviewer: StudentId,
        /// Reviewed student
        #[arg(long)]
        reviewee: StudentId,
        /// Checkpoint: mid_project, final, self_assessment or teacher_assessment
        #[arg(long = "type")]
        review_type: String,
        /// Ratings as skill=1..5 (repeatable), e.g. communication=4
        #[arg(long = "rating", required = true)]
        ratings: Vec<String>,
        /// Free-form comments
        #[arg(long)]
        comments: Option<String>,
    },
    /// Show a student's soft-skill profile
    Profile {
        /// Student ID
        #[arg(long)]
        student: StudentId,
        /// Restrict to one team
        #[arg(long)]
        team: Option<TeamId>,
    },
    /// Show classroom-wide dimension averages
    Summary {
        /// Classroom ID
        #[arg(long)]
        classroom: ClassroomId,
    },
}

#[derive(Subcommand)]
enum PollCommands {
    /// Open a poll in a classroom
    Open {
        /// Classroom ID
        #[arg(long)]
        classroom: ClassroomId,
        /// The question to ask
        #[arg(long)]
        question: String,
        /// Answer options, in display order (repeatable)
        #[arg(long = "option", required = true)]
        options: Vec<String>,
    },
    /// Record a student's answer
    Respond {
        /// Poll ID
        #[arg(long)]
        poll: PollId,
        /// Student ID
        #[arg(long)]
        student: StudentId,
        /// The chosen option
        #[arg(long)]
        option: String,
    },
    /// Close a poll and print final tallies
    Close {
        /// Poll ID
        #[arg(long)]
        poll: PollId,
    },
    /// Show current tallies
    Results {
        /// Poll ID
        #[arg(long)]
        poll: PollId,
    },
    /// Show the classroom's active poll
    Active {
        /// Classroom ID
        #[arg(long)]
        classroom: ClassroomId,
    },
}

#[derive(Subcommand)]
enum TaskCommands {
    /// Record a completed task for a team
    Complete {
        /// Team ID
        #[arg(long)]
        team: TeamId,
        /// Task ID (generated when omitted)
        #[arg(long)]
        task: Option<TaskId>,
        /// What was completed
        #[arg(long, default_value = "Task completed")]
        reason: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    let storage = Arc::new(
        JsonStorage::new(&cli.data_dir)
            .await
            .with_context(|| format!("opening store at {}", cli.data_dir.display()))?,
    );
    let config = match &cli.config {
        Some(path) => {
            let json = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("reading config at {}", path.display()))?;
            serde_json::from_str(&json)
                .with_context(|| format!("parsing config at {}", path.display()))?
        }
        None => ProgressionConfig::default(),
    };
    let engine = ProgressEngine::with_progression(storage, config, default_catalog());

    match cli.command {
        Commands::Project { command } => run_project(&engine, command).await,
        Commands::Assignment { command } => run_assignment(&engine, command).await,
        Commands::Milestone { command } => run_milestone(&engine, command).await,
        Commands::Review { command } => run_review(&engine, command).await,
        Commands::Poll { command } => run_poll(&engine, command).await,
        Commands::Task { command } => run_task(&engine, command).await,
        Commands::Progress { team } => {
            let milestones = engine.milestone_progress(team).await.map_err(fail)?;
            let progress = engine.team_progress(team).await.map_err(fail)?;
            println!(
                "Team {} | level {} | {} XP{}",
                team,
                progress.current_level,
                progress.total_xp,
                progress
                    .xp_to_next_level
                    .map(|xp| format!(" | {xp} to next level"))
                    .unwrap_or_default(),
            );
            for state in &milestones.milestones {
                let marker = if state.completed {
                    "done"
                } else if state.pending_approval {
                    "pending approval"
                } else if state.unlocked {
                    "open"
                } else {
                    "locked"
                };
                println!("  [{}] {} - {}", state.sequence_index, state.milestone_id, marker);
            }
            for achievement in &progress.unlocked_achievements {
                println!("  earned: {}", achievement.as_str());
            }
            Ok(())
        }
    }
}

async fn run_project(engine: &ProgressEngine<JsonStorage>, command: ProjectCommands) -> Result<()> {
    match command {
        ProjectCommands::Create {
            classroom,
            title,
            description,
            deadline,
            milestones,
        } => {
            let plan = milestones
                .into_iter()
                .map(|title| MilestonePlan {
                    title,
                    description: String::new(),
                    due_date: None,
                    points: None,
                })
                .collect();
            let (project, milestones) = engine
                .create_project(classroom, title, description, deadline, plan)
                .await
                .map_err(fail)?;
            println!("Created project: {} - {}", project.id, project.title);
            for milestone in milestones {
                println!("  [{}] {} - {}", milestone.sequence_index, milestone.id, milestone.title);
            }
        }
        ProjectCommands::AddTeam { project, name } => {
            let team = engine.create_team(project, name).await.map_err(fail)?;
            println!("Created team: {} - {}", team.id, team.name);
        }
    }
    Ok(())
}

async fn run_assignment(
    engine: &ProgressEngine<JsonStorage>,
    command: AssignmentCommands,
) -> Result<()> {
    match command {
        AssignmentCommands::Create {
            classroom,
            title,
            due,
            points,
            allow_late,
        } => {
            let assignment = engine
                .create_assignment(classroom, title, due, points, allow_late)
                .await
                .map_err(fail)?;
            println!("Created assignment: {} - {}", assignment.id, assignment.title);
        }
        AssignmentCommands::Issue { assignment, student } => {
            let submission = engine
                .issue(assignment, SubmitterId::from(student))
                .await
                .map_err(fail)?;
            println!("Issued: status {}", submission.status);
        }
        AssignmentCommands::Submit {
            assignment,
            student,
            notes,
            report_url,
            zip_url,
        } => {
            let payload = WorkPayload {
                notes,
                report_url,
                zip_url,
            };
            let submission = engine
                .submit_work(assignment, student.into(), payload)
                .await
                .map_err(fail)?;
            println!(
                "Turned in: status {}{}",
                submission.status,
                if submission.is_late { " (late)" } else { "" },
            );
        }
        AssignmentCommands::Grade {
            assignment,
            student,
            grade,
            feedback,
        } => {
            engine
                .grade_work(assignment, student.into(), grade, feedback)
                .await
                .map_err(fail)?;
            println!("Graded: {grade} points");
        }
        AssignmentCommands::Return {
            assignment,
            student,
            feedback,
        } => {
            let submission = engine
                .return_work(assignment, student.into(), feedback)
                .await
                .map_err(fail)?;
            println!("Returned for revision: status {}", submission.status);
        }
    }
    Ok(())
}

async fn run_milestone(
    engine: &ProgressEngine<JsonStorage>,
    command: MilestoneCommands,
) -> Result<()> {
    match command {
        MilestoneCommands::Submit {
            team,
            milestone,
            notes,
            report_url,
            zip_url,
        } => {
            let payload = WorkPayload {
                notes,
                report_url,
                zip_url,
            };
            let progress = engine
                .submit_milestone(team, milestone, payload)
                .await
                .map_err(fail)?;
            println!(
                "Turned in milestone; {} of {} completed, current index {}",
                progress.milestones_completed,
                progress.milestones.len(),
                progress.current_index,
            );
        }
        MilestoneCommands::Grade {
            team,
            milestone,
            grade,
            feedback,
        } => {
            engine
                .grade_milestone(team, milestone, grade, feedback)
                .await
                .map_err(fail)?;
            println!("Graded milestone: {grade} points");
        }
        MilestoneCommands::Return {
            team,
            milestone,
            feedback,
        } => {
            engine
                .return_milestone(team, milestone, feedback)
                .await
                .map_err(fail)?;
            println!("Returned milestone for revision");
        }
    }
    Ok(())
}

async fn run_review(engine: &ProgressEngine<JsonStorage>, command: ReviewCommands) -> Result<()> {
    match command {
        ReviewCommands::Submit {
            team,
            reviewer,
            reviewee,
            review_type,
            ratings,
            comments,
        } => {
            let review_type = parse_review_type(&review_type)?;
            let ratings = parse_ratings(&ratings)?;
            engine
                .submit_review(team, reviewer, reviewee, review_type, ratings, comments)
                .await
                .map_err(fail)?;
            println!("Review recorded");
        }
        ReviewCommands::Profile { student, team } => {
            match engine.skill_profile(student, team).await.map_err(fail)? {
                None => println!("No reviews yet for {student}"),
                Some(profile) => {
                    println!(
                        "Profile for {} ({} reviews) | overall {:.1} ({:.0}%)",
                        student,
                        profile.review_count,
                        profile.overall,
                        profile.overall_as_percent(),
                    );
                    for (dimension, average) in &profile.dimension_averages {
                        println!("  {}: {:.1}", dimension.label(), average);
                    }
                }
            }
        }
        ReviewCommands::Summary { classroom } => {
            let summary = engine.classroom_skill_summary(classroom).await.map_err(fail)?;
            println!("Classroom {} ({} students reviewed)", classroom, summary.student_count);
            for (dimension, average) in &summary.dimension_averages {
                println!("  {}: {:.1}", dimension.label(), average);
            }
        }
    }
    Ok(())
}

async fn run_poll(engine: &ProgressEngine<JsonStorage>, command: PollCommands) -> Result<()> {
    match command {
        PollCommands::Open {
            classroom,
            question,
            options,
        } => {
            let poll = engine
                .open_poll(classroom, question, options)
                .await
                .map_err(fail)?;
            println!("Opened poll: {} - {}", poll.id, poll.question);
        }
        PollCommands::Respond {
            poll,
            student,
            option,
        } => {
            engine.respond_to_poll(poll, student, option).await.map_err(fail)?;
            println!("Response recorded");
        }
        PollCommands::Close { poll } => {
            let results = engine.close_poll(poll).await.map_err(fail)?;
            print_results(&results);
        }
        PollCommands::Results { poll } => {
            let results = engine.poll_results(poll).await.map_err(fail)?;
            print_results(&results);
        }
        PollCommands::Active { classroom } => {
            match engine.active_poll(classroom).await.map_err(fail)? {
                Some(poll) => println!("Active poll: {} - {}", poll.id, poll.question),
                None => println!("No active poll"),
            }
        }
    }
    Ok(())
}

async fn run_task(engine: &ProgressEngine<JsonStorage>, command: TaskCommands) -> Result<()> {
    match command {
        TaskCommands::Complete { team, task, reason } => {
            let task = task.unwrap_or_default();
            let progress = engine
                .complete_task(team, task, reason)
                .await
                .map_err(fail)?;
            println!(
                "Task {} recorded | {} XP total, level {}",
                task, progress.total_xp, progress.current_level,
            );
        }
    }
    Ok(())
}

fn print_results(results: &classpulse_core::PollResults) {
    let state = if results.poll.is_active { "active" } else { "closed" };
    println!(
        "Poll {} ({}) - {} | {} responses",
        results.poll.id, state, results.poll.question, results.total_responses,
    );
    for tally in &results.tallies {
        println!("  {}: {}", tally.option, tally.count);
    }
}

fn parse_review_type(s: &str) -> Result<ReviewType> {
    serde_json::from_value(serde_json::Value::String(s.to_string()))
        .map_err(|_| anyhow!("unknown review type {s:?}"))
}

fn parse_ratings(pairs: &[String]) -> Result<BTreeMap<Skill, u8>> {
    let mut ratings = BTreeMap::new();
    for pair in pairs {
        let (skill, value) = pair
            .split_once('=')
            .ok_or_else(|| anyhow!("ratings look like skill=1..5, got {pair:?}"))?;
        let skill: Skill = serde_json::from_value(serde_json::Value::String(skill.to_string()))
            .map_err(|_| anyhow!("unknown skill {skill:?}"))?;
        let value: u8 = value
            .parse()
            .with_context(|| format!("rating for {skill:?} is not a number"))?;
        ratings.insert(skill, value);
    }
    Ok(ratings)
}

// Engine failures carry a machine-readable body; print it as JSON so
// scripts can branch on `kind`.
fn fail(err: EngineError) -> anyhow::Error {
    let body = ErrorBody::from(&err);
    match serde_json::to_string(&body) {
        Ok(json) => anyhow!(json),
        Err(_) => anyhow!(err),
    }
}
