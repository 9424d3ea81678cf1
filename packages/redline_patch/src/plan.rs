//! Plan snapshots and the narrator that turns two consecutive snapshots into
//! progress messages.
//!
//! The server always sends the full plan. Nothing here mutates tasks; the
//! narrator only compares `prev` against `next`.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::InProgress => write!(f, "in_progress"),
            Self::Completed => write!(f, "completed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanTask {
    pub id: String,
    pub title: String,
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Progress messages describing the move from `prev` to `next`.
///
/// Order: the created/updated summary, then per-task transitions in `next`
/// order, then the completion message.
pub fn narrate(prev: &[PlanTask], next: &[PlanTask]) -> Vec<String> {
    let mut messages = Vec::new();
    if next.is_empty() {
        return messages;
    }

    let current = in_progress(next);

    if prev.is_empty() {
        let mut summary = format!("Plan created with {}.", steps(next.len()));
        if let Some(task) = current {
            summary.push_str(&format!(" Starting with \"{}\".", task.title));
        }
        messages.push(summary);
    } else {
        let mut changes = Vec::new();
        if prev.len() != next.len() {
            changes.push(format!("{} (was {})", steps(next.len()), prev.len()));
        }
        let done = completed(next);
        if done > completed(prev) {
            changes.push(format!("{} of {} completed", done, next.len()));
        }
        if in_progress(prev).map(|t| &t.id) != current.map(|t| &t.id) {
            changes.push(match current {
                Some(task) => format!("now working on \"{}\"", task.title),
                None => "no step in progress".to_string(),
            });
        }
        if !changes.is_empty() {
            messages.push(format!("Plan updated: {}.", changes.join(", ")));
        }
    }

    for task in next {
        let Some(before) = prev.iter().find(|p| p.id == task.id) else {
            continue;
        };
        if before.status == task.status {
            continue;
        }
        match task.status {
            TaskStatus::Completed => messages.push(format!("Completed step: \"{}\".", task.title)),
            TaskStatus::InProgress => messages.push(format!("Moving to step: \"{}\".", task.title)),
            TaskStatus::Pending => {}
        }
    }

    if all_completed(next) && !all_completed(prev) {
        messages.push(format!(
            "Plan complete: all {} finished.",
            steps(next.len())
        ));
    }

    messages
}

/// Tasks present in both snapshots that went back to `pending`.
///
/// The narrator stays silent on these; callers decide whether to log them.
pub fn regressed_tasks<'a>(prev: &[PlanTask], next: &'a [PlanTask]) -> Vec<&'a PlanTask> {
    next.iter()
        .filter(|task| task.status == TaskStatus::Pending)
        .filter(|task| {
            prev.iter()
                .any(|p| p.id == task.id && p.status != TaskStatus::Pending)
        })
        .collect()
}

fn in_progress(tasks: &[PlanTask]) -> Option<&PlanTask> {
    tasks.iter().find(|t| t.status == TaskStatus::InProgress)
}

fn completed(tasks: &[PlanTask]) -> usize {
    tasks
        .iter()
        .filter(|t| t.status == TaskStatus::Completed)
        .count()
}

fn all_completed(tasks: &[PlanTask]) -> bool {
    !tasks.is_empty() && tasks.iter().all(|t| t.status == TaskStatus::Completed)
}

fn steps(count: usize) -> String {
    if count == 1 {
        "1 step".to_string()
    } else {
        format!("{count} steps")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(id: &str, status: TaskStatus) -> PlanTask {
        PlanTask {
            id: id.to_string(),
            title: id.to_string(),
            status,
            description: None,
        }
    }

    #[test]
    fn created_names_count_and_current_step() {
        let next = [
            task("t1", TaskStatus::InProgress),
            task("t2", TaskStatus::Pending),
        ];
        let messages = narrate(&[], &next);
        assert_eq!(messages.len(), 1);
        assert!(messages[0].contains("2 steps"));
        assert!(messages[0].contains("t1"));
    }

    #[test]
    fn created_without_current_step() {
        let messages = narrate(&[], &[task("t1", TaskStatus::Pending)]);
        assert_eq!(messages, ["Plan created with 1 step."]);
    }

    #[test]
    fn empty_next_says_nothing() {
        assert!(narrate(&[task("t1", TaskStatus::Pending)], &[]).is_empty());
        assert!(narrate(&[], &[]).is_empty());
    }

    #[test]
    fn identical_snapshots_say_nothing() {
        let plan = [
            task("t1", TaskStatus::InProgress),
            task("t2", TaskStatus::Pending),
        ];
        assert!(narrate(&plan, &plan).is_empty());
    }

    #[test]
    fn step_advance_produces_summary_then_transitions() {
        let prev = [
            task("t1", TaskStatus::InProgress),
            task("t2", TaskStatus::Pending),
        ];
        let next = [
            task("t1", TaskStatus::Completed),
            task("t2", TaskStatus::InProgress),
        ];
        let messages = narrate(&prev, &next);
        assert_eq!(
            messages,
            [
                "Plan updated: 1 of 2 completed, now working on \"t2\".",
                "Completed step: \"t1\".",
                "Moving to step: \"t2\".",
            ]
        );
    }

    #[test]
    fn task_count_change_is_reported() {
        let prev = [task("t1", TaskStatus::InProgress)];
        let next = [
            task("t1", TaskStatus::InProgress),
            task("t2", TaskStatus::Pending),
        ];
        assert_eq!(narrate(&prev, &next), ["Plan updated: 2 steps (was 1)."]);
    }

    #[test]
    fn completion_message_comes_last_and_once() {
        let prev = [
            task("t1", TaskStatus::Completed),
            task("t2", TaskStatus::InProgress),
        ];
        let next = [
            task("t1", TaskStatus::Completed),
            task("t2", TaskStatus::Completed),
        ];
        let messages = narrate(&prev, &next);
        assert_eq!(messages.last().unwrap(), "Plan complete: all 2 steps finished.");
        assert!(messages[0].starts_with("Plan updated:"));
        assert!(messages[0].contains("no step in progress"));

        // Already complete: no repeat.
        assert!(narrate(&next, &next).is_empty());
    }

    #[test]
    fn regression_to_pending_is_not_narrated() {
        let prev = [
            task("t1", TaskStatus::Completed),
            task("t2", TaskStatus::Pending),
        ];
        let next = [
            task("t1", TaskStatus::Pending),
            task("t2", TaskStatus::Pending),
        ];
        assert!(narrate(&prev, &next).is_empty());
        let regressed = regressed_tasks(&prev, &next);
        assert_eq!(regressed.len(), 1);
        assert_eq!(regressed[0].id, "t1");
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&task("t1", TaskStatus::InProgress)).unwrap();
        assert!(json.contains("\"in_progress\""));
        assert!(!json.contains("description"));
    }
}
