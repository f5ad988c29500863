use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::Task;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusFilter {
    #[default]
    All,
    Active,
    Completed,
}

impl StatusFilter {
    pub fn matches(self, task: &Task) -> bool {
        match self {
            StatusFilter::All => true,
            StatusFilter::Active => !task.is_complete,
            StatusFilter::Completed => task.is_complete,
        }
    }
}

impl FromStr for StatusFilter {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "all" => Ok(StatusFilter::All),
            "active" => Ok(StatusFilter::Active),
            "completed" => Ok(StatusFilter::Completed),
            other => Err(AppError::validation(format!("Unknown status filter: {}", other))),
        }
    }
}

/// Display criteria for the task list. Every active predicate must hold.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListFilter {
    pub status: StatusFilter,
    pub query: String,
    pub category: Option<Uuid>,
}

impl ListFilter {
    /// Reads the combined select value of the dashboard, where a category is
    /// encoded as `category:<id>` next to the plain status values.
    pub fn from_select(value: &str) -> Result<Self, AppError> {
        match value.strip_prefix("category:") {
            Some(id) => {
                let id = Uuid::parse_str(id.trim())
                    .map_err(|_| AppError::validation(format!("Unknown category: {}", id)))?;
                Ok(Self {
                    category: Some(id),
                    ..Self::default()
                })
            }
            None => Ok(Self {
                status: value.parse()?,
                ..Self::default()
            }),
        }
    }

    pub fn matches(&self, task: &Task) -> bool {
        if !self.status.matches(task) {
            return false;
        }

        if !self.query.is_empty()
            && !task.label.to_lowercase().contains(&self.query.to_lowercase())
        {
            return false;
        }

        match self.category {
            Some(category) => task.category == Some(category),
            None => true,
        }
    }

    pub fn apply(&self, tasks: &[Task]) -> Vec<Task> {
        tasks.iter().filter(|task| self.matches(task)).cloned().collect()
    }
}

/// Visible subset of `tasks` in their original order.
pub fn filter(
    tasks: &[Task],
    status: StatusFilter,
    query: &str,
    category: Option<Uuid>,
) -> Vec<Task> {
    ListFilter {
        status,
        query: query.to_string(),
        category,
    }
    .apply(tasks)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::models::Priority;

    fn task(label: &str, is_complete: bool, category: Option<Uuid>) -> Task {
        Task {
            id: Uuid::new_v4(),
            user_id: Uuid::nil(),
            label: label.to_string(),
            description: None,
            due_date: None,
            priority: Priority::Low,
            category,
            is_complete,
            created_at: Utc::now(),
        }
    }

    fn labels(tasks: &[Task]) -> Vec<&str> {
        tasks.iter().map(|t| t.label.as_str()).collect()
    }

    #[test]
    fn test_query_matches_label_case_insensitively() {
        let tasks = vec![
            task("Buy bread", false, None),
            task("Feed dog", false, None),
            task("Pay rent", false, None),
        ];

        assert_eq!(labels(&filter(&tasks, StatusFilter::All, "ed", None)), vec!["Feed dog"]);
        assert_eq!(labels(&filter(&tasks, StatusFilter::All, "BREAD", None)), vec!["Buy bread"]);
        assert_eq!(labels(&filter(&tasks, StatusFilter::All, "d d", None)), vec!["Feed dog"]);
    }

    #[test]
    fn test_query_is_matched_as_typed() {
        let tasks = vec![task("Feed dog", false, None), task("Buy bread", false, None)];

        assert!(filter(&tasks, StatusFilter::All, " ed", None).is_empty());
        assert!(filter(&tasks, StatusFilter::All, "  ", None).is_empty());
        assert_eq!(labels(&filter(&tasks, StatusFilter::All, " bread", None)), vec!["Buy bread"]);
    }

    #[test]
    fn test_completed_subset_keeps_order() {
        let tasks = vec![
            task("a", true, None),
            task("b", false, None),
            task("c", true, None),
        ];

        assert_eq!(labels(&filter(&tasks, StatusFilter::Completed, "", None)), vec!["a", "c"]);
        assert_eq!(labels(&filter(&tasks, StatusFilter::Active, "", None)), vec!["b"]);
        assert_eq!(filter(&tasks, StatusFilter::All, "", None).len(), 3);
    }

    #[test]
    fn test_predicates_combine() {
        let work = Uuid::new_v4();
        let tasks = vec![
            task("Write report", false, Some(work)),
            task("Write letter", false, None),
            task("Review report", true, Some(work)),
        ];

        let visible = filter(&tasks, StatusFilter::Active, "report", Some(work));
        assert_eq!(labels(&visible), vec!["Write report"]);
    }

    #[test]
    fn test_from_select() {
        let id = Uuid::new_v4();
        let by_category = ListFilter::from_select(&format!("category:{}", id))
            .expect("Failed to parse category select");
        assert_eq!(by_category.category, Some(id));
        assert_eq!(by_category.status, StatusFilter::All);

        let completed = ListFilter::from_select("completed").expect("Failed to parse status");
        assert_eq!(completed.status, StatusFilter::Completed);

        assert!(ListFilter::from_select("category:nope").is_err());
        assert!(ListFilter::from_select("someday").is_err());
    }
}
