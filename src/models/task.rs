use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Priority {
    #[default]
    Low,
    Medium,
    High,
}

impl Priority {
    pub fn label(self) -> &'static str {
        match self {
            Priority::Low => "Low",
            Priority::Medium => "Medium",
            Priority::High => "High",
        }
    }
}

impl TryFrom<u8> for Priority {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Priority::Low),
            2 => Ok(Priority::Medium),
            3 => Ok(Priority::High),
            other => Err(format!("priority must be 1, 2 or 3, got {}", other)),
        }
    }
}

impl From<Priority> for u8 {
    fn from(value: Priority) -> Self {
        match value {
            Priority::Low => 1,
            Priority::Medium => 2,
            Priority::High => 3,
        }
    }
}

/// A row of the `todos` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub user_id: Uuid,
    #[serde(rename = "task")]
    pub label: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default, deserialize_with = "priority_or_low")]
    pub priority: Priority,
    #[serde(default)]
    pub category: Option<Uuid>,
    #[serde(default)]
    pub is_complete: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewTaskRequest {
    #[serde(rename = "task")]
    pub label: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub category: Option<Uuid>,
}

/// Partial update. For nullable columns the outer `Option` says whether the
/// field is touched and the inner one carries the new value or `null`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateTaskRequest {
    #[serde(rename = "task", default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Option::is_none")]
    pub description: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Option::is_none")]
    pub due_date: Option<Option<NaiveDate>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Option::is_none")]
    pub category: Option<Option<Uuid>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_complete: Option<bool>,
}

impl UpdateTaskRequest {
    pub fn completion(is_complete: bool) -> Self {
        Self {
            is_complete: Some(is_complete),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

fn priority_or_low<'de, D>(deserializer: D) -> Result<Priority, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Priority>::deserialize(deserializer)?.unwrap_or_default())
}

fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Some(Option::deserialize(deserializer)?))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_task_from_store_row() {
        let row = json!({
            "id": "0b9f1c64-8f0e-4a43-9c4b-3d2f5b8a6e11",
            "user_id": "6d1c2b0a-3e4f-4c5d-8e9f-0a1b2c3d4e5f",
            "task": "Pay rent",
            "description": null,
            "due_date": "2026-11-01",
            "priority": null,
            "category": null,
            "is_complete": false,
            "created_at": "2026-10-18T09:30:00.123456+00:00"
        });

        let task: Task = serde_json::from_value(row).expect("Failed to decode task");
        assert_eq!(task.label, "Pay rent");
        assert_eq!(task.priority, Priority::Low);
        assert_eq!(task.due_date, NaiveDate::from_ymd_opt(2026, 11, 1));
    }

    #[test]
    fn test_priority_rejects_out_of_range() {
        assert!(serde_json::from_value::<Priority>(json!(4)).is_err());
        assert_eq!(serde_json::to_value(Priority::High).ok(), Some(json!(3)));
    }

    #[test]
    fn test_update_distinguishes_null_from_missing() {
        let update: UpdateTaskRequest =
            serde_json::from_value(json!({ "category": null, "is_complete": true }))
                .expect("Failed to decode update");

        assert_eq!(update.category, Some(None));
        assert_eq!(update.description, None);
        assert_eq!(
            serde_json::to_value(&update).ok(),
            Some(json!({ "category": null, "is_complete": true }))
        );
    }

    #[test]
    fn test_new_task_ignores_client_owner() {
        let req: NewTaskRequest = serde_json::from_value(json!({
            "task": "Feed dog",
            "user_id": "6d1c2b0a-3e4f-4c5d-8e9f-0a1b2c3d4e5f"
        }))
        .expect("Failed to decode request");

        let encoded = serde_json::to_value(&req).expect("Failed to encode request");
        assert!(encoded.get("user_id").is_none());
    }
}
