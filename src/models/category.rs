use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Fallback swatch for tasks whose category is unknown.
pub const DEFAULT_CATEGORY_COLOR: &str = "#6B7280";

/// A row of the `categories` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub color: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCategoryRequest {
    pub name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateCategoryRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

/// Random hue at fixed saturation and lightness, which keeps every swatch pastel.
pub fn pastel_color() -> String {
    let hue: u16 = rand::rng().random_range(0..360);
    format!("hsl({}, 70%, 80%)", hue)
}
