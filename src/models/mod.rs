pub mod category;
pub mod identity;
pub mod task;

pub use category::{Category, NewCategoryRequest, UpdateCategoryRequest};
pub use identity::{Identity, OAuthProvider, Session};
pub use task::{NewTaskRequest, Priority, Task, UpdateTaskRequest};
