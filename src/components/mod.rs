mod dashboard;
mod events;
mod form;
mod list;

pub use dashboard::{Dashboard, DashboardView, FilterView, TaskRow};
pub use events::{Revision, TaskEvents};
pub use form::{CategoryPicker, FormPhase, TaskFields, TaskForm};
pub use list::{MountHandle, TaskList};
