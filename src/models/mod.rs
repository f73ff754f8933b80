pub mod status;
pub mod task;
pub mod user;

pub use status::{NewServerStatus, ServerStatus};
pub use task::{Task, TaskInput, TaskPatch};
pub use user::{NewUser, Role, User, UserRead};
