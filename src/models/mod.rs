mod user;
mod forms;
mod task;

pub use user::{NewUser, User};
pub use forms::{
    present, DeleteTaskQuery, DownloadForm, FileListQuery, LoginForm, RegisterForm,
    TaskListQuery, TrashForm,
};
pub use task::{NewTask, Task, DEFAULT_TASK_STATUS};
