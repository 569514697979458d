mod auth;
mod extract;
mod files;
mod proxy;
mod scope;
mod task;

pub use auth::{current_user, handle_login, handle_logout, handle_register};
pub use extract::JsonBody;
pub use files::{download_url, file_info, list_files, quota, trash_files};
pub use proxy::{proxy_download, LinkSource};
pub use task::{add_download, delete_task, list_tasks, retry_task};
