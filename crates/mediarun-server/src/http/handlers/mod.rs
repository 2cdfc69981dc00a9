//! HTTP request handlers.

mod health;
mod run;
mod tasks;

pub use health::health_check;
pub use run::run_command;
pub use tasks::{get_task, list_tasks, save_task};
