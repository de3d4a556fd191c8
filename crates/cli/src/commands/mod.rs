mod config;
mod daemon;
mod index;
mod logs;
mod search;
mod watch;

pub use config::{ConfigSetArgs, cmd_config_set, cmd_config_show};
pub use daemon::{cmd_daemon, cmd_status, cmd_stop};
pub use index::{cmd_enqueue, cmd_pause, cmd_reindex, cmd_resume};
pub use logs::cmd_logs;
pub use search::{cmd_files, cmd_search, cmd_stats};
pub use watch::{cmd_folders, cmd_watch};
