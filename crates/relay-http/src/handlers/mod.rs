pub mod config;
pub mod health;
pub mod monitor;
pub mod relay;

pub use config::reload_config_handler;
pub use health::{health_handler, index_handler};
pub use monitor::{force_check_handler, monitor_status_handler};
pub use relay::relay_handler;
