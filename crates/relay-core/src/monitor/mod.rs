//! Entity-change monitor: poll, diff, notify, persist.

pub mod differ;
pub mod notifier;
pub mod scheduler;
pub mod source;
pub mod store;
pub mod templates;

pub use differ::{diff, Baseline, ChangeEvent, EntitySnapshot};
pub use notifier::{ColorCodeRenderer, NotificationBody, NotificationRenderer, Notifier};
pub use scheduler::{Monitor, MonitorPhase, MonitorStatus};
pub use source::EntitySource;
pub use store::{FileStateStore, PersistedState, StateStore};
