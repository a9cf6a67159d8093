// Declare submodules
pub mod change_source;
pub mod change_watcher;
pub mod message_models;

// Re-export public items
pub use change_source::FirestoreChangeSource;
pub use change_watcher::ChangeWatcher;
pub use message_models::{ChangeBatch, ChangeEvent, ChangeKind};
