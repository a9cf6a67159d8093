// Declare submodules
pub mod notification_models;
pub mod notification_service;

// Re-export public items
pub use notification_models::{PushNotification, SendReceipt};
pub use notification_service::{FcmSender, NotificationSender};
