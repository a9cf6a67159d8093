pub mod firestore_client;
pub mod firestore_value;

pub use firestore_client::FirestoreClient;
pub use firestore_value::{Document, Value};
