pub mod chat;
pub mod point;

pub use chat::{ChatMessage, ChatRole};
pub use point::{CollectionInfo, PointKey, ScoredPoint, StoredPoint, VectorPoint};
