#![forbid(unsafe_code)]

pub mod repository;
pub mod sqlite;

pub use repository::{
    CacheKey, InMemoryRepository, LessonCache, ProgressCache, Storage, StorageError,
};
