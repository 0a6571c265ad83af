// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Document store of record for full patient documents.

mod memory;
mod redis;
mod traits;

pub use memory::InMemoryDocumentStore;
pub use self::redis::RedisDocumentStore;
pub use traits::{DocumentStore, StorageError};
