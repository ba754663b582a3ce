//! Infrastructure traits and their Redis/in-memory implementations: queues,
//! completion records, and replica load counters.

pub mod completion_store;
pub mod load_account;
pub mod queue;

pub use completion_store::{CompletionRecord, CompletionStore, InMemoryCompletionStore, RedisCompletionStore};
pub use load_account::{InMemoryLoadAccount, LoadAccount, RedisLoadAccount};
pub use queue::{InMemoryQueue, QueueBroker, RedisQueueBroker};

/// Queue names, shared by every binary so nobody hand-types a literal twice.
pub const Q_ENC: &str = "job:encoder_in";
pub const Q_RET: &str = "job:retriever_in";
pub const Q_LLM: &str = "job:llm_in";
