// Persistence for migration jobs
//
// A small key-value abstraction, an in-memory backend with expiry and a
// background purge, and the job-scoped state store the pipeline writes through.

pub mod job_state;
pub mod memory;
pub mod purge;
pub mod traits;

pub use job_state::JobStateStore;
pub use memory::MemoryStore;
pub use purge::spawn_purger;
pub use traits::{KeyValueStore, StoreResult};
