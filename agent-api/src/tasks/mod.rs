//! Task lifecycle: records, the in-memory store, background execution, and
//! the manager the HTTP layer talks to.

mod executor;
mod manager;
mod record;
mod store;

pub use executor::TaskExecutor;
pub use manager::TaskLifecycleManager;
pub use record::{TaskId, TaskRecord};
pub use store::TaskStore;
