//! Task lifecycle.
//!
//! ```text
//! Pending ──inputs──▶ Uploaded ──run──▶ Processing ──▶ Completed | Failed
//!                                           │
//!                                        cancel
//!                                           ▼
//!                                      Cancelling ──▶ Cancelled
//! ```

mod store;
mod types;

pub use store::TaskStore;
pub use types::{TaskError, TaskId, TaskRecord, TaskResult, TaskSnapshot, TaskState};
