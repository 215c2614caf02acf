//! Sync engines: outbox drain, incremental pull, the live change listener,
//! and the connectivity monitor that ties them together.

mod connectivity;
mod events;
mod listener;
mod merge;
mod outbox;
mod pull;
mod report;

pub use connectivity::{Connectivity, ConnectivityMonitor};
pub use events::{EventBus, SyncEvent};
pub use listener::{ChangeListener, ListenerState};
pub use merge::{apply_remote_record, Applied};
pub use outbox::OutboxEngine;
pub use pull::PullEngine;
pub use report::{PullReport, SyncFailure, SyncReport};
