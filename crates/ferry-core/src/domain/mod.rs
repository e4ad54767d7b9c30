//! Domain model (IDs, tasks, outcomes, records, errors, events).

pub mod errors;
pub mod events;
pub mod ids;
pub mod outcome;
pub mod record;
pub mod state;
pub mod task;

pub use errors::{Backend, ErrorKind, FerryError, KEY_EXISTS, KEY_WRITE_RACE, ValidationError};
pub use events::SchedulerEvent;
pub use ids::{AttemptId, RecordId, TaskId};
pub use outcome::Outcome;
pub use record::{RecordPage, StoredObjectRecord, object_key};
pub use state::{RecordStatus, TaskState};
pub use task::{FileSource, TaskRecord, TaskSnapshot, UploadFile};
