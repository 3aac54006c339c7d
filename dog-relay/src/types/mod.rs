pub mod ids;
pub mod record;
pub mod destination;
pub mod events;

pub use ids::{JobId, OwnerId, RetryId};
pub use record::{JobRecord, JobStatus, NewJob};
pub use destination::Destination;
pub use events::JobEvent;
