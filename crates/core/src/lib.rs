pub mod clock;
pub mod contact;
pub mod error;
pub mod identify;
pub mod ids;

pub use clock::{ContactClock, Timestamp};
pub use contact::{ContactRecord, LinkPrecedence, NewContact};
pub use error::CoreError;
pub use identify::{IdentifyRequest, IdentityView};
pub use ids::ContactId;
