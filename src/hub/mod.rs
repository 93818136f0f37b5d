//! Connection hub: session bookkeeping, presence and typing tracking, and
//! fan-out of document and chat events.

pub mod actor;
pub mod connection_hub;
pub mod notifier;
pub mod presence;
pub mod session;
pub mod typing;

pub use actor::HubHandle;
pub use notifier::Outbox;
pub use session::ConnId;
