mod event;
mod group;
mod project;

// Events
pub use event::EventPayload;
pub use event::StoredEvent;

// Groups
pub use group::Group;

// Projects
pub use project::ProjectId;
