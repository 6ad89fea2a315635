pub mod events;

pub use events::{wait_for_finish, EventBus, LoggingEventHandler, MigrationEvent, MigrationEventHandler};
