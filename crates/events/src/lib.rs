//! Domain events of the control panel and the bus that carries them.

pub mod bus;
pub mod event;
pub mod in_memory_bus;
pub mod role;

pub use bus::{EventBus, Subscription};
pub use event::Event;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
pub use role::{RoleEvent, RoleEventSink, RolePermissionsModified};
