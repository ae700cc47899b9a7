//! Application layer: inbound dispatch, loan lifecycle, deferred and operator-triggered
//! notifications, and the wiring that assembles them.

pub mod delivery;
pub mod dispatcher;
pub mod events;
pub mod gateway;
pub mod handlers;
pub mod ids;
pub mod inbound;
pub mod lifecycle;
pub mod notifications;
pub mod operator;
pub mod scheduler;

pub use dispatcher::Dispatcher;
pub use gateway::{Adapters, Gateway, Stores};
