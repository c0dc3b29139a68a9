//! Response dispatch: events, the handler interface, and the dispatcher
//! that produces events from a transport response.

pub mod dispatcher;
pub mod event;
pub mod handler;

pub use dispatcher::ResponseDispatcher;
pub use event::ResponseEvent;
pub use handler::ResponseHandler;
