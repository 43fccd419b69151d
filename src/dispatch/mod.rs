// ============================================================================
// Dispatch - typed request routing and local event fan-out
// ============================================================================
//
// Generic over request and notification types; nothing in here knows about
// orders or loans. New commands, queries and events are added by
// registering handlers and subscribers at startup.
//
// ============================================================================

mod dispatcher;
mod notification;
mod request;

pub use dispatcher::Dispatcher;
pub use notification::{Notification, NotificationBus, NotificationHandler, PublishReport};
pub use request::{Request, RequestHandler};
