// Local subscribers reacting to committed domain events.

mod confirmation;

pub use confirmation::{Confirmation, ConfirmationOutbox};
