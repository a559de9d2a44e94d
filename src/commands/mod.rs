// ABOUTME: Command module aggregator for the switchyard CLI.
// ABOUTME: Re-exports the deploy, recover, rollback, switch and status handlers.

mod connection;
mod deploy;
mod recover;
mod rollback;
mod status;
mod switch;
mod watch;

pub use deploy::deploy;
pub use recover::recover;
pub use rollback::rollback;
pub use status::status;
pub use switch::switch;
