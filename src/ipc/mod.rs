//! Unix socket transport between clients and the daemon.

pub mod client;
pub mod protocol;
pub mod server;

pub use protocol::{Request, Response};
pub use server::{IpcServer, RequestHandler};
