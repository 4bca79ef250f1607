mod server;
mod shutdown;

pub use server::ReplServer;
pub use shutdown::shutdown_signal;
pub use shutdown::ShutdownHandle;
pub use shutdown::ShutdownSignal;
