mod api;
mod logstore;
mod net;
mod replica;
mod server;
mod wire;

pub use api::try_create_node;
pub use api::NodeConfig;
pub use api::NodeCreationError;
pub use api::NodeHandle;
pub use api::NodeOptions;
pub use logstore::AppendOutcome;
pub use logstore::DiskLogStore;
pub use logstore::InMemoryLogStore;
pub use logstore::LogEntry;
pub use logstore::LogId;
pub use logstore::LogStore;
pub use logstore::Mutation;
pub use replica::CatchUpError;
pub use replica::CatchUpOutcome;
pub use replica::NodeInfo;
pub use replica::NodeRole;
pub use replica::NodeStatus;
pub use replica::ProposeError;
pub use replica::RaftRole;
pub use replica::ServiceConfig;
pub use replica::ServiceEntry;
pub use wire::read_message;
pub use wire::write_message;
pub use wire::Envelope;
pub use wire::Message;
pub use wire::MessageKind;
pub use wire::WireError;
