mod frame;
mod message;

pub use frame::exchange;
pub use frame::read_message;
pub use frame::write_message;
pub use frame::WireError;
pub use frame::MAX_FRAME_LEN;
pub use message::Envelope;
pub use message::Message;
pub use message::MessageKind;
