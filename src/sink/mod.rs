//! Broadcast sink: client registry, admission, fan-out and lifecycle

pub mod acceptor;
pub mod fanout;
pub mod registry;
pub mod stream;

pub use fanout::FanOutReport;
pub use registry::{Client, ClientRegistry};
pub use stream::{AudioSink, DropReason, SinkStats, SocketSink, WriteOutcome};
