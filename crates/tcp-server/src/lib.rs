//! TCP 传输层。
//!
//! 监听与连接分发、单连接协议状态机、客户端注册表与事件扇出，
//! 以及线上协议的信封编解码。

pub mod acceptor;
pub mod connection;
pub mod events;
pub mod protocol;
pub mod registry;

pub use acceptor::{ChatServer, ServerDependencies};
pub use connection::ConnectionHandler;
pub use registry::ClientRegistry;
