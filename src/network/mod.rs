//! Network layer: wire protocol, admin auth, the session coordinator,
//! and the WebSocket server.

pub mod auth;
pub mod coordinator;
pub mod protocol;
pub mod server;

pub use auth::{AdminAuth, AuthError};
pub use coordinator::{ClientHandle, ConnId, Coordinator, CoordinatorEvent};
pub use protocol::{ClientMessage, RejectReason, ServerMessage};
pub use server::{QuizServer, ServerConfig, ServerError};
