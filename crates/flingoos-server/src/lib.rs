pub mod assets;
pub mod bridge;
pub mod client;
pub mod handlers;
pub mod proxy;
pub mod rpc;
pub mod server;
pub mod session;

pub use server::{start, ServerConfig, ServerHandle};
pub use session::{
    HttpSessionBackend, PipelinePacing, SessionBackend, SessionCoordinator, SessionError,
    StatusSnapshot,
};
