//! Session gateway for the dynamo framework.
//!
//! Accepts TCP or WebSocket connections, frames the binary packet protocol,
//! negotiates the handshake (heartbeat interval + route dictionary) and
//! binds every session to a per-session agent actor. Decoded client
//! messages are routed by `route.service` to handler actors registered on
//! the gate; requests carry an ephemeral future as their reply target.
//!
//! ```ignore
//! let system = ActorSystem::new();
//! let gate = Gate::new(
//!     system,
//!     GateConfig::default().with_acceptor(AcceptorConfig::tcp("0.0.0.0:2250")),
//! )?;
//! gate.set_dictionary(HashMap::from([("room.join".to_string(), 1u16)]))?;
//! gate.register_service("room", Props::from_fn(room_handler))?;
//! gate.run().await?;
//! ```

pub mod acceptor;
mod agent;
pub mod config;
pub mod error;
mod gate;
pub mod session;

pub use acceptor::{ConnReader, ConnWriter, Connection};
pub use config::{AcceptorConfig, AcceptorKind, GateConfig, TlsConfig};
pub use error::GateError;
pub use gate::Gate;
pub use session::{RoutedMessage, Session, SessionBound, SessionClosed};
