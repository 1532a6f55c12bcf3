//! Signed webhook fan-out for TokenForge.
//!
//! Subscribers register an endpoint, the event types they care about and an
//! optional asset filter. Emitted events are delivered in the background with
//! an HMAC-SHA256 signature computed from the subscription's secret; every
//! attempt lands in the delivery log.

pub mod dispatcher;
pub mod error;
pub mod payload;
pub mod secret;
pub mod signing;
pub mod subscriptions;
pub mod transport;

pub use dispatcher::{DispatchTicket, WebhookDispatcher};
pub use error::TransportError;
pub use payload::WebhookPayload;
pub use signing::{sign_payload, verify_signature};
pub use transport::{HttpTransport, OutboundRequest, WebhookTransport};
