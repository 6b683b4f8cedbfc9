//! Realtime Change Feed
//!
//! Client side of the managed service's realtime channel.
//!
//! ## Protocol
//!
//! 1. Connect to `/realtime/v1/websocket?apikey=..&vsn=1.0.0`
//! 2. `phx_join` on `realtime:<channel>` with a postgres-changes listener
//! 3. Wait for the `phx_reply` with status `ok`
//! 4. Forward `postgres_changes` frames; send `heartbeat` on `phoenix`
//! 5. `phx_leave` and close when the subscription is released

mod channel;
mod messages;

pub use channel::{RealtimeClient, RealtimeConfig};
pub use messages::{InboundMessage, PhoenixMessage};
