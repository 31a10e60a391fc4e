//! Futures wrapping the connection and session state machines: framed
//! transport I/O, the connection driver with its handshake deadline, and the
//! steady-state read/write loop.

#[macro_use]
extern crate tracing;

mod connector;
mod framed;
mod session;
mod stream;

pub use bytes;

pub use self::connector::*;
pub use self::framed::*;
pub use self::session::*;
pub use self::stream::*;
