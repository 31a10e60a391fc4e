//! Server-to-client output PDUs: the fast-path envelope, bitmap updates,
//! surface commands, pointer updates, and palette updates.

pub mod bitmap;
pub mod fast_path;
pub mod palette;
pub mod pointer;
pub mod surface_commands;
