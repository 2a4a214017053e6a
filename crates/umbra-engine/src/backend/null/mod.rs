//! Command-recording backend without a GPU.
//!
//! `NullDevice` validates resource descriptions like a real backend, hands out
//! identity-tracked handles and records every binding, clear and draw as a
//! [`Command`]. Tests inspect the log to check what a render phase issued.

mod device;

pub use device::{Command, DrawCall, NullDevice, NullEffect, NullTexture, NullVertexBuffer, NullView, ResourceId};
