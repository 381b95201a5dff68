//! In-memory device tree used by the driver model as an opaque lookup-key
//! store. Nodes are addressed by [node::OfNode] keys (offset, phandle or
//! alias); property payloads keep the FDT big-endian encoding.
#![cfg_attr(not(test), no_std)]
extern crate alloc;

pub mod node;
pub mod prop;

pub use node::{DeviceTree, Node, OfNode};
pub use prop::{Property, PropertyError};
