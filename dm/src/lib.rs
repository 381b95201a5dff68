//! Driver model: a uclass/device registry with lazy probing.
//!
//! Responsibilities:
//! - Group bound devices into uclasses (one per capability category) and
//!   create each [Uclass] lazily on first request.
//! - Drive the device lifecycle (bind, probe, remove, unbind) with a fixed
//!   hook order across driver and uclass descriptors.
//! - Locate devices by index, name, sequence number or device-tree key, with
//!   a side-effect-free `find` family composed with a probing `get` family.
//!
//! Ownership and lifetime notes:
//! - [DriverRegistry] owns the frozen descriptor tables; [Driver] and
//!   [UclassDriver] implementations are `&'static` and never unregistered.
//! - [DeviceModel] is the single context object owning every uclass and
//!   device record; handles ([DeviceId], [UclassId]) are plain copyable ids.
//! - The model is single-threaded by design: all operations take `&mut self`
//!   and hook callbacks run synchronously before the next operation starts.
#![cfg_attr(not(test), no_std)]
extern crate alloc;

pub mod device;
pub mod driver;
pub mod error;
pub mod model;
pub mod uclass;

pub use device::{Device, DeviceFlags, DeviceId, SEQ_UNASSIGNED};
pub use driver::{Driver, DriverRegistry, UclassDriver, UclassFlags};
pub use error::DmError;
pub use model::DeviceModel;
pub use uclass::{Uclass, UclassId};
