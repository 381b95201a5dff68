//! Device: one bound instance of hardware.

use crate::driver::Driver;
use crate::uclass::UclassId;
use alloc::{boxed::Box, vec::Vec};
use bitflags::bitflags;
use core::fmt;
use dt::OfNode;

/// Copyable handle naming one device record inside a [crate::DeviceModel].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DeviceId(pub(crate) usize);

bitflags! {
    pub struct DeviceFlags: u32 {
        /// The device is a member of its uclass list.
        const BOUND = 0b0001;
        /// The device was probed and its hooks ran to completion.
        const ACTIVATED = 0b0010;
    }
}

/// Sentinel sequence number of a device that was never assigned one.
pub const SEQ_UNASSIGNED: i32 = -1;

/// One bound device. Uclass and driver are fixed at bind time; the private
/// blob belongs to the driver and only exists while the device is probed.
pub struct Device {
    pub(crate) id: DeviceId,
    pub(crate) name: Box<str>,
    pub(crate) driver: &'static dyn Driver,
    pub(crate) uclass_id: UclassId,
    pub(crate) parent: Option<DeviceId>,
    pub(crate) children: Vec<DeviceId>,
    pub(crate) seq: i32,
    pub(crate) of_node: OfNode,
    pub(crate) flags: DeviceFlags,
    pub(crate) priv_data: Box<[u8]>,
}

impl Device {
    pub fn id(&self) -> DeviceId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn driver(&self) -> &'static dyn Driver {
        self.driver
    }

    pub fn uclass_id(&self) -> UclassId {
        self.uclass_id
    }

    pub fn parent(&self) -> Option<DeviceId> {
        self.parent
    }

    /// Children in bind order.
    pub fn children(&self) -> &[DeviceId] {
        &self.children
    }

    /// Sequence number within the owning uclass, [SEQ_UNASSIGNED] until one
    /// is taken from an alias at bind or auto-assigned at probe.
    pub fn seq(&self) -> i32 {
        self.seq
    }

    pub fn of_node(&self) -> OfNode {
        self.of_node
    }

    pub fn flags(&self) -> DeviceFlags {
        self.flags
    }

    pub fn activated(&self) -> bool {
        self.flags.contains(DeviceFlags::ACTIVATED)
    }

    pub fn priv_data(&self) -> &[u8] {
        &self.priv_data
    }

    /// Driver-owned state; empty unless the device is probed and the driver
    /// declared a non-zero [Driver::priv_size].
    pub fn priv_data_mut(&mut self) -> &mut [u8] {
        &mut self.priv_data
    }
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("driver", &self.driver.name())
            .field("seq", &self.seq)
            .field("flags", &self.flags)
            .finish()
    }
}
