//! Uclass: one capability category and its ordered member list.

use crate::device::DeviceId;
use crate::driver::UclassDriver;
use alloc::{boxed::Box, vec::Vec};
use core::fmt;

/// Identifier of a capability category. At most one [Uclass] instance
/// exists per id within a [crate::DeviceModel].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UclassId(pub u32);

impl UclassId {
    /// Reserved for the root device bound by [crate::DeviceModel::init].
    pub const ROOT: UclassId = UclassId(0);
}

/// Singleton instance of one capability category, created lazily on first
/// request. `devs` is the authoritative membership list and preserves bind
/// order.
pub struct Uclass {
    pub(crate) id: UclassId,
    pub(crate) driver: &'static dyn UclassDriver,
    pub(crate) priv_data: Box<[u8]>,
    pub(crate) devs: Vec<DeviceId>,
}

impl Uclass {
    pub(crate) fn new(id: UclassId, driver: &'static dyn UclassDriver) -> Uclass {
        Uclass {
            id,
            driver,
            priv_data: alloc::vec![0u8; driver.priv_size()].into_boxed_slice(),
            devs: Vec::new(),
        }
    }

    pub fn id(&self) -> UclassId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.driver.name()
    }

    pub fn driver(&self) -> &'static dyn UclassDriver {
        self.driver
    }

    /// Member devices in bind order.
    pub fn devices(&self) -> &[DeviceId] {
        &self.devs
    }

    pub fn priv_data(&self) -> &[u8] {
        &self.priv_data
    }

    pub fn priv_data_mut(&mut self) -> &mut [u8] {
        &mut self.priv_data
    }
}

impl fmt::Debug for Uclass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Uclass")
            .field("id", &self.id)
            .field("name", &self.name())
            .field("devs", &self.devs)
            .finish()
    }
}
