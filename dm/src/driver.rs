//! Driver descriptors and the registration table.
//!
//! Responsibilities:
//! - Provide the [Driver] and [UclassDriver] traits implemented by device
//!   drivers and capability-category descriptors. All hooks default to a
//!   no-op success, which is the "call only if present" contract: a driver
//!   overrides exactly the hooks it needs.
//! - Provide [DriverRegistry], the explicit table mapping uclass ids to
//!   uclass drivers and compatible strings to candidate drivers. The table
//!   is populated at startup and frozen before the first registry use;
//!   drivers are never unregistered.
//!
//! Ownership notes:
//! - Descriptor implementations are `&'static` and immutable; the registry
//!   stores references, never owns instances.
//! - **Drivers returned by [DriverRegistry::find_drivers] are `&'static`
//!   references and may be held across registry mutations.**

use crate::device::Device;
use crate::error::DmError;
use crate::uclass::{Uclass, UclassId};
use alloc::{collections::btree_map::BTreeMap, vec::Vec};
use bitflags::bitflags;
use log::{debug, warn};

bitflags! {
    /// Behavior flags declared by a [UclassDriver].
    pub struct UclassFlags: u32 {
        /// Sequence numbers for member devices are reserved by device-tree
        /// aliases named after the uclass (`serial0`, `serial1`, ...).
        const SEQ_ALIAS = 0b0001;
    }
}

/// Compile-time descriptor of one flavor of device.
///
/// Identifies the owning uclass, carries the compatible-string match table
/// used when binding from a device tree, and the device-level lifecycle
/// hooks. A successful [Driver::probe] must leave the device usable; the
/// registry handles ordering and idempotence around it.
pub trait Driver: Sync {
    fn name(&self) -> &'static str;
    fn uclass(&self) -> UclassId;

    /// Match table for device-tree binding. Empty when the driver is only
    /// bound explicitly.
    fn compatible(&self) -> &'static [&'static str] {
        &[]
    }

    /// Size of the zeroed per-device private blob allocated before probe.
    fn priv_size(&self) -> usize {
        0
    }

    fn bind(&self, _dev: &mut Device) -> Result<(), DmError> {
        Ok(())
    }

    fn unbind(&self, _dev: &mut Device) -> Result<(), DmError> {
        Ok(())
    }

    fn probe(&self, _dev: &mut Device) -> Result<(), DmError> {
        Ok(())
    }

    fn remove(&self, _dev: &mut Device) -> Result<(), DmError> {
        Ok(())
    }
}

/// Compile-time descriptor of one capability category.
///
/// Hook groups:
/// - `init`/`destroy` run at uclass creation and teardown.
/// - `pre_probe`/`post_probe`/`pre_remove`/`pre_unbind` wrap member-device
///   lifecycle transitions; `pre_unbind` may veto the unbind by returning
///   an error.
/// - `child_post_bind`/`child_pre_probe`/`child_post_probe` run for devices
///   whose *parent* belongs to this uclass.
pub trait UclassDriver: Sync {
    fn id(&self) -> UclassId;
    fn name(&self) -> &'static str;

    fn flags(&self) -> UclassFlags {
        UclassFlags::empty()
    }

    /// Size of the zeroed per-uclass private blob allocated at creation.
    fn priv_size(&self) -> usize {
        0
    }

    fn init(&self, _uc: &mut Uclass) -> Result<(), DmError> {
        Ok(())
    }

    fn destroy(&self, _uc: &mut Uclass) -> Result<(), DmError> {
        Ok(())
    }

    fn pre_probe(&self, _dev: &mut Device) -> Result<(), DmError> {
        Ok(())
    }

    fn post_probe(&self, _dev: &mut Device) -> Result<(), DmError> {
        Ok(())
    }

    fn pre_remove(&self, _dev: &mut Device) -> Result<(), DmError> {
        Ok(())
    }

    fn pre_unbind(&self, _dev: &mut Device) -> Result<(), DmError> {
        Ok(())
    }

    fn child_post_bind(&self, _dev: &mut Device) -> Result<(), DmError> {
        Ok(())
    }

    fn child_pre_probe(&self, _dev: &mut Device) -> Result<(), DmError> {
        Ok(())
    }

    fn child_post_probe(&self, _dev: &mut Device) -> Result<(), DmError> {
        Ok(())
    }
}

/// Registration table consulted by the model.
///
/// Holds the uclass-driver map keyed by uclass id, the flat driver list and
/// an index from compatible string to candidate drivers.
pub struct DriverRegistry {
    uclass_drivers: BTreeMap<UclassId, &'static dyn UclassDriver>,
    drivers: Vec<&'static dyn Driver>,
    comp_map: BTreeMap<&'static str, Vec<&'static dyn Driver>>,
}

impl DriverRegistry {
    pub const fn new() -> DriverRegistry {
        DriverRegistry {
            uclass_drivers: BTreeMap::new(),
            drivers: Vec::new(),
            comp_map: BTreeMap::new(),
        }
    }

    /// Register the descriptor for one uclass id. A duplicate id keeps the
    /// first registration.
    pub fn register_uclass_driver(&mut self, drv: &'static dyn UclassDriver) {
        if self.uclass_drivers.contains_key(&drv.id()) {
            warn!("uclass driver '{}' already registered, keeping first", drv.name());
            return;
        }
        debug!("registered uclass driver '{}'", drv.name());
        self.uclass_drivers.insert(drv.id(), drv);
    }

    /// Register a device driver and index it under each compatible string.
    pub fn register_driver(&mut self, drv: &'static dyn Driver) {
        debug!("registered driver '{}'", drv.name());
        self.drivers.push(drv);
        for comp in drv.compatible() {
            self.comp_map.entry(comp).or_default().push(drv);
        }
    }

    pub fn uclass_driver(&self, id: UclassId) -> Option<&'static dyn UclassDriver> {
        self.uclass_drivers.get(&id).copied()
    }

    pub fn driver_by_name(&self, name: &str) -> Option<&'static dyn Driver> {
        self.drivers.iter().copied().find(|drv| drv.name() == name)
    }

    /// Candidate drivers for `comp_str`, in registration order. Empty when
    /// nothing matches.
    pub fn find_drivers(&self, comp_str: &str) -> Vec<&'static dyn Driver> {
        self.comp_map.get(comp_str).cloned().unwrap_or_default()
    }
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Uc(UclassId);
    impl UclassDriver for Uc {
        fn id(&self) -> UclassId {
            self.0
        }
        fn name(&self) -> &'static str {
            "uc"
        }
    }

    struct Drv {
        name: &'static str,
        comp: &'static [&'static str],
    }
    impl Driver for Drv {
        fn name(&self) -> &'static str {
            self.name
        }
        fn uclass(&self) -> UclassId {
            UclassId(1)
        }
        fn compatible(&self) -> &'static [&'static str] {
            self.comp
        }
    }

    static UC_A: Uc = Uc(UclassId(1));
    static UC_B: Uc = Uc(UclassId(1));
    static DRV_A: Drv = Drv { name: "a", comp: &["vendor,chip-a"] };
    static DRV_B: Drv = Drv { name: "b", comp: &["vendor,chip-a", "vendor,chip-b"] };

    #[test]
    fn duplicate_uclass_driver_keeps_first() {
        let mut reg = DriverRegistry::new();
        reg.register_uclass_driver(&UC_A);
        reg.register_uclass_driver(&UC_B);
        let found = reg.uclass_driver(UclassId(1)).unwrap();
        assert!(core::ptr::addr_eq(
            found as *const dyn UclassDriver,
            &UC_A as *const Uc
        ));
    }

    #[test]
    fn compatible_index_keeps_registration_order() {
        let mut reg = DriverRegistry::new();
        reg.register_driver(&DRV_A);
        reg.register_driver(&DRV_B);
        let both = reg.find_drivers("vendor,chip-a");
        assert_eq!(both.len(), 2);
        assert_eq!(both[0].name(), "a");
        assert_eq!(reg.find_drivers("vendor,chip-b").len(), 1);
        assert!(reg.find_drivers("vendor,chip-c").is_empty());
    }

    #[test]
    fn driver_lookup_by_name() {
        let mut reg = DriverRegistry::new();
        reg.register_driver(&DRV_A);
        assert!(reg.driver_by_name("a").is_some());
        assert!(reg.driver_by_name("z").is_none());
    }
}
