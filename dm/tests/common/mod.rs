//! Shared fixtures: configurable test drivers that record hook activity.
//!
//! Probe-phase hooks stamp their call order into the device's private blob
//! (slot layout below), so ordering assertions need no shared statics.
//! Bind/remove-phase hooks run without a private blob and use counters.
#![allow(dead_code)]

use core::sync::atomic::{AtomicUsize, Ordering};
use dm::{Device, DeviceModel, DmError, Driver, DriverRegistry, Uclass, UclassDriver, UclassFlags, UclassId};
use dt::DeviceTree;

pub const UC_TEST: UclassId = UclassId(100);
pub const UC_BUS: UclassId = UclassId(101);

pub const SENTINEL: u8 = 0xA5;

pub const SLOT_CLOCK: usize = 0;
pub const SLOT_PRE_PROBE: usize = 1;
pub const SLOT_CHILD_PRE_PROBE: usize = 2;
pub const SLOT_PROBE: usize = 3;
pub const SLOT_CHILD_POST_PROBE: usize = 4;
pub const SLOT_POST_PROBE: usize = 5;
pub const SLOT_SENTINEL: usize = 6;
pub const PRIV_LEN: usize = 8;

fn stamp(dev: &mut Device, slot: usize) {
    let data = dev.priv_data_mut();
    if data.len() < PRIV_LEN {
        return;
    }
    data[SLOT_CLOCK] += 1;
    data[slot] = data[SLOT_CLOCK];
}

pub struct TestUclassDriver {
    pub id: UclassId,
    pub name: &'static str,
    pub flags: UclassFlags,
    pub veto_unbind: bool,
    pub fail_child_post_bind: bool,
    pub init_calls: AtomicUsize,
    pub destroy_calls: AtomicUsize,
    pub child_post_bind_calls: AtomicUsize,
    pub pre_remove_calls: AtomicUsize,
}

impl TestUclassDriver {
    pub fn new(id: UclassId, name: &'static str) -> TestUclassDriver {
        TestUclassDriver {
            id,
            name,
            flags: UclassFlags::empty(),
            veto_unbind: false,
            fail_child_post_bind: false,
            init_calls: AtomicUsize::new(0),
            destroy_calls: AtomicUsize::new(0),
            child_post_bind_calls: AtomicUsize::new(0),
            pre_remove_calls: AtomicUsize::new(0),
        }
    }

    pub fn leak(self) -> &'static TestUclassDriver {
        Box::leak(Box::new(self))
    }
}

impl UclassDriver for TestUclassDriver {
    fn id(&self) -> UclassId {
        self.id
    }

    fn name(&self) -> &'static str {
        self.name
    }

    fn flags(&self) -> UclassFlags {
        self.flags
    }

    fn init(&self, _uc: &mut Uclass) -> Result<(), DmError> {
        self.init_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn destroy(&self, _uc: &mut Uclass) -> Result<(), DmError> {
        self.destroy_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn pre_probe(&self, dev: &mut Device) -> Result<(), DmError> {
        stamp(dev, SLOT_PRE_PROBE);
        Ok(())
    }

    fn post_probe(&self, dev: &mut Device) -> Result<(), DmError> {
        stamp(dev, SLOT_POST_PROBE);
        let data = dev.priv_data_mut();
        if data.len() >= PRIV_LEN {
            data[SLOT_SENTINEL] = SENTINEL;
        }
        Ok(())
    }

    fn pre_remove(&self, _dev: &mut Device) -> Result<(), DmError> {
        self.pre_remove_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn pre_unbind(&self, _dev: &mut Device) -> Result<(), DmError> {
        if self.veto_unbind {
            return Err(DmError::Busy);
        }
        Ok(())
    }

    fn child_post_bind(&self, _dev: &mut Device) -> Result<(), DmError> {
        self.child_post_bind_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_child_post_bind {
            return Err(DmError::Driver("child_post_bind rejected"));
        }
        Ok(())
    }

    fn child_pre_probe(&self, dev: &mut Device) -> Result<(), DmError> {
        stamp(dev, SLOT_CHILD_PRE_PROBE);
        Ok(())
    }

    fn child_post_probe(&self, dev: &mut Device) -> Result<(), DmError> {
        stamp(dev, SLOT_CHILD_POST_PROBE);
        Ok(())
    }
}

pub struct TestDriver {
    pub name: &'static str,
    pub uclass: UclassId,
    pub compatible: &'static [&'static str],
    pub priv_size: usize,
    pub fail_bind: bool,
    pub fail_probe: bool,
    pub bind_calls: AtomicUsize,
    pub probe_calls: AtomicUsize,
    pub remove_calls: AtomicUsize,
    pub unbind_calls: AtomicUsize,
}

impl TestDriver {
    pub fn new(name: &'static str, uclass: UclassId) -> TestDriver {
        TestDriver {
            name,
            uclass,
            compatible: &[],
            priv_size: PRIV_LEN,
            fail_bind: false,
            fail_probe: false,
            bind_calls: AtomicUsize::new(0),
            probe_calls: AtomicUsize::new(0),
            remove_calls: AtomicUsize::new(0),
            unbind_calls: AtomicUsize::new(0),
        }
    }

    pub fn leak(self) -> &'static TestDriver {
        Box::leak(Box::new(self))
    }
}

impl Driver for TestDriver {
    fn name(&self) -> &'static str {
        self.name
    }

    fn uclass(&self) -> UclassId {
        self.uclass
    }

    fn compatible(&self) -> &'static [&'static str] {
        self.compatible
    }

    fn priv_size(&self) -> usize {
        self.priv_size
    }

    fn bind(&self, _dev: &mut Device) -> Result<(), DmError> {
        self.bind_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_bind {
            return Err(DmError::Driver("bind rejected"));
        }
        Ok(())
    }

    fn unbind(&self, _dev: &mut Device) -> Result<(), DmError> {
        self.unbind_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn probe(&self, dev: &mut Device) -> Result<(), DmError> {
        self.probe_calls.fetch_add(1, Ordering::SeqCst);
        stamp(dev, SLOT_PROBE);
        if self.fail_probe {
            return Err(DmError::Driver("probe rejected"));
        }
        Ok(())
    }

    fn remove(&self, _dev: &mut Device) -> Result<(), DmError> {
        self.remove_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub fn registry_with(
    ucs: &[&'static TestUclassDriver],
    drvs: &[&'static TestDriver],
) -> DriverRegistry {
    let mut registry = DriverRegistry::new();
    for uc in ucs {
        registry.register_uclass_driver(*uc);
    }
    for drv in drvs {
        registry.register_driver(*drv);
    }
    registry
}

/// An initialized model with the given descriptors registered.
pub fn model_with(
    ucs: &[&'static TestUclassDriver],
    drvs: &[&'static TestDriver],
) -> DeviceModel {
    let mut model = DeviceModel::new(registry_with(ucs, drvs));
    model.init().unwrap();
    model
}

pub fn model_with_tree(
    ucs: &[&'static TestUclassDriver],
    drvs: &[&'static TestDriver],
    tree: DeviceTree,
) -> DeviceModel {
    let mut model = DeviceModel::new_with_tree(registry_with(ucs, drvs), tree);
    model.init().unwrap();
    model
}
