//! The device model context: uclass registry, lookup and lifecycle.
//!
//! A [DeviceModel] owns the frozen [DriverRegistry], an optional
//! [dt::DeviceTree] and every uclass/device record. It is the single source
//! of truth for "is this device alive": a device exists exactly while its id
//! is present in the model, and its uclass member list preserves bind order.
//!
//! Operations come in two families. The `uclass_find_*` family is
//! side-effect free and reports "no match" as a routine [None]. The
//! `uclass_get_*` family composes a find with the probing tail, so callers
//! that only need existence checks never pay for a probe.

use crate::device::{Device, DeviceFlags, DeviceId, SEQ_UNASSIGNED};
use crate::driver::{Driver, DriverRegistry, UclassDriver, UclassFlags};
use crate::error::DmError;
use crate::uclass::{Uclass, UclassId};
use alloc::{boxed::Box, collections::btree_map::BTreeMap, vec::Vec};
use dt::{DeviceTree, OfNode};
use log::{debug, warn};

struct RootDriver;

impl Driver for RootDriver {
    fn name(&self) -> &'static str {
        "root_driver"
    }

    fn uclass(&self) -> UclassId {
        UclassId::ROOT
    }
}

struct RootUclassDriver;

impl UclassDriver for RootUclassDriver {
    fn id(&self) -> UclassId {
        UclassId::ROOT
    }

    fn name(&self) -> &'static str {
        "root"
    }
}

static ROOT_DRIVER: RootDriver = RootDriver;
static ROOT_UCLASS_DRIVER: RootUclassDriver = RootUclassDriver;

pub struct DeviceModel {
    registry: DriverRegistry,
    tree: Option<DeviceTree>,
    uclasses: BTreeMap<UclassId, Uclass>,
    devices: BTreeMap<DeviceId, Device>,
    next_dev_id: usize,
    initialized: bool,
    root: Option<DeviceId>,
}

impl DeviceModel {
    /// A model with no device tree; devices can only be bound explicitly.
    pub fn new(registry: DriverRegistry) -> DeviceModel {
        DeviceModel {
            registry,
            tree: None,
            uclasses: BTreeMap::new(),
            devices: BTreeMap::new(),
            next_dev_id: 0,
            initialized: false,
            root: None,
        }
    }

    pub fn new_with_tree(registry: DriverRegistry, tree: DeviceTree) -> DeviceModel {
        let mut model = DeviceModel::new(registry);
        model.tree = Some(tree);
        model
    }

    /// Set up the model and bind the root device. Idempotent; until this
    /// ran, [DeviceModel::uclass_get] reports [DmError::Uninitialized].
    pub fn init(&mut self) -> Result<DeviceId, DmError> {
        if let Some(root) = self.root {
            return Ok(root);
        }
        self.registry.register_uclass_driver(&ROOT_UCLASS_DRIVER);
        self.registry.register_driver(&ROOT_DRIVER);
        self.initialized = true;
        let node = match &self.tree {
            Some(tree) => tree.root(),
            None => OfNode::invalid(),
        };
        let root = self.bind_device(None, &ROOT_DRIVER, "root", node)?;
        self.root = Some(root);
        Ok(root)
    }

    pub fn root(&self) -> Option<DeviceId> {
        self.root
    }

    pub fn registry(&self) -> &DriverRegistry {
        &self.registry
    }

    pub fn tree(&self) -> Option<&DeviceTree> {
        self.tree.as_ref()
    }

    pub fn device(&self, dev: DeviceId) -> Option<&Device> {
        self.devices.get(&dev)
    }

    pub fn device_mut(&mut self, dev: DeviceId) -> Option<&mut Device> {
        self.devices.get_mut(&dev)
    }

    pub fn uclass_count(&self) -> usize {
        self.uclasses.len()
    }

    pub fn uclasses(&self) -> impl Iterator<Item = &Uclass> {
        self.uclasses.values()
    }
}

// Uclass registry: lazy creation and teardown.
impl DeviceModel {
    /// Silent lookup; never allocates. Also reports [None] before
    /// [DeviceModel::init], which is a valid early-boot state.
    pub fn uclass_find(&self, id: UclassId) -> Option<&Uclass> {
        self.uclasses.get(&id)
    }

    /// Find-or-create. A missing uclass driver registration is a build bug
    /// and surfaces as the loud [DmError::MissingUclassDriver].
    pub fn uclass_get(&mut self, id: UclassId) -> Result<&Uclass, DmError> {
        if !self.initialized {
            return Err(DmError::Uninitialized);
        }
        if !self.uclasses.contains_key(&id) {
            let Some(uc_drv) = self.registry.uclass_driver(id) else {
                warn!("no uclass driver registered for uclass id {}", id.0);
                return Err(DmError::MissingUclassDriver);
            };
            let mut uc = Uclass::new(id, uc_drv);
            uc_drv.init(&mut uc)?;
            self.uclasses.insert(id, uc);
            debug!("created uclass '{}'", uc_drv.name());
        }
        self.uclasses.get(&id).ok_or(DmError::NotFound)
    }

    /// Remove and unbind every member device, then drop the uclass. Aborts
    /// on the first error, leaving the remaining devices bound.
    pub fn uclass_destroy(&mut self, id: UclassId) -> Result<(), DmError> {
        if !self.uclasses.contains_key(&id) {
            return Err(DmError::NotFound);
        }
        // Always re-read the list head: unbinding a device may drop its
        // children from the same list.
        loop {
            let head = self.uclasses.get(&id).and_then(|uc| uc.devs.first().copied());
            let Some(dev) = head else { break };
            self.device_remove(dev)?;
            self.device_unbind(dev)?;
        }
        let uc_drv = self.uclasses.get(&id).ok_or(DmError::NotFound)?.driver;
        {
            let uc = self.uclasses.get_mut(&id).ok_or(DmError::NotFound)?;
            uc_drv.destroy(uc)?;
        }
        self.uclasses.remove(&id);
        debug!("destroyed uclass '{}'", uc_drv.name());
        Ok(())
    }
}

// Device lookup and iteration. All read-only and non-probing; "no match"
// is a routine None.
impl DeviceModel {
    pub fn uclass_find_device(&self, id: UclassId, index: usize) -> Option<DeviceId> {
        self.uclass_find(id)?.devs.get(index).copied()
    }

    pub fn uclass_find_first_device(&self, id: UclassId) -> Option<DeviceId> {
        self.uclass_find_device(id, 0)
    }

    /// Forward iteration; the caller keeps the previous id as cursor state.
    /// [None] when the cursor was the list tail.
    pub fn uclass_find_next_device(&self, cursor: DeviceId) -> Option<DeviceId> {
        let uclass_id = self.devices.get(&cursor)?.uclass_id;
        let devs = &self.uclass_find(uclass_id)?.devs;
        let pos = devs.iter().position(|&d| d == cursor)?;
        devs.get(pos + 1).copied()
    }

    pub fn uclass_find_device_by_name(&self, id: UclassId, name: &str) -> Option<DeviceId> {
        self.uclass_find_device_by_namelen(id, name, name.len())
    }

    /// Exact-name match: the stored name must equal `name` and its length
    /// must equal `len`, so a truncated search key never matches a device
    /// whose name merely shares the prefix.
    pub fn uclass_find_device_by_namelen(
        &self,
        id: UclassId,
        name: &str,
        len: usize,
    ) -> Option<DeviceId> {
        self.uclass_find(id)?.devs.iter().copied().find(|dev| {
            let stored = &self.devices[dev].name;
            stored.len() == len && stored.as_ref() == name
        })
    }

    /// Sequence lookup; the unassigned sentinel never matches anything.
    pub fn uclass_find_device_by_seq(&self, id: UclassId, seq: i32) -> Option<DeviceId> {
        if seq == SEQ_UNASSIGNED {
            return None;
        }
        self.uclass_find(id)?
            .devs
            .iter()
            .copied()
            .find(|dev| self.devices[dev].seq == seq)
    }

    /// Offset lookup; fails fast on a negative offset.
    pub fn uclass_find_device_by_of_offset(&self, id: UclassId, offset: i32) -> Option<DeviceId> {
        if offset < 0 {
            return None;
        }
        self.uclass_find_device_by_ofnode(id, OfNode::from_offset(offset))
    }

    pub fn uclass_find_device_by_ofnode(&self, id: UclassId, node: OfNode) -> Option<DeviceId> {
        if !node.valid() {
            return None;
        }
        self.uclass_find(id)?
            .devs
            .iter()
            .copied()
            .find(|dev| self.devices[dev].of_node == node)
    }

    pub fn uclass_find_device_by_phandle(&self, id: UclassId, phandle: u32) -> Option<DeviceId> {
        let node = self.tree.as_ref()?.node_by_phandle(phandle)?;
        self.uclass_find_device_by_ofnode(id, node)
    }

    /// Lowest sequence number that collides neither with already-bound
    /// devices nor, for alias-sequenced uclasses, with any declared alias
    /// slot. Strictly one past the current maximum; gaps are not reused.
    pub fn uclass_next_free_seq(&self, id: UclassId) -> Result<i32, DmError> {
        let uc = self.uclass_find(id).ok_or(DmError::NotFound)?;
        let mut max = SEQ_UNASSIGNED;
        if uc.driver.flags().contains(UclassFlags::SEQ_ALIAS) {
            if let Some(tree) = &self.tree {
                if let Some(highest) = tree.alias_highest_id(uc.driver.name()) {
                    max = highest as i32;
                }
            }
        }
        for dev in &uc.devs {
            let seq = self.devices[dev].seq;
            if seq > max {
                max = seq;
            }
        }
        Ok(max + 1)
    }
}

// Getter family: find composed with the probing tail.
impl DeviceModel {
    fn uclass_get_device_tail(&mut self, found: Option<DeviceId>) -> Result<DeviceId, DmError> {
        let dev = found.ok_or(DmError::NotFound)?;
        self.device_probe(dev)?;
        Ok(dev)
    }

    pub fn uclass_get_device(&mut self, id: UclassId, index: usize) -> Result<DeviceId, DmError> {
        let found = self.uclass_find_device(id, index);
        self.uclass_get_device_tail(found)
    }

    pub fn uclass_get_device_by_name(
        &mut self,
        id: UclassId,
        name: &str,
    ) -> Result<DeviceId, DmError> {
        let found = self.uclass_find_device_by_name(id, name);
        self.uclass_get_device_tail(found)
    }

    pub fn uclass_get_device_by_seq(&mut self, id: UclassId, seq: i32) -> Result<DeviceId, DmError> {
        let found = self.uclass_find_device_by_seq(id, seq);
        self.uclass_get_device_tail(found)
    }

    pub fn uclass_get_device_by_ofnode(
        &mut self,
        id: UclassId,
        node: OfNode,
    ) -> Result<DeviceId, DmError> {
        let found = self.uclass_find_device_by_ofnode(id, node);
        self.uclass_get_device_tail(found)
    }

    pub fn uclass_get_device_by_phandle(
        &mut self,
        id: UclassId,
        phandle: u32,
    ) -> Result<DeviceId, DmError> {
        let found = self.uclass_find_device_by_phandle(id, phandle);
        self.uclass_get_device_tail(found)
    }

    /// Driver-identity lookup. Only exists in probing form.
    pub fn uclass_get_device_by_driver(
        &mut self,
        id: UclassId,
        drv: &'static dyn Driver,
    ) -> Result<DeviceId, DmError> {
        let found = self.uclass_find(id).and_then(|uc| {
            uc.devs.iter().copied().find(|dev| {
                core::ptr::addr_eq(
                    self.devices[dev].driver as *const dyn Driver,
                    drv as *const dyn Driver,
                )
            })
        });
        self.uclass_get_device_tail(found)
    }

    /// First member, probed. [None] when the uclass has no members.
    pub fn uclass_first_device(&mut self, id: UclassId) -> Result<Option<DeviceId>, DmError> {
        match self.uclass_find_first_device(id) {
            Some(dev) => {
                self.device_probe(dev)?;
                Ok(Some(dev))
            }
            None => Ok(None),
        }
    }

    /// Next member after `cursor`, probed. [None] at the tail.
    pub fn uclass_next_device(&mut self, cursor: DeviceId) -> Result<Option<DeviceId>, DmError> {
        match self.uclass_find_next_device(cursor) {
            Some(dev) => {
                self.device_probe(dev)?;
                Ok(Some(dev))
            }
            None => Ok(None),
        }
    }
}

// Device lifecycle: bind, probe, remove, unbind.
impl DeviceModel {
    /// Bind a device under `parent`. The device becomes visible to uclass
    /// iteration once this returns Ok.
    pub fn device_bind(
        &mut self,
        parent: DeviceId,
        drv: &'static dyn Driver,
        name: &str,
        node: OfNode,
    ) -> Result<DeviceId, DmError> {
        if !self.devices.contains_key(&parent) {
            return Err(DmError::NotFound);
        }
        self.bind_device(Some(parent), drv, name, node)
    }

    /// Like [DeviceModel::device_bind], resolving the driver by name.
    pub fn device_bind_by_name(
        &mut self,
        parent: DeviceId,
        driver_name: &str,
        name: &str,
        node: OfNode,
    ) -> Result<DeviceId, DmError> {
        let drv = self
            .registry
            .driver_by_name(driver_name)
            .ok_or(DmError::NotFound)?;
        self.device_bind(parent, drv, name, node)
    }

    fn bind_device(
        &mut self,
        parent: Option<DeviceId>,
        drv: &'static dyn Driver,
        name: &str,
        node: OfNode,
    ) -> Result<DeviceId, DmError> {
        let uclass_id = drv.uclass();
        let uc_drv = self.uclass_get(uclass_id)?.driver();

        // An alias slot reserves the sequence number at bind time; everyone
        // else keeps the sentinel until first probe.
        let mut seq = SEQ_UNASSIGNED;
        if uc_drv.flags().contains(UclassFlags::SEQ_ALIAS) && node.valid() {
            if let Some(tree) = &self.tree {
                if let Some(index) = tree.alias_seq(uc_drv.name(), node) {
                    seq = index as i32;
                }
            }
        }

        let id = DeviceId(self.next_dev_id);
        self.next_dev_id += 1;
        self.devices.insert(
            id,
            Device {
                id,
                name: Box::from(name),
                driver: drv,
                uclass_id,
                parent,
                children: Vec::new(),
                seq,
                of_node: node,
                flags: DeviceFlags::BOUND,
                priv_data: Box::default(),
            },
        );
        if let Some(uc) = self.uclasses.get_mut(&uclass_id) {
            uc.devs.push(id);
        }
        if let Some(p) = parent {
            if let Some(pd) = self.devices.get_mut(&p) {
                pd.children.push(id);
            }
        }

        let res = drv.bind(self.devices.get_mut(&id).ok_or(DmError::NotFound)?);
        if let Err(err) = res {
            self.detach_device(id);
            return Err(err);
        }
        if let Some(p) = parent {
            let parent_uc_drv = self.uclass_driver_of(p)?;
            let res = parent_uc_drv.child_post_bind(self.devices.get_mut(&id).ok_or(DmError::NotFound)?);
            if let Err(err) = res {
                // The hook is trusted to clean up its own side effects; we
                // only undo the insertion.
                self.detach_device(id);
                return Err(err);
            }
        }
        debug!("bound device '{}' to uclass '{}'", name, uc_drv.name());
        Ok(id)
    }

    /// Probe a bound device. Idempotent: probing an already-activated
    /// device is a no-op success and fires no hooks. The parent is probed
    /// first. On failure no completed hook stage is re-wound, but the
    /// device stays deactivated and its private blob is freed so a retry
    /// starts clean.
    pub fn device_probe(&mut self, dev: DeviceId) -> Result<(), DmError> {
        let (activated, parent, drv, uclass_id) = {
            let d = self.devices.get(&dev).ok_or(DmError::NotFound)?;
            (d.activated(), d.parent, d.driver, d.uclass_id)
        };
        if activated {
            return Ok(());
        }
        if let Some(p) = parent {
            self.device_probe(p)?;
        }
        if self.devices.get(&dev).ok_or(DmError::NotFound)?.seq == SEQ_UNASSIGNED {
            let next = self.uclass_next_free_seq(uclass_id)?;
            if let Some(d) = self.devices.get_mut(&dev) {
                d.seq = next;
            }
        }
        let priv_size = drv.priv_size();
        if priv_size > 0 {
            if let Some(d) = self.devices.get_mut(&dev) {
                d.priv_data = alloc::vec![0u8; priv_size].into_boxed_slice();
            }
        }
        let uc_drv = self.uclasses.get(&uclass_id).ok_or(DmError::NotFound)?.driver;
        let parent_uc_drv = match parent {
            Some(p) => Some(self.uclass_driver_of(p)?),
            None => None,
        };
        match self.run_probe_hooks(dev, drv, uc_drv, parent_uc_drv) {
            Ok(()) => {
                let d = self.devices.get_mut(&dev).ok_or(DmError::NotFound)?;
                d.flags.insert(DeviceFlags::ACTIVATED);
                debug!("probed device '{}'", d.name);
                Ok(())
            }
            Err(err) => {
                if let Some(d) = self.devices.get_mut(&dev) {
                    d.priv_data = Box::default();
                }
                Err(err)
            }
        }
    }

    fn run_probe_hooks(
        &mut self,
        dev: DeviceId,
        drv: &'static dyn Driver,
        uc_drv: &'static dyn UclassDriver,
        parent_uc_drv: Option<&'static dyn UclassDriver>,
    ) -> Result<(), DmError> {
        let d = self.devices.get_mut(&dev).ok_or(DmError::NotFound)?;
        uc_drv.pre_probe(d)?;
        if let Some(pud) = parent_uc_drv {
            pud.child_pre_probe(d)?;
        }
        drv.probe(d)?;
        if let Some(pud) = parent_uc_drv {
            pud.child_post_probe(d)?;
        }
        uc_drv.post_probe(d)?;
        Ok(())
    }

    /// Deactivate a probed device, children first. No-op on devices that
    /// were never probed.
    pub fn device_remove(&mut self, dev: DeviceId) -> Result<(), DmError> {
        let (activated, drv, uclass_id, children) = {
            let d = self.devices.get(&dev).ok_or(DmError::NotFound)?;
            (d.activated(), d.driver, d.uclass_id, d.children.clone())
        };
        if !activated {
            return Ok(());
        }
        for child in children {
            self.device_remove(child)?;
        }
        let uc_drv = self.uclasses.get(&uclass_id).ok_or(DmError::NotFound)?.driver;
        {
            let d = self.devices.get_mut(&dev).ok_or(DmError::NotFound)?;
            uc_drv.pre_remove(d)?;
            drv.remove(d)?;
            d.priv_data = Box::default();
            d.flags.remove(DeviceFlags::ACTIVATED);
        }
        debug!("removed device '{}'", self.devices[&dev].name);
        Ok(())
    }

    /// Drop a bound, non-probed device from the model, children first. The
    /// uclass `pre_unbind` hook runs before anything is detached and may
    /// veto the unbind, in which case the device stays fully bound.
    pub fn device_unbind(&mut self, dev: DeviceId) -> Result<(), DmError> {
        let (activated, drv, uclass_id) = {
            let d = self.devices.get(&dev).ok_or(DmError::NotFound)?;
            (d.activated(), d.driver, d.uclass_id)
        };
        if activated {
            return Err(DmError::Busy);
        }
        let uc_drv = self.uclasses.get(&uclass_id).ok_or(DmError::NotFound)?.driver;
        {
            let d = self.devices.get_mut(&dev).ok_or(DmError::NotFound)?;
            uc_drv.pre_unbind(d)?;
        }
        let children = self.devices.get(&dev).ok_or(DmError::NotFound)?.children.clone();
        for child in children {
            self.device_unbind(child)?;
        }
        {
            let d = self.devices.get_mut(&dev).ok_or(DmError::NotFound)?;
            drv.unbind(d)?;
        }
        self.detach_device(dev);
        Ok(())
    }

    fn detach_device(&mut self, dev: DeviceId) {
        let Some(d) = self.devices.remove(&dev) else {
            return;
        };
        if let Some(uc) = self.uclasses.get_mut(&d.uclass_id) {
            uc.devs.retain(|&m| m != dev);
        }
        if let Some(p) = d.parent {
            if let Some(pd) = self.devices.get_mut(&p) {
                pd.children.retain(|&c| c != dev);
            }
        }
    }

    fn uclass_driver_of(&self, dev: DeviceId) -> Result<&'static dyn UclassDriver, DmError> {
        let uclass_id = self.devices.get(&dev).ok_or(DmError::NotFound)?.uclass_id;
        Ok(self.uclasses.get(&uclass_id).ok_or(DmError::NotFound)?.driver)
    }
}

// Device-tree scanning: bind devices for nodes with matching drivers.
impl DeviceModel {
    /// Walk the device tree and bind a device for every node whose
    /// `compatible` list matches a registered driver. Nodes without a match
    /// are recursed into with the nearest bound ancestor as parent; a
    /// failing bind is logged and skipped so one bad node never stops the
    /// scan.
    pub fn scan_tree(&mut self) -> Result<(), DmError> {
        let root_dev = self.root.ok_or(DmError::Uninitialized)?;
        let Some(tree) = &self.tree else {
            return Ok(());
        };
        let top: Vec<OfNode> = tree.children(tree.root()).collect();
        for node in top {
            self.bind_node(root_dev, node)?;
        }
        Ok(())
    }

    fn bind_node(&mut self, parent: DeviceId, node: OfNode) -> Result<(), DmError> {
        let (name, drv, children) = {
            let tree = self.tree.as_ref().ok_or(DmError::NotFound)?;
            let name: Box<str> = Box::from(tree.name(node).unwrap_or(""));
            let mut drv = None;
            for comp in tree.compatible(node) {
                if let Some(&first) = self.registry.find_drivers(comp).first() {
                    drv = Some(first);
                    break;
                }
            }
            let children: Vec<OfNode> = tree.children(node).collect();
            (name, drv, children)
        };
        let next_parent = match drv {
            Some(drv) => match self.device_bind(parent, drv, &name, node) {
                Ok(dev) => dev,
                Err(err) => {
                    warn!("binding node '{}' failed: {}", name, err);
                    parent
                }
            },
            None => parent,
        };
        for child in children {
            self.bind_node(next_parent, child)?;
        }
        Ok(())
    }
}
