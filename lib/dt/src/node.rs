use crate::prop::Property;
use alloc::{boxed::Box, collections::btree_map::BTreeMap, vec::Vec};
use log::warn;

/// Opaque key naming one node of a [DeviceTree]. Negative offsets are
/// invalid; consumers must not interpret the offset beyond that.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OfNode {
    offset: i32,
}

impl OfNode {
    pub const fn invalid() -> OfNode {
        OfNode { offset: -1 }
    }

    pub const fn from_offset(offset: i32) -> OfNode {
        OfNode { offset }
    }

    pub const fn valid(self) -> bool {
        self.offset >= 0
    }

    pub const fn offset(self) -> i32 {
        self.offset
    }
}

pub struct Node {
    pub node_id: usize,
    pub parent_id: usize,
    pub name: Box<str>,
    pub children: Vec<usize>,
    pub props: Vec<Property>,
}

/// Tree container. Nodes live in `container` and refer to each other by
/// index; the root is element 0 and is its own parent.
pub struct DeviceTree {
    container: Vec<Node>,
    phandle_map: BTreeMap<u32, usize>,
    aliases: BTreeMap<Box<str>, usize>,
}

impl DeviceTree {
    pub fn new() -> DeviceTree {
        DeviceTree {
            container: alloc::vec![Node {
                node_id: 0,
                parent_id: 0,
                name: Box::from(""),
                children: Vec::new(),
                props: Vec::new(),
            }],
            phandle_map: BTreeMap::new(),
            aliases: BTreeMap::new(),
        }
    }

    pub const fn root(&self) -> OfNode {
        OfNode::from_offset(0)
    }

    fn get(&self, node: OfNode) -> Option<&Node> {
        if !node.valid() {
            return None;
        }
        self.container.get(node.offset() as usize)
    }

    /// Append a child node under `parent` and return its key.
    pub fn add_node(&mut self, parent: OfNode, name: &str) -> Option<OfNode> {
        let parent_id = self.get(parent)?.node_id;
        let node_id = self.container.len();
        self.container.push(Node {
            node_id,
            parent_id,
            name: Box::from(name),
            children: Vec::new(),
            props: Vec::new(),
        });
        self.container[parent_id].children.push(node_id);
        Some(OfNode::from_offset(node_id as i32))
    }

    pub fn add_prop(&mut self, node: OfNode, prop: Property) {
        if let Some(id) = self.get(node).map(|n| n.node_id) {
            self.container[id].props.push(prop);
        }
    }

    pub fn add_prop_u32(&mut self, node: OfNode, name: &str, value: u32) {
        self.add_prop(node, Property::from_u32(name, value));
    }

    pub fn add_prop_str(&mut self, node: OfNode, name: &str, value: &str) {
        self.add_prop(node, Property::from_str(name, value));
    }

    pub fn add_prop_strlist(&mut self, node: OfNode, name: &str, values: &[&str]) {
        self.add_prop(node, Property::from_strlist(name, values));
    }

    /// Record a phandle for `node`; also stores the `phandle` property so
    /// the tree stays self-describing.
    pub fn set_phandle(&mut self, node: OfNode, phandle: u32) {
        let Some(id) = self.get(node).map(|n| n.node_id) else {
            return;
        };
        if self.phandle_map.contains_key(&phandle) {
            warn!("duplicate phandle {phandle}, keeping earlier node");
            return;
        }
        self.phandle_map.insert(phandle, id);
        self.add_prop_u32(node, "phandle", phandle);
    }

    pub fn add_alias(&mut self, name: &str, node: OfNode) {
        let Some(id) = self.get(node).map(|n| n.node_id) else {
            return;
        };
        if self.aliases.contains_key(name) {
            warn!("duplicate alias '{name}', keeping earlier node");
            return;
        }
        self.aliases.insert(Box::from(name), id);
    }
}

impl DeviceTree {
    pub fn node(&self, node: OfNode) -> Option<&Node> {
        self.get(node)
    }

    /// Offset-based lookup; fails fast on a negative offset.
    pub fn node_by_offset(&self, offset: i32) -> Option<OfNode> {
        if offset < 0 {
            return None;
        }
        let node = OfNode::from_offset(offset);
        self.get(node).map(|_| node)
    }

    pub fn node_by_phandle(&self, phandle: u32) -> Option<OfNode> {
        self.phandle_map
            .get(&phandle)
            .map(|&id| OfNode::from_offset(id as i32))
    }

    pub fn name(&self, node: OfNode) -> Option<&str> {
        self.get(node).map(|n| n.name.as_ref())
    }

    pub fn parent(&self, node: OfNode) -> Option<OfNode> {
        let n = self.get(node)?;
        if n.node_id == n.parent_id {
            return None;
        }
        Some(OfNode::from_offset(n.parent_id as i32))
    }

    pub fn children(&self, node: OfNode) -> impl Iterator<Item = OfNode> + '_ {
        self.get(node)
            .into_iter()
            .flat_map(|n| n.children.iter().map(|&id| OfNode::from_offset(id as i32)))
    }

    pub fn get_property<'a>(&'a self, node: OfNode, name: &str) -> Option<&'a Property> {
        for prop in &self.get(node)?.props {
            if prop.name.as_ref() == name {
                return Some(prop);
            }
        }
        None
    }

    /// The node's `compatible` string list, empty when absent or malformed.
    pub fn compatible(&self, node: OfNode) -> Vec<&str> {
        self.get_property(node, "compatible")
            .and_then(|prop| prop.value_as_strlist().ok())
            .unwrap_or_default()
    }

    pub fn alias_node(&self, name: &str) -> Option<OfNode> {
        self.aliases
            .get(name)
            .map(|&id| OfNode::from_offset(id as i32))
    }

    /// Alias index of `node` under `stem`: an alias `serial2` pointing at
    /// `node` yields 2 for stem `serial`.
    pub fn alias_seq(&self, stem: &str, node: OfNode) -> Option<u32> {
        let id = self.get(node)?.node_id;
        for (name, &target) in &self.aliases {
            if target != id {
                continue;
            }
            if let Some(index) = Self::alias_index(name, stem) {
                return Some(index);
            }
        }
        None
    }

    /// Highest alias index declared for `stem`, regardless of whether the
    /// aliased nodes have bound devices.
    pub fn alias_highest_id(&self, stem: &str) -> Option<u32> {
        self.aliases
            .keys()
            .filter_map(|name| Self::alias_index(name, stem))
            .max()
    }

    fn alias_index(name: &str, stem: &str) -> Option<u32> {
        let suffix = name.strip_prefix(stem)?;
        if suffix.is_empty() {
            return None;
        }
        suffix.parse().ok()
    }
}

impl Default for DeviceTree {
    fn default() -> Self {
        Self::new()
    }
}
