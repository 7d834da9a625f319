//! In-memory host for tests.
//!
//! [`MemoryHost`] keeps a node tree in a slab, logs every successful
//! primitive call, dispatches events to attached listeners, serializes
//! subtrees to markup and can be told to fail a future call.
//!
//! ```ignore
//! let mut host = MemoryHost::new();
//! let container = host.create_container();
//! let mut reconciler = Reconciler::new(host);
//! reconciler.render(view(), container);
//! reconciler.flush()?;
//! assert_eq!(reconciler.host().markup(container), "<h1>hi</h1>");
//! ```

use std::fmt::Write as _;

use indexmap::IndexMap;
use slab::Slab;

use crate::element::{Event, EventHandler, PropValue, TEXT_VALUE};
use crate::error::HostError;
use crate::hash::PropsHasher;
use crate::host::Host;

/// Handle to a node of a [`MemoryHost`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct NodeHandle(usize);

/// A logged primitive call.
#[derive(Clone, Debug, PartialEq)]
pub enum HostOp {
    /// `create_node`
    Create {
        /// Tag name, empty for text nodes.
        kind: String,
        /// Whether a text node was created.
        is_text: bool,
    },
    /// `set_property`
    SetProperty {
        /// Target node.
        node: NodeHandle,
        /// Property name.
        name: String,
        /// New value.
        value: PropValue,
    },
    /// `remove_property`
    RemoveProperty {
        /// Target node.
        node: NodeHandle,
        /// Property name.
        name: String,
    },
    /// `add_event_listener`
    AddListener {
        /// Target node.
        node: NodeHandle,
        /// Native event name.
        event: String,
    },
    /// `remove_event_listener`
    RemoveListener {
        /// Target node.
        node: NodeHandle,
        /// Native event name.
        event: String,
    },
    /// `append_child`
    Append {
        /// New parent.
        parent: NodeHandle,
        /// Appended node.
        child: NodeHandle,
    },
    /// `remove_child`
    Remove {
        /// Former parent.
        parent: NodeHandle,
        /// Removed node.
        child: NodeHandle,
    },
}

#[derive(Debug)]
struct MemoryNode {
    kind: String,
    is_text: bool,
    properties: IndexMap<String, PropValue, PropsHasher>,
    listeners: Vec<(String, EventHandler)>,
    children: Vec<NodeHandle>,
    parent: Option<NodeHandle>,
}

#[derive(Debug, Clone, Copy)]
struct InjectedFault {
    operation: Option<&'static str>,
    remaining: usize,
}

/// In-memory output tree implementing [`Host`].
#[derive(Debug, Default)]
pub struct MemoryHost {
    nodes: Slab<MemoryNode>,
    ops: Vec<HostOp>,
    fault: Option<InjectedFault>,
}

impl MemoryHost {
    /// Create an empty host.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a container node to render into. Not logged.
    pub fn create_container(&mut self) -> NodeHandle {
        NodeHandle(self.nodes.insert(MemoryNode {
            kind: "#container".to_owned(),
            is_text: false,
            properties: IndexMap::default(),
            listeners: Vec::new(),
            children: Vec::new(),
            parent: None,
        }))
    }

    /// Fail the call made after `calls` more successful ones, whatever it is.
    pub fn fail_after(&mut self, calls: usize) {
        self.fault = Some(InjectedFault {
            operation: None,
            remaining: calls,
        });
    }

    /// Fail the next call of `operation` (e.g. `"append_child"`).
    pub fn fail_next(&mut self, operation: &'static str) {
        self.fault = Some(InjectedFault {
            operation: Some(operation),
            remaining: 0,
        });
    }

    /// Successful calls, in order.
    pub fn ops(&self) -> &[HostOp] {
        &self.ops
    }

    /// Take the call log, leaving it empty.
    pub fn take_ops(&mut self) -> Vec<HostOp> {
        std::mem::take(&mut self.ops)
    }

    /// Number of nodes ever created and not freed, containers included.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Children of `node`.
    pub fn children(&self, node: NodeHandle) -> &[NodeHandle] {
        self.nodes
            .get(node.0)
            .map_or(&[][..], |n| n.children.as_slice())
    }

    /// Parent of `node`, if attached.
    pub fn parent(&self, node: NodeHandle) -> Option<NodeHandle> {
        self.nodes.get(node.0).and_then(|n| n.parent)
    }

    /// Tag name of `node` (`#text` for text nodes).
    pub fn kind(&self, node: NodeHandle) -> Option<&str> {
        let node = self.nodes.get(node.0)?;
        Some(if node.is_text {
            "#text"
        } else {
            node.kind.as_str()
        })
    }

    /// Current value of a property.
    pub fn property(&self, node: NodeHandle, name: &str) -> Option<&PropValue> {
        self.nodes.get(node.0)?.properties.get(name)
    }

    /// Number of listeners attached for `event`.
    pub fn listener_count(&self, node: NodeHandle, event: &str) -> usize {
        self.nodes.get(node.0).map_or(0, |n| {
            n.listeners.iter().filter(|(name, _)| name == event).count()
        })
    }

    /// First node of kind `kind` below `root`, in document order.
    pub fn find(&self, root: NodeHandle, kind: &str) -> Option<NodeHandle> {
        let mut stack = vec![root];
        while let Some(handle) = stack.pop() {
            if handle != root && self.kind(handle) == Some(kind) {
                return Some(handle);
            }
            stack.extend(self.children(handle).iter().rev().copied());
        }
        None
    }

    /// Fire `event` on `node`; returns how many listeners ran.
    pub fn dispatch(&self, node: NodeHandle, event: &str) -> usize {
        let Some(target) = self.nodes.get(node.0) else {
            return 0;
        };
        let handlers: Vec<EventHandler> = target
            .listeners
            .iter()
            .filter(|(name, _)| name == event)
            .map(|(_, handler)| handler.clone())
            .collect();
        let payload = Event::new(event);
        for handler in &handlers {
            handler.call(&payload);
        }
        handlers.len()
    }

    /// Markup of the children of `node`.
    ///
    /// Elements print as `<tag name="value">...</tag>` with properties in the
    /// order they were set; text nodes print their content.
    pub fn markup(&self, node: NodeHandle) -> String {
        let mut out = String::new();
        for &child in self.children(node) {
            self.write_markup(child, &mut out);
        }
        out
    }

    fn write_markup(&self, handle: NodeHandle, out: &mut String) {
        let Some(node) = self.nodes.get(handle.0) else {
            return;
        };
        if node.is_text {
            if let Some(value) = node.properties.get(TEXT_VALUE) {
                let _ = write!(out, "{value}");
            }
            return;
        }
        let _ = write!(out, "<{}", node.kind);
        for (name, value) in &node.properties {
            let _ = write!(out, " {name}=\"{value}\"");
        }
        out.push('>');
        for &child in &node.children {
            self.write_markup(child, out);
        }
        let _ = write!(out, "</{}>", node.kind);
    }

    fn check_fault(&mut self, operation: &'static str) -> Result<(), HostError> {
        let Some(fault) = self.fault.as_mut() else {
            return Ok(());
        };
        if fault.operation.is_some_and(|target| target != operation) {
            return Ok(());
        }
        if fault.remaining > 0 {
            fault.remaining -= 1;
            return Ok(());
        }
        self.fault = None;
        Err(HostError::new(operation, "injected failure"))
    }

    fn node_mut(
        &mut self,
        operation: &'static str,
        handle: NodeHandle,
    ) -> Result<&mut MemoryNode, HostError> {
        self.nodes
            .get_mut(handle.0)
            .ok_or_else(|| HostError::new(operation, format!("unknown node {}", handle.0)))
    }

    fn detach(&mut self, child: NodeHandle) {
        let Some(parent) = self.nodes.get(child.0).and_then(|n| n.parent) else {
            return;
        };
        if let Some(parent) = self.nodes.get_mut(parent.0) {
            parent.children.retain(|&c| c != child);
        }
        if let Some(child) = self.nodes.get_mut(child.0) {
            child.parent = None;
        }
    }
}

impl Host for MemoryHost {
    type Node = NodeHandle;

    fn create_node(&mut self, kind: &str, is_text: bool) -> Result<NodeHandle, HostError> {
        self.check_fault("create_node")?;
        let handle = NodeHandle(self.nodes.insert(MemoryNode {
            kind: kind.to_owned(),
            is_text,
            properties: IndexMap::default(),
            listeners: Vec::new(),
            children: Vec::new(),
            parent: None,
        }));
        self.ops.push(HostOp::Create {
            kind: kind.to_owned(),
            is_text,
        });
        Ok(handle)
    }

    fn set_property(
        &mut self,
        node: &NodeHandle,
        name: &str,
        value: &PropValue,
    ) -> Result<(), HostError> {
        self.check_fault("set_property")?;
        self.node_mut("set_property", *node)?
            .properties
            .insert(name.to_owned(), value.clone());
        self.ops.push(HostOp::SetProperty {
            node: *node,
            name: name.to_owned(),
            value: value.clone(),
        });
        Ok(())
    }

    fn remove_property(&mut self, node: &NodeHandle, name: &str) -> Result<(), HostError> {
        self.check_fault("remove_property")?;
        self.node_mut("remove_property", *node)?
            .properties
            .shift_remove(name);
        self.ops.push(HostOp::RemoveProperty {
            node: *node,
            name: name.to_owned(),
        });
        Ok(())
    }

    fn add_event_listener(
        &mut self,
        node: &NodeHandle,
        event: &str,
        handler: &EventHandler,
    ) -> Result<(), HostError> {
        self.check_fault("add_event_listener")?;
        self.node_mut("add_event_listener", *node)?
            .listeners
            .push((event.to_owned(), handler.clone()));
        self.ops.push(HostOp::AddListener {
            node: *node,
            event: event.to_owned(),
        });
        Ok(())
    }

    fn remove_event_listener(
        &mut self,
        node: &NodeHandle,
        event: &str,
        handler: &EventHandler,
    ) -> Result<(), HostError> {
        self.check_fault("remove_event_listener")?;
        let target = self.node_mut("remove_event_listener", *node)?;
        let Some(position) = target
            .listeners
            .iter()
            .position(|(name, h)| name == event && h.ptr_eq(handler))
        else {
            return Err(HostError::new(
                "remove_event_listener",
                format!("no `{event}` listener to remove"),
            ));
        };
        target.listeners.remove(position);
        self.ops.push(HostOp::RemoveListener {
            node: *node,
            event: event.to_owned(),
        });
        Ok(())
    }

    fn append_child(&mut self, parent: &NodeHandle, child: &NodeHandle) -> Result<(), HostError> {
        self.check_fault("append_child")?;
        self.node_mut("append_child", *child)?;
        self.detach(*child);
        self.node_mut("append_child", *parent)?.children.push(*child);
        self.node_mut("append_child", *child)?.parent = Some(*parent);
        self.ops.push(HostOp::Append {
            parent: *parent,
            child: *child,
        });
        Ok(())
    }

    fn remove_child(&mut self, parent: &NodeHandle, child: &NodeHandle) -> Result<(), HostError> {
        self.check_fault("remove_child")?;
        if self.parent(*child) != Some(*parent) {
            return Err(HostError::new(
                "remove_child",
                format!("node {} is not a child of node {}", child.0, parent.0),
            ));
        }
        self.detach(*child);
        self.ops.push(HostOp::Remove {
            parent: *parent,
            child: *child,
        });
        Ok(())
    }
}
