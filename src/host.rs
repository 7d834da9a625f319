//! The host rendering boundary.
//!
//! The reconciler never touches a real output tree; it calls these primitives.
//! A browser binding forwards them to the DOM. The crate's own tests use the
//! in-memory host of the `testing` module.

use std::fmt::Debug;

use crate::element::{EventHandler, PropValue};
use crate::error::HostError;

/// Reserved prefix marking event-handler properties.
pub const EVENT_PREFIX: &str = "on";

/// Native event name for an event-handler key: `onClick` -> `click`.
///
/// Returns None when `key` does not carry the prefix or has nothing after it.
pub fn event_name(key: &str) -> Option<String> {
    key.strip_prefix(EVENT_PREFIX)
        .filter(|rest| !rest.is_empty())
        .map(str::to_lowercase)
}

/// The handler and native event name if `key`/`value` form an event binding.
///
/// A prefixed key holding a non-handler value is a plain property.
pub fn as_event<'a>(key: &str, value: &'a PropValue) -> Option<(String, &'a EventHandler)> {
    let handler = value.as_handler()?;
    event_name(key).map(|name| (name, handler))
}

/// Host rendering primitives.
pub trait Host {
    /// Handle to a native output node.
    type Node: Clone + PartialEq + Debug;

    /// Create a detached node for `kind` (a tag name, ignored for text nodes).
    fn create_node(&mut self, kind: &str, is_text: bool) -> Result<Self::Node, HostError>;

    /// Set a plain property.
    fn set_property(
        &mut self,
        node: &Self::Node,
        name: &str,
        value: &PropValue,
    ) -> Result<(), HostError>;

    /// Remove a plain property.
    fn remove_property(&mut self, node: &Self::Node, name: &str) -> Result<(), HostError>;

    /// Attach `handler` for the native event `event`.
    fn add_event_listener(
        &mut self,
        node: &Self::Node,
        event: &str,
        handler: &EventHandler,
    ) -> Result<(), HostError>;

    /// Detach `handler` from the native event `event`.
    fn remove_event_listener(
        &mut self,
        node: &Self::Node,
        event: &str,
        handler: &EventHandler,
    ) -> Result<(), HostError>;

    /// Append `child` as the last child of `parent`.
    fn append_child(&mut self, parent: &Self::Node, child: &Self::Node) -> Result<(), HostError>;

    /// Remove `child` from `parent`.
    fn remove_child(&mut self, parent: &Self::Node, child: &Self::Node) -> Result<(), HostError>;
}
