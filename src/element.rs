//! Immutable element descriptions.
//!
//! An [`Element`] is what a render pass *wants* the output tree to look like.
//! Elements are created fresh on every pass and are cheap to clone: props and
//! children live behind shared pointers, so handing an element to a fiber
//! never deep-copies the subtree below it.

use std::any::TypeId;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::hash::PropsHasher;
use crate::hooks::Hooks;

/// Property key holding the content of a text element.
pub const TEXT_VALUE: &str = "nodeValue";

/// Ordered property map of an element.
pub type Props = IndexMap<String, PropValue, PropsHasher>;

/// Payload handed to an [`EventHandler`] when the host fires an event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Event {
    /// Native event name, e.g. `click`.
    pub name: String,
}

impl Event {
    /// Create an event with the given native name.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Shared event callback.
///
/// Handlers compare by identity: a handler rebuilt on every render (a new
/// closure each time) is a *changed* handler, and the commit phase swaps the
/// listener on the host node. Clone the handler to keep it stable.
#[derive(Clone)]
pub struct EventHandler(Arc<dyn Fn(&Event) + Send + Sync>);

impl EventHandler {
    /// Wrap a closure as an event handler.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Invoke the handler.
    pub fn call(&self, event: &Event) {
        (self.0)(event)
    }

    /// Whether both handles point at the same closure.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl PartialEq for EventHandler {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for EventHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventHandler({:p})", Arc::as_ptr(&self.0))
    }
}

/// A property value.
///
/// Floats compare by bit pattern, so a `NaN` equals itself and is not set
/// again on every render.
#[derive(Clone, Debug)]
pub enum PropValue {
    /// String value.
    Text(String),
    /// Integer value.
    Int(i64),
    /// Floating point value.
    Number(f64),
    /// Boolean value.
    Bool(bool),
    /// Event callback; only meaningful under an `on*` key.
    Handler(EventHandler),
}

impl PropValue {
    /// The handler, if this value is one.
    pub fn as_handler(&self) -> Option<&EventHandler> {
        match self {
            PropValue::Handler(handler) => Some(handler),
            _ => None,
        }
    }

    /// The string content, if this value is text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            PropValue::Text(text) => Some(text),
            _ => None,
        }
    }
}

impl PartialEq for PropValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (PropValue::Text(a), PropValue::Text(b)) => a == b,
            (PropValue::Int(a), PropValue::Int(b)) => a == b,
            (PropValue::Number(a), PropValue::Number(b)) => a.to_bits() == b.to_bits(),
            (PropValue::Bool(a), PropValue::Bool(b)) => a == b,
            (PropValue::Handler(a), PropValue::Handler(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for PropValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropValue::Text(text) => f.write_str(text),
            PropValue::Int(n) => write!(f, "{n}"),
            PropValue::Number(n) => write!(f, "{n}"),
            PropValue::Bool(b) => write!(f, "{b}"),
            PropValue::Handler(_) => f.write_str("[handler]"),
        }
    }
}

impl From<&str> for PropValue {
    fn from(value: &str) -> Self {
        PropValue::Text(value.to_owned())
    }
}

impl From<String> for PropValue {
    fn from(value: String) -> Self {
        PropValue::Text(value)
    }
}

impl From<f64> for PropValue {
    fn from(value: f64) -> Self {
        PropValue::Number(value)
    }
}

impl From<i64> for PropValue {
    fn from(value: i64) -> Self {
        PropValue::Int(value)
    }
}

impl From<i32> for PropValue {
    fn from(value: i32) -> Self {
        PropValue::Int(i64::from(value))
    }
}

impl From<bool> for PropValue {
    fn from(value: bool) -> Self {
        PropValue::Bool(value)
    }
}

impl From<EventHandler> for PropValue {
    fn from(value: EventHandler) -> Self {
        PropValue::Handler(value)
    }
}

type RenderFn = dyn Fn(&Props, &mut Hooks<'_>) -> Element + Send + Sync;

/// A function component.
///
/// Identity is the Rust type of the render function: every `fn` item and every
/// closure expression has its own type, so passing the same function on every
/// pass keeps the component's fiber (and its hook state) alive, while a
/// different function at the same position replaces it.
///
/// Pass the function item or closure itself. Coercing it to a `fn` pointer
/// first gives every component the same type, and so the same identity.
#[derive(Clone)]
pub struct Component {
    id: TypeId,
    name: &'static str,
    render: Arc<RenderFn>,
}

impl Component {
    /// Wrap a render function.
    pub fn new<F>(render: F) -> Self
    where
        F: Fn(&Props, &mut Hooks<'_>) -> Element + Send + Sync + 'static,
    {
        Self {
            id: TypeId::of::<F>(),
            name: short_type_name(std::any::type_name::<F>()),
            render: Arc::new(render),
        }
    }

    /// Debug name derived from the render function's type.
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub(crate) fn render(&self, props: &Props, hooks: &mut Hooks<'_>) -> Element {
        (self.render)(props, hooks)
    }
}

impl PartialEq for Component {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Component").field(&self.name).finish()
    }
}

fn short_type_name(full: &'static str) -> &'static str {
    // `my_app::views::counter` -> `counter`; closures keep their full path.
    if full.contains('{') {
        return full;
    }
    full.rsplit("::").next().unwrap_or(full)
}

/// What an element stands for.
#[derive(Clone, Debug, PartialEq)]
pub enum ElementKind {
    /// Native node with a tag name.
    Host(Arc<str>),
    /// Raw text content, stored under [`TEXT_VALUE`].
    Text,
    /// Function component rendering exactly one child element.
    Component(Component),
}

impl ElementKind {
    /// Short label used in logs, snapshots and commit reports.
    pub fn label(&self) -> &str {
        match self {
            ElementKind::Host(tag) => tag,
            ElementKind::Text => "#text",
            ElementKind::Component(component) => component.name(),
        }
    }
}

/// Immutable description of one node of desired UI.
#[derive(Clone, Debug)]
pub struct Element {
    kind: ElementKind,
    props: Arc<Props>,
    children: Arc<[Element]>,
}

impl Element {
    /// Host element with no props and no children; see [`Element::build`].
    pub fn host(tag: &str) -> Self {
        Self::build(tag).finish()
    }

    /// Start building a host element.
    pub fn build(tag: &str) -> ElementBuilder {
        ElementBuilder {
            kind: ElementKind::Host(Arc::from(tag)),
            props: Props::default(),
            children: Vec::new(),
        }
    }

    /// Text element.
    pub fn text(value: impl Into<String>) -> Self {
        let mut props = Props::default();
        props.insert(TEXT_VALUE.to_owned(), PropValue::Text(value.into()));
        Self {
            kind: ElementKind::Text,
            props: Arc::new(props),
            children: Arc::from(Vec::new()),
        }
    }

    /// Component element with the given props.
    pub fn component(component: Component, props: Props) -> Self {
        Self {
            kind: ElementKind::Component(component),
            props: Arc::new(props),
            children: Arc::from(Vec::new()),
        }
    }

    /// The element's kind.
    pub fn kind(&self) -> &ElementKind {
        &self.kind
    }

    /// The element's properties.
    pub fn props(&self) -> &Arc<Props> {
        &self.props
    }

    /// The element's children.
    pub fn children(&self) -> &Arc<[Element]> {
        &self.children
    }
}

/// Builder for host elements.
///
/// ```ignore
/// let view = Element::build("div")
///     .prop("id", "root")
///     .child(Element::build("h1").text("hello").finish())
///     .finish();
/// ```
#[derive(Debug)]
pub struct ElementBuilder {
    kind: ElementKind,
    props: Props,
    children: Vec<Element>,
}

impl ElementBuilder {
    /// Set a plain property.
    pub fn prop(mut self, name: &str, value: impl Into<PropValue>) -> Self {
        self.props.insert(name.to_owned(), value.into());
        self
    }

    /// Attach an event handler under `name` (conventionally `onClick` etc).
    pub fn on(self, name: &str, handler: EventHandler) -> Self {
        self.prop(name, handler)
    }

    /// Append a child element.
    pub fn child(mut self, child: Element) -> Self {
        self.children.push(child);
        self
    }

    /// Append several children.
    pub fn children(mut self, children: impl IntoIterator<Item = Element>) -> Self {
        self.children.extend(children);
        self
    }

    /// Append a text child.
    pub fn text(self, value: impl Into<String>) -> Self {
        self.child(Element::text(value))
    }

    /// Finish the element.
    pub fn finish(self) -> Element {
        Element {
            kind: self.kind,
            props: Arc::new(self.props),
            children: Arc::from(self.children),
        }
    }
}

/// Build a props map from `(name, value)` pairs.
pub fn props<I, K, V>(pairs: I) -> Props
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<PropValue>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}
