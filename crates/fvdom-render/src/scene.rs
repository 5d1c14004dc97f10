#![forbid(unsafe_code)]

//! Scene node model.
//!
//! A [`SceneNode`] describes one logical UI unit for one render pass. Nodes
//! are immutable once handed to the renderer and cheap to clone (`Rc`
//! inside); the builder methods below copy-on-write while a node is still
//! uniquely owned by its author.
//!
//! # Normalization
//!
//! Child lists accept anything convertible into [`Child`]:
//!
//! | Input | Normalized node |
//! |-------|-----------------|
//! | `SceneNode` | itself |
//! | `&str` / `String` | [`NodeKind::Text`] |
//! | `Vec<_>` | [`NodeKind::Fragment`] holding the normalized items |
//! | `None` | empty [`NodeKind::Comment`] placeholder |
//!
//! # Type compatibility
//!
//! [`is_same_type`] decides whether an old node can be patched into a new
//! one: same kind, same element tag or component definition, same key.

use std::fmt;
use std::rc::Rc;

use bitflags::bitflags;
use smallvec::SmallVec;

use crate::component::ComponentDef;
use crate::error::ComponentError;

// =============================================================================
// Keys
// =============================================================================

/// Stable sibling identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    /// Integer key.
    Int(i64),
    /// String key.
    Str(Rc<str>),
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Str(s) => write!(f, "\"{s}\""),
        }
    }
}

impl From<i64> for Key {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for Key {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<u32> for Key {
    fn from(v: u32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<usize> for Key {
    fn from(v: usize) -> Self {
        Self::Int(i64::try_from(v).unwrap_or(i64::MAX))
    }
}

impl From<&str> for Key {
    fn from(v: &str) -> Self {
        Self::Str(v.into())
    }
}

impl From<String> for Key {
    fn from(v: String) -> Self {
        Self::Str(v.into())
    }
}

impl From<char> for Key {
    fn from(v: char) -> Self {
        Self::Str(v.to_string().into())
    }
}

// =============================================================================
// Prop values
// =============================================================================

type HandlerFn = dyn Fn(&[PropValue]) -> Result<(), ComponentError>;

/// Event handler prop. Two handlers are equal only if they are the same
/// closure.
#[derive(Clone)]
pub struct Handler(Rc<HandlerFn>);

impl Handler {
    /// Wrap a fallible handler.
    pub fn new(f: impl Fn(&[PropValue]) -> Result<(), ComponentError> + 'static) -> Self {
        Self(Rc::new(f))
    }

    /// Wrap an infallible handler.
    pub fn infallible(f: impl Fn(&[PropValue]) + 'static) -> Self {
        Self::new(move |args| {
            f(args);
            Ok(())
        })
    }

    /// Invoke the handler.
    pub fn call(&self, args: &[PropValue]) -> Result<(), ComponentError> {
        (self.0)(args)
    }

    /// Identity comparison.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl PartialEq for Handler {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handler({:p})", Rc::as_ptr(&self.0).cast::<()>())
    }
}

/// A prop value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum PropValue {
    /// Explicit absence (`null`).
    #[default]
    Null,
    /// Boolean.
    Bool(bool),
    /// Integer.
    Int(i64),
    /// Float.
    Float(f64),
    /// String.
    Str(Rc<str>),
    /// Event handler or callback.
    Handler(Handler),
}

impl PropValue {
    /// The string payload, if any.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// The boolean payload, if any.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// The integer payload, if any.
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Numeric payload as a float (integers widen).
    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// The handler payload, if any.
    #[must_use]
    pub fn as_handler(&self) -> Option<&Handler> {
        match self {
            Self::Handler(h) => Some(h),
            _ => None,
        }
    }

    /// Attribute-style truthiness: `false`, `null`, and `""` are falsy.
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Null => false,
            Self::Bool(b) => *b,
            Self::Str(s) => !s.is_empty(),
            _ => true,
        }
    }
}

impl fmt::Display for PropValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Str(s) => write!(f, "{s}"),
            Self::Handler(_) => write!(f, "[handler]"),
        }
    }
}

impl From<bool> for PropValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for PropValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for PropValue {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<u32> for PropValue {
    fn from(v: u32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f64> for PropValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for PropValue {
    fn from(v: &str) -> Self {
        Self::Str(v.into())
    }
}

impl From<String> for PropValue {
    fn from(v: String) -> Self {
        Self::Str(v.into())
    }
}

impl From<Rc<str>> for PropValue {
    fn from(v: Rc<str>) -> Self {
        Self::Str(v)
    }
}

impl From<Handler> for PropValue {
    fn from(v: Handler) -> Self {
        Self::Handler(v)
    }
}

impl<T: Into<PropValue>> From<Option<T>> for PropValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

/// Ordered prop mapping. Insertion order is preserved and is the order in
/// which props reach the host on mount.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Props {
    entries: SmallVec<[(Rc<str>, PropValue); 4]>,
}

impl Props {
    /// Empty props.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a prop.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&PropValue> {
        self.entries
            .iter()
            .find(|(k, _)| k.as_ref() == key)
            .map(|(_, v)| v)
    }

    /// Whether a prop is present (even if `Null`).
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Set a prop, replacing an existing entry in place.
    pub fn insert(&mut self, key: impl Into<Rc<str>>, value: impl Into<PropValue>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Builder form of [`Props::insert`].
    #[must_use]
    pub fn with(mut self, key: impl Into<Rc<str>>, value: impl Into<PropValue>) -> Self {
        self.insert(key, value);
        self
    }

    /// Remove and return a prop.
    pub fn remove(&mut self, key: &str) -> Option<PropValue> {
        let pos = self.entries.iter().position(|(k, _)| k.as_ref() == key)?;
        Some(self.entries.remove(pos).1)
    }

    /// Iterate entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &PropValue)> {
        self.entries.iter().map(|(k, v)| (k.as_ref(), v))
    }

    /// Iterate keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_ref())
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there are no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<Rc<str>>, V: Into<PropValue>> FromIterator<(K, V)> for Props {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut props = Self::new();
        for (k, v) in iter {
            props.insert(k, v);
        }
        props
    }
}

/// Props the engine consumes itself and never forwards to the host.
pub(crate) fn is_reserved_prop(key: &str) -> bool {
    key.is_empty() || key == "key" || key == "ref" || key.starts_with("onVnode")
}

// =============================================================================
// Slots & children
// =============================================================================

/// A slot renderer: receives slot props, returns nodes.
pub type SlotFn = Rc<dyn Fn(&Props) -> Vec<SceneNode>>;

/// Named slots passed to a component.
///
/// Slot sets compare by identity: a parent that rebuilds its slots on every
/// render forces the child to re-render.
#[derive(Clone, Default)]
pub struct Slots {
    entries: Rc<Vec<(Rc<str>, SlotFn)>>,
}

impl Slots {
    /// No slots.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a named slot.
    #[must_use]
    pub fn with(mut self, name: impl Into<Rc<str>>, f: impl Fn(&Props) -> Vec<SceneNode> + 'static) -> Self {
        let name = name.into();
        let f: SlotFn = Rc::new(f);
        let entries = Rc::make_mut(&mut self.entries);
        match entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = f,
            None => entries.push((name, f)),
        }
        self
    }

    /// Add the `default` slot.
    #[must_use]
    pub fn default_slot(self, f: impl Fn(&Props) -> Vec<SceneNode> + 'static) -> Self {
        self.with("default", f)
    }

    /// Look up a slot.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&SlotFn> {
        self.entries
            .iter()
            .find(|(n, _)| n.as_ref() == name)
            .map(|(_, f)| f)
    }

    /// Slot names in insertion order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_ref())
    }

    /// Whether no slots were passed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Identity comparison.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.entries, &other.entries)
    }
}

impl fmt::Debug for Slots {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

/// Children of a scene node.
#[derive(Clone, Default)]
pub enum Children {
    /// No children.
    #[default]
    None,
    /// Raw text (element text fast path, or the content of text-like nodes).
    Text(Rc<str>),
    /// Child nodes, already normalized.
    Nodes(Rc<[SceneNode]>),
    /// Component slots.
    Slots(Slots),
}

impl Children {
    /// The text payload, if any.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(t) => Some(t),
            _ => None,
        }
    }

    /// The node list, if any.
    #[must_use]
    pub fn as_nodes(&self) -> Option<&[SceneNode]> {
        match self {
            Self::Nodes(n) => Some(n),
            _ => None,
        }
    }
}

impl fmt::Debug for Children {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "None"),
            Self::Text(t) => f.debug_tuple("Text").field(t).finish(),
            Self::Nodes(n) => f.debug_list().entries(n.iter()).finish(),
            Self::Slots(s) => f.debug_tuple("Slots").field(s).finish(),
        }
    }
}

/// Un-normalized child input.
pub enum Child {
    /// A node.
    Node(SceneNode),
    /// Raw text, becomes a text node.
    Text(Rc<str>),
    /// Nested list, becomes a fragment.
    List(Vec<Child>),
    /// Nothing, becomes a comment placeholder.
    Empty,
}

impl Child {
    /// Normalize into a single scene node.
    #[must_use]
    pub fn normalize(self) -> SceneNode {
        match self {
            Self::Node(node) => node,
            Self::Text(text) => SceneNode::text(text),
            Self::List(items) => SceneNode::fragment(items),
            Self::Empty => SceneNode::comment(""),
        }
    }
}

impl From<SceneNode> for Child {
    fn from(node: SceneNode) -> Self {
        Self::Node(node)
    }
}

impl From<&SceneNode> for Child {
    fn from(node: &SceneNode) -> Self {
        Self::Node(node.clone())
    }
}

impl From<&str> for Child {
    fn from(text: &str) -> Self {
        Self::Text(text.into())
    }
}

impl From<String> for Child {
    fn from(text: String) -> Self {
        Self::Text(text.into())
    }
}

impl<T: Into<Child>> From<Vec<T>> for Child {
    fn from(items: Vec<T>) -> Self {
        Self::List(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Child>> From<Option<T>> for Child {
    fn from(item: Option<T>) -> Self {
        item.map_or(Self::Empty, Into::into)
    }
}

fn normalize_children<I>(children: I) -> Rc<[SceneNode]>
where
    I: IntoIterator,
    I::Item: Into<Child>,
{
    children
        .into_iter()
        .map(|c| c.into().normalize())
        .collect::<Vec<_>>()
        .into()
}

// =============================================================================
// Patch hints
// =============================================================================

bitflags! {
    /// Which aspects of a node are dynamic.
    ///
    /// An empty hint means "unknown": the patch engine diffs everything. A
    /// non-empty hint lets it touch only the flagged aspects. `BAIL` forces
    /// the full diff even when other bits are set.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PatchHint: u16 {
        /// Element text children are dynamic.
        const TEXT = 1;
        /// `class` is dynamic.
        const CLASS = 1 << 1;
        /// `style` is dynamic.
        const STYLE = 1 << 2;
        /// The props listed in `dynamic_props` are dynamic.
        const PROPS = 1 << 3;
        /// Prop keys themselves are dynamic; diff the full prop set.
        const FULL_PROPS = 1 << 4;
        /// Children are keyed.
        const KEYED_CHILDREN = 1 << 5;
        /// Children are unkeyed.
        const UNKEYED_CHILDREN = 1 << 6;
        /// Leave optimized mode; diff everything.
        const BAIL = 1 << 7;
    }
}

impl PatchHint {
    /// Whether the hint narrows the props diff.
    #[must_use]
    pub fn is_optimized(self) -> bool {
        !self.is_empty() && !self.contains(Self::BAIL)
    }
}

// =============================================================================
// Scene nodes
// =============================================================================

/// Node kind tag.
#[derive(Clone)]
pub enum NodeKind {
    /// Text leaf; content in `children`.
    Text,
    /// Comment leaf; content in `children`.
    Comment,
    /// Opaque pre-rendered host content; content in `children`.
    StaticBlob,
    /// Anchored list of children without a host node of its own.
    Fragment,
    /// Host element with a tag.
    Element(Rc<str>),
    /// Component instance.
    Component(ComponentDef),
    /// Children rendered into another host container.
    Teleport,
    /// Async boundary with a default and a fallback branch.
    Suspense,
}

impl NodeKind {
    /// Kind, tag, and component identity match.
    #[must_use]
    pub fn same(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Text, Self::Text)
            | (Self::Comment, Self::Comment)
            | (Self::StaticBlob, Self::StaticBlob)
            | (Self::Fragment, Self::Fragment)
            | (Self::Teleport, Self::Teleport)
            | (Self::Suspense, Self::Suspense) => true,
            (Self::Element(a), Self::Element(b)) => a == b,
            (Self::Component(a), Self::Component(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl fmt::Debug for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => write!(f, "Text"),
            Self::Comment => write!(f, "Comment"),
            Self::StaticBlob => write!(f, "StaticBlob"),
            Self::Fragment => write!(f, "Fragment"),
            Self::Element(tag) => write!(f, "Element({tag})"),
            Self::Component(def) => write!(f, "Component({})", def.name()),
            Self::Teleport => write!(f, "Teleport"),
            Self::Suspense => write!(f, "Suspense"),
        }
    }
}

#[derive(Clone)]
struct NodeData {
    kind: NodeKind,
    key: Option<Key>,
    props: Props,
    children: Children,
    hint: PatchHint,
    dynamic_props: SmallVec<[Rc<str>; 4]>,
}

/// Immutable description of one UI unit.
#[derive(Clone)]
pub struct SceneNode(Rc<NodeData>);

impl SceneNode {
    fn from_parts(kind: NodeKind, children: Children) -> Self {
        Self(Rc::new(NodeData {
            kind,
            key: None,
            props: Props::new(),
            children,
            hint: PatchHint::empty(),
            dynamic_props: SmallVec::new(),
        }))
    }

    fn data_mut(&mut self) -> &mut NodeData {
        Rc::make_mut(&mut self.0)
    }

    /// Text leaf.
    pub fn text(content: impl Into<Rc<str>>) -> Self {
        Self::from_parts(NodeKind::Text, Children::Text(content.into()))
    }

    /// Comment leaf.
    pub fn comment(content: impl Into<Rc<str>>) -> Self {
        Self::from_parts(NodeKind::Comment, Children::Text(content.into()))
    }

    /// Pre-rendered host content, inserted verbatim and never diffed.
    pub fn static_blob(content: impl Into<Rc<str>>) -> Self {
        Self::from_parts(NodeKind::StaticBlob, Children::Text(content.into()))
    }

    /// Fragment of normalized children.
    pub fn fragment<I>(children: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Child>,
    {
        Self::from_parts(NodeKind::Fragment, Children::Nodes(normalize_children(children)))
    }

    /// Host element.
    pub fn element(tag: impl Into<Rc<str>>) -> Self {
        Self::from_parts(NodeKind::Element(tag.into()), Children::None)
    }

    /// Component node.
    #[must_use]
    pub fn component(def: &ComponentDef) -> Self {
        Self::from_parts(NodeKind::Component(def.clone()), Children::None)
    }

    /// Teleport into the container resolved from `to`.
    pub fn teleport<I>(to: impl Into<Rc<str>>, children: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Child>,
    {
        let to: Rc<str> = to.into();
        Self::from_parts(NodeKind::Teleport, Children::Nodes(normalize_children(children)))
            .prop("to", to)
    }

    /// Async boundary showing `fallback` while `default` has unresolved
    /// async dependencies.
    pub fn suspense(default: impl Into<Child>, fallback: impl Into<Child>) -> Self {
        let branches: Rc<[SceneNode]> =
            vec![default.into().normalize(), fallback.into().normalize()].into();
        Self::from_parts(NodeKind::Suspense, Children::Nodes(branches))
    }

    // ---- builder -------------------------------------------------------

    /// Set a prop. The `key` prop sets the node key instead.
    #[must_use]
    pub fn prop(mut self, key: impl Into<Rc<str>>, value: impl Into<PropValue>) -> Self {
        let key = key.into();
        let value = value.into();
        if key.as_ref() == "key" {
            self.data_mut().key = prop_to_key(&value);
            return self;
        }
        self.data_mut().props.insert(key, value);
        self
    }

    /// Merge a prop set (the `key` prop sets the node key).
    #[must_use]
    pub fn props(mut self, props: Props) -> Self {
        for (k, v) in props.iter() {
            self = self.prop(k, v.clone());
        }
        self
    }

    /// Bind an event handler: `on("click", h)` sets `onClick`.
    #[must_use]
    pub fn on(self, event: &str, handler: Handler) -> Self {
        let key = crate::emit::handler_key(event);
        self.prop(key, handler)
    }

    /// Set the identity key.
    #[must_use]
    pub fn key(mut self, key: impl Into<Key>) -> Self {
        self.data_mut().key = Some(key.into());
        self
    }

    /// Append one child.
    #[must_use]
    pub fn child(mut self, child: impl Into<Child>) -> Self {
        let node = child.into().normalize();
        let data = self.data_mut();
        let mut nodes: Vec<SceneNode> = match &data.children {
            Children::Nodes(existing) => existing.to_vec(),
            _ => Vec::new(),
        };
        nodes.push(node);
        data.children = Children::Nodes(nodes.into());
        self
    }

    /// Replace children with a normalized list.
    #[must_use]
    pub fn children<I>(mut self, children: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Child>,
    {
        self.data_mut().children = Children::Nodes(normalize_children(children));
        self
    }

    /// Replace children with raw text.
    #[must_use]
    pub fn text_content(mut self, text: impl Into<Rc<str>>) -> Self {
        self.data_mut().children = Children::Text(text.into());
        self
    }

    /// Replace children with component slots.
    #[must_use]
    pub fn slots(mut self, slots: Slots) -> Self {
        self.data_mut().children = Children::Slots(slots);
        self
    }

    /// Set the patch hint.
    #[must_use]
    pub fn hint(mut self, hint: PatchHint) -> Self {
        self.data_mut().hint = hint;
        self
    }

    /// Names of props covered by [`PatchHint::PROPS`].
    #[must_use]
    pub fn dynamic_props<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Rc<str>>,
    {
        self.data_mut().dynamic_props = names.into_iter().map(Into::into).collect();
        self
    }

    // ---- accessors -----------------------------------------------------

    /// Kind tag.
    #[must_use]
    pub fn kind(&self) -> &NodeKind {
        &self.0.kind
    }

    /// Identity key.
    #[must_use]
    pub fn key_ref(&self) -> Option<&Key> {
        self.0.key.as_ref()
    }

    /// Props in insertion order.
    #[must_use]
    pub fn props_ref(&self) -> &Props {
        &self.0.props
    }

    /// Children.
    #[must_use]
    pub fn children_ref(&self) -> &Children {
        &self.0.children
    }

    /// Patch hint.
    #[must_use]
    pub fn patch_hint(&self) -> PatchHint {
        self.0.hint
    }

    /// Dynamic prop names.
    #[must_use]
    pub fn dynamic_prop_names(&self) -> &[Rc<str>] {
        &self.0.dynamic_props
    }

    /// Element tag, if an element.
    #[must_use]
    pub fn tag(&self) -> Option<&str> {
        match &self.0.kind {
            NodeKind::Element(tag) => Some(tag),
            _ => None,
        }
    }

    /// Component definition, if a component.
    #[must_use]
    pub fn component_def(&self) -> Option<&ComponentDef> {
        match &self.0.kind {
            NodeKind::Component(def) => Some(def),
            _ => None,
        }
    }

    /// Text payload of text-like nodes and text-children elements.
    #[must_use]
    pub fn text_ref(&self) -> Option<&str> {
        self.0.children.as_text()
    }

    /// Whether both handles point at the same node.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for SceneNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("SceneNode");
        s.field("kind", &self.0.kind);
        if let Some(key) = &self.0.key {
            s.field("key", key);
        }
        if !self.0.props.is_empty() {
            s.field("props", &self.0.props);
        }
        s.field("children", &self.0.children).finish()
    }
}

fn prop_to_key(value: &PropValue) -> Option<Key> {
    match value {
        PropValue::Int(v) => Some(Key::Int(*v)),
        PropValue::Str(s) => Some(Key::Str(Rc::clone(s))),
        PropValue::Float(v) => Some(Key::Str(v.to_string().into())),
        PropValue::Bool(b) => Some(Key::Str(b.to_string().into())),
        PropValue::Null | PropValue::Handler(_) => None,
    }
}

/// Type compatibility: an old node may be patched into `b` only if this
/// holds; otherwise it is unmounted and `b` mounted fresh.
#[must_use]
pub fn is_same_type(a: &SceneNode, b: &SceneNode) -> bool {
    a.0.key == b.0.key && a.0.kind.same(&b.0.kind)
}

/// Generic node constructor. A `key` entry in `props` becomes the node key.
#[must_use]
pub fn h(kind: NodeKind, props: Props, children: Children, hint: PatchHint) -> SceneNode {
    let mut node = SceneNode::from_parts(kind, children).props(props);
    node.data_mut().hint = hint;
    node
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_props_in_order() {
        let node = SceneNode::element("div")
            .prop("id", "main")
            .prop("class", "a")
            .prop("id", "other");
        let keys: Vec<&str> = node.props_ref().keys().collect();
        assert_eq!(keys, vec!["id", "class"]);
        assert_eq!(node.props_ref().get("id"), Some(&PropValue::from("other")));
    }

    #[test]
    fn key_prop_becomes_node_key() {
        let node = SceneNode::element("li").prop("key", 7);
        assert_eq!(node.key_ref(), Some(&Key::Int(7)));
        assert!(!node.props_ref().contains("key"));
    }

    #[test]
    fn children_normalize_strings_lists_and_none() {
        let node = SceneNode::element("div").children(vec![
            Child::from("hello"),
            Child::from(vec!["a", "b"]),
            Child::from(None::<SceneNode>),
        ]);
        let nodes = node.children_ref().as_nodes().unwrap_or_default();
        assert_eq!(nodes.len(), 3);
        assert!(matches!(nodes[0].kind(), NodeKind::Text));
        assert!(matches!(nodes[1].kind(), NodeKind::Fragment));
        assert!(matches!(nodes[2].kind(), NodeKind::Comment));
    }

    #[test]
    fn same_type_requires_tag_and_key() {
        let a = SceneNode::element("li").key("a");
        let a2 = SceneNode::element("li").key("a").prop("x", 1);
        let b = SceneNode::element("li").key("b");
        let span = SceneNode::element("span").key("a");
        assert!(is_same_type(&a, &a2));
        assert!(!is_same_type(&a, &b));
        assert!(!is_same_type(&a, &span));
        assert!(!is_same_type(&SceneNode::text("x"), &SceneNode::comment("x")));
    }

    #[test]
    fn handlers_compare_by_identity() {
        let h1 = Handler::infallible(|_| {});
        let h2 = Handler::infallible(|_| {});
        assert_eq!(PropValue::from(h1.clone()), PropValue::from(h1.clone()));
        assert_ne!(PropValue::from(h1), PropValue::from(h2));
    }

    #[test]
    fn clone_then_modify_does_not_alias() {
        let base = SceneNode::element("p").prop("a", 1);
        let copy = base.clone().prop("a", 2);
        assert_eq!(base.props_ref().get("a"), Some(&PropValue::Int(1)));
        assert_eq!(copy.props_ref().get("a"), Some(&PropValue::Int(2)));
        assert!(!base.ptr_eq(&copy));
    }

    #[test]
    fn h_extracts_key() {
        let node = h(
            NodeKind::Element("b".into()),
            Props::new().with("key", "k").with("title", "t"),
            Children::Text("x".into()),
            PatchHint::TEXT,
        );
        assert_eq!(node.key_ref(), Some(&Key::from("k")));
        assert_eq!(node.patch_hint(), PatchHint::TEXT);
        assert_eq!(node.text_ref(), Some("x"));
    }

    #[test]
    fn hint_optimization() {
        assert!(!PatchHint::empty().is_optimized());
        assert!(PatchHint::CLASS.is_optimized());
        assert!(!(PatchHint::CLASS | PatchHint::BAIL).is_optimized());
    }
}
