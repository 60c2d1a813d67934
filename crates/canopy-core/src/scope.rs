//! Scope lifecycles for Canopy.
//!
//! A scope lifecycle is one node of the business-logic tree. Each node owns a
//! [`LifecycleOwner`] and an ordered set of child scopes, and the tree keeps
//! one invariant: a child's activation state follows its parent's.
//!
//! - Activation is top-down and depth-first: a node activates itself, then
//!   each child in attachment order.
//! - Deactivation is bottom-up: every child subtree deactivates, in
//!   attachment order, before the node itself.
//! - Attaching a child to an active parent activates the child and its
//!   already-attached descendants immediately.
//! - Detaching a child deactivates its whole subtree, then unlinks it.
//! - A scope whose parent is inactive stays inactive, whichever way the
//!   activation reaches it.
//! - A scope gated by a view (see [`ViewLifecycle::bind`]) only activates
//!   while that view has appeared. Until then it holds back its subtree too.
//!
//! Nodes live in an arena ([`ScopeRegistry`]) keyed by generation-checked
//! [`ScopeId`]s. The owning handle is [`ScopeLifecycle`]; every other holder
//! (view bindings, diagnostics, routers looking at children) keeps a
//! `ScopeId` and re-resolves it, so a dropped scope shows up as
//! [`ScopeError::InvalidScopeId`] rather than a dangling reference.
//!
//! # Key Types
//!
//! - [`ScopeLifecycle`] - Owning handle for one node
//! - [`ScopeId`] - Non-owning, generation-checked identifier
//! - [`ScopeRegistry`] - The arena holding every node
//! - [`SharedScopeRegistry`] - Thread-safe wrapper running the cascade protocol
//! - [`ChildrenChanged`] - Event published whenever a child set changes
//!
//! # Example
//!
//! ```
//! use canopy_core::ScopeLifecycle;
//!
//! let root = ScopeLifecycle::named("root");
//! let child = ScopeLifecycle::named("child");
//! root.attach_child(&child);
//!
//! root.activate();
//! assert!(child.is_active());
//!
//! root.deactivate();
//! assert!(!child.is_active());
//! ```

use std::fmt::{self, Write as FmtWrite};
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;
use slotmap::{new_key_type, SlotMap};

use crate::error::{ScopeError, ScopeResult};
use crate::lifecycle::{LifecycleOwner, LifecycleSource, LifecycleSubscriber, SubscriberId};
use crate::logging::targets;
use crate::signal::{ConnectionId, Signal};
use crate::thread_check::{are_thread_checks_enabled, ThreadAffinity};
use crate::view::{ViewLifecycle, WeakViewLifecycle};

new_key_type! {
    /// A unique identifier for a scope in the registry.
    ///
    /// `ScopeId`s are stable handles that remain valid while the owning
    /// [`ScopeLifecycle`] is alive. After the scope is dropped the key is
    /// never reissued, so stale ids fail lookups instead of aliasing.
    pub struct ScopeId;
}

impl ScopeId {
    /// Convert the ScopeId to a raw u64 value.
    #[inline]
    pub fn as_raw(self) -> u64 {
        use slotmap::Key;
        self.data().as_ffi()
    }
}

/// The kind of change carried by a [`ChildrenChanged`] event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildChange {
    /// `child` was attached to `scope`.
    Attached,
    /// `child` was detached from `scope`.
    Detached,
}

/// Published whenever the child set of a scope changes.
///
/// The event is emitted on the scope where the change happened and then on
/// every ancestor, so subscribing at the root observes the whole tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildrenChanged {
    /// The scope whose child set changed.
    pub scope: ScopeId,
    /// The attached or detached child.
    pub child: ScopeId,
    /// What happened.
    pub change: ChildChange,
    /// Snapshot of `scope`'s children after the change, in attachment order.
    pub children: Vec<ScopeId>,
}

/// Internal data stored in the registry for each scope.
struct ScopeData {
    /// Human-readable name for debugging.
    name: String,
    parent: Option<ScopeId>,
    /// Children in attachment order.
    children: Vec<ScopeId>,
    owner: LifecycleOwner,
    /// Non-owning link to a view bound into the tree for diagnostics.
    view: Option<WeakViewLifecycle>,
    /// View whose visibility gates activation.
    gate: Option<WeakViewLifecycle>,
    /// Bound on the first transition or attach.
    affinity: Option<ThreadAffinity>,
    children_changed: Arc<Signal<ChildrenChanged>>,
}

impl ScopeData {
    fn new(id: ScopeId, name: String) -> Self {
        Self {
            name,
            parent: None,
            children: Vec::new(),
            owner: LifecycleOwner::with_source(LifecycleSource::Scope(id)),
            view: None,
            gate: None,
            affinity: None,
            children_changed: Arc::new(Signal::new()),
        }
    }
}

/// The arena that stores every scope and its relationships.
///
/// The registry only manipulates structure; it never runs subscriber code.
/// The cascade protocol lives on [`SharedScopeRegistry`], which releases its
/// lock around every callback.
pub struct ScopeRegistry {
    scopes: SlotMap<ScopeId, ScopeData>,
}

impl ScopeRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            scopes: SlotMap::with_key(),
        }
    }

    /// Register a new, inactive, parentless scope.
    pub fn register(&mut self, name: impl Into<String>) -> ScopeId {
        let name = name.into();
        let id = self
            .scopes
            .insert_with_key(|id| ScopeData::new(id, name.clone()));
        tracing::trace!(target: targets::SCOPE, ?id, name = %name, "registered scope");
        id
    }

    fn data(&self, id: ScopeId) -> ScopeResult<&ScopeData> {
        self.scopes.get(id).ok_or(ScopeError::InvalidScopeId(id))
    }

    fn data_mut(&mut self, id: ScopeId) -> ScopeResult<&mut ScopeData> {
        self.scopes.get_mut(id).ok_or(ScopeError::InvalidScopeId(id))
    }

    /// Check if a scope exists in the registry.
    pub fn contains(&self, id: ScopeId) -> bool {
        self.scopes.contains_key(id)
    }

    /// Get the number of registered scopes.
    pub fn scope_count(&self) -> usize {
        self.scopes.len()
    }

    /// Get the scope's name.
    pub fn name(&self, id: ScopeId) -> ScopeResult<&str> {
        self.data(id).map(|d| d.name.as_str())
    }

    /// Set the scope's name.
    pub fn set_name(&mut self, id: ScopeId, name: String) -> ScopeResult<()> {
        self.data_mut(id).map(|d| d.name = name)
    }

    /// Get the parent of a scope.
    pub fn parent(&self, id: ScopeId) -> ScopeResult<Option<ScopeId>> {
        self.data(id).map(|d| d.parent)
    }

    /// Get the children of a scope, in attachment order.
    pub fn children(&self, id: ScopeId) -> ScopeResult<&[ScopeId]> {
        self.data(id).map(|d| d.children.as_slice())
    }

    /// Get the lifecycle owner embedded in a scope.
    pub fn owner(&self, id: ScopeId) -> ScopeResult<&LifecycleOwner> {
        self.data(id).map(|d| &d.owner)
    }

    /// Whether a scope is active.
    pub fn is_active(&self, id: ScopeId) -> ScopeResult<bool> {
        self.data(id).map(|d| d.owner.is_active())
    }

    /// The view bound to a scope, if it is still alive.
    pub fn view(&self, id: ScopeId) -> ScopeResult<Option<ViewLifecycle>> {
        self.data(id)
            .map(|d| d.view.as_ref().and_then(WeakViewLifecycle::upgrade))
    }

    /// Associate a view with a scope for diagnostics. Does not keep it alive.
    pub fn set_view(&mut self, id: ScopeId, view: Option<WeakViewLifecycle>) -> ScopeResult<()> {
        self.data_mut(id).map(|d| d.view = view)
    }

    /// The view gating a scope's activation, if any.
    ///
    /// The returned handle may be dead; a dropped view never counts as
    /// appeared.
    pub fn gate(&self, id: ScopeId) -> ScopeResult<Option<WeakViewLifecycle>> {
        self.data(id).map(|d| d.gate.clone())
    }

    /// Make a scope's activation depend on `view` having appeared.
    pub fn set_gate(&mut self, id: ScopeId, view: Option<WeakViewLifecycle>) -> ScopeResult<()> {
        self.data_mut(id).map(|d| d.gate = view)
    }

    /// The children-changed signal of a scope.
    pub fn children_changed(&self, id: ScopeId) -> ScopeResult<Arc<Signal<ChildrenChanged>>> {
        self.data(id).map(|d| d.children_changed.clone())
    }

    /// Iterate over all root scopes (scopes with no parent).
    pub fn roots(&self) -> impl Iterator<Item = ScopeId> + '_ {
        self.scopes
            .iter()
            .filter(|(_, data)| data.parent.is_none())
            .map(|(id, _)| id)
    }

    /// Check if `potential_ancestor` is `id` or one of its ancestors.
    fn is_ancestor_or_self(&self, potential_ancestor: ScopeId, id: ScopeId) -> bool {
        let mut current = Some(id);
        while let Some(current_id) = current {
            if current_id == potential_ancestor {
                return true;
            }
            current = self.scopes.get(current_id).and_then(|d| d.parent);
        }
        false
    }

    /// Link `child` under `parent`, validating the attach contract.
    pub fn link(&mut self, parent: ScopeId, child: ScopeId) -> ScopeResult<()> {
        self.data(parent)?;
        let child_data = self.data(child)?;
        if let Some(existing) = child_data.parent {
            return Err(ScopeError::AlreadyAttached {
                child,
                parent: existing,
            });
        }
        if self.is_ancestor_or_self(child, parent) {
            return Err(ScopeError::CircularAttachment { parent, child });
        }

        self.data_mut(child)?.parent = Some(parent);
        self.data_mut(parent)?.children.push(child);
        Ok(())
    }

    /// Unlink `child` from `parent`.
    pub fn unlink(&mut self, parent: ScopeId, child: ScopeId) -> ScopeResult<()> {
        if self.data(child)?.parent != Some(parent) {
            return Err(ScopeError::NotAttached { parent, child });
        }
        self.data_mut(parent)?.children.retain(|&c| c != child);
        self.data_mut(child)?.parent = None;
        Ok(())
    }

    /// Remove a scope, orphaning its children. Returns the former parent.
    fn remove(&mut self, id: ScopeId) -> ScopeResult<Option<ScopeId>> {
        let data = self.scopes.remove(id).ok_or(ScopeError::InvalidScopeId(id))?;
        if let Some(parent) = data.parent {
            if let Some(parent_data) = self.scopes.get_mut(parent) {
                parent_data.children.retain(|&c| c != id);
            }
        }
        for child in data.children {
            if let Some(child_data) = self.scopes.get_mut(child) {
                child_data.parent = None;
            }
        }
        tracing::trace!(target: targets::SCOPE, ?id, name = %data.name, "removed scope");
        Ok(data.parent)
    }

    /// Bind (if needed) and return the thread affinity of a scope.
    fn bind_affinity(&mut self, id: ScopeId) -> ScopeResult<ThreadAffinity> {
        let data = self.data_mut(id)?;
        Ok(*data.affinity.get_or_insert_with(ThreadAffinity::current))
    }

    /// Set the affinity of a subtree to `affinity`.
    fn inherit_affinity(&mut self, id: ScopeId, affinity: ThreadAffinity) {
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if let Some(data) = self.scopes.get_mut(current) {
                data.affinity = Some(affinity);
                stack.extend(data.children.iter().copied());
            }
        }
    }

    /// Signals of `id` and each of its ancestors, nearest first.
    fn signals_to_root(&self, id: ScopeId) -> Vec<Arc<Signal<ChildrenChanged>>> {
        let mut signals = Vec::new();
        let mut current = Some(id);
        while let Some(current_id) = current {
            match self.scopes.get(current_id) {
                Some(data) => {
                    signals.push(data.children_changed.clone());
                    current = data.parent;
                }
                None => break,
            }
        }
        signals
    }

    // =========================================================================
    // Tree Traversal
    // =========================================================================

    /// Get all ancestors of a scope from immediate parent to root.
    pub fn ancestors(&self, id: ScopeId) -> ScopeResult<Vec<ScopeId>> {
        let mut result = Vec::new();
        let mut current = self.data(id)?.parent;
        while let Some(current_id) = current {
            result.push(current_id);
            current = self.scopes.get(current_id).and_then(|d| d.parent);
        }
        Ok(result)
    }

    /// Depth-first pre-order traversal: the node, then its children recursively.
    ///
    /// This is the order in which activation reaches the subtree.
    pub fn depth_first_preorder(&self, id: ScopeId) -> ScopeResult<Vec<ScopeId>> {
        let mut result = Vec::new();
        self.preorder_recursive(id, &mut result)?;
        Ok(result)
    }

    fn preorder_recursive(&self, id: ScopeId, result: &mut Vec<ScopeId>) -> ScopeResult<()> {
        let data = self.data(id)?;
        result.push(id);
        for &child_id in &data.children {
            self.preorder_recursive(child_id, result)?;
        }
        Ok(())
    }

    /// Depth-first post-order traversal: children recursively, then the node.
    ///
    /// This is the order in which deactivation reaches the subtree.
    pub fn depth_first_postorder(&self, id: ScopeId) -> ScopeResult<Vec<ScopeId>> {
        let mut result = Vec::new();
        self.postorder_recursive(id, &mut result)?;
        Ok(result)
    }

    fn postorder_recursive(&self, id: ScopeId, result: &mut Vec<ScopeId>) -> ScopeResult<()> {
        let data = self.data(id)?;
        for &child_id in &data.children {
            self.postorder_recursive(child_id, result)?;
        }
        result.push(id);
        Ok(())
    }

    // =========================================================================
    // Debug / Diagnostics
    // =========================================================================

    /// Debug dump of the scope tree.
    pub fn dump_scope_tree(&self, id: ScopeId) -> ScopeResult<String> {
        let mut output = String::new();
        self.dump_recursive(id, 0, &mut output)?;
        Ok(output)
    }

    fn dump_recursive(&self, id: ScopeId, depth: usize, output: &mut String) -> ScopeResult<()> {
        let data = self.data(id)?;
        let name = if data.name.is_empty() {
            "(unnamed)"
        } else {
            &data.name
        };
        let state = if data.owner.is_active() {
            "active"
        } else {
            "inactive"
        };
        let _ = write!(output, "{}[{:?}] {} ({})", "  ".repeat(depth), id, name, state);
        if let Some(view) = data.view.as_ref().and_then(WeakViewLifecycle::upgrade) {
            let _ = write!(output, " view={:?}", view.state());
        }
        output.push('\n');
        for &child_id in &data.children {
            self.dump_recursive(child_id, depth + 1, output)?;
        }
        Ok(())
    }
}

impl Default for ScopeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// A thread-safe wrapper around [`ScopeRegistry`] that runs the lifecycle
/// cascade protocol.
///
/// The lock is released before any subscriber callback or signal slot runs,
/// and re-acquired per step, so callbacks may freely attach, detach or query.
pub struct SharedScopeRegistry {
    inner: RwLock<ScopeRegistry>,
}

impl SharedScopeRegistry {
    /// Create a new shared scope registry.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(ScopeRegistry::new()),
        }
    }

    /// Register a new scope.
    pub fn register(&self, name: impl Into<String>) -> ScopeId {
        self.inner.write().register(name)
    }

    /// Check if a scope exists.
    pub fn contains(&self, id: ScopeId) -> bool {
        self.inner.read().contains(id)
    }

    /// Get the number of registered scopes.
    pub fn scope_count(&self) -> usize {
        self.inner.read().scope_count()
    }

    /// Get the scope's name.
    pub fn name(&self, id: ScopeId) -> ScopeResult<String> {
        self.inner.read().name(id).map(str::to_string)
    }

    /// Set the scope's name.
    pub fn set_name(&self, id: ScopeId, name: String) -> ScopeResult<()> {
        self.inner.write().set_name(id, name)
    }

    /// Get the parent of a scope.
    pub fn parent(&self, id: ScopeId) -> ScopeResult<Option<ScopeId>> {
        self.inner.read().parent(id)
    }

    /// Get the children of a scope (owned snapshot, attachment order).
    pub fn children(&self, id: ScopeId) -> ScopeResult<Vec<ScopeId>> {
        self.inner.read().children(id).map(<[ScopeId]>::to_vec)
    }

    /// Whether a scope is active.
    pub fn is_active(&self, id: ScopeId) -> ScopeResult<bool> {
        self.inner.read().is_active(id)
    }

    /// A handle to the lifecycle owner embedded in a scope.
    pub fn owner(&self, id: ScopeId) -> ScopeResult<LifecycleOwner> {
        self.inner.read().owner(id).cloned()
    }

    /// The view bound to a scope, if still alive.
    pub fn view(&self, id: ScopeId) -> ScopeResult<Option<ViewLifecycle>> {
        self.inner.read().view(id)
    }

    /// Associate a view with a scope for diagnostics.
    pub fn set_view(&self, id: ScopeId, view: Option<WeakViewLifecycle>) -> ScopeResult<()> {
        self.inner.write().set_view(id, view)
    }

    /// The view gating a scope's activation, if any.
    pub fn gate(&self, id: ScopeId) -> ScopeResult<Option<WeakViewLifecycle>> {
        self.inner.read().gate(id)
    }

    /// Make a scope's activation depend on `view` having appeared.
    pub fn set_gate(&self, id: ScopeId, view: Option<WeakViewLifecycle>) -> ScopeResult<()> {
        self.inner.write().set_gate(id, view)
    }

    /// The children-changed signal of a scope.
    pub fn children_changed(&self, id: ScopeId) -> ScopeResult<Arc<Signal<ChildrenChanged>>> {
        self.inner.read().children_changed(id)
    }

    /// Get all root scopes.
    pub fn roots(&self) -> Vec<ScopeId> {
        self.inner.read().roots().collect()
    }

    /// Get all ancestors of a scope from immediate parent to root.
    pub fn ancestors(&self, id: ScopeId) -> ScopeResult<Vec<ScopeId>> {
        self.inner.read().ancestors(id)
    }

    /// Depth-first pre-order traversal starting from a scope.
    pub fn depth_first_preorder(&self, id: ScopeId) -> ScopeResult<Vec<ScopeId>> {
        self.inner.read().depth_first_preorder(id)
    }

    /// Depth-first post-order traversal starting from a scope.
    pub fn depth_first_postorder(&self, id: ScopeId) -> ScopeResult<Vec<ScopeId>> {
        self.inner.read().depth_first_postorder(id)
    }

    /// Debug dump of the scope tree.
    pub fn dump_scope_tree(&self, id: ScopeId) -> ScopeResult<String> {
        self.inner.read().dump_scope_tree(id)
    }

    // =========================================================================
    // Cascade Protocol
    // =========================================================================

    #[track_caller]
    fn enforce_affinity(&self, id: ScopeId, operation: &str) -> ScopeResult<()> {
        if !are_thread_checks_enabled() {
            return Ok(());
        }
        let affinity = self.inner.write().bind_affinity(id)?;
        affinity.check(&format!("scope lifecycle `{operation}` called from a foreign thread"));
        Ok(())
    }

    /// Whether a scope may be active right now: its parent (if any) is
    /// active and its gating view (if any) has appeared.
    pub fn can_activate(&self, id: ScopeId) -> ScopeResult<bool> {
        let (parent_active, gate) = {
            let registry = self.inner.read();
            let data = registry.data(id)?;
            let parent_active = match data.parent {
                Some(parent) => registry.data(parent)?.owner.is_active(),
                None => true,
            };
            (parent_active, data.gate.clone())
        };
        let visible = match gate {
            Some(view) => view.upgrade().is_some_and(|v| v.is_appeared()),
            None => true,
        };
        Ok(parent_active && visible)
    }

    /// Activate a scope and, top-down, every attached descendant.
    ///
    /// Does nothing while the scope's parent is inactive or its gating view
    /// is off screen. Descendants held back by their own gate stay inactive.
    #[track_caller]
    pub fn activate(&self, id: ScopeId) -> ScopeResult<()> {
        self.enforce_affinity(id, "activate")?;
        let _span = tracing::debug_span!(target: targets::SCOPE, "activate", ?id).entered();
        self.activate_subtree(id)
    }

    fn activate_subtree(&self, id: ScopeId) -> ScopeResult<()> {
        if !self.can_activate(id)? {
            tracing::trace!(target: targets::SCOPE, ?id, "activation held back");
            return Ok(());
        }
        let owner = self.owner(id)?;
        owner.activate();
        if !owner.is_active() {
            // A subscriber deactivated the node again; leave children alone.
            return Ok(());
        }

        for child in self.children(id)? {
            let still_attached = self.inner.read().parent(child) == Ok(Some(id));
            if still_attached {
                self.activate_subtree(child)?;
            }
        }
        Ok(())
    }

    /// Deactivate, bottom-up, every attached descendant and then the scope.
    #[track_caller]
    pub fn deactivate(&self, id: ScopeId) -> ScopeResult<()> {
        self.enforce_affinity(id, "deactivate")?;
        let _span = tracing::debug_span!(target: targets::SCOPE, "deactivate", ?id).entered();
        self.deactivate_subtree(id)
    }

    fn deactivate_subtree(&self, id: ScopeId) -> ScopeResult<()> {
        for child in self.children(id)? {
            let still_attached = self.inner.read().parent(child) == Ok(Some(id));
            if still_attached {
                self.deactivate_subtree(child)?;
            }
        }
        self.owner(id)?.deactivate();
        Ok(())
    }

    /// Attach `child` under `parent`.
    ///
    /// If the parent is active the child subtree is activated immediately; if
    /// the parent is inactive the child subtree is forced inactive.
    #[track_caller]
    pub fn attach_child(&self, parent: ScopeId, child: ScopeId) -> ScopeResult<()> {
        self.enforce_affinity(parent, "attach_child")?;
        let signals = {
            let mut registry = self.inner.write();
            registry.link(parent, child)?;
            let affinity = registry.data(parent)?.affinity;
            if let Some(affinity) = affinity {
                registry.inherit_affinity(child, affinity);
            }
            registry.signals_to_root(parent)
        };
        tracing::debug!(target: targets::SCOPE, ?parent, ?child, "attached child scope");

        if self.is_active(parent)? {
            self.activate_subtree(child)?;
        } else {
            self.deactivate_subtree(child)?;
        }

        self.publish(parent, child, ChildChange::Attached, &signals);
        Ok(())
    }

    /// Detach `child` from `parent`, deactivating the child subtree first.
    #[track_caller]
    pub fn detach_child(&self, parent: ScopeId, child: ScopeId) -> ScopeResult<()> {
        self.enforce_affinity(parent, "detach_child")?;
        if self.parent(child)? != Some(parent) {
            return Err(ScopeError::NotAttached { parent, child });
        }

        self.deactivate_subtree(child)?;

        let signals = {
            let mut registry = self.inner.write();
            match registry.unlink(parent, child) {
                Ok(()) => registry.signals_to_root(parent),
                // A deactivation callback already detached it.
                Err(ScopeError::NotAttached { .. }) => return Ok(()),
                Err(err) => return Err(err),
            }
        };
        tracing::debug!(target: targets::SCOPE, ?parent, ?child, "detached child scope");

        self.publish(parent, child, ChildChange::Detached, &signals);
        Ok(())
    }

    fn publish(
        &self,
        scope: ScopeId,
        child: ScopeId,
        change: ChildChange,
        signals: &[Arc<Signal<ChildrenChanged>>],
    ) {
        let children = self.children(scope).unwrap_or_default();
        let event = ChildrenChanged {
            scope,
            child,
            change,
            children,
        };
        for signal in signals {
            signal.emit(event.clone());
        }
    }

    /// Tear a scope down: deactivate its subtree, detach it from its parent,
    /// orphan its children and remove it from the arena.
    pub fn release(&self, id: ScopeId) -> ScopeResult<()> {
        self.deactivate_subtree(id)?;

        let parent = self.parent(id)?;
        let parent_signals = parent.map(|p| self.inner.read().signals_to_root(p));

        self.inner.write().remove(id)?;

        if let (Some(parent), Some(signals)) = (parent, parent_signals) {
            tracing::debug!(target: targets::SCOPE, ?parent, child = ?id, "released attached scope");
            self.publish(parent, id, ChildChange::Detached, &signals);
        }
        Ok(())
    }

    // =========================================================================
    // Advanced Access
    // =========================================================================

    /// Access the registry with a read lock for complex operations.
    ///
    /// Do not call back into the shared registry from `f`.
    pub fn with_read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&ScopeRegistry) -> R,
    {
        f(&self.inner.read())
    }
}

impl Default for SharedScopeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

static GLOBAL_REGISTRY: OnceLock<SharedScopeRegistry> = OnceLock::new();

/// Get the process-wide scope registry, creating it on first use.
pub fn global_registry() -> &'static SharedScopeRegistry {
    GLOBAL_REGISTRY.get_or_init(SharedScopeRegistry::new)
}

/// Owning handle for one node of the scope tree.
///
/// Dropping the handle deactivates the node's subtree, detaches the node from
/// its parent, turns its children into (inactive) roots and removes the node.
///
/// All transitions of one tree must come from a single execution context;
/// see [`crate::thread_check`].
pub struct ScopeLifecycle {
    id: ScopeId,
}

impl Default for ScopeLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ScopeLifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeLifecycle")
            .field("id", &self.id)
            .field("name", &self.name())
            .field("active", &self.is_active())
            .finish()
    }
}

impl ScopeLifecycle {
    /// Create an unnamed, inactive scope.
    pub fn new() -> Self {
        Self::named("")
    }

    /// Create a named, inactive scope.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            id: global_registry().register(name),
        }
    }

    /// The scope's identifier.
    pub fn id(&self) -> ScopeId {
        self.id
    }

    /// The scope's name.
    pub fn name(&self) -> String {
        global_registry().name(self.id).unwrap_or_default()
    }

    /// Rename the scope.
    pub fn set_name(&self, name: impl Into<String>) {
        if let Err(err) = global_registry().set_name(self.id, name.into()) {
            tracing::warn!(target: targets::SCOPE, %err, "rename failed");
        }
    }

    /// Whether the scope is active.
    pub fn is_active(&self) -> bool {
        global_registry().is_active(self.id).unwrap_or(false)
    }

    /// Activate the scope and its attached descendants, top-down.
    ///
    /// A scope attached to an inactive parent, or gated by a view that is
    /// off screen, stays inactive.
    #[track_caller]
    pub fn activate(&self) {
        if let Err(err) = global_registry().activate(self.id) {
            tracing::warn!(target: targets::SCOPE, %err, "activate failed");
        }
    }

    /// Deactivate the scope's attached descendants and then the scope, bottom-up.
    #[track_caller]
    pub fn deactivate(&self) {
        if let Err(err) = global_registry().deactivate(self.id) {
            tracing::warn!(target: targets::SCOPE, %err, "deactivate failed");
        }
    }

    /// Attach a child scope.
    ///
    /// # Panics
    ///
    /// Panics if `child` already has a parent or if the attach would create a
    /// cycle. Both are composition bugs.
    #[track_caller]
    pub fn attach_child(&self, child: &ScopeLifecycle) {
        if let Err(err) = self.try_attach_child(child) {
            panic!("scope lifecycle contract violation: {err}");
        }
    }

    /// Attach a child scope, reporting contract violations as errors.
    #[track_caller]
    pub fn try_attach_child(&self, child: &ScopeLifecycle) -> ScopeResult<()> {
        global_registry().attach_child(self.id, child.id)
    }

    /// Detach a child scope. Does nothing if `child` is not attached here.
    #[track_caller]
    pub fn detach_child(&self, child: &ScopeLifecycle) {
        match self.try_detach_child(child) {
            Ok(()) => {}
            Err(err @ ScopeError::NotAttached { .. }) => {
                tracing::warn!(target: targets::SCOPE, %err, "ignoring detach of unattached scope");
            }
            Err(err) => tracing::warn!(target: targets::SCOPE, %err, "detach failed"),
        }
    }

    /// Detach a child scope, reporting an unattached child as an error.
    #[track_caller]
    pub fn try_detach_child(&self, child: &ScopeLifecycle) -> ScopeResult<()> {
        global_registry().detach_child(self.id, child.id)
    }

    /// The parent scope, if attached.
    pub fn parent(&self) -> Option<ScopeId> {
        global_registry().parent(self.id).ok().flatten()
    }

    /// Child scope ids in attachment order.
    pub fn children(&self) -> Vec<ScopeId> {
        global_registry().children(self.id).unwrap_or_default()
    }

    /// A handle to this scope's lifecycle owner.
    pub fn owner(&self) -> LifecycleOwner {
        global_registry()
            .owner(self.id)
            .unwrap_or_else(|_| LifecycleOwner::with_source(LifecycleSource::Scope(self.id)))
    }

    /// Subscribe to this scope's transitions.
    ///
    /// A subscriber added while the scope is active is told so immediately.
    pub fn subscribe<S: LifecycleSubscriber + 'static>(&self, subscriber: &Arc<S>) -> SubscriberId {
        self.owner().subscribe(subscriber)
    }

    /// Remove a subscription.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        self.owner().unsubscribe(id)
    }

    /// Whether `subscriber` is subscribed to this scope.
    pub fn is_subscribed<S: ?Sized>(&self, subscriber: &Arc<S>) -> bool {
        self.owner().is_subscribed(subscriber)
    }

    /// The stream of child-set changes in this scope's subtree.
    pub fn children_changed(&self) -> Arc<Signal<ChildrenChanged>> {
        global_registry()
            .children_changed(self.id)
            .unwrap_or_else(|_| Arc::new(Signal::new()))
    }

    /// Connect a slot to [`children_changed`](Self::children_changed).
    pub fn on_children_changed<F>(&self, slot: F) -> ConnectionId
    where
        F: Fn(&ChildrenChanged) + Send + Sync + 'static,
    {
        self.children_changed().connect(slot)
    }

    /// Bind a view into the tree for diagnostics. Does not keep it alive.
    pub fn set_view_lifecycle(&self, view: &ViewLifecycle) {
        if let Err(err) = global_registry().set_view(self.id, Some(view.downgrade())) {
            tracing::warn!(target: targets::SCOPE, %err, "binding view into tree failed");
        }
    }

    /// Remove the view bound into the tree at this scope.
    pub fn clear_view_lifecycle(&self) {
        if let Err(err) = global_registry().set_view(self.id, None) {
            tracing::warn!(target: targets::SCOPE, %err, "clearing view from tree failed");
        }
    }

    /// The view bound into the tree at this scope, if still alive.
    pub fn view_lifecycle(&self) -> Option<ViewLifecycle> {
        global_registry().view(self.id).ok().flatten()
    }
}

impl Drop for ScopeLifecycle {
    fn drop(&mut self) {
        if let Err(err) = global_registry().release(self.id) {
            tracing::warn!(target: targets::SCOPE, id = ?self.id, %err, "failed to release scope");
        }
    }
}

static_assertions::assert_impl_all!(ScopeLifecycle: Send, Sync);
static_assertions::assert_not_impl_any!(ScopeLifecycle: Clone);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::LifecycleContext;
    use parking_lot::Mutex;

    type Log = Arc<Mutex<Vec<String>>>;

    struct Tracker {
        name: String,
        log: Log,
    }

    impl LifecycleSubscriber for Tracker {
        fn did_become_active(&self, _: &LifecycleContext) {
            self.log.lock().push(format!("{}+", self.name));
        }

        fn did_become_inactive(&self, _: &LifecycleContext) {
            self.log.lock().push(format!("{}-", self.name));
        }
    }

    fn tracker(scope: &ScopeLifecycle, log: &Log) -> Arc<Tracker> {
        let tracker = Arc::new(Tracker {
            name: scope.name(),
            log: log.clone(),
        });
        scope.subscribe(&tracker);
        tracker
    }

    #[test]
    fn test_activation_reaches_every_descendant() {
        let root = ScopeLifecycle::named("root");
        let a = ScopeLifecycle::named("a");
        let b = ScopeLifecycle::named("b");
        let c = ScopeLifecycle::named("c");
        root.attach_child(&a);
        root.attach_child(&b);
        a.attach_child(&c);

        root.activate();
        assert!(root.is_active());
        assert!(a.is_active());
        assert!(b.is_active());
        assert!(c.is_active());
    }

    #[test]
    fn test_activation_is_top_down_deactivation_bottom_up() {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let root = ScopeLifecycle::named("root");
        let a = ScopeLifecycle::named("a");
        let b = ScopeLifecycle::named("b");
        let c = ScopeLifecycle::named("c");
        root.attach_child(&a);
        root.attach_child(&b);
        a.attach_child(&c);
        let _trackers = [tracker(&root, &log), tracker(&a, &log), tracker(&b, &log), tracker(&c, &log)];

        root.activate();
        root.deactivate();

        assert_eq!(
            *log.lock(),
            vec!["root+", "a+", "c+", "b+", "c-", "a-", "b-", "root-"]
        );
        assert!(!c.is_active());
    }

    #[test]
    fn test_activate_twice_notifies_once() {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let root = ScopeLifecycle::named("root");
        let child = ScopeLifecycle::named("child");
        root.attach_child(&child);
        let _trackers = [tracker(&root, &log), tracker(&child, &log)];

        root.activate();
        root.activate();

        assert_eq!(*log.lock(), vec!["root+", "child+"]);
    }

    #[test]
    fn test_attach_while_active_activates_subtree() {
        let root = ScopeLifecycle::named("root");
        root.activate();

        let child = ScopeLifecycle::named("child");
        let grandchild = ScopeLifecycle::named("grandchild");
        child.attach_child(&grandchild);
        assert!(!grandchild.is_active());

        root.attach_child(&child);
        assert!(child.is_active());
        assert!(grandchild.is_active());
    }

    #[test]
    fn test_attach_active_child_to_inactive_parent_deactivates_it() {
        let root = ScopeLifecycle::named("root");
        let child = ScopeLifecycle::named("child");
        child.activate();

        root.attach_child(&child);
        assert!(!child.is_active());
    }

    #[test]
    fn test_activating_child_of_inactive_parent_does_nothing() {
        let log = Log::default();
        let root = ScopeLifecycle::named("root");
        let child = ScopeLifecycle::named("child");
        let grandchild = ScopeLifecycle::named("grandchild");
        root.attach_child(&child);
        child.attach_child(&grandchild);
        let _trackers = [tracker(&child, &log), tracker(&grandchild, &log)];

        child.activate();
        assert!(!root.is_active());
        assert!(!child.is_active());
        assert!(!grandchild.is_active());
        assert!(log.lock().is_empty());

        root.activate();
        assert!(child.is_active());
        root.deactivate();
        child.activate();
        assert!(!child.is_active());
        assert_eq!(*log.lock(), vec!["child+", "grandchild+", "grandchild-", "child-"]);
    }

    #[test]
    fn test_gated_scope_waits_for_its_view() {
        let root = ScopeLifecycle::named("root");
        let screen = ScopeLifecycle::named("screen");
        let worker = ScopeLifecycle::named("worker");
        screen.attach_child(&worker);
        let view = ViewLifecycle::named("screen");
        view.bind(&screen);
        assert!(global_registry().gate(screen.id()).unwrap().is_some());

        root.activate();
        root.attach_child(&screen);
        assert!(!screen.is_active());
        assert!(!worker.is_active());

        view.did_load();
        view.did_appear();
        assert!(screen.is_active());
        assert!(worker.is_active());

        root.deactivate();
        assert!(!screen.is_active());
        root.activate();
        assert!(screen.is_active());

        view.did_disappear();
        assert!(!worker.is_active());
        root.deactivate();
        root.activate();
        assert!(!screen.is_active());

        view.unbind();
        assert!(global_registry().gate(screen.id()).unwrap().is_none());
    }

    #[test]
    fn test_rename_and_view_link() {
        let scope = ScopeLifecycle::named("before");
        scope.set_name("after");
        assert_eq!(scope.name(), "after");

        let view = ViewLifecycle::named("after");
        scope.set_view_lifecycle(&view);
        assert!(scope.view_lifecycle().is_some_and(|v| v.ptr_eq(&view)));
        scope.clear_view_lifecycle();
        assert!(scope.view_lifecycle().is_none());

        let stale = ScopeLifecycle::named("stale");
        let stale_id = stale.id();
        drop(stale);
        let registry = global_registry();
        assert_eq!(
            registry.set_name(stale_id, "ghost".to_string()),
            Err(ScopeError::InvalidScopeId(stale_id))
        );
        assert_eq!(
            registry.set_view(stale_id, Some(view.downgrade())),
            Err(ScopeError::InvalidScopeId(stale_id))
        );
    }

    #[test]
    fn test_dropped_gate_view_holds_scope_back() {
        let screen = ScopeLifecycle::named("screen");
        let view = ViewLifecycle::named("screen");
        view.bind(&screen);
        drop(view);

        screen.activate();
        assert!(!screen.is_active());
    }

    #[test]
    #[should_panic(expected = "contract violation")]
    fn test_attach_already_attached_panics() {
        let first = ScopeLifecycle::named("first");
        let second = ScopeLifecycle::named("second");
        let child = ScopeLifecycle::named("child");
        first.attach_child(&child);
        second.attach_child(&child);
    }

    #[test]
    fn test_try_attach_reports_violations() {
        let first = ScopeLifecycle::named("first");
        let second = ScopeLifecycle::named("second");
        let child = ScopeLifecycle::named("child");
        first.attach_child(&child);

        assert_eq!(
            second.try_attach_child(&child),
            Err(ScopeError::AlreadyAttached {
                child: child.id(),
                parent: first.id(),
            })
        );
        assert_eq!(
            child.try_attach_child(&first),
            Err(ScopeError::CircularAttachment {
                parent: child.id(),
                child: first.id(),
            })
        );
        assert!(matches!(
            first.try_attach_child(&first),
            Err(ScopeError::CircularAttachment { .. })
        ));
    }

    #[test]
    fn test_detach_deactivates_subtree_then_unlinks() {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let root = ScopeLifecycle::named("root");
        let child = ScopeLifecycle::named("child");
        let grandchild = ScopeLifecycle::named("grandchild");
        root.attach_child(&child);
        child.attach_child(&grandchild);
        root.activate();
        let _trackers = [tracker(&child, &log), tracker(&grandchild, &log)];
        log.lock().clear();

        root.detach_child(&child);

        assert_eq!(*log.lock(), vec!["grandchild-", "child-"]);
        assert!(root.is_active());
        assert_eq!(child.parent(), None);
        assert!(root.children().is_empty());
        // The detached subtree keeps its own structure.
        assert_eq!(child.children(), vec![grandchild.id()]);
    }

    #[test]
    fn test_detach_unattached_is_noop() {
        let root = ScopeLifecycle::named("root");
        let stranger = ScopeLifecycle::named("stranger");
        stranger.activate();

        root.detach_child(&stranger);
        assert!(stranger.is_active());
        assert_eq!(
            root.try_detach_child(&stranger),
            Err(ScopeError::NotAttached {
                parent: root.id(),
                child: stranger.id(),
            })
        );
    }

    #[test]
    fn test_children_changed_bubbles_to_root() {
        let root = ScopeLifecycle::named("root");
        let child = ScopeLifecycle::named("child");
        let grandchild = ScopeLifecycle::named("grandchild");
        root.attach_child(&child);

        let events = Arc::new(Mutex::new(Vec::new()));
        let events_clone = events.clone();
        root.on_children_changed(move |event| events_clone.lock().push(event.clone()));

        child.attach_child(&grandchild);
        child.detach_child(&grandchild);

        let events = events.lock();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].scope, child.id());
        assert_eq!(events[0].child, grandchild.id());
        assert_eq!(events[0].change, ChildChange::Attached);
        assert_eq!(events[0].children, vec![grandchild.id()]);
        assert_eq!(events[1].change, ChildChange::Detached);
        assert!(events[1].children.is_empty());
    }

    #[test]
    fn test_dropping_attached_scope_detaches_it() {
        let root = ScopeLifecycle::named("root");
        let rx = root.children_changed().subscribe_channel();
        let child = ScopeLifecycle::named("child");
        let grandchild = ScopeLifecycle::named("grandchild");
        root.attach_child(&child);
        child.attach_child(&grandchild);
        root.activate();

        let child_id = child.id();
        drop(child);

        assert!(root.children().is_empty());
        assert!(!global_registry().contains(child_id));
        assert_eq!(grandchild.parent(), None);
        assert!(!grandchild.is_active());

        let changes: Vec<_> = rx
            .try_iter()
            .filter(|e| e.scope == root.id())
            .map(|e| (e.child, e.change))
            .collect();
        assert_eq!(
            changes,
            vec![
                (child_id, ChildChange::Attached),
                (child_id, ChildChange::Detached),
            ]
        );
    }

    #[test]
    fn test_callback_may_attach_during_activation() {
        struct Attacher {
            parent: ScopeId,
            child: ScopeId,
        }
        impl LifecycleSubscriber for Attacher {
            fn did_become_active(&self, _: &LifecycleContext) {
                global_registry()
                    .attach_child(self.parent, self.child)
                    .expect("attach from callback");
            }
        }

        let root = ScopeLifecycle::named("root");
        let late = ScopeLifecycle::named("late");
        let attacher = Arc::new(Attacher {
            parent: root.id(),
            child: late.id(),
        });
        root.subscribe(&attacher);

        root.activate();
        assert!(late.is_active());
        assert_eq!(root.children(), vec![late.id()]);
    }

    #[test]
    fn test_traversal_orders() {
        let root = ScopeLifecycle::named("root");
        let a = ScopeLifecycle::named("a");
        let b = ScopeLifecycle::named("b");
        let c = ScopeLifecycle::named("c");
        root.attach_child(&a);
        root.attach_child(&b);
        a.attach_child(&c);

        let registry = global_registry();
        assert_eq!(
            registry.depth_first_preorder(root.id()).unwrap(),
            vec![root.id(), a.id(), c.id(), b.id()]
        );
        assert_eq!(
            registry.depth_first_postorder(root.id()).unwrap(),
            vec![c.id(), a.id(), b.id(), root.id()]
        );
        assert_eq!(registry.ancestors(c.id()).unwrap(), vec![a.id(), root.id()]);
    }

    #[test]
    fn test_dump_scope_tree() {
        let root = ScopeLifecycle::named("dump_root");
        let child = ScopeLifecycle::named("dump_child");
        root.attach_child(&child);
        root.activate();

        let dump = global_registry().dump_scope_tree(root.id()).unwrap();
        assert!(dump.contains("dump_root (active)"));
        assert!(dump.contains("  ["));
        assert!(dump.contains("dump_child (active)"));
    }

    #[test]
    fn test_foreign_thread_transition_is_rejected() {
        if !are_thread_checks_enabled() {
            return;
        }
        let scope = Arc::new(ScopeLifecycle::named("pinned"));
        scope.activate();

        let remote = scope.clone();
        let result = std::thread::spawn(move || remote.deactivate()).join();
        assert!(result.is_err());
        assert!(scope.is_active());
    }
}
