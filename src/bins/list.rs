//! Intrusive doubly linked lists over arena handles
//!
//! Each bucket embeds its own [`Links`], so linking and unlinking a child is
//! O(1) given its handle and no separate container is allocated. New
//! children are linked at the head.
//!
//! [`Bucket`] pairs a live list with a pending-insert list. Traversal only
//! ever walks the live list; pending children are spliced in by
//! [`Bucket::commit`] during the once-per-frame update pass.

use super::arena::{Arena, Handle};

/// Lifecycle of a bucket node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    /// Queued on its parent, invisible to traversal
    Pending,
    /// Linked into its parent and visible to traversal and matching
    Live,
    /// Unlinked and released; the handle no longer resolves
    Removed,
}

/// Previous/next links embedded in a list member
#[derive(Debug)]
pub struct Links<T> {
    prev: Option<Handle<T>>,
    next: Option<Handle<T>>,
}

impl<T> Default for Links<T> {
    fn default() -> Self {
        Self {
            prev: None,
            next: None,
        }
    }
}

/// Implemented by every bucket type that lives in a list
pub trait Linked: Sized {
    fn links(&self) -> &Links<Self>;
    fn links_mut(&mut self) -> &mut Links<Self>;
    fn state(&self) -> NodeState;
    fn set_state(&mut self, state: NodeState);
}

/// Implement [`Linked`] for a type with `links` and `state` fields
macro_rules! impl_linked {
    ($ty:ty) => {
        impl $crate::bins::list::Linked for $ty {
            fn links(&self) -> &$crate::bins::list::Links<Self> {
                &self.links
            }

            fn links_mut(&mut self) -> &mut $crate::bins::list::Links<Self> {
                &mut self.links
            }

            fn state(&self) -> $crate::bins::list::NodeState {
                self.state
            }

            fn set_state(&mut self, state: $crate::bins::list::NodeState) {
                self.state = state;
            }
        }
    };
}

pub(crate) use impl_linked;

/// Head of an intrusive list whose members live in an [`Arena`]
#[derive(Debug)]
pub struct List<T> {
    head: Option<Handle<T>>,
    len: usize,
}

impl<T> Default for List<T> {
    fn default() -> Self {
        Self { head: None, len: 0 }
    }
}

impl<T: Linked> List<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    pub fn head(&self) -> Option<Handle<T>> {
        self.head
    }

    pub fn push_front(&mut self, arena: &mut Arena<T>, handle: Handle<T>) {
        let old_head = self.head;
        let Some(node) = arena.get_mut(handle) else {
            return;
        };
        let links = node.links_mut();
        links.prev = None;
        links.next = old_head;
        if let Some(old) = old_head.and_then(|h| arena.get_mut(h)) {
            old.links_mut().prev = Some(handle);
        }
        self.head = Some(handle);
        self.len += 1;
    }

    /// Unlink `handle`. The caller guarantees it is a member of this list.
    pub fn unlink(&mut self, arena: &mut Arena<T>, handle: Handle<T>) {
        let Some(node) = arena.get_mut(handle) else {
            return;
        };
        let links = node.links_mut();
        let prev = links.prev.take();
        let next = links.next.take();

        match prev {
            Some(p) => {
                if let Some(prev_node) = arena.get_mut(p) {
                    prev_node.links_mut().next = next;
                }
            }
            None => {
                debug_assert_eq!(self.head, Some(handle), "unlinking a node from a foreign list");
                self.head = next;
            }
        }
        if let Some(next_node) = next.and_then(|n| arena.get_mut(n)) {
            next_node.links_mut().prev = prev;
        }
        self.len = self.len.saturating_sub(1);
    }

    pub fn iter<'a>(&self, arena: &'a Arena<T>) -> ListIter<'a, T> {
        ListIter {
            arena,
            next: self.head,
        }
    }

    pub fn handles(&self, arena: &Arena<T>) -> Vec<Handle<T>> {
        self.iter(arena).map(|(handle, _)| handle).collect()
    }
}

pub struct ListIter<'a, T> {
    arena: &'a Arena<T>,
    next: Option<Handle<T>>,
}

impl<'a, T: Linked> Iterator for ListIter<'a, T> {
    type Item = (Handle<T>, &'a T);

    fn next(&mut self) -> Option<Self::Item> {
        let handle = self.next?;
        let node = self.arena.get(handle)?;
        self.next = node.links().next;
        Some((handle, node))
    }
}

/// Children of one bucket: the live list plus the pending-insert list.
#[derive(Debug)]
pub struct Bucket<T> {
    live: List<T>,
    pending: Vec<Handle<T>>,
}

impl<T> Default for Bucket<T> {
    fn default() -> Self {
        Self {
            live: List::default(),
            pending: Vec::new(),
        }
    }
}

impl<T: Linked> Bucket<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a freshly created child. It stays invisible to traversal until
    /// the next [`commit`](Self::commit).
    pub fn stage(&mut self, arena: &mut Arena<T>, handle: Handle<T>) {
        if let Some(node) = arena.get_mut(handle) {
            node.set_state(NodeState::Pending);
            self.pending.push(handle);
        }
    }

    /// Splice every pending child into the live list. Returns how many were
    /// linked.
    pub fn commit(&mut self, arena: &mut Arena<T>) -> usize {
        let mut linked = 0;
        for handle in std::mem::take(&mut self.pending) {
            let pending = matches!(
                arena.get(handle).map(|n| n.state()),
                Some(NodeState::Pending)
            );
            if !pending {
                continue;
            }
            self.live.push_front(arena, handle);
            if let Some(node) = arena.get_mut(handle) {
                node.set_state(NodeState::Live);
            }
            linked += 1;
        }
        linked
    }

    /// Detach a child from whichever list holds it. The node stays in the
    /// arena, marked [`NodeState::Removed`].
    pub fn detach(&mut self, arena: &mut Arena<T>, handle: Handle<T>) {
        let Some(state) = arena.get(handle).map(|n| n.state()) else {
            return;
        };
        match state {
            NodeState::Pending => self.pending.retain(|h| *h != handle),
            NodeState::Live => self.live.unlink(arena, handle),
            NodeState::Removed => {}
        }
        if let Some(node) = arena.get_mut(handle) {
            node.set_state(NodeState::Removed);
        }
    }

    pub fn live(&self) -> &List<T> {
        &self.live
    }

    pub fn pending(&self) -> &[Handle<T>] {
        &self.pending
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// No live and no pending children
    pub fn is_empty(&self) -> bool {
        self.live.is_empty() && self.pending.is_empty()
    }

    /// Live children followed by pending ones
    pub fn all_handles(&self, arena: &Arena<T>) -> Vec<Handle<T>> {
        let mut handles = self.live.handles(arena);
        handles.extend_from_slice(&self.pending);
        handles
    }

    /// Live children followed by pending ones, resolved
    pub fn iter_all<'a>(&'a self, arena: &'a Arena<T>) -> impl Iterator<Item = (Handle<T>, &'a T)> {
        self.live.iter(arena).chain(
            self.pending
                .iter()
                .filter_map(move |h| arena.get(*h).map(|node| (*h, node))),
        )
    }

    pub fn iter_live<'a>(&self, arena: &'a Arena<T>) -> ListIter<'a, T> {
        self.live.iter(arena)
    }
}
