//! Singly and doubly linked native lists
//!
//! A null head is the empty list. Lists grow by prepending; converters
//! walk the host sequence backwards so the final order matches it.

use super::slot::Argument;
use super::tally::{record_alloc, record_free, HeapKind};
use std::marker::PhantomData;
use std::ptr;

/// Node of a singly linked list
#[derive(Debug)]
pub struct SListNode {
    pub data: Argument,
    pub next: *mut SListNode,
}

/// Node of a doubly linked list
#[derive(Debug)]
pub struct ListNode {
    pub data: Argument,
    pub next: *mut ListNode,
    pub prev: *mut ListNode,
}

/// Operations shared by both list flavors
pub trait Node: Sized {
    const KIND: HeapKind;

    fn data(&self) -> &Argument;
    fn data_mut(&mut self) -> &mut Argument;
    fn next(&self) -> *mut Self;

    /// Link a new node holding `data` in front of `list`
    ///
    /// # Safety
    /// `list` must be null or the head of a valid list.
    unsafe fn prepend(list: *mut Self, data: Argument) -> *mut Self;
}

impl Node for SListNode {
    const KIND: HeapKind = HeapKind::SListNode;

    #[inline]
    fn data(&self) -> &Argument {
        &self.data
    }

    #[inline]
    fn data_mut(&mut self) -> &mut Argument {
        &mut self.data
    }

    #[inline]
    fn next(&self) -> *mut Self {
        self.next
    }

    unsafe fn prepend(list: *mut Self, data: Argument) -> *mut Self {
        record_alloc(Self::KIND);
        Box::into_raw(Box::new(SListNode { data, next: list }))
    }
}

impl Node for ListNode {
    const KIND: HeapKind = HeapKind::ListNode;

    #[inline]
    fn data(&self) -> &Argument {
        &self.data
    }

    #[inline]
    fn data_mut(&mut self) -> &mut Argument {
        &mut self.data
    }

    #[inline]
    fn next(&self) -> *mut Self {
        self.next
    }

    unsafe fn prepend(list: *mut Self, data: Argument) -> *mut Self {
        record_alloc(Self::KIND);
        let node = Box::into_raw(Box::new(ListNode {
            data,
            next: list,
            prev: ptr::null_mut(),
        }));
        if !list.is_null() {
            (*list).prev = node;
        }
        node
    }
}

/// Free every node; the data they hold is left untouched
///
/// # Safety
/// `list` must be null or the head of a list built with `Node::prepend`.
pub unsafe fn free<N: Node>(list: *mut N) {
    let mut node = list;
    while !node.is_null() {
        let next = (*node).next();
        drop(Box::from_raw(node));
        record_free(N::KIND);
        node = next;
    }
}

/// Number of nodes
///
/// # Safety
/// `list` must be null or the head of a valid list.
pub unsafe fn len<N: Node>(list: *const N) -> usize {
    iter(list).count()
}

/// Iterate the data of each node in order
///
/// # Safety
/// `list` must be null or the head of a valid list that outlives `'a`.
pub unsafe fn iter<'a, N: Node>(list: *const N) -> Nodes<'a, N> {
    Nodes {
        node: list,
        _marker: PhantomData,
    }
}

/// Mutable walk over node data
///
/// # Safety
/// Same as `iter`, and no other reference to the nodes may be live.
pub unsafe fn for_each_mut<N: Node>(list: *mut N, mut f: impl FnMut(&mut Argument)) {
    let mut node = list;
    while !node.is_null() {
        f((*node).data_mut());
        node = (*node).next();
    }
}

pub struct Nodes<'a, N: Node> {
    node: *const N,
    _marker: PhantomData<&'a N>,
}

impl<'a, N: Node + 'a> Iterator for Nodes<'a, N> {
    type Item = &'a Argument;

    fn next(&mut self) -> Option<Self::Item> {
        if self.node.is_null() {
            return None;
        }
        // Safety: guaranteed by the constructor's contract
        let node = unsafe { &*self.node };
        self.node = node.next();
        Some(node.data())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::tally;

    #[test]
    fn test_prepend_order() {
        unsafe {
            let mut list: *mut SListNode = ptr::null_mut();
            for v in [3, 2, 1] {
                list = SListNode::prepend(list, Argument::Int32(v));
            }
            let values: Vec<_> = iter(list).copied().collect();
            assert_eq!(
                values,
                vec![Argument::Int32(1), Argument::Int32(2), Argument::Int32(3)]
            );
            free(list);
        }
    }

    #[test]
    fn test_doubly_linked_back_pointers() {
        unsafe {
            let mut list: *mut ListNode = ptr::null_mut();
            list = ListNode::prepend(list, Argument::Int8(2));
            list = ListNode::prepend(list, Argument::Int8(1));
            let second = (*list).next;
            assert_eq!((*second).prev, list);
            assert!((*list).prev.is_null());
            assert_eq!(len(list), 2);
            free(list);
        }
    }

    #[test]
    fn test_free_tallies_every_node() {
        let before = tally::snapshot();
        unsafe {
            let mut list: *mut ListNode = ptr::null_mut();
            for v in 0..4 {
                list = ListNode::prepend(list, Argument::Int32(v));
            }
            free(list);
        }
        let delta = tally::snapshot().since(&before);
        assert_eq!(delta.allocated(HeapKind::ListNode), 4);
        assert_eq!(delta.freed(HeapKind::ListNode), 4);
    }
}
