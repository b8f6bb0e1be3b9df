//! Tests for Stack
//!
//! These tests verify:
//! - LIFO ordering
//! - Peek, peek by offset, peek by ID
//! - Updates and their bounds checks
//! - Empty / out-of-range errors
//! - Close, reopen, drop, type safety and recovery

use std::fs;

use atlasq::{AtlasQError, Collection, CollectionKind, Payload, Queue, Stack};
use serde::{Deserialize, Serialize};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_stack() -> (TempDir, Stack) {
    let temp_dir = TempDir::new().unwrap();
    let stack = Stack::open(temp_dir.path().join("stack")).unwrap();
    (temp_dir, stack)
}

fn fill(stack: &Stack, count: u64) {
    for i in 1..=count {
        stack.push_str(&format!("value for item {}", i)).unwrap();
    }
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct Frame {
    depth: u32,
    label: String,
}

// =============================================================================
// Basic Operations Tests
// =============================================================================

#[test]
fn test_push_assigns_increasing_ids() {
    let (_temp, stack) = setup_temp_stack();

    for i in 1..=10 {
        let item = stack.push_str(&format!("value for item {}", i)).unwrap();
        assert_eq!(item.id, i);
    }
    assert_eq!(stack.len(), 10);
}

#[test]
fn test_pop_is_lifo() {
    let (_temp, stack) = setup_temp_stack();
    fill(&stack, 10);

    let item = stack.pop().unwrap();
    assert_eq!(item.id, 10);
    assert_eq!(item.as_str().unwrap(), "value for item 10");
    assert_eq!(stack.len(), 9);

    for i in (1..=9).rev() {
        assert_eq!(stack.pop().unwrap().id, i);
    }
    assert!(stack.is_empty());
}

#[test]
fn test_peek() {
    let (_temp, stack) = setup_temp_stack();
    fill(&stack, 10);

    assert_eq!(stack.peek().unwrap().as_str().unwrap(), "value for item 10");
    assert_eq!(stack.len(), 10);
}

#[test]
fn test_peek_by_offset() {
    let (_temp, stack) = setup_temp_stack();
    fill(&stack, 10);

    assert_eq!(stack.peek_by_offset(0).unwrap().as_str().unwrap(), "value for item 10");
    assert_eq!(stack.peek_by_offset(9).unwrap().as_str().unwrap(), "value for item 1");
    assert_eq!(stack.peek_by_offset(3).unwrap().as_str().unwrap(), "value for item 7");
    assert_eq!(stack.len(), 10);
}

#[test]
fn test_peek_by_id() {
    let (_temp, stack) = setup_temp_stack();
    fill(&stack, 10);

    assert_eq!(stack.peek_by_id(3).unwrap().as_str().unwrap(), "value for item 3");
}

// =============================================================================
// Update Tests
// =============================================================================

#[test]
fn test_update_variants() {
    let (_temp, stack) = setup_temp_stack();
    fill(&stack, 10);

    stack.update(3, b"new value").unwrap();
    assert_eq!(stack.peek_by_id(3).unwrap().value, b"new value");

    stack.update_str(4, "new string").unwrap();
    assert_eq!(stack.peek_by_id(4).unwrap().as_str().unwrap(), "new string");

    let frame = Frame {
        depth: 3,
        label: "main".to_string(),
    };
    stack.update_object(5, &frame).unwrap();
    assert_eq!(stack.peek_by_id(5).unwrap().to_object::<Frame>().unwrap(), frame);

    stack.push_object_as_json(&frame).unwrap();
    assert_eq!(stack.pop().unwrap().to_object_from_json::<Frame>().unwrap(), frame);
}

#[test]
fn test_update_out_of_bounds() {
    let (_temp, stack) = setup_temp_stack();
    fill(&stack, 10);

    let popped = stack.pop().unwrap();
    assert!(matches!(
        stack.update(popped.id, b"new value"),
        Err(AtlasQError::OutOfRange)
    ));
    stack.update(popped.id - 1, b"new value").unwrap();
}

// =============================================================================
// Error Tests
// =============================================================================

#[test]
fn test_empty_stack() {
    let (_temp, stack) = setup_temp_stack();
    fill(&stack, 1);
    stack.pop().unwrap();

    assert!(matches!(stack.pop(), Err(AtlasQError::Empty)));
    assert!(matches!(stack.peek(), Err(AtlasQError::Empty)));
    assert!(matches!(stack.peek_by_offset(0), Err(AtlasQError::Empty)));
}

#[test]
fn test_out_of_range() {
    let (_temp, stack) = setup_temp_stack();
    fill(&stack, 10);
    stack.pop().unwrap();

    assert!(matches!(stack.peek_by_id(10), Err(AtlasQError::OutOfRange)));
    assert!(matches!(stack.peek_by_id(0), Err(AtlasQError::OutOfRange)));
    assert!(matches!(stack.peek_by_offset(9), Err(AtlasQError::OutOfRange)));
    assert!(matches!(stack.peek_by_offset(u64::MAX), Err(AtlasQError::OutOfRange)));
}

// =============================================================================
// Lifecycle Tests
// =============================================================================

#[test]
fn test_close_and_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("stack");

    let stack = Stack::open(&path).unwrap();
    fill(&stack, 10);
    stack.pop().unwrap();
    stack.close().unwrap();

    assert_eq!(stack.len(), 0);
    assert!(matches!(stack.push_str("x"), Err(AtlasQError::Closed)));
    assert!(matches!(stack.pop(), Err(AtlasQError::Closed)));

    let stack = Stack::open(&path).unwrap();
    assert_eq!(stack.len(), 9);
    assert_eq!(stack.peek().unwrap().as_str().unwrap(), "value for item 9");
    assert_eq!(stack.push_str("again").unwrap().id, 10);
}

#[test]
fn test_drop_through_collection_trait() {
    let (temp_dir, stack) = setup_temp_stack();
    fill(&stack, 2);

    let handle: &dyn Collection = &stack;
    assert_eq!(handle.kind(), CollectionKind::Stack);
    assert_eq!(handle.len(), 2);

    handle.drop().unwrap();
    assert!(!handle.is_open());
    assert!(!temp_dir.path().join("stack").exists());
}

#[test]
fn test_incompatible_type() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("queue");

    Queue::open(&path).unwrap().close().unwrap();

    match Stack::open(&path) {
        Err(AtlasQError::IncompatibleType { expected, found }) => {
            assert_eq!(expected, CollectionKind::Stack);
            assert_eq!(found, CollectionKind::Queue);
        }
        Err(e) => panic!("expected IncompatibleType, got {}", e),
        Ok(_) => panic!("expected IncompatibleType"),
    }
}

#[test]
fn test_recover() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("stack");

    let stack = Stack::open(&path).unwrap();
    fill(&stack, 3);
    stack.close().unwrap();

    fs::remove_file(path.join("MANIFEST")).unwrap();
    assert!(matches!(Stack::open(&path), Err(ref e) if e.is_corrupted()));

    let stack = Stack::recover(&path).unwrap();
    assert_eq!(stack.pop().unwrap().as_str().unwrap(), "value for item 3");
}
