//! Integration tests for the growable instance store.
//!
//! # Test Categories
//!
//! - **Growth**: capacity sequence, monotonicity, no growth when records fit
//! - **Round trip**: records survive every reallocation
//! - **Swap-delete**: last record moves into the hole, out-of-range is a no-op
//! - **Failure**: allocation failure leaves the store intact

mod common;

use rstest::rstest;

use common::{TestContext, every_kind_layout, offset_layout, record, transform_layout};
use glcore_graphics::resources::next_capacity;
use glcore_graphics::{GraphicsError, InstanceBuffer, Layout};

// ============================================================================
// Growth
// ============================================================================

#[test]
fn test_first_and_second_allocation() {
    let ctx = TestContext::new();
    let mut instances = ctx.instances(offset_layout());

    instances.add(&record(12, 0)).unwrap();
    assert_eq!(instances.capacity(), 12);
    assert_eq!(instances.count(), 1);

    instances.add(&record(12, 1)).unwrap();
    assert_eq!(instances.capacity(), 12 * 32);
    assert_eq!(instances.count(), 2);
}

#[rstest]
#[case::offset(offset_layout())]
#[case::transform(transform_layout())]
#[case::every_kind(every_kind_layout())]
fn test_capacity_never_shrinks_or_stalls(#[case] layout: Layout) {
    let ctx = TestContext::new();
    let stride = layout.stride() as usize;
    let mut instances = ctx.instances(layout);

    let mut previous = instances.capacity();
    for i in 0..200 {
        instances.add(&record(stride, i)).unwrap();
        let capacity = instances.capacity();
        assert!(capacity >= previous);
        assert!(instances.count() as u64 * stride as u64 <= capacity);
        previous = capacity;
    }
}

#[rstest]
#[case(12)]
#[case(80)]
#[case(156)]
fn test_next_capacity_grows(#[case] stride: u64) {
    let mut capacity = 0;
    for _ in 0..24 {
        let next = next_capacity(stride, capacity);
        assert!(next > capacity);
        capacity = next;
    }
}

#[test]
fn test_add_within_capacity_keeps_capacity() {
    let ctx = TestContext::new();
    let mut instances = ctx.instances(offset_layout());
    instances.add(&record(12, 0)).unwrap();
    instances.add(&record(12, 1)).unwrap();
    let capacity = instances.capacity();
    let generation = instances.generation();

    for i in 2..32 {
        instances.add(&record(12, i)).unwrap();
        assert_eq!(instances.capacity(), capacity);
    }
    assert_eq!(instances.generation(), generation);

    instances.add(&record(12, 32)).unwrap();
    assert_eq!(instances.capacity(), next_capacity(12, capacity));
}

#[test]
fn test_reallocation_releases_old_buffer() {
    let ctx = TestContext::new();
    let mut instances = ctx.instances(offset_layout());
    for i in 0..40 {
        instances.add(&record(12, i)).unwrap();
    }

    assert_eq!(instances.generation(), 3);
    assert_eq!(ctx.backend.live_buffer_count(), 1);
    assert_eq!(ctx.device.buffer_count(), 1);
    assert_eq!(ctx.device.allocated_bytes(), instances.capacity());
    assert_eq!(ctx.backend.stats().copies, 2);
}

// ============================================================================
// Round trip
// ============================================================================

#[rstest]
#[case::offset(offset_layout(), 100)]
#[case::transform(transform_layout(), 70)]
#[case::every_kind(every_kind_layout(), 40)]
fn test_records_survive_reallocation(#[case] layout: Layout, #[case] n: usize) {
    let ctx = TestContext::new();
    let stride = layout.stride() as usize;
    let mut instances = ctx.instances(layout);

    for i in 0..n {
        instances.add(&record(stride, i)).unwrap();
    }

    for i in 0..n {
        assert_eq!(instances.read_instance(i).unwrap(), record(stride, i));
    }
    let all = instances.read_all().unwrap();
    assert_eq!(all.len(), n * stride);
    assert_eq!(&all[..stride], record(stride, 0).as_slice());
}

#[test]
fn test_initial_records_then_growth() {
    let ctx = TestContext::new();
    let initial: Vec<u8> = (0..5).flat_map(|i| record(12, i)).collect();
    let mut instances = InstanceBuffer::new(&ctx.device, offset_layout(), &initial).unwrap();
    assert_eq!(instances.count(), 5);
    assert_eq!(instances.capacity(), 60);

    instances.add(&record(12, 5)).unwrap();
    assert_eq!(instances.capacity(), next_capacity(12, 60));
    for i in 0..6 {
        assert_eq!(instances.read_instance(i).unwrap(), record(12, i));
    }
}

#[test]
fn test_update_overwrites_one_record() {
    let ctx = TestContext::new();
    let mut instances = ctx.instances(offset_layout());
    for i in 0..3 {
        instances.add(&record(12, i)).unwrap();
    }
    let capacity = instances.capacity();

    instances.update(1, &record(12, 99)).unwrap();
    assert_eq!(instances.read_instance(0).unwrap(), record(12, 0));
    assert_eq!(instances.read_instance(1).unwrap(), record(12, 99));
    assert_eq!(instances.read_instance(2).unwrap(), record(12, 2));
    assert_eq!(instances.capacity(), capacity);
}

#[test]
fn test_typed_view_after_growth() {
    let ctx = TestContext::new();
    let mut instances = ctx.instances(offset_layout());
    for i in 0..50 {
        let v = i as f32;
        instances.add_record(&[v, v * 2.0, v * 3.0]).unwrap();
    }

    let sum = instances
        .view::<[f32; 3], _>(|records| records.iter().map(|r| r[1]).sum::<f32>())
        .unwrap();
    assert_eq!(sum, 2.0 * (0..50).sum::<i32>() as f32);
}

// ============================================================================
// Swap-delete
// ============================================================================

#[test]
fn test_delete_moves_last_into_hole() {
    let ctx = TestContext::new();
    let mut instances = ctx.instances(offset_layout());
    for i in 0..5 {
        instances.add(&record(12, i)).unwrap();
    }

    assert_eq!(instances.delete(1).unwrap(), 1);
    assert_eq!(instances.count(), 4);
    assert_eq!(instances.read_instance(1).unwrap(), record(12, 4));
    assert_eq!(instances.read_instance(0).unwrap(), record(12, 0));
    assert_eq!(instances.read_instance(2).unwrap(), record(12, 2));
    assert_eq!(instances.read_instance(3).unwrap(), record(12, 3));
}

#[rstest]
#[case(0)]
#[case(3)]
#[case(6)]
#[case(7)]
fn test_delete_keeps_live_set(#[case] k: usize) {
    let ctx = TestContext::new();
    let mut instances = ctx.instances(transform_layout());
    let n = 8;
    for i in 0..n {
        instances.add(&record(80, i)).unwrap();
    }

    instances.delete(k).unwrap();
    assert_eq!(instances.count(), n - 1);

    let mut live: Vec<Vec<u8>> = (0..n - 1)
        .map(|i| instances.read_instance(i).unwrap())
        .collect();
    let mut expected: Vec<Vec<u8>> = (0..n).filter(|&i| i != k).map(|i| record(80, i)).collect();
    live.sort();
    expected.sort();
    assert_eq!(live, expected);

    if k != n - 1 {
        assert_eq!(instances.read_instance(k).unwrap(), record(80, n - 1));
    }
}

#[rstest]
#[case(3)]
#[case(4)]
#[case(usize::MAX)]
fn test_delete_out_of_range_is_noop(#[case] index: usize) {
    let ctx = TestContext::new();
    let mut instances = ctx.instances(offset_layout());
    for i in 0..3 {
        instances.add(&record(12, i)).unwrap();
    }

    assert_eq!(instances.delete(index).unwrap(), 3);
    assert_eq!(instances.count(), 3);
    for i in 0..3 {
        assert_eq!(instances.read_instance(i).unwrap(), record(12, i));
    }
}

#[test]
fn test_delete_until_empty_then_reuse() {
    let ctx = TestContext::new();
    let mut instances = ctx.instances(offset_layout());
    for i in 0..4 {
        instances.add(&record(12, i)).unwrap();
    }
    let capacity = instances.capacity();
    while !instances.is_empty() {
        instances.delete(0).unwrap();
    }

    assert_eq!(instances.delete(0).unwrap(), 0);
    instances.add(&record(12, 9)).unwrap();
    assert_eq!(instances.capacity(), capacity);
    assert_eq!(instances.read_instance(0).unwrap(), record(12, 9));
}

// ============================================================================
// Failure
// ============================================================================

#[test]
fn test_out_of_memory_leaves_store_intact() {
    // Room for the 12-byte first allocation but not the 384-byte second one
    let ctx = TestContext::with_memory_limit(200);
    let mut instances = ctx.instances(offset_layout());
    instances.add(&record(12, 0)).unwrap();

    let err = instances.add(&record(12, 1)).unwrap_err();
    assert!(err.is_out_of_memory());
    assert_eq!(instances.count(), 1);
    assert_eq!(instances.capacity(), 12);
    assert_eq!(instances.read_instance(0).unwrap(), record(12, 0));
    assert_eq!(ctx.backend.live_buffer_count(), 1);
}

#[test]
fn test_device_size_limit() {
    let ctx = TestContext::with_parameters(
        glcore_graphics::DeviceParameters::new().with_max_buffer_size(100),
    );
    let mut instances = ctx.instances(offset_layout());
    instances.add(&record(12, 0)).unwrap();
    assert_eq!(
        instances.add(&record(12, 1)),
        Err(GraphicsError::OutOfMemory { requested: 384 })
    );
}

#[test]
fn test_record_size_mismatch() {
    let ctx = TestContext::new();
    let mut instances = ctx.instances(transform_layout());
    assert_eq!(
        instances.add(&[0u8; 64]),
        Err(GraphicsError::RecordSizeMismatch {
            expected: 80,
            actual: 64
        })
    );
    assert_eq!(instances.count(), 0);
}

#[test]
fn test_drop_releases_storage() {
    let ctx = TestContext::new();
    {
        let mut instances = ctx.instances(offset_layout());
        for i in 0..10 {
            instances.add(&record(12, i)).unwrap();
        }
        assert_eq!(ctx.device.buffer_count(), 1);
    }
    assert_eq!(ctx.device.buffer_count(), 0);
    assert_eq!(ctx.backend.live_buffer_count(), 0);
}
