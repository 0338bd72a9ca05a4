use crate::remember::{Owned, RememberedHandle};
use crate::{Recomposer, SlotValue};

#[test]
fn nan_input_is_stable_across_calls() {
    let recomposer = Recomposer::new();
    let results = recomposer
        .compose(|composer| {
            composer.with_group(1, |composer| {
                let first = composer.changed(f64::NAN);
                let second = composer.changed(f64::NAN);
                composer.next_slot();
                (first, second)
            })
        })
        .expect("compose");
    assert_eq!(results, (true, false));
}

#[test]
fn floats_compare_by_bit_pattern() {
    assert_eq!(SlotValue::from(f64::NAN), SlotValue::from(f64::NAN));
    assert_ne!(SlotValue::from(0.0_f64), SlotValue::from(-0.0_f64));
    assert_eq!(SlotValue::from(1.5_f32), SlotValue::from(1.5_f64));
}

#[test]
fn opaque_values_use_the_payload_equality() {
    let value = SlotValue::opaque(vec![1, 2]);
    assert_eq!(value, SlotValue::opaque(vec![1, 2]));
    assert_ne!(value, SlotValue::opaque(vec![1, 3]));
    assert_ne!(value, SlotValue::opaque([1, 2]));
    assert_ne!(value, SlotValue::Int(1));
    assert_eq!(value.downcast_opaque::<Vec<i32>>(), Some(&vec![1, 2]));
}

#[test]
fn remembered_values_compare_by_identity() {
    let owned = Owned::new(vec![1]);
    let same = SlotValue::Remembered(RememberedHandle::new(owned.clone()));
    let rewrapped = SlotValue::Remembered(RememberedHandle::new(owned));
    let lookalike = SlotValue::Remembered(RememberedHandle::new(Owned::new(vec![1])));
    assert_eq!(same, rewrapped);
    assert_ne!(same, lookalike);
}

#[test]
fn variants_never_compare_across_kinds() {
    assert_ne!(SlotValue::Int(1), SlotValue::Float(1.0));
    assert_ne!(SlotValue::Bool(false), SlotValue::Empty);
    assert_ne!(SlotValue::from("1"), SlotValue::Int(1));
    assert_eq!(SlotValue::from(()), SlotValue::from(()));
}
