#![allow(clippy::unwrap_used, reason = "Tests can panic")]

use super::*;
use crate::key::{DeclPtr, ErrorSet, IntValue, PtrType};
use kiln_ir::{ContainerKind, StringInterner, TrackedInstIndex};
use pretty_assertions::assert_eq;

fn container_key(inst: u32) -> ContainerKey {
    ContainerKey {
        kind: ContainerKind::Struct,
        zir_index: TrackedInstIndex::new(inst),
    }
}

fn begin(pool: &mut InternPool, key: ContainerKey) -> WipType {
    match pool.get_or_begin_type(key).unwrap() {
        GetOrBegin::Wip(wip) => wip,
        GetOrBegin::Existing(index) => panic!("unexpected existing type {index:?}"),
    }
}

#[test]
fn statics_are_preinterned() {
    let mut pool = InternPool::new();
    assert_eq!(pool.len(), Index::STATIC_LEN as usize);
    let i32_ty = pool.intern(Key::IntType(IntType {
        signedness: Signedness::Signed,
        bits: 32,
    }));
    assert_eq!(i32_ty, Index::I32_TYPE);
    assert_eq!(pool.intern(Key::ErrorSetType(ErrorSet::new(std::iter::empty()))), Index::EMPTY_ERROR_SET);
    assert!(pool.is_type(Index::BOOL_TYPE));
    assert!(!pool.is_type(Index::BOOL_TRUE));
}

#[test]
fn equal_keys_share_an_index() {
    let mut pool = InternPool::new();
    let a = pool.intern(Key::Int(IntValue {
        ty: Index::COMPTIME_INT_TYPE,
        value: 7,
    }));
    let b = pool.intern(Key::Int(IntValue {
        ty: Index::COMPTIME_INT_TYPE,
        value: 7,
    }));
    let c = pool.intern(Key::Int(IntValue {
        ty: Index::I32_TYPE,
        value: 7,
    }));
    assert_eq!(a, b);
    assert_ne!(a, c);
    assert_eq!(pool.type_of(c).unwrap(), Index::I32_TYPE);
}

#[test]
fn wip_type_is_hidden_until_finished() {
    let mut pool = InternPool::new();
    let key = container_key(1);
    let wip = begin(&mut pool, key);
    let self_index = wip.index();

    assert_eq!(
        pool.get_or_begin_type(key).unwrap_err(),
        InternError::WipPending { key }
    );
    assert_eq!(pool.find(&Key::ContainerType(key)), None);

    // The creator can already build types that mention the WIP type.
    let ptr = pool.intern(Key::PtrType(PtrType {
        child: self_index,
        is_const: false,
    }));

    let finished = pool.finish(wip, DeclIndex::new(4), NamespaceIndex::new(0));
    assert_eq!(finished, self_index);
    assert_eq!(
        pool.get_or_begin_type(key).unwrap(),
        GetOrBegin::Existing(finished)
    );
    let container = pool.container(finished).unwrap();
    assert_eq!(container.owner_decl, DeclIndex::new(4));
    assert_eq!(container.fields_state, FieldsState::Unresolved);
    assert!(pool.is_live(ptr));
}

#[test]
fn cancelled_wip_releases_the_key() {
    let mut pool = InternPool::new();
    let key = container_key(2);
    let wip = begin(&mut pool, key);
    let index = wip.index();
    pool.cancel(wip);
    assert!(!pool.is_live(index));
    let again = begin(&mut pool, key);
    assert_ne!(again.index(), index);
    pool.cancel(again);
}

#[test]
fn removed_index_is_detected_as_stale() {
    let mut pool = InternPool::new();
    let key = container_key(3);
    let wip = begin(&mut pool, key);
    let old = pool.finish(wip, DeclIndex::new(0), NamespaceIndex::new(0));
    assert!(pool.remove(old));
    assert!(!pool.remove(old));
    assert_eq!(pool.key(old).unwrap_err(), InternError::Stale { index: old });

    // The slot is reused with a new generation.
    let wip = begin(&mut pool, key);
    let new = pool.finish(wip, DeclIndex::new(0), NamespaceIndex::new(1));
    assert_eq!(new.slot(), old.slot());
    assert_ne!(new, old);
    assert_eq!(pool.container(new).unwrap().namespace, NamespaceIndex::new(1));
    assert!(pool.container(old).is_err());
}

#[test]
fn statics_cannot_be_removed() {
    let mut pool = InternPool::new();
    assert!(!pool.remove(Index::VOID_TYPE));
    assert!(pool.is_live(Index::VOID_TYPE));
}

#[test]
fn container_fields_update_in_place() {
    let mut pool = InternPool::new();
    let wip = begin(&mut pool, container_key(5));
    let ty = pool.finish(wip, DeclIndex::new(1), NamespaceIndex::new(2));
    let names = StringInterner::new();
    {
        let container = pool.container_mut(ty).unwrap();
        container.fields.push(Field {
            name: names.intern("x"),
            ty: Index::I32_TYPE,
        });
        container.fields_state = FieldsState::Resolved;
    }
    assert_eq!(pool.container(ty).unwrap().fields.len(), 1);
    assert_eq!(
        pool.container(Index::I32_TYPE).unwrap_err(),
        InternError::NotAContainer {
            index: Index::I32_TYPE
        }
    );
}

#[test]
fn format_renders_nested_types() {
    let mut pool = InternPool::new();
    let names = StringInterner::new();
    let wip = begin(&mut pool, container_key(6));
    let node = pool.finish(wip, DeclIndex::new(9), NamespaceIndex::new(0));
    let ptr = pool.intern(Key::PtrType(PtrType {
        child: node,
        is_const: true,
    }));
    let decl_name = |decl: DeclIndex| format!("Node{}", decl.raw());
    assert_eq!(pool.format(ptr, &names, &decl_name), "*const Node9");

    let set = pool.intern(Key::ErrorSetType(ErrorSet::new([
        names.intern("B"),
        names.intern("A"),
    ])));
    let formatted = pool.format(set, &names, &decl_name);
    assert!(formatted == "error{A,B}" || formatted == "error{B,A}");

    let decl_ptr = pool.intern(Key::DeclPtr(DeclPtr {
        ty: ptr,
        decl: DeclIndex::new(9),
    }));
    assert_eq!(pool.format(decl_ptr, &names, &decl_name), "&Node9");
}
