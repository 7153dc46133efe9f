//! Multi-entry routing through the dispatcher

mod common;

use common::{state, Setup};
use hotswap_kernel::prelude::*;
use hotswap_test_utils::{decode_u64, sel, INCREMENT, VERSION};
use pretty_assertions::assert_eq;
use std::sync::Arc;

#[test]
fn add_remove_round_trip() {
    let s = Setup::new();
    let d = s.multi_dispatcher(s.fx.v1);

    d.add_route(s.admin, sel(20), s.fx.facet_a, None).unwrap();
    assert_eq!(d.current_module(sel(20)), Some(s.fx.facet_a));

    d.remove_route(s.admin, sel(20), None).unwrap();
    assert_eq!(d.current_module(sel(20)), None);
    assert!(matches!(
        d.invoke(sel(20), &[], s.user),
        Err(DispatchError::RouteNotFound { selector }) if selector == sel(20)
    ));

    // Re-adding clears the tombstone
    d.add_route(s.admin, sel(20), s.fx.facet_b, None).unwrap();
    assert_eq!(d.current_module(sel(20)), Some(s.fx.facet_b));

    let log = d.upgrade_log();
    assert_eq!(log.len(), 3);
    assert_eq!(log.records()[1].new_module, None);
    log.verify_integrity().unwrap();
}

#[test]
fn unrouted_selectors_fall_back_to_default() {
    let s = Setup::new();
    let d = s.multi_dispatcher(s.fx.v1);
    d.add_route(s.admin, sel(20), s.fx.facet_a, None).unwrap();

    assert_eq!(d.current_module(sel(21)), Some(s.fx.v1));
    let version = d.invoke(sel(VERSION), &[], s.user).unwrap();
    assert_eq!(decode_u64(&version), 1);
}

#[test]
fn facets_share_dispatcher_storage() {
    let s = Setup::new();
    let d = s.multi_dispatcher(s.fx.v1);
    let batch = RouteBatch::new()
        .add(20, s.fx.facet_a)
        .add(21, s.fx.facet_b);
    d.cut(s.admin, batch, None).unwrap();

    d.invoke(sel(20), &[], s.user).unwrap();
    d.invoke(sel(20), &[], s.user).unwrap();
    d.invoke(sel(21), &[], s.user).unwrap();
    d.invoke(sel(INCREMENT), &[], s.user).unwrap();

    assert_eq!(d.load(10).as_u64(), 2);
    assert_eq!(d.load(20).as_u64(), 1);
    assert_eq!(d.load(0).as_u64(), 1);
}

#[test]
fn removing_an_unset_selector_is_route_not_found() {
    let s = Setup::new();
    let d = s.multi_dispatcher(s.fx.v1);
    let before = state(&d);

    let err = d.remove_route(s.admin, sel(20), None).unwrap_err();

    assert!(matches!(err, DispatchError::RouteNotFound { .. }));
    assert_eq!(state(&d), before);
}

#[test]
fn overlapping_facets_are_rejected() {
    let s = Setup::new();
    let d = s.multi_dispatcher(s.fx.v1);
    d.add_route(s.admin, sel(20), s.fx.facet_a, None).unwrap();
    let before = state(&d);

    let err = d
        .add_route(s.admin, sel(21), s.fx.facet_overlap, None)
        .unwrap_err();

    assert!(matches!(
        err,
        DispatchError::LayoutIncompatible(hotswap_layout::LayoutError::OverlappingClaims { .. })
    ));
    assert_eq!(state(&d), before);
}

#[test]
fn removed_facet_storage_cannot_be_reclaimed_under_another_tag() {
    let s = Setup::new();
    let d = s.multi_dispatcher(s.fx.v1);
    d.add_route(s.admin, sel(40), s.fx.facet_a, None).unwrap();
    d.invoke(sel(40), &[], s.user).unwrap();
    d.invoke(sel(40), &[], s.user).unwrap();
    d.remove_route(s.admin, sel(40), None).unwrap();
    assert_eq!(d.load(10).as_u64(), 2);
    let before = state(&d);

    // `z` sits on the slot `a` left behind
    let err = d
        .add_route(s.admin, sel(40), s.fx.facet_overlap, None)
        .unwrap_err();
    assert!(matches!(
        err,
        DispatchError::LayoutIncompatible(hotswap_layout::LayoutError::Incompatible(
            hotswap_layout::Incompatibility::Retagged { ref old_tag, ref new_tag }
        )) if old_tag == "a" && new_tag == "z"
    ));
    assert_eq!(state(&d), before);

    // On a fresh selector too
    assert!(d
        .add_route(s.admin, sel(41), s.fx.facet_overlap, None)
        .is_err());

    // The original facet picks up where it left off
    d.add_route(s.admin, sel(41), s.fx.facet_a, None).unwrap();
    assert_eq!(decode_u64(&d.invoke(sel(41), &[], s.user).unwrap()), 3);
}

#[test]
fn remove_then_add_in_one_batch_is_a_conflict() {
    let s = Setup::new();
    let d = s.multi_dispatcher(s.fx.v1);
    d.add_route(s.admin, sel(42), s.fx.facet_b, None).unwrap();
    let before = state(&d);

    let batch = RouteBatch::new().remove(42).add(42, s.fx.facet_a);
    let err = d.cut(s.admin, batch, None).unwrap_err();

    assert!(matches!(
        err,
        DispatchError::DuplicateRouteClaim { first: None, second: Some(m), .. } if m == s.fx.facet_a
    ));
    assert_eq!(state(&d), before);
}

#[test]
fn failing_change_aborts_the_whole_batch() {
    let s = Setup::new();
    let d = s.multi_dispatcher(s.fx.v1);
    let before = state(&d);

    let batch = RouteBatch::new()
        .add(20, s.fx.facet_a)
        .remove(30);
    assert!(d.cut(s.admin, batch, None).is_err());

    assert_eq!(d.current_module(sel(20)), Some(s.fx.v1));
    assert_eq!(state(&d), before);
}

#[test]
fn reserved_selectors_cannot_be_routed() {
    let s = Setup::new();
    let d = s.multi_dispatcher(s.fx.v1);

    let err = d
        .add_route(s.admin, Selector::reserved(1), s.fx.facet_a, None)
        .unwrap_err();
    assert!(matches!(err, DispatchError::ReservedSelector { .. }));

    let err = d
        .add_route(s.admin, Selector::NONE, s.fx.facet_a, None)
        .unwrap_err();
    assert!(matches!(err, DispatchError::ReservedSelector { .. }));
}

#[test]
fn single_pointer_dispatchers_reject_batches() {
    let s = Setup::new();
    let d = s.admin_dispatcher(s.fx.v1);

    let err = d
        .add_route(s.admin, sel(20), s.fx.facet_a, None)
        .unwrap_err();

    assert!(matches!(
        err,
        DispatchError::RoutingModeMismatch {
            mode: RoutingMode::SinglePointer
        }
    ));
}

#[test]
fn multi_entry_upgrade_replaces_the_default() {
    let s = Setup::new();
    let d = s.multi_dispatcher(s.fx.v1);
    d.add_route(s.admin, sel(20), s.fx.facet_a, None).unwrap();

    d.upgrade(s.admin, s.fx.v2, None).unwrap();

    assert_eq!(d.current_module(sel(21)), Some(s.fx.v2));
    assert_eq!(d.current_module(sel(20)), Some(s.fx.facet_a));
    let record = d.upgrade_log().last().cloned().unwrap();
    assert_eq!(record.selector, None);
}

#[test]
fn beacon_followers_cannot_mutate_routing() {
    let s = Setup::new();
    let beacon = Arc::new(Beacon::new(s.registry(), s.fx.v1, s.admin).unwrap());
    let d = Dispatcher::new(s.registry(), TrustModel::Beacon(Arc::clone(&beacon)));
    d.initialize(s.fx.v1, s.admin, &[]).unwrap();

    assert!(d.upgrade(s.admin, s.fx.v2, None).unwrap_err().is_unauthorized());
    assert!(d
        .add_route(s.admin, sel(20), s.fx.facet_a, None)
        .unwrap_err()
        .is_unauthorized());
    assert_eq!(beacon.current_module(), s.fx.v1);
    assert!(d.routing_table().is_none());
}

#[test]
fn beacon_rejects_unknown_modules_and_bad_initialization() {
    let s = Setup::new();
    assert!(matches!(
        Beacon::new(s.registry(), ModuleId::new(), s.admin),
        Err(DispatchError::UnknownModule { .. })
    ));

    let beacon = Arc::new(Beacon::new(s.registry(), s.fx.v1, s.admin).unwrap());
    let d = Dispatcher::new(s.registry(), TrustModel::Beacon(beacon));
    let err = d.initialize(s.fx.v2, s.admin, &[]).unwrap_err();
    assert!(matches!(
        err,
        DispatchError::BeaconMismatch { requested, current }
            if requested == s.fx.v2 && current == s.fx.v1
    ));
    assert_eq!(d.lifecycle(), Lifecycle::Uninitialized);
}

#[test]
fn uninitialized_dispatchers_resolve_nothing() {
    let s = Setup::new();
    let beacon = Arc::new(Beacon::new(s.registry(), s.fx.v1, s.admin).unwrap());
    let follower = Dispatcher::new(s.registry(), TrustModel::Beacon(beacon));

    assert_eq!(follower.lifecycle(), Lifecycle::Uninitialized);
    assert_eq!(follower.current_module(Selector::NONE), None);
    assert_eq!(follower.current_module(sel(VERSION)), None);
    assert!(matches!(
        follower.invoke(sel(VERSION), &[], s.user),
        Err(DispatchError::NotInitialized)
    ));

    follower.initialize(s.fx.v1, s.admin, &[]).unwrap();
    assert_eq!(follower.current_module(sel(VERSION)), Some(s.fx.v1));
}
