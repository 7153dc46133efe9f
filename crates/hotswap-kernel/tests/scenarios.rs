//! End-to-end upgrade scenarios

mod common;

use common::{state, Setup};
use hotswap_kernel::prelude::*;
use hotswap_test_utils::{decode_u64, encode_u64, sel, GET_Y, INCREMENT, SET_X, VERSION};
use pretty_assertions::assert_eq;
use std::sync::Arc;

#[test]
fn upgrade_preserves_existing_fields() {
    let s = Setup::new();
    let d = s.admin_dispatcher(s.fx.v1);
    d.invoke(sel(SET_X), &encode_u64(41), s.user).unwrap();
    d.invoke(sel(INCREMENT), &[], s.user).unwrap();

    d.upgrade(s.admin, s.fx.v2, None).unwrap();

    assert_eq!(d.current_module(Selector::NONE), Some(s.fx.v2));
    assert_eq!(s.read_x(&d), 42);
    let y = d.invoke(sel(GET_Y), &[], s.user).unwrap();
    assert_eq!(decode_u64(&y), 0);

    let log = d.upgrade_log();
    assert_eq!(log.len(), 1);
    let record = log.last().unwrap();
    assert_eq!(record.old_module, Some(s.fx.v1));
    assert_eq!(record.new_module, Some(s.fx.v2));
    assert_eq!(record.initiator, s.admin);
}

#[test]
fn non_admin_upgrade_is_unauthorized() {
    let s = Setup::new();
    let d = s.admin_dispatcher(s.fx.v1);
    d.invoke(sel(INCREMENT), &[], s.user).unwrap();
    let before = state(&d);

    let err = d.upgrade(s.user, s.fx.v2, None).unwrap_err();

    assert!(err.is_unauthorized());
    assert_eq!(err.outcome(), Outcome::Rejected);
    assert_eq!(state(&d), before);
    assert_eq!(d.current_module(Selector::NONE), Some(s.fx.v1));
}

#[test]
fn duplicate_claim_in_one_batch_leaves_selector_unset() {
    let s = Setup::new();
    let d = s.multi_dispatcher(s.fx.v1);
    let before = state(&d);

    let batch = RouteBatch::new().add(4, s.fx.facet_a).add(4, s.fx.facet_b);
    let err = d.cut(s.admin, batch, None).unwrap_err();

    assert!(matches!(
        err,
        DispatchError::DuplicateRouteClaim { first: Some(a), second: Some(b), .. }
            if a == s.fx.facet_a && b == s.fx.facet_b
    ));
    let table = d.routing_table().unwrap();
    assert_eq!(table.slot(sel(4)), None);
    assert_eq!(state(&d), before);
}

#[test]
fn beacon_upgrade_reaches_followers_on_their_next_call() {
    let s = Setup::new();
    let beacon = Arc::new(Beacon::new(s.registry(), s.fx.v1, s.admin).unwrap());
    let followers: Vec<Dispatcher> = (0..3)
        .map(|_| {
            let d = Dispatcher::new(s.registry(), TrustModel::Beacon(Arc::clone(&beacon)));
            d.initialize(s.fx.v1, s.admin, &[]).unwrap();
            d
        })
        .collect();

    beacon.upgrade(s.admin, s.fx.v2).unwrap();
    assert_eq!(beacon.epoch(), 1);
    assert_eq!(beacon.upgrade_log().len(), 1);

    for follower in &followers {
        // Not before the next call
        assert_eq!(follower.current_module(Selector::NONE), Some(s.fx.v1));
    }
    for follower in &followers {
        let version = follower.invoke(sel(VERSION), &[], s.user).unwrap();
        assert_eq!(decode_u64(&version), 2);
        assert_eq!(follower.current_module(Selector::NONE), Some(s.fx.v2));
    }
}

#[test]
fn reordered_layout_is_incompatible() {
    let s = Setup::new();
    let d = s.admin_dispatcher(s.fx.v1);
    d.upgrade(s.admin, s.fx.v2, None).unwrap();
    let before = state(&d);

    let err = d.upgrade(s.admin, s.fx.v3, None).unwrap_err();

    assert!(matches!(err, DispatchError::LayoutIncompatible(_)));
    assert_eq!(d.current_module(Selector::NONE), Some(s.fx.v2));
    assert_eq!(state(&d), before);
}

#[test]
fn upgrading_to_the_current_module_is_a_no_op() {
    let s = Setup::new();
    let d = s.admin_dispatcher(s.fx.v1);

    d.upgrade(s.admin, s.fx.v1, None).unwrap();

    assert!(d.upgrade_log().is_empty());
    assert_eq!(d.current_module(Selector::NONE), Some(s.fx.v1));
}

#[test]
fn current_module_is_idempotent() {
    let s = Setup::new();
    let d = s.multi_dispatcher(s.fx.v1);
    d.add_route(s.admin, sel(12), s.fx.facet_a, None).unwrap();

    for selector in [Selector::NONE, sel(12), sel(13)] {
        let first = d.current_module(selector);
        assert_eq!(d.current_module(selector), first);
        assert_eq!(d.current_module(selector), first);
    }
    assert!(d.upgrade_log().len() == 1);
}
