//! Trust models, admin lifecycle and clones

mod common;

use common::{state, Setup};
use hotswap_kernel::prelude::*;
use hotswap_test_utils::{
    decode_u64, encode_u64, sel, sign_proposal, signing_key, GET_X, INCREMENT, SET_X, VERSION,
};
use pretty_assertions::assert_eq;

#[test]
fn admin_cannot_reach_module_entries() {
    let s = Setup::new();
    let d = s.admin_dispatcher(s.fx.v1);

    let err = d.invoke(sel(INCREMENT), &[], s.admin).unwrap_err();
    assert!(err.is_unauthorized());
    assert_eq!(d.load(0), Word::ZERO);
}

#[test]
fn non_admin_reserved_selector_is_unauthorized() {
    let s = Setup::new();
    let d = s.admin_dispatcher(s.fx.v1);
    let call = AdminCall::upgrade(s.fx.v2, None);

    let err = d
        .invoke(call.selector(), &call.encode().unwrap(), s.user)
        .unwrap_err();

    assert!(err.is_unauthorized());
    assert_eq!(d.current_module(Selector::NONE), Some(s.fx.v1));
}

#[test]
fn garbage_admin_payload_is_rejected() {
    let s = Setup::new();
    let d = s.admin_dispatcher(s.fx.v1);
    let before = state(&d);

    let err = d
        .invoke(Selector::reserved(1), b"not json", s.admin)
        .unwrap_err();

    assert!(matches!(err, DispatchError::InvalidAdminCall { .. }));
    assert_eq!(state(&d), before);
}

#[test]
fn renounced_admin_blocks_every_upgrade() {
    let s = Setup::new();
    let d = s.admin_dispatcher(s.fx.v1);

    d.renounce_admin(s.admin, None).unwrap();

    assert_eq!(d.admin(), None);
    assert_eq!(d.lifecycle(), Lifecycle::Active);
    assert!(d.upgrade(s.admin, s.fx.v2, None).unwrap_err().is_unauthorized());
    // Former admin is now an ordinary caller
    d.invoke(sel(INCREMENT), &[], s.admin).unwrap();
}

#[test]
fn transferred_admin_takes_over() {
    let s = Setup::new();
    let d = s.admin_dispatcher(s.fx.v1);
    let next = Identity::new();

    d.transfer_admin(s.admin, next, None).unwrap();

    assert_eq!(d.admin(), Some(next));
    assert!(d.upgrade(s.admin, s.fx.v2, None).unwrap_err().is_unauthorized());
    d.upgrade(next, s.fx.v2, None).unwrap();
}

#[test]
fn frozen_dispatcher_rejects_everything() {
    let s = Setup::new();
    let d = s.admin_dispatcher(s.fx.v1);
    d.invoke(sel(INCREMENT), &[], s.user).unwrap();

    d.freeze(s.admin, None).unwrap();

    assert_eq!(d.lifecycle(), Lifecycle::Frozen);
    assert!(matches!(
        d.invoke(sel(GET_X), &[], s.user),
        Err(DispatchError::Frozen)
    ));
    assert!(matches!(
        d.upgrade(s.admin, s.fx.v2, None),
        Err(DispatchError::Frozen)
    ));
    assert_eq!(d.load(0).as_u64(), 1);
}

#[test]
fn initialize_runs_once() {
    let s = Setup::new();
    let d = Dispatcher::new(s.registry(), TrustModel::ExternalAdmin);

    assert!(matches!(
        d.invoke(sel(GET_X), &[], s.user),
        Err(DispatchError::NotInitialized)
    ));

    d.initialize(s.fx.v1, s.admin, &encode_u64(9)).unwrap();
    assert_eq!(s.read_x(&d), 9);
    assert!(d.upgrade_log().is_empty());

    assert!(matches!(
        d.initialize(s.fx.v1, s.admin, &[]),
        Err(DispatchError::AlreadyInitialized)
    ));
}

#[test]
fn failed_initializer_leaves_dispatcher_uninitialized() {
    let s = Setup::new();
    let d = Dispatcher::new(s.registry(), TrustModel::ExternalAdmin);

    let err = d.initialize(s.fx.failing_init, s.admin, &[]).unwrap_err();

    assert!(matches!(err, DispatchError::ForwardedFailure(ModuleFault::Revert(_))));
    assert_eq!(d.lifecycle(), Lifecycle::Uninitialized);
    assert_eq!(d.admin(), None);
    assert!(d.storage_snapshot().is_empty());
    assert_eq!(d.current_module(Selector::NONE), None);

    // Still usable afterwards
    d.initialize(s.fx.v1, s.admin, &[]).unwrap();
}

#[test]
fn unknown_module_cannot_be_bound() {
    let s = Setup::new();
    let d = Dispatcher::new(s.registry(), TrustModel::ExternalAdmin);
    assert!(matches!(
        d.initialize(ModuleId::new(), s.admin, &[]),
        Err(DispatchError::UnknownModule { .. })
    ));

    let d = s.admin_dispatcher(s.fx.v1);
    assert!(matches!(
        d.upgrade(s.admin, ModuleId::new(), None),
        Err(DispatchError::UnknownModule { .. })
    ));
}

#[test]
fn owner_governed_module_authorizes_its_owner() {
    let s = Setup::new();
    let d = s.self_authorizing(s.fx.owner_v1);
    d.invoke(sel(INCREMENT), &[], s.user).unwrap();
    let before = state(&d);

    assert!(d.upgrade(s.user, s.fx.owner_v2, None).unwrap_err().is_unauthorized());
    assert_eq!(state(&d), before);

    d.upgrade(s.admin, s.fx.owner_v2, None).unwrap();
    let version = d.invoke(sel(VERSION), &[], s.user).unwrap();
    assert_eq!(decode_u64(&version), 2);
    assert_eq!(s.read_x(&d), 1);
}

#[test]
fn key_governed_module_verifies_signatures() {
    let s = Setup::new();
    let key = signing_key(7);
    let (v1, v2) = s.fx.deploy_key_governed(&key);
    let d = s.self_authorizing(v1);

    let proposal = UpgradeProposal {
        dispatcher: d.address(),
        current: Some(v1),
        action: ProposedAction::Upgrade { to: v2 },
    };

    // Wrong key
    let forged = sign_proposal(&signing_key(8), &proposal, 0);
    assert!(d.upgrade(s.user, v2, Some(&forged)).unwrap_err().is_unauthorized());

    // Signed for a different target
    let other = UpgradeProposal {
        action: ProposedAction::Upgrade { to: v1 },
        ..proposal.clone()
    };
    let mismatched = sign_proposal(&key, &other, 0);
    assert!(d.upgrade(s.user, v2, Some(&mismatched)).unwrap_err().is_unauthorized());

    // Any caller may submit a valid signature
    let auth = sign_proposal(&key, &proposal, 0);
    d.upgrade(s.user, v2, Some(&auth)).unwrap();
    assert_eq!(d.current_module(Selector::NONE), Some(v2));
    assert_eq!(d.load(0).as_u64(), 1, "nonce bumped");
}

#[test]
fn key_governed_signatures_cannot_be_replayed() {
    let s = Setup::new();
    let key = signing_key(3);
    let (v1, _) = s.fx.deploy_key_governed(&key);
    let d = s.self_authorizing(v1);
    let next = Identity::new();

    let proposal = UpgradeProposal {
        dispatcher: d.address(),
        current: Some(v1),
        action: ProposedAction::TransferAdmin { to: next },
    };
    let auth = sign_proposal(&key, &proposal, 0);

    d.transfer_admin(s.user, next, Some(&auth)).unwrap();
    assert_eq!(d.admin(), Some(next));
    assert!(d
        .transfer_admin(s.user, next, Some(&auth))
        .unwrap_err()
        .is_unauthorized());
}

#[test]
fn renounced_self_authorizing_dispatcher_rejects_proposals() {
    let s = Setup::new();
    let d = s.self_authorizing(s.fx.owner_v1);

    d.renounce_admin(s.admin, None).unwrap();

    assert!(d.upgrade(s.admin, s.fx.owner_v2, None).unwrap_err().is_unauthorized());
    assert_eq!(d.current_module(Selector::NONE), Some(s.fx.owner_v1));
}

#[test]
fn modules_without_authorizer_refuse_self_governance() {
    let s = Setup::new();
    let d = s.self_authorizing(s.fx.v1);

    assert!(d.upgrade(s.admin, s.fx.v2, None).unwrap_err().is_unauthorized());
}

#[test]
fn clones_reject_every_mutation() {
    let s = Setup::new();
    let factory = CloneFactory::new(s.registry());
    let address = factory.create(s.fx.v1).unwrap();
    let clone = factory.get(address).unwrap();

    assert!(clone.is_clone());
    assert!(clone.trust_model().is_none());
    clone.invoke(sel(INCREMENT), &[], s.user).unwrap();

    let attempts = [
        clone.upgrade(s.admin, s.fx.v2, None),
        clone.add_route(s.admin, sel(20), s.fx.facet_a, None),
        clone.remove_route(s.admin, sel(20), None),
        clone.cut(s.admin, RouteBatch::new().add(20, s.fx.facet_a), None),
        clone.renounce_admin(s.admin, None),
        clone.transfer_admin(s.admin, s.user, None),
        clone.freeze(s.admin, None),
    ];
    for attempt in attempts {
        assert!(matches!(attempt, Err(DispatchError::ImmutableRoute)));
    }
    for code in 1..=5 {
        assert!(matches!(
            clone.invoke(Selector::reserved(code), b"{}", s.user),
            Err(DispatchError::ImmutableRoute)
        ));
    }

    assert_eq!(clone.current_module(Selector::NONE), Some(s.fx.v1));
    assert_eq!(clone.load(0).as_u64(), 1);
    assert!(clone.upgrade_log().is_empty());
}

#[test]
fn clones_have_independent_storage() {
    let s = Setup::new();
    let factory = CloneFactory::new(s.registry());
    let a = factory
        .create_initialized(s.fx.v1, s.user, &encode_u64(5))
        .unwrap();
    let b = factory.create(s.fx.v1).unwrap();
    assert_eq!(factory.len(), 2);

    let a = factory.get(a).unwrap();
    let b = factory.get(b).unwrap();
    a.invoke(sel(SET_X), &encode_u64(100), s.user).unwrap();

    assert_eq!(a.load(0).as_u64(), 100);
    assert_eq!(b.load(0), Word::ZERO);
}

#[test]
fn clone_with_failing_initializer_is_not_registered() {
    let s = Setup::new();
    let factory = CloneFactory::new(s.registry());

    assert!(factory.create_initialized(s.fx.failing_init, s.user, &[]).is_err());
    assert!(factory.is_empty());
    assert!(matches!(
        factory.create(ModuleId::new()),
        Err(DispatchError::UnknownModule { .. })
    ));
}
