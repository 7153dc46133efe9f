//! Testing utilities for the hotswap workspace
//!
//! Fixture modules, layouts and helpers shared by the integration tests.

#![allow(missing_docs)]

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use hotswap_layout::StorageLayout;
use hotswap_module::{
    CallContext, Identity, Module, ModuleCode, ModuleFault, ModuleId, ModuleRegistry, Selector,
    UpgradeProposal, Word,
};
use std::sync::Arc;

// Entry points understood by the fixture modules
pub const INCREMENT: u32 = 1;
pub const GET_X: u32 = 2;
pub const GET_Y: u32 = 3;
pub const SET_X: u32 = 4;
pub const VERSION: u32 = 5;
pub const POKE: u32 = 6;
pub const BURN: u32 = 7;
pub const FAIL_AFTER_WRITE: u32 = 8;
pub const RELAY: u32 = 9;
pub const RELAY_AND_BURN: u32 = 10;

/// Slot outside every fixture layout
pub const FOREIGN_SLOT: u64 = 999;

pub fn sel(value: u32) -> Selector {
    Selector::from_u32(value)
}

pub fn decode_u64(bytes: &[u8]) -> u64 {
    let raw: [u8; 8] = bytes.try_into().unwrap_or_default();
    u64::from_be_bytes(raw)
}

pub fn encode_u64(value: u64) -> Vec<u8> {
    value.to_be_bytes().to_vec()
}

/// Payload for [`RELAY`]: target selector followed by its payload
pub fn relay_payload(selector: Selector, payload: &[u8]) -> Vec<u8> {
    let mut out = selector.as_bytes().to_vec();
    out.extend_from_slice(payload);
    out
}

fn split_relay(payload: &[u8]) -> Result<(Selector, &[u8]), ModuleFault> {
    if payload.len() < 4 {
        return Err(ModuleFault::MalformedPayload("relay needs a selector".into()));
    }
    let (head, rest) = payload.split_at(4);
    let mut raw = [0u8; 4];
    raw.copy_from_slice(head);
    Ok((Selector::new(raw), rest))
}

fn burn(cx: &mut CallContext<'_>) -> Result<Vec<u8>, ModuleFault> {
    loop {
        cx.charge(10_000)?;
    }
}

// ---------------------------------------------------------------------------
// Layouts
// ---------------------------------------------------------------------------

pub fn layout_v1() -> StorageLayout {
    StorageLayout::builder().field("x", 1).build().unwrap()
}

/// `y` appended after `x`
pub fn layout_v2() -> StorageLayout {
    StorageLayout::builder().field("x", 1).field("y", 1).build().unwrap()
}

/// `x` and `y` swapped relative to [`layout_v2`]
pub fn layout_v3() -> StorageLayout {
    StorageLayout::builder().field("y", 1).field("x", 1).build().unwrap()
}

// ---------------------------------------------------------------------------
// Counter
// ---------------------------------------------------------------------------

/// Counter over `x`; reads `y` when its layout declares it
///
/// The initializer takes an optional 8-byte starting value.
pub struct Counter {
    pub version: u32,
}

impl ModuleCode for Counter {
    fn name(&self) -> &str {
        "counter"
    }

    fn version(&self) -> u32 {
        self.version
    }

    fn call(&self, entry: Selector, cx: &mut CallContext<'_>) -> Result<Vec<u8>, ModuleFault> {
        match entry.as_u32() {
            INCREMENT => {
                let next = cx.field_u64("x")? + 1;
                cx.set_field_u64("x", next)?;
                Ok(encode_u64(next))
            }
            GET_X => Ok(encode_u64(cx.field_u64("x")?)),
            GET_Y => Ok(encode_u64(cx.field_u64("y")?)),
            SET_X => {
                let value = decode_payload(cx.payload())?;
                cx.set_field_u64("x", value)?;
                Ok(Vec::new())
            }
            VERSION => Ok(encode_u64(u64::from(self.version))),
            POKE => {
                cx.store(FOREIGN_SLOT, Word::from_u64(1))?;
                Ok(Vec::new())
            }
            BURN => {
                cx.set_field_u64("x", 77)?;
                burn(cx)
            }
            FAIL_AFTER_WRITE => {
                cx.set_field_u64("x", 1_000)?;
                Err(ModuleFault::revert("failed after write"))
            }
            _ => Err(ModuleFault::UnknownEntry(entry)),
        }
    }

    fn initialize(&self, cx: &mut CallContext<'_>) -> Result<(), ModuleFault> {
        if cx.payload().is_empty() {
            return Ok(());
        }
        let value = decode_payload(cx.payload())?;
        cx.set_field_u64("x", value)
    }
}

fn decode_payload(payload: &[u8]) -> Result<u64, ModuleFault> {
    let raw: [u8; 8] = payload
        .try_into()
        .map_err(|_| ModuleFault::MalformedPayload(format!("expected 8 bytes, got {}", payload.len())))?;
    Ok(u64::from_be_bytes(raw))
}

/// Initializer writes and then fails
pub struct FailingInit;

impl ModuleCode for FailingInit {
    fn name(&self) -> &str {
        "failing-init"
    }

    fn call(&self, entry: Selector, _cx: &mut CallContext<'_>) -> Result<Vec<u8>, ModuleFault> {
        Err(ModuleFault::UnknownEntry(entry))
    }

    fn initialize(&self, cx: &mut CallContext<'_>) -> Result<(), ModuleFault> {
        cx.set_field_u64("x", 5)?;
        Err(ModuleFault::revert("initializer refused"))
    }
}

// ---------------------------------------------------------------------------
// Facets
// ---------------------------------------------------------------------------

/// Facet counting calls in its single field
pub struct Facet {
    pub field: &'static str,
}

impl ModuleCode for Facet {
    fn name(&self) -> &str {
        self.field
    }

    fn call(&self, _entry: Selector, cx: &mut CallContext<'_>) -> Result<Vec<u8>, ModuleFault> {
        let next = cx.field_u64(self.field)? + 1;
        cx.set_field_u64(self.field, next)?;
        Ok(encode_u64(next))
    }
}

pub fn facet_layout(field: &'static str, offset: u64) -> StorageLayout {
    StorageLayout::builder().at(offset).field(field, 1).build().unwrap()
}

// ---------------------------------------------------------------------------
// Self-governed modules
// ---------------------------------------------------------------------------

pub fn owner_layout_v1() -> StorageLayout {
    StorageLayout::builder().field("owner", 1).field("x", 1).build().unwrap()
}

pub fn owner_layout_v2() -> StorageLayout {
    StorageLayout::builder()
        .field("owner", 1)
        .field("x", 1)
        .field("y", 1)
        .build()
        .unwrap()
}

/// Module approving proposals from the identity that initialized it
pub struct OwnerGoverned {
    pub version: u32,
}

impl ModuleCode for OwnerGoverned {
    fn name(&self) -> &str {
        "owner-governed"
    }

    fn version(&self) -> u32 {
        self.version
    }

    fn call(&self, entry: Selector, cx: &mut CallContext<'_>) -> Result<Vec<u8>, ModuleFault> {
        match entry.as_u32() {
            INCREMENT => {
                let next = cx.field_u64("x")? + 1;
                cx.set_field_u64("x", next)?;
                Ok(encode_u64(next))
            }
            GET_X => Ok(encode_u64(cx.field_u64("x")?)),
            VERSION => Ok(encode_u64(u64::from(self.version))),
            _ => Err(ModuleFault::UnknownEntry(entry)),
        }
    }

    fn initialize(&self, cx: &mut CallContext<'_>) -> Result<(), ModuleFault> {
        let owner = cx.caller();
        cx.set_field("owner", owner.to_word())
    }

    fn authorize_upgrade(
        &self,
        cx: &mut CallContext<'_>,
        _proposal: &UpgradeProposal,
    ) -> Result<(), ModuleFault> {
        let owner = Identity::from_word(cx.field("owner")?);
        if owner == Some(cx.caller()) {
            Ok(())
        } else {
            Err(ModuleFault::denied("caller is not the owner"))
        }
    }
}

pub fn key_layout_v1() -> StorageLayout {
    StorageLayout::builder().field("nonce", 1).field("x", 1).build().unwrap()
}

pub fn key_layout_v2() -> StorageLayout {
    StorageLayout::builder()
        .field("nonce", 1)
        .field("x", 1)
        .field("y", 1)
        .build()
        .unwrap()
}

/// Module approving proposals signed by a fixed ed25519 key
///
/// The auth payload is a signature over the proposal digest followed by
/// the current nonce (little-endian). Each approval bumps the nonce, so
/// a signature cannot be replayed.
pub struct KeyGoverned {
    pub version: u32,
    pub key: VerifyingKey,
}

impl ModuleCode for KeyGoverned {
    fn name(&self) -> &str {
        "key-governed"
    }

    fn version(&self) -> u32 {
        self.version
    }

    fn call(&self, entry: Selector, cx: &mut CallContext<'_>) -> Result<Vec<u8>, ModuleFault> {
        match entry.as_u32() {
            INCREMENT => {
                let next = cx.field_u64("x")? + 1;
                cx.set_field_u64("x", next)?;
                Ok(encode_u64(next))
            }
            GET_X => Ok(encode_u64(cx.field_u64("x")?)),
            VERSION => Ok(encode_u64(u64::from(self.version))),
            _ => Err(ModuleFault::UnknownEntry(entry)),
        }
    }

    fn authorize_upgrade(
        &self,
        cx: &mut CallContext<'_>,
        proposal: &UpgradeProposal,
    ) -> Result<(), ModuleFault> {
        let nonce = cx.field_u64("nonce")?;
        let signature = Signature::from_slice(cx.payload())
            .map_err(|e| ModuleFault::MalformedPayload(e.to_string()))?;
        self.key
            .verify(&signed_message(proposal, nonce), &signature)
            .map_err(|_| ModuleFault::denied("bad signature"))?;
        cx.set_field_u64("nonce", nonce + 1)
    }
}

fn signed_message(proposal: &UpgradeProposal, nonce: u64) -> Vec<u8> {
    let mut message = proposal.digest().to_vec();
    message.extend_from_slice(&nonce.to_le_bytes());
    message
}

/// Deterministic key for tests
pub fn signing_key(seed: u8) -> SigningKey {
    SigningKey::from_bytes(&[seed; 32])
}

/// Auth payload accepted by [`KeyGoverned`]
pub fn sign_proposal(key: &SigningKey, proposal: &UpgradeProposal, nonce: u64) -> Vec<u8> {
    key.sign(&signed_message(proposal, nonce)).to_bytes().to_vec()
}

// ---------------------------------------------------------------------------
// Reentrancy probe
// ---------------------------------------------------------------------------

pub fn probe_layout_v1() -> StorageLayout {
    StorageLayout::builder()
        .field("observed", 1)
        .field("nested_failed", 1)
        .field("x", 1)
        .build()
        .unwrap()
}

pub fn probe_layout_v2() -> StorageLayout {
    StorageLayout::builder()
        .field("observed", 1)
        .field("nested_failed", 1)
        .field("x", 1)
        .field("y", 1)
        .build()
        .unwrap()
}

/// Self-authorizing module that calls back into its dispatcher
///
/// - during `authorize_upgrade` it reenters [`VERSION`] and stores the
///   version it saw in `observed`; a non-empty auth payload is relayed as
///   a further nested call and a failure of it is counted in
///   `nested_failed`; the proposal is then approved
/// - [`RELAY`] reenters the selector carried in the payload
/// - [`RELAY_AND_BURN`] relays, then exhausts the budget
pub struct Probe {
    pub version: u32,
}

impl ModuleCode for Probe {
    fn name(&self) -> &str {
        "probe"
    }

    fn version(&self) -> u32 {
        self.version
    }

    fn call(&self, entry: Selector, cx: &mut CallContext<'_>) -> Result<Vec<u8>, ModuleFault> {
        match entry.as_u32() {
            VERSION => Ok(encode_u64(u64::from(self.version))),
            GET_X => Ok(encode_u64(cx.field_u64("x")?)),
            INCREMENT => {
                let next = cx.field_u64("x")? + 1;
                cx.set_field_u64("x", next)?;
                Ok(encode_u64(next))
            }
            RELAY => {
                let (selector, payload) = split_relay(cx.payload())?;
                let payload = payload.to_vec();
                cx.reenter(selector, &payload)
            }
            RELAY_AND_BURN => {
                let (selector, payload) = split_relay(cx.payload())?;
                let payload = payload.to_vec();
                cx.reenter(selector, &payload)?;
                burn(cx)
            }
            _ => Err(ModuleFault::UnknownEntry(entry)),
        }
    }

    fn authorize_upgrade(
        &self,
        cx: &mut CallContext<'_>,
        _proposal: &UpgradeProposal,
    ) -> Result<(), ModuleFault> {
        let seen = cx.reenter(sel(VERSION), &[])?;
        cx.set_field_u64("observed", decode_u64(&seen))?;

        if !cx.payload().is_empty() {
            let (selector, payload) = split_relay(cx.payload())?;
            let payload = payload.to_vec();
            if cx.reenter(selector, &payload).is_err() {
                let failed = cx.field_u64("nested_failed")? + 1;
                cx.set_field_u64("nested_failed", failed)?;
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Deployment
// ---------------------------------------------------------------------------

/// Registry with every fixture module deployed
pub struct Fixture {
    pub registry: Arc<ModuleRegistry>,
    pub v1: ModuleId,
    pub v2: ModuleId,
    pub v3: ModuleId,
    pub failing_init: ModuleId,
    pub facet_a: ModuleId,
    pub facet_b: ModuleId,
    /// Claims the same slot as `facet_a`
    pub facet_overlap: ModuleId,
    pub owner_v1: ModuleId,
    pub owner_v2: ModuleId,
    pub probe_v1: ModuleId,
    pub probe_v2: ModuleId,
}

impl Fixture {
    pub fn new() -> Self {
        let registry = Arc::new(ModuleRegistry::new());
        let deploy = |code: Arc<dyn ModuleCode>, layout| registry.deploy(Module::from_arc(code, layout));

        Self {
            v1: deploy(Arc::new(Counter { version: 1 }), layout_v1()),
            v2: deploy(Arc::new(Counter { version: 2 }), layout_v2()),
            v3: deploy(Arc::new(Counter { version: 3 }), layout_v3()),
            failing_init: deploy(Arc::new(FailingInit), layout_v1()),
            facet_a: deploy(Arc::new(Facet { field: "a" }), facet_layout("a", 10)),
            facet_b: deploy(Arc::new(Facet { field: "b" }), facet_layout("b", 20)),
            facet_overlap: deploy(Arc::new(Facet { field: "z" }), facet_layout("z", 10)),
            owner_v1: deploy(Arc::new(OwnerGoverned { version: 1 }), owner_layout_v1()),
            owner_v2: deploy(Arc::new(OwnerGoverned { version: 2 }), owner_layout_v2()),
            probe_v1: deploy(Arc::new(Probe { version: 1 }), probe_layout_v1()),
            probe_v2: deploy(Arc::new(Probe { version: 2 }), probe_layout_v2()),
            registry,
        }
    }

    /// Deploy both versions of a key-governed module for `key`
    pub fn deploy_key_governed(&self, key: &SigningKey) -> (ModuleId, ModuleId) {
        let verifying = key.verifying_key();
        let v1 = self.registry.deploy(Module::new(
            KeyGoverned {
                version: 1,
                key: verifying,
            },
            key_layout_v1(),
        ));
        let v2 = self.registry.deploy(Module::new(
            KeyGoverned {
                version: 2,
                key: verifying,
            },
            key_layout_v2(),
        ));
        (v1, v2)
    }
}

impl Default for Fixture {
    fn default() -> Self {
        Self::new()
    }
}
