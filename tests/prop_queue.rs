//! Property test for per-account queue invariants under random insert orders.
//! Run: `cargo test --test prop_queue -- --nocapture`

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use ed25519_dalek::SigningKey;
use num_bigint::BigInt;
use num_traits::Zero;
use proptest::prelude::*;
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

use actpool::action::{Action, Transfer};
use actpool::actpool::{ActPool, ActPoolConfig, ActPoolImpl};
use actpool::chain::{AccountState, ChainError, ChainStateView};
use actpool::crypto::address_from_pubkey;

const GAS_LIMIT: u64 = 1_000_000;
const COST_PER_ACT: u64 = 10;

/// Permissive single-account chain view used only in this property test.
struct SingleAccount {
    addr: String,
    balance: BigInt,
}

impl ChainStateView for SingleAccount {
    fn nonce(&self, _addr: &str) -> Result<u64, ChainError> {
        Ok(0)
    }

    fn balance(&self, addr: &str) -> Result<BigInt, ChainError> {
        if addr == self.addr {
            Ok(self.balance.clone())
        } else {
            Ok(BigInt::zero())
        }
    }

    fn state(&self, addr: &str) -> Result<AccountState, ChainError> {
        Ok(AccountState {
            nonce: 0,
            balance: self.balance(addr)?,
            is_candidate: false,
        })
    }
}

fn transfer(k: &SigningKey, nonce: u64) -> Transfer {
    let mut act: Action = Transfer::new(
        nonce,
        address_from_pubkey(&k.verifying_key().to_bytes()),
        "0xc8c8000000000000000000000000000000000000".to_string(),
        BigInt::from(COST_PER_ACT),
        Vec::new(),
        GAS_LIMIT,
        BigInt::zero(),
    )
    .into();
    act.sign(k);
    match act {
        Action::Transfer(t) => t,
        _ => unreachable!(),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn queue_invariants_hold_for_any_insert_order(
        seed in any::<u64>(),
        nonce_set in prop::collection::btree_set(1u64..=30, 1..16),
        balance in 0u64..400,
        window in 1u64..=32,
    ) {
        let k = SigningKey::from_bytes(&[77u8; 32]);
        let sender = address_from_pubkey(&k.verifying_key().to_bytes());
        let chain = Arc::new(SingleAccount {
            addr: sender.clone(),
            balance: BigInt::from(balance),
        });
        let cfg = ActPoolConfig {
            max_num_acts_per_acct: window,
            ..Default::default()
        };
        let pool = ActPoolImpl::new(chain, cfg, Vec::new());

        let mut order: Vec<u64> = nonce_set.into_iter().collect();
        let mut rng = StdRng::seed_from_u64(seed);
        order.shuffle(&mut rng);

        for nonce in order {
            // Individual rejections (window, balance) are expected; the
            // invariants below must hold regardless.
            let _ = pool.add_transfer(transfer(&k, nonce));
        }

        let pending = pool.get_pending_nonce(&sender).unwrap();
        let unconfirmed = pool.get_unconfirmed_acts(&sender);
        let held: HashSet<u64> = unconfirmed.iter().map(|a| a.nonce()).collect();

        // Nonce window: every held nonce sits inside [1, 1 + window).
        for n in &held {
            prop_assert!(*n >= 1 && *n < 1 + window);
        }

        // Contiguity: the ready prefix [1, pending) has no holes.
        for n in 1..pending {
            prop_assert!(held.contains(&n), "missing ready nonce {} (pending {})", n, pending);
        }

        // Balance feasibility: the ready prefix never outspends the account.
        let ready_cost = (pending - 1) * COST_PER_ACT;
        prop_assert!(ready_cost <= balance);

        // Uniqueness: the dedup index and the queue agree on membership.
        prop_assert_eq!(pool.size() as usize, unconfirmed.len());

        // Stored-by-hash lookups resolve for everything still held.
        let mut by_hash = HashMap::new();
        for act in &unconfirmed {
            by_hash.insert(act.hash(), act.clone());
        }
        for (hash, act) in by_hash {
            prop_assert_eq!(pool.get_action_by_hash(&hash).unwrap().nonce(), act.nonce());
        }
    }
}
