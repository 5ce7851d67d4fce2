// src/actpool/queue.rs

use std::collections::BTreeMap;
use std::mem;

use num_bigint::BigInt;
use tracing::warn;

use crate::action::Action;
use super::NonceError;

/// Nonce-indexed pending actions for a single sender.
///
/// `start_nonce` is confirmed nonce + 1 as of initialization or the last
/// reset. `pending_nonce` is the first nonce not yet covered by the ready
/// prefix; every nonce in `[start_nonce, pending_nonce)` is present and the
/// prefix's cumulative cost fits the balance captured at `start_nonce`.
/// `pending_balance` is what remains of that balance after the prefix.
pub struct AccountQueue {
    items: BTreeMap<u64, Action>,
    start_nonce: u64,
    pending_nonce: u64,
    pending_balance: BigInt,
    /// Per-sender nonce window; keys stay in [start_nonce, start_nonce + window).
    window: u64,
}

impl AccountQueue {
    pub fn new(start_nonce: u64, balance: BigInt, window: u64) -> Self {
        Self {
            items: BTreeMap::new(),
            start_nonce,
            pending_nonce: start_nonce,
            pending_balance: balance,
            window,
        }
    }

    /// Insert at the action's nonce. No replacement: an occupied nonce is an
    /// error, as is a nonce outside the account window.
    pub fn put(&mut self, act: Action) -> Result<(), NonceError> {
        let nonce = act.nonce();
        if self.items.contains_key(&nonce) {
            return Err(NonceError::Duplicate);
        }
        match nonce.checked_sub(self.start_nonce) {
            Some(offset) if offset < self.window => {}
            Some(_) => return Err(NonceError::TooLarge),
            None => return Err(NonceError::TooLow),
        }
        self.items.insert(nonce, act);
        Ok(())
    }

    pub fn overlaps(&self, act: &Action) -> bool {
        self.items.contains_key(&act.nonce())
    }

    /// Ready prefix: items at `[start_nonce, pending_nonce)`, ascending.
    pub fn pending_acts(&self) -> Vec<Action> {
        self.items
            .range(self.start_nonce..self.pending_nonce)
            .map(|(_, act)| act.clone())
            .collect()
    }

    /// Every item, ascending nonce.
    pub fn all_acts(&self) -> Vec<Action> {
        self.items.values().cloned().collect()
    }

    /// Remove and return every item below `threshold`. Called after a block
    /// commit raises the confirmed nonce.
    pub fn filter_nonce(&mut self, threshold: u64) -> Vec<Action> {
        let keep = self.items.split_off(&threshold);
        let dropped = mem::replace(&mut self.items, keep);
        dropped.into_values().collect()
    }

    /// Starting at `from`, advance the ready prefix over contiguous items
    /// whose cumulative cost fits `pending_balance`, charging each cost as it
    /// goes. Stops at the first gap or infeasible item and removes everything
    /// at or past the stop point, returning the removals.
    pub fn update_queue(&mut self, from: u64) -> Vec<Action> {
        let mut nonce = from;
        while let Some(act) = self.items.get(&nonce) {
            let cost = match act.cost() {
                Ok(c) => c,
                Err(e) => {
                    warn!(nonce, %e, "treating unpriceable action as infeasible");
                    break;
                }
            };
            if self.pending_balance < cost {
                break;
            }
            self.pending_balance -= cost;
            nonce += 1;
        }
        self.pending_nonce = nonce;
        self.items.split_off(&nonce).into_values().collect()
    }

    pub fn start_nonce(&self) -> u64 {
        self.start_nonce
    }

    pub fn pending_nonce(&self) -> u64 {
        self.pending_nonce
    }

    pub fn pending_balance(&self) -> &BigInt {
        &self.pending_balance
    }

    pub fn set_start_nonce(&mut self, nonce: u64) {
        self.start_nonce = nonce;
    }

    pub fn set_pending_nonce(&mut self, nonce: u64) {
        self.pending_nonce = nonce;
    }

    pub fn set_pending_balance(&mut self, balance: BigInt) {
        self.pending_balance = balance;
    }

    pub fn empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }
}
