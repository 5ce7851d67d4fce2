// src/actpool/mod.rs

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use num_traits::Signed;
use tracing::{debug, error, warn};

use crate::action::{Action, Execution, Transfer, Vote, BLOCK_GAS_LIMIT, EMPTY_ADDRESS};
use crate::chain::ChainStateView;
use crate::crypto::{self, Hash32};

pub mod queue;
use queue::AccountQueue;


/// Maximum canonical size of a transfer allowed into the pool.
pub const TRANSFER_SIZE_LIMIT: usize = 32 * 1024;
/// Maximum canonical size of a vote allowed into the pool.
pub const VOTE_SIZE_LIMIT: usize = 278;
/// Maximum canonical size of an execution allowed into the pool.
pub const EXECUTION_SIZE_LIMIT: usize = 32 * 1024;

#[derive(Clone, Debug)]
pub struct ActPoolConfig {
    /// Pool-wide action capacity.
    pub max_num_acts_per_pool: u64,
    /// Per-sender nonce window.
    pub max_num_acts_per_acct: u64,
    /// Upper bound on actions returned by `pick_acts`; 0 means unlimited.
    pub max_num_acts_to_pick: u64,
}

impl Default for ActPoolConfig {
    fn default() -> Self {
        Self {
            max_num_acts_per_pool: 32_000,
            max_num_acts_per_acct: 2_000,
            max_num_acts_to_pick: 0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NonceError {
    TooLow,
    Duplicate,
    TooLarge,
}

#[derive(Clone, Debug, PartialEq)]
pub enum PoolError {
    /// Hash already present in the pool.
    Duplicate,
    Nonce(NonceError),
    Balance(&'static str),
    GasHigherThanLimit,
    InsufficientGas,
    /// Structural or capacity violation ("oversized data", "insufficient space", ...).
    ActPool(&'static str),
    /// Votee has not self-nominated as a candidate.
    Votee,
    Signature,
    Address,
    /// Lookup by hash missed.
    Hash,
    /// A chain-state façade call failed.
    ChainState(String),
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolError::Duplicate => write!(f, "action already exists in pool"),
            PoolError::Nonce(NonceError::TooLow) => write!(f, "invalid nonce: too low"),
            PoolError::Nonce(NonceError::Duplicate) => write!(f, "invalid nonce: duplicate"),
            PoolError::Nonce(NonceError::TooLarge) => write!(f, "invalid nonce: too large"),
            PoolError::Balance(msg) => write!(f, "invalid balance: {msg}"),
            PoolError::GasHigherThanLimit => write!(f, "gas is higher than gas limit"),
            PoolError::InsufficientGas => write!(f, "insufficient intrinsic gas value"),
            PoolError::ActPool(msg) => write!(f, "invalid actpool: {msg}"),
            PoolError::Votee => write!(f, "votee is not a candidate"),
            PoolError::Signature => write!(f, "failed to verify signature"),
            PoolError::Address => write!(f, "invalid address"),
            PoolError::Hash => write!(f, "invalid hash"),
            PoolError::ChainState(msg) => write!(f, "chain state failure: {msg}"),
        }
    }
}

/// Domain-specific admission hook; rejections are opaque to the pool.
/// Validators run in registration order on the generic `add` path.
pub trait ActionValidator: Send + Sync {
    fn validate(&self, act: &Action) -> Result<(), PoolError>;
}

/// Ready actions split into the four block-builder lanes.
#[derive(Clone, Debug, Default)]
pub struct PickedActs {
    pub transfers: Vec<Transfer>,
    pub votes: Vec<Vote>,
    pub executions: Vec<Execution>,
    pub others: Vec<Action>,
}

impl PickedActs {
    pub fn total(&self) -> usize {
        self.transfers.len() + self.votes.len() + self.executions.len() + self.others.len()
    }
}

/// Public pool interface. Implementations live behind this trait.
pub trait ActPool: Send + Sync {
    /// Reconcile pool state against committed chain state.
    fn reset(&self);
    /// Ready prefixes of every account, split by variant lane.
    fn pick_acts(&self) -> PickedActs;
    fn add_transfer(&self, tsf: Transfer) -> Result<(), PoolError>;
    fn add_vote(&self, vote: Vote) -> Result<(), PoolError>;
    fn add_execution(&self, exec: Execution) -> Result<(), PoolError>;
    /// Generic entry: capacity + dedup + registered validators, no per-variant prechecks.
    fn add(&self, act: Action) -> Result<(), PoolError>;
    /// Pending nonce if the account has a queue, otherwise confirmed nonce + 1.
    fn get_pending_nonce(&self, addr: &str) -> Result<u64, PoolError>;
    fn get_unconfirmed_acts(&self, addr: &str) -> Vec<Action>;
    fn get_action_by_hash(&self, hash: &Hash32) -> Result<Action, PoolError>;
    fn size(&self) -> u64;
    fn capacity(&self) -> u64;
}

struct PoolInner {
    account_acts: HashMap<String, AccountQueue>,
    all_actions: HashMap<Hash32, Action>,
}

pub struct ActPoolImpl {
    cfg: ActPoolConfig,
    chain: Arc<dyn ChainStateView>,
    validators: Vec<Box<dyn ActionValidator>>,
    inner: RwLock<PoolInner>,
}

impl ActPoolImpl {
    pub fn new(
        chain: Arc<dyn ChainStateView>,
        cfg: ActPoolConfig,
        validators: Vec<Box<dyn ActionValidator>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            cfg,
            chain,
            validators,
            inner: RwLock::new(PoolInner {
                account_acts: HashMap::new(),
                all_actions: HashMap::new(),
            }),
        })
    }

    // ---------------- validation ----------------

    fn confirmed_nonce(&self, addr: &str) -> Result<u64, PoolError> {
        self.chain.nonce(addr).map_err(|e| {
            error!(%e, addr, "chain lookup failed during validation");
            PoolError::ChainState(e.0)
        })
    }

    fn validate_transfer(&self, tsf: &Transfer) -> Result<(), PoolError> {
        if tsf.is_coinbase {
            return Err(PoolError::ActPool("coinbase transfer"));
        }
        if tsf.total_size() > TRANSFER_SIZE_LIMIT {
            return Err(PoolError::ActPool("oversized data"));
        }
        if tsf.core.gas_limit > BLOCK_GAS_LIMIT {
            return Err(PoolError::GasHigherThanLimit);
        }
        match tsf.intrinsic_gas() {
            Ok(gas) if gas <= tsf.core.gas_limit => {}
            _ => return Err(PoolError::InsufficientGas),
        }
        if tsf.amount.is_negative() {
            return Err(PoolError::Balance("negative value"));
        }
        if !crypto::is_hex_addr(&tsf.core.sender) {
            return Err(PoolError::Address);
        }
        if tsf.recipient != EMPTY_ADDRESS && !crypto::is_hex_addr(&tsf.recipient) {
            return Err(PoolError::Address);
        }
        crypto::verify_signature(&tsf.core.sender_pubkey, &tsf.byte_stream(), &tsf.core.signature)
            .map_err(|_| PoolError::Signature)?;
        let confirmed = self.confirmed_nonce(&tsf.core.sender)?;
        if tsf.core.nonce <= confirmed {
            return Err(PoolError::Nonce(NonceError::TooLow));
        }
        Ok(())
    }

    fn validate_vote(&self, vote: &Vote) -> Result<(), PoolError> {
        if vote.total_size() > VOTE_SIZE_LIMIT {
            return Err(PoolError::ActPool("oversized data"));
        }
        if vote.core.gas_limit > BLOCK_GAS_LIMIT {
            return Err(PoolError::GasHigherThanLimit);
        }
        match vote.intrinsic_gas() {
            Ok(gas) if gas <= vote.core.gas_limit => {}
            _ => return Err(PoolError::InsufficientGas),
        }
        if !crypto::is_hex_addr(&vote.core.sender) {
            return Err(PoolError::Address);
        }
        if vote.votee != EMPTY_ADDRESS && !crypto::is_hex_addr(&vote.votee) {
            return Err(PoolError::Address);
        }
        crypto::verify_signature(&vote.core.sender_pubkey, &vote.byte_stream(), &vote.core.signature)
            .map_err(|_| PoolError::Signature)?;
        let confirmed = self.confirmed_nonce(&vote.core.sender)?;
        if vote.core.nonce <= confirmed {
            return Err(PoolError::Nonce(NonceError::TooLow));
        }
        if vote.votee != EMPTY_ADDRESS && vote.votee != vote.core.sender {
            let votee_state = self.chain.state(&vote.votee).map_err(|e| {
                error!(%e, votee = %vote.votee, "failed to read votee state");
                PoolError::ChainState(e.0)
            })?;
            if !votee_state.is_candidate {
                warn!(voter = %vote.core.sender, votee = %vote.votee, "votee has not self-nominated");
                return Err(PoolError::Votee);
            }
        }
        Ok(())
    }

    fn validate_execution(&self, exec: &Execution) -> Result<(), PoolError> {
        if exec.total_size() > EXECUTION_SIZE_LIMIT {
            return Err(PoolError::ActPool("oversized data"));
        }
        if exec.core.gas_limit > BLOCK_GAS_LIMIT {
            return Err(PoolError::GasHigherThanLimit);
        }
        match exec.intrinsic_gas() {
            Ok(gas) if gas <= exec.core.gas_limit => {}
            _ => return Err(PoolError::InsufficientGas),
        }
        if exec.amount.is_negative() {
            return Err(PoolError::Balance("negative value"));
        }
        if !crypto::is_hex_addr(&exec.core.sender) {
            return Err(PoolError::Address);
        }
        if exec.contract != EMPTY_ADDRESS && !crypto::is_hex_addr(&exec.contract) {
            return Err(PoolError::Address);
        }
        crypto::verify_signature(&exec.core.sender_pubkey, &exec.byte_stream(), &exec.core.signature)
            .map_err(|_| PoolError::Signature)?;
        let confirmed = self.confirmed_nonce(&exec.core.sender)?;
        if exec.core.nonce <= confirmed {
            return Err(PoolError::Nonce(NonceError::TooLow));
        }
        Ok(())
    }

    // ---------------- admission ----------------

    fn enqueue_action(
        &self,
        inner: &mut PoolInner,
        sender: String,
        act: Action,
        hash: Hash32,
        act_nonce: u64,
    ) -> Result<(), PoolError> {
        let created = !inner.account_acts.contains_key(&sender);
        if created {
            let confirmed = self.chain.nonce(&sender).map_err(|e| {
                error!(%e, "chain lookup failed while adding action");
                PoolError::ChainState(e.0)
            })?;
            let balance = self.chain.balance(&sender).map_err(|e| {
                error!(%e, "chain lookup failed while adding action");
                PoolError::ChainState(e.0)
            })?;
            inner.account_acts.insert(
                sender.clone(),
                AccountQueue::new(confirmed + 1, balance, self.cfg.max_num_acts_per_acct),
            );
        }
        let res = self.try_enqueue(inner, &sender, act, hash, act_nonce);
        // A rejection must not leave behind the queue it just created empty.
        if res.is_err() && created {
            if let Some(queue) = inner.account_acts.get(&sender) {
                if queue.empty() {
                    inner.account_acts.remove(&sender);
                }
            }
        }
        res
    }

    fn try_enqueue(
        &self,
        inner: &mut PoolInner,
        sender: &str,
        act: Action,
        hash: Hash32,
        act_nonce: u64,
    ) -> Result<(), PoolError> {
        let queue = inner
            .account_acts
            .get_mut(sender)
            .expect("queue ensured by caller");

        if queue.overlaps(&act) {
            warn!(hash = %hex::encode(hash), "rejecting action: replacement is not supported");
            return Err(PoolError::Nonce(NonceError::Duplicate));
        }
        if act_nonce.saturating_sub(queue.start_nonce()) >= self.cfg.max_num_acts_per_acct {
            debug!(
                hash = %hex::encode(hash),
                start_nonce = queue.start_nonce(),
                act_nonce,
                "rejecting action: nonce too large"
            );
            return Err(PoolError::Nonce(NonceError::TooLarge));
        }

        // Value-moving variants must fit the projected balance up front.
        match &act {
            Action::Transfer(_) | Action::Vote(_) | Action::Execution(_) => {
                let cost = act.cost().map_err(|e| {
                    warn!(hash = %hex::encode(hash), %e, "failed to price action");
                    PoolError::InsufficientGas
                })?;
                if queue.pending_balance() < &cost {
                    warn!(hash = %hex::encode(hash), "rejecting action: insufficient balance");
                    return Err(PoolError::Balance("insufficient funds"));
                }
            }
            Action::StartSubChain(_) => {}
        }

        let pending = queue.pending_nonce();
        queue.put(act.clone()).map_err(PoolError::Nonce)?;
        inner.all_actions.insert(hash, act);
        if act_nonce == pending {
            Self::update_account(inner, sender);
        }
        Ok(())
    }

    /// Re-extend the sender's ready prefix and purge anything the extension
    /// invalidated; drops the queue entry once empty.
    fn update_account(inner: &mut PoolInner, sender: &str) {
        let Some(queue) = inner.account_acts.get_mut(sender) else {
            return;
        };
        let from = queue.pending_nonce();
        let removed = queue.update_queue(from);
        let empty = queue.empty();
        for act in removed {
            let hash = act.hash();
            debug!(hash = %hex::encode(hash), "removed invalidated action");
            inner.all_actions.remove(&hash);
        }
        if empty {
            inner.account_acts.remove(sender);
        }
    }

    /// Drop every action already committed to a block. Returns false if a
    /// chain lookup failed, in which case the reset is abandoned mid-way.
    fn remove_confirmed_acts(&self, inner: &mut PoolInner) -> bool {
        let senders: Vec<String> = inner.account_acts.keys().cloned().collect();
        for from in senders {
            let confirmed = match self.chain.nonce(&from) {
                Ok(n) => n,
                Err(e) => {
                    error!(%e, "error when removing confirmed actions");
                    return false;
                }
            };
            let Some(queue) = inner.account_acts.get_mut(&from) else {
                continue;
            };
            let removed = queue.filter_nonce(confirmed + 1);
            let empty = queue.empty();
            for act in removed {
                inner.all_actions.remove(&act.hash());
            }
            if empty {
                inner.account_acts.remove(&from);
            }
        }
        true
    }
}

impl ActPool for ActPoolImpl {
    /// Step I: drop actions already committed to a block.
    /// Step II: refresh each surviving account's projected balance.
    /// Step III: rewind pending nonce to the confirmed floor, then re-extend
    /// the ready prefix so items made infeasible by the new balance are
    /// re-examined and purged. A chain lookup failure aborts the remainder of
    /// the pass; already-processed queues keep their new state.
    fn reset(&self) {
        let mut inner = self.inner.write().expect("actpool lock poisoned");
        if !self.remove_confirmed_acts(&mut inner) {
            return;
        }
        let senders: Vec<String> = inner.account_acts.keys().cloned().collect();
        for from in senders {
            let balance = match self.chain.balance(&from) {
                Ok(b) => b,
                Err(e) => {
                    error!(%e, "error when resetting actpool state");
                    return;
                }
            };
            let confirmed = match self.chain.nonce(&from) {
                Ok(n) => n,
                Err(e) => {
                    error!(%e, "error when resetting actpool state");
                    return;
                }
            };
            let Some(queue) = inner.account_acts.get_mut(&from) else {
                continue;
            };
            let pending = confirmed + 1;
            queue.set_pending_balance(balance);
            queue.set_start_nonce(pending);
            queue.set_pending_nonce(pending);
            Self::update_account(&mut inner, &from);
        }
    }

    fn pick_acts(&self) -> PickedActs {
        // Writer side: walks every queue and must not interleave with admission.
        let inner = self.inner.write().expect("actpool lock poisoned");

        let mut picked = PickedActs::default();
        let mut num_acts = 0u64;
        for queue in inner.account_acts.values() {
            for act in queue.pending_acts() {
                match act {
                    Action::Transfer(t) => picked.transfers.push(t),
                    Action::Vote(v) => picked.votes.push(v),
                    Action::Execution(e) => picked.executions.push(e),
                    other => picked.others.push(other),
                }
                num_acts += 1;
                if self.cfg.max_num_acts_to_pick > 0 && num_acts >= self.cfg.max_num_acts_to_pick
                {
                    debug!(
                        limit = self.cfg.max_num_acts_to_pick,
                        "reached the max number of actions to pick"
                    );
                    return picked;
                }
            }
        }
        picked
    }

    fn add_transfer(&self, tsf: Transfer) -> Result<(), PoolError> {
        let mut inner = self.inner.write().expect("actpool lock poisoned");

        let hash = tsf.hash();
        if inner.all_actions.contains_key(&hash) {
            warn!(hash = %hex::encode(hash), "rejecting existed transfer");
            return Err(PoolError::Duplicate);
        }
        if let Err(e) = self.validate_transfer(&tsf) {
            warn!(hash = %hex::encode(hash), %e, "rejecting invalid transfer");
            return Err(e);
        }
        if inner.all_actions.len() as u64 >= self.cfg.max_num_acts_per_pool {
            warn!(hash = %hex::encode(hash), "rejecting transfer due to insufficient space");
            return Err(PoolError::ActPool("insufficient space"));
        }
        let sender = tsf.core.sender.clone();
        let nonce = tsf.core.nonce;
        self.enqueue_action(&mut inner, sender, Action::Transfer(tsf), hash, nonce)
    }

    fn add_vote(&self, vote: Vote) -> Result<(), PoolError> {
        let mut inner = self.inner.write().expect("actpool lock poisoned");

        let hash = vote.hash();
        if inner.all_actions.contains_key(&hash) {
            warn!(hash = %hex::encode(hash), "rejecting existed vote");
            return Err(PoolError::Duplicate);
        }
        if let Err(e) = self.validate_vote(&vote) {
            warn!(hash = %hex::encode(hash), %e, "rejecting invalid vote");
            return Err(e);
        }
        if inner.all_actions.len() as u64 >= self.cfg.max_num_acts_per_pool {
            warn!(hash = %hex::encode(hash), "rejecting vote due to insufficient space");
            return Err(PoolError::ActPool("insufficient space"));
        }
        let sender = vote.core.sender.clone();
        let nonce = vote.core.nonce;
        self.enqueue_action(&mut inner, sender, Action::Vote(vote), hash, nonce)
    }

    fn add_execution(&self, exec: Execution) -> Result<(), PoolError> {
        let mut inner = self.inner.write().expect("actpool lock poisoned");

        let hash = exec.hash();
        if inner.all_actions.contains_key(&hash) {
            warn!(hash = %hex::encode(hash), "rejecting existed execution");
            return Err(PoolError::Duplicate);
        }
        if let Err(e) = self.validate_execution(&exec) {
            warn!(hash = %hex::encode(hash), %e, "rejecting invalid execution");
            return Err(e);
        }
        if inner.all_actions.len() as u64 >= self.cfg.max_num_acts_per_pool {
            warn!(hash = %hex::encode(hash), "rejecting execution due to insufficient space");
            return Err(PoolError::ActPool("insufficient space"));
        }
        let sender = exec.core.sender.clone();
        let nonce = exec.core.nonce;
        self.enqueue_action(&mut inner, sender, Action::Execution(exec), hash, nonce)
    }

    fn add(&self, act: Action) -> Result<(), PoolError> {
        let mut inner = self.inner.write().expect("actpool lock poisoned");

        if inner.all_actions.len() as u64 >= self.cfg.max_num_acts_per_pool {
            return Err(PoolError::ActPool("insufficient space"));
        }
        let hash = act.hash();
        if inner.all_actions.contains_key(&hash) {
            return Err(PoolError::Duplicate);
        }
        for validator in &self.validators {
            if let Err(e) = validator.validate(&act) {
                warn!(hash = %hex::encode(hash), %e, "rejecting action failing validator");
                return Err(e);
            }
        }
        let sender = act.sender().to_string();
        let nonce = act.nonce();
        self.enqueue_action(&mut inner, sender, act, hash, nonce)
    }

    fn get_pending_nonce(&self, addr: &str) -> Result<u64, PoolError> {
        let inner = self.inner.write().expect("actpool lock poisoned");

        if let Some(queue) = inner.account_acts.get(addr) {
            return Ok(queue.pending_nonce());
        }
        let confirmed = self
            .chain
            .nonce(addr)
            .map_err(|e| PoolError::ChainState(e.0))?;
        Ok(confirmed + 1)
    }

    fn get_unconfirmed_acts(&self, addr: &str) -> Vec<Action> {
        let inner = self.inner.write().expect("actpool lock poisoned");

        inner
            .account_acts
            .get(addr)
            .map(|queue| queue.all_acts())
            .unwrap_or_default()
    }

    fn get_action_by_hash(&self, hash: &Hash32) -> Result<Action, PoolError> {
        let inner = self.inner.read().expect("actpool lock poisoned");

        inner.all_actions.get(hash).cloned().ok_or(PoolError::Hash)
    }

    fn size(&self) -> u64 {
        let inner = self.inner.read().expect("actpool lock poisoned");

        inner.all_actions.len() as u64
    }

    fn capacity(&self) -> u64 {
        self.cfg.max_num_acts_per_pool
    }
}
