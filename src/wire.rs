// src/wire.rs
//
// Wire envelope for actions crossing the node boundary. The envelope is the
// serde-facing shape; conversion to and from the in-memory model is lossless
// for every field. Big integers travel as minimal big-endian byte strings,
// empty meaning zero.

use serde::{Deserialize, Serialize};

use crate::action::{Action, ActionCore, Execution, StartSubChain, Transfer, Vote};
use crate::codec::{bigint_bytes, bigint_from_bytes};
use crate::crypto::PublicKey;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActionEnvelope {
    pub version: u32,
    pub nonce: u64,
    pub gas_limit: u64,
    pub gas_price: Vec<u8>,
    pub signature: Vec<u8>,
    pub sender_pubkey: PublicKey,
    pub sender: String,
    pub payload: ActionPayload,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ActionPayload {
    Transfer {
        recipient: String,
        amount: Vec<u8>,
        payload: Vec<u8>,
        is_coinbase: bool,
    },
    Vote {
        votee: String,
    },
    Execution {
        contract: String,
        amount: Vec<u8>,
        data: Vec<u8>,
    },
    StartSubChain {
        chain_id: u32,
        security_deposit: Vec<u8>,
        operation_deposit: Vec<u8>,
        start_height: u64,
        parent_height_offset: u64,
    },
}

impl From<&Action> for ActionEnvelope {
    fn from(act: &Action) -> Self {
        let core = act.core();
        let payload = match act {
            Action::Transfer(t) => ActionPayload::Transfer {
                recipient: t.recipient.clone(),
                amount: bigint_bytes(&t.amount),
                payload: t.payload.clone(),
                is_coinbase: t.is_coinbase,
            },
            Action::Vote(v) => ActionPayload::Vote {
                votee: v.votee.clone(),
            },
            Action::Execution(e) => ActionPayload::Execution {
                contract: e.contract.clone(),
                amount: bigint_bytes(&e.amount),
                data: e.data.clone(),
            },
            Action::StartSubChain(s) => ActionPayload::StartSubChain {
                chain_id: s.chain_id,
                security_deposit: bigint_bytes(&s.security_deposit),
                operation_deposit: bigint_bytes(&s.operation_deposit),
                start_height: s.start_height,
                parent_height_offset: s.parent_height_offset,
            },
        };
        ActionEnvelope {
            version: core.version,
            nonce: core.nonce,
            gas_limit: core.gas_limit,
            gas_price: bigint_bytes(&core.gas_price),
            signature: core.signature.clone(),
            sender_pubkey: core.sender_pubkey,
            sender: core.sender.clone(),
            payload,
        }
    }
}

impl From<ActionEnvelope> for Action {
    fn from(env: ActionEnvelope) -> Self {
        let core = ActionCore {
            version: env.version,
            nonce: env.nonce,
            sender: env.sender,
            sender_pubkey: env.sender_pubkey,
            gas_limit: env.gas_limit,
            gas_price: bigint_from_bytes(&env.gas_price),
            signature: env.signature,
        };
        match env.payload {
            ActionPayload::Transfer {
                recipient,
                amount,
                payload,
                is_coinbase,
            } => Action::Transfer(Transfer {
                core,
                recipient,
                amount: bigint_from_bytes(&amount),
                payload,
                is_coinbase,
            }),
            ActionPayload::Vote { votee } => Action::Vote(Vote { core, votee }),
            ActionPayload::Execution {
                contract,
                amount,
                data,
            } => Action::Execution(Execution {
                core,
                contract,
                amount: bigint_from_bytes(&amount),
                data,
            }),
            ActionPayload::StartSubChain {
                chain_id,
                security_deposit,
                operation_deposit,
                start_height,
                parent_height_offset,
            } => Action::StartSubChain(StartSubChain {
                core,
                chain_id,
                security_deposit: bigint_from_bytes(&security_deposit),
                operation_deposit: bigint_from_bytes(&operation_deposit),
                start_height,
                parent_height_offset,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_bigint::BigInt;
    use num_traits::Zero;

    fn addr(i: u8) -> String {
        format!("0x{:02x}{:02x}000000000000000000000000000000000000", i, i)
    }

    fn sample_actions() -> Vec<Action> {
        let key = ed25519_dalek::SigningKey::from_bytes(&[5u8; 32]);
        let mut acts: Vec<Action> = vec![
            Transfer::new(
                1,
                addr(1),
                addr(2),
                BigInt::from(42u32),
                b"memo".to_vec(),
                1_000_000,
                BigInt::from(7u32),
            )
            .into(),
            Vote::new(2, addr(1), String::new(), 1_000_000, BigInt::zero()).into(),
            Execution::new(
                3,
                addr(1),
                String::new(),
                BigInt::zero(),
                vec![0xde, 0xad],
                1_000_000,
                BigInt::from(1u32),
            )
            .into(),
            StartSubChain::new(
                4,
                9,
                addr(1),
                BigInt::from(1_000_000u64),
                BigInt::zero(),
                50,
                5,
                1_000_000,
                BigInt::from(2u32),
            )
            .into(),
        ];
        for act in &mut acts {
            act.sign(&key);
        }
        acts
    }

    #[test]
    fn envelope_round_trip_is_lossless() {
        for act in sample_actions() {
            let env = ActionEnvelope::from(&act);
            let back: Action = env.into();
            assert_eq!(back, act);
            assert_eq!(back.hash(), act.hash());
        }
    }

    #[test]
    fn zero_big_integers_travel_empty() {
        let vote = Vote::new(2, addr(1), String::new(), 1_000_000, BigInt::zero());
        let env = ActionEnvelope::from(&Action::Vote(vote));
        assert!(env.gas_price.is_empty());
    }

    #[test]
    fn envelope_survives_serde() {
        for act in sample_actions() {
            let env = ActionEnvelope::from(&act);
            let json = serde_json::to_string(&env).expect("serialize");
            let decoded: ActionEnvelope = serde_json::from_str(&json).expect("deserialize");
            assert_eq!(decoded, env);
            let back: Action = decoded.into();
            assert_eq!(back, act);
        }
    }
}
