// src/codec.rs
//
// Canonical byte streams for hashing and signature verification. Nodes must
// agree on these byte-for-byte: fixed-width integers are little-endian, big
// integers are minimal big-endian magnitude bytes and are elided entirely
// when zero. Free-form payload fields are length-prefixed so a neighboring
// variable-length field cannot absorb their bytes; address fields travel raw
// because admission pins them to exactly 0 or 42 bytes. The signature field
// never enters the stream.

use num_bigint::{BigInt, Sign};
use num_traits::Zero;

use crate::action::{Execution, StartSubChain, Transfer, Vote};

pub const TAG_TRANSFER: u8 = 0;
pub const TAG_VOTE: u8 = 1;
pub const TAG_EXECUTION: u8 = 2;
pub const TAG_START_SUB_CHAIN: u8 = 3;

// --- helpers: write primitives deterministically ---

fn put_u32(dst: &mut Vec<u8>, x: u32) {
    dst.extend_from_slice(&x.to_le_bytes());
}

fn put_u64(dst: &mut Vec<u8>, x: u64) {
    dst.extend_from_slice(&x.to_le_bytes());
}

fn put_bool(dst: &mut Vec<u8>, x: bool) {
    dst.push(x as u8);
}

fn put_bytes(dst: &mut Vec<u8>, bytes: &[u8]) {
    put_u32(dst, bytes.len() as u32); // 4-byte little-endian length
    dst.extend_from_slice(bytes);
}

fn put_bigint(dst: &mut Vec<u8>, x: &BigInt) {
    if !x.is_zero() {
        dst.extend_from_slice(&x.to_bytes_be().1);
    }
}

/// Minimal big-endian magnitude; empty for zero. Wire representation of a
/// big integer (the sign never travels: validation rejects negatives).
pub fn bigint_bytes(x: &BigInt) -> Vec<u8> {
    if x.is_zero() {
        Vec::new()
    } else {
        x.to_bytes_be().1
    }
}

pub fn bigint_from_bytes(bytes: &[u8]) -> BigInt {
    if bytes.is_empty() {
        BigInt::zero()
    } else {
        BigInt::from_bytes_be(Sign::Plus, bytes)
    }
}

// --- per-variant canonical streams ---
// Layout: tag, version(4), nonce(8), variant fields in declaration order,
// sender bytes, sender pubkey(32), gas_limit(8), gas_price.

fn put_header(v: &mut Vec<u8>, tag: u8, version: u32, nonce: u64) {
    v.push(tag);
    put_u32(v, version);
    put_u64(v, nonce);
}

fn put_trailer(v: &mut Vec<u8>, sender: &str, pubkey: &[u8; 32], gas_limit: u64, gas_price: &BigInt) {
    // sender is raw, not length-prefixed: validation fixes addresses to
    // "0x" + 40 hex or empty, so the field cannot bleed into its neighbors.
    v.extend_from_slice(sender.as_bytes());
    v.extend_from_slice(pubkey);
    put_u64(v, gas_limit);
    put_bigint(v, gas_price);
}

pub fn transfer_bytes(tsf: &Transfer) -> Vec<u8> {
    let mut v = Vec::new();
    put_header(&mut v, TAG_TRANSFER, tsf.core.version, tsf.core.nonce);
    v.extend_from_slice(tsf.recipient.as_bytes());
    put_bigint(&mut v, &tsf.amount);
    put_bytes(&mut v, &tsf.payload);
    put_bool(&mut v, tsf.is_coinbase);
    put_trailer(
        &mut v,
        &tsf.core.sender,
        &tsf.core.sender_pubkey,
        tsf.core.gas_limit,
        &tsf.core.gas_price,
    );
    v
}

pub fn vote_bytes(vote: &Vote) -> Vec<u8> {
    let mut v = Vec::new();
    put_header(&mut v, TAG_VOTE, vote.core.version, vote.core.nonce);
    v.extend_from_slice(vote.votee.as_bytes());
    put_trailer(
        &mut v,
        &vote.core.sender,
        &vote.core.sender_pubkey,
        vote.core.gas_limit,
        &vote.core.gas_price,
    );
    v
}

pub fn execution_bytes(exec: &Execution) -> Vec<u8> {
    let mut v = Vec::new();
    put_header(&mut v, TAG_EXECUTION, exec.core.version, exec.core.nonce);
    v.extend_from_slice(exec.contract.as_bytes());
    put_bigint(&mut v, &exec.amount);
    put_bytes(&mut v, &exec.data);
    put_trailer(
        &mut v,
        &exec.core.sender,
        &exec.core.sender_pubkey,
        exec.core.gas_limit,
        &exec.core.gas_price,
    );
    v
}

pub fn start_sub_chain_bytes(start: &StartSubChain) -> Vec<u8> {
    let mut v = Vec::new();
    put_header(&mut v, TAG_START_SUB_CHAIN, start.core.version, start.core.nonce);
    put_u32(&mut v, start.chain_id);
    put_bigint(&mut v, &start.security_deposit);
    put_bigint(&mut v, &start.operation_deposit);
    put_u64(&mut v, start.start_height);
    put_u64(&mut v, start.parent_height_offset);
    put_trailer(
        &mut v,
        &start.core.sender,
        &start.core.sender_pubkey,
        start.core.gas_limit,
        &start.core.gas_price,
    );
    v
}
