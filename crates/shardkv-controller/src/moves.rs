// SPDX-License-Identifier: Apache-2.0
//! Decomposing a `Move` request's requested shards into the maximal,
//! ownership-aligned pieces that must actually change hands.

use shardkv_proto::config::Configuration;
use shardkv_proto::shard::{rank, Shard};

/// One piece of an in-flight move: `shard` is headed for the move's `dest`.
/// `source` is the server it currently resides on, or `None` if the range is
/// not currently owned by anyone — the bootstrap path by which a shard first
/// gets placed on a server, with no peer hand-off involved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Piece {
    pub source: Option<String>,
    pub shard: Shard,
}

/// Find the server owning key-space rank `r` in `configuration`, and the
/// highest rank that owner's covering shard extends to.
fn owner_at(configuration: &Configuration, r: u32) -> Option<(&str, u32)> {
    configuration.servers().find_map(|(addr, shards)| {
        shards
            .iter()
            .find(|s| rank(s.low).zip(rank(s.high)).is_some_and(|(lo, hi)| lo <= r && r <= hi))
            .map(|s| (addr, rank(s.high).expect("shard already validated by caller")))
    })
}

/// Decompose `requested` against the current `configuration`, returning the
/// maximal disjoint pieces aligned to existing ownership boundaries. Pieces
/// already owned by `dest` are omitted (they're no-ops). A requested range
/// with no current owner becomes a single sourceless piece — the only way a
/// shard is ever placed on a server for the first time.
pub fn decompose(requested: &[Shard], configuration: &Configuration, dest: &str) -> Result<Vec<Piece>, String> {
    let mut pieces = Vec::new();
    for req in requested {
        let (Some(lo), Some(hi)) = (rank(req.low), rank(req.high)) else {
            return Err(format!("requested shard {req:?} is invalid"));
        };
        let mut r = lo;
        while r <= hi {
            match owner_at(configuration, r) {
                Some((addr, owned_high)) => {
                    let piece_high = hi.min(owned_high);
                    if addr != dest {
                        pieces.push(Piece {
                            source: Some(addr.to_string()),
                            shard: Shard::from_ranks(r, piece_high),
                        });
                    }
                    r = piece_high + 1;
                }
                None => {
                    let mut end = r;
                    while end < hi && owner_at(configuration, end + 1).is_none() {
                        end += 1;
                    }
                    pieces.push(Piece {
                        source: None,
                        shard: Shard::from_ranks(r, end),
                    });
                    r = end + 1;
                }
            }
        }
    }
    Ok(pieces)
}
