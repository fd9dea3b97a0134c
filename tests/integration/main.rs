//! End-to-end tests covering full election flows and the wire formats.

use rand_core::{CryptoRng, RngCore};

use hom_tally::{
    group::GroupParams,
    sharing::{Authority, KeySet, KeyShare, Params},
};

mod election;
mod wire;

/// Runs a complete key generation ceremony with in-memory message passing.
pub fn run_key_generation<R: CryptoRng + RngCore>(
    sharing: Params,
    group: &GroupParams,
    rng: &mut R,
) -> Vec<(KeyShare, KeySet)> {
    let count = sharing.authorities;
    let mut authorities: Vec<_> = (0..count)
        .map(|index| Authority::new(sharing, group.clone(), index, rng))
        .collect();

    for sender in 0..count {
        let commitments = authorities[sender].commitments().clone();
        for receiver in 0..count {
            if sender != receiver {
                authorities[receiver]
                    .insert_commitments(sender, commitments.clone())
                    .unwrap();
            }
        }
    }
    for sender in 0..count {
        for receiver in 0..count {
            if sender == receiver {
                continue;
            }
            let key = authorities[receiver].transport_key().clone();
            let share = authorities[sender]
                .encrypted_share_for(receiver, &key, rng)
                .unwrap();
            authorities[receiver].receive_share(sender, &share).unwrap();
        }
    }

    authorities
        .into_iter()
        .map(|authority| authority.finalize().unwrap())
        .collect()
}
