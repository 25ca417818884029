use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::hypernode::HyperNodeId;

/// Decides the order in which the local search visits hypernodes.
///
/// An ordering is created once per run and asked to arrange the hypernode
/// list at the start of every level, so a stateful strategy (such as a
/// seeded RNG) advances across levels rather than restarting.
pub trait NodeOrdering {
    fn arrange(&mut self, hypernodes: &mut Vec<HyperNodeId>);
}

/// Keeps hypernodes in arena order.
#[derive(Default, Debug, Clone, Copy)]
pub struct IdentityOrder;

impl NodeOrdering for IdentityOrder {
    fn arrange(&mut self, _hypernodes: &mut Vec<HyperNodeId>) {}
}

/// Pseudo-random permutation seeded once per run.
#[derive(Debug, Clone)]
pub struct SeededShuffle {
    rng: SmallRng,
}

impl SeededShuffle {
    pub fn new(seed: u64) -> Self {
        SeededShuffle {
            rng: SmallRng::seed_from_u64(seed),
        }
    }
}

impl NodeOrdering for SeededShuffle {
    fn arrange(&mut self, hypernodes: &mut Vec<HyperNodeId>) {
        hypernodes.shuffle(&mut self.rng);
    }
}

/// Ordering chosen at runtime, e.g. from the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderingSpecifier {
    Identity,
    Shuffle(Option<u64>),
}

/// Runtime-selected ordering, so the detector stays generic over [NodeOrdering].
#[derive(Debug, Clone)]
pub enum AnyOrdering {
    Identity(IdentityOrder),
    Shuffle(SeededShuffle),
}

impl AnyOrdering {
    /// `default_seed` is used when the specifier does not carry one.
    pub fn from_specifier(spec: OrderingSpecifier, default_seed: u64) -> Self {
        match spec {
            OrderingSpecifier::Identity => AnyOrdering::Identity(IdentityOrder),
            OrderingSpecifier::Shuffle(seed) => {
                AnyOrdering::Shuffle(SeededShuffle::new(seed.unwrap_or(default_seed)))
            }
        }
    }
}

impl NodeOrdering for AnyOrdering {
    fn arrange(&mut self, hypernodes: &mut Vec<HyperNodeId>) {
        match self {
            AnyOrdering::Identity(o) => o.arrange(hypernodes),
            AnyOrdering::Shuffle(o) => o.arrange(hypernodes),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    pub fn same_seed_same_permutations() {
        let mut a = SeededShuffle::new(7);
        let mut b = SeededShuffle::new(7);
        for _ in 0..3 {
            let mut x: Vec<usize> = (0..50).collect();
            let mut y = x.clone();
            a.arrange(&mut x);
            b.arrange(&mut y);
            assert_eq!(x, y);
            let mut sorted = x.clone();
            sorted.sort_unstable();
            assert_eq!((0..50).collect::<Vec<_>>(), sorted);
        }
    }

    #[test]
    pub fn identity_keeps_order() {
        let mut v = vec![3, 1, 2];
        IdentityOrder.arrange(&mut v);
        assert_eq!(vec![3, 1, 2], v);
        let mut any = AnyOrdering::from_specifier(OrderingSpecifier::Identity, 1);
        any.arrange(&mut v);
        assert_eq!(vec![3, 1, 2], v);
    }
}
