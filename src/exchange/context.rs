//! Explicit execution context for distributed operations.
//!
//! Every distributed operation in this crate takes a [`JoinContext`] instead
//! of consulting process-wide communicator/rank globals. The context owns the
//! communicator handle and caches the rank geometry, so call sites stay free
//! of `comm.rank()` boilerplate and a serial run is just a context over
//! [`NoComm`].

use crate::exchange::communicator::{Communicator, NoComm};

/// Communicator handle plus rank geometry, passed into every operation.
#[derive(Debug)]
pub struct JoinContext<C: Communicator> {
    comm: C,
    rank: usize,
    n_ranks: usize,
}

impl JoinContext<NoComm> {
    /// Context for a single-rank (serial) run.
    pub fn serial() -> Self {
        JoinContext::new(NoComm)
    }
}

impl<C: Communicator> JoinContext<C> {
    pub fn new(comm: C) -> Self {
        let rank = comm.rank();
        let n_ranks = comm.size().max(1);
        JoinContext {
            comm,
            rank,
            n_ranks,
        }
    }

    pub fn comm(&self) -> &C {
        &self.comm
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn n_ranks(&self) -> usize {
        self.n_ranks
    }

    /// More than one cooperating rank?
    pub fn is_parallel(&self) -> bool {
        self.n_ranks > 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serial_context_geometry() {
        let ctx = JoinContext::serial();
        assert_eq!(ctx.rank(), 0);
        assert_eq!(ctx.n_ranks(), 1);
        assert!(!ctx.is_parallel());
    }
}
