use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};

use ethers::types::Address;
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::events::{Proposal, Withdraw};

/// A message waiting for its turn on the account.
#[derive(Debug, Clone)]
pub(super) enum Armed {
    Proposal { message: String, proposal: Proposal },
    Withdraw { message: String, withdraw: Withdraw },
}

impl Armed {
    pub fn account(&self) -> Address {
        match self {
            Armed::Proposal { proposal, .. } => proposal.account,
            Armed::Withdraw { withdraw, .. } => withdraw.account,
        }
    }

    fn order(&self) -> (u64, u64) {
        match self {
            Armed::Proposal { proposal, .. } => (proposal.unlock, proposal.nonce),
            Armed::Withdraw { withdraw, .. } => (withdraw.unlock, 0),
        }
    }
}

type Slot = (u64, u64, u64);

/// Armed messages per account, handed out in unlock then nonce order once
/// they are due.
///
/// Every armed message has a timer task, but the task that wins the account
/// lock takes whatever is due first, so timers firing on the same tick never
/// decide the execution order.
#[derive(Debug, Default)]
pub(super) struct ReadyQueue {
    accounts: Mutex<HashMap<Address, BTreeMap<Slot, (Instant, Armed)>>>,
    sequence: AtomicU64,
}

impl ReadyQueue {
    pub fn push(&self, due: Instant, armed: Armed) {
        let (unlock, nonce) = armed.order();
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        self.accounts
            .lock()
            .entry(armed.account())
            .or_default()
            .insert((unlock, nonce, sequence), (due, armed));
    }

    /// Takes the first message of `account` due at `now`.
    pub fn pop_due(&self, account: Address, now: Instant) -> Option<Armed> {
        let mut accounts = self.accounts.lock();
        let queue = accounts.get_mut(&account)?;
        let slot = queue
            .iter()
            .find(|(_, (due, _))| *due <= now)
            .map(|(slot, _)| *slot)?;
        let armed = queue.remove(&slot).map(|(_, armed)| armed);
        if queue.is_empty() {
            accounts.remove(&account);
        }
        armed
    }

    /// Number of messages waiting, due or not.
    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.accounts.lock().values().map(BTreeMap::len).sum()
    }
}
