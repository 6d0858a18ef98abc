//! ABI fragments of the contracts the keeper calls.
//!
//! Accounts are modular smart accounts with the exa plugin installed; the
//! previewer exposes the pending proposals of an account and markets are
//! ERC-4626 vaults.

use ethers::abi::{Function, Param, ParamType, StateMutability};

use crate::keeper::{ErrorRegistry, KnownError};

#[allow(deprecated)]
fn function(
    name: &str,
    inputs: Vec<(&str, ParamType)>,
    outputs: Vec<(&str, ParamType)>,
    state_mutability: StateMutability,
) -> Function {
    let params = |params: Vec<(&str, ParamType)>| {
        params
            .into_iter()
            .map(|(name, kind)| Param {
                name: name.to_owned(),
                kind,
                internal_type: None,
            })
            .collect()
    };
    Function {
        name: name.to_owned(),
        inputs: params(inputs),
        outputs: params(outputs),
        constant: None,
        state_mutability,
    }
}

/// `executeProposal(uint256 nonce)` on the account.
pub fn execute_proposal() -> Function {
    function(
        "executeProposal",
        vec![("nonce", ParamType::Uint(256))],
        vec![],
        StateMutability::NonPayable,
    )
}

/// `setProposalNonce(uint256 nonce)` on the account, skips every proposal below `nonce`.
pub fn set_proposal_nonce() -> Function {
    function(
        "setProposalNonce",
        vec![("nonce", ParamType::Uint(256))],
        vec![],
        StateMutability::NonPayable,
    )
}

/// Legacy `withdraw()` on the account.
pub fn withdraw() -> Function {
    function("withdraw", vec![], vec![], StateMutability::NonPayable)
}

/// `(uint256 amount, address market, bytes data, uint8 proposalType, uint256 timestamp)`
pub fn proposal_tuple() -> ParamType {
    ParamType::Tuple(vec![
        ParamType::Uint(256),
        ParamType::Address,
        ParamType::Bytes,
        ParamType::Uint(8),
        ParamType::Uint(256),
    ])
}

/// `pendingProposals(address account)` on the previewer.
pub fn pending_proposals() -> Function {
    let pending = ParamType::Tuple(vec![
        ParamType::Uint(256),
        proposal_tuple(),
        ParamType::Uint(256),
    ]);
    function(
        "pendingProposals",
        vec![("account", ParamType::Address)],
        vec![("pendingProposals", ParamType::Array(Box::new(pending)))],
        StateMutability::View,
    )
}

pub fn decimals() -> Function {
    function(
        "decimals",
        vec![],
        vec![("", ParamType::Uint(8))],
        StateMutability::View,
    )
}

pub fn symbol() -> Function {
    function(
        "symbol",
        vec![],
        vec![("", ParamType::String)],
        StateMutability::View,
    )
}

pub fn not_next() -> KnownError {
    KnownError::new("NotNext", vec![])
}

pub fn no_proposal() -> KnownError {
    KnownError::new("NoProposal", vec![])
}

/// `PreExecHookReverted(address plugin, uint8 functionId, bytes revertReason)`
pub fn pre_exec_hook_reverted() -> KnownError {
    KnownError::new(
        "PreExecHookReverted",
        vec![ParamType::Address, ParamType::Uint(8), ParamType::Bytes],
    )
}

/// `WrappedError(address target, bytes4 selector, bytes reason, bytes details)`
pub fn wrapped_error() -> KnownError {
    KnownError::new(
        "WrappedError",
        vec![
            ParamType::Address,
            ParamType::FixedBytes(4),
            ParamType::Bytes,
            ParamType::Bytes,
        ],
    )
}

/// Errors raised by accounts, the plugin and the proposal manager.
pub fn account_errors() -> ErrorRegistry {
    ErrorRegistry::new(vec![
        not_next(),
        no_proposal(),
        pre_exec_hook_reverted(),
        wrapped_error(),
        KnownError::new("Unauthorized", vec![]),
        KnownError::new("Replay", vec![]),
        KnownError::new("NoBalance", vec![]),
        KnownError::new("InsufficientBalance", vec![]),
    ])
}
