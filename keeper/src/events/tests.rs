use std::sync::Arc;

use ethers::abi::{self, Token};
use ethers::contract::EthEvent;
use ethers::types::{Address, Bytes, H256, U256};
use ethers::utils::to_checksum;

use crate::keeper::tests::RecordingReporter;

use super::{
    decode_block, AccountEvent, BlockLog, BlockPayload, LegacyProposedFilter, Proposal,
    ProposalType, ProposedFilter, Withdraw,
};

const TIMESTAMP: u64 = 1_700_000_000;

fn topic(address: Address) -> H256 {
    H256::from(address)
}

fn proposed_log(account: Address, nonce: u64, proposal_type: u8, unlock: u64) -> BlockLog {
    BlockLog {
        topics: vec![
            ProposedFilter::signature(),
            topic(account),
            H256::from_low_u64_be(nonce),
            topic(market()),
        ],
        data: abi::encode(&[
            Token::Uint(proposal_type.into()),
            Token::Uint(U256::exp10(6)),
            Token::Bytes(abi::encode(&[Token::Address(receiver())])),
            Token::Uint(unlock.into()),
        ])
        .into(),
        contract_address: account,
    }
}

fn legacy_log(account: Address, unlock: u64) -> BlockLog {
    BlockLog {
        topics: vec![
            LegacyProposedFilter::signature(),
            topic(account),
            topic(market()),
            topic(receiver()),
        ],
        data: abi::encode(&[Token::Uint(U256::exp10(18)), Token::Uint(unlock.into())]).into(),
        contract_address: account,
    }
}

fn market() -> Address {
    Address::repeat_byte(0x0c)
}

fn receiver() -> Address {
    Address::repeat_byte(0x0e)
}

fn payload(logs: Vec<BlockLog>) -> BlockPayload {
    BlockPayload {
        block_timestamp: Some(TIMESTAMP),
        logs,
    }
}

#[test]
fn test_event_signatures_match_deployed_contracts() {
    assert_eq!(
        format!("{:?}", ProposedFilter::signature()),
        "0x4cf7794d9c19185f7d95767c53e511e2e67ae50f68ece9c9079c6ae83403a3e7"
    );
    assert_eq!(
        format!("{:?}", LegacyProposedFilter::signature()),
        "0x0c652a21d96e4efed065c3ef5961e4be681be99b95dd55126669ae9be95767e0"
    );
}

#[test]
fn test_proposals_are_grouped_by_account_and_sorted_by_nonce() {
    let alice = Address::repeat_byte(0xa1);
    let bob = Address::repeat_byte(0xb0);
    let reporter = RecordingReporter::default();

    let block = decode_block(
        &payload(vec![
            proposed_log(alice, 6, 7, 200),
            proposed_log(bob, 1, 5, 100),
            proposed_log(alice, 5, 7, 200),
        ]),
        &reporter,
    );

    let nonces = |account: Address| {
        block.proposals[&account]
            .iter()
            .map(|proposal| proposal.nonce)
            .collect::<Vec<_>>()
    };
    assert_eq!(nonces(alice), vec![5, 6]);
    assert_eq!(nonces(bob), vec![1]);
    assert!(block.withdraws.is_empty());
    assert!(reporter.reports.lock().is_empty());

    let proposal = &block.proposals[&bob][0];
    assert_eq!(proposal.proposal_type, ProposalType::RollDebt);
    assert_eq!(proposal.market, market());
    assert_eq!(proposal.amount, U256::exp10(6));
    assert_eq!(proposal.unlock, 100);
    assert_eq!(proposal.timestamp, TIMESTAMP);
    assert_eq!(
        proposal.id,
        format!(
            "{}:{}:{TIMESTAMP}",
            to_checksum(&bob, None),
            to_checksum(&market(), None)
        )
    );
    assert_eq!(proposal.score(), 101.0);
}

#[test]
fn test_legacy_withdraws_are_decoded() {
    let account = Address::repeat_byte(0xa1);
    let reporter = RecordingReporter::default();

    let block = decode_block(&payload(vec![legacy_log(account, 300)]), &reporter);

    assert!(block.proposals.is_empty());
    assert_eq!(
        block.withdraws,
        vec![Withdraw::new(
            account,
            market(),
            receiver(),
            U256::exp10(18),
            300,
            TIMESTAMP
        )]
    );
    assert_eq!(block.withdraws[0].score(), 300.0);
}

#[test]
fn test_malformed_logs_are_reported_and_dropped() {
    let account = Address::repeat_byte(0xa1);
    let mut truncated = proposed_log(account, 2, 7, 100);
    truncated.data = Bytes::from(vec![0x01]);
    let reporter = Arc::new(RecordingReporter::default());

    let block = decode_block(
        &payload(vec![
            truncated,
            // unknown proposal type
            proposed_log(account, 3, 42, 100),
            proposed_log(account, 4, 0, 100),
        ]),
        reporter.as_ref(),
    );

    assert_eq!(block.proposals[&account].len(), 1);
    assert_eq!(block.proposals[&account][0].proposal_type, ProposalType::None);
    let reasons = reporter.reasons();
    assert_eq!(reasons.len(), 2);
    assert!(reasons[1].contains("unknown proposal type 42"));
}

#[test]
fn test_unrelated_logs_are_ignored() {
    let reporter = RecordingReporter::default();
    let transfer = BlockLog {
        topics: vec![H256::repeat_byte(0xdd)],
        data: Bytes::new(),
        contract_address: market(),
    };

    let block = decode_block(&payload(vec![transfer]), &reporter);

    assert!(block.is_empty());
    assert!(reporter.reports.lock().is_empty());
}

#[test]
fn test_empty_batch_is_a_noop() {
    let reporter = RecordingReporter::default();

    let block = decode_block(&BlockPayload::default(), &reporter);

    assert!(block.is_empty());
}

#[test]
fn test_account_event_is_tagged_by_signature() {
    let account = Address::repeat_byte(0xa1);

    let event = AccountEvent::decode(&legacy_log(account, 1)).unwrap().unwrap();

    assert!(matches!(event, AccountEvent::LegacyProposed(ref e) if e.receiver == receiver()));
}

#[test]
fn test_messages_survive_serialization() {
    let proposal = Proposal::new(
        Address::repeat_byte(0xa1),
        market(),
        U256::from(123),
        Bytes::from(vec![0xab]),
        9,
        ProposalType::Withdraw,
        500,
        TIMESTAMP,
    );
    let mut traced = proposal.clone();
    traced.trace_parent = Some(tracing::Id::from_u64(42));

    let json = serde_json::to_value(&traced).unwrap();

    assert_eq!(json["proposalType"], 7);
    assert_eq!(json["nonce"], 9);
    assert!(json.get("traceParent").is_none());
    assert_eq!(
        serde_json::to_string(&traced).unwrap(),
        serde_json::to_string(&proposal).unwrap()
    );
    assert_eq!(serde_json::from_value::<Proposal>(json).unwrap(), proposal);
}
