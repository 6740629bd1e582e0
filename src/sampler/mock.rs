//! In-memory chain for sampler tests

use alloy_primitives::{Address, Bytes, LogData, B256};
use alloy_rpc_types::Log;
use alloy_sol_types::{SolCall, SolEvent};
use std::collections::{BTreeMap, HashMap};

use super::chain::{ChainReader, LogQuery};
use crate::error::Result;
use crate::models::EpochRange;

type Handler = Box<dyn Fn(u64, &[u8]) -> Option<Vec<u8>> + Send + Sync>;

/// Answers calls from per-(contract, selector) handlers. A handler returning
/// `None` leaves a hole for that block.
#[derive(Default)]
pub struct MockChain {
    handlers: HashMap<(Address, [u8; 4]), Handler>,
    timestamps: BTreeMap<u64, u64>,
    logs: Vec<Log>,
}

impl MockChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Typed handler: gets the block and the decoded call.
    pub fn on_call<C>(self, to: Address, f: impl Fn(u64, &C) -> Option<C::Return> + Send + Sync + 'static) -> Self
    where
        C: SolCall + 'static,
    {
        self.on_raw(to, C::SELECTOR, move |block, data| {
            let call = C::abi_decode(data).ok()?;
            f(block, &call).map(|ret| C::abi_encode_returns(&ret))
        })
    }

    pub fn on_raw(
        mut self,
        to: Address,
        selector: [u8; 4],
        f: impl Fn(u64, &[u8]) -> Option<Vec<u8>> + Send + Sync + 'static,
    ) -> Self {
        self.handlers.insert((to, selector), Box::new(f));
        self
    }

    pub fn with_timestamps(mut self, range: EpochRange, f: impl Fn(u64) -> u64) -> Self {
        for block in range.blocks() {
            self.timestamps.insert(block, f(block));
        }
        self
    }

    pub fn with_log(mut self, log: Log) -> Self {
        self.logs.push(log);
        self
    }

    fn answer(&self, to: Address, calldata: &[u8], block: u64) -> Option<Bytes> {
        let selector: [u8; 4] = calldata.get(..4)?.try_into().ok()?;
        let handler = self
            .handlers
            .get(&(to, selector))
            .unwrap_or_else(|| panic!("no mock for {to} selector 0x{selector:02x?}"));
        handler(block, calldata).map(Bytes::from)
    }
}

impl ChainReader for MockChain {
    async fn call(&self, to: Address, calldata: Bytes, block: Option<u64>) -> Result<Bytes> {
        Ok(self.answer(to, &calldata, block.unwrap_or(u64::MAX)).unwrap_or_default())
    }

    async fn call_on_block_range(
        &self,
        to: Address,
        calldata: Bytes,
        range: EpochRange,
    ) -> Result<Vec<Option<Bytes>>> {
        Ok(range.blocks().map(|block| self.answer(to, &calldata, block)).collect())
    }

    async fn block_timestamps(&self, range: EpochRange) -> Result<Vec<Option<u64>>> {
        Ok(range.blocks().map(|block| self.timestamps.get(&block).copied()).collect())
    }

    async fn get_logs(&self, query: &LogQuery) -> Result<Vec<Log>> {
        Ok(self
            .logs
            .iter()
            .filter(|log| {
                let topics = log.topics();
                log.address() == query.address
                    && topics.first() == Some(&query.event_signature)
                    && topics.get(1) == Some(&query.reserve_topic)
                    && log.block_number.is_some_and(|b| query.range.contains(b))
            })
            .cloned()
            .collect())
    }
}

/// RPC-shaped log for `event` emitted by `address`.
pub fn mock_log<E: SolEvent>(address: Address, event: &E, block: u64, log_index: u64) -> Log {
    let data: LogData = event.encode_log_data();
    Log {
        inner: alloy_primitives::Log { address, data },
        block_number: Some(block),
        log_index: Some(log_index),
        transaction_hash: Some(B256::left_padding_from(&block.to_be_bytes())),
        ..Default::default()
    }
}
