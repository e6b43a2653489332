//! Scripted remote shared by the integration tests.
//!
//! [`MockRemote`] plays both sources at once:
//! - GET requests are listing pages, served from per-year record lists by
//!   `offset`/`limit`, with the year taken from `start_date_min`
//! - POST requests are `eth_getLogs` calls, answered per contract address
//!
//! Every request is counted, and the first N requests can be made to answer
//! HTTP 429.

#![allow(dead_code)]

use alloy::primitives::{Address, U256};
use alloy::sol_types::SolEvent;
use market_ingest::error::IngestResult;
use market_ingest::events::FPMMBuy;
use market_ingest::rpc::{HttpRequest, HttpTransport, RawResponse};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// How the log endpoint answers for one contract.
#[derive(Debug, Clone)]
pub enum ContractScript {
    /// `count` well-formed buy logs
    Buys(u64),
    /// One log whose data does not fit the event ABI
    Malformed,
    /// A JSON-RPC error envelope
    RpcError,
}

/// Scripted listing API and log endpoint.
#[derive(Default)]
pub struct MockRemote {
    listings: HashMap<i32, Vec<Value>>,
    contracts: HashMap<Address, ContractScript>,
    throttles: AtomicUsize,
    gets: AtomicUsize,
    posts: AtomicUsize,
    offsets: Mutex<Vec<(i32, u64)>>,
}

impl MockRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `records` for listing year `year`.
    pub fn with_year(mut self, year: i32, records: Vec<Value>) -> Self {
        self.listings.insert(year, records);
        self
    }

    /// Answer log requests for `contract` with `script`.
    pub fn with_contract(mut self, contract: &str, script: ContractScript) -> Self {
        self.contracts.insert(contract.parse().unwrap(), script);
        self
    }

    /// Answer the first `count` requests with HTTP 429.
    pub fn with_throttles(self, count: usize) -> Self {
        self.throttles.store(count, Ordering::SeqCst);
        self
    }

    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn posts(&self) -> usize {
        self.posts.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.gets() + self.posts()
    }

    /// Listing pages requested, as `(year, offset)`.
    pub fn requested_pages(&self) -> Vec<(i32, u64)> {
        self.offsets.lock().unwrap().clone()
    }

    fn take_throttle(&self) -> bool {
        self.throttles
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn listing_page(&self, request: &HttpRequest) -> RawResponse {
        let year: i32 = request.query_param("start_date_min").unwrap()[..4].parse().unwrap();
        let offset: u64 = request.query_param("offset").unwrap().parse().unwrap();
        let limit: u64 = request.query_param("limit").unwrap().parse().unwrap();
        self.offsets.lock().unwrap().push((year, offset));

        let records = self.listings.get(&year).cloned().unwrap_or_default();
        let page: Vec<Value> = records
            .into_iter()
            .skip(usize::try_from(offset).unwrap())
            .take(usize::try_from(limit).unwrap())
            .collect();
        RawResponse::new(200, serde_json::to_string(&page).unwrap())
    }

    fn logs(&self, request: &HttpRequest) -> RawResponse {
        let body = request.json_body().unwrap();
        assert_eq!(body["method"], "eth_getLogs");
        let filter = &body["params"][0];
        let topics = filter["topics"].to_string().to_lowercase();
        assert!(topics.contains(&format!("{:x}", FPMMBuy::SIGNATURE_HASH)));
        // A single address may be rendered bare or as a one-element list
        let address = match &filter["address"] {
            Value::Array(values) => values[0].clone(),
            other => other.clone(),
        };
        let contract: Address = serde_json::from_value(address).unwrap();

        let result = match self.contracts.get(&contract) {
            None => json!([]),
            Some(ContractScript::Buys(count)) => json!(buy_logs(contract, *count)),
            Some(ContractScript::Malformed) => json!([{
                "address": contract,
                "topics": [FPMMBuy::SIGNATURE_HASH],
                "data": "0x00"
            }]),
            Some(ContractScript::RpcError) => {
                return RawResponse::new(
                    200,
                    json!({"jsonrpc": "2.0", "id": 1, "error": {"code": -32000, "message": "header not found"}})
                        .to_string(),
                )
            }
        };
        RawResponse::new(200, json!({"jsonrpc": "2.0", "id": 1, "result": result}).to_string())
    }
}

impl HttpTransport for MockRemote {
    async fn send(&self, request: &HttpRequest) -> IngestResult<RawResponse> {
        match request {
            HttpRequest::Get { .. } => self.gets.fetch_add(1, Ordering::SeqCst),
            HttpRequest::PostJson { .. } => self.posts.fetch_add(1, Ordering::SeqCst),
        };

        if self.take_throttle() {
            return Ok(RawResponse::new(429, "Too Many Requests"));
        }

        Ok(match request {
            HttpRequest::Get { .. } => self.listing_page(request),
            HttpRequest::PostJson { .. } => self.logs(request),
        })
    }
}

/// `count` encoded buy logs emitted by `contract`.
pub fn buy_logs(contract: Address, count: u64) -> Vec<Value> {
    (1..=count)
        .map(|i| {
            let event = FPMMBuy {
                buyer: Address::repeat_byte(0xbb),
                investmentAmount: U256::from(i * 1_000),
                feeAmount: U256::from(i * 20),
                outcomeIndex: U256::from(i % 2),
                outcomeTokensBought: U256::from(i * 1_900),
            };
            let data = event.encode_log_data();
            json!({
                "address": contract,
                "topics": data.topics(),
                "data": data.data,
                "blockNumber": format!("0x{:x}", 30_000_000 + i),
                "logIndex": "0x0"
            })
        })
        .collect()
}

/// Lowercase hex address made of one repeated byte.
pub fn address(byte: u8) -> String {
    format!("0x{}", format!("{byte:02x}").repeat(20))
}

/// A listing record.
pub fn market(id: usize, maker: &str, category: &str) -> Value {
    json!({
        "id": id.to_string(),
        "question": format!("Market {id}?"),
        "marketMakerAddress": maker,
        "category": category,
        "volume": id * 10,
        "active": true
    })
}

/// `count` markets with ids starting at `first_id`, all made by `maker`.
pub fn markets(first_id: usize, count: usize, maker: &str) -> Vec<Value> {
    (first_id..first_id + count)
        .map(|id| market(id, maker, "Sports"))
        .collect()
}
