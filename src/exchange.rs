use crate::error::{Result, VastError};
use crate::openrtb::{BidRequest, BidResponse};
use async_trait::async_trait;
use log::debug;
use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};
use reqwest::StatusCode;
use std::time::{Duration, Instant};

/// Input to a single auction
#[derive(Debug, Clone)]
pub struct AuctionRequest {
    pub bid_request: BidRequest,
    pub account_id: String,
    pub start_time: Instant,
}

/// Auction outcome; `None` means the exchange produced no response
#[derive(Debug, Clone, Default)]
pub struct AuctionResponse {
    pub bid_response: Option<BidResponse>,
}

/// The auction engine the endpoint delegates to
///
/// Dropping the returned future abandons the auction, so a client that
/// disconnects mid-request stops the work it started.
#[async_trait]
pub trait Exchange: Send + Sync {
    async fn hold_auction(&self, request: AuctionRequest) -> Result<AuctionResponse>;
}

/// Posts bid requests as JSON to a remote OpenRTB auction endpoint
pub struct HttpExchange {
    client: reqwest::Client,
    url: url::Url,
}

impl HttpExchange {
    pub fn new(url: &str) -> Result<Self> {
        let url = url::Url::parse(url)?;
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| VastError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(HttpExchange { client, url })
    }
}

#[async_trait]
impl Exchange for HttpExchange {
    async fn hold_auction(&self, request: AuctionRequest) -> Result<AuctionResponse> {
        let mut builder = self
            .client
            .post(self.url.clone())
            .json(&request.bid_request);
        if request.bid_request.tmax > 0 {
            builder = builder.timeout(Duration::from_millis(request.bid_request.tmax as u64));
        }

        let response = builder.send().await.map_err(|e| {
            debug!(
                "CTV VAST: Auction request {} failed after {:?}",
                request.bid_request.id,
                request.start_time.elapsed()
            );
            VastError::Auction(format!("Failed to reach exchange: {}", e))
        })?;

        let status = response.status();
        if status == StatusCode::NO_CONTENT {
            return Ok(AuctionResponse::default());
        }
        if !status.is_success() {
            return Err(VastError::Auction(format!("Exchange returned HTTP status {}", status)));
        }

        let bid_response = response
            .json::<BidResponse>()
            .await
            .map_err(|e| VastError::Auction(format!("Invalid bid response: {}", e)))?;

        debug!(
            "CTV VAST: Auction {} for account {} finished in {:?}",
            request.bid_request.id,
            request.account_id,
            request.start_time.elapsed()
        );

        Ok(AuctionResponse {
            bid_response: Some(bid_response),
        })
    }
}

/// Source of bid request ids
pub trait RequestIdGenerator: Send + Sync {
    fn generate(&self) -> Result<String>;
}

/// Random alphanumeric ids
#[derive(Debug, Clone)]
pub struct RandomIdGenerator {
    pub length: usize,
}

impl Default for RandomIdGenerator {
    fn default() -> Self {
        RandomIdGenerator { length: 16 }
    }
}

impl RequestIdGenerator for RandomIdGenerator {
    fn generate(&self) -> Result<String> {
        Ok(thread_rng()
            .sample_iter(&Alphanumeric)
            .take(self.length)
            .map(char::from)
            .collect())
    }
}
