use crate::config::{CtvVastConfig, ServerConfig};
use crate::enricher::Enricher;
use crate::error::{Result, VastError};
use crate::exchange::{AuctionRequest, Exchange, RandomIdGenerator, RequestIdGenerator};
use crate::formatter::{create_formatter, format_empty_vast};
use crate::metrics::{MetricsEngine, RequestStatus, RequestTimer};
use crate::models::Vast;
use crate::openrtb::{
    BidRequest, BidResponse, Device, Imp, Publisher, Site, Video, VIDEO_MIMES, VIDEO_PROTOCOLS,
};
use crate::selector::{pod_sequence, select};
use axum::extract::{RawQuery, State};
use axum::http::header::{self, HeaderMap, HeaderName};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::sync::Arc;

pub const VAST_PATH: &str = "/ctv/vast";
pub const XML_CONTENT_TYPE: &str = "application/xml; charset=utf-8";

const X_PREBID: HeaderName = HeaderName::from_static("x-prebid");

const RESERVED_PARAMS: [&str; 7] = [
    "publisher_id",
    "stored_request_id",
    "width",
    "height",
    "min_duration",
    "max_duration",
    "debug",
];

/// Typed view of the endpoint's query string
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryParams {
    pub publisher_id: String,
    pub stored_request_id: String,
    pub width: i64,
    pub height: i64,
    pub min_duration: i64,
    pub max_duration: i64,
    pub debug: bool,
    /// Every non-reserved parameter, first value wins
    pub macros: HashMap<String, String>,
}

pub fn is_reserved_param(key: &str) -> bool {
    RESERVED_PARAMS.contains(&key)
}

/// Parses a raw query string
///
/// Malformed integers are logged and treated as absent; parsing itself
/// never fails.
pub fn parse_query_params(query: &str) -> QueryParams {
    let mut reserved: HashMap<String, String> = HashMap::new();
    let mut macros: HashMap<String, String> = HashMap::new();
    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        let target = if is_reserved_param(&key) {
            &mut reserved
        } else {
            &mut macros
        };
        target.entry(key.into_owned()).or_insert_with(|| value.into_owned());
    }

    QueryParams {
        publisher_id: reserved.remove("publisher_id").unwrap_or_default(),
        stored_request_id: reserved.remove("stored_request_id").unwrap_or_default(),
        width: int_param(&mut reserved, "width"),
        height: int_param(&mut reserved, "height"),
        min_duration: int_param(&mut reserved, "min_duration"),
        max_duration: int_param(&mut reserved, "max_duration"),
        debug: reserved.remove("debug").as_deref() == Some("1"),
        macros,
    }
}

fn int_param(values: &mut HashMap<String, String>, key: &str) -> i64 {
    match values.remove(key) {
        Some(raw) if !raw.is_empty() => raw.parse().unwrap_or_else(|_| {
            warn!("CTV VAST: Ignoring invalid {} value {:?}", key, raw);
            0
        }),
        _ => 0,
    }
}

/// Builds the single-impression video bid request for an ad slot
pub fn build_bid_request(
    params: &QueryParams,
    request_id: String,
    user_agent: &str,
    tmax: i64,
) -> Result<BidRequest> {
    if params.min_duration > 0 && params.max_duration > 0 && params.min_duration > params.max_duration
    {
        return Err(VastError::BadInput(format!(
            "min_duration {} exceeds max_duration {}",
            params.min_duration, params.max_duration
        )));
    }

    let video = Video {
        mimes: VIDEO_MIMES.iter().map(|m| m.to_string()).collect(),
        protocols: VIDEO_PROTOCOLS.to_vec(),
        w: Some(params.width).filter(|w| *w > 0),
        h: Some(params.height).filter(|h| *h > 0),
        minduration: params.min_duration.max(0),
        maxduration: params.max_duration.max(0),
    };

    Ok(BidRequest {
        id: request_id,
        imp: vec![Imp {
            id: "1".to_string(),
            video: Some(video),
        }],
        site: Some(Site {
            publisher: Some(Publisher {
                id: params.publisher_id.clone(),
            }),
        }),
        device: Some(Device {
            ua: user_agent.to_string(),
        }),
        tmax,
        test: 0,
    })
}

/// Runs selection, enrichment and formatting over an auction result
///
/// A bid that fails enrichment is logged and left out; the others still
/// make it into the document.
pub fn build_vast(
    bid_response: &BidResponse,
    config: &CtvVastConfig,
    debug_ids: bool,
) -> Result<Vec<u8>> {
    let selection = select(Some(bid_response), &config.selector_config())?;
    for rejected in &selection.rejected {
        debug!(
            "CTV VAST: Bid {} from {} rejected: {}",
            rejected.bid.bid.id, rejected.bid.seat, rejected.reason
        );
    }

    let formatter_config = config.formatter_config();
    if selection.bids.is_empty() {
        return format_empty_vast(&formatter_config);
    }

    let mut vast = Vast::new_empty(&config.vast_version_default);
    let enricher = Enricher::new(config.enricher_config(debug_ids));

    for (i, winner) in selection.bids.iter().enumerate() {
        let sequence = pod_sequence(winner.bid, i as i64);
        if let Err(e) = enricher.enrich(&mut vast, winner.bid, winner.seat, Some(bid_response), sequence) {
            warn!("CTV VAST: Failed to enrich ad {}: {}", i, e);
        }
    }

    create_formatter(&formatter_config).format(vast)
}

/// Serves VAST for CTV ad slots
pub struct CtvEndpoint {
    exchange: Arc<dyn Exchange>,
    config: ServerConfig,
    metrics: Arc<dyn MetricsEngine>,
    id_generator: Arc<dyn RequestIdGenerator>,
}

impl CtvEndpoint {
    pub fn new(
        exchange: Arc<dyn Exchange>,
        config: ServerConfig,
        metrics: Arc<dyn MetricsEngine>,
    ) -> Self {
        CtvEndpoint {
            exchange,
            config,
            metrics,
            id_generator: Arc::new(RandomIdGenerator::default()),
        }
    }

    pub fn with_id_generator(mut self, id_generator: Arc<dyn RequestIdGenerator>) -> Self {
        self.id_generator = id_generator;
        self
    }

    pub fn router(self) -> Router {
        Router::new()
            .route(VAST_PATH, get(handle_vast))
            .with_state(Arc::new(self))
    }

    /// Handles one request end to end
    ///
    /// Every failure degrades to an empty VAST with status 200. Only a
    /// failure to format that empty document produces a 500.
    pub async fn handle(&self, query: &str, user_agent: &str) -> Response {
        let mut timer = RequestTimer::start(self.metrics.clone());

        let params = parse_query_params(query);
        if !params.publisher_id.is_empty() {
            timer.labels.pub_id = params.publisher_id.clone();
        }

        let config = self.config.vast_config_for(&params.publisher_id);
        if !config.enabled {
            info!("CTV VAST: Endpoint disabled");
            return empty_vast(&config);
        }

        let bid_request = match self
            .id_generator
            .generate()
            .and_then(|id| build_bid_request(&params, id, user_agent, self.config.tmax))
        {
            Ok(request) => request,
            Err(e) => {
                warn!("CTV VAST: Error building bid request: {}", e);
                timer.labels.status = RequestStatus::BadInput;
                return empty_vast(&config);
            }
        };

        if config.stored_requests_enabled && !params.stored_request_id.is_empty() {
            debug!(
                "CTV VAST: Stored request {} is not merged into the bid request",
                params.stored_request_id
            );
        }

        let auction = AuctionRequest {
            bid_request,
            account_id: params.publisher_id.clone(),
            start_time: timer.started_at(),
        };

        let bid_response = match self.exchange.hold_auction(auction).await {
            Ok(response) => response.bid_response,
            Err(e) => {
                warn!("CTV VAST: Auction error: {}", e);
                timer.labels.status = RequestStatus::Err;
                return empty_vast(&config);
            }
        };

        let bid_response = match bid_response {
            Some(response) if !response.has_no_bids() => response,
            _ => {
                info!("CTV VAST: No bids returned");
                return empty_vast(&config);
            }
        };

        match build_vast(&bid_response, &config, params.debug) {
            Ok(body) => xml_response(body),
            Err(e) => {
                warn!("CTV VAST: Error processing auction response: {}", e);
                timer.labels.status = RequestStatus::Err;
                empty_vast(&config)
            }
        }
    }
}

async fn handle_vast(
    State(endpoint): State<Arc<CtvEndpoint>>,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
) -> Response {
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    endpoint
        .handle(query.as_deref().unwrap_or_default(), user_agent)
        .await
}

fn x_prebid_value() -> String {
    format!("ctv-vast/{}", env!("CARGO_PKG_VERSION"))
}

fn xml_response(body: Vec<u8>) -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, XML_CONTENT_TYPE.to_string()),
            (X_PREBID, x_prebid_value()),
        ],
        body,
    )
        .into_response()
}

fn empty_vast(config: &CtvVastConfig) -> Response {
    match format_empty_vast(&config.formatter_config()) {
        Ok(body) => xml_response(body),
        Err(e) => {
            error!("CTV VAST: Failed to format empty VAST: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(X_PREBID, x_prebid_value())],
            )
                .into_response()
        }
    }
}
