use crate::error::{Result, VastError};
use crate::openrtb::{Bid, BidResponse};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How winning bids are chosen from a bid response
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(from = "String", into = "String")]
pub enum SelectionStrategy {
    /// Only the highest-priced bid wins
    #[default]
    Single,
    /// The best `max_ads_in_pod` bids win, for ad pods
    TopN,
}

impl SelectionStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            SelectionStrategy::Single => "SINGLE",
            SelectionStrategy::TopN => "TOP_N",
        }
    }
}

impl From<&str> for SelectionStrategy {
    /// Unknown values fall back to `Single`
    fn from(value: &str) -> Self {
        match value.trim().to_ascii_uppercase().as_str() {
            "TOP_N" => SelectionStrategy::TopN,
            _ => SelectionStrategy::Single,
        }
    }
}

impl From<String> for SelectionStrategy {
    fn from(value: String) -> Self {
        SelectionStrategy::from(value.as_str())
    }
}

impl From<SelectionStrategy> for String {
    fn from(value: SelectionStrategy) -> Self {
        value.as_str().to_string()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectorConfig {
    pub strategy: SelectionStrategy,
    pub max_ads_in_pod: i64,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        SelectorConfig {
            strategy: SelectionStrategy::Single,
            max_ads_in_pod: 1,
        }
    }
}

/// A bid paired with the seat that submitted it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BidWithSeat<'a> {
    pub bid: &'a Bid,
    pub seat: &'a str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionReason {
    NotHighestPrice,
    ExceededMaxAdsInPod,
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectionReason::NotHighestPrice => write!(f, "not highest price"),
            RejectionReason::ExceededMaxAdsInPod => write!(f, "exceeded max ads in pod"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RejectedBid<'a> {
    pub bid: BidWithSeat<'a>,
    pub reason: RejectionReason,
}

/// Selected bids in pod order, plus everything that lost
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectionResult<'a> {
    pub bids: Vec<BidWithSeat<'a>>,
    pub rejected: Vec<RejectedBid<'a>>,
}

/// Chooses the winning bids of a bid response
///
/// Bids from every seat are ranked by descending price, ties broken by
/// ascending bid id so the outcome does not depend on seat order.
pub fn select<'a>(
    response: Option<&'a BidResponse>,
    config: &SelectorConfig,
) -> Result<SelectionResult<'a>> {
    let response = response.ok_or(VastError::NilBidResponse)?;
    let max_ads = config.max_ads_in_pod.max(1) as usize;

    let mut ranked: Vec<BidWithSeat<'a>> = response
        .seatbid
        .iter()
        .flat_map(|seat_bid| {
            seat_bid.bid.iter().map(move |bid| BidWithSeat {
                bid,
                seat: seat_bid.seat.as_str(),
            })
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.bid
            .price
            .total_cmp(&a.bid.price)
            .then_with(|| a.bid.id.cmp(&b.bid.id))
    });

    let (keep, reason) = match config.strategy {
        SelectionStrategy::Single => (1, RejectionReason::NotHighestPrice),
        SelectionStrategy::TopN => (max_ads, RejectionReason::ExceededMaxAdsInPod),
    };

    let keep = keep.min(ranked.len());
    let rejected = ranked
        .split_off(keep)
        .into_iter()
        .map(|bid| RejectedBid { bid, reason })
        .collect();

    Ok(SelectionResult {
        bids: ranked,
        rejected,
    })
}

/// Pod position for the bid at `index` in selection order
///
/// The position is derived from the index alone; bids carry no slot
/// information of their own.
pub fn pod_sequence(_bid: &Bid, index: i64) -> u32 {
    if index < 0 {
        return 1;
    }
    u32::try_from(index + 1).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::openrtb::SeatBid;

    fn bid(id: &str, price: f64) -> Bid {
        Bid {
            id: id.to_string(),
            impid: "1".to_string(),
            price,
            ..Default::default()
        }
    }

    fn two_seat_response() -> BidResponse {
        BidResponse {
            id: "resp".to_string(),
            seatbid: vec![
                SeatBid {
                    seat: "seat-a".to_string(),
                    bid: vec![bid("bid-1", 5.0), bid("bid-2", 3.0)],
                },
                SeatBid {
                    seat: "seat-b".to_string(),
                    bid: vec![bid("bid-3", 7.0)],
                },
            ],
            cur: "USD".to_string(),
        }
    }

    fn prices(bids: &[BidWithSeat]) -> Vec<f64> {
        bids.iter().map(|b| b.bid.price).collect()
    }

    #[test]
    fn single_keeps_highest_price() {
        let response = two_seat_response();
        let result = select(Some(&response), &SelectorConfig::default()).unwrap();

        assert_eq!(result.bids.len(), 1);
        assert_eq!(result.bids[0].bid.price, 7.0);
        assert_eq!(result.bids[0].seat, "seat-b");
        assert_eq!(result.rejected.len(), 2);
        for rejected in &result.rejected {
            assert_eq!(rejected.reason, RejectionReason::NotHighestPrice);
            assert_eq!(rejected.reason.to_string(), "not highest price");
        }
    }

    #[test]
    fn top_n_keeps_sorted_pod() {
        let response = two_seat_response();
        let config = SelectorConfig {
            strategy: SelectionStrategy::TopN,
            max_ads_in_pod: 3,
        };
        let result = select(Some(&response), &config).unwrap();

        assert_eq!(prices(&result.bids), vec![7.0, 5.0, 3.0]);
        assert_eq!(result.bids[1].seat, "seat-a");
        assert!(result.rejected.is_empty());
    }

    #[test]
    fn top_n_rejects_overflow() {
        let response = two_seat_response();
        let config = SelectorConfig {
            strategy: SelectionStrategy::TopN,
            max_ads_in_pod: 2,
        };
        let result = select(Some(&response), &config).unwrap();

        assert_eq!(prices(&result.bids), vec![7.0, 5.0]);
        assert_eq!(result.rejected.len(), 1);
        assert_eq!(result.rejected[0].bid.bid.id, "bid-2");
        assert_eq!(result.rejected[0].reason.to_string(), "exceeded max ads in pod");
    }

    #[test]
    fn equal_prices_break_ties_by_id() {
        let response = BidResponse {
            seatbid: vec![
                SeatBid {
                    seat: "z".to_string(),
                    bid: vec![bid("c", 2.0), bid("a", 2.0)],
                },
                SeatBid {
                    seat: "y".to_string(),
                    bid: vec![bid("b", 2.0)],
                },
            ],
            ..Default::default()
        };
        let config = SelectorConfig {
            strategy: SelectionStrategy::TopN,
            max_ads_in_pod: 5,
        };
        let result = select(Some(&response), &config).unwrap();
        let ids: Vec<&str> = result.bids.iter().map(|b| b.bid.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn max_ads_below_one_is_normalized() {
        let response = two_seat_response();
        let config = SelectorConfig {
            strategy: SelectionStrategy::TopN,
            max_ads_in_pod: 0,
        };
        let result = select(Some(&response), &config).unwrap();
        assert_eq!(result.bids.len(), 1);
        assert_eq!(result.rejected.len(), 2);

        let config = SelectorConfig {
            strategy: SelectionStrategy::TopN,
            max_ads_in_pod: -4,
        };
        assert_eq!(select(Some(&response), &config).unwrap().bids.len(), 1);
    }

    #[test]
    fn nil_response_is_an_error() {
        assert!(matches!(
            select(None, &SelectorConfig::default()),
            Err(VastError::NilBidResponse)
        ));
    }

    #[test]
    fn empty_response_selects_nothing() {
        let response = BidResponse::default();
        let result = select(Some(&response), &SelectorConfig::default()).unwrap();
        assert!(result.bids.is_empty());
        assert!(result.rejected.is_empty());
    }

    #[test]
    fn unknown_strategy_falls_back_to_single() {
        assert_eq!(SelectionStrategy::from("TOP_N"), SelectionStrategy::TopN);
        assert_eq!(SelectionStrategy::from("top_n"), SelectionStrategy::TopN);
        assert_eq!(SelectionStrategy::from("WEIGHTED"), SelectionStrategy::Single);
        assert_eq!(SelectionStrategy::from(""), SelectionStrategy::Single);

        let parsed: SelectionStrategy = serde_json::from_str("\"bogus\"").unwrap();
        assert_eq!(parsed, SelectionStrategy::Single);
        assert_eq!(serde_json::to_string(&SelectionStrategy::TopN).unwrap(), "\"TOP_N\"");
    }

    #[test]
    fn pod_sequence_is_one_based() {
        let b = bid("x", 1.0);
        assert_eq!(pod_sequence(&b, 0), 1);
        assert_eq!(pod_sequence(&b, 2), 3);
        assert_eq!(pod_sequence(&b, -3), 1);
    }
}
