use serde::{Deserialize, Serialize};

/// VAST 2.0, 3.0 and 4.0 creative protocols (AdCOM list: Creative Subtypes)
pub const VIDEO_PROTOCOLS: [u8; 3] = [2, 3, 7];

/// MIME types requested for CTV video impressions
pub const VIDEO_MIMES: [&str; 2] = ["video/mp4", "video/webm"];

/// Minimal subset of an OpenRTB 2.x bid request used for CTV video auctions.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct BidRequest {
    /// Unique ID of the bid request.
    pub id: String,
    pub imp: Vec<Imp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site: Option<Site>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<Device>,
    /// Maximum time in milliseconds the exchange allows for bids.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub tmax: i64,
    #[serde(default, skip_serializing_if = "is_zero_u8")]
    pub test: u8,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct Imp {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video: Option<Video>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct Video {
    #[serde(default)]
    pub mimes: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub protocols: Vec<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub w: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub h: Option<i64>,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub minduration: i64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub maxduration: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct Site {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publisher: Option<Publisher>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct Publisher {
    #[serde(default)]
    pub id: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct Device {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ua: String,
}

/// OpenRTB 2.x bid response, reduced to the fields CTV assembly reads.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct BidResponse {
    pub id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub seatbid: Vec<SeatBid>,
    /// Bid currency; empty means the exchange default.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cur: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct SeatBid {
    #[serde(default)]
    pub seat: String,
    #[serde(default)]
    pub bid: Vec<Bid>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct Bid {
    pub id: String,
    #[serde(default)]
    pub impid: String,
    pub price: f64,
    /// Ad markup; for video this is normally a VAST document.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub adm: String,
    /// Win notice URL.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub nurl: String,
    /// Billing notice URL.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub burl: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub adomain: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cat: Vec<String>,
    /// Creative duration in seconds.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub dur: i64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub dealid: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub crid: String,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub w: i64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub h: i64,
}

impl BidResponse {
    /// True when no seat returned any bid
    pub fn has_no_bids(&self) -> bool {
        self.seatbid.iter().all(|seat_bid| seat_bid.bid.is_empty())
    }
}

fn is_zero(value: &i64) -> bool {
    *value == 0
}

fn is_zero_u8(value: &u8) -> bool {
    *value == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_sparse_response() {
        let json = r#"{
            "id": "resp-1",
            "cur": "EUR",
            "seatbid": [{
                "seat": "bidder-a",
                "bid": [{"id": "b1", "impid": "1", "price": 5.5, "adomain": ["adv.com"], "dur": 30}]
            }]
        }"#;

        let response: BidResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.cur, "EUR");
        assert_eq!(response.seatbid[0].seat, "bidder-a");
        let bid = &response.seatbid[0].bid[0];
        assert_eq!(bid.price, 5.5);
        assert_eq!(bid.adomain, vec!["adv.com".to_string()]);
        assert_eq!(bid.dur, 30);
        assert!(bid.adm.is_empty());
        assert!(!response.has_no_bids());
    }

    #[test]
    fn serializes_request_without_empty_fields() {
        let request = BidRequest {
            id: "req".to_string(),
            imp: vec![Imp {
                id: "1".to_string(),
                video: Some(Video {
                    mimes: vec!["video/mp4".to_string()],
                    protocols: VIDEO_PROTOCOLS.to_vec(),
                    ..Default::default()
                }),
            }],
            ..Default::default()
        };

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["imp"][0]["video"]["protocols"], serde_json::json!([2, 3, 7]));
        assert!(value.get("tmax").is_none());
        assert!(value.get("device").is_none());
        assert!(value["imp"][0]["video"].get("w").is_none());
    }

    #[test]
    fn empty_seatbids_mean_no_bids() {
        assert!(BidResponse::default().has_no_bids());
        let response = BidResponse {
            seatbid: vec![SeatBid {
                seat: "a".to_string(),
                bid: vec![],
            }],
            ..Default::default()
        };
        assert!(response.has_no_bids());
    }
}
