//! Option chain types: contracts, ladder snapshots, ticks, expiries.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use super::enums::{InstrumentType, TickKind};

/// Parse the `YYYY-MM-DD` prefix of a date string, ignoring any time part.
fn parse_day(s: &str) -> chrono::ParseResult<NaiveDate> {
    NaiveDate::parse_from_str(s.get(..10).unwrap_or(s), "%Y-%m-%d")
}

/// Accepts `"2026-10-20"`, `"2026-10-20T00:00:00.000Z"` or `null`.
fn lenient_date<'de, D>(deserializer: D) -> std::result::Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        None => Ok(None),
        Some(s) => parse_day(&s).map(Some).map_err(serde::de::Error::custom),
    }
}

// ---------------------------------------------------------------------------
// Contracts
// ---------------------------------------------------------------------------

/// Live market fields of one contract, updated in place by ticks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketSnapshot {
    /// Last traded price.
    #[serde(default)]
    pub ltp: f64,
    /// Average traded price.
    #[serde(default)]
    pub atp: f64,
    /// Traded volume for the day.
    #[serde(default, alias = "vtt")]
    pub volume: f64,
    /// Open interest.
    #[serde(default)]
    pub oi: f64,
    /// Implied volatility (percent).
    #[serde(default)]
    pub iv: f64,
    /// Best bid price.
    #[serde(default, alias = "bidPrice")]
    pub bid: f64,
    /// Best ask price.
    #[serde(default, alias = "askPrice")]
    pub ask: f64,
}

/// One listed option at one strike, expiry and side.
///
/// Identity is [`instrument_key`](Self::instrument_key); everything else may
/// change as ticks arrive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionContract {
    pub instrument_key: String,
    #[serde(alias = "strike")]
    pub strike_price: f64,
    pub instrument_type: InstrumentType,
    #[serde(default, deserialize_with = "lenient_date")]
    pub expiry: Option<NaiveDate>,
    #[serde(default)]
    pub lot_size: u32,
    #[serde(default)]
    pub tick_size: f64,
    #[serde(flatten)]
    pub market: MarketSnapshot,
}

impl OptionContract {
    /// Build a contract with an empty market snapshot.
    pub fn new(
        instrument_key: impl Into<String>,
        strike_price: f64,
        instrument_type: InstrumentType,
    ) -> Self {
        Self {
            instrument_key: instrument_key.into(),
            strike_price,
            instrument_type,
            expiry: None,
            lot_size: 0,
            tick_size: 0.0,
            market: MarketSnapshot::default(),
        }
    }

    /// Merge the fields present in `update`; absent fields are left untouched.
    pub fn merge(&mut self, update: &SymbolUpdate) {
        let m = &mut self.market;
        if let Some(v) = update.ltp {
            m.ltp = v;
        }
        if let Some(v) = update.oi {
            m.oi = v;
        }
        if let Some(v) = update.iv {
            m.iv = v;
        }
        if let Some(v) = update.atp {
            m.atp = v;
        }
        if let Some(v) = update.vtt {
            m.volume = v;
        }
        if let Some(v) = update.bid {
            m.bid = v;
        }
        if let Some(v) = update.ask {
            m.ask = v;
        }
    }
}

// ---------------------------------------------------------------------------
// Ladder snapshot (`strikePrices`)
// ---------------------------------------------------------------------------

/// Full ladder payload pushed as `strikePrices`.
///
/// The server pre-partitions contracts, but the groups are only trusted as a
/// contract list: the store re-partitions against its own ATM strike.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrikeSnapshot {
    #[serde(default)]
    pub atm_strike: Option<f64>,
    #[serde(default)]
    pub itm_call_strikes: Vec<OptionContract>,
    #[serde(default)]
    pub itm_put_strikes: Vec<OptionContract>,
    #[serde(default)]
    pub otm_call_strikes: Vec<OptionContract>,
    #[serde(default)]
    pub otm_put_strikes: Vec<OptionContract>,
    #[serde(default)]
    pub atm_strikes: Vec<OptionContract>,
    #[serde(default, deserialize_with = "lenient_date")]
    pub expiry_date: Option<NaiveDate>,
}

impl StrikeSnapshot {
    /// Total number of contracts across all groups.
    pub fn len(&self) -> usize {
        self.itm_call_strikes.len()
            + self.itm_put_strikes.len()
            + self.otm_call_strikes.len()
            + self.otm_put_strikes.len()
            + self.atm_strikes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flatten every group into one contract list.
    pub fn into_contracts(self) -> Vec<OptionContract> {
        let mut all = Vec::with_capacity(self.len());
        all.extend(self.itm_call_strikes);
        all.extend(self.itm_put_strikes);
        all.extend(self.otm_call_strikes);
        all.extend(self.otm_put_strikes);
        all.extend(self.atm_strikes);
        all
    }
}

// ---------------------------------------------------------------------------
// Ticks (`symbolUpdate`)
// ---------------------------------------------------------------------------

/// Incremental tick for the underlying or for one contract.
///
/// Every market field is optional; only the ones present are applied.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolUpdate {
    #[serde(rename = "type")]
    pub kind: TickKind,
    pub instrument_key: String,
    #[serde(default)]
    pub ltp: Option<f64>,
    #[serde(default)]
    pub change: Option<f64>,
    #[serde(default)]
    pub change_percent: Option<f64>,
    #[serde(default)]
    pub oi: Option<f64>,
    #[serde(default)]
    pub iv: Option<f64>,
    #[serde(default)]
    pub atp: Option<f64>,
    /// Volume traded today.
    #[serde(default)]
    pub vtt: Option<f64>,
    #[serde(default)]
    pub bid: Option<f64>,
    #[serde(default)]
    pub ask: Option<f64>,
}

impl SymbolUpdate {
    /// An empty contract tick for `instrument_key`; set fields directly.
    pub fn contract(instrument_key: impl Into<String>) -> Self {
        Self {
            kind: TickKind::Contract,
            instrument_key: instrument_key.into(),
            ltp: None,
            change: None,
            change_percent: None,
            oi: None,
            iv: None,
            atp: None,
            vtt: None,
            bid: None,
            ask: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Underlying quote
// ---------------------------------------------------------------------------

/// Last quote of the underlying index. Replaced wholesale on every tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnderlyingQuote {
    pub ltp: f64,
    pub change: f64,
    pub change_percent: f64,
    pub timestamp: DateTime<Utc>,
}

impl UnderlyingQuote {
    pub fn new(ltp: f64, change: f64, change_percent: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            ltp,
            change,
            change_percent,
            timestamp,
        }
    }

    /// Build a quote from an index tick. Returns `None` without an `ltp`.
    pub fn from_update(update: &SymbolUpdate, received_at: DateTime<Utc>) -> Option<Self> {
        Some(Self {
            ltp: update.ltp?,
            change: update.change.unwrap_or_default(),
            change_percent: update.change_percent.unwrap_or_default(),
            timestamp: received_at,
        })
    }
}

// ---------------------------------------------------------------------------
// Expiries
// ---------------------------------------------------------------------------

/// Response of `GET /upstox/expiry-dates`.
///
/// The backend returns either `{"expiries": [...]}` or a bare array.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ExpiryDatesResponse {
    Wrapped { expiries: Vec<String> },
    Bare(Vec<String>),
}

impl ExpiryDatesResponse {
    /// Parse the date strings, skipping entries that are not `YYYY-MM-DD`
    /// (a trailing time component is ignored).
    pub fn into_dates(self) -> Vec<NaiveDate> {
        let raw = match self {
            ExpiryDatesResponse::Wrapped { expiries } => expiries,
            ExpiryDatesResponse::Bare(expiries) => expiries,
        };
        raw.iter()
            .filter_map(|s| {
                match parse_day(s) {
                    Ok(date) => Some(date),
                    Err(e) => {
                        tracing::warn!(value = %s, error = %e, "Skipping malformed expiry date");
                        None
                    }
                }
            })
            .collect()
    }
}

/// One selectable expiry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExpiryOption {
    pub date: NaiveDate,
    /// Display label, e.g. `"23 Oct 2026"`.
    pub label: String,
    /// Signed days from `today` to `date`; negative once expired.
    pub days_to_expiry: i64,
}

impl ExpiryOption {
    pub fn new(date: NaiveDate, today: NaiveDate) -> Self {
        Self {
            date,
            label: date.format("%d %b %Y").to_string(),
            days_to_expiry: (date - today).num_days(),
        }
    }

    pub fn is_expired(&self) -> bool {
        self.days_to_expiry < 0
    }
}
