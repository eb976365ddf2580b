use std::fmt;

use crate::error::{Error, Result};

/// Most symbols a single quote stream accepts
pub const MAX_QUOTE_SYMBOLS: usize = 100;
/// Longest minute interval a bar stream accepts
pub const MAX_MINUTE_INTERVAL: u32 = 1440;

/// The payload family a stream carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    Bars,
    Quotes,
    Orders,
    Positions,
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StreamKind::Bars => "bars",
            StreamKind::Quotes => "quotes",
            StreamKind::Orders => "orders",
            StreamKind::Positions => "positions",
        };
        f.write_str(name)
    }
}

/// Unit of a bar interval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BarUnit {
    Minute,
    Daily,
    Weekly,
    Monthly,
}

impl BarUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            BarUnit::Minute => "Minute",
            BarUnit::Daily => "Daily",
            BarUnit::Weekly => "Weekly",
            BarUnit::Monthly => "Monthly",
        }
    }
}

/// Bar-chart parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BarParams {
    pub interval: u32,
    pub unit: BarUnit,
    pub bars_back: Option<u32>,
    pub session_template: Option<String>,
}

/// What a stream session is subscribed to.
///
/// Immutable once built: a session keeps its subscription for its whole
/// lifetime, and a different subscription needs a new session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    kind: StreamKind,
    targets: Vec<String>,
    bars: Option<BarParams>,
    position_changes: bool,
}

impl Subscription {
    /// Bars for one symbol, e.g. `Subscription::bars("MSFT", 5, BarUnit::Minute)`
    pub fn bars(symbol: impl Into<String>, interval: u32, unit: BarUnit) -> Self {
        Self {
            kind: StreamKind::Bars,
            targets: vec![symbol.into()],
            bars: Some(BarParams {
                interval,
                unit,
                bars_back: None,
                session_template: None,
            }),
            position_changes: false,
        }
    }

    /// Number of historical bars sent before live updates start
    pub fn with_bars_back(mut self, bars_back: u32) -> Self {
        if let Some(params) = self.bars.as_mut() {
            params.bars_back = Some(bars_back);
        }
        self
    }

    /// Trading session template, e.g. `USEQPreAndPost`
    pub fn with_session_template(mut self, template: impl Into<String>) -> Self {
        if let Some(params) = self.bars.as_mut() {
            params.session_template = Some(template.into());
        }
        self
    }

    pub fn quotes<I, S>(symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::for_targets(StreamKind::Quotes, symbols)
    }

    pub fn orders<I, S>(accounts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::for_targets(StreamKind::Orders, accounts)
    }

    /// Positions for the given accounts; with `changes` the server sends
    /// only changed fields after the initial snapshot
    pub fn positions<I, S>(accounts: I, changes: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            position_changes: changes,
            ..Self::for_targets(StreamKind::Positions, accounts)
        }
    }

    fn for_targets<I, S>(kind: StreamKind, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            kind,
            targets: targets.into_iter().map(Into::into).collect(),
            bars: None,
            position_changes: false,
        }
    }

    pub fn kind(&self) -> StreamKind {
        self.kind
    }

    /// Symbols or account ids
    pub fn targets(&self) -> &[String] {
        &self.targets
    }

    pub fn bar_params(&self) -> Option<&BarParams> {
        self.bars.as_ref()
    }

    /// Request path, relative to the API base URL
    pub fn path(&self) -> String {
        let targets = self.targets.join(",");
        match self.kind {
            StreamKind::Bars => format!("/v3/marketdata/stream/barcharts/{}", targets),
            StreamKind::Quotes => format!("/v3/marketdata/stream/quotes/{}", targets),
            StreamKind::Orders => format!("/v3/brokerage/stream/accounts/{}/orders", targets),
            StreamKind::Positions => {
                format!("/v3/brokerage/stream/accounts/{}/positions", targets)
            }
        }
    }

    /// Query parameters for the request
    pub fn query(&self) -> Vec<(&'static str, String)> {
        let mut query = Vec::new();
        if let Some(params) = &self.bars {
            query.push(("interval", params.interval.to_string()));
            query.push(("unit", params.unit.as_str().to_string()));
            if let Some(bars_back) = params.bars_back {
                query.push(("barsback", bars_back.to_string()));
            }
            if let Some(template) = &params.session_template {
                query.push(("sessiontemplate", template.clone()));
            }
        }
        if self.kind == StreamKind::Positions {
            query.push(("changes", self.position_changes.to_string()));
        }
        query
    }

    pub fn validate(&self) -> Result<()> {
        if self.targets.is_empty() {
            return Err(Error::Config(format!(
                "{} subscription needs at least one target",
                self.kind
            )));
        }
        for target in &self.targets {
            if target.is_empty()
                || target
                    .chars()
                    .any(|c| c == ',' || c == '/' || c.is_whitespace())
            {
                return Err(Error::Config(format!(
                    "invalid {} target {:?}",
                    self.kind, target
                )));
            }
        }

        match self.kind {
            StreamKind::Quotes if self.targets.len() > MAX_QUOTE_SYMBOLS => {
                return Err(Error::Config(format!(
                    "quote stream accepts at most {} symbols, got {}",
                    MAX_QUOTE_SYMBOLS,
                    self.targets.len()
                )));
            }
            StreamKind::Bars if self.targets.len() != 1 => {
                return Err(Error::Config(
                    "bar stream takes exactly one symbol".to_string(),
                ));
            }
            _ => {}
        }

        if let Some(params) = &self.bars {
            let valid = match params.unit {
                BarUnit::Minute => (1..=MAX_MINUTE_INTERVAL).contains(&params.interval),
                _ => params.interval == 1,
            };
            if !valid {
                return Err(Error::Config(format!(
                    "interval {} is not valid for unit {}",
                    params.interval,
                    params.unit.as_str()
                )));
            }
        }
        Ok(())
    }
}

impl fmt::Display for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.targets.join(","))
    }
}
