//! Instrument list loading.
//!
//! The instrument set is read once at startup from a flat text file with one
//! `SYMBOL,basePrice` pair per line:
//!
//! ```text
//! # symbol,base price
//! EURUSD,1.1000
//! GBPUSD,1.2700
//! ```
//!
//! Blank lines and `#` comments are skipped. Anything else that does not parse is
//! a [`DispatchError::ConfigLoad`] carrying the 1-based line number; so is a file
//! that yields no instruments. The service refuses to start on either.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use fx_common::{DispatchError, Result};
use rust_decimal::Decimal;

/// Immutable symbol to base price mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstrumentConfig {
    base_prices: BTreeMap<String, Decimal>,
}

impl InstrumentConfig {
    /// Build from already-known pairs. Rejects an empty set.
    pub fn from_pairs<I, S>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, Decimal)>,
        S: Into<String>,
    {
        let base_prices: BTreeMap<String, Decimal> =
            pairs.into_iter().map(|(s, p)| (s.into(), p)).collect();
        if base_prices.is_empty() {
            return Err(DispatchError::config(0, "no instruments configured"));
        }
        Ok(Self { base_prices })
    }

    /// Read the instrument file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            DispatchError::config(0, format!("cannot open {}: {}", path.display(), e))
        })?;
        Self::parse(BufReader::new(file))
    }

    /// Parse instruments from a buffered reader.
    pub fn parse<R: BufRead>(reader: R) -> Result<Self> {
        let mut base_prices = BTreeMap::new();

        for (index, line_result) in reader.lines().enumerate() {
            let line_no = index + 1;
            let line = line_result.map_err(|e| DispatchError::config(line_no, e.to_string()))?;
            let trimmed_line = line.trim();
            if trimmed_line.is_empty() || trimmed_line.starts_with('#') {
                continue;
            }

            let (symbol, price) = parse_line(trimmed_line)
                .map_err(|reason| DispatchError::config(line_no, reason))?;
            if base_prices.insert(symbol.to_string(), price).is_some() {
                return Err(DispatchError::config(
                    line_no,
                    format!("duplicate instrument {symbol}"),
                ));
            }
        }

        if base_prices.is_empty() {
            return Err(DispatchError::config(0, "no instruments configured"));
        }
        Ok(Self { base_prices })
    }

    /// Base price of `symbol`, if configured.
    pub fn base_price(&self, symbol: &str) -> Option<Decimal> {
        self.base_prices.get(symbol).copied()
    }

    /// Symbols in sorted order.
    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.base_prices.keys().map(String::as_str)
    }

    /// (symbol, base price) pairs in symbol order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Decimal)> {
        self.base_prices.iter().map(|(s, p)| (s.as_str(), *p))
    }

    /// Number of instruments.
    pub fn len(&self) -> usize {
        self.base_prices.len()
    }

    /// Always false for a loaded config; present for API symmetry.
    pub fn is_empty(&self) -> bool {
        self.base_prices.is_empty()
    }
}

fn parse_line(line: &str) -> std::result::Result<(&str, Decimal), String> {
    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    let [symbol, price] = fields.as_slice() else {
        return Err(format!("expected SYMBOL,PRICE but got {} fields", fields.len()));
    };
    if symbol.is_empty() {
        return Err("empty symbol".to_string());
    }
    let price: Decimal = price
        .parse()
        .map_err(|e| format!("invalid price {price:?} for {symbol}: {e}"))?;
    if price <= Decimal::ZERO {
        return Err(format!("base price for {symbol} must be positive"));
    }
    Ok((*symbol, price))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::io::Cursor;

    fn parse(text: &str) -> Result<InstrumentConfig> {
        InstrumentConfig::parse(Cursor::new(text))
    }

    fn line_of(err: DispatchError) -> usize {
        match err {
            DispatchError::ConfigLoad { line, .. } => line,
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn parses_pairs_skipping_blanks_and_comments() {
        let config = parse("# pairs\nEURUSD,1.1000\n\n USDJPY , 151.20 \n").unwrap();

        assert_eq!(config.len(), 2);
        assert_eq!(config.base_price("EURUSD"), Some(dec!(1.1000)));
        assert_eq!(config.base_price("USDJPY"), Some(dec!(151.20)));
        assert_eq!(config.symbols().collect::<Vec<_>>(), vec!["EURUSD", "USDJPY"]);
    }

    #[test]
    fn malformed_line_is_reported_with_its_number() {
        assert_eq!(line_of(parse("EURUSD,1.1\nGBPUSD\n").unwrap_err()), 2);
        assert_eq!(line_of(parse("EURUSD,1.1,extra\n").unwrap_err()), 1);
        assert_eq!(line_of(parse("EURUSD,abc\n").unwrap_err()), 1);
        assert_eq!(line_of(parse(",1.1\n").unwrap_err()), 1);
        assert_eq!(line_of(parse("EURUSD,-1\n").unwrap_err()), 1);
    }

    #[test]
    fn duplicate_symbol_is_rejected() {
        assert_eq!(line_of(parse("EURUSD,1.1\nEURUSD,1.2\n").unwrap_err()), 2);
    }

    #[test]
    fn empty_source_is_fatal() {
        assert_eq!(line_of(parse("").unwrap_err()), 0);
        assert_eq!(line_of(parse("# nothing here\n\n").unwrap_err()), 0);
        assert!(InstrumentConfig::from_pairs(Vec::<(String, Decimal)>::new()).is_err());
    }

    #[test]
    fn missing_file_is_fatal() {
        let err = InstrumentConfig::load("/definitely/not/here.csv").unwrap_err();
        assert_eq!(line_of(err), 0);
    }
}
