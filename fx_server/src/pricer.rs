//! Price generation engine.
//!
//! Each configured instrument carries an active flag and, once it has been started,
//! one repeating scheduler task (its chain). Every run of the chain is a tick: if
//! the instrument is active a fresh quote is drawn around its base price and
//! handed to the [`QuoteSink`]; the chain then waits a newly sampled delay in
//! `[0, max_delay)` before the next tick. Resampling the delay every cycle keeps
//! instruments from ticking in lockstep.
//!
//! Pausing only clears the flag. A tick already queued still fires and sees the
//! flag, so at most one cycle of staleness is possible after a pause.
//!
//! Price draw, with variation `v`:
//! - `bid = base + U(-v/2, v/2)`
//! - `ask = bid + U(spread_min, spread_min + spread_range)`
//! - both rounded to 4 digits half-up, and `ask >= bid + spread_min` enforced.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use fx_common::quote::{PRICE_SCALE, round_price};
use fx_common::{DispatchError, Quote, Result};
use log::{debug, info, warn};
use rand::Rng;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;

use crate::model::instruments::InstrumentConfig;
use crate::scheduler::{Scheduler, TaskHandle};

/// Resolution of the uniform samples, in fractional digits.
const SAMPLE_SCALE: u32 = 9;
const SAMPLE_RANGE: i64 = 1_000_000_000;

/// Receiver of generated quotes.
pub trait QuoteSink: Send + Sync {
    /// Take ownership of one quote. Must not report failures back.
    fn publish(&self, quote: Quote);
}

impl QuoteSink for crossbeam_channel::Sender<Quote> {
    fn publish(&self, quote: Quote) {
        if let Err(e) = self.send(quote) {
            warn!("Dropping quote for {}: receiver is gone", e.0.symbol);
        }
    }
}

/// Random walk parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct PricingParams {
    /// Upper bound (exclusive) of the delay between ticks.
    pub max_delay: Duration,
    /// Full width of the bid band around the base price.
    pub variation: Decimal,
    /// Smallest ask-bid distance.
    pub spread_min: Decimal,
    /// Width of the random part of the spread.
    pub spread_range: Decimal,
}

impl Default for PricingParams {
    fn default() -> Self {
        Self {
            max_delay: Duration::from_millis(10),
            variation: dec!(0.01),
            spread_min: dec!(0.0001),
            spread_range: dec!(0.0001),
        }
    }
}

impl PricingParams {
    /// Reject parameters that cannot honour `ask > bid`.
    pub fn validate(&self) -> Result<()> {
        if self.max_delay.is_zero() {
            return Err(DispatchError::InvalidSettings("max delay must be positive".into()));
        }
        if self.spread_min <= Decimal::ZERO {
            return Err(DispatchError::InvalidSettings("spread minimum must be positive".into()));
        }
        if self.variation < Decimal::ZERO || self.spread_range < Decimal::ZERO {
            return Err(DispatchError::InvalidSettings(
                "variation and spread range must not be negative".into(),
            ));
        }
        Ok(())
    }

    /// Spread floor at quote precision.
    pub fn min_spread(&self) -> Decimal {
        let mut floor = self
            .spread_min
            .round_dp_with_strategy(PRICE_SCALE, RoundingStrategy::AwayFromZero);
        floor.rescale(PRICE_SCALE);
        floor
    }

    /// Draw the delay before the next tick.
    pub fn sample_delay<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        let max_micros = self.max_delay.as_micros().max(1) as u64;
        Duration::from_micros(rng.random_range(0..max_micros))
    }

    /// Draw one quote for `symbol` around `base`.
    pub fn generate<R: Rng + ?Sized>(&self, symbol: &str, base: Decimal, rng: &mut R) -> Quote {
        let bid = base + self.variation * (uniform(rng) - dec!(0.5));
        let ask = bid + self.spread_min + self.spread_range * uniform(rng);

        let bid = round_price(bid);
        let ask = round_price(ask).max(bid + self.min_spread());
        Quote::new(symbol, bid, ask)
    }
}

/// Uniform sample in `[0, 1)`.
fn uniform<R: Rng + ?Sized>(rng: &mut R) -> Decimal {
    Decimal::new(rng.random_range(0..SAMPLE_RANGE), SAMPLE_SCALE)
}

struct Instrument {
    symbol: String,
    base_price: Decimal,
    active: AtomicBool,
    chain: Mutex<Option<TaskHandle>>,
}

impl Instrument {
    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

/// Per-instrument quote generator.
pub struct Pricer {
    instruments: BTreeMap<String, Arc<Instrument>>,
    params: Arc<PricingParams>,
    sink: Arc<dyn QuoteSink>,
    scheduler: Arc<Scheduler>,
}

impl Pricer {
    /// Create a pricer with every instrument paused. No chain runs until `start`.
    pub fn new(
        config: &InstrumentConfig,
        params: PricingParams,
        sink: Arc<dyn QuoteSink>,
        scheduler: Arc<Scheduler>,
    ) -> Result<Self> {
        params.validate()?;
        let instruments = config
            .iter()
            .map(|(symbol, base_price)| {
                let instrument = Instrument {
                    symbol: symbol.to_string(),
                    base_price,
                    active: AtomicBool::new(false),
                    chain: Mutex::new(None),
                };
                (symbol.to_string(), Arc::new(instrument))
            })
            .collect();
        Ok(Self {
            instruments,
            params: Arc::new(params),
            sink,
            scheduler,
        })
    }

    /// Activate `symbol` and make sure its chain is running.
    pub fn start(&self, symbol: &str) -> Result<()> {
        let instrument = self.lookup(symbol)?;
        self.ensure_chain(instrument)?;
        instrument.active.store(true, Ordering::SeqCst);
        info!("Started pricing for currency pair: {}", symbol);
        Ok(())
    }

    /// Deactivate `symbol`. Its chain keeps running but delivers nothing.
    pub fn pause(&self, symbol: &str) -> Result<()> {
        let instrument = self.lookup(symbol)?;
        instrument.active.store(false, Ordering::SeqCst);
        info!("Paused pricing for currency pair: {}", symbol);
        Ok(())
    }

    /// Start every configured instrument.
    pub fn start_all(&self) -> Result<()> {
        for instrument in self.instruments.values() {
            self.ensure_chain(instrument)?;
            instrument.active.store(true, Ordering::SeqCst);
        }
        info!("Started pricing for all currency pairs");
        Ok(())
    }

    /// Pause every configured instrument.
    pub fn pause_all(&self) {
        for instrument in self.instruments.values() {
            instrument.active.store(false, Ordering::SeqCst);
        }
        info!("Paused pricing for all currency pairs");
    }

    /// Active flag per instrument.
    pub fn current_state(&self) -> BTreeMap<String, bool> {
        self.instruments
            .iter()
            .map(|(symbol, instrument)| (symbol.clone(), instrument.is_active()))
            .collect()
    }

    /// Configured symbols, sorted.
    pub fn symbols(&self) -> Vec<String> {
        self.instruments.keys().cloned().collect()
    }

    /// Whether `symbol` has a running chain.
    pub fn is_generating(&self, symbol: &str) -> bool {
        self.instruments
            .get(symbol)
            .and_then(|instrument| instrument.chain.lock().ok().map(|chain| chain.is_some()))
            .unwrap_or(false)
    }

    /// Cancel every chain.
    pub fn stop(&self) {
        for instrument in self.instruments.values() {
            instrument.active.store(false, Ordering::SeqCst);
            let chain = match instrument.chain.lock() {
                Ok(mut chain) => chain.take(),
                Err(poisoned) => poisoned.into_inner().take(),
            };
            if let Some(chain) = chain {
                chain.cancel();
            }
        }
        debug!("All pricing chains cancelled");
    }

    fn lookup(&self, symbol: &str) -> Result<&Arc<Instrument>> {
        self.instruments
            .get(symbol)
            .ok_or_else(|| DispatchError::InstrumentNotFound(symbol.to_string()))
    }

    fn ensure_chain(&self, instrument: &Arc<Instrument>) -> Result<()> {
        let mut chain = instrument.chain.lock()?;
        if chain.is_some() {
            return Ok(());
        }

        let params = Arc::clone(&self.params);
        let delay_params = Arc::clone(&self.params);
        let sink = Arc::clone(&self.sink);
        let target = Arc::clone(instrument);
        let handle = self.scheduler.schedule_repeating(
            format!("tick-{}", instrument.symbol),
            self.params.sample_delay(&mut rand::rng()),
            move || delay_params.sample_delay(&mut rand::rng()),
            move || tick(&target, &params, sink.as_ref()),
        )?;
        *chain = Some(handle);
        debug!("Pricing chain created for {}", instrument.symbol);
        Ok(())
    }
}

fn tick(instrument: &Instrument, params: &PricingParams, sink: &dyn QuoteSink) {
    if !instrument.is_active() {
        return;
    }
    let quote = params.generate(&instrument.symbol, instrument.base_price, &mut rand::rng());
    sink.publish(quote);
}
