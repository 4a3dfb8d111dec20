// 6.0: synthetic pricer. the venue quotes against virtual reserves not
// backed by real liquidity; mark = virtual_quote / virtual_base. a trade of
// signed size s shifts the reserves by |s| base and |s| * mark quote
// (notional at the pre-trade mark) in the trade direction. this is a linear
// price-impact approximation, NOT a constant-product swap: k is
// informational only and drifts across trades. funding and liquidation
// thresholds are tuned against this impact curve.

use crate::types::{Bps, Price, Quote, Side, SignedSize};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VammParams {
    /// Cap on total long or total short open interest (notional).
    pub max_open_interest: Quote,
    /// Max deviation of the post-trade mark from the reference spot.
    pub max_deviation_bps: Bps,
}

impl Default for VammParams {
    fn default() -> Self {
        Self {
            max_open_interest: Quote::new(dec!(10_000_000)),
            max_deviation_bps: Bps::new(500), // 5%
        }
    }
}

/// What a trade did to the curve. `executed_at` is the pre-trade mark, which
/// is the price the trade's notional was computed at.
#[derive(Debug, Clone, Copy)]
pub struct TradeImpact {
    pub executed_at: Price,
    pub new_mark: Price,
    pub notional: Quote,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VirtualAmm {
    virtual_base: Decimal,
    virtual_quote: Decimal,
    total_long_oi: Quote,
    total_short_oi: Quote,
    pub params: VammParams,
}

impl VirtualAmm {
    /// Seed the curve at `initial_price` with `depth` units of virtual base.
    /// Deeper reserves mean less price impact per unit traded.
    pub fn new(initial_price: Price, depth: Decimal, params: VammParams) -> Self {
        debug_assert!(depth > Decimal::ZERO);
        Self {
            virtual_base: depth,
            virtual_quote: depth * initial_price.value(),
            total_long_oi: Quote::zero(),
            total_short_oi: Quote::zero(),
            params,
        }
    }

    pub fn mark_price(&self) -> Price {
        Price::new_unchecked(self.virtual_quote / self.virtual_base)
    }

    /// Informational constant-product value. Not preserved across trades.
    pub fn k(&self) -> Decimal {
        self.virtual_base * self.virtual_quote
    }

    pub fn open_interest(&self, side: Side) -> Quote {
        match side {
            Side::Long => self.total_long_oi,
            Side::Short => self.total_short_oi,
        }
    }

    pub fn reserves(&self) -> (Decimal, Decimal) {
        (self.virtual_base, self.virtual_quote)
    }

    /// Apply a new directional exposure of signed size `s`. Validates the
    /// open-interest cap, reserve exhaustion and the post-trade deviation
    /// from `reference_spot` before committing anything.
    pub fn apply_trade(
        &mut self,
        size: SignedSize,
        reference_spot: Price,
    ) -> Result<TradeImpact, VammError> {
        let side = size.side().ok_or(VammError::ZeroSize)?;
        let mark = self.mark_price();
        let abs = size.abs();
        let notional = Quote::new(abs * mark.value());

        let (new_base, new_quote) = match side {
            Side::Long => (self.virtual_base - abs, self.virtual_quote + notional.value()),
            Side::Short => (self.virtual_base + abs, self.virtual_quote - notional.value()),
        };
        if new_base <= Decimal::ZERO || new_quote <= Decimal::ZERO {
            return Err(VammError::ReservesExhausted);
        }

        let new_oi = self.open_interest(side).add(notional);
        if new_oi > self.params.max_open_interest {
            return Err(VammError::OpenInterestCapExceeded {
                side,
                attempted: new_oi,
                cap: self.params.max_open_interest,
            });
        }

        let new_mark = Price::new_unchecked(new_quote / new_base);
        let deviation = new_mark.deviation_from(reference_spot);
        if deviation > self.params.max_deviation_bps.as_fraction() {
            return Err(VammError::DeviationExceeded {
                deviation,
                max: self.params.max_deviation_bps,
            });
        }

        self.virtual_base = new_base;
        self.virtual_quote = new_quote;
        match side {
            Side::Long => self.total_long_oi = new_oi,
            Side::Short => self.total_short_oi = new_oi,
        }

        Ok(TradeImpact {
            executed_at: mark,
            new_mark,
            notional,
        })
    }

    /// Reverse exposure when a position (or a slice of one) closes. `size`
    /// carries the position's sign: unwinding a long moves the curve the way
    /// a short trade would. Open interest is reduced at the current mark and
    /// clamped at zero, since opens and closes are priced at different marks.
    pub fn unwind(&mut self, size: SignedSize) -> Result<TradeImpact, VammError> {
        let side = size.side().ok_or(VammError::ZeroSize)?;
        let mark = self.mark_price();
        let abs = size.abs();
        let notional = Quote::new(abs * mark.value());

        let (new_base, new_quote) = match side {
            Side::Long => (self.virtual_base + abs, self.virtual_quote - notional.value()),
            Side::Short => (self.virtual_base - abs, self.virtual_quote + notional.value()),
        };
        if new_base <= Decimal::ZERO || new_quote <= Decimal::ZERO {
            return Err(VammError::ReservesExhausted);
        }

        self.virtual_base = new_base;
        self.virtual_quote = new_quote;
        let reduced = match side {
            Side::Long => &mut self.total_long_oi,
            Side::Short => &mut self.total_short_oi,
        };
        *reduced = if notional > *reduced {
            Quote::zero()
        } else {
            reduced.sub(notional)
        };

        Ok(TradeImpact {
            executed_at: mark,
            new_mark: Price::new_unchecked(new_quote / new_base),
            notional,
        })
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum VammError {
    #[error("Trade size must be non-zero")]
    ZeroSize,

    #[error("Virtual reserves exhausted by trade")]
    ReservesExhausted,

    #[error("Open interest cap exceeded on {side:?}: attempted {attempted}, cap {cap}")]
    OpenInterestCapExceeded {
        side: Side,
        attempted: Quote,
        cap: Quote,
    },

    #[error("Post-trade mark deviates {deviation} from spot, max {max:?}")]
    DeviationExceeded { deviation: Decimal, max: Bps },
}
