//! End-to-end engine scenarios: full position lifecycles across price
//! ingestion, funding and liquidation, admin gating, and the audit log.

use rust_decimal_macros::dec;
use vperps_core::*;

const ADMIN: UserId = UserId(0);
const ALICE: UserId = UserId(1);
const BOB: UserId = UserId(2);
const ETH: MarketId = MarketId(1);
const HOUR_MS: i64 = 3_600_000;

fn venue() -> Engine {
    let mut engine = Engine::new(
        ADMIN,
        EngineConfig::default(),
        InsuranceFund::new(Quote::new(dec!(100)), Quote::new(dec!(1_000_000))),
    );
    let market = Market::new(
        ETH,
        "ETH",
        "USD",
        "main",
        FundingParams::default(),
        Timestamp::from_millis(0),
    );
    let vamm = VirtualAmm::new(
        Price::new_unchecked(dec!(2000)),
        dec!(1_000_000),
        VammParams::default(),
    );
    engine.add_market(ADMIN, market, vamm).unwrap();
    engine
        .configure_liquidation(ADMIN, ETH, LiquidationConfig::default())
        .unwrap();
    engine.register_feed(ADMIN, ETH, FeedId(1), 2 * HOUR_MS).unwrap();
    engine.fund_deposit(Quote::new(dec!(10_000))).unwrap();
    engine
}

fn feed(engine: &mut Engine, price: rust_decimal::Decimal) {
    engine.advance_time(1);
    let at = engine.time();
    engine
        .submit_price_update(ETH, PriceUpdate::new(FeedId(1), Price::new_unchecked(price), at))
        .unwrap();
}

#[test]
fn full_lifecycle_with_funding() {
    let mut engine = venue();
    engine.deposit(ALICE, Quote::new(dec!(10_000))).unwrap();

    let id = engine
        .open_position(
            ALICE,
            ETH,
            SignedSize::new(dec!(1)),
            Price::new_unchecked(dec!(2000)),
            Quote::new(dec!(1000)),
        )
        .unwrap();

    // synthetic trades rich against the external reference: longs pay
    feed(&mut engine, dec!(1990));
    engine.advance_time(HOUR_MS);
    feed(&mut engine, dec!(1990));
    let outcome = engine.update_funding(ETH).unwrap();
    assert!(outcome.applied);
    assert!(outcome.rate > dec!(0));

    let result = engine
        .close_position(
            ALICE,
            id,
            engine.mark_price(ETH).unwrap(),
            Bps::ONE_HUNDRED_PERCENT,
        )
        .unwrap();
    assert!(result.fully_closed);
    assert!(result.funding_paid.is_positive());

    // everything is withdrawable again
    assert_eq!(engine.locked_balance(ALICE).value(), dec!(0));
    let free = engine.free_balance(ALICE);
    engine.withdraw(ALICE, free).unwrap();
    assert_eq!(engine.free_balance(ALICE).value(), dec!(0));
    assert!(engine.ledger().check_conservation());
}

#[test]
fn funding_cannot_double_apply() {
    let mut engine = venue();
    feed(&mut engine, dec!(1990));
    engine.advance_time(HOUR_MS);
    feed(&mut engine, dec!(1990));

    let first = engine.update_funding(ETH).unwrap();
    let second = engine.update_funding(ETH).unwrap();
    let third = engine.update_funding(ETH).unwrap();

    assert!(first.applied);
    assert!(!second.applied);
    assert!(!third.applied);
    assert_eq!(second.new_index, first.new_index);
    assert_eq!(third.new_index, first.new_index);
}

#[test]
fn withdraw_cannot_touch_locked_margin() {
    let mut engine = venue();
    engine.deposit(ALICE, Quote::new(dec!(1000))).unwrap();
    engine
        .open_position(
            ALICE,
            ETH,
            SignedSize::new(dec!(0.2)),
            Price::new_unchecked(dec!(2000)),
            Quote::new(dec!(400)),
        )
        .unwrap();

    // only the 600 free remains withdrawable
    assert!(engine.withdraw(ALICE, Quote::new(dec!(601))).is_err());
    engine.withdraw(ALICE, Quote::new(dec!(600))).unwrap();
    assert_eq!(engine.locked_balance(ALICE).value(), dec!(400));
}

#[test]
fn admin_operations_are_gated() {
    let mut engine = venue();
    let market = Market::new(
        MarketId(2),
        "BTC",
        "USD",
        "main",
        FundingParams::default(),
        Timestamp::from_millis(0),
    );
    let vamm = VirtualAmm::new(
        Price::new_unchecked(dec!(60_000)),
        dec!(1000),
        VammParams::default(),
    );

    let result = engine.add_market(ALICE, market.clone(), vamm.clone());
    assert!(matches!(result, Err(EngineError::Unauthorized(_))));

    engine.authorize(ADMIN, ALICE).unwrap();
    engine.add_market(ALICE, market, vamm).unwrap();

    engine.revoke(ADMIN, ALICE).unwrap();
    assert!(matches!(
        engine.set_market_status(ALICE, MarketId(2), false),
        Err(EngineError::Unauthorized(_))
    ));
}

#[test]
fn insurance_withdrawal_respects_floor() {
    let mut engine = venue();
    // fund holds 10_000 with a 100 floor
    engine.fund_withdraw(ADMIN, Quote::new(dec!(9_900))).unwrap();
    assert!(engine
        .fund_withdraw(ADMIN, Quote::new(dec!(1)))
        .is_err());
    assert!(engine.insurance().is_healthy());
}

#[test]
fn event_log_records_the_lifecycle() {
    let mut engine = venue();
    engine.deposit(ALICE, Quote::new(dec!(5000))).unwrap();
    let id = engine
        .open_position(
            ALICE,
            ETH,
            SignedSize::new(dec!(0.5)),
            Price::new_unchecked(dec!(2000)),
            Quote::new(dec!(500)),
        )
        .unwrap();
    engine
        .close_position(
            ALICE,
            id,
            Price::new_unchecked(dec!(2000)),
            Bps::ONE_HUNDRED_PERCENT,
        )
        .unwrap();

    let kinds: Vec<&str> = engine
        .events()
        .iter()
        .map(|e| match &e.payload {
            EventPayload::MarketAdded(_) => "market_added",
            EventPayload::LiquidationConfigured(_) => "liquidation_configured",
            EventPayload::Deposit(_) => "deposit",
            EventPayload::PositionOpened(_) => "opened",
            EventPayload::PositionClosed(_) => "closed",
            _ => "other",
        })
        .collect();
    assert_eq!(
        kinds,
        vec![
            "market_added",
            "liquidation_configured",
            "deposit",
            "opened",
            "closed"
        ]
    );

    // event ids are monotonic
    let ids: Vec<u64> = engine.events().iter().map(|e| e.id.0).collect();
    assert!(ids.windows(2).all(|w| w[1] > w[0]));
}

#[test]
fn event_log_is_bounded() {
    let mut engine = Engine::new(
        ADMIN,
        EngineConfig {
            max_events: 5,
            ..EngineConfig::default()
        },
        InsuranceFund::new(Quote::zero(), Quote::new(dec!(1000))),
    );

    for i in 1..=20i64 {
        engine
            .deposit(ALICE, Quote::new(rust_decimal::Decimal::new(i, 0)))
            .unwrap();
    }
    assert_eq!(engine.events().len(), 5);
    // the oldest entries were dropped, the newest kept
    assert_eq!(engine.events().first().map(|e| e.id.0), Some(16));
    assert_eq!(engine.recent_events(2).len(), 2);
}

#[test]
fn events_serialize_for_audit_export() {
    let mut engine = venue();
    engine.deposit(ALICE, Quote::new(dec!(5000))).unwrap();
    engine
        .open_position(
            ALICE,
            ETH,
            SignedSize::new(dec!(0.5)),
            Price::new_unchecked(dec!(2000)),
            Quote::new(dec!(500)),
        )
        .unwrap();

    let json = serde_json::to_string(engine.events()).unwrap();
    let back: Vec<Event> = serde_json::from_str(&json).unwrap();
    assert_eq!(back.len(), engine.events().len());
    assert!(json.contains("PositionOpened"));
}

#[test]
fn transfer_then_liquidation_settles_against_new_owner() {
    let mut engine = venue();
    engine.deposit(ALICE, Quote::new(dec!(200))).unwrap();
    engine.deposit(BOB, Quote::new(dec!(50))).unwrap();

    let id = engine
        .open_position(
            ALICE,
            ETH,
            SignedSize::new(dec!(1)),
            Price::new_unchecked(dec!(2000)),
            Quote::new(dec!(100)),
        )
        .unwrap();
    engine.transfer_position(ALICE, id, BOB).unwrap();

    feed(&mut engine, dec!(1900));
    let outcome = engine.liquidate(ADMIN, id).unwrap();
    assert_eq!(outcome.owner, BOB);
    // the original owner's remaining funds are untouched by the liquidation
    assert_eq!(engine.free_balance(ALICE).value(), dec!(100));
    assert!(engine.ledger().check_conservation());
}
