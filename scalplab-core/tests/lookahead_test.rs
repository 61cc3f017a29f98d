//! Look-ahead contamination tests for indicators and strategies.
//!
//! Invariant: no value or annotation at bar t may depend on bar t+1 or later.
//!
//! Method: compute on a truncated series (bars 0..150) and the full series
//! (bars 0..300). Bars 0..150 must agree exactly between both runs.

use chrono::{Duration, TimeZone, Utc};
use scalplab_core::domain::Bar;
use scalplab_core::indicators::{Adx, Ema, Indicator, Rsi, Stochastic};
use scalplab_core::strategy::{
    RegimeMomentum, RegimeParams, RibbonBreakout, RibbonParams, Strategy,
};

const INCREMENT: f64 = 0.00001;

/// Five-minute FX-like bars from a deterministic pseudo-random walk.
fn make_test_bars(n: usize) -> Vec<Bar> {
    let start = Utc.with_ymd_and_hms(2024, 3, 4, 0, 0, 0).unwrap();
    let mut bars = Vec::with_capacity(n);
    let mut price = 1.1000;

    for i in 0..n {
        let seed = (i as u64)
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        let change = (((seed >> 33) % 200) as f64 - 100.0) * 0.00002; // ±20 pips
        let open = price;
        price = (price + change).max(0.5);
        let close = price;
        let high = open.max(close) + 0.00015;
        let low = open.min(close) - 0.00015;

        bars.push(Bar::new(
            start + Duration::minutes(5 * i as i64),
            open,
            high,
            low,
            close,
            100.0 + i as f64,
        ));
    }

    bars
}

fn assert_no_lookahead(indicator: &dyn Indicator, full_bars: &[Bar], truncated_len: usize) {
    let truncated = &full_bars[..truncated_len];
    let full_result = indicator.compute(full_bars);
    let truncated_result = indicator.compute(truncated);

    assert_eq!(
        truncated_result.len(),
        truncated_len,
        "{}: truncated result length mismatch",
        indicator.name()
    );
    assert_eq!(
        full_result.len(),
        full_bars.len(),
        "{}: full result length mismatch",
        indicator.name()
    );

    for i in 0..truncated_len {
        let t = truncated_result[i];
        let f = full_result[i];

        if t.is_nan() && f.is_nan() {
            continue;
        }

        assert!(
            !t.is_nan() && !f.is_nan(),
            "{}: NaN mismatch at bar {i} (truncated={t}, full={f})",
            indicator.name()
        );
        assert!(
            (t - f).abs() < 1e-12,
            "{}: look-ahead contamination at bar {i}: truncated={t}, full={f}",
            indicator.name()
        );
    }
}

fn assert_strategy_no_lookahead(strategy: &dyn Strategy, full_bars: &[Bar], truncated_len: usize) {
    let full = strategy.compute_signals(full_bars).unwrap();
    let truncated = strategy
        .compute_signals(&full_bars[..truncated_len])
        .unwrap();

    assert_eq!(truncated.len(), truncated_len);
    for i in 0..truncated_len {
        let t = truncated.get(i).unwrap();
        let f = full.get(i).unwrap();
        assert_eq!(
            t.signal,
            f.signal,
            "{}: signal differs at bar {i}",
            strategy.name()
        );
        assert_eq!(
            t.stop_price,
            f.stop_price,
            "{}: stop differs at bar {i}",
            strategy.name()
        );
        assert_eq!(
            t.target_price,
            f.target_price,
            "{}: target differs at bar {i}",
            strategy.name()
        );
    }
}

#[test]
fn lookahead_ema() {
    let bars = make_test_bars(300);
    assert_no_lookahead(&Ema::new(5), &bars, 150);
    assert_no_lookahead(&Ema::new(14), &bars, 150);
    assert_no_lookahead(&Ema::new(50), &bars, 150);
}

#[test]
fn lookahead_rsi() {
    let bars = make_test_bars(300);
    assert_no_lookahead(&Rsi::new(9), &bars, 150);
    assert_no_lookahead(&Rsi::new(14), &bars, 150);
}

#[test]
fn lookahead_adx() {
    let bars = make_test_bars(300);
    assert_no_lookahead(&Adx::new(14), &bars, 150);
    assert_no_lookahead(&Adx::new(7), &bars, 150);
}

#[test]
fn lookahead_stochastic() {
    let bars = make_test_bars(300);
    assert_no_lookahead(&Stochastic::new(14, 3), &bars, 150);
    assert_no_lookahead(&Stochastic::new(5, 1), &bars, 150);
}

#[test]
fn lookahead_ribbon_breakout() {
    let bars = make_test_bars(300);
    let strategy = RibbonBreakout::new(RibbonParams::default(), INCREMENT).unwrap();
    assert_strategy_no_lookahead(&strategy, &bars, 150);

    // A looser threshold so the comparison covers bars that actually signal.
    let loose = RibbonParams {
        consolidation_threshold_pips: 40.0,
        ..RibbonParams::default()
    };
    let strategy = RibbonBreakout::new(loose, INCREMENT).unwrap();
    assert_strategy_no_lookahead(&strategy, &bars, 150);
}

#[test]
fn lookahead_regime_momentum() {
    let bars = make_test_bars(300);
    let strategy = RegimeMomentum::new(RegimeParams::default(), INCREMENT).unwrap();
    assert_strategy_no_lookahead(&strategy, &bars, 150);

    let loose = RegimeParams {
        adx_threshold: 10.0,
        ..RegimeParams::default()
    };
    let strategy = RegimeMomentum::new(loose, INCREMENT).unwrap();
    assert_strategy_no_lookahead(&strategy, &bars, 150);
}

#[test]
fn truncation_inside_warmup() {
    let bars = make_test_bars(300);
    let strategy = RibbonBreakout::new(RibbonParams::default(), INCREMENT).unwrap();
    // Shorter than the warmup: every bar is flat, lengths still match.
    assert_strategy_no_lookahead(&strategy, &bars, strategy.warmup_bars() - 1);
}
