//! End-to-end engine tests.
//!
//! Tests cover:
//! - Return metrics on hand-checkable price paths
//! - Last-known-price valuation across holidays
//! - Contributions, step-up and idempotent rebalancing
//! - Cooldown-gated triggered rebalancing in both regime directions
//! - Ledger invariants over arbitrary buy/sell sequences (proptest)

mod common;

use approx::assert_abs_diff_eq;
use common::*;
use sipsim::domain::error::SipsimError;
use sipsim::domain::frequency::Frequency;
use sipsim::domain::metrics::{MetricName, MetricValue, portfolio_value};
use sipsim::domain::simulation::{self, SimulationResult};
use sipsim::domain::strategy::trend_filter::TrendFilterParams;
use sipsim::domain::strategy::{
    Allocation, FixedAllocation, RegimeMapping, TrendFilter, TriggerConfig,
};
use sipsim::domain::transaction::RebalanceKind;

fn weights(pairs: &[(&str, f64)]) -> Allocation {
    pairs.iter().map(|(k, w)| (k.to_string(), *w)).collect()
}

fn metric(result: &SimulationResult, name: MetricName) -> MetricValue {
    result.metrics.get(name).unwrap()
}

mod returns {
    use super::*;

    #[test]
    fn constant_price_has_zero_return() {
        let market = market(vec![daily_series("A", "2024-01-01", &[100.0; 31])]);
        let config = sim_config("2024-01-01", "2024-01-31", 1000.0);
        let mut strategy =
            FixedAllocation::new("hold", weights(&[("A", 1.0)]), Frequency::Never).unwrap();

        let result = simulation::run(&config, &market, &mut strategy).unwrap();

        assert_abs_diff_eq!(result.final_value, 1000.0, epsilon = 1e-9);
        assert_abs_diff_eq!(result.total_invested, 1000.0);
        assert_abs_diff_eq!(metric(&result, MetricName::TotalReturn).value().unwrap(), 0.0);
        assert_abs_diff_eq!(
            metric(&result, MetricName::Xirr).value().unwrap(),
            0.0,
            epsilon = 1e-6
        );
        assert_abs_diff_eq!(metric(&result, MetricName::MaxDrawdown).value().unwrap(), 0.0);
        assert!(metric(&result, MetricName::SharpeRatio).is_undefined());
    }

    #[test]
    fn two_instrument_buy_and_hold() {
        let rising: Vec<f64> = (0..10).map(|i| 100.0 + 100.0 * i as f64 / 9.0).collect();
        let market = market(vec![
            daily_series("A", "2024-01-01", &rising),
            daily_series("B", "2024-01-01", &[100.0; 10]),
        ]);
        let config = sim_config("2024-01-01", "2024-01-10", 1000.0);
        let mut strategy =
            FixedAllocation::new("split", weights(&[("A", 0.5), ("B", 0.5)]), Frequency::Never)
                .unwrap();

        let result = simulation::run(&config, &market, &mut strategy).unwrap();

        assert_abs_diff_eq!(result.final_value, 1500.0, epsilon = 1e-9);
        assert_abs_diff_eq!(
            metric(&result, MetricName::TotalReturn).value().unwrap(),
            0.5,
            epsilon = 1e-12
        );
        assert_abs_diff_eq!(result.final_holdings["A"], 5.0);
        assert_abs_diff_eq!(result.final_holdings["B"], 5.0);
        assert!(result.rebalances.is_empty());
    }

    #[test]
    fn halving_then_recovery_is_half_drawdown() {
        let market = market(vec![daily_series("A", "2024-01-01", &[100.0, 80.0, 50.0, 100.0])]);
        let config = sim_config("2024-01-01", "2024-01-04", 1000.0);
        let mut strategy =
            FixedAllocation::new("hold", weights(&[("A", 1.0)]), Frequency::Never).unwrap();

        let result = simulation::run(&config, &market, &mut strategy).unwrap();

        assert_abs_diff_eq!(
            metric(&result, MetricName::MaxDrawdown).value().unwrap(),
            -0.5,
            epsilon = 1e-12
        );
        assert_abs_diff_eq!(metric(&result, MetricName::TotalReturn).value().unwrap(), 0.0);
    }

    #[test]
    fn rising_path_has_no_drawdown() {
        let market = market(vec![daily_series("A", "2024-01-01", &[100.0, 110.0, 120.0])]);
        let config = sim_config("2024-01-01", "2024-01-03", 1000.0);
        let mut strategy =
            FixedAllocation::new("hold", weights(&[("A", 1.0)]), Frequency::Never).unwrap();

        let result = simulation::run(&config, &market, &mut strategy).unwrap();

        assert_abs_diff_eq!(metric(&result, MetricName::MaxDrawdown).value().unwrap(), 0.0);
        assert!(metric(&result, MetricName::Xirr).value().unwrap() > 0.0);
    }

    #[test]
    fn single_date_run_leaves_ratios_undefined() {
        let market = market(vec![daily_series("A", "2024-01-01", &[100.0])]);
        let config = sim_config("2024-01-01", "2024-01-01", 1000.0);
        let mut strategy =
            FixedAllocation::new("hold", weights(&[("A", 1.0)]), Frequency::Never).unwrap();

        let result = simulation::run(&config, &market, &mut strategy).unwrap();

        assert!(metric(&result, MetricName::SharpeRatio).is_undefined());
        assert!(metric(&result, MetricName::SortinoRatio).is_undefined());
        assert!(metric(&result, MetricName::Xirr).is_undefined());
        assert!(metric(&result, MetricName::CalmarRatio).is_undefined());
        assert_abs_diff_eq!(metric(&result, MetricName::TotalReturn).value().unwrap(), 0.0);
    }
}

mod valuation {
    use super::*;

    fn holiday_market() -> sipsim::domain::price::Market {
        market(vec![
            series(
                "A",
                &[("2024-01-01", 100.0), ("2024-01-02", 110.0), ("2024-01-04", 120.0)],
            ),
            daily_series("B", "2024-01-01", &[100.0; 4]),
        ])
    }

    #[test]
    fn missing_observation_uses_last_known_price() {
        let market = holiday_market();
        let config = sim_config("2024-01-01", "2024-01-05", 1000.0);
        let mut strategy =
            FixedAllocation::new("split", weights(&[("A", 0.5), ("B", 0.5)]), Frequency::Never)
                .unwrap();

        let result = simulation::run(&config, &market, &mut strategy).unwrap();

        assert_abs_diff_eq!(result.value_on(d("2024-01-03"), &market).unwrap(), 1050.0);
        // End date has no observation for either instrument.
        assert_abs_diff_eq!(result.final_value, 1100.0);
        assert_abs_diff_eq!(
            metric(&result, MetricName::TotalReturn).value().unwrap(),
            0.1,
            epsilon = 1e-12
        );
        let dates: Vec<_> = result.value_series.iter().map(|p| p.date).collect();
        assert_eq!(
            dates,
            vec![d("2024-01-01"), d("2024-01-02"), d("2024-01-03"), d("2024-01-04")]
        );
    }

    #[test]
    fn valuation_before_first_observation_fails() {
        let market = holiday_market();
        let config = sim_config("2024-01-01", "2024-01-05", 1000.0);
        let mut strategy =
            FixedAllocation::new("split", weights(&[("A", 0.5), ("B", 0.5)]), Frequency::Never)
                .unwrap();
        let result = simulation::run(&config, &market, &mut strategy).unwrap();

        let err = portfolio_value(&result.final_holdings, &market, d("2023-12-31")).unwrap_err();
        assert!(matches!(err, SipsimError::PriceNotYetAvailable { .. }));
        // Nothing was held yet, so nothing needs a price.
        assert_abs_diff_eq!(result.value_on(d("2023-12-31"), &market).unwrap(), 0.0);
    }

    #[test]
    fn start_snaps_to_first_observed_date() {
        let market = market(vec![daily_series("A", "2024-01-03", &[100.0; 5])]);
        let config = sim_config("2024-01-01", "2024-01-07", 1000.0);
        let mut strategy =
            FixedAllocation::new("hold", weights(&[("A", 1.0)]), Frequency::Never).unwrap();

        let result = simulation::run(&config, &market, &mut strategy).unwrap();

        assert_eq!(result.start_date, d("2024-01-03"));
        assert_eq!(result.transactions.entries()[0].date, d("2024-01-03"));
    }

    #[test]
    fn unknown_instrument_is_data_unavailable() {
        let market = market(vec![daily_series("A", "2024-01-01", &[100.0; 5])]);
        let config = sim_config("2024-01-01", "2024-01-05", 1000.0);
        let mut strategy =
            FixedAllocation::new("split", weights(&[("A", 0.5), ("C", 0.5)]), Frequency::Never)
                .unwrap();

        let err = simulation::run(&config, &market, &mut strategy).unwrap_err();
        assert!(matches!(err, SipsimError::DataUnavailable { instrument, .. } if instrument == "C"));
    }
}

mod contributions {
    use super::*;

    #[test]
    fn monthly_contributions_count_as_invested() {
        let market = market(vec![daily_series("A", "2024-01-01", &[100.0; 91])]);
        let config = with_contribution(
            sim_config("2024-01-01", "2024-03-31", 1000.0),
            100.0,
            Frequency::Monthly,
        );
        let mut strategy =
            FixedAllocation::new("sip", weights(&[("A", 1.0)]), Frequency::Never).unwrap();

        let result = simulation::run(&config, &market, &mut strategy).unwrap();

        let dates: Vec<_> = result.transactions.entries().iter().map(|t| t.date).collect();
        assert_eq!(dates, vec![d("2024-01-01"), d("2024-02-01"), d("2024-03-01")]);
        // Starting on the 1st does not add a contribution to the seed date.
        assert_abs_diff_eq!(result.transactions.entries()[0].amount, 1000.0);
        assert_abs_diff_eq!(result.total_invested, 1200.0);
        assert_abs_diff_eq!(result.final_value, 1200.0, epsilon = 1e-9);
        assert_abs_diff_eq!(
            metric(&result, MetricName::Xirr).value().unwrap(),
            0.0,
            epsilon = 1e-6
        );
        assert_abs_diff_eq!(
            metric(&result, MetricName::MaxDrawdown).value().unwrap(),
            0.0,
            epsilon = 1e-12
        );
    }

    #[test]
    fn step_up_grows_contributions_each_year() {
        let prices = vec![100.0; 731];
        let market = market(vec![daily_series("A", "2022-01-01", &prices)]);
        let config = with_contribution(
            sim_config("2022-01-01", "2024-01-01", 1000.0),
            100.0,
            Frequency::Annual,
        );
        let mut strategy = FixedAllocation::new("sip", weights(&[("A", 1.0)]), Frequency::Never)
            .unwrap()
            .with_step_up(0.1);

        let result = simulation::run(&config, &market, &mut strategy).unwrap();

        let amounts: Vec<_> = result.transactions.entries().iter().map(|t| t.amount).collect();
        assert_eq!(amounts.len(), 3);
        assert_abs_diff_eq!(amounts[1], 100.0);
        assert_abs_diff_eq!(amounts[2], 110.0, epsilon = 1e-9);
        assert_abs_diff_eq!(result.total_invested, 1210.0, epsilon = 1e-9);
    }

    #[test]
    fn contribution_only_plan_starts_empty() {
        let market = market(vec![daily_series("A", "2024-01-01", &[100.0; 40])]);
        let config = with_contribution(
            sim_config("2024-01-01", "2024-02-09", 0.0),
            500.0,
            Frequency::Monthly,
        );
        let mut strategy =
            FixedAllocation::new("sip", weights(&[("A", 1.0)]), Frequency::Never).unwrap();

        let result = simulation::run(&config, &market, &mut strategy).unwrap();

        assert_eq!(result.transactions.len(), 1);
        assert_abs_diff_eq!(result.total_invested, 500.0);
        assert_abs_diff_eq!(result.final_holdings["A"], 5.0);
    }
}

mod rebalancing {
    use super::*;

    #[test]
    fn balanced_portfolio_produces_no_orders() {
        let market = market(vec![
            daily_series("A", "2024-01-01", &[100.0; 10]),
            daily_series("B", "2024-01-01", &[50.0; 10]),
        ]);
        let config = sim_config("2024-01-01", "2024-01-10", 1000.0);
        let mut strategy =
            FixedAllocation::new("daily", weights(&[("A", 0.5), ("B", 0.5)]), Frequency::Daily)
                .unwrap();

        let result = simulation::run(&config, &market, &mut strategy).unwrap();

        assert_eq!(result.transactions.len(), 2);
        assert_eq!(result.rebalance_count(RebalanceKind::Scheduled), 9);
        assert!(result.rebalances.iter().all(|e| e.order_count == 0));
    }

    #[test]
    fn scheduled_rebalance_restores_weights() {
        let market = market(vec![
            series(
                "A",
                &[("2024-01-30", 100.0), ("2024-01-31", 200.0), ("2024-02-01", 200.0)],
            ),
            series(
                "B",
                &[("2024-01-30", 100.0), ("2024-01-31", 100.0), ("2024-02-01", 100.0)],
            ),
        ]);
        let config = sim_config("2024-01-30", "2024-02-01", 1000.0);
        let mut strategy = FixedAllocation::new(
            "monthly",
            weights(&[("A", 0.5), ("B", 0.5)]),
            Frequency::Monthly,
        )
        .unwrap();

        let result = simulation::run(&config, &market, &mut strategy).unwrap();

        // 5 A at 200 + 5 B at 100 = 1500, rebalanced to 750 each on Feb 1.
        assert_eq!(result.rebalance_count(RebalanceKind::Scheduled), 1);
        assert_abs_diff_eq!(result.final_holdings["A"], 3.75);
        assert_abs_diff_eq!(result.final_holdings["B"], 7.5);
        assert_abs_diff_eq!(result.final_value, 1500.0, epsilon = 1e-9);
        assert_abs_diff_eq!(result.total_invested, 1000.0);

        let gain = &result.realized_gains[0];
        assert_eq!(gain.instrument, "A");
        assert_abs_diff_eq!(gain.units, 1.25);
        assert_abs_diff_eq!(gain.gain, 125.0, epsilon = 1e-9);
        assert_eq!(gain.holding_days, 2);
    }
}

mod triggers {
    use super::*;

    /// Reference alternates up/down every day; with a two-observation
    /// average the regime flips daily after the first date.
    fn flipping_market(days: usize) -> sipsim::domain::price::Market {
        let reference: Vec<f64> = (0..days)
            .map(|i| if i % 2 == 0 { 100.0 } else { 101.0 })
            .collect();
        market(vec![
            daily_series("VAL", "2024-01-01", &vec![100.0; days]),
            daily_series("MOM", "2024-01-01", &vec![100.0; days]),
            daily_series("REF", "2024-01-01", &reference),
        ])
    }

    fn trend_filter(mapping: RegimeMapping, cooldown_days: i64) -> TrendFilter {
        let params = TrendFilterParams {
            ma_window: 2,
            mapping,
            frequency: Frequency::Never,
            ..TrendFilterParams::new("VAL", "MOM", "REF")
        };
        let trigger = TriggerConfig {
            enabled: true,
            cooldown_days,
            threshold: 0.0,
        };
        TrendFilter::new("trend", params, trigger)
    }

    #[test]
    fn cooldown_spaces_triggers_by_exactly_c_days() {
        let market = flipping_market(12);
        let config = sim_config("2024-01-01", "2024-01-12", 1000.0);
        let mut strategy = trend_filter(RegimeMapping::Direct, 5);

        let result = simulation::run(&config, &market, &mut strategy).unwrap();

        let triggered: Vec<_> = result
            .rebalances
            .iter()
            .filter(|e| e.kind == RebalanceKind::Triggered)
            .map(|e| e.date)
            .collect();
        assert_eq!(
            triggered,
            vec![d("2024-01-02"), d("2024-01-07"), d("2024-01-12")]
        );
        assert_eq!(result.trigger_count, 3);
        assert_eq!(result.rebalance_count(RebalanceKind::Scheduled), 0);
    }

    #[test]
    fn direct_mapping_tilts_to_momentum_when_risk_on() {
        let market = flipping_market(12);
        let config = sim_config("2024-01-01", "2024-01-12", 1000.0);
        let mut strategy = trend_filter(RegimeMapping::Direct, 5);

        let result = simulation::run(&config, &market, &mut strategy).unwrap();

        // Last trigger (Jan 12) is risk-on: 70% momentum.
        assert_abs_diff_eq!(result.final_holdings["MOM"], 7.0);
        assert_abs_diff_eq!(result.final_holdings["VAL"], 3.0);
        assert!(!result.final_holdings.contains_key("REF"));
    }

    #[test]
    fn inverted_mapping_tilts_to_value_when_risk_on() {
        let market = flipping_market(12);
        let config = sim_config("2024-01-01", "2024-01-12", 1000.0);
        let mut strategy = trend_filter(RegimeMapping::Inverted, 5);

        let result = simulation::run(&config, &market, &mut strategy).unwrap();

        assert_abs_diff_eq!(result.final_holdings["MOM"], 3.0);
        assert_abs_diff_eq!(result.final_holdings["VAL"], 7.0);
    }

    #[test]
    fn disabled_trigger_never_fires() {
        let market = flipping_market(12);
        let config = sim_config("2024-01-01", "2024-01-12", 1000.0);
        let params = TrendFilterParams {
            ma_window: 2,
            frequency: Frequency::Never,
            ..TrendFilterParams::new("VAL", "MOM", "REF")
        };
        let mut strategy = TrendFilter::new("trend", params, TriggerConfig::default());

        let result = simulation::run(&config, &market, &mut strategy).unwrap();

        assert!(result.rebalances.is_empty());
        assert_eq!(result.trigger_count, 0);
    }
}

mod ledger_properties {
    use proptest::prelude::*;
    use sipsim::domain::error::SipsimError;
    use sipsim::domain::lot::LotBook;
    use chrono::{Days, NaiveDate};

    proptest! {
        #[test]
        fn holdings_never_go_negative(
            ops in prop::collection::vec((any::<bool>(), 1u32..500), 1..60)
        ) {
            let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
            let mut book = LotBook::new();
            // Expected holding in hundredths of a unit.
            let mut expected: i64 = 0;

            for (i, (is_buy, hundredths)) in ops.into_iter().enumerate() {
                let date = start + Days::new(i as u64);
                let units = hundredths as f64 / 100.0;
                if is_buy {
                    book.acquire("X", date, units, 10.0).unwrap();
                    expected += hundredths as i64;
                } else if (hundredths as i64) <= expected {
                    let consumed = book.consume("X", date, units).unwrap();
                    let taken: f64 = consumed.iter().map(|c| c.units).sum();
                    prop_assert!((taken - units).abs() < 1e-9);
                    prop_assert!(consumed.windows(2).all(|w| w[0].acquired <= w[1].acquired));
                    expected -= hundredths as i64;
                } else {
                    let err = book.consume("X", date, units).unwrap_err();
                    let is_insufficient = matches!(err, SipsimError::InsufficientUnits { .. });
                    prop_assert!(is_insufficient);
                }

                let held = book.held_units("X");
                prop_assert!(held >= -1e-9);
                prop_assert!((held - expected as f64 / 100.0).abs() < 1e-6);
            }
        }
    }
}
