use chrono::NaiveDate;
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tenancy_settlement::batch::{self, BillingJob};
use tenancy_settlement::billing::{self, consumption};
use tenancy_settlement::catalog::{MeterCatalog, MeterDefinition, MeterKind, PriceSchedule};
use tenancy_settlement::completeness;
use tenancy_settlement::deposit::{
    self, Decision, DepositPolicy, LateFeeStatus, MoveOutRecord, Obligation, ObligationKind,
    SettlementConfig, SettlementRequest,
};
use tenancy_settlement::error::Error;
use tenancy_settlement::money::{format_amount, settle_amount};
use tenancy_settlement::orchestrator::{BilledPeriod, SettlementOrchestrator, Tenancy};
use tenancy_settlement::period::Period;
use tenancy_settlement::reading::{MeterReading, ReadingPair};
use tenancy_settlement::storage::{FileStorage, MemoryRepository, SnapshotStore};
use tempfile::TempDir;

fn p(s: &str) -> Period {
    Period::parse(s).unwrap()
}

fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn allow() -> DepositPolicy {
    DepositPolicy {
        allow_debt_offset: true,
    }
}

fn forbid() -> DepositPolicy {
    DepositPolicy {
        allow_debt_offset: false,
    }
}

fn rate_25() -> SettlementConfig {
    SettlementConfig::with_daily_late_rate(dec!(25))
}

fn building_catalog() -> MeterCatalog {
    MeterCatalog::new(
        "addr-1",
        vec![
            MeterDefinition::individual("cw", "Cold water", MeterKind::ColdWater, "m3", dec!(1.32)),
            MeterDefinition::individual("hw", "Hot water", MeterKind::HotWater, "m3", dec!(4.10)),
            MeterDefinition::individual("el", "Electricity", MeterKind::Electricity, "kWh", dec!(0.21))
                .optional(),
            MeterDefinition::shared("heat", "Heating", MeterKind::Heating, "Gcal", dec!(1200)),
        ],
        PriceSchedule::default()
            .with_fixed("garbage", dec!(4.50))
            .with_fixed("maintenance", dec!(15)),
    )
}

fn seeded_repo() -> MemoryRepository {
    let mut repo = MemoryRepository::new();
    repo.insert_catalog(building_catalog());
    for (meter, jan, feb) in [("cw", dec!(45), dec!(49)), ("hw", dec!(10), dec!(12))] {
        repo.submit_reading(MeterReading::approved(meter, "apt-1", p("2024-01"), jan))
            .unwrap();
        repo.submit_reading(MeterReading::pending(meter, "apt-1", p("2024-02"), feb))
            .unwrap();
    }
    repo.set_policy("t-1", allow());
    repo.insert_tenancy(Tenancy {
        id: "t-1".to_string(),
        address_id: "addr-1".to_string(),
        apartment_id: "apt-1".to_string(),
        deposit: dec!(500),
        apartment_area: dec!(60),
        total_building_area: Some(dec!(2400)),
        billed_periods: vec![BilledPeriod::new(p("2024-02"), Decimal::ZERO)],
        late_fee_status: LateFeeStatus::Unresolved,
    });
    repo
}

/// Readings land, get approved, and only then does the settlement produce a number.
#[test]
fn test_readings_to_refund_end_to_end() {
    let mut repo = seeded_repo();
    let today = date("2024-03-05");

    {
        let orch = SettlementOrchestrator::new(&repo, rate_25());
        let t = repo.get_tenancy("t-1").unwrap();
        let gate = orch.check(&t.address_id, &t.apartment_id, p("2024-02")).unwrap();
        assert_eq!(gate.pending, vec!["Cold water", "Hot water"]);
        assert!(!gate.complete);

        let blocked = orch.settle(t, today).unwrap();
        assert_eq!(blocked.decision, Decision::Blocked);
        assert_eq!(blocked.refundable_amount, None);
    }

    repo.approve_reading("cw", "apt-1", p("2024-02")).unwrap();
    repo.approve_reading("hw", "apt-1", p("2024-02")).unwrap();
    repo.add_obligation(
        "t-1",
        Obligation::confirmed("clean", ObligationKind::Cleaning, dec!(35)),
    );

    let orch = SettlementOrchestrator::new(&repo, rate_25());
    let t = repo.get_tenancy("t-1").unwrap();
    let calc = orch
        .bill(&t.address_id, &t.apartment_id, p("2024-02"), t.apartment_area, t.total_building_area)
        .unwrap();
    // cw 4 * 1.32 + hw 2 * 4.10 + heat 60/2400 * 1200 + fixed 19.50
    assert_eq!(calc.total_amount, dec!(62.98));

    let result = orch.settle(t, today).unwrap();
    assert_eq!(result.total_debt, dec!(62.98));
    assert_eq!(result.confirmed_charges, dec!(35));
    assert_eq!(result.refundable_amount, Some(dec!(402.02)));
    assert_eq!(result.decision, Decision::Refund);
    assert!(result.blocking_reasons.is_empty());
}

#[test]
fn test_snapshot_roundtrip_through_file_storage() {
    let temp_dir = TempDir::new().unwrap();
    let mut storage = FileStorage::with_path(temp_dir.path().join("snapshot.json"));
    let repo = seeded_repo();
    storage.persist_snapshot(&repo).unwrap();

    let mut loaded = storage.load_or_default().unwrap();
    assert_eq!(loaded, repo);

    loaded.approve_reading("cw", "apt-1", p("2024-02")).unwrap();
    storage.persist_snapshot(&loaded).unwrap();
    let reloaded = storage.load_snapshot().unwrap().unwrap();
    assert!(reloaded
        .readings
        .iter()
        .any(|r| r.meter_id == "cw" && r.period == p("2024-02") && r.is_approved()));
}

#[test]
fn test_scenario_full_refund() {
    let r = deposit::settle(&SettlementRequest::new(dec!(500)), &allow(), &rate_25(), date("2024-03-01"))
        .unwrap();
    assert_eq!(r.refundable_amount, Some(dec!(500.00)));
    assert_eq!(r.decision, Decision::Refund);
}

#[test]
fn test_scenario_debt_and_charges() {
    let mut req = SettlementRequest::new(dec!(300));
    req.utility_debt = dec!(120);
    req.obligations = vec![Obligation::confirmed("dmg", ObligationKind::Damage, dec!(50))];
    let r = deposit::settle(&req, &allow(), &rate_25(), date("2024-03-01")).unwrap();
    assert_eq!(r.refundable_amount, Some(dec!(130.00)));
    assert_eq!(r.decision, Decision::Refund);
}

#[test]
fn test_scenario_shortfall_invoice() {
    let mut req = SettlementRequest::new(dec!(200));
    req.obligations = vec![Obligation::confirmed("rent", ObligationKind::UnpaidRent, dec!(350))];
    let r = deposit::settle(&req, &allow(), &rate_25(), date("2024-03-01")).unwrap();
    assert_eq!(r.refundable_amount, Some(dec!(-150.00)));
    assert_eq!(r.decision, Decision::Invoice);
    assert_eq!(r.additional_due, dec!(150.00));
}

#[test]
fn test_scenario_policy_forbids_offset() {
    let mut req = SettlementRequest::new(dec!(300));
    req.utility_debt = dec!(50);
    let r = deposit::settle(&req, &forbid(), &rate_25(), date("2024-03-01")).unwrap();
    assert_eq!(r.decision, Decision::Blocked);
    assert!(r
        .reason_messages()
        .iter()
        .any(|m| m.contains("policy forbids debt offset")));
}

#[test]
fn test_scenario_meter_line() {
    let catalog = building_catalog();
    let pair = ReadingPair::new(
        MeterReading::approved("cw", "apt-1", p("2024-02"), dec!(49)),
        Some(dec!(45)),
    );
    let calc = billing::calculate(&catalog, "apt-1", p("2024-02"), &[pair], dec!(60), Some(dec!(2400)))
        .unwrap();
    let line = calc.line("cw").unwrap();
    assert_eq!(line.consumption, dec!(4));
    assert_eq!(line.total, dec!(5.28));
}

#[test]
fn test_scenario_late_fee() {
    let move_out = MoveOutRecord {
        notice_date: date("2023-12-01"),
        planned_date: Some(date("2024-01-01")),
        actual_date: Some(date("2024-01-06")),
    };
    let (days, fee) = deposit::late_fee(Some(&move_out), date("2024-03-01"), &rate_25()).unwrap();
    assert_eq!(days, 5);
    assert_eq!(fee, dec!(125.00));
}

#[test]
fn test_late_rate_must_be_configured() {
    let mut req = SettlementRequest::new(dec!(300));
    req.move_out = Some(MoveOutRecord {
        notice_date: date("2023-12-01"),
        planned_date: Some(date("2024-01-01")),
        actual_date: None,
    });
    assert_eq!(
        deposit::settle(&req, &allow(), &SettlementConfig::default(), date("2024-01-02")),
        Err(Error::MissingConfig("daily_late_rate"))
    );
}

#[test]
fn test_batch_matches_sequential() {
    let mut repo = seeded_repo();
    repo.approve_reading("cw", "apt-1", p("2024-02")).unwrap();
    repo.approve_reading("hw", "apt-1", p("2024-02")).unwrap();
    let t = repo.get_tenancy("t-1").unwrap().clone();
    let orch = SettlementOrchestrator::new(&repo, rate_25());

    let jobs: Vec<BillingJob> = (0..12)
        .map(|i| BillingJob::for_tenancy(&t, if i % 2 == 0 { p("2024-01") } else { p("2024-02") }))
        .collect();
    let parallel = batch::bill_all(&orch, &jobs, 4);
    for (job, got) in jobs.iter().zip(parallel) {
        let want = orch
            .bill(&job.address_id, &job.apartment_id, job.period, job.apartment_area, job.total_building_area)
            .unwrap();
        let got = got.unwrap();
        assert_eq!(got, want);
        assert_eq!(got.fingerprint().unwrap(), want.fingerprint().unwrap());
    }

    let tenancies = vec![t.clone(), t];
    let settled = batch::settle_all(&orch, &tenancies, date("2024-03-01"), 2);
    assert_eq!(settled.len(), 2);
    assert_eq!(settled[0], settled[1]);
}

fn cents(max: i64) -> impl Strategy<Value = Decimal> {
    (0..max).prop_map(|c| Decimal::new(c, 2))
}

proptest! {
    #[test]
    fn prop_consumption_never_negative(current in cents(1_000_000), previous in cents(1_000_000)) {
        let c = consumption(current, previous).unwrap();
        prop_assert!(c >= Decimal::ZERO);
        prop_assert_eq!(c, (current - previous).max(Decimal::ZERO));
    }

    #[test]
    fn prop_total_is_exact_sum(
        cw in cents(100_000),
        cw_prev in cents(100_000),
        hw in cents(100_000),
        area in 1i64..200,
        building in prop::option::of(0i64..10_000),
    ) {
        let readings = vec![
            ReadingPair::new(MeterReading::approved("cw", "apt-1", p("2024-02"), cw), Some(cw_prev)),
            ReadingPair::new(MeterReading::approved("hw", "apt-1", p("2024-02"), hw), None),
        ];
        let calc = billing::calculate(
            &building_catalog(),
            "apt-1",
            p("2024-02"),
            &readings,
            Decimal::from(area),
            building.map(Decimal::from),
        ).unwrap();
        let lines: Decimal = calc.lines.iter().map(|l| l.total).sum();
        prop_assert_eq!(calc.variable_charges, lines);
        prop_assert_eq!(calc.total_amount, calc.fixed_charges + lines);
        prop_assert!(calc.lines.iter().all(|l| l.consumption >= Decimal::ZERO));
    }

    #[test]
    fn prop_gate_complete_iff_nothing_unresolved(cw in 0u8..4, hw in 0u8..4) {
        let mut readings = Vec::new();
        for (meter, pick) in [("cw", cw), ("hw", hw)] {
            let mut r = MeterReading::pending(meter, "apt-1", p("2024-02"), dec!(1));
            match pick {
                0 => continue,
                1 => {}
                2 => r.approve().unwrap(),
                _ => r.reject().unwrap(),
            }
            readings.push(r);
        }
        let report = completeness::check(&building_catalog(), &readings);
        prop_assert_eq!(report.complete, report.missing.is_empty() && report.pending.is_empty());
        prop_assert_eq!(report.complete, cw == 2 && hw == 2);
    }

    #[test]
    fn prop_settle_is_idempotent_and_policy_gated(
        deposit in cents(500_000),
        debt in cents(500_000),
        charge in cents(100_000),
        allow_offset in any::<bool>(),
        unconfirmed in cents(1_000),
    ) {
        let mut req = SettlementRequest::new(deposit);
        req.utility_debt = debt;
        req.obligations = vec![
            Obligation::confirmed("clean", ObligationKind::Cleaning, charge),
            Obligation::unconfirmed("dmg", ObligationKind::Damage, unconfirmed),
        ];
        let policy = DepositPolicy { allow_debt_offset: allow_offset };
        let a = deposit::settle(&req, &policy, &rate_25(), date("2024-03-01")).unwrap();
        let b = deposit::settle(&req, &policy, &rate_25(), date("2024-03-01")).unwrap();
        prop_assert_eq!(&a, &b);
        prop_assert_eq!(a.fingerprint().unwrap(), b.fingerprint().unwrap());
        if !allow_offset && a.total_debt > Decimal::ZERO {
            prop_assert_ne!(a.decision, Decision::Refund);
        }
    }

    #[test]
    fn prop_epsilon_reports_zero(micro in -4_999i64..5_000) {
        let x = Decimal::new(micro, 6);
        prop_assert_eq!(settle_amount(x), Decimal::ZERO);
        prop_assert_eq!(settle_amount(x).to_string(), "0");
        prop_assert_eq!(format_amount(x), "0.00");
    }

    #[test]
    fn prop_late_days_monotonic(offset in 0i64..400, step in 0i64..30) {
        let move_out = MoveOutRecord {
            notice_date: date("2023-11-01"),
            planned_date: Some(date("2024-01-01")),
            actual_date: None,
        };
        let start = date("2023-12-01") + chrono::Duration::days(offset);
        let later = start + chrono::Duration::days(step);
        prop_assert!(move_out.late_days(later) >= move_out.late_days(start));
    }
}
