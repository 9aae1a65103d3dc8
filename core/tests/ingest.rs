mod common;

use common::{fixture, reward, utc, USER};
use reward_ledger_core::{
    error::LedgerError,
    fees::FeeCalculator,
    ingest::{IngestStatus, RewardRequest},
    store::NewReward,
    types::Account,
};
use rust_decimal_macros::dec;

const NOW: &str = "2024-03-15T06:00:00Z";

#[test]
fn reward_writes_event_and_five_ledger_rows() {
    let mut fx = fixture("ingest-five-rows", chrono_tz::UTC, NOW);

    let receipt = fx
        .ingestor
        .ingest(&reward(" x ", "10", "2024-03-15T05:00:00Z", Some("k-1")))
        .unwrap();
    assert_eq!(receipt.status, IngestStatus::Ok);

    let fees = receipt.fees.expect("fees on first write");
    assert_eq!(fees.price, dec!(1000.0000));
    assert_eq!(fees.notional.to_string(), "10000.0000");
    assert_eq!(fees.total.to_string(), "10069.0000");

    let event = fx.store.reward(receipt.id).unwrap().expect("event persisted");
    assert_eq!(event.symbol, "X");
    assert_eq!(event.units, dec!(10));
    assert_eq!(event.event_time, utc("2024-03-15T05:00:00Z"));
    assert_eq!(event.idempotency_key.as_deref(), Some("k-1"));

    let entries = fx.store.ledger_entries_for_reward(receipt.id).unwrap();
    let accounts: Vec<Account> = entries.iter().map(|e| e.account).collect();
    assert_eq!(accounts, Account::ALL.to_vec());

    let amounts: Vec<String> = entries
        .iter()
        .map(|e| e.amount.expect("every leg has an amount").to_string())
        .collect();
    assert_eq!(amounts, ["10000.0000", "10069.0000", "50.0000", "10.0000", "9.0000"]);

    let stock = &entries[0];
    assert_eq!(stock.symbol.as_deref(), Some("X"));
    assert_eq!(stock.units, Some(dec!(10)));
    assert_eq!(entries[1].meta["reason"], "purchase");
    assert!(entries[2..].iter().all(|e| e.symbol.is_none() && e.units.is_none()));
}

#[test]
fn fees_use_latest_stored_price() {
    let mut fx = fixture("ingest-latest-price", chrono_tz::UTC, NOW);
    let t = utc("2024-03-14T00:00:00Z");
    fx.store.append_price("ABC", dec!(900), t, t).unwrap();
    let later = utc("2024-03-15T00:00:00Z");
    fx.store.append_price("ABC", dec!(1234.5678), later, later).unwrap();

    let receipt = fx
        .ingestor
        .ingest(&reward("abc", "0.333333", "2024-03-15T05:00:00Z", None))
        .unwrap();
    let fees = receipt.fees.unwrap();
    assert_eq!(fees.price, dec!(1234.5678));
    assert_eq!(fees.notional, dec!(411.5222));
    assert_eq!(fees.total, dec!(414.3617));
}

#[test]
fn duplicate_key_returns_original_id_and_writes_nothing() {
    let mut fx = fixture("ingest-duplicate", chrono_tz::UTC, NOW);
    let req = reward("TCS", "3", "2024-03-15T05:00:00Z", Some("retry-me"));

    let first = fx.ingestor.ingest(&req).unwrap();
    for _ in 0..3 {
        let again = fx.ingestor.ingest(&req).unwrap();
        assert_eq!(again.status, IngestStatus::DuplicateIgnored);
        assert_eq!(again.id, first.id);
        assert!(again.fees.is_none());
    }

    assert_eq!(fx.store.reward_count(USER).unwrap(), 1);
    assert_eq!(fx.store.ledger_entry_count(USER).unwrap(), 5);
}

#[test]
fn duplicate_with_different_payload_still_ignored() {
    let mut fx = fixture("ingest-duplicate-payload", chrono_tz::UTC, NOW);
    let first = fx.ingestor.ingest(&reward("TCS", "3", NOW, Some("k"))).unwrap();
    let second = fx.ingestor.ingest(&reward("INFY", "99", NOW, Some("k"))).unwrap();
    assert_eq!(second.status, IngestStatus::DuplicateIgnored);
    assert_eq!(second.id, first.id);
    assert_eq!(fx.store.reward(first.id).unwrap().unwrap().symbol, "TCS");
}

#[test]
fn lost_race_on_key_is_a_conflict_with_no_partial_rows() {
    let mut fx = fixture("ingest-race", chrono_tz::UTC, NOW);
    let winner = fx.ingestor.ingest(&reward("TCS", "1", NOW, Some("race"))).unwrap();

    // Same key reaching the writer directly, as a concurrent request
    // that passed the guard before the winner committed would.
    let loser = NewReward {
        user_id:         USER,
        symbol:          "TCS".into(),
        event_time:      utc(NOW),
        idempotency_key: Some("race".into()),
    };
    let fees = FeeCalculator::default().compute(dec!(1000), dec!(1)).unwrap();
    let err = fx.store.insert_reward_with_ledger(&loser, &fees, utc(NOW)).unwrap_err();

    match err {
        LedgerError::Conflict { key, existing_id } => {
            assert_eq!(key, "race");
            assert_eq!(existing_id, Some(winner.id));
        }
        other => panic!("expected conflict, got {other:?}"),
    }
    assert_eq!(fx.store.reward_count(USER).unwrap(), 1);
    assert_eq!(fx.store.ledger_entry_count(USER).unwrap(), 5);
}

#[test]
fn rewards_without_key_are_never_deduplicated() {
    let mut fx = fixture("ingest-no-key", chrono_tz::UTC, NOW);
    let a = fx.ingestor.ingest(&reward("TCS", "1", NOW, None)).unwrap();
    let b = fx.ingestor.ingest(&reward("TCS", "1", NOW, Some("   "))).unwrap();
    let c = fx.ingestor.ingest(&reward("TCS", "1", NOW, Some(""))).unwrap();

    assert_ne!(a.id, b.id);
    assert_ne!(b.id, c.id);
    assert_eq!(fx.store.reward_count(USER).unwrap(), 3);
    assert_eq!(fx.store.ledger_entry_count(USER).unwrap(), 15);
    assert_eq!(fx.store.reward(b.id).unwrap().unwrap().idempotency_key, None);
}

#[test]
fn invalid_requests_are_rejected_before_any_write() {
    let mut fx = fixture("ingest-invalid", chrono_tz::UTC, NOW);

    let bad = [
        reward("TCS", "0", NOW, Some("a")),
        reward("TCS", "-5", NOW, Some("b")),
        reward("TCS", "lots", NOW, Some("c")),
        reward("   ", "1", NOW, Some("d")),
        reward("TCS", "1", "yesterday", Some("e")),
        RewardRequest { user_id: 0, ..reward("TCS", "1", NOW, Some("f")) },
        RewardRequest { user_id: 99, ..reward("TCS", "1", NOW, Some("g")) },
    ];
    for req in &bad {
        let err = fx.ingestor.ingest(req).unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)), "{req:?} gave {err:?}");
    }

    assert_eq!(fx.store.reward_count(USER).unwrap(), 0);
    assert_eq!(fx.store.ledger_entry_count(USER).unwrap(), 0);
    // A rejected key was never reserved.
    assert_eq!(fx.store.reward_id_for_key("a").unwrap(), None);
}

#[test]
fn oversized_units_are_rejected_not_panicked() {
    let mut fx = fixture("ingest-oversized", chrono_tz::UTC, NOW);

    let huge = [
        // Past Decimal's multiplication range.
        reward("TCS", "100000000000000000000000000", NOW, Some("huge-1")),
        // Fits the units column, but the cost does not fit the amount column.
        reward("TCS", "9000000000000", NOW, Some("huge-2")),
    ];
    for req in &huge {
        let err = fx.ingestor.ingest(req).unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)), "{} gave {err:?}", req.units);
    }

    assert_eq!(fx.store.reward_count(USER).unwrap(), 0);
    assert_eq!(fx.store.ledger_entry_count(USER).unwrap(), 0);

    // The ingestor stays usable afterwards.
    let ok = fx.ingestor.ingest(&reward("TCS", "1", NOW, Some("huge-1"))).unwrap();
    assert_eq!(ok.status, IngestStatus::Ok);
}

#[test]
fn missing_timestamp_defaults_to_now() {
    let mut fx = fixture("ingest-default-time", chrono_tz::Asia::Kolkata, NOW);
    let req = RewardRequest { timestamp: None, ..reward("TCS", "2", NOW, None) };
    let receipt = fx.ingestor.ingest(&req).unwrap();
    let event = fx.store.reward(receipt.id).unwrap().unwrap();
    assert_eq!(event.event_time, utc(NOW));
    assert_eq!(event.created_at, utc(NOW));
}

#[test]
fn receipt_serializes_for_the_request_layer() {
    let mut fx = fixture("ingest-json", chrono_tz::UTC, NOW);
    let receipt = fx.ingestor.ingest(&reward("X", "10", NOW, Some("json"))).unwrap();
    let json = serde_json::to_value(&receipt).unwrap();
    assert_eq!(json["status"], "ok");
    assert_eq!(json["feePercentages"]["brokeragePct"], "0.005");
    assert_eq!(json["fees"]["gst"], "9.0000");

    let dup = fx.ingestor.ingest(&reward("X", "10", NOW, Some("json"))).unwrap();
    let json = serde_json::to_value(&dup).unwrap();
    assert_eq!(json["status"], "duplicate_ignored");
    assert!(json.get("fees").is_none());
}
