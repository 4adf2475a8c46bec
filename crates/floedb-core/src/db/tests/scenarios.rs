use crate::{
    clock::FixedClock,
    db::{Db, GetOptions, KeyOrData, ScanOptions, TransactionOptions},
    error::{Error, TOO_MUCH_CONTENTION},
    schema::{FieldSchema, ModelSchema},
    store::{Store, StoreError, memory::MemoryStore},
    test_support::{CountingStore, FailingStore, TEST_EPOCH, fast_options, test_db},
    value::Value,
    vals,
};
use std::{
    cell::Cell,
    rc::Rc,
    sync::Arc,
    time::Duration,
};

use super::orders_model;

#[test]
fn create_then_read_applies_defaults() {
    let (db, store, _) = test_db();
    let model = orders_model(&db, &store);

    db.transact_with(fast_options(), |tx| {
        tx.create(&model, vals! { "id" => "a" })?;
        Ok(())
    })
    .expect("create should commit");

    let n = db
        .transact_with(fast_options(), |tx| {
            let item = tx
                .get(model.key(vals! { "id" => "a" })?, &GetOptions::default())?
                .expect("item should exist");
            assert_eq!(item.get_str("id")?.as_deref(), Some("a"));
            item.get_i64("n")
        })
        .expect("read should commit");

    assert_eq!(n, Some(5));
}

#[test]
fn optimistic_lock_conflict_retries_and_succeeds() {
    let (db, store, _) = test_db();
    let model = orders_model(&db, &store);

    db.transact_with(fast_options(), |tx| {
        tx.create(&model, vals! { "id" => "a", "n" => 1 })?;
        Ok(())
    })
    .unwrap();

    let attempts = Rc::new(Cell::new(0u32));
    let attempts_in_tx = Rc::clone(&attempts);

    db.transact_with(fast_options(), |tx| {
        attempts_in_tx.set(attempts_in_tx.get() + 1);

        let item = tx
            .get(model.key(vals! { "id" => "a" })?, &GetOptions::default())?
            .expect("item should exist");
        let _observed = item.get_i64("n")?;

        if attempts_in_tx.get() == 1 {
            // A concurrent writer lands between our read and commit.
            db.transact_with(fast_options(), |other| {
                let theirs = other
                    .get(model.key(vals! { "id" => "a" })?, &GetOptions::default())?
                    .expect("item should exist");
                theirs.set("n", 2)
            })?;
        }

        item.set("n", 3)?;
        Ok(())
    })
    .expect("conflicted transaction should retry and succeed");

    assert_eq!(attempts.get(), 2);

    let stored = store
        .raw_item("orders", &model.key(vals! { "id" => "a" }).unwrap().key_attrs())
        .expect("row should exist");
    assert_eq!(stored.get("n"), Some(&Value::Int(3)));
}

#[test]
fn unread_increments_merge_without_conditions() {
    let (db, store, _) = test_db();
    let model = orders_model(&db, &store);

    db.transact_with(fast_options(), |tx| {
        tx.create(&model, vals! { "id" => "c", "n" => 5 })?;
        Ok(())
    })
    .unwrap();

    // T1 loads first, T2 commits first; neither reads the counter, so
    // both increments land.
    db.transact_with(fast_options(), |tx| {
        let item = tx
            .get(model.key(vals! { "id" => "c" })?, &GetOptions::default())?
            .expect("item should exist");

        db.transact_with(fast_options(), |other| {
            let theirs = other
                .get(model.key(vals! { "id" => "c" })?, &GetOptions::default())?
                .expect("item should exist");
            theirs.increment_by("n", 7)
        })?;

        item.increment_by("n", 10)?;
        Ok(())
    })
    .expect("increment transaction should commit on the first attempt");

    let stored = store
        .raw_item("orders", &model.key(vals! { "id" => "c" }).unwrap().key_attrs())
        .expect("row should exist");
    assert_eq!(stored.get("n"), Some(&Value::Int(22)));
}

#[test]
fn ttl_expired_rows_read_as_absent() {
    let (db, store, _) = test_db();
    let model = db
        .model(
            ModelSchema::new("sessions")
                .key("id", FieldSchema::str())
                .field("n", FieldSchema::int().default_value(5))
                .field("ttl", FieldSchema::int().optional())
                .expire_epoch_field("ttl"),
        )
        .unwrap();
    store.create_table_for(model.spec());

    db.transact_with(fast_options(), |tx| {
        tx.create(&model, vals! { "id" => "e", "n" => 1, "ttl" => TEST_EPOCH - 1 })?;
        Ok(())
    })
    .unwrap();

    // Plain read: gone.
    db.transact_with(fast_options(), |tx| {
        let item = tx.get(model.key(vals! { "id" => "e" })?, &GetOptions::default())?;
        assert!(item.is_none());
        Ok(())
    })
    .unwrap();

    // create_if_missing: a fresh item with defaults, and the commit
    // overwrites the expired husk.
    db.transact_with(fast_options(), |tx| {
        let item = tx
            .get(
                KeyOrData::Data(model.data(vals! { "id" => "e" })?),
                &GetOptions {
                    create_if_missing: true,
                    ..Default::default()
                },
            )?
            .expect("create_if_missing always yields an item");
        assert!(item.is_new());
        assert_eq!(item.get_i64("n")?, Some(5));
        Ok(())
    })
    .expect("recreate should commit");

    let stored = store
        .raw_item("sessions", &model.key(vals! { "id" => "e" }).unwrap().key_attrs())
        .expect("row should exist");
    assert_eq!(stored.get("n"), Some(&Value::Int(5)));
}

#[test]
fn parallel_scan_shards_cover_every_row_once() {
    let (db, store, _) = test_db();
    let model = orders_model(&db, &store);

    db.transact_with(fast_options(), |tx| {
        for n in 0..8 {
            tx.create(&model, vals! { "id" => format!("row-{n}") })?;
        }
        Ok(())
    })
    .unwrap();

    let mut seen: Vec<String> = Vec::new();
    for shard in 0..4 {
        let mut ids = db
            .transact_with(fast_options(), |tx| {
                let mut scan = tx.scan(
                    &model,
                    ScanOptions {
                        shard_count: Some(4),
                        shard_index: Some(shard),
                        ..Default::default()
                    },
                )?;
                let items = scan.run(100)?;
                items
                    .iter()
                    .map(|item| Ok(item.get_str("id")?.expect("id is required")))
                    .collect::<Result<Vec<_>, Error>>()
            })
            .unwrap();
        seen.append(&mut ids);
    }

    seen.sort();
    let mut expected: Vec<String> = (0..8).map(|n| format!("row-{n}")).collect();
    expected.sort();
    assert_eq!(seen, expected);
}

#[test]
fn read_only_transactions_never_write() {
    let counting = Arc::new(CountingStore::new(MemoryStore::new()));
    let clock = Arc::new(FixedClock::new(TEST_EPOCH));
    let db = Db::with_clock(
        Arc::clone(&counting) as Arc<dyn Store>,
        Arc::clone(&clock) as Arc<dyn crate::clock::Clock>,
    );
    let model = orders_model(&db, counting.memory());

    db.transact_with(fast_options(), |tx| {
        tx.create(&model, vals! { "id" => "a" })?;
        Ok(())
    })
    .unwrap();
    assert_eq!(counting.write_calls(), 1);

    // A get-only closure commits as a no-op even in write mode.
    db.transact_with(fast_options(), |tx| {
        let item = tx.get(model.key(vals! { "id" => "a" })?, &GetOptions::default())?;
        assert!(item.is_some());
        Ok(())
    })
    .unwrap();
    assert_eq!(counting.write_calls(), 1);

    // A dirty item in read-only mode is rejected before any store
    // call.
    let err = db
        .transact_with(
            TransactionOptions {
                read_only: true,
                ..fast_options()
            },
            |tx| {
                tx.create(&model, vals! { "id" => "b" })?;
                Ok(())
            },
        )
        .expect_err("read-only write should fail");
    assert!(matches!(err, Error::WriteAttemptedInReadOnlyTx(_)));
    assert_eq!(counting.write_calls(), 1);
}

#[test]
fn retry_bound_is_retries_plus_one_with_contention_message() {
    let failing = Arc::new(FailingStore::new(MemoryStore::new(), || {
        StoreError::ConditionalCheckFailed {
            table: "orders".to_string(),
        }
    }));
    let clock = Arc::new(FixedClock::new(TEST_EPOCH));
    let db = Db::with_clock(
        Arc::clone(&failing) as Arc<dyn Store>,
        Arc::clone(&clock) as Arc<dyn crate::clock::Clock>,
    );
    let model = db
        .model(
            ModelSchema::new("orders")
                .key("id", FieldSchema::str())
                .field("n", FieldSchema::int().default_value(5)),
        )
        .unwrap();

    let runs = Rc::new(Cell::new(0u32));
    let runs_in_tx = Rc::clone(&runs);

    let err = db
        .transact_with(
            TransactionOptions {
                retries: 2,
                ..fast_options()
            },
            |tx| {
                runs_in_tx.set(runs_in_tx.get() + 1);
                tx.create(&model, vals! { "id" => "a" })?;
                Ok(())
            },
        )
        .expect_err("every attempt fails");

    assert_eq!(runs.get(), 3);
    assert_eq!(failing.write_attempts(), 3);
    assert_eq!(err.to_string(), TOO_MUCH_CONTENTION);
    match err {
        Error::TransactionFailed { all_errors, .. } => {
            assert!(matches!(all_errors[0], Error::ModelAlreadyExists { .. }));
        }
        other => panic!("expected TransactionFailed, got {other:?}"),
    }
}

#[test]
fn permanent_store_errors_are_not_retried() {
    let failing = Arc::new(FailingStore::new(MemoryStore::new(), || {
        StoreError::Validation {
            message: "broken expression".to_string(),
        }
    }));
    let clock = Arc::new(FixedClock::new(TEST_EPOCH));
    let db = Db::with_clock(
        Arc::clone(&failing) as Arc<dyn Store>,
        Arc::clone(&clock) as Arc<dyn crate::clock::Clock>,
    );
    let model = db
        .model(ModelSchema::new("orders").key("id", FieldSchema::str()))
        .unwrap();

    let runs = Rc::new(Cell::new(0u32));
    let runs_in_tx = Rc::clone(&runs);

    let err = db
        .transact_with(fast_options(), |tx| {
            runs_in_tx.set(runs_in_tx.get() + 1);
            tx.create(&model, vals! { "id" => "a" })?;
            Ok(())
        })
        .expect_err("permanent failure");

    assert_eq!(runs.get(), 1);
    assert!(matches!(err, Error::Store(StoreError::Validation { .. })));
}

#[test]
fn atomic_commit_leaves_no_partial_state() {
    let (db, store, _) = test_db();
    let model = orders_model(&db, &store);

    db.transact_with(fast_options(), |tx| {
        tx.create(&model, vals! { "id" => "existing" })?;
        Ok(())
    })
    .unwrap();

    // Two writes in one transaction; the second conflicts.
    let err = db
        .transact_with(
            TransactionOptions {
                retries: 0,
                ..fast_options()
            },
            |tx| {
                tx.create(&model, vals! { "id" => "fresh" })?;
                tx.create(&model, vals! { "id" => "existing" })?;
                Ok(())
            },
        )
        .expect_err("conflicting create should cancel the transaction");

    match err {
        Error::TransactionFailed { all_errors, .. } => {
            assert!(
                all_errors
                    .iter()
                    .any(|e| matches!(e, Error::ModelAlreadyExists { .. }))
            );
        }
        other => panic!("expected TransactionFailed, got {other:?}"),
    }

    // The non-conflicting write must not be visible.
    assert!(
        store
            .raw_item("orders", &model.key(vals! { "id" => "fresh" }).unwrap().key_attrs())
            .is_none()
    );
}

#[test]
fn update_conditions_on_original_values() {
    let (db, store, _) = test_db();
    let model = orders_model(&db, &store);

    db.transact_with(fast_options(), |tx| {
        tx.create(&model, vals! { "id" => "u", "n" => 1 })?;
        Ok(())
    })
    .unwrap();

    db.transact_with(fast_options(), |tx| {
        tx.update(
            &model,
            vals! { "id" => "u", "n" => 1 },
            vals! { "n" => 9 },
        )?;
        Ok(())
    })
    .expect("matching original should commit");

    let stored = store
        .raw_item("orders", &model.key(vals! { "id" => "u" }).unwrap().key_attrs())
        .unwrap();
    assert_eq!(stored.get("n"), Some(&Value::Int(9)));

    // Stale original: condition fails on every attempt.
    let err = db
        .transact_with(
            TransactionOptions {
                retries: 0,
                ..fast_options()
            },
            |tx| {
                tx.update(
                    &model,
                    vals! { "id" => "u", "n" => 1 },
                    vals! { "n" => 10 },
                )?;
                Ok(())
            },
        )
        .expect_err("stale original should fail");
    assert_eq!(err.to_string(), TOO_MUCH_CONTENTION);

    // Updating a key component is rejected outright.
    let err = db
        .transact_with(fast_options(), |tx| {
            tx.update(
                &model,
                vals! { "id" => "u", "n" => 9 },
                vals! { "id" => "v" },
            )?;
            Ok(())
        })
        .expect_err("key update should be rejected");
    assert!(matches!(err, Error::InvalidParameter { .. }));
}

#[test]
fn create_or_put_overwrites_when_original_matches() {
    let (db, store, _) = test_db();
    let model = orders_model(&db, &store);

    // Absent row: created.
    db.transact_with(fast_options(), |tx| {
        tx.create_or_put(
            &model,
            vals! { "id" => "cp" },
            vals! { "id" => "cp", "n" => 4 },
        )?;
        Ok(())
    })
    .unwrap();

    // Present row matching the original: overwritten.
    db.transact_with(fast_options(), |tx| {
        tx.create_or_put(
            &model,
            vals! { "id" => "cp", "n" => 4 },
            vals! { "id" => "cp", "n" => 6, "note" => "x" },
        )?;
        Ok(())
    })
    .unwrap();

    let stored = store
        .raw_item("orders", &model.key(vals! { "id" => "cp" }).unwrap().key_attrs())
        .unwrap();
    assert_eq!(stored.get("n"), Some(&Value::Int(6)));
    assert_eq!(stored.get("note"), Some(&Value::Str("x".into())));

    // Mismatched original: rejected.
    let err = db
        .transact_with(
            TransactionOptions {
                retries: 0,
                ..fast_options()
            },
            |tx| {
                tx.create_or_put(
                    &model,
                    vals! { "id" => "cp", "n" => 99 },
                    vals! { "id" => "cp", "n" => 7 },
                )?;
                Ok(())
            },
        )
        .expect_err("mismatched original should fail");
    assert_eq!(err.to_string(), TOO_MUCH_CONTENTION);
}

#[test]
fn create_or_put_treats_expired_rows_as_absent() {
    let (db, store, _) = test_db();
    let model = db
        .model(
            ModelSchema::new("sessions")
                .key("id", FieldSchema::str())
                .field("n", FieldSchema::int().default_value(5))
                .field("ttl", FieldSchema::int().optional())
                .expire_epoch_field("ttl"),
        )
        .unwrap();
    store.create_table_for(model.spec());

    // Expired husk whose attributes are still physically present.
    db.transact_with(fast_options(), |tx| {
        tx.create(&model, vals! { "id" => "x", "n" => 1, "ttl" => TEST_EPOCH - 1 })?;
        Ok(())
    })
    .unwrap();

    // The caller read the row as absent, so its original values need
    // not match the husk; the widened nonexistence branch must accept
    // the write.
    db.transact_with(
        TransactionOptions {
            retries: 0,
            ..fast_options()
        },
        |tx| {
            tx.create_or_put(
                &model,
                vals! { "id" => "x", "n" => 5 },
                vals! { "id" => "x", "n" => 7 },
            )?;
            Ok(())
        },
    )
    .expect("expired row must count as absent");

    let stored = store
        .raw_item("sessions", &model.key(vals! { "id" => "x" }).unwrap().key_attrs())
        .expect("row should exist");
    assert_eq!(stored.get("n"), Some(&Value::Int(7)));
    // The put replaced the whole item, so the stale TTL is gone.
    assert_eq!(stored.get("ttl"), None);
}

#[test]
fn tracking_violations_surface_usage_errors() {
    let (db, store, _) = test_db();
    let model = orders_model(&db, &store);

    db.transact_with(fast_options(), |tx| {
        tx.create(&model, vals! { "id" => "a" })?;
        Ok(())
    })
    .unwrap();

    // Same row read twice without the cache.
    let err = db
        .transact_with(fast_options(), |tx| {
            tx.get(model.key(vals! { "id" => "a" })?, &GetOptions::default())?;
            tx.get(model.key(vals! { "id" => "a" })?, &GetOptions::default())?;
            Ok(())
        })
        .expect_err("duplicate read should fail");
    assert!(matches!(err, Error::ModelTrackedTwice { .. }));

    // Same row deleted twice.
    let err = db
        .transact_with(fast_options(), |tx| {
            tx.delete(model.key(vals! { "id" => "a" })?)?;
            tx.delete(model.key(vals! { "id" => "a" })?)?;
            Ok(())
        })
        .expect_err("double delete should fail");
    assert!(matches!(err, Error::ModelDeletedTwice { .. }));
}

#[test]
fn deleting_a_read_item_conditions_on_its_baseline() {
    let (db, store, _) = test_db();
    let model = orders_model(&db, &store);

    db.transact_with(fast_options(), |tx| {
        tx.create(&model, vals! { "id" => "del", "n" => 1 })?;
        Ok(())
    })
    .unwrap();

    db.transact_with(fast_options(), |tx| {
        let item = tx
            .get(model.key(vals! { "id" => "del" })?, &GetOptions::default())?
            .expect("row exists");
        let _ = item.get_i64("n")?;
        tx.delete_item(&item)?;
        Ok(())
    })
    .expect("delete should commit");

    assert!(
        store
            .raw_item("orders", &model.key(vals! { "id" => "del" }).unwrap().key_attrs())
            .is_none()
    );
}

#[test]
fn model_cache_returns_tracked_items_and_rejects_misuse() {
    let (db, store, _) = test_db();
    let model = orders_model(&db, &store);

    db.transact_with(fast_options(), |tx| {
        tx.create(&model, vals! { "id" => "a", "n" => 1 })?;
        Ok(())
    })
    .unwrap();

    let cached = TransactionOptions {
        cache_models: true,
        ..fast_options()
    };

    db.transact_with(cached.clone(), |tx| {
        let first = tx
            .get(model.key(vals! { "id" => "a" })?, &GetOptions::default())?
            .unwrap();
        first.set("n", 2)?;

        // Second read returns the same tracked item, mutation intact.
        let second = tx
            .get(model.key(vals! { "id" => "a" })?, &GetOptions::default())?
            .unwrap();
        assert_eq!(second.get_i64("n")?, Some(2));
        Ok(())
    })
    .unwrap();

    // A cached entry that was created (not read) is unusable.
    let err = db
        .transact_with(cached, |tx| {
            tx.create(&model, vals! { "id" => "b" })?;
            tx.get(model.key(vals! { "id" => "b" })?, &GetOptions::default())?;
            Ok(())
        })
        .expect_err("cache hit on a created item should fail");
    assert!(matches!(err, Error::InvalidCachedModel { .. }));
}

#[test]
fn events_fire_once_in_registration_order() {
    let (db, store, _) = test_db();
    let model = orders_model(&db, &store);

    let log = Rc::new(std::cell::RefCell::new(Vec::new()));

    db.transact_with(fast_options(), |tx| {
        let first = Rc::clone(&log);
        tx.on_post_commit(move || first.borrow_mut().push("first"));
        let second = Rc::clone(&log);
        tx.on_post_commit(move || second.borrow_mut().push("second"));
        tx.create(&model, vals! { "id" => "evt" })?;
        Ok(())
    })
    .unwrap();
    assert_eq!(*log.borrow(), vec!["first", "second"]);

    let failures = Rc::new(Cell::new(0u32));
    let err = db
        .transact_with(
            TransactionOptions {
                read_only: true,
                ..fast_options()
            },
            |tx| {
                let counter = Rc::clone(&failures);
                tx.on_tx_failed(move |_| counter.set(counter.get() + 1));
                tx.create(&model, vals! { "id" => "evt2" })?;
                Ok(())
            },
        )
        .expect_err("read-only write fails");
    assert!(matches!(err, Error::WriteAttemptedInReadOnlyTx(_)));
    assert_eq!(failures.get(), 1);
}

#[test]
fn model_diffs_snapshot_before_and_after() {
    let (db, store, _) = test_db();
    let model = orders_model(&db, &store);

    db.transact_with(fast_options(), |tx| {
        tx.create(&model, vals! { "id" => "d", "n" => 1 })?;
        Ok(())
    })
    .unwrap();

    db.transact_with(fast_options(), |tx| {
        let item = tx
            .get(model.key(vals! { "id" => "d" })?, &GetOptions::default())?
            .unwrap();
        item.set("n", 2)?;

        let diffs = tx.model_diffs(None);
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].table, "orders");
        assert_eq!(diffs[0].before.get("n"), Some(&Value::Int(1)));
        assert_eq!(diffs[0].after.get("n"), Some(&Value::Int(2)));

        assert!(tx.model_diffs(Some(&|table: &str| table == "other")).is_empty());
        Ok(())
    })
    .unwrap();
}

#[test]
fn inconsistent_multi_get_drains_unprocessed_keys() {
    let (db, store, _) = test_db();
    let model = orders_model(&db, &store);

    db.transact_with(fast_options(), |tx| {
        tx.create(&model, vals! { "id" => "a", "n" => 1 })?;
        tx.create(&model, vals! { "id" => "b", "n" => 2 })?;
        Ok(())
    })
    .unwrap();

    store.inject_unprocessed_rounds(2);

    db.transact_with(fast_options(), |tx| {
        let items = tx.get_many(
            vec![
                KeyOrData::Key(model.key(vals! { "id" => "a" })?),
                KeyOrData::Key(model.key(vals! { "id" => "b" })?),
                KeyOrData::Key(model.key(vals! { "id" => "missing" })?),
            ],
            &GetOptions {
                inconsistent_read: true,
                ..Default::default()
            },
        )?;

        assert_eq!(items.len(), 3);
        assert_eq!(items[0].as_ref().unwrap().get_i64("n")?, Some(1));
        assert_eq!(items[1].as_ref().unwrap().get_i64("n")?, Some(2));
        assert!(items[2].is_none());
        Ok(())
    })
    .unwrap();
}

#[test]
fn consistent_multi_get_uses_one_snapshot() {
    let (db, store, _) = test_db();
    let model = orders_model(&db, &store);

    db.transact_with(fast_options(), |tx| {
        tx.create(&model, vals! { "id" => "a", "n" => 1 })?;
        tx.create(&model, vals! { "id" => "b", "n" => 2 })?;
        Ok(())
    })
    .unwrap();

    db.transact_with(fast_options(), |tx| {
        let items = tx.get_many(
            vec![
                KeyOrData::Key(model.key(vals! { "id" => "a" })?),
                KeyOrData::Key(model.key(vals! { "id" => "b" })?),
            ],
            &GetOptions::default(),
        )?;
        assert!(items.iter().all(Option::is_some));
        Ok(())
    })
    .unwrap();
}

#[test]
fn options_are_validated_before_running() {
    let (db, _, _) = test_db();

    let err = db
        .transact_with(
            TransactionOptions {
                initial_backoff: Duration::ZERO,
                ..Default::default()
            },
            |_tx| Ok(()),
        )
        .expect_err("zero backoff is invalid");
    assert!(matches!(err, Error::InvalidOptions(_)));

    let err = db
        .transact_with(
            TransactionOptions {
                max_backoff: Duration::from_millis(100),
                ..Default::default()
            },
            |_tx| Ok(()),
        )
        .expect_err("sub-200ms cap is invalid");
    assert!(matches!(err, Error::InvalidOptions(_)));
}

#[test]
fn read_miss_absence_is_verified_at_commit() {
    let (db, store, _) = test_db();
    let model = orders_model(&db, &store);

    // Miss, then an unrelated write; commit must condition-check the
    // miss and fail because the row appeared concurrently.
    let err = db
        .transact_with(
            TransactionOptions {
                retries: 0,
                ..fast_options()
            },
            |tx| {
                let miss = tx.get(model.key(vals! { "id" => "ghost" })?, &GetOptions::default())?;
                assert!(miss.is_none());

                db.transact_with(fast_options(), |other| {
                    other.create(&model, vals! { "id" => "ghost" })?;
                    Ok(())
                })?;

                tx.create(&model, vals! { "id" => "companion" })?;
                Ok(())
            },
        )
        .expect_err("appearing row should invalidate the read");

    match err {
        Error::TransactionFailed { all_errors, .. } => {
            assert!(
                all_errors
                    .iter()
                    .any(|e| matches!(e, Error::InvalidModelUpdate { .. }))
            );
        }
        other => panic!("expected TransactionFailed, got {other:?}"),
    }
}
