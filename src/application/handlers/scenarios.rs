//! End-to-end handler scenarios over in-memory infrastructure.
//!
//! These drive the dispatcher the way a station would, with a fixed clock,
//! and check the transaction engine's observable state.

use crate::application::normalizer::{
    self, message, IdTagStatus, OcppRequest, OcppResponse, TransactionData,
};
use crate::application::ports::Storage as _;
use crate::domain::{ConnectorStatus, DomainError, InactivityStatus, RegistrationStatus, Tag};
use crate::support::clock::Clock;

use super::testkit::{at, t0, TestHarness, STATION, TAG, TENANT};

// ── Boot ───────────────────────────────────────────────────────

#[tokio::test]
async fn boot_accepts_new_station_with_token() {
    let harness = TestHarness::new();
    match harness.boot().await {
        OcppResponse::BootNotification {
            status,
            current_time,
            interval_secs,
        } => {
            assert_eq!(status, RegistrationStatus::Accepted);
            assert_eq!(current_time, t0());
            assert_eq!(interval_secs, 300);
        }
        other => panic!("unexpected: {other:?}"),
    }

    let station = harness.station().await;
    assert_eq!(station.vendor, "Schneider Electric");
    assert_eq!(station.site_area_id.as_deref(), Some("sa-1"));
    assert!(station.template_id.is_some());
    assert_eq!(station.registration_status, RegistrationStatus::Accepted);
    assert_eq!(harness.storage.boot_record_count(TENANT), 1);
}

#[tokio::test]
async fn boot_of_unknown_station_without_token_is_rejected() {
    let harness = TestHarness::new();
    let header = harness.header().with_token(None);
    let response = harness
        .handler
        .handle(&header, harness.boot_request())
        .await
        .unwrap();
    match response {
        OcppResponse::BootNotification {
            status,
            interval_secs,
            ..
        } => {
            assert_eq!(status, RegistrationStatus::Rejected);
            assert_eq!(interval_secs, 30);
        }
        other => panic!("unexpected: {other:?}"),
    }
    assert!(harness
        .storage
        .get_station(TENANT, STATION)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn boot_twice_is_idempotent_except_reboot_facts() {
    let harness = TestHarness::new();
    harness.boot().await;
    let first = harness.station().await;

    harness.clock.advance(chrono::Duration::seconds(3600));
    match harness.boot().await {
        OcppResponse::BootNotification { status, current_time, .. } => {
            assert_eq!(status, RegistrationStatus::Accepted);
            assert_eq!(current_time, at(3600));
        }
        other => panic!("unexpected: {other:?}"),
    }

    let second = harness.station().await;
    assert_eq!(second.vendor, first.vendor);
    assert_eq!(second.serial_number, first.serial_number);
    assert_eq!(second.template_id, first.template_id);
    assert_eq!(second.last_reboot, at(3600));
    assert_eq!(second.last_seen, at(3600));
}

// Seed scenario: existing station has serial X, new boot reports Y
#[tokio::test]
async fn boot_with_mismatched_serial_is_rejected_without_mutation() {
    let harness = TestHarness::new();
    harness.boot().await;
    let before = harness.station().await;

    harness.clock.advance(chrono::Duration::seconds(60));
    let mut boot = harness.boot_request();
    if let OcppRequest::BootNotification(ref mut payload) = boot {
        payload.charge_point_serial_number = Some("SN-999".into());
    }
    match harness.send(boot).await.unwrap() {
        OcppResponse::BootNotification { status, .. } => {
            assert_eq!(status, RegistrationStatus::Rejected)
        }
        other => panic!("unexpected: {other:?}"),
    }

    let after = harness.station().await;
    assert_eq!(after.serial_number.as_deref(), Some("SN-100"));
    assert_eq!(after.last_reboot, before.last_reboot);
}

// ── Authorize ──────────────────────────────────────────────────

#[tokio::test]
async fn tag_length_boundaries() {
    let harness = TestHarness::new();
    harness.boot().await;

    // Exactly 20 characters: accepted
    let twenty = "T2345678901234567890";
    assert_eq!(twenty.len(), 20);
    harness.storage.add_tag(Tag {
        id: twenty.into(),
        tenant_id: TENANT.into(),
        user_id: Some(super::testkit::USER.into()),
        active: true,
        expiry_date: None,
        description: None,
    });
    match harness
        .send(OcppRequest::Authorize(message::Authorize {
            id_tag: twenty.into(),
        }))
        .await
        .unwrap()
    {
        OcppResponse::Authorize { status } => assert_eq!(status, IdTagStatus::Accepted),
        other => panic!("unexpected: {other:?}"),
    }

    // 21 characters: invalid without lookup
    match harness
        .send(OcppRequest::Authorize(message::Authorize {
            id_tag: "T23456789012345678901".into(),
        }))
        .await
        .unwrap()
    {
        OcppResponse::Authorize { status } => assert_eq!(status, IdTagStatus::Invalid),
        other => panic!("unexpected: {other:?}"),
    }

    // Empty: invalid
    match harness
        .send(OcppRequest::Authorize(message::Authorize {
            id_tag: "  ".into(),
        }))
        .await
        .unwrap()
    {
        OcppResponse::Authorize { status } => assert_eq!(status, IdTagStatus::Invalid),
        other => panic!("unexpected: {other:?}"),
    }
}

// Seed scenario: a 23-character tag fails authorize and start alike
#[tokio::test]
async fn too_long_tag_rejects_authorize_and_start() {
    let harness = TestHarness::new();
    harness.boot().await;
    harness
        .notify_status(1, ConnectorStatus::Preparing, t0())
        .await;

    let long_tag = "ABCDEFGHIJKLMNOPQRSTUVW";
    assert_eq!(long_tag.len(), 23);

    match harness
        .send(OcppRequest::Authorize(message::Authorize {
            id_tag: long_tag.into(),
        }))
        .await
        .unwrap()
    {
        OcppResponse::Authorize { status } => assert_eq!(status, IdTagStatus::Invalid),
        other => panic!("unexpected: {other:?}"),
    }

    match harness
        .send(OcppRequest::StartTransaction(message::StartTransaction {
            connector_id: 1,
            id_tag: long_tag.into(),
            meter_start: 0.0,
            timestamp: t0(),
            reservation_id: None,
        }))
        .await
        .unwrap()
    {
        OcppResponse::StartTransaction {
            transaction_id,
            status,
        } => {
            assert_eq!(transaction_id, 0);
            assert_eq!(status, IdTagStatus::Invalid);
        }
        other => panic!("unexpected: {other:?}"),
    }
}

// A valid, active tag whose site-area assignment does not cover this
// station fails authorize and start alike
#[tokio::test]
async fn site_policy_rejects_authorize_and_start() {
    let harness = TestHarness::new();
    harness.boot().await;
    harness
        .notify_status(1, ConnectorStatus::Preparing, t0())
        .await;
    harness.site_authorization.deny(TAG);

    match harness
        .send(OcppRequest::Authorize(message::Authorize {
            id_tag: TAG.into(),
        }))
        .await
        .unwrap()
    {
        OcppResponse::Authorize { status } => assert_eq!(status, IdTagStatus::Invalid),
        other => panic!("unexpected: {other:?}"),
    }

    match harness
        .send(OcppRequest::StartTransaction(message::StartTransaction {
            connector_id: 1,
            id_tag: TAG.into(),
            meter_start: 0.0,
            timestamp: t0(),
            reservation_id: None,
        }))
        .await
        .unwrap()
    {
        OcppResponse::StartTransaction {
            transaction_id,
            status,
        } => {
            assert_eq!(transaction_id, 0);
            assert_eq!(status, IdTagStatus::Invalid);
        }
        other => panic!("unexpected: {other:?}"),
    }
    assert!(harness
        .storage
        .get_active_transaction(TENANT, STATION, 1)
        .await
        .unwrap()
        .is_none());
}

// Site policy gates starting only; a session started before the assignment
// changed can still be stopped with its tag
#[tokio::test]
async fn site_policy_does_not_block_stop() {
    let harness = TestHarness::new();
    harness.boot().await;
    let tx_id = harness.start(1, TAG, 0.0).await;
    harness.clock.advance(chrono::Duration::seconds(60));
    harness.energy_sample(1, tx_id, 400.0).await;

    harness.site_authorization.deny(TAG);
    match harness
        .send(harness.stop_request(tx_id, Some(TAG), 400.0))
        .await
        .unwrap()
    {
        OcppResponse::StopTransaction { status } => assert_eq!(status, IdTagStatus::Accepted),
        other => panic!("unexpected: {other:?}"),
    }
    assert!(!harness.transaction(tx_id).await.is_active());
}

// ── Transaction lifecycle ──────────────────────────────────────

// Seed scenario 1: 14 intervals of 60 s, 12 with energy, 2 idle
#[tokio::test]
async fn happy_path_fourteen_intervals() {
    let harness = TestHarness::new();
    harness.boot().await;
    harness
        .notify_status(1, ConnectorStatus::Preparing, t0())
        .await;

    let tx_id = harness.start(1, TAG, 0.0).await;
    assert!(tx_id > 0);

    let increments: [f64; 14] = [
        100.0, 250.0, 80.0, 300.0, 0.0, 150.0, 200.0, 120.0, 0.0, 90.0, 310.0, 60.0, 170.0, 140.0,
    ];
    let total: f64 = increments.iter().sum();

    let mut cumulated = 0.0;
    for increment in increments {
        harness.clock.advance(chrono::Duration::seconds(60));
        cumulated += increment;
        harness.energy_sample(1, tx_id, cumulated).await;
    }
    assert_eq!(harness.clock.now(), at(14 * 60));

    match harness
        .send(harness.stop_request(tx_id, Some(TAG), total))
        .await
        .unwrap()
    {
        OcppResponse::StopTransaction { status } => assert_eq!(status, IdTagStatus::Accepted),
        other => panic!("unexpected: {other:?}"),
    }

    let transaction = harness.transaction(tx_id).await;
    let stop = transaction.stop.as_ref().expect("stop block written");
    assert_eq!(stop.meter_stop, total);
    assert_eq!(stop.total_consumption_wh, total);
    assert_eq!(stop.total_inactivity_secs, 120);
    assert_eq!(stop.total_duration_secs, 840);
    assert_eq!(stop.inactivity_status, InactivityStatus::Info);
    // 14 periodic samples plus the synthesized Transaction.End reading
    assert_eq!(transaction.number_of_meter_values, 15);

    // price = pricePerKWh * totalKWh = 0.50 * 1.97
    let expected_price: rust_decimal::Decimal = "0.985".parse().unwrap();
    assert_eq!(stop.price.unwrap(), expected_price);
    assert_eq!(stop.price_unit.as_deref(), Some("EUR"));

    // Sum of the consumption rows equals the stop total
    let rows = harness.storage.list_consumptions(TENANT, tx_id).await.unwrap();
    let row_sum: f64 = rows.iter().map(|c| c.consumption_wh).sum();
    assert_eq!(row_sum, total);

    // Connector freed
    let station = harness.station().await;
    assert_eq!(station.connector(1).unwrap().current_transaction_id, 0);
}

// Seed scenario 2: a Sample.Clock row is persisted but derives nothing
#[tokio::test]
async fn clock_context_sample_persisted_but_not_consumed() {
    let harness = TestHarness::new();
    harness.boot().await;
    let tx_id = harness.start(1, TAG, 0.0).await;

    harness.clock.advance(chrono::Duration::seconds(60));
    harness.energy_sample(1, tx_id, 500.0).await;
    let rows_before = harness
        .storage
        .list_consumptions(TENANT, tx_id)
        .await
        .unwrap()
        .len();
    let raw_before = harness.storage.meter_value_count(TENANT, STATION);

    // Clock sample at t+30 repeating the cumulative, then periodic at t+60
    let payload = serde_json::json!({
        "connectorId": 1,
        "transactionId": tx_id,
        "meterValue": [
            {
                "timestamp": at(90).to_rfc3339(),
                "sampledValue": [{"value": "500", "context": "Sample.Clock"}]
            },
            {
                "timestamp": at(120).to_rfc3339(),
                "sampledValue": [{"value": "800"}]
            }
        ]
    });
    let request = normalizer::decode_json("MeterValues", &payload).unwrap();
    harness.send(request).await.unwrap();

    // Both rows persisted raw, one consumption derived spanning [60, 120]
    assert_eq!(harness.storage.meter_value_count(TENANT, STATION), raw_before + 2);
    let rows = harness.storage.list_consumptions(TENANT, tx_id).await.unwrap();
    assert_eq!(rows.len(), rows_before + 1);
    let last = rows.last().unwrap();
    assert_eq!(last.started_at, at(60));
    assert_eq!(last.ended_at, at(120));
    assert_eq!(last.consumption_wh, 300.0);
}

#[tokio::test]
async fn stop_with_transaction_id_zero_is_accepted_without_effects() {
    let harness = TestHarness::new();
    harness.boot().await;

    match harness.send(harness.stop_request(0, None, 0.0)).await.unwrap() {
        OcppResponse::StopTransaction { status } => assert_eq!(status, IdTagStatus::Accepted),
        other => panic!("unexpected: {other:?}"),
    }
}

#[tokio::test]
async fn second_stop_is_rejected_without_mutation() {
    let harness = TestHarness::new();
    harness.boot().await;
    let tx_id = harness.start(1, TAG, 0.0).await;
    harness.clock.advance(chrono::Duration::seconds(60));
    harness.energy_sample(1, tx_id, 400.0).await;

    harness
        .send(harness.stop_request(tx_id, Some(TAG), 400.0))
        .await
        .unwrap();
    let stopped = harness.transaction(tx_id).await;

    harness.clock.advance(chrono::Duration::seconds(60));
    let second = harness
        .send(harness.stop_request(tx_id, Some(TAG), 999.0))
        .await;
    assert!(matches!(
        second,
        Err(DomainError::TransactionAlreadyStopped(id)) if id == tx_id
    ));

    let after = harness.transaction(tx_id).await;
    assert_eq!(
        after.stop.as_ref().unwrap().timestamp,
        stopped.stop.as_ref().unwrap().timestamp
    );
    assert_eq!(after.stop.as_ref().unwrap().meter_stop, 400.0);
}

#[tokio::test]
async fn unknown_transaction_stop_is_a_backend_error() {
    let harness = TestHarness::new();
    harness.boot().await;
    let result = harness.send(harness.stop_request(777, None, 100.0)).await;
    assert!(matches!(result, Err(DomainError::TransactionNotFound(777))));
}

// Seed scenario 5: transactionData shaped for the wrong protocol version
#[tokio::test]
async fn mismatched_transaction_data_rejects_then_plain_stop_succeeds() {
    let harness = TestHarness::new();
    harness.boot().await;
    let tx_id = harness.start(1, TAG, 0.0).await;
    harness.clock.advance(chrono::Duration::seconds(60));
    harness.energy_sample(1, tx_id, 400.0).await;

    let mut stop = harness.stop_request(tx_id, Some(TAG), 400.0);
    if let OcppRequest::StopTransaction(ref mut payload) = stop {
        payload.transaction_data = TransactionData::Mismatched;
    }
    match harness.send(stop).await.unwrap() {
        OcppResponse::StopTransaction { status } => assert_eq!(status, IdTagStatus::Invalid),
        other => panic!("unexpected: {other:?}"),
    }
    assert!(harness.transaction(tx_id).await.is_active());

    match harness
        .send(harness.stop_request(tx_id, Some(TAG), 400.0))
        .await
        .unwrap()
    {
        OcppResponse::StopTransaction { status } => assert_eq!(status, IdTagStatus::Accepted),
        other => panic!("unexpected: {other:?}"),
    }
    assert!(!harness.transaction(tx_id).await.is_active());
}

// ── Recovery & extra inactivity ────────────────────────────────

// Seed scenario 6: Available with an ongoing consuming transaction
#[tokio::test]
async fn available_soft_stops_consuming_transaction() {
    let harness = TestHarness::new();
    harness.boot().await;
    let tx_id = harness.start(1, TAG, 0.0).await;
    harness.clock.advance(chrono::Duration::seconds(60));
    harness.energy_sample(1, tx_id, 600.0).await;

    harness.clock.advance(chrono::Duration::seconds(30));
    harness
        .notify_status(1, ConnectorStatus::Available, at(90))
        .await;

    let transaction = harness.transaction(tx_id).await;
    let stop = transaction.stop.as_ref().expect("soft-stopped");
    assert_eq!(stop.meter_stop, 600.0);
    assert_eq!(stop.total_consumption_wh, 600.0);

    let station = harness.station().await;
    let connector = station.connector(1).unwrap();
    assert_eq!(connector.current_transaction_id, 0);
    assert_eq!(connector.status, ConnectorStatus::Available);
}

#[tokio::test]
async fn available_deletes_empty_transaction() {
    let harness = TestHarness::new();
    harness.boot().await;
    let tx_id = harness.start(1, TAG, 0.0).await;

    harness.clock.advance(chrono::Duration::seconds(60));
    harness
        .notify_status(1, ConnectorStatus::Available, at(60))
        .await;

    assert!(harness
        .storage
        .get_transaction(TENANT, tx_id)
        .await
        .unwrap()
        .is_none());
    assert_eq!(
        harness.station().await.connector(1).unwrap().current_transaction_id,
        0
    );
}

#[tokio::test]
async fn extra_inactivity_computed_exactly_once() {
    let harness = TestHarness::new();
    harness.boot().await;
    let tx_id = harness.start(1, TAG, 0.0).await;
    harness.clock.advance(chrono::Duration::seconds(60));
    harness.energy_sample(1, tx_id, 400.0).await;
    harness
        .send(harness.stop_request(tx_id, Some(TAG), 400.0))
        .await
        .unwrap();
    let base_inactivity = harness
        .transaction(tx_id)
        .await
        .stop
        .as_ref()
        .unwrap()
        .total_inactivity_secs;

    // Station reports Available five minutes after the stop
    harness.clock.advance(chrono::Duration::seconds(300));
    harness
        .notify_status(1, ConnectorStatus::Available, at(360))
        .await;

    let transaction = harness.transaction(tx_id).await;
    let stop = transaction.stop.as_ref().unwrap();
    assert!(stop.extra_inactivity_computed);
    assert_eq!(stop.extra_inactivity_secs, 300);
    assert_eq!(stop.total_inactivity_secs, base_inactivity + 300);

    // A second Available (different info, so the no-change guard passes)
    // must not add more inactivity
    harness.clock.advance(chrono::Duration::seconds(300));
    let mut second = harness.status_request(1, ConnectorStatus::Available, at(660));
    if let OcppRequest::StatusNotification(ref mut payload) = second {
        payload.info = Some("connector ready".into());
    }
    harness.send(second).await.unwrap();

    let after = harness.transaction(tx_id).await;
    assert_eq!(
        after.stop.as_ref().unwrap().total_inactivity_secs,
        base_inactivity + 300
    );
}

#[tokio::test]
async fn cdr_pushed_once_for_roaming_session() {
    let harness = TestHarness::new();
    harness.boot().await;

    // Roaming start requires a public station
    let mut station = harness.station().await;
    station.public = true;
    harness.storage.save_station(station).await.unwrap();

    let tx_id = harness.start(1, "ROAM-42", 0.0).await;
    assert!(tx_id > 0);
    assert!(harness.transaction(tx_id).await.roaming.is_some());

    harness.clock.advance(chrono::Duration::seconds(60));
    harness.energy_sample(1, tx_id, 500.0).await;
    harness
        .send(harness.stop_request(tx_id, None, 500.0))
        .await
        .unwrap();

    harness.clock.advance(chrono::Duration::seconds(120));
    harness
        .notify_status(1, ConnectorStatus::Available, at(180))
        .await;
    assert_eq!(
        harness.roaming.cdr_pushes.load(std::sync::atomic::Ordering::SeqCst),
        1
    );
    assert!(harness
        .transaction(tx_id)
        .await
        .roaming
        .as_ref()
        .unwrap()
        .cdr_pushed);

    // Replaying the push is a no-op thanks to the cdr_pushed gate
    let mut transaction = harness.transaction(tx_id).await;
    let station = harness.station().await;
    harness
        .handler
        .push_cdr_locked(&mut transaction, &station)
        .await
        .unwrap();
    assert_eq!(
        harness.roaming.cdr_pushes.load(std::sync::atomic::Ordering::SeqCst),
        1
    );
}

// ── Status notifications ───────────────────────────────────────

#[tokio::test]
async fn connector_zero_status_is_informational() {
    let harness = TestHarness::new();
    harness.boot().await;
    let connectors_before = harness.station().await.connectors.len();

    harness
        .notify_status(0, ConnectorStatus::Available, t0())
        .await;
    assert_eq!(harness.station().await.connectors.len(), connectors_before);
}

#[tokio::test]
async fn unchanged_status_is_not_persisted() {
    let harness = TestHarness::new();
    harness.boot().await;
    harness
        .notify_status(1, ConnectorStatus::Preparing, at(10))
        .await;
    let first = harness.station().await;
    let changed_on = first.connector(1).unwrap().status_last_changed_on;

    harness.clock.advance(chrono::Duration::seconds(60));
    harness
        .notify_status(1, ConnectorStatus::Preparing, at(70))
        .await;
    let second = harness.station().await;
    assert_eq!(second.connector(1).unwrap().status_last_changed_on, changed_on);
}

#[tokio::test]
async fn new_connector_created_with_template_enrichment() {
    let harness = TestHarness::new();
    harness.boot().await;

    harness
        .notify_status(2, ConnectorStatus::Available, t0())
        .await;
    let station = harness.station().await;
    let connector = station.connector(2).unwrap();
    assert_eq!(connector.status, ConnectorStatus::Available);
    // Template enrichment filled the physical attributes
    assert_eq!(connector.connector_type.as_deref(), Some("Type2"));
    assert!(connector.power_watts > 0.0);
}

// ── Meter values edge cases ────────────────────────────────────

#[tokio::test]
async fn meter_values_without_transaction_are_stored_only() {
    let harness = TestHarness::new();
    harness.boot().await;

    let payload = serde_json::json!({
        "connectorId": 1,
        "meterValue": [{
            "timestamp": at(60).to_rfc3339(),
            "sampledValue": [{"value": "1234"}]
        }]
    });
    let request = normalizer::decode_json("MeterValues", &payload).unwrap();
    match harness.send(request).await.unwrap() {
        OcppResponse::MeterValues => {}
        other => panic!("unexpected: {other:?}"),
    }
    assert_eq!(harness.storage.meter_value_count(TENANT, STATION), 1);
}

#[tokio::test]
async fn remote_stop_tag_wins_within_window() {
    let harness = TestHarness::new();
    harness.boot().await;
    let tx_id = harness.start(1, TAG, 0.0).await;
    harness.clock.advance(chrono::Duration::seconds(60));
    harness.energy_sample(1, tx_id, 400.0).await;

    // A central remote stop was issued 30 seconds ago by the operator's tag
    harness.storage.add_tag(Tag {
        id: "OPERATOR-1".into(),
        tenant_id: TENANT.into(),
        user_id: Some(super::testkit::USER.into()),
        active: true,
        expiry_date: None,
        description: None,
    });
    let mut transaction = harness.transaction(tx_id).await;
    transaction.remote_stop = Some(crate::domain::RemoteStop {
        tag_id: "OPERATOR-1".into(),
        timestamp: harness.clock.now(),
    });
    harness.storage.save_transaction(transaction).await.unwrap();
    harness.clock.advance(chrono::Duration::seconds(30));

    harness
        .send(harness.stop_request(tx_id, None, 400.0))
        .await
        .unwrap();
    let stopped = harness.transaction(tx_id).await;
    assert_eq!(stopped.stop.as_ref().unwrap().tag_id, "OPERATOR-1");
}
