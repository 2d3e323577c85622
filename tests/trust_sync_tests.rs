//! Trust-store mirroring of CA-transfer anchors

mod common;

use common::{relation, Harness};
use serde_json::json;
use site_manager_operator::constants::{CA_TRANSFER_ENDPOINT, TRUST_DIR};
use site_manager_operator::controller::trust::{
    refresh_marker_path, sync_trust_bundle, trust_file_name,
};
use site_manager_operator::controller::{Event, OperatorError, Outcome};
use site_manager_operator::crd::SiteManagerSpec;
use site_manager_operator::integrations::Relation;

fn ca_relation(id: u32, certs: &[&str]) -> Relation {
    relation(
        CA_TRANSFER_ENDPOINT,
        id,
        &[("certificates", &json!(certs).to_string())],
    )
}

fn trust_path(namespace: &str, relation_id: u32, index: usize) -> String {
    format!("{TRUST_DIR}/{}", trust_file_name(namespace, relation_id, index))
}

fn refreshes(harness: &Harness) -> usize {
    harness.workload.execs_of("update-ca-certificates").len()
}

#[tokio::test]
async fn test_anchors_written_and_store_refreshed_once() {
    let harness = Harness::leader();
    harness.relations.add(ca_relation(4, &["CA-1", "CA-2"]));

    let report = sync_trust_bundle(&harness.context(), None).await.unwrap();

    assert_eq!(report.written, 2);
    assert_eq!(report.removed, 0);
    assert!(report.refreshed);
    assert_eq!(harness.workload.file(&trust_path("sm", 4, 0)).as_deref(), Some("CA-1\n"));
    assert_eq!(harness.workload.file(&trust_path("sm", 4, 1)).as_deref(), Some("CA-2\n"));
    assert_eq!(
        harness.workload.execs_of("update-ca-certificates"),
        vec![vec!["update-ca-certificates".to_string(), "--fresh".to_string()]]
    );
}

#[tokio::test]
async fn test_unchanged_anchors_skip_refresh() {
    let harness = Harness::leader();
    harness.relations.add(ca_relation(4, &["CA-1"]));
    let ctx = harness.context();

    sync_trust_bundle(&ctx, None).await.unwrap();
    let report = sync_trust_bundle(&ctx, None).await.unwrap();

    assert!(!report.changed());
    assert!(!report.refreshed);
    assert_eq!(refreshes(&harness), 1);
}

#[tokio::test]
async fn test_departing_relation_is_excluded() {
    let harness = Harness::leader();
    harness.relations.add(ca_relation(4, &["CA-1"]));
    harness.relations.add(ca_relation(6, &["CA-9"]));
    let ctx = harness.context();
    sync_trust_bundle(&ctx, None).await.unwrap();

    // Still listed while departing
    let report = sync_trust_bundle(&ctx, Some(4)).await.unwrap();

    assert_eq!(report.removed, 1);
    assert!(harness.workload.file(&trust_path("sm", 4, 0)).is_none());
    assert_eq!(harness.workload.file(&trust_path("sm", 6, 0)).as_deref(), Some("CA-9\n"));
    assert_eq!(refreshes(&harness), 2);
}

#[tokio::test]
async fn test_files_of_other_namespaces_and_system_are_kept() {
    let harness = Harness::leader();
    let foreign = trust_path("sm-east", 4, 0);
    let system = format!("{TRUST_DIR}/corporate-root.crt");
    harness.workload.put_file(&foreign, "OTHER\n");
    harness.workload.put_file(&system, "ROOT\n");
    harness.workload.put_file(&trust_path("sm", 12, 0), "STALE\n");

    let report = sync_trust_bundle(&harness.context(), None).await.unwrap();

    assert_eq!(report.removed, 1);
    assert!(harness.workload.file(&trust_path("sm", 12, 0)).is_none());
    assert_eq!(harness.workload.file(&foreign).as_deref(), Some("OTHER\n"));
    assert_eq!(harness.workload.file(&system).as_deref(), Some("ROOT\n"));
}

#[tokio::test]
async fn test_failed_refresh_is_an_error() {
    let harness = Harness::leader();
    harness.relations.add(ca_relation(4, &["CA-1"]));
    harness.workload.set_exit_code("update-ca-certificates", 1);

    let result = sync_trust_bundle(&harness.context(), None).await;

    assert!(matches!(result, Err(OperatorError::TrustRefresh(_))));
}

#[tokio::test]
async fn test_failed_refresh_is_retried_on_the_next_sync() {
    let harness = Harness::leader();
    harness.relations.add(ca_relation(4, &["CA-1"]));
    harness.workload.set_exit_code("update-ca-certificates", 1);
    let ctx = harness.context();
    let marker = refresh_marker_path("sm");

    assert!(sync_trust_bundle(&ctx, None).await.is_err());
    assert_eq!(harness.workload.file(&trust_path("sm", 4, 0)).as_deref(), Some("CA-1\n"));
    assert!(harness.workload.file(&marker).is_some());

    harness.workload.set_exit_code("update-ca-certificates", 0);
    let report = sync_trust_bundle(&ctx, None).await.unwrap();

    assert!(!report.changed());
    assert!(report.refreshed);
    assert_eq!(refreshes(&harness), 2);
    assert!(harness.workload.file(&marker).is_none());

    let report = sync_trust_bundle(&ctx, None).await.unwrap();
    assert!(!report.refreshed);
    assert_eq!(refreshes(&harness), 2);
}

#[tokio::test]
async fn test_ca_transfer_events_never_change_status() {
    let harness = Harness::follower();
    harness.relations.add(ca_relation(4, &["CA-1"]));
    let mut operator = harness.operator(SiteManagerSpec::default());
    let before = operator.status().clone();

    assert_eq!(
        operator.handle(&Event::CaTransferChanged { relation_id: 4 }).await,
        Outcome::Applied
    );
    assert_eq!(
        operator.handle(&Event::CaTransferRemoved { relation_id: 4 }).await,
        Outcome::Applied
    );
    assert_eq!(operator.status(), &before);
    assert!(harness.status.published().is_empty());
}

#[tokio::test]
async fn test_failed_refresh_defers_the_ca_transfer_event() {
    let harness = Harness::follower();
    harness.relations.add(ca_relation(4, &["CA-1"]));
    harness.workload.set_exit_code("update-ca-certificates", 1);
    let mut operator = harness.operator(SiteManagerSpec::default());
    let before = operator.status().clone();

    let outcome = operator.handle(&Event::CaTransferChanged { relation_id: 4 }).await;

    assert!(outcome.is_deferred());
    assert_eq!(operator.status(), &before);
    assert!(harness.status.published().is_empty());

    harness.workload.set_exit_code("update-ca-certificates", 0);
    assert_eq!(
        operator.handle(&Event::CaTransferChanged { relation_id: 4 }).await,
        Outcome::Applied
    );
    assert_eq!(refreshes(&harness), 2);
}

#[tokio::test]
async fn test_unit_bag_anchors_are_mirrored() {
    let harness = Harness::follower();
    harness.relations.add(relation(CA_TRANSFER_ENDPOINT, 3, &[]));
    harness
        .relations
        .set_unit_data(CA_TRANSFER_ENDPOINT, 3, "ca/0", "ca", "CA-ROOT\n");

    let report = sync_trust_bundle(&harness.context(), None).await.unwrap();

    assert_eq!(report.written, 1);
    assert_eq!(
        harness.workload.file(&trust_path("sm", 3, 0)).as_deref(),
        Some("CA-ROOT\n")
    );
}
