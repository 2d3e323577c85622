//! Enrollment token publishing and site removal

mod common;

use common::{configured_spec, relation, Harness};
use site_manager_operator::constants::{ENROLL_ENDPOINT, OPERATOR_CREDENTIAL_LABEL};
use site_manager_operator::controller::enroll::{operator_credentials, TOKEN_KEY};
use site_manager_operator::controller::{Event, Operator, OperatorStatus, Outcome};

/// Leader that has gone active and recorded its operator credential
async fn bootstrapped_leader() -> (Harness, Operator) {
    let harness = Harness::leader().with_required_integrations();
    let mut operator = harness.operator(configured_spec());
    assert_eq!(operator.handle(&Event::WorkloadReady).await, Outcome::Applied);
    assert_eq!(operator.status(), &OperatorStatus::Active);
    (harness, operator)
}

#[tokio::test]
async fn test_join_before_bootstrap_defers() {
    let harness = Harness::leader();
    harness.relations.add(relation(ENROLL_ENDPOINT, 7, &[]));
    let mut operator = harness.operator(configured_spec());

    let outcome = operator.handle(&Event::EnrollJoined { relation_id: 7 }).await;

    assert_eq!(
        outcome,
        Outcome::Deferred("operator credentials not available yet".to_string())
    );
    assert_eq!(harness.api.tokens_issued(), 0);
    assert!(harness.relations.local_data(ENROLL_ENDPOINT, 7).is_empty());
}

#[tokio::test]
async fn test_join_publishes_token_with_operator_credential() {
    let (harness, mut operator) = bootstrapped_leader().await;
    harness.relations.add(relation(ENROLL_ENDPOINT, 7, &[]));

    let outcome = operator.handle(&Event::EnrollJoined { relation_id: 7 }).await;

    assert_eq!(outcome, Outcome::Applied);
    assert_eq!(
        harness.relations.local_data(ENROLL_ENDPOINT, 7)[TOKEN_KEY],
        "enroll-token-0"
    );
    assert_eq!(harness.api.logins(), vec!["no-reply@site-manager.operator"]);
    assert_eq!(operator.status(), &OperatorStatus::Active);
}

#[tokio::test]
async fn test_follower_ignores_enrollment() {
    let harness = Harness::follower();
    harness.relations.add(relation(ENROLL_ENDPOINT, 7, &[]));
    let mut operator = harness.operator(configured_spec());

    assert_eq!(
        operator.handle(&Event::EnrollJoined { relation_id: 7 }).await,
        Outcome::Applied
    );
    assert_eq!(
        operator
            .handle(&Event::EnrollBroken {
                relation_id: 7,
                cluster_id: Some("cluster-a".to_string()),
            })
            .await,
        Outcome::Applied
    );
    assert_eq!(harness.api.tokens_issued(), 0);
    assert!(harness.api.removed().is_empty());
}

#[tokio::test]
async fn test_api_failure_defers_token() {
    let (harness, mut operator) = bootstrapped_leader().await;
    harness.relations.add(relation(ENROLL_ENDPOINT, 7, &[]));
    harness.api.set_failing(true);

    let outcome = operator.handle(&Event::EnrollJoined { relation_id: 7 }).await;

    assert!(outcome.is_deferred());
    assert!(harness.relations.local_data(ENROLL_ENDPOINT, 7).is_empty());
    assert_eq!(operator.status(), &OperatorStatus::Active);
}

#[tokio::test]
async fn test_broken_relation_removes_site() {
    let (harness, mut operator) = bootstrapped_leader().await;

    let outcome = operator
        .handle(&Event::EnrollBroken {
            relation_id: 7,
            cluster_id: Some("cluster-a".to_string()),
        })
        .await;

    assert_eq!(outcome, Outcome::Applied);
    assert_eq!(harness.api.removed(), vec!["cluster-a"]);
}

#[tokio::test]
async fn test_broken_relation_without_cluster_id_is_a_no_op() {
    let (harness, mut operator) = bootstrapped_leader().await;

    let outcome = operator
        .handle(&Event::EnrollBroken {
            relation_id: 7,
            cluster_id: None,
        })
        .await;

    assert_eq!(outcome, Outcome::Applied);
    assert!(harness.api.removed().is_empty());
    assert!(harness.api.logins().is_empty());
}

#[tokio::test]
async fn test_operator_credentials_follow_the_recorded_secret() {
    let (harness, _operator) = bootstrapped_leader().await;
    let ctx = harness.context();

    let credentials = operator_credentials(&ctx)
        .await
        .unwrap()
        .expect("credentials recorded");
    let (_, content) = harness
        .secrets
        .by_label(OPERATOR_CREDENTIAL_LABEL)
        .expect("secret stored");
    assert_eq!(credentials.username, content["username"]);
    assert_eq!(credentials.password, content["password"]);

    harness.secrets.forget(OPERATOR_CREDENTIAL_LABEL);
    assert!(operator_credentials(&ctx).await.unwrap().is_none());
}
