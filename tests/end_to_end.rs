//! End-to-end deployment of the storage and delivery stacks on the in-memory backend

use regex::Regex;
use stackfront::core::iam::ResolvedPrincipal;
use stackfront::deploy::{BackendError, DeploymentStatus};
use stackfront::{
    Action, Attribute, DeploymentConfig, InMemoryBackend, Orchestrator, StackError, DOMAIN_OUTPUT,
};

#[tokio::test]
async fn test_deploy_serves_bucket_over_https() {
    let composed = DeploymentConfig::default().compose().unwrap();
    let backend = InMemoryBackend::new();
    let orchestrator = Orchestrator::new(backend.clone());

    let report = orchestrator.deploy(&composed.app).await.unwrap();

    let order: Vec<&str> = report.order.iter().map(|n| n.as_str()).collect();
    assert_eq!(order, vec!["s3BucketStack", "cloudFrontStack"]);
    assert!(report
        .results
        .iter()
        .all(|r| r.status == DeploymentStatus::Created));

    let url = report.output("cloudFrontStack", DOMAIN_OUTPUT).unwrap();
    let pattern = Regex::new(r"^https://[a-z0-9]+\.cloudfront\.net$").unwrap();
    assert!(pattern.is_match(url), "unexpected url {}", url);

    // The export crossed stacks as the real bucket name
    let bucket = orchestrator
        .exported_value(&composed.delivery.origin_reference)
        .unwrap();
    assert!(backend.bucket_exists(&bucket));
    assert_eq!(
        report.result("s3BucketStack").unwrap().exported_values
            [&composed.storage.bucket_name.export_name],
        bucket
    );

    backend.put_object(&bucket, "index.html", b"<h1>hello</h1>").unwrap();
    backend.put_object(&bucket, "img/logo.png", b"png").unwrap();

    assert_eq!(backend.fetch(url, "/").unwrap(), b"<h1>hello</h1>");
    assert_eq!(backend.fetch(url, "/img/logo.png").unwrap(), b"png");
    assert!(matches!(
        backend.fetch(url, "/missing.txt"),
        Err(BackendError::NoSuchKey(_))
    ));
}

#[tokio::test]
async fn test_identity_can_read_but_not_write() {
    let composed = DeploymentConfig::default().compose().unwrap();
    let backend = InMemoryBackend::new();
    let orchestrator = Orchestrator::new(backend.clone());
    orchestrator.deploy(&composed.app).await.unwrap();

    let bucket = orchestrator
        .exported_value(&composed.delivery.origin_reference)
        .unwrap();
    let canonical_user = backend
        .attribute("cloudFrontStack", "DistributionOAI", Attribute::CanonicalUserId)
        .unwrap();
    let identity = ResolvedPrincipal::CanonicalUser(canonical_user);

    assert!(backend.is_allowed(&bucket, &identity, Action::GetObject, Some("index.html")));
    assert!(backend.is_allowed(&bucket, &identity, Action::ListBucket, None));
    assert!(!backend.is_allowed(&bucket, &identity, Action::PutObject, Some("index.html")));
    assert!(!backend.is_allowed(&bucket, &identity, Action::DeleteObject, Some("index.html")));

    let stranger = ResolvedPrincipal::CanonicalUser("0".repeat(64));
    assert!(!backend.is_allowed(&bucket, &stranger, Action::GetObject, Some("index.html")));

    let policy = backend.bucket_policy(&bucket).unwrap();
    assert_eq!(policy.statement.len(), 1);
    assert_eq!(
        policy.statement[0].resource,
        vec![format!("arn:aws:s3:::{}", bucket), format!("arn:aws:s3:::{}/*", bucket)]
    );
}

#[tokio::test]
async fn test_redeploy_is_an_update() {
    let composed = DeploymentConfig::default().compose().unwrap();
    let orchestrator = Orchestrator::new(InMemoryBackend::new());

    let first = orchestrator.deploy(&composed.app).await.unwrap();
    let second = orchestrator.deploy(&composed.app).await.unwrap();

    assert_ne!(first.deployment_id, second.deployment_id);
    assert!(second
        .results
        .iter()
        .all(|r| r.status == DeploymentStatus::Updated));
    assert_eq!(
        first.output("cloudFrontStack", DOMAIN_OUTPUT),
        second.output("cloudFrontStack", DOMAIN_OUTPUT)
    );
}

#[tokio::test]
async fn test_consumer_alone_cannot_read_export() {
    let composed = DeploymentConfig::default().compose().unwrap();
    let orchestrator = Orchestrator::new(InMemoryBackend::new());
    let delivery = composed.app.stack(composed.delivery.id);

    assert!(matches!(
        orchestrator.exported_value(&composed.delivery.origin_reference),
        Err(StackError::UnresolvedExportAccess { .. })
    ));
    assert!(matches!(
        orchestrator.apply(delivery).await,
        Err(StackError::UnresolvedExportAccess { .. })
    ));
}
