use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use stackfront::core::graph::{deployment_waves, resolve_order};
use stackfront::core::iam::{Effect, ResolvedPolicy, ResolvedPrincipal, ResolvedStatement};
use stackfront::{
    AccessPolicySynthesizer, Action, ActionProfile, App, DeploymentConfig, Principal,
    ResourceDescriptor, ResourceKind, Stack, StackName, StackProps,
};

/// App of `n` stacks where each imports from the one before it
fn chained_app(n: usize) -> App {
    let mut app = App::new();
    let mut previous = None;
    for i in 0..n {
        let id = app.add_stack(format!("stack{}", i), StackProps::default()).unwrap();
        let stack = app.stack_mut(id);
        let bucket = stack
            .declare(ResourceDescriptor::new(ResourceKind::Bucket, "Bucket").unwrap())
            .unwrap();
        stack.export("out", bucket.name()).unwrap();
        if let Some(source) = previous {
            app.import_reference(id, source, "out").unwrap();
        }
        previous = Some(id);
    }
    app
}

/// Bucket-policy document with `n` read grants for distinct identities
fn policy_with_grants(n: usize) -> ResolvedPolicy {
    let statement = (0..n)
        .map(|i| ResolvedStatement {
            sid: Some(format!("AllowRead{}", i + 1)),
            effect: Effect::Allow,
            principal: Some(ResolvedPrincipal::CanonicalUser(format!("{:064x}", i))),
            action: vec![Action::GetObject, Action::ListBucket],
            resource: vec![
                "arn:aws:s3:::origin-bucket".to_string(),
                "arn:aws:s3:::origin-bucket/*".to_string(),
            ],
        })
        .collect();
    ResolvedPolicy {
        version: "2012-10-17".to_string(),
        statement,
    }
}

/// Benchmark declaring the default two-stack app
fn bench_compose_default(c: &mut Criterion) {
    let config = DeploymentConfig::default();

    c.bench_function("compose_default", |b| {
        b.iter(|| {
            let composed = config.compose().unwrap();
            black_box(composed);
        });
    });
}

/// Benchmark import-time cycle detection on long chains
fn bench_import_chain(c: &mut Criterion) {
    let lengths = vec![10, 50, 200];

    let mut group = c.benchmark_group("import_chain");

    for n in lengths {
        group.throughput(Throughput::Elements(n as u64));

        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
            b.iter(|| black_box(chained_app(n)));
        });
    }

    group.finish();
}

/// Benchmark ordering and wave planning
fn bench_resolve_order(c: &mut Criterion) {
    let lengths = vec![10, 100, 1_000];

    let mut group = c.benchmark_group("resolve_order");

    for n in lengths {
        let app = chained_app(n);
        group.throughput(Throughput::Elements(n as u64));

        group.bench_with_input(BenchmarkId::new("order", n), app.stacks(), |b, stacks| {
            b.iter(|| black_box(resolve_order(stacks).unwrap().len()));
        });

        group.bench_with_input(BenchmarkId::new("waves", n), app.stacks(), |b, stacks| {
            b.iter(|| black_box(deployment_waves(stacks).unwrap().len()));
        });
    }

    group.finish();
}

/// Benchmark grant synthesis, including the de-duplication lookup
fn bench_grant_access(c: &mut Criterion) {
    let grant_counts = vec![1, 10, 100];

    let mut group = c.benchmark_group("grant_access");

    for count in grant_counts {
        group.throughput(Throughput::Elements(count as u64));

        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            b.iter(|| {
                let mut stack = Stack::new(
                    StackName::new("delivery").unwrap(),
                    StackProps::default(),
                );
                let bucket = stack
                    .declare(
                        ResourceDescriptor::new(ResourceKind::ImportedBucket, "OriginBucket")
                            .unwrap(),
                    )
                    .unwrap();
                for i in 0..count {
                    let grant = AccessPolicySynthesizer::grant_access(
                        &mut stack,
                        Principal::Service(format!("service{}.amazonaws.com", i)),
                        &bucket,
                        ActionProfile::ReadOnly,
                    )
                    .unwrap();
                    black_box(grant);
                }
            });
        });
    }

    group.finish();
}

/// Benchmark bucket-policy evaluation, allow on the last statement and deny on a miss
fn bench_policy_evaluation(c: &mut Criterion) {
    let statement_counts = vec![1, 10, 100];

    let mut group = c.benchmark_group("policy_evaluation");

    for count in statement_counts {
        let policy = policy_with_grants(count);
        let last = ResolvedPrincipal::CanonicalUser(format!("{:064x}", count - 1));
        let stranger = ResolvedPrincipal::CanonicalUser("f".repeat(64));

        group.bench_with_input(BenchmarkId::new("allow", count), &policy, |b, policy| {
            b.iter(|| {
                black_box(policy.is_allowed(
                    &last,
                    Action::GetObject,
                    "arn:aws:s3:::origin-bucket/assets/app.js",
                ))
            });
        });

        group.bench_with_input(BenchmarkId::new("deny", count), &policy, |b, policy| {
            b.iter(|| {
                black_box(policy.is_allowed(
                    &stranger,
                    Action::GetObject,
                    "arn:aws:s3:::origin-bucket/assets/app.js",
                ))
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_compose_default,
    bench_import_chain,
    bench_resolve_order,
    bench_grant_access,
    bench_policy_evaluation,
);
criterion_main!(benches);
