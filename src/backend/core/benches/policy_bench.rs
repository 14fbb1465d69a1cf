//! Benchmarks for capability resolution and access context lookups.
use callmonitor_core::rbac::{
    Capability, DirectoryAdmin, Identity, InMemoryDirectory, Organization, OrganizationId,
    PlanTier, PolicyEngine, PredefinedRole, RbacContextResolver, Role, UserId,
};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::Arc;

fn bench_policy_resolve_capabilities(c: &mut Criterion) {
    let mut group = c.benchmark_group("policy_resolve_capabilities");
    let engine = PolicyEngine::builtin();
    for role in PredefinedRole::all() {
        for plan in PlanTier::all() {
            let label = format!("{}_{}", role.as_role(), plan);
            let role = role.as_role();
            group.bench_with_input(BenchmarkId::from_parameter(label), &(role, plan), |b, (r, p)| { b.iter(|| black_box(engine.resolve_capabilities(r, *p))); });
        }
    }
    let unknown = Role::parse("supervisor");
    group.bench_function("unrecognized_role", |b| { b.iter(|| black_box(engine.resolve_capabilities(&unknown, PlanTier::Enterprise))); });
    group.finish();
}

fn bench_policy_matrix(c: &mut Criterion) {
    let engine = PolicyEngine::builtin();
    c.bench_function("policy_matrix", |b| { b.iter(|| black_box(engine.matrix())); });
}

fn bench_resolver_resolve(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolver_resolve");
    let rt = tokio::runtime::Runtime::new().unwrap();
    let directory = Arc::new(InMemoryDirectory::new());
    let org = OrganizationId::new("bench-org");
    rt.block_on(async {
        directory.create_organization(Organization::new(org.clone(), "Bench", PlanTier::Pro), &UserId::new("owner")).await.unwrap();
        directory.accept_invite(&UserId::new("agent"), &org, Role::Agent).await.unwrap();
    });
    let resolver = RbacContextResolver::new(directory.clone(), directory.clone(), Arc::new(PolicyEngine::builtin()));

    for user in ["owner", "agent"] {
        let identity = Identity::authenticated(user);
        group.bench_with_input(BenchmarkId::new("member", user), &identity, |b, id| {
            b.iter(|| { rt.block_on(async { let ctx = resolver.resolve(id, Some("bench-org")).await.unwrap(); black_box(ctx.has(Capability::EditCalls)); }); });
        });
    }
    let stranger = Identity::authenticated("stranger");
    group.bench_function("non_member", |b| { b.iter(|| { rt.block_on(async { black_box(resolver.resolve(&stranger, Some("bench-org")).await.is_err()); }); }); });
    group.finish();
}

fn bench_resolver_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolver_throughput");
    let rt = tokio::runtime::Runtime::new().unwrap();
    let directory = Arc::new(InMemoryDirectory::new());
    rt.block_on(async {
        for i in 0..100 {
            let org = OrganizationId::new(format!("org-{i}"));
            directory.create_organization(Organization::new(org, format!("Org {i}"), PlanTier::Enterprise), &UserId::new(format!("user-{i}"))).await.unwrap();
        }
    });
    let resolver = Arc::new(RbacContextResolver::new(directory.clone(), directory.clone(), Arc::new(PolicyEngine::builtin())));

    for batch_size in [100, 1_000] {
        group.throughput(Throughput::Elements(batch_size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(batch_size), &batch_size, |b, &n| {
            b.to_async(&rt).iter(|| {
                let resolver = resolver.clone();
                async move {
                    for i in 0..n {
                        let identity = Identity::authenticated(format!("user-{}", i % 100));
                        let org = format!("org-{}", i % 100);
                        black_box(resolver.resolve(&identity, Some(&org)).await.unwrap());
                    }
                }
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_policy_resolve_capabilities, bench_policy_matrix, bench_resolver_resolve, bench_resolver_throughput);
criterion_main!(benches);
