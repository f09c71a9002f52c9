//! 路由作用域端到端行为

use std::sync::Arc;

use dlmp_errors::AppError;
use dlmp_routing::{DataSourceRouter, PRIMARY, PoolRegistry, REPLICA, RouteMarker, RoutingScope};

fn router(replicas: &[&'static str]) -> DataSourceRouter<String> {
    let mut builder = PoolRegistry::builder().primary("primary-pool".to_string());
    for name in replicas {
        builder = builder.replica(*name, format!("{}-pool", name));
    }
    DataSourceRouter::new(builder.build().unwrap())
}

#[tokio::test]
async fn test_write_without_scope_uses_primary() {
    let router = router(&["replica-1"]);
    let resolved = router.resolve().unwrap();
    assert_eq!(resolved.name, PRIMARY);
    assert_eq!(resolved.pool, "primary-pool");
}

#[tokio::test]
async fn test_read_inside_replica_scope() {
    let router = router(&["replica-1"]);
    let pool = router
        .scope()
        .replica(async { Ok::<_, AppError>(router.resolve()?.pool.clone()) })
        .await
        .unwrap();
    assert_eq!(pool, "replica-1-pool");
}

#[tokio::test(flavor = "current_thread")]
async fn test_no_leak_after_failure() {
    let router = router(&["replica-1"]);

    let result: Result<(), AppError> = router
        .scope()
        .replica(async {
            assert_eq!(router.resolve()?.name, "replica-1");
            Err(AppError::database("query failed"))
        })
        .await;
    assert!(result.is_err());

    // 同一工作线程上的下一个无关操作
    assert_eq!(RoutingScope::current(), RouteMarker::Unrouted);
    assert_eq!(router.resolve().unwrap().name, PRIMARY);
}

fn abort_operation() -> Result<(), AppError> {
    panic!("operation aborted")
}

#[tokio::test(flavor = "current_thread")]
async fn test_no_leak_after_panic() {
    let router = Arc::new(router(&["replica-1"]));

    let inner = router.clone();
    let task = tokio::spawn(async move {
        inner
            .scope()
            .replica(async {
                inner.resolve()?;
                abort_operation()
            })
            .await
    });
    assert!(task.await.unwrap_err().is_panic());

    assert_eq!(router.resolve().unwrap().name, PRIMARY);
}

#[tokio::test]
async fn test_round_robin_in_registration_order() {
    let router = router(&["rA", "rB"]);
    let scope = router.scope();

    let mut names = Vec::new();
    for _ in 0..3 {
        let name = scope
            .replica(async { Ok::<_, AppError>(router.resolve()?.name.to_string()) })
            .await
            .unwrap();
        names.push(name);
    }

    assert_eq!(names, ["rA", "rB", "rA"]);
}

#[tokio::test]
async fn test_unregistered_route_is_configuration_error() {
    let router = router(&["rA"]);
    let err = router
        .scope()
        .run("nonexistent", async { Ok(()) })
        .await
        .unwrap_err();

    assert!(err.is_configuration());
    assert!(!err.is_transient());
    assert!(!AppError::timeout("GET user:1").is_configuration());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_scopes_do_not_cross_talk() {
    let router = Arc::new(router(&["rA", "rB"]));

    let handles: Vec<_> = (0..64)
        .map(|i| {
            let router = router.clone();
            tokio::spawn(async move {
                let route = if i % 2 == 0 { PRIMARY } else { REPLICA };
                router
                    .scope()
                    .run(route, async {
                        tokio::task::yield_now().await;
                        let resolved = router.resolve()?;
                        Ok::<_, AppError>((route, resolved.role))
                    })
                    .await
            })
        })
        .collect();

    for handle in futures::future::join_all(handles).await {
        let (route, role) = handle.unwrap().unwrap();
        assert_eq!(route, role.as_str());
    }
}

#[tokio::test]
async fn test_marker_propagates_into_spawned_task() {
    let router = Arc::new(router(&["rA"]));

    let scope = router.scope();
    let (plain, propagated) = scope
        .replica(async {
            let plain = tokio::spawn(async { RoutingScope::current() });
            let propagated =
                tokio::spawn(RoutingScope::propagate(async { RoutingScope::current() }));
            Ok((plain.await.unwrap(), propagated.await.unwrap()))
        })
        .await
        .unwrap();

    assert_eq!(plain, RouteMarker::Unrouted);
    assert_eq!(propagated.route_name(), REPLICA);
}
