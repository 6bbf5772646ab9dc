mod common;

use std::sync::atomic::Ordering;
use std::time::Duration;

use common::{mock_context, params, pooled_config};
use sql_session::pool::slow_acquisition_report;
use sql_session::prelude::*;

#[tokio::test]
async fn identical_params_share_one_pool() -> Result<(), SqlSessionError> {
    let (ctx, state) = mock_context(pooled_config());
    let a = ctx.create_and_start().await?;
    let b = ctx.create_and_start().await?;
    assert_eq!(state.pools_created.load(Ordering::SeqCst), 1);
    assert_eq!(state.leases.load(Ordering::SeqCst), 2);

    let limited = ConnectionConfig::new(params("main").with_connection_limit(5)).with_pool(true);
    let c = ctx.create_and_start_with_config(limited).await?;
    assert_eq!(state.pools_created.load(Ordering::SeqCst), 2);
    assert_eq!(ctx.pools().len(), 2);

    for handle in [a, b, c] {
        handle.end().await?;
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_starts_create_a_single_pool() -> Result<(), SqlSessionError> {
    let (ctx, state) = mock_context(pooled_config());
    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let ctx = ctx.clone();
            tokio::spawn(async move { ctx.create_and_start().await })
        })
        .collect();

    let mut guids = std::collections::HashSet::new();
    for task in tasks {
        let handle = task.await.expect("task panicked")?;
        assert!(guids.insert(handle.guid().expect("guid")));
    }
    assert_eq!(state.pools_created.load(Ordering::SeqCst), 1);
    assert_eq!(ctx.open_handle_count(), 16);
    assert_eq!(ctx.close_all().await, 16);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn slow_pool_creation_does_not_block_other_configs() -> Result<(), SqlSessionError> {
    let (ctx, state) = mock_context(pooled_config());
    state.set_create_delay("slow", Duration::from_secs(60));

    let slow_ctx = ctx.clone();
    let slow = tokio::spawn(async move {
        slow_ctx
            .create_and_start_with_config(ConnectionConfig::new(params("slow")).with_pool(true))
            .await
    });
    tokio::task::yield_now().await;
    assert!(!ctx.pools().contains(&params("slow")));

    let fast = tokio::time::timeout(Duration::from_secs(1), ctx.create_and_start())
        .await
        .expect("lookup for another config waited on the slow creation")?;
    assert!(fast.is_open());
    assert_eq!(ctx.pools().len(), 1);

    let slow = slow.await.expect("task panicked")?;
    assert!(slow.is_open());
    assert_eq!(ctx.pools().len(), 2);
    assert_eq!(state.pools_created.load(Ordering::SeqCst), 2);
    Ok(())
}

#[tokio::test]
async fn close_pool_reports_whether_one_existed() -> Result<(), SqlSessionError> {
    let (ctx, state) = mock_context(pooled_config());
    let db = ctx.create_and_start().await?;
    db.end().await?;

    assert!(ctx.close_pool(&params("main")).await?);
    assert!(!ctx.close_pool(&params("main")).await?);
    assert!(!ctx.close_pool(&params("other")).await?);
    assert_eq!(state.pools_ended.load(Ordering::SeqCst), 1);

    // a later start builds a new pool
    let db = ctx.create_and_start().await?;
    assert_eq!(state.pools_created.load(Ordering::SeqCst), 2);
    db.end().await?;
    assert!(ctx.close_default_pool().await?);
    Ok(())
}

#[tokio::test]
async fn close_all_pools_ends_everything() -> Result<(), SqlSessionError> {
    let (ctx, state) = mock_context(pooled_config());
    ctx.create_and_start().await?.end().await?;
    ctx.create_and_start_with_config(ConnectionConfig::new(params("second")).with_pool(true))
        .await?
        .end()
        .await?;
    assert_eq!(ctx.close_all_pools().await?, 2);
    assert_eq!(state.pools_ended.load(Ordering::SeqCst), 2);
    assert!(ctx.pools().is_empty());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn slow_acquisition_still_succeeds() -> Result<(), SqlSessionError> {
    let (ctx, state) = mock_context(pooled_config().with_pool_timeout_secs(30));
    state.set_acquire_delay(Duration::from_secs(45));

    let started = tokio::time::Instant::now();
    let db = ctx.create_and_start().await?;
    assert!(started.elapsed() >= Duration::from_secs(45));
    assert!(db.is_open());
    db.end().await?;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn slow_acquisition_with_traces_still_succeeds() -> Result<(), SqlSessionError> {
    let config = pooled_config()
        .with_pool_timeout_secs(1)
        .with_connection_left_open_trace(true);
    let (ctx, state) = mock_context(config);
    let holder = ctx.create_and_start().await?;
    let stack = holder.start_stack().expect("start stack");
    assert!(!stack.is_empty());

    state.set_acquire_delay(Duration::from_secs(5));
    let db = ctx.create_and_start().await?;
    assert!(db.is_open());

    let open = ctx.open_handles();
    let timeout = ctx.config().pool_timeout();
    let text = slow_acquisition_report(&open, timeout, true);
    assert!(text.contains("within 1s; 2 connection handle(s) open"));
    assert!(text.contains(&format!("[{}]", holder.guid().expect("guid"))));
    assert!(text.contains(&stack));

    let brief = slow_acquisition_report(&open, timeout, false);
    assert!(brief.contains("2 connection handle(s) open"));
    assert!(!brief.contains(&holder.guid().expect("guid")));
    ctx.close_all().await;
    Ok(())
}

#[tokio::test]
async fn failed_acquisition_leaves_handle_closed() {
    let (ctx, state) = mock_context(pooled_config());
    state.set_fail_acquire(true);

    let db = ctx.handle();
    let err = db.start().await.unwrap_err();
    match err {
        SqlSessionError::Acquisition(msg) => assert!(msg.contains("pool exhausted")),
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(db.state(), HandleState::Closed);
    assert!(db.guid().is_none());
    assert_eq!(ctx.open_handle_count(), 0);
    assert!(ctx.tokens().is_empty());

    state.set_fail_acquire(false);
    db.start().await.expect("retry succeeds");
    assert!(db.is_open());
}
