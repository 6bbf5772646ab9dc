mod common;

use std::sync::atomic::Ordering;
use std::time::Duration;

use common::{MockDriver, mock_context, pooled_config};
use sql_session::prelude::*;

#[tokio::test(start_paused = true)]
async fn stale_handles_are_closed_and_fresh_ones_kept() -> Result<(), SqlSessionError> {
    let (ctx, state) = mock_context(pooled_config().with_auto_close_minutes(1.0));
    assert!((ctx.auto_close_minutes() - 1.0).abs() < f64::EPSILON);

    let a = ctx.create_and_start().await?;
    let a_guid = a.guid().expect("guid");

    tokio::time::sleep(Duration::from_secs(90)).await;
    let b = ctx.create_and_start().await?;
    let b_guid = b.guid().expect("guid");

    tokio::time::sleep(Duration::from_secs(30)).await;

    assert!(!a.is_open());
    assert!(a.guid().is_none());
    assert!(!ctx.is_handle_open(&a_guid));
    assert!(!ctx.tokens().contains(&a_guid));

    assert!(b.is_open());
    assert!(ctx.is_handle_open(&b_guid));
    assert_eq!(ctx.open_handle_count(), 1);
    assert_eq!(state.releases.load(Ordering::SeqCst), 1);

    // a reaped handle reports through the normal closed path
    assert!(matches!(
        a.query("select 1", ()).await,
        Err(SqlSessionError::NotOpen)
    ));
    b.end().await?;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn zero_minutes_disables_reaping() -> Result<(), SqlSessionError> {
    let (ctx, _state) = mock_context(pooled_config());
    let db = ctx.create_and_start().await?;
    tokio::time::sleep(Duration::from_secs(600)).await;
    assert!(db.is_open());

    ctx.set_auto_close_minutes(f64::NAN)?;
    assert!(ctx.auto_close_minutes().abs() < f64::EPSILON);
    ctx.set_auto_close_minutes(-3.0)?;
    tokio::time::sleep(Duration::from_secs(600)).await;
    assert!(db.is_open());
    db.end().await?;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn reconfiguring_replaces_the_running_reaper() -> Result<(), SqlSessionError> {
    let (ctx, _state) = mock_context(pooled_config().with_auto_close_minutes(1.0));
    ctx.set_auto_close_minutes(5.0)?;

    let db = ctx.create_and_start().await?;
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert!(db.is_open(), "old one-minute reaper must be gone");

    tokio::time::sleep(Duration::from_secs(200)).await;
    assert!(!db.is_open());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn set_config_reconfigures_the_reaper() -> Result<(), SqlSessionError> {
    let (ctx, _state) = mock_context(pooled_config());
    let db = ctx.create_and_start().await?;
    ctx.set_config(pooled_config().with_auto_close_minutes(0.5))?;
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert!(!db.is_open());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn manual_pass_reports_closed_handles() -> Result<(), SqlSessionError> {
    let (ctx, _state) = mock_context(pooled_config().with_debug_traces(true));
    let old = ctx.create_and_start().await?;
    let guid = old.guid().expect("guid");
    let stack = old.start_stack().expect("start stack");
    tokio::time::sleep(Duration::from_secs(120)).await;
    let fresh = ctx.create_and_start().await?;

    let report = ctx.reap_idle(1.0).await;
    assert_eq!(report.inspected, 2);
    assert_eq!(report.closed.len(), 1);
    assert_eq!(report.closed[0].guid, guid);
    assert!(report.closed[0].open_minutes() >= 2.0);
    assert!(fresh.is_open());

    let text = report.summary(true).expect("closed handles are reported");
    assert!(text.contains(&format!("[{guid}] open for 2.00 minutes")));
    assert!(text.contains(&stack));
    assert!(!text.contains(&fresh.guid().expect("guid")));
    assert!(report.summary(false).is_none());

    let quiet = ctx.reap_idle(1.0).await;
    assert!(quiet.closed.is_empty());
    assert_eq!(
        quiet.summary(true).as_deref(),
        Some("1 database connection(s) still open")
    );
    fresh.end().await?;
    Ok(())
}

#[test]
fn enabling_the_reaper_needs_a_runtime() {
    let err = DbContext::new(
        MockDriver::new(),
        pooled_config().with_auto_close_minutes(1.0),
    )
    .unwrap_err();
    assert!(matches!(err, SqlSessionError::Config(_)));

    // disabled reaper needs no runtime
    assert!(DbContext::new(MockDriver::new(), pooled_config()).is_ok());
}
