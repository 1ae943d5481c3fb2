// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Exec scenarios: streams, exit classification, timeout and abort.

use mux_runtime::{ExecExit, ExecOptions, Runtime};
use std::time::{Duration, Instant};
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;

fn local() -> mux_runtime::local::LocalRuntime {
    mux_runtime::local::LocalRuntime::new(std::env::temp_dir())
}

#[tokio::test]
async fn nonzero_exit_with_stderr_reporting() {
    let runtime = local();
    let mut stream = runtime
        .exec("echo err 1>&2; exit 7", ExecOptions::new("/tmp").timeout_secs(5.0))
        .await
        .unwrap();
    stream.stdin.close().await;

    let mut stdout = String::new();
    stream.stdout.read_to_string(&mut stdout).await.unwrap();
    let mut stderr = String::new();
    stream.stderr.read_to_string(&mut stderr).await.unwrap();

    assert_eq!(stdout, "");
    assert_eq!(stderr, "err\n");
    assert_eq!(stream.outcome.exit().await.unwrap(), ExecExit::Code(7));
}

#[tokio::test]
async fn timeout_kills_within_three_seconds() {
    let runtime = local();
    let started = Instant::now();

    let stream =
        runtime.exec("sleep 30", ExecOptions::new("/").timeout_secs(1.0)).await.unwrap();
    let exit = stream.outcome.exit().await.unwrap();

    assert_eq!(exit, ExecExit::Timeout);
    assert!(
        started.elapsed() <= Duration::from_secs(3),
        "timeout took {:?}",
        started.elapsed()
    );
}

#[tokio::test]
async fn pre_signalled_abort_never_spawns() {
    let runtime = local();
    let token = CancellationToken::new();
    token.cancel();

    let error = runtime
        .exec("echo never", ExecOptions::new("/tmp").cancel(token))
        .await
        .unwrap_err();
    assert_eq!(error.class(), mux_core::ErrorClass::Exec);
    assert!(error.to_string().contains("aborted before execution"));
}

#[tokio::test]
async fn mid_run_abort_resolves_the_sentinel() {
    let runtime = local();
    let token = CancellationToken::new();
    let stream = runtime
        .exec("sleep 30", ExecOptions::new("/").cancel(token.clone()))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    token.cancel();

    let started = Instant::now();
    assert_eq!(stream.outcome.exit().await.unwrap(), ExecExit::Aborted);
    assert!(started.elapsed() < Duration::from_secs(3));
}

#[tokio::test]
async fn duration_resolves_with_the_exit() {
    let runtime = local();
    let stream = runtime.exec("true", ExecOptions::new("/tmp")).await.unwrap();
    stream.stdin.close().await;

    let exit = stream.outcome.exit().await.unwrap();
    let duration = stream.outcome.duration().await.unwrap();
    assert_eq!(exit, ExecExit::Code(0));
    assert!(duration > Duration::ZERO);
}
