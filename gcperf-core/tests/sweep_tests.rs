//! 扫描集成测试
//!
//! 用 `sh` 脚本模拟被测运行时：脚本把收到的参数追加到 `args.log`，
//! 并按场景输出 GC 日志、内存不足错误、非零退出码或长时间挂起。

#![cfg(unix)]

use std::path::Path;
use std::time::Duration;

use gcperf_core::{
    Analysis, AnalysisError, CollectorType, EngineConfig, ProgressEvent, RankingMetric,
    SweepStatus,
};
use tempfile::TempDir;

const GC_LOG: &str = r#"cat <<'EOF'
[0.010s][info][gc,start    ] GC(0) Pause Young (Allocation Failure)
[0.020s][info][gc,cpu      ] GC(0) User=0.01s Sys=0.00s Real=0.10s
[0.020s][info][gc          ] GC(0) Pause Young (Allocation Failure) 3M->1M(10M) 100.000ms
[1.000s][info][gc,heap,exit] Heap
EOF
"#;

/// 建立工作目录并让运行时指向给定脚本
fn workspace(script_body: &str) -> (TempDir, EngineConfig) {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("bin")).unwrap();
    let script = dir.path().join("fake-runtime.sh");
    let content = format!("#!/bin/sh\necho \"$@\" >> ../args.log\n{script_body}");
    std::fs::write(&script, content).unwrap();

    let mut config = EngineConfig::default();
    config.sweep.runs = 2;
    config.sweep.initial_heap_mb = 64;
    config.sweep.initial_max_heap_mb = 128;
    config.sweep.heap_increment_mb = 32;
    config.sweep.max_heap_increment_mb = 64;
    config.runtime.program = "sh".into();
    config.runtime.prefix_args = vec![script.to_string_lossy().into_owned()];
    config.runtime.work_dir = dir.path().to_path_buf();
    (dir, config)
}

fn recorded_args(dir: &Path) -> Vec<String> {
    std::fs::read_to_string(dir.join("args.log"))
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect()
}

#[tokio::test]
async fn test_successful_sweep_records_every_run() {
    let (dir, mut config) = workspace(GC_LOG);
    config.collectors = vec![CollectorType::Serial, CollectorType::G1];
    config.metrics = vec![RankingMetric::BestGcRuntime, RankingMetric::Latency];

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let report = Analysis::new(config, "App")
        .with_progress(tx)
        .perform()
        .await
        .unwrap();

    assert!(report.is_done());
    assert!(report.is_successful());

    let serial = report.session.get(CollectorType::Serial).unwrap();
    assert_eq!(serial.status, SweepStatus::Completed);
    assert_eq!(serial.outcomes.len(), 2);
    assert_eq!(serial.outcomes[0].heap.initial_mb, 64);
    assert_eq!(serial.outcomes[1].heap.initial_mb, 96);
    assert_eq!(serial.outcomes[1].heap.max_mb, 192);
    assert!((serial.outcomes[0].gc_time - 0.1).abs() < 1e-9);
    assert!((serial.outcomes[0].throughput - 90.0).abs() < 1e-9);
    assert_eq!(serial.outcomes[0].minor_pauses, 1);

    let g1 = report.session.get(CollectorType::G1).unwrap();
    assert!((g1.average_gc_time().unwrap() - 0.1).abs() < 1e-9);

    // 两个指标各胜一次，总分并列时按枚举顺序
    assert_eq!(report.leaderboard.entries[0].score, 3);
    assert_eq!(report.leaderboard.entries[1].score, 3);
    assert_eq!(
        report.leaderboard.ranking(),
        vec![CollectorType::Serial, CollectorType::G1]
    );

    let args = recorded_args(dir.path());
    assert_eq!(args.len(), 4);
    assert!(args[0].starts_with("-Xms64m -Xmx128m -Xlog"));
    assert!(args[0].ends_with("-XX:+UseSerialGC App"));
    assert!(args[3].contains("-XX:+UseG1GC"));

    assert!(dir.path().join("res/out/serial-run1.out").exists());
    assert!(dir.path().join("res/outErr/g1-run2.err").exists());

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    assert_eq!(events.last(), Some(&ProgressEvent::Done));
    let completed = events
        .iter()
        .filter(|e| matches!(e, ProgressEvent::StepCompleted { .. }))
        .count();
    assert_eq!(completed, 4);
}

#[tokio::test]
async fn test_out_of_memory_runs_are_bounded() {
    let (dir, mut config) = workspace(
        "echo 'Exception in thread \"main\" java.lang.OutOfMemoryError: Java heap space' >&2\nexit 1\n",
    );
    config.sweep.runs = 1;
    config.collectors = vec![CollectorType::Parallel];

    let report = Analysis::new(config, "App").perform().await.unwrap();

    assert!(!report.is_successful());
    assert_eq!(
        report.status(CollectorType::Parallel),
        Some(SweepStatus::Suspended)
    );
    assert!(matches!(
        report.failures[0].error,
        AnalysisError::SweepSuspended {
            retryable_failures: 21,
            ..
        }
    ));
    // 请求次数 + 20 次之内停止
    assert_eq!(recorded_args(dir.path()).len(), 21);
    assert!(report.leaderboard.is_empty());
}

#[tokio::test]
async fn test_fatal_failure_does_not_stop_other_collectors() {
    let body = format!(
        "case \"$*\" in\n  *UseSerialGC*) echo 'Error: Could not find or load main class App' >&2; exit 3 ;;\nesac\n{GC_LOG}"
    );
    let (_dir, mut config) = workspace(&body);
    config.collectors = vec![CollectorType::Serial, CollectorType::G1];

    let report = Analysis::new(config, "App").perform().await.unwrap();

    assert_eq!(report.status(CollectorType::Serial), Some(SweepStatus::Failed));
    assert_eq!(report.status(CollectorType::G1), Some(SweepStatus::Completed));
    match &report.failures[0].error {
        AnalysisError::UnexpectedProcessFailure {
            collector,
            exit_code,
            stderr_tail,
        } => {
            assert_eq!(*collector, CollectorType::Serial);
            assert_eq!(*exit_code, Some(3));
            assert!(stderr_tail.contains("main class"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(report.leaderboard.ranking(), vec![CollectorType::G1]);
    assert!(!report.is_successful());
}

#[tokio::test]
async fn test_premature_interrupt_retries_same_heap_size() {
    let body = format!(
        "if [ ! -f ../first-run ]; then\n  touch ../first-run\n  exec sleep 5\nfi\n{GC_LOG}"
    );
    let (dir, mut config) = workspace(&body);
    config.sweep.runs = 1;
    config.collectors = vec![CollectorType::Shenandoah];
    config.watchdog.fallback_deadline = Duration::from_millis(300);

    let report = Analysis::new(config, "App").perform().await.unwrap();

    let shenandoah = report.session.get(CollectorType::Shenandoah).unwrap();
    assert_eq!(shenandoah.status, SweepStatus::Completed);
    assert_eq!(shenandoah.outcomes.len(), 1);
    assert_eq!(shenandoah.outcomes[0].run_no, 2);
    assert_eq!(shenandoah.outcomes[0].heap.initial_mb, 64);
    assert_eq!(shenandoah.retry.premature_interrupts, 1);
    assert_eq!(shenandoah.retry.retryable_failures, 1);
    assert_eq!(shenandoah.retry.magnifier, 1);
    assert!(shenandoah.retry.last_successful_gc_time.is_some());

    let args = recorded_args(dir.path());
    assert_eq!(args.len(), 2);
    assert!(args.iter().all(|a| a.starts_with("-Xms64m -Xmx128m")));
    assert!(args[0].contains("-XX:+UseShenandoahGC"));
}

#[tokio::test]
async fn test_memory_pressure_stall_advances_heap_size() {
    let body = format!(
        "if [ ! -f ../first-run ]; then\n  touch ../first-run\n  \
         echo '[0.1s][info][gc] Trigger: Handle Allocation Failure'\n  \
         echo '[0.2s][info][gc] Trigger: Handle Allocation Failure'\n  \
         echo '[0.3s][info][gc] Trigger: Handle Allocation Failure'\n  \
         exec sleep 5\nfi\n{GC_LOG}"
    );
    let (dir, mut config) = workspace(&body);
    config.sweep.runs = 1;
    config.collectors = vec![CollectorType::Shenandoah];
    config.watchdog.fallback_deadline = Duration::from_millis(300);

    let report = Analysis::new(config, "App").perform().await.unwrap();

    let shenandoah = report.session.get(CollectorType::Shenandoah).unwrap();
    assert_eq!(shenandoah.outcomes.len(), 1);
    assert_eq!(shenandoah.outcomes[0].heap.initial_mb, 96);
    assert_eq!(shenandoah.retry.premature_interrupts, 0);
    assert_eq!(shenandoah.retry.retryable_failures, 1);
    // 之后的成功运行清除了内存压力标记
    assert!(!shenandoah.retry.last_kill_memory_pressure);
    assert_eq!(shenandoah.retry.memory_pressure_kills, 0);

    let args = recorded_args(dir.path());
    assert_eq!(args.len(), 2);
    assert!(args[1].starts_with("-Xms96m -Xmx192m"));
}

#[tokio::test]
async fn test_heap_ceiling_ends_sweep_early() {
    let (dir, mut config) = workspace(GC_LOG);
    config.sweep.runs = 10;
    config.sweep.initial_heap_mb = 2000;
    config.sweep.initial_max_heap_mb = 8000;
    config.sweep.heap_increment_mb = 100;
    config.sweep.max_heap_increment_mb = 100;
    config.collectors = vec![CollectorType::Zgc];

    let report = Analysis::new(config, "App").perform().await.unwrap();

    let zgc = report.session.get(CollectorType::Zgc).unwrap();
    assert_eq!(zgc.outcomes.len(), 3);
    assert!(zgc.outcomes[2].heap.at_ceiling());
    assert_eq!(recorded_args(dir.path()).len(), 3);
}
