use clap::{Arg, ArgAction, Command};
use std::path::PathBuf;

use gcperf_cli::{
    GcPerfConfig, GcPerfDriver, LeaderboardReporter, RankingStore, ReportFormat,
    SqliteRankingStore,
};
use gcperf_core::{CollectorType, RankingMetric};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let matches = Command::new("gcperf")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Benchmark JVM garbage collectors against a program and rank them")
        .arg(
            Arg::new("file")
                .value_name("FILE")
                .help("Program to benchmark (.class or .jar)")
                .required_unless_present("history"),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path (TOML or JSON)"),
        )
        .arg(
            Arg::new("runs")
                .short('n')
                .long("runs")
                .value_name("NUM")
                .help("Number of runs per collector (1-100)"),
        )
        .arg(
            Arg::new("xms")
                .long("xms")
                .value_name("MB")
                .help("Initial heap size in MB (1-2048)"),
        )
        .arg(
            Arg::new("xmx")
                .long("xmx")
                .value_name("MB")
                .help("Initial maximum heap size in MB (16-8192)"),
        )
        .arg(
            Arg::new("xms-increment")
                .long("xms-increment")
                .value_name("MB")
                .help("Initial heap size increment per run in MB"),
        )
        .arg(
            Arg::new("xmx-increment")
                .long("xmx-increment")
                .value_name("MB")
                .help("Maximum heap size increment per run in MB"),
        )
        .arg(
            Arg::new("collectors")
                .short('g')
                .long("collectors")
                .value_name("LIST")
                .help("Comma separated collectors (serial, parallel, g1, zgc, shenandoah)"),
        )
        .arg(
            Arg::new("metrics")
                .short('m')
                .long("metrics")
                .value_name("LIST")
                .help("Comma separated ranking metrics (BestGCRuntime, AvgGCRuntime, Throughput, Latency, MinorPauses, FullPauses)"),
        )
        .arg(
            Arg::new("csv")
                .long("csv")
                .help("Export per-run results to a CSV file")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("plot")
                .long("plot")
                .help("Render runtime and throughput charts")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("database")
                .short('d')
                .long("database")
                .value_name("FILE")
                .help("Ranking database file path"),
        )
        .arg(
            Arg::new("work-dir")
                .short('w')
                .long("work-dir")
                .value_name("DIR")
                .help("Working directory for binaries and captured output"),
        )
        .arg(
            Arg::new("runtime")
                .long("runtime")
                .value_name("PROGRAM")
                .help("Java runtime executable"),
        )
        .arg(
            Arg::new("format")
                .short('f')
                .long("format")
                .value_name("FORMAT")
                .help("Report format (text, json, markdown)"),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("FILE")
                .help("Write the report to a file instead of stdout"),
        )
        .arg(
            Arg::new("history")
                .long("history")
                .help("Print stored rankings and exit")
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    // Load configuration
    let mut config = match matches.get_one::<String>("config") {
        Some(path) => GcPerfConfig::from_file(&PathBuf::from(path))?,
        None => GcPerfConfig::default(),
    };

    // Override config with command line arguments
    let parse_mb = |name: &str| -> anyhow::Result<Option<u32>> {
        matches
            .get_one::<String>(name)
            .map(|s| {
                s.parse::<u32>()
                    .map_err(|e| anyhow::anyhow!("Invalid value for --{name}: {e}"))
            })
            .transpose()
    };
    if let Some(runs) = parse_mb("runs")? {
        config.engine.sweep.runs = runs;
    }
    if let Some(xms) = parse_mb("xms")? {
        config.engine.sweep.initial_heap_mb = xms;
    }
    if let Some(xmx) = parse_mb("xmx")? {
        config.engine.sweep.initial_max_heap_mb = xmx;
    }
    if let Some(inc) = parse_mb("xms-increment")? {
        config.engine.sweep.heap_increment_mb = inc;
    }
    if let Some(inc) = parse_mb("xmx-increment")? {
        config.engine.sweep.max_heap_increment_mb = inc;
    }
    if let Some(list) = matches.get_one::<String>("collectors") {
        config.engine.collectors = list
            .split(',')
            .map(|s| s.trim().parse::<CollectorType>())
            .collect::<Result<Vec<_>, _>>()?;
    }
    if let Some(list) = matches.get_one::<String>("metrics") {
        config.engine.metrics = list
            .split(',')
            .map(|s| s.trim().parse::<RankingMetric>())
            .collect::<Result<Vec<_>, _>>()?;
    }
    if let Some(path) = matches.get_one::<String>("database") {
        config.database_path = PathBuf::from(path);
    }
    if let Some(dir) = matches.get_one::<String>("work-dir") {
        config.engine.runtime.work_dir = PathBuf::from(dir);
    }
    if let Some(program) = matches.get_one::<String>("runtime") {
        config.engine.runtime.program = PathBuf::from(program);
    }
    if let Some(format) = matches.get_one::<String>("format") {
        config.format = format.parse::<ReportFormat>()?;
    }
    config.export_csv |= matches.get_flag("csv");
    config.plot |= matches.get_flag("plot");

    let database_path = config.database_file();
    if let Some(parent) = database_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let store = SqliteRankingStore::open(&database_path)?;

    if matches.get_flag("history") {
        let records = store.query_rankings()?;
        if records.is_empty() {
            println!("No stored rankings in {}", database_path.display());
        }
        for record in records {
            let ranking = record
                .leaderboard()
                .iter()
                .map(|c| c.to_string())
                .collect::<Vec<_>>()
                .join(" > ");
            println!(
                "#{} {} {}: {}",
                record.id,
                record.created_at.format("%Y-%m-%d %H:%M:%S"),
                record.file_name,
                ranking
            );
        }
        return Ok(());
    }

    let file = matches
        .get_one::<String>("file")
        .map(PathBuf::from)
        .ok_or_else(|| anyhow::anyhow!("A .class or .jar file is required"))?;

    println!("GC Performance Analysis");
    println!("=======================");
    println!("File: {}", file.display());
    println!("Runs: {}", config.engine.sweep.runs);
    println!(
        "Heap: -Xms{}m -Xmx{}m (+{}m / +{}m per run)",
        config.engine.sweep.initial_heap_mb,
        config.engine.sweep.initial_max_heap_mb,
        config.engine.sweep.heap_increment_mb,
        config.engine.sweep.max_heap_increment_mb
    );
    println!("Database: {}", database_path.display());
    println!();

    let format = config.format;
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            println!("{event}");
        }
    });

    let driver = GcPerfDriver::new(config, store);
    let output = driver.launch(&file, Some(tx)).await;
    // 发送端随分析一起释放，打印任务在通道关闭后结束
    printer.await?;
    let output = output?;

    println!();
    for line in &output.result_lines {
        println!("{line}");
    }
    if let Some(path) = &output.csv_path {
        println!("CSV exported to: {}", path.display());
    }
    for chart in &output.charts {
        println!("Chart saved to: {}", chart.display());
    }
    println!();

    let reporter = LeaderboardReporter::new(format);
    let summary = output.summary();
    match matches.get_one::<String>("output") {
        Some(path) => {
            reporter.save_report(&summary, &PathBuf::from(path))?;
            println!("Report saved to: {path}");
        }
        None => println!("{}", reporter.generate_report(&summary)?),
    }

    Ok(())
}
