use anyhow::{bail, Context, Result};
use clap::Parser;
use fsprobe::cli::{Cli, Command};
use fsprobe::config::ProbeConfig;
use fsprobe::facade::InterceptingFacade;
use fsprobe::fs::{CreateOptions, FileStatus, FileSystem, LocalFileSystem};
use fsprobe::harness::Harness;
use fsprobe::params::ParamSet;
use fsprobe::path::FsPath;
use fsprobe::runner::ForkedRunner;
use std::io::{self, Write};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber writing to stderr
fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::from_default_env().add_directive(tracing::Level::TRACE.into())
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn resolve_config(cli: &Cli) -> Result<ProbeConfig> {
    let mut config = ProbeConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(enable) = cli.bench_override() {
        config.benchmark.enable = enable;
    }
    if let Some(dir) = &cli.report_dir {
        config.benchmark.report_dir = Some(dir.clone());
    }
    Ok(config)
}

fn format_status(status: &FileStatus) -> String {
    format!(
        "{}{:04o} {:>12} {}",
        if status.is_dir { 'd' } else { '-' },
        status.permission,
        status.len,
        status.path
    )
}

/// Run the hidden `measure` entry point against the raw filesystem
fn run_measure(cli: &Cli, config: &ProbeConfig) -> Result<()> {
    let Command::Measure {
        kind,
        params,
        warmup,
        iterations,
        scratch_dir,
        output,
    } = &cli.command
    else {
        bail!("not a measure command");
    };

    let params = params
        .iter()
        .map(|raw| ParamSet::parse_assignment(raw))
        .collect::<Result<ParamSet, _>>()?;

    let mut options = config.harness_options();
    if let Some(warmup) = warmup {
        options.warmup_iterations = *warmup;
    }
    if let Some(iterations) = iterations {
        options.measurement_iterations = *iterations;
    }
    if let Some(dir) = scratch_dir {
        options.scratch_dir = dir.clone();
    }

    let fs = LocalFileSystem::new(&cli.root);
    let report = Harness::new(&fs, options)
        .run(*kind, &params)
        .with_context(|| format!("Measurement of {kind} failed"))?;
    let json = report.to_json()?;

    match output {
        Some(path) => std::fs::write(path, json)
            .with_context(|| format!("Failed to write report to {}", path.display()))?,
        None => println!("{json}"),
    }
    Ok(())
}

fn run_command(cli: &Cli, config: &ProbeConfig) -> Result<()> {
    let runner = ForkedRunner::current_exe(&cli.root)
        .context("Failed to locate the fsprobe executable")?
        .with_options(config.harness_options())
        .with_timeout(config.timeout())
        .with_report_dir(config.benchmark.report_dir.clone());
    let fs = InterceptingFacade::from_config(LocalFileSystem::new(&cli.root), Arc::new(runner), config);

    let stdout = io::stdout();
    let mut out = stdout.lock();
    match &cli.command {
        Command::Ls { path } => {
            let path = FsPath::from(path.as_str());
            let entries = fs
                .list_status(&path)
                .with_context(|| format!("ls: cannot access '{path}'"))?;
            for status in entries {
                writeln!(out, "{}", format_status(&status))?;
            }
        }
        Command::Stat { path } => {
            let path = FsPath::from(path.as_str());
            let status = fs
                .get_file_status(&path)
                .with_context(|| format!("stat: cannot stat '{path}'"))?;
            writeln!(out, "{}", format_status(&status))?;
        }
        Command::Mv { src, dst } => {
            let (src, dst) = (FsPath::from(src.as_str()), FsPath::from(dst.as_str()));
            if !fs
                .rename(&src, &dst)
                .with_context(|| format!("mv: cannot move '{src}'"))?
            {
                bail!("mv: cannot move '{src}' to '{dst}'");
            }
        }
        Command::Rm { path, recursive } => {
            let path = FsPath::from(path.as_str());
            if !fs
                .delete(&path, *recursive)
                .with_context(|| format!("rm: cannot remove '{path}'"))?
            {
                bail!("rm: '{path}': No such file or directory");
            }
        }
        Command::Touch {
            path,
            content,
            no_overwrite,
            permission,
            buffer_size,
            replication,
            block_size,
        } => {
            let path = FsPath::from(path.as_str());
            let options = CreateOptions {
                permission: *permission,
                overwrite: !no_overwrite,
                buffer_size: *buffer_size,
                replication: *replication,
                block_size: *block_size,
            };
            let mut file = fs
                .create(&path, &options)
                .with_context(|| format!("touch: cannot create '{path}'"))?;
            if let Some(content) = content {
                file.write_all(content.as_bytes())?;
            }
            file.flush()?;
        }
        Command::Cat { path, buffer_size } => {
            let path = FsPath::from(path.as_str());
            let mut input = fs
                .open(&path, *buffer_size)
                .with_context(|| format!("cat: cannot open '{path}'"))?;
            io::copy(&mut input, &mut out)?;
        }
        Command::Put {
            local,
            dst,
            force,
            delete_source,
        } => {
            let dst = FsPath::from(dst.as_str());
            fs.copy_from_local_file(*delete_source, *force, local, &dst)
                .with_context(|| format!("put: cannot copy '{}' to '{dst}'", local.display()))?;
        }
        Command::Measure { .. } => bail!("measure runs without the facade"),
    }
    out.flush()?;

    let stats = fs.stats();
    tracing::debug!(
        calls = stats.calls,
        measured = stats.measured,
        skipped = stats.skipped,
        dispatch_failures = stats.dispatch_failures,
        "facade summary"
    );
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    let config = resolve_config(&cli)?;
    match cli.command {
        Command::Measure { .. } => run_measure(&cli, &config),
        _ => run_command(&cli, &config),
    }
}
