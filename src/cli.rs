use std::f32::consts::TAU;
use std::ffi::c_int;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::{debug, info};

use crate::cache::ObjectCache;
use crate::cache::path::cache_root;
use crate::config::{HostConfig, JitOptions, LangStandard, OptLevel};
use crate::dsp::entry_report;
use crate::host::{CompileReport, DspHost, default_source};
use crate::hotswap::Processor;
use crate::jit::JitSession;
use crate::version::VERSION;
use crate::watch::SourceWatcher;
use rtjit_utils::logger;

#[derive(Parser, Debug)]
#[command(name = "rtjit", version = VERSION, about = "Runtime C++ compilation and hot-swap for audio DSP")]
pub struct RtjitCli {
    #[arg(long, global = true)]
    /// Object cache directory (default: platform cache dir or RTJIT_CACHE_DIR).
    cache_dir: Option<PathBuf>,

    #[arg(long, global = true)]
    /// Always compile; never read or write cached objects.
    no_cache: bool,

    #[arg(long = "std", global = true, value_parser = parse_standard)]
    /// C++ language standard (c++14, c++17, c++20).
    standard: Option<LangStandard>,

    #[arg(short = 'I', long = "include", global = true)]
    /// Extra include directory, may be repeated.
    include: Vec<PathBuf>,

    #[arg(long, global = true)]
    /// Compile with -O3 instead of -O2.
    release: bool,

    #[arg(long, global = true)]
    /// Print how long each step took.
    time: bool,

    #[command(subcommand)]
    command: Command,
}

impl RtjitCli {
    pub fn command(&self) -> &Command {
        &self.command
    }

    fn jit_options(&self) -> Result<JitOptions> {
        let mut options = JitOptions::default().apply_env();
        if let Some(standard) = self.standard {
            options.lang_standard = standard;
        }
        options.include_paths.extend(self.include.iter().cloned());
        if self.release {
            options.opt_level = OptLevel::Aggressive;
        }
        options.cache_dir = if self.no_cache {
            None
        } else {
            Some(self.cache_root()?)
        };
        Ok(options)
    }

    fn cache_root(&self) -> Result<PathBuf> {
        match &self.cache_dir {
            Some(dir) => Ok(dir.clone()),
            None => cache_root(),
        }
    }
}

fn parse_standard(value: &str) -> Result<LangStandard, String> {
    value.parse()
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Compiles a source file and lists the functions it defines.
    Check { path: PathBuf },
    /// Compiles a source file and calls `int name(int, int)` in it.
    Call {
        path: PathBuf,
        function: String,
        #[arg(allow_negative_numbers = true)]
        a: i32,
        #[arg(allow_negative_numbers = true)]
        b: i32,
    },
    /// Runs a DSP source on a simulated audio thread.
    Run {
        /// Source relative to the DSP directory (default: local/gain.cc if present).
        path: Option<PathBuf>,
        #[arg(long)]
        /// DSP directory (default: RTJIT_DSP_DIR or the platform data dir).
        dsp_dir: Option<PathBuf>,
        #[arg(long)]
        /// Recompile and hot-swap whenever the source or lib/ changes.
        watch: bool,
        #[arg(long)]
        /// Blocks to process; 0 runs until interrupted (with --watch).
        blocks: Option<u64>,
        #[arg(long, default_value_t = 48_000.0)]
        sample_rate: f64,
        #[arg(long, default_value_t = 256)]
        block_size: u32,
        #[arg(long = "param", value_parser = parse_param)]
        /// Parameter override as index=value, may be repeated.
        params: Vec<(usize, f32)>,
    },
    /// Inspects or clears the object cache.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// Lists cached objects.
    Info {
        #[arg(long)]
        json: bool,
    },
    /// Removes every cached object.
    Clear,
}

fn parse_param(value: &str) -> Result<(usize, f32), String> {
    let (index, value) = value
        .split_once('=')
        .ok_or_else(|| format!("expected index=value, got `{value}`"))?;
    let index = index
        .trim()
        .parse()
        .map_err(|err| format!("invalid parameter index `{index}`: {err}"))?;
    let value = value
        .trim()
        .parse()
        .map_err(|err| format!("invalid parameter value `{value}`: {err}"))?;
    Ok((index, value))
}

pub fn run() -> Result<()> {
    logger::init_logging();
    let cli = RtjitCli::parse();
    match &cli.command {
        Command::Check { path } => handle_check(&cli, path),
        Command::Call {
            path,
            function,
            a,
            b,
        } => handle_call(&cli, path, function, *a, *b),
        Command::Run {
            path,
            dsp_dir,
            watch,
            blocks,
            sample_rate,
            block_size,
            params,
        } => {
            let settings = RunSettings {
                path: path.clone(),
                dsp_dir: dsp_dir.clone(),
                watch: *watch,
                blocks: blocks.unwrap_or(if *watch { 0 } else { 200 }),
                sample_rate: *sample_rate,
                block_size: (*block_size).max(1),
                params: params.clone(),
            };
            handle_run(&cli, settings)
        }
        Command::Cache { action } => handle_cache(&cli, action),
    }
}

fn handle_check(cli: &RtjitCli, path: &Path) -> Result<()> {
    let started = Instant::now();
    let mut session = JitSession::new(cli.jit_options()?)?;
    let origin = session
        .add_module(path)
        .with_context(|| format!("failed to compile {}", path.display()))?;

    println!(
        "{} {} ({})",
        "compiled".green().bold(),
        path.display(),
        origin
    );
    for entry in session.symbols().entries() {
        println!("  {} {}", entry.demangled.bold(), entry.linkable.dimmed());
    }

    println!("{}", "[Entry points]".bold());
    for (kind, presence) in entry_report(&session) {
        let status = match presence {
            Ok(true) => "found".green().to_string(),
            Ok(false) if kind.is_required() => "missing".red().to_string(),
            Ok(false) => "absent".dimmed().to_string(),
            Err(err) => format!("{} {err}", "invalid".red()),
        };
        println!("{:>16}: {status}", kind.to_string());
    }

    if cli.time {
        print_elapsed("check", started);
    }
    Ok(())
}

fn handle_call(cli: &RtjitCli, path: &Path, function: &str, a: i32, b: i32) -> Result<()> {
    let started = Instant::now();
    let mut session = JitSession::new(cli.jit_options()?)?;
    session
        .add_module(path)
        .with_context(|| format!("failed to compile {}", path.display()))?;

    // SAFETY: the user asserts `function` has the `int(int, int)` signature.
    let callee = unsafe { session.lookup_fn::<unsafe extern "C" fn(c_int, c_int) -> c_int>(function) }?;
    // SAFETY: as above; the session outlives the call.
    let result = unsafe { callee(a, b) };
    println!("{function}({a}, {b}) = {}", result.to_string().bold());

    if cli.time {
        print_elapsed("call", started);
    }
    Ok(())
}

struct RunSettings {
    path: Option<PathBuf>,
    dsp_dir: Option<PathBuf>,
    watch: bool,
    blocks: u64,
    sample_rate: f64,
    block_size: u32,
    params: Vec<(usize, f32)>,
}

fn handle_run(cli: &RtjitCli, settings: RunSettings) -> Result<()> {
    let mut config = HostConfig::from_env()?;
    if let Some(dir) = &settings.dsp_dir {
        config.log_file = Some(dir.join("compile.log"));
        config.dsp_dir = dir.clone();
    }
    config.jit = cli.jit_options()?;

    let source = settings
        .path
        .clone()
        .unwrap_or_else(|| default_source(&config.dsp_dir));
    let started = Instant::now();
    let (host, mut processor) = DspHost::start(config, &source)
        .with_context(|| format!("failed to start {}", source.display()))?;
    if cli.time {
        print_elapsed("start", started);
    }
    print_params(&host);

    for &(index, value) in &settings.params {
        if !host.set_param(index, value) {
            bail!("parameter {index} is not declared by {}", source.display());
        }
    }

    if !processor.activate(settings.sample_rate, settings.block_size, settings.block_size) {
        bail!("DSP setup hook rejected the stream configuration");
    }

    if !settings.watch {
        let peak = run_blocks(&mut processor, &settings, None);
        println!("{} {} blocks, peak rms {peak:.4}", "processed".green().bold(), settings.blocks);
        processor.deactivate();
        return Ok(());
    }

    let stop = Arc::new(AtomicBool::new(false));
    let audio = {
        let stop = Arc::clone(&stop);
        let blocks = settings.blocks;
        let sample_rate = settings.sample_rate;
        let block_size = settings.block_size;
        thread::Builder::new()
            .name("rtjit-audio".into())
            .spawn(move || {
                let settings = RunSettings {
                    path: None,
                    dsp_dir: None,
                    watch: true,
                    blocks,
                    sample_rate,
                    block_size,
                    params: Vec::new(),
                };
                run_blocks(&mut processor, &settings, Some(&stop));
                processor.deactivate();
            })
            .context("failed to spawn audio thread")?
    };

    let mut watcher = SourceWatcher::new().context("failed to start file watcher")?;
    watcher.watch_source(&host.selected(), &host.config().lib_dir());
    println!("{} {}", "watching".cyan().bold(), host.selected().display());

    while !audio.is_finished() {
        host.collect_retired();
        let Some(changed) =
            watcher.wait_for_changes(Duration::from_millis(500), Duration::from_millis(150))
        else {
            continue;
        };
        debug!(?changed, "sources changed");
        let started = Instant::now();
        report(&host, host.recompile());
        if cli.time {
            print_elapsed("recompile", started);
        }
    }

    stop.store(true, Ordering::Release);
    audio
        .join()
        .map_err(|_| anyhow!("audio thread panicked"))?;
    host.collect_retired();
    Ok(())
}

/// Feed a stereo sine through `processor`, paced at real time when `stop`
/// is given. Returns the highest per-block output RMS.
fn run_blocks(processor: &mut Processor, settings: &RunSettings, stop: Option<&AtomicBool>) -> f32 {
    let frames = settings.block_size as usize;
    let block_time = Duration::from_secs_f64(frames as f64 / settings.sample_rate);
    let step = 440.0 * TAU / settings.sample_rate as f32;
    let mut phase = 0.0f32;

    let mut input = vec![0.0f32; frames];
    let mut left = vec![0.0f32; frames];
    let mut right = vec![0.0f32; frames];
    let mut peak = 0.0f32;
    let mut block = 0u64;
    let report_every = (settings.sample_rate / frames as f64).max(1.0) as u64;

    loop {
        if settings.blocks != 0 && block >= settings.blocks {
            break;
        }
        if stop.is_some_and(|stop| stop.load(Ordering::Acquire)) {
            break;
        }

        for sample in input.iter_mut() {
            *sample = phase.sin() * 0.5;
            phase = (phase + step) % TAU;
        }
        {
            let inputs: [&[f32]; 2] = [&input, &input];
            let mut outputs: [&mut [f32]; 2] = [&mut left, &mut right];
            processor.process(&inputs, &mut outputs);
        }

        let rms = (left.iter().chain(&right).map(|s| s * s).sum::<f32>() / (2 * frames) as f32).sqrt();
        peak = peak.max(rms);
        block += 1;

        if stop.is_some() {
            if block % report_every == 0 {
                info!(generation = processor.generation(), rms, "audio");
                println!(
                    "{} gen {} rms {rms:.4}",
                    "audio".dimmed(),
                    processor.generation()
                );
            }
            thread::sleep(block_time);
        }
    }
    peak
}

fn report(host: &DspHost, report: CompileReport) {
    match report {
        CompileReport::Staged {
            generation,
            params_changed,
        } => {
            println!("{} generation {generation}", "swapped".green().bold());
            if params_changed {
                print_params(host);
            }
        }
        CompileReport::Superseded { generation } => {
            println!("{} generation {generation}", "superseded".yellow().bold());
        }
        CompileReport::Failed { error, .. } => {
            println!("{} {error}", "error".red().bold());
        }
    }
}

fn print_params(host: &DspHost) {
    let params = host.param_info();
    if params.is_empty() {
        return;
    }
    println!("{}", "[Parameters]".bold());
    for (index, info) in params.iter().enumerate() {
        println!(
            "{index:>4}: {:<16} {} .. {} (default {})",
            info.name, info.min, info.max, info.default
        );
    }
}

fn handle_cache(cli: &RtjitCli, action: &CacheAction) -> Result<()> {
    let cache = ObjectCache::new(cli.cache_root()?)?;
    match action {
        CacheAction::Info { json } => {
            let records = cache.entries()?;
            if *json {
                let report = serde_json::json!({
                    "root": cache.root(),
                    "entries": records,
                });
                println!("{}", serde_json::to_string_pretty(&report)?);
                return Ok(());
            }
            println!("{} {}", "cache".bold(), cache.root().display());
            for record in &records {
                let modified = record
                    .modified_at
                    .map(|time| time.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_else(|| "-".into());
                println!(
                    "  {:<40} {:>8} bytes  {}",
                    record.key, record.object_size, modified
                );
            }
            println!("{} entries", records.len());
        }
        CacheAction::Clear => {
            let removed = cache.clear()?;
            println!("{} {removed} entries", "removed".green().bold());
        }
    }
    Ok(())
}

fn print_elapsed(phase: &str, started: Instant) {
    println!(
        "{:>16}: {:>6.2} ms",
        phase,
        started.elapsed().as_secs_f64() * 1000.0
    );
}
