use anyhow::Result;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use mixscan::{
    csv_reader, fasta, marker::FastaMixtureMarker, output, regions, scan, statistics,
    types::validate_sample_id, vcf_parser::TagStrategy,
};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Parser)]
#[command(name = "mixscan")]
#[command(version)]
#[command(about = "Detect mixed genomic sequences from allele depths at lineage-defining positions", long_about = None)]
struct Args {
    /// Input VCF file (can be gzipped)
    #[arg(short, long, required_unless_present_any = ["stats_from", "mark_from"])]
    input: Option<PathBuf>,

    /// Lineage-definition CSV (columns: lineage, position)
    #[arg(short, long, requires = "input")]
    lineages: Option<PathBuf>,

    /// Exclusion-list CSV of positions never to call (column: pos)
    #[arg(long, requires = "lineages")]
    exclude: Option<PathBuf>,

    /// Sample identifier keying persisted tables (max 36 chars, filename-safe)
    #[arg(short, long)]
    sample_id: Option<String>,

    /// Output CSV for the per-position base-call table
    #[arg(long)]
    bases_out: Option<PathBuf>,

    /// Output CSV for the per-region summary table
    #[arg(long)]
    stats_out: Option<PathBuf>,

    /// Expected per-base background error rate
    #[arg(long, default_value = "0.001")]
    error_rate: f64,

    /// Info tag holding the four per-base depths; "AD" selects the
    /// reference-first allele-depth convention, "auto" detects
    #[arg(long, default_value = "BaseCounts4")]
    info_tag: String,

    /// Minimum minor-allele frequency to report
    #[arg(long, default_value = "0")]
    min_maf: f64,

    /// Skip the per-position binomial significance test
    #[arg(long)]
    no_pvalue: bool,

    /// Recompute F statistics from an existing region-summary CSV (skips scanning)
    #[arg(long, conflicts_with = "input")]
    stats_from: Option<PathBuf>,

    /// Mark a consensus FASTA from an existing base-call CSV (skips scanning)
    #[arg(long, conflicts_with_all = ["input", "stats_from"])]
    mark_from: Option<PathBuf>,

    /// Consensus FASTA to annotate (required with --mark-from)
    #[arg(long, requires = "mark_from")]
    fasta: Option<PathBuf>,

    /// Output path for the marked FASTA
    #[arg(long, requires = "mark_from")]
    marked_out: Option<PathBuf>,

    /// Output CSV for the accepted mixed-base calls
    #[arg(long, requires = "mark_from")]
    calls_out: Option<PathBuf>,

    /// Minus-log-p cutoff for mixed-base selection
    #[arg(long, default_value = "6.65")]
    mlp_cutoff: f64,

    /// Call bases N, not mixed, if within this distance of another mixed base
    #[arg(long)]
    clustering_cutoff: Option<usize>,

    /// Suppress progress output
    #[arg(short, long)]
    quiet: bool,
}

macro_rules! progress {
    ($quiet:expr) => {
        if !$quiet {
            eprintln!();
        }
    };
    ($quiet:expr, $($arg:tt)*) => {
        if !$quiet {
            eprintln!($($arg)*);
        }
    };
}

fn make_spinner(quiet: bool, message: &'static str) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::with_template("  {spinner} [{elapsed_precise}] {msg}").unwrap());
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();

    if let Some(ref sample_id) = args.sample_id {
        validate_sample_id(sample_id)?;
    }

    // ─── Path C: mark a consensus from a persisted base-call table ───
    if let Some(ref bases_csv) = args.mark_from {
        return run_mark(&args, bases_csv);
    }

    // ─── Path B: F statistics from a persisted region summary ───
    if let Some(ref stats_csv) = args.stats_from {
        let summaries = csv_reader::load_region_stats(stats_csv)?;
        progress!(args.quiet, "Loaded {} region summaries from {}", summaries.len(), stats_csv.display());
        report_f_statistics(&args, &statistics::f_statistics(&summaries));
        return Ok(());
    }

    // ─── Path A: scan a VCF ───
    let input = args.input.as_ref().unwrap();
    if !input.exists() {
        anyhow::bail!("Input file not found: {}", input.display());
    }
    let lineages = args
        .lineages
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("--lineages is required when scanning"))?;

    progress!(args.quiet, "mixscan");
    progress!(args.quiet, "=========================================");
    progress!(args.quiet, "Input VCF: {}", input.display());
    progress!(args.quiet, "Lineage definitions: {}", lineages.display());
    progress!(args.quiet, "Error rate: {}", args.error_rate);
    progress!(args.quiet, "Depth tag: {}", args.info_tag);
    progress!(args.quiet, "Min maf: {}", args.min_maf);
    progress!(args.quiet, "Significance testing: {}", if args.no_pvalue { "disabled" } else { "enabled" });
    progress!(args.quiet);

    progress!(args.quiet, "Step 1: Loading lineage-defining positions...");
    let definitions = regions::load_lineage_definitions(lineages)?;
    let excluded = match &args.exclude {
        Some(path) => regions::load_exclusions(path)?,
        None => Default::default(),
    };
    let index = regions::lineage_region_index(&definitions, &excluded)?;
    progress!(
        args.quiet,
        "  {} lineages over {} positions ({} excluded)",
        index.num_regions(),
        index.num_positions(),
        excluded.len()
    );

    progress!(args.quiet);
    progress!(args.quiet, "Step 2: Scanning...");
    let config = scan::ScanConfig {
        expected_error_rate: args.error_rate,
        tag: TagStrategy::from_tag_name(&args.info_tag),
        report_minimum_maf: args.min_maf,
        compute_pvalue: !args.no_pvalue,
        quiet: args.quiet,
    };
    let mut scanner = scan::VcfScanner::new(index, config)?;
    let pb = make_spinner(args.quiet, "scanning variant records");
    let result = scanner.scan(input)?;
    pb.finish_and_clear();

    if !result.complete {
        anyhow::bail!(
            "Scan of {} did not complete: the stream appears truncated or corrupt",
            input.display()
        );
    }
    progress!(args.quiet, "  {} base calls reported", result.bases.len());

    if let Some(ref bases_out) = args.bases_out {
        output::write_base_calls(&result.bases, bases_out)?;
        progress!(args.quiet, "  Base-call table written to: {}", bases_out.display());
    }

    let Some(summaries) = result.region_stats else {
        progress!(args.quiet);
        progress!(args.quiet, "No positions matched; no region summaries to report.");
        return Ok(());
    };

    if let Some(ref stats_out) = args.stats_out {
        output::write_region_stats(&summaries, args.sample_id.as_deref(), stats_out)?;
        progress!(args.quiet, "  Region summary written to: {}", stats_out.display());
    }

    progress!(args.quiet);
    progress!(args.quiet, "Step 3: Computing F statistics...");
    report_f_statistics(&args, &statistics::f_statistics(&summaries));

    Ok(())
}

/// Mark-from-CSV mode: read a persisted base-call table and a consensus
/// FASTA, write the annotated FASTA and the accepted-call table.
fn run_mark(args: &Args, bases_csv: &Path) -> Result<()> {
    let fasta_in = args
        .fasta
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("--fasta is required with --mark-from"))?;
    let marked_out = args
        .marked_out
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("--marked-out is required with --mark-from"))?;

    progress!(args.quiet, "mixscan (mark consensus from base-call table)");
    progress!(args.quiet, "=========================================");
    progress!(args.quiet, "Base calls: {}", bases_csv.display());
    progress!(args.quiet, "Consensus: {}", fasta_in.display());
    progress!(args.quiet, "mlp cutoff: {}", args.mlp_cutoff);
    if let Some(cutoff) = args.clustering_cutoff {
        progress!(args.quiet, "Clustering cutoff: {} bp", cutoff);
    }
    progress!(args.quiet);

    let rows = csv_reader::load_base_calls(bases_csv)?;
    let (seq_id, mut seq) = fasta::read_consensus(fasta_in)?;
    progress!(
        args.quiet,
        "Loaded {} candidate rows and a {} nt consensus ({})",
        rows.len(),
        seq.len(),
        seq_id
    );

    let mut marker = FastaMixtureMarker::new(
        args.error_rate,
        args.mlp_cutoff,
        args.min_maf,
        args.clustering_cutoff,
    )?;
    let calls = marker.mark_mixed(&mut seq, &rows)?;

    fasta::write_fasta(marked_out, &seq_id, &seq)?;
    progress!(args.quiet, "Marked consensus written to: {}", marked_out.display());

    if let Some(ref calls_out) = args.calls_out {
        let mut wtr = csv::Writer::from_path(calls_out)?;
        wtr.write_record(["pos", "base"])?;
        for call in &calls {
            wtr.write_record([call.pos.to_string(), (call.base as char).to_string()])?;
        }
        wtr.flush()?;
        progress!(args.quiet, "{} accepted calls written to: {}", calls.len(), calls_out.display());
    } else {
        progress!(args.quiet, "{} mixed bases accepted", calls.len());
    }

    Ok(())
}

fn report_f_statistics(args: &Args, fs: &mixscan::types::FStatistics) {
    progress!(args.quiet, "  Mixture quality: {}", fs.mixture_quality);
    let fmt = |v: Option<f64>| v.map_or("NA".to_string(), |v| format!("{:.6}", v));
    println!("mixture_quality\t{}", fs.mixture_quality);
    println!("F2\t{}", fmt(fs.f2));
    println!("F47\t{}", fmt(fs.f47));
}
