use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{ArgAction, Args as ClapArgs, Parser, Subcommand};
use log::{info, warn};

use baindex::batch::index_files;
use baindex::{
    default_index_path, index_bam_file, read_index_file, write_index_file, BamIndex, BamReader,
    Chunk, IndexConfig, SamHeader,
};

#[derive(Parser, Debug)]
#[command(name = "baindex")]
#[command(about = "Build, inspect and query BAM (.bai) indexes")]
#[command(version)]
struct Args {
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Only report errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Index coordinate-sorted BAM files
    Index(IndexArgs),
    /// Print per-reference counts from an index (like samtools idxstats)
    Stats(StatsArgs),
    /// List the chunks covering a region and count overlapping records
    Query(QueryArgs),
}

#[derive(ClapArgs, Debug)]
struct IndexArgs {
    /// Input BAM files
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Output index (only with a single input; default: <BAM>.bai)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Number of threads (0 = auto, 1 = sequential)
    #[arg(short = 't', long, default_value = "1")]
    threads: usize,

    /// Omit the per-reference metadata pseudo-bin
    #[arg(long)]
    no_metadata: bool,

    /// Omit the trailing count of reads without coordinates
    #[arg(long)]
    no_unmapped_count: bool,

    /// Skip CRC32 checks on BGZF blocks
    #[arg(long)]
    no_verify_crc: bool,
}

#[derive(ClapArgs, Debug)]
struct StatsArgs {
    /// Input BAM file
    bam: PathBuf,

    /// Index file (default: <BAM>.bai)
    #[arg(short, long)]
    index: Option<PathBuf>,
}

#[derive(ClapArgs, Debug)]
struct QueryArgs {
    /// Input BAM file
    bam: PathBuf,

    /// Region as NAME, NAME:START or NAME:START-END (1-based, inclusive)
    region: String,

    /// Index file (default: <BAM>.bai)
    #[arg(short, long)]
    index: Option<PathBuf>,
}

const EXIT_ERROR: u8 = 1;

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(&args);

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(EXIT_ERROR)
        }
    }
}

fn init_logging(args: &Args) {
    let result = stderrlog::new()
        .module(module_path!())
        .quiet(args.quiet)
        .verbosity(1 + usize::from(args.verbose))
        .timestamp(stderrlog::Timestamp::Off)
        .init();
    if let Err(e) = result {
        eprintln!("Warning: logging unavailable: {}", e);
    }
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    match args.command {
        Command::Index(index_args) => run_index(index_args),
        Command::Stats(stats_args) => run_stats(stats_args),
        Command::Query(query_args) => run_query(query_args),
    }
}

fn run_index(args: IndexArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = IndexConfig {
        write_metadata: !args.no_metadata,
        write_unmapped_count: !args.no_unmapped_count,
        verify_crc: !args.no_verify_crc,
        num_threads: args.threads,
        ..Default::default()
    };

    if let Some(output) = &args.output {
        if args.inputs.len() != 1 {
            return Err("--output requires exactly one input".into());
        }
        let start = std::time::Instant::now();
        let (index, stats) = index_bam_file(&args.inputs[0], &config)?;
        write_index_file(output, &index, &config)?;
        info!(
            "wrote {} ({} records, {} chunks) in {:.2?}",
            output.display(),
            stats.records,
            stats.chunks,
            start.elapsed()
        );
        return Ok(());
    }

    let mut failures = 0;
    for outcome in index_files(&args.inputs, &config)? {
        match outcome {
            Ok(outcome) => info!(
                "wrote {} ({} records, {} mapped, {} unmapped)",
                outcome.output.display(),
                outcome.stats.records,
                outcome.stats.mapped,
                outcome.stats.unmapped
            ),
            Err(e) => {
                eprintln!("Error: {}", e);
                failures += 1;
            }
        }
    }
    if failures > 0 {
        return Err(format!("{} of {} inputs failed", failures, args.inputs.len()).into());
    }
    Ok(())
}

/// Read the BAM header and the matching index.
fn load(bam: &Path, index: Option<&Path>) -> Result<(SamHeader, BamIndex), baindex::Error> {
    let header = {
        let file = File::open(bam).map_err(|e| baindex::Error::from(e).with_path(bam))?;
        BamReader::new(BufReader::new(file)).read_header().map_err(|e| e.with_path(bam))?
    };
    let index_path = index.map_or_else(|| default_index_path(bam), Path::to_path_buf);
    let index = read_index_file(&index_path, &header)?;
    Ok((header, index))
}

fn run_stats(args: StatsArgs) -> Result<(), Box<dyn std::error::Error>> {
    let (header, index) = load(&args.bam, args.index.as_deref())?;

    let mut out = BufWriter::new(io::stdout().lock());
    for (sequence, reference) in header.references.iter().zip(index.references()) {
        writeln!(
            out,
            "{}\t{}\t{}\t{}",
            sequence.name,
            sequence.length,
            reference.number_of_aligned_reads(),
            reference.number_of_unaligned_reads()
        )?;
    }
    match index.total_unmapped_reads() {
        Some(count) => writeln!(out, "*\t0\t0\t{}", count)?,
        None => warn!("index has no count of reads without coordinates"),
    }
    out.flush()?;
    Ok(())
}

/// A parsed region: reference index and 0-based half-open interval.
#[derive(Debug, PartialEq, Eq)]
struct Region {
    reference: usize,
    start: u32,
    end: u32,
}

fn parse_region(text: &str, header: &SamHeader) -> Result<Region, String> {
    // Whole-name match first, since names may contain ':'
    if let Some(reference) = header.reference_index(text) {
        let end = header.references[reference].length;
        return Ok(Region { reference, start: 0, end });
    }

    let (name, range) =
        text.rsplit_once(':').ok_or_else(|| format!("unknown reference in region {text:?}"))?;
    let reference =
        header.reference_index(name).ok_or_else(|| format!("unknown reference {name:?}"))?;
    let length = header.references[reference].length;

    let parse = |s: &str| -> Result<u32, String> {
        s.replace(',', "").parse::<u32>().map_err(|_| format!("invalid position {s:?}"))
    };
    let (first, last) = match range.split_once('-') {
        Some((first, last)) => (parse(first)?, parse(last)?),
        None => (parse(range)?, length),
    };
    if first == 0 || last < first {
        return Err(format!("invalid interval in region {text:?}"));
    }
    Ok(Region { reference, start: first - 1, end: last })
}

fn run_query(args: QueryArgs) -> Result<(), Box<dyn std::error::Error>> {
    let (header, index) = load(&args.bam, args.index.as_deref())?;
    let region = parse_region(&args.region, &header)?;
    let chunks = index.query(region.reference, region.start, region.end)?;

    let overlapping = count_overlapping(&args.bam, &header, &region, &chunks)
        .map_err(|e| e.with_path(&args.bam))?;

    let mut out = BufWriter::new(io::stdout().lock());
    for chunk in &chunks {
        writeln!(out, "{}\t{}", chunk.begin(), chunk.end())?;
    }
    writeln!(out, "records\t{}", overlapping)?;
    out.flush()?;
    Ok(())
}

/// Seek to each chunk and count records overlapping the region.
fn count_overlapping(
    bam: &Path,
    header: &SamHeader,
    region: &Region,
    chunks: &[Chunk],
) -> baindex::Result<u64> {
    let mut reader = BamReader::new(BufReader::new(File::open(bam)?));
    let mut count = 0;
    for chunk in chunks {
        reader.seek(chunk.begin())?;
        while reader.virtual_position() < chunk.end() {
            let Some(indexed) = reader.read_record(header)? else {
                break;
            };
            let record = &indexed.record;
            if record.reference_id() != region.reference as i32 {
                continue;
            }
            if let Some((start, end)) = record.alignment_interval() {
                if start < region.end && end > region.start {
                    count += 1;
                }
            }
        }
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use baindex::ReferenceSequence;

    fn header() -> SamHeader {
        SamHeader::from_references(vec![
            ReferenceSequence::new("chr1", 1_000),
            ReferenceSequence::new("HLA-A*01:01", 500),
        ])
    }

    #[test]
    fn test_parse_region() {
        let header = header();
        assert_eq!(
            parse_region("chr1:101-200", &header),
            Ok(Region { reference: 0, start: 100, end: 200 })
        );
        assert_eq!(
            parse_region("chr1:1,000", &header),
            Ok(Region { reference: 0, start: 999, end: 1_000 })
        );
        assert!(parse_region("chr1:1,001-1,000", &header).is_err());
        assert_eq!(
            parse_region("chr1", &header),
            Ok(Region { reference: 0, start: 0, end: 1_000 })
        );
        assert_eq!(
            parse_region("chr1:900", &header),
            Ok(Region { reference: 0, start: 899, end: 1_000 })
        );
        assert_eq!(
            parse_region("HLA-A*01:01", &header),
            Ok(Region { reference: 1, start: 0, end: 500 })
        );
        assert_eq!(
            parse_region("HLA-A*01:01:5-10", &header),
            Ok(Region { reference: 1, start: 4, end: 10 })
        );
        assert!(parse_region("chrZ:1-10", &header).is_err());
        assert!(parse_region("chr1:0-10", &header).is_err());
    }
}
