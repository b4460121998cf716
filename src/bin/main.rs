use blocktree::{
    AutoPrefixConfig, BlockTreeConfig, CompiledAutomaton, DictionaryBuilder, FieldInfo,
    IntersectOptions, TermDictionary,
};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use roaring::RoaringBitmap;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// Build and query block-tree term dictionaries.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a dictionary from input lines, one term per line
    Index {
        /// Base path of the dictionary files
        #[arg(short, long, value_name = "BASE")]
        base: PathBuf,
        /// Input file (defaults to stdin)
        #[arg(long, value_name = "INPUT")]
        input: Option<PathBuf>,
        /// Minimum entries per block
        #[arg(long, value_name = "N", default_value_t = 25)]
        min: usize,
        /// Maximum entries per block
        #[arg(long, value_name = "N", default_value_t = 48)]
        max: usize,
        /// Write auto-prefix terms covering MIN to MAX terms each
        #[arg(long, value_name = "MIN:MAX", value_parser = parse_auto_prefix)]
        auto_prefix: Option<AutoPrefixConfig>,
        /// Field name recorded in the metadata
        #[arg(long, value_name = "NAME", default_value = "body")]
        field: String,
    },
    /// Print the terms matching an anchored regular expression
    Grep {
        /// Base path of the dictionary files
        #[arg(short, long, value_name = "BASE")]
        base: PathBuf,
        /// Regular expression over whole terms
        #[arg(value_name = "PATTERN")]
        pattern: String,
        /// Only print terms strictly after this one
        #[arg(long, value_name = "TERM")]
        start: Option<String>,
        /// Expand auto-prefix terms into the terms they cover
        #[arg(long)]
        no_auto_prefix: bool,
        /// Load every floor chunk instead of skipping unreachable ones
        #[arg(long)]
        no_floor_pruning: bool,
        /// Print the doc frequency next to each term
        #[arg(long)]
        doc_freq: bool,
        /// Stop after this many results
        #[arg(short, long, value_name = "N")]
        limit: Option<usize>,
    },
    /// Print dictionary metadata as JSON
    Stats {
        /// Base path of the dictionary files
        #[arg(short, long, value_name = "BASE")]
        base: PathBuf,
    },
}

fn parse_auto_prefix(s: &str) -> Result<AutoPrefixConfig, String> {
    let (min, max) = s
        .split_once(':')
        .ok_or_else(|| format!("expected MIN:MAX, got '{}'", s))?;
    let min_items_in_prefix = min
        .parse()
        .map_err(|e| format!("invalid minimum '{}': {}", min, e))?;
    let max_items_in_prefix = max
        .parse()
        .map_err(|e| format!("invalid maximum '{}': {}", max, e))?;
    Ok(AutoPrefixConfig {
        min_items_in_prefix,
        max_items_in_prefix,
    })
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Index {
            base,
            input,
            min,
            max,
            auto_prefix,
            field,
        } => {
            let start = Instant::now();
            let reader: Box<dyn BufRead> = match input {
                Some(path) => Box::new(BufReader::new(File::open(path)?)),
                None => Box::new(BufReader::new(io::stdin())),
            };

            let pb = ProgressBar::new_spinner();
            pb.enable_steady_tick(Duration::from_millis(100));
            pb.set_style(ProgressStyle::with_template("{spinner:.green} {pos} lines {msg}")?);

            // Doc id is the line number; repeated terms merge their docs.
            let mut terms: BTreeMap<Vec<u8>, RoaringBitmap> = BTreeMap::new();
            for (doc, line) in reader.lines().enumerate() {
                let line = line?;
                pb.inc(1);
                if line.is_empty() {
                    continue;
                }
                terms
                    .entry(line.into_bytes())
                    .or_default()
                    .insert(doc as u32);
            }
            pb.set_message(format!("writing {} terms", terms.len()));

            let config = BlockTreeConfig {
                min_items_in_block: min,
                max_items_in_block: max,
                auto_prefix,
            };
            let mut builder = DictionaryBuilder::new(&base, FieldInfo::new(field, false), config)?;
            for (term, docs) in &terms {
                builder.insert(term, docs)?;
            }
            let meta = builder.close()?;
            pb.finish_and_clear();
            println!(
                "Indexed {} terms ({} auto-prefix) into {} blocks ({} floor) in {:.2?}",
                meta.term_count,
                meta.auto_prefix_count,
                meta.block_count,
                meta.floor_block_count,
                start.elapsed()
            );
        }
        Commands::Grep {
            base,
            pattern,
            start,
            no_auto_prefix,
            no_floor_pruning,
            doc_freq,
            limit,
        } => {
            let dict = TermDictionary::open(&base)?;
            let automaton = CompiledAutomaton::from_regex(&pattern)?;
            let options = IntersectOptions {
                floor_pruning: !no_floor_pruning,
                allow_auto_prefix: !no_auto_prefix,
            };
            let mut terms = dict.intersect(&automaton, start.as_deref().map(str::as_bytes), options)?;

            let stdout = io::stdout();
            let mut out = stdout.lock();
            let mut printed = 0usize;
            while let Some(term) = terms.next_term()? {
                if limit.is_some_and(|n| printed >= n) {
                    break;
                }
                let mut line = String::from_utf8_lossy(term).into_owned();
                if let Some(range) = terms.auto_prefix_range() {
                    line.push_str(&format!(
                        "*\t[{:02x}-{:02x}]",
                        range.lead_start, range.lead_end
                    ));
                }
                if doc_freq {
                    line.push_str(&format!("\t{}", terms.doc_freq()?));
                }
                writeln!(out, "{}", line)?;
                printed += 1;
            }
        }
        Commands::Stats { base } => {
            let dict = TermDictionary::open(&base)?;
            println!("{}", serde_json::to_string_pretty(dict.meta())?);
        }
    }
    Ok(())
}
