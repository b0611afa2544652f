use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use disasm_eval::corpus::{check_architecture, evaluate_corpus, CorpusLayout, EvalOptions};
use disasm_eval::decoder::CapstoneDecoder;
use disasm_eval::format::{DiagnosticFormatter, OutputFormat};
use disasm_eval::listing::{build_listing, format_listing, read_listing_input, ListSource};
use disasm_eval::parser::BinaryImage;
use disasm_eval::tools::{default_tools, load_tools, select_tools, ToolSpec};
use disasm_eval::triple::{Triple, SUPPORTED_TRIPLES};
use disasm_eval::Architecture;

/// Score disassembler output against instruction-level ground truth.
///
/// INPUT_DIR holds `bin/<dir>/<file>`, `gt/<dir>/<file>.sqlite` and one
/// directory per tool. Reports go to stdout, logs to stderr.
///
/// With --list, print the instructions of one binary at the addresses in an
/// entry file instead.
#[derive(Parser, Debug)]
#[command(name = "disasm-eval", version, about, long_about = None)]
struct Cli {
    /// Corpus root.
    #[arg(value_name = "INPUT_DIR", required_unless_present_any = ["print_triples", "list"])]
    input_dir: Option<PathBuf>,

    /// Target triple of the binaries.
    #[arg(short = 'l', long, default_value = "x86_64-PC-Linux-GNU-ELF")]
    triple: String,

    /// List every mismatch instead of printing counts.
    #[arg(short = 'e', long, default_value_t = false)]
    errors: bool,

    /// Only evaluate this sub-directory of `bin/`.
    #[arg(long)]
    single_dir: Option<String>,

    /// Only evaluate this binary. Requires --single-dir.
    #[arg(long)]
    single_file: Option<String>,

    /// ISA used to decode mismatches. Defaults to the triple's.
    #[arg(long)]
    resolver_arch: Option<String>,

    /// List the instructions of --binary at the addresses in this file.
    #[arg(long, value_name = "ENTRY_FILE", requires = "binary")]
    list: Option<PathBuf>,

    /// Binary to list.
    #[arg(long, requires = "list")]
    binary: Option<PathBuf>,

    /// Kind of entry file given to --list.
    #[arg(long, value_enum, default_value = "gt")]
    list_type: ListSource,

    /// Print the supported target triples and exit.
    #[arg(long, default_value_t = false)]
    print_triples: bool,

    /// Only evaluate these tools, in this order.
    #[arg(long, value_delimiter = ',')]
    tools: Option<Vec<String>>,

    /// JSON array of tool entries replacing the built-in list.
    #[arg(long)]
    tools_config: Option<PathBuf>,

    /// Report format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Csv)]
    format: OutputFormat,

    /// Subtract this from every reported address, for every tool.
    #[arg(long, allow_hyphen_values = true)]
    address_offset: Option<i64>,

    /// Worker threads (defaults to one per core).
    #[arg(short = 'j', long)]
    jobs: Option<usize>,

    /// Increase log verbosity (-v info, -vv debug).
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn configured_tools(cli: &Cli) -> Result<Vec<ToolSpec>> {
    let tools = match &cli.tools_config {
        Some(path) => load_tools(path).with_context(|| format!("loading tools from {}", path.display()))?,
        None => default_tools(),
    };
    match &cli.tools {
        Some(names) => Ok(select_tools(&tools, names)?),
        None => Ok(tools),
    }
}

fn print_listing(cli: &Cli, entry_file: &Path, binary: &Path, triple: &Triple, resolver_arch: Architecture) -> Result<()> {
    let image = BinaryImage::load(binary).with_context(|| format!("parsing {}", binary.display()))?;
    let label = binary.display().to_string();
    check_architecture(&label, &image, resolver_arch);
    if image.format != triple.object_format() {
        tracing::warn!("{} is {} but the target triple expects {}", label, image.format, triple.object_format());
    }

    let input = read_listing_input(entry_file, cli.list_type)
        .with_context(|| format!("reading addresses from {}", entry_file.display()))?;
    let decoder = CapstoneDecoder::for_architecture(resolver_arch)?;
    let lines = build_listing(&input, &image, &decoder);
    print!("{}", format_listing(&lines));
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if cli.print_triples {
        for triple in SUPPORTED_TRIPLES {
            println!("{triple}");
        }
        return Ok(());
    }
    let triple: Triple = cli.triple.parse().context("invalid --triple")?;
    let resolver_arch = match &cli.resolver_arch {
        Some(name) => match Architecture::from_isa_name(name) {
            Architecture::Unknown => bail!("unknown resolver ISA {name:?}"),
            arch => arch,
        },
        None => triple.architecture(),
    };
    if let (Some(entry_file), Some(binary)) = (cli.list.as_deref(), cli.binary.as_deref()) {
        return print_listing(&cli, entry_file, binary, &triple, resolver_arch);
    }
    let Some(input_dir) = cli.input_dir.as_deref() else {
        bail!("INPUT_DIR is required");
    };

    if cli.single_file.is_some() && cli.single_dir.is_none() {
        tracing::warn!("--single-file is ignored without --single-dir");
    }

    if let Some(jobs) = cli.jobs {
        rayon::ThreadPoolBuilder::new()
            .num_threads(jobs)
            .build_global()
            .context("configuring worker threads")?;
    }

    let tools = configured_tools(&cli)?;
    let layout = CorpusLayout::new(input_dir);
    let targets = layout
        .targets(cli.single_dir.as_deref(), cli.single_file.as_deref())
        .with_context(|| format!("listing binaries under {}", input_dir.display()))?;
    tracing::info!(
        "evaluating {} binaries with {} tools for {}",
        targets.len(),
        tools.len(),
        triple
    );

    let opts = EvalOptions {
        tools: tools.clone(),
        diagnostics: cli.errors,
        resolver_arch,
        expected_format: Some(triple.object_format()),
        address_offset: cli.address_offset,
    };
    let reports = evaluate_corpus(&layout, &targets, &opts);

    let output = if cli.errors {
        DiagnosticFormatter.format(&reports)
    } else {
        cli.format.get_formatter().format(&tools, &reports)?
    };
    print!("{output}");
    Ok(())
}
