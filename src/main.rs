//! paper2epub - Academic PDF to EPUB converter

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use paper2epub::{
    ConvertOptions, Converter, DevicePreference, Error, ModelSize, OutputOptions, util,
};

#[derive(Parser)]
#[command(name = "paper2epub")]
#[command(version, about = "Convert academic PDFs to EPUB with LaTeX math support", long_about = None)]
#[command(after_help = "EXAMPLES:
    paper2epub paper.pdf                                Basic conversion
    paper2epub paper.pdf -o out.epub -t \"My Paper\"      Set output and metadata
    paper2epub paper.pdf -m base -d cuda                Larger model on GPU
    paper2epub paper.pdf --save-markdown                Keep the intermediate markdown")]
struct Cli {
    /// Input PDF file
    #[arg(value_name = "PDF_PATH")]
    pdf_path: PathBuf,

    /// Output EPUB file path (default: same as PDF name)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Book title (default: PDF filename)
    #[arg(short, long)]
    title: Option<String>,

    /// Author name (default: guessed from filename)
    #[arg(short, long)]
    author: Option<String>,

    /// Language code
    #[arg(short, long, default_value = "en")]
    language: String,

    /// Model size
    #[arg(short, long, value_enum, default_value_t = ModelArg::Small)]
    model: ModelArg,

    /// Device to use; unknown values fall back to cpu
    #[arg(short, long, default_value = "auto")]
    device: String,

    /// Batch size for page processing
    #[arg(short, long, default_value_t = 1)]
    batch_size: usize,

    /// Save intermediate markdown file next to the PDF
    #[arg(long)]
    save_markdown: bool,

    /// Skip figure extraction from the PDF
    #[arg(long)]
    no_figures: bool,

    /// Minimum figure size in pixels
    #[arg(long, default_value_t = 100)]
    figure_min_size: u32,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum ModelArg {
    Small,
    Base,
}

impl std::fmt::Display for ModelArg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelArg::Small => write!(f, "small"),
            ModelArg::Base => write!(f, "base"),
        }
    }
}

impl From<ModelArg> for ModelSize {
    fn from(arg: ModelArg) -> Self {
        match arg {
            ModelArg::Small => ModelSize::Small,
            ModelArg::Base => ModelSize::Base,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_target(false)
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), Error> {
    println!("paper2epub v{}", env!("CARGO_PKG_VERSION"));
    println!("Converting: {}", cli.pdf_path.display());
    println!();

    let options = ConvertOptions::new()
        .with_model(cli.model.into())
        .with_device(DevicePreference::parse(&cli.device))
        .with_batch_size(cli.batch_size)
        .with_figures(!cli.no_figures)
        .with_figure_min_size(cli.figure_min_size)
        .with_save_markdown(cli.save_markdown);

    let output = OutputOptions {
        output: cli.output,
        title: cli.title,
        author: cli.author,
        language: cli.language,
    };

    let mut converter = Converter::new(options);
    let output_path = converter.convert(&cli.pdf_path, &output)?;

    let size = std::fs::metadata(&output_path)
        .map(|m| util::format_file_size(m.len()))
        .unwrap_or_else(|_| "unknown size".to_string());

    println!();
    println!("Conversion complete!");
    println!("Output: {} ({size})", output_path.display());
    if cli.save_markdown {
        println!("Markdown: {}", cli.pdf_path.with_extension("md").display());
    }

    Ok(())
}
