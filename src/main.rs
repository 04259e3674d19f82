use std::{
    fs,
    io::{self, Read, Write},
    path::{Path, PathBuf},
    process,
};

use clap::{Parser, Subcommand};

use docview::config::{self, SourceArgs};
use docview::source::DocumentSource;
use docview::{serve, toc, view};

/// Explicit subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Serve the listing and document pages over HTTP
    Serve {
        #[command(flatten)]
        source: SourceArgs,
        /// Interface address to bind to
        #[arg(long, default_value = "127.0.0.1")]
        bind: String,
        /// Starting port number for the HTTP server
        #[arg(long, default_value = "3333")]
        port: u16,
    },
    /// Browse documents in the terminal
    View {
        /// Slug of the document to open first
        slug: Option<String>,
        #[command(flatten)]
        source: SourceArgs,
    },
    /// Print the table of contents of a local markdown file
    Toc {
        /// Path to the markdown file (`-` reads stdin)
        file: PathBuf,
        /// Print heading source lines instead of JSON
        #[arg(long)]
        markdown: bool,
    },
}

#[derive(Parser)]
#[command(
    name = "docview",
    version,
    about = "A document archive viewer with generated, scroll-synced tables of contents"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Resolve the document source or exit with status 2.
fn open_source(args: &SourceArgs) -> io::Result<DocumentSource> {
    let config = args.resolve().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        process::exit(2);
    });
    DocumentSource::from_config(&config).map_err(io::Error::other)
}

fn run_toc(file: &Path, markdown: bool) -> io::Result<()> {
    let text = if file.as_os_str() == "-" {
        let mut buf = String::new();
        io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        fs::read_to_string(file).map_err(|e| {
            io::Error::new(e.kind(), format!("{}: {e}", file.display()))
        })?
    };

    let headings = toc::extract(&text);
    log::debug!("[toc] file={} headings={}", file.display(), headings.len());

    let mut out = io::stdout().lock();
    if markdown {
        out.write_all(toc::to_source_text(&headings).as_bytes())?;
    } else {
        serde_json::to_writer_pretty(&mut out, &headings).map_err(io::Error::other)?;
        writeln!(out)?;
    }
    Ok(())
}

fn main() -> io::Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Serve { source, bind, port } => {
            config::init_logging("info");
            let source = open_source(&source)?;
            let rt = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?;
            rt.block_on(serve::run_serve(source, &bind, port))
        }
        Commands::View { slug, source } => {
            // The terminal owns the screen; log to a file instead of stderr.
            config::init_file_logging("warn", &config::view_log_path());
            let source = open_source(&source)?;
            view::run_view(source, slug)
        }
        Commands::Toc { file, markdown } => {
            config::init_logging("warn");
            run_toc(&file, markdown)
        }
    }
}
