//! The `weft` command: compile a stylesheet, transform one source document, write the
//! serialized result.

use crate::error::CliError;
use clap::Parser;
use std::io::Write;
use std::path::{Path, PathBuf};
use weft_xslt::{OutputMethod, RecoveryPolicy, Stylesheet, TransformOptions, TransformOutput};

#[derive(Parser, Debug)]
#[command(name = "weft", version, about = "Apply an XSLT 1.0 stylesheet to an XML document")]
pub struct Args {
    /// The stylesheet; imports and includes resolve relative to it.
    pub stylesheet: PathBuf,

    /// The source document.
    pub source: PathBuf,

    /// Write the result here instead of stdout.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Set a global stylesheet parameter. May be repeated; the last value wins.
    #[arg(long = "param", value_name = "NAME=VALUE", value_parser = parse_param)]
    pub params: Vec<(String, String)>,

    /// How to handle recoverable errors: silent, warn or strict.
    #[arg(long)]
    pub recovery: Option<RecoveryPolicy>,

    /// Start in this mode instead of the default one.
    #[arg(long)]
    pub mode: Option<String>,

    /// Output method override: xml, html or text. Other `xsl:output` settings are kept.
    #[arg(long)]
    pub method: Option<OutputMethod>,

    /// JSON file with transform options; flags given on the command line win.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// More logging (-v for debug, -vv for trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

fn parse_param(text: &str) -> Result<(String, String), String> {
    match text.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), value.to_string()))
        }
        _ => Err(CliError::Parameter(text.to_string()).to_string()),
    }
}

impl Args {
    /// The options file, if any, with the command-line flags applied on top.
    pub fn options(&self) -> Result<TransformOptions, CliError> {
        let mut options = match &self.config {
            Some(path) => TransformOptions::from_json(&read(path)?)?,
            None => TransformOptions::default(),
        };
        options.merge_parameters(self.params.iter().cloned());
        if let Some(recovery) = self.recovery {
            options.recovery = recovery;
        }
        if let Some(mode) = &self.mode {
            options.initial_mode = Some(mode.clone());
        }
        Ok(options)
    }

    pub fn log_filter(&self) -> log::LevelFilter {
        match self.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    }
}

fn read(path: &Path) -> Result<String, CliError> {
    std::fs::read_to_string(path).map_err(|source| CliError::Read {
        path: path.to_path_buf(),
        source,
    })
}

/// Runs one transformation as described by `args`.
pub fn transform(args: &Args) -> Result<TransformOutput, CliError> {
    let mut options = args.options()?;
    log::debug!("compiling {}", args.stylesheet.display());
    let stylesheet = Stylesheet::compile_file(&args.stylesheet).map_err(|err| match err {
        weft_xslt::XsltError::Io(source) => CliError::Read {
            path: args.stylesheet.clone(),
            source,
        },
        other => CliError::Transform(other),
    })?;
    if let Some(method) = args.method {
        let output = options
            .output
            .get_or_insert_with(|| stylesheet.compiled().output.clone());
        output.method = Some(method);
    }
    let source = read(&args.source)?;
    let result = stylesheet.transform(&source, &options)?;
    for diagnostic in &result.diagnostics {
        log::debug!("{:?}: {}", diagnostic.kind, diagnostic.message);
    }
    Ok(result)
}

/// Transforms and writes the result to the output file or stdout.
pub fn run(args: &Args) -> Result<(), CliError> {
    let result = transform(args)?;
    match &args.output {
        Some(path) => std::fs::write(path, &result.output).map_err(|source| CliError::Write {
            path: path.clone(),
            source,
        }),
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout
                .write_all(result.output.as_bytes())
                .and_then(|_| stdout.flush())
                .map_err(|source| CliError::Write {
                    path: PathBuf::from("<stdout>"),
                    source,
                })
        }
    }
}
