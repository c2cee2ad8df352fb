use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use log::{error, info, warn};

use mdict_bundle::MdictReader;
use mdict_bundle::bundle::{self, BundleAssets};
use mdict_bundle::convert::{self, ConvertOptions};

/// Convert an MDict dictionary (.mdx) into a lookup bundle.
#[derive(Debug, Parser)]
#[command(name = "mdict-bundle", version, about)]
struct Cli {
    /// Source .mdx file
    source: PathBuf,

    /// Output bundle directory [default: SOURCE with a .bundle extension]
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Metadata descriptor to copy into the bundle instead of a generated one
    #[arg(long, value_name = "FILE")]
    metadata: Option<PathBuf>,

    /// Stylesheet to copy into the bundle [default: SOURCE.css, else built-in]
    #[arg(long, value_name = "FILE")]
    stylesheet: Option<PathBuf>,

    /// Registration code and user id of an encrypted dictionary
    #[arg(long, value_name = "REGCODE,EMAIL", value_parser = parse_passcode)]
    passcode: Option<(String, String)>,

    /// Override the text encoding declared in the header (v1/v2 only)
    #[arg(long, value_name = "LABEL")]
    encoding: Option<String>,

    /// Keep numbered style markers instead of expanding them
    #[arg(long)]
    no_styles: bool,

    /// Log progress every N entries (0 disables)
    #[arg(long, value_name = "N", default_value_t = 5000)]
    progress_every: usize,

    /// Capacity of the pipeline's bounded channels
    #[arg(long, value_name = "N", default_value_t = 1024)]
    channel_capacity: usize,

    /// Replace an existing output directory
    #[arg(long)]
    force: bool,
}

fn parse_passcode(s: &str) -> Result<(String, String), String> {
    s.split_once(',')
        .map(|(code, email)| (code.trim().to_string(), email.trim().to_string()))
        .filter(|(code, email)| !code.is_empty() && !email.is_empty())
        .ok_or_else(|| "expected <REGCODE_HEX>,<EMAIL>".to_string())
}

fn default_output(source: &Path) -> PathBuf {
    source.with_extension("bundle")
}

fn run(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    let passcode = cli
        .passcode
        .as_ref()
        .map(|(code, email)| (code.as_str(), email.as_str()));
    let reader = MdictReader::new(&cli.source, passcode, cli.encoding.as_deref())?;
    info!(
        "Opened '{}': MDict {}, {} entries in {} key / {} record blocks",
        reader.title(),
        reader.header.metadata.engine_version,
        reader.num_entries(),
        reader.num_key_blocks(),
        reader.num_record_blocks()
    );

    let options = ConvertOptions {
        apply_styles: !cli.no_styles,
        progress_every: cli.progress_every,
        channel_capacity: cli.channel_capacity,
    };
    let assets = BundleAssets::resolve(
        &cli.source,
        reader.title(),
        reader.description(),
        cli.metadata.as_deref(),
        cli.stylesheet.as_deref(),
    )?;

    let output = cli
        .output
        .clone()
        .unwrap_or_else(|| default_output(&cli.source));
    // Fail before the slow part when the target is taken.
    if !cli.force && output.symlink_metadata().is_ok() {
        return Err(bundle::BundleError::OutputExists(output).into());
    }

    let conversion = convert::convert(&reader, &options)?;
    bundle::assemble(&output, &conversion, &assets, cli.force)?;
    if conversion.report.issues.is_empty() {
        info!("Summary: {}", conversion.report);
    } else {
        warn!("Summary: {}", conversion.report);
    }
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    // Usage errors exit with 1 like every other failure; --help and
    // --version still exit with 0.
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn defaults_match_documented_values() {
        let cli = Cli::try_parse_from(["mdict-bundle", "words.mdx"]).unwrap();
        assert_eq!(cli.progress_every, 5000);
        assert_eq!(cli.channel_capacity, 1024);
        assert!(!cli.force);
        assert_eq!(default_output(&cli.source), PathBuf::from("words.bundle"));
    }

    #[test]
    fn passcode_needs_both_halves() {
        assert_eq!(
            parse_passcode("0A1B, me@example.org").unwrap(),
            ("0A1B".to_string(), "me@example.org".to_string())
        );
        assert!(parse_passcode("0A1B").is_err());
        assert!(parse_passcode(",x").is_err());
    }
}
