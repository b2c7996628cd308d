//! tagforge CLI - command-line interface for tag-aware configuration loading
//!
//! Usage:
//!   tagforge load config.yaml --inherit --templates
//!   tagforge convert settings.yaml settings.toml
//!   tagforge check a.yaml b.json

use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tagforge_core::{
    dump, dump_file, load_file, DumpOptions, Error, ErrorKind, Format, FormatMode, LoadOptions,
    SafetyMode,
};

/// tagforge - Load configuration documents with includes, env vars and inheritance
#[derive(Parser)]
#[command(name = "tagforge")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a document, resolve it, and print the result
    Load {
        /// Document to load
        file: PathBuf,

        #[command(flatten)]
        resolve: ResolveArgs,

        /// Output format: yaml, json, toml, ini
        #[arg(short, long, default_value = "yaml")]
        format: Format,

        /// Write to file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Load a document and write it in the format of the output extension
    Convert {
        /// Document to read
        input: PathBuf,

        /// Destination file
        output: PathBuf,

        #[command(flatten)]
        resolve: ResolveArgs,
    },

    /// Quick syntax check without resolving directives
    Check {
        /// Documents to check
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

/// Options shared by every resolving command
#[derive(Args, Debug, Clone)]
struct ResolveArgs {
    /// Safety mode: safe, full, unsafe
    #[arg(short, long, default_value = "unsafe")]
    mode: SafetyMode,

    /// Base directory for !include targets (default: the document's directory)
    #[arg(long)]
    include_base: Option<PathBuf>,

    /// Resolve INHERIT directives
    #[arg(long)]
    inherit: bool,

    /// Render {{ path }} templates in string values
    #[arg(long)]
    templates: bool,

    /// Fail on unset !ENV variables without a default
    #[arg(long)]
    strict_env: bool,
}

impl ResolveArgs {
    fn load_options(&self, file: &Path) -> LoadOptions {
        let base = match &self.include_base {
            Some(base) => base.clone(),
            None => file.parent().map(Path::to_path_buf).unwrap_or_default(),
        };

        LoadOptions::new()
            .with_mode(self.mode)
            .with_include_base_path(base)
            .with_resolve_inherit(self.inherit)
            .with_resolve_strings(self.templates)
            .with_strict_env(self.strict_env)
    }
}

/// Run the CLI with the process arguments
pub fn run() -> ExitCode {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match cli.command {
        Commands::Load {
            file,
            resolve,
            format,
            output,
        } => cmd_load(&file, &resolve, format, output),

        Commands::Convert {
            input,
            output,
            resolve,
        } => cmd_convert(&input, &output, &resolve),

        Commands::Check { files } => cmd_check(files),
    }
}

fn setup_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "warn" };

    tracing_subscriber::fmt()
        .with_env_filter(format!("tagforge_cli={},tagforge_core={}", level, level))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Exit status for a failure: 2 for usage and I/O problems, 1 for documents
/// that fail to resolve
fn exit_status(err: &Error) -> u8 {
    match err.kind {
        ErrorKind::Io | ErrorKind::UnsupportedFormat { .. } => 2,
        _ => 1,
    }
}

fn report(file: &Path, err: &Error) -> u8 {
    eprintln!("{} {}", "✗".red(), file.display().to_string().bold());
    eprintln!("{}", err);
    exit_status(err)
}

fn cmd_load(file: &Path, resolve: &ResolveArgs, format: Format, output: Option<PathBuf>) -> ExitCode {
    let options = resolve.load_options(file);
    log::debug!("Load options: {:?}", options);

    let value = match load_file(file, FormatMode::Auto, &options) {
        Ok(v) => v,
        Err(e) => return ExitCode::from(report(file, &e)),
    };

    let content = match dump(&value, format, &DumpOptions::default()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{}: {}", "Error".red(), e);
            return ExitCode::from(exit_status(&e));
        }
    };

    if let Some(output_path) = output {
        if let Err(e) = std::fs::write(&output_path, &content) {
            eprintln!("{}: {}", "Error writing file".red(), e);
            return ExitCode::from(2);
        }
        eprintln!("{} Wrote to {}", "✓".green(), output_path.display());
    } else if content.ends_with('\n') {
        print!("{}", content);
    } else {
        println!("{}", content);
    }
    ExitCode::SUCCESS
}

fn cmd_convert(input: &Path, output: &Path, resolve: &ResolveArgs) -> ExitCode {
    let options = resolve.load_options(input);

    let value = match load_file(input, FormatMode::Auto, &options) {
        Ok(v) => v,
        Err(e) => return ExitCode::from(report(input, &e)),
    };

    match dump_file(&value, output, FormatMode::Auto, &DumpOptions::default()) {
        Ok(()) => {
            eprintln!(
                "{} {} → {}",
                "✓".green(),
                input.display(),
                output.display()
            );
            ExitCode::SUCCESS
        }
        Err(e) => ExitCode::from(report(output, &e)),
    }
}

/// Options for a syntax-only pass: directives are left as plain payloads
fn check_options() -> LoadOptions {
    LoadOptions::new()
        .with_mode(SafetyMode::Unsafe)
        .with_include(false)
        .with_env(false)
}

fn cmd_check(files: Vec<PathBuf>) -> ExitCode {
    let options = check_options();
    let mut status = 0;

    for file in files {
        let format = Format::from_path(&file).unwrap_or(Format::Yaml);

        match load_file(&file, FormatMode::Explicit(format), &options) {
            Ok(_) => {
                println!(
                    "{} {}: valid {}",
                    "✓".green(),
                    file.display(),
                    format.to_string().to_uppercase()
                );
            }
            Err(e) => status = status.max(report(&file, &e)),
        }
    }

    ExitCode::from(status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn resolve_args() -> ResolveArgs {
        ResolveArgs {
            mode: SafetyMode::Safe,
            include_base: None,
            inherit: true,
            templates: false,
            strict_env: false,
        }
    }

    #[test]
    fn test_cli_parses_load() {
        let cli = Cli::try_parse_from([
            "tagforge", "load", "app.yaml", "--mode", "safe", "--inherit", "-f", "json",
        ])
        .unwrap();
        match cli.command {
            Commands::Load {
                file,
                resolve,
                format,
                output,
            } => {
                assert_eq!(file, PathBuf::from("app.yaml"));
                assert_eq!(resolve.mode, SafetyMode::Safe);
                assert!(resolve.inherit);
                assert!(!resolve.templates);
                assert_eq!(format, Format::Json);
                assert!(output.is_none());
            }
            _ => panic!("expected load command"),
        }
    }

    #[test]
    fn test_cli_rejects_bad_mode() {
        assert!(Cli::try_parse_from(["tagforge", "load", "a.yaml", "--mode", "yolo"]).is_err());
    }

    #[test]
    fn test_include_base_defaults_to_document_dir() {
        let options = resolve_args().load_options(Path::new("conf/app.yaml"));
        assert_eq!(options.include_base_path.as_deref(), Some("conf"));
        assert_eq!(options.mode, SafetyMode::Safe);
        assert!(options.resolve_inherit);

        let mut args = resolve_args();
        args.include_base = Some(PathBuf::from("/etc/shared"));
        let options = args.load_options(Path::new("conf/app.yaml"));
        assert_eq!(options.include_base_path.as_deref(), Some("/etc/shared"));
    }

    #[test]
    fn test_exit_status() {
        assert_eq!(exit_status(&Error::io("boom")), 2);
        assert_eq!(exit_status(&Error::unknown_tag("x")), 1);
        assert_eq!(exit_status(&Error::unsupported_format("xml")), 2);
    }

    #[test]
    fn test_check_leaves_directives_alone() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.yaml");
        std::fs::write(&file, "db: !include missing.yaml\nhome: !ENV HOME\n").unwrap();

        let value = load_file(&file, FormatMode::Auto, &check_options()).unwrap();
        assert_eq!(
            value.get_path("db").and_then(|v| v.as_str()),
            Some("missing.yaml")
        );
    }

    #[test]
    fn test_convert_yaml_to_json() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("in.yaml");
        let output = dir.path().join("out.json");
        std::fs::write(&input, "name: svc\nports: [80, 443]\n").unwrap();

        cmd_convert(&input, &output, &resolve_args());
        let written = std::fs::read_to_string(&output).unwrap();
        assert!(written.contains("\"name\": \"svc\""));
    }
}
