use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;
use tracing_subscriber::EnvFilter;
use urlblob::{BlobError, BlobResult, ByteRange, UrlBlob, UrlBlobManager};

mod output;

use output::{metadata_rows, redact, render_table};

#[derive(Debug, Parser)]
#[command(name = "urlblob")]
#[command(about = "Stat, download and upload presigned object-storage URLs", long_about = None)]
struct Cli {
    #[arg(
        global = true,
        short = 'u',
        long = "url-type",
        value_name = "TYPE",
        help = "Override URL type detection (s3, gcp, azure, generic)"
    )]
    url_type: Option<String>,

    #[arg(global = true, short, long, help = "Log requests to stderr")]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Show size, content type and modification time")]
    Stat {
        url: String,

        #[arg(short, long, help = "Output in JSON format")]
        json: bool,
    },

    #[command(about = "Download a URL to stdout or a file")]
    Get {
        url: String,

        #[arg(
            allow_negative_numbers = true,
            help = "Byte range: START-END, START- or -N (inclusive; -N is the last N bytes)"
        )]
        range: Option<String>,

        #[arg(long, help = "Start byte position (inclusive)")]
        start: Option<u64>,

        #[arg(long, help = "End byte position (inclusive)")]
        end: Option<u64>,

        #[arg(short, long, value_name = "FILE", help = "Output file (default: stdout)")]
        output: Option<PathBuf>,

        #[arg(short, long, help = "Process content as lines of text")]
        lines: bool,

        #[arg(long, help = "Download everything before writing instead of streaming")]
        no_stream: bool,
    },

    #[command(about = "Upload content to a URL")]
    Put {
        url: String,

        #[arg(help = "Content to upload (omit to read stdin)")]
        content: Option<String>,

        #[arg(short = 't', long, default_value = "text/plain", help = "Content type of the data")]
        content_type: String,

        #[arg(short, long, help = "Upload the content line by line")]
        lines: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {:#}", err);
            ExitCode::from(exit_status(&err))
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// 2 for invalid input, 1 for everything else
fn exit_status(err: &anyhow::Error) -> u8 {
    let usage = err
        .chain()
        .filter_map(|cause| cause.downcast_ref::<BlobError>())
        .any(BlobError::is_usage_error);
    if usage {
        2
    } else {
        1
    }
}

async fn run(cli: Cli) -> Result<()> {
    let manager = UrlBlobManager::from_env().context("reading URLBLOB_* configuration")?;
    let hint = cli.url_type.as_deref();

    let result = match cli.command {
        Commands::Stat { url, json } => {
            let blob = manager.from_url(&url, hint)?;
            stat(&blob, json).await
        }
        Commands::Get {
            url,
            range,
            start,
            end,
            output,
            lines,
            no_stream,
        } => {
            let range = parse_range(range.as_deref(), start, end)?;
            let blob = manager.from_url(&url, hint)?;
            get(&blob, range, output, lines, no_stream).await
        }
        Commands::Put {
            url,
            content,
            content_type,
            lines,
        } => {
            let blob = manager.from_url(&url, hint)?;
            put(&blob, content, &content_type, lines).await
        }
    };

    manager.close();
    result
}

/// Combine the positional range with `--start/--end`; using both is an error
fn parse_range(range: Option<&str>, start: Option<u64>, end: Option<u64>) -> BlobResult<Option<ByteRange>> {
    match range {
        Some(_) if start.is_some() || end.is_some() => Err(BlobError::invalid_range(
            "cannot combine a RANGE argument with --start/--end",
        )),
        Some(text) => text.parse().map(Some),
        None => ByteRange::from_bounds(start, end),
    }
}

async fn stat(blob: &UrlBlob, json: bool) -> Result<()> {
    let meta = blob.stat().await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&meta)?);
    } else {
        print!("{}", render_table(&metadata_rows(&meta)));
    }
    Ok(())
}

async fn get(
    blob: &UrlBlob,
    range: Option<ByteRange>,
    output: Option<PathBuf>,
    lines: bool,
    no_stream: bool,
) -> Result<()> {
    let to_terminal = output.is_none() && std::io::stdout().is_terminal();
    let mut writer: Box<dyn AsyncWrite + Unpin + Send> = match &output {
        Some(path) => Box::new(
            tokio::fs::File::create(path)
                .await
                .with_context(|| format!("creating {}", path.display()))?,
        ),
        None => Box::new(tokio::io::stdout()),
    };

    let mut bytes = 0usize;
    let mut line_count = 0usize;

    if no_stream || (to_terminal && !lines) {
        // Buffered so binary content can be kept off a terminal
        let content = blob.get(range).await?;
        bytes = content.len();
        if to_terminal && std::str::from_utf8(&content).is_err() {
            eprintln!("Downloaded {} bytes of binary data (use -o to save to file)", bytes);
            return Ok(());
        }
        writer.write_all(&content).await?;
    } else if lines {
        let mut stream = blob.stream_lines(range).await?;
        while let Some(line) = stream.next().await {
            let mut line = line?;
            line.push('\n');
            writer.write_all(line.as_bytes()).await?;
            line_count += 1;
        }
    } else {
        let mut stream = blob.stream(range).await?;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            writer.write_all(&chunk).await?;
            bytes += chunk.len();
        }
    }
    writer.flush().await?;
    debug!("Wrote {} bytes, {} lines", bytes, line_count);

    if let Some(path) = output {
        if lines && !no_stream {
            eprintln!("Downloaded {} lines to {}", line_count, path.display());
        } else {
            eprintln!("Downloaded {} bytes to {}", bytes, path.display());
        }
    }
    Ok(())
}

async fn put(blob: &UrlBlob, content: Option<String>, content_type: &str, lines: bool) -> Result<()> {
    let content = match content {
        Some(content) => content,
        None => {
            let mut buf = String::new();
            tokio::io::stdin()
                .read_to_string(&mut buf)
                .await
                .context("reading content from stdin")?;
            buf
        }
    };

    if lines {
        let lines: Vec<String> = content.lines().map(str::to_string).collect();
        let count = lines.len();
        blob.put_lines(lines, Some(content_type)).await?;
        eprintln!("Uploaded {} lines to {}", count, redact(blob.url()));
    } else {
        blob.put(content, Some(content_type)).await?;
        eprintln!("Uploaded content to {}", redact(blob.url()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_get_with_global_options() {
        let cli = Cli::try_parse_from([
            "urlblob", "get", "https://example.com/a", "10-19", "-u", "azure", "-o", "out.bin",
        ])
        .unwrap();
        assert_eq!(cli.url_type.as_deref(), Some("azure"));
        match cli.command {
            Commands::Get { range, output, .. } => {
                assert_eq!(range.as_deref(), Some("10-19"));
                assert_eq!(output, Some(PathBuf::from("out.bin")));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_suffix_range_is_accepted_as_positional() {
        let cli = Cli::try_parse_from(["urlblob", "get", "https://example.com/a", "-500"]).unwrap();
        match cli.command {
            Commands::Get { range, .. } => assert_eq!(range.as_deref(), Some("-500")),
            other => panic!("unexpected command: {:?}", other),
        }

        let cli = Cli::try_parse_from(["urlblob", "get", "https://example.com/a", "-u", "s3"]).unwrap();
        assert_eq!(cli.url_type.as_deref(), Some("s3"));
        match cli.command {
            Commands::Get { range, .. } => assert_eq!(range, None),
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_put_defaults_to_text_plain() {
        let cli = Cli::try_parse_from(["urlblob", "put", "https://example.com/a", "hello"]).unwrap();
        match cli.command {
            Commands::Put { content, content_type, lines, .. } => {
                assert_eq!(content.as_deref(), Some("hello"));
                assert_eq!(content_type, "text/plain");
                assert!(!lines);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_range_conventions() {
        let range = parse_range(Some("0-1023"), None, None).unwrap().unwrap();
        assert_eq!(range.header_value(), "bytes=0-1023");

        let suffix = parse_range(Some("-100"), None, None).unwrap().unwrap();
        assert!(suffix.is_suffix());
        assert_eq!(suffix.header_value(), "bytes=-100");

        let bounded = parse_range(None, None, Some(99)).unwrap().unwrap();
        assert_eq!(bounded.header_value(), "bytes=0-99");

        assert!(parse_range(None, None, None).unwrap().is_none());
    }

    #[test]
    fn test_conflicting_ranges_are_usage_errors() {
        let err = parse_range(Some("0-10"), Some(0), None).unwrap_err();
        assert!(err.is_usage_error());
        assert_eq!(exit_status(&anyhow::Error::from(err)), 2);

        let failure = anyhow::Error::from(BlobError::missing_metadata("size"));
        assert_eq!(exit_status(&failure), 1);

        let wrapped = anyhow::Error::from(BlobError::invalid_hint("dropbox")).context("resolving URL");
        assert_eq!(exit_status(&wrapped), 2);
    }
}
