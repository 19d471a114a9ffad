use clap::{Parser, Subcommand};
use ldap_filter::{Config, Filter, OutputFormat, Record};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};
use anyhow::{bail, Context, Result};

#[derive(Parser)]
#[command(name = "ldap-filter")]
#[command(about = "LDAP search filter tool - parse, decode and evaluate RFC 4515 / RFC 4511 filters")]
struct Args {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Output format (overrides config)
    #[arg(short, long, value_enum, global = true)]
    output: Option<OutputFormat>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Parse an RFC 4515 filter string
    Parse {
        filter: String,
    },
    /// Decode a hex-encoded BER filter
    Decode {
        #[arg(value_name = "HEX")]
        hex: String,
    },
    /// Evaluate a filter against a YAML or JSON record. Exits 0 on match, 1 otherwise.
    Match {
        filter: String,

        /// Record file (.json is read as JSON, anything else as YAML)
        #[arg(short, long, value_name = "FILE")]
        record: PathBuf,

        /// Case-insensitive attribute name lookup (overrides config)
        #[arg(short, long)]
        ignore_case: bool,
    },
}

fn main() {
    let args = Args::parse();

    let log_level = if args.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(format!("ldap_filter={},info", log_level))
        .with_writer(std::io::stderr)
        .init();

    match run(args) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            error!("{:#}", e);
            std::process::exit(2);
        }
    }
}

fn run(args: Args) -> Result<i32> {
    let config = match &args.config {
        Some(path) => {
            info!("Configuration source: file {:?}", path);
            Config::from_file(path)?
        }
        None => Config::default(),
    };
    let output = args.output.unwrap_or(config.output);

    match args.command {
        Command::Parse { filter } => {
            let filter = parse_limited(&filter, config.max_depth)?;
            print_filter(&filter, output)?;
            Ok(0)
        }
        Command::Decode { hex } => {
            let digits: String = hex.chars().filter(|c| !c.is_whitespace()).collect();
            let bytes = hex::decode(&digits).context("Invalid hex input")?;
            let filter = decode_limited(&bytes, config.max_depth)?;
            print_filter(&filter, output)?;
            Ok(0)
        }
        Command::Match { filter, record, ignore_case } => {
            let filter = parse_limited(&filter, config.max_depth)?;
            let record = load_record(&record)?;
            let strict_case = config.strict_case && !ignore_case;
            debug!("Matching {} against {} attributes (strict_case={})", filter, record.len(), strict_case);
            let matched = filter.matches(&record, strict_case)?;
            println!("{}", matched);
            Ok(if matched { 0 } else { 1 })
        }
    }
}

/// Reject input nested deeper than `max_depth` before handing it to the
/// recursive parser.
fn parse_limited(text: &str, max_depth: Option<usize>) -> Result<Filter> {
    if let Some(max) = max_depth {
        let depth = paren_depth(text);
        if depth > max {
            bail!("filter nesting depth {} exceeds max_depth {}", depth, max);
        }
    }
    Ok(Filter::parse(text)?)
}

/// BER counterpart of `parse_limited`: the decoder stops descending once
/// `max_depth` levels have been entered.
fn decode_limited(bytes: &[u8], max_depth: Option<usize>) -> Result<Filter> {
    let filter = match max_depth {
        Some(max) => Filter::from_ber_limited(bytes, max)
            .with_context(|| format!("BER filter rejected (max_depth {})", max))?,
        None => Filter::from_ber(bytes)?,
    };
    Ok(filter)
}

/// Deepest parenthesis nesting in `text`. Escaped parens are `\28`/`\29`,
/// so every literal paren counts.
fn paren_depth(text: &str) -> usize {
    let mut depth = 0usize;
    let mut max = 0usize;
    for b in text.bytes() {
        match b {
            b'(' => {
                depth += 1;
                max = max.max(depth);
            }
            b')' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    // Bare input is wrapped in one pair of parens by the parser.
    if text.starts_with('(') { max } else { max + 1 }
}

fn load_record(path: &Path) -> Result<Record> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Read record {}", path.display()))?;
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    if is_json {
        Record::from_json_str(&content)
    } else {
        Record::from_yaml_str(&content)
    }
}

fn print_filter(filter: &Filter, output: OutputFormat) -> Result<()> {
    match output {
        OutputFormat::Text => println!("{}", filter),
        OutputFormat::Ber => println!("{}", hex::encode(filter.to_ber())),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&filter.json())?),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::Builder;

    #[test]
    fn test_paren_depth() {
        assert_eq!(paren_depth("(foo=bar)"), 1);
        assert_eq!(paren_depth("foo=bar"), 1);
        assert_eq!(paren_depth("(&(a=b)(!(c=d)))"), 3);
        assert_eq!(paren_depth("(foo=\\28\\29)"), 1);
    }

    #[test]
    fn test_parse_limited() {
        let text = "(&(a=b)(!(c=d)))";
        assert!(parse_limited(text, None).is_ok());
        assert!(parse_limited(text, Some(3)).is_ok());
        assert!(parse_limited(text, Some(2)).is_err());
    }

    #[test]
    fn test_decode_limited() {
        let bytes = Filter::parse("(&(a=b)(!(c=d)))").unwrap().to_ber();
        assert!(decode_limited(&bytes, None).is_ok());
        assert!(decode_limited(&bytes, Some(3)).is_ok());
        assert!(decode_limited(&bytes, Some(2)).is_err());

        // (!(!(...(a=*)...))) nested well past the limit
        let mut deep = vec![0x87, 0x01, b'a'];
        for _ in 0..2_000 {
            let mut wrapped = vec![0xA2, 0x82, (deep.len() >> 8) as u8, deep.len() as u8];
            wrapped.extend_from_slice(&deep);
            deep = wrapped;
        }
        let err = decode_limited(&deep, Some(32)).unwrap_err();
        assert!(format!("{:#}", err).contains("max depth"), "{:#}", err);
    }

    #[test]
    fn test_load_record_by_extension() {
        let mut json = Builder::new().suffix(".json").tempfile().unwrap();
        json.write_all(br#"{"cn": "Fred", "uidNumber": 7}"#).unwrap();
        json.flush().unwrap();
        let record = load_record(json.path()).unwrap();
        assert_eq!(record.len(), 2);

        let mut yaml = Builder::new().suffix(".yaml").tempfile().unwrap();
        yaml.write_all(b"cn: Fred\nmail:\n  - a@example.com\n").unwrap();
        yaml.flush().unwrap();
        let record = load_record(yaml.path()).unwrap();
        assert!(Filter::parse("(mail=a@example.com)").unwrap().matches(&record, true).unwrap());
    }

    #[test]
    fn test_load_record_missing_file() {
        assert!(load_record(Path::new("/nonexistent/record.yaml")).is_err());
    }

    #[test]
    fn test_args_parse() {
        let args = Args::try_parse_from([
            "ldap-filter", "match", "(cn=*)", "--record", "r.yaml", "-i", "--output", "json",
        ])
        .unwrap();
        assert_eq!(args.output, Some(OutputFormat::Json));
        assert!(matches!(args.command, Command::Match { ignore_case: true, .. }));
    }
}
