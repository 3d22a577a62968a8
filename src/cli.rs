use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::Value;
use tokio::io::AsyncReadExt;
use tracing::{info, warn};

use crate::builder::{build_inbound, build_outbound};
use crate::fingerprint::Fingerprinter;
use crate::form::{InboundForm, OutboundForm};
use crate::import::ImportPipeline;
use crate::link::LinkRegistry;
use crate::options::CodecOptions;
use crate::projector::{project_inbound, project_outbound};

#[derive(Parser, Debug)]
#[command(version, about = "Convert proxy outbounds/inbounds between JSON, form state and share links", long_about = None)]
pub struct Args {
    #[arg(short, long, global = true, help = "Emit debug log")]
    pub verbose: bool,

    #[arg(short = 'c', long, global = true, help = "Codec options TOML file")]
    pub options: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Import links, WireGuard INI or JSON as a canonical JSON array
    Import {
        /// Input file, `-` for stdin
        #[arg(default_value = "-")]
        input: String,
        #[arg(short, long, help = "Output path, stdout when absent")]
        output: Option<String>,
    },
    /// Export canonical outbounds as share links, one per line
    Export {
        #[arg(default_value = "-")]
        input: String,
        #[arg(short, long)]
        output: Option<String>,
    },
    /// Project one canonical entity into form state
    Project {
        #[arg(default_value = "-")]
        input: String,
        #[arg(long, help = "Treat the entity as an inbound")]
        inbound: bool,
    },
    /// Build a canonical entity from form state
    Build {
        #[arg(default_value = "-")]
        input: String,
        #[arg(long, help = "Entity being edited; decides which defaults are kept")]
        original: Option<String>,
        #[arg(long, help = "Treat the form as an inbound")]
        inbound: bool,
    },
    /// Print the fingerprint and tag of every entity
    Fingerprint {
        #[arg(default_value = "-")]
        input: String,
    },
    /// Drop entities whose fingerprint was already seen
    Dedupe {
        #[arg(default_value = "-")]
        input: String,
        #[arg(short, long)]
        output: Option<String>,
    },
}

// ============================================================================
// Commands
// ============================================================================

pub async fn run(args: Args) -> Result<()> {
    let options = CodecOptions::load(args.options.as_deref()).await?;

    match args.command {
        Command::Import { input, output } => {
            let text = read_input(&input).await?;
            let values = ImportPipeline::new(options.clone()).import(&text)?;
            write_output(output.as_deref(), &render(&values, &options)?).await?;
        }
        Command::Export { input, output } => {
            let values = entities(&read_input(&input).await?)?;
            let registry = LinkRegistry::with_builtin_codecs();
            let mut links = Vec::new();
            for value in &values {
                match registry.encode(value) {
                    Ok(link) => links.push(link),
                    Err(e) => warn!("Skipping entity '{}': {}", tag_of(value), e),
                }
            }
            info!("Exported {} of {} entities", links.len(), values.len());
            write_output(output.as_deref(), &links.join("\n")).await?;
        }
        Command::Project { input, inbound } => {
            let value = single(&read_input(&input).await?)?;
            let rendered = if inbound {
                render(&project_inbound(&value), &options)?
            } else {
                render(&project_outbound(&value), &options)?
            };
            write_output(None, &rendered).await?;
        }
        Command::Build {
            input,
            original,
            inbound,
        } => {
            let text = read_input(&input).await?;
            let original = match original {
                Some(path) => Some(single(&read_input(&path).await?)?),
                None => None,
            };
            let rendered = if inbound {
                let form: InboundForm =
                    serde_json::from_str(&text).context("Failed to parse inbound form JSON")?;
                render(&build_inbound(&form, original.as_ref()), &options)?
            } else {
                let form: OutboundForm =
                    serde_json::from_str(&text).context("Failed to parse outbound form JSON")?;
                render(&build_outbound(&form, original.as_ref()), &options)?
            };
            write_output(None, &rendered).await?;
        }
        Command::Fingerprint { input } => {
            let fingerprinter = Fingerprinter::from_options(&options);
            let lines: Vec<String> = entities(&read_input(&input).await?)?
                .iter()
                .map(|value| format!("{}\t{}", fingerprinter.fingerprint(value), tag_of(value)))
                .collect();
            write_output(None, &lines.join("\n")).await?;
        }
        Command::Dedupe { input, output } => {
            let values = entities(&read_input(&input).await?)?;
            let kept = Fingerprinter::from_options(&options).dedupe(values);
            write_output(output.as_deref(), &render(&kept, &options)?).await?;
        }
    }
    Ok(())
}

// ============================================================================
// Input / Output
// ============================================================================

/// Reads a file, or stdin for `-`
async fn read_input(path: &str) -> Result<String> {
    if path == "-" {
        let mut text = String::new();
        tokio::io::stdin()
            .read_to_string(&mut text)
            .await
            .context("Failed to read stdin")?;
        return Ok(text);
    }
    let expanded = crate::options::expand_tilde(path);
    tokio::fs::read_to_string(&expanded)
        .await
        .with_context(|| format!("Failed to read {:?}", expanded))
}

async fn write_output(path: Option<&str>, content: &str) -> Result<()> {
    match path {
        Some(path) => {
            let expanded = crate::options::expand_tilde(path);
            if let Some(parent) = std::path::Path::new(&expanded).parent()
                && !parent.as_os_str().is_empty()
            {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("Failed to create directory {:?}", parent))?;
            }
            tokio::fs::write(&expanded, format!("{}\n", content))
                .await
                .with_context(|| format!("Failed to write {:?}", expanded))?;
            info!("Wrote {}", expanded);
        }
        None => println!("{}", content),
    }
    Ok(())
}

fn render<T: Serialize>(value: &T, options: &CodecOptions) -> Result<String> {
    let rendered = if options.pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    };
    rendered.context("Failed to serialize JSON")
}

/// Entities of a JSON array, a document with `outbounds`/`inbounds`, or a
/// single entity
fn entities(text: &str) -> Result<Vec<Value>> {
    let document: Value = serde_json::from_str(text).context("Failed to parse JSON input")?;
    Ok(match document {
        Value::Array(items) => items,
        Value::Object(mut map) if map.contains_key("outbounds") || map.contains_key("inbounds") => {
            let mut items = Vec::new();
            for key in ["outbounds", "inbounds"] {
                if let Some(Value::Array(list)) = map.remove(key) {
                    items.extend(list);
                }
            }
            items
        }
        object @ Value::Object(_) => vec![object],
        _ => bail!("Expected a JSON object or array"),
    })
}

fn single(text: &str) -> Result<Value> {
    let value: Value = serde_json::from_str(text).context("Failed to parse JSON input")?;
    if !value.is_object() {
        bail!("Expected a single JSON object");
    }
    Ok(value)
}

fn tag_of(value: &Value) -> &str {
    value.get("tag").and_then(Value::as_str).unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_args_parse_subcommands() {
        let args = Args::parse_from(["proxyform", "-v", "build", "form.json", "--original", "o.json"]);
        assert!(args.verbose);
        if let Command::Build {
            input,
            original,
            inbound,
        } = args.command
        {
            assert_eq!(input, "form.json");
            assert_eq!(original.as_deref(), Some("o.json"));
            assert!(!inbound);
        } else {
            panic!("Expected build command");
        }
    }

    #[test]
    fn test_args_default_input_is_stdin() {
        let args = Args::parse_from(["proxyform", "import"]);
        if let Command::Import { input, output } = args.command {
            assert_eq!(input, "-");
            assert!(output.is_none());
        } else {
            panic!("Expected import command");
        }
    }

    #[test]
    fn test_entities_shapes() {
        assert_eq!(entities(r#"[{"a":1},{"b":2}]"#).unwrap().len(), 2);
        assert_eq!(
            entities(r#"{"outbounds":[{"a":1}],"inbounds":[{"b":2}]}"#).unwrap(),
            vec![json!({"a": 1}), json!({"b": 2})]
        );
        assert_eq!(entities(r#"{"protocol":"freedom"}"#).unwrap().len(), 1);
        assert!(entities("42").is_err());
    }

    #[test]
    fn test_single_requires_object() {
        assert!(single("[]").is_err());
        assert!(single(r#"{"protocol":"dns"}"#).is_ok());
    }

    #[tokio::test]
    async fn test_write_and_read_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/out.json");
        let path = path.to_str().unwrap();
        write_output(Some(path), "[]").await.unwrap();
        assert_eq!(read_input(path).await.unwrap(), "[]\n");
    }
}
