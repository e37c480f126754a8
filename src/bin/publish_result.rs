//! Registers one run output in the results catalog and prints the record.
//!
//! The run context comes from `--context FILE` or `CONDUCTOR_CONTEXT`. Files
//! are read from and written to a `LocalStore` rooted at `--store-dir`, or at
//! the context's `mount_path` when no directory is given. `--dry-run` (or
//! `CONDUCTOR_DRY_RUN=1` / `CONDUCTOR_LOCAL=1`) keeps the catalog update in
//! memory and prints the document that would have been written.

use anyhow::{Context, Result, anyhow, bail};
use bytes::Bytes;
use conductor_results::{
    Category, ExtraFields, LocalStore, LogFormat, ObjectStore, Output, RecordDraft, RunContext,
    RunSession, init_logging, offline_requested_by_env, store::base_name,
};
use serde_json::{Map, Value};
use std::env;
use std::ffi::OsString;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

fn main() {
    if let Err(err) = run() {
        eprintln!("{err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let args = CliArgs::parse()?;
    init_logging(if args.log_json {
        LogFormat::Json
    } else {
        LogFormat::Pretty
    });

    let context = match &args.context {
        Some(path) => RunContext::from_path(path)?,
        None => RunContext::from_env()?,
    };
    let store_dir = args
        .store_dir
        .clone()
        .unwrap_or_else(|| context.mount_path.clone());
    let store: Arc<dyn ObjectStore> = Arc::new(LocalStore::new(store_dir));
    let offline = args.dry_run || offline_requested_by_env();

    let session = RunSession::new(context, store, offline).with_conflict_retries(args.retries);

    let output = match &args.target {
        Target::Path(path) => Output::Path(path.clone()),
        Target::Upload(file) => {
            let data = fs::read(file)
                .with_context(|| format!("reading upload {}", file.display()))?;
            let filename = file
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .ok_or_else(|| anyhow!("--upload needs a file path: {}", file.display()))?;
            Output::Rendered {
                filename,
                bytes: Bytes::from(data),
            }
        }
    };

    let label = match &output {
        Output::Path(path) => path.clone(),
        Output::Rendered { filename, .. } => filename.clone(),
    };
    let record = session
        .publish(args.category, output, args.draft)
        .with_context(|| format!("publishing {} '{}'", args.category, base_name(&label)))?;

    let mut report = Map::new();
    report.insert("record".to_string(), serde_json::to_value(&record)?);
    if let Some(doc) = session.publisher().offline_document()? {
        report.insert("document".to_string(), serde_json::to_value(&doc)?);
    }
    println!("{}", serde_json::to_string_pretty(&Value::Object(report))?);
    Ok(())
}

enum Target {
    Path(String),
    Upload(PathBuf),
}

struct CliArgs {
    category: Category,
    target: Target,
    draft: RecordDraft,
    context: Option<PathBuf>,
    store_dir: Option<PathBuf>,
    retries: u32,
    dry_run: bool,
    log_json: bool,
}

impl CliArgs {
    fn parse() -> Result<Self> {
        Self::parse_from(env::args_os().skip(1))
    }

    fn parse_from(raw: impl IntoIterator<Item = OsString>) -> Result<Self> {
        let mut args = raw.into_iter();
        let mut config = PartialArgs::default();

        while let Some(arg_os) = args.next() {
            let arg = os_to_string(arg_os);
            match arg.as_str() {
                "--category" => config.category = Some(next_value(&mut args, "--category")?),
                "--path" => config.path = Some(next_value(&mut args, "--path")?),
                "--upload" => {
                    config.upload = Some(PathBuf::from(next_value(&mut args, "--upload")?))
                }
                "--title" => config.title = Some(next_value(&mut args, "--title")?),
                "--description" | "--desc" => {
                    config.description = Some(next_value(&mut args, arg.as_str())?)
                }
                "--field" => {
                    let value = next_value(&mut args, "--field")?;
                    config.extra.set_pair(&value, "--field")?;
                }
                "--field-json" => {
                    let value = next_value(&mut args, "--field-json")?;
                    config.extra.set_json_pair(&value, "--field-json")?;
                }
                "--extra-json" => {
                    let value = next_value(&mut args, "--extra-json")?;
                    config.extra.merge_inline(&value, "--extra-json")?;
                }
                "--extra-file" => {
                    let value = PathBuf::from(next_value(&mut args, "--extra-file")?);
                    config.extra.merge_file(&value, "--extra-file")?;
                }
                "--context" => {
                    config.context = Some(PathBuf::from(next_value(&mut args, "--context")?))
                }
                "--store-dir" => {
                    config.store_dir = Some(PathBuf::from(next_value(&mut args, "--store-dir")?))
                }
                "--retries" => {
                    let value = next_value(&mut args, "--retries")?;
                    config.retries = Some(
                        value
                            .parse::<u32>()
                            .with_context(|| format!("Failed to parse --retries '{value}'"))?,
                    );
                }
                "--dry-run" => config.dry_run = true,
                "--log-json" => config.log_json = true,
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                other => {
                    eprintln!("Unknown flag: {other}");
                    print_usage();
                    std::process::exit(1);
                }
            }
        }

        config.build()
    }
}

#[derive(Default)]
struct PartialArgs {
    category: Option<String>,
    path: Option<String>,
    upload: Option<PathBuf>,
    title: Option<String>,
    description: Option<String>,
    extra: ExtraFields,
    context: Option<PathBuf>,
    store_dir: Option<PathBuf>,
    retries: Option<u32>,
    dry_run: bool,
    log_json: bool,
}

impl PartialArgs {
    fn build(self) -> Result<CliArgs> {
        let category_raw = self
            .category
            .ok_or_else(|| anyhow!("Missing required flag: --category"))?;
        let category: Category = category_raw.parse()?;

        let target = match (self.path, self.upload) {
            (Some(path), None) => Target::Path(path),
            (None, Some(file)) => Target::Upload(file),
            (Some(_), Some(_)) => bail!("--path and --upload are mutually exclusive"),
            (None, None) => bail!("Missing required flag: --path or --upload"),
        };

        let mut draft = RecordDraft::new().extra(self.extra.into_map());
        if let Some(title) = self.title {
            draft = draft.title(title);
        }
        if let Some(description) = self.description {
            draft = draft.description(description);
        }

        Ok(CliArgs {
            category,
            target,
            draft,
            context: self.context,
            store_dir: self.store_dir,
            retries: self.retries.unwrap_or(0),
            dry_run: self.dry_run,
            log_json: self.log_json,
        })
    }
}

fn next_value(args: &mut impl Iterator<Item = OsString>, flag: &str) -> Result<String> {
    args.next()
        .map(os_to_string)
        .ok_or_else(|| anyhow!("Missing value for {flag}"))
}

fn os_to_string(value: OsString) -> String {
    value
        .into_string()
        .unwrap_or_else(|os| os.to_string_lossy().into_owned())
}

fn print_usage() {
    eprintln!("{}", usage());
}

fn usage() -> &'static str {
    "Usage: publish-result --category figures|tables|artifacts (--path PATH | --upload FILE) [options]\n\nOptions:\n  --title TEXT\n  --description TEXT\n  --field KEY=VALUE          # repeat for multiple entries\n  --field-json KEY=JSON      # repeat for multiple entries\n  --extra-json JSON_OBJECT\n  --extra-file PATH\n  --context PATH             # defaults to $CONDUCTOR_CONTEXT\n  --store-dir DIR            # defaults to the context mount_path\n  --retries N                # re-read and retry after N conflicts\n  --dry-run\n  --log-json\n"
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<CliArgs> {
        CliArgs::parse_from(args.iter().map(OsString::from))
    }

    #[test]
    fn parses_path_publish_with_fields() {
        let args = parse(&[
            "--category",
            "tables",
            "--path",
            "results/tables/summary.csv",
            "--title",
            "Summary",
            "--field",
            "plate=P-1",
            "--field-json",
            "rows=96",
            "--retries",
            "3",
        ])
        .unwrap();
        assert_eq!(args.category, Category::Tables);
        assert!(matches!(args.target, Target::Path(ref p) if p == "results/tables/summary.csv"));
        assert_eq!(args.draft.title, "Summary");
        assert_eq!(args.draft.extra["rows"], 96);
        assert_eq!(args.retries, 3);
        assert!(!args.dry_run);
    }

    #[test]
    fn requires_exactly_one_target() {
        assert!(parse(&["--category", "figures"]).is_err());
        assert!(parse(&["--category", "figures", "--path", "a", "--upload", "b"]).is_err());
        assert!(parse(&["--category", "plots", "--path", "a"]).is_err());
        assert!(parse(&["--path", "a"]).is_err());
    }

    #[test]
    fn reserved_extra_fields_fail_parsing() {
        assert!(parse(&["--category", "figures", "--path", "a", "--field", "path=x"]).is_err());
    }
}
