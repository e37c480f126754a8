//! Resolves a run input by exact path, then by basename under `data/`.
//!
//! Prints `{"key": ..., "location": ...}` for the chosen file. Fails with the
//! direct path and the search pattern when nothing matches.

use anyhow::{Result, anyhow, bail};
use conductor_results::{LocalStore, ObjectStore, PathResolver, RunContext};
use serde_json::json;
use std::env;
use std::ffi::OsString;
use std::path::PathBuf;
use std::sync::Arc;

fn main() {
    if let Err(err) = run() {
        eprintln!("{err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let mut args = env::args_os().skip(1);
    let mut relative: Option<String> = None;
    let mut context_path: Option<PathBuf> = None;
    let mut store_dir: Option<PathBuf> = None;

    while let Some(arg_os) = args.next() {
        let arg = arg_os.to_string_lossy().into_owned();
        match arg.as_str() {
            "--context" => context_path = Some(PathBuf::from(next_value(&mut args, "--context")?)),
            "--store-dir" => store_dir = Some(PathBuf::from(next_value(&mut args, "--store-dir")?)),
            "--help" | "-h" => {
                print_usage();
                return Ok(());
            }
            other if other.starts_with("--") => {
                print_usage();
                bail!("Unknown flag: {other}");
            }
            _ => {
                if relative.is_some() {
                    print_usage();
                    bail!("resolve-input takes exactly one path");
                }
                relative = Some(arg.clone());
            }
        }
    }

    let Some(relative) = relative else {
        print_usage();
        bail!("Missing input path");
    };

    let context = match &context_path {
        Some(path) => RunContext::from_path(path)?,
        None => RunContext::from_env()?,
    };
    let root = store_dir.unwrap_or_else(|| context.mount_path.clone());
    let store: Arc<dyn ObjectStore> = Arc::new(LocalStore::new(root));
    let resolved = PathResolver::new(store).resolve(&context.request_root, &relative)?;

    println!(
        "{}",
        json!({"key": resolved.key, "location": resolved.location})
    );
    Ok(())
}

fn next_value(args: &mut impl Iterator<Item = OsString>, flag: &str) -> Result<String> {
    args.next()
        .map(|value| value.to_string_lossy().into_owned())
        .ok_or_else(|| anyhow!("Missing value for {flag}"))
}

fn print_usage() {
    eprintln!(
        "Usage: resolve-input RELATIVE_PATH [--context PATH] [--store-dir DIR]\n\n\
         Looks for <request_root>/RELATIVE_PATH, then for the file name anywhere under\n\
         <request_root>/data/. The context defaults to $CONDUCTOR_CONTEXT."
    );
}
