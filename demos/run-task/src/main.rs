//! Run one task described by JSON files.
//!
//! ```text
//! run-task --schema IMEAN.json [--schema-dir DIR] [--userno N] request.json
//! ```
//!
//! The request is a serialized `TaskRequest`; the environment supplies the
//! installation layout (`AIPS_ROOT`, `ARCH`, `DA00`, ...). Outputs are
//! printed as JSON once the task finishes. Ctrl+C aborts the task.

use std::{fs, path::PathBuf};

use anyhow::{Context, bail};
use pops_core::{SchemaCache, SessionEvent, TaskManager, TaskRequest};
use pops_model::{PopsConfig, TaskSchema};
use pops_observe::{LoggerConfig, logger_init};
use tracing::{info, warn};

#[derive(Debug, Default)]
struct Args {
    request: Option<PathBuf>,
    schema: Option<PathBuf>,
    schema_dir: Option<PathBuf>,
    userno: Option<u32>,
}

impl Args {
    fn parse(mut it: impl Iterator<Item = String>) -> anyhow::Result<Self> {
        let mut args = Args::default();
        while let Some(arg) = it.next() {
            match arg.as_str() {
                "--schema" => args.schema = Some(it.next().context("--schema needs a path")?.into()),
                "--schema-dir" => args.schema_dir = Some(it.next().context("--schema-dir needs a path")?.into()),
                "--userno" => {
                    let n = it.next().context("--userno needs a number")?;
                    args.userno = Some(n.parse().with_context(|| format!("bad user number '{n}'"))?);
                }
                flag if flag.starts_with("--") => bail!("unknown flag {flag}"),
                _ if args.request.is_none() => args.request = Some(arg.into()),
                _ => bail!("unexpected argument {arg}"),
            }
        }
        Ok(args)
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &PathBuf) -> anyhow::Result<T> {
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

fn print_events(events: Vec<SessionEvent>) {
    for ev in events {
        match ev {
            SessionEvent::Console(line) => println!("{line}"),
            SessionEvent::Message(m) if m.priority.is_error() => eprintln!("{}", m.text),
            SessionEvent::Message(m) => println!("{}", m.text),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logger_init(&LoggerConfig::from_env()?)?;

    let args = Args::parse(std::env::args().skip(1))?;
    let request_path = args.request.context("usage: run-task [--schema FILE] [--schema-dir DIR] [--userno N] REQUEST")?;
    let request: TaskRequest = read_json(&request_path)?;

    let mut schemas = SchemaCache::empty();
    if let Some(dir) = args.schema_dir {
        schemas = schemas.with_dir(dir);
    }
    if let Some(path) = &args.schema {
        let schema: TaskSchema = read_json(path)?;
        schemas.insert(schema);
    }

    let mut cfg = PopsConfig::from_env();
    if let Some(n) = args.userno {
        cfg = cfg.with_userno(n);
    }
    let mgr = TaskManager::new(cfg, schemas)?;

    let id = mgr.spawn(request)?;
    info!(%id, "task spawned");

    let mut ctrl_c = std::pin::pin!(tokio::signal::ctrl_c());
    loop {
        let m = mgr.clone();
        let step = tokio::task::spawn_blocking(move || {
            let events = m.poll(&id)?;
            Ok::<_, pops_core::CoreError>((events, m.finished(&id)?))
        });
        tokio::select! {
            _ = &mut ctrl_c => {
                warn!(%id, "interrupted; aborting task");
                mgr.abort(&id)?;
                bail!("task aborted");
            }
            step = step => {
                let (events, done) = step??;
                print_events(events);
                if done {
                    break;
                }
            }
        }
    }

    let outputs = mgr.wait_async(id).await?;
    println!("{}", serde_json::to_string_pretty(&outputs)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> anyhow::Result<Args> {
        Args::parse(args.iter().map(|s| s.to_string()))
    }

    #[test]
    fn flags_and_request() {
        let args = parse(&["--schema", "IMEAN.json", "--userno", "42", "req.json"]).unwrap();
        assert_eq!(args.schema, Some(PathBuf::from("IMEAN.json")));
        assert_eq!(args.userno, Some(42));
        assert_eq!(args.request, Some(PathBuf::from("req.json")));
    }

    #[test]
    fn rejects_bad_input() {
        assert!(parse(&["--userno", "x"]).is_err());
        assert!(parse(&["--bogus"]).is_err());
        assert!(parse(&["a.json", "b.json"]).is_err());
        assert!(parse(&["--schema"]).is_err());
    }
}
