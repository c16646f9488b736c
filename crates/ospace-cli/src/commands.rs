use std::path::Path;

use anyhow::{bail, Context};
use colored::Colorize;
use ospace_space::{ArtifactKind, CheckpointKind, CheckpointSummary, ObjectSpace};
use ospace_store::LogFileStore;
use serde_json::{json, Value as Json};
use tracing::debug;

use crate::cli::*;
use crate::config::FileConfig;

/// A space loaded from the log, plus the log it commits to.
struct Session {
    store: LogFileStore,
    space: ObjectSpace,
}

impl Session {
    fn open(path: &Path, config: FileConfig) -> anyhow::Result<Self> {
        let store = LogFileStore::open(path, config.log)
            .with_context(|| format!("opening checkpoint log {}", path.display()))?;
        let space = ObjectSpace::open(&store, config.space)
            .with_context(|| format!("loading object space from {}", path.display()))?;
        debug!(
            log = %path.display(),
            artifacts = space.len(),
            next_seq = store.next_seq(),
            "session opened"
        );
        Ok(Self { store, space })
    }

    fn commit(&mut self) -> anyhow::Result<CheckpointSummary> {
        Ok(self.space.checkpoint(&mut self.store)?)
    }
}

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = FileConfig::load(cli.config.as_deref())?;
    let mut session = Session::open(&cli.log, config)?;
    let format = cli.format;

    match cli.command {
        Command::Ls => cmd_ls(&session, format),
        Command::Show(args) => cmd_show(&session, &args.id, format),
        Command::Create(args) => {
            create(&mut session.space, &args)?;
            report(&mut session, format, &format!("created {} {}", args.kind, args.id))
        }
        Command::Delete(args) => {
            session.space.delete(&args.id)?;
            report(&mut session, format, &format!("deleted {}", args.id))
        }
        Command::Set(args) => {
            session.space.get_value::<String>(&args.id)?.set(args.value)?;
            report(&mut session, format, &format!("set {}", args.id))
        }
        Command::Put(args) => {
            put(&session.space, &args)?;
            report(&mut session, format, &format!("put {}[{}]", args.id, args.key))
        }
        Command::Push(args) => {
            push(&session.space, &args)?;
            report(&mut session, format, &format!("pushed onto {}", args.id))
        }
        Command::Pop(args) => {
            let value = pop(&session.space, &args.id)?;
            report(&mut session, format, &format!("popped {value:?} from {}", args.id))
        }
        Command::Enqueue(args) => {
            session.space.get_queue::<String>(&args.id)?.enqueue(args.value)?;
            report(&mut session, format, &format!("enqueued onto {}", args.id))
        }
        Command::Dequeue(args) => {
            let value = session.space.get_queue::<String>(&args.id)?.dequeue()?;
            report(&mut session, format, &format!("dequeued {value:?} from {}", args.id))
        }
        Command::Add(args) => {
            let added = session.space.get_set::<String>(&args.id)?.add(args.value)?;
            let message = if added { "added to" } else { "already in" };
            report(&mut session, format, &format!("{message} {}", args.id))
        }
        Command::Remove(args) => {
            remove(&session.space, &args)?;
            report(&mut session, format, &format!("removed from {}", args.id))
        }
        Command::Checkpoint(args) => {
            let summary = if args.full {
                session
                    .space
                    .checkpoint_with(&mut session.store, CheckpointKind::Full)?
            } else {
                session.commit()?
            };
            print_summary(&summary, "checkpoint", format)
        }
    }
}

// ---------------------------------------------------------------------------
// Mutations
// ---------------------------------------------------------------------------

fn create(space: &mut ObjectSpace, args: &CreateArgs) -> anyhow::Result<()> {
    let id = args.id.as_str();
    match args.kind {
        ArtifactKind::Value => space.create_value(id, args.value.clone()).map(drop)?,
        ArtifactKind::Array => space.create_array::<String>(id, args.length).map(drop)?,
        ArtifactKind::Stack => space.create_stack::<String>(id).map(drop)?,
        ArtifactKind::Queue => space.create_queue::<String>(id).map(drop)?,
        ArtifactKind::List => space.create_list::<String>(id).map(drop)?,
        ArtifactKind::Set => space.create_set::<String>(id).map(drop)?,
        ArtifactKind::Dictionary => space.create_dictionary::<String, String>(id).map(drop)?,
    }
    Ok(())
}

fn put(space: &ObjectSpace, args: &PutArgs) -> anyhow::Result<()> {
    let value = args.value.clone();
    match space.kind_of(&args.id) {
        Some(ArtifactKind::Array) => {
            space.get_array::<String>(&args.id)?.set(parse_index(&args.key)?, value)?
        }
        Some(ArtifactKind::List) => {
            space.get_list::<String>(&args.id)?.set(parse_index(&args.key)?, value)?
        }
        Some(ArtifactKind::Dictionary) => {
            space
                .get_dictionary::<String, String>(&args.id)?
                .insert(args.key.clone(), value)?;
        }
        Some(kind) => bail!("cannot put into a {kind}"),
        None => bail!("no artifact named `{}`", args.id),
    }
    Ok(())
}

fn push(space: &ObjectSpace, args: &ValueArgs) -> anyhow::Result<()> {
    match space.kind_of(&args.id) {
        Some(ArtifactKind::Stack) => space.get_stack::<String>(&args.id)?.push(args.value.clone())?,
        Some(ArtifactKind::List) => space.get_list::<String>(&args.id)?.push(args.value.clone())?,
        Some(kind) => bail!("cannot push onto a {kind}"),
        None => bail!("no artifact named `{}`", args.id),
    }
    Ok(())
}

fn pop(space: &ObjectSpace, id: &str) -> anyhow::Result<String> {
    Ok(match space.kind_of(id) {
        Some(ArtifactKind::Stack) => space.get_stack::<String>(id)?.pop()?,
        Some(ArtifactKind::List) => {
            let list = space.get_list::<String>(id)?;
            match list.len() {
                0 => bail!("list `{id}` is empty"),
                n => list.remove_at(n - 1)?,
            }
        }
        Some(kind) => bail!("cannot pop from a {kind}"),
        None => bail!("no artifact named `{id}`"),
    })
}

fn remove(space: &ObjectSpace, args: &ValueArgs) -> anyhow::Result<()> {
    let found = match space.kind_of(&args.id) {
        Some(ArtifactKind::Set) => space.get_set::<String>(&args.id)?.remove(&args.value)?,
        Some(ArtifactKind::List) => space.get_list::<String>(&args.id)?.remove(&args.value)?,
        Some(ArtifactKind::Dictionary) => {
            space
                .get_dictionary::<String, String>(&args.id)?
                .remove(&args.value)?;
            true
        }
        Some(kind) => bail!("cannot remove from a {kind}"),
        None => bail!("no artifact named `{}`", args.id),
    };
    if !found {
        bail!("{:?} not found in {}", args.value, args.id);
    }
    Ok(())
}

fn parse_index(key: &str) -> anyhow::Result<usize> {
    key.parse()
        .with_context(|| format!("`{key}` is not a valid index"))
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

fn cmd_ls(session: &Session, format: OutputFormat) -> anyhow::Result<()> {
    let space = &session.space;
    match format {
        OutputFormat::Json => {
            let entries: Vec<Json> = space
                .ids()
                .iter()
                .map(|id| json!({ "id": id.as_str(), "kind": space.kind_of(id.as_str()) }))
                .collect();
            println!("{}", serde_json::to_string_pretty(&entries)?);
        }
        OutputFormat::Text => {
            if space.is_empty() {
                println!("No artifacts.");
            }
            for id in space.ids() {
                let kind = space
                    .kind_of(id.as_str())
                    .map(|k| k.to_string())
                    .unwrap_or_default();
                println!("{:<12} {}", kind.cyan(), id.as_str().bold());
            }
        }
    }
    Ok(())
}

fn cmd_show(session: &Session, id: &str, format: OutputFormat) -> anyhow::Result<()> {
    let space = &session.space;
    let Some(kind) = space.kind_of(id) else {
        bail!("no artifact named `{id}`");
    };
    let contents = contents(space, id, kind)?;
    match format {
        OutputFormat::Json => {
            let doc = json!({ "id": id, "kind": kind, "contents": contents });
            println!("{}", serde_json::to_string_pretty(&doc)?);
        }
        OutputFormat::Text => {
            println!("{} {}", kind.to_string().cyan(), id.bold());
            match &contents {
                Json::Array(items) => {
                    for (i, item) in items.iter().enumerate() {
                        println!("  {:>4}  {}", i.to_string().dimmed(), text(item));
                    }
                }
                Json::Object(entries) => {
                    for (key, value) in entries {
                        println!("  {} = {}", key.yellow(), text(value));
                    }
                }
                other => println!("  {}", text(other)),
            }
        }
    }
    Ok(())
}

fn contents(space: &ObjectSpace, id: &str, kind: ArtifactKind) -> anyhow::Result<Json> {
    Ok(match kind {
        ArtifactKind::Value => json!(space.get_value::<String>(id)?.get()?),
        ArtifactKind::Array => json!(space.get_array::<String>(id)?.to_vec()?),
        ArtifactKind::Stack => json!(space.get_stack::<String>(id)?.to_vec()?),
        ArtifactKind::Queue => json!(space.get_queue::<String>(id)?.to_vec()?),
        ArtifactKind::List => json!(space.get_list::<String>(id)?.to_vec()?),
        ArtifactKind::Set => json!(space.get_set::<String>(id)?.to_vec()?),
        ArtifactKind::Dictionary => Json::Object(
            space
                .get_dictionary::<String, String>(id)?
                .entries()?
                .into_iter()
                .map(|(key, value)| (key, Json::String(value)))
                .collect(),
        ),
    })
}

fn text(value: &Json) -> String {
    match value {
        Json::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

fn report(session: &mut Session, format: OutputFormat, action: &str) -> anyhow::Result<()> {
    let summary = session.commit()?;
    print_summary(&summary, action, format)
}

fn print_summary(summary: &CheckpointSummary, action: &str, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => {
            let doc = json!({ "action": action, "checkpoint": summary });
            println!("{}", serde_json::to_string_pretty(&doc)?);
        }
        OutputFormat::Text => {
            let kind = match summary.kind {
                CheckpointKind::Full => "full",
                CheckpointKind::Differential => "differential",
            };
            println!(
                "{} {} (checkpoint {} {}, {} edits)",
                "✓".green().bold(),
                action,
                format!("#{}", summary.seq).yellow(),
                kind.dimmed(),
                summary.edits
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::Parser;
    use ospace_space::SpaceConfig;
    use ospace_store::LogConfig;

    use super::*;

    fn run(log: &Path, args: &[&str]) -> anyhow::Result<()> {
        let mut argv = vec!["ospace", "--log", log.to_str().unwrap()];
        argv.extend_from_slice(args);
        run_command(Cli::try_parse_from(argv).unwrap())
    }

    fn reopen(log: &Path) -> ObjectSpace {
        let store = LogFileStore::open(log, LogConfig::default()).unwrap();
        ObjectSpace::open(&store, SpaceConfig::default()).unwrap()
    }

    #[test]
    fn each_command_commits_a_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("space.log");

        run(&log, &["create", "stack", "work"]).unwrap();
        run(&log, &["push", "work", "a"]).unwrap();
        run(&log, &["push", "work", "b"]).unwrap();
        run(&log, &["pop", "work"]).unwrap();
        run(&log, &["create", "dictionary", "env"]).unwrap();
        run(&log, &["put", "env", "HOME", "/root"]).unwrap();
        run(&log, &["create", "array", "grid", "--length", "2"]).unwrap();
        run(&log, &["put", "grid", "1", "x"]).unwrap();

        let space = reopen(&log);
        assert_eq!(space.get_stack::<String>("work").unwrap().to_vec().unwrap(), vec!["a"]);
        assert_eq!(
            space
                .get_dictionary::<String, String>("env")
                .unwrap()
                .get(&"HOME".to_string())
                .unwrap()
                .as_deref(),
            Some("/root")
        );
        assert_eq!(space.get_array::<String>("grid").unwrap().to_vec().unwrap(), vec!["", "x"]);
    }

    #[test]
    fn wrong_kind_and_bad_index_fail() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("space.log");
        run(&log, &["create", "set", "tags"]).unwrap();
        assert!(run(&log, &["push", "tags", "x"]).is_err());
        assert!(run(&log, &["remove", "tags", "missing"]).is_err());

        run(&log, &["create", "list", "l"]).unwrap();
        assert!(run(&log, &["put", "l", "first", "x"]).is_err());
        assert!(run(&log, &["pop", "l"]).is_err());
    }

    #[test]
    fn delete_and_queries() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("space.log");
        run(&log, &["create", "queue", "jobs"]).unwrap();
        run(&log, &["enqueue", "jobs", "one"]).unwrap();
        run(&log, &["ls"]).unwrap();
        run(&log, &["--format", "json", "show", "jobs"]).unwrap();
        run(&log, &["delete", "jobs"]).unwrap();
        run(&log, &["checkpoint", "--full"]).unwrap();

        assert!(reopen(&log).is_empty());
        assert!(run(&log, &["show", "jobs"]).is_err());
    }
}
