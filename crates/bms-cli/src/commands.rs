use std::fs;
use std::io::{self, Read};
use std::path::Path as FsPath;

use anyhow::{bail, Context};
use bms_block::{apply_patches_to_value, diff_values, parse_path, sort_patches, Block, Patch, Value};
use bms_reconcile::{
    load_schema, ConfigStore, FileConfigStore, ReconcileOutcome, ReconcileSettings, Reconciler,
};
use colored::Colorize;
use tracing::debug;

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let format = cli.format;
    match cli.command {
        Command::Diff(args) => cmd_diff(args, &format),
        Command::Apply(args) => cmd_apply(args),
        Command::Path(args) => cmd_path(args, &format),
        Command::Reconcile(args) => cmd_reconcile(args, &format),
        Command::Log(args) => cmd_log(args, &format),
    }
}

fn cmd_diff(args: DiffArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let schema = read_schema(args.schema.as_deref())?;
    let from = read_value(&args.from)?;
    let to = read_value(&args.to)?;

    let mut patches = diff_values(&from, &to, &schema)?;
    if args.sort {
        sort_patches(&mut patches);
    }
    print_patches(&patches, format)
}

fn cmd_apply(args: ApplyArgs) -> anyhow::Result<()> {
    let base = read_value(&args.base)?;
    let text = read_input(&args.patches)?;
    let patches: Vec<Patch> = serde_json::from_str(&text)
        .with_context(|| format!("{} is not a patch list", args.patches.display()))?;

    let result = apply_patches_to_value(&base, &patches)?;
    let rendered = serde_json::to_string_pretty(&result)?;
    match args.output {
        Some(path) => {
            fs::write(&path, rendered + "\n")
                .with_context(|| format!("cannot write {}", path.display()))?;
            println!("{} Applied {} patches to {}", "✓".green().bold(), patches.len(), path.display());
        }
        None => println!("{rendered}"),
    }
    Ok(())
}

fn cmd_path(args: PathArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let mut invalid = 0;
    let mut parsed = Vec::new();
    for input in &args.paths {
        match parse_path(input) {
            Ok(path) => {
                if let OutputFormat::Text = format {
                    println!("{}  {}", path.to_string().bold(), path.to_json_segments().to_string().dimmed());
                }
                parsed.push(serde_json::json!({
                    "input": input,
                    "canonical": path.to_string(),
                    "segments": path.to_json_segments(),
                }));
            }
            Err(e) => {
                invalid += 1;
                let column = input.get(..e.position).map_or(e.position, |s| s.chars().count());
                eprintln!("{} {}", "error:".red().bold(), e);
                eprintln!("  {input}");
                eprintln!("  {}{}", " ".repeat(column), "^".red());
            }
        }
    }
    if let OutputFormat::Json = format {
        println!("{}", serde_json::to_string_pretty(&parsed)?);
    }
    if invalid > 0 {
        bail!("{invalid} of {} paths are invalid", args.paths.len());
    }
    Ok(())
}

fn cmd_reconcile(args: ReconcileArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let settings = resolve_settings(&args.store)?;
    let reconciler = Reconciler::from_settings(settings)?;
    let generated = read_value(&args.generated)?;

    let outcome = if args.dry_run {
        let store = FileConfigStore::open_read_only(reconciler.settings());
        reconciler.preview(&store, &generated)?.outcome
    } else {
        let store = FileConfigStore::open(reconciler.settings()).with_context(|| {
            format!("cannot open store at {}", reconciler.settings().root.display())
        })?;
        reconciler.reconcile(&store, &generated)?
    };

    if let OutputFormat::Json = format {
        let report = match &outcome {
            ReconcileOutcome::FirstBoot => serde_json::json!({"outcome": "first-boot"}),
            ReconcileOutcome::Unchanged => serde_json::json!({"outcome": "unchanged"}),
            ReconcileOutcome::Applied { patches } => {
                serde_json::json!({"outcome": "applied", "patches": patches})
            }
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let prefix = if args.dry_run { "(dry run) ".dimmed().to_string() } else { String::new() };
    match outcome {
        ReconcileOutcome::FirstBoot => {
            println!("{} {prefix}First boot: adopted generated configuration", "✓".green().bold());
        }
        ReconcileOutcome::Unchanged => {
            println!("{} {prefix}Generated configuration unchanged", "✓".green().bold());
        }
        ReconcileOutcome::Applied { patches } => {
            println!(
                "{} {prefix}Patched active configuration ({} patches)",
                "✓".green().bold(),
                patches.len()
            );
            print_patches(&patches, &OutputFormat::Text)?;
        }
    }
    Ok(())
}

fn cmd_log(args: LogArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let settings = resolve_settings(&args.store)?;
    let store = FileConfigStore::open_read_only(&settings);

    let mut log = store.patch_log()?;
    if let Some(limit) = args.limit {
        let skip = log.len().saturating_sub(limit);
        log.drain(..skip);
    }

    if let OutputFormat::Json = format {
        println!("{}", serde_json::to_string_pretty(&log)?);
        return Ok(());
    }
    if log.is_empty() {
        println!("Patch log is empty.");
        return Ok(());
    }
    for entry in &log {
        println!(
            "{}  {} patches",
            entry.timestamp.to_rfc3339().yellow().bold(),
            entry.patches.len()
        );
        print_patches(&entry.patches, &OutputFormat::Text)?;
    }
    Ok(())
}

fn print_patches(patches: &[Patch], format: &OutputFormat) -> anyhow::Result<()> {
    if let OutputFormat::Json = format {
        println!("{}", serde_json::to_string_pretty(patches)?);
        return Ok(());
    }
    if patches.is_empty() {
        println!("No changes.");
        return Ok(());
    }
    for patch in patches {
        if patch.deleted {
            println!("  {} {}", "delete ".red(), patch.path.to_string().bold());
        } else {
            let value = serde_json::to_string(&patch.value)?;
            println!("  {} {} {}", "replace".green(), patch.path.to_string().bold(), value.dimmed());
        }
    }
    Ok(())
}

/// Settings file first, then command-line overrides.
fn resolve_settings(args: &StoreArgs) -> anyhow::Result<ReconcileSettings> {
    let mut settings = match &args.settings {
        Some(path) => ReconcileSettings::load(path)
            .with_context(|| format!("cannot load settings from {}", path.display()))?,
        None => ReconcileSettings::default(),
    };
    if let Some(root) = &args.root {
        settings.root = root.clone();
    }
    if let Some(schema) = &args.schema {
        settings.schema = Some(schema.clone());
    }
    debug!(?settings, "resolved settings");
    Ok(settings)
}

fn read_schema(path: Option<&FsPath>) -> anyhow::Result<Vec<Block>> {
    match path {
        Some(path) => {
            load_schema(path).with_context(|| format!("cannot load schema from {}", path.display()))
        }
        None => Ok(Vec::new()),
    }
}

fn read_value(path: &FsPath) -> anyhow::Result<Value> {
    let text = read_input(path)?;
    serde_json::from_str(&text).with_context(|| format!("{} is not valid JSON", path.display()))
}

/// `-` reads stdin.
fn read_input(path: &FsPath) -> anyhow::Result<String> {
    if path == FsPath::new("-") {
        let mut text = String::new();
        io::stdin().read_to_string(&mut text).context("cannot read stdin")?;
        return Ok(text);
    }
    fs::read_to_string(path).with_context(|| format!("cannot read {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::tempdir;

    #[test]
    fn store_flags_override_settings_file() {
        let dir = tempdir().unwrap();
        let settings_path = dir.path().join("bms.toml");
        fs::write(&settings_path, "root = \"state\"\nsort_patches = false\n").unwrap();

        let args = StoreArgs {
            settings: Some(settings_path),
            root: Some(PathBuf::from("/elsewhere")),
            schema: Some(PathBuf::from("s.json")),
        };
        let settings = resolve_settings(&args).unwrap();
        assert_eq!(settings.root, PathBuf::from("/elsewhere"));
        assert_eq!(settings.schema, Some(PathBuf::from("s.json")));
        assert!(!settings.sort_patches);
    }

    #[test]
    fn no_store_flags_means_defaults() {
        let settings = resolve_settings(&StoreArgs::default()).unwrap();
        assert_eq!(settings, ReconcileSettings::default());
    }

    #[test]
    fn diff_then_apply_through_files() {
        let dir = tempdir().unwrap();
        let write = |name: &str, text: &str| {
            let path = dir.path().join(name);
            fs::write(&path, text).unwrap();
            path
        };
        let schema = write("schema.json", r#"[{"path": ["objects"], "key": "id"}]"#);
        let from = write("a.json", r#"{"objects": [{"id": 1, "addr": "foo"}]}"#);
        let to = write("b.json", r#"{"objects": [{"id": 1, "addr": "bar"}]}"#);

        let blocks = read_schema(Some(&schema)).unwrap();
        let patches = diff_values(&read_value(&from).unwrap(), &read_value(&to).unwrap(), &blocks).unwrap();
        let patches_path = write("patches.json", &serde_json::to_string(&patches).unwrap());

        let output = dir.path().join("out.json");
        cmd_apply(ApplyArgs { base: from, patches: patches_path, output: Some(output.clone()) }).unwrap();
        assert_eq!(read_value(&output).unwrap(), read_value(&to).unwrap());
    }

    #[test]
    fn reconcile_then_log() {
        let dir = tempdir().unwrap();
        let generated = dir.path().join("gen.json");
        let store = StoreArgs { root: Some(dir.path().join("state")), ..StoreArgs::default() };

        fs::write(&generated, r#"{"name": "a"}"#).unwrap();
        cmd_reconcile(
            ReconcileArgs { generated: generated.clone(), store: store.clone(), dry_run: false },
            &OutputFormat::Text,
        )
        .unwrap();

        fs::write(&generated, r#"{"name": "b"}"#).unwrap();
        cmd_reconcile(
            ReconcileArgs { generated: generated.clone(), store: store.clone(), dry_run: true },
            &OutputFormat::Json,
        )
        .unwrap();
        let opened = FileConfigStore::open(&resolve_settings(&store).unwrap()).unwrap();
        assert!(opened.patch_log().unwrap().is_empty());

        cmd_reconcile(
            ReconcileArgs { generated, store: store.clone(), dry_run: false },
            &OutputFormat::Text,
        )
        .unwrap();
        assert_eq!(opened.patch_log().unwrap().len(), 1);
        assert_eq!(
            opened.active_config().unwrap(),
            Some(Value::from(serde_json::json!({"name": "b"})))
        );

        cmd_log(LogArgs { store, limit: Some(1) }, &OutputFormat::Json).unwrap();
    }

    #[test]
    fn invalid_paths_fail_the_command() {
        let ok = PathArgs { paths: vec!["/a[id=1]/b".into()] };
        assert!(cmd_path(ok, &OutputFormat::Text).is_ok());

        let bad = PathArgs { paths: vec!["/a".into(), "a/b".into()] };
        assert!(cmd_path(bad, &OutputFormat::Json).is_err());
    }

    fn snapshot(root: &FsPath) -> Vec<(PathBuf, Vec<u8>)> {
        let mut files: Vec<(PathBuf, Vec<u8>)> = fs::read_dir(root)
            .unwrap()
            .map(|e| {
                let path = e.unwrap().path();
                let bytes = fs::read(&path).unwrap();
                (path, bytes)
            })
            .collect();
        files.sort();
        files
    }

    #[test]
    fn dry_run_and_log_leave_the_store_untouched() {
        let dir = tempdir().unwrap();
        let generated = dir.path().join("gen.json");
        let state = dir.path().join("state");
        let store = StoreArgs { root: Some(state.clone()), ..StoreArgs::default() };

        fs::write(&generated, r#"{"name": "a"}"#).unwrap();
        cmd_reconcile(
            ReconcileArgs { generated: generated.clone(), store: store.clone(), dry_run: false },
            &OutputFormat::Text,
        )
        .unwrap();
        fs::write(&generated, r#"{"name": "b"}"#).unwrap();
        cmd_reconcile(
            ReconcileArgs { generated: generated.clone(), store: store.clone(), dry_run: false },
            &OutputFormat::Text,
        )
        .unwrap();

        // Leave a torn entry at the end of the log.
        let log_path = state.join("patches.jsonl");
        let mut log = fs::read(&log_path).unwrap();
        log.extend_from_slice(br#"{"timestamp": "2024"#);
        fs::write(&log_path, &log).unwrap();
        let before = snapshot(&state);

        fs::write(&generated, r#"{"name": "c"}"#).unwrap();
        cmd_reconcile(
            ReconcileArgs { generated, store: store.clone(), dry_run: true },
            &OutputFormat::Json,
        )
        .unwrap();
        cmd_log(LogArgs { store, limit: None }, &OutputFormat::Text).unwrap();

        assert_eq!(snapshot(&state), before);
    }

    #[test]
    fn dry_run_does_not_create_the_store() {
        let dir = tempdir().unwrap();
        let generated = dir.path().join("gen.json");
        fs::write(&generated, r#"{"name": "a"}"#).unwrap();
        let state = dir.path().join("state");
        let store = StoreArgs { root: Some(state.clone()), ..StoreArgs::default() };

        cmd_reconcile(
            ReconcileArgs { generated, store: store.clone(), dry_run: true },
            &OutputFormat::Text,
        )
        .unwrap();
        cmd_log(LogArgs { store, limit: Some(3) }, &OutputFormat::Json).unwrap();
        assert!(!state.exists());
    }
}
