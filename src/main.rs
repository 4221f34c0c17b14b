use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use colored::Colorize;
use config_patcher::config::{
    apply_patches, check_patches, discover, load_from_path, ApplyOutcome, FileChange,
    Metadata, Operation, PatchConfig, PatchDefinition, PatchReport,
};
use config_patcher::patch::ConfigValue;
use config_patcher::recipes::{
    model_patches, resource_patches, AnyOf, ConfigFlavor, EntityMapping, IdentityKind,
    KnownSymbols, ModelChoices, Recipe, ResourceChoices, SourceTreeLookup, SymbolLookup,
};
use serde_json::json;
use similar::{ChangeTag, TextDiff};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

mod logging;

#[derive(Parser)]
#[command(name = "config-patcher")]
#[command(about = "Minimal-diff, idempotent YAML and XML configuration patching", long_about = None)]
#[command(version)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Print a JSON report on stdout instead of the colored one
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
struct RunArgs {
    /// Project root; every target must stay inside it
    #[arg(short, long, default_value = ".")]
    root: PathBuf,

    /// Show what would change without writing anything
    #[arg(short = 'n', long)]
    dry_run: bool,

    /// Show a unified diff of every changed file
    #[arg(short, long)]
    diff: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply patch sets to a project
    Apply {
        /// Patch set files (default: every *.toml in <root>/patches)
        #[arg(short, long)]
        patches: Vec<PathBuf>,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Report what applying would change; exits 1 if anything would
    Check {
        /// Patch set files (default: every *.toml in <root>/patches)
        #[arg(short, long)]
        patches: Vec<PathBuf>,

        /// Project root
        #[arg(short, long, default_value = ".")]
        root: PathBuf,

        /// Show a unified diff of every file that would change
        #[arg(short, long)]
        diff: bool,
    },

    /// Set the value at a dotted key path in a YAML file
    Set {
        file: String,
        path: String,
        /// YAML scalar or flow value; plain string otherwise
        value: String,

        /// Leave an existing value alone
        #[arg(long)]
        if_absent: bool,

        /// Treat a missing file as an empty document
        #[arg(long)]
        create_missing: bool,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Append a value to the list at a dotted key path unless present
    Append {
        file: String,
        path: String,
        value: String,

        /// Treat a missing file as an empty document
        #[arg(long)]
        create_missing: bool,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Ensure an XML element exists and carries the given attributes
    EnsureElement {
        file: String,
        /// e.g. /phpunit/php/env[@name='APP_ENV']
        selector: String,

        /// Attribute to set, as name=value
        #[arg(long = "attr", value_parser = parse_attribute)]
        attributes: Vec<(String, String)>,

        /// Treat a missing file as an empty document
        #[arg(long)]
        create_missing: bool,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Configuration changes made by the project generators
    Recipe {
        #[command(subcommand)]
        recipe: RecipeCommand,
    },
}

#[derive(Subcommand)]
enum RecipeCommand {
    /// Doctrine mapping for a new domain model
    Model {
        name: String,

        #[arg(long, default_value = "none")]
        identity: IdentityKind,

        #[arg(long, default_value = "none")]
        entity: EntityMapping,

        /// Append `Model` to the class name
        #[arg(long)]
        with_suffix: bool,

        #[command(flatten)]
        run: RunArgs,
    },

    /// API Platform mapping for an existing model
    Resource {
        name: String,

        #[arg(long, default_value = "attribute")]
        flavor: ConfigFlavor,

        /// Module below src/, e.g. Catalog
        #[arg(long)]
        base_path: Option<String>,

        /// Class to treat as existing in addition to those found under src/
        #[arg(long = "existing-class")]
        existing_classes: Vec<String>,

        #[command(flatten)]
        run: RunArgs,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    if cli.global.no_color || cli.global.json {
        colored::control::set_override(false);
    }
    logging::init_logging(&cli.global)?;

    let ok = match cli.command {
        Commands::Apply { patches, run } => cmd_apply(&cli.global, patches, &run, false)?,
        Commands::Check {
            patches,
            root,
            diff,
        } => {
            let run = RunArgs {
                root,
                dry_run: true,
                diff,
            };
            cmd_apply(&cli.global, patches, &run, true)?
        }
        Commands::Set {
            file,
            path,
            value,
            if_absent,
            create_missing,
            run,
        } => {
            let value = ConfigValue::parse_inline(&value);
            let operation = if if_absent {
                Operation::SetIfAbsent { path, value }
            } else {
                Operation::SetValue { path, value }
            };
            cmd_single(&cli.global, file, create_missing, operation, &run)?
        }
        Commands::Append {
            file,
            path,
            value,
            create_missing,
            run,
        } => {
            let operation = Operation::AppendToList {
                path,
                value: ConfigValue::parse_inline(&value),
            };
            cmd_single(&cli.global, file, create_missing, operation, &run)?
        }
        Commands::EnsureElement {
            file,
            selector,
            attributes,
            create_missing,
            run,
        } => {
            let operation = Operation::EnsureElement {
                selector,
                attributes: attributes.into_iter().collect::<BTreeMap<_, _>>(),
            };
            cmd_single(&cli.global, file, create_missing, operation, &run)?
        }
        Commands::Recipe { recipe } => cmd_recipe(&cli.global, recipe)?,
    };

    if !ok {
        std::process::exit(1);
    }
    Ok(())
}

fn parse_attribute(input: &str) -> Result<(String, String), String> {
    match input.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected name=value, got '{input}'")),
    }
}

/// Patch set files named on the command line, or everything under
/// `<root>/patches`.
fn patch_files(root: &Path, explicit: Vec<PathBuf>) -> Result<Vec<PathBuf>> {
    if !explicit.is_empty() {
        return Ok(explicit);
    }
    let dir = root.join("patches");
    let files = discover(&dir)?;
    if files.is_empty() {
        anyhow::bail!(
            "no patch sets given and no *.toml files found in {}",
            dir.display()
        );
    }
    Ok(files)
}

/// Returns false when a patch failed, or when checking found changes.
fn cmd_apply(
    global: &GlobalArgs,
    patches: Vec<PathBuf>,
    run: &RunArgs,
    fail_on_change: bool,
) -> Result<bool> {
    let files = patch_files(&run.root, patches)?;
    let mut report = Report::new(global, run);
    report.fail_on_change = fail_on_change;

    if !global.json {
        println!("Project: {}", run.root.display());
        if run.dry_run {
            println!("{}", "[DRY RUN - nothing will be written]".cyan());
        }
        println!();
    }

    for file in files {
        if !global.json {
            println!("Loading patches from {}...", file.display());
        }
        let config = load_from_path(&file)?;
        report.run(&config)?;
    }

    Ok(report.finish())
}

fn cmd_single(
    global: &GlobalArgs,
    file: String,
    create_missing: bool,
    operation: Operation,
    run: &RunArgs,
) -> Result<bool> {
    let config = PatchConfig {
        meta: Metadata {
            name: "command-line".to_string(),
            description: None,
        },
        patches: vec![PatchDefinition {
            id: operation.kind().to_string(),
            file,
            format: None,
            create_missing,
            operation,
        }],
    };
    config.validate().context("invalid patch")?;

    let mut report = Report::new(global, run);
    report.run(&config)?;
    Ok(report.finish())
}

fn cmd_recipe(global: &GlobalArgs, command: RecipeCommand) -> Result<bool> {
    let (recipe, run): (Recipe, RunArgs) = match command {
        RecipeCommand::Model {
            name,
            identity,
            entity,
            with_suffix,
            run,
        } => {
            let choices = ModelChoices {
                with_suffix,
                identity,
                entity,
                ..ModelChoices::new(name)
            };
            if !global.json {
                println!("Model: {}", choices.names()?);
            }
            (model_patches(&choices)?, run)
        }
        RecipeCommand::Resource {
            name,
            flavor,
            base_path,
            existing_classes,
            run,
        } => {
            let choices = ResourceChoices {
                flavor,
                base_path,
                ..ResourceChoices::new(name)
            };
            let tree = SourceTreeLookup::new(&run.root);
            let known = KnownSymbols::new(existing_classes);
            let lookup = AnyOf(vec![&tree as &dyn SymbolLookup, &known]);
            (resource_patches(&choices, &lookup)?, run)
        }
    };

    if recipe.patches.is_empty() {
        if global.json {
            println!("{}", json!({ "recipe": recipe.name, "patches": [] }));
        } else {
            println!("{} {}: nothing to configure", "⊘".cyan(), recipe.name);
        }
        return Ok(true);
    }

    if !global.json {
        println!("{}", recipe.description.dimmed());
        println!();
    }
    let mut report = Report::new(global, &run);
    report.run(&recipe.into_config())?;
    Ok(report.finish())
}

#[derive(Default)]
struct Totals {
    applied: usize,
    already_applied: usize,
    skipped: usize,
    failed: usize,
}

/// Collects outcomes across patch sets and prints them.
struct Report<'a> {
    global: &'a GlobalArgs,
    run: &'a RunArgs,
    /// `check` treats pending changes as a failure; `--dry-run` only
    /// previews them.
    fail_on_change: bool,
    totals: Totals,
    entries: Vec<serde_json::Value>,
    changed: Vec<String>,
}

impl<'a> Report<'a> {
    fn new(global: &'a GlobalArgs, run: &'a RunArgs) -> Self {
        Self {
            global,
            run,
            fail_on_change: false,
            totals: Totals::default(),
            entries: Vec::new(),
            changed: Vec::new(),
        }
    }

    fn run(&mut self, config: &PatchConfig) -> Result<()> {
        let outcome = if self.run.dry_run {
            check_patches(config, &self.run.root)?
        } else {
            apply_patches(config, &self.run.root)?
        };
        self.record(&config.meta.name, &outcome)
    }

    fn record(&mut self, set: &str, outcome: &ApplyOutcome) -> Result<()> {
        for (patch_id, result) in &outcome.results {
            match result {
                Ok(report) => {
                    match report {
                        PatchReport::Applied { .. } => self.totals.applied += 1,
                        PatchReport::AlreadyApplied { .. } => self.totals.already_applied += 1,
                        PatchReport::Skipped { .. } => self.totals.skipped += 1,
                    }
                    if self.global.json {
                        let mut entry = serde_json::to_value(report)?;
                        entry["id"] = json!(patch_id);
                        entry["set"] = json!(set);
                        self.entries.push(entry);
                    } else {
                        self.print_report(patch_id, report);
                    }
                }
                Err(error) => {
                    self.totals.failed += 1;
                    if self.global.json {
                        self.entries.push(json!({
                            "id": patch_id,
                            "set": set,
                            "status": "failed",
                            "error": error.to_string(),
                        }));
                    } else {
                        eprintln!("{} {}: Error - {}", "✗".red(), patch_id, error);
                    }
                }
            }
        }

        for change in &outcome.changes {
            self.changed.push(change.file.clone());
            if self.run.diff && !self.global.json {
                display_diff(change);
            }
        }

        if !self.global.json {
            println!();
        }
        Ok(())
    }

    fn print_report(&self, patch_id: &str, report: &PatchReport) {
        match report {
            PatchReport::Applied { file } => {
                let verb = if self.run.dry_run {
                    "Would apply to"
                } else {
                    "Applied to"
                };
                println!("{} {}: {} {}", "✓".green(), patch_id, verb, file);
            }
            PatchReport::AlreadyApplied { file, reason } => {
                println!(
                    "{} {}: Already applied to {} ({})",
                    "⊙".yellow(),
                    patch_id,
                    file,
                    reason.dimmed()
                );
            }
            PatchReport::Skipped { reason, .. } => {
                println!("{} {}: Skipped ({})", "⊘".cyan(), patch_id, reason);
            }
        }
    }

    /// Print the summary; returns whether the run counts as a success.
    fn finish(self) -> bool {
        let Totals {
            applied,
            already_applied,
            skipped,
            failed,
        } = self.totals;

        if self.global.json {
            let document = json!({
                "dry_run": self.run.dry_run,
                "patches": self.entries,
                "changed_files": self.changed,
                "summary": {
                    "applied": applied,
                    "already_applied": already_applied,
                    "skipped": skipped,
                    "failed": failed,
                },
            });
            println!("{document:#}");
        } else {
            println!("{}", "Summary:".bold());
            let applied_label = if self.run.dry_run {
                "would apply"
            } else {
                "applied"
            };
            println!("  {} {}", applied.to_string().green(), applied_label);
            println!(
                "  {} already applied",
                already_applied.to_string().yellow()
            );
            println!("  {} skipped", skipped.to_string().cyan());
            println!("  {} failed", failed.to_string().red());
        }

        failed == 0 && !(self.fail_on_change && applied > 0)
    }
}

fn display_diff(change: &FileChange) {
    let label = if change.created {
        "/dev/null".to_string()
    } else {
        format!("{} (original)", change.file)
    };
    println!("\n{}", format!("--- {label}").dimmed());
    println!("{}", format!("+++ {} (patched)", change.file).dimmed());

    let diff = TextDiff::from_lines(&change.before, &change.after);
    for hunk in diff.unified_diff().context_radius(3).iter_hunks() {
        println!("{}", hunk.header().to_string().cyan());
        for line in hunk.iter_changes() {
            let text = match line.tag() {
                ChangeTag::Delete => format!("-{line}").red(),
                ChangeTag::Insert => format!("+{line}").green(),
                ChangeTag::Equal => format!(" {line}").normal(),
            };
            print!("{text}");
            if line.missing_newline() {
                println!();
            }
        }
    }
}
