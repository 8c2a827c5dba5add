//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tidymarks_classifier::GeminiClassifier;
use tidymarks_core::{
    ApplyOptions, OrganizeProgress, OrganizeRequest, OrganizeResponse, PlanSource, Preview,
    PreviewFolder, PreviewResponse, RunReport, read_snapshot,
};
use tidymarks_shared::{
    AppConfig, Plan, UnplacedPolicy, database_path, init_config, load_config, resolve_api_key,
};
use tidymarks_storage::Storage;
use tidymarks_store::{ChromiumProfile, default_bookmarks_path};
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Tidymarks: let Gemini propose a folder layout, then apply it.
#[derive(Parser)]
#[command(
    name = "tidymarks",
    version,
    about = "Reorganize Chromium bookmarks into a classifier-proposed folder structure.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Handling of bookmarks the plan leaves out.
#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub(crate) enum UnplacedArg {
    Leave,
    BookmarkBar,
}

impl From<UnplacedArg> for UnplacedPolicy {
    fn from(arg: UnplacedArg) -> Self {
        match arg {
            UnplacedArg::Leave => UnplacedPolicy::Leave,
            UnplacedArg::BookmarkBar => UnplacedPolicy::BookmarkBar,
        }
    }
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Show what the classifier would be sent.
    Scan {
        /// Path to a Chromium `Bookmarks` file.
        #[arg(short, long)]
        bookmarks: Option<PathBuf>,

        /// Print the flattened bookmarks and folders as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Request a plan and show what applying it would change.
    Preview {
        /// Organization type passed to the classifier (e.g. topic, domain).
        #[arg(short = 't', long = "type")]
        organization_type: Option<String>,

        #[arg(short, long)]
        bookmarks: Option<PathBuf>,

        /// Always ask the classifier, even for an unchanged tree.
        #[arg(long)]
        no_cache: bool,

        /// Print the preview response as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Apply a stored or hand-written plan without calling the classifier.
    Apply {
        /// Id of a plan in the history database.
        #[arg(long, conflicts_with = "plan_file", required_unless_present = "plan_file")]
        plan_id: Option<String>,

        /// JSON plan file.
        #[arg(long)]
        plan_file: Option<PathBuf>,

        #[arg(short, long)]
        bookmarks: Option<PathBuf>,

        #[arg(long)]
        strict: bool,

        #[arg(long, value_enum)]
        unplaced: Option<UnplacedArg>,

        #[arg(long)]
        json: bool,
    },

    /// Request a plan and apply it.
    Organize {
        #[arg(short = 't', long = "type")]
        organization_type: Option<String>,

        #[arg(short, long)]
        bookmarks: Option<PathBuf>,

        #[arg(long)]
        no_cache: bool,

        /// Refuse to apply a plan with dangling, unplaced or duplicate references.
        #[arg(long)]
        strict: bool,

        /// Where to put bookmarks the plan leaves out.
        #[arg(long, value_enum)]
        unplaced: Option<UnplacedArg>,

        /// Print the organize response as JSON.
        #[arg(long)]
        json: bool,
    },

    /// List recent organize runs.
    History {
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "tidymarks=info",
        1 => "tidymarks=debug",
        _ => "tidymarks=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Scan { bookmarks, json } => cmd_scan(bookmarks, json).await,
        Command::Preview {
            organization_type,
            bookmarks,
            no_cache,
            json,
        } => cmd_preview(organization_type, bookmarks, no_cache, json).await,
        Command::Apply {
            plan_id,
            plan_file,
            bookmarks,
            strict,
            unplaced,
            json,
        } => {
            let source = match (plan_id, plan_file) {
                (_, Some(path)) => PlanInput::File(path),
                (Some(id), None) => PlanInput::Stored(id),
                (None, None) => return Err(eyre!("either --plan-id or --plan-file is required")),
            };
            cmd_apply(source, bookmarks, strict, unplaced, json).await
        }
        Command::Organize {
            organization_type,
            bookmarks,
            no_cache,
            strict,
            unplaced,
            json,
        } => {
            cmd_organize(organization_type, bookmarks, no_cache, strict, unplaced, json).await
        }
        Command::History { limit } => cmd_history(limit).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// Shared setup
// ---------------------------------------------------------------------------

/// `--bookmarks`, then the config file, then the platform default profile.
fn resolve_bookmarks_path(flag: Option<PathBuf>, config: &AppConfig) -> Result<PathBuf> {
    flag.or_else(|| config.defaults.bookmarks_file.as_ref().map(PathBuf::from))
        .or_else(default_bookmarks_path)
        .ok_or_else(|| eyre!("could not locate a Bookmarks file; pass --bookmarks"))
}

fn apply_options(config: &AppConfig, strict: bool, unplaced: Option<UnplacedArg>) -> ApplyOptions {
    ApplyOptions {
        strict: strict || config.organize.strict,
        unplaced: unplaced
            .map(UnplacedPolicy::from)
            .unwrap_or(config.organize.unplaced),
    }
}

fn gemini_classifier(config: &AppConfig) -> Result<GeminiClassifier> {
    let api_key = resolve_api_key(config)?;
    Ok(GeminiClassifier::new(&config.gemini, api_key)?)
}

async fn open_storage() -> Result<Storage> {
    let path = database_path()?;
    Ok(Storage::open(&path).await?)
}

fn save_profile(profile: &ChromiumProfile, path: &Path) -> Result<()> {
    profile.save(path)?;
    info!(path = %path.display(), "bookmarks written");
    Ok(())
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_scan(bookmarks: Option<PathBuf>, json: bool) -> Result<()> {
    let config = load_config()?;
    let path = resolve_bookmarks_path(bookmarks, &config)?;
    let profile = ChromiumProfile::load(&path)?;
    let snapshot = read_snapshot(profile.store()).await?;

    if json {
        let payload = serde_json::json!({
            "bookmarks": snapshot.bookmarks,
            "existingFolders": snapshot.folders,
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }

    println!();
    println!("  File:             {}", path.display());
    println!("  Bookmarks:        {}", snapshot.bookmarks.len());
    println!("  Existing folders: {}", snapshot.folders.len());
    println!("  Bookmark bar id:  {}", snapshot.bookmark_bar_id);
    println!();
    Ok(())
}

async fn cmd_preview(
    organization_type: Option<String>,
    bookmarks: Option<PathBuf>,
    no_cache: bool,
    json: bool,
) -> Result<()> {
    let config = load_config()?;
    let organization_type =
        organization_type.unwrap_or_else(|| config.defaults.organization_type.clone());
    let path = resolve_bookmarks_path(bookmarks, &config)?;
    let profile = ChromiumProfile::load(&path)?;
    let classifier = gemini_classifier(&config)?;
    let storage = open_storage().await?;
    let source = PlanSource {
        classifier: Some(&classifier),
        storage: Some(&storage),
        use_cache: config.organize.use_cache && !no_cache,
    };

    let reporter = CliProgress::new(json);
    let result =
        tidymarks_core::preview(profile.store(), &source, &organization_type, &reporter).await;
    reporter.finish();

    let outcome = match result {
        Ok(outcome) => outcome,
        Err(e) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&PreviewResponse::failed(&e))?);
            }
            return Err(e.into());
        }
    };

    if json {
        let response = PreviewResponse::ok(outcome.preview, outcome.plan);
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    print_preview(&outcome.preview);
    if let Some(id) = &outcome.plan_id {
        let cached = if outcome.from_cache { " (cached)" } else { "" };
        println!("  Plan id: {id}{cached}");
        println!("  Apply it with: tidymarks apply --plan-id {id}");
        println!();
    }
    Ok(())
}

/// Where `apply` gets its plan from.
enum PlanInput {
    Stored(String),
    File(PathBuf),
}

async fn cmd_apply(
    input: PlanInput,
    bookmarks: Option<PathBuf>,
    strict: bool,
    unplaced: Option<UnplacedArg>,
    json: bool,
) -> Result<()> {
    let config = load_config()?;
    let storage = open_storage().await?;

    let request = match input {
        PlanInput::Stored(id) => {
            let stored = storage
                .get_plan(&id)
                .await?
                .ok_or_else(|| eyre!("no stored plan with id '{id}'"))?;
            let plan = Plan::parse(&stored.plan_json)?;
            OrganizeRequest {
                organization_type: stored.organization_type,
                plan: Some(plan),
                plan_id: Some(stored.id),
            }
        }
        PlanInput::File(path) => {
            let content = std::fs::read_to_string(&path)
                .map_err(|e| eyre!("cannot read plan file '{}': {e}", path.display()))?;
            let plan = Plan::parse(&content)?;
            let plan_id = storage
                .save_plan("imported", None, None, &serde_json::to_string(&plan)?)
                .await?;
            info!(plan_id = %plan_id, path = %path.display(), "imported plan");
            OrganizeRequest {
                organization_type: "imported".to_string(),
                plan: Some(plan),
                plan_id: Some(plan_id),
            }
        }
    };

    let path = resolve_bookmarks_path(bookmarks, &config)?;
    let options = apply_options(&config, strict, unplaced);
    let source = PlanSource {
        storage: Some(&storage),
        ..PlanSource::default()
    };
    execute(&path, &source, &request, &options, json).await
}

async fn cmd_organize(
    organization_type: Option<String>,
    bookmarks: Option<PathBuf>,
    no_cache: bool,
    strict: bool,
    unplaced: Option<UnplacedArg>,
    json: bool,
) -> Result<()> {
    let config = load_config()?;
    let organization_type =
        organization_type.unwrap_or_else(|| config.defaults.organization_type.clone());
    let path = resolve_bookmarks_path(bookmarks, &config)?;
    let classifier = gemini_classifier(&config)?;
    let storage = open_storage().await?;
    let source = PlanSource {
        classifier: Some(&classifier),
        storage: Some(&storage),
        use_cache: config.organize.use_cache && !no_cache,
    };
    let options = apply_options(&config, strict, unplaced);

    info!(organization_type = %organization_type, path = %path.display(), "organizing bookmarks");
    execute(
        &path,
        &source,
        &OrganizeRequest::classify(organization_type),
        &options,
        json,
    )
    .await
}

/// Load the profile, run the pipeline, and write the profile back when the
/// tree may have changed.
async fn execute(
    path: &Path,
    source: &PlanSource<'_>,
    request: &OrganizeRequest,
    options: &ApplyOptions,
    json: bool,
) -> Result<()> {
    let profile = ChromiumProfile::load(path)?;
    let reporter = CliProgress::new(json);
    let result =
        tidymarks_core::organize(profile.store(), source, request, options, &reporter).await;
    reporter.finish();

    let outcome = match result {
        Ok(outcome) => outcome,
        Err(e) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&OrganizeResponse::from_error(&e))?);
            }
            return Err(e.into());
        }
    };

    let report = &outcome.report;
    if report.folders_created > 0 || report.bookmarks_moved > 0 {
        save_profile(&profile, path)?;
    } else {
        warn!("nothing changed; bookmarks file left untouched");
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&OrganizeResponse::from_report(report))?);
        return Ok(());
    }

    print_report(report);
    if let Some(run_id) = &outcome.run_id {
        println!("  Run id:  {run_id}");
    }
    if let Some(plan_id) = &outcome.plan_id {
        let cached = if outcome.from_cache { " (cached)" } else { "" };
        println!("  Plan id: {plan_id}{cached}");
    }
    println!();
    Ok(())
}

async fn cmd_history(limit: usize) -> Result<()> {
    let path = database_path()?;
    let storage = Storage::open_readonly(&path).await?;
    let runs = storage.list_runs(limit).await?;

    if runs.is_empty() {
        println!("No runs recorded yet.");
        return Ok(());
    }

    println!();
    for run in runs {
        let status = match run.success {
            Some(true) => "ok",
            Some(false) => "failed",
            None => "unfinished",
        };
        println!(
            "  {}  {:<10}  {:<12}  {}",
            run.started_at.format("%Y-%m-%d %H:%M:%S"),
            status,
            run.organization_type,
            run.id
        );
    }
    println!();
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

fn print_preview(preview: &Preview) {
    println!();
    println!("  Bookmarks bar");
    for b in &preview.bookmark_bar {
        println!("    - {} ({})", b.title, b.domain);
    }
    for folder in &preview.folders {
        print_folder(folder, 1);
    }
    println!();
    println!(
        "  {} folder(s) to create, {} to reuse",
        preview.folders_to_create, preview.folders_to_reuse
    );
    if !preview.unplaced.is_empty() {
        println!("  {} bookmark(s) not in the plan", preview.unplaced.len());
    }
    if !preview.dangling.is_empty() {
        println!("  Unknown ids in plan: {}", preview.dangling.join(", "));
    }
    println!();
}

fn print_folder(folder: &PreviewFolder, depth: usize) {
    let indent = "  ".repeat(depth + 1);
    let marker = if folder.reused { "" } else { " [new]" };
    println!("{indent}{}/{marker}", folder.name);
    for b in &folder.bookmarks {
        println!("{indent}  - {} ({})", b.title, b.domain);
    }
    for sub in &folder.folders {
        print_folder(sub, depth + 1);
    }
}

fn print_report(report: &RunReport) {
    println!();
    println!("  {}", report.summary());
    for issue in &report.issues {
        println!("    ! {issue}");
    }
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    /// Hidden in JSON mode so stdout stays machine-readable.
    fn new(quiet: bool) -> Self {
        if quiet {
            return Self {
                spinner: ProgressBar::hidden(),
            };
        }
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }

    fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}

impl OrganizeProgress for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn folder_resolved(&self, name: &str, reused: bool, current: usize, total: usize) {
        let verb = if reused { "Reusing" } else { "Creating" };
        self.spinner
            .set_message(format!("{verb} folder [{current}/{total}] {name}"));
    }

    fn bookmark_moved(&self, current: usize, total: usize) {
        self.spinner
            .set_message(format!("Moving bookmarks [{current}/{total}]"));
    }

    fn done(&self, _report: &RunReport) {
        self.spinner.finish_and_clear();
    }
}
