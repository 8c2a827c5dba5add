//! End-to-end organize pipeline: tree → classifier → validate → folders → moves.
//!
//! The engine runs two passes over an accepted plan. All folders are
//! materialized first, then every bookmark is placed. Failures before the
//! first pass abort the run; failures inside either pass are isolated and
//! collected into the [`RunReport`].

use std::borrow::Cow;

use serde::Deserialize;
use tracing::{info, instrument, warn};

use tidymarks_classifier::{ClassificationRequest, Classifier};
use tidymarks_shared::{Plan, Result, TidymarksError, UnplacedPolicy};
use tidymarks_storage::Storage;
use tidymarks_store::BookmarkStore;

use crate::context::RunContext;
use crate::flatten::TreeSnapshot;
use crate::materialize::materialize;
use crate::place::place;
use crate::preview::{Preview, build_preview};
use crate::report::RunReport;
use crate::validate::{append_to_bar, validate_plan};

// ---------------------------------------------------------------------------
// Inputs and outcomes
// ---------------------------------------------------------------------------

/// The organize trigger: a selector for the classifier, and optionally a
/// plan to execute without classifying.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrganizeRequest {
    pub organization_type: String,
    #[serde(default)]
    pub plan: Option<Plan>,
    /// Stored id of `plan`, recorded with the run.
    #[serde(skip)]
    pub plan_id: Option<String>,
}

impl OrganizeRequest {
    pub fn classify(organization_type: impl Into<String>) -> Self {
        Self {
            organization_type: organization_type.into(),
            plan: None,
            plan_id: None,
        }
    }

    pub fn with_plan(organization_type: impl Into<String>, plan: Plan) -> Self {
        Self {
            organization_type: organization_type.into(),
            plan: Some(plan),
            plan_id: None,
        }
    }
}

/// How an accepted plan is applied.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApplyOptions {
    /// Abort before mutating if validation finds anything.
    pub strict: bool,
    pub unplaced: UnplacedPolicy,
}

/// Where plans come from and where they are recorded.
#[derive(Clone, Copy, Default)]
pub struct PlanSource<'a> {
    pub classifier: Option<&'a dyn Classifier>,
    pub storage: Option<&'a Storage>,
    /// Reuse a stored plan for an identical classifier request.
    pub use_cache: bool,
}

/// A plan ready to apply.
#[derive(Debug, Clone)]
pub struct ObtainedPlan {
    pub plan: Plan,
    pub plan_id: Option<String>,
    pub from_cache: bool,
}

#[derive(Debug, Clone)]
pub struct PreviewOutcome {
    pub plan: Plan,
    pub preview: Preview,
    pub plan_id: Option<String>,
    pub from_cache: bool,
}

#[derive(Debug, Clone)]
pub struct OrganizeOutcome {
    pub report: RunReport,
    pub plan_id: Option<String>,
    pub run_id: Option<String>,
    pub from_cache: bool,
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Progress callback for reporting pipeline status.
pub trait OrganizeProgress: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called after each plan folder is reused or created.
    fn folder_resolved(&self, name: &str, reused: bool, current: usize, total: usize);
    /// Called after each successful move.
    fn bookmark_moved(&self, current: usize, total: usize);
    /// Called when a plan has been applied.
    fn done(&self, report: &RunReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl OrganizeProgress for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn folder_resolved(&self, _name: &str, _reused: bool, _current: usize, _total: usize) {}
    fn bookmark_moved(&self, _current: usize, _total: usize) {}
    fn done(&self, _report: &RunReport) {}
}

// ---------------------------------------------------------------------------
// Steps
// ---------------------------------------------------------------------------

/// Read the whole tree and flatten it.
pub async fn read_snapshot(store: &dyn BookmarkStore) -> Result<TreeSnapshot> {
    let roots = store
        .get_tree()
        .await
        .map_err(|e| TidymarksError::TreeRead(e.to_string()))?;
    let snapshot = TreeSnapshot::from_roots(roots)?;
    info!(
        bookmarks = snapshot.bookmarks.len(),
        existing_folders = snapshot.folders.len(),
        bookmark_bar = %snapshot.bookmark_bar_id,
        "bookmark tree read"
    );
    Ok(snapshot)
}

/// Classifier payload for `snapshot`.
pub fn classification_request(snapshot: &TreeSnapshot, organization_type: &str) -> ClassificationRequest {
    ClassificationRequest {
        organization_type: organization_type.to_string(),
        bookmarks: snapshot.bookmarks.clone(),
        existing_folders: snapshot.folders.clone(),
    }
}

/// Get a plan for `snapshot`, from the cache when allowed, otherwise from
/// the classifier. Fresh plans are stored when storage is available.
#[instrument(skip_all, fields(organization_type = %organization_type))]
pub async fn request_plan(
    source: &PlanSource<'_>,
    snapshot: &TreeSnapshot,
    organization_type: &str,
) -> Result<ObtainedPlan> {
    let classifier = source.classifier.ok_or_else(|| {
        TidymarksError::config("no classifier configured; supply a plan or set the Gemini API key")
    })?;
    let request = classification_request(snapshot, organization_type);
    let model_id = classifier.model_id();
    let request_hash = request.request_hash(model_id);

    if let (true, Some(storage)) = (source.use_cache, source.storage) {
        if let Some(stored) = storage.find_cached_plan(&request_hash, model_id).await? {
            match Plan::parse(&stored.plan_json) {
                Ok(plan) => {
                    info!(plan_id = %stored.id, "using cached plan");
                    return Ok(ObtainedPlan {
                        plan,
                        plan_id: Some(stored.id),
                        from_cache: true,
                    });
                }
                Err(e) => warn!(plan_id = %stored.id, error = %e, "ignoring unreadable cached plan"),
            }
        }
    }

    let plan = classifier.classify(&request).await?;

    let plan_id = match source.storage {
        Some(storage) => {
            let plan_json = serde_json::to_string(&plan)
                .map_err(|e| TidymarksError::validation(format!("failed to encode plan: {e}")))?;
            let id = storage
                .save_plan(organization_type, Some(&request_hash), Some(model_id), &plan_json)
                .await?;
            Some(id)
        }
        None => None,
    };

    Ok(ObtainedPlan {
        plan,
        plan_id,
        from_cache: false,
    })
}

/// Validate `plan` against `snapshot`, then run both passes.
///
/// Only strict-mode validation can fail this call; everything after that is
/// isolated into the returned report.
#[instrument(skip_all, fields(bar = %snapshot.bookmark_bar_id, folders = plan.folder_count()))]
pub async fn apply_plan(
    store: &dyn BookmarkStore,
    snapshot: &TreeSnapshot,
    plan: &Plan,
    options: &ApplyOptions,
    progress: &dyn OrganizeProgress,
) -> Result<RunReport> {
    progress.phase("Validating plan");
    let validation = validate_plan(plan, &snapshot.bookmarks);
    if !validation.is_clean() {
        warn!(summary = %validation.describe(), "plan has reference problems");
        if options.strict {
            return Err(TidymarksError::plan_validation(validation.describe()));
        }
    }

    let plan: Cow<'_, Plan> =
        if options.unplaced == UnplacedPolicy::BookmarkBar && !validation.unplaced.is_empty() {
            let mut owned = plan.clone();
            append_to_bar(&mut owned, &validation.unplaced);
            info!(count = validation.unplaced.len(), "appending unplaced bookmarks to the bar");
            Cow::Owned(owned)
        } else {
            Cow::Borrowed(plan)
        };

    let mut ctx = RunContext::new(
        store,
        progress,
        &snapshot.bookmark_bar_id,
        snapshot.bookmarks.iter().map(|b| b.id.clone()),
    );
    for issue in validation.issues() {
        ctx.record(issue);
    }

    progress.phase("Creating folders");
    materialize(&mut ctx, &plan.bookmarks.folders).await;

    progress.phase("Moving bookmarks");
    place(&mut ctx, &plan).await;

    let report = ctx.report;
    info!(
        created = report.folders_created,
        reused = report.folders_reused,
        moved = report.bookmarks_moved,
        issues = report.issues.len(),
        "plan applied"
    );
    progress.done(&report);
    Ok(report)
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Classify the current tree and render what applying the plan would do.
/// Nothing in the store is changed.
#[instrument(skip_all, fields(organization_type = %organization_type))]
pub async fn preview(
    store: &dyn BookmarkStore,
    source: &PlanSource<'_>,
    organization_type: &str,
    progress: &dyn OrganizeProgress,
) -> Result<PreviewOutcome> {
    progress.phase("Reading bookmarks");
    let snapshot = read_snapshot(store).await?;

    progress.phase("Requesting plan");
    let obtained = request_plan(source, &snapshot, organization_type).await?;
    let preview = build_preview(&snapshot, &obtained.plan);

    Ok(PreviewOutcome {
        plan: obtained.plan,
        preview,
        plan_id: obtained.plan_id,
        from_cache: obtained.from_cache,
    })
}

/// Run the full organize flow.
///
/// 1. Read and flatten the tree
/// 2. Use the given plan, or request one
/// 3. Validate
/// 4. Materialize folders
/// 5. Place bookmarks
///
/// With storage available the run is recorded in the history.
#[instrument(skip_all, fields(organization_type = %request.organization_type))]
pub async fn organize(
    store: &dyn BookmarkStore,
    source: &PlanSource<'_>,
    request: &OrganizeRequest,
    options: &ApplyOptions,
    progress: &dyn OrganizeProgress,
) -> Result<OrganizeOutcome> {
    progress.phase("Reading bookmarks");
    let snapshot = read_snapshot(store).await?;

    let obtained = match &request.plan {
        Some(plan) => ObtainedPlan {
            plan: plan.clone(),
            plan_id: request.plan_id.clone(),
            from_cache: false,
        },
        None => {
            progress.phase("Requesting plan");
            request_plan(source, &snapshot, &request.organization_type).await?
        }
    };

    let run_id = match source.storage {
        Some(storage) => Some(
            storage
                .insert_run(obtained.plan_id.as_deref(), &request.organization_type)
                .await?,
        ),
        None => None,
    };

    let result = apply_plan(store, &snapshot, &obtained.plan, options, progress).await;

    if let (Some(storage), Some(run_id)) = (source.storage, run_id.as_deref()) {
        let (success, report_json) = match &result {
            Ok(report) => (true, serde_json::to_string(report).unwrap_or_default()),
            Err(e) => (false, serde_json::json!({ "error": e.to_string() }).to_string()),
        };
        if let Err(e) = storage.finish_run(run_id, success, &report_json).await {
            warn!(run_id, error = %e, "failed to record run outcome");
        }
    }

    Ok(OrganizeOutcome {
        report: result?,
        plan_id: obtained.plan_id,
        run_id,
        from_cache: obtained.from_cache,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use tidymarks_shared::BookmarkNode;
    use tidymarks_store::MemoryStore;

    use super::*;
    use crate::report::RunIssue;

    // -- fixtures -----------------------------------------------------------

    /// Bar holds "Car videos" (20); other bookmarks holds 10..=13.
    fn seeded_store() -> MemoryStore {
        let store = MemoryStore::new();
        store.insert_folder("20", "1", "Car videos").unwrap();
        store.insert_bookmark("21", "20", "Old clip", "https://youtube.com/watch?v=1").unwrap();
        store.insert_bookmark("10", "2", "Alpha", "https://a.com/").unwrap();
        store.insert_bookmark("11", "2", "Beta", "https://b.com/").unwrap();
        store.insert_bookmark("12", "2", "Gamma", "https://c.com/").unwrap();
        store.insert_bookmark("13", "2", "Delta", "javascript:void(0)").unwrap();
        store
    }

    fn plan(json: &str) -> Plan {
        Plan::parse(json).expect("test plan")
    }

    fn all_placed_plan() -> Plan {
        plan(
            r#"{"bookmarks":{
                "bookmark_bar":{"children":["10"]},
                "folders":[
                    {"name":"Car videos","children":["21"]},
                    {"name":"📚 Reading","children":["11",{"name":"🦀 Rust","children":["12"]}]},
                    {"name":"📁 Misc","children":["13"]}
                ]}}"#,
        )
    }

    async fn apply(store: &dyn BookmarkStore, plan: &Plan, options: ApplyOptions) -> Result<RunReport> {
        let snapshot = read_snapshot(store).await?;
        apply_plan(store, &snapshot, plan, &options, &SilentProgress).await
    }

    fn find_node<'a>(node: &'a BookmarkNode, id: &str) -> Option<&'a BookmarkNode> {
        if node.id == id {
            return Some(node);
        }
        node.child_nodes().iter().find_map(|c| find_node(c, id))
    }

    fn child_titled(tree: &[BookmarkNode], parent: &str, title: &str) -> Option<String> {
        let parent = tree.iter().find_map(|root| find_node(root, parent))?;
        parent
            .child_nodes()
            .iter()
            .find(|c| c.is_folder() && c.title == title)
            .map(|c| c.id.clone())
    }

    /// Wraps a [`MemoryStore`], recording creates and failing chosen calls.
    struct TestStore {
        inner: MemoryStore,
        creates: Mutex<Vec<(String, String, String)>>,
        fail_create_titles: Vec<&'static str>,
        fail_move_ids: Vec<&'static str>,
    }

    impl TestStore {
        fn new(inner: MemoryStore) -> Self {
            Self {
                inner,
                creates: Mutex::new(Vec::new()),
                fail_create_titles: Vec::new(),
                fail_move_ids: Vec::new(),
            }
        }
    }

    #[async_trait]
    impl BookmarkStore for TestStore {
        async fn get_tree(&self) -> Result<Vec<BookmarkNode>> {
            self.inner.get_tree().await
        }

        async fn get_children(&self, folder_id: &str) -> Result<Vec<BookmarkNode>> {
            self.inner.get_children(folder_id).await
        }

        async fn create_folder(&self, parent_id: &str, title: &str) -> Result<BookmarkNode> {
            if self.fail_create_titles.contains(&title) {
                return Err(TidymarksError::HostStore("quota exceeded".into()));
            }
            let node = self.inner.create_folder(parent_id, title).await?;
            self.creates.lock().unwrap().push((
                parent_id.to_string(),
                title.to_string(),
                node.id.clone(),
            ));
            Ok(node)
        }

        async fn move_node(&self, id: &str, parent_id: &str) -> Result<BookmarkNode> {
            if self.fail_move_ids.contains(&id) {
                return Err(TidymarksError::HostStore(format!("Can't move {id}")));
            }
            self.inner.move_node(id, parent_id).await
        }
    }

    struct FakeClassifier {
        plan: Option<Plan>,
        calls: AtomicUsize,
    }

    impl FakeClassifier {
        fn returning(plan: Plan) -> Self {
            Self {
                plan: Some(plan),
                calls: AtomicUsize::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                plan: None,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Classifier for FakeClassifier {
        fn model_id(&self) -> &str {
            "fake-model"
        }

        async fn classify(&self, _request: &ClassificationRequest) -> Result<Plan> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.plan
                .clone()
                .ok_or_else(|| TidymarksError::classification_parse("not valid JSON: expected value"))
        }
    }

    async fn test_storage() -> Storage {
        let tmp = std::env::temp_dir().join(format!("tm_core_{}.db", uuid::Uuid::now_v7()));
        Storage::open(&tmp).await.expect("open test db")
    }

    // -- engine properties --------------------------------------------------

    #[tokio::test]
    async fn misc_folder_scenario() {
        let store = MemoryStore::new();
        store.insert_bookmark("10", "2", "A", "https://a.com/").unwrap();
        store.insert_bookmark("11", "2", "B", "https://b.com/").unwrap();

        let plan = plan(
            r#"{"bookmarks":{"bookmark_bar":{"children":["10"]},
                "folders":[{"name":"📁 Misc","children":["11"]}]}}"#,
        );
        let report = apply(&store, &plan, ApplyOptions::default()).await.unwrap();

        assert_eq!(report.folders_created, 1);
        assert_eq!(report.bookmarks_moved, 2);
        assert!(report.issues.is_empty());

        let tree = store.get_tree().await.unwrap();
        let misc = child_titled(&tree, "1", "📁 Misc").expect("misc folder under bar");
        assert_eq!(store.parent_of("10").as_deref(), Some("1"));
        assert_eq!(store.child_ids(&misc), vec!["11"]);
        assert_eq!(store.child_ids("1"), vec![misc.as_str(), "10"]);
    }

    #[tokio::test]
    async fn second_run_creates_nothing() {
        let store = seeded_store();
        let plan = all_placed_plan();

        let first = apply(&store, &plan, ApplyOptions::default()).await.unwrap();
        assert_eq!(first.folders_created, 3);
        assert_eq!(first.folders_reused, 1);
        let creates_after_first = store.operation_counts().creates;

        let second = apply(&store, &plan, ApplyOptions::default()).await.unwrap();
        assert_eq!(second.folders_created, 0);
        assert_eq!(second.folders_reused, 4);
        assert_eq!(store.operation_counts().creates, creates_after_first);
    }

    #[tokio::test]
    async fn every_bookmark_lands_exactly_once() {
        let store = seeded_store();
        let report = apply(&store, &all_placed_plan(), ApplyOptions::default())
            .await
            .unwrap();
        assert!(report.issues.is_empty());

        let tree = store.get_tree().await.unwrap();
        let reading = child_titled(&tree, "1", "📚 Reading").unwrap();
        let rust = child_titled(&tree, &reading, "🦀 Rust").unwrap();
        let misc = child_titled(&tree, "1", "📁 Misc").unwrap();

        let expected = [
            ("10", "1".to_string()),
            ("21", "20".to_string()),
            ("11", reading.clone()),
            ("12", rust),
            ("13", misc),
        ];
        for (id, parent) in &expected {
            assert_eq!(store.parent_of(id).as_ref(), Some(parent), "bookmark {id}");
        }

        let snapshot = read_snapshot(&store).await.unwrap();
        for bookmark in &snapshot.bookmarks {
            let holders = snapshot
                .roots
                .iter()
                .map(|root| count_occurrences(root, &bookmark.id))
                .sum::<usize>();
            assert_eq!(holders, 1, "bookmark {} appears once", bookmark.id);
        }
    }

    fn count_occurrences(node: &BookmarkNode, id: &str) -> usize {
        usize::from(node.id == id)
            + node
                .child_nodes()
                .iter()
                .map(|c| count_occurrences(c, id))
                .sum::<usize>()
    }

    #[tokio::test]
    async fn parents_are_resolved_before_children() {
        let store = TestStore::new(seeded_store());
        let plan = plan(
            r#"{"bookmarks":{"folders":[
                {"name":"A","children":[{"name":"A1","children":[{"name":"A1x","children":["10"]}]},{"name":"A2","children":["11"]}]},
                {"name":"B","children":[{"name":"B1","children":["12"]}]}
            ]}}"#,
        );
        apply(&store, &plan, ApplyOptions::default()).await.unwrap();

        let creates = store.creates.lock().unwrap().clone();
        let titles: Vec<&str> = creates.iter().map(|(_, t, _)| t.as_str()).collect();
        assert_eq!(titles, vec!["A", "A1", "A1x", "A2", "B", "B1"]);

        let mut known = vec!["1".to_string()];
        for (parent, title, id) in &creates {
            assert!(known.contains(parent), "{title} created before its parent");
            known.push(id.clone());
        }
    }

    #[tokio::test]
    async fn reuse_requires_exact_title() {
        let store = seeded_store();
        let plan = plan(
            r#"{"bookmarks":{"folders":[
                {"name":"Car videos","children":["10"]},
                {"name":"Car Videos","children":["11"]}
            ]}}"#,
        );
        let report = apply(&store, &plan, ApplyOptions::default()).await.unwrap();
        assert_eq!(report.folders_reused, 1);
        assert_eq!(report.folders_created, 1);
        assert_eq!(store.parent_of("10").as_deref(), Some("20"));
        assert_ne!(store.parent_of("11").as_deref(), Some("20"));
    }

    #[tokio::test]
    async fn dangling_reference_is_reported_and_skipped() {
        let store = MemoryStore::new();
        store.insert_bookmark("10", "2", "A", "https://a.com/").unwrap();
        store.insert_bookmark("11", "2", "B", "https://b.com/").unwrap();
        let plan = plan(
            r#"{"bookmarks":{"bookmark_bar":{"children":["10","99"]},
                "folders":[{"name":"📁 Misc","children":["11"]}]}}"#,
        );

        let report = apply(&store, &plan, ApplyOptions::default()).await.unwrap();
        assert_eq!(report.issues, vec![RunIssue::DanglingReference { id: "99".into() }]);
        assert_eq!(report.bookmarks_moved, 2);
        assert_eq!(store.operation_counts().moves, 2);
        assert_eq!(store.parent_of("10").as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn bar_only_plan_moves_without_creating() {
        let store = seeded_store();
        let plan = plan(r#"{"bookmarks":{"bookmark_bar":{"children":["10","11","12","13","21"]},"folders":[]}}"#);
        let report = apply(&store, &plan, ApplyOptions::default()).await.unwrap();

        let counts = store.operation_counts();
        assert_eq!(counts.creates, 0);
        assert_eq!(counts.moves, 5);
        assert_eq!(report.bookmarks_moved, 5);
        assert_eq!(store.child_ids("1"), vec!["20", "10", "11", "12", "13", "21"]);
    }

    #[tokio::test]
    async fn plan_cannot_move_folders() {
        let store = seeded_store();
        let plan = plan(r#"{"bookmarks":{"folders":[{"name":"📁 Misc","children":["20","10"]}]}}"#);
        let report = apply(&store, &plan, ApplyOptions::default()).await.unwrap();
        assert_eq!(store.parent_of("20").as_deref(), Some("1"));
        assert!(report.issues.contains(&RunIssue::DanglingReference { id: "20".into() }));
    }

    #[tokio::test]
    async fn duplicate_reference_moves_once_at_first_position() {
        let store = seeded_store();
        let plan = plan(
            r#"{"bookmarks":{"bookmark_bar":{"children":["10"]},
                "folders":[{"name":"📁 Misc","children":["10","11"]}]}}"#,
        );
        let report = apply(&store, &plan, ApplyOptions::default()).await.unwrap();
        assert_eq!(store.parent_of("10").as_deref(), Some("1"));
        assert_eq!(report.bookmarks_moved, 2);
        assert!(report.issues.contains(&RunIssue::DuplicateReference {
            id: "10".into(),
            occurrences: 2
        }));
    }

    #[tokio::test]
    async fn strict_mode_aborts_before_mutation() {
        let store = seeded_store();
        let plan = plan(r#"{"bookmarks":{"bookmark_bar":{"children":["10"]},"folders":[{"name":"X","children":["11"]}]}}"#);
        let err = apply(
            &store,
            &plan,
            ApplyOptions {
                strict: true,
                ..ApplyOptions::default()
            },
        )
        .await
        .unwrap_err();

        assert!(matches!(err, TidymarksError::PlanValidation { .. }));
        let counts = store.operation_counts();
        assert_eq!((counts.creates, counts.moves), (0, 0));
    }

    #[tokio::test]
    async fn unplaced_policy_appends_to_bar() {
        let store = seeded_store();
        let plan = plan(r#"{"bookmarks":{"bookmark_bar":{"children":["10"]}}}"#);

        let report = apply(
            &store,
            &plan,
            ApplyOptions {
                unplaced: UnplacedPolicy::BookmarkBar,
                ..ApplyOptions::default()
            },
        )
        .await
        .unwrap();

        // Pre-order: 21 (inside "Car videos") comes first.
        assert_eq!(store.child_ids("1"), vec!["20", "10", "21", "11", "12", "13"]);
        let unplaced = report
            .issues
            .iter()
            .filter(|i| matches!(i, RunIssue::UnplacedBookmark { .. }))
            .count();
        assert_eq!(unplaced, 4);
    }

    #[tokio::test]
    async fn unplaced_bookmarks_stay_by_default() {
        let store = seeded_store();
        let plan = plan(r#"{"bookmarks":{"bookmark_bar":{"children":["10"]}}}"#);
        apply(&store, &plan, ApplyOptions::default()).await.unwrap();
        assert_eq!(store.parent_of("11").as_deref(), Some("2"));
        assert_eq!(store.parent_of("21").as_deref(), Some("20"));
    }

    #[tokio::test]
    async fn host_failures_are_isolated() {
        let mut store = TestStore::new(seeded_store());
        store.fail_create_titles = vec!["Broken"];
        store.fail_move_ids = vec!["11"];

        let plan = plan(
            r#"{"bookmarks":{"bookmark_bar":{"children":["11"]},
                "folders":[
                    {"name":"Broken","children":["10",{"name":"Sub","children":["12"]}]},
                    {"name":"Good","children":["13"]}
                ]}}"#,
        );
        let report = apply(&store, &plan, ApplyOptions::default()).await.unwrap();

        assert_eq!(report.folders_created, 1);
        assert_eq!(report.bookmarks_moved, 1);
        let ops: Vec<&RunIssue> = report.operation_issues().collect();
        assert_eq!(ops.len(), 3);
        assert!(matches!(ops[0], RunIssue::FolderOperation { name, .. } if name == "Broken"));
        assert!(matches!(ops[1], RunIssue::MoveOperation { id, .. } if id == "11"));
        assert!(matches!(
            ops[2],
            RunIssue::UnresolvedFolder { name, skipped: 2, .. } if name == "Broken"
        ));

        let tree = store.get_tree().await.unwrap();
        let good = child_titled(&tree, "1", "Good").unwrap();
        assert_eq!(store.inner.parent_of("13"), Some(good));
        assert_eq!(store.inner.parent_of("10").as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn nested_failure_spares_siblings() {
        let mut store = TestStore::new(seeded_store());
        store.fail_create_titles = vec!["A1"];
        let plan = plan(
            r#"{"bookmarks":{"folders":[
                {"name":"A","children":[{"name":"A1","children":["10"]},{"name":"A2","children":["11"]}]},
                {"name":"B","children":["12"]}
            ]}}"#,
        );
        let report = apply(&store, &plan, ApplyOptions::default()).await.unwrap();

        let creates = store.creates.lock().unwrap().clone();
        let titles: Vec<&str> = creates.iter().map(|(_, t, _)| t.as_str()).collect();
        assert_eq!(titles, vec!["A", "A2", "B"]);

        let a_id = creates[0].2.clone();
        let a2_id = creates[1].2.clone();
        assert_eq!(creates[1].0, a_id);
        assert_eq!(store.inner.parent_of("11"), Some(a2_id));
        assert_eq!(store.inner.parent_of("12"), Some(creates[2].2.clone()));
        assert_eq!(store.inner.parent_of("10").as_deref(), Some("2"));

        let ops: Vec<&RunIssue> = report.operation_issues().collect();
        assert_eq!(ops.len(), 2);
        assert!(matches!(
            ops[0],
            RunIssue::FolderOperation { parent_id, name, .. } if parent_id == &a_id && name == "A1"
        ));
        assert!(matches!(
            ops[1],
            RunIssue::UnresolvedFolder { name, skipped: 1, .. } if name == "A1"
        ));
    }

    #[tokio::test]
    async fn unresolved_count_excludes_placed_and_repeated_ids() {
        let mut store = TestStore::new(seeded_store());
        store.fail_create_titles = vec!["Broken"];
        let plan = plan(
            r#"{"bookmarks":{"bookmark_bar":{"children":["10"]},
                "folders":[{"name":"Broken","children":["10","12",{"name":"Sub","children":["12","99"]}]}]}}"#,
        );
        let report = apply(&store, &plan, ApplyOptions::default()).await.unwrap();

        assert_eq!(store.inner.parent_of("10").as_deref(), Some("1"));
        let unresolved: Vec<&RunIssue> = report
            .issues
            .iter()
            .filter(|i| matches!(i, RunIssue::UnresolvedFolder { .. }))
            .collect();
        assert_eq!(
            unresolved,
            vec![&RunIssue::UnresolvedFolder {
                parent_id: "1".into(),
                name: "Broken".into(),
                skipped: 1,
            }]
        );
    }

    #[tokio::test]
    async fn preview_counts_match_apply_for_repeated_sibling_names() {
        let store = seeded_store();
        let plan = plan(
            r#"{"bookmarks":{"folders":[
                {"name":"X","children":["10",{"name":"Inner","children":["11"]}]},
                {"name":"X","children":["12",{"name":"Inner","children":["13"]}]},
                {"name":"Car videos","children":["21"]}
            ]}}"#,
        );

        let snapshot = read_snapshot(&store).await.unwrap();
        let preview = build_preview(&snapshot, &plan);
        assert!(!preview.folders[0].reused);
        assert!(preview.folders[1].reused);
        assert!(preview.folders[1].folders[0].reused);

        let report = apply(&store, &plan, ApplyOptions::default()).await.unwrap();
        assert_eq!(report.folders_created, 2);
        assert_eq!(report.folders_reused, 3);
        assert_eq!(preview.folders_to_create, report.folders_created);
        assert_eq!(preview.folders_to_reuse, report.folders_reused);
    }

    #[tokio::test]
    async fn unknown_parent_folder_is_a_folder_issue() {
        let store = seeded_store();
        let mut snapshot = read_snapshot(&store).await.unwrap();
        snapshot.bookmark_bar_id = "404".into();

        let plan = plan(r#"{"bookmarks":{"folders":[{"name":"X","children":["10"]}]}}"#);
        let report = apply_plan(&store, &snapshot, &plan, &ApplyOptions::default(), &SilentProgress)
            .await
            .unwrap();
        assert!(report
            .issues
            .iter()
            .any(|i| matches!(i, RunIssue::FolderOperation { parent_id, .. } if parent_id == "404")));
        assert_eq!(store.parent_of("10").as_deref(), Some("2"));
    }

    // -- pipeline -----------------------------------------------------------

    #[tokio::test]
    async fn organize_classifies_stores_and_records_run() {
        let store = seeded_store();
        let storage = test_storage().await;
        let classifier = FakeClassifier::returning(all_placed_plan());
        let source = PlanSource {
            classifier: Some(&classifier),
            storage: Some(&storage),
            use_cache: true,
        };

        let outcome = organize(
            &store,
            &source,
            &OrganizeRequest::classify("topic"),
            &ApplyOptions::default(),
            &SilentProgress,
        )
        .await
        .unwrap();

        assert!(!outcome.from_cache);
        assert_eq!(outcome.report.bookmarks_moved, 5);
        let plan_id = outcome.plan_id.expect("plan stored");
        let stored = storage.get_plan(&plan_id).await.unwrap().unwrap();
        assert_eq!(stored.model_id.as_deref(), Some("fake-model"));
        assert_eq!(Plan::parse(&stored.plan_json).unwrap(), all_placed_plan());

        let runs = storage.list_runs(5).await.unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].id, outcome.run_id.unwrap());
        assert_eq!(runs[0].success, Some(true));
        assert_eq!(runs[0].plan_id.as_deref(), Some(plan_id.as_str()));
    }

    #[tokio::test]
    async fn identical_request_hits_cache() {
        let storage = test_storage().await;
        let classifier = FakeClassifier::returning(all_placed_plan());
        let source = PlanSource {
            classifier: Some(&classifier),
            storage: Some(&storage),
            use_cache: true,
        };

        let store = seeded_store();
        let first = preview(&store, &source, "topic", &SilentProgress).await.unwrap();
        let second = preview(&store, &source, "topic", &SilentProgress).await.unwrap();
        assert!(!first.from_cache);
        assert!(second.from_cache);
        assert_eq!(first.plan_id, second.plan_id);
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 1);

        let other_type = preview(&store, &source, "domain", &SilentProgress).await.unwrap();
        assert!(!other_type.from_cache);

        let no_cache = PlanSource {
            use_cache: false,
            ..source
        };
        preview(&store, &no_cache, "topic", &SilentProgress).await.unwrap();
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn preview_leaves_store_untouched() {
        let store = seeded_store();
        let classifier = FakeClassifier::returning(all_placed_plan());
        let source = PlanSource {
            classifier: Some(&classifier),
            ..PlanSource::default()
        };

        let outcome = preview(&store, &source, "topic", &SilentProgress).await.unwrap();
        assert_eq!(outcome.preview.folders_to_create, 3);
        assert_eq!(outcome.preview.folders_to_reuse, 1);
        assert!(outcome.plan_id.is_none());

        let counts = store.operation_counts();
        assert_eq!((counts.creates, counts.moves), (0, 0));
    }

    #[tokio::test]
    async fn classification_failure_aborts_before_mutation() {
        let store = seeded_store();
        let storage = test_storage().await;
        let classifier = FakeClassifier::failing();
        let source = PlanSource {
            classifier: Some(&classifier),
            storage: Some(&storage),
            use_cache: true,
        };

        let err = organize(
            &store,
            &source,
            &OrganizeRequest::classify("topic"),
            &ApplyOptions::default(),
            &SilentProgress,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, TidymarksError::ClassificationParse { .. }));

        let counts = store.operation_counts();
        assert_eq!((counts.creates, counts.moves), (0, 0));
        assert!(storage.list_runs(5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn supplied_plan_skips_classifier() {
        let store = seeded_store();
        let classifier = FakeClassifier::failing();
        let source = PlanSource {
            classifier: Some(&classifier),
            ..PlanSource::default()
        };

        let outcome = organize(
            &store,
            &source,
            &OrganizeRequest::with_plan("topic", all_placed_plan()),
            &ApplyOptions::default(),
            &SilentProgress,
        )
        .await
        .unwrap();
        assert_eq!(outcome.report.bookmarks_moved, 5);
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn missing_classifier_is_config_error() {
        let store = seeded_store();
        let err = organize(
            &store,
            &PlanSource::default(),
            &OrganizeRequest::classify("topic"),
            &ApplyOptions::default(),
            &SilentProgress,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, TidymarksError::Config { .. }));
    }

    #[tokio::test]
    async fn strict_failure_is_recorded_as_failed_run() {
        let store = seeded_store();
        let storage = test_storage().await;
        let source = PlanSource {
            storage: Some(&storage),
            ..PlanSource::default()
        };
        let request = OrganizeRequest::with_plan(
            "topic",
            plan(r#"{"bookmarks":{"bookmark_bar":{"children":["10"]}}}"#),
        );

        let result = organize(
            &store,
            &source,
            &request,
            &ApplyOptions {
                strict: true,
                ..ApplyOptions::default()
            },
            &SilentProgress,
        )
        .await;
        assert!(result.is_err());

        let runs = storage.list_runs(1).await.unwrap();
        assert_eq!(runs[0].success, Some(false));
        assert!(runs[0].report_json.as_deref().unwrap().contains("plan rejected"));
    }

    #[test]
    fn trigger_deserializes_from_host_shape() {
        let request: OrganizeRequest = serde_json::from_str(
            r#"{"organizationType":"topic","plan":{"bookmarks":{"bookmark_bar":{"children":[1]}}}}"#,
        )
        .unwrap();
        assert_eq!(request.organization_type, "topic");
        assert_eq!(request.plan.unwrap().referenced_ids()[0].as_str(), "1");

        let bare: OrganizeRequest = serde_json::from_str(r#"{"organizationType":"domain"}"#).unwrap();
        assert!(bare.plan.is_none());
    }
}
