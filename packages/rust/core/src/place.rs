//! Bookmark placer: second pass over the plan, bookmarks only.
//!
//! Bar references move first, then each folder tree depth-first with its
//! children handled in plan order. A move appends to the end of the target,
//! so the plan's order becomes the final sibling order.

use std::collections::HashSet;
use std::slice;

use tidymarks_shared::{BookmarkRef, FolderNode, Plan, PlanChild};
use tracing::{debug, info};

use crate::context::RunContext;
use crate::report::RunIssue;

/// Move every known bookmark in `plan` to its resolved folder.
pub(crate) async fn place(ctx: &mut RunContext<'_>, plan: &Plan) {
    let total = placeable_count(ctx, plan);
    let bar_id = ctx.bookmark_bar_id.clone();

    for reference in &plan.bookmarks.bookmark_bar.children {
        move_bookmark(ctx, reference, &bar_id, total).await;
    }

    for root in &plan.bookmarks.folders {
        let Some(root_id) = ctx.table.get(&bar_id, &root.name).map(String::from) else {
            skip_unresolved(ctx, &bar_id, root);
            continue;
        };

        let mut stack: Vec<(String, slice::Iter<'_, PlanChild>)> =
            vec![(root_id, root.children.iter())];
        loop {
            let Some((folder_id, children)) = stack.last_mut() else {
                break;
            };
            let next = children.next();
            let folder_id = folder_id.clone();

            match next {
                None => {
                    stack.pop();
                }
                Some(PlanChild::Bookmark(reference)) => {
                    move_bookmark(ctx, reference, &folder_id, total).await;
                }
                Some(PlanChild::Folder(sub)) => match ctx.table.get(&folder_id, &sub.name) {
                    Some(sub_id) => stack.push((sub_id.to_string(), sub.children.iter())),
                    None => skip_unresolved(ctx, &folder_id, sub),
                },
            }
        }
    }

    info!(
        moved = ctx.report.bookmarks_moved,
        planned = total,
        "bookmarks placed"
    );
}

/// Distinct known ids in the plan, i.e. the moves this pass will attempt
/// at most.
fn placeable_count(ctx: &RunContext<'_>, plan: &Plan) -> usize {
    let mut seen = HashSet::new();
    plan.referenced_ids()
        .into_iter()
        .filter(|r| ctx.known.contains(r.as_str()) && seen.insert(r.as_str()))
        .count()
}

fn skip_unresolved(ctx: &mut RunContext<'_>, parent_id: &str, folder: &FolderNode) {
    let mut seen = HashSet::new();
    let skipped = folder
        .bookmark_refs()
        .into_iter()
        .map(|r| r.as_str())
        .filter(|id| ctx.known.contains(*id) && !ctx.placed.contains(*id) && seen.insert(*id))
        .count();
    ctx.record(RunIssue::UnresolvedFolder {
        parent_id: parent_id.to_string(),
        name: folder.name.clone(),
        skipped,
    });
}

async fn move_bookmark(
    ctx: &mut RunContext<'_>,
    reference: &BookmarkRef,
    parent_id: &str,
    total: usize,
) {
    let id = reference.as_str();
    if !ctx.known.contains(id) {
        debug!(id, "skipping reference to unknown bookmark");
        return;
    }
    if !ctx.placed.insert(id.to_string()) {
        debug!(id, "skipping repeated reference");
        return;
    }

    match ctx.store.move_node(id, parent_id).await {
        Ok(_) => {
            ctx.report.bookmarks_moved += 1;
            debug!(id, parent_id, "bookmark moved");
            ctx.progress
                .bookmark_moved(ctx.report.bookmarks_moved, total);
        }
        Err(e) => ctx.record(RunIssue::MoveOperation {
            id: id.to_string(),
            parent_id: parent_id.to_string(),
            message: e.to_string(),
        }),
    }
}
