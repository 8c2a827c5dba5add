//! Folder materializer: first pass over the plan, folders only.
//!
//! Folders are visited depth-first in pre-order starting under the bookmark
//! bar, so a parent always has an id before any of its children are looked
//! at. Each folder is reused when its resolved parent already holds a folder
//! with exactly the same title, and created otherwise.

use tidymarks_shared::{FolderNode, Result};
use tracing::{debug, info};

use crate::context::RunContext;
use crate::report::RunIssue;

/// Resolve every plan folder to a host folder id, filling the run's
/// resolution table.
///
/// A failed lookup or create skips that folder's subtree; siblings carry on.
pub(crate) async fn materialize(ctx: &mut RunContext<'_>, folders: &[FolderNode]) {
    let total: usize = folders.iter().map(FolderNode::folder_count).sum();
    let mut visited = 0;

    let bar_id = ctx.bookmark_bar_id.clone();
    let mut stack: Vec<(String, &FolderNode)> =
        folders.iter().rev().map(|f| (bar_id.clone(), f)).collect();

    while let Some((parent_id, folder)) = stack.pop() {
        visited += 1;
        match resolve_folder(ctx, &parent_id, &folder.name).await {
            Ok((folder_id, reused)) => {
                ctx.table.insert(&parent_id, &folder.name, &folder_id);
                if reused {
                    ctx.report.folders_reused += 1;
                } else {
                    ctx.report.folders_created += 1;
                }
                ctx.progress
                    .folder_resolved(&folder.name, reused, visited, total);

                let children: Vec<&FolderNode> = folder.subfolders().collect();
                stack.extend(
                    children
                        .into_iter()
                        .rev()
                        .map(|child| (folder_id.clone(), child)),
                );
            }
            Err(e) => ctx.record(RunIssue::FolderOperation {
                parent_id,
                name: folder.name.clone(),
                message: e.to_string(),
            }),
        }
    }

    info!(
        created = ctx.report.folders_created,
        reused = ctx.report.folders_reused,
        resolved = ctx.table.len(),
        "folders materialized"
    );
}

/// Find a direct child folder of `parent_id` titled exactly `name`, or
/// create one. Returns the id and whether it already existed.
async fn resolve_folder(
    ctx: &RunContext<'_>,
    parent_id: &str,
    name: &str,
) -> Result<(String, bool)> {
    let children = ctx.store.get_children(parent_id).await?;
    if let Some(existing) = children.iter().find(|c| c.is_folder() && c.title == name) {
        debug!(id = %existing.id, parent_id, name, "reusing folder");
        return Ok((existing.id.clone(), true));
    }

    let created = ctx.store.create_folder(parent_id, name).await?;
    debug!(id = %created.id, parent_id, name, "created folder");
    Ok((created.id, false))
}
