//! Prompt text sent to the language model.

use tidymarks_shared::{ExistingFolder, FlatBookmark};

/// Instructions describing the plan format the engine accepts.
pub const SYSTEM_PROMPT: &str = r#"# Bookmark Organizer

You organize a user's bookmarks into a folder structure. You refer to
bookmarks only by their id.

## Input
You receive the bookmarks to organize, each as
{ "id": "123", "title": "Example", "url": "https://example.com", "domain": "example.com", "parentId": "1" }
and the folders that already exist, each as
{ "id": "456", "title": "Car videos", "parentId": "1" }.

## Output
Return one JSON object of this shape:

{
  "bookmarks": {
    "bookmark_bar": { "children": ["2", "3"] },
    "folders": [
      {
        "name": "🚀 Development",
        "children": [
          { "name": "📚 Learning", "children": ["8", "9"] },
          "10"
        ]
      },
      { "name": "🎵 Entertainment", "children": ["46", "47"] }
    ]
  }
}

- `bookmark_bar` has no `name`. Its `children` are bookmark ids only.
- Every other folder has a `name`. Its `children` are bookmark ids or nested folders.
- Top-level folders are placed on the bookmark bar.
- Folder names are short and descriptive, with an emoji prefix.
- Nest at most 3 to 4 levels deep.

## Rules
- Output only the JSON object, with no markdown fences or commentary.
- Use only bookmark ids. Never include titles or URLs.
- Include every given bookmark id exactly once.
- Put the most frequently useful bookmarks directly on the bookmark bar.
- Reuse existing folders. When an existing folder already fits, use its
  exact title as the folder `name` instead of inventing a similar one. If
  "Car videos" exists, do not create "Car content" or "Automotive Videos".
"#;

/// Build the user message for one organization request.
///
/// The JSON is pretty-printed with field order fixed by the types, so the
/// same inputs always produce the same text.
pub fn user_content(
    organization_type: &str,
    bookmarks: &[FlatBookmark],
    existing_folders: &[ExistingFolder],
) -> String {
    let bookmarks_json = serde_json::to_string_pretty(bookmarks).unwrap_or_else(|_| "[]".into());
    let folders_json =
        serde_json::to_string_pretty(existing_folders).unwrap_or_else(|_| "[]".into());

    format!(
        "Organization Type: {organization_type}\n\n\
         Bookmarks to organize:\n{bookmarks_json}\n\n\
         Existing Folders:\n{folders_json}\n\n\
         Organize these bookmarks following the instructions. Reuse existing \
         folder names where they fit instead of creating similar new ones.\n"
    )
}

/// The single text part sent to the model: instructions then request.
pub fn combined_prompt(user_content: &str) -> String {
    format!("SYSTEM_PROMPT: {SYSTEM_PROMPT}\nUSER_CONTENT: {user_content}")
}
