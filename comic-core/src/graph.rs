//! The branching story graph.
//!
//! Pages are stored in a flat id-keyed arena with parent back-references,
//! never embedded child pointers. This keeps lookup O(1), makes arbitrary
//! jump navigation trivial, and avoids cyclic ownership. A page's
//! `page_index` is its position along one root-to-leaf walk; sibling
//! branches reuse the same indices, so indices are display hints and ids
//! are the only keys.

use crate::beat::Beat;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// Unique identifier for pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageId(pub Uuid);

impl PageId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What kind of page this is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageType {
    Cover,
    Story,
    Letters,
    BackCover,
}

/// Semantic type of a text overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BubbleKind {
    Speech,
    Thought,
    Caption,
    Sfx,
}

/// A placed text overlay on a panel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bubble {
    /// Overlay id, unique within its page.
    #[serde(default)]
    pub id: String,

    /// The displayed text.
    pub text: String,

    /// Semantic type.
    #[serde(rename = "type")]
    pub kind: BubbleKind,

    /// Speaker tag, absent for captions and sound effects.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub character: Option<String>,

    /// Horizontal position as a percentage (0-100).
    #[serde(default = "center_coord")]
    pub x: f32,

    /// Vertical position as a percentage (0-100).
    #[serde(default = "center_coord")]
    pub y: f32,
}

fn center_coord() -> f32 {
    50.0
}

/// Reader sentiment of a fan letter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Negative,
    Confused,
}

/// One fan letter on the letters page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LetterItem {
    /// Fan's name.
    pub user: String,

    /// Fan's location.
    pub location: String,

    /// The letter body.
    pub text: String,

    /// Overall sentiment.
    pub sentiment: Sentiment,
}

/// One unit of the branching story.
///
/// A page is created loading and empty at the moment it is requested,
/// populated when its generation resolves, and never deleted - abandoned
/// branches stay reachable for time travel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page {
    pub id: PageId,

    pub page_type: PageType,

    /// Position along the path that produced this page.
    pub page_index: u32,

    /// The page whose resolved choice produced this one; None only for
    /// the root cover.
    #[serde(default)]
    pub parent_id: Option<PageId>,

    /// The choice text that led here from the parent.
    #[serde(default)]
    pub choice_label: Option<String>,

    /// Generated narrative, absent while pending.
    #[serde(default)]
    pub narrative: Option<Beat>,

    /// Placed text overlays.
    #[serde(default)]
    pub bubbles: Vec<Bubble>,

    /// Forward options; non-empty only on decision pages.
    #[serde(default)]
    pub choices: Vec<String>,

    /// The option the reader picked, once resolved.
    #[serde(default)]
    pub resolved_choice: Option<String>,

    /// Rendered artwork reference (data URL).
    #[serde(default)]
    pub image_url: Option<String>,

    /// Rendered animation reference; supersedes the image for display but
    /// the image is kept for re-derivation.
    #[serde(default)]
    pub video_url: Option<String>,

    /// Generation in progress.
    pub is_loading: bool,

    /// Animation or remix in progress.
    #[serde(default)]
    pub is_animating: bool,

    /// Whether this slot offers a branching choice.
    #[serde(default)]
    pub is_decision_page: bool,

    /// Fan letters, only for letters pages.
    #[serde(default)]
    pub letters_content: Vec<LetterItem>,
}

impl Page {
    /// Create a fresh loading page with no parent.
    pub fn new(id: PageId, page_type: PageType, page_index: u32) -> Self {
        Self {
            id,
            page_type,
            page_index,
            parent_id: None,
            choice_label: None,
            narrative: None,
            bubbles: Vec::new(),
            choices: Vec::new(),
            resolved_choice: None,
            image_url: None,
            video_url: None,
            is_loading: true,
            is_animating: false,
            is_decision_page: false,
            letters_content: Vec::new(),
        }
    }

    /// Create a fresh loading page under a parent.
    pub fn child_of(
        id: PageId,
        page_type: PageType,
        page_index: u32,
        parent_id: PageId,
        choice_label: Option<String>,
    ) -> Self {
        let mut page = Self::new(id, page_type, page_index);
        page.parent_id = Some(parent_id);
        page.choice_label = choice_label;
        page
    }

    /// Whether this is the root cover.
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// The artifact to display: video when present, otherwise image.
    pub fn display_url(&self) -> Option<&str> {
        self.video_url
            .as_deref()
            .or(self.image_url.as_deref())
    }

    /// The raw base64 payload of the rendered image, stripped of any
    /// `data:` URL prefix.
    pub fn image_base64(&self) -> Option<&str> {
        self.image_url
            .as_deref()
            .map(|url| url.rsplit(',').next().unwrap_or(url))
    }
}

/// Flat id-keyed arena of every page ever generated, across all branches.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoryGraph {
    pages: HashMap<PageId, Page>,
}

impl StoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new page. Returns false (and leaves the graph untouched)
    /// if the id is already present; ids are generator-issued, so a
    /// collision is a programming error rather than a runtime condition.
    pub fn insert(&mut self, page: Page) -> bool {
        if self.pages.contains_key(&page.id) {
            return false;
        }
        self.pages.insert(page.id, page);
        true
    }

    /// Look up a page.
    pub fn get(&self, id: PageId) -> Option<&Page> {
        self.pages.get(&id)
    }

    /// Merge an update into an existing page. An unknown id is a silent
    /// no-op: async generation results can race with a graph reset, and a
    /// stale write must not corrupt or crash anything.
    pub fn update(&mut self, id: PageId, f: impl FnOnce(&mut Page)) -> bool {
        match self.pages.get_mut(&id) {
            Some(page) => {
                f(page);
                true
            }
            None => false,
        }
    }

    /// Walk parent links from `id` back to the root, returning the
    /// root-to-node sequence. Empty if `id` is unknown.
    ///
    /// Inserts only ever point `parent_id` at an existing node and ids are
    /// never reused, so the walk always terminates.
    pub fn path_from(&self, id: PageId) -> Vec<PageId> {
        let mut path = Vec::new();
        let mut current = self.pages.get(&id);
        while let Some(page) = current {
            path.push(page.id);
            current = page.parent_id.and_then(|pid| self.pages.get(&pid));
        }
        path.reverse();
        path
    }

    /// All pages whose parent is `id`.
    pub fn children_of(&self, id: PageId) -> Vec<&Page> {
        self.pages
            .values()
            .filter(|page| page.parent_id == Some(id))
            .collect()
    }

    /// The unique root page, if the graph is non-empty.
    pub fn root(&self) -> Option<&Page> {
        self.pages.values().find(|page| page.is_root())
    }

    /// Iterate over all pages in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = &Page> {
        self.pages.values()
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Drop every page. Used on full reset; in-flight results targeting
    /// the old pages become silent no-ops.
    pub fn clear(&mut self) {
        self.pages.clear();
    }
}
