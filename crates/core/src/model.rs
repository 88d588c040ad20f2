use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An image attached to a feed entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRef {
    /// Alt text, when the page provides one.
    #[serde(default)]
    pub alt: Option<String>,
    /// Image URL as it appears in the page (often protocol-relative).
    /// `None` when the `img` element has no `src`.
    #[serde(default)]
    pub image: Option<String>,
}

/// One blog action from the recent-actions list.
///
/// Field names mirror the JSON served to clients, which is also the on-disk
/// bootstrap format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedItem {
    /// Handle of the user who acted.
    pub user: String,
    /// Link to the user's profile.
    pub user_profile: String,
    /// Rating colour tag, e.g. `red` from a `user-red` class.
    #[serde(default)]
    pub user_color: Option<String>,
    /// Title of the blog post.
    pub blog_title: String,
    /// Link to the blog post.
    pub blog_link: String,
    /// First image in the entry.
    #[serde(default)]
    pub img: Option<MediaRef>,
    /// Remaining images in the entry.
    #[serde(rename = "otherImg", default)]
    pub other_img: Vec<MediaRef>,
}

/// Immutable, ordered capture of the feed.
///
/// `generation` is assigned by the cache when the snapshot is installed and
/// increases with every install. A filtered view keeps the generation of the
/// snapshot it was computed from, which is how staleness is detected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// Install sequence number of the primary snapshot this belongs to.
    pub generation: u64,
    /// When the items were captured.
    pub captured_at: DateTime<Utc>,
    /// Items in presentation order (most recent first).
    pub items: Vec<FeedItem>,
}

impl Snapshot {
    /// Creates a snapshot.
    pub fn new(generation: u64, captured_at: DateTime<Utc>, items: Vec<FeedItem>) -> Self {
        Self {
            generation,
            captured_at,
            items,
        }
    }

    /// Builds a view of this snapshot that keeps only the given items.
    ///
    /// The result carries the same generation and capture time.
    pub fn derive(&self, items: Vec<FeedItem>) -> Self {
        Self {
            generation: self.generation,
            captured_at: self.captured_at,
            items,
        }
    }

    /// Number of items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True when the snapshot holds no items.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
