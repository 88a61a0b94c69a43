use serde::{Deserialize, Serialize};

/// Which list a window belongs to; the serialized names are the wire codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum WindowKind {
    #[serde(rename = "updsw")]
    Search,
    #[serde(rename = "updlw")]
    Liked,
    #[serde(rename = "updtw")]
    Top,
}

/// Self-describing page reference, round-tripped through the front end.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageToken {
    #[serde(rename = "q")]
    pub kind: WindowKind,
    #[serde(rename = "wsz")]
    pub size: usize,
    /// 1-based.
    #[serde(rename = "wpos")]
    pub position: usize,
    #[serde(rename = "now")]
    pub total: usize,
}

pub fn total_windows(count: usize, size: usize) -> usize {
    if size == 0 {
        return 0;
    }
    count.div_ceil(size)
}

impl PageToken {
    /// First window over `count` items; `None` when there is nothing to show.
    pub fn first(kind: WindowKind, size: usize, count: usize) -> Option<Self> {
        let total = total_windows(count, size);
        if total == 0 {
            return None;
        }
        Some(Self {
            kind,
            size,
            position: 1,
            total,
        })
    }

    pub fn encode(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    pub fn decode(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// Items of this window; positions past the end give an empty slice.
    pub fn slice<'a, T>(&self, items: &'a [T]) -> &'a [T] {
        let start = self
            .position
            .saturating_sub(1)
            .saturating_mul(self.size)
            .min(items.len());
        let end = self.position.saturating_mul(self.size).min(items.len());
        &items[start..end]
    }

    pub fn previous(&self) -> Option<Self> {
        if self.position <= 1 {
            return None;
        }
        Some(Self {
            position: self.position - 1,
            ..*self
        })
    }

    pub fn next(&self) -> Option<Self> {
        if self.position >= self.total {
            return None;
        }
        Some(Self {
            position: self.position + 1,
            ..*self
        })
    }

    pub fn label(&self) -> String {
        format!("{}/{}", self.position, self.total)
    }
}
