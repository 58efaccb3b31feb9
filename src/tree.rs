use serde::{Deserialize, Serialize};

/// Normalized element tree returned by a device RPC.
///
/// Mirrors the XML reply shape: every node has a tag, optional text and
/// ordered children. Text is stored as received; accessors trim it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcTree {
    pub tag: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<RpcTree>,
}

impl RpcTree {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            text: None,
            children: Vec::new(),
        }
    }

    pub fn leaf(tag: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(tag).with_text(text)
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_child(mut self, child: RpcTree) -> Self {
        self.children.push(child);
        self
    }

    pub fn with_children(mut self, children: impl IntoIterator<Item = RpcTree>) -> Self {
        self.children.extend(children);
        self
    }

    /// Trimmed text of this node; `None` when absent or blank.
    pub fn text(&self) -> Option<&str> {
        self.text.as_deref().map(str::trim).filter(|t| !t.is_empty())
    }

    /// First direct child with `tag`.
    pub fn child(&self, tag: &str) -> Option<&RpcTree> {
        self.children.iter().find(|c| c.tag == tag)
    }

    /// Follows a slash-separated path of direct children, e.g. `nh/to`.
    pub fn find(&self, path: &str) -> Option<&RpcTree> {
        path.split('/')
            .filter(|seg| !seg.is_empty())
            .try_fold(self, |node, seg| node.child(seg))
    }

    pub fn findtext(&self, path: &str) -> Option<&str> {
        self.find(path).and_then(RpcTree::text)
    }

    /// All nodes tagged `tag` strictly below this node, in document order.
    pub fn descendants<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = &'a RpcTree> + 'a {
        let mut stack: Vec<&RpcTree> = self.children.iter().rev().collect();
        std::iter::from_fn(move || {
            while let Some(node) = stack.pop() {
                stack.extend(node.children.iter().rev());
                if node.tag == tag {
                    return Some(node);
                }
            }
            None
        })
    }

    /// True when this node or any node below it is tagged `tag`.
    pub fn contains(&self, tag: &str) -> bool {
        self.tag == tag || self.descendants(tag).next().is_some()
    }
}
